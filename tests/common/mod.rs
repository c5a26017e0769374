#![allow(dead_code)]

use async_trait::async_trait;
use axum::{body::Body, http::Response};
use chrono::{DateTime, Utc};
use lms_portal::{
    AppConfig, AppState,
    audit::{AuditConnection, AuditEntry, AuditError, AuditSink, AuditStore},
    auth::{SessionLookup, hash_session_token},
    config::Env,
    models::{AuditFilter, DevUser, ReferralMatch, SessionUser, UpdateProfileRequest},
    repository::{RepoError, Repository, RepositoryState},
    sitemap::{EventListing, EventPage, EventQuery, EventSummary},
    storage::{MockStorageService, StorageState},
};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

// --- Mock Repository ---

/// What the handlers asked the repository to do.
#[derive(Default, Debug)]
pub struct Calls {
    pub session_lookups: usize,
    pub event_queries: Vec<EventQuery>,
    pub profile_updates: Vec<(Uuid, UpdateProfileRequest)>,
    pub referral_codes: Vec<String>,
    pub dev_user_limit: Option<i64>,
    pub audit_queries: Vec<(AuditFilter, i64, i64)>,
}

/// In-memory `Repository` with pre-canned data and a call log.
#[derive(Default)]
pub struct MockRepo {
    pub users: Vec<SessionUser>,
    // token hash -> user id
    pub sessions: HashMap<String, Uuid>,
    pub fail_sessions: bool,
    pub events: Vec<EventSummary>,
    pub fail_events: bool,
    pub fail_writes: bool,
    // normalized code -> display name
    pub referrals: HashMap<String, Option<String>>,
    pub completions: BTreeMap<String, DateTime<Utc>>,
    pub audit_entries: Vec<AuditEntry>,
    pub calls: Mutex<Calls>,
}

impl MockRepo {
    /// Registers an active user reachable through the session cookie `token`.
    pub fn with_session(mut self, user: SessionUser, token: &str) -> Self {
        self.sessions.insert(hash_session_token(token), user.id);
        self.users.push(user);
        self
    }

    pub fn with_user(mut self, user: SessionUser) -> Self {
        self.users.push(user);
        self
    }

    pub fn with_events(mut self, slugs: &[&str]) -> Self {
        self.events = slugs
            .iter()
            .map(|slug| EventSummary {
                slug: slug.to_string(),
                title: slug.replace('-', " "),
            })
            .collect();
        self
    }

    fn db_error() -> RepoError {
        RepoError::Database(sqlx::Error::PoolTimedOut)
    }
}

#[async_trait]
impl SessionLookup for MockRepo {
    async fn find_session_user(&self, token_hash: &str) -> Result<Option<SessionUser>, RepoError> {
        self.calls.lock().unwrap().session_lookups += 1;
        if self.fail_sessions {
            return Err(Self::db_error());
        }
        let Some(user_id) = self.sessions.get(token_hash) else {
            return Ok(None);
        };
        self.find_active_user(*user_id).await
    }

    async fn find_active_user(&self, id: Uuid) -> Result<Option<SessionUser>, RepoError> {
        Ok(self
            .users
            .iter()
            .find(|user| user.id == id && user.status == "ACTIVE")
            .cloned())
    }
}

#[async_trait]
impl EventListing for MockRepo {
    async fn list_events(&self, query: EventQuery) -> Result<EventPage, RepoError> {
        self.calls.lock().unwrap().event_queries.push(query);
        if self.fail_events {
            return Err(Self::db_error());
        }
        let items = self
            .events
            .iter()
            .skip(query.offset as usize)
            .take(query.limit as usize)
            .cloned()
            .collect();
        Ok(EventPage { items })
    }
}

#[async_trait]
impl Repository for MockRepo {
    async fn update_profile(&self, user_id: Uuid, req: &UpdateProfileRequest) -> Result<(), RepoError> {
        if self.fail_writes {
            return Err(Self::db_error());
        }
        self.calls.lock().unwrap().profile_updates.push((user_id, req.clone()));
        Ok(())
    }

    async fn get_onboarding_completions(&self, _user_id: Uuid) -> Result<BTreeMap<String, DateTime<Utc>>, RepoError> {
        Ok(self.completions.clone())
    }

    async fn find_referrer_by_code(&self, code: &str) -> Result<Option<ReferralMatch>, RepoError> {
        self.calls.lock().unwrap().referral_codes.push(code.to_string());
        Ok(self.referrals.get(code).map(|display_name| ReferralMatch {
            display_name: display_name.clone(),
        }))
    }

    async fn list_active_users(&self, limit: i64) -> Result<Vec<DevUser>, RepoError> {
        self.calls.lock().unwrap().dev_user_limit = Some(limit);
        let mut users: Vec<DevUser> = self
            .users
            .iter()
            .filter(|user| user.status == "ACTIVE")
            .map(|user| DevUser {
                id: user.id,
                email: user.email.clone(),
                roles: user.roles.clone(),
            })
            .collect();
        users.sort_by(|a, b| a.email.cmp(&b.email));
        users.truncate(limit as usize);
        Ok(users)
    }

    async fn list_audit_entries(&self, filter: &AuditFilter, limit: i64, offset: i64) -> Result<Vec<AuditEntry>, RepoError> {
        self.calls
            .lock()
            .unwrap()
            .audit_queries
            .push((filter.clone(), limit, offset));
        Ok(self.audit_entries.clone())
    }
}

// --- Recording Audit Store ---

#[derive(Default, Debug)]
pub struct AuditProbe {
    pub opened: usize,
    pub closed: usize,
    pub entries: Vec<AuditEntry>,
}

/// Audit store that keeps appended entries in memory. `unavailable` makes `open` fail.
pub struct RecordingAuditStore {
    pub probe: Arc<Mutex<AuditProbe>>,
    pub unavailable: bool,
}

struct RecordingConnection {
    probe: Arc<Mutex<AuditProbe>>,
}

#[async_trait]
impl AuditStore for RecordingAuditStore {
    async fn open(&self) -> Result<Box<dyn AuditConnection>, AuditError> {
        if self.unavailable {
            return Err(AuditError::Unavailable("store offline".to_string()));
        }
        self.probe.lock().unwrap().opened += 1;
        Ok(Box::new(RecordingConnection {
            probe: self.probe.clone(),
        }))
    }
}

#[async_trait]
impl AuditConnection for RecordingConnection {
    async fn append(&mut self, entry: &AuditEntry) -> Result<(), AuditError> {
        self.probe.lock().unwrap().entries.push(entry.clone());
        Ok(())
    }

    async fn close(self: Box<Self>) -> Result<(), AuditError> {
        self.probe.lock().unwrap().closed += 1;
        Ok(())
    }
}

// --- State Assembly ---

pub struct TestContext {
    pub state: AppState,
    pub repo: Arc<MockRepo>,
    pub audit: Arc<Mutex<AuditProbe>>,
}

pub struct TestOptions {
    pub env: Env,
    pub storage: MockStorageService,
    pub audit_unavailable: bool,
}

impl Default for TestOptions {
    fn default() -> Self {
        Self {
            env: Env::Local,
            storage: MockStorageService::new(),
            audit_unavailable: false,
        }
    }
}

pub fn context(repo: MockRepo) -> TestContext {
    context_with(repo, TestOptions::default())
}

pub fn context_with(repo: MockRepo, options: TestOptions) -> TestContext {
    let repo = Arc::new(repo);
    let probe = Arc::new(Mutex::new(AuditProbe::default()));
    let store = RecordingAuditStore {
        probe: probe.clone(),
        unavailable: options.audit_unavailable,
    };

    let config = AppConfig {
        env: options.env,
        site_url: "https://lms.example".to_string(),
        ..AppConfig::default()
    };

    let state = AppState {
        repo: repo.clone() as RepositoryState,
        storage: Arc::new(options.storage) as StorageState,
        audit: AuditSink::new(Arc::new(store)),
        config,
    };

    TestContext {
        state,
        repo,
        audit: probe,
    }
}

// --- Fixtures ---

pub fn member(email: &str, roles: &[&str]) -> SessionUser {
    SessionUser {
        id: Uuid::new_v4(),
        email: email.to_string(),
        status: "ACTIVE".to_string(),
        roles: roles.iter().map(|r| r.to_string()).collect(),
    }
}

pub fn session_cookie(token: &str) -> String {
    format!("theme=dark; lms_session={}", token)
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

pub async fn body_text(response: Response<Body>) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}
