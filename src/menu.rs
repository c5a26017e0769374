//! Navigation menu registry and audience gating.
//!
//! Menus are static and validated once at first use. Each request derives a
//! [`MenuContext`] from its verified session and filters the registry with it; an item
//! whose audience or role restriction excludes the context is never returned.

use serde::{Deserialize, Serialize};
use std::{collections::HashSet, fmt, str::FromStr, sync::LazyLock};
use thiserror::Error;
use ts_rs::TS;
use utoipa::ToSchema;

use crate::{
    auth::{SessionLookup, resolve_session, roles_grant_admin},
    models::SessionUser,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub enum MenuName {
    PublicHeader,
    PublicFooter,
    AdminHeaderQuick,
    AdminPrimary,
    UserAccount,
}

impl MenuName {
    pub const ALL: [MenuName; 5] = [
        MenuName::PublicHeader,
        MenuName::PublicFooter,
        MenuName::AdminHeaderQuick,
        MenuName::AdminPrimary,
        MenuName::UserAccount,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MenuName::PublicHeader => "publicHeader",
            MenuName::PublicFooter => "publicFooter",
            MenuName::AdminHeaderQuick => "adminHeaderQuick",
            MenuName::AdminPrimary => "adminPrimary",
            MenuName::UserAccount => "userAccount",
        }
    }
}

impl fmt::Display for MenuName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MenuName {
    type Err = MenuRegistryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MenuName::ALL
            .into_iter()
            .find(|name| name.as_str() == s)
            .ok_or_else(|| MenuRegistryError::UnknownMenu(s.to_string()))
    }
}

/// MenuAudience
///
/// Coarse access tier used to gate navigation items.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema, TS)]
#[ts(export)]
#[serde(rename_all = "lowercase")]
pub enum MenuAudience {
    Guest,
    User,
    Admin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, TS)]
#[ts(export)]
#[serde(rename_all = "lowercase")]
pub enum MatchMode {
    Exact,
    Prefix,
}

/// MenuItem
///
/// A single static navigation entry. `audience` and `roles` are restrictions: when present
/// they are non-empty and the item is shown only to a matching context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct MenuItem {
    pub id: String,
    pub label: String,
    pub href: String,
    #[serde(rename = "match")]
    pub match_mode: MatchMode,
    #[serde(default)]
    pub include_in_sitemap: bool,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    #[ts(optional)]
    pub audience: Option<Vec<MenuAudience>>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    #[ts(optional)]
    pub roles: Option<Vec<String>>,
}

impl MenuItem {
    pub fn new(id: &str, label: &str, href: &str, match_mode: MatchMode) -> Self {
        Self {
            id: id.to_string(),
            label: label.to_string(),
            href: href.to_string(),
            match_mode,
            include_in_sitemap: false,
            audience: None,
            roles: None,
        }
    }

    pub fn in_sitemap(mut self) -> Self {
        self.include_in_sitemap = true;
        self
    }

    pub fn for_audience(mut self, audience: &[MenuAudience]) -> Self {
        self.audience = Some(audience.to_vec());
        self
    }

    pub fn for_roles(mut self, roles: &[&str]) -> Self {
        self.roles = Some(roles.iter().map(|r| r.to_string()).collect());
        self
    }

    fn admits_audience(&self, audience: MenuAudience) -> bool {
        self.audience
            .as_ref()
            .is_none_or(|allowed| allowed.contains(&audience))
    }

    fn admits_roles(&self, roles: &[String]) -> bool {
        match &self.roles {
            None => true,
            Some(required) if required.is_empty() => true,
            Some(required) => required.iter().any(|r| roles.contains(r)),
        }
    }
}

/// MenuContext
///
/// Per-request navigation context. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema, TS)]
#[ts(export)]
pub struct MenuContext {
    pub audience: MenuAudience,
    pub roles: Vec<String>,
}

impl MenuContext {
    pub fn guest() -> Self {
        Self {
            audience: MenuAudience::Guest,
            roles: Vec::new(),
        }
    }

    /// Derives the context from an already-verified session.
    pub fn for_session(user: Option<&SessionUser>) -> Self {
        match user {
            None => Self::guest(),
            Some(user) => Self {
                audience: audience_for_roles(&user.roles),
                roles: user.roles.clone(),
            },
        }
    }
}

/// `admin` iff the roles intersect the admin role set, otherwise `user`.
/// Only meaningful for an authenticated caller.
pub fn audience_for_roles(roles: &[String]) -> MenuAudience {
    if roles_grant_admin(roles) {
        MenuAudience::Admin
    } else {
        MenuAudience::User
    }
}

/// get_menu_context
///
/// Builds the caller's context from the request's `Cookie` header. With no cookies the
/// guest context is returned without a lookup. Lookup failures degrade to guest.
pub async fn get_menu_context<L>(cookie_header: Option<&str>, lookup: &L) -> MenuContext
where
    L: SessionLookup + ?Sized,
{
    let Some(cookies) = cookie_header.filter(|value| !value.trim().is_empty()) else {
        return MenuContext::guest();
    };

    match resolve_session(Some(cookies), lookup).await {
        Ok(user) => MenuContext::for_session(user.as_ref()),
        Err(e) => {
            tracing::warn!(error = ?e, "session lookup failed; using guest menu context");
            MenuContext::guest()
        }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum MenuRegistryError {
    #[error("unknown menu '{0}'")]
    UnknownMenu(String),

    #[error("invalid menu registration for {menu}: {path}: {message}")]
    InvalidItem {
        menu: MenuName,
        path: String,
        message: String,
    },

    #[error("invalid menu registration for {menu}: duplicate id '{id}'")]
    DuplicateId { menu: MenuName, id: String },

    #[error("invalid menu registration for {menu}: duplicate href '{href}'")]
    DuplicateHref { menu: MenuName, href: String },
}

/// register_menu
///
/// Validates a menu definition: non-blank id and label, rooted href, non-empty
/// restriction lists, and unique ids and hrefs.
pub fn register_menu(
    menu: MenuName,
    items: Vec<MenuItem>,
) -> Result<Vec<MenuItem>, MenuRegistryError> {
    let invalid = |index: usize, field: &str, message: &str| MenuRegistryError::InvalidItem {
        menu,
        path: format!("{}.{}", index, field),
        message: message.to_string(),
    };

    let mut ids = HashSet::new();
    let mut hrefs = HashSet::new();

    for (index, item) in items.iter().enumerate() {
        if item.id.trim().is_empty() {
            return Err(invalid(index, "id", "must not be blank"));
        }
        if item.label.trim().is_empty() {
            return Err(invalid(index, "label", "must not be blank"));
        }
        if !item.href.trim().starts_with('/') {
            return Err(invalid(index, "href", "must start with '/'"));
        }
        if item.audience.as_ref().is_some_and(Vec::is_empty) {
            return Err(invalid(index, "audience", "must not be empty"));
        }
        if let Some(roles) = &item.roles {
            if roles.is_empty() {
                return Err(invalid(index, "roles", "must not be empty"));
            }
            if roles.iter().any(|r| r.trim().is_empty()) {
                return Err(invalid(index, "roles", "must not contain blank roles"));
            }
        }

        if !ids.insert(item.id.as_str()) {
            return Err(MenuRegistryError::DuplicateId {
                menu,
                id: item.id.clone(),
            });
        }
        if !hrefs.insert(item.href.as_str()) {
            return Err(MenuRegistryError::DuplicateHref {
                menu,
                href: item.href.clone(),
            });
        }
    }

    Ok(items)
}

use MatchMode::{Exact, Prefix};
use MenuAudience::{Admin, Guest, User};

const ADMIN_ANY: &[&str] = &["ADMIN", "SUPER_ADMIN", "MAESTRO"];
const ADMIN_STAFF: &[&str] = &["ADMIN", "SUPER_ADMIN"];
const SUPER_ONLY: &[&str] = &["SUPER_ADMIN"];

fn admin_item(id: &str, label: &str, href: &str, match_mode: MatchMode, roles: &[&str]) -> MenuItem {
    MenuItem::new(id, label, href, match_mode)
        .for_audience(&[Admin])
        .for_roles(roles)
}

fn build_registry() -> Result<Vec<(MenuName, Vec<MenuItem>)>, MenuRegistryError> {
    Ok(vec![
        (
            MenuName::PublicHeader,
            register_menu(
                MenuName::PublicHeader,
                vec![
                    MenuItem::new("training", "Training", "/services", Prefix).in_sitemap(),
                    MenuItem::new("events", "Events", "/events", Prefix).in_sitemap(),
                    MenuItem::new("studio", "Studio", "/studio", Exact).in_sitemap(),
                    MenuItem::new("studio-report", "Submit report", "/studio/report", Exact)
                        .for_audience(&[User, Admin])
                        .for_roles(&["APPRENTICE"]),
                    MenuItem::new("book", "Book consult", "/services/request", Exact).in_sitemap(),
                    MenuItem::new("login", "Login", "/login", Exact).for_audience(&[Guest]),
                ],
            )?,
        ),
        (
            MenuName::PublicFooter,
            register_menu(
                MenuName::PublicFooter,
                vec![
                    MenuItem::new("apprentices", "Apprentices", "/apprentices", Prefix).in_sitemap(),
                    MenuItem::new("affiliate", "Affiliates", "/affiliate", Exact).in_sitemap(),
                    MenuItem::new("insights", "Insights", "/insights", Exact).in_sitemap(),
                    MenuItem::new("about", "About", "/about", Exact).in_sitemap(),
                    MenuItem::new("newsletter", "Newsletter", "/newsletter", Exact).in_sitemap(),
                    MenuItem::new("terms", "Terms", "/terms", Exact).in_sitemap(),
                    MenuItem::new("privacy", "Privacy", "/privacy", Exact).in_sitemap(),
                ],
            )?,
        ),
        (
            MenuName::AdminHeaderQuick,
            register_menu(
                MenuName::AdminHeaderQuick,
                vec![
                    admin_item("admin-home", "Admin Console", "/admin", Exact, ADMIN_ANY),
                    admin_item("admin-deals", "Deals", "/admin/deals", Prefix, ADMIN_ANY),
                    admin_item("admin-intake", "Intake", "/admin/intake", Prefix, ADMIN_STAFF),
                    admin_item("admin-events", "Events", "/admin/events", Prefix, ADMIN_ANY),
                    admin_item("admin-ledger", "Ledger", "/admin/ledger", Prefix, ADMIN_STAFF),
                ],
            )?,
        ),
        (
            MenuName::AdminPrimary,
            register_menu(
                MenuName::AdminPrimary,
                vec![
                    admin_item("admin-home", "Admin Console", "/admin", Exact, ADMIN_ANY),
                    admin_item("admin-deals", "Deals", "/admin/deals", Prefix, ADMIN_ANY),
                    admin_item("admin-events", "Events", "/admin/events", Prefix, ADMIN_ANY),
                    admin_item("admin-registrations", "Registrations", "/admin/registrations", Prefix, ADMIN_STAFF),
                    admin_item("admin-engagements", "Engagements", "/admin/engagements", Prefix, ADMIN_STAFF),
                    admin_item("admin-offers", "Offers", "/admin/offers", Prefix, ADMIN_STAFF),
                    admin_item("admin-intake", "Intake", "/admin/intake", Prefix, ADMIN_STAFF),
                    admin_item("admin-commercial", "Commercial", "/admin/commercial", Prefix, ADMIN_STAFF),
                    admin_item("admin-ledger", "Ledger", "/admin/ledger", Prefix, ADMIN_STAFF),
                    admin_item("admin-measurement", "Measurement", "/admin/measurement", Exact, SUPER_ONLY),
                    admin_item("admin-flywheel", "Flywheel", "/admin/flywheel", Exact, SUPER_ONLY),
                    admin_item("admin-telemetry", "Telemetry", "/admin/telemetry", Exact, SUPER_ONLY),
                    admin_item("admin-agent-ops", "Agent ops", "/admin/agent-ops", Prefix, SUPER_ONLY),
                    admin_item("admin-entitlements", "Entitlements", "/admin/entitlements", Prefix, SUPER_ONLY),
                    admin_item("admin-apprentices", "Apprentices", "/admin/apprentices", Prefix, ADMIN_STAFF),
                    admin_item("admin-field-reports", "Field reports", "/admin/field-reports", Prefix, ADMIN_STAFF),
                    admin_item("admin-referrals", "Referrals", "/admin/referrals", Prefix, ADMIN_STAFF),
                    admin_item("admin-newsletter", "Newsletter", "/admin/newsletter", Prefix, ADMIN_ANY),
                    admin_item("admin-users", "Users", "/admin/users", Exact, ADMIN_STAFF),
                    admin_item("admin-settings", "Settings", "/admin/settings", Exact, SUPER_ONLY),
                    admin_item("admin-audit", "Audit", "/admin/audit", Exact, ADMIN_STAFF),
                ],
            )?,
        ),
        (
            MenuName::UserAccount,
            register_menu(
                MenuName::UserAccount,
                vec![
                    MenuItem::new("dashboard", "Dashboard", "/account", Exact)
                        .for_audience(&[User, Admin]),
                    MenuItem::new("profile", "Profile", "/settings/profile", Exact)
                        .for_audience(&[User, Admin]),
                    MenuItem::new("billing", "Billing", "/settings/billing", Exact)
                        .for_audience(&[User, Admin]),
                    MenuItem::new("admin-console", "Admin Console", "/admin", Exact)
                        .for_audience(&[Admin]),
                    MenuItem::new("logout", "Log out", "/logout", Exact)
                        .for_audience(&[User, Admin]),
                ],
            )?,
        ),
    ])
}

static REGISTRY: LazyLock<Vec<(MenuName, Vec<MenuItem>)>> = LazyLock::new(|| {
    build_registry().unwrap_or_else(|e| panic!("static menu registry is invalid: {e}"))
});

/// The registered items of a menu, in display order.
pub fn get_menu(name: MenuName) -> &'static [MenuItem] {
    REGISTRY
        .iter()
        .find(|(menu, _)| *menu == name)
        .map(|(_, items)| items.as_slice())
        .unwrap_or_default()
}

pub fn filter_menu_for_audience(items: &[MenuItem], audience: MenuAudience) -> Vec<MenuItem> {
    items
        .iter()
        .filter(|item| item.admits_audience(audience))
        .cloned()
        .collect()
}

/// Audience filter, then role filter: a role-restricted item needs at least one
/// matching context role.
pub fn filter_menu_for_context(items: &[MenuItem], context: &MenuContext) -> Vec<MenuItem> {
    items
        .iter()
        .filter(|item| item.admits_audience(context.audience) && item.admits_roles(&context.roles))
        .cloned()
        .collect()
}

pub fn resolve_menu(name: MenuName, audience: MenuAudience) -> Vec<MenuItem> {
    filter_menu_for_context(
        get_menu(name),
        &MenuContext {
            audience,
            roles: Vec::new(),
        },
    )
}

/// resolve_menu_for_context
///
/// The items of `name` visible to `context`, in registry order.
pub fn resolve_menu_for_context(name: MenuName, context: &MenuContext) -> Vec<MenuItem> {
    filter_menu_for_context(get_menu(name), context)
}

pub fn is_menu_item_active(item: &MenuItem, pathname: &str) -> bool {
    match item.match_mode {
        MatchMode::Exact => pathname == item.href,
        MatchMode::Prefix => {
            pathname == item.href
                || pathname
                    .strip_prefix(item.href.as_str())
                    .is_some_and(|rest| rest.starts_with('/'))
        }
    }
}

/// Guest-visible public header and footer paths flagged for the sitemap, deduplicated.
pub fn sitemap_static_paths() -> Vec<String> {
    let mut seen = HashSet::new();
    [MenuName::PublicHeader, MenuName::PublicFooter]
        .into_iter()
        .flat_map(|name| filter_menu_for_audience(get_menu(name), MenuAudience::Guest))
        .filter(|item| item.include_in_sitemap)
        .map(|item| item.href)
        .filter(|href| seen.insert(href.clone()))
        .collect()
}
