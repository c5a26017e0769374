use async_trait::async_trait;
use chrono::{DateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::collections::HashSet;
use ts_rs::TS;
use utoipa::ToSchema;

use crate::repository::RepoError;

/// Page size used when walking published events.
pub const EVENT_PAGE_SIZE: i64 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EventStatus {
    Draft,
    Published,
    Cancelled,
}

impl EventStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventStatus::Draft => "DRAFT",
            EventStatus::Published => "PUBLISHED",
            EventStatus::Cancelled => "CANCELLED",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventQuery {
    pub status: EventStatus,
    pub limit: i64,
    pub offset: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct EventSummary {
    pub slug: String,
    pub title: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventPage {
    pub items: Vec<EventSummary>,
}

/// EventListing
///
/// Paginated read access to events, as consumed by the sitemap builder.
#[async_trait]
pub trait EventListing: Send + Sync {
    async fn list_events(&self, query: EventQuery) -> Result<EventPage, RepoError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, TS)]
#[ts(export)]
#[serde(rename_all = "lowercase")]
pub enum ChangeFrequency {
    Daily,
    Weekly,
}

impl ChangeFrequency {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeFrequency::Daily => "daily",
            ChangeFrequency::Weekly => "weekly",
        }
    }
}

/// SitemapEntry
///
/// Computed on demand from the registry and the current published events. Never stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct SitemapEntry {
    pub url: String,
    #[ts(type = "string")]
    pub last_modified: DateTime<Utc>,
    pub change_frequency: ChangeFrequency,
    pub priority: f32,
}

/// collect_published_event_paths
///
/// Walks published events page by page, advancing the offset by the number of items
/// returned. A page shorter than the page size (including an empty one) ends the walk,
/// so an exact multiple of the page size costs one extra, empty round trip.
pub async fn collect_published_event_paths<L>(listing: &L) -> Result<Vec<String>, RepoError>
where
    L: EventListing + ?Sized,
{
    let mut seen = HashSet::new();
    let mut paths = Vec::new();
    let mut offset = 0;

    loop {
        let page = listing
            .list_events(EventQuery {
                status: EventStatus::Published,
                limit: EVENT_PAGE_SIZE,
                offset,
            })
            .await?;

        let returned = page.items.len() as i64;
        for event in page.items {
            if seen.insert(event.slug.clone()) {
                paths.push(format!("/events/{}", event.slug));
            }
        }

        if returned < EVENT_PAGE_SIZE {
            break;
        }
        offset += returned;
    }

    tracing::debug!(count = paths.len(), "collected published event paths");
    Ok(paths)
}

fn is_event_detail(path: &str) -> bool {
    path.strip_prefix("/events/")
        .is_some_and(|slug| !slug.is_empty())
}

fn priority_for(path: &str) -> f32 {
    if path == "/events" {
        0.9
    } else if is_event_detail(path) {
        0.8
    } else {
        0.7
    }
}

/// build_sitemap
///
/// Unions static and event paths (static first, first occurrence wins) into absolute
/// entries. `last_modified` is day-level: `now` truncated to UTC midnight.
pub fn build_sitemap(
    site_url: &str,
    static_paths: &[String],
    event_paths: &[String],
    now: DateTime<Utc>,
) -> Vec<SitemapEntry> {
    let origin = site_url.trim_end_matches('/');
    let last_modified = now.date_naive().and_time(NaiveTime::MIN).and_utc();
    let mut seen = HashSet::new();

    static_paths
        .iter()
        .chain(event_paths)
        .filter(|path| seen.insert(path.as_str()))
        .map(|path| SitemapEntry {
            url: format!("{}{}", origin, path),
            last_modified,
            change_frequency: if is_event_detail(path) {
                ChangeFrequency::Daily
            } else {
                ChangeFrequency::Weekly
            },
            priority: priority_for(path),
        })
        .collect()
}

fn escape_xml(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            other => out.push(other),
        }
    }
    out
}

/// Renders entries as a sitemaps.org `urlset` document.
pub fn render_sitemap_xml(entries: &[SitemapEntry]) -> String {
    let mut xml = String::from(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<urlset xmlns=\"http://www.sitemaps.org/schemas/sitemap/0.9\">\n",
    );
    for entry in entries {
        xml.push_str("  <url>\n");
        xml.push_str(&format!("    <loc>{}</loc>\n", escape_xml(&entry.url)));
        xml.push_str(&format!(
            "    <lastmod>{}</lastmod>\n",
            entry.last_modified.format("%Y-%m-%d")
        ));
        xml.push_str(&format!(
            "    <changefreq>{}</changefreq>\n",
            entry.change_frequency.as_str()
        ));
        xml.push_str(&format!("    <priority>{:.1}</priority>\n", entry.priority));
        xml.push_str("  </url>\n");
    }
    xml.push_str("</urlset>\n");
    xml
}
