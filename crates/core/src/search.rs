//! Listing filters, sort keys, and dashboard aggregates for change requests.
//!
//! Storage implementations translate [`ChangeRequestFilter`] into their own
//! query language. [`ChangeRequestFilter::matches`] and [`sort_change_requests`]
//! define the reference semantics and back the in-memory store.

use std::cmp::Reverse;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::change_request::{ChangeRequest, ChangeRequestStatus, RequestType, RiskRating};
use crate::error::CoreError;
use crate::types::DbId;

// ---------------------------------------------------------------------------
// Pagination defaults
// ---------------------------------------------------------------------------

/// Default page size for change request listings.
pub const DEFAULT_LIST_LIMIT: i64 = 50;

/// Maximum page size for change request listings.
pub const MAX_LIST_LIMIT: i64 = 200;

/// Number of entries in the dashboard's "recent" list.
pub const RECENT_LIMIT: usize = 5;

/// Clamp a requested page size into `1..=MAX_LIST_LIMIT`.
pub fn clamp_limit(limit: Option<i64>) -> i64 {
    limit.unwrap_or(DEFAULT_LIST_LIMIT).clamp(1, MAX_LIST_LIMIT)
}

/// Clamp a requested offset to be non-negative.
pub fn clamp_offset(offset: Option<i64>) -> i64 {
    offset.unwrap_or(0).max(0)
}

// ---------------------------------------------------------------------------
// Sort keys
// ---------------------------------------------------------------------------

/// Ordering applied to a change request listing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
    /// Most recently updated first.
    #[default]
    Recent,
    /// Most recently created first.
    Created,
    /// Request identifier ascending.
    RequestId,
}

impl FromStr for SortKey {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "recent" => Ok(SortKey::Recent),
            "created" => Ok(SortKey::Created),
            "request_id" => Ok(SortKey::RequestId),
            other => Err(CoreError::Validation(format!(
                "Invalid sort '{other}'. Must be one of: recent, created, request_id"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Filter
// ---------------------------------------------------------------------------

/// Criteria for listing change requests. Every criterion is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeRequestFilter {
    pub status: Option<ChangeRequestStatus>,
    pub risk_rating: Option<RiskRating>,
    pub type_of_request: Option<RequestType>,
    pub created_by: Option<DbId>,
    /// Case-insensitive substring matched against request id or description.
    pub search: Option<String>,
    pub sort: SortKey,
    pub limit: i64,
    pub offset: i64,
}

impl ChangeRequestFilter {
    /// A filter matching everything, with default pagination.
    pub fn all() -> Self {
        Self {
            limit: DEFAULT_LIST_LIMIT,
            ..Self::default()
        }
    }

    /// The trimmed search term, or `None` when blank.
    pub fn search_term(&self) -> Option<&str> {
        self.search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    /// Whether a change request satisfies every criterion (ignores paging).
    pub fn matches(&self, cr: &ChangeRequest) -> bool {
        if self.status.is_some_and(|s| s != cr.status) {
            return false;
        }
        if self.risk_rating.is_some_and(|r| r != cr.fields.risk_rating) {
            return false;
        }
        if self
            .type_of_request
            .is_some_and(|t| t != cr.fields.type_of_request)
        {
            return false;
        }
        if self.created_by.is_some_and(|u| u != cr.created_by) {
            return false;
        }
        if let Some(term) = self.search_term() {
            let term = term.to_lowercase();
            return cr.request_id.to_lowercase().contains(&term)
                || cr.fields.description.to_lowercase().contains(&term);
        }
        true
    }
}

/// Order change requests in place according to `sort`.
pub fn sort_change_requests(items: &mut [ChangeRequest], sort: SortKey) {
    match sort {
        SortKey::Recent => items.sort_by_key(|cr| Reverse((cr.updated_at, cr.id))),
        SortKey::Created => items.sort_by_key(|cr| Reverse((cr.created_at, cr.id))),
        // Numbers outgrow the three-digit padding, so shorter ids sort first.
        SortKey::RequestId => items.sort_by(|a, b| {
            (a.request_id.len(), &a.request_id).cmp(&(b.request_id.len(), &b.request_id))
        }),
    }
}

/// Escape `%`, `_`, and `\` so a user search term is matched literally by `ILIKE`.
pub fn escape_like(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len());
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

// ---------------------------------------------------------------------------
// Dashboard
// ---------------------------------------------------------------------------

/// Per-status change request counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    pub draft: i64,
    pub pending: i64,
    pub approved: i64,
    pub rejected: i64,
}

impl StatusCounts {
    pub fn add(&mut self, status: ChangeRequestStatus, count: i64) {
        match status {
            ChangeRequestStatus::Draft => self.draft += count,
            ChangeRequestStatus::Pending => self.pending += count,
            ChangeRequestStatus::Approved => self.approved += count,
            ChangeRequestStatus::Rejected => self.rejected += count,
        }
    }

    pub fn total(&self) -> i64 {
        self.draft + self.pending + self.approved + self.rejected
    }
}

/// Headline numbers for the dashboard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DashboardSummary {
    pub total: i64,
    pub by_status: StatusCounts,
    pub critical: i64,
    pub recent: Vec<ChangeRequest>,
}
