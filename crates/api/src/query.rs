//! Query parameter types for API handlers.
//!
//! Enumerated values arrive as strings and are parsed into their closed core
//! types here, so a bad value is a 400 before any handler logic runs.

use changeflow_core::change_request::AssignmentStatus;
use changeflow_core::error::CoreError;
use changeflow_core::search::{clamp_limit, clamp_offset, ChangeRequestFilter};
use changeflow_core::types::DbId;
use serde::Deserialize;

/// `GET /change-requests` query (`?status=&risk_rating=&type_of_request=&created_by=&search=&sort=&limit=&offset=`).
#[derive(Debug, Default, Deserialize)]
pub struct ChangeRequestListParams {
    pub status: Option<String>,
    pub risk_rating: Option<String>,
    pub type_of_request: Option<String>,
    pub created_by: Option<DbId>,
    pub search: Option<String>,
    pub sort: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl ChangeRequestListParams {
    /// Parse into a filter, clamping pagination to its bounds.
    pub fn into_filter(self) -> Result<ChangeRequestFilter, CoreError> {
        Ok(ChangeRequestFilter {
            status: parse_opt(self.status)?,
            risk_rating: parse_opt(self.risk_rating)?,
            type_of_request: parse_opt(self.type_of_request)?,
            created_by: self.created_by,
            search: self.search,
            sort: parse_opt(self.sort)?.unwrap_or_default(),
            limit: clamp_limit(self.limit),
            offset: clamp_offset(self.offset),
        })
    }
}

/// `GET /me/approvals` query (`?status=Pending|Approved|Rejected`).
#[derive(Debug, Default, Deserialize)]
pub struct MyApprovalsParams {
    pub status: Option<String>,
}

impl MyApprovalsParams {
    pub fn assignment_status(&self) -> Result<Option<AssignmentStatus>, CoreError> {
        parse_opt(self.status.clone())
    }
}

/// `?search=` for listings that support free-text search.
#[derive(Debug, Default, Deserialize)]
pub struct SearchParams {
    pub search: Option<String>,
}

/// Parse an optional query value, treating a blank string as absent.
fn parse_opt<T>(raw: Option<String>) -> Result<Option<T>, CoreError>
where
    T: std::str::FromStr<Err = CoreError>,
{
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(value) => value.parse().map(Some),
    }
}
