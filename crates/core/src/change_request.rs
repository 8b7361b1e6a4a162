//! Change request entities, closed enumerations, and field validation.
//!
//! The descriptive fields of a change request are opaque to the workflow: they
//! are stored and returned, never interpreted. Only presence and length are
//! checked here.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::error::CoreError;
use crate::types::{DbId, Timestamp};

/* --------------------------------------------------------------------------
Constants
-------------------------------------------------------------------------- */

/// Prefix of every human-readable request identifier.
pub const REQUEST_ID_PREFIX: &str = "CR";

/// Maximum length of the one-line description.
pub const MAX_DESCRIPTION_LENGTH: u64 = 500;

/// Maximum length of every other free-text field.
pub const MAX_FIELD_LENGTH: u64 = 10_000;

/// Maximum length of an approver's response comment.
pub const MAX_COMMENT_LENGTH: usize = 2_000;

/// Format a sequence number as a request identifier (`7` -> `CR007`).
pub fn format_request_id(number: i64) -> String {
    format!("{REQUEST_ID_PREFIX}{number:03}")
}

/* --------------------------------------------------------------------------
Enumerations
-------------------------------------------------------------------------- */

/// Declares a closed string-backed enum with `as_str`, `Display`, and a
/// `FromStr` that rejects unknown values with [`CoreError::Validation`].
macro_rules! string_enum {
    (
        $(#[$meta:meta])*
        $name:ident, $label:literal { $($variant:ident => $text:literal),+ $(,)? }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = CoreError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err(CoreError::Validation(format!(
                        "Invalid {} '{other}'. Must be one of: {}",
                        $label,
                        [$($text),+].join(", ")
                    ))),
                }
            }
        }
    };
}

string_enum! {
    /// Informational risk classification. Never gates a transition.
    RiskRating, "risk rating" {
        Critical => "Critical",
        High => "High",
        Medium => "Medium",
        Low => "Low",
    }
}

string_enum! {
    /// Informational request category.
    RequestType, "request type" {
        Mandatory => "Mandatory",
        Optional => "Optional",
        Emergency => "Emergency",
    }
}

string_enum! {
    /// Aggregate workflow state of a change request.
    ChangeRequestStatus, "change request status" {
        Draft => "Draft",
        Pending => "Pending",
        Approved => "Approved",
        Rejected => "Rejected",
    }
}

string_enum! {
    /// Response state of a single approver assignment. Never `Draft`.
    AssignmentStatus, "assignment status" {
        Pending => "Pending",
        Approved => "Approved",
        Rejected => "Rejected",
    }
}

string_enum! {
    /// A decision an approver may record.
    Decision, "decision" {
        Approved => "Approved",
        Rejected => "Rejected",
    }
}

impl ChangeRequestStatus {
    /// Approved and Rejected accept no further responses.
    pub fn is_terminal(self) -> bool {
        matches!(self, ChangeRequestStatus::Approved | ChangeRequestStatus::Rejected)
    }
}

impl From<Decision> for AssignmentStatus {
    fn from(decision: Decision) -> Self {
        match decision {
            Decision::Approved => AssignmentStatus::Approved,
            Decision::Rejected => AssignmentStatus::Rejected,
        }
    }
}

/* --------------------------------------------------------------------------
Entities
-------------------------------------------------------------------------- */

/// Descriptive content of a change request, as entered by the requester.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct ChangeRequestFields {
    #[validate(length(max = 500))]
    pub description: String,
    #[validate(length(max = 10000))]
    #[serde(default)]
    pub url_and_env: String,
    #[validate(length(max = 10000))]
    #[serde(default)]
    pub scope_and_reason: String,
    #[validate(length(max = 10000))]
    #[serde(default)]
    pub impact_analysis: String,
    pub risk_rating: RiskRating,
    #[validate(length(max = 10000))]
    #[serde(default)]
    pub risk_factor: String,
    #[validate(length(max = 10000))]
    #[serde(default)]
    pub risk_mitigation_with_rollback_plan: String,
    #[validate(length(max = 10000))]
    #[serde(default)]
    pub down_time: String,
    #[validate(length(max = 10000))]
    #[serde(default)]
    pub planned_maintenance_window: String,
    pub type_of_request: RequestType,
    #[validate(length(max = 10000))]
    #[serde(default)]
    pub pre_checks: String,
    #[validate(length(max = 10000))]
    #[serde(default)]
    pub post_checks: String,
}

impl ChangeRequestFields {
    /// Names of required text fields that are empty or whitespace-only.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        [
            ("description", &self.description),
            ("url_and_env", &self.url_and_env),
            ("scope_and_reason", &self.scope_and_reason),
            ("impact_analysis", &self.impact_analysis),
            ("risk_factor", &self.risk_factor),
            (
                "risk_mitigation_with_rollback_plan",
                &self.risk_mitigation_with_rollback_plan,
            ),
            ("down_time", &self.down_time),
            ("planned_maintenance_window", &self.planned_maintenance_window),
            ("pre_checks", &self.pre_checks),
            ("post_checks", &self.post_checks),
        ]
        .into_iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(name, _)| name)
        .collect()
    }

    /// Validate a draft: length limits plus a non-blank description.
    pub fn validate_draft(&self) -> Result<(), CoreError> {
        self.check_lengths()?;
        if self.description.trim().is_empty() {
            return Err(CoreError::Validation(
                "description must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Validate a request entering review: every text field is required.
    pub fn validate_submission(&self) -> Result<(), CoreError> {
        self.check_lengths()?;
        let missing = self.missing_fields();
        if !missing.is_empty() {
            return Err(CoreError::Validation(format!(
                "Missing required fields: {}",
                missing.join(", ")
            )));
        }
        Ok(())
    }

    fn check_lengths(&self) -> Result<(), CoreError> {
        self.validate()
            .map_err(|e| CoreError::Validation(e.to_string()))
    }
}

/// A persisted change request. `status` is a cached projection of its
/// assignments (see [`crate::approval::aggregate_status`]).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeRequest {
    pub id: DbId,
    pub request_id: String,
    #[serde(flatten)]
    pub fields: ChangeRequestFields,
    pub status: ChangeRequestStatus,
    pub created_by: DbId,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// The pairing of one approver with one change request.
///
/// Identified by `(change_request_id, user_id)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApproverAssignment {
    pub change_request_id: DbId,
    pub user_id: DbId,
    pub status: AssignmentStatus,
    /// Set exactly when `status` is not `Pending`.
    pub responded_at: Option<Timestamp>,
    pub comments: Option<String>,
    pub created_at: Timestamp,
}

impl ApproverAssignment {
    /// A fresh, unanswered assignment.
    pub fn pending(change_request_id: DbId, user_id: DbId, now: Timestamp) -> Self {
        Self {
            change_request_id,
            user_id,
            status: AssignmentStatus::Pending,
            responded_at: None,
            comments: None,
            created_at: now,
        }
    }
}

/// A change request together with its full assignment set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeRequestDetail {
    #[serde(flatten)]
    pub change_request: ChangeRequest,
    pub approvers: Vec<ApproverAssignment>,
}

impl ChangeRequestDetail {
    pub fn assignment(&self, user_id: DbId) -> Option<&ApproverAssignment> {
        self.approvers.iter().find(|a| a.user_id == user_id)
    }

    pub fn assignment_mut(&mut self, user_id: DbId) -> Option<&mut ApproverAssignment> {
        self.approvers.iter_mut().find(|a| a.user_id == user_id)
    }
}

/// Everything needed to insert a change request and its initial assignments.
#[derive(Debug, Clone)]
pub struct NewChangeRequest {
    pub fields: ChangeRequestFields,
    pub status: ChangeRequestStatus,
    pub created_by: DbId,
    pub approver_ids: Vec<DbId>,
}

/* --------------------------------------------------------------------------
Tests
-------------------------------------------------------------------------- */

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// A fully populated set of fields.
    pub(crate) fn sample_fields() -> ChangeRequestFields {
        ChangeRequestFields {
            description: "Domain migration to the new corporate domain".to_string(),
            url_and_env: "https://admin.example.com/ (production)".to_string(),
            scope_and_reason: "Move the admin portal to the new domain".to_string(),
            impact_analysis: "Up to 45 minutes of downtime inside the window".to_string(),
            risk_rating: RiskRating::Critical,
            risk_factor: "Hardcoded URLs pointing at the old domain".to_string(),
            risk_mitigation_with_rollback_plan: "Revert DNS to the previous endpoint".to_string(),
            down_time: "45 Mins".to_string(),
            planned_maintenance_window: "08-Dec-2025 15:00-16:00 IST".to_string(),
            type_of_request: RequestType::Mandatory,
            pre_checks: "Sanity test, validate SSL certificate".to_string(),
            post_checks: "Sanity on new URLs, DNS pointing".to_string(),
        }
    }

    #[test]
    fn test_format_request_id_pads_to_three_digits() {
        assert_eq!(format_request_id(1), "CR001");
        assert_eq!(format_request_id(42), "CR042");
        assert_eq!(format_request_id(1234), "CR1234");
    }

    #[test]
    fn test_enum_parse_accepts_known_values() {
        assert_eq!("High".parse::<RiskRating>().unwrap(), RiskRating::High);
        assert_eq!("Emergency".parse::<RequestType>().unwrap(), RequestType::Emergency);
        assert_eq!(
            "Draft".parse::<ChangeRequestStatus>().unwrap(),
            ChangeRequestStatus::Draft
        );
    }

    #[test]
    fn test_enum_parse_rejects_unknown_values() {
        let err = "Severe".parse::<RiskRating>().unwrap_err();
        assert!(err.to_string().contains("Invalid risk rating 'Severe'"));
        assert!("Draft".parse::<AssignmentStatus>().is_err());
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(ChangeRequestStatus::Approved.is_terminal());
        assert!(ChangeRequestStatus::Rejected.is_terminal());
        assert!(!ChangeRequestStatus::Draft.is_terminal());
        assert!(!ChangeRequestStatus::Pending.is_terminal());
    }

    #[test]
    fn test_decision_maps_to_assignment_status() {
        assert_eq!(AssignmentStatus::from(Decision::Approved), AssignmentStatus::Approved);
        assert_eq!(AssignmentStatus::from(Decision::Rejected), AssignmentStatus::Rejected);
    }

    #[test]
    fn test_complete_fields_pass_submission() {
        assert!(sample_fields().validate_submission().is_ok());
    }

    #[test]
    fn test_blank_field_fails_submission() {
        let mut fields = sample_fields();
        fields.post_checks = "   ".to_string();
        fields.down_time.clear();
        let err = fields.validate_submission().unwrap_err().to_string();
        assert!(err.contains("down_time"));
        assert!(err.contains("post_checks"));
    }

    #[test]
    fn test_draft_only_needs_description() {
        let mut fields = sample_fields();
        fields.url_and_env.clear();
        fields.pre_checks.clear();
        assert!(fields.validate_draft().is_ok());

        fields.description = " ".to_string();
        assert!(fields.validate_draft().is_err());
    }

    #[test]
    fn test_overlong_description_is_rejected() {
        let mut fields = sample_fields();
        fields.description = "x".repeat(MAX_DESCRIPTION_LENGTH as usize + 1);
        assert!(fields.validate_draft().is_err());
    }

    #[test]
    fn test_fields_serialize_with_original_enum_names() {
        let json = serde_json::to_value(sample_fields()).unwrap();
        assert_eq!(json["risk_rating"], "Critical");
        assert_eq!(json["type_of_request"], "Mandatory");
    }
}
