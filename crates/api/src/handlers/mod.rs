pub mod admin;
pub mod approver;
pub mod change_request;
pub mod dashboard;
