//! Domain rules for change request approval.
//!
//! Everything here is free of I/O except the collaborator traits in [`store`],
//! which storage and identity backends implement.

pub mod approval;
pub mod change_request;
pub mod error;
pub mod memory;
pub mod roles;
pub mod search;
pub mod store;
pub mod types;
pub mod workflow;
