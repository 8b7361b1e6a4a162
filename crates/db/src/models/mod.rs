//! Database row structs.
//!
//! Each submodule holds a `FromRow` struct matching its table, plus a
//! conversion into the corresponding `changeflow_core` entity. Enumerated
//! columns are stored as text and parsed on the way out.

pub mod approver;
pub mod change_request;
pub mod role;
pub mod user;
