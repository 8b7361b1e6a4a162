//! Repository layer.
//!
//! Each repository is a zero-sized struct providing async query methods.
//! Read paths take `&PgPool`; methods that must run inside a caller's
//! transaction take `&mut PgConnection` (pass `&mut *tx`).

pub mod approver_repo;
pub mod change_request_repo;
pub mod role_repo;
pub mod user_repo;

pub use approver_repo::ApproverRepo;
pub use change_request_repo::ChangeRequestRepo;
pub use role_repo::RoleRepo;
pub use user_repo::UserRepo;
