use assert_matches::assert_matches;
use changeflow_core::error::CoreError;
use changeflow_core::roles::{Capability, CapabilitySet};
use changeflow_core::store::{IdentityProvider, NewUser};
use changeflow_db::PgIdentityProvider;
use sqlx::PgPool;

fn new_user(name: &str, email: &str, caps: &[Capability]) -> NewUser {
    NewUser {
        name: name.to_string(),
        email: email.to_string(),
        capabilities: caps.iter().copied().collect::<CapabilitySet>(),
    }
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_create_user_with_capabilities(pool: PgPool) {
    let identity = PgIdentityProvider::new(pool.clone());
    let created = identity
        .create_user(&new_user("Sarah M", "sarah.m@company.com", &[Capability::Approver]))
        .await
        .unwrap();
    assert!(created.capabilities.can_approve());

    let found = identity.find_user(created.id).await.unwrap().unwrap();
    assert_eq!(found.email, "sarah.m@company.com");
    assert_eq!(found.capabilities, created.capabilities);

    let by_email: Option<i64> =
        sqlx::query_scalar("SELECT id FROM users WHERE LOWER(email) = LOWER($1)")
            .bind("SARAH.M@company.com")
            .fetch_optional(&pool)
            .await
            .unwrap();
    assert_eq!(by_email, Some(created.id));
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_duplicate_email_is_conflict(pool: PgPool) {
    let identity = PgIdentityProvider::new(pool);
    identity
        .create_user(&new_user("Mike", "mike@company.com", &[]))
        .await
        .unwrap();
    let err = identity
        .create_user(&new_user("Mike Two", "MIKE@company.com", &[]))
        .await
        .unwrap_err();
    assert_matches!(err, CoreError::Conflict(msg) if msg.contains("uq_users_email"));
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_grant_and_revoke_approver(pool: PgPool) {
    let identity = PgIdentityProvider::new(pool);
    let user = identity
        .create_user(&new_user("Nick", "nick@company.com", &[Capability::Requester]))
        .await
        .unwrap();

    assert!(identity.grant(user.id, Capability::Approver).await.unwrap());
    assert!(!identity.grant(user.id, Capability::Approver).await.unwrap());
    assert!(identity.capabilities(user.id).await.unwrap().can_approve());

    let approvers = identity
        .users_with_capability(Capability::Approver)
        .await
        .unwrap();
    assert_eq!(approvers.len(), 1);

    assert!(identity.revoke(user.id, Capability::Approver).await.unwrap());
    assert!(!identity.revoke(user.id, Capability::Approver).await.unwrap());
    let caps = identity.capabilities(user.id).await.unwrap();
    assert!(!caps.can_approve());
    assert!(caps.contains(Capability::Requester));
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_grant_unknown_user_is_not_found(pool: PgPool) {
    let identity = PgIdentityProvider::new(pool);
    let err = identity.grant(404, Capability::Approver).await.unwrap_err();
    assert_matches!(err, CoreError::NotFound { entity: "User", id: 404 });
    assert!(identity.capabilities(404).await.unwrap().is_empty());
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_find_users_skips_unknown_ids(pool: PgPool) {
    let identity = PgIdentityProvider::new(pool);
    let a = identity
        .create_user(&new_user("A", "a@company.com", &[Capability::Admin]))
        .await
        .unwrap();
    let found = identity.find_users(&[a.id, 9999]).await.unwrap();
    assert_eq!(found.len(), 1);
    assert!(found[0].capabilities.is_admin());
    assert_eq!(identity.list_users().await.unwrap().len(), 1);
}
