//! Shared helpers for API integration tests.

#![allow(dead_code)]

use axum::body::Body;
use axum::http::{Method, Request, Response};
use axum::Router;
use changeflow_api::auth::jwt::{generate_access_token, JwtConfig};
use changeflow_api::config::ServerConfig;
use changeflow_api::router::build_app_router;
use changeflow_api::state::AppState;
use changeflow_core::roles::{Capability, CapabilitySet};
use changeflow_core::store::{IdentityProvider, NewUser};
use changeflow_core::types::DbId;
use changeflow_db::PgIdentityProvider;
use http_body_util::BodyExt;
use sqlx::PgPool;
use tower::ServiceExt;

/// Build a test `ServerConfig` with safe defaults and a fixed JWT secret.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        shutdown_timeout_secs: 30,
        database_max_connections: 5,
        jwt: JwtConfig {
            secret: "test-secret-for-integration-tests".to_string(),
            access_token_expiry_mins: 15,
        },
    }
}

/// Build the full application router, with every middleware layer, on `pool`.
pub fn build_test_app(pool: PgPool) -> Router {
    let config = test_config();
    let state = AppState::new(pool, config.clone());
    build_app_router(state, &config)
}

/// Issue a bearer token for `user_id` signed with the test secret.
pub fn token_for(user_id: DbId) -> String {
    generate_access_token(user_id, &test_config().jwt).unwrap()
}

/// Insert a user with the given capabilities, returning its id.
pub async fn seed_user(pool: &PgPool, name: &str, capabilities: &[Capability]) -> DbId {
    PgIdentityProvider::new(pool.clone())
        .create_user(&NewUser {
            name: name.to_string(),
            email: format!("{}@company.com", name.to_lowercase().replace(' ', ".")),
            capabilities: capabilities.iter().copied().collect::<CapabilitySet>(),
        })
        .await
        .unwrap()
        .id
}

async fn send(
    app: Router,
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<serde_json::Value>,
) -> Response<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {token}"));
    }
    let request = match body {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_vec(&json).unwrap()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    app.oneshot(request).await.unwrap()
}

pub async fn get(app: Router, uri: &str) -> Response<Body> {
    send(app, Method::GET, uri, None, None).await
}

pub async fn get_auth(app: Router, uri: &str, token: &str) -> Response<Body> {
    send(app, Method::GET, uri, Some(token), None).await
}

pub async fn post_json(app: Router, uri: &str, body: serde_json::Value) -> Response<Body> {
    send(app, Method::POST, uri, None, Some(body)).await
}

pub async fn post_json_auth(
    app: Router,
    uri: &str,
    body: serde_json::Value,
    token: &str,
) -> Response<Body> {
    send(app, Method::POST, uri, Some(token), Some(body)).await
}

pub async fn put_auth(app: Router, uri: &str, token: &str) -> Response<Body> {
    send(app, Method::PUT, uri, Some(token), None).await
}

pub async fn delete_auth(app: Router, uri: &str, token: &str) -> Response<Body> {
    send(app, Method::DELETE, uri, Some(token), None).await
}

/// Collect a response body and parse it as JSON.
pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

/// A complete, valid change request body.
pub fn change_request_body(approvers: &[DbId], as_draft: bool) -> serde_json::Value {
    serde_json::json!({
        "description": "Domain migration for the admin portal",
        "url_and_env": "https://admin.example.com (production)",
        "scope_and_reason": "Move to the new corporate domain",
        "impact_analysis": "Up to 45 minutes of downtime",
        "risk_rating": "Critical",
        "risk_factor": "Hardcoded URLs",
        "risk_mitigation_with_rollback_plan": "Revert DNS",
        "down_time": "45 Mins",
        "planned_maintenance_window": "08-Dec-2025 15:00-16:00 IST",
        "type_of_request": "Mandatory",
        "pre_checks": "Validate SSL certificate",
        "post_checks": "Sanity on new URLs",
        "approver_user_ids": approvers,
        "as_draft": as_draft,
    })
}
