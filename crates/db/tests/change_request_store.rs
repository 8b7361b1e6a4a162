use assert_matches::assert_matches;
use changeflow_core::approval::{aggregate_status, ApproverResponse};
use changeflow_core::change_request::{
    AssignmentStatus, ChangeRequestFields, ChangeRequestStatus, Decision, NewChangeRequest,
    RequestType, RiskRating,
};
use changeflow_core::error::CoreError;
use changeflow_core::search::{ChangeRequestFilter, SortKey};
use changeflow_core::store::{ChangeRequestStore, Submission};
use changeflow_core::types::DbId;
use changeflow_db::PgChangeRequestStore;
use chrono::Utc;
use sqlx::PgPool;

async fn insert_user(pool: &PgPool, name: &str) -> DbId {
    sqlx::query_scalar("INSERT INTO users (name, email) VALUES ($1, $2) RETURNING id")
        .bind(name)
        .bind(format!("{}@company.com", name.to_lowercase()))
        .fetch_one(pool)
        .await
        .unwrap()
}

fn fields(description: &str) -> ChangeRequestFields {
    ChangeRequestFields {
        description: description.to_string(),
        url_and_env: "https://portal.example.com (prod)".to_string(),
        scope_and_reason: "Rotate expiring certificate".to_string(),
        impact_analysis: "None expected".to_string(),
        risk_rating: RiskRating::High,
        risk_factor: "Handshake failures".to_string(),
        risk_mitigation_with_rollback_plan: "Restore previous certificate".to_string(),
        down_time: "0 Mins".to_string(),
        planned_maintenance_window: "Sat 02:00-03:00".to_string(),
        type_of_request: RequestType::Mandatory,
        pre_checks: "Verify chain".to_string(),
        post_checks: "Verify expiry date".to_string(),
    }
}

fn new_cr(created_by: DbId, approvers: Vec<DbId>, status: ChangeRequestStatus) -> NewChangeRequest {
    NewChangeRequest {
        fields: fields("Certificate rotation"),
        status,
        created_by,
        approver_ids: approvers,
    }
}

fn response(user_id: DbId, decision: Decision) -> ApproverResponse {
    ApproverResponse {
        assignee_id: user_id,
        responder_id: user_id,
        decision,
        comments: None,
    }
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_create_assigns_request_id_and_pending_approvers(pool: PgPool) {
    let requester = insert_user(&pool, "Requester").await;
    let u1 = insert_user(&pool, "Pravin").await;
    let u2 = insert_user(&pool, "Aniket").await;
    let store = PgChangeRequestStore::new(pool);

    let first = store
        .create(&new_cr(requester, vec![u1, u2], ChangeRequestStatus::Pending))
        .await
        .unwrap();
    let second = store
        .create(&new_cr(requester, vec![u1], ChangeRequestStatus::Pending))
        .await
        .unwrap();

    assert_eq!(first.change_request.request_id, "CR001");
    assert_eq!(second.change_request.request_id, "CR002");
    assert_eq!(first.approvers.len(), 2);
    assert!(first
        .approvers
        .iter()
        .all(|a| a.status == AssignmentStatus::Pending && a.responded_at.is_none()));

    let loaded = store.find(first.change_request.id).await.unwrap().unwrap();
    assert_eq!(loaded.change_request.fields, first.change_request.fields);
    assert_eq!(loaded.approvers.len(), 2);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_find_missing_returns_none(pool: PgPool) {
    let store = PgChangeRequestStore::new(pool);
    assert!(store.find(12345).await.unwrap().is_none());
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_create_with_unknown_approver_leaves_nothing(pool: PgPool) {
    let requester = insert_user(&pool, "Requester").await;
    let store = PgChangeRequestStore::new(pool.clone());

    let err = store
        .create(&new_cr(requester, vec![9999], ChangeRequestStatus::Pending))
        .await
        .unwrap_err();
    assert_matches!(err, CoreError::Validation(_));

    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM change_requests")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(count, 0);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_responses_aggregate_to_approved(pool: PgPool) {
    let requester = insert_user(&pool, "Requester").await;
    let u1 = insert_user(&pool, "Pravin").await;
    let u2 = insert_user(&pool, "Aniket").await;
    let store = PgChangeRequestStore::new(pool);
    let id = store
        .create(&new_cr(requester, vec![u1, u2], ChangeRequestStatus::Pending))
        .await
        .unwrap()
        .change_request
        .id;

    let (_, first) = store
        .record_response(id, &response(u1, Decision::Approved), Utc::now())
        .await
        .unwrap();
    assert_eq!(first.status, ChangeRequestStatus::Pending);

    let (_, second) = store
        .record_response(id, &response(u2, Decision::Approved), Utc::now())
        .await
        .unwrap();
    assert_eq!(second.status, ChangeRequestStatus::Approved);
    assert!(second.status_changed());

    let stored = store.find(id).await.unwrap().unwrap();
    assert_eq!(stored.change_request.status, ChangeRequestStatus::Approved);
    assert!(stored.approvers.iter().all(|a| a.responded_at.is_some()));
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_rejection_blocks_further_responses(pool: PgPool) {
    let requester = insert_user(&pool, "Requester").await;
    let u1 = insert_user(&pool, "Pravin").await;
    let u2 = insert_user(&pool, "Aniket").await;
    let store = PgChangeRequestStore::new(pool);
    let id = store
        .create(&new_cr(requester, vec![u1, u2], ChangeRequestStatus::Pending))
        .await
        .unwrap()
        .change_request
        .id;

    let (_, outcome) = store
        .record_response(id, &response(u1, Decision::Rejected), Utc::now())
        .await
        .unwrap();
    assert_eq!(outcome.status, ChangeRequestStatus::Rejected);

    let err = store
        .record_response(id, &response(u2, Decision::Approved), Utc::now())
        .await
        .unwrap_err();
    assert_matches!(err, CoreError::InvalidState(_));

    let stored = store.find(id).await.unwrap().unwrap();
    assert_eq!(
        stored.assignment(u2).map(|a| a.status),
        Some(AssignmentStatus::Pending)
    );
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_response_to_missing_request_is_invalid_state(pool: PgPool) {
    let u1 = insert_user(&pool, "Pravin").await;
    let store = PgChangeRequestStore::new(pool);
    let err = store
        .record_response(777, &response(u1, Decision::Approved), Utc::now())
        .await
        .unwrap_err();
    assert_matches!(err, CoreError::InvalidState(_));
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_concurrent_final_approvals_both_persist(pool: PgPool) {
    let requester = insert_user(&pool, "Requester").await;
    let u1 = insert_user(&pool, "Pravin").await;
    let u2 = insert_user(&pool, "Aniket").await;
    let store = PgChangeRequestStore::new(pool);
    let id = store
        .create(&new_cr(requester, vec![u1, u2], ChangeRequestStatus::Pending))
        .await
        .unwrap()
        .change_request
        .id;

    let a = store.clone();
    let b = store.clone();
    let (ra, rb) = tokio::join!(
        async move { a.record_response(id, &response(u1, Decision::Approved), Utc::now()).await },
        async move { b.record_response(id, &response(u2, Decision::Approved), Utc::now()).await },
    );
    ra.unwrap();
    rb.unwrap();

    let stored = store.find(id).await.unwrap().unwrap();
    assert_eq!(stored.change_request.status, ChangeRequestStatus::Approved);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_submit_draft_adds_approvers(pool: PgPool) {
    let requester = insert_user(&pool, "Requester").await;
    let u1 = insert_user(&pool, "Pravin").await;
    let store = PgChangeRequestStore::new(pool);
    let id = store
        .create(&new_cr(requester, vec![], ChangeRequestStatus::Draft))
        .await
        .unwrap()
        .change_request
        .id;

    let submission = Submission {
        caller_id: requester,
        caller_is_admin: false,
        additional_approvers: vec![u1],
    };
    let submitted = store.submit(id, &submission, Utc::now()).await.unwrap();
    assert_eq!(submitted.change_request.status, ChangeRequestStatus::Pending);

    let stored = store.find(id).await.unwrap().unwrap();
    assert_eq!(stored.change_request.status, ChangeRequestStatus::Pending);
    assert_eq!(stored.approvers.len(), 1);

    let err = store.submit(id, &submission, Utc::now()).await.unwrap_err();
    assert_matches!(err, CoreError::InvalidState(_));
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_submit_draft_without_approvers_fails(pool: PgPool) {
    let requester = insert_user(&pool, "Requester").await;
    let store = PgChangeRequestStore::new(pool);
    let id = store
        .create(&new_cr(requester, vec![], ChangeRequestStatus::Draft))
        .await
        .unwrap()
        .change_request
        .id;

    let submission = Submission {
        caller_id: requester,
        caller_is_admin: false,
        additional_approvers: vec![],
    };
    let err = store.submit(id, &submission, Utc::now()).await.unwrap_err();
    assert_matches!(err, CoreError::Validation(_));

    let stored = store.find(id).await.unwrap().unwrap();
    assert_eq!(stored.change_request.status, ChangeRequestStatus::Draft);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_list_filters_search_and_counts(pool: PgPool) {
    let requester = insert_user(&pool, "Requester").await;
    let other = insert_user(&pool, "Other").await;
    let u1 = insert_user(&pool, "Pravin").await;
    let store = PgChangeRequestStore::new(pool);

    let mut critical = new_cr(requester, vec![u1], ChangeRequestStatus::Pending);
    critical.fields = fields("Emergency security patch");
    critical.fields.risk_rating = RiskRating::Critical;
    store.create(&critical).await.unwrap();
    store
        .create(&new_cr(other, vec![], ChangeRequestStatus::Draft))
        .await
        .unwrap();
    let mut percent = new_cr(requester, vec![u1], ChangeRequestStatus::Pending);
    percent.fields = fields("Raise quota to 100%");
    store.create(&percent).await.unwrap();

    let all = store.list(&ChangeRequestFilter::all()).await.unwrap();
    assert_eq!(all.len(), 3);

    let searched = store
        .list(&ChangeRequestFilter {
            search: Some("SECURITY".into()),
            ..ChangeRequestFilter::all()
        })
        .await
        .unwrap();
    assert_eq!(searched.len(), 1);
    assert_eq!(searched[0].request_id, "CR001");

    let literal_percent = store
        .list(&ChangeRequestFilter {
            search: Some("100%".into()),
            ..ChangeRequestFilter::all()
        })
        .await
        .unwrap();
    assert_eq!(literal_percent.len(), 1);

    let by_id = store
        .list(&ChangeRequestFilter {
            search: Some("cr002".into()),
            ..ChangeRequestFilter::all()
        })
        .await
        .unwrap();
    assert_eq!(by_id[0].created_by, other);

    let mine = store
        .list(&ChangeRequestFilter {
            created_by: Some(requester),
            status: Some(ChangeRequestStatus::Pending),
            sort: SortKey::RequestId,
            ..ChangeRequestFilter::all()
        })
        .await
        .unwrap();
    let ids: Vec<&str> = mine.iter().map(|c| c.request_id.as_str()).collect();
    assert_eq!(ids, vec!["CR001", "CR003"]);

    let paged = store
        .list(&ChangeRequestFilter {
            sort: SortKey::RequestId,
            limit: 1,
            offset: 1,
            ..ChangeRequestFilter::all()
        })
        .await
        .unwrap();
    assert_eq!(paged.len(), 1);
    assert_eq!(paged[0].request_id, "CR002");

    let counts = store.status_counts().await.unwrap();
    assert_eq!(counts.pending, 2);
    assert_eq!(counts.draft, 1);
    assert_eq!(counts.total(), 3);
    assert_eq!(store.count_by_risk(RiskRating::Critical).await.unwrap(), 1);

    let assigned = store.list_assigned(u1, None).await.unwrap();
    assert_eq!(assigned.len(), 2);
    let decided = store
        .list_assigned(u1, Some(AssignmentStatus::Approved))
        .await
        .unwrap();
    assert!(decided.is_empty());
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_reads_during_responses_see_consistent_status(pool: PgPool) {
    let requester = insert_user(&pool, "Requester").await;
    let u1 = insert_user(&pool, "Pravin").await;
    let u2 = insert_user(&pool, "Aniket").await;
    let store = PgChangeRequestStore::new(pool);
    let id = store
        .create(&new_cr(requester, vec![u1, u2], ChangeRequestStatus::Pending))
        .await
        .unwrap()
        .change_request
        .id;

    let writer = store.clone();
    let writes = tokio::spawn(async move {
        for user in [u1, u2] {
            writer
                .record_response(id, &response(user, Decision::Approved), Utc::now())
                .await
                .unwrap();
        }
    });

    for _ in 0..50 {
        let detail = store.find(id).await.unwrap().unwrap();
        assert_eq!(
            detail.change_request.status,
            aggregate_status(ChangeRequestStatus::Pending, &detail.approvers)
        );
    }
    writes.await.unwrap();

    let detail = store.find(id).await.unwrap().unwrap();
    assert_eq!(detail.change_request.status, ChangeRequestStatus::Approved);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_request_id_sort_past_three_digits(pool: PgPool) {
    let requester = insert_user(&pool, "Requester").await;
    let store = PgChangeRequestStore::new(pool.clone());

    store
        .create(&new_cr(requester, vec![], ChangeRequestStatus::Draft))
        .await
        .unwrap();
    sqlx::query("SELECT setval('change_request_number_seq', 998)")
        .execute(&pool)
        .await
        .unwrap();
    for _ in 0..2 {
        store
            .create(&new_cr(requester, vec![], ChangeRequestStatus::Draft))
            .await
            .unwrap();
    }

    let sorted = store
        .list(&ChangeRequestFilter {
            sort: SortKey::RequestId,
            ..ChangeRequestFilter::all()
        })
        .await
        .unwrap();
    let ids: Vec<&str> = sorted.iter().map(|c| c.request_id.as_str()).collect();
    assert_eq!(ids, vec!["CR001", "CR999", "CR1000"]);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_list_by_type_and_created_order(pool: PgPool) {
    let requester = insert_user(&pool, "Requester").await;
    let u1 = insert_user(&pool, "Pravin").await;
    let store = PgChangeRequestStore::new(pool);

    let mut ids = Vec::new();
    for request_type in [RequestType::Mandatory, RequestType::Emergency, RequestType::Optional] {
        let mut input = new_cr(requester, vec![u1], ChangeRequestStatus::Pending);
        input.fields.type_of_request = request_type;
        ids.push(store.create(&input).await.unwrap().change_request.id);
    }

    let emergency = store
        .list(&ChangeRequestFilter {
            type_of_request: Some(RequestType::Emergency),
            ..ChangeRequestFilter::all()
        })
        .await
        .unwrap();
    assert_eq!(emergency.len(), 1);
    assert_eq!(emergency[0].request_id, "CR002");

    // Responding to CR001 makes it the most recently updated, not the newest.
    store
        .record_response(ids[0], &response(u1, Decision::Approved), Utc::now())
        .await
        .unwrap();

    let created = store
        .list(&ChangeRequestFilter {
            sort: SortKey::Created,
            ..ChangeRequestFilter::all()
        })
        .await
        .unwrap();
    let ids: Vec<&str> = created.iter().map(|c| c.request_id.as_str()).collect();
    assert_eq!(ids, vec!["CR003", "CR002", "CR001"]);

    let recent = store.list(&ChangeRequestFilter::all()).await.unwrap();
    assert_eq!(recent[0].request_id, "CR001");
}
