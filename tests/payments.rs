//! Tests for POST /api/payments/initiate preconditions and the
//! GET /api/payments/status poller.
//!
//! A fully successful initiation needs a live Daraja round trip, so these
//! tests exercise everything up to that call: auth, phone validation and
//! both conflict gates.

use axum::{body::Body, http::Request};
use http_body_util::BodyExt;
use tower::ServiceExt;

mod common;
use common::*;

async fn initiate(
    app: axum::Router,
    token: Option<&str>,
    body: serde_json::Value,
) -> (axum::http::StatusCode, serde_json::Value) {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/api/payments/initiate")
        .header("content-type", "application/json");
    if let Some(token) = token {
        builder = builder.header("Authorization", format!("Bearer {}", token));
    }

    let response = app
        .oneshot(builder.body(Body::from(body.to_string())).unwrap())
        .await
        .unwrap();

    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
    (status, json)
}

async fn get_status(
    app: axum::Router,
    token: &str,
    checkout_id: &str,
) -> (axum::http::StatusCode, serde_json::Value) {
    let response = app
        .oneshot(
            Request::builder()
                .method("GET")
                .uri(format!(
                    "/api/payments/status?checkout_request_id={}",
                    checkout_id
                ))
                .header("Authorization", format!("Bearer {}", token))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
    (status, json)
}

#[tokio::test]
async fn test_initiate_requires_auth() {
    let state = create_test_app_state();
    let body = serde_json::json!({"plan": "weekly", "phone": "0712345678"});

    let (status, _) = initiate(test_app(state.clone()), None, body.clone()).await;
    assert_eq!(status, axum::http::StatusCode::UNAUTHORIZED);

    let (status, _) = initiate(test_app(state), Some("pts_bogus"), body).await;
    assert_eq!(status, axum::http::StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_initiate_rejects_expired_session() {
    let state = create_test_app_state();
    let token;
    {
        let conn = state.db.get().unwrap();
        let user = create_test_user(&conn, "stale@example.com");
        let (_, t) = queries::create_session(&conn, &user.id, -60).unwrap();
        token = t;
    }

    let body = serde_json::json!({"plan": "weekly", "phone": "0712345678"});
    let (status, _) = initiate(test_app(state), Some(&token), body).await;
    assert_eq!(status, axum::http::StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_initiate_rejects_unknown_plan() {
    let state = create_test_app_state();
    let token;
    {
        let conn = state.db.get().unwrap();
        let (_, t) = create_user_with_session(&conn, "plan@example.com");
        token = t;
    }

    let body = serde_json::json!({"plan": "lifetime", "phone": "0712345678"});
    let (status, _) = initiate(test_app(state), Some(&token), body).await;
    assert_eq!(status, axum::http::StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_initiate_rejects_bad_phone() {
    let state = create_test_app_state();
    let token;
    {
        let conn = state.db.get().unwrap();
        let (_, t) = create_user_with_session(&conn, "phone@example.com");
        token = t;
    }

    let body = serde_json::json!({"plan": "weekly", "phone": "12345"});
    let (status, json) = initiate(test_app(state), Some(&token), body).await;
    assert_eq!(status, axum::http::StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "Bad request");
}

#[tokio::test]
async fn test_initiate_conflicts_on_active_subscription() {
    let state = create_test_app_state();
    let token;
    let expires_at;
    {
        let conn = state.db.get().unwrap();
        let (user, t) = create_user_with_session(&conn, "active@example.com");
        let sub = state
            .ledger
            .activate(&conn, &user.id, Plan::Monthly, GrantSource::Mpesa, now())
            .unwrap();
        token = t;
        expires_at = sub.expires_at;
    }

    let body = serde_json::json!({"plan": "weekly", "phone": "0712345678"});
    let (status, json) = initiate(test_app(state), Some(&token), body).await;
    assert_eq!(status, axum::http::StatusCode::CONFLICT);
    assert_eq!(json["active_until"], expires_at);
}

#[tokio::test]
async fn test_initiate_conflicts_on_recent_pending_request() {
    let state = create_test_app_state();
    let token;
    {
        let conn = state.db.get().unwrap();
        let (user, t) = create_user_with_session(&conn, "pending@example.com");
        create_pending_payment(&conn, &user.id, "ws_CO_busy");
        token = t;
    }

    let body = serde_json::json!({"plan": "weekly", "phone": "0712345678"});
    let (status, json) = initiate(test_app(state), Some(&token), body).await;
    assert_eq!(status, axum::http::StatusCode::CONFLICT);
    assert_eq!(json["checkout_request_id"], "ws_CO_busy");
}

#[tokio::test]
async fn test_expired_grant_does_not_block_initiation() {
    let state = create_test_app_state();
    let token;
    {
        let conn = state.db.get().unwrap();
        let (user, t) = create_user_with_session(&conn, "lapsed@example.com");
        // Active flag still set, but expiry is in the past
        queries::insert_subscription(
            &conn,
            &user.id,
            Plan::Daily,
            GrantSource::Mpesa,
            past_timestamp(2),
            past_timestamp(1),
        )
        .unwrap();
        token = t;
    }

    let body = serde_json::json!({"plan": "weekly", "phone": "0712345678"});
    let (status, _) = initiate(test_app(state), Some(&token), body).await;
    // Past both conflict gates; fails only at the (unreachable) Daraja call
    assert_eq!(status, axum::http::StatusCode::BAD_GATEWAY);
}

#[tokio::test]
async fn test_stale_pending_request_does_not_block_initiation() {
    let state = create_test_app_state();
    let token;
    {
        let conn = state.db.get().unwrap();
        let (user, t) = create_user_with_session(&conn, "stalepending@example.com");
        create_pending_payment(&conn, &user.id, "ws_CO_old");
        // Ten minutes old, outside the collision window
        backdate_payment(&conn, "ws_CO_old", now() - 600);
        token = t;
    }

    let body = serde_json::json!({"plan": "weekly", "phone": "0712345678"});
    let (status, _) = initiate(test_app(state.clone()), Some(&token), body).await;
    assert_eq!(status, axum::http::StatusCode::BAD_GATEWAY);

    // Aging out does not finalize the stale row
    let conn = state.db.get().unwrap();
    let stale = queries::get_payment_request_by_checkout_id(&conn, "ws_CO_old")
        .unwrap()
        .unwrap();
    assert_eq!(stale.status, PaymentStatus::Pending);
}

#[tokio::test]
async fn test_status_pending_and_failed() {
    let state = create_test_app_state();
    let token;
    {
        let conn = state.db.get().unwrap();
        let (user, t) = create_user_with_session(&conn, "poll@example.com");
        create_pending_payment(&conn, &user.id, "ws_CO_poll");
        token = t;
    }

    let (status, json) = get_status(test_app(state.clone()), &token, "ws_CO_poll").await;
    assert_eq!(status, axum::http::StatusCode::OK);
    assert_eq!(json["status"], "pending");
    assert_eq!(json["plan"], "weekly");
    assert!(json.get("subscription").is_none());

    {
        let conn = state.db.get().unwrap();
        queries::try_resolve_payment(
            &conn,
            "ws_CO_poll",
            PaymentStatus::Failed,
            None,
            Some("Request cancelled by user"),
        )
        .unwrap();
    }

    let (status, json) = get_status(test_app(state), &token, "ws_CO_poll").await;
    assert_eq!(status, axum::http::StatusCode::OK);
    assert_eq!(json["status"], "failed");
    assert_eq!(json["result_desc"], "Request cancelled by user");
}

#[tokio::test]
async fn test_status_success_includes_grant() {
    let state = create_test_app_state();
    let token;
    {
        let conn = state.db.get().unwrap();
        let (user, t) = create_user_with_session(&conn, "granted@example.com");
        create_pending_payment(&conn, &user.id, "ws_CO_won");
        queries::try_resolve_payment(
            &conn,
            "ws_CO_won",
            PaymentStatus::Success,
            Some("NLJ7RT61SV"),
            None,
        )
        .unwrap();
        state
            .ledger
            .activate(&conn, &user.id, Plan::Weekly, GrantSource::Mpesa, now())
            .unwrap();
        token = t;
    }

    let (status, json) = get_status(test_app(state), &token, "ws_CO_won").await;
    assert_eq!(status, axum::http::StatusCode::OK);
    assert_eq!(json["status"], "success");
    assert_eq!(json["receipt"], "NLJ7RT61SV");
    assert_eq!(json["subscription"]["plan"], "weekly");
    assert!(json["subscription"]["expires_at"].as_i64().unwrap() > now());
}

#[tokio::test]
async fn test_status_is_ownership_scoped() {
    let state = create_test_app_state();
    let other_token;
    {
        let conn = state.db.get().unwrap();
        let (owner, _) = create_user_with_session(&conn, "owner@example.com");
        let (_, t) = create_user_with_session(&conn, "other@example.com");
        create_pending_payment(&conn, &owner.id, "ws_CO_private");
        other_token = t;
    }

    // Someone else's request is indistinguishable from a missing one
    let (status, _) = get_status(test_app(state.clone()), &other_token, "ws_CO_private").await;
    assert_eq!(status, axum::http::StatusCode::NOT_FOUND);

    let (status, _) = get_status(test_app(state), &other_token, "ws_CO_missing").await;
    assert_eq!(status, axum::http::StatusCode::NOT_FOUND);
}
