// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
mod common;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use common::*;
use keyseq_kernel::head::verify_head_chain;
use keyseq_node::api::{
    DomainResponse, HeadsResponse, OutcomeResponse, RevisionResponse, SequenceResponse,
    SubmitMutationRequest, SubmitMutationResponse,
};
use keyseq_node::server::{build_router, AppState};
use serde::de::DeserializeOwned;
use serde_json::json;
use tower::ServiceExt; // for oneshot

fn app(h: &Harness) -> Router {
    let state = AppState::new(
        h.registry.clone(),
        h.log.clone(),
        h.anchor.clone(),
        h.sequencer.clone(),
        h.clock.clone(),
        &h.config,
    );
    build_router(state)
}

fn json_request(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_vec(&body).unwrap()))
        .unwrap()
}

fn empty_request(method: &str, uri: &str) -> Request<Body> {
    Request::builder().method(method).uri(uri).body(Body::empty()).unwrap()
}

async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Vec<u8>) {
    let response = app.clone().oneshot(req).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), 1 << 20).await.unwrap();
    (status, body.to_vec())
}

fn parse<T: DeserializeOwned>(body: &[u8]) -> T {
    serde_json::from_slice(body).unwrap()
}

fn create_body(id: &str, seed: u8) -> serde_json::Value {
    json!({
        "domain_id": id,
        "min_interval_ms": 0,
        "max_interval_ms": 60000,
        "signing_seed": hex::encode([seed; 32]),
    })
}

fn mutation_body(update: &keyseq_kernel::types::EntryUpdate) -> serde_json::Value {
    serde_json::to_value(SubmitMutationRequest::from_update(&update.entry.index, update)).unwrap()
}

#[tokio::test]
async fn test_full_write_path() {
    let h = Harness::new();
    let app = app(&h);

    let (status, body) = send(&app, json_request("POST", "/v1/domains", create_body("d1", 1))).await;
    assert_eq!(status, StatusCode::CREATED);
    let domain: DomainResponse = parse(&body);
    assert_eq!(domain.domain_id, "d1");
    assert!(!domain.deleted);

    let owner = key(10);
    let update = signed(first_write(index(1), b"v1", &owner), &owner);
    let (status, body) = send(
        &app,
        json_request("POST", "/v1/domains/d1/mutations", mutation_body(&update)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let submitted: SubmitMutationResponse = parse(&body);
    assert_eq!(submitted.sequence, 1);

    let (status, body) = send(&app, empty_request("GET", "/v1/domains/d1/mutations/1")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(parse::<OutcomeResponse>(&body).status, "pending");

    let (status, body) = send(&app, empty_request("POST", "/v1/domains/d1/sequence")).await;
    assert_eq!(status, StatusCode::OK);
    let run: SequenceResponse = parse(&body);
    assert_eq!(run.status, "committed");
    assert_eq!(run.revision, Some(1));
    assert_eq!(run.accepted, 1);

    let (_, body) = send(&app, empty_request("GET", "/v1/domains/d1/mutations/1")).await;
    let outcome: OutcomeResponse = parse(&body);
    assert_eq!(outcome.status, "accepted");
    assert_eq!(outcome.revision, Some(1));

    let (status, body) = send(&app, empty_request("GET", "/v1/domains/d1/revisions/latest")).await;
    assert_eq!(status, StatusCode::OK);
    let latest: RevisionResponse = parse(&body);
    assert_eq!(latest.revision, 1);
    assert_eq!(latest.high_watermark, 1);

    let (status, body) = send(&app, empty_request("GET", "/v1/domains/d1/heads")).await;
    assert_eq!(status, StatusCode::OK);
    let heads: HeadsResponse = parse(&body);
    assert_eq!(heads.heads.len(), 2);
    let public_key: [u8; 32] = hex::decode(&domain.map_public_key).unwrap().try_into().unwrap();
    verify_head_chain(&heads.heads, &public_key).unwrap();

    let (_, body) = send(&app, empty_request("POST", "/v1/domains/d1/sequence")).await;
    assert_eq!(parse::<SequenceResponse>(&body).status, "idle");
}

#[tokio::test]
async fn test_deleted_domain_refuses_writes() {
    let h = Harness::new();
    let app = app(&h);
    send(&app, json_request("POST", "/v1/domains", create_body("d2", 2))).await;

    let (status, body) = send(&app, empty_request("DELETE", "/v1/domains/d2")).await;
    assert_eq!(status, StatusCode::OK);
    assert!(parse::<DomainResponse>(&body).deleted);

    let owner = key(10);
    let update = signed(first_write(index(1), b"v1", &owner), &owner);
    let (status, _) = send(
        &app,
        json_request("POST", "/v1/domains/d2/mutations", mutation_body(&update)),
    )
    .await;
    assert_eq!(status, StatusCode::GONE);

    let (status, _) = send(&app, empty_request("POST", "/v1/domains/d2/sequence")).await;
    assert_eq!(status, StatusCode::GONE);

    // History stays readable.
    let (status, _) = send(&app, empty_request("GET", "/v1/domains/d2/revisions/latest")).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_error_statuses() {
    let h = Harness::new();
    let app = app(&h);

    let (status, _) = send(&app, empty_request("GET", "/v1/domains/missing")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    send(&app, json_request("POST", "/v1/domains", create_body("d1", 1))).await;
    let (status, _) = send(&app, json_request("POST", "/v1/domains", create_body("d1", 1))).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = send(
        &app,
        json_request("POST", "/v1/domains", json!({ "domain_id": "../etc" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let bad_hex = json!({
        "index": "not-hex",
        "commitment": "",
        "authorized_keys": [],
        "previous": "00".repeat(32),
        "signatures": [],
    });
    let (status, _) = send(&app, json_request("POST", "/v1/domains/d1/mutations", bad_hex)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let owner = key(10);
    let mut update = signed(first_write(index(1), b"v1", &owner), &owner);
    update.signatures[0].truncate(10);
    let (status, body) = send(
        &app,
        json_request("POST", "/v1/domains/d1/mutations", mutation_body(&update)),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let err: serde_json::Value = parse(&body);
    assert_eq!(err["kind"], "invalid_mutation");

    let (status, _) = send(&app, empty_request("GET", "/v1/domains/d1/mutations/5")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_health_and_metrics() {
    let h = Harness::new();
    let app = app(&h);

    let (status, body) = send(&app, empty_request("GET", "/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"OK");

    let (status, _) = send(&app, empty_request("GET", "/metrics")).await;
    assert_eq!(status, StatusCode::OK);
}
