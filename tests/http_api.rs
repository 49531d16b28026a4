mod common;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use common::{config, exp, identity, instance, token, Client};
use colabri_realtime::models::SendMessage;
use colabri_realtime::routes::create_app;
use serde_json::{json, Value};
use tower::ServiceExt;

async fn call(app: axum::Router, req: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(req).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

fn post_event(bearer: Option<&str>, body: Value) -> Request<Body> {
    let mut req = Request::builder()
        .method("POST")
        .uri("/api/v1/events")
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(bearer) = bearer {
        req = req.header(header::AUTHORIZATION, format!("Bearer {}", bearer));
    }
    req.body(Body::from(body.to_string())).unwrap()
}

#[tokio::test]
async fn health_and_ready_need_no_token() {
    let state = instance(config("node-h"));
    let (status, body) = call(
        create_app(state.clone()),
        Request::builder().uri("/api/health").body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");

    let (status, body) = call(
        create_app(state),
        Request::builder().uri("/api/ready").body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["message"].as_str().unwrap().contains("node-h"));
}

#[tokio::test]
async fn domain_events_are_relayed_to_the_organization() {
    let state = instance(config("node-e"));
    let mut member = Client::connect(&state, identity("bob", "member", Some("acme"))).await;
    member.drain();

    let service = token(json!({ "sub": "okr-api", "type": "service", "exp": exp() }));
    let (status, body) = call(
        create_app(state.clone()),
        post_event(
            Some(&service),
            json!({ "event": "entity-updated", "organizationId": "acme",
                    "payload": { "id": "okr-9", "title": "Grow ARR" } }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["deliveredLocally"], 1);

    match member.next().await {
        SendMessage::DomainEvent { event, target, payload } => {
            assert_eq!(event, "entity-updated");
            assert_eq!(target.organization_id.as_deref(), Some("acme"));
            assert_eq!(payload["title"], "Grow ARR");
        }
        other => panic!("unexpected frame {:?}", other),
    }
}

#[tokio::test]
async fn domain_event_ingestion_is_guarded() {
    let state = instance(config("node-e"));
    let body = json!({ "event": "entity-created", "userId": "u-1" });

    let (status, _) = call(create_app(state.clone()), post_event(None, body.clone())).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let user = token(json!({ "sub": "u-1", "type": "user", "roles": ["member"], "exp": exp() }));
    let (status, _) = call(create_app(state.clone()), post_event(Some(&user), body)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let service = token(json!({ "sub": "okr-api", "type": "service", "exp": exp() }));
    let (status, body) = call(
        create_app(state),
        post_event(Some(&service), json!({ "event": "format-disk" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], 400);
}

#[tokio::test]
async fn diagnostics_for_cloud_admins() {
    let state = instance(config("node-d"));
    let _alice = Client::connect(&state, identity("alice", "member", Some("acme"))).await;

    let admin = token(json!({
        "sub": "ops", "type": "user", "roles": ["Colabri-CloudAdmin"], "exp": exp()
    }));
    let req = Request::builder()
        .uri("/api/v1/diagnostics")
        .header(header::AUTHORIZATION, format!("Bearer {}", admin))
        .body(Body::empty())
        .unwrap();
    let (status, body) = call(create_app(state.clone()), req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["instance_id"], "node-d");
    assert_eq!(body["n_conn"], 1);
    assert_eq!(body["n_users"], 1);

    let member = token(json!({ "sub": "u-2", "type": "user", "exp": exp() }));
    let req = Request::builder()
        .uri("/api/v1/diagnostics")
        .header(header::COOKIE, format!("auth_token={}", member))
        .body(Body::empty())
        .unwrap();
    let (status, _) = call(create_app(state), req).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}
