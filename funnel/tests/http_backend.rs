use std::collections::HashMap;
use std::time::Duration;

use axum::extract::Query;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use funnel::core::handle::ProjectCatalog;
use funnel::core::types::{DrawCount, FlowState};
use funnel::error::FlowError;
use funnel::io::backend::{
    Backend, BackendError, HttpBackend, MessageRequest, PeersRequest, PostIntentRequest,
    RegisterRequest,
};
use funnel::test_support::test_flow;
use serde_json::{Value, json};

/// Serve `router` on an ephemeral local port and return its base URL.
async fn serve(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, router).await.expect("serve");
    });
    format!("http://{addr}")
}

/// A backend that behaves like the real service for every endpoint.
fn healthy_router() -> Router {
    Router::new()
        .route(
            "/api/f4f/enter",
            post(|Json(body): Json<Value>| async move {
                Json(json!({
                    "userId": 42,
                    "username": body["username"],
                    "project": body["project"],
                }))
            }),
        )
        .route(
            "/api/f4f/users",
            get(|Query(query): Query<HashMap<String, String>>| async move {
                let count = query
                    .get("count")
                    .and_then(|c| c.parse::<usize>().ok())
                    .unwrap_or(0);
                let project = query.get("project").cloned().unwrap_or_default();
                let me = query.get("currentUsername").cloned().unwrap_or_default();
                let users: Vec<Value> = (1..=count)
                    .map(|i| json!({ "username": format!("{me}_peer{i}"), "project": project }))
                    .collect();
                Json(json!({ "users": users }))
            }),
        )
        .route(
            "/api/f4f/generate-message",
            post(|Json(body): Json<Value>| async move {
                let mentions: Vec<String> = body["usernames"]
                    .as_array()
                    .map(|names| {
                        names
                            .iter()
                            .filter_map(Value::as_str)
                            .map(|n| format!("@{n}"))
                            .collect()
                    })
                    .unwrap_or_default();
                let project = body["project"].as_str().unwrap_or_default().to_string();
                Json(json!({
                    "message": format!("Followed {} for {project}", mentions.join(" "))
                }))
            }),
        )
        .route(
            "/api/f4f/post",
            post(|Json(body): Json<Value>| async move {
                let text = body["message"].as_str().unwrap_or_default().len();
                Json(json!({
                    "success": true,
                    "twitterUrl": format!("https://x.com/intent/tweet?len={text}"),
                }))
            }),
        )
}

fn backend(base_url: &str) -> HttpBackend {
    HttpBackend::new(base_url, Duration::from_secs(5)).expect("client")
}

fn affinity(name: &str) -> funnel::core::handle::Affinity {
    ProjectCatalog::new([name]).resolve(name).expect("known project")
}

#[tokio::test]
async fn register_sends_username_and_project() {
    let base = serve(healthy_router()).await;
    let registration = backend(&base)
        .register(&RegisterRequest {
            handle: "Visitor".to_string(),
            affinity: affinity("Sign"),
        })
        .await
        .expect("register");

    assert_eq!(registration.session_id, "42");
    assert_eq!(registration.handle, "Visitor");
    assert_eq!(registration.affinity, "sign");
}

#[tokio::test]
async fn peers_query_carries_count_and_exclusion() {
    let base = serve(healthy_router()).await;
    let peers = backend(&base)
        .fetch_peers(&PeersRequest {
            affinity: affinity("Monad"),
            count: DrawCount::try_from(3).expect("count"),
            exclude_handle: "me".to_string(),
        })
        .await
        .expect("peers");

    let handles: Vec<&str> = peers.iter().map(|p| p.handle.as_str()).collect();
    assert_eq!(handles, vec!["me_peer1", "me_peer2", "me_peer3"]);
    assert!(peers.iter().all(|p| p.affinity == "monad"));
}

#[tokio::test]
async fn message_and_post_round_trip() {
    let base = serve(healthy_router()).await;
    let backend = backend(&base);
    let text = backend
        .generate_message(&MessageRequest {
            peer_handles: vec!["ana".to_string(), "ben".to_string()],
            affinity: affinity("Sign"),
        })
        .await
        .expect("message");
    assert_eq!(text, "Followed @ana @ben for sign");

    let url = backend
        .post_intent(&PostIntentRequest { text: text.clone() })
        .await
        .expect("post");
    assert_eq!(url, format!("https://x.com/intent/tweet?len={}", text.len()));
}

#[tokio::test]
async fn error_status_carries_backend_message() {
    let router = Router::new()
        .route(
            "/api/f4f/users",
            get(|| async {
                (
                    StatusCode::NOT_FOUND,
                    Json(json!({ "message": "No users found for this project" })),
                )
            }),
        )
        .route(
            "/api/f4f/enter",
            post(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "boom") }),
        );
    let base = serve(router).await;
    let backend = backend(&base);

    let err = backend
        .fetch_peers(&PeersRequest {
            affinity: affinity("Sign"),
            count: DrawCount::MIN,
            exclude_handle: "me".to_string(),
        })
        .await
        .expect_err("404");
    assert_eq!(
        err,
        BackendError::rejected(404, "No users found for this project")
    );

    let err = backend
        .register(&RegisterRequest {
            handle: "me".to_string(),
            affinity: affinity("Sign"),
        })
        .await
        .expect_err("500");
    assert_eq!(err, BackendError::rejected(500, "Internal Server Error"));
    assert!(err.is_server_side());
}

#[tokio::test]
async fn malformed_bodies_are_transport_errors() {
    let router = Router::new()
        .route(
            "/api/f4f/generate-message",
            post(|| async { "definitely not json" }),
        )
        .route(
            "/api/f4f/enter",
            post(|| async { Json(json!({ "userId": null })) }),
        );
    let base = serve(router).await;
    let backend = backend(&base);

    let err = backend
        .generate_message(&MessageRequest {
            peer_handles: vec!["ana".to_string()],
            affinity: affinity("Sign"),
        })
        .await
        .expect_err("not json");
    assert!(matches!(err, BackendError::Transport(_)));

    let err = backend
        .register(&RegisterRequest {
            handle: "me".to_string(),
            affinity: affinity("Sign"),
        })
        .await
        .expect_err("null id");
    assert!(matches!(err, BackendError::Transport(_)));
}

#[tokio::test]
async fn unsuccessful_post_is_rejected() {
    let router = Router::new().route(
        "/api/f4f/post",
        post(|| async { Json(json!({ "success": false })) }),
    );
    let base = serve(router).await;
    let err = backend(&base)
        .post_intent(&PostIntentRequest {
            text: "gm".to_string(),
        })
        .await
        .expect_err("no url");
    assert!(matches!(err, BackendError::Rejected { status: 200, .. }));
}

#[tokio::test]
async fn unreachable_backend_is_transport() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().expect("local addr");
    drop(listener);

    let mut flow = test_flow(1);
    let backend = backend(&format!("http://{addr}"));
    let err = flow
        .register(&backend, "me", "SomeProject")
        .await
        .expect_err("refused");
    assert!(matches!(err, FlowError::Transport(_)));
    assert!(err.is_retryable());
    assert_eq!(flow.state(), FlowState::Registering);
}

#[tokio::test]
async fn full_session_over_http() {
    let base = serve(healthy_router()).await;
    let backend = backend(&base);
    let mut flow = test_flow(21);

    flow.register(&backend, "@Visitor", "someproject")
        .await
        .expect("register");
    assert_eq!(flow.record().map(|r| r.session_id.as_str()), Some("42"));

    let plan = flow.spin().expect("spin");
    flow.confirm_draw(&backend).await.expect("confirm");
    assert_eq!(flow.peers().len(), plan.result().as_usize());

    let handles: Vec<String> = flow.peers().iter().map(|p| p.handle.clone()).collect();
    for handle in &handles {
        flow.follow(handle).expect("follow");
    }
    let message = flow
        .generate_outreach(&backend)
        .await
        .expect("generate")
        .applied()
        .expect("applied");
    assert!(message.text().starts_with("Followed @Visitor_peer1"));
    assert_eq!(flow.state(), FlowState::Outreach);

    let url = flow
        .request_post_intent(&backend)
        .await
        .expect("post")
        .applied()
        .expect("applied");
    assert!(url.starts_with("https://x.com/intent/tweet"));
}
