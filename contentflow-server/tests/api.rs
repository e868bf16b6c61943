//! Route tests driven through the router with `oneshot`.

use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
    Router,
};
use contentflow::config::StagesConfig;
use contentflow::core::JobStatus;
use contentflow::jobs::JobId;
use contentflow::pipeline::content_graph;
use contentflow::stages::content::ContentStages;
use contentflow::testing::{TestGraph, TestHarness};
use contentflow_server::{router, AppState};
use futures::StreamExt;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tower::ServiceExt;

type WsClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

fn app(harness: &TestHarness) -> Router {
    let state = AppState::new(harness.orchestrator.clone(), harness.gateway.clone());
    router(state, true)
}

async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

async fn serve(app: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
    addr
}

/// Next text frame as JSON, or `None` once the server closes the socket.
async fn next_frame(socket: &mut WsClient) -> Option<Value> {
    loop {
        let message = tokio::time::timeout(Duration::from_secs(5), socket.next())
            .await
            .expect("no frame within five seconds")?;
        match message.unwrap() {
            Message::Text(text) => return Some(serde_json::from_str(&text).unwrap()),
            Message::Close(_) => return None,
            _ => {}
        }
    }
}

async fn submit(app: &Router, body: Value) -> JobId {
    let (status, value) = send(app, Method::POST, "/api/generate", Some(body)).await;
    assert_eq!(status, StatusCode::ACCEPTED, "{value}");
    assert_eq!(value["status"], "pending");
    serde_json::from_value(value["job_id"].clone()).unwrap()
}

#[tokio::test]
async fn test_health_counts_jobs() {
    let harness = TestHarness::new(TestGraph::new(2).build());
    let app = app(&harness);

    let (status, body) = send(&app, Method::GET, "/api/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"status": "ok", "active_jobs": 0, "total_jobs": 0}));

    let job_id = submit(&app, json!({"topic": "Health check", "auto_approve": false})).await;
    harness
        .wait_for(job_id, |s| s == JobStatus::AwaitingApproval)
        .await;
    let (_, body) = send(&app, Method::GET, "/api/health", None).await;
    assert_eq!(body["active_jobs"], 1);
    assert_eq!(body["total_jobs"], 1);
}

#[tokio::test]
async fn test_generate_then_pull_status_events_and_bundle() {
    let harness = TestHarness::new(TestGraph::new(3).build());
    let app = app(&harness);

    let job_id = submit(&app, json!({"topic": "Quantum Computing"})).await;
    let snapshot = harness.wait_terminal(job_id).await;
    assert_eq!(snapshot.status, JobStatus::Completed);

    let (status, report) = send(&app, Method::GET, &format!("/api/status/{job_id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["status"], "completed");
    assert_eq!(report["percent_complete"], 100);
    assert_eq!(report["event_count"], snapshot.events.len());

    let (status, page) = send(
        &app,
        Method::GET,
        &format!("/api/jobs/{job_id}/events?after=0"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let events = page["events"].as_array().unwrap();
    assert_eq!(events.len(), snapshot.events.len());
    assert_eq!(page["last_seq"], snapshot.events.len());
    assert_eq!(events.last().unwrap()["terminal"], true);

    let last = snapshot.events.len();
    let (_, page) = send(
        &app,
        Method::GET,
        &format!("/api/jobs/{job_id}/events?after={last}"),
        None,
    )
    .await;
    assert_eq!(page["events"], json!([]));
    assert_eq!(page["last_seq"], last);

    let (status, bundle) = send(&app, Method::GET, &format!("/api/jobs/{job_id}/bundle"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(bundle["job_id"], job_id.to_string());
}

#[tokio::test]
async fn test_generate_rejects_invalid_topic() {
    let harness = TestHarness::new(TestGraph::new(1).build());
    let app = app(&harness);

    let (status, body) = send(&app, Method::POST, "/api/generate", Some(json!({"topic": "ab"}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "InvalidTopic");
    assert!(harness.registry.is_empty());
}

#[tokio::test]
async fn test_unknown_job_is_not_found() {
    let harness = TestHarness::new(TestGraph::new(1).build());
    let app = app(&harness);
    let job_id = JobId::new_v4();

    for (method, uri) in [
        (Method::GET, format!("/api/status/{job_id}")),
        (Method::GET, format!("/api/jobs/{job_id}/events")),
        (Method::POST, format!("/api/jobs/{job_id}/resume")),
        (Method::POST, format!("/api/jobs/{job_id}/cancel")),
        (Method::GET, format!("/api/jobs/{job_id}/bundle")),
        (Method::DELETE, format!("/api/jobs/{job_id}")),
    ] {
        let (status, body) = send(&app, method.clone(), &uri, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND, "{method} {uri}");
        assert_eq!(body["error"], "NotFound");
    }

    let addr = serve(app).await;
    let url = format!("ws://{addr}/ws/jobs/{job_id}");
    match connect_async(url.as_str()).await {
        Err(WsError::Http(response)) => assert_eq!(response.status().as_u16(), 404),
        Err(other) => panic!("expected an HTTP rejection, got {other}"),
        Ok(_) => panic!("upgrade accepted for unknown job"),
    }
}

#[tokio::test]
async fn test_ws_stream_matches_pull_queries() {
    let harness = TestHarness::new(TestGraph::new(2).build());
    let gateway = harness.gateway.clone().with_heartbeat(Duration::from_millis(20));
    let app = router(AppState::new(harness.orchestrator.clone(), gateway), true);
    let addr = serve(app.clone()).await;

    let job_id = submit(&app, json!({"topic": "Live stream", "auto_approve": false})).await;
    harness
        .wait_for(job_id, |s| s == JobStatus::AwaitingApproval)
        .await;

    let url = format!("ws://{addr}/ws/jobs/{job_id}");
    let (mut socket, _) = connect_async(url.as_str()).await.unwrap();

    // Paused jobs keep the socket alive with heartbeats.
    let mut frames = Vec::new();
    loop {
        let frame = next_frame(&mut socket).await.expect("stream ended while paused");
        if frame["type"] == "heartbeat" {
            assert_eq!(frame, json!({"type": "heartbeat"}));
            break;
        }
        frames.push(frame);
    }

    let (status, _) = send(&app, Method::POST, &format!("/api/jobs/{job_id}/resume"), None).await;
    assert_eq!(status, StatusCode::OK);
    while let Some(frame) = next_frame(&mut socket).await {
        if frame["type"] != "heartbeat" {
            frames.push(frame);
        }
    }

    let streamed: Vec<Value> = frames
        .into_iter()
        .map(|mut frame| {
            assert_eq!(frame["type"], "event");
            frame.as_object_mut().unwrap().remove("type");
            frame
        })
        .collect();
    for (i, event) in streamed.iter().enumerate() {
        assert_eq!(event["seq"], i + 1);
    }
    let terminal = streamed.last().unwrap();
    assert_eq!(terminal["terminal"], true);
    assert_eq!(terminal["status"], "completed");

    let (_, page) = send(&app, Method::GET, &format!("/api/jobs/{job_id}/events"), None).await;
    assert_eq!(page["events"], Value::Array(streamed.clone()));

    let (_, report) = send(&app, Method::GET, &format!("/api/status/{job_id}"), None).await;
    let latest = report["latest_events"].as_array().unwrap();
    assert!(!latest.is_empty());
    assert_eq!(latest.as_slice(), &streamed[streamed.len() - latest.len()..]);
}

#[tokio::test]
async fn test_resume_with_edited_plan() {
    let harness = TestHarness::new(TestGraph::new(3).build());
    let app = app(&harness);

    let job_id = submit(&app, json!({"topic": "Approval flow", "auto_approve": false})).await;
    harness
        .wait_for(job_id, |s| s == JobStatus::AwaitingApproval)
        .await;

    let (status, report) = send(&app, Method::GET, &format!("/api/status/{job_id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["status"], "awaiting_approval");
    assert_eq!(report["plan"]["tasks"].as_array().unwrap().len(), 3);

    let (status, _) = send(&app, Method::GET, &format!("/api/jobs/{job_id}/bundle"), None).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let resume = format!("/api/jobs/{job_id}/resume");
    let (status, body) = send(&app, Method::POST, &resume, Some(json!({"plan": {"tasks": []}}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "InvalidPlan");

    let edited = json!({"title": "Edited", "tasks": [{"title": "Only"}]});
    let (status, _) = send(&app, Method::POST, &resume, Some(json!({"plan": edited}))).await;
    assert_eq!(status, StatusCode::OK);

    let snapshot = harness.wait_terminal(job_id).await;
    assert_eq!(snapshot.status, JobStatus::Completed);
    assert_eq!(snapshot.plan.unwrap().as_value(), &edited);

    let (status, body) = send(&app, Method::POST, &resume, None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "NotAwaitingApproval");
}

#[tokio::test]
async fn test_resume_without_body_approves() {
    let harness = TestHarness::new(TestGraph::new(2).build());
    let app = app(&harness);

    let job_id = submit(&app, json!({"topic": "Plain approval", "auto_approve": false})).await;
    harness
        .wait_for(job_id, |s| s == JobStatus::AwaitingApproval)
        .await;

    let (status, _) = send(&app, Method::POST, &format!("/api/jobs/{job_id}/resume"), None).await;
    assert_eq!(status, StatusCode::OK);
    let snapshot = harness.wait_terminal(job_id).await;
    assert_eq!(snapshot.status, JobStatus::Completed);
}

#[tokio::test]
async fn test_cancel_then_delete() {
    let harness = TestHarness::new(TestGraph::new(2).build());
    let app = app(&harness);

    let job_id = submit(&app, json!({"topic": "Cancel me", "auto_approve": false})).await;
    harness
        .wait_for(job_id, |s| s == JobStatus::AwaitingApproval)
        .await;

    let (status, body) = send(&app, Method::DELETE, &format!("/api/jobs/{job_id}"), None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "NotTerminal");

    let cancel = format!("/api/jobs/{job_id}/cancel");
    let (status, body) = send(&app, Method::POST, &cancel, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "cancelled");

    let (status, body) = send(&app, Method::POST, &cancel, None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "AlreadyTerminal");

    let (status, _) = send(&app, Method::DELETE, &format!("/api/jobs/{job_id}"), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = send(&app, Method::GET, &format!("/api/status/{job_id}"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_content_graph_end_to_end() {
    let graph = content_graph(ContentStages::from_config(&StagesConfig::default())).unwrap();
    let harness = TestHarness::new(graph);
    let app = app(&harness);

    let job_id = submit(
        &app,
        json!({"topic": "Quantum Computing", "include_images": false, "include_audio": false}),
    )
    .await;
    let snapshot = harness.wait_terminal(job_id).await;
    assert_eq!(snapshot.status, JobStatus::Completed, "{:?}", snapshot.error);

    let (status, bundle) = send(&app, Method::GET, &format!("/api/jobs/{job_id}/bundle"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(bundle["topic"], "Quantum Computing");
    assert!(bundle["summary"]["quality_score"].is_number());
}
