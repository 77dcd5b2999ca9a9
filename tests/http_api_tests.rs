// Integration tests for the HTTP bridge
//
// Requests are driven through the router directly with tower's oneshot;
// no socket is bound.

mod common;

use std::sync::Arc;

use anyhow::Result;
use audio_chunk_recorder::events::RecorderEvent;
use audio_chunk_recorder::{create_router, AppState, AudioChunkRecorder, StaticPermission};
use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use common::{test_config, Script, ScriptedFactory};
use serde_json::{json, Value};
use tempfile::TempDir;
use tokio::sync::broadcast;
use tower::ServiceExt;

struct Bridge {
    app: Router,
    permission: Arc<StaticPermission>,
    events: broadcast::Receiver<RecorderEvent>,
    _dir: TempDir,
}

fn bridge() -> Bridge {
    let dir = TempDir::new().unwrap();
    let (events_tx, events) = broadcast::channel(64);
    let permission = Arc::new(StaticPermission::granted());

    let recorder = AudioChunkRecorder::builder(test_config(&dir))
        .device_factory(ScriptedFactory::new(Script::endless(0)))
        .permissions(permission.clone())
        .event_sink(Arc::new(events_tx.clone()))
        .spawn()
        .unwrap();

    Bridge {
        app: create_router(AppState::new(recorder, events_tx)),
        permission,
        events,
        _dir: dir,
    }
}

async fn call(app: &Router, method: &str, uri: &str, body: Option<Value>) -> Result<(StatusCode, Value)> {
    let request = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => request
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))?,
        None => request.body(Body::empty())?,
    };

    let response = app.clone().oneshot(request).await?;
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await?;
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).to_string()))
    };

    Ok((status, value))
}

#[tokio::test]
async fn test_health_check() -> Result<()> {
    let bridge = bridge();

    let (status, body) = call(&bridge.app, "GET", "/health", None).await?;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, Value::String("OK".to_string()));
    Ok(())
}

#[tokio::test]
async fn test_recording_lifecycle_over_http() -> Result<()> {
    let mut bridge = bridge();

    let (status, _) = call(&bridge.app, "POST", "/recording/start", Some(json!({ "chunkSeconds": 10 }))).await?;
    assert_eq!(status, StatusCode::OK);

    let (_, state) = call(&bridge.app, "GET", "/recording/state", None).await?;
    assert_eq!(state["isRecording"], true);
    assert_eq!(state["isPaused"], false);
    assert_eq!(state["currentChunkIndex"], 1);
    assert_eq!(state["chunkDuration"], 10.0);

    let (status, _) = call(&bridge.app, "POST", "/recording/pause", None).await?;
    assert_eq!(status, StatusCode::OK);
    let (_, state) = call(&bridge.app, "GET", "/recording/state", None).await?;
    assert_eq!(state["isPaused"], true);

    let (status, _) = call(&bridge.app, "POST", "/recording/resume", None).await?;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = call(&bridge.app, "POST", "/recording/stop", None).await?;
    assert_eq!(status, StatusCode::OK);

    let mut names = Vec::new();
    while let Ok(event) = bridge.events.try_recv() {
        if !matches!(event, RecorderEvent::AudioLevel(_)) {
            names.push(event.name());
        }
    }
    assert_eq!(
        names,
        vec!["onStateChange", "onStateChange", "onStateChange", "onChunkReady", "onStateChange"]
    );

    Ok(())
}

#[tokio::test]
async fn test_state_errors_map_to_conflict() -> Result<()> {
    let bridge = bridge();

    let (status, body) = call(&bridge.app, "POST", "/recording/stop", None).await?;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "not_recording");

    let (status, body) = call(&bridge.app, "POST", "/recording/pause", None).await?;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "invalid_state");

    call(&bridge.app, "POST", "/recording/start", Some(json!({}))).await?;
    let (status, body) = call(&bridge.app, "POST", "/recording/start", Some(json!({}))).await?;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "already_recording");

    call(&bridge.app, "POST", "/recording/stop", None).await?;
    Ok(())
}

#[tokio::test]
async fn test_permission_denied_maps_to_forbidden() -> Result<()> {
    let bridge = bridge();
    bridge.permission.set(false);

    let (_, body) = call(&bridge.app, "GET", "/permissions", None).await?;
    assert_eq!(body["granted"], false);

    let (status, body) = call(&bridge.app, "POST", "/recording/start", Some(json!({}))).await?;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "permission_denied");

    Ok(())
}

#[tokio::test]
async fn test_clear_chunks_reports_count() -> Result<()> {
    let bridge = bridge();

    call(&bridge.app, "POST", "/recording/start", Some(json!({ "chunkSeconds": 10 }))).await?;
    call(&bridge.app, "POST", "/recording/stop", None).await?;

    let (_, body) = call(&bridge.app, "GET", "/chunks/count", None).await?;
    assert_eq!(body["count"], 1);

    let (status, body) = call(&bridge.app, "DELETE", "/chunks", None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Deleted 1 chunk files");

    Ok(())
}

#[tokio::test]
async fn test_queries_and_preview() -> Result<()> {
    let bridge = bridge();

    let (_, body) = call(&bridge.app, "GET", "/available", None).await?;
    assert_eq!(body["available"], true);

    let (_, body) = call(&bridge.app, "GET", "/recording/chunk-index", None).await?;
    assert_eq!(body["chunkIndex"], 1);

    let (_, body) = call(&bridge.app, "GET", "/recording/chunk-duration", None).await?;
    assert_eq!(body["chunkDuration"], 30.0);

    let (_, body) = call(&bridge.app, "GET", "/recording/level", None).await?;
    assert_eq!(body["level"], 0.0);

    let (_, body) = call(&bridge.app, "GET", "/module-info", None).await?;
    assert_eq!(body["name"], "audio-chunk-recorder");
    assert_eq!(body["channelConfig"], "mono");

    let (status, _) = call(&bridge.app, "POST", "/preview/start", None).await?;
    assert_eq!(status, StatusCode::OK);
    let (_, state) = call(&bridge.app, "GET", "/recording/state", None).await?;
    assert_eq!(state["isPreviewActive"], true);

    let (status, _) = call(&bridge.app, "POST", "/preview/stop", None).await?;
    assert_eq!(status, StatusCode::OK);

    Ok(())
}

#[tokio::test]
async fn test_interruption_signal_accepted() -> Result<()> {
    let mut bridge = bridge();

    call(&bridge.app, "POST", "/recording/start", Some(json!({}))).await?;
    let (status, _) = call(
        &bridge.app,
        "POST",
        "/interruptions",
        Some(json!({ "type": "began", "reason": "phone_call" })),
    )
    .await?;
    assert_eq!(status, StatusCode::ACCEPTED);

    let (_, state) = call(&bridge.app, "GET", "/recording/state", None).await?;
    assert_eq!(state["isPaused"], true);

    let mut interruption = None;
    while let Ok(event) = bridge.events.try_recv() {
        if let RecorderEvent::Interruption(e) = event {
            interruption = Some(e);
        }
    }
    let interruption = interruption.expect("interruption event");
    assert_eq!(interruption.was_recording, Some(true));

    call(&bridge.app, "POST", "/recording/stop", None).await?;
    Ok(())
}
