mod common;

use common::ScriptedBackend;
use eventsource_stream::Eventsource;
use futures::StreamExt;
use serde_json::{json, Value};
use slack_claude_gateway::{build_router, AccessGuard, AppState, GatewayConfig, SessionGateway, SharedLogger};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

struct TestServer {
    addr: SocketAddr,
    client: reqwest::Client,
    log_path: PathBuf,
    _log_dir: tempfile::TempDir,
}

impl TestServer {
    fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    fn journal(&self) -> String {
        std::fs::read_to_string(&self.log_path).unwrap()
    }
}

fn test_config() -> GatewayConfig {
    GatewayConfig {
        port: 0,
        reset_prompt: "forget the above conversation".to_string(),
        ..GatewayConfig::default()
    }
}

async fn spawn(backend: ScriptedBackend, secret: Option<&str>) -> TestServer {
    spawn_with_config(backend, secret, test_config()).await
}

async fn spawn_with_config(
    backend: ScriptedBackend,
    secret: Option<&str>,
    config: GatewayConfig,
) -> TestServer {
    let log_dir = tempfile::tempdir().unwrap();
    let log_path = log_dir.path().join("gateway.log");
    let logger = SharedLogger::new(&log_path).unwrap();

    let state = Arc::new(AppState {
        config,
        gateway: SessionGateway::new(Arc::new(backend)),
        guard: AccessGuard::new(secret.map(String::from)),
        logger,
    });

    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    TestServer {
        addr,
        client: reqwest::Client::new(),
        log_path,
        _log_dir: log_dir,
    }
}

fn chat_body(stream: bool) -> Value {
    json!({
        "model": "gpt-3.5-turbo",
        "messages": [
            {"role": "system", "content": "be brief"},
            {"role": "user", "content": "hi"}
        ],
        "temperature": 0.7,
        "stream": stream
    })
}

fn data_frames(body: &str) -> Vec<&str> {
    body.split_terminator("\n\n")
        .map(|frame| frame.strip_prefix("data: ").expect("every frame is a data line"))
        .collect()
}

// ────────────────────────────────────────────────────────────────
// /v1/complete
// ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_complete_non_streaming() {
    let backend = ScriptedBackend::new(["hi"]);
    let server = spawn(backend.clone(), None).await;

    let resp = server
        .client
        .post(server.url("/v1/complete"))
        .json(&json!({"prompt": "\n\nHuman: hello\n\nAssistant:", "stream": false}))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(
        body,
        json!({"completion": "hi", "stop_reason": "stop_sequence", "model": "claude-2"})
    );
    assert_eq!(backend.prompts(), vec!["hello"]);
}

#[tokio::test]
async fn test_complete_streaming_events() {
    let backend = ScriptedBackend::new(["你好", "，", "world"]);
    let server = spawn(backend, None).await;

    let resp = server
        .client
        .post(server.url("/v1/complete"))
        .json(&json!({"prompt": "\n\nHuman: greet me\n\nAssistant:", "stream": true}))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 200);
    assert!(resp.headers()["content-type"]
        .to_str()
        .unwrap()
        .starts_with("text/event-stream"));

    let events: Vec<_> = resp
        .bytes_stream()
        .eventsource()
        .map(|e| e.unwrap())
        .collect()
        .await;

    assert_eq!(events.len(), 3);
    let completions: Vec<String> = events
        .iter()
        .map(|e| {
            assert_eq!(e.event, "completion");
            assert!(!e.data.contains("\\u"), "non-ASCII must not be escaped");
            let data: Value = serde_json::from_str(&e.data).unwrap();
            assert!(data["stop_reason"].is_null());
            assert_eq!(data["model"], "claude-2.0");
            data["completion"].as_str().unwrap().to_string()
        })
        .collect();
    assert_eq!(completions, vec!["你好", "，", "world"]);
}

#[tokio::test]
async fn test_complete_stream_sends_keep_alive_pings() {
    let config = GatewayConfig {
        keep_alive_secs: 1,
        ..test_config()
    };
    let server = spawn_with_config(ScriptedBackend::new(["thinking"]).stalling(), None, config).await;

    let resp = server
        .client
        .post(server.url("/v1/complete"))
        .json(&json!({"prompt": "hello", "stream": true}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let mut body = resp.bytes_stream();
    let mut received = String::new();
    let read = tokio::time::timeout(Duration::from_secs(5), async {
        while let Some(chunk) = body.next().await {
            received.push_str(&String::from_utf8_lossy(&chunk.unwrap()));
            if received.contains(": ping\n\n") {
                break;
            }
        }
    })
    .await;
    assert!(read.is_ok(), "no keep-alive within 5s, got {received:?}");

    let event_at = received.find("event: completion\n").unwrap();
    let ping_at = received.find(": ping\n\n").unwrap();
    assert!(event_at < ping_at);
}

// ────────────────────────────────────────────────────────────────
// /v1/chat/completions
// ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_chat_non_streaming() {
    let backend = ScriptedBackend::new(["Hello ", "there"]);
    let server = spawn(backend.clone(), None).await;

    let resp = server
        .client
        .post(server.url("/v1/chat/completions"))
        .json(&chat_body(false))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["object"], "chat.completion");
    assert_eq!(body["usage"]["total_tokens"], 425);
    assert_eq!(body["choices"][0]["message"]["content"], "Hello there");
    assert_eq!(body["choices"][0]["finish_reason"], "stop");
    assert!(body["choices"][0]["delta"].is_null());

    assert_eq!(backend.prompts(), vec!["system: be brief\n\nuser: hi"]);
}

#[tokio::test]
async fn test_chat_streaming_order() {
    let server = spawn(ScriptedBackend::new(["He", "llo"]), None).await;

    let resp = server
        .client
        .post(server.url("/v1/chat/completions"))
        .json(&chat_body(true))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 200);
    assert_eq!(resp.headers()["content-type"], "text/event-stream");

    let body = resp.text().await.unwrap();
    assert!(body.ends_with("data: [DONE]\n\n"));

    let frames = data_frames(&body);
    assert_eq!(frames.len(), 5);

    let chunks: Vec<Value> = frames[..4]
        .iter()
        .map(|f| serde_json::from_str(f).unwrap())
        .collect();
    assert!(chunks.iter().all(|c| c["object"] == "chat.completion.chunk"));
    assert_eq!(
        chunks[0]["choices"][0]["delta"],
        json!({"role": "assistant", "content": ""})
    );
    assert_eq!(chunks[1]["choices"][0]["delta"], json!({"content": "He"}));
    assert_eq!(chunks[2]["choices"][0]["delta"], json!({"content": "llo"}));
    assert_eq!(chunks[3]["choices"][0]["delta"], json!({}));
    assert_eq!(chunks[3]["choices"][0]["finish_reason"], "stop");
    assert_eq!(frames[4], "[DONE]");
}

#[tokio::test]
async fn test_chat_streaming_without_fragments() {
    let server = spawn(ScriptedBackend::new(Vec::<String>::new()), None).await;

    let body = server
        .client
        .post(server.url("/v1/chat/completions"))
        .json(&chat_body(true))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();

    let frames = data_frames(&body);
    assert_eq!(frames.len(), 3);
    assert_eq!(frames[2], "[DONE]");
}

#[tokio::test]
async fn test_chat_streaming_mid_stream_failure_omits_done() {
    let backend = ScriptedBackend::new(["a", "b"]).failing_after(1);
    let server = spawn(backend, None).await;

    let body = server
        .client
        .post(server.url("/v1/chat/completions"))
        .json(&chat_body(true))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();

    let frames = data_frames(&body);
    assert_eq!(frames.len(), 2);
    assert!(!body.contains("[DONE]"));
}

#[tokio::test]
async fn test_chat_validation_error() {
    let backend = ScriptedBackend::new(["unused"]);
    let server = spawn(backend.clone(), None).await;

    let resp = server
        .client
        .post(server.url("/v1/chat/completions"))
        .json(&json!({"messages": [], "temperature": 1.0}))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 422);
    let body: Value = resp.json().await.unwrap();
    assert!(body["detail"][0]["msg"].as_str().unwrap().contains("model"));
    assert_eq!(backend.open_count(), 0);
}

#[tokio::test]
async fn test_chat_null_role_and_content() {
    let backend = ScriptedBackend::new(["ok"]);
    let server = spawn(backend.clone(), None).await;

    let resp = server
        .client
        .post(server.url("/v1/chat/completions"))
        .json(&json!({
            "model": "m",
            "messages": [{"role": null, "content": "x"}, {"role": "user"}],
            "temperature": 0.0,
            "stream": null
        }))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 200);
    assert_eq!(backend.prompts(), vec!["Unknown: x\n\nuser: "]);
}

// ────────────────────────────────────────────────────────────────
// /claude/reset, auth, backend failures
// ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_reset_sends_configured_prompt() {
    let backend = ScriptedBackend::new(["Okay, forgotten."]);
    let server = spawn(backend.clone(), None).await;

    let resp = server
        .client
        .post(server.url("/claude/reset"))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body, json!({"claude": "Okay, forgotten."}));
    assert_eq!(backend.prompts(), vec!["forget the above conversation"]);
}

#[tokio::test]
async fn test_reset_send_failure_is_journaled() {
    let server = spawn(ScriptedBackend::failing_send(), None).await;

    let resp = server
        .client
        .post(server.url("/claude/reset"))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 502);
    let journal = server.journal();
    let entry = journal
        .lines()
        .map(|line| serde_json::from_str::<Value>(line).unwrap())
        .find(|entry| entry["message"].as_str().unwrap().starts_with("Send failed"))
        .expect("send failure in journal");
    assert_eq!(entry["level"], "error");
    assert_eq!(entry["component"], "gateway");
    assert!(entry["request_id"].is_string());
}

#[tokio::test]
async fn test_unauthorized_never_reaches_backend() {
    let backend = ScriptedBackend::new(["secret reply"]);
    let server = spawn(backend.clone(), Some("s3cret")).await;

    for token in [None, Some("wrong")] {
        for path in ["/v1/complete", "/v1/chat/completions", "/claude/reset"] {
            let mut req = server
                .client
                .post(server.url(path))
                .json(&json!({"prompt": "hi"}));
            if let Some(token) = token {
                req = req.header("x-token", token);
            }
            let resp = req.send().await.unwrap();

            assert_eq!(resp.status(), 401, "{path} with token {token:?}");
            let body: Value = resp.json().await.unwrap();
            assert_eq!(body, json!({"detail": {"msg": "must token"}}));
        }
    }

    assert_eq!(backend.open_count(), 0);
}

#[tokio::test]
async fn test_authorized_request_passes() {
    let backend = ScriptedBackend::new(["hi"]);
    let server = spawn(backend.clone(), Some("s3cret")).await;

    let resp = server
        .client
        .post(server.url("/v1/complete"))
        .header("x-token", "s3cret")
        .json(&json!({"prompt": "hello"}))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 200);
    assert_eq!(backend.open_count(), 1);
}

#[tokio::test]
async fn test_backend_failure_is_bad_gateway() {
    let server = spawn(ScriptedBackend::failing_open(), None).await;

    let resp = server
        .client
        .post(server.url("/v1/complete"))
        .json(&json!({"prompt": "hello", "stream": true}))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 502);
    let body: Value = resp.json().await.unwrap();
    assert!(body["detail"]["msg"]
        .as_str()
        .unwrap()
        .starts_with("Backend unavailable"));
}
