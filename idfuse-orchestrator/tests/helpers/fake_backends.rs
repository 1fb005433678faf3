//! In-process stand-ins for verification and context backends
//!
//! Each helper binds an axum server on 127.0.0.1:0 and returns its URL.
//! Servers live until the test runtime shuts down.

use axum::{
    extract::{Multipart, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::time::Duration;

/// Serve `router` on an ephemeral local port
pub async fn spawn_server(router: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}

/// Scripted verification backend behaviour
#[derive(Clone)]
pub enum FakeVerifier {
    /// 200 with this JSON body
    Json(Value),
    /// 200 with one candidate describing the received upload:
    /// label `"<filename>:<bytes>:<content type>"`, score 0.5
    Echo,
    /// Bare status code with an empty body
    Status(u16),
    /// 200 with a body that is not JSON
    Garbage,
    /// Answer with `Json` after a delay
    Slow(Duration, Value),
}

async fn verify(State(behaviour): State<FakeVerifier>, mut multipart: Multipart) -> Response {
    let mut echo = None;
    while let Ok(Some(field)) = multipart.next_field().await {
        if field.name() == Some("image") {
            let filename = field.file_name().unwrap_or("-").to_string();
            let content_type = field.content_type().unwrap_or("-").to_string();
            let size = field.bytes().await.map(|b| b.len()).unwrap_or(0);
            echo = Some(format!("{}:{}:{}", filename, size, content_type));
        }
    }

    match behaviour {
        FakeVerifier::Json(body) => Json(body).into_response(),
        FakeVerifier::Echo => Json(json!([{
            "label": echo.unwrap_or_else(|| "no-image".to_string()),
            "score": 0.5
        }]))
        .into_response(),
        FakeVerifier::Status(code) => StatusCode::from_u16(code)
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
            .into_response(),
        FakeVerifier::Garbage => (StatusCode::OK, "<html>not json</html>").into_response(),
        FakeVerifier::Slow(delay, body) => {
            tokio::time::sleep(delay).await;
            Json(body).into_response()
        }
    }
}

/// Start a verification backend; returns its `/verify` URL
pub async fn spawn_verification_backend(behaviour: FakeVerifier) -> String {
    let router = Router::new()
        .route("/verify", post(verify))
        .with_state(behaviour);
    let addr = spawn_server(router).await;
    format!("http://{}/verify", addr)
}

/// Scripted context backend behaviour
#[derive(Clone)]
pub enum FakeContext {
    /// Answer `"<prefix> <message>"` with one citation
    Answer(&'static str),
    /// `success: false` with this error
    Failure(&'static str),
    /// Never answers in time
    Slow(Duration),
}

async fn chat(State(behaviour): State<FakeContext>, Json(request): Json<Value>) -> Response {
    let message = request["message"].as_str().unwrap_or_default().to_string();

    match behaviour {
        FakeContext::Answer(prefix) => Json(json!({
            "success": true,
            "result": {
                "answer": format!("{} {}", prefix, message),
                "sources": [
                    {"title": "Student Handbook", "page": 3, "score": 0.91},
                    {"page": "iv"}
                ],
                "provider": request["provider"],
                "k": request["k"]
            }
        }))
        .into_response(),
        FakeContext::Failure(error) => Json(json!({"success": false, "error": error})).into_response(),
        FakeContext::Slow(delay) => {
            tokio::time::sleep(delay).await;
            Json(json!({"success": true, "result": {"answer": "too late", "sources": []}})).into_response()
        }
    }
}

async fn health() -> Json<Value> {
    Json(json!({"status": "ok"}))
}

/// Start a context backend; returns its base URL
pub async fn spawn_context_backend(behaviour: FakeContext) -> String {
    let router = Router::new()
        .route("/api/chat", post(chat))
        .route("/health", get(health))
        .with_state(behaviour);
    let addr = spawn_server(router).await;
    format!("http://{}", addr)
}
