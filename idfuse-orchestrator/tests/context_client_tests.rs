//! Context client against an in-process question-answering backend

mod helpers;

use helpers::{spawn_context_backend, FakeContext};
use idfuse_common::models::ServiceStatus;
use idfuse_orchestrator::context::{ContextBackend, HttpContextClient};
use std::time::Duration;

#[tokio::test]
async fn test_answer_with_citations() {
    let url = spawn_context_backend(FakeContext::Answer("Answer to:")).await;
    let client = HttpContextClient::new(url, Duration::from_secs(2)).unwrap();

    let report = client.ask("When does the library open?").await;

    assert_eq!(report.status, ServiceStatus::Ok);
    assert!(report.payload_size_bytes > 0);
    let answer = report.answer.unwrap();
    assert_eq!(answer.text, "Answer to: When does the library open?");
    assert_eq!(answer.citations.len(), 2);
    assert_eq!(answer.citations[0].doc, "Student Handbook");
    assert_eq!(answer.citations[0].page.as_deref(), Some("3"));
    assert_eq!(answer.citations[1].doc, "Unknown Document");
}

#[tokio::test]
async fn test_backend_failure_yields_no_answer() {
    let url = spawn_context_backend(FakeContext::Failure("index not loaded")).await;
    let client = HttpContextClient::new(url, Duration::from_secs(2)).unwrap();

    let report = client.ask("anything").await;

    assert!(report.answer.is_none());
    assert_eq!(report.status, ServiceStatus::Error);
    assert_eq!(report.error.as_deref(), Some("index not loaded"));
}

#[tokio::test]
async fn test_slow_backend_times_out() {
    let url = spawn_context_backend(FakeContext::Slow(Duration::from_secs(3))).await;
    let client = HttpContextClient::new(url, Duration::from_millis(200)).unwrap();

    let report = client.ask("anything").await;

    assert!(report.answer.is_none());
    assert_eq!(report.status, ServiceStatus::Timeout);
}

#[tokio::test]
async fn test_health_check() {
    let url = spawn_context_backend(FakeContext::Answer("ok")).await;
    let client = HttpContextClient::new(url, Duration::from_secs(2)).unwrap();
    assert!(client.health_check().await);

    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    let down = HttpContextClient::new(format!("http://127.0.0.1:{}", port), Duration::from_secs(2)).unwrap();
    assert!(!down.health_check().await);
}
