//! End-to-end smoke tests against a real bound listener, the way the
//! teacher's `tests/e2e` suite drove its WebSocket server: boot a real
//! `Orchestrator` against a tempdir store, serve on an OS-assigned port,
//! and make real HTTP calls.

use agent_core::orchestrator::Orchestrator;
use config::Settings;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

async fn boot_test_server() -> (String, String, CancellationToken, tokio::task::JoinHandle<()>) {
    let dir = tempfile::tempdir().unwrap();
    let mut settings = Settings {
        project_dir: dir.path().to_path_buf(),
        ..Settings::default()
    };
    settings.indexing.enabled = false;
    settings.tools.enabled_categories = ["basic", "task_management"]
        .into_iter()
        .map(String::from)
        .collect();

    let (orchestrator, admin_token) = Orchestrator::boot(&settings).await.unwrap();
    let admin_token = admin_token.expect("first boot mints an admin token");
    let orchestrator = Arc::new(orchestrator);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let base_url = format!("http://{addr}");

    let cancel = CancellationToken::new();
    let serve_cancel = cancel.clone();
    let handle = tokio::spawn(async move {
        transport::serve_on_listener(orchestrator, &settings, listener, serve_cancel)
            .await
            .unwrap();
    });

    // Give the listener a moment to start accepting.
    tokio::time::sleep(Duration::from_millis(50)).await;
    (base_url, admin_token, cancel, handle)
}

#[tokio::test]
async fn health_reports_enabled_categories_and_tool_count() {
    let (base_url, _token, cancel, handle) = boot_test_server().await;
    let client = reqwest::Client::new();

    let resp = client
        .get(format!("{base_url}/health"))
        .send()
        .await
        .unwrap();
    assert!(resp.status().is_success());
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "ok");
    assert!(body["tool_count"].as_u64().unwrap() > 0);
    let categories = body["enabled_categories"].as_array().unwrap();
    assert!(categories.iter().any(|c| c == "basic"));

    cancel.cancel();
    let _ = handle.await;
}

#[tokio::test]
async fn mcp_requires_bearer_token() {
    let (base_url, _token, cancel, handle) = boot_test_server().await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{base_url}/mcp"))
        .json(&serde_json::json!({"id": 1, "method": "initialize", "params": {}}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::UNAUTHORIZED);

    cancel.cancel();
    let _ = handle.await;
}

#[tokio::test]
async fn initialize_then_tool_call_round_trips_through_a_session() {
    let (base_url, token, cancel, handle) = boot_test_server().await;
    let client = reqwest::Client::new();

    let init_resp = client
        .post(format!("{base_url}/mcp"))
        .bearer_auth(&token)
        .json(&serde_json::json!({"id": 1, "method": "initialize", "params": {}}))
        .send()
        .await
        .unwrap();
    assert!(init_resp.status().is_success());
    let session_id = init_resp
        .headers()
        .get("mcp-session-id")
        .expect("initialize sets the session header")
        .to_str()
        .unwrap()
        .to_string();

    let call_resp = client
        .post(format!("{base_url}/mcp"))
        .bearer_auth(&token)
        .header("mcp-session-id", &session_id)
        .json(&serde_json::json!({
            "id": 2,
            "method": "tools/list",
            "params": {},
        }))
        .send()
        .await
        .unwrap();
    assert!(call_resp.status().is_success());
    let body: serde_json::Value = call_resp.json().await.unwrap();
    assert!(body["result"]["tools"].as_array().unwrap().len() > 0);

    cancel.cancel();
    let _ = handle.await;
}

#[tokio::test]
async fn post_message_without_a_known_session_is_rejected() {
    let (base_url, token, cancel, handle) = boot_test_server().await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{base_url}/mcp"))
        .bearer_auth(&token)
        .header("mcp-session-id", "does-not-exist")
        .json(&serde_json::json!({"id": 1, "method": "tools/list", "params": {}}))
        .send()
        .await
        .unwrap();
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "not_found");

    cancel.cancel();
    let _ = handle.await;
}
