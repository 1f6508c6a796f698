#![cfg(unix)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use reqwest::StatusCode;
use serde_json::json;
use tempfile::TempDir;

use kiln::config::ServerConfig;
use kiln::runner::RunnerConfig;
use kiln::server::{self, AppState, RunResponse};

struct TestServer {
    base: String,
    staging: TempDir,
    client: reqwest::Client,
}

impl TestServer {
    async fn start(tool: &str, runner: RunnerConfig, max_source_bytes: usize) -> Self {
        let staging = tempfile::tempdir().unwrap();
        let config = ServerConfig {
            addr: "127.0.0.1:0".parse().unwrap(),
            tool: PathBuf::from(tool),
            staging_dir: staging.path().to_path_buf(),
            max_source_bytes,
            runner,
            ..ServerConfig::default()
        };

        let state = Arc::new(AppState::build(&config).await.unwrap());
        let listener = tokio::net::TcpListener::bind(config.addr).await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(server::serve(listener, state, std::future::pending()));

        Self {
            base: format!("http://{addr}"),
            staging,
            client: reqwest::Client::new(),
        }
    }

    async fn with_tool(tool: &str) -> Self {
        Self::start(tool, RunnerConfig::default(), 64 * 1024).await
    }

    async fn post_run(&self, body: serde_json::Value) -> reqwest::Response {
        self.client
            .post(format!("{}/run", self.base))
            .json(&body)
            .send()
            .await
            .unwrap()
    }

    fn staged_count(&self) -> usize {
        std::fs::read_dir(self.staging.path()).unwrap().count()
    }
}

#[tokio::test]
async fn index_serves_page_with_example() {
    let server = TestServer::with_tool("/bin/cat").await;

    let resp = reqwest::get(format!("{}/", server.base)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(
        resp.headers()["content-type"]
            .to_str()
            .unwrap()
            .starts_with("text/html")
    );

    let page = resp.text().await.unwrap();
    assert!(page.contains("<textarea"));
    assert!(page.contains("while (x &lt; 3) {"));
    assert!(page.contains("submit('ir')"));
}

#[tokio::test]
async fn health_is_ok() {
    let server = TestServer::with_tool("/bin/cat").await;

    let resp = reqwest::get(format!("{}/health", server.base)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.text().await.unwrap(), "ok");
}

#[tokio::test]
async fn run_returns_tool_output() {
    let server = TestServer::with_tool("/bin/cat").await;

    let program = "fn main() { 1 + 1; }";
    let resp = server.post_run(json!({ "src": program, "mode": "run" })).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let body: RunResponse = resp.json().await.unwrap();
    assert_eq!(body.stdout, program);
    assert_eq!(body.stderr, "");
    assert_eq!(body.exit_code, Some(0));
    assert!(!body.timed_out);
    assert_eq!(server.staged_count(), 0);
}

#[tokio::test]
async fn empty_source_is_valid() {
    let server = TestServer::with_tool("/bin/cat").await;

    let resp = server.post_run(json!({ "src": "", "mode": "run" })).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: RunResponse = resp.json().await.unwrap();
    assert_eq!(body.stdout, "");
}

#[tokio::test]
async fn malformed_json_is_bad_request() {
    let server = TestServer::with_tool("/bin/cat").await;

    let resp = server
        .client
        .post(format!("{}/run", server.base))
        .header("content-type", "application/json")
        .body("{\"src\": ")
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert!(
        resp.headers()["content-type"]
            .to_str()
            .unwrap()
            .starts_with("text/plain")
    );
    assert!(resp.text().await.unwrap().contains("EOF"));
    assert_eq!(server.staged_count(), 0);
}

#[tokio::test]
async fn unknown_mode_is_bad_request() {
    let server = TestServer::with_tool("/bin/cat").await;

    let resp = server.post_run(json!({ "src": "x", "mode": "jit" })).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert!(resp.text().await.unwrap().contains("unknown variant"));
}

#[tokio::test]
async fn missing_mode_defaults_to_run() {
    let server = TestServer::with_tool("/bin/cat").await;

    let resp = server.post_run(json!({ "src": "abc" })).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: RunResponse = resp.json().await.unwrap();
    assert_eq!(body.stdout, "abc");
}

#[tokio::test]
async fn missing_tool_is_server_error_every_time() {
    let server = TestServer::with_tool("/nonexistent/kiln/core").await;

    for _ in 0..3 {
        let resp = server.post_run(json!({ "src": "fn main() {}", "mode": "run" })).await;
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let text = resp.text().await.unwrap();
        assert!(text.contains("/nonexistent/kiln/core"), "{text}");
    }

    // Still serving.
    let resp = reqwest::get(format!("{}/health", server.base)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(server.staged_count(), 0);
}

#[tokio::test]
async fn oversized_source_is_rejected() {
    let server = TestServer::start("/bin/cat", RunnerConfig::default(), 16).await;

    let resp = server.post_run(json!({ "src": "x".repeat(17), "mode": "run" })).await;
    assert_eq!(resp.status(), StatusCode::PAYLOAD_TOO_LARGE);

    let resp = server.post_run(json!({ "src": "x".repeat(16), "mode": "run" })).await;
    assert_eq!(resp.status(), StatusCode::OK);
}

#[tokio::test]
async fn timeout_is_reported_in_response() {
    let server = TestServer::start(
        "/bin/sh",
        RunnerConfig {
            timeout: Duration::from_millis(300),
            ..RunnerConfig::default()
        },
        64 * 1024,
    )
    .await;

    let resp = server.post_run(json!({ "src": "exec sleep 30", "mode": "run" })).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let body: RunResponse = resp.json().await.unwrap();
    assert!(body.timed_out);
    assert_eq!(body.exit_code, None);
    assert!(body.stderr.contains("timed out"));
    assert_eq!(server.staged_count(), 0);
}

#[tokio::test]
async fn tool_failure_is_a_normal_response() {
    let server = TestServer::with_tool("/bin/sh").await;

    let resp = server
        .post_run(json!({ "src": "echo 'Parser error' >&2; exit 1", "mode": "run" }))
        .await;
    assert_eq!(resp.status(), StatusCode::OK);

    let body: RunResponse = resp.json().await.unwrap();
    assert_eq!(body.stdout, "");
    assert_eq!(body.stderr, "Parser error\nprocess exited with code 1");
    assert_eq!(body.exit_code, Some(1));
}

#[tokio::test]
async fn concurrent_requests_are_isolated() {
    let server = TestServer::with_tool("/bin/cat").await;

    let sources: Vec<String> = (0..16)
        .map(|i| format!("fn main() {{ {i} + {i}; }}"))
        .collect();
    let requests = sources
        .iter()
        .map(|src| server.post_run(json!({ "src": src, "mode": "run" })));
    let responses = futures::future::join_all(requests).await;

    for (source, resp) in sources.iter().zip(responses) {
        assert_eq!(resp.status(), StatusCode::OK);
        let body: RunResponse = resp.json().await.unwrap();
        assert_eq!(&body.stdout, source);
    }
    assert_eq!(server.staged_count(), 0);
}
