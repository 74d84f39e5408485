use super::agent_harness::{self, RecordingLauncher};
use serde_json::{Value, json};
use tempfile::TempDir;

const URI: &str = "jhaXp:Instance=6944Production&Msg=<StartCallLink/>";

#[tokio::test]
async fn post_opens_uri_and_reports_success() {
    let temp = TempDir::new().unwrap();
    let launcher = RecordingLauncher::new();
    let agent = agent_harness::start_agent(temp.path(), launcher.clone(), None, false).await;

    let response = reqwest::Client::new()
        .post(agent_harness::http_url(&agent, "/"))
        .json(&json!({ "uri": URI, "phoneNumber": "3365551234" }))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    assert_eq!(
        response
            .headers()
            .get("access-control-allow-origin")
            .unwrap(),
        "*"
    );
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["status"], "success");
    assert_eq!(body["message"], "Screen pop triggered");
    let timestamp = body["timestamp"].as_str().unwrap();
    assert!(chrono::DateTime::parse_from_rfc3339(timestamp).is_ok());
    assert_eq!(launcher.opened(), vec![URI.to_string()]);

    agent.shutdown().await;
}

#[tokio::test]
async fn any_path_is_accepted() {
    let temp = TempDir::new().unwrap();
    let launcher = RecordingLauncher::new();
    let agent = agent_harness::start_agent(temp.path(), launcher.clone(), None, false).await;

    let response = reqwest::Client::new()
        .post(agent_harness::http_url(&agent, "/screenpop/deep/path"))
        .json(&json!({ "uri": URI }))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    assert_eq!(launcher.opened().len(), 1);

    agent.shutdown().await;
}

#[tokio::test]
async fn missing_uri_is_rejected_without_invoking_handler() {
    let temp = TempDir::new().unwrap();
    let launcher = RecordingLauncher::new();
    let agent = agent_harness::start_agent(temp.path(), launcher.clone(), None, false).await;

    let response = reqwest::Client::new()
        .post(agent_harness::http_url(&agent, "/"))
        .json(&json!({ "phoneNumber": "3365551234" }))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 400);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body, json!({ "status": "error", "message": "No URI provided" }));
    assert!(launcher.opened().is_empty());

    agent.shutdown().await;
}

#[tokio::test]
async fn malformed_json_is_rejected() {
    let temp = TempDir::new().unwrap();
    let launcher = RecordingLauncher::new();
    let agent = agent_harness::start_agent(temp.path(), launcher.clone(), None, false).await;

    let response = reqwest::Client::new()
        .post(agent_harness::http_url(&agent, "/"))
        .header("content-type", "application/json")
        .body("{uri:")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 400);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["status"], "error");
    assert_eq!(body["message"], "Invalid JSON body");
    assert!(launcher.opened().is_empty());

    agent.shutdown().await;
}

#[tokio::test]
async fn handler_failure_surfaces_as_server_error() {
    let temp = TempDir::new().unwrap();
    let launcher = RecordingLauncher::failing("no handler registered for jhaXp");
    let agent = agent_harness::start_agent(temp.path(), launcher.clone(), None, false).await;

    let response = reqwest::Client::new()
        .post(agent_harness::http_url(&agent, "/"))
        .json(&json!({ "uri": URI }))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 500);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["status"], "error");
    assert!(
        body["message"]
            .as_str()
            .unwrap()
            .contains("no handler registered")
    );

    agent.shutdown().await;
}

#[tokio::test]
async fn preflight_returns_cors_headers_and_empty_body() {
    let temp = TempDir::new().unwrap();
    let launcher = RecordingLauncher::new();
    let agent = agent_harness::start_agent(temp.path(), launcher.clone(), None, false).await;

    let response = reqwest::Client::new()
        .request(reqwest::Method::OPTIONS, agent_harness::http_url(&agent, "/"))
        .header("origin", "https://app.example.com")
        .header("access-control-request-method", "POST")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    let headers = response.headers().clone();
    assert_eq!(headers.get("access-control-allow-origin").unwrap(), "*");
    assert_eq!(
        headers.get("access-control-allow-methods").unwrap(),
        "POST, OPTIONS"
    );
    assert_eq!(
        headers.get("access-control-allow-headers").unwrap(),
        "Content-Type"
    );
    assert!(response.bytes().await.unwrap().is_empty());
    assert!(launcher.opened().is_empty());

    agent.shutdown().await;
}

#[tokio::test]
async fn other_methods_are_not_allowed() {
    let temp = TempDir::new().unwrap();
    let launcher = RecordingLauncher::new();
    let agent = agent_harness::start_agent(temp.path(), launcher.clone(), None, false).await;

    let response = reqwest::Client::new()
        .get(agent_harness::http_url(&agent, "/"))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 405);
    assert_eq!(
        response
            .headers()
            .get("access-control-allow-origin")
            .unwrap(),
        "*"
    );
    let body: Value = response.json().await.unwrap();
    assert_eq!(body, json!({ "error": "Method not allowed. Use POST." }));

    agent.shutdown().await;
}

#[tokio::test]
async fn activity_log_records_request_lifecycle() {
    let temp = TempDir::new().unwrap();
    let launcher = RecordingLauncher::new();
    let agent = agent_harness::start_agent(temp.path(), launcher, None, false).await;

    reqwest::Client::new()
        .post(agent_harness::http_url(&agent, "/"))
        .json(&json!({ "uri": URI }))
        .send()
        .await
        .unwrap();
    agent.shutdown().await;

    let log = agent_harness::activity_log(temp.path());
    assert!(log.contains("=== Screen Pop Agent Started ==="));
    assert!(log.contains("POST /"));
    assert!(log.contains(&format!("Opening URI: {URI}")));
    assert!(log.contains("Screen pop triggered successfully"));
    assert!(log.contains("Server stopped"));
    assert!(log.lines().all(|line| line.starts_with('[')));
}

#[tokio::test]
async fn shutdown_releases_the_port() {
    let temp = TempDir::new().unwrap();
    let agent =
        agent_harness::start_agent(temp.path(), RecordingLauncher::new(), None, false).await;
    let addr = agent.http_addr().unwrap();

    agent.shutdown().await;

    assert!(tokio::net::TcpStream::connect(addr).await.is_err());
}

#[tokio::test]
async fn oversized_body_is_rejected_with_cors_and_logged() {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    let temp = TempDir::new().unwrap();
    let launcher = RecordingLauncher::new();
    let agent = agent_harness::start_agent(temp.path(), launcher.clone(), None, false).await;

    // The declared length alone trips the limit; no body bytes are sent.
    let mut stream = tokio::net::TcpStream::connect(agent.http_addr().unwrap())
        .await
        .unwrap();
    stream
        .write_all(
            b"POST /big HTTP/1.1\r\nHost: localhost\r\nContent-Type: application/json\r\n\
              Content-Length: 1000000\r\nConnection: close\r\n\r\n",
        )
        .await
        .unwrap();

    let mut head = Vec::new();
    let mut chunk = [0u8; 1024];
    tokio::time::timeout(std::time::Duration::from_secs(5), async {
        while !head.windows(4).any(|w| w == b"\r\n\r\n") {
            let read = stream.read(&mut chunk).await.unwrap();
            if read == 0 {
                break;
            }
            head.extend_from_slice(&chunk[..read]);
        }
    })
    .await
    .unwrap();
    let head = String::from_utf8_lossy(&head).to_ascii_lowercase();

    assert!(head.starts_with("http/1.1 413"), "{head}");
    assert!(head.contains("access-control-allow-origin: *"), "{head}");
    assert!(launcher.opened().is_empty());

    agent.shutdown().await;
    let log = agent_harness::activity_log(temp.path());
    assert!(log.contains("Error: POST /big rejected with 413"));
}
