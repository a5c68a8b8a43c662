use mindmeld_chat::config::ClientConfig;
use mindmeld_chat::transport::{ChatTransport, HttpTransport, NO_RESPONSE_REPLY};
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn transport(server: &MockServer) -> HttpTransport {
    let config = ClientConfig {
        endpoint: format!("{}/chat", server.uri()),
        ..ClientConfig::default()
    };
    HttpTransport::new(&config).unwrap()
}

#[tokio::test]
async fn test_reply_is_returned() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat"))
        .and(header("content-type", "application/json"))
        .and(body_json(json!({"message": "hi"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"reply": "Hello"})))
        .expect(1)
        .mount(&server)
        .await;

    let reply = transport(&server).post_message("hi").await.unwrap();
    assert_eq!(reply, "Hello");
}

#[tokio::test]
async fn test_missing_reply_falls_back() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"answer": "Hello"})))
        .mount(&server)
        .await;

    let reply = transport(&server).post_message("hi").await.unwrap();
    assert_eq!(reply, NO_RESPONSE_REPLY);
}

#[tokio::test]
async fn test_empty_reply_falls_back() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"reply": ""})))
        .mount(&server)
        .await;

    let reply = transport(&server).post_message("hi").await.unwrap();
    assert_eq!(reply, NO_RESPONSE_REPLY);
}

#[tokio::test]
async fn test_error_status_body_is_shown() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(500).set_body_json(json!({"reply": "⚠️ Server error: boom"})),
        )
        .mount(&server)
        .await;

    let reply = transport(&server).post_message("hi").await.unwrap();
    assert_eq!(reply, "⚠️ Server error: boom");
}

#[tokio::test]
async fn test_non_json_body_is_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(502).set_body_string("<html>Bad Gateway</html>"))
        .mount(&server)
        .await;

    assert!(transport(&server).post_message("hi").await.is_err());
}

#[tokio::test]
async fn test_unreachable_server_is_an_error() {
    let server = MockServer::start().await;
    let transport = transport(&server);
    drop(server);

    assert!(transport.post_message("hi").await.is_err());
}

#[tokio::test]
async fn test_request_options_are_sent_when_configured() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_json(json!({
            "message": "hi",
            "model": "llama3",
            "temperature": 0.5
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"reply": "ok"})))
        .expect(1)
        .mount(&server)
        .await;

    let config = ClientConfig {
        endpoint: format!("{}/chat", server.uri()),
        model: Some("llama3".to_string()),
        temperature: Some(0.5),
        timeout_ms: Some(5_000),
    };
    let transport = HttpTransport::new(&config).unwrap();
    assert_eq!(transport.post_message("hi").await.unwrap(), "ok");
}
