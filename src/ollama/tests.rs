use super::*;
use crate::config::OllamaConfig;

#[test]
fn client_configuration() {
    let config = OllamaConfig {
        host: "test-host".to_string(),
        port: 1234,
        embedding_model: "test-embed".to_string(),
        chat_model: "test-chat".to_string(),
        batch_size: 128,
    };
    let client = OllamaClient::new(&config).expect("Failed to create client");

    assert_eq!(client.embedding_model, "test-embed");
    assert_eq!(client.chat_model, "test-chat");
    assert_eq!(client.batch_size, 128);
    assert_eq!(client.base_url.host_str(), Some("test-host"));
    assert_eq!(client.base_url.port(), Some(1234));
    assert_eq!(client.retry_attempts, DEFAULT_RETRY_ATTEMPTS);
}

#[test]
fn client_builder_methods() {
    let config = OllamaConfig::default();
    let client = OllamaClient::new(&config)
        .expect("Failed to create client")
        .with_timeout(Duration::from_secs(60))
        .with_retry_attempts(5);

    assert_eq!(client.retry_attempts, 5);
}

#[test]
fn chat_request_serialization() {
    let request = ChatRequest {
        model: "test-chat".to_string(),
        messages: vec![
            ChatMessage {
                role: "system".to_string(),
                content: "be brief".to_string(),
            },
            ChatMessage {
                role: "user".to_string(),
                content: "hello".to_string(),
            },
        ],
        stream: false,
    };

    let json = serde_json::to_string(&request).expect("should serialize");
    assert!(json.contains("\"stream\":false"));
    assert!(json.contains("\"role\":\"system\""));

    let response: ChatResponse = serde_json::from_str(
        r#"{"model":"test-chat","message":{"role":"assistant","content":"hi"},"done":true}"#,
    )
    .expect("should parse");
    assert_eq!(response.message.content, "hi");
}

#[test]
fn embed_response_parsing() {
    let response: EmbedResponse =
        serde_json::from_str(r#"{"model":"test-embed","embeddings":[[0.1,0.2],[0.3,0.4]]}"#)
            .expect("should parse");
    assert_eq!(response.embeddings.len(), 2);
    assert_eq!(response.embeddings[0].len(), 2);
}
