use iluto_rs::client::{CompletionSource, SourceError};
use iluto_rs::upstream::{ChatMessage, ChatRequest, Role};
use iluto_rs::{
    ChatCompletion, Gateway, GatewayConfig, GatewayRequest, GatewayResponse, GroqClient,
    IngredientList, RecipeService, RemoteGateway, Shape, UpstreamError,
};
use reqwest::{Method, StatusCode};
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const COMPLETIONS: &str = "/openai/v1/chat/completions";

fn chat_request() -> ChatRequest {
    ChatRequest {
        messages: vec![
            ChatMessage {
                role: Role::System,
                content: "system".into(),
            },
            ChatMessage {
                role: Role::User,
                content: "eggs".into(),
            },
        ],
        model: "llama-3.3-70b-versatile".into(),
        temperature: 0.8,
        max_tokens: 32768,
        stream: false,
    }
}

fn completion(content: &str) -> serde_json::Value {
    json!({
        "id": "chatcmpl-1",
        "choices": [{ "index": 0, "message": { "role": "assistant", "content": content } }],
        "usage": { "prompt_tokens": 10, "completion_tokens": 20, "total_tokens": 30 }
    })
}

async fn upstream_with(template: ResponseTemplate) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(COMPLETIONS))
        .respond_with(template)
        .mount(&server)
        .await;
    server
}

fn client_for(server: &MockServer) -> GroqClient {
    GroqClient::new(format!("{}{}", server.uri(), COMPLETIONS))
}

#[tokio::test]
async fn client_sends_bearer_credential_and_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(COMPLETIONS))
        .and(header("authorization", "Bearer gsk_test"))
        .and(body_partial_json(json!({
            "model": "llama-3.3-70b-versatile",
            "stream": false,
            "max_tokens": 32768
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion("[]")))
        .expect(1)
        .mount(&server)
        .await;

    let reply = client_for(&server)
        .complete("gsk_test", &chat_request())
        .await
        .unwrap();
    assert_eq!(reply.first_content(), Some("[]"));
    assert_eq!(reply.usage.unwrap()["total_tokens"], 30);
}

#[tokio::test]
async fn client_reports_error_statuses_with_body() {
    let server = upstream_with(
        ResponseTemplate::new(401).set_body_json(json!({ "error": { "message": "Invalid API Key" } })),
    )
    .await;
    let err = client_for(&server)
        .complete("bad", &chat_request())
        .await
        .unwrap_err();
    match err {
        UpstreamError::Status { status, body } => {
            assert_eq!(status, StatusCode::UNAUTHORIZED);
            assert!(body.contains("Invalid API Key"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn client_reports_undecodable_payloads() {
    let server = upstream_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>")).await;
    let err = client_for(&server)
        .complete("key", &chat_request())
        .await
        .unwrap_err();
    assert!(matches!(err, UpstreamError::Decode(_)));
}

#[tokio::test]
async fn gateway_hides_upstream_auth_failures() {
    let server = upstream_with(
        ResponseTemplate::new(401).set_body_string("organization gsk_live_secret is disabled"),
    )
    .await;
    let gateway = Gateway::new(
        GatewayConfig::default().with_api_key("gsk_live_secret"),
        client_for(&server),
    );
    let response = gateway
        .handle(&Method::POST, br#"{"prompt":"eggs"}"#)
        .await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = response.body().unwrap().to_string();
    assert!(body.contains("API authentication failed"));
    assert!(!body.contains("gsk_live_secret"));
}

#[tokio::test]
async fn gateway_relays_rate_limits() {
    let server = upstream_with(ResponseTemplate::new(429)).await;
    let gateway = Gateway::new(
        GatewayConfig::default().with_api_key("key"),
        client_for(&server),
    );
    let response = gateway
        .handle(&Method::POST, br#"{"prompt":"eggs"}"#)
        .await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn gateway_flags_missing_message() {
    let server = upstream_with(
        ResponseTemplate::new(200).set_body_json(json!({ "choices": [] })),
    )
    .await;
    let gateway = Gateway::new(
        GatewayConfig::default().with_api_key("key"),
        client_for(&server),
    );
    let response = gateway
        .handle(&Method::POST, br#"{"prompt":"eggs"}"#)
        .await;
    assert_eq!(
        response.body().unwrap()["error"],
        "Invalid response from recipe service"
    );
}

#[tokio::test]
async fn gateway_end_to_end_success() {
    let server = upstream_with(
        ResponseTemplate::new(200).set_body_json(completion("{\"name\":\"Sinigang\"}")),
    )
    .await;
    let gateway = Gateway::new(
        GatewayConfig::default().with_api_key("key"),
        client_for(&server),
    );
    match gateway
        .handle(&Method::POST, br#"{"prompt":"pork","isFeaturedDish":true}"#)
        .await
    {
        GatewayResponse::Completed(reply) => {
            assert!(reply.success);
            assert_eq!(reply.content, "{\"name\":\"Sinigang\"}");
        }
        other => panic!("unexpected response: {other:?}"),
    }
}

#[tokio::test]
async fn remote_gateway_returns_success_replies() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/groq-proxy"))
        .and(body_partial_json(json!({ "isFeaturedDish": false, "numberOfRecipes": 2 })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "content": "[{\"name\":\"Adobong Pusit\"},{\"name\":\"Ginisang Monggo\"}]"
        })))
        .mount(&server)
        .await;

    let remote = RemoteGateway::new(format!("{}/api/groq-proxy", server.uri()));
    let service = RecipeService::new(remote).with_count(2);
    let ingredients: IngredientList = ["squid", "mung beans"].into_iter().collect();
    let found = service.find_recipes(&ingredients).await;
    assert_eq!(found.notice, None);
    let names: Vec<_> = found
        .value
        .iter()
        .filter_map(|recipe| recipe.name.as_deref())
        .collect();
    assert_eq!(names, ["Adobong Pusit", "Ginisang Monggo"]);
}

#[tokio::test]
async fn remote_gateway_surfaces_error_messages() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/groq-proxy"))
        .respond_with(
            ResponseTemplate::new(429)
                .set_body_json(json!({ "error": "Rate limit exceeded. Please try again later." })),
        )
        .mount(&server)
        .await;

    let remote = RemoteGateway::new(format!("{}/api/groq-proxy", server.uri()));
    let err = remote
        .generate(&GatewayRequest::new("eggs", Shape::list(1)))
        .await
        .unwrap_err();
    match err {
        SourceError::Rejected { status, message } => {
            assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
            assert_eq!(message, "Rate limit exceeded. Please try again later.");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}
