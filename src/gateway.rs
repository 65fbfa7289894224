use crate::prompt;
use crate::upstream::{
    ChatCompletion, ChatMessage, ChatRequest, DEFAULT_ENDPOINT, Role, UpstreamError,
};
use crate::{DEFAULT_RECIPE_COUNT, Shape};
use reqwest::{Method, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::fmt;
use thiserror::Error;
use tracing::{error, info, warn};

pub const DEFAULT_MODEL: &str = "llama-3.3-70b-versatile";
pub const DEFAULT_TEMPERATURE: f32 = 0.8;
pub const DEFAULT_MAX_TOKENS: u32 = 32_768;

/// Header name/value pairs sent with every gateway response.
pub const CORS_HEADERS: [(&str, &str); 3] = [
    ("access-control-allow-origin", "*"),
    ("access-control-allow-methods", "POST, OPTIONS"),
    ("access-control-allow-headers", "Content-Type"),
];

/// Server-side settings, passed in at construction.
#[derive(Clone)]
pub struct GatewayConfig {
    pub api_key: Option<String>,
    pub endpoint: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            endpoint: DEFAULT_ENDPOINT.to_string(),
            model: DEFAULT_MODEL.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }
}

impl GatewayConfig {
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    fn credential(&self) -> Option<&str> {
        self.api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
    }
}

impl fmt::Debug for GatewayConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GatewayConfig")
            .field("api_key", &self.credential().map(|_| "<redacted>"))
            .field("endpoint", &self.endpoint)
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .finish()
    }
}

/// Body accepted by the gateway endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "web", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct GatewayRequest {
    pub prompt: String,
    #[serde(default)]
    pub is_featured_dish: bool,
    #[serde(default = "default_recipe_count")]
    pub number_of_recipes: usize,
}

fn default_recipe_count() -> usize {
    DEFAULT_RECIPE_COUNT
}

impl GatewayRequest {
    pub fn new(prompt: impl Into<String>, shape: Shape) -> Self {
        Self {
            prompt: prompt.into(),
            is_featured_dish: shape.is_featured(),
            number_of_recipes: shape.count(),
        }
    }

    pub fn shape(&self) -> Shape {
        Shape::from_flags(self.is_featured_dish, self.number_of_recipes)
    }

    /// Reads the request out of an arbitrary JSON body. The prompt must be a
    /// non-blank string; the other fields fall back to their defaults when
    /// absent or of the wrong type.
    fn from_body(body: &[u8]) -> Result<Self, GatewayError> {
        let value: Value =
            serde_json::from_slice(body).map_err(|_| GatewayError::InvalidPrompt)?;
        let prompt = value
            .get("prompt")
            .and_then(Value::as_str)
            .filter(|prompt| !prompt.trim().is_empty())
            .ok_or(GatewayError::InvalidPrompt)?;
        let is_featured_dish = value
            .get("isFeaturedDish")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        let number_of_recipes = value
            .get("numberOfRecipes")
            .and_then(Value::as_u64)
            .map(|count| count as usize)
            .unwrap_or(DEFAULT_RECIPE_COUNT);
        Ok(Self {
            prompt: prompt.to_string(),
            is_featured_dish,
            number_of_recipes,
        })
    }
}

/// Successful gateway reply: the assistant's raw text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "web", derive(utoipa::ToSchema))]
pub struct CompletionReply {
    pub success: bool,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[cfg_attr(feature = "web", schema(value_type = Option<Object>))]
    pub usage: Option<Value>,
}

/// Failure body: `{"error": "..."}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "web", derive(utoipa::ToSchema))]
pub struct ErrorReply {
    pub error: String,
}

/// Every way the gateway can refuse. `Display` is the exact client-facing text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum GatewayError {
    #[error("Method not allowed")]
    MethodNotAllowed,
    #[error("Server configuration error")]
    MissingCredential,
    #[error("Valid prompt is required")]
    InvalidPrompt,
    #[error("API authentication failed")]
    UpstreamAuth,
    #[error("Rate limit exceeded. Please try again later.")]
    RateLimited,
    #[error("Recipe generation failed. Please try again.")]
    GenerationFailed,
    #[error("Invalid response from recipe service")]
    InvalidUpstreamPayload,
    #[error("Internal server error. Please try again later.")]
    Internal,
}

impl GatewayError {
    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            GatewayError::InvalidPrompt => StatusCode::BAD_REQUEST,
            GatewayError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            GatewayError::MissingCredential
            | GatewayError::UpstreamAuth
            | GatewayError::GenerationFailed
            | GatewayError::InvalidUpstreamPayload
            | GatewayError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn reply(&self) -> ErrorReply {
        ErrorReply {
            error: self.to_string(),
        }
    }
}

impl From<UpstreamError> for GatewayError {
    fn from(err: UpstreamError) -> Self {
        match err {
            UpstreamError::Status { status, .. } if status == StatusCode::UNAUTHORIZED => {
                GatewayError::UpstreamAuth
            }
            UpstreamError::Status { status, .. } if status == StatusCode::TOO_MANY_REQUESTS => {
                GatewayError::RateLimited
            }
            UpstreamError::Status { .. } => GatewayError::GenerationFailed,
            UpstreamError::Decode(_) => GatewayError::InvalidUpstreamPayload,
            UpstreamError::Transport(_) => GatewayError::Internal,
        }
    }
}

/// Outcome of one gateway invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum GatewayResponse {
    /// `OPTIONS`: 200 with no body.
    Preflight,
    Completed(CompletionReply),
    Failed(GatewayError),
}

impl GatewayResponse {
    pub fn status(&self) -> StatusCode {
        match self {
            GatewayResponse::Preflight | GatewayResponse::Completed(_) => StatusCode::OK,
            GatewayResponse::Failed(err) => err.status(),
        }
    }

    /// JSON body, or `None` for the preflight reply.
    pub fn body(&self) -> Option<Value> {
        match self {
            GatewayResponse::Preflight => None,
            GatewayResponse::Completed(reply) => Some(json!(reply)),
            GatewayResponse::Failed(err) => Some(json!(err.reply())),
        }
    }
}

pub struct Gateway<C> {
    config: GatewayConfig,
    client: C,
}

impl<C: ChatCompletion> Gateway<C> {
    pub fn new(config: GatewayConfig, client: C) -> Self {
        Self { config, client }
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Runs the full HTTP contract for one request.
    pub async fn handle(&self, method: &Method, body: &[u8]) -> GatewayResponse {
        if method == Method::OPTIONS {
            return GatewayResponse::Preflight;
        }
        if method != Method::POST {
            return GatewayResponse::Failed(GatewayError::MethodNotAllowed);
        }
        if self.config.credential().is_none() {
            error!("gateway has no upstream API key configured");
            return GatewayResponse::Failed(GatewayError::MissingCredential);
        }
        let request = match GatewayRequest::from_body(body) {
            Ok(request) => request,
            Err(err) => return GatewayResponse::Failed(err),
        };
        match self.complete(&request).await {
            Ok(reply) => GatewayResponse::Completed(reply),
            Err(err) => GatewayResponse::Failed(err),
        }
    }

    /// Forwards an already-parsed request upstream.
    pub async fn complete(&self, request: &GatewayRequest) -> Result<CompletionReply, GatewayError> {
        let api_key = self.config.credential().ok_or_else(|| {
            error!("gateway has no upstream API key configured");
            GatewayError::MissingCredential
        })?;
        if request.prompt.trim().is_empty() {
            return Err(GatewayError::InvalidPrompt);
        }

        let shape = request.shape();
        let chat = ChatRequest {
            messages: vec![
                ChatMessage {
                    role: Role::System,
                    content: prompt::system_instruction(shape),
                },
                ChatMessage {
                    role: Role::User,
                    content: request.prompt.clone(),
                },
            ],
            model: self.config.model.clone(),
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
            stream: false,
        };

        let reply = self.client.complete(api_key, &chat).await.map_err(|err| {
            warn!(%err, "upstream completion failed");
            GatewayError::from(err)
        })?;

        let Some(content) = reply.first_content() else {
            error!(?reply, "unexpected chat completion structure");
            return Err(GatewayError::InvalidUpstreamPayload);
        };
        info!(?shape, bytes = content.len(), "completion relayed");
        Ok(CompletionReply {
            success: true,
            content: content.to_string(),
            usage: reply.usage.clone(),
        })
    }
}
