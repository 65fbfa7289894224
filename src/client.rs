use crate::gateway::{CompletionReply, ErrorReply, Gateway, GatewayRequest};
use crate::normalize::{Normalized, normalize};
use crate::upstream::ChatCompletion;
use crate::{DEFAULT_RECIPE_COUNT, IngredientList, Recipe, Shape, fallback, prompt};
use chrono::NaiveDate;
use reqwest::{Client, StatusCode};
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

pub const FEATURED_NOTICE: &str =
    "Failed to load featured dish. Showing a delicious fallback recipe.";
pub const SEARCH_NOTICE: &str =
    "Couldn't reach the recipe service. Showing some fallback recipes instead.";

#[derive(Debug, Error)]
pub enum SourceError {
    /// The gateway answered with an error body.
    #[error("gateway rejected the request ({status}): {message}")]
    Rejected { status: StatusCode, message: String },
    #[error("gateway request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("gateway reply is not valid JSON: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Anything that answers a [`GatewayRequest`] the way the gateway endpoint does.
pub trait CompletionSource: Send + Sync {
    fn generate(
        &self,
        request: &GatewayRequest,
    ) -> impl Future<Output = Result<CompletionReply, SourceError>> + Send;
}

impl<C: ChatCompletion> CompletionSource for Gateway<C> {
    async fn generate(&self, request: &GatewayRequest) -> Result<CompletionReply, SourceError> {
        self.complete(request)
            .await
            .map_err(|err| SourceError::Rejected {
                status: err.status(),
                message: err.to_string(),
            })
    }
}

impl<S: CompletionSource> CompletionSource for Arc<S> {
    fn generate(
        &self,
        request: &GatewayRequest,
    ) -> impl Future<Output = Result<CompletionReply, SourceError>> + Send {
        self.as_ref().generate(request)
    }
}

/// A deployed gateway reached over HTTP.
#[derive(Debug, Clone)]
pub struct RemoteGateway {
    url: String,
    client: Client,
}

impl RemoteGateway {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            client: Client::new(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl CompletionSource for RemoteGateway {
    async fn generate(&self, request: &GatewayRequest) -> Result<CompletionReply, SourceError> {
        let response = self.client.post(&self.url).json(request).send().await?;
        let status = response.status();
        let bytes = response.bytes().await?;
        if status.is_success() {
            return Ok(serde_json::from_slice(&bytes)?);
        }
        let message = serde_json::from_slice::<ErrorReply>(&bytes)
            .map(|reply| reply.error)
            .unwrap_or_else(|_| String::from_utf8_lossy(&bytes).into_owned());
        Err(SourceError::Rejected { status, message })
    }
}

/// A value to show plus the notice that should accompany it, if any.
#[derive(Debug, Clone, PartialEq)]
pub struct Suggestion<T> {
    pub value: T,
    pub notice: Option<&'static str>,
}

impl<T> Suggestion<T> {
    fn clean(value: T) -> Self {
        Self {
            value,
            notice: None,
        }
    }

    fn with_notice(value: T, notice: &'static str) -> Self {
        Self {
            value,
            notice: Some(notice),
        }
    }
}

impl Suggestion<Recipe> {
    /// The fixed featured dish with its notice.
    pub fn featured_fallback() -> Self {
        Self::with_notice(fallback::featured(), FEATURED_NOTICE)
    }
}

/// Fetches featured dishes and ingredient searches. Never fails: every
/// failure path ends in fallback content.
#[derive(Debug, Clone)]
pub struct RecipeService<S> {
    source: S,
    count: usize,
}

impl<S: CompletionSource> RecipeService<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            count: DEFAULT_RECIPE_COUNT,
        }
    }

    pub fn with_count(mut self, count: usize) -> Self {
        self.count = Shape::list(count).count();
        self
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub async fn featured_dish(&self, date: NaiveDate) -> Suggestion<Recipe> {
        let request = GatewayRequest::new(prompt::featured_prompt(date), Shape::Featured);
        let normalized = match self.source.generate(&request).await {
            Ok(reply) => normalize(&reply.content, Shape::Featured),
            Err(err) => {
                warn!(%err, "featured dish request failed");
                return Suggestion::featured_fallback();
            }
        };
        let fell_back = normalized.is_fallback();
        match normalized.suggestions.into_featured() {
            Some(recipe) if !fell_back && recipe.is_presentable() => {
                info!(name = recipe.name.as_deref().unwrap_or_default(), "featured dish ready");
                Suggestion::clean(recipe)
            }
            _ => {
                warn!("featured dish unusable; showing fallback");
                Suggestion::featured_fallback()
            }
        }
    }

    /// Recipes for `ingredients`. An empty list asks for nothing.
    pub async fn find_recipes(&self, ingredients: &IngredientList) -> Suggestion<Vec<Recipe>> {
        if ingredients.is_empty() {
            return Suggestion::clean(Vec::new());
        }
        let shape = Shape::list(self.count);
        let request = GatewayRequest::new(prompt::ingredients_prompt(ingredients), shape);
        match self.source.generate(&request).await {
            Ok(reply) => {
                let normalized = normalize(&reply.content, shape);
                let fell_back = normalized.is_fallback();
                let recipes = recipes_of(normalized, shape);
                info!(count = recipes.len(), fell_back, "recipe search finished");
                Suggestion::clean(recipes)
            }
            Err(err) => {
                warn!(%err, "recipe search failed");
                Suggestion::with_notice(fallback::recipes(shape.count()), SEARCH_NOTICE)
            }
        }
    }
}

fn recipes_of(normalized: Normalized, shape: Shape) -> Vec<Recipe> {
    normalized
        .suggestions
        .into_list()
        .unwrap_or_else(|| fallback::recipes(shape.count()))
}
