pub mod client;
pub mod fallback;
pub mod gateway;
pub mod ingredients;
#[cfg(any(feature = "cli", feature = "web"))]
pub mod logging;
pub mod normalize;
pub mod prompt;
pub mod session;
pub mod upstream;
pub mod view;
#[cfg(feature = "web")]
pub mod web;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

pub use client::{CompletionSource, RecipeService, RemoteGateway, SourceError, Suggestion};
pub use gateway::{Gateway, GatewayConfig, GatewayError, GatewayRequest, GatewayResponse};
pub use ingredients::IngredientList;
pub use normalize::{Extraction, Normalized, Suggestions, extract_json, normalize};
pub use upstream::{ChatCompletion, GroqClient, UpstreamError};

/// Recipes requested when the caller does not say otherwise.
pub const DEFAULT_RECIPE_COUNT: usize = 10;
/// Upper bound on a single list request.
pub const MAX_RECIPE_COUNT: usize = 50;

/// One recipe as produced by the model or the fallback table.
///
/// Every field is optional on the way in: model output is loosely shaped, and
/// the presentation layer substitutes placeholders for whatever is missing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "web", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct Recipe {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(
        default,
        deserialize_with = "string_or_number",
        skip_serializing_if = "Option::is_none"
    )]
    pub cook_time: Option<String>,
    #[serde(
        default,
        deserialize_with = "string_or_number",
        skip_serializing_if = "Option::is_none"
    )]
    pub servings: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient_difficulty",
        skip_serializing_if = "Option::is_none"
    )]
    pub difficulty: Option<Difficulty>,
    #[serde(default, deserialize_with = "string_list")]
    pub ingredients: Vec<String>,
    #[serde(default, deserialize_with = "string_list")]
    pub instructions: Vec<String>,
}

impl Recipe {
    /// True when the recipe carries a non-blank name.
    pub fn has_name(&self) -> bool {
        self.name.as_deref().is_some_and(|name| !name.trim().is_empty())
    }

    /// A featured dish needs at least a name and an ingredient list to be shown as-is.
    pub fn is_presentable(&self) -> bool {
        self.has_name() && !self.ingredients.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "web", derive(utoipa::ToSchema))]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

impl Difficulty {
    pub fn label(&self) -> &'static str {
        match self {
            Difficulty::Easy => "Easy",
            Difficulty::Medium => "Medium",
            Difficulty::Hard => "Hard",
        }
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Difficulty {
    type Err = ();

    /// Accepts labels like `"easy"`, `"Medium "` or `"Hard (2 days)"`.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let lowered = value.trim().to_lowercase();
        if lowered.starts_with("easy") {
            Ok(Difficulty::Easy)
        } else if lowered.starts_with("medium") || lowered.starts_with("moderate") {
            Ok(Difficulty::Medium)
        } else if lowered.starts_with("hard") || lowered.starts_with("difficult") {
            Ok(Difficulty::Hard)
        } else {
            Err(())
        }
    }
}

/// What a single generation request asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    /// One recipe object.
    Featured,
    /// An array of `count` recipes.
    List { count: usize },
}

impl Shape {
    /// A list shape with `count` clamped to `1..=MAX_RECIPE_COUNT`.
    pub fn list(count: usize) -> Self {
        Shape::List {
            count: count.clamp(1, MAX_RECIPE_COUNT),
        }
    }

    pub fn from_flags(is_featured: bool, count: usize) -> Self {
        if is_featured {
            Shape::Featured
        } else {
            Shape::list(count)
        }
    }

    pub fn is_featured(&self) -> bool {
        matches!(self, Shape::Featured)
    }

    pub fn count(&self) -> usize {
        match self {
            Shape::Featured => 1,
            Shape::List { count } => *count,
        }
    }
}

fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(text)) => Some(text),
        Some(Value::Number(number)) => Some(number.to_string()),
        _ => None,
    })
}

fn lenient_difficulty<'de, D>(deserializer: D) -> Result<Option<Difficulty>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(text)) => text.parse().ok(),
        _ => None,
    })
}

fn string_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let items = match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Array(items)) => items,
        Some(Value::String(single)) => return Ok(vec![single]),
        _ => return Ok(Vec::new()),
    };
    Ok(items
        .into_iter()
        .filter_map(|item| match item {
            Value::String(text) => Some(text),
            Value::Number(number) => Some(number.to_string()),
            _ => None,
        })
        .collect())
}
