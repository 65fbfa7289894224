use crate::{Difficulty, Recipe};

pub const UNNAMED: &str = "Unnamed Recipe";
pub const NO_DESCRIPTION: &str = "No description provided.";
pub const NO_COOK_TIME: &str = "Time not specified";
pub const NO_SERVINGS: &str = "Servings not specified";
pub const NO_DIFFICULTY: &str = "Difficulty not specified";
pub const NO_INGREDIENTS: &str = "No ingredients listed.";
pub const NO_INSTRUCTIONS: &str = "No instructions provided.";

/// Ingredients shown on a card before the overflow indicator.
pub const CARD_INGREDIENT_LIMIT: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecipeView {
    pub name: String,
    pub description: String,
    pub cook_time: String,
    pub servings: String,
    pub difficulty: String,
    pub tone: Tone,
    pub ingredients: Vec<String>,
    pub instructions: Vec<String>,
}

/// Colour family of the difficulty badge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tone {
    Easy,
    Medium,
    Hard,
    Unknown,
}

impl Tone {
    pub fn badge_class(&self) -> &'static str {
        match self {
            Tone::Easy => "bg-green-100 text-green-800",
            Tone::Medium => "bg-yellow-100 text-yellow-800",
            Tone::Hard => "bg-red-100 text-red-800",
            Tone::Unknown => "bg-gray-100 text-gray-600",
        }
    }
}

impl From<Option<Difficulty>> for Tone {
    fn from(value: Option<Difficulty>) -> Self {
        match value {
            Some(Difficulty::Easy) => Tone::Easy,
            Some(Difficulty::Medium) => Tone::Medium,
            Some(Difficulty::Hard) => Tone::Hard,
            None => Tone::Unknown,
        }
    }
}

impl RecipeView {
    pub fn new(recipe: &Recipe) -> Self {
        Self {
            name: text_or(recipe.name.as_deref(), UNNAMED),
            description: text_or(recipe.description.as_deref(), NO_DESCRIPTION),
            cook_time: text_or(recipe.cook_time.as_deref(), NO_COOK_TIME),
            servings: text_or(recipe.servings.as_deref(), NO_SERVINGS),
            difficulty: recipe
                .difficulty
                .map(|difficulty| difficulty.label().to_string())
                .unwrap_or_else(|| NO_DIFFICULTY.to_string()),
            tone: Tone::from(recipe.difficulty),
            ingredients: non_blank(&recipe.ingredients),
            instructions: non_blank(&recipe.instructions),
        }
    }

    pub fn has_ingredients(&self) -> bool {
        !self.ingredients.is_empty()
    }

    pub fn has_instructions(&self) -> bool {
        !self.instructions.is_empty()
    }
}

/// Summary card in the results grid or the featured section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecipeCard {
    pub recipe: RecipeView,
    pub preview: Vec<String>,
    /// Ingredients beyond the preview, rendered as "+N more".
    pub more: usize,
    pub href: String,
}

impl RecipeCard {
    pub fn new(recipe: &Recipe, href: impl Into<String>) -> Self {
        let recipe = RecipeView::new(recipe);
        let preview: Vec<String> = recipe
            .ingredients
            .iter()
            .take(CARD_INGREDIENT_LIMIT)
            .cloned()
            .collect();
        let more = recipe.ingredients.len().saturating_sub(preview.len());
        Self {
            recipe,
            preview,
            more,
            href: href.into(),
        }
    }

    pub fn more_label(&self) -> Option<String> {
        (self.more > 0).then(|| format!("+{} more", self.more))
    }
}

/// Cards for a result list, each linking to its detail modal.
pub fn result_cards(recipes: &[Recipe]) -> Vec<RecipeCard> {
    recipes
        .iter()
        .enumerate()
        .map(|(index, recipe)| RecipeCard::new(recipe, format!("/?recipe={index}")))
        .collect()
}

pub fn featured_card(recipe: &Recipe) -> RecipeCard {
    RecipeCard::new(recipe, "/?featured=true")
}

/// Full recipe detail with a link that closes it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecipeModal {
    pub recipe: RecipeView,
    pub close_href: &'static str,
}

impl RecipeModal {
    pub fn new(recipe: &Recipe) -> Self {
        Self {
            recipe: RecipeView::new(recipe),
            close_href: "/",
        }
    }
}

fn text_or(value: Option<&str>, placeholder: &str) -> String {
    value
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .unwrap_or(placeholder)
        .to_string()
}

fn non_blank(items: &[String]) -> Vec<String> {
    items
        .iter()
        .map(|item| item.trim())
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}
