use serde::{Deserialize, Serialize};

/// Ingredients the user has on hand, lower-cased and trimmed, in the order
/// they were added. Duplicates are rejected on insert.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IngredientList {
    items: Vec<String>,
}

impl IngredientList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Normalizes `raw` and appends it. Returns `false` for blank input or an
    /// ingredient that is already present.
    pub fn add(&mut self, raw: &str) -> bool {
        let normalized = raw.trim().to_lowercase();
        if normalized.is_empty() || self.items.contains(&normalized) {
            return false;
        }
        self.items.push(normalized);
        true
    }

    /// Removes the chip whose stored value is exactly `ingredient`.
    pub fn remove(&mut self, ingredient: &str) -> bool {
        let before = self.items.len();
        self.items.retain(|item| item != ingredient);
        self.items.len() != before
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.items.iter().map(String::as_str)
    }

    pub fn as_slice(&self) -> &[String] {
        &self.items
    }

    /// Comma-separated form used inside prompts.
    pub fn joined(&self) -> String {
        self.items.join(", ")
    }
}

impl<S: AsRef<str>> FromIterator<S> for IngredientList {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut list = IngredientList::new();
        for item in iter {
            list.add(item.as_ref());
        }
        list
    }
}
