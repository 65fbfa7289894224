use crate::{Recipe, Shape, fallback};
use serde_json::Value;
use tracing::{debug, warn};

const FENCE: &str = "```";
const SNIPPET_CHARS: usize = 200;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Suggestions {
    Featured(Recipe),
    List(Vec<Recipe>),
}

impl Suggestions {
    pub fn into_featured(self) -> Option<Recipe> {
        match self {
            Suggestions::Featured(recipe) => Some(recipe),
            Suggestions::List(_) => None,
        }
    }

    pub fn into_list(self) -> Option<Vec<Recipe>> {
        match self {
            Suggestions::List(recipes) => Some(recipes),
            Suggestions::Featured(_) => None,
        }
    }
}

/// Which stage produced a [`Normalized`] value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Extraction {
    Direct,
    Fenced,
    Scanned,
    Fallback,
}

impl Extraction {
    pub fn label(&self) -> &'static str {
        match self {
            Extraction::Direct => "direct",
            Extraction::Fenced => "fenced",
            Extraction::Scanned => "scanned",
            Extraction::Fallback => "fallback",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Normalized {
    pub suggestions: Suggestions,
    pub extraction: Extraction,
}

impl Normalized {
    /// The static substitute for `shape`.
    pub fn fallback(shape: Shape) -> Self {
        let suggestions = match shape {
            Shape::Featured => Suggestions::Featured(fallback::featured()),
            Shape::List { count } => Suggestions::List(fallback::recipes(count)),
        };
        Self {
            suggestions,
            extraction: Extraction::Fallback,
        }
    }

    pub fn is_fallback(&self) -> bool {
        self.extraction == Extraction::Fallback
    }
}

/// Extracts recipes of the requested shape from `raw`, or the fallback set.
///
/// Candidates are tried in stage order; the first one that coerces to the
/// requested shape wins.
pub fn normalize(raw: &str, shape: Shape) -> Normalized {
    let mut tried = 0usize;
    for (value, extraction) in candidates(raw, shape) {
        tried += 1;
        let Some(suggestions) = coerce(value, shape) else {
            debug!(?extraction, "candidate is not recipe-shaped");
            continue;
        };
        if let (Suggestions::List(recipes), Shape::List { count }) = (&suggestions, shape) {
            if recipes.len() < count {
                warn!(
                    received = recipes.len(),
                    requested = count,
                    "model returned fewer recipes than requested"
                );
            }
        }
        debug!(?extraction, "normalized model output");
        return Normalized {
            suggestions,
            extraction,
        };
    }
    if tried == 0 {
        warn!(
            ?shape,
            snippet = %snippet(raw),
            "no JSON found in model output; serving fallback recipes"
        );
    } else {
        warn!(
            ?shape,
            candidates = tried,
            "extracted JSON is not recipe-shaped; serving fallback recipes"
        );
    }
    Normalized::fallback(shape)
}

/// Extracts the first embedded JSON object or array from `raw`, if any.
pub fn extract_json(raw: &str) -> Option<Value> {
    candidates(raw, Shape::Featured)
        .next()
        .map(|(value, _)| value)
}

/// Every object or array found in `raw`, in stage order. Parsing is lazy, so
/// callers that stop early skip the later stages.
fn candidates(raw: &str, shape: Shape) -> impl Iterator<Item = (Value, Extraction)> + '_ {
    let trimmed = raw.trim();

    let direct = std::iter::once(trimmed)
        .filter_map(|text| parse_container(text, "direct"))
        .map(|value| (value, Extraction::Direct));

    let fenced = fenced_blocks(trimmed)
        .into_iter()
        .filter_map(|body| parse_container(body.trim(), "fenced"))
        .map(|value| (value, Extraction::Fenced));

    let mut covered = 0;
    let scanned = balanced_spans(trimmed)
        .into_iter()
        .filter_map(move |(start, end)| {
            // Spans nested in an already parsed value are part of it.
            if start < covered {
                return None;
            }
            let value = parse_container(&trimmed[start..=end], "scanned")?;
            covered = end + 1;
            Some(value)
        })
        .map(|value| (value, Extraction::Scanned));

    let openers: [(char, char); 2] = if shape.is_featured() {
        [('{', '}'), ('[', ']')]
    } else {
        [('[', ']'), ('{', '}')]
    };
    let greedy = openers
        .into_iter()
        .filter_map(move |(open, close)| greedy_span(trimmed, open, close))
        .map(|value| (value, Extraction::Scanned));

    direct.chain(fenced).chain(scanned).chain(greedy)
}

fn parse_container(text: &str, stage: &'static str) -> Option<Value> {
    match serde_json::from_str::<Value>(text) {
        Ok(value) if value.is_object() || value.is_array() => Some(value),
        Ok(_) => {
            debug!(stage, "parsed a scalar");
            None
        }
        Err(err) => {
            debug!(stage, %err, "parse failed");
            None
        }
    }
}

/// Bodies of ```` ``` ```` fenced blocks, in order. An optional language tag
/// on the opening line is skipped.
fn fenced_blocks(text: &str) -> Vec<&str> {
    let mut blocks = Vec::new();
    let mut rest = text;
    while let Some(start) = rest.find(FENCE) {
        let after_open = &rest[start + FENCE.len()..];
        let body_start = skip_info_string(after_open);
        let body = &after_open[body_start..];
        let Some(end) = body.find(FENCE) else {
            break;
        };
        blocks.push(&body[..end]);
        rest = &body[end + FENCE.len()..];
    }
    blocks
}

fn skip_info_string(after_open: &str) -> usize {
    let tag_len = after_open
        .find(|c: char| !(c.is_ascii_alphanumeric() || c == '-' || c == '_'))
        .unwrap_or(after_open.len());
    let after_tag = &after_open[tag_len..];
    if tag_len > 0 && !after_tag.starts_with(|c: char| c.is_whitespace()) {
        // Not a tag, e.g. ```{"a":1}``` on one line.
        return 0;
    }
    tag_len
}

/// Every bracket-balanced `{..}` or `[..]` span, ordered by start so an
/// enclosing span precedes the spans nested in it. One pass over the text.
///
/// Braces inside string literals are ignored. Quotes outside every bracket
/// are prose and open no literal. A mismatched closer abandons every bracket
/// still open.
fn balanced_spans(text: &str) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut open: Vec<(usize, u8)> = Vec::new();
    let mut in_string = false;
    let mut escaped = false;
    for (index, &byte) in text.as_bytes().iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if byte == b'\\' {
                escaped = true;
            } else if byte == b'"' {
                in_string = false;
            }
            continue;
        }
        match byte {
            b'"' if !open.is_empty() => in_string = true,
            b'{' => open.push((index, b'}')),
            b'[' => open.push((index, b']')),
            b'}' | b']' => match open.pop() {
                Some((start, expected)) if expected == byte => spans.push((start, index)),
                Some(_) => open.clear(),
                None => {}
            },
            _ => {}
        }
    }
    spans.sort_unstable_by_key(|&(start, _)| start);
    spans
}

fn greedy_span(text: &str, open: char, close: char) -> Option<Value> {
    let start = text.find(open)?;
    let end = text.rfind(close)?;
    if end <= start {
        return None;
    }
    parse_container(&text[start..=end], "greedy")
}

fn coerce(value: Value, shape: Shape) -> Option<Suggestions> {
    match shape {
        Shape::Featured => {
            let candidate = match value {
                Value::Array(items) => {
                    let mut recipes: Vec<Recipe> =
                        items.into_iter().filter_map(recipe_from).collect();
                    let pick = recipes
                        .iter()
                        .position(Recipe::is_presentable)
                        .unwrap_or(0);
                    if pick >= recipes.len() {
                        return None;
                    }
                    recipes.swap_remove(pick)
                }
                other => recipe_from(other)?,
            };
            Some(Suggestions::Featured(candidate))
        }
        Shape::List { .. } => {
            let items = match value {
                Value::Array(items) => items,
                Value::Object(mut object) => match object.remove("recipes") {
                    Some(Value::Array(items)) => items,
                    Some(other) => {
                        object.insert("recipes".to_string(), other);
                        vec![Value::Object(object)]
                    }
                    None => vec![Value::Object(object)],
                },
                _ => return None,
            };
            let total = items.len();
            let recipes: Vec<Recipe> = items.into_iter().filter_map(recipe_from).collect();
            if total > 0 && recipes.is_empty() {
                return None;
            }
            if recipes.len() < total {
                warn!(
                    dropped = total - recipes.len(),
                    "skipped malformed recipe entries"
                );
            }
            Some(Suggestions::List(recipes))
        }
    }
}

fn recipe_from(value: Value) -> Option<Recipe> {
    if !value.is_object() {
        return None;
    }
    match serde_json::from_value(value) {
        Ok(recipe) => Some(recipe),
        Err(err) => {
            debug!(%err, "entry does not deserialize as a recipe");
            None
        }
    }
}

fn snippet(raw: &str) -> String {
    let mut out: String = raw.chars().take(SNIPPET_CHARS).collect();
    if raw.chars().count() > SNIPPET_CHARS {
        out.push_str("...");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::{Duration, Instant};

    fn names(normalized: &Normalized) -> Vec<String> {
        match &normalized.suggestions {
            Suggestions::Featured(recipe) => recipe.name.clone().into_iter().collect(),
            Suggestions::List(recipes) => {
                recipes.iter().filter_map(|r| r.name.clone()).collect()
            }
        }
    }

    #[test]
    fn fenced_featured_dish_is_extracted() {
        let raw = "Here is your recipe:\n```json\n{\"name\":\"Tomato Soup\",\"cookTime\":\"30 mins\",\"ingredients\":[\"tomato\",\"onion\"]}\n```";
        let normalized = normalize(raw, Shape::Featured);
        assert_eq!(normalized.extraction, Extraction::Fenced);
        let recipe = normalized.suggestions.into_featured().unwrap();
        assert_eq!(recipe.name.as_deref(), Some("Tomato Soup"));
        assert_eq!(recipe.ingredients, vec!["tomato", "onion"]);
    }

    #[test]
    fn unparseable_list_cycles_fallback_table() {
        let normalized = normalize("not json at all", Shape::list(5));
        assert!(normalized.is_fallback());
        assert_eq!(
            names(&normalized),
            vec![
                "Simple Pasta Dish",
                "Filipino Adobo",
                "Vegetable Fried Rice",
                "Simple Pasta Dish 2",
                "Filipino Adobo 2",
            ]
        );
    }

    #[test]
    fn unparseable_featured_returns_fixed_dish() {
        let normalized = normalize("Sorry, I can't help with that.", Shape::Featured);
        assert!(normalized.is_fallback());
        assert_eq!(
            normalized.suggestions,
            Suggestions::Featured(fallback::featured())
        );
    }

    #[test]
    fn direct_array_parses() {
        let raw = r#"  [{"name":"Pancit"},{"name":"Lumpia"}]  "#;
        let normalized = normalize(raw, Shape::list(2));
        assert_eq!(normalized.extraction, Extraction::Direct);
        assert_eq!(names(&normalized), vec!["Pancit", "Lumpia"]);
    }

    #[test]
    fn embedded_json_is_extracted_deep_equal() {
        let object = json!({
            "name": "Kare-Kare",
            "ingredients": ["oxtail", "peanut butter"],
            "instructions": ["Simmer {slowly}", "Serve with bagoong"]
        });
        let array = json!([{ "name": "Tinola" }, { "name": "Bistek", "servings": "3" }]);
        for embedded in [&object, &array] {
            let text = serde_json::to_string_pretty(embedded).unwrap();
            let wrappers = [
                text.clone(),
                format!("Sure! Here you go:\n{text}\nEnjoy."),
                format!("```json\n{text}\n```"),
                format!("Result:\n```\n{text}\n```\nLet me know."),
            ];
            for wrapped in wrappers {
                assert_eq!(extract_json(&wrapped).as_ref(), Some(embedded), "{wrapped}");
            }
        }
    }

    #[test]
    fn braces_inside_strings_do_not_confuse_scanner() {
        let raw = r#"Note {this} first. {"name":"Halo-halo","description":"Use } and { freely"} trailing } brace"#;
        let value = extract_json(raw).unwrap();
        assert_eq!(value["name"], "Halo-halo");
        assert_eq!(value["description"], "Use } and { freely");
    }

    #[test]
    fn bracketed_prose_is_skipped_for_the_recipe_array() {
        let raw = r#"I found [3] ideas: [{"name":"Arroz Caldo"},{"name":"Ginataang Kalabasa"},{"name":"Tortang Talong"}]"#;
        let normalized = normalize(raw, Shape::list(3));
        assert_eq!(normalized.extraction, Extraction::Scanned);
        assert_eq!(
            names(&normalized),
            vec!["Arroz Caldo", "Ginataang Kalabasa", "Tortang Talong"]
        );
    }

    #[test]
    fn list_mode_wraps_single_object() {
        let normalized = normalize(r#"{"name":"Sisig"}"#, Shape::list(4));
        assert_eq!(names(&normalized), vec!["Sisig"]);
        assert!(matches!(normalized.suggestions, Suggestions::List(_)));
    }

    #[test]
    fn list_mode_unwraps_recipes_key() {
        let raw = r#"{"recipes":[{"name":"Laing"},{"name":"Bicol Express"}]}"#;
        assert_eq!(names(&normalize(raw, Shape::list(2))), vec!["Laing", "Bicol Express"]);
    }

    #[test]
    fn featured_mode_takes_first_array_entry() {
        let raw = r#"[{"name":"Leche Flan"},{"name":"Ube Halaya"}]"#;
        let normalized = normalize(raw, Shape::Featured);
        let recipe = normalized.suggestions.into_featured().unwrap();
        assert_eq!(recipe.name.as_deref(), Some("Leche Flan"));
    }

    #[test]
    fn malformed_entries_are_dropped() {
        let raw = r#"[{"name":"Menudo"},{"name":42}]"#;
        assert_eq!(names(&normalize(raw, Shape::list(2))), vec!["Menudo"]);
        let all_bad = r#"[{"name":1},{"name":2}]"#;
        assert!(normalize(all_bad, Shape::list(2)).is_fallback());
    }

    #[test]
    fn mixed_arrays_keep_their_recipe_objects() {
        let raw = r#"[{"name":"Menudo"}, "note", {"name":"Sisig"}]"#;
        let listed = normalize(raw, Shape::list(2));
        assert_eq!(listed.extraction, Extraction::Direct);
        assert_eq!(names(&listed), vec!["Menudo", "Sisig"]);

        let featured = normalize(&format!("Today:\n{raw}"), Shape::Featured);
        assert_eq!(featured.extraction, Extraction::Scanned);
        assert_eq!(names(&featured), vec!["Menudo"]);
    }

    #[test]
    fn arrays_of_any_values_are_extracted() {
        assert_eq!(extract_json("[1,2,3]"), Some(json!([1, 2, 3])));
        assert_eq!(extract_json(r#"Here: ["a","b"]"#), Some(json!(["a", "b"])));
        assert!(normalize("[1,2,3]", Shape::list(3)).is_fallback());
    }

    #[test]
    fn featured_mode_prefers_a_presentable_entry() {
        let raw = r#"[{"name":"Halo-halo"},{"name":"Pork Adobo","ingredients":["pork","vinegar"]}]"#;
        let recipe = normalize(raw, Shape::Featured)
            .suggestions
            .into_featured()
            .unwrap();
        assert_eq!(recipe.name.as_deref(), Some("Pork Adobo"));
    }

    #[test]
    fn stray_quotes_in_prose_do_not_hide_the_array() {
        let raw = r#"Chef's "tip: [{"name":"Pinangat","ingredients":["taro leaves"]}]"#;
        assert_eq!(names(&normalize(raw, Shape::list(1))), vec!["Pinangat"]);
    }

    #[test]
    fn unbalanced_input_is_scanned_in_linear_time() {
        let size = 200_000;
        let inputs = [
            "{".repeat(size),
            "[".repeat(size),
            "[x] ".repeat(size / 4),
            format!("[{}", r#"{"name":"Pancit","ingredients":["noodles"]},"#.repeat(size / 48)),
        ];
        for raw in &inputs {
            let started = Instant::now();
            let listed = normalize(raw, Shape::list(3));
            assert!(
                started.elapsed() < Duration::from_secs(5),
                "took {:?} on {} bytes",
                started.elapsed(),
                raw.len()
            );
            assert_ne!(listed.extraction, Extraction::Direct);
        }
    }

    #[test]
    fn empty_array_is_an_empty_list() {
        let normalized = normalize("[]", Shape::list(3));
        assert_eq!(normalized.suggestions, Suggestions::List(Vec::new()));
        assert!(!normalized.is_fallback());
    }

    #[test]
    fn scalar_json_falls_back() {
        assert!(normalize("\"just a string\"", Shape::Featured).is_fallback());
        assert!(normalize("42", Shape::list(1)).is_fallback());
    }

    #[test]
    fn truncated_output_falls_back() {
        let raw = r#"[{"name":"Bulalo","ingredients":["beef shank","#;
        let normalized = normalize(raw, Shape::list(2));
        assert!(normalized.is_fallback());
        assert_eq!(names(&normalized), vec!["Simple Pasta Dish", "Filipino Adobo"]);
    }

    #[test]
    fn normalizing_twice_is_identical() {
        for raw in [
            "not json",
            "```json\n{\"name\":\"Pinakbet\"}\n```",
            "[{\"name\":\"Kinilaw\"}]",
        ] {
            for shape in [Shape::Featured, Shape::list(4)] {
                assert_eq!(normalize(raw, shape), normalize(raw, shape));
            }
        }
    }

    #[test]
    fn fences_with_other_tags_and_inline_fences() {
        assert_eq!(
            extract_json("```javascript\n{\"name\":\"Puto\"}\n```").unwrap()["name"],
            "Puto"
        );
        assert_eq!(
            extract_json("```{\"name\":\"Bibingka\"}```").unwrap()["name"],
            "Bibingka"
        );
    }

    #[test]
    fn snippet_truncates_on_char_boundaries() {
        let long = "é".repeat(SNIPPET_CHARS + 5);
        let cut = snippet(&long);
        assert!(cut.ends_with("..."));
        assert_eq!(cut.chars().count(), SNIPPET_CHARS + 3);
    }
}
