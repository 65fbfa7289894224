use crate::{IngredientList, Shape};
use chrono::NaiveDate;

const RECIPE_OBJECT_SCHEMA: &str = r#"{
  "name": "string",
  "description": "string",
  "cookTime": "string",
  "servings": "string",
  "difficulty": "Easy" | "Medium" | "Hard",
  "ingredients": ["string"],
  "instructions": ["string"]
}"#;

/// System message sent ahead of every request. Describes the persona, the
/// cuisine bias and the exact JSON shape expected back.
pub fn system_instruction(shape: Shape) -> String {
    let (task, format) = match shape {
        Shape::Featured => (
            "Generate one featured recipe as a single JSON object.".to_string(),
            RECIPE_OBJECT_SCHEMA.to_string(),
        ),
        Shape::List { count } => (
            format!("Generate exactly {count} recipes as a JSON array."),
            format!("[\n{}\n]", indent(RECIPE_OBJECT_SCHEMA, 2)),
        ),
    };
    format!(
        "You are a chef with 20 years of experience across the world's cuisines. \
Focus on practical, delicious recipes that home cooks can follow with everyday equipment. \
Keep the selection varied, leaning towards Asian and especially Filipino dishes and ingredients.\n\
Respond with valid JSON only: no prose, no markdown fences.\n\
{task}\n\
Format:\n\
{format}"
    )
}

/// User message for an ingredient search.
pub fn ingredients_prompt(ingredients: &IngredientList) -> String {
    format!(
        "Create recipes using these available ingredients: {}.\n\
Requirements:\n\
- Use most of the provided ingredients\n\
- Include cooking time, difficulty and serving size\n\
- Provide 4-6 clear instructions, or more if the dish needs them\n\
- Include a brief description for each recipe\n\
- Include a variety of cuisines",
        ingredients.joined()
    )
}

/// User message for the featured dish of `date`.
pub fn featured_prompt(date: NaiveDate) -> String {
    format!(
        "Create a featured recipe for {}.\n\
Requirements:\n\
- Include name, description, cookTime, servings and difficulty\n\
- List 5-8 ingredients\n\
- Provide 4-6 clear instructions\n\
- Focus on seasonal ingredients\n\
- Difficulty should be Easy or Medium",
        display_date(date)
    )
}

/// `"Monday, October 19"`.
pub fn display_date(date: NaiveDate) -> String {
    date.format("%A, %B %-d").to_string()
}

fn indent(block: &str, spaces: usize) -> String {
    let padding = " ".repeat(spaces);
    block
        .lines()
        .map(|line| format!("{padding}{line}"))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn featured_instruction_asks_for_an_object() {
        let text = system_instruction(Shape::Featured);
        assert!(text.contains("single JSON object"));
        assert!(text.contains("\"cookTime\": \"string\""));
        assert!(!text.contains("JSON array"));
        assert!(text.contains("Filipino"));
    }

    #[test]
    fn list_instruction_names_the_count() {
        let text = system_instruction(Shape::list(7));
        assert!(text.contains("exactly 7 recipes"));
        assert!(text.contains("[\n  {"));
    }

    #[test]
    fn ingredients_are_embedded_in_order() {
        let list: IngredientList = ["Chicken", "garlic", "Soy Sauce"].into_iter().collect();
        let text = ingredients_prompt(&list);
        assert!(text.contains("ingredients: chicken, garlic, soy sauce."));
    }

    #[test]
    fn featured_prompt_is_date_seeded() {
        let date = NaiveDate::from_ymd_opt(2026, 10, 19).unwrap();
        assert_eq!(display_date(date), "Monday, October 19");
        assert!(featured_prompt(date).starts_with("Create a featured recipe for Monday, October 19."));
    }
}
