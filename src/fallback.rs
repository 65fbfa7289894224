use crate::{Difficulty, Recipe};
use once_cell::sync::Lazy;

static FEATURED: Lazy<Recipe> = Lazy::new(|| {
    recipe(
        "Mediterranean Quinoa Bowl",
        "A vibrant bowl packed with fresh vegetables, quinoa, feta cheese, and a zesty lemon-herb dressing.",
        "25 mins",
        "4",
        Difficulty::Easy,
        &[
            "quinoa",
            "cucumber",
            "tomatoes",
            "feta cheese",
            "olive oil",
            "lemon",
            "herbs",
        ],
        &[
            "Cook quinoa according to package directions",
            "Dice cucumber and tomatoes",
            "Whisk together olive oil, lemon juice, and herbs",
            "Combine all ingredients and toss with dressing",
        ],
    )
});

static BASE_TABLE: Lazy<[Recipe; 3]> = Lazy::new(|| {
    [
        recipe(
            "Simple Pasta Dish",
            "A quick and easy pasta recipe with available ingredients.",
            "20 mins",
            "2",
            Difficulty::Easy,
            &["pasta", "olive oil", "garlic"],
            &[
                "Cook pasta according to package directions",
                "Sauté garlic in olive oil",
                "Toss pasta with garlic oil",
                "Season with salt and pepper",
            ],
        ),
        recipe(
            "Filipino Adobo",
            "Classic Filipino braised pork in soy sauce and vinegar.",
            "45 mins",
            "4",
            Difficulty::Medium,
            &["pork belly", "soy sauce", "vinegar", "garlic", "bay leaves"],
            &[
                "Marinate pork in soy sauce and vinegar",
                "Brown the pork in a pot",
                "Add marinade and simmer until tender",
                "Serve with rice",
            ],
        ),
        recipe(
            "Vegetable Fried Rice",
            "Quick and nutritious fried rice with mixed vegetables.",
            "15 mins",
            "3",
            Difficulty::Easy,
            &["cooked rice", "mixed vegetables", "soy sauce", "eggs", "oil"],
            &[
                "Heat oil in wok or large pan",
                "Scramble eggs and set aside",
                "Stir-fry vegetables",
                "Add rice and eggs, season with soy sauce",
            ],
        ),
    ]
});

/// The single fixed featured dish.
pub fn featured() -> Recipe {
    FEATURED.clone()
}

/// Exactly `count` recipes cycling the base table.
///
/// The first pass keeps the plain names; pass `n` (counting from 1) appends
/// `" n"`, so the fourth entry of a five-recipe list is `"Simple Pasta Dish 2"`.
pub fn recipes(count: usize) -> Vec<Recipe> {
    let table = &*BASE_TABLE;
    (0..count)
        .map(|index| {
            let mut entry = table[index % table.len()].clone();
            let cycle = index / table.len();
            if cycle > 0 {
                if let Some(name) = entry.name.as_mut() {
                    name.push_str(&format!(" {}", cycle + 1));
                }
            }
            entry
        })
        .collect()
}

fn recipe(
    name: &str,
    description: &str,
    cook_time: &str,
    servings: &str,
    difficulty: Difficulty,
    ingredients: &[&str],
    instructions: &[&str],
) -> Recipe {
    Recipe {
        name: Some(name.to_string()),
        description: Some(description.to_string()),
        cook_time: Some(cook_time.to_string()),
        servings: Some(servings.to_string()),
        difficulty: Some(difficulty),
        ingredients: ingredients.iter().map(|s| s.to_string()).collect(),
        instructions: instructions.iter().map(|s| s.to_string()).collect(),
    }
}
