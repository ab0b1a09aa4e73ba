//! Mapping parsed values onto domain items.
//!
//! Models are loose about shape and key names, so lookups are
//! case-insensitive and accept the common synonyms listed in the constants
//! below. A value whose shape is not recognised yields `None` (the stage is
//! treated as failed); a recognised collection that is empty yields
//! `Some(vec![])`.

use serde_json::{Map, Value};

use crate::{Confidence, ContentItem, Meal, RecognizedIngredient, RequestKind, PLACEHOLDER};

const MEAL_COLLECTION_KEYS: &[&str] = &[
    "meals", "recipes", "mealplan", "meal_plan", "plan", "dishes", "items", "results", "data",
];
const INGREDIENT_COLLECTION_KEYS: &[&str] = &[
    "ingredients",
    "detected",
    "detected_ingredients",
    "detectedingredients",
    "recognized",
    "recognized_ingredients",
    "recognizedingredients",
    "foods",
    "items",
    "results",
    "data",
];

const MEAL_NAME_KEYS: &[&str] = &["name", "title", "recipe", "meal", "dish", "recipe_name"];
const INGREDIENT_NAME_KEYS: &[&str] = &["name", "ingredient", "item", "label", "food"];
const INGREDIENT_LIST_KEYS: &[&str] = &["ingredients", "ingredient_list", "components"];
const INSTRUCTION_KEYS: &[&str] = &["instructions", "steps", "directions", "method", "preparation"];
const PREP_KEYS: &[&str] = &[
    "prep_minutes", "prepminutes", "prep_time", "preptime", "total_time", "totaltime",
    "cook_time", "cooktime", "time", "minutes",
];
const CATEGORY_KEYS: &[&str] = &["category", "type", "group", "food_group", "kind"];
const QUANTITY_KEYS: &[&str] = &["quantity", "amount", "count", "qty", "estimated_quantity"];
const FRESHNESS_KEYS: &[&str] = &["freshness", "condition", "state", "ripeness"];
const CONFIDENCE_KEYS: &[&str] = &["confidence", "score", "probability", "certainty"];
const ENTRY_TEXT_KEYS: &[&str] = &[
    "name", "ingredient", "item", "text", "step", "description", "instruction",
];

/// Interprets `value` as a list of items for `kind`.
pub fn interpret(kind: RequestKind, value: &Value) -> Option<Vec<ContentItem>> {
    match kind {
        RequestKind::ContentGeneration => collect(value, MEAL_COLLECTION_KEYS, 0, &meal_from_value)
            .map(|meals| meals.into_iter().map(ContentItem::Meal).collect()),
        RequestKind::ImageRecognition => {
            collect(value, INGREDIENT_COLLECTION_KEYS, 0, &ingredient_from_value)
                .map(|found| found.into_iter().map(ContentItem::Ingredient).collect())
        }
    }
}

/// Walks arrays, wrapper objects, and single-item objects.
fn collect<T>(
    value: &Value,
    collection_keys: &[&str],
    depth: usize,
    item: &dyn Fn(&Value) -> Option<T>,
) -> Option<Vec<T>> {
    if depth > 3 {
        return None;
    }
    match value {
        Value::Array(elements) => {
            if elements.is_empty() {
                return Some(Vec::new());
            }
            let items: Vec<T> = elements.iter().filter_map(item).collect();
            (!items.is_empty()).then_some(items)
        }
        Value::Object(map) => {
            if let Some(inner) = lookup_any(map, collection_keys) {
                if let Some(items) = collect(inner, collection_keys, depth + 1, item) {
                    return Some(items);
                }
            }
            if let Some(single) = item(value) {
                return Some(vec![single]);
            }
            // Single wrapper key, e.g. {"response": {...}}.
            if map.len() == 1 {
                return map
                    .values()
                    .next()
                    .and_then(|inner| collect(inner, collection_keys, depth + 1, item));
            }
            None
        }
        _ => None,
    }
}

fn meal_from_value(value: &Value) -> Option<Meal> {
    let map = value.as_object()?;
    let name = lookup_any(map, MEAL_NAME_KEYS).and_then(text)?;
    let ingredients = lookup_any(map, INGREDIENT_LIST_KEYS)
        .map(text_list)
        .filter(|list| !list.is_empty())
        .unwrap_or_else(placeholder_list);
    let instructions = lookup_any(map, INSTRUCTION_KEYS)
        .map(text_list)
        .filter(|list| !list.is_empty())
        .unwrap_or_else(placeholder_list);
    let prep_minutes = lookup_any(map, PREP_KEYS).and_then(minutes);

    Some(Meal {
        name,
        ingredients,
        instructions,
        prep_minutes,
        confidence: confidence_of(map),
    })
}

fn ingredient_from_value(value: &Value) -> Option<RecognizedIngredient> {
    let ingredient = match value {
        Value::String(s) => RecognizedIngredient {
            name: non_blank(s)?,
            category: PLACEHOLDER.to_owned(),
            quantity: PLACEHOLDER.to_owned(),
            freshness: PLACEHOLDER.to_owned(),
            confidence: Confidence::UNREPORTED,
        },
        Value::Object(map) => RecognizedIngredient {
            name: lookup_any(map, INGREDIENT_NAME_KEYS).and_then(text)?,
            category: field_or_placeholder(map, CATEGORY_KEYS),
            quantity: field_or_placeholder(map, QUANTITY_KEYS),
            freshness: field_or_placeholder(map, FRESHNESS_KEYS),
            confidence: confidence_of(map),
        },
        _ => return None,
    };
    Some(ingredient)
}

// ---------------------------------------------------------------------------
// Field helpers
// ---------------------------------------------------------------------------

/// Case- and separator-insensitive key lookup (`prepTime` matches `prep_time`).
fn lookup_any<'a>(map: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    let wanted: Vec<String> = keys.iter().map(|k| fold_key(k)).collect();
    // Respect synonym priority: the first listed key that is present wins.
    wanted.iter().find_map(|want| {
        map.iter()
            .find(|(k, v)| fold_key(k) == *want && !v.is_null())
            .map(|(_, v)| v)
    })
}

fn fold_key(key: &str) -> String {
    key.chars()
        .filter(|c| !matches!(c, '_' | '-' | ' '))
        .flat_map(char::to_lowercase)
        .collect()
}

fn non_blank(s: &str) -> Option<String> {
    let trimmed = s.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_owned())
}

/// Scalar rendered as text.
fn text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => non_blank(s),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn field_or_placeholder(map: &Map<String, Value>, keys: &[&str]) -> String {
    lookup_any(map, keys)
        .and_then(text)
        .unwrap_or_else(|| PLACEHOLDER.to_owned())
}

fn placeholder_list() -> Vec<String> {
    vec![PLACEHOLDER.to_owned()]
}

/// A list of strings from an array, an object-per-entry array, or a delimited
/// string.
fn text_list(value: &Value) -> Vec<String> {
    match value {
        Value::Array(entries) => entries.iter().filter_map(entry_text).collect(),
        Value::String(s) => split_text_list(s),
        other => text(other).into_iter().collect(),
    }
}

fn entry_text(value: &Value) -> Option<String> {
    match value {
        Value::Object(map) => {
            let name = lookup_any(map, ENTRY_TEXT_KEYS).and_then(text)?;
            match lookup_any(map, QUANTITY_KEYS).and_then(text) {
                Some(qty) => Some(format!("{qty} {name}")),
                None => Some(name),
            }
        }
        other => text(other),
    }
}

/// Splits on newlines, or on commas/semicolons for single-line lists.
/// Leading list markers (`1.`, `-`, `*`) are stripped.
fn split_text_list(s: &str) -> Vec<String> {
    let parts: Vec<&str> = if s.contains('\n') {
        s.lines().collect()
    } else if s.contains(';') {
        s.split(';').collect()
    } else if s.contains(',') && !s.contains(". ") {
        s.split(',').collect()
    } else {
        vec![s]
    };
    parts
        .into_iter()
        .map(strip_list_marker)
        .filter_map(non_blank)
        .collect()
}

fn strip_list_marker(line: &str) -> &str {
    let trimmed = line.trim_start();
    let without_number = trimmed.trim_start_matches(|c: char| c.is_ascii_digit());
    let without_number = if without_number.len() < trimmed.len() {
        without_number
            .strip_prefix('.')
            .or_else(|| without_number.strip_prefix(')'))
            .unwrap_or(trimmed)
    } else {
        trimmed
    };
    without_number
        .trim_start_matches(['-', '*', '•'])
        .trim_start()
}

/// First integer in a number or a string such as `"25 minutes"`.
fn minutes(value: &Value) -> Option<u32> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f.round() as u64))
            .and_then(|m| u32::try_from(m).ok()),
        Value::String(s) => {
            let digits: String = s
                .chars()
                .skip_while(|c| !c.is_ascii_digit())
                .take_while(char::is_ascii_digit)
                .collect();
            digits.parse().ok()
        }
        _ => None,
    }
}

/// Reported confidence, or [`Confidence::UNREPORTED`] when absent or unreadable.
fn confidence_of(map: &Map<String, Value>) -> Confidence {
    lookup_any(map, CONFIDENCE_KEYS)
        .and_then(parse_confidence)
        .unwrap_or(Confidence::UNREPORTED)
}

pub(crate) fn parse_confidence(value: &Value) -> Option<Confidence> {
    match value {
        Value::Number(n) => n.as_f64().map(Confidence::from_reported),
        Value::String(s) => {
            let s = s.trim();
            match s.strip_suffix('%') {
                Some(pct) => pct.trim().parse::<f64>().ok().map(|p| Confidence::clamped(p / 100.0)),
                None => s.parse::<f64>().ok().map(Confidence::from_reported),
            }
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn meals(value: Value) -> Vec<Meal> {
        interpret(RequestKind::ContentGeneration, &value)
            .expect("shape should be recognised")
            .into_iter()
            .map(|item| match item {
                ContentItem::Meal(m) => m,
                other => panic!("unexpected item {other:?}"),
            })
            .collect()
    }

    fn ingredients(value: Value) -> Vec<RecognizedIngredient> {
        interpret(RequestKind::ImageRecognition, &value)
            .expect("shape should be recognised")
            .into_iter()
            .map(|item| match item {
                ContentItem::Ingredient(i) => i,
                other => panic!("unexpected item {other:?}"),
            })
            .collect()
    }

    #[test]
    fn reads_wrapped_meal_list_with_synonyms() {
        let found = meals(json!({
            "mealPlan": [{
                "title": "Omelette",
                "ingredients": [{"name": "eggs", "quantity": "3"}, "chives"],
                "steps": "1. Whisk eggs\n2. Cook gently",
                "prepTime": "15 minutes",
                "confidence": 0.9
            }]
        }));
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "Omelette");
        assert_eq!(found[0].ingredients, vec!["3 eggs", "chives"]);
        assert_eq!(found[0].instructions, vec!["Whisk eggs", "Cook gently"]);
        assert_eq!(found[0].prep_minutes, Some(15));
        assert_eq!(found[0].confidence.as_f64(), 0.9);
    }

    #[test]
    fn single_meal_object_fills_placeholders() {
        let found = meals(json!({"name": "Soup", "ingredients": ["a", "b"]}));
        assert_eq!(found[0].ingredients, vec!["a", "b"]);
        assert_eq!(found[0].instructions, vec![PLACEHOLDER]);
        assert_eq!(found[0].confidence, Confidence::UNREPORTED);
    }

    #[test]
    fn empty_collection_is_an_empty_success() {
        assert_eq!(
            interpret(RequestKind::ContentGeneration, &json!({"meals": []})),
            Some(Vec::new())
        );
        assert_eq!(
            interpret(RequestKind::ImageRecognition, &json!([])),
            Some(Vec::new())
        );
    }

    #[test]
    fn unrecognised_shape_is_none() {
        assert_eq!(interpret(RequestKind::ContentGeneration, &json!({"foo": 1, "bar": 2})), None);
        assert_eq!(interpret(RequestKind::ContentGeneration, &json!("just text")), None);
    }

    #[test]
    fn recognition_accepts_strings_and_objects() {
        let found = ingredients(json!({
            "detected_ingredients": [
                "basil",
                {"item": "Tomato", "type": "vegetable", "amount": 3, "condition": "ripe", "score": "80%"},
                {"name": "Milk", "confidence": 0}
            ]
        }));
        assert_eq!(found.len(), 3);
        assert_eq!(found[0].name, "basil");
        assert_eq!(found[0].category, PLACEHOLDER);
        assert_eq!(found[1].quantity, "3");
        assert_eq!(found[1].freshness, "ripe");
        assert_eq!(found[1].confidence.as_f64(), 0.8);
        assert_eq!(found[2].confidence.as_f64(), 0.0);
    }

    #[test]
    fn out_of_range_confidence_is_clamped() {
        let found = ingredients(json!([{"name": "egg", "confidence": 250}]));
        assert_eq!(found[0].confidence.as_f64(), 1.0);
        let found = ingredients(json!([{"name": "egg", "confidence": -3}]));
        assert_eq!(found[0].confidence.as_f64(), 0.0);
    }

    #[test]
    fn comma_separated_ingredient_string_is_split() {
        let found = meals(json!([{"name": "Salad", "ingredients": "lettuce, tomato, cucumber"}]));
        assert_eq!(found[0].ingredients, vec!["lettuce", "tomato", "cucumber"]);
    }
}
