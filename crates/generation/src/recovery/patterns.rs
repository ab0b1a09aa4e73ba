//! Last-resort field extraction with regular expressions.
//!
//! Used when no parser could read the output as a structure. Each occurrence
//! of a name field starts a new item; the other fields are searched for only
//! between that name and the next one. For meals, a name inside an
//! `ingredients` or `instructions` list belongs to a list entry and never
//! starts a meal. Fields that are not found are filled
//! with [`PLACEHOLDER`] so every item has a complete shape.

use std::sync::LazyLock;

use regex::{Captures, Regex};

use super::extract::balanced_end;
use super::interpret::parse_confidence;
use crate::{Confidence, ContentItem, Meal, RecognizedIngredient, RequestKind, PLACEHOLDER};

/// Builds `key: value` where the value is double-quoted, single-quoted, or bare
/// up to the next delimiter.
fn scalar_field(keys: &str) -> Option<Regex> {
    Regex::new(&format!(
        r#"(?i)["']?\b(?:{keys})\b["']?\s*[:=]\s*(?:"((?:[^"\\\n]|\\.)*)"|'((?:[^'\\\n]|\\.)*)'|([^,\n{{}}\[\]"']+))"#
    ))
    .ok()
}

/// Like [`scalar_field`], but a bare value runs to the end of the line so
/// comma-separated lists stay whole.
fn line_field(keys: &str) -> Option<Regex> {
    Regex::new(&format!(
        r#"(?i)["']?\b(?:{keys})\b["']?\s*[:=]\s*(?:"((?:[^"\\\n]|\\.)*)"|'((?:[^'\\\n]|\\.)*)'|([^\n\[]+))"#
    ))
    .ok()
}

/// Builds `key: [ ... ]`, capturing the bracket body.
fn list_field(keys: &str) -> Option<Regex> {
    Regex::new(&format!(r#"(?is)["']?\b(?:{keys})\b["']?\s*[:=]\s*\[(.*?)\]"#)).ok()
}

/// Builds `key: [`, ending at the opening bracket.
fn list_open(keys: &str) -> Option<Regex> {
    Regex::new(&format!(r#"(?i)["']?\b(?:{keys})\b["']?\s*[:=]\s*\["#)).ok()
}

static MEAL_NAME: LazyLock<Option<Regex>> =
    LazyLock::new(|| scalar_field("name|title|recipe_name|meal_name"));
static MEAL_INGREDIENTS_LIST: LazyLock<Option<Regex>> =
    LazyLock::new(|| list_field("ingredients"));
static MEAL_INGREDIENTS_TEXT: LazyLock<Option<Regex>> =
    LazyLock::new(|| line_field("ingredients"));
static MEAL_INSTRUCTIONS_LIST: LazyLock<Option<Regex>> =
    LazyLock::new(|| list_field("instructions|steps|directions|method"));
static MEAL_INSTRUCTIONS_TEXT: LazyLock<Option<Regex>> =
    LazyLock::new(|| line_field("instructions|steps|directions|method"));
static MEAL_LIST_OPEN: LazyLock<Option<Regex>> =
    LazyLock::new(|| list_open("ingredients|instructions|steps|directions|method"));

static INGREDIENT_NAME: LazyLock<Option<Regex>> =
    LazyLock::new(|| scalar_field("name|ingredient|item|food"));
static INGREDIENT_CATEGORY: LazyLock<Option<Regex>> =
    LazyLock::new(|| scalar_field("category|type|group"));
static INGREDIENT_QUANTITY: LazyLock<Option<Regex>> =
    LazyLock::new(|| scalar_field("quantity|amount|count|qty"));
static INGREDIENT_FRESHNESS: LazyLock<Option<Regex>> =
    LazyLock::new(|| scalar_field("freshness|condition|ripeness"));
static CONFIDENCE: LazyLock<Option<Regex>> = LazyLock::new(|| {
    // Matches: confidence: 0.8, "score": "85%", confidence = 92
    Regex::new(r#"(?i)["']?\b(?:confidence|score|probability)\b["']?\s*[:=]\s*["']?(-?\d+(?:\.\d+)?\s*%?)"#)
        .ok()
});

/// Text of an object entry inside a list, e.g. `{"name": "beef"}`.
static ENTRY_TEXT: LazyLock<Option<Regex>> =
    LazyLock::new(|| scalar_field("name|ingredient|item|text|step|description|instruction"));

/// Quoted entries inside a captured list body.
static QUOTED_ENTRY: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r#""((?:[^"\\]|\\.)*)"|'((?:[^'\\]|\\.)*)'"#).ok());

/// Extracts items from raw text. Returns `None` if no item was found.
pub fn extract_items(kind: RequestKind, text: &str) -> Option<Vec<ContentItem>> {
    let name_pattern = match kind {
        RequestKind::ContentGeneration => MEAL_NAME.as_ref()?,
        RequestKind::ImageRecognition => INGREDIENT_NAME.as_ref()?,
    };

    let nested = match kind {
        RequestKind::ContentGeneration => list_bodies(text),
        RequestKind::ImageRecognition => Vec::new(),
    };
    let names: Vec<(usize, String)> = name_pattern
        .captures_iter(text)
        .filter_map(|cap| {
            let start = cap.get(0)?.start();
            if nested.iter().any(|body| body.contains(&start)) {
                return None;
            }
            scalar_value(&cap).map(|name| (start, name))
        })
        .collect();

    let items: Vec<ContentItem> = names
        .iter()
        .enumerate()
        .map(|(idx, (start, name))| {
            let end = names.get(idx + 1).map_or(text.len(), |(next, _)| *next);
            let segment = &text[*start..end];
            match kind {
                RequestKind::ContentGeneration => ContentItem::Meal(meal(name, segment)),
                RequestKind::ImageRecognition => {
                    ContentItem::Ingredient(ingredient(name, segment))
                }
            }
        })
        .collect();

    (!items.is_empty()).then_some(items)
}

/// Byte ranges of ingredient and instruction list bodies. An unclosed list
/// runs to the end of the text.
fn list_bodies(text: &str) -> Vec<std::ops::Range<usize>> {
    let Some(re) = MEAL_LIST_OPEN.as_ref() else {
        return Vec::new();
    };
    re.find_iter(text)
        .map(|m| {
            let open = m.end() - 1;
            let end = balanced_end(&text[open..]).map_or(text.len(), |len| open + len);
            open..end
        })
        .collect()
}

fn meal(name: &str, segment: &str) -> Meal {
    let ingredients = list_in(segment, &MEAL_INGREDIENTS_LIST, &MEAL_INGREDIENTS_TEXT);
    let instructions = list_in(segment, &MEAL_INSTRUCTIONS_LIST, &MEAL_INSTRUCTIONS_TEXT);
    Meal {
        name: name.to_owned(),
        ingredients: or_placeholder_list(ingredients),
        instructions: or_placeholder_list(instructions),
        prep_minutes: None,
        confidence: confidence_in(segment),
    }
}

fn ingredient(name: &str, segment: &str) -> RecognizedIngredient {
    RecognizedIngredient {
        name: name.to_owned(),
        category: scalar_in(segment, &INGREDIENT_CATEGORY),
        quantity: scalar_in(segment, &INGREDIENT_QUANTITY),
        freshness: scalar_in(segment, &INGREDIENT_FRESHNESS),
        confidence: confidence_in(segment),
    }
}

/// Value of whichever alternative of a [`scalar_field`] pattern matched.
fn scalar_value(cap: &Captures<'_>) -> Option<String> {
    (1..=3)
        .find_map(|group| cap.get(group))
        .map(|m| unescape(m.as_str().trim()))
        .filter(|v| !v.is_empty())
}

fn scalar_in(segment: &str, pattern: &LazyLock<Option<Regex>>) -> String {
    pattern
        .as_ref()
        .and_then(|re| re.captures(segment))
        .and_then(|cap| scalar_value(&cap))
        .unwrap_or_else(|| PLACEHOLDER.to_owned())
}

fn list_in(
    segment: &str,
    list_pattern: &LazyLock<Option<Regex>>,
    text_pattern: &LazyLock<Option<Regex>>,
) -> Vec<String> {
    if let Some(body) = list_pattern
        .as_ref()
        .and_then(|re| re.captures(segment))
        .and_then(|cap| cap.get(1))
    {
        let body = body.as_str();
        if body.contains('{') {
            let entries: Vec<String> = ENTRY_TEXT
                .as_ref()
                .map(|re| re.captures_iter(body).filter_map(|cap| scalar_value(&cap)).collect())
                .unwrap_or_default();
            if !entries.is_empty() {
                return entries;
            }
        }
        let quoted: Vec<String> = QUOTED_ENTRY
            .as_ref()
            .map(|re| {
                re.captures_iter(body)
                    .filter_map(|cap| cap.get(1).or_else(|| cap.get(2)))
                    .map(|m| unescape(m.as_str().trim()))
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_default();
        if !quoted.is_empty() {
            return quoted;
        }
        return split_bare(body);
    }
    text_pattern
        .as_ref()
        .and_then(|re| re.captures(segment))
        .and_then(|cap| scalar_value(&cap))
        .map(|value| split_bare(&value))
        .unwrap_or_default()
}

fn split_bare(body: &str) -> Vec<String> {
    body.split([',', ';', '\n'])
        .map(|s| s.trim().trim_matches(['"', '\'']).trim())
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
        .collect()
}

fn confidence_in(segment: &str) -> Confidence {
    CONFIDENCE
        .as_ref()
        .and_then(|re| re.captures(segment))
        .and_then(|cap| cap.get(1))
        .and_then(|m| parse_confidence(&serde_json::Value::String(m.as_str().to_owned())))
        .unwrap_or(Confidence::UNREPORTED)
}

fn or_placeholder_list(list: Vec<String>) -> Vec<String> {
    if list.is_empty() {
        vec![PLACEHOLDER.to_owned()]
    } else {
        list
    }
}

fn unescape(s: &str) -> String {
    s.replace("\\\"", "\"").replace("\\'", "'").replace("\\n", " ")
}
