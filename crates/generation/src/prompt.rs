//! Prompt text sent to providers.
//!
//! Adapters own the wire format; the wording of the instructions lives here so
//! every provider is asked the same question in the same shape.

use crate::{GenerationRequest, ImageRecognitionRequest, MealPlanRequest};

/// System and user text for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub system: String,
    pub user: String,
}

const MEAL_SYSTEM: &str = "You are a meal planning assistant. Reply with JSON only, \
no prose and no markdown. The JSON must be an object with a \"meals\" array. Each meal \
has \"name\" (string), \"ingredients\" (array of strings), \"instructions\" (array of \
strings), \"prep_minutes\" (integer) and \"confidence\" (number between 0 and 1).";

const RECOGNITION_SYSTEM: &str = "You identify food ingredients in photos. Reply with \
JSON only, no prose and no markdown. The JSON must be an object with an \"ingredients\" \
array. Each entry has \"name\" (string), \"category\" (string), \"quantity\" (string), \
\"freshness\" (string) and \"confidence\" (number between 0 and 1). If nothing edible is \
visible, reply with {\"ingredients\": []}.";

/// Builds the prompt for `request`.
pub fn build(request: &GenerationRequest) -> Prompt {
    match request {
        GenerationRequest::ContentGeneration(r) => meal_plan(r),
        GenerationRequest::ImageRecognition(r) => recognition(r),
    }
}

fn meal_plan(request: &MealPlanRequest) -> Prompt {
    let mut user = format!(
        "Suggest {} meal(s), {} serving(s) each, using these ingredients: {}.",
        request.meal_count,
        request.servings,
        request.ingredients.join(", ")
    );
    if !request.restrictions.is_empty() {
        user.push_str(&format!(
            "\nDietary restrictions: {}.",
            request.restrictions.join(", ")
        ));
    }
    if let Some(cuisine) = &request.cuisine {
        user.push_str(&format!("\nPreferred cuisine: {cuisine}."));
    }
    if let Some(notes) = &request.notes {
        user.push_str(&format!("\nNotes: {notes}"));
    }
    Prompt {
        system: MEAL_SYSTEM.to_owned(),
        user,
    }
}

fn recognition(request: &ImageRecognitionRequest) -> Prompt {
    let mut user = "List every food ingredient visible in the attached image.".to_owned();
    if let Some(hint) = &request.hint {
        user.push_str(&format!("\nContext: {hint}"));
    }
    Prompt {
        system: RECOGNITION_SYSTEM.to_owned(),
        user,
    }
}
