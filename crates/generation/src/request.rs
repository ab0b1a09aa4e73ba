//! Normalized generation requests.
//!
//! A [`GenerationRequest`] never carries a provider-specific shape: adapters
//! translate it into their own wire format (see [`crate::prompt`] for the shared
//! instruction text).

use serde::{Deserialize, Serialize};

/// The two use cases the engine serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RequestKind {
    /// Structured meal-plan generation from an ingredient list.
    ContentGeneration,
    /// Ingredient recognition from a photo.
    ImageRecognition,
}

impl std::fmt::Display for RequestKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ContentGeneration => f.write_str("content-generation"),
            Self::ImageRecognition => f.write_str("image-recognition"),
        }
    }
}

/// An immutable request for generated content, discriminated by kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum GenerationRequest {
    ContentGeneration(MealPlanRequest),
    ImageRecognition(ImageRecognitionRequest),
}

impl GenerationRequest {
    /// Returns the discriminant of this request.
    pub fn kind(&self) -> RequestKind {
        match self {
            Self::ContentGeneration(_) => RequestKind::ContentGeneration,
            Self::ImageRecognition(_) => RequestKind::ImageRecognition,
        }
    }

    /// Returns the image payload, if this request carries one.
    pub fn image(&self) -> Option<&EncodedImage> {
        match self {
            Self::ContentGeneration(_) => None,
            Self::ImageRecognition(req) => Some(&req.image),
        }
    }
}

impl From<MealPlanRequest> for GenerationRequest {
    fn from(value: MealPlanRequest) -> Self {
        Self::ContentGeneration(value)
    }
}

impl From<ImageRecognitionRequest> for GenerationRequest {
    fn from(value: ImageRecognitionRequest) -> Self {
        Self::ImageRecognition(value)
    }
}

// ---------------------------------------------------------------------------
// Meal plans
// ---------------------------------------------------------------------------

/// Inputs for a meal plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MealPlanRequest {
    /// Available ingredients, trimmed and de-blanked, in caller order.
    pub ingredients: Vec<String>,
    /// Dietary restrictions (e.g. `"vegetarian"`, `"no nuts"`).
    #[serde(default)]
    pub restrictions: Vec<String>,
    #[serde(default)]
    pub cuisine: Option<String>,
    /// Number of servings per meal.
    pub servings: u32,
    /// Number of meals to propose.
    pub meal_count: u32,
    /// Free-form caller notes appended to the prompt.
    #[serde(default)]
    pub notes: Option<String>,
}

impl MealPlanRequest {
    pub const DEFAULT_SERVINGS: u32 = 2;
    pub const DEFAULT_MEAL_COUNT: u32 = 3;

    /// Creates a request from raw ingredient strings.
    ///
    /// Blank entries are dropped and the rest trimmed.
    #[must_use]
    pub fn new<I, S>(ingredients: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            ingredients: normalize_list(ingredients),
            restrictions: Vec::new(),
            cuisine: None,
            servings: Self::DEFAULT_SERVINGS,
            meal_count: Self::DEFAULT_MEAL_COUNT,
            notes: None,
        }
    }

    #[must_use]
    pub fn with_restrictions<I, S>(mut self, restrictions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.restrictions = normalize_list(restrictions);
        self
    }

    #[must_use]
    pub fn with_cuisine(mut self, cuisine: impl Into<String>) -> Self {
        self.cuisine = Some(cuisine.into()).filter(|c: &String| !c.trim().is_empty());
        self
    }

    /// Sets the servings per meal; zero is raised to one.
    #[must_use]
    pub fn with_servings(mut self, servings: u32) -> Self {
        self.servings = servings.max(1);
        self
    }

    /// Sets the number of meals; zero is raised to one.
    #[must_use]
    pub fn with_meal_count(mut self, meal_count: u32) -> Self {
        self.meal_count = meal_count.max(1);
        self
    }

    #[must_use]
    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into()).filter(|n: &String| !n.trim().is_empty());
        self
    }
}

fn normalize_list<I, S>(values: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    values
        .into_iter()
        .map(|v| v.as_ref().trim().to_owned())
        .filter(|v| !v.is_empty())
        .collect()
}

// ---------------------------------------------------------------------------
// Image recognition
// ---------------------------------------------------------------------------

/// Image formats accepted by every built-in adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ImageMediaType {
    #[serde(rename = "image/jpeg")]
    Jpeg,
    #[serde(rename = "image/png")]
    Png,
    #[serde(rename = "image/webp")]
    Webp,
    #[serde(rename = "image/gif")]
    Gif,
}

impl ImageMediaType {
    /// Returns the MIME type string.
    pub fn as_mime(self) -> &'static str {
        match self {
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
            Self::Webp => "image/webp",
            Self::Gif => "image/gif",
        }
    }

    /// Guesses the media type from a file extension (case-insensitive).
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "jpg" | "jpeg" => Some(Self::Jpeg),
            "png" => Some(Self::Png),
            "webp" => Some(Self::Webp),
            "gif" => Some(Self::Gif),
            _ => None,
        }
    }
}

/// A base64-encoded image with its media type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncodedImage {
    pub media_type: ImageMediaType,
    /// Standard-alphabet base64 without a `data:` prefix.
    pub base64_data: String,
}

impl EncodedImage {
    /// Creates an image payload. Returns `None` for empty data.
    pub fn new(media_type: ImageMediaType, base64_data: impl Into<String>) -> Option<Self> {
        let data = base64_data.into();
        if data.trim().is_empty() {
            None
        } else {
            Some(Self {
                media_type,
                base64_data: data,
            })
        }
    }

    /// Renders the payload as a `data:` URL.
    pub fn to_data_url(&self) -> String {
        format!("data:{};base64,{}", self.media_type.as_mime(), self.base64_data)
    }
}

/// Inputs for recognising ingredients in a photo.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageRecognitionRequest {
    pub image: EncodedImage,
    /// Optional caller hint (e.g. `"contents of my fridge"`).
    #[serde(default)]
    pub hint: Option<String>,
}

impl ImageRecognitionRequest {
    #[must_use]
    pub fn new(image: EncodedImage) -> Self {
        Self { image, hint: None }
    }

    #[must_use]
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into()).filter(|h: &String| !h.trim().is_empty());
        self
    }
}
