use serde::{Deserialize, Serialize};

/// One nail design as stored in the catalog.
///
/// Documents may spell fields in camelCase or snake_case. Optional fields are
/// resolved to concrete defaults here, so callers never branch on absence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StyleDescriptor {
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default = "default_category")]
    pub category: String,
    #[serde(default, alias = "imageUrl")]
    pub image_url: String,
    pub prompt: String,
    #[serde(default, alias = "isPremium")]
    pub is_premium: bool,
    #[serde(default, alias = "isFeatured")]
    pub is_featured: bool,
}

impl StyleDescriptor {
    pub fn new(id: &str, name: &str, category: &str, prompt: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            category: category.to_string(),
            image_url: String::new(),
            prompt: prompt.to_string(),
            is_premium: false,
            is_featured: false,
        }
    }

    pub fn premium(mut self) -> Self {
        self.is_premium = true;
        self
    }

    pub fn featured(mut self) -> Self {
        self.is_featured = true;
        self
    }

    pub fn with_image_url(mut self, url: &str) -> Self {
        self.image_url = url.to_string();
        self
    }

    /// Id to key the descriptor by; falls back to a slug of the name.
    pub(crate) fn resolved_id(&self) -> String {
        let trimmed = self.id.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
        slugify(&self.name)
    }
}

fn default_category() -> String {
    "Classic".to_string()
}

fn slugify(raw: &str) -> String {
    let mut out = String::new();
    let mut pending_dash = false;
    for ch in raw.chars() {
        if ch.is_ascii_alphanumeric() {
            if pending_dash && !out.is_empty() {
                out.push('-');
            }
            pending_dash = false;
            out.push(ch.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }
    out
}
