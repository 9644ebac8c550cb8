use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::Deserialize;

use super::descriptor::StyleDescriptor;

/// Where the loaded descriptors came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogSource {
    File(PathBuf),
    Samples,
}

/// Read-only style catalog, ordered as loaded.
#[derive(Debug, Clone)]
pub struct StyleCatalog {
    styles: IndexMap<String, StyleDescriptor>,
    source: CatalogSource,
    fallback_reason: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum CatalogDocument {
    List(Vec<StyleDescriptor>),
    Wrapped { styles: Vec<StyleDescriptor> },
}

impl CatalogDocument {
    fn into_styles(self) -> Vec<StyleDescriptor> {
        match self {
            Self::List(styles) | Self::Wrapped { styles } => styles,
        }
    }
}

impl StyleCatalog {
    pub fn new(styles: Vec<StyleDescriptor>, source: CatalogSource) -> Self {
        let mut map = IndexMap::new();
        for mut style in styles {
            let id = style.resolved_id();
            style.id = id.clone();
            map.insert(id, style);
        }
        Self {
            styles: map,
            source,
            fallback_reason: None,
        }
    }

    /// Built-in designs shown when the catalog store is unreachable or empty.
    pub fn samples() -> Self {
        Self::new(sample_styles(), CatalogSource::Samples)
    }

    /// Loads a JSON catalog (a list, or `{"styles": [...]}`).
    ///
    /// Never fails: an unreadable, malformed or empty file yields the samples
    /// with `fallback_reason` explaining why.
    pub fn load(path: &Path) -> Self {
        match read_styles(path) {
            Ok(styles) if !styles.is_empty() => {
                Self::new(styles, CatalogSource::File(path.to_path_buf()))
            }
            Ok(_) => Self::samples().with_fallback_reason(format!(
                "Catalog {} is empty; using sample designs.",
                path.display()
            )),
            Err(err) => Self::samples().with_fallback_reason(format!(
                "Catalog {} unavailable ({err:#}); using sample designs.",
                path.display()
            )),
        }
    }

    fn with_fallback_reason(mut self, reason: String) -> Self {
        self.fallback_reason = Some(reason);
        self
    }

    pub fn source(&self) -> &CatalogSource {
        &self.source
    }

    pub fn fallback_reason(&self) -> Option<&str> {
        self.fallback_reason.as_deref()
    }

    pub fn len(&self) -> usize {
        self.styles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.styles.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&StyleDescriptor> {
        self.styles.get(id.trim())
    }

    pub fn list(&self) -> impl Iterator<Item = &StyleDescriptor> {
        self.styles.values()
    }

    pub fn featured(&self) -> Vec<&StyleDescriptor> {
        self.styles.values().filter(|style| style.is_featured).collect()
    }

    pub fn by_category(&self, category: &str) -> Vec<&StyleDescriptor> {
        let wanted = category.trim();
        self.styles
            .values()
            .filter(|style| style.category.eq_ignore_ascii_case(wanted))
            .collect()
    }

    /// Distinct categories in first-seen order.
    pub fn categories(&self) -> Vec<&str> {
        let mut out: Vec<&str> = Vec::new();
        for style in self.styles.values() {
            if !out.contains(&style.category.as_str()) {
                out.push(style.category.as_str());
            }
        }
        out
    }
}

fn read_styles(path: &Path) -> anyhow::Result<Vec<StyleDescriptor>> {
    let raw = std::fs::read_to_string(path)?;
    let document: CatalogDocument = serde_json::from_str(&raw)?;
    Ok(document.into_styles())
}

fn sample_styles() -> Vec<StyleDescriptor> {
    vec![
        StyleDescriptor::new("1", "Classic Red", "Classic", "glossy red nail polish")
            .with_image_url("https://placehold.co/400x400/png"),
        StyleDescriptor::new("2", "Gold Glitter", "Glam", "gold glitter ombre nail polish")
            .with_image_url("https://placehold.co/400x400/png")
            .premium(),
    ]
}
