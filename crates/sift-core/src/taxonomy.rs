//! Category taxonomy
//!
//! The read-only reference set every categorization must land in.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::config::read_layered;
use crate::error::{Error, Result};
use crate::models::UNCATEGORIZED;

/// Embedded default taxonomy (compiled into binary)
const DEFAULT_TAXONOMY: &str = include_str!("../../../config/taxonomy.toml");

pub const TAXONOMY_FILE: &str = "taxonomy.toml";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub code: String,
    pub name: String,
    #[serde(default)]
    pub subcategories: Vec<String>,
}

impl Category {
    pub fn has_subcategory(&self, code: &str) -> bool {
        self.subcategories.iter().any(|s| s == code)
    }
}

#[derive(Debug, Clone)]
pub struct Taxonomy {
    categories: BTreeMap<String, Category>,
}

impl Taxonomy {
    /// Explicit path, then data dir override, then the embedded default
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let content = read_layered(explicit, TAXONOMY_FILE, DEFAULT_TAXONOMY)?;
        Self::from_toml_str(&content)
    }

    pub fn embedded() -> Result<Self> {
        Self::from_toml_str(DEFAULT_TAXONOMY)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let raw: RawTaxonomy = toml::from_str(content)
            .map_err(|e| Error::Config(format!("Invalid taxonomy.toml: {}", e)))?;

        let mut categories = BTreeMap::new();
        for category in raw.category {
            let code = category.code.trim().to_lowercase();
            if code.is_empty() {
                return Err(Error::Config("taxonomy category with empty code".into()));
            }
            if categories.contains_key(&code) {
                return Err(Error::Config(format!("duplicate taxonomy category: {}", code)));
            }
            categories.insert(code.clone(), Category { code, ..category });
        }

        categories
            .entry(UNCATEGORIZED.to_string())
            .or_insert_with(|| Category {
                code: UNCATEGORIZED.to_string(),
                name: "Uncategorized".to_string(),
                subcategories: Vec::new(),
            });

        Ok(Self { categories })
    }

    pub fn get(&self, code: &str) -> Option<&Category> {
        self.categories.get(code)
    }

    pub fn contains(&self, code: &str) -> bool {
        self.categories.contains_key(code)
    }

    pub fn is_valid(&self, category: &str, subcategory: Option<&str>) -> bool {
        match (self.get(category), subcategory) {
            (Some(_), None) => true,
            (Some(c), Some(sub)) => c.has_subcategory(sub),
            (None, _) => false,
        }
    }

    /// Fail with `InvalidData` unless the pair is in the taxonomy
    pub fn validate(&self, category: &str, subcategory: Option<&str>) -> Result<()> {
        let Some(c) = self.get(category) else {
            return Err(Error::InvalidData(format!("Unknown category: {}", category)));
        };
        if let Some(sub) = subcategory {
            if !c.has_subcategory(sub) {
                return Err(Error::InvalidData(format!(
                    "Unknown subcategory '{}' for category '{}'",
                    sub, category
                )));
            }
        }
        Ok(())
    }

    pub fn categories(&self) -> impl Iterator<Item = &Category> {
        self.categories.values()
    }

    pub fn len(&self) -> usize {
        self.categories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }
}

#[derive(Debug, Deserialize)]
struct RawTaxonomy {
    #[serde(default)]
    category: Vec<Category>,
}
