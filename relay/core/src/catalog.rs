//! Model Catalog
//!
//! The static, externally configured set of model identifiers a user can
//! select with the `@` command, plus the default used when a conversation
//! state does not name one. The catalog is built once at startup and never
//! mutated by the turn processor.

use serde::{Deserialize, Serialize};

use crate::config::ConfigError;

/// Model used when neither the caller state nor the config names one
pub const DEFAULT_MODEL: &str = "openai/gpt-oss-120b:free";

/// Built-in curated model list, in display order
pub const BUILTIN_MODELS: &[&str] = &[
    "moonshotai/kimi-k2",
    "deepseek/deepseek-chat-v3.1",
    "qwen/qwen3-coder",
    "openai/gpt-oss-120b",
    "openai/gpt-oss-20b",
    "openchat/openchat-7b",
    "openai/gpt-5",
    "mistralai/mistral-7b-instruct",
    "deepseek/deepseek-chat-v3.1:free",
    DEFAULT_MODEL,
];

/// Ordered list of selectable models plus the default identifier
///
/// Deserializing runs the same validation as [`ModelCatalog::new`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "CatalogFields")]
pub struct ModelCatalog {
    models: Vec<String>,
    default_model: String,
}

/// Unchecked wire shape of a catalog
#[derive(Deserialize)]
struct CatalogFields {
    models: Vec<String>,
    default_model: String,
}

impl TryFrom<CatalogFields> for ModelCatalog {
    type Error = ConfigError;

    fn try_from(fields: CatalogFields) -> Result<Self, Self::Error> {
        Self::new(fields.models, fields.default_model)
    }
}

impl Default for ModelCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

impl ModelCatalog {
    /// Create a validated catalog
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` if the list is empty, contains
    /// blank identifiers, or does not include the default model.
    pub fn new(
        models: Vec<String>,
        default_model: impl Into<String>,
    ) -> Result<Self, ConfigError> {
        let default_model = default_model.into();

        if models.is_empty() {
            return Err(ConfigError::ValidationError(
                "model catalog must not be empty".to_string(),
            ));
        }
        if let Some(blank) = models.iter().position(|m| m.trim().is_empty()) {
            return Err(ConfigError::ValidationError(format!(
                "model catalog entry {blank} is blank"
            )));
        }
        if !models.iter().any(|m| m == &default_model) {
            return Err(ConfigError::ValidationError(format!(
                "default model '{default_model}' is not in the catalog"
            )));
        }

        Ok(Self {
            models,
            default_model,
        })
    }

    /// The curated list shipped with the relay
    #[must_use]
    pub fn builtin() -> Self {
        Self {
            models: BUILTIN_MODELS.iter().map(|m| (*m).to_string()).collect(),
            default_model: DEFAULT_MODEL.to_string(),
        }
    }

    /// All identifiers in catalog order
    #[must_use]
    pub fn models(&self) -> &[String] {
        &self.models
    }

    /// The default identifier
    #[must_use]
    pub fn default_model(&self) -> &str {
        &self.default_model
    }

    /// Every entry equal to `name` ignoring case, in catalog order
    ///
    /// This is a full equality test after case folding, not a prefix match.
    #[must_use]
    pub fn matches_ignore_case(&self, name: &str) -> Vec<&str> {
        let needle = name.to_lowercase();
        self.models
            .iter()
            .filter(|m| m.to_lowercase() == needle)
            .map(String::as_str)
            .collect()
    }
}
