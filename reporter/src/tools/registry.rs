//! Named tool collections available to prompts.

use std::fmt;

use anyhow::Result;
use indexmap::IndexMap;
use serde_json::Value;

use crate::core::errors::{ConfigError, RunError};
use crate::tools::code::{CODE_BASE_COLLECTION, CODE_COLLECTION, code_base_tools, code_tools};
use crate::tools::{DONE_TOOL, Tool};

/// Builds the tools of one collection from the prompt's config value.
pub type ToolFactory = Box<dyn Fn(&Value) -> Result<Vec<Box<dyn Tool>>> + Send + Sync>;

/// Explicit, caller-owned mapping from collection name to factory.
///
/// Each run instantiates fresh tools from here, so nothing leaks between runs.
#[derive(Default)]
pub struct ToolRegistry {
    collections: IndexMap<String, ToolFactory>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in `code` and `code_base` collections.
    pub fn with_defaults() -> Self {
        let mut collections: IndexMap<String, ToolFactory> = IndexMap::new();
        collections.insert(CODE_COLLECTION.to_string(), Box::new(code_tools));
        collections.insert(CODE_BASE_COLLECTION.to_string(), Box::new(code_base_tools));
        Self { collections }
    }

    pub fn register<F>(&mut self, collection: impl Into<String>, factory: F) -> Result<(), ConfigError>
    where
        F: Fn(&Value) -> Result<Vec<Box<dyn Tool>>> + Send + Sync + 'static,
    {
        let collection = collection.into();
        if collection == DONE_TOOL {
            return Err(ConfigError::ReservedToolName { tool: collection });
        }
        if self.collections.contains_key(&collection) {
            return Err(ConfigError::DuplicateCollection { collection });
        }
        self.collections.insert(collection, Box::new(factory));
        Ok(())
    }

    pub fn contains(&self, collection: &str) -> bool {
        self.collections.contains_key(collection)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.collections.keys().map(String::as_str)
    }

    /// Instantiate the tools of `collection` with `config`.
    pub fn instantiate(&self, collection: &str, config: &Value) -> Result<Vec<Box<dyn Tool>>, RunError> {
        let factory = self
            .collections
            .get(collection)
            .ok_or_else(|| ConfigError::UnknownToolCollection {
                collection: collection.to_string(),
            })?;
        factory(config).map_err(|source| RunError::ToolConfig {
            collection: collection.to_string(),
            source,
        })
    }
}

impl fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.collections.keys()).finish()
    }
}
