//! Configuration of the in-process WASM module.

use serde::{Deserialize, Serialize};

use crate::error::{Result, SodiumError};
use crate::module::{MAX_PAGES, PAGE_SIZE};
use crate::module::heap::ALIGN;

/// Environment variable overriding [`ModuleConfig::initial_pages`].
pub const ENV_INITIAL_PAGES: &str = "SODIUM_XCHACHA_INITIAL_PAGES";

/// Environment variable overriding [`ModuleConfig::maximum_pages`].
pub const ENV_MAXIMUM_PAGES: &str = "SODIUM_XCHACHA_MAXIMUM_PAGES";

/// Linear memory layout of the module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleConfig {
    /// Pages allocated at startup (64 KiB each)
    #[serde(default = "default_initial_pages")]
    pub initial_pages: u32,
    /// Pages the memory may grow to
    #[serde(default = "default_maximum_pages")]
    pub maximum_pages: u32,
    /// First heap address; everything below is reserved
    #[serde(default = "default_heap_base")]
    pub heap_base: u32,
}

fn default_initial_pages() -> u32 {
    16
}

fn default_maximum_pages() -> u32 {
    // 2 GiB, the usual emscripten ceiling
    32_768
}

fn default_heap_base() -> u32 {
    1024
}

impl Default for ModuleConfig {
    fn default() -> Self {
        Self {
            initial_pages: default_initial_pages(),
            maximum_pages: default_maximum_pages(),
            heap_base: default_heap_base(),
        }
    }
}

impl ModuleConfig {
    /// Parse a TOML document. Missing keys take their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`SodiumError::InvalidConfig`] on malformed TOML or an invalid
    /// layout.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(s).map_err(|e| SodiumError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults overridden by [`ENV_INITIAL_PAGES`] and [`ENV_MAXIMUM_PAGES`].
    ///
    /// # Errors
    ///
    /// Returns [`SodiumError::InvalidConfig`] if a variable is not a number or
    /// the result is invalid.
    pub fn from_env() -> Result<Self> {
        Self::default().with_overrides(|name| std::env::var(name).ok())
    }

    /// Apply overrides from `lookup`, keyed by environment variable name.
    ///
    /// # Errors
    ///
    /// Returns [`SodiumError::InvalidConfig`] if a value is not a number or
    /// the result is invalid.
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup(ENV_INITIAL_PAGES) {
            self.initial_pages = parse_pages(ENV_INITIAL_PAGES, &value)?;
        }
        if let Some(value) = lookup(ENV_MAXIMUM_PAGES) {
            self.maximum_pages = parse_pages(ENV_MAXIMUM_PAGES, &value)?;
        }
        self.validate()?;
        Ok(self)
    }

    /// Check the layout is usable.
    ///
    /// # Errors
    ///
    /// Returns [`SodiumError::InvalidConfig`] describing the first problem.
    pub fn validate(&self) -> Result<()> {
        if self.initial_pages == 0 {
            return Err(SodiumError::InvalidConfig(
                "initial_pages must be at least 1".to_string(),
            ));
        }
        if self.maximum_pages > MAX_PAGES {
            return Err(SodiumError::InvalidConfig(format!(
                "maximum_pages {} exceeds the 32-bit limit of {MAX_PAGES}",
                self.maximum_pages
            )));
        }
        if self.initial_pages > self.maximum_pages {
            return Err(SodiumError::InvalidConfig(format!(
                "initial_pages {} exceeds maximum_pages {}",
                self.initial_pages, self.maximum_pages
            )));
        }
        if self.heap_base == 0 || self.heap_base % ALIGN != 0 {
            return Err(SodiumError::InvalidConfig(format!(
                "heap_base {} must be a non-zero multiple of {ALIGN}",
                self.heap_base
            )));
        }
        if self.heap_base as usize >= self.initial_pages as usize * PAGE_SIZE {
            return Err(SodiumError::InvalidConfig(format!(
                "heap_base {} lies outside the initial memory",
                self.heap_base
            )));
        }
        Ok(())
    }
}

fn parse_pages(name: &str, value: &str) -> Result<u32> {
    value
        .trim()
        .parse()
        .map_err(|_| SodiumError::InvalidConfig(format!("{name}: not a page count: {value:?}")))
}
