use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::ConfigError;

/// Ranking window understood by the upstream `top` listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Window {
    Hour,
    #[default]
    Day,
    Week,
    Month,
    Year,
    All,
}

impl Window {
    pub fn as_str(&self) -> &'static str {
        match self {
            Window::Hour => "hour",
            Window::Day => "day",
            Window::Week => "week",
            Window::Month => "month",
            Window::Year => "year",
            Window::All => "all",
        }
    }
}

impl fmt::Display for Window {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct SourceConfig {
    /// Source ids (subreddit names), fetched and merged in this order
    pub sources: Vec<String>,
    /// Maximum number of items kept per refresh
    #[serde(default = "default_limit")]
    pub limit: u32,
    #[serde(default)]
    pub window: Window,
}

fn default_limit() -> u32 {
    3
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            sources: vec!["memes".to_string()],
            limit: default_limit(),
            window: Window::Day,
        }
    }
}

impl SourceConfig {
    /// Load the config, falling back to [`SourceConfig::default`] on any error.
    ///
    /// A broken config file must not keep the service from refreshing, so the
    /// error is logged and swallowed here.
    pub fn load<P: AsRef<Path>>(path: P) -> Self {
        match Self::try_load(&path) {
            Ok(config) => config,
            Err(e) => {
                warn!(
                    "Using default source config, could not load {}: {}",
                    path.as_ref().display(),
                    e
                );
                Self::default()
            }
        }
    }

    pub fn try_load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_str(&content)
    }

    /// Parse config from a TOML string (useful for testing)
    pub fn from_str(content: &str) -> Result<Self, ConfigError> {
        let config: SourceConfig = toml::from_str(content)?;
        config.validated()
    }

    fn validated(mut self) -> Result<Self, ConfigError> {
        if self.limit == 0 {
            return Err(ConfigError::Invalid("limit must be positive".to_string()));
        }

        self.sources = self
            .sources
            .into_iter()
            .map(|s| s.trim().to_string())
            .collect();
        if let Some(empty) = self.sources.iter().position(|s| s.is_empty()) {
            return Err(ConfigError::Invalid(format!(
                "source #{} has an empty id",
                empty + 1
            )));
        }

        // First occurrence wins
        let mut seen = std::collections::HashSet::new();
        self.sources.retain(|s| {
            let fresh = seen.insert(s.to_lowercase());
            if !fresh {
                warn!("Dropping duplicate source '{}'", s);
            }
            fresh
        });

        Ok(self)
    }
}
