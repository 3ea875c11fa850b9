//! Configuration types for pipelines and paginated sources.

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Environment variable overriding [`PipelineConfig::channel_capacity`].
pub const CHANNEL_CAPACITY_ENV: &str = "FORKFLOW_CHANNEL_CAPACITY";

/// Environment variable overriding [`PaginationConfig::page_size`].
pub const PAGE_SIZE_ENV: &str = "FORKFLOW_PAGE_SIZE";

/// Configuration for a forking pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Name used in logs and spans.
    #[serde(default = "default_name")]
    pub name: String,
    /// Capacity of the links between stages of one branch.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

fn default_name() -> String {
    "pipeline".to_string()
}

fn default_channel_capacity() -> usize {
    64
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            channel_capacity: default_channel_capacity(),
        }
    }
}

impl PipelineConfig {
    /// Creates a new pipeline configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a configuration with environment overrides applied.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(capacity) = env_usize(CHANNEL_CAPACITY_ENV) {
            config.channel_capacity = capacity;
        }
        config
    }

    /// Sets the pipeline name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Sets the intra-branch channel capacity (minimum 1).
    #[must_use]
    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity.max(1);
        self
    }
}

/// Which pages keep their header row when converted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HeaderPolicy {
    /// Keep the first page's header, suppress it on later pages.
    #[default]
    FirstPageOnly,
    /// Suppress the header on every page.
    SuppressAll,
    /// Keep the header on every page.
    KeepAll,
}

impl HeaderPolicy {
    /// Returns whether the converter should drop the header of page `page`.
    #[must_use]
    pub fn suppress_header(self, page: usize) -> bool {
        match self {
            Self::FirstPageOnly => page > 0,
            Self::SuppressAll => true,
            Self::KeepAll => false,
        }
    }
}

/// Configuration for a paginated row source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaginationConfig {
    /// Rows requested per page.
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    /// Header handling across pages.
    #[serde(default)]
    pub header_policy: HeaderPolicy,
}

fn default_page_size() -> usize {
    1000
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            header_policy: HeaderPolicy::default(),
        }
    }
}

impl PaginationConfig {
    /// Creates a new pagination configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a configuration with environment overrides applied.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(page_size) = env_usize(PAGE_SIZE_ENV) {
            config.page_size = page_size;
        }
        config
    }

    /// Sets the page size (minimum 1).
    #[must_use]
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Sets the header policy.
    #[must_use]
    pub fn with_header_policy(mut self, policy: HeaderPolicy) -> Self {
        self.header_policy = policy;
        self
    }
}

fn env_usize(key: &str) -> Option<usize> {
    let raw = std::env::var(key).ok()?;
    match raw.trim().parse::<usize>() {
        Ok(value) if value > 0 => Some(value),
        _ => {
            warn!(key, value = %raw, "Ignoring invalid configuration override");
            None
        }
    }
}
