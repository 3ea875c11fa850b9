//! Span attributes for pipeline runs.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Attributes describing one pipeline run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineSpanAttributes {
    /// Pipeline name.
    pub pipeline_name: Option<String>,
    /// Pipeline run ID.
    pub run_id: Option<String>,
    /// Number of base stages after the producer.
    pub base_stage_count: Option<usize>,
    /// Fork names in registration order.
    pub fork_names: Vec<String>,
    /// Service name.
    pub service: Option<String>,
}

impl PipelineSpanAttributes {
    /// Creates new pipeline span attributes.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the pipeline name.
    #[must_use]
    pub fn with_pipeline_name(mut self, name: impl Into<String>) -> Self {
        self.pipeline_name = Some(name.into());
        self
    }

    /// Sets the pipeline run ID.
    #[must_use]
    pub fn with_run_id(mut self, id: impl Into<String>) -> Self {
        self.run_id = Some(id.into());
        self
    }

    /// Sets the number of base stages.
    #[must_use]
    pub fn with_base_stage_count(mut self, count: usize) -> Self {
        self.base_stage_count = Some(count);
        self
    }

    /// Sets the fork names.
    #[must_use]
    pub fn with_fork_names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fork_names = names.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the service name.
    #[must_use]
    pub fn with_service(mut self, service: impl Into<String>) -> Self {
        self.service = Some(service.into());
        self
    }

    /// Converts to OpenTelemetry-style attributes.
    #[must_use]
    pub fn to_otel_attributes(&self) -> HashMap<String, String> {
        let mut attrs = HashMap::new();

        if let Some(ref v) = self.pipeline_name {
            attrs.insert("pipeline.name".to_string(), v.clone());
        }
        if let Some(ref v) = self.run_id {
            attrs.insert("pipeline.run_id".to_string(), v.clone());
        }
        if let Some(v) = self.base_stage_count {
            attrs.insert("pipeline.base_stages".to_string(), v.to_string());
        }
        attrs.insert(
            "pipeline.fork_count".to_string(),
            self.fork_names.len().to_string(),
        );
        if !self.fork_names.is_empty() {
            attrs.insert("pipeline.forks".to_string(), self.fork_names.join(","));
        }
        if let Some(ref v) = self.service {
            attrs.insert("service.name".to_string(), v.clone());
        }

        attrs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_otel_attributes() {
        let attrs = PipelineSpanAttributes::new()
            .with_pipeline_name("export")
            .with_run_id("run-1")
            .with_base_stage_count(2)
            .with_fork_names(["csv", "parquet"])
            .to_otel_attributes();

        assert_eq!(attrs.get("pipeline.name").map(String::as_str), Some("export"));
        assert_eq!(attrs.get("pipeline.base_stages").map(String::as_str), Some("2"));
        assert_eq!(attrs.get("pipeline.fork_count").map(String::as_str), Some("2"));
        assert_eq!(attrs.get("pipeline.forks").map(String::as_str), Some("csv,parquet"));
        assert!(!attrs.contains_key("service.name"));
    }

    #[test]
    fn test_empty_attributes_report_zero_forks() {
        let attrs = PipelineSpanAttributes::new().to_otel_attributes();

        assert_eq!(attrs.len(), 1);
        assert_eq!(attrs.get("pipeline.fork_count").map(String::as_str), Some("0"));
    }
}
