//! Behaviour analyzer adapters

use async_trait::async_trait;
use tracing::debug;

use crate::domain::{AnalyzerError, RuntimeAnalyzer};

/// Analyzer used when no behaviour event source is wired in.
/// Sessions close with `anomalous_activities_detected` left empty.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopRuntimeAnalyzer;

#[async_trait]
impl RuntimeAnalyzer for NoopRuntimeAnalyzer {
    async fn update_runtime_monitoring_analysis(
        &self,
        container_id: &str,
    ) -> Result<(), AnalyzerError> {
        debug!(container_id, "No behaviour analyzer configured, skipping update");
        Ok(())
    }
}
