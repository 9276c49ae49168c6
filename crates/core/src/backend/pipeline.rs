//! Two-stage conversion through an intermediate format.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

use super::{AttemptContext, Backend, BackendDescriptor, MethodKind};
use crate::engine::{BackendOutput, ConversionError};
use crate::format::{SourceFormat, TargetFormat};
use crate::host::ConcurrencyHost;

/// Runs `first` to `intermediate`, then `second` on the result.
///
/// Both stages share the attempt directory; stage one writes into a
/// `stage1` subdirectory so its files never collide with the final outputs.
pub struct PipelineBackend {
    descriptor: BackendDescriptor,
    first: Arc<dyn Backend>,
    intermediate: TargetFormat,
    second: Arc<dyn Backend>,
}

impl PipelineBackend {
    pub fn new(
        id: &'static str,
        label: &'static str,
        first: Arc<dyn Backend>,
        intermediate: TargetFormat,
        second: Arc<dyn Backend>,
    ) -> Self {
        let mut tools = first.descriptor().tools.clone();
        for tool in &second.descriptor().tools {
            if !tools.contains(tool) {
                tools.push(*tool);
            }
        }
        Self {
            descriptor: BackendDescriptor {
                id,
                label,
                kind: MethodKind::Pipeline,
                tools,
            },
            first,
            intermediate,
            second,
        }
    }
}

fn stage_error(stage: &str, label: &str, err: ConversionError) -> ConversionError {
    match err {
        ConversionError::ExecutionFailed { reason, detail } => ConversionError::ExecutionFailed {
            reason: format!("{} ({}): {}", stage, label, reason),
            detail,
        },
        ConversionError::EmptyOutput { backend } => ConversionError::EmptyOutput {
            backend: format!("{} ({})", stage, backend),
        },
        other => other,
    }
}

#[async_trait]
impl Backend for PipelineBackend {
    fn descriptor(&self) -> &BackendDescriptor {
        &self.descriptor
    }

    fn check(&self, source: &SourceFormat, host: &ConcurrencyHost) -> Result<(), ConversionError> {
        self.first.check(source, host)?;
        // Stage two's source is the intermediate; only its tools can be probed up front.
        for tool in &self.second.descriptor().tools {
            if !host.locator().is_available(*tool) {
                return Err(ConversionError::tool_unavailable(tool.label()));
            }
        }
        Ok(())
    }

    async fn attempt(&self, ctx: &AttemptContext) -> Result<BackendOutput, ConversionError> {
        let first_label = self.first.descriptor().label;
        let second_label = self.second.descriptor().label;

        let stage_dir = ctx.attempt_dir.join("stage1");
        tokio::fs::create_dir_all(&stage_dir).await?;
        let first_ctx = ctx.stage(
            ctx.input.clone(),
            ctx.source.clone(),
            self.intermediate,
            stage_dir,
        );
        let staged = self
            .first
            .attempt(&first_ctx)
            .await
            .map_err(|e| stage_error("stage 1", first_label, e))?;

        let intermediate = staged
            .primary()
            .map(|p| p.to_path_buf())
            .ok_or_else(|| ConversionError::EmptyOutput {
                backend: format!("stage 1 ({})", first_label),
            })?;
        let size = tokio::fs::metadata(&intermediate)
            .await
            .map(|m| m.len())
            .unwrap_or(0);
        if size == 0 {
            return Err(ConversionError::EmptyOutput {
                backend: format!("stage 1 ({})", first_label),
            });
        }
        debug!(
            "Pipeline {} stage 1 produced {:?}",
            self.descriptor.id, intermediate
        );

        let source = SourceFormat::classify(&intermediate).ok_or_else(|| {
            ConversionError::Internal(format!(
                "intermediate {:?} has no recognizable format",
                intermediate
            ))
        })?;
        let second_ctx = ctx.stage(intermediate, source, ctx.target, ctx.attempt_dir.clone());
        self.second
            .attempt(&second_ctx)
            .await
            .map_err(|e| stage_error("stage 2", second_label, e))
    }
}
