//! Entry point: validate, classify, route and run a conversion request.

use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

use super::error::ConversionError;
use super::executor::{ExecutionContext, FallbackExecutor};
use super::strategy::StrategyTable;
use super::types::{ConversionOutcome, ConversionRequest};
use super::workspace::ResourceScope;
use crate::config::Config;
use crate::format::{source_extension, source_stem, SourceFormat};
use crate::host::ConcurrencyHost;
use crate::metrics::{CONVERSIONS_TOTAL, CONVERSION_DURATION};
use crate::sanitize::clean_filename;

/// Routes requests through the strategy table and fallback executor.
///
/// `convert` never panics past its boundary: every internal fault,
/// including a panic inside a backend, becomes a failed outcome.
#[derive(Clone)]
pub struct Dispatcher {
    strategy: Arc<StrategyTable>,
    host: Arc<ConcurrencyHost>,
    scope: ResourceScope,
    executor: FallbackExecutor,
}

impl Dispatcher {
    /// Builds the standard strategy table and host from configuration.
    pub fn new(config: &Config) -> Self {
        Self::with_parts(
            StrategyTable::standard(),
            ConcurrencyHost::new(config),
            config.engine.workspace_root.clone(),
            config.engine.diagnostic_limit,
        )
    }

    pub fn with_parts(
        strategy: StrategyTable,
        host: ConcurrencyHost,
        workspace_root: impl Into<PathBuf>,
        diagnostic_limit: usize,
    ) -> Self {
        Self {
            strategy: Arc::new(strategy),
            host: Arc::new(host),
            scope: ResourceScope::new(workspace_root),
            executor: FallbackExecutor::new(diagnostic_limit),
        }
    }

    pub fn strategy(&self) -> &StrategyTable {
        &self.strategy
    }

    pub fn host(&self) -> &ConcurrencyHost {
        &self.host
    }

    pub fn workspace_root(&self) -> &Path {
        self.scope.root()
    }

    /// Converts one file. Always returns an outcome.
    pub async fn convert(&self, request: ConversionRequest) -> ConversionOutcome {
        let started = Instant::now();
        info!(
            "Converting {:?} to {} ({:?} quality)",
            request.input, request.target, request.quality
        );

        let (family, outcome) = match self.route(&request).await {
            Ok((source, stem)) => {
                let family = source.family.as_str();
                (family, self.execute(&request, source, stem).await)
            }
            Err(e) => {
                warn!("Rejected {:?}: {}", request.input, e);
                ("unknown", ConversionOutcome::failed(e.to_string()))
            }
        };

        let result = if outcome.success { "success" } else { "failed" };
        CONVERSIONS_TOTAL.with_label_values(&[family, result]).inc();
        CONVERSION_DURATION
            .with_label_values(&[family])
            .observe(started.elapsed().as_secs_f64());

        match &outcome.error {
            None => info!(
                "Converted {:?} -> {:?} in {:?}",
                request.input,
                outcome.filename,
                started.elapsed()
            ),
            Some(e) => warn!("Conversion of {:?} failed: {}", request.input, e),
        }
        outcome
    }

    /// Validates the input and resolves its source format and output stem.
    async fn route(
        &self,
        request: &ConversionRequest,
    ) -> Result<(SourceFormat, String), ConversionError> {
        let metadata = tokio::fs::metadata(&request.input).await;
        match metadata {
            Ok(m) if m.is_file() => {
                if m.len() == 0 {
                    return Err(ConversionError::EmptyInput {
                        path: request.input.clone(),
                    });
                }
            }
            _ => {
                return Err(ConversionError::InputNotFound {
                    path: request.input.clone(),
                })
            }
        }

        let source = SourceFormat::classify(&request.input).ok_or_else(|| {
            ConversionError::UnsupportedSource {
                extension: source_extension(&request.input).unwrap_or_default(),
            }
        })?;

        if self
            .strategy
            .candidates_for(&source, request.target)
            .is_empty()
        {
            return Err(ConversionError::UnsupportedTarget {
                target: request.target.to_string(),
                family: source.family,
            });
        }

        Ok((source, output_stem(&request.input)))
    }

    async fn execute(
        &self,
        request: &ConversionRequest,
        source: SourceFormat,
        stem: String,
    ) -> ConversionOutcome {
        if let Err(e) = tokio::fs::create_dir_all(&request.output_dir).await {
            return ConversionOutcome::failed(format!(
                "internal error: cannot create output directory: {}",
                e
            ));
        }

        let candidates = self.strategy.candidates_for(&source, request.target);
        let executor = &self.executor;
        let host = self.host.clone();

        let scoped = self
            .scope
            .with_scope(&stem, |workspace| {
                let ctx = ExecutionContext {
                    input: request.input.clone(),
                    source,
                    target: request.target,
                    quality: request.quality,
                    stem: stem.clone(),
                    output_dir: request.output_dir.clone(),
                    workspace,
                    host,
                };
                async move {
                    AssertUnwindSafe(executor.run(candidates, &ctx))
                        .catch_unwind()
                        .await
                }
            })
            .await;

        match scoped {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(panic)) => {
                let message = panic_message(panic.as_ref());
                warn!("Conversion of {:?} panicked: {}", request.input, message);
                ConversionOutcome::failed(ConversionError::Internal(message).to_string())
            }
            Err(e) => ConversionOutcome::failed(format!(
                "internal error: cannot create workspace: {}",
                e
            )),
        }
    }
}

/// Sanitized input stem used to name outputs.
fn output_stem(input: &Path) -> String {
    let raw = input
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let stem = source_stem(Path::new(&clean_filename(&raw)));
    if stem.is_empty() {
        "unnamed_file".to_string()
    } else {
        stem
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "backend panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_stem_is_sanitized() {
        assert_eq!(output_stem(Path::new("/up/My Report.docx")), "My_Report");
        assert_eq!(output_stem(Path::new("/up/şarkı listesi.tar.gz")), "sarki_listesi");
    }

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn std::any::Any + Send> = Box::new("boom");
        assert_eq!(panic_message(payload.as_ref()), "boom");
        let payload: Box<dyn std::any::Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(payload.as_ref()), "bang");
    }
}
