//! Ordered fallback over backend candidates.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use super::error::{truncate_diagnostic, ConversionError, FailureClass};
use super::types::{AttemptOutcome, AttemptResult, BackendOutput, ConversionOutcome, Quality};
use super::workspace::Workspace;
use crate::backend::{page_label, AttemptContext, Backend};
use crate::format::{SourceFormat, TargetFormat};
use crate::host::ConcurrencyHost;
use crate::metrics::BACKEND_ATTEMPTS;

/// Everything the executor needs for one request.
#[derive(Clone)]
pub struct ExecutionContext {
    pub input: PathBuf,
    pub source: SourceFormat,
    pub target: TargetFormat,
    pub quality: Quality,
    /// Sanitized stem for output names.
    pub stem: String,
    pub output_dir: PathBuf,
    pub workspace: Workspace,
    pub host: Arc<ConcurrencyHost>,
}

/// Tries candidates in order until one succeeds or a fatal failure stops the loop.
#[derive(Debug, Clone)]
pub struct FallbackExecutor {
    diagnostic_limit: usize,
}

impl FallbackExecutor {
    pub fn new(diagnostic_limit: usize) -> Self {
        Self { diagnostic_limit }
    }

    /// Runs each candidate at most once and summarizes the result.
    pub async fn run(
        &self,
        candidates: &[Arc<dyn Backend>],
        ctx: &ExecutionContext,
    ) -> ConversionOutcome {
        let mut attempts: Vec<AttemptResult> = Vec::with_capacity(candidates.len());
        let mut last_error: Option<ConversionError> = None;
        // Labels of candidates that would have run had their tool or platform been present.
        let mut required: Vec<&'static str> = Vec::new();

        for (index, backend) in candidates.iter().enumerate() {
            let descriptor = backend.descriptor();
            let started = Instant::now();

            if let Err(e) = backend.check(&ctx.source, &ctx.host) {
                debug!("Skipping {}: {}", descriptor.id, e);
                if !matches!(e, ConversionError::SourceNotAccepted { .. })
                    && !required.contains(&descriptor.label)
                {
                    required.push(descriptor.label);
                }
                let record = self.record(descriptor.id, &e, true, started);
                attempts.push(record);
                continue;
            }

            debug!(
                "Attempting {} ({}/{}) for {:?}",
                descriptor.id,
                index + 1,
                candidates.len(),
                ctx.input
            );
            let result = self.attempt(index + 1, backend.as_ref(), ctx).await;

            match result {
                Ok((files, note)) => {
                    BACKEND_ATTEMPTS
                        .with_label_values(&[descriptor.id, AttemptOutcome::Success.as_str()])
                        .inc();
                    info!(
                        "{} converted {:?} to {} in {:?}",
                        descriptor.label,
                        ctx.input,
                        ctx.target,
                        started.elapsed()
                    );
                    return ConversionOutcome::succeeded(&files, note);
                }
                Err(e) => {
                    let record = self.record(descriptor.id, &e, false, started);
                    let outcome = record.outcome;
                    attempts.push(record);
                    if outcome == AttemptOutcome::Fatal {
                        warn!("{} failed fatally: {}", descriptor.id, e);
                        return ConversionOutcome::failed(self.failure_message(ctx.target, &e));
                    }
                    warn!("{} failed, trying next candidate: {}", descriptor.id, e);
                    last_error = Some(e);
                }
            }
        }

        ConversionOutcome::failed(self.exhausted_message(
            ctx.target,
            candidates,
            &required,
            &attempts,
            last_error,
        ))
    }

    /// Runs one backend and promotes its outputs. Returns the placed files and note.
    async fn attempt(
        &self,
        index: usize,
        backend: &dyn Backend,
        ctx: &ExecutionContext,
    ) -> Result<(Vec<PathBuf>, Option<String>), ConversionError> {
        let descriptor = backend.descriptor();
        let attempt_dir = ctx.workspace.attempt_dir(index, descriptor.id).await?;

        let attempt_ctx = AttemptContext {
            input: ctx.input.clone(),
            source: ctx.source.clone(),
            target: ctx.target,
            quality: ctx.quality,
            stem: ctx.stem.clone(),
            attempt_dir,
            page_label: page_label(ctx.source.family),
            host: ctx.host.clone(),
        };

        let output = backend.attempt(&attempt_ctx).await?;
        validate_outputs(descriptor.label, &output).await?;

        let mut placed = Vec::with_capacity(output.files.len());
        for file in &output.files {
            match promote(file, &ctx.output_dir).await {
                Ok(dest) => placed.push(dest),
                Err(e) => {
                    discard(&placed).await;
                    return Err(e);
                }
            }
        }
        remove_stale_series(&ctx.output_dir, &ctx.stem, &placed).await;
        Ok((placed, output.note))
    }

    fn record(
        &self,
        backend: &'static str,
        error: &ConversionError,
        probe: bool,
        started: Instant,
    ) -> AttemptResult {
        let class = error.class();
        let outcome = if class.is_recoverable() {
            AttemptOutcome::Recoverable
        } else {
            AttemptOutcome::Fatal
        };
        BACKEND_ATTEMPTS
            .with_label_values(&[backend, outcome.as_str()])
            .inc();
        AttemptResult {
            backend,
            outcome,
            message: error.diagnostic(self.diagnostic_limit),
            precondition_unmet: probe && class == FailureClass::PreconditionUnmet,
            elapsed: started.elapsed(),
        }
    }

    fn failure_message(&self, target: TargetFormat, error: &ConversionError) -> String {
        format!(
            "{} conversion failed: {}",
            target_label(target),
            error.diagnostic(self.diagnostic_limit)
        )
    }

    fn exhausted_message(
        &self,
        target: TargetFormat,
        candidates: &[Arc<dyn Backend>],
        required: &[&'static str],
        attempts: &[AttemptResult],
        last_error: Option<ConversionError>,
    ) -> String {
        match last_error {
            Some(e) => self.failure_message(target, &e),
            None if attempts.iter().all(|a| a.precondition_unmet) => {
                let labels: Vec<&str> = if required.is_empty() {
                    candidates.iter().map(|b| b.descriptor().label).collect()
                } else {
                    required.to_vec()
                };
                format!(
                    "{} conversion requires one of: {}",
                    target_label(target),
                    labels.join(", ")
                )
            }
            None => {
                let diagnostic = attempts
                    .last()
                    .map(|a| a.message.clone())
                    .unwrap_or_else(|| "no conversion method available".to_string());
                format!(
                    "{} conversion failed: {}",
                    target_label(target),
                    truncate_diagnostic(&diagnostic, self.diagnostic_limit)
                )
            }
        }
    }
}

fn target_label(target: TargetFormat) -> String {
    target.as_str().to_ascii_uppercase()
}

/// Every output must exist and be non-empty.
async fn validate_outputs(label: &str, output: &BackendOutput) -> Result<(), ConversionError> {
    if output.files.is_empty() {
        return Err(ConversionError::EmptyOutput {
            backend: label.to_string(),
        });
    }
    for file in &output.files {
        let size = tokio::fs::metadata(file).await.map(|m| m.len()).unwrap_or(0);
        if size == 0 {
            return Err(ConversionError::EmptyOutput {
                backend: label.to_string(),
            });
        }
    }
    Ok(())
}

/// Moves `file` into `output_dir`, replacing any previous result of the same name.
async fn promote(file: &Path, output_dir: &Path) -> Result<PathBuf, ConversionError> {
    let name = file
        .file_name()
        .ok_or_else(|| ConversionError::Internal(format!("output {:?} has no file name", file)))?;
    let dest = output_dir.join(name);

    match tokio::fs::remove_file(&dest).await {
        Ok(()) => debug!("Replacing previous output {:?}", dest),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(e.into()),
    }

    if tokio::fs::rename(file, &dest).await.is_err() {
        // Across filesystems rename fails; fall back to copy.
        tokio::fs::copy(file, &dest).await?;
        if let Err(e) = tokio::fs::remove_file(file).await {
            debug!("Leaving {:?} for workspace cleanup: {}", file, e);
        }
    }
    Ok(dest)
}

/// Removes outputs of a failed attempt that were already placed.
async fn discard(placed: &[PathBuf]) {
    for path in placed {
        if let Err(e) = tokio::fs::remove_file(path).await {
            warn!("Failed to remove partial output {:?}: {}", path, e);
        }
    }
}

/// `<stem>_<label>_` when `name` is `<stem>_<label>_<n>.<ext>`.
fn series_prefix(stem: &str, name: &str) -> Option<String> {
    let rest = name.strip_prefix(stem)?.strip_prefix('_')?;
    let (label, tail) = rest.split_once('_')?;
    let (n, _ext) = tail.split_once('.')?;
    let label_ok = !label.is_empty() && label.chars().all(|c| c.is_ascii_alphabetic());
    let n_ok = !n.is_empty() && n.chars().all(|c| c.is_ascii_digit());
    (label_ok && n_ok).then(|| format!("{}_{}_", stem, label))
}

/// Deletes numbered outputs left by an earlier run of the same series.
async fn remove_stale_series(output_dir: &Path, stem: &str, placed: &[PathBuf]) {
    let names: Vec<&str> = placed
        .iter()
        .filter_map(|p| p.file_name().and_then(|n| n.to_str()))
        .collect();
    let prefixes: Vec<String> = names
        .iter()
        .filter_map(|name| series_prefix(stem, name))
        .collect();
    if prefixes.is_empty() {
        return;
    }

    let mut entries = match tokio::fs::read_dir(output_dir).await {
        Ok(entries) => entries,
        Err(e) => {
            warn!("Cannot scan {:?} for stale outputs: {}", output_dir, e);
            return;
        }
    };
    while let Ok(Some(entry)) = entries.next_entry().await {
        let file_name = entry.file_name();
        let Some(name) = file_name.to_str() else {
            continue;
        };
        if names.contains(&name) {
            continue;
        }
        let stale = series_prefix(stem, name).is_some_and(|prefix| prefixes.contains(&prefix));
        if stale {
            debug!("Removing stale output {:?}", entry.path());
            if let Err(e) = tokio::fs::remove_file(entry.path()).await {
                warn!("Failed to remove stale output {:?}: {}", entry.path(), e);
            }
        }
    }
}
