// src/engine/dispatch.rs

use tracing::debug;

use crate::errors::ErrorDetail;
use crate::sink::ErrorSink;
use crate::types::BuildResult;

/// Receives finished task results to refresh connected browsers.
pub trait Reloader: Send + Sync {
    /// A task succeeded and wrote (or removed) artifacts.
    fn notify_reload(&self, result: &BuildResult);

    /// A task failed; browsers may show an overlay instead of reloading.
    fn notify_error(&self, task: &str, detail: &ErrorDetail);
}

/// Route results of one run: successes to the reloader, failures to the
/// error sink (and the reloader's error channel).
///
/// A failed result never triggers a reload.
pub fn dispatch_results(
    results: &[BuildResult],
    reloader: Option<&dyn Reloader>,
    sink: &dyn ErrorSink,
) {
    for result in results {
        if result.success {
            debug!(task = %result.task_name, artifacts = result.artifact_paths.len(), "dispatching success");
            if let Some(reloader) = reloader {
                reloader.notify_reload(result);
            }
            continue;
        }

        let detail = result
            .error
            .clone()
            .unwrap_or_else(|| ErrorDetail::panic("task failed without details"));
        sink.report(&result.task_name, &detail);
        if let Some(reloader) = reloader {
            reloader.notify_error(&result.task_name, &detail);
        }
    }
}
