// src/sink.rs

//! Where task failures are reported.
//!
//! A failure is always shown on the console; the dev server additionally
//! forwards it to connected browsers through the reloader.

use owo_colors::{OwoColorize, Stream};
use tracing::error;

use crate::errors::{ErrorDetail, SitepipeError};

pub trait ErrorSink: Send + Sync {
    /// A task invocation failed.
    fn report(&self, task: &str, detail: &ErrorDetail);

    /// Startup failed; nothing will run.
    fn report_fatal(&self, error: &SitepipeError);
}

/// Prints a colored banner on stderr and logs the failure.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleErrorSink;

impl ConsoleErrorSink {
    pub fn new() -> Self {
        Self
    }
}

impl ErrorSink for ConsoleErrorSink {
    fn report(&self, task: &str, detail: &ErrorDetail) {
        error!(task, kind = ?detail.kind, error = %detail, "task failed");
        eprintln!(
            "{} {} {}",
            "✗".if_supports_color(Stream::Stderr, |s| s.red()),
            format!("[{task}]").if_supports_color(Stream::Stderr, |s| s.bold()),
            detail
        );
        if let Some(path) = &detail.path {
            eprintln!(
                "  {}",
                path.display()
                    .if_supports_color(Stream::Stderr, |s| s.dimmed())
            );
        }
    }

    fn report_fatal(&self, err: &SitepipeError) {
        let label = if err.is_configuration() {
            "configuration error"
        } else {
            "fatal error"
        };
        error!(error = %err, "{label}");
        eprintln!(
            "{} {}: {}",
            "✗".if_supports_color(Stream::Stderr, |s| s.red()),
            label.if_supports_color(Stream::Stderr, |s| s.bold()),
            err
        );
    }
}
