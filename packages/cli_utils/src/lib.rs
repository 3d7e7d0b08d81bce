#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Shared CLI utilities for the milton maps pipeline.
//!
//! Provides [`StageSpinner`], an `indicatif` spinner shown while a pipeline
//! stage runs, plus [`init_logger`] which sets up `indicatif-log-bridge` so
//! that `log::info!` and friends are suspended while spinners redraw.

use std::time::{Duration, Instant};

use indicatif::{ProgressBar, ProgressStyle};

pub use indicatif::{MultiProgress, ProgressDrawTarget};

/// Spinner for one pipeline stage.
///
/// Stages are single batch transformations with no meaningful total, so
/// this only ever shows a spinner, a message and the elapsed time.
pub struct StageSpinner {
    bar: ProgressBar,
    started: Instant,
}

impl StageSpinner {
    /// Adds a spinner to `multi` and starts ticking it.
    #[must_use]
    pub fn start(multi: &MultiProgress, message: &str) -> Self {
        let bar = multi.add(ProgressBar::new_spinner());
        bar.enable_steady_tick(Duration::from_millis(100));
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg} [{elapsed}]")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        bar.set_message(message.to_string());

        Self {
            bar,
            started: Instant::now(),
        }
    }

    /// Replaces the spinner message, e.g. when moving to the next step of
    /// a stage.
    pub fn set_message(&self, message: &str) {
        self.bar.set_message(message.to_string());
    }

    /// Stops the spinner, leaving `message` and the elapsed time on screen.
    pub fn finish(&self, message: &str) {
        let elapsed = self.started.elapsed();
        self.bar
            .finish_with_message(format!("{message} ({:.1}s)", elapsed.as_secs_f64()));
    }

    /// Stops the spinner and removes it, e.g. when the stage failed and the
    /// error is about to be reported.
    pub fn finish_and_clear(&self) {
        self.bar.finish_and_clear();
    }
}

/// Initializes the global logger wrapped in `indicatif-log-bridge` so that
/// `log::info!` and friends are suspended while spinners redraw.
///
/// Returns the [`MultiProgress`] that all spinners must be added to.
#[must_use]
pub fn init_logger() -> MultiProgress {
    let multi = MultiProgress::new();

    // Build the pretty-env-logger logger manually so we can wrap it.
    let logger = pretty_env_logger::formatted_builder()
        .parse_env("RUST_LOG")
        .build();
    let level = logger.filter();

    indicatif_log_bridge::LogWrapper::new(multi.clone(), logger)
        .try_init()
        .ok(); // Ignore error if logger was already set (e.g., in tests)

    log::set_max_level(level);

    multi
}
