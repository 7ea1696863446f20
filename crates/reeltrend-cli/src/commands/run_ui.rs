use indicatif::{ProgressBar, ProgressStyle};
use media_history_core::PipelineEvent;
use std::io::IsTerminal;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Spinner that follows pipeline progress on a terminal.
///
/// Without a terminal, progress is reported through structured logging instead.
pub struct RunUI {
    spinner: ProgressBar,
    interactive: bool,
}

impl RunUI {
    pub fn new(enabled: bool) -> Self {
        let interactive = enabled && is_interactive();

        let spinner = if interactive {
            let spinner = ProgressBar::new_spinner();
            if let Ok(style) = ProgressStyle::default_spinner()
                .template("{spinner:.green} [{elapsed_precise}] {msg}")
            {
                spinner.set_style(style.tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏"));
            }
            spinner.enable_steady_tick(Duration::from_millis(100));
            spinner.set_message("Loading history...");
            spinner
        } else {
            tracing::debug!(
                operation = "ui_init",
                mode = "non_interactive",
                "Progress spinner disabled, using structured logging"
            );
            ProgressBar::hidden()
        };

        Self { spinner, interactive }
    }

    /// Callback to hand to the pipeline
    pub fn observer(&self) -> impl Fn(&PipelineEvent) + Send + Sync + 'static {
        let spinner = self.spinner.clone();
        let interactive = self.interactive;
        let pages = Arc::new(AtomicUsize::new(0));
        let records = Arc::new(AtomicUsize::new(0));

        move |event| {
            let message = match event {
                PipelineEvent::HistoryLoaded { records } => format!("Loaded {} records from history", records),
                PipelineEvent::CategoryStarted { category } => {
                    pages.store(0, Ordering::Relaxed);
                    records.store(0, Ordering::Relaxed);
                    format!("{}: fetching...", category)
                }
                PipelineEvent::PageFetched { category, records: count } => {
                    let page_total = pages.fetch_add(1, Ordering::Relaxed) + 1;
                    let record_total = records.fetch_add(*count, Ordering::Relaxed) + count;
                    format!("{}: {} pages, {} records", category, page_total, record_total)
                }
                PipelineEvent::CategoryFinished { category, records } => {
                    format!("{}: done ({} records)", category, records)
                }
                PipelineEvent::CategoryFailed { category, error } => format!("{}: failed ({})", category, error),
                PipelineEvent::Exporting => "Writing exports...".to_string(),
            };

            if interactive {
                spinner.set_message(message);
            } else {
                tracing::info!(operation = "progress", message = %message, "Progress update");
            }
        }
    }

    pub fn finish(&self) {
        if self.interactive {
            self.spinner.finish_and_clear();
        }
    }
}

pub fn is_interactive() -> bool {
    std::io::stdout().is_terminal() && std::io::stderr().is_terminal()
}
