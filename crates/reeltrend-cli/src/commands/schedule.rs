use super::run::build_pipeline;
use super::{load_config, require_token};
use crate::output::Output;
use chrono::Utc;
use color_eyre::Result;
use media_history_config::{default_scheduler_config, Config, PathManager};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info, warn};

/// Everything a scheduled tick needs, shared across ticks
struct ScheduledRun {
    config: Config,
    paths: PathManager,
    token: String,
    // held for the whole run; a tick that cannot take it is skipped
    active: Mutex<()>,
}

impl ScheduledRun {
    async fn execute(&self, trigger: &'static str) {
        let Ok(_guard) = self.active.try_lock() else {
            warn!(
                operation = "scheduled_run_skipped",
                trigger, "Previous run still active, skipping this tick"
            );
            return;
        };

        let run_date = Utc::now().date_naive();
        info!(operation = "scheduled_run_start", trigger, %run_date, "Starting scheduled run");

        let pipeline = match build_pipeline(&self.config, &self.paths, self.token.clone(), run_date, false) {
            Ok(pipeline) => pipeline,
            Err(e) => {
                error!(operation = "scheduled_run_error", error = %e, "Could not set up the pipeline");
                return;
            }
        };

        match pipeline.run().await {
            Ok(report) if report.is_partial() => warn!(
                operation = "scheduled_run_partial",
                total_records = report.total_records,
                failed_categories = report.failures.len(),
                "Scheduled run finished with missing categories"
            ),
            Ok(report) => info!(
                operation = "scheduled_run_complete",
                total_records = report.total_records,
                inserted = report.inserted,
                updated = report.updated,
                duration_ms = report.duration_ms,
                "Scheduled run completed successfully"
            ),
            Err(e) => error!(
                operation = "scheduled_run_error",
                stage = e.stage(),
                error = %e,
                "Scheduled run failed"
            ),
        }
    }
}

pub async fn run_schedule(
    schedule_override: Option<String>,
    startup_override: Option<bool>,
    config_path: &Path,
    paths: &PathManager,
    output: &Output,
) -> Result<()> {
    let config = load_config(config_path)?;
    config
        .validate()
        .map_err(|e| color_eyre::eyre::eyre!("Configuration validation failed: {}", e))?;
    let token = require_token(paths)?;

    let scheduler_config = config.scheduler.clone().unwrap_or_else(default_scheduler_config);
    let schedule = schedule_override.unwrap_or(scheduler_config.schedule);
    let run_on_startup = startup_override.unwrap_or(scheduler_config.run_on_startup);

    let run = Arc::new(ScheduledRun {
        config,
        paths: paths.clone(),
        token,
        active: Mutex::new(()),
    });

    let scheduler = JobScheduler::new()
        .await
        .map_err(|e| color_eyre::eyre::eyre!("Failed to create scheduler: {}", e))?;

    let job_run = run.clone();
    let job = Job::new_async(schedule.as_str(), move |_id, _scheduler| {
        let run = job_run.clone();
        Box::pin(async move {
            run.execute("cron").await;
        })
    })
    .map_err(|e| color_eyre::eyre::eyre!("Invalid schedule '{}': {}", schedule, e))?;

    scheduler
        .add(job)
        .await
        .map_err(|e| color_eyre::eyre::eyre!("Failed to register scheduled job: {}", e))?;

    if run_on_startup {
        info!(operation = "scheduler_startup", "Running pipeline on startup");
        run.execute("startup").await;
    }

    scheduler
        .start()
        .await
        .map_err(|e| color_eyre::eyre::eyre!("Failed to start scheduler: {}", e))?;

    info!(
        operation = "scheduler_started",
        schedule = %schedule,
        log_file = %paths.scheduler_log_file().display(),
        "Scheduler started"
    );
    output.info(format!(
        "Scheduler running with '{}'. Logs: {}. Press Ctrl-C to stop.",
        schedule,
        paths.scheduler_log_file().display()
    ));

    tokio::signal::ctrl_c().await?;

    info!(operation = "scheduler_stopping", "Shutting down scheduler");
    let mut scheduler = scheduler;
    scheduler
        .shutdown()
        .await
        .map_err(|e| color_eyre::eyre::eyre!("Failed to stop scheduler: {}", e))?;
    output.success("Scheduler stopped");

    Ok(())
}
