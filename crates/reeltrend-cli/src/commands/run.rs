use super::run_ui::RunUI;
use super::{load_config, require_token};
use crate::output::Output;
use crate::RunArgs;
use chrono::{NaiveDate, Utc};
use color_eyre::Result;
use comfy_table::{Cell, Table};
use media_history_config::{Config, PathManager};
use media_history_core::{Exporter, Pipeline, PipelineError, PipelineOptions, RunReport};
use media_history_sources::TmdbClient;
use serde_json::json;
use std::path::Path;
use std::process::ExitCode;

/// Exit status of a run that wrote outputs but lost at least one category
pub const EXIT_PARTIAL: u8 = 2;

/// Fold command line overrides into the loaded configuration
pub fn apply_overrides(config: &mut Config, args: &RunArgs) {
    if !args.categories.is_empty() {
        config.pipeline.categories = args.categories.clone();
    }
    if let Some(days) = args.lookback_days {
        config.pipeline.lookback_days = days;
    }
    if let Some(listing) = args.listing {
        config.pipeline.listing = listing;
    }
    if let Some(sample) = args.cast_sample {
        config.pipeline.cast_sample = sample;
    }
    if let Some(pages) = args.max_pages {
        config.api.max_pages = pages;
    }
    if let Some(dir) = &args.output_dir {
        config.export.output_dir = Some(dir.clone());
    }
}

pub fn build_pipeline(
    config: &Config,
    paths: &PathManager,
    token: String,
    run_date: NaiveDate,
    dry_run: bool,
) -> Result<Pipeline<TmdbClient>> {
    let client = TmdbClient::from_config(&config.api, token)
        .map_err(|e| color_eyre::eyre::eyre!("Failed to create API client: {}", e))?;

    let mut options = PipelineOptions::from_config(&config.pipeline, run_date);
    options.dry_run = dry_run;

    let output_dir = config
        .export
        .output_dir
        .clone()
        .unwrap_or_else(|| paths.data_dir().to_path_buf());
    let exporter = Exporter::new(output_dir).with_snapshots(config.export.snapshots);

    Ok(Pipeline::new(client, exporter, options))
}

pub async fn run_once(args: RunArgs, config_path: &Path, paths: &PathManager, output: &Output) -> Result<ExitCode> {
    tracing::debug!("Run command started");

    let mut config = load_config(config_path)?;
    apply_overrides(&mut config, &args);
    config
        .validate()
        .map_err(|e| color_eyre::eyre::eyre!("Configuration validation failed: {}", e))?;

    let token = require_token(paths)?;
    let run_date = args.run_date.unwrap_or_else(|| Utc::now().date_naive());

    let ui = RunUI::new(output.is_human() && !output.is_quiet());
    let pipeline = build_pipeline(&config, paths, token, run_date, args.dry_run)?.with_observer(ui.observer());
    let output_dir = pipeline.exporter().output_dir().to_path_buf();

    let result = pipeline.run().await;
    ui.finish();

    match result {
        Ok(report) => {
            print_report(&report, &output_dir, output);
            if report.is_partial() {
                Ok(ExitCode::from(EXIT_PARTIAL))
            } else {
                Ok(ExitCode::SUCCESS)
            }
        }
        Err(e) => {
            report_failure(&e, output);
            Err(color_eyre::eyre::eyre!("Run failed: {}", e))
        }
    }
}

fn report_failure(error: &PipelineError, output: &Output) {
    if !output.is_human() {
        output.json(&json!({
            "success": false,
            "stage": error.stage(),
            "error": error.to_string(),
        }));
    }
}

fn print_report(report: &RunReport, output_dir: &Path, output: &Output) {
    if !output.is_human() {
        let mut value = serde_json::to_value(report).unwrap_or_default();
        if let Some(map) = value.as_object_mut() {
            map.insert("success".to_string(), json!(true));
            map.insert("partial".to_string(), json!(report.is_partial()));
        }
        output.json(&value);
        return;
    }

    let mut table = Table::new();
    table.set_header(vec![
        Cell::new("Run").add_attribute(comfy_table::Attribute::Bold),
        Cell::new(report.run_date.to_string()),
    ]);
    table.add_row(vec![Cell::new("Listing"), Cell::new(report.listing)]);
    if report.listing.uses_release_window() {
        table.add_row(vec![
            Cell::new("Release window"),
            Cell::new(format!("{} to {}", report.window_start, report.window_end)),
        ]);
    }
    table.add_row(vec![Cell::new("Fetched"), Cell::new(report.fetched_records)]);
    table.add_row(vec![Cell::new("New"), Cell::new(report.inserted)]);
    table.add_row(vec![Cell::new("Updated"), Cell::new(report.updated)]);
    table.add_row(vec![Cell::new("Retained"), Cell::new(report.retained)]);
    table.add_row(vec![
        Cell::new("Total in history").add_attribute(comfy_table::Attribute::Bold),
        Cell::new(report.total_records).add_attribute(comfy_table::Attribute::Bold),
    ]);
    table.load_preset(comfy_table::presets::UTF8_FULL);
    table.apply_modifier(comfy_table::modifiers::UTF8_ROUND_CORNERS);
    output.block(&table);

    let mut buckets = Table::new();
    buckets.set_header(vec![
        Cell::new("Popularity").fg(comfy_table::Color::Cyan),
        Cell::new("Titles").fg(comfy_table::Color::Cyan),
        Cell::new("Mean").fg(comfy_table::Color::Cyan),
    ]);
    for row in &report.aggregates.by_popularity_bucket {
        buckets.add_row(vec![
            Cell::new(&row.dimension_key),
            Cell::new(row.record_count),
            Cell::new(format!("{:.1}", row.mean_popularity)),
        ]);
    }
    buckets.load_preset(comfy_table::presets::UTF8_FULL);
    buckets.apply_modifier(comfy_table::modifiers::UTF8_ROUND_CORNERS);
    output.block(&buckets);

    if !report.cast_counts.is_empty() {
        let mut cast = Table::new();
        cast.set_header(vec![
            Cell::new(format!("Cast ({} titles)", report.cast_titles_sampled)).fg(comfy_table::Color::Cyan),
            Cell::new("Titles").fg(comfy_table::Color::Cyan),
        ]);
        for row in report.cast_counts.iter().take(10) {
            cast.add_row(vec![Cell::new(&row.name), Cell::new(row.count)]);
        }
        cast.load_preset(comfy_table::presets::UTF8_FULL);
        cast.apply_modifier(comfy_table::modifiers::UTF8_ROUND_CORNERS);
        output.block(&cast);
    }

    for failure in &report.failures {
        output.warn(format!("{} was not fetched: {}", failure.category, failure.message));
    }

    if report.dry_run {
        output.info("Dry run: no files were written");
    } else {
        output.success(format!(
            "Exported {} files to {} in {:.1}s",
            report.files_written.len(),
            output_dir.display(),
            report.duration_ms as f64 / 1000.0
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use media_history_models::{Category, Listing};
    use std::path::PathBuf;

    #[test]
    fn test_overrides_replace_configured_values() {
        let mut config = Config::default();
        let args = RunArgs {
            categories: vec![Category::Tv],
            lookback_days: Some(30),
            listing: Some(Listing::TrendingDay),
            cast_sample: Some(8),
            max_pages: Some(2),
            run_date: None,
            output_dir: Some(PathBuf::from("/tmp/exports")),
            dry_run: true,
        };

        apply_overrides(&mut config, &args);

        assert_eq!(config.pipeline.categories, vec![Category::Tv]);
        assert_eq!(config.pipeline.lookback_days, 30);
        assert_eq!(config.pipeline.listing, Listing::TrendingDay);
        assert_eq!(config.pipeline.cast_sample, 8);
        assert_eq!(config.api.max_pages, 2);
        assert_eq!(config.export.output_dir, Some(PathBuf::from("/tmp/exports")));
    }

    #[test]
    fn test_no_overrides_keep_config() {
        let mut config = Config::default();

        apply_overrides(&mut config, &RunArgs::default());

        assert_eq!(config.pipeline.categories, vec![Category::Movie, Category::Tv]);
        assert_eq!(config.pipeline.lookback_days, 180);
        assert_eq!(config.pipeline.listing, Listing::Discover);
        assert_eq!(config.pipeline.cast_sample, 0);
        assert_eq!(config.api.max_pages, 5);
        assert!(config.export.output_dir.is_none());
    }

    #[test]
    fn test_pipeline_writes_to_data_dir_by_default() {
        let dir = tempfile::tempdir().unwrap();
        let paths = PathManager::with_base(dir.path().to_path_buf());
        let config = Config::default();
        let run_date = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();

        let pipeline = build_pipeline(&config, &paths, "token".to_string(), run_date, true).unwrap();

        assert_eq!(pipeline.exporter().output_dir(), paths.data_dir());
        assert!(pipeline.options().dry_run);
        assert_eq!(pipeline.options().run_date, run_date);
    }
}
