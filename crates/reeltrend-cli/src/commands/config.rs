use super::{load_config, load_credentials};
use crate::output::Output;
use crate::ConfigCommands;
use color_eyre::Result;
use comfy_table::{Cell, Table};
use media_history_config::{default_scheduler_config, Config, PathManager, TOKEN_ENV_VAR};
use owo_colors::OwoColorize;
use serde_json::json;
use std::path::Path;

pub fn run_config(cmd: ConfigCommands, config_path: &Path, paths: &PathManager, output: &Output) -> Result<()> {
    match cmd {
        ConfigCommands::Show { full } => show_config(full, config_path, paths, output),
        ConfigCommands::SetToken { token } => set_token(token, paths, output),
        ConfigCommands::Init { force } => init_config(force, config_path, output),
    }
}

/// Where the token used by the next run comes from
fn token_source(paths: &PathManager) -> Result<(&'static str, Option<String>)> {
    if let Ok(value) = std::env::var(TOKEN_ENV_VAR) {
        if !value.trim().is_empty() {
            return Ok(("environment", Some(value.trim().to_string())));
        }
    }
    let store = load_credentials(paths)?;
    Ok(match store.get_tmdb_token() {
        Some(token) if !token.is_empty() => ("credentials file", Some(token.clone())),
        _ => ("not set", None),
    })
}

fn section(title: &str) -> Table {
    let mut table = Table::new();
    table.set_header(vec![
        Cell::new(title)
            .fg(comfy_table::Color::Cyan)
            .add_attribute(comfy_table::Attribute::Bold),
        Cell::new(""),
    ]);
    table.load_preset(comfy_table::presets::UTF8_FULL);
    table.apply_modifier(comfy_table::modifiers::UTF8_ROUND_CORNERS);
    table
}

fn show_config(full: bool, config_path: &Path, paths: &PathManager, output: &Output) -> Result<()> {
    if !config_path.exists() {
        output.warn(format!(
            "Configuration file not found at {}, showing defaults. Run 'reeltrend config init' to create it.",
            config_path.display()
        ));
    }
    let config = load_config(config_path)?;
    let (source, token) = token_source(paths)?;
    let token_display = match &token {
        Some(t) if full => t.clone(),
        Some(t) => mask_string(t),
        None => "<not set>".to_string(),
    };
    let scheduler = config.scheduler.clone().unwrap_or_else(default_scheduler_config);
    let output_dir = config
        .export
        .output_dir
        .clone()
        .unwrap_or_else(|| paths.data_dir().to_path_buf());

    if !output.is_human() {
        output.json(&json!({
            "config_file": config_path.display().to_string(),
            "credentials_file": paths.credentials_file().display().to_string(),
            "output_dir": output_dir.display().to_string(),
            "token": token_display,
            "token_source": source,
            "config": serde_json::to_value(&config).unwrap_or_default(),
        }));
        return Ok(());
    }
    if output.is_quiet() {
        return Ok(());
    }

    println!();
    println!("{}", "Configuration".bright_cyan().bold());
    println!("{}", "─".repeat(13).bright_cyan());

    let mut files = section("Files");
    files.add_row(vec![Cell::new("Config file"), Cell::new(config_path.display())]);
    files.add_row(vec![Cell::new("Credentials"), Cell::new(paths.credentials_file().display())]);
    files.add_row(vec![Cell::new("Output directory"), Cell::new(output_dir.display())]);
    files.add_row(vec![Cell::new("Scheduler log"), Cell::new(paths.scheduler_log_file().display())]);
    output.block(&files);

    let mut api = section("API");
    api.add_row(vec![Cell::new("Base URL"), Cell::new(&config.api.base_url)]);
    api.add_row(vec![Cell::new("Token"), Cell::new(format!("{} ({})", token_display, source))]);
    api.add_row(vec![Cell::new("Concurrency"), Cell::new(config.api.concurrency)]);
    api.add_row(vec![Cell::new("Requests per second"), Cell::new(config.api.requests_per_second)]);
    api.add_row(vec![Cell::new("Max pages"), Cell::new(config.api.max_pages)]);
    api.add_row(vec![Cell::new("Max attempts"), Cell::new(config.api.max_attempts)]);
    api.add_row(vec![
        Cell::new("Backoff"),
        Cell::new(format!("{}ms base, {}ms cap", config.api.backoff_base_ms, config.api.backoff_cap_ms)),
    ]);
    api.add_row(vec![
        Cell::new("Rate limit"),
        Cell::new(format!(
            "{}ms wait, {} retries",
            config.api.rate_limit_backoff_ms, config.api.max_rate_limit_retries
        )),
    ]);
    output.block(&api);

    let categories: Vec<&str> = config.categories().iter().map(|c| c.as_str()).collect();
    let mut pipeline = section("Pipeline");
    pipeline.add_row(vec![Cell::new("Categories"), Cell::new(categories.join(", "))]);
    pipeline.add_row(vec![Cell::new("Listing"), Cell::new(config.pipeline.listing)]);
    pipeline.add_row(vec![Cell::new("Lookback days"), Cell::new(config.pipeline.lookback_days)]);
    pipeline.add_row(vec![
        Cell::new("Cast sample"),
        Cell::new(match config.pipeline.cast_sample {
            0 => "off".to_string(),
            n => format!("top {} titles", n),
        }),
    ]);
    pipeline.add_row(vec![
        Cell::new("Dated snapshots"),
        Cell::new(if config.export.snapshots { "✓" } else { "✗" }),
    ]);
    output.block(&pipeline);

    let mut schedule = section("Scheduler");
    schedule.add_row(vec![Cell::new("Schedule"), Cell::new(&scheduler.schedule)]);
    schedule.add_row(vec![
        Cell::new("Run on startup"),
        Cell::new(if scheduler.run_on_startup { "✓" } else { "✗" }),
    ]);
    output.block(&schedule);

    if let Err(e) = config.validate() {
        output.warn(format!("Configuration is invalid: {}", e));
    }
    Ok(())
}

fn set_token(token_arg: Option<String>, paths: &PathManager, output: &Output) -> Result<()> {
    paths
        .ensure_directories()
        .map_err(|e| color_eyre::eyre::eyre!("Failed to create configuration directories: {}", e))?;

    let token = match token_arg {
        Some(token) => token,
        None => rpassword::prompt_password("API read access token: ")
            .map_err(|e| color_eyre::eyre::eyre!("Failed to read token: {}", e))?,
    };
    let token = token.trim().to_string();
    if token.is_empty() {
        return Err(color_eyre::eyre::eyre!("Token cannot be empty"));
    }

    let mut store = load_credentials(paths)?;
    store.set_tmdb_token(token);
    store
        .save()
        .map_err(|e| color_eyre::eyre::eyre!("Failed to save credentials: {}", e))?;

    output.success(format!("Token saved to {}", paths.credentials_file().display()));
    if std::env::var(TOKEN_ENV_VAR).is_ok() {
        output.warn(format!("{} is set and takes precedence over the stored token", TOKEN_ENV_VAR));
    }
    Ok(())
}

fn init_config(force: bool, config_path: &Path, output: &Output) -> Result<()> {
    if config_path.exists() && !force {
        output.warn(format!(
            "Configuration already exists at {} (use --force to overwrite)",
            config_path.display()
        ));
        return Ok(());
    }

    let config = Config {
        scheduler: Some(default_scheduler_config()),
        ..Config::default()
    };
    config
        .save_to_file(config_path)
        .map_err(|e| color_eyre::eyre::eyre!("Failed to save config to {}: {}", config_path.display(), e))?;

    output.success(format!("Configuration written to {}", config_path.display()));
    Ok(())
}

fn mask_string(s: &str) -> String {
    let chars: Vec<char> = s.chars().collect();
    if chars.len() <= 8 {
        return "*".repeat(chars.len());
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}***{}", head, tail)
}
