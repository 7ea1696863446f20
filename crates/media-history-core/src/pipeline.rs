use crate::aggregate::aggregate;
use crate::error::PipelineError;
use crate::export::{Exporter, RunManifest, SCHEMA_VERSION};
use crate::history::load_history;
use crate::merge::merge;
use chrono::{Days, NaiveDate};
use futures::StreamExt;
use media_history_config::PipelineConfig;
use media_history_models::{Aggregates, CastCount, Category, Genre, Listing, NormalizedRecord};
use media_history_sources::{normalize_page, CatalogSource, DiscoverRequest, FetchError, SchemaError};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub categories: Vec<Category>,
    pub lookback_days: u32,
    pub run_date: NaiveDate,
    pub listing: Listing,
    /// Top titles of this run whose credits are counted; 0 skips sampling
    pub cast_sample: usize,
    /// Fetch, merge and aggregate but write nothing
    pub dry_run: bool,
}

impl PipelineOptions {
    pub fn from_config(config: &PipelineConfig, run_date: NaiveDate) -> Self {
        let mut categories = Vec::new();
        for category in &config.categories {
            if !categories.contains(category) {
                categories.push(*category);
            }
        }
        Self {
            categories,
            lookback_days: config.lookback_days,
            run_date,
            listing: config.listing,
            cast_sample: config.cast_sample,
            dry_run: false,
        }
    }

    /// Release window `[run_date - lookback_days, run_date]`
    pub fn window(&self) -> (NaiveDate, NaiveDate) {
        let start = self
            .run_date
            .checked_sub_days(Days::new(u64::from(self.lookback_days)))
            .unwrap_or(NaiveDate::MIN);
        (start, self.run_date)
    }
}

/// Progress notifications emitted while a run is in flight
#[derive(Debug, Clone)]
pub enum PipelineEvent {
    HistoryLoaded { records: usize },
    CategoryStarted { category: Category },
    PageFetched { category: Category, records: usize },
    CategoryFinished { category: Category, records: usize },
    CategoryFailed { category: Category, error: String },
    Exporting,
}

type Observer = Arc<dyn Fn(&PipelineEvent) + Send + Sync>;

/// A category whose fetch could not be completed
#[derive(Debug, Clone, Serialize)]
pub struct CategoryFailure {
    pub category: Category,
    pub kind: &'static str,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_date: NaiveDate,
    pub listing: Listing,
    pub window_start: NaiveDate,
    pub window_end: NaiveDate,
    pub dry_run: bool,
    pub fetched_records: usize,
    pub total_records: usize,
    pub inserted: usize,
    pub updated: usize,
    pub retained: usize,
    pub categories_fetched: Vec<Category>,
    pub failures: Vec<CategoryFailure>,
    pub genres: usize,
    pub cast_titles_sampled: usize,
    /// Most frequent performers first
    pub cast_counts: Vec<CastCount>,
    pub files_written: Vec<PathBuf>,
    pub duration_ms: u64,
    #[serde(skip)]
    pub aggregates: Aggregates,
}

impl RunReport {
    /// Outputs were produced but at least one category is missing from this run
    pub fn is_partial(&self) -> bool {
        !self.failures.is_empty()
    }
}

enum CategoryError {
    Fetch(FetchError),
    Schema(SchemaError),
}

impl From<FetchError> for CategoryError {
    fn from(e: FetchError) -> Self {
        CategoryError::Fetch(e)
    }
}

impl From<SchemaError> for CategoryError {
    fn from(e: SchemaError) -> Self {
        CategoryError::Schema(e)
    }
}

/// Runs Load → Fetch/Normalize → Merge → Aggregate → Export once
pub struct Pipeline<S> {
    source: S,
    exporter: Exporter,
    options: PipelineOptions,
    observer: Option<Observer>,
}

impl<S: CatalogSource> Pipeline<S> {
    pub fn new(source: S, exporter: Exporter, options: PipelineOptions) -> Self {
        Self {
            source,
            exporter,
            options,
            observer: None,
        }
    }

    pub fn with_observer<F>(mut self, observer: F) -> Self
    where
        F: Fn(&PipelineEvent) + Send + Sync + 'static,
    {
        self.observer = Some(Arc::new(observer));
        self
    }

    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    pub fn exporter(&self) -> &Exporter {
        &self.exporter
    }

    fn emit(&self, event: PipelineEvent) {
        if let Some(observer) = &self.observer {
            observer(&event);
        }
    }

    async fn fetch_category(&self, request: DiscoverRequest) -> Result<Vec<NormalizedRecord>, CategoryError> {
        let category = request.category;
        let mut pages = self.source.discover(request);
        let mut records = Vec::new();

        while let Some(page) = pages.next().await {
            let batch = normalize_page(page?, category)?;
            self.emit(PipelineEvent::PageFetched {
                category,
                records: batch.len(),
            });
            records.extend(batch);
        }
        Ok(records)
    }

    /// Vocabulary of every fetched category; shows win on an id clash
    async fn fetch_genres(&self, categories: &[Category]) -> Vec<Genre> {
        let mut names: BTreeMap<u32, String> = BTreeMap::new();
        for category in categories {
            match self.source.genres(*category).await {
                Ok(genres) => {
                    for genre in genres {
                        names.insert(genre.id, genre.name);
                    }
                }
                Err(e) => warn!(
                    operation = "genres",
                    category = %category,
                    error = %e,
                    "Could not fetch genre list, keeping previous reference file"
                ),
            }
        }
        names.into_iter().map(|(id, name)| Genre { id, name }).collect()
    }

    /// Count performers across the credits of the most popular titles of this run.
    ///
    /// A performer counts once per title. Titles whose credits cannot be
    /// fetched are skipped; `None` when nothing was sampled.
    async fn sample_cast(&self, fresh: &[NormalizedRecord]) -> Option<(Vec<CastCount>, usize)> {
        let limit = self.options.cast_sample;
        if limit == 0 {
            return None;
        }

        let mut ranked: Vec<&NormalizedRecord> = fresh.iter().collect();
        ranked.sort_by(|a, b| {
            b.popularity
                .total_cmp(&a.popularity)
                .then_with(|| a.key().cmp(&b.key()))
        });
        let mut seen = BTreeSet::new();
        let top = ranked.into_iter().filter(|r| seen.insert(r.key())).take(limit);

        let mut counts: BTreeMap<String, usize> = BTreeMap::new();
        let mut sampled = 0;
        for record in top {
            match self.source.cast(record.category, record.id).await {
                Ok(names) => {
                    sampled += 1;
                    let names: BTreeSet<String> = names.into_iter().collect();
                    for name in names {
                        *counts.entry(name).or_default() += 1;
                    }
                }
                Err(e) => warn!(
                    operation = "cast_sample",
                    key = %record.key(),
                    error = %e,
                    "Could not fetch credits, title left out of the sample"
                ),
            }
        }

        if sampled == 0 {
            warn!(operation = "cast_sample", "No credits could be fetched, cast counts not written");
            return None;
        }

        let mut rows: Vec<CastCount> = counts
            .into_iter()
            .map(|(name, count)| CastCount { name, count })
            .collect();
        // stable: equal counts stay in name order
        rows.sort_by(|a, b| b.count.cmp(&a.count));
        info!(operation = "cast_sample", titles = sampled, performers = rows.len(), "Cast sampled");
        Some((rows, sampled))
    }

    pub async fn run(&self) -> Result<RunReport, PipelineError> {
        let start = Instant::now();
        let options = &self.options;
        let (window_start, window_end) = options.window();

        info!(
            operation = "run_start",
            source = self.source.source_name(),
            run_date = %options.run_date,
            listing = %options.listing,
            %window_start,
            %window_end,
            categories = ?options.categories,
            dry_run = options.dry_run,
            "Starting pipeline run"
        );

        // Load before touching the network so a corrupt file fails fast
        let history = load_history(&self.exporter.canonical_path()).map_err(|e| {
            error!(operation = "load", stage = "load", error = %e, "Previous history is unusable");
            e
        })?;
        self.emit(PipelineEvent::HistoryLoaded {
            records: history.len(),
        });

        let mut fresh = Vec::new();
        let mut fetched = Vec::new();
        let mut failures = Vec::new();

        for category in &options.categories {
            let category = *category;
            self.emit(PipelineEvent::CategoryStarted { category });
            let request =
                DiscoverRequest::new(category, window_start, window_end).with_listing(options.listing);

            match self.fetch_category(request).await {
                Ok(records) => {
                    info!(operation = "fetch", category = %category, records = records.len(), "Category fetched");
                    self.emit(PipelineEvent::CategoryFinished {
                        category,
                        records: records.len(),
                    });
                    fresh.extend(records);
                    fetched.push(category);
                }
                Err(CategoryError::Fetch(e)) => {
                    warn!(
                        operation = "fetch",
                        category = %category,
                        kind = e.kind(),
                        error = %e,
                        "Category failed, continuing with the rest"
                    );
                    self.emit(PipelineEvent::CategoryFailed {
                        category,
                        error: e.to_string(),
                    });
                    failures.push(CategoryFailure {
                        category,
                        kind: e.kind(),
                        message: e.to_string(),
                    });
                }
                Err(CategoryError::Schema(e)) => {
                    error!(operation = "normalize", stage = "normalize", category = %category, error = %e, "Upstream contract violated");
                    return Err(PipelineError::Schema(e));
                }
            }
        }

        if fetched.is_empty() {
            let failures: Vec<String> = failures
                .iter()
                .map(|f| format!("{}: {}", f.category, f.message))
                .collect();
            error!(operation = "fetch", stage = "fetch", failures = ?failures, "No category could be fetched");
            return Err(PipelineError::NoCategorySucceeded { failures });
        }

        let genres = self.fetch_genres(&fetched).await;
        let cast = self.sample_cast(&fresh).await;
        let cast_titles_sampled = cast.as_ref().map_or(0, |(_, sampled)| *sampled);

        let fetched_records = fresh.len();
        let outcome = merge(history, fresh, options.run_date);
        let aggregates = aggregate(&outcome.history);

        let manifest = RunManifest {
            schema_version: SCHEMA_VERSION,
            run_date: options.run_date,
            listing: options.listing,
            window_start,
            window_end,
            total_records: outcome.history.len(),
            inserted: outcome.inserted,
            updated: outcome.updated,
            retained: outcome.retained,
            categories_fetched: fetched.clone(),
            categories_failed: failures.iter().map(|f| f.category).collect(),
            cast_titles_sampled,
        };

        let files_written = if options.dry_run {
            info!(operation = "export", dry_run = true, "Dry run, nothing written");
            Vec::new()
        } else {
            self.emit(PipelineEvent::Exporting);
            self.exporter
                .export(
                    &outcome.history,
                    &aggregates,
                    &genres,
                    cast.as_ref().map(|(counts, _)| counts.as_slice()),
                    &manifest,
                )
                .map_err(|e| {
                    error!(operation = "export", stage = "export", error = %e, "Export failed");
                    e
                })?
        };

        let report = RunReport {
            run_date: options.run_date,
            listing: options.listing,
            window_start,
            window_end,
            dry_run: options.dry_run,
            fetched_records,
            total_records: outcome.history.len(),
            inserted: outcome.inserted,
            updated: outcome.updated,
            retained: outcome.retained,
            categories_fetched: fetched,
            failures,
            genres: genres.len(),
            cast_titles_sampled,
            cast_counts: cast.map(|(counts, _)| counts).unwrap_or_default(),
            files_written,
            duration_ms: start.elapsed().as_millis() as u64,
            aggregates,
        };

        info!(
            operation = "run_complete",
            total_records = report.total_records,
            inserted = report.inserted,
            updated = report.updated,
            retained = report.retained,
            failed_categories = report.failures.len(),
            duration_ms = report.duration_ms,
            "Pipeline run finished"
        );
        Ok(report)
    }
}
