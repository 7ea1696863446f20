use crate::error::ExportError;
use crate::history::{write_canonical, History};
use chrono::NaiveDate;
use media_history_models::{AggregateTable, Aggregates, CastCount, Category, Genre, Listing};
use serde::Serialize;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, error, info, warn};

/// Version of the exported column layout
pub const SCHEMA_VERSION: u32 = 1;

pub const CANONICAL_FILE: &str = "media_history.csv";
pub const GENRES_FILE: &str = "genres.csv";
pub const MANIFEST_FILE: &str = "manifest.json";

/// Summary of a run, written next to the data files
#[derive(Debug, Clone, Serialize)]
pub struct RunManifest {
    pub schema_version: u32,
    pub run_date: NaiveDate,
    pub listing: Listing,
    pub window_start: NaiveDate,
    pub window_end: NaiveDate,
    pub total_records: usize,
    pub inserted: usize,
    pub updated: usize,
    pub retained: usize,
    pub categories_fetched: Vec<Category>,
    pub categories_failed: Vec<Category>,
    /// Titles whose credits went into the cast counts, 0 when not sampled
    pub cast_titles_sampled: usize,
}

/// A fully written temp file waiting to replace its target
struct Staged {
    file: NamedTempFile,
    target: PathBuf,
}

/// A target that has been replaced, with what to put back if a later one fails
struct Replaced {
    target: PathBuf,
    /// Copy of the previous content; `None` when the target did not exist
    backup: Option<NamedTempFile>,
}

/// Writes the output files of a run into one directory
#[derive(Debug, Clone)]
pub struct Exporter {
    output_dir: PathBuf,
    snapshots: bool,
}

impl Exporter {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            snapshots: false,
        }
    }

    /// Also keep a dated copy of the canonical file per run
    pub fn with_snapshots(mut self, snapshots: bool) -> Self {
        self.snapshots = snapshots;
        self
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn canonical_path(&self) -> PathBuf {
        self.output_dir.join(CANONICAL_FILE)
    }

    pub fn table_path(&self, table: AggregateTable) -> PathBuf {
        self.output_dir.join(format!("{}.csv", table.file_stem()))
    }

    pub fn snapshot_path(&self, run_date: NaiveDate) -> PathBuf {
        self.output_dir
            .join(format!("media_history_{}.csv", run_date.format("%Y-%m-%d")))
    }

    pub fn cast_counts_path(&self, run_date: NaiveDate) -> PathBuf {
        self.output_dir
            .join(format!("sample_cast_counts_{}.csv", run_date.format("%Y-%m-%d")))
    }

    fn export_error(path: &Path, reason: impl ToString) -> ExportError {
        ExportError {
            path: path.to_path_buf(),
            reason: reason.to_string(),
        }
    }

    /// Write `content` into a temp file in the output directory
    fn stage<F>(&self, target: PathBuf, content: F) -> Result<Staged, ExportError>
    where
        F: FnOnce(&mut BufWriter<&mut NamedTempFile>) -> Result<(), String>,
    {
        let mut file =
            NamedTempFile::new_in(&self.output_dir).map_err(|e| Self::export_error(&target, e))?;
        {
            let mut writer = BufWriter::new(&mut file);
            content(&mut writer).map_err(|e| Self::export_error(&target, e))?;
            writer.flush().map_err(|e| Self::export_error(&target, e))?;
        }
        file.as_file()
            .sync_all()
            .map_err(|e| Self::export_error(&target, e))?;
        Ok(Staged { file, target })
    }

    fn stage_canonical(&self, history: &History, target: PathBuf) -> Result<Staged, ExportError> {
        self.stage(target, |writer| {
            write_canonical(history, writer).map_err(|e| e.to_string())
        })
    }

    fn stage_table(&self, table: AggregateTable, aggregates: &Aggregates) -> Result<Staged, ExportError> {
        let rows = aggregates.table(table);
        self.stage(self.table_path(table), |writer| {
            let mut csv_writer = csv::Writer::from_writer(writer);
            csv_writer
                .write_record(["dimension_key", "record_count", "mean_popularity"])
                .map_err(|e| e.to_string())?;
            for row in rows {
                csv_writer
                    .write_record([
                        row.dimension_key.clone(),
                        row.record_count.to_string(),
                        format!("{:.4}", row.mean_popularity),
                    ])
                    .map_err(|e| e.to_string())?;
            }
            csv_writer.flush().map_err(|e| e.to_string())
        })
    }

    fn stage_genres(&self, genres: &[Genre]) -> Result<Staged, ExportError> {
        self.stage(self.output_dir.join(GENRES_FILE), |writer| {
            let mut csv_writer = csv::Writer::from_writer(writer);
            for genre in genres {
                csv_writer.serialize(genre).map_err(|e| e.to_string())?;
            }
            csv_writer.flush().map_err(|e| e.to_string())
        })
    }

    fn stage_cast_counts(&self, counts: &[CastCount], run_date: NaiveDate) -> Result<Staged, ExportError> {
        self.stage(self.cast_counts_path(run_date), |writer| {
            let mut csv_writer = csv::Writer::from_writer(writer);
            // serialize writes the header with the first row
            if counts.is_empty() {
                csv_writer.write_record(["name", "count"]).map_err(|e| e.to_string())?;
            }
            for row in counts {
                csv_writer.serialize(row).map_err(|e| e.to_string())?;
            }
            csv_writer.flush().map_err(|e| e.to_string())
        })
    }

    fn stage_manifest(&self, manifest: &RunManifest) -> Result<Staged, ExportError> {
        self.stage(self.output_dir.join(MANIFEST_FILE), |writer| {
            serde_json::to_writer_pretty(&mut *writer, manifest).map_err(|e| e.to_string())?;
            writer.write_all(b"\n").map_err(|e| e.to_string())
        })
    }

    /// Copy an existing target next to it so it can be put back
    fn backup(&self, target: &Path) -> Result<Option<NamedTempFile>, ExportError> {
        if !target.is_file() {
            return Ok(None);
        }
        let backup = tempfile::Builder::new()
            .prefix(".backup")
            .tempfile_in(&self.output_dir)
            .map_err(|e| Self::export_error(target, e))?;
        std::fs::copy(target, backup.path()).map_err(|e| Self::export_error(target, e))?;
        Ok(Some(backup))
    }

    /// Undo already replaced targets, newest first
    fn roll_back(replaced: Vec<Replaced>) {
        for Replaced { target, backup } in replaced.into_iter().rev() {
            let restored = match backup {
                Some(backup) => backup.persist(&target).map(|_| ()).map_err(|e| e.error),
                None => std::fs::remove_file(&target),
            };
            if let Err(e) = restored {
                error!(
                    operation = "export_rollback",
                    path = %target.display(),
                    error = %e,
                    "Could not restore previous output"
                );
            }
        }
    }

    /// Write every output file of a run.
    ///
    /// All files are staged in full before any target is replaced, and the
    /// canonical dataset is replaced first. A failure while staging leaves
    /// every existing output untouched; a failure while replacing restores
    /// the targets already replaced, so the previous export stays whole.
    /// `genres.csv` is only rewritten when a vocabulary is available, and the
    /// dated cast counts only when credits were sampled.
    pub fn export(
        &self,
        history: &History,
        aggregates: &Aggregates,
        genres: &[Genre],
        cast_counts: Option<&[CastCount]>,
        manifest: &RunManifest,
    ) -> Result<Vec<PathBuf>, ExportError> {
        std::fs::create_dir_all(&self.output_dir)
            .map_err(|e| Self::export_error(&self.output_dir, e))?;

        let mut staged = vec![self.stage_canonical(history, self.canonical_path())?];
        for table in AggregateTable::ALL {
            staged.push(self.stage_table(table, aggregates)?);
        }
        if !genres.is_empty() {
            staged.push(self.stage_genres(genres)?);
        }
        if let Some(counts) = cast_counts {
            staged.push(self.stage_cast_counts(counts, manifest.run_date)?);
        }
        if self.snapshots {
            staged.push(self.stage_canonical(history, self.snapshot_path(manifest.run_date))?);
        }
        staged.push(self.stage_manifest(manifest)?);
        debug!(files = staged.len(), dir = %self.output_dir.display(), "Staged outputs");

        // every backup exists before the first target is touched
        let mut pending = Vec::with_capacity(staged.len());
        for Staged { file, target } in staged {
            let backup = self.backup(&target)?;
            pending.push((file, target, backup));
        }

        let mut replaced: Vec<Replaced> = Vec::with_capacity(pending.len());
        for (file, target, backup) in pending {
            if let Err(e) = file.persist(&target) {
                let err = Self::export_error(&target, e.error);
                warn!(
                    operation = "export",
                    path = %target.display(),
                    error = %err,
                    replaced = replaced.len(),
                    "Replacing outputs failed, restoring previous export"
                );
                Self::roll_back(replaced);
                return Err(err);
            }
            replaced.push(Replaced { target, backup });
        }
        let written: Vec<PathBuf> = replaced.into_iter().map(|r| r.target).collect();

        info!(
            dir = %self.output_dir.display(),
            files = written.len(),
            records = history.len(),
            "Exported dataset"
        );
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::aggregate;
    use crate::history::load_history;
    use media_history_models::MediaRecord;
    use std::collections::BTreeMap;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn history() -> History {
        vec![
            MediaRecord {
                id: 11,
                category: Category::Movie,
                title: "Heat".to_string(),
                release_date: Some(date("1995-12-15")),
                original_language: Some("en".to_string()),
                genre_ids: [80, 18].into_iter().collect(),
                popularity: 33.5,
                first_seen: date("2024-01-01"),
                last_updated: date("2024-01-08"),
            },
            MediaRecord {
                id: 22,
                category: Category::Tv,
                title: "Dark".to_string(),
                release_date: None,
                original_language: Some("de".to_string()),
                genre_ids: [18].into_iter().collect(),
                popularity: 101.0,
                first_seen: date("2024-01-08"),
                last_updated: date("2024-01-08"),
            },
        ]
        .into_iter()
        .collect()
    }

    fn manifest(history: &History) -> RunManifest {
        RunManifest {
            schema_version: SCHEMA_VERSION,
            run_date: date("2024-01-08"),
            listing: Listing::Discover,
            window_start: date("2023-07-12"),
            window_end: date("2024-01-08"),
            total_records: history.len(),
            inserted: 1,
            updated: 1,
            retained: 0,
            categories_fetched: vec![Category::Movie, Category::Tv],
            categories_failed: vec![],
            cast_titles_sampled: 0,
        }
    }

    fn genres() -> Vec<Genre> {
        vec![
            Genre { id: 18, name: "Drama".to_string() },
            Genre { id: 80, name: "Crime".to_string() },
        ]
    }

    #[test]
    fn test_export_writes_every_file() {
        let dir = tempfile::tempdir().unwrap();
        let exporter = Exporter::new(dir.path().join("out"));
        let history = history();

        let written = exporter
            .export(&history, &aggregate(&history), &genres(), None, &manifest(&history))
            .unwrap();

        let names: Vec<String> = written
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(
            names,
            vec![
                "media_history.csv",
                "by_genre.csv",
                "by_language.csv",
                "by_popularity_bucket.csv",
                "genres.csv",
                "manifest.json"
            ]
        );

        assert_eq!(load_history(&exporter.canonical_path()).unwrap(), history);

        let by_genre = std::fs::read_to_string(exporter.table_path(AggregateTable::ByGenre)).unwrap();
        let lines: Vec<&str> = by_genre.lines().collect();
        assert_eq!(lines[0], "dimension_key,record_count,mean_popularity");
        assert_eq!(lines[1], "18,2,67.2500");
        assert_eq!(lines[2], "80,1,33.5000");

        let genres_file = std::fs::read_to_string(dir.path().join("out").join(GENRES_FILE)).unwrap();
        assert!(genres_file.starts_with("id,name\n18,Drama\n"));

        let manifest: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(dir.path().join("out").join(MANIFEST_FILE)).unwrap())
                .unwrap();
        assert_eq!(manifest["schema_version"], 1);
        assert_eq!(manifest["run_date"], "2024-01-08");
        assert_eq!(manifest["categories_fetched"][1], "tv");
    }

    #[test]
    fn test_export_overwrites_previous_outputs() {
        let dir = tempfile::tempdir().unwrap();
        let exporter = Exporter::new(dir.path());
        std::fs::write(exporter.canonical_path(), "stale").unwrap();
        let history = history();

        exporter
            .export(&history, &aggregate(&history), &[], None, &manifest(&history))
            .unwrap();

        assert_eq!(load_history(&exporter.canonical_path()).unwrap().len(), 2);
        // no vocabulary fetched: the reference file is not touched
        assert!(!dir.path().join(GENRES_FILE).exists());
        // no temp files left behind
        let leftovers = std::fs::read_dir(dir.path())
            .unwrap()
            .filter(|e| {
                let name = e.as_ref().unwrap().file_name().to_string_lossy().to_string();
                name.starts_with(".tmp")
            })
            .count();
        assert_eq!(leftovers, 0);
    }

    #[test]
    fn test_cast_counts_file() {
        let dir = tempfile::tempdir().unwrap();
        let exporter = Exporter::new(dir.path());
        let history = history();
        let counts = vec![
            CastCount { name: "Al Pacino".to_string(), count: 2 },
            CastCount { name: "Robert De Niro".to_string(), count: 1 },
        ];

        let written = exporter
            .export(&history, &aggregate(&history), &[], Some(counts.as_slice()), &manifest(&history))
            .unwrap();

        let path = exporter.cast_counts_path(date("2024-01-08"));
        assert!(path.ends_with("sample_cast_counts_2024-01-08.csv"));
        assert!(written.contains(&path));
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "name,count\nAl Pacino,2\nRobert De Niro,1\n"
        );
    }

    #[test]
    fn test_snapshot_copy() {
        let dir = tempfile::tempdir().unwrap();
        let exporter = Exporter::new(dir.path()).with_snapshots(true);
        let history = history();

        exporter
            .export(&history, &aggregate(&history), &[], None, &manifest(&history))
            .unwrap();

        let snapshot = exporter.snapshot_path(date("2024-01-08"));
        assert!(snapshot.ends_with("media_history_2024-01-08.csv"));
        assert_eq!(
            std::fs::read_to_string(&snapshot).unwrap(),
            std::fs::read_to_string(exporter.canonical_path()).unwrap()
        );
    }

    fn grown_history() -> History {
        let mut history = history();
        history.upsert(MediaRecord {
            id: 33,
            category: Category::Movie,
            title: "Alien".to_string(),
            release_date: Some(date("1979-05-25")),
            original_language: Some("en".to_string()),
            genre_ids: [27, 878].into_iter().collect(),
            popularity: 5.0,
            first_seen: date("2024-01-15"),
            last_updated: date("2024-01-15"),
        });
        history
    }

    fn read_outputs(dir: &Path) -> BTreeMap<String, Vec<u8>> {
        std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().path())
            .filter(|p| p.is_file())
            .map(|p| {
                let name = p.file_name().unwrap().to_string_lossy().to_string();
                (name, std::fs::read(&p).unwrap())
            })
            .collect()
    }

    #[test]
    fn test_failed_replace_restores_previous_export() {
        let dir = tempfile::tempdir().unwrap();
        let exporter = Exporter::new(dir.path());
        let first = history();
        exporter
            .export(&first, &aggregate(&first), &[], None, &manifest(&first))
            .unwrap();

        // a target that cannot be replaced, halfway through the file list
        let blocked = exporter.table_path(AggregateTable::ByPopularityBucket);
        std::fs::remove_file(&blocked).unwrap();
        std::fs::create_dir(&blocked).unwrap();
        let before = read_outputs(dir.path());

        let second = grown_history();
        let err = exporter
            .export(&second, &aggregate(&second), &genres(), None, &manifest(&second))
            .unwrap_err();

        assert_eq!(err.path, blocked);
        assert_eq!(read_outputs(dir.path()), before);
        assert_eq!(load_history(&exporter.canonical_path()).unwrap(), first);
    }

    #[test]
    fn test_failed_replace_removes_files_new_to_this_run() {
        let dir = tempfile::tempdir().unwrap();
        let exporter = Exporter::new(dir.path()).with_snapshots(true);
        let first = history();
        let mut first_manifest = manifest(&first);
        first_manifest.run_date = date("2024-01-01");
        exporter
            .export(&first, &aggregate(&first), &[], None, &first_manifest)
            .unwrap();

        let blocked = dir.path().join(MANIFEST_FILE);
        std::fs::remove_file(&blocked).unwrap();
        std::fs::create_dir(&blocked).unwrap();
        let before = read_outputs(dir.path());

        let second = grown_history();
        let err = exporter
            .export(&second, &aggregate(&second), &genres(), None, &manifest(&second))
            .unwrap_err();

        assert_eq!(err.path, blocked);
        assert!(!dir.path().join(GENRES_FILE).exists());
        assert!(!exporter.snapshot_path(date("2024-01-08")).exists());
        assert!(exporter.snapshot_path(date("2024-01-01")).exists());
        assert_eq!(read_outputs(dir.path()), before);
    }

    #[test]
    fn test_unwritable_output_dir_is_export_error() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, "file").unwrap();
        let exporter = Exporter::new(&blocker);
        let history = history();

        let err = exporter
            .export(&history, &aggregate(&history), &[], None, &manifest(&history))
            .unwrap_err();

        assert_eq!(err.path, blocker);
    }
}
