use crate::error::HistoryCorruptError;
use chrono::NaiveDate;
use media_history_models::{Category, MediaRecord, RecordKey};
use serde::{Deserialize, Serialize};
use std::collections::btree_map::{self, BTreeMap};
use std::collections::BTreeSet;
use std::io::Write;
use std::path::Path;
use tracing::{debug, info};

/// Column order of the canonical file; changing it breaks downstream consumers
pub const CANONICAL_COLUMNS: [&str; 9] = [
    "category",
    "id",
    "title",
    "release_date",
    "original_language",
    "genre_ids",
    "popularity",
    "first_seen",
    "last_updated",
];

const GENRE_DELIMITER: char = ';';

/// Cumulative, deduplicated set of every record ever observed.
///
/// Passed by value into and out of the merge step; there is no shared instance.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct History {
    records: BTreeMap<RecordKey, MediaRecord>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, key: &RecordKey) -> Option<&MediaRecord> {
        self.records.get(key)
    }

    pub fn contains(&self, key: &RecordKey) -> bool {
        self.records.contains_key(key)
    }

    /// Records in key order (movies first, then ascending id)
    pub fn iter(&self) -> impl Iterator<Item = &MediaRecord> {
        self.records.values()
    }

    pub(crate) fn entry(&mut self, key: RecordKey) -> btree_map::Entry<'_, RecordKey, MediaRecord> {
        self.records.entry(key)
    }

    /// Insert a record, replacing any record with the same key
    pub fn upsert(&mut self, record: MediaRecord) -> Option<MediaRecord> {
        self.records.insert(record.key(), record)
    }
}

impl FromIterator<MediaRecord> for History {
    fn from_iter<I: IntoIterator<Item = MediaRecord>>(iter: I) -> Self {
        let mut history = History::new();
        for record in iter {
            history.upsert(record);
        }
        history
    }
}

/// One line of the canonical file
#[derive(Debug, Serialize, Deserialize)]
struct CanonicalRow {
    category: Category,
    id: u64,
    title: String,
    release_date: Option<NaiveDate>,
    original_language: Option<String>,
    genre_ids: String,
    popularity: f64,
    first_seen: NaiveDate,
    last_updated: NaiveDate,
}

impl From<&MediaRecord> for CanonicalRow {
    fn from(record: &MediaRecord) -> Self {
        let genre_ids = record
            .genre_ids
            .iter()
            .map(|g| g.to_string())
            .collect::<Vec<_>>()
            .join(&GENRE_DELIMITER.to_string());
        Self {
            category: record.category,
            id: record.id,
            title: record.title.clone(),
            release_date: record.release_date,
            original_language: record.original_language.clone(),
            genre_ids,
            popularity: record.popularity,
            first_seen: record.first_seen,
            last_updated: record.last_updated,
        }
    }
}

fn parse_genre_ids(field: &str) -> Result<BTreeSet<u32>, String> {
    field
        .split(GENRE_DELIMITER)
        .map(str::trim)
        .filter(|g| !g.is_empty())
        .map(|g| g.parse::<u32>().map_err(|e| format!("bad genre id '{}': {}", g, e)))
        .collect()
}

impl TryFrom<CanonicalRow> for MediaRecord {
    type Error = String;

    fn try_from(row: CanonicalRow) -> Result<Self, Self::Error> {
        if row.first_seen > row.last_updated {
            return Err(format!(
                "first_seen {} is after last_updated {}",
                row.first_seen, row.last_updated
            ));
        }
        if !row.popularity.is_finite() || row.popularity < 0.0 {
            return Err(format!("popularity {} out of range", row.popularity));
        }
        Ok(MediaRecord {
            id: row.id,
            category: row.category,
            title: row.title,
            release_date: row.release_date,
            original_language: row.original_language.filter(|l| !l.is_empty()),
            genre_ids: parse_genre_ids(&row.genre_ids)?,
            popularity: row.popularity,
            first_seen: row.first_seen,
            last_updated: row.last_updated,
        })
    }
}

/// Read the previous canonical dataset.
///
/// A missing file is a first run and yields an empty history. Anything that
/// exists but cannot be read back exactly is an error; the file is left as is.
pub fn load_history(path: &Path) -> Result<History, HistoryCorruptError> {
    let corrupt = |reason: String| HistoryCorruptError {
        path: path.to_path_buf(),
        reason,
    };

    if !path.exists() {
        info!(path = %path.display(), "No previous history, starting a new dataset");
        return Ok(History::new());
    }

    let mut reader = csv::Reader::from_path(path).map_err(|e| corrupt(e.to_string()))?;

    let headers = reader.headers().map_err(|e| corrupt(e.to_string()))?.clone();
    let found: Vec<&str> = headers.iter().collect();
    if found != CANONICAL_COLUMNS {
        return Err(corrupt(format!(
            "unexpected columns {:?}, expected {:?}",
            found, CANONICAL_COLUMNS
        )));
    }

    let mut history = History::new();
    for (index, row) in reader.deserialize::<CanonicalRow>().enumerate() {
        // header is line 1
        let line = index + 2;
        let row = row.map_err(|e| corrupt(format!("line {}: {}", line, e)))?;
        let record = MediaRecord::try_from(row).map_err(|e| corrupt(format!("line {}: {}", line, e)))?;
        let key = record.key();
        if history.upsert(record).is_some() {
            return Err(corrupt(format!("line {}: duplicate key {}", line, key)));
        }
    }

    debug!(path = %path.display(), records = history.len(), "Loaded history");
    Ok(history)
}

/// Serialize the canonical dataset in key order
pub fn write_canonical<W: Write>(history: &History, writer: W) -> csv::Result<()> {
    let mut writer = csv::Writer::from_writer(writer);
    if history.is_empty() {
        writer.write_record(CANONICAL_COLUMNS)?;
    }
    for record in history.iter() {
        writer.serialize(CanonicalRow::from(record))?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;
    use tempfile::NamedTempFile;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn record(category: Category, id: u64, genres: &[u32], language: Option<&str>) -> MediaRecord {
        MediaRecord {
            id,
            category,
            title: format!("Title, \"quoted\" {}", id),
            release_date: if id % 2 == 0 { Some(date("2024-03-01")) } else { None },
            original_language: language.map(str::to_string),
            genre_ids: genres.iter().copied().collect(),
            popularity: 12.75,
            first_seen: date("2024-01-01"),
            last_updated: date("2024-01-08"),
        }
    }

    fn write_file(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{}", content).unwrap();
        file
    }

    #[test]
    fn test_missing_file_is_empty_history() {
        let dir = tempfile::tempdir().unwrap();
        let history = load_history(&dir.path().join("media_history.csv")).unwrap();
        assert!(history.is_empty());
    }

    #[test]
    fn test_written_history_reads_back() {
        let history: History = vec![
            record(Category::Tv, 3, &[18], Some("ko")),
            record(Category::Movie, 2, &[28, 12], Some("en")),
            record(Category::Movie, 7, &[], None),
        ]
        .into_iter()
        .collect();

        let file = NamedTempFile::new().unwrap();
        write_canonical(&history, file.reopen().unwrap()).unwrap();

        let loaded = load_history(file.path()).unwrap();
        assert_eq!(loaded, history);
    }

    #[test]
    fn test_canonical_layout() {
        let history: History = vec![
            record(Category::Tv, 3, &[18], Some("ko")),
            record(Category::Movie, 2, &[28, 12], Some("en")),
        ]
        .into_iter()
        .collect();

        let mut buffer = Vec::new();
        write_canonical(&history, &mut buffer).unwrap();
        let text = String::from_utf8(buffer).unwrap();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(
            lines[0],
            "category,id,title,release_date,original_language,genre_ids,popularity,first_seen,last_updated"
        );
        // movies sort before tv; genre ids ascending and delimiter-joined
        assert!(lines[1].starts_with("movie,2,"));
        assert!(lines[1].contains(",12;28,"));
        assert!(lines[2].starts_with("tv,3,"));
    }

    #[test]
    fn test_empty_history_still_writes_header() {
        let mut buffer = Vec::new();
        write_canonical(&History::new(), &mut buffer).unwrap();
        let text = String::from_utf8(buffer).unwrap();
        assert_eq!(text.trim_end(), CANONICAL_COLUMNS.join(","));

        let file = write_file(&text);
        assert!(load_history(file.path()).unwrap().is_empty());
    }

    #[test]
    fn test_garbage_is_corrupt() {
        let file = write_file("\u{0}\u{1}not,a,history\nfile");
        let err = load_history(file.path()).unwrap_err();
        assert!(err.reason.contains("unexpected columns"));
    }

    #[test]
    fn test_bad_row_is_corrupt() {
        let file = write_file(
            "category,id,title,release_date,original_language,genre_ids,popularity,first_seen,last_updated\n\
             movie,abc,Broken,,en,,1.0,2024-01-01,2024-01-01\n",
        );
        let err = load_history(file.path()).unwrap_err();
        assert!(err.reason.contains("line 2"));
    }

    #[test]
    fn test_duplicate_key_is_corrupt() {
        let file = write_file(
            "category,id,title,release_date,original_language,genre_ids,popularity,first_seen,last_updated\n\
             movie,5,A,,en,,1.0,2024-01-01,2024-01-01\n\
             movie,5,B,,en,,2.0,2024-01-01,2024-01-01\n",
        );
        let err = load_history(file.path()).unwrap_err();
        assert!(err.reason.contains("duplicate key movie:5"));
    }

    #[test]
    fn test_inverted_dates_are_corrupt() {
        let file = write_file(
            "category,id,title,release_date,original_language,genre_ids,popularity,first_seen,last_updated\n\
             tv,5,A,,en,18,1.0,2024-02-01,2024-01-01\n",
        );
        let err = load_history(file.path()).unwrap_err();
        assert!(err.reason.contains("first_seen"));
    }

    #[test]
    fn test_parse_genre_ids_tolerates_spacing() {
        let ids = parse_genre_ids(" 18 ; 35;;").unwrap();
        assert_eq!(ids.into_iter().collect::<Vec<_>>(), vec![18, 35]);
        assert!(parse_genre_ids("18;drama").is_err());
    }
}
