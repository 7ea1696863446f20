use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Content category as exposed by the metadata API
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Movie,
    Tv,
}

impl Category {
    pub const ALL: [Category; 2] = [Category::Movie, Category::Tv];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Movie => "movie",
            Category::Tv => "tv",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseCategoryError(String);

impl fmt::Display for ParseCategoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown category '{}' (expected 'movie' or 'tv')", self.0)
    }
}

impl std::error::Error for ParseCategoryError {}

impl FromStr for Category {
    type Err = ParseCategoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "movie" | "movies" => Ok(Category::Movie),
            "tv" | "show" | "shows" => Ok(Category::Tv),
            other => Err(ParseCategoryError(other.to_string())),
        }
    }
}

/// Identity of a record across the whole history.
///
/// Ordering is category first, then id, which is also the row order of the
/// canonical file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordKey {
    pub category: Category,
    pub id: u64,
}

impl RecordKey {
    pub fn new(category: Category, id: u64) -> Self {
        Self { category, id }
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.category, self.id)
    }
}

/// A freshly fetched record, before it has been placed in history
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedRecord {
    pub id: u64,
    pub category: Category,
    pub title: String,
    pub release_date: Option<NaiveDate>,
    pub original_language: Option<String>,
    pub genre_ids: BTreeSet<u32>,
    pub popularity: f64,
}

impl NormalizedRecord {
    pub fn key(&self) -> RecordKey {
        RecordKey::new(self.category, self.id)
    }
}

/// Canonical unit of history
#[derive(Debug, Clone, PartialEq)]
pub struct MediaRecord {
    pub id: u64,
    pub category: Category,
    pub title: String,
    pub release_date: Option<NaiveDate>,
    pub original_language: Option<String>,
    pub genre_ids: BTreeSet<u32>,
    pub popularity: f64,
    pub first_seen: NaiveDate,
    pub last_updated: NaiveDate,
}

impl MediaRecord {
    /// Create a record that enters history on `run_date`
    pub fn first_sighting(record: NormalizedRecord, run_date: NaiveDate) -> Self {
        Self {
            id: record.id,
            category: record.category,
            title: record.title,
            release_date: record.release_date,
            original_language: record.original_language,
            genre_ids: record.genre_ids,
            popularity: record.popularity,
            first_seen: run_date,
            last_updated: run_date,
        }
    }

    /// Overwrite mutable fields from a re-fetched record.
    ///
    /// `first_seen` is never touched and `last_updated` never moves backwards.
    pub fn refresh(&mut self, record: NormalizedRecord, run_date: NaiveDate) {
        self.title = record.title;
        self.popularity = record.popularity;
        self.genre_ids = record.genre_ids;
        self.original_language = record.original_language;
        if record.release_date.is_some() {
            self.release_date = record.release_date;
        }
        self.last_updated = self.last_updated.max(run_date);
    }

    pub fn key(&self) -> RecordKey {
        RecordKey::new(self.category, self.id)
    }
}
