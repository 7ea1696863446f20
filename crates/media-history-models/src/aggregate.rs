use serde::{Deserialize, Serialize};

/// One row of a derived summary table
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AggregateRow {
    pub dimension_key: String,
    pub record_count: usize,
    pub mean_popularity: f64,
}

/// The three summary views recomputed on every run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AggregateTable {
    ByGenre,
    ByLanguage,
    ByPopularityBucket,
}

impl AggregateTable {
    pub const ALL: [AggregateTable; 3] = [
        AggregateTable::ByGenre,
        AggregateTable::ByLanguage,
        AggregateTable::ByPopularityBucket,
    ];

    /// Stable file stem used by the exporter (part of the output contract)
    pub fn file_stem(&self) -> &'static str {
        match self {
            AggregateTable::ByGenre => "by_genre",
            AggregateTable::ByLanguage => "by_language",
            AggregateTable::ByPopularityBucket => "by_popularity_bucket",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Aggregates {
    pub by_genre: Vec<AggregateRow>,
    pub by_language: Vec<AggregateRow>,
    pub by_popularity_bucket: Vec<AggregateRow>,
}

impl Aggregates {
    pub fn table(&self, table: AggregateTable) -> &[AggregateRow] {
        match table {
            AggregateTable::ByGenre => &self.by_genre,
            AggregateTable::ByLanguage => &self.by_language,
            AggregateTable::ByPopularityBucket => &self.by_popularity_bucket,
        }
    }
}

/// Fixed-width popularity ranges, lower bound inclusive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PopularityBucket {
    Under10,
    From10To25,
    From25To50,
    From50To100,
    Over100,
}

impl PopularityBucket {
    pub const ALL: [PopularityBucket; 5] = [
        PopularityBucket::Under10,
        PopularityBucket::From10To25,
        PopularityBucket::From25To50,
        PopularityBucket::From50To100,
        PopularityBucket::Over100,
    ];

    pub fn for_score(popularity: f64) -> Self {
        // NaN and negatives land in the lowest bucket
        if popularity >= 100.0 {
            PopularityBucket::Over100
        } else if popularity >= 50.0 {
            PopularityBucket::From50To100
        } else if popularity >= 25.0 {
            PopularityBucket::From25To50
        } else if popularity >= 10.0 {
            PopularityBucket::From10To25
        } else {
            PopularityBucket::Under10
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            PopularityBucket::Under10 => "0-10",
            PopularityBucket::From10To25 => "10-25",
            PopularityBucket::From25To50 => "25-50",
            PopularityBucket::From50To100 => "50-100",
            PopularityBucket::Over100 => "100+",
        }
    }
}
