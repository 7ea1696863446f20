use crate::history::History;
use media_history_models::{AggregateRow, Aggregates, PopularityBucket};
use std::collections::BTreeMap;

/// Key used for records without an original language
pub const UNKNOWN_LANGUAGE: &str = "unknown";

#[derive(Debug, Default, Clone, Copy)]
struct Tally {
    count: usize,
    total: f64,
}

impl Tally {
    fn add(&mut self, popularity: f64) {
        self.count += 1;
        self.total += popularity;
    }

    fn into_row(self, dimension_key: String) -> AggregateRow {
        let mean_popularity = if self.count == 0 {
            0.0
        } else {
            self.total / self.count as f64
        };
        AggregateRow {
            dimension_key,
            record_count: self.count,
            mean_popularity,
        }
    }
}

/// Recompute every summary table from scratch
pub fn aggregate(history: &History) -> Aggregates {
    let mut genres: BTreeMap<u32, Tally> = BTreeMap::new();
    let mut languages: BTreeMap<String, Tally> = BTreeMap::new();
    let mut unknown_language = Tally::default();
    let mut buckets: BTreeMap<PopularityBucket, Tally> =
        PopularityBucket::ALL.iter().map(|b| (*b, Tally::default())).collect();

    for record in history.iter() {
        // one contribution per genre; genre-less records are left out here only
        for genre in &record.genre_ids {
            genres.entry(*genre).or_default().add(record.popularity);
        }

        match record.original_language.as_deref() {
            Some(code) if !code.is_empty() => languages.entry(code.to_string()).or_default().add(record.popularity),
            _ => unknown_language.add(record.popularity),
        }

        buckets
            .entry(PopularityBucket::for_score(record.popularity))
            .or_default()
            .add(record.popularity);
    }

    let by_genre = genres
        .into_iter()
        .map(|(genre, tally)| tally.into_row(genre.to_string()))
        .collect();

    let mut by_language: Vec<AggregateRow> = languages
        .into_iter()
        .map(|(code, tally)| tally.into_row(code))
        .collect();
    if unknown_language.count > 0 {
        by_language.push(unknown_language.into_row(UNKNOWN_LANGUAGE.to_string()));
    }

    let by_popularity_bucket = buckets
        .into_iter()
        .map(|(bucket, tally)| tally.into_row(bucket.label().to_string()))
        .collect();

    Aggregates {
        by_genre,
        by_language,
        by_popularity_bucket,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use media_history_models::{Category, MediaRecord};

    fn record(id: u64, genres: &[u32], language: Option<&str>, popularity: f64) -> MediaRecord {
        let day = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        MediaRecord {
            id,
            category: Category::Movie,
            title: format!("Title {}", id),
            release_date: None,
            original_language: language.map(str::to_string),
            genre_ids: genres.iter().copied().collect(),
            popularity,
            first_seen: day,
            last_updated: day,
        }
    }

    fn sample() -> History {
        vec![
            record(1, &[28, 12], Some("en"), 120.0),
            record(2, &[28], Some("ja"), 30.0),
            record(3, &[], None, 4.0),
            record(4, &[18], Some("en"), 60.0),
        ]
        .into_iter()
        .collect()
    }

    fn row<'a>(rows: &'a [AggregateRow], key: &str) -> &'a AggregateRow {
        rows.iter().find(|r| r.dimension_key == key).unwrap()
    }

    #[test]
    fn test_genre_membership_is_many_to_many() {
        let aggregates = aggregate(&sample());

        let keys: Vec<&str> = aggregates.by_genre.iter().map(|r| r.dimension_key.as_str()).collect();
        assert_eq!(keys, vec!["12", "18", "28"]);

        let action = row(&aggregates.by_genre, "28");
        assert_eq!(action.record_count, 2);
        assert_eq!(action.mean_popularity, 75.0);

        // the genre-less record is not counted anywhere in this table
        let genre_total: usize = aggregates.by_genre.iter().map(|r| r.record_count).sum();
        assert_eq!(genre_total, 4);
    }

    #[test]
    fn test_missing_language_is_unknown_and_last() {
        let aggregates = aggregate(&sample());

        let keys: Vec<&str> = aggregates.by_language.iter().map(|r| r.dimension_key.as_str()).collect();
        assert_eq!(keys, vec!["en", "ja", UNKNOWN_LANGUAGE]);
        assert_eq!(row(&aggregates.by_language, "en").mean_popularity, 90.0);
        assert_eq!(row(&aggregates.by_language, UNKNOWN_LANGUAGE).record_count, 1);
    }

    #[test]
    fn test_all_buckets_present_and_sum_to_total() {
        let history = sample();
        let aggregates = aggregate(&history);

        let labels: Vec<&str> = aggregates
            .by_popularity_bucket
            .iter()
            .map(|r| r.dimension_key.as_str())
            .collect();
        assert_eq!(labels, vec!["0-10", "10-25", "25-50", "50-100", "100+"]);

        let empty = row(&aggregates.by_popularity_bucket, "10-25");
        assert_eq!(empty.record_count, 0);
        assert_eq!(empty.mean_popularity, 0.0);

        let total: usize = aggregates.by_popularity_bucket.iter().map(|r| r.record_count).sum();
        assert_eq!(total, history.len());
    }

    #[test]
    fn test_empty_history() {
        let aggregates = aggregate(&History::new());

        assert!(aggregates.by_genre.is_empty());
        assert!(aggregates.by_language.is_empty());
        assert_eq!(aggregates.by_popularity_bucket.len(), 5);
        assert!(aggregates.by_popularity_bucket.iter().all(|r| r.record_count == 0));
    }
}
