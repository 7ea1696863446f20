use crate::history::History;
use chrono::NaiveDate;
use media_history_models::{MediaRecord, NormalizedRecord, RecordKey};
use std::collections::btree_map::Entry;
use std::collections::BTreeSet;
use tracing::debug;

/// New history plus what changed relative to the previous one
#[derive(Debug, Clone)]
pub struct MergeOutcome {
    pub history: History,
    /// Keys seen for the first time
    pub inserted: usize,
    /// Keys already in history that were re-fetched
    pub updated: usize,
    /// Keys carried forward untouched
    pub retained: usize,
}

/// Fold a fetch into history.
///
/// Records are never removed. A record seen again keeps its `first_seen` and
/// takes the mutable fields of the latest fetch; when the same key appears
/// more than once in `fresh`, the last occurrence wins.
pub fn merge(previous: History, fresh: Vec<NormalizedRecord>, run_date: NaiveDate) -> MergeOutcome {
    let previous_len = previous.len();
    let mut history = previous;
    let mut inserted: BTreeSet<RecordKey> = BTreeSet::new();
    let mut updated: BTreeSet<RecordKey> = BTreeSet::new();

    for record in fresh {
        let key = record.key();
        match history.entry(key) {
            Entry::Occupied(mut entry) => {
                entry.get_mut().refresh(record, run_date);
                if !inserted.contains(&key) {
                    updated.insert(key);
                }
            }
            Entry::Vacant(entry) => {
                entry.insert(MediaRecord::first_sighting(record, run_date));
                inserted.insert(key);
            }
        }
    }

    let retained = previous_len - updated.len();
    debug!(
        inserted = inserted.len(),
        updated = updated.len(),
        retained,
        total = history.len(),
        "Merged fetch into history"
    );

    MergeOutcome {
        history,
        inserted: inserted.len(),
        updated: updated.len(),
        retained,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use media_history_models::Category;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn fresh(category: Category, id: u64, popularity: f64) -> NormalizedRecord {
        NormalizedRecord {
            id,
            category,
            title: format!("Title {}", id),
            release_date: Some(date("2024-03-01")),
            original_language: Some("en".to_string()),
            genre_ids: [18].into_iter().collect(),
            popularity,
        }
    }

    #[test]
    fn test_first_run_inserts_everything() {
        let run_date = date("2024-06-01");
        let outcome = merge(
            History::new(),
            vec![fresh(Category::Movie, 1, 5.0), fresh(Category::Tv, 1, 7.0)],
            run_date,
        );

        assert_eq!(outcome.inserted, 2);
        assert_eq!(outcome.updated, 0);
        assert_eq!(outcome.retained, 0);
        // same id in different categories are different records
        assert_eq!(outcome.history.len(), 2);
        for record in outcome.history.iter() {
            assert_eq!(record.first_seen, run_date);
            assert_eq!(record.last_updated, run_date);
        }
    }

    #[test]
    fn test_refetched_record_is_updated_in_place() {
        let first = merge(History::new(), vec![fresh(Category::Movie, 5, 10.0)], date("2024-01-01"));

        let mut changed = fresh(Category::Movie, 5, 42.0);
        changed.title = "Renamed".to_string();
        let second = merge(first.history, vec![changed], date("2024-01-08"));

        assert_eq!(second.inserted, 0);
        assert_eq!(second.updated, 1);
        let record = second.history.get(&RecordKey::new(Category::Movie, 5)).unwrap();
        assert_eq!(record.title, "Renamed");
        assert_eq!(record.popularity, 42.0);
        assert_eq!(record.first_seen, date("2024-01-01"));
        assert_eq!(record.last_updated, date("2024-01-08"));
    }

    #[test]
    fn test_unseen_records_are_retained() {
        let first = merge(
            History::new(),
            vec![fresh(Category::Movie, 1, 1.0), fresh(Category::Movie, 2, 2.0)],
            date("2024-01-01"),
        );

        let second = merge(first.history, vec![fresh(Category::Movie, 3, 3.0)], date("2024-01-08"));

        assert_eq!(second.history.len(), 3);
        assert_eq!((second.inserted, second.updated, second.retained), (1, 0, 2));
        let kept = second.history.get(&RecordKey::new(Category::Movie, 1)).unwrap();
        assert_eq!(kept.last_updated, date("2024-01-01"));
    }

    #[test]
    fn test_history_never_shrinks() {
        let mut history = History::new();
        let batches = [
            vec![fresh(Category::Movie, 1, 1.0), fresh(Category::Tv, 2, 1.0)],
            vec![],
            vec![fresh(Category::Tv, 2, 3.0)],
            vec![fresh(Category::Movie, 9, 1.0)],
        ];
        let mut day = date("2024-01-01");
        let mut previous_len = 0;
        for batch in batches {
            history = merge(history, batch, day).history;
            assert!(history.len() >= previous_len);
            previous_len = history.len();
            day = day.succ_opt().unwrap();
        }
        assert_eq!(history.len(), 3);
    }

    #[test]
    fn test_duplicates_within_one_fetch_last_wins() {
        let outcome = merge(
            History::new(),
            vec![fresh(Category::Tv, 7, 1.0), fresh(Category::Tv, 7, 99.0)],
            date("2024-02-01"),
        );

        assert_eq!(outcome.history.len(), 1);
        assert_eq!(outcome.inserted, 1);
        assert_eq!(outcome.updated, 0);
        assert_eq!(outcome.history.iter().next().unwrap().popularity, 99.0);
    }

    #[test]
    fn test_older_run_date_does_not_rewind_last_updated() {
        let first = merge(History::new(), vec![fresh(Category::Movie, 1, 1.0)], date("2024-05-01"));
        let backfill = merge(first.history, vec![fresh(Category::Movie, 1, 2.0)], date("2024-04-01"));

        let record = backfill.history.iter().next().unwrap();
        assert_eq!(record.first_seen, date("2024-05-01"));
        assert_eq!(record.last_updated, date("2024-05-01"));
        assert!(record.first_seen <= record.last_updated);
    }

    #[test]
    fn test_same_day_rerun_is_idempotent() {
        let run_date = date("2024-06-01");
        let batch = vec![fresh(Category::Movie, 1, 1.0), fresh(Category::Tv, 4, 8.0)];

        let once = merge(History::new(), batch.clone(), run_date);
        let twice = merge(once.history.clone(), batch, run_date);

        assert_eq!(once.history, twice.history);
        assert_eq!(twice.inserted, 0);
    }
}
