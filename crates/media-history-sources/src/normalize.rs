use crate::error::SchemaError;
use crate::tmdb::api::RawRecord;
use chrono::NaiveDate;
use media_history_models::{Category, NormalizedRecord};
use tracing::{debug, warn};

/// Drops blank values; kept values are returned exactly as sent
fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn parse_date(value: Option<String>, id: u64) -> Option<NaiveDate> {
    let value = non_blank(value)?;
    match NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d") {
        Ok(date) => Some(date),
        Err(e) => {
            debug!(id, value = %value, error = %e, "Ignoring unparseable release date");
            None
        }
    }
}

/// Map one API record onto the unified schema.
///
/// Optional fields that are missing or unusable are left unset; only a
/// missing id or title is an error.
pub fn normalize(raw: RawRecord, category: Category) -> Result<NormalizedRecord, SchemaError> {
    let id = raw.id.ok_or(SchemaError {
        category,
        field: "id",
        id: None,
    })?;

    // movies are titled, shows are named; accept either
    let (title, alt_title, date, alt_date) = match category {
        Category::Movie => (raw.title, raw.name, raw.release_date, raw.first_air_date),
        Category::Tv => (raw.name, raw.title, raw.first_air_date, raw.release_date),
    };

    let title = non_blank(title).or_else(|| non_blank(alt_title)).ok_or(SchemaError {
        category,
        field: "title",
        id: Some(id),
    })?;

    let release_date = parse_date(date, id).or_else(|| parse_date(alt_date, id));

    let popularity = match raw.popularity {
        Some(p) if p.is_finite() && p >= 0.0 => p,
        Some(p) => {
            warn!(id, popularity = p, "Popularity out of range, using 0");
            0.0
        }
        None => 0.0,
    };

    Ok(NormalizedRecord {
        id,
        category,
        title,
        release_date,
        original_language: non_blank(raw.original_language),
        genre_ids: raw.genre_ids.unwrap_or_default().into_iter().collect(),
        popularity,
    })
}

/// Normalize a whole page, stopping at the first contract violation
pub fn normalize_page(records: Vec<RawRecord>, category: Category) -> Result<Vec<NormalizedRecord>, SchemaError> {
    records
        .into_iter()
        .map(|raw| normalize(raw, category))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn movie(id: u64) -> RawRecord {
        RawRecord {
            id: Some(id),
            title: Some("Dune: Part Two".to_string()),
            release_date: Some("2024-02-27".to_string()),
            original_language: Some("en".to_string()),
            genre_ids: Some(vec![878, 12]),
            popularity: Some(231.4),
            ..RawRecord::default()
        }
    }

    #[test]
    fn test_normalize_movie() {
        let record = normalize(movie(693134), Category::Movie).unwrap();

        assert_eq!(record.id, 693134);
        assert_eq!(record.category, Category::Movie);
        assert_eq!(record.title, "Dune: Part Two");
        assert_eq!(record.release_date, NaiveDate::from_ymd_opt(2024, 2, 27));
        assert_eq!(record.original_language.as_deref(), Some("en"));
        assert_eq!(record.genre_ids.iter().copied().collect::<Vec<_>>(), vec![12, 878]);
        assert_eq!(record.popularity, 231.4);
    }

    #[test]
    fn test_normalize_tv_uses_name_and_first_air_date() {
        let raw = RawRecord {
            id: Some(1399),
            name: Some("Game of Thrones".to_string()),
            first_air_date: Some("2011-04-17".to_string()),
            ..RawRecord::default()
        };

        let record = normalize(raw, Category::Tv).unwrap();

        assert_eq!(record.title, "Game of Thrones");
        assert_eq!(record.release_date, NaiveDate::from_ymd_opt(2011, 4, 17));
    }

    #[test]
    fn test_missing_optional_fields_left_unset() {
        let raw = RawRecord {
            id: Some(5),
            title: Some("Untitled Project".to_string()),
            release_date: Some("".to_string()),
            original_language: Some("  ".to_string()),
            ..RawRecord::default()
        };

        let record = normalize(raw, Category::Movie).unwrap();

        assert_eq!(record.release_date, None);
        assert_eq!(record.original_language, None);
        assert!(record.genre_ids.is_empty());
        assert_eq!(record.popularity, 0.0);
    }

    #[test]
    fn test_malformed_date_and_negative_popularity() {
        let mut raw = movie(5);
        raw.release_date = Some("sometime 2025".to_string());
        raw.popularity = Some(-3.0);

        let record = normalize(raw, Category::Movie).unwrap();

        assert_eq!(record.release_date, None);
        assert_eq!(record.popularity, 0.0);
    }

    #[test]
    fn test_title_is_stored_as_sent() {
        let mut raw = movie(7);
        raw.title = Some("  Alien: Romulus ".to_string());
        raw.release_date = Some(" 2024-08-13 ".to_string());

        let record = normalize(raw, Category::Movie).unwrap();

        assert_eq!(record.title, "  Alien: Romulus ");
        assert_eq!(record.release_date, NaiveDate::from_ymd_opt(2024, 8, 13));
    }

    #[test]
    fn test_missing_id_is_schema_error() {
        let mut raw = movie(1);
        raw.id = None;

        let err = normalize(raw, Category::Movie).unwrap_err();

        assert_eq!(err.field, "id");
        assert_eq!(err.id, None);
    }

    #[test]
    fn test_missing_title_is_schema_error() {
        let raw = RawRecord {
            id: Some(42),
            title: Some("   ".to_string()),
            ..RawRecord::default()
        };

        let err = normalize(raw, Category::Movie).unwrap_err();

        assert_eq!(err.field, "title");
        assert_eq!(err.id, Some(42));
        assert!(err.to_string().contains("id 42"));
    }

    #[test]
    fn test_normalize_page_stops_at_first_violation() {
        let mut broken = movie(2);
        broken.title = None;

        let result = normalize_page(vec![movie(1), broken, movie(3)], Category::Movie);

        assert_eq!(result.unwrap_err().id, Some(2));
    }
}
