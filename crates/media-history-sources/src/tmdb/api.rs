use chrono::NaiveDate;
use media_history_models::{Category, Genre, Listing};
use serde::Deserialize;

/// The discover endpoint refuses page numbers above this
pub const MAX_API_PAGES: u32 = 500;

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Popular titles of one category.
///
/// The discover listing is limited to titles released inside the window;
/// the trending listings ignore it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoverRequest {
    pub category: Category,
    pub window_start: NaiveDate,
    pub window_end: NaiveDate,
    pub listing: Listing,
}

impl DiscoverRequest {
    pub fn new(category: Category, window_start: NaiveDate, window_end: NaiveDate) -> Self {
        Self {
            category,
            window_start,
            window_end,
            listing: Listing::Discover,
        }
    }

    pub fn with_listing(mut self, listing: Listing) -> Self {
        self.listing = listing;
        self
    }

    pub fn endpoint(&self) -> String {
        match self.listing {
            Listing::Discover => format!("/discover/{}", self.category.as_str()),
            Listing::TrendingDay => format!("/trending/{}/day", self.category.as_str()),
            Listing::TrendingWeek => format!("/trending/{}/week", self.category.as_str()),
        }
    }

    /// Query parameters for `page`; discover results are sorted by popularity descending
    pub fn query(&self, page: u32) -> Vec<(String, String)> {
        if !self.listing.uses_release_window() {
            return vec![("page".to_string(), page.to_string())];
        }

        let start = self.window_start.format(DATE_FORMAT).to_string();
        let end = self.window_end.format(DATE_FORMAT).to_string();

        let mut query = vec![("sort_by".to_string(), "popularity.desc".to_string())];
        match self.category {
            Category::Movie => {
                query.push(("primary_release_date.gte".to_string(), start));
                query.push(("primary_release_date.lte".to_string(), end));
                query.push(("include_adult".to_string(), "false".to_string()));
            }
            Category::Tv => {
                query.push(("first_air_date.gte".to_string(), start));
                query.push(("first_air_date.lte".to_string(), end));
            }
        }
        query.push(("page".to_string(), page.to_string()));
        query
    }
}

pub fn genre_list_endpoint(category: Category) -> String {
    format!("/genre/{}/list", category.as_str())
}

pub fn credits_endpoint(category: Category, id: u64) -> String {
    format!("/{}/{}/credits", category.as_str(), id)
}

/// One entry of a discover result page, as sent by the API.
///
/// Movies carry `title`/`release_date`, shows carry `name`/`first_air_date`.
/// Everything is optional here; the normalizer decides what is required.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct RawRecord {
    #[serde(default)]
    pub id: Option<u64>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub release_date: Option<String>,
    #[serde(default)]
    pub first_air_date: Option<String>,
    #[serde(default)]
    pub original_language: Option<String>,
    #[serde(default)]
    pub genre_ids: Option<Vec<u32>>,
    #[serde(default)]
    pub popularity: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DiscoverPage {
    #[serde(default = "first_page")]
    pub page: u32,
    #[serde(default = "first_page")]
    pub total_pages: u32,
    #[serde(default)]
    pub results: Vec<RawRecord>,
}

fn first_page() -> u32 {
    1
}

#[derive(Debug, Deserialize)]
pub(crate) struct GenreListResponse {
    #[serde(default)]
    pub genres: Vec<Genre>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct CreditsResponse {
    #[serde(default)]
    pub cast: Vec<CastEntry>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct CastEntry {
    #[serde(default)]
    pub name: Option<String>,
}
