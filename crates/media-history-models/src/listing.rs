use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Which popularity feed a run reads
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Listing {
    /// Most popular titles released inside the lookback window
    #[default]
    Discover,
    /// Trending over the last day, release date ignored
    TrendingDay,
    /// Trending over the last week, release date ignored
    TrendingWeek,
}

impl Listing {
    pub fn as_str(&self) -> &'static str {
        match self {
            Listing::Discover => "discover",
            Listing::TrendingDay => "trending_day",
            Listing::TrendingWeek => "trending_week",
        }
    }

    /// Whether the release window filters this feed
    pub fn uses_release_window(&self) -> bool {
        matches!(self, Listing::Discover)
    }
}

impl fmt::Display for Listing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseListingError(String);

impl fmt::Display for ParseListingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "unknown listing '{}' (expected 'discover', 'trending_day' or 'trending_week')",
            self.0
        )
    }
}

impl std::error::Error for ParseListingError {}

impl FromStr for Listing {
    type Err = ParseListingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "discover" => Ok(Listing::Discover),
            "trending_day" => Ok(Listing::TrendingDay),
            "trending" | "trending_week" => Ok(Listing::TrendingWeek),
            other => Err(ParseListingError(other.to_string())),
        }
    }
}

/// How often a performer appeared in the credits of the sampled titles
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CastCount {
    pub name: String,
    pub count: usize,
}
