pub mod aggregate;
pub mod genre;
pub mod listing;
pub mod media;

pub use aggregate::{AggregateRow, AggregateTable, Aggregates, PopularityBucket};
pub use genre::Genre;
pub use listing::{CastCount, Listing, ParseListingError};
pub use media::{Category, MediaRecord, NormalizedRecord, ParseCategoryError, RecordKey};
