pub mod error;
pub mod normalize;
pub mod rate_limit;
pub mod tmdb;
pub mod traits;

pub use error::{FetchError, SchemaError, TransportError};
pub use normalize::{normalize, normalize_page};
pub use rate_limit::{RateLimiter, RetryPolicy};
pub use tmdb::{DiscoverPage, DiscoverRequest, FetchOptions, RawRecord, ReqwestTransport, TmdbClient};
pub use traits::{CatalogSource, HttpReply, Transport};
