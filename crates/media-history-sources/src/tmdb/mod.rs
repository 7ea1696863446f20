pub mod api;
pub mod client;
pub mod transport;

pub use api::{DiscoverPage, DiscoverRequest, RawRecord};
pub use client::{FetchOptions, TmdbClient};
pub use transport::ReqwestTransport;
