use crate::error::{FetchError, TransportError};
use crate::tmdb::api::{DiscoverRequest, RawRecord};
use async_trait::async_trait;
use futures::stream::BoxStream;
use media_history_models::{Category, Genre};
use std::time::Duration;

/// Status, throttling hint and body of one HTTP exchange
#[derive(Debug, Clone)]
pub struct HttpReply {
    pub status: u16,
    pub retry_after: Option<Duration>,
    pub body: String,
}

impl HttpReply {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Raw GET access to the metadata API.
///
/// `endpoint` is the path below the API base (e.g. `/discover/movie`).
/// Implementations only report what the server said; retry policy lives in the client.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn get(&self, endpoint: &str, query: &[(String, String)]) -> Result<HttpReply, TransportError>;
}

/// Where popular titles come from
#[async_trait]
pub trait CatalogSource: Send + Sync {
    fn source_name(&self) -> &str;

    /// Lazy, finite sequence of result pages for one category and window.
    ///
    /// Each call starts again from page 1. Pages may arrive out of order.
    fn discover(&self, request: DiscoverRequest) -> BoxStream<'_, Result<Vec<RawRecord>, FetchError>>;

    /// Genre vocabulary for a category (optional reference data)
    async fn genres(&self, _category: Category) -> Result<Vec<Genre>, FetchError> {
        Ok(Vec::new())
    }

    /// Names of the credited cast of one title, billing order
    async fn cast(&self, _category: Category, _id: u64) -> Result<Vec<String>, FetchError> {
        Ok(Vec::new())
    }
}
