use crate::error::{FetchError, TransportError};
use crate::rate_limit::{RateLimiter, RetryPolicy};
use crate::tmdb::api::{
    self, CreditsResponse, DiscoverPage, DiscoverRequest, GenreListResponse, RawRecord, MAX_API_PAGES,
};
use crate::tmdb::transport::ReqwestTransport;
use crate::traits::{CatalogSource, Transport};
use async_trait::async_trait;
use futures::future;
use futures::stream::{self, BoxStream, StreamExt};
use media_history_config::ApiConfig;
use media_history_models::{Category, Genre};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Largest worker pool allowed for page fetches
const MAX_CONCURRENCY: usize = 8;

#[derive(Debug, Clone)]
pub struct FetchOptions {
    pub concurrency: usize,
    pub max_pages: u32,
    pub requests_per_second: f64,
    pub retry: RetryPolicy,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            concurrency: 4,
            max_pages: 5,
            requests_per_second: 4.0,
            retry: RetryPolicy::default(),
        }
    }
}

impl FetchOptions {
    pub fn from_config(config: &ApiConfig) -> Self {
        Self {
            concurrency: config.concurrency,
            max_pages: config.max_pages,
            requests_per_second: config.requests_per_second,
            retry: RetryPolicy {
                max_attempts: config.max_attempts,
                backoff_base: Duration::from_millis(config.backoff_base_ms),
                backoff_cap: Duration::from_millis(config.backoff_cap_ms),
                rate_limit_backoff: Duration::from_millis(config.rate_limit_backoff_ms),
                max_rate_limit_retries: config.max_rate_limit_retries,
                ..RetryPolicy::default()
            },
        }
    }

    fn effective_concurrency(&self) -> usize {
        self.concurrency.clamp(1, MAX_CONCURRENCY)
    }

    fn effective_max_pages(&self) -> u32 {
        self.max_pages.clamp(1, MAX_API_PAGES)
    }
}

/// Discover client for the TMDB v3 API
pub struct TmdbClient<T = ReqwestTransport> {
    transport: T,
    options: FetchOptions,
    limiter: RateLimiter,
}

impl TmdbClient<ReqwestTransport> {
    pub fn from_config(config: &ApiConfig, token: String) -> Result<Self, TransportError> {
        let transport = ReqwestTransport::new(
            &config.base_url,
            token,
            Duration::from_secs(config.timeout_secs),
        )?;
        Ok(Self::with_transport(transport, FetchOptions::from_config(config)))
    }
}

impl<T: Transport> TmdbClient<T> {
    pub fn with_transport(transport: T, options: FetchOptions) -> Self {
        let limiter = RateLimiter::new(options.requests_per_second);
        Self {
            transport,
            options,
            limiter,
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// GET with rate limiting and the retry budget applied; returns the body of a 2xx reply
    async fn get_with_retry(
        &self,
        endpoint: &str,
        query: &[(String, String)],
        page: Option<u32>,
    ) -> Result<String, FetchError> {
        let retry = &self.options.retry;
        let max_attempts = retry.max_attempts.max(1);
        let mut failures = 0u32;
        let mut rate_limited = 0u32;

        loop {
            self.limiter.acquire().await;

            let last_error = match self.transport.get(endpoint, query).await {
                Ok(reply) if reply.is_success() => return Ok(reply.body),
                Ok(reply) if reply.status == 429 => {
                    if rate_limited >= retry.max_rate_limit_retries {
                        return Err(FetchError::RateLimitExceeded {
                            endpoint: endpoint.to_string(),
                            page,
                            retries: rate_limited,
                        });
                    }
                    rate_limited += 1;
                    let wait = retry.rate_limit_delay(reply.retry_after);
                    warn!(
                        endpoint,
                        ?page,
                        retry = rate_limited,
                        wait_ms = wait.as_millis() as u64,
                        "Rate limited, suspending requests"
                    );
                    self.limiter.hold_off(wait).await;
                    continue;
                }
                Ok(reply) if reply.status >= 500 => format!("status {}", reply.status),
                Ok(reply) => {
                    let snippet: String = reply.body.chars().take(300).collect();
                    warn!(
                        endpoint,
                        ?page,
                        status = reply.status,
                        body = %snippet,
                        "Request rejected"
                    );
                    return Err(FetchError::Request {
                        status: reply.status,
                        endpoint: endpoint.to_string(),
                        page,
                    });
                }
                Err(e) => e.to_string(),
            };

            failures += 1;
            if failures >= max_attempts {
                return Err(FetchError::RetriesExhausted {
                    endpoint: endpoint.to_string(),
                    page,
                    attempts: failures,
                    last_error,
                });
            }

            let delay = retry.backoff_delay(failures);
            warn!(
                endpoint,
                ?page,
                attempt = failures,
                max_attempts,
                delay_ms = delay.as_millis() as u64,
                error = %last_error,
                "Transient failure, backing off"
            );
            tokio::time::sleep(delay).await;
        }
    }

    async fn get_json<R: DeserializeOwned>(
        &self,
        endpoint: &str,
        query: &[(String, String)],
        page: Option<u32>,
    ) -> Result<R, FetchError> {
        let body = self.get_with_retry(endpoint, query, page).await?;
        serde_json::from_str(&body).map_err(|e| FetchError::MalformedResponse {
            endpoint: endpoint.to_string(),
            page,
            reason: e.to_string(),
        })
    }

    pub async fn fetch_page(&self, request: &DiscoverRequest, page: u32) -> Result<DiscoverPage, FetchError> {
        let endpoint = request.endpoint();
        let result: DiscoverPage = self.get_json(&endpoint, &request.query(page), Some(page)).await?;
        debug!(
            category = %request.category,
            page,
            total_pages = result.total_pages,
            results = result.results.len(),
            "Fetched page"
        );
        Ok(result)
    }

    /// Page 1 first (it declares the page count), then the rest with bounded concurrency
    pub fn pages(&self, request: DiscoverRequest) -> BoxStream<'_, Result<DiscoverPage, FetchError>> {
        let concurrency = self.options.effective_concurrency();
        let max_pages = self.options.effective_max_pages();
        let first_request = request.clone();

        stream::once(async move { self.fetch_page(&first_request, 1).await })
            .flat_map(move |first| match first {
                Ok(first_page) => {
                    let last = first_page.total_pages.min(max_pages);
                    info!(
                        category = %request.category,
                        listing = %request.listing,
                        total_pages = first_page.total_pages,
                        fetching = last.max(1),
                        "Listing opened"
                    );
                    let request = request.clone();
                    let rest = stream::iter(2..=last)
                        .map(move |page| {
                            let request = request.clone();
                            async move { self.fetch_page(&request, page).await }
                        })
                        .buffer_unordered(concurrency);
                    stream::once(future::ready(Ok(first_page))).chain(rest).boxed()
                }
                Err(e) => stream::once(future::ready(Err(e))).boxed(),
            })
            .boxed()
    }

    pub async fn genre_list(&self, category: Category) -> Result<Vec<Genre>, FetchError> {
        let endpoint = api::genre_list_endpoint(category);
        let response: GenreListResponse = self.get_json(&endpoint, &[], None).await?;
        Ok(response.genres)
    }

    pub async fn credits(&self, category: Category, id: u64) -> Result<Vec<String>, FetchError> {
        let endpoint = api::credits_endpoint(category, id);
        let response: CreditsResponse = self.get_json(&endpoint, &[], None).await?;
        let names: Vec<String> = response
            .cast
            .into_iter()
            .filter_map(|entry| entry.name)
            .filter(|name| !name.trim().is_empty())
            .collect();
        debug!(category = %category, id, cast = names.len(), "Fetched credits");
        Ok(names)
    }
}

#[async_trait]
impl<T: Transport> CatalogSource for TmdbClient<T> {
    fn source_name(&self) -> &str {
        "tmdb"
    }

    fn discover(&self, request: DiscoverRequest) -> BoxStream<'_, Result<Vec<RawRecord>, FetchError>> {
        self.pages(request)
            .map(|page| page.map(|p| p.results))
            .boxed()
    }

    async fn genres(&self, category: Category) -> Result<Vec<Genre>, FetchError> {
        self.genre_list(category).await
    }

    async fn cast(&self, category: Category, id: u64) -> Result<Vec<String>, FetchError> {
        self.credits(category, id).await
    }
}
