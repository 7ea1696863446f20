use media_history_models::Category;
use thiserror::Error;

fn describe_page(page: &Option<u32>) -> String {
    match page {
        Some(page) => format!(" (page {})", page),
        None => String::new(),
    }
}

fn describe_id(id: &Option<u64>) -> String {
    match id {
        Some(id) => format!(" (id {})", id),
        None => String::new(),
    }
}

/// Failure to retrieve data for one category
#[derive(Debug, Error)]
pub enum FetchError {
    /// Non-retriable client error (4xx other than 429)
    #[error("request to {endpoint}{} failed with status {status}", describe_page(.page))]
    Request {
        status: u16,
        endpoint: String,
        page: Option<u32>,
    },

    #[error("rate limit still exceeded for {endpoint}{} after {retries} retries", describe_page(.page))]
    RateLimitExceeded {
        endpoint: String,
        page: Option<u32>,
        retries: u32,
    },

    /// Server or network errors that outlasted the backoff budget
    #[error("{endpoint}{} failed after {attempts} attempts: {last_error}", describe_page(.page))]
    RetriesExhausted {
        endpoint: String,
        page: Option<u32>,
        attempts: u32,
        last_error: String,
    },

    #[error("malformed response from {endpoint}{}: {reason}", describe_page(.page))]
    MalformedResponse {
        endpoint: String,
        page: Option<u32>,
        reason: String,
    },
}

impl FetchError {
    /// Short machine-friendly label for structured logs and reports
    pub fn kind(&self) -> &'static str {
        match self {
            FetchError::Request { .. } => "request_error",
            FetchError::RateLimitExceeded { .. } => "rate_limit_exceeded",
            FetchError::RetriesExhausted { .. } => "retries_exhausted",
            FetchError::MalformedResponse { .. } => "malformed_response",
        }
    }
}

/// A required field is missing from upstream data
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{category} record{} is missing required field '{field}'", describe_id(.id))]
pub struct SchemaError {
    pub category: Category,
    pub field: &'static str,
    pub id: Option<u64>,
}

#[derive(Debug, Clone, Error)]
#[error("network error: {0}")]
pub struct TransportError(pub String);
