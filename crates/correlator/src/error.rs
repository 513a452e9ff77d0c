//! Error types for correlation

use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CorrelationError {
    #[error("Ping store unreachable at {url}: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Ping store at {url} returned {status}: {body}")]
    Status {
        url: String,
        status: u16,
        body: String,
    },

    #[error("Ping store at {url} returned an undecodable ping list: {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("{what} was never observed ({attempts} polls over {waited:?})")]
    NotObserved {
        what: String,
        attempts: u32,
        waited: Duration,
    },
}

impl CorrelationError {
    /// True when the store could not be consulted at all, as opposed to the
    /// event being confirmed absent for the whole time budget.
    pub fn is_infrastructure(&self) -> bool {
        !matches!(self, CorrelationError::NotObserved { .. })
    }
}

pub type CorrelationResult<T> = Result<T, CorrelationError>;
