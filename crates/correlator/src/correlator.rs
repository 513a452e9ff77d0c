//! The poll loop
//!
//! `await_event` fetches the ping list, normalizes it, and looks for the first
//! record the predicate accepts. On a miss it fires the [`MissHandler`] (which
//! usually asks the browser to re-fetch its experiment recipes), sleeps, and
//! tries again until the deadline.

use async_trait::async_trait;
use klaatu_common::{CorrelatorConfig, Ping};
use serde::Serialize;
use std::future::Future;
use std::time::Duration;
use tokio::time::{sleep, timeout_at, Instant};
use tracing::{debug, info, warn};

use crate::client::{PingClient, PingSource};
use crate::error::{CorrelationError, CorrelationResult};
use crate::normalize::{normalize, EventRecord};
use crate::predicate::EventPredicate;

/// Stand-in deadline for timeouts that overflow `Instant`
const FAR_FUTURE: Duration = Duration::from_secs(30 * 365 * 24 * 60 * 60);

/// Side effect run after every unsuccessful poll.
///
/// Errors are logged and otherwise ignored; they never end the poll loop. A
/// handler still running at the deadline is abandoned.
#[async_trait]
pub trait MissHandler: Send + Sync {
    async fn on_miss(&self) -> anyhow::Result<()>;
}

#[async_trait]
impl<F, Fut> MissHandler for F
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    async fn on_miss(&self) -> anyhow::Result<()> {
        self().await
    }
}

/// A [`MissHandler`] that does nothing
#[derive(Debug, Clone, Copy, Default)]
pub struct NoReevaluate;

#[async_trait]
impl MissHandler for NoReevaluate {
    async fn on_miss(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

/// A matched record and where it came from
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchedEvent {
    /// Position of the source ping in the store at the time of the poll
    pub ping_index: usize,
    pub record: EventRecord,
}

/// Outcome of one correlation
#[derive(Debug, Clone, PartialEq)]
pub enum Correlation {
    Matched(MatchedEvent),
    /// The deadline passed without a match
    NotFound { attempts: u32, waited: Duration },
}

impl Correlation {
    pub fn is_match(&self) -> bool {
        matches!(self, Correlation::Matched(_))
    }

    pub fn matched(&self) -> Option<&MatchedEvent> {
        match self {
            Correlation::Matched(event) => Some(event),
            Correlation::NotFound { .. } => None,
        }
    }

    /// Turn a timeout into [`CorrelationError::NotObserved`] describing `what`
    pub fn into_match(self, what: impl Into<String>) -> CorrelationResult<MatchedEvent> {
        match self {
            Correlation::Matched(event) => Ok(event),
            Correlation::NotFound { attempts, waited } => Err(CorrelationError::NotObserved {
                what: what.into(),
                attempts,
                waited,
            }),
        }
    }
}

/// First record in `pings` accepted by `predicate`, scanning in arrival order
pub fn find_match<P>(pings: &[Ping], predicate: &P) -> Option<MatchedEvent>
where
    P: EventPredicate + ?Sized,
{
    pings.iter().enumerate().find_map(|(ping_index, ping)| {
        normalize(ping)
            .into_iter()
            .find(|record| predicate.matches(record))
            .map(|record| MatchedEvent { ping_index, record })
    })
}

/// Polls a [`PingSource`] for experiment events
#[derive(Debug, Clone)]
pub struct Correlator<S> {
    source: S,
    poll_interval: Duration,
}

impl Correlator<PingClient> {
    /// HTTP-backed correlator built from configuration
    pub fn from_config(config: &CorrelatorConfig) -> CorrelationResult<Self> {
        Ok(Self::new(PingClient::from_config(config)?, config.poll_interval()))
    }
}

impl<S: PingSource> Correlator<S> {
    pub fn new(source: S, poll_interval: Duration) -> Self {
        Self {
            source,
            poll_interval,
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Poll until `predicate` matches or `deadline` passes.
    ///
    /// A store failure ends the wait with an error straight away; a missed
    /// deadline is `Ok(Correlation::NotFound)`. Store fetches and `on_miss`
    /// are both cut off at the deadline.
    pub async fn await_event<P, M>(
        &self,
        predicate: &P,
        deadline: Instant,
        on_miss: &M,
    ) -> CorrelationResult<Correlation>
    where
        P: EventPredicate + ?Sized,
        M: MissHandler + ?Sized,
    {
        let started = Instant::now();
        let what = predicate.describe();
        let mut attempts: u32 = 0;

        info!(event = %what, "Waiting for telemetry event");

        while Instant::now() < deadline {
            attempts += 1;
            let pings = match timeout_at(deadline, self.source.fetch_pings()).await {
                Ok(fetched) => fetched?,
                Err(_) => {
                    warn!(attempt = attempts, "Ping store still fetching at deadline");
                    break;
                }
            };

            if let Some(matched) = find_match(&pings, predicate) {
                info!(
                    event = %what,
                    attempts,
                    ping_index = matched.ping_index,
                    "Telemetry event observed"
                );
                return Ok(Correlation::Matched(matched));
            }

            debug!(attempt = attempts, pings = pings.len(), "No matching event yet");

            match timeout_at(deadline, on_miss.on_miss()).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(attempt = attempts, "Re-evaluation trigger failed: {:#}", e),
                Err(_) => warn!(attempt = attempts, "Re-evaluation trigger still running at deadline"),
            }

            let now = Instant::now();
            if now >= deadline {
                break;
            }
            sleep(self.poll_interval.min(deadline - now)).await;
        }

        let waited = started.elapsed();
        info!(event = %what, attempts, ?waited, "Telemetry event not observed before deadline");
        Ok(Correlation::NotFound { attempts, waited })
    }

    /// [`Correlator::await_event`] with a deadline `timeout` from now.
    ///
    /// Timeouts too large to represent are capped at roughly thirty years.
    pub async fn await_event_within<P, M>(
        &self,
        predicate: &P,
        timeout: Duration,
        on_miss: &M,
    ) -> CorrelationResult<Correlation>
    where
        P: EventPredicate + ?Sized,
        M: MissHandler + ?Sized,
    {
        let now = Instant::now();
        let deadline = now.checked_add(timeout).unwrap_or_else(|| now + FAR_FUTURE);
        self.await_event(predicate, deadline, on_miss).await
    }
}
