//! Wait for an experiment event to show up in the ping store

use clap::Args;
use std::process::ExitCode;
use std::time::Duration;
use tracing::debug;

use klaatu_common::CorrelatorConfig;
use klaatu_correlator::{
    Correlation, Correlator, EventKind, EventMatcher, NoReevaluate, PingClient,
    ValueMatch,
};

use crate::output::{print_error, print_item, print_success, print_warning, OutputFormat, TableDisplay};

/// Exit status when the deadline passed without a match
pub const EXIT_NOT_OBSERVED: u8 = 1;

/// Exit status when the store could not be consulted
pub const EXIT_STORE_FAILURE: u8 = 2;

/// Exit status for arguments that do not describe a target (EX_USAGE)
pub const EXIT_USAGE: u8 = 64;

#[derive(Args, Debug)]
pub struct WaitArgs {
    /// Experiment slug
    #[arg(short, long, required_unless_present = "scalar")]
    experiment: Option<String>,

    /// Branch the client must report
    #[arg(short, long)]
    branch: Option<String>,

    /// Event to wait for: any, enrollment, unenrollment, disqualification, or an event name
    #[arg(long, default_value = "any")]
    event: String,

    /// Wait for a process scalar instead of an experiment event
    #[arg(long, conflicts_with_all = ["event", "experiment", "branch"])]
    scalar: Option<String>,

    /// Key inside a keyed scalar
    #[arg(long, requires = "scalar")]
    key: Option<String>,

    /// Required scalar value as JSON (omit to accept any value)
    #[arg(long, requires = "scalar", value_parser = parse_json)]
    equals: Option<serde_json::Value>,

    /// Give up after this many seconds [default: from config, 300]
    #[arg(long)]
    deadline: Option<u64>,

    /// Seconds between polls [default: from config, 5]
    #[arg(long)]
    interval: Option<u64>,
}

fn parse_json(raw: &str) -> Result<serde_json::Value, String> {
    serde_json::from_str(raw).map_err(|e| format!("not JSON (quote strings): {}", e))
}

impl WaitArgs {
    fn matcher(&self) -> anyhow::Result<EventMatcher> {
        if let Some(probe) = &self.scalar {
            let expect = match &self.equals {
                Some(value) => ValueMatch::Equals(value.clone()),
                None => ValueMatch::Present,
            };
            return Ok(EventMatcher::scalar(probe.clone(), self.key.clone(), expect));
        }

        let experiment = self
            .experiment
            .clone()
            .ok_or_else(|| anyhow::anyhow!("--experiment is required"))?;
        let kind: EventKind = match self.event.parse() {
            Ok(kind) => kind,
            Err(never) => match never {},
        };

        let matcher = EventMatcher::experiment(experiment).kind(kind);
        Ok(match &self.branch {
            Some(branch) => matcher.branch(branch.clone()),
            None => matcher,
        })
    }
}

impl TableDisplay for klaatu_correlator::MatchedEvent {
    fn headers() -> Vec<&'static str> {
        vec!["Ping", "Shape", "Category", "Name", "Experiment", "Branch"]
    }

    fn row(&self) -> Vec<String> {
        let dash = |v: &Option<String>| v.clone().unwrap_or_else(|| "-".to_string());
        vec![
            self.ping_index.to_string(),
            format!("{:?}", self.record.shape),
            dash(&self.record.category),
            dash(&self.record.name),
            dash(&self.record.experiment),
            dash(&self.record.branch),
        ]
    }
}

pub async fn execute(
    args: WaitArgs,
    client: PingClient,
    config: &CorrelatorConfig,
    format: OutputFormat,
) -> ExitCode {
    let matcher = match args.matcher() {
        Ok(matcher) => matcher,
        Err(e) => {
            print_error(&e.to_string());
            return ExitCode::from(EXIT_USAGE);
        }
    };

    let deadline = args.deadline.unwrap_or(config.deadline_secs);
    let interval = args.interval.unwrap_or(config.poll_interval_secs).max(1);
    debug!(?matcher, deadline, interval, "Starting wait");

    let correlator = Correlator::new(client, Duration::from_secs(interval));
    let outcome = correlator
        .await_event_within(&matcher, Duration::from_secs(deadline), &NoReevaluate)
        .await;

    match outcome {
        Ok(Correlation::Matched(event)) => {
            print_success(&format!("Observed {}", matcher.describe_target()));
            print_item(&event, format);
            ExitCode::SUCCESS
        }
        Ok(not_found @ Correlation::NotFound { .. }) => {
            if let Err(e) = not_found.into_match(matcher.describe_target()) {
                print_warning(&e.to_string());
            }
            ExitCode::from(EXIT_NOT_OBSERVED)
        }
        Err(e) => {
            print_error(&format!("Could not consult the ping store: {}", e));
            ExitCode::from(EXIT_STORE_FAILURE)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use klaatu_correlator::EventPredicate;

    #[derive(Parser)]
    struct Harness {
        #[command(flatten)]
        args: WaitArgs,
    }

    fn parse(argv: &[&str]) -> WaitArgs {
        let mut full = vec!["wait"];
        full.extend_from_slice(argv);
        Harness::try_parse_from(full).unwrap().args
    }

    #[test]
    fn test_enrollment_matcher() {
        let args = parse(&["--experiment", "exp1", "--branch", "treatment", "--event", "enrollment"]);
        assert_eq!(
            args.matcher().unwrap().describe(),
            "enrollment for exp1 (branch treatment)"
        );
        assert_eq!(args.deadline, None);
    }

    #[test]
    fn test_scalar_matcher() {
        let args = parse(&["--scalar", "browser.search.content.urlbar", "--key", "google:tagged", "--equals", "1"]);
        assert_eq!(
            args.matcher().unwrap().describe(),
            "scalar browser.search.content.urlbar[google:tagged] == 1"
        );
    }

    #[test]
    fn test_equals_must_be_json() {
        let err = Harness::try_parse_from(["wait", "--scalar", "probe", "--equals", "not json"])
            .err()
            .unwrap();
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);

        let args = parse(&["--scalar", "probe", "--equals", "\"on\""]);
        assert_eq!(args.matcher().unwrap().describe(), "scalar probe == \"on\"");
    }

    #[test]
    fn test_scalar_conflicts_with_experiment() {
        let result = Harness::try_parse_from(["wait", "--scalar", "probe", "--experiment", "exp1"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_experiment_or_scalar_required() {
        let result = Harness::try_parse_from(["wait", "--event", "enrollment"]);
        assert!(result.is_err());
    }
}
