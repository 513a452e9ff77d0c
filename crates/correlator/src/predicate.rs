//! Predicates over normalized event records

use serde_json::Value;
use std::fmt;
use std::str::FromStr;

use crate::normalize::{EventRecord, PingShape};

const ENROLLMENT_NAMES: &[&str] = &["enrollment", "enroll"];
const UNENROLLMENT_NAMES: &[&str] = &["unenrollment", "unenroll", "disqualification", "disqualify"];
const DISQUALIFICATION_NAMES: &[&str] = &["disqualification", "disqualify"];

/// Category that Glean-style lifecycle events must be filed under
const NIMBUS_EVENTS_CATEGORY: &str = "nimbus_events";

/// Decides whether one normalized record is the event being waited for.
///
/// Implemented for plain closures, so ad-hoc checks need no new type.
pub trait EventPredicate: Send + Sync {
    fn matches(&self, record: &EventRecord) -> bool;

    /// Human-readable description used in logs and timeout errors
    fn describe(&self) -> String {
        "event matching custom predicate".to_string()
    }
}

impl<F> EventPredicate for F
where
    F: Fn(&EventRecord) -> bool + Send + Sync,
{
    fn matches(&self, record: &EventRecord) -> bool {
        self(record)
    }
}

/// How a scalar's value must look for a match
#[derive(Debug, Clone, PartialEq)]
pub enum ValueMatch {
    /// The key is reported at all
    Present,
    /// The key is reported with exactly this value
    Equals(Value),
}

impl ValueMatch {
    fn check(&self, value: Option<&Value>) -> bool {
        match self {
            ValueMatch::Present => value.is_some(),
            ValueMatch::Equals(expected) => value == Some(expected),
        }
    }
}

/// What kind of record an [`EventMatcher`] looks for
#[derive(Debug, Clone, PartialEq)]
pub enum EventKind {
    /// Any record naming the experiment, including a plain experiments-map entry
    Any,
    Enrollment,
    /// Unenrollment, counting disqualification as a form of it
    Unenrollment,
    Disqualification,
    /// An event with this exact name (or legacy method)
    Named(String),
    /// A process scalar; `key` selects inside a keyed scalar
    Scalar {
        probe: String,
        key: Option<String>,
        expect: ValueMatch,
    },
}

impl FromStr for EventKind {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "any" => EventKind::Any,
            "enrollment" | "enroll" => EventKind::Enrollment,
            "unenrollment" | "unenroll" => EventKind::Unenrollment,
            "disqualification" | "disqualify" => EventKind::Disqualification,
            other => EventKind::Named(other.to_string()),
        })
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventKind::Any => write!(f, "any event"),
            EventKind::Enrollment => write!(f, "enrollment"),
            EventKind::Unenrollment => write!(f, "unenrollment"),
            EventKind::Disqualification => write!(f, "disqualification"),
            EventKind::Named(name) => write!(f, "event '{}'", name),
            EventKind::Scalar { probe, key: Some(key), expect } => {
                write!(f, "scalar {}[{}]", probe, key)?;
                expect_suffix(f, expect)
            }
            EventKind::Scalar { probe, key: None, expect } => {
                write!(f, "scalar {}", probe)?;
                expect_suffix(f, expect)
            }
        }
    }
}

fn expect_suffix(f: &mut fmt::Formatter<'_>, expect: &ValueMatch) -> fmt::Result {
    match expect {
        ValueMatch::Present => Ok(()),
        ValueMatch::Equals(value) => write!(f, " == {}", value),
    }
}

/// Declarative predicate: experiment, optional branch, and an event kind.
///
/// ```
/// use klaatu_correlator::{EventKind, EventMatcher};
///
/// let matcher = EventMatcher::experiment("my-experiment")
///     .branch("treatment")
///     .kind(EventKind::Enrollment);
/// assert_eq!(matcher.describe_target(), "enrollment for my-experiment (branch treatment)");
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct EventMatcher {
    experiment: Option<String>,
    branch: Option<String>,
    kind: EventKind,
}

impl EventMatcher {
    /// Match any record for `experiment`
    pub fn experiment(experiment: impl Into<String>) -> Self {
        Self {
            experiment: Some(experiment.into()),
            branch: None,
            kind: EventKind::Any,
        }
    }

    /// Match a process scalar, regardless of experiment
    pub fn scalar(probe: impl Into<String>, key: Option<String>, expect: ValueMatch) -> Self {
        Self {
            experiment: None,
            branch: None,
            kind: EventKind::Scalar {
                probe: probe.into(),
                key,
                expect,
            },
        }
    }

    pub fn branch(mut self, branch: impl Into<String>) -> Self {
        self.branch = Some(branch.into());
        self
    }

    pub fn kind(mut self, kind: EventKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn enrollment(self) -> Self {
        self.kind(EventKind::Enrollment)
    }

    pub fn unenrollment(self) -> Self {
        self.kind(EventKind::Unenrollment)
    }

    pub fn disqualification(self) -> Self {
        self.kind(EventKind::Disqualification)
    }

    pub fn named(self, name: impl Into<String>) -> Self {
        self.kind(EventKind::Named(name.into()))
    }

    pub fn describe_target(&self) -> String {
        let mut out = self.kind.to_string();
        if let Some(experiment) = &self.experiment {
            out.push_str(&format!(" for {}", experiment));
        }
        if let Some(branch) = &self.branch {
            out.push_str(&format!(" (branch {})", branch));
        }
        out
    }

    fn matches_kind(&self, record: &EventRecord) -> bool {
        match &self.kind {
            EventKind::Any => true,
            EventKind::Enrollment => is_lifecycle(record, ENROLLMENT_NAMES),
            EventKind::Unenrollment => is_lifecycle(record, UNENROLLMENT_NAMES),
            EventKind::Disqualification => is_lifecycle(record, DISQUALIFICATION_NAMES),
            EventKind::Named(name) => record.name.as_deref() == Some(name.as_str()),
            EventKind::Scalar { probe, key, expect } => {
                if record.shape != PingShape::ProcessScalars {
                    return false;
                }
                let located = match key {
                    Some(key) => {
                        record.category.as_deref() == Some(probe.as_str())
                            && record.name.as_deref() == Some(key.as_str())
                    }
                    None => record.category.is_none() && record.name.as_deref() == Some(probe.as_str()),
                };
                located && expect.check(record.value.as_ref())
            }
        }
    }
}

impl EventPredicate for EventMatcher {
    fn matches(&self, record: &EventRecord) -> bool {
        if let Some(experiment) = &self.experiment {
            if record.experiment.as_deref() != Some(experiment.as_str()) {
                return false;
            }
        }
        if let Some(branch) = &self.branch {
            if record.branch.as_deref() != Some(branch.as_str()) {
                return false;
            }
        }
        self.matches_kind(record)
    }

    fn describe(&self) -> String {
        self.describe_target()
    }
}

fn is_lifecycle(record: &EventRecord, names: &[&str]) -> bool {
    let Some(name) = record.name.as_deref() else {
        return false;
    };
    if !names.contains(&name) {
        return false;
    }

    match record.shape {
        PingShape::StructuredEvents => {
            record
                .category
                .as_deref()
                .is_some_and(|c| c.contains(NIMBUS_EVENTS_CATEGORY))
                && record.branch.is_some()
        }
        PingShape::LegacyEvents => true,
        PingShape::ExperimentsMap | PingShape::ProcessScalars => false,
    }
}
