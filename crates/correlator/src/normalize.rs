//! Ping normalization
//!
//! Clients have reported experiment activity in several incompatible layouts
//! over the years. Each layout is a [`PingShape`]; a ping is probed for every
//! shape and each one present contributes [`EventRecord`]s. Anything that does
//! not look like a known shape contributes nothing.
//!
//! ```text
//! ExperimentsMap    environment.experiments.{id}.branch
//! LegacyEvents      payload.events.parent[]  |  payload.processes.parent.events[]
//!                   [timestamp, category, method, object, value?, extra?] or flat objects
//! StructuredEvents  events[].{category, name, extra.{branch, experiment}}
//! ProcessScalars    payload.processes.parent.scalars.{probe}
//!                   payload.processes.parent.keyedScalars.{probe}.{key}
//! ```

use klaatu_common::Ping;
use serde::Serialize;
use serde_json::{Map, Value};

const LEGACY_EVENT_PATHS: [&[&str]; 2] = [
    &["payload", "events", "parent"],
    &["payload", "processes", "parent", "events"],
];

/// A known encoding of experiment activity inside a ping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PingShape {
    ExperimentsMap,
    LegacyEvents,
    StructuredEvents,
    ProcessScalars,
}

impl PingShape {
    pub const ALL: [PingShape; 4] = [
        PingShape::ExperimentsMap,
        PingShape::LegacyEvents,
        PingShape::StructuredEvents,
        PingShape::ProcessScalars,
    ];

    /// Whether `ping` carries this shape's container (possibly empty)
    pub fn probe(self, ping: &Ping) -> bool {
        match self {
            PingShape::ExperimentsMap => object_at(ping, &["environment", "experiments"]).is_some(),
            PingShape::LegacyEvents => LEGACY_EVENT_PATHS
                .iter()
                .any(|path| array_at(ping, path).is_some()),
            PingShape::StructuredEvents => array_at(ping, &["events"]).is_some(),
            PingShape::ProcessScalars => {
                object_at(ping, &["payload", "processes", "parent", "scalars"]).is_some()
                    || object_at(ping, &["payload", "processes", "parent", "keyedScalars"]).is_some()
            }
        }
    }

    /// Append this shape's records from `ping` to `out`
    pub fn extract(self, ping: &Ping, out: &mut Vec<EventRecord>) {
        match self {
            PingShape::ExperimentsMap => extract_experiments_map(ping, out),
            PingShape::LegacyEvents => {
                for path in LEGACY_EVENT_PATHS {
                    for item in array_at(ping, path).into_iter().flatten() {
                        out.extend(legacy_event(item));
                    }
                }
            }
            PingShape::StructuredEvents => {
                for item in array_at(ping, &["events"]).into_iter().flatten() {
                    out.extend(structured_event(item));
                }
            }
            PingShape::ProcessScalars => extract_scalars(ping, out),
        }
    }
}

/// Shapes present in a ping, in [`PingShape::ALL`] order
pub fn detect_shapes(ping: &Ping) -> Vec<PingShape> {
    PingShape::ALL
        .into_iter()
        .filter(|shape| shape.probe(ping))
        .collect()
}

/// One experiment-related observation, in a shape-independent form.
///
/// Fields a shape does not carry are `None` (or an empty `extra`).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventRecord {
    pub shape: PingShape,
    pub category: Option<String>,
    pub name: Option<String>,
    pub object: Option<String>,
    pub experiment: Option<String>,
    pub branch: Option<String>,
    pub value: Option<Value>,
    pub extra: Map<String, Value>,
}

impl EventRecord {
    fn new(shape: PingShape) -> Self {
        Self {
            shape,
            category: None,
            name: None,
            object: None,
            experiment: None,
            branch: None,
            value: None,
            extra: Map::new(),
        }
    }

    /// String-valued entry of `extra`
    pub fn extra_str(&self, key: &str) -> Option<&str> {
        self.extra.get(key).and_then(Value::as_str)
    }
}

/// Every record in `ping`, across all shapes it carries
pub fn normalize(ping: &Ping) -> Vec<EventRecord> {
    let mut records = Vec::new();
    for shape in PingShape::ALL {
        if shape.probe(ping) {
            shape.extract(ping, &mut records);
        }
    }
    records
}

fn object_at<'a>(ping: &'a Ping, path: &[&str]) -> Option<&'a Map<String, Value>> {
    ping.get_path(path)?.as_object()
}

fn array_at<'a>(ping: &'a Ping, path: &[&str]) -> Option<&'a Vec<Value>> {
    ping.get_path(path)?.as_array()
}

fn string_field(value: Option<&Value>) -> Option<String> {
    value.and_then(Value::as_str).map(str::to_string)
}

fn extract_experiments_map(ping: &Ping, out: &mut Vec<EventRecord>) {
    let Some(experiments) = object_at(ping, &["environment", "experiments"]) else {
        return;
    };

    for (id, details) in experiments {
        let mut record = EventRecord::new(PingShape::ExperimentsMap);
        record.experiment = Some(id.clone());
        if let Some(details) = details.as_object() {
            record.branch = string_field(details.get("branch"));
            record.extra = details.clone();
        }
        out.push(record);
    }
}

/// `[timestamp, category, method, object, value?, extra?]`, or the same
/// fields as an object.
fn legacy_event(item: &Value) -> Option<EventRecord> {
    let mut record = EventRecord::new(PingShape::LegacyEvents);

    match item {
        Value::Array(fields) => {
            record.category = string_field(fields.get(1));
            record.name = string_field(fields.get(2));
            record.object = string_field(fields.get(3));
            record.value = fields.get(4).filter(|v| !v.is_null()).cloned();
            if let Some(extra) = fields.get(5).and_then(Value::as_object) {
                record.extra = extra.clone();
            }
        }
        Value::Object(fields) => {
            record.category = string_field(fields.get("category"));
            record.name = string_field(fields.get("method").or_else(|| fields.get("name")));
            record.object = string_field(fields.get("object"));
            record.value = fields.get("value").filter(|v| !v.is_null()).cloned();
            if let Some(extra) = fields.get("extra").and_then(Value::as_object) {
                record.extra = extra.clone();
            }
        }
        _ => return None,
    }

    if record.category.is_none() && record.name.is_none() {
        return None;
    }

    record.branch = record.extra_str("branch").map(str::to_string);
    // Normandy lifecycle events carry the slug as the event value
    record.experiment = record
        .extra_str("experiment")
        .map(str::to_string)
        .or_else(|| {
            let lifecycle = matches!(record.category.as_deref(), Some("normandy"))
                || record.category.as_deref().is_some_and(|c| c.contains("nimbus"));
            if lifecycle {
                record.value.as_ref().and_then(Value::as_str).map(str::to_string)
            } else {
                None
            }
        });

    Some(record)
}

fn structured_event(item: &Value) -> Option<EventRecord> {
    let fields = item.as_object()?;
    let mut record = EventRecord::new(PingShape::StructuredEvents);

    record.category = string_field(fields.get("category"));
    record.name = string_field(fields.get("name"));
    if record.category.is_none() && record.name.is_none() {
        return None;
    }

    if let Some(extra) = fields.get("extra").and_then(Value::as_object) {
        record.extra = extra.clone();
    }
    record.branch = record.extra_str("branch").map(str::to_string);
    record.experiment = record.extra_str("experiment").map(str::to_string);

    Some(record)
}

fn extract_scalars(ping: &Ping, out: &mut Vec<EventRecord>) {
    if let Some(scalars) = object_at(ping, &["payload", "processes", "parent", "scalars"]) {
        for (probe, value) in scalars {
            let mut record = EventRecord::new(PingShape::ProcessScalars);
            record.name = Some(probe.clone());
            record.value = Some(value.clone());
            out.push(record);
        }
    }

    if let Some(keyed) = object_at(ping, &["payload", "processes", "parent", "keyedScalars"]) {
        for (probe, entries) in keyed {
            for (key, value) in entries.as_object().into_iter().flatten() {
                let mut record = EventRecord::new(PingShape::ProcessScalars);
                record.category = Some(probe.clone());
                record.name = Some(key.clone());
                record.value = Some(value.clone());
                out.push(record);
            }
        }
    }
}
