//! Pairing of ENTER/LEAVE events into closed execution ranges.
//!
//! Trace producers interleave records from many locations, so boundary
//! events are buffered in a per-location min-heap keyed by timestamp and
//! drained in temporal order once the stream ends. Within one location the
//! pairing itself is a single-slot state machine: exactly one ENTER must
//! precede its LEAVE, with no second ENTER intervening (nested or
//! overlapping intervals are unsupported).

use crate::parser::event::{Event, EventKind};
use crate::utils::error::ConvertError;
use serde_json::{json, Map, Number, Value};
use std::cmp::{Ordering, Reverse};
use std::collections::{BTreeMap, BinaryHeap};

/// One closed execution interval on a single location.
#[derive(Debug, Clone, PartialEq)]
pub struct Range {
    pub location: u64,
    /// Attributes shared (and required identical) by the ENTER/LEAVE pair.
    pub attributes: BTreeMap<String, String>,
    pub enter_timestamp: u64,
    pub enter_region: String,
    pub leave_timestamp: u64,
    pub leave_region: String,
}

impl Range {
    pub fn to_json(&self) -> Value {
        let mut map = Map::new();
        map.insert("Location".into(), Value::Number(Number::from(self.location)));
        for (key, value) in &self.attributes {
            map.insert(key.clone(), Value::String(value.clone()));
        }
        map.insert(
            "enter".into(),
            json!({ "Timestamp": self.enter_timestamp, "Region": self.enter_region }),
        );
        map.insert(
            "leave".into(),
            json!({ "Timestamp": self.leave_timestamp, "Region": self.leave_region }),
        );
        Value::Object(map)
    }
}

/// Heap entry ordered by (timestamp, arrival sequence).
///
/// The sequence number keeps the drain stable when two boundary events on
/// one location share a timestamp.
#[derive(Debug, Clone)]
struct PendingEvent {
    timestamp: u64,
    seq: u64,
    event: Event,
}

impl PartialEq for PendingEvent {
    fn eq(&self, other: &Self) -> bool {
        self.timestamp == other.timestamp && self.seq == other.seq
    }
}

impl Eq for PendingEvent {}

impl PartialOrd for PendingEvent {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PendingEvent {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.timestamp, self.seq).cmp(&(other.timestamp, other.seq))
    }
}

/// Buffers interval-boundary events and pairs them into [`Range`]s.
#[derive(Debug, Default)]
pub struct RangeAssembler {
    locations: BTreeMap<u64, BinaryHeap<Reverse<PendingEvent>>>,
    seq: u64,
}

impl RangeAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Buffer an event if it bounds an interval; other kinds are ignored.
    pub fn observe(&mut self, event: &Event) {
        if !event.kind.is_interval_boundary() {
            return;
        }
        self.seq += 1;
        self.locations
            .entry(event.location)
            .or_default()
            .push(Reverse(PendingEvent {
                timestamp: event.timestamp,
                seq: self.seq,
                event: event.clone(),
            }));
    }

    /// Drain every location in timestamp order, emitting closed ranges.
    ///
    /// Consumes the assembler: once flushed there is no residual state.
    pub fn flush(self) -> Result<Vec<Range>, ConvertError> {
        let mut ranges = Vec::new();
        for (location, mut heap) in self.locations {
            let mut open: Option<Event> = None;
            while let Some(Reverse(pending)) = heap.pop() {
                match pending.event.kind {
                    EventKind::Enter => {
                        if let Some(previous) = &open {
                            return Err(ConvertError::Ordering(format!(
                                "location {} has a second ENTER ({:?} at {}) while {:?} is still open",
                                location,
                                pending.event.region().unwrap_or(""),
                                pending.timestamp,
                                previous.region().unwrap_or(""),
                            )));
                        }
                        open = Some(pending.event);
                    }
                    EventKind::Leave => {
                        let enter = open.take().ok_or_else(|| {
                            ConvertError::Ordering(format!(
                                "location {} has a LEAVE ({:?} at {}) with no matching ENTER",
                                location,
                                pending.event.region().unwrap_or(""),
                                pending.timestamp,
                            ))
                        })?;
                        ranges.push(close_range(location, enter, pending.event)?);
                    }
                    _ => unreachable!("observe only buffers interval boundaries"),
                }
            }
            if let Some(enter) = open {
                return Err(ConvertError::Ordering(format!(
                    "location {} ends with a dangling ENTER ({:?} at {})",
                    location,
                    enter.region().unwrap_or(""),
                    enter.timestamp,
                )));
            }
        }
        Ok(ranges)
    }
}

/// Combine a matched ENTER/LEAVE pair, validating shared attributes.
fn close_range(location: u64, enter: Event, leave: Event) -> Result<Range, ConvertError> {
    if enter.attributes != leave.attributes {
        return Err(ConvertError::Consistency(format!(
            "attribute mismatch between ENTER at {} and LEAVE at {} on location {}: {:?} vs {:?}",
            enter.timestamp, leave.timestamp, location, enter.attributes, leave.attributes,
        )));
    }
    Ok(Range {
        location,
        enter_timestamp: enter.timestamp,
        enter_region: enter.region().unwrap_or("").to_string(),
        leave_timestamp: leave.timestamp,
        leave_region: leave.region().unwrap_or("").to_string(),
        attributes: leave.attributes,
    })
}
