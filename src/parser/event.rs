//! Streaming parser for `otf2-print` event lines.
//!
//! Turns raw trace text into typed [`Event`] records. Each record starts
//! with a header line (`<KIND> <location> <timestamp> <rest>`) and may be
//! followed by `ADDITIONAL ATTRIBUTES: ...` continuation lines. An event
//! stays open until the next header line (or end of stream) finalizes it.

use crate::utils::error::ConvertError;
use log::trace;
use regex::Regex;
use serde_json::{Map, Number, Value};
use std::collections::BTreeMap;

/// Recognized trace record kinds.
///
/// Any other kind token on a header line is a fatal grammar error: the
/// trace reader is versioned alongside this tool, so an unknown kind means
/// format drift rather than data to skip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Enter,
    Leave,
    Metric,
    MpiSend,
    MpiRecv,
}

impl EventKind {
    /// Parse a header-line kind token.
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "ENTER" => Some(EventKind::Enter),
            "LEAVE" => Some(EventKind::Leave),
            "METRIC" => Some(EventKind::Metric),
            "MPI_SEND" => Some(EventKind::MpiSend),
            "MPI_RECV" => Some(EventKind::MpiRecv),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Enter => "ENTER",
            EventKind::Leave => "LEAVE",
            EventKind::Metric => "METRIC",
            EventKind::MpiSend => "MPI_SEND",
            EventKind::MpiRecv => "MPI_RECV",
        }
    }

    /// ENTER/LEAVE events bound execution intervals.
    pub fn is_interval_boundary(&self) -> bool {
        matches!(self, EventKind::Enter | EventKind::Leave)
    }
}

/// Kind-specific fields extracted from the header's rest-of-line.
#[derive(Debug, Clone, PartialEq)]
pub enum EventPayload {
    /// ENTER/LEAVE: the region being entered or left.
    Region { region: String },
    /// METRIC: one sampled counter, named by the trace.
    Metric { name: String, value: String },
    /// MPI_SEND/MPI_RECV: ordered `key: value` fields (peer, size, tag, ...).
    Mpi { fields: Vec<(String, String)> },
}

/// One finalized trace record.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub kind: EventKind,
    /// Execution location (thread/rank) that produced the record.
    pub location: u64,
    /// Monotonically non-decreasing within one location.
    pub timestamp: u64,
    pub payload: EventPayload,
    /// Key/value pairs from ADDITIONAL ATTRIBUTES continuation lines.
    /// This is where `GUID` and `Parent GUID` live when present.
    pub attributes: BTreeMap<String, String>,
}

impl Event {
    /// Region name for interval-boundary events.
    pub fn region(&self) -> Option<&str> {
        match &self.payload {
            EventPayload::Region { region } => Some(region),
            _ => None,
        }
    }

    pub fn guid(&self) -> Option<&str> {
        self.attributes.get("GUID").map(String::as_str)
    }

    pub fn parent_guid(&self) -> Option<&str> {
        self.attributes.get("Parent GUID").map(String::as_str)
    }

    /// Flat JSON object in the shape the trace reader implies:
    /// `Event`/`Location`/`Timestamp` plus the kind-specific and
    /// continuation attributes as sibling keys.
    pub fn to_json(&self) -> Value {
        let mut map = Map::new();
        map.insert("Event".into(), Value::String(self.kind.as_str().into()));
        map.insert("Location".into(), Value::Number(Number::from(self.location)));
        map.insert("Timestamp".into(), Value::Number(Number::from(self.timestamp)));
        match &self.payload {
            EventPayload::Region { region } => {
                map.insert("Region".into(), Value::String(region.clone()));
            }
            EventPayload::Metric { name, value } => {
                map.insert(name.clone(), Value::String(value.clone()));
            }
            EventPayload::Mpi { fields } => {
                for (key, value) in fields {
                    map.insert(key.clone(), Value::String(value.clone()));
                }
            }
        }
        for (key, value) in &self.attributes {
            map.insert(key.clone(), Value::String(value.clone()));
        }
        Value::Object(map)
    }
}

/// Streaming event-line parser.
///
/// Holds at most one open event; feeding the next header line finalizes
/// and returns the previous one. Call [`EventParser::finish`] after the
/// stream ends to flush the last open event.
pub struct EventParser {
    header: Regex,
    region_attr: Regex,
    metric_attr: Regex,
    mpi_attr: Regex,
    continuation: Regex,
    attr_entry: Regex,
    current: Option<Event>,
}

impl EventParser {
    pub fn new() -> Self {
        Self {
            header: Regex::new(r"^(\S+)\s+(\d+)\s+(\d+)\s+(.*)$").unwrap(),
            region_attr: Regex::new(r#"Region: "([^"]*)""#).unwrap(),
            metric_attr: Regex::new(r#"Value: \("([^"]*)" <\d+>; [^;]*; ([^)]*)"#).unwrap(),
            mpi_attr: Regex::new(r"([^:,]+): ([^,]*)").unwrap(),
            continuation: Regex::new(r"^\s+ADDITIONAL ATTRIBUTES: (.*)$").unwrap(),
            attr_entry: Regex::new(r#"^\(?"([^"]*)" <\d+>; [^;]*; ([^)]*)"#).unwrap(),
            current: None,
        }
    }

    /// Consume one line of trace text.
    ///
    /// Returns `Some(event)` when this line's header finalized the
    /// previously open event. Lines that match no grammar while no event
    /// is open are stream noise (the trace reader's preamble) and are
    /// skipped.
    pub fn feed_line(&mut self, line: &str) -> Result<Option<Event>, ConvertError> {
        if line.trim().is_empty() {
            return Ok(None);
        }

        if let Some(caps) = self.header.captures(line) {
            let finished = self.current.take();
            self.open_event(&caps, line)?;
            return Ok(finished);
        }

        if let Some(caps) = self.continuation.captures(line) {
            let Some(event) = self.current.as_mut() else {
                return Err(ConvertError::bad_line(
                    "attribute continuation with no open event",
                    line,
                ));
            };
            for entry in caps[1].split("), (") {
                let attr = self.attr_entry.captures(entry).ok_or_else(|| {
                    ConvertError::bad_line("malformed additional attribute entry", entry)
                })?;
                event.attributes.insert(attr[1].to_string(), attr[2].to_string());
            }
            return Ok(None);
        }

        if self.current.is_some() {
            return Err(ConvertError::bad_line(
                "unparseable line inside an event record",
                line,
            ));
        }

        trace!("skipping noise line: {}", line.trim_end());
        Ok(None)
    }

    /// Finalize the last open event at end of stream.
    pub fn finish(&mut self) -> Option<Event> {
        self.current.take()
    }

    /// Open a new event from a matched header line.
    fn open_event(&mut self, caps: &regex::Captures<'_>, line: &str) -> Result<(), ConvertError> {
        let kind = EventKind::from_token(&caps[1]).ok_or_else(|| {
            ConvertError::bad_line("unrecognized event kind", line)
        })?;
        let location: u64 = caps[2].parse().map_err(|_| {
            ConvertError::bad_line("event location is not an integer", line)
        })?;
        let timestamp: u64 = caps[3].parse().map_err(|_| {
            ConvertError::bad_line("event timestamp is not an integer", line)
        })?;
        let payload = self.parse_payload(kind, &caps[4], line)?;

        self.current = Some(Event {
            kind,
            location,
            timestamp,
            payload,
            attributes: BTreeMap::new(),
        });
        Ok(())
    }

    /// Extract the kind-specific fields from the header's rest-of-line.
    fn parse_payload(
        &self,
        kind: EventKind,
        rest: &str,
        line: &str,
    ) -> Result<EventPayload, ConvertError> {
        match kind {
            EventKind::Enter | EventKind::Leave => {
                let caps = self.region_attr.captures(rest).ok_or_else(|| {
                    ConvertError::bad_line("ENTER/LEAVE event without a Region clause", line)
                })?;
                Ok(EventPayload::Region {
                    region: caps[1].to_string(),
                })
            }
            EventKind::Metric => {
                let caps = self.metric_attr.captures(rest).ok_or_else(|| {
                    ConvertError::bad_line("METRIC event without a Value clause", line)
                })?;
                Ok(EventPayload::Metric {
                    name: caps[1].to_string(),
                    value: caps[2].to_string(),
                })
            }
            EventKind::MpiSend | EventKind::MpiRecv => {
                let fields: Vec<(String, String)> = self
                    .mpi_attr
                    .captures_iter(rest)
                    .map(|c| (c[1].trim().to_string(), c[2].trim().to_string()))
                    .collect();
                if fields.is_empty() {
                    return Err(ConvertError::bad_line(
                        "MPI event without any key/value fields",
                        line,
                    ));
                }
                Ok(EventPayload::Mpi { fields })
            }
        }
    }
}

impl Default for EventParser {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(parser: &mut EventParser, lines: &[&str]) -> Vec<Event> {
        let mut events = Vec::new();
        for line in lines {
            if let Some(event) = parser.feed_line(line).unwrap() {
                events.push(event);
            }
        }
        if let Some(event) = parser.finish() {
            events.push(event);
        }
        events
    }

    #[test]
    fn test_enter_header() {
        let mut parser = EventParser::new();
        let events = drain(
            &mut parser,
            &[r#"ENTER 0 105 Region: "foo$0$12$3" ("#],
        );
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, EventKind::Enter);
        assert_eq!(events[0].location, 0);
        assert_eq!(events[0].timestamp, 105);
        assert_eq!(events[0].region(), Some("foo$0$12$3"));
    }

    #[test]
    fn test_header_finalizes_previous_event() {
        let mut parser = EventParser::new();
        let first = parser
            .feed_line(r#"ENTER 0 100 Region: "a""#)
            .unwrap();
        assert!(first.is_none());
        let second = parser
            .feed_line(r#"LEAVE 0 200 Region: "a""#)
            .unwrap();
        assert_eq!(second.unwrap().kind, EventKind::Enter);
        assert_eq!(parser.finish().unwrap().kind, EventKind::Leave);
    }

    #[test]
    fn test_continuation_attributes() {
        let mut parser = EventParser::new();
        let events = drain(
            &mut parser,
            &[
                r#"ENTER 1 50 Region: "work""#,
                r#"  ADDITIONAL ATTRIBUTES: ("GUID" <42>; UINT64; 11), ("Parent GUID" <43>; UINT64; 7)"#,
            ],
        );
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].guid(), Some("11"));
        assert_eq!(events[0].parent_guid(), Some("7"));
    }

    #[test]
    fn test_metric_payload() {
        let mut parser = EventParser::new();
        let events = drain(
            &mut parser,
            &[r#"METRIC 2 77 Metric: 1, Value: ("papi_tot_ins" <9>; UINT64; 123456)"#],
        );
        assert_eq!(
            events[0].payload,
            EventPayload::Metric {
                name: "papi_tot_ins".to_string(),
                value: "123456".to_string(),
            }
        );
        // The metric name becomes a key in the flat JSON form.
        assert_eq!(events[0].to_json()["papi_tot_ins"], "123456");
    }

    #[test]
    fn test_mpi_payload() {
        let mut parser = EventParser::new();
        let events = drain(
            &mut parser,
            &["MPI_SEND 3 900 Receiver: 1, Length: 4, Tag: 0"],
        );
        let EventPayload::Mpi { fields } = &events[0].payload else {
            panic!("expected MPI payload");
        };
        assert_eq!(
            fields,
            &vec![
                ("Receiver".to_string(), "1".to_string()),
                ("Length".to_string(), "4".to_string()),
                ("Tag".to_string(), "0".to_string()),
            ]
        );
    }

    #[test]
    fn test_noise_lines_skipped() {
        let mut parser = EventParser::new();
        let events = drain(
            &mut parser,
            &[
                "=== Events ===",
                "",
                r#"ENTER 0 10 Region: "r""#,
            ],
        );
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn test_unknown_kind_is_fatal() {
        let mut parser = EventParser::new();
        let err = parser.feed_line("THREAD_FORK 0 10 something").unwrap_err();
        assert!(matches!(err, ConvertError::Grammar(_)));
    }

    #[test]
    fn test_continuation_without_open_event_is_fatal() {
        let mut parser = EventParser::new();
        let err = parser
            .feed_line(r#"  ADDITIONAL ATTRIBUTES: ("GUID" <1>; UINT64; 5)"#)
            .unwrap_err();
        assert!(matches!(err, ConvertError::Grammar(_)));
    }

    #[test]
    fn test_missing_region_clause_is_fatal() {
        let mut parser = EventParser::new();
        let err = parser.feed_line("ENTER 0 10 Nothing: here").unwrap_err();
        assert!(matches!(err, ConvertError::Grammar(_)));
    }

    #[test]
    fn test_last_event_flushed_on_finish() {
        let mut parser = EventParser::new();
        parser.feed_line(r#"LEAVE 0 99 Region: "tail""#).unwrap();
        let last = parser.finish().unwrap();
        assert_eq!(last.kind, EventKind::Leave);
        assert!(parser.finish().is_none());
    }
}
