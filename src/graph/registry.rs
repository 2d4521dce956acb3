//! The region registry: a directed graph of named code regions.
//!
//! Region identities arrive from four independent evidence sources (the
//! call tree, the dot graph dump, the performance table, and trace
//! events). Registration is idempotent per name; a region only ever gains
//! edges and attributes after creation and is never deleted. Parent/child
//! edges accumulate across sources, so the result is a multi-parent DAG,
//! not a tree.

use crate::utils::config::{EVAL_SUFFIX, REGION_NAME_DELIMITER};
use crate::utils::error::ConvertError;
use serde_json::{json, Map, Number, Value};
use std::collections::{BTreeMap, BTreeSet};

/// Provenance tag for where a region identity was first (or also) seen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum RegionSource {
    Tree,
    Dot,
    Perf,
    TraceEvent,
}

impl RegionSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            RegionSource::Tree => "tree",
            RegionSource::Dot => "dot",
            RegionSource::Perf => "perf",
            RegionSource::TraceEvent => "trace-event",
        }
    }
}

/// Scalar attributes from one performance-table row.
#[derive(Debug, Clone, PartialEq)]
pub struct PerfStats {
    pub display_name: String,
    pub count: u64,
    pub time: u64,
    pub eval_direct: i64,
}

/// One named code region.
#[derive(Debug, Clone)]
pub struct Region {
    /// First `$`-delimited segment of the raw name.
    pub display_name: String,
    /// Trailing source-line token, when the raw name carries one.
    pub line: Option<String>,
    /// Trailing source-column token, when the raw name carries one.
    pub char_offset: Option<String>,
    pub parents: BTreeSet<String>,
    pub children: BTreeSet<String>,
    /// Trace events attributed to this region.
    pub event_count: u64,
    pub sources: BTreeSet<RegionSource>,
    pub perf: Option<PerfStats>,
    /// Call-instance ids seen under this region (GUID tracking only).
    pub guids: BTreeSet<String>,
}

impl Region {
    /// Create a region, splitting structured tokens out of the raw name.
    ///
    /// Names shaped `<display>$...$<line>$<char>` populate the derived
    /// fields; names with fewer than three segments are a soft miss and
    /// only yield a display name.
    fn from_name(name: &str, source: RegionSource) -> Self {
        let chunks: Vec<&str> = name.split(REGION_NAME_DELIMITER).collect();
        let (line, char_offset) = if chunks.len() >= 3 {
            (
                Some(chunks[chunks.len() - 2].to_string()),
                Some(chunks[chunks.len() - 1].to_string()),
            )
        } else {
            (None, None)
        };
        Self {
            display_name: chunks[0].to_string(),
            line,
            char_offset,
            parents: BTreeSet::new(),
            children: BTreeSet::new(),
            event_count: 0,
            sources: BTreeSet::from([source]),
            perf: None,
            guids: BTreeSet::new(),
        }
    }

    /// Region attribute object for the `regions` output mapping.
    ///
    /// Empty parent/child sets are omitted, `sources` only appears with
    /// provenance debugging, and `guids` only when GUID tracking is on.
    pub fn to_json(&self, debug_sources: bool, include_guids: bool) -> Value {
        let mut map = Map::new();
        map.insert("name".into(), Value::String(self.display_name.clone()));
        if let Some(line) = &self.line {
            map.insert("line".into(), Value::String(line.clone()));
        }
        if let Some(char_offset) = &self.char_offset {
            map.insert("char".into(), Value::String(char_offset.clone()));
        }
        if !self.parents.is_empty() {
            map.insert("parents".into(), string_set_json(&self.parents));
        }
        if !self.children.is_empty() {
            map.insert("children".into(), string_set_json(&self.children));
        }
        if self.event_count > 0 {
            map.insert(
                "eventCount".into(),
                Value::Number(Number::from(self.event_count)),
            );
        }
        if let Some(perf) = &self.perf {
            map.insert(
                "display_name".into(),
                Value::String(perf.display_name.clone()),
            );
            map.insert("count".into(), Value::Number(Number::from(perf.count)));
            map.insert("time".into(), Value::Number(Number::from(perf.time)));
            map.insert(
                "eval_direct".into(),
                Value::Number(Number::from(perf.eval_direct)),
            );
        }
        if debug_sources {
            map.insert(
                "sources".into(),
                Value::Array(
                    self.sources
                        .iter()
                        .map(|s| Value::String(s.as_str().to_string()))
                        .collect(),
                ),
            );
        }
        if include_guids && !self.guids.is_empty() {
            map.insert("guids".into(), string_set_json(&self.guids));
        }
        Value::Object(map)
    }
}

fn string_set_json(set: &BTreeSet<String>) -> Value {
    Value::Array(set.iter().map(|s| Value::String(s.clone())).collect())
}

/// Owned registry of every region and edge discovered during a run.
#[derive(Debug, Default)]
pub struct RegionGraph {
    regions: BTreeMap<String, Region>,
}

impl RegionGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&Region> {
        self.regions.get(name)
    }

    /// Idempotent registration of a region identity.
    ///
    /// An already-known name just records the extra provenance tag; the
    /// `parent` hint is only applied when the region is first created.
    /// Tree names are assumed first-seen-globally-unique, so a duplicate
    /// tree registration is a consistency error.
    pub fn register(
        &mut self,
        name: &str,
        source: RegionSource,
        parent: Option<&str>,
    ) -> Result<(), ConvertError> {
        if let Some(existing) = self.regions.get_mut(name) {
            if source == RegionSource::Tree {
                return Err(ConvertError::Consistency(format!(
                    "tree registered region {:?} twice",
                    name
                )));
            }
            existing.sources.insert(source);
            return Ok(());
        }
        self.regions
            .insert(name.to_string(), Region::from_name(name, source));
        if let Some(parent) = parent {
            self.add_edge(parent, name)?;
        }
        Ok(())
    }

    /// Idempotent parent→child edge insert. Both endpoints must already
    /// be registered.
    pub fn add_edge(&mut self, parent: &str, child: &str) -> Result<(), ConvertError> {
        if !self.regions.contains_key(parent) {
            return Err(ConvertError::Consistency(format!(
                "edge references unregistered parent region {:?}",
                parent
            )));
        }
        let Some(child_region) = self.regions.get_mut(child) else {
            return Err(ConvertError::Consistency(format!(
                "edge references unregistered child region {:?}",
                child
            )));
        };
        child_region.parents.insert(parent.to_string());
        self.regions
            .get_mut(parent)
            .expect("parent existence checked above")
            .children
            .insert(child.to_string());
        Ok(())
    }

    /// Attach performance-table scalars, registering the region if unseen.
    /// Never introduces edges.
    pub fn attach_perf(
        &mut self,
        name: &str,
        display_name: &str,
        count: u64,
        time: u64,
        eval_direct: i64,
    ) -> Result<(), ConvertError> {
        self.register(name, RegionSource::Perf, None)?;
        let region = self
            .regions
            .get_mut(name)
            .expect("registered just above");
        region.perf = Some(PerfStats {
            display_name: display_name.to_string(),
            count,
            time,
            eval_direct,
        });
        Ok(())
    }

    /// Attribute one trace event to a region, normalizing away the
    /// evaluation suffix and lazily registering unknown names.
    ///
    /// Returns the normalized region name.
    pub fn record_event(&mut self, raw_name: &str) -> Result<String, ConvertError> {
        let name = raw_name.replace(EVAL_SUFFIX, "");
        self.register(&name, RegionSource::TraceEvent, None)?;
        self.regions
            .get_mut(&name)
            .expect("registered just above")
            .event_count += 1;
        Ok(name)
    }

    /// Associate a call-instance id with a region (GUID tracking only).
    pub fn add_guid(&mut self, region: &str, guid: &str) {
        if let Some(region) = self.regions.get_mut(region) {
            region.guids.insert(guid.to_string());
        }
    }

    /// All parent→child edges, in deterministic order.
    pub fn edges(&self) -> impl Iterator<Item = (&str, &str)> {
        self.regions.iter().flat_map(|(parent, region)| {
            region
                .children
                .iter()
                .map(move |child| (parent.as_str(), child.as_str()))
        })
    }

    /// The `regions` output mapping: region name → attribute object.
    pub fn to_json(&self, debug_sources: bool, include_guids: bool) -> Value {
        let mut map = Map::new();
        for (name, region) in &self.regions {
            map.insert(name.clone(), region.to_json(debug_sources, include_guids));
        }
        Value::Object(map)
    }

    /// The `region links` output array.
    pub fn links_json(&self) -> Vec<Value> {
        self.edges()
            .map(|(source, target)| json!({ "source": source, "target": target }))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_parses_structured_name() {
        let mut graph = RegionGraph::new();
        graph
            .register("add$0$5$9", RegionSource::Tree, None)
            .unwrap();
        let region = graph.get("add$0$5$9").unwrap();
        assert_eq!(region.display_name, "add");
        assert_eq!(region.line.as_deref(), Some("5"));
        assert_eq!(region.char_offset.as_deref(), Some("9"));
    }

    #[test]
    fn test_register_short_name_soft_miss() {
        let mut graph = RegionGraph::new();
        graph.register("main", RegionSource::Tree, None).unwrap();
        let region = graph.get("main").unwrap();
        assert_eq!(region.display_name, "main");
        assert!(region.line.is_none());
        assert!(region.char_offset.is_none());
    }

    #[test]
    fn test_register_idempotent_keeps_edges() {
        let mut graph = RegionGraph::new();
        graph.register("parent", RegionSource::Dot, None).unwrap();
        graph
            .register("child", RegionSource::Dot, Some("parent"))
            .unwrap();
        graph.register("child", RegionSource::Perf, None).unwrap();
        let child = graph.get("child").unwrap();
        assert!(child.parents.contains("parent"));
        assert!(child.sources.contains(&RegionSource::Dot));
        assert!(child.sources.contains(&RegionSource::Perf));
        assert_eq!(graph.len(), 2);
    }

    #[test]
    fn test_duplicate_tree_registration_errors() {
        let mut graph = RegionGraph::new();
        graph.register("node", RegionSource::Tree, None).unwrap();
        let err = graph
            .register("node", RegionSource::Tree, None)
            .unwrap_err();
        assert!(matches!(err, ConvertError::Consistency(_)));
    }

    #[test]
    fn test_multi_parent_dag() {
        let mut graph = RegionGraph::new();
        graph.register("C", RegionSource::Tree, None).unwrap();
        graph.register("B", RegionSource::Tree, Some("C")).unwrap();
        graph.register("A", RegionSource::Dot, None).unwrap();
        graph.add_edge("A", "B").unwrap();
        let b = graph.get("B").unwrap();
        assert_eq!(
            b.parents,
            BTreeSet::from(["A".to_string(), "C".to_string()])
        );
    }

    #[test]
    fn test_edge_requires_registered_endpoints() {
        let mut graph = RegionGraph::new();
        graph.register("known", RegionSource::Dot, None).unwrap();
        assert!(graph.add_edge("known", "ghost").is_err());
        assert!(graph.add_edge("ghost", "known").is_err());
    }

    #[test]
    fn test_record_event_normalizes_eval_suffix() {
        let mut graph = RegionGraph::new();
        let name = graph.record_event("apply$0$1$2::eval").unwrap();
        assert_eq!(name, "apply$0$1$2");
        graph.record_event("apply$0$1$2").unwrap();
        let region = graph.get("apply$0$1$2").unwrap();
        assert_eq!(region.event_count, 2);
        assert!(region.sources.contains(&RegionSource::TraceEvent));
    }

    #[test]
    fn test_json_omits_empty_sets() {
        let mut graph = RegionGraph::new();
        graph.register("solo", RegionSource::Dot, None).unwrap();
        let value = graph.to_json(false, false);
        let solo = &value["solo"];
        assert!(solo.get("parents").is_none());
        assert!(solo.get("children").is_none());
        assert!(solo.get("sources").is_none());
        assert_eq!(solo["name"], "solo");
    }

    #[test]
    fn test_links_json_matches_edges() {
        let mut graph = RegionGraph::new();
        graph.register("p", RegionSource::Dot, None).unwrap();
        graph.register("c", RegionSource::Dot, Some("p")).unwrap();
        let links = graph.links_json();
        assert_eq!(links, vec![json!({"source": "p", "target": "c"})]);
    }
}
