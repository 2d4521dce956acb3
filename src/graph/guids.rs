//! Call-instance (GUID) lineage tracking.
//!
//! Every ENTER/LEAVE event may carry a globally unique call-instance id
//! and the id of the instance that spawned it. Collecting these pairs
//! yields caller/callee region relationships independent of the static
//! call tree; the derived edges are merged into the region graph once the
//! trace stream is exhausted.

use crate::graph::registry::RegionGraph;
use crate::utils::config::ROOT_GUID;
use crate::utils::error::ConvertError;
use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, BTreeSet};

/// Lineage entry for one call instance.
#[derive(Debug, Clone, PartialEq)]
pub struct GuidRecord {
    /// Regions observed under this instance id. Usually one; the trace
    /// may conflate levels, in which case all of them participate in
    /// edge derivation.
    pub regions: BTreeSet<String>,
    /// Declared parent instance id; [`ROOT_GUID`] marks a root.
    pub parent: String,
}

/// Table of every call instance seen in the trace.
#[derive(Debug, Default)]
pub struct GuidTable {
    records: BTreeMap<String, GuidRecord>,
}

impl GuidTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Record one lineage observation.
    ///
    /// A new guid creates a record; a known guid must declare the same
    /// parent on every observation.
    pub fn observe(
        &mut self,
        guid: &str,
        parent: &str,
        region: &str,
    ) -> Result<(), ConvertError> {
        if let Some(record) = self.records.get_mut(guid) {
            if record.parent != parent {
                return Err(ConvertError::Consistency(format!(
                    "guid {:?} declares parent {:?} but was previously seen with parent {:?}",
                    guid, parent, record.parent
                )));
            }
            record.regions.insert(region.to_string());
            return Ok(());
        }
        self.records.insert(
            guid.to_string(),
            GuidRecord {
                regions: BTreeSet::from([region.to_string()]),
                parent: parent.to_string(),
            },
        );
        Ok(())
    }

    /// Materialize instance lineage as region edges.
    ///
    /// For every non-root record the parent guid must itself have been
    /// observed; the full parent-regions x child-regions cross-product is
    /// added to the graph. Performed once, after the trace is exhausted;
    /// the table is discardable afterwards.
    pub fn derive_edges(&self, graph: &mut RegionGraph) -> Result<(), ConvertError> {
        for (guid, record) in &self.records {
            if record.parent == ROOT_GUID {
                continue;
            }
            let parent_record = self.records.get(&record.parent).ok_or_else(|| {
                ConvertError::Consistency(format!(
                    "guid {:?} declares parent {:?}, which never appeared in the trace",
                    guid, record.parent
                ))
            })?;
            for parent_region in &parent_record.regions {
                for child_region in &record.regions {
                    graph.add_edge(parent_region, child_region)?;
                }
            }
        }
        Ok(())
    }

    /// The `guids` output mapping: guid → `{regions, parent}`.
    pub fn to_json(&self) -> Value {
        let mut map = Map::new();
        for (guid, record) in &self.records {
            map.insert(
                guid.clone(),
                json!({
                    "regions": record.regions.iter().collect::<Vec<_>>(),
                    "parent": record.parent,
                }),
            );
        }
        Value::Object(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::registry::RegionSource;

    #[test]
    fn test_observe_accumulates_regions() {
        let mut table = GuidTable::new();
        table.observe("5", "0", "a").unwrap();
        table.observe("5", "0", "b").unwrap();
        assert_eq!(table.len(), 1);
        let value = table.to_json();
        assert_eq!(value["5"]["parent"], "0");
        assert_eq!(value["5"]["regions"], json!(["a", "b"]));
    }

    #[test]
    fn test_conflicting_parent_is_consistency_error() {
        let mut table = GuidTable::new();
        table.observe("5", "1", "a").unwrap();
        let err = table.observe("5", "2", "a").unwrap_err();
        assert!(matches!(err, ConvertError::Consistency(_)));
    }

    #[test]
    fn test_derive_edges_cross_product() {
        let mut graph = RegionGraph::new();
        for name in ["p1", "p2", "c1", "c2"] {
            graph.register(name, RegionSource::TraceEvent, None).unwrap();
        }
        let mut table = GuidTable::new();
        table.observe("1", "0", "p1").unwrap();
        table.observe("1", "0", "p2").unwrap();
        table.observe("2", "1", "c1").unwrap();
        table.observe("2", "1", "c2").unwrap();
        table.derive_edges(&mut graph).unwrap();
        assert!(graph.get("c1").unwrap().parents.contains("p1"));
        assert!(graph.get("c1").unwrap().parents.contains("p2"));
        assert!(graph.get("c2").unwrap().parents.contains("p1"));
        assert!(graph.get("p1").unwrap().children.contains("c2"));
    }

    #[test]
    fn test_derive_edges_missing_parent_guid() {
        let mut graph = RegionGraph::new();
        graph.register("r", RegionSource::TraceEvent, None).unwrap();
        let mut table = GuidTable::new();
        table.observe("2", "99", "r").unwrap();
        let err = table.derive_edges(&mut graph).unwrap_err();
        assert!(matches!(err, ConvertError::Consistency(_)));
    }

    #[test]
    fn test_root_records_derive_nothing() {
        let mut graph = RegionGraph::new();
        graph.register("r", RegionSource::TraceEvent, None).unwrap();
        let mut table = GuidTable::new();
        table.observe("1", "0", "r").unwrap();
        table.derive_edges(&mut graph).unwrap();
        assert!(graph.get("r").unwrap().parents.is_empty());
    }
}
