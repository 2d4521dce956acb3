//! Scanner for the side-channel report stream.
//!
//! An instrumented run prints three kinds of report blocks alongside its
//! trace: a call tree (one Newick-serialized line behind a marker), a dot
//! graph dump, and a performance CSV table. Each block contributes partial
//! region-graph evidence, so the whole stream is drained into the
//! [`RegionGraph`] before any trace event is read.

use crate::graph::registry::{RegionGraph, RegionSource};
use crate::utils::error::ConvertError;
use log::debug;
use regex::Regex;
use serde_json::{json, Value};
use std::io::BufRead;

/// Mirror of one call-tree node, kept for the optional `tree` output.
#[derive(Debug, Clone, PartialEq)]
pub struct TreeNode {
    pub name: String,
    pub children: Vec<TreeNode>,
}

impl TreeNode {
    /// Nested `{"name": ..., "children": [...]}` object.
    pub fn to_json(&self) -> Value {
        json!({
            "name": self.name,
            "children": self.children.iter().map(TreeNode::to_json).collect::<Vec<_>>(),
        })
    }
}

/// Which report block the scanner is currently inside.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanMode {
    Idle,
    Tree,
    Dot,
    Perf,
}

/// Modal line scanner for the tree/dot/perf report stream.
pub struct ReportScanner {
    tree_marker: Regex,
    dot_marker: Regex,
    dot_edge: Regex,
    perf_marker: Regex,
    perf_row: Regex,
    mode: ScanMode,
    tree: Option<TreeNode>,
}

impl ReportScanner {
    pub fn new() -> Self {
        Self {
            tree_marker: Regex::new(r"^Tree information for function:").unwrap(),
            dot_marker: Regex::new(r#"^graph "[^"]*" \{"#).unwrap(),
            dot_edge: Regex::new(r#"^"([^"]*)" -- "([^"]*)";"#).unwrap(),
            perf_marker: Regex::new(r"^primitive_instance,display_name,count,time,eval_direct")
                .unwrap(),
            perf_row: Regex::new(r#"^"([^"]*)","([^"]*)",(\d+),(\d+),(-?1)"#).unwrap(),
            mode: ScanMode::Idle,
            tree: None,
        }
    }

    /// Consume one report line, feeding any region evidence into `graph`.
    pub fn feed_line(&mut self, line: &str, graph: &mut RegionGraph) -> Result<(), ConvertError> {
        match self.mode {
            ScanMode::Idle => {
                if self.tree_marker.is_match(line) {
                    self.mode = ScanMode::Tree;
                } else if self.dot_marker.is_match(line) {
                    self.mode = ScanMode::Dot;
                } else if self.perf_marker.is_match(line) {
                    self.mode = ScanMode::Perf;
                }
                // Anything else between blocks is program output, not ours.
                Ok(())
            }
            ScanMode::Tree => {
                // The marker is followed by exactly one Newick line.
                let root = parse_newick(line)?;
                register_tree(&root, None, graph)?;
                debug!("registered call tree rooted at {:?}", root.name);
                self.tree = Some(root);
                self.mode = ScanMode::Idle;
                Ok(())
            }
            ScanMode::Dot => {
                if let Some(caps) = self.dot_edge.captures(line) {
                    graph.register(&caps[1], RegionSource::Dot, None)?;
                    graph.register(&caps[2], RegionSource::Dot, None)?;
                    graph.add_edge(&caps[1], &caps[2])?;
                } else {
                    // First non-edge line (usually the closing brace) ends the block.
                    self.mode = ScanMode::Idle;
                }
                Ok(())
            }
            ScanMode::Perf => {
                if let Some(caps) = self.perf_row.captures(line) {
                    let count: u64 = caps[3].parse().map_err(|_| {
                        ConvertError::bad_line("perf row count is not an integer", line)
                    })?;
                    let time: u64 = caps[4].parse().map_err(|_| {
                        ConvertError::bad_line("perf row time is not an integer", line)
                    })?;
                    let eval_direct: i64 = caps[5].parse().map_err(|_| {
                        ConvertError::bad_line("perf row eval flag is not an integer", line)
                    })?;
                    graph.attach_perf(&caps[1], &caps[2], count, time, eval_direct)?;
                } else {
                    self.mode = ScanMode::Idle;
                }
                Ok(())
            }
        }
    }

    /// Hand over the mirrored tree once scanning is done.
    pub fn into_tree(self) -> Option<TreeNode> {
        self.tree
    }
}

impl Default for ReportScanner {
    fn default() -> Self {
        Self::new()
    }
}

/// Drain an entire report stream into the region graph.
///
/// Returns the mirrored call tree when the stream contained one.
pub fn scan_reports<R: BufRead>(
    reader: R,
    graph: &mut RegionGraph,
) -> Result<Option<TreeNode>, ConvertError> {
    let mut scanner = ReportScanner::new();
    for line in reader.lines() {
        scanner.feed_line(&line?, graph)?;
    }
    Ok(scanner.into_tree())
}

/// Register every tree node as a region, with its structural parent.
fn register_tree(
    node: &TreeNode,
    parent: Option<&str>,
    graph: &mut RegionGraph,
) -> Result<(), ConvertError> {
    graph.register(&node.name, RegionSource::Tree, parent)?;
    for child in &node.children {
        register_tree(child, Some(&node.name), graph)?;
    }
    Ok(())
}

/// Parse one Newick-serialized tree: `(child,(gc1,gc2)child2)root;`
///
/// Children precede their parent's label. Labels are either unquoted
/// (any character except `(),;` and quotes) or single-quoted.
pub fn parse_newick(line: &str) -> Result<TreeNode, ConvertError> {
    let mut cursor = NewickCursor {
        chars: line.trim().chars().peekable(),
        text: line.trim(),
    };
    let root = cursor.parse_subtree()?;
    match cursor.next_non_space() {
        None | Some(';') => Ok(root),
        Some(c) => Err(ConvertError::Grammar(format!(
            "trailing {:?} after tree in line {:?}",
            c, cursor.text
        ))),
    }
}

struct NewickCursor<'a> {
    chars: std::iter::Peekable<std::str::Chars<'a>>,
    text: &'a str,
}

impl<'a> NewickCursor<'a> {
    fn peek(&mut self) -> Option<char> {
        self.chars.peek().copied()
    }

    fn next_non_space(&mut self) -> Option<char> {
        loop {
            let c = self.chars.next()?;
            if !c.is_whitespace() {
                return Some(c);
            }
        }
    }

    fn parse_subtree(&mut self) -> Result<TreeNode, ConvertError> {
        let mut children = Vec::new();
        if self.peek() == Some('(') {
            self.chars.next();
            loop {
                children.push(self.parse_subtree()?);
                match self.next_non_space() {
                    Some(',') => continue,
                    Some(')') => break,
                    other => {
                        return Err(ConvertError::Grammar(format!(
                            "expected ',' or ')' in tree line {:?}, found {:?}",
                            self.text, other
                        )))
                    }
                }
            }
        }
        let name = self.parse_label()?;
        if name.is_empty() && children.is_empty() {
            return Err(ConvertError::Grammar(format!(
                "empty node in tree line {:?}",
                self.text
            )));
        }
        Ok(TreeNode { name, children })
    }

    fn parse_label(&mut self) -> Result<String, ConvertError> {
        if self.peek() == Some('\'') {
            self.chars.next();
            let mut label = String::new();
            loop {
                match self.chars.next() {
                    Some('\'') => return Ok(label),
                    Some(c) => label.push(c),
                    None => {
                        return Err(ConvertError::Grammar(format!(
                            "unterminated quoted label in tree line {:?}",
                            self.text
                        )))
                    }
                }
            }
        }
        let mut label = String::new();
        while let Some(c) = self.peek() {
            if matches!(c, '(' | ')' | ',' | ';') {
                break;
            }
            label.push(c);
            self.chars.next();
        }
        Ok(label.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_newick_single_leaf() {
        let tree = parse_newick("root;").unwrap();
        assert_eq!(tree.name, "root");
        assert!(tree.children.is_empty());
    }

    #[test]
    fn test_parse_newick_nested() {
        let tree = parse_newick("(a,(b,c)inner)root;").unwrap();
        assert_eq!(tree.name, "root");
        assert_eq!(tree.children.len(), 2);
        assert_eq!(tree.children[0].name, "a");
        assert_eq!(tree.children[1].name, "inner");
        assert_eq!(tree.children[1].children[1].name, "c");
    }

    #[test]
    fn test_parse_newick_structured_names() {
        let tree = parse_newick("(add$0$5$9,mul$0$5$17)block$0$5$1;").unwrap();
        assert_eq!(tree.name, "block$0$5$1");
        assert_eq!(tree.children[0].name, "add$0$5$9");
    }

    #[test]
    fn test_parse_newick_quoted_label() {
        let tree = parse_newick("('odd (name)',plain)root;").unwrap();
        assert_eq!(tree.children[0].name, "odd (name)");
    }

    #[test]
    fn test_parse_newick_garbage() {
        assert!(parse_newick("(a,b;").is_err());
        assert!(parse_newick("").is_err());
    }

    #[test]
    fn test_scan_tree_block() {
        let input = "Tree information for function:\n(child1,child2)root;\n";
        let mut graph = RegionGraph::new();
        let tree = scan_reports(input.as_bytes(), &mut graph).unwrap().unwrap();
        assert_eq!(tree.name, "root");
        assert_eq!(graph.len(), 3);
        let child = graph.get("child1").unwrap();
        assert!(child.parents.contains("root"));
        let root = graph.get("root").unwrap();
        assert!(root.children.contains("child2"));
    }

    #[test]
    fn test_scan_dot_block_registers_endpoints() {
        let input = "graph \"G\" {\n\"A\" -- \"B\";\n}\n";
        let mut graph = RegionGraph::new();
        scan_reports(input.as_bytes(), &mut graph).unwrap();
        assert!(graph.get("B").unwrap().parents.contains("A"));
    }

    #[test]
    fn test_scan_perf_block_attaches_scalars() {
        let input = "primitive_instance,display_name,count,time,eval_direct\n\
                     \"add$0$5$9\",\"add\",12,3456,-1\n\
                     trailing program output\n";
        let mut graph = RegionGraph::new();
        scan_reports(input.as_bytes(), &mut graph).unwrap();
        let region = graph.get("add$0$5$9").unwrap();
        let perf = region.perf.as_ref().unwrap();
        assert_eq!(perf.display_name, "add");
        assert_eq!(perf.count, 12);
        assert_eq!(perf.time, 3456);
        assert_eq!(perf.eval_direct, -1);
    }

    #[test]
    fn test_interleaved_program_output_ignored() {
        let input = "some stdout noise\ngraph \"G\" {\n\"A\" -- \"B\";\n}\nmore noise\n";
        let mut graph = RegionGraph::new();
        scan_reports(input.as_bytes(), &mut graph).unwrap();
        assert_eq!(graph.len(), 2);
    }

    #[test]
    fn test_duplicate_tree_registration_is_fatal() {
        let input = "Tree information for function:\n(a,a)root;\n";
        let mut graph = RegionGraph::new();
        let err = scan_reports(input.as_bytes(), &mut graph).unwrap_err();
        assert!(matches!(err, ConvertError::Consistency(_)));
    }
}
