//! Fact-name filter compilation (spec §4.4, §6): requests carry a list of
//! glob-like filter strings selecting which facts to return; this compiles
//! them once per request into matchers reused across every node.

use regex::Regex;

use crate::error::{EngineError, Result};
use xref_store::{Fact, Node};

/// A compiled filter. Wraps `regex::Regex` rather than exposing it directly
/// so callers can't depend on the underlying matcher crate.
pub struct Pattern(Regex);

impl Pattern {
    pub fn matches(&self, fact_name: &str) -> bool {
        self.0.is_match(fact_name)
    }
}

pub trait FilterCompiler: Send + Sync {
    fn compile(&self, filters: &[String]) -> Result<Vec<Pattern>>;
}

/// Interprets each filter string as a shell-style glob (`*` meaning "any
/// run of characters", otherwise literal) anchored at both ends, which is
/// the convention Kythe's own fact filters use.
pub struct RegexFilterCompiler;

const REGEX_META: &[char] = &[
    '.', '+', '(', ')', '|', '[', ']', '{', '}', '^', '$', '\\', '?',
];

impl RegexFilterCompiler {
    fn glob_to_regex(glob: &str) -> String {
        let mut out = String::from("^");
        for ch in glob.chars() {
            match ch {
                '*' => out.push_str(".*"),
                c if REGEX_META.contains(&c) => {
                    out.push('\\');
                    out.push(c);
                }
                c => out.push(c),
            }
        }
        out.push('$');
        out
    }
}

impl FilterCompiler for RegexFilterCompiler {
    fn compile(&self, filters: &[String]) -> Result<Vec<Pattern>> {
        filters
            .iter()
            .map(|f| {
                let pattern = Self::glob_to_regex(f);
                Regex::new(&pattern)
                    .map(Pattern)
                    .map_err(|e| EngineError::invalid_argument(format!("invalid filter {f}: {e}")))
            })
            .collect()
    }
}

/// True if `name` matches any compiled pattern. An empty pattern list
/// matches nothing — spec §3: "empty filter list suppresses facts" — so
/// callers gate fact projection on `!patterns.is_empty()` rather than
/// relying on this to pass everything through.
pub fn matches_any(name: &str, patterns: &[Pattern]) -> bool {
    !patterns.is_empty() && patterns.iter().any(|p| p.matches(name))
}

/// Projects a node's facts through `patterns`, sorted by name (I4). Returns
/// `None` when the pattern list is empty (facts suppressed, spec §3) or
/// when no fact survives the filter (spec §4.4: "emit iff at least one
/// fact survives").
pub fn project_node(node: &Node, patterns: &[Pattern]) -> Option<Node> {
    if patterns.is_empty() {
        return None;
    }
    let mut facts: Vec<Fact> = node
        .facts
        .iter()
        .filter(|f| matches_any(&f.name, patterns))
        .cloned()
        .collect();
    if facts.is_empty() {
        return None;
    }
    facts.sort_by(|a, b| a.name.cmp(&b.name));
    Some(Node::with_facts(node.ticket.clone(), facts))
}
