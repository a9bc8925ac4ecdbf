//! Explicit stage descriptors.

use serde_json::Value;
use std::collections::BTreeMap;

/// The role a stage plays in its pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum StageKind {
    /// Ordinary middleware.
    #[default]
    Standard,
    /// Runs only when a condition holds.
    Conditional,
    /// Runs a nested pipeline when a condition holds.
    Branch,
    /// Ends the pipeline.
    Terminal,
    /// Observes the pipeline without changing it.
    Diagnostic,
}

/// Metadata registered alongside a stage.
#[derive(Debug, Clone, PartialEq)]
pub struct Descriptor {
    name: String,
    kind: StageKind,
    terminal: bool,
    conditional: bool,
    metadata: BTreeMap<String, Value>,
}

impl Descriptor {
    /// A standard descriptor with the given name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: StageKind::Standard,
            terminal: false,
            conditional: false,
            metadata: BTreeMap::new(),
        }
    }

    /// Set the kind. `Terminal` and `Conditional` also set the matching flag.
    pub fn kind(mut self, kind: StageKind) -> Self {
        self.kind = kind;
        match kind {
            StageKind::Terminal => self.terminal = true,
            StageKind::Conditional => self.conditional = true,
            _ => {}
        }
        self
    }

    /// Mark the stage as ending the pipeline.
    pub fn terminal(mut self, terminal: bool) -> Self {
        self.terminal = terminal;
        self
    }

    /// Mark the stage as conditionally executed.
    pub fn conditional(mut self, conditional: bool) -> Self {
        self.conditional = conditional;
        self
    }

    /// Attach a metadata entry.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Stage name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Stage kind.
    pub fn stage_kind(&self) -> StageKind {
        self.kind
    }

    /// Whether the stage ends the pipeline.
    pub fn is_terminal(&self) -> bool {
        self.terminal
    }

    /// Whether the stage is conditionally executed.
    pub fn is_conditional(&self) -> bool {
        self.conditional
    }

    /// All metadata entries, sorted by key.
    pub fn metadata(&self) -> &BTreeMap<String, Value> {
        &self.metadata
    }

    /// One metadata entry.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.metadata.get(key)
    }
}

/// Strip module paths from a type name, keeping generic arguments readable.
///
/// `my_app::stages::Auth<my_app::Ctx>` becomes `Auth<Ctx>`.
pub fn short_type_name(full: &str) -> String {
    let mut out = String::with_capacity(full.len());
    let mut segment = String::new();
    for ch in full.chars() {
        match ch {
            '<' | '>' | ',' | ' ' | '(' | ')' | '[' | ']' | '&' => {
                out.push_str(last_path_segment(&segment));
                segment.clear();
                out.push(ch);
            }
            _ => segment.push(ch),
        }
    }
    out.push_str(last_path_segment(&segment));
    out
}

fn last_path_segment(path: &str) -> &str {
    path.rsplit("::").next().unwrap_or(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_sets_matching_flags() {
        let terminal = Descriptor::new("end").kind(StageKind::Terminal);
        assert!(terminal.is_terminal());
        assert!(!terminal.is_conditional());

        let gated = Descriptor::new("gate")
            .kind(StageKind::Conditional)
            .with_metadata("order", 3);
        assert!(gated.is_conditional());
        assert_eq!(gated.get("order"), Some(&Value::from(3)));
    }

    #[test]
    fn short_names_drop_paths() {
        assert_eq!(short_type_name("a::b::Auth<c::Ctx>"), "Auth<Ctx>");
        assert_eq!(short_type_name("Plain"), "Plain");
        assert_eq!(
            short_type_name("std::collections::HashMap<a::K, b::V>"),
            "HashMap<K, V>"
        );
    }
}
