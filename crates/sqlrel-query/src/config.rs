//! Compiler configuration.

/// Default bound on relation nesting depth.
pub const DEFAULT_MAX_DEPTH: usize = 8;

/// Options for [`RelationGraph::compile`](crate::graph::RelationGraph::compile).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompilerConfig {
    /// Alias for the root table (`FROM insurance.persons p`).
    ///
    /// When set it anchors top-level JOINs and HasMany correlation; otherwise
    /// the table name does.
    pub root_alias: Option<String>,
    /// Longest allowed alias chain, root relations counting as depth 1.
    pub max_depth: usize,
    /// Reject two JOINed relations (or top-level subqueries) sharing an alias.
    pub reject_duplicate_aliases: bool,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            root_alias: None,
            max_depth: DEFAULT_MAX_DEPTH,
            reject_duplicate_aliases: true,
        }
    }
}

impl CompilerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the root table alias.
    pub fn root_alias(mut self, alias: impl Into<String>) -> Self {
        let alias = alias.into();
        self.root_alias = (!alias.is_empty()).then_some(alias);
        self
    }

    pub fn max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }

    pub fn reject_duplicate_aliases(mut self, reject: bool) -> Self {
        self.reject_duplicate_aliases = reject;
        self
    }
}
