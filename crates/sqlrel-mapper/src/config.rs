//! Mapper configuration.

/// What to do when a child mapper fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ChildErrorPolicy {
    /// Return `Error::Mapping` naming the failing relation.
    #[default]
    FailFast,
    /// Log a warning, leave the relation unset and keep mapping.
    BestEffort,
}

/// Options for [`RelationMapper`](crate::mapper::RelationMapper).
///
/// Decode errors in aggregated JSON are never subject to the policy; they
/// always propagate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MapperConfig {
    pub on_child_error: ChildErrorPolicy,
}

impl MapperConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_child_error(mut self, policy: ChildErrorPolicy) -> Self {
        self.on_child_error = policy;
        self
    }

    pub fn best_effort(self) -> Self {
        self.on_child_error(ChildErrorPolicy::BestEffort)
    }

    pub fn fail_fast(self) -> Self {
        self.on_child_error(ChildErrorPolicy::FailFast)
    }
}
