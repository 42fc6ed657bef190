use crate::config::SinkSpec;
use crate::ir::FuncRef;

/// Pure predicate deciding whether a resolved callee belongs to the sink
/// API family. Holds the configured namespace patterns and nothing else.
#[derive(Debug, Clone)]
pub struct SinkMatcher {
    patterns: Vec<String>,
}

impl SinkMatcher {
    pub fn new(spec: &SinkSpec) -> Self {
        Self {
            patterns: spec.packages.clone(),
        }
    }

    /// True iff the callee's owning package path contains any configured
    /// pattern. Substring matching subsumes exact-path matching.
    pub fn matches(&self, fr: &FuncRef) -> bool {
        self.patterns.iter().any(|p| fr.package.contains(p))
    }
}
