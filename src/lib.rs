//! Core nowtaint engine.
//!
//! nowtaint flags call sites where a value derived from a clock read
//! (`time.Now` by default) may reach a storage-mutation API (the Cloud
//! Spanner namespace by default) as an argument. The crate consumes an
//! SSA-form [`ir::Program`] supplied by a host frontend and produces
//! ordered [`diagnostics::Diagnostic`] records.
//!
//! The analysis is deliberately a may-analysis: reported flows can be
//! false positives, and calls through dynamic callees are not followed.

pub mod cli;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod ir;
pub mod sink;
pub mod source;
pub mod taint;
pub mod telemetry;

use crate::config::TaintConfig;
use crate::diagnostics::Diagnostic;
use crate::error::TaintResult;
use crate::ir::Program;
use crate::sink::SinkMatcher;
use crate::taint::TaintRun;

/// Engine orchestrates one analysis: validate the program, locate clock-read
/// origins, and propagate taint from each with a run-scoped visited set.
pub struct AnalysisEngine {
    config: TaintConfig,
    sinks: SinkMatcher,
}

impl AnalysisEngine {
    /// Create a new engine from an explicit configuration.
    pub fn new(config: TaintConfig) -> Self {
        let sinks = SinkMatcher::new(&config.sinks);
        Self { config, sinks }
    }

    pub fn config(&self) -> &TaintConfig {
        &self.config
    }

    /// Analyze one program and return diagnostics in deterministic order:
    /// origins in program enumeration order, and within each origin the
    /// order sink calls are first visited by the propagator.
    pub fn analyze(&self, program: &Program) -> TaintResult<Vec<Diagnostic>> {
        program.validate()?;

        let origins = source::locate_origins(program, &self.config.source);
        let mut run = TaintRun::new(program, &self.sinks);
        for origin in origins {
            run.propagate(origin);
        }
        Ok(run.into_findings())
    }
}

/// Construct an `AnalysisEngine` with the default configuration
/// (`time.Now` into `cloud.google.com/go/spanner`).
pub fn create_default_engine() -> AnalysisEngine {
    AnalysisEngine::new(TaintConfig::default())
}
