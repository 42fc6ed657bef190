//! The taint propagation engine.
//!
//! Starting from each clock-read origin, the propagator walks the forward
//! def-use graph of the owning function and reports every sink call it
//! reaches. The walk is an iterative depth-first traversal over an explicit
//! worklist; successors are pushed in reverse so first-visit order equals
//! recursive preorder. A per-run visited set guarantees termination on
//! cyclic graphs (loop-carried phi nodes) and caps work at one visit per
//! instruction per run.

use std::collections::HashSet;

use crate::diagnostics::Diagnostic;
use crate::ir::{Callee, FuncId, InstKind, InstrId, Program, ValueId};
use crate::sink::SinkMatcher;
use crate::source::Origin;

/// Where the walk continues after visiting an instruction of a given kind.
///
/// Every `InstKind` maps to exactly one of these through [`InstKind::flow`];
/// a kind without an explicit decision cannot exist, so taint never widens
/// silently when the instruction set grows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// The instruction's result is tainted; continue into its referrers.
    Result,
    /// A store: redirect to the instruction defining the destination
    /// address, so later reads of that location are reachable.
    Address(ValueId),
    /// Redirect to the referrers of a base or handle value (the object a
    /// field/element address points into, or a channel/map being written).
    Base(ValueId),
    /// The value does not re-expose taint to consumers the analysis tracks.
    Stop,
}

impl InstKind {
    /// The propagation rule for this instruction kind.
    pub fn flow(&self) -> Flow {
        use InstKind::*;
        match self {
            // A call's return value may carry tainted data onward, whether
            // or not the call itself was reported as a sink.
            Call { .. } => Flow::Result,

            Store { addr, .. } => Flow::Address(*addr),

            // Any later access to the addressed object may observe the
            // tainted field or element.
            FieldAddr { base, .. } | IndexAddr { base, .. } => Flow::Base(*base),

            // Future reads of the channel or map may observe the value.
            Send { chan, .. } => Flow::Base(*chan),
            MapUpdate { map, .. } => Flow::Base(*map),

            // Transparent data-flow producers.
            Phi { .. }
            | BinOp { .. }
            | UnOp { .. }
            | ChangeType { .. }
            | Convert { .. }
            | MultiConvert { .. }
            | ChangeInterface { .. }
            | SliceToArrayPointer { .. }
            | MakeInterface { .. }
            | Slice { .. }
            | Field { .. }
            | Lookup { .. }
            | Select { .. }
            | Range { .. }
            | Next { .. }
            | TypeAssert { .. }
            | Extract { .. } => Flow::Result,

            // Terminal kinds.
            Alloc
            | MakeClosure { .. }
            | MakeMap
            | MakeChan
            | MakeSlice
            | Return { .. }
            | RunDefers
            | Panic { .. }
            | Go { .. }
            | Defer { .. }
            | DebugRef { .. } => Flow::Stop,
        }
    }
}

/// One propagation run over one program: the visited set, the findings, and
/// nothing else. Create a fresh run per analysis; the visited set must never
/// outlive it or be shared across unrelated analyses.
pub struct TaintRun<'a> {
    program: &'a Program,
    sinks: &'a SinkMatcher,
    visited: HashSet<(FuncId, InstrId)>,
    findings: Vec<Diagnostic>,
}

impl<'a> TaintRun<'a> {
    pub fn new(program: &'a Program, sinks: &'a SinkMatcher) -> Self {
        Self {
            program,
            sinks,
            visited: HashSet::new(),
            findings: Vec::new(),
        }
    }

    /// Walk forward from one origin, reporting every sink call reached.
    ///
    /// The visited set is shared across origins of the same run, so an
    /// instruction already covered by an earlier origin's walk is not
    /// re-entered and a sink call reachable from several origins is
    /// reported once per run.
    pub fn propagate(&mut self, origin: Origin) {
        let func = self.program.function(origin.func);
        let mut stack = vec![origin.instr];

        while let Some(id) = stack.pop() {
            if !self.visited.insert((origin.func, id)) {
                continue;
            }
            let instr = func.instr(id);

            #[cfg(feature = "telemetry")]
            tracing::trace!(op = instr.kind.mnemonic(), pos = %instr.pos, "checking");

            if let InstKind::Call {
                callee: Callee::Static(fr),
                ..
            } = &instr.kind
                && self.sinks.matches(fr)
            {
                #[cfg(feature = "telemetry")]
                tracing::debug!(callee = %fr, pos = %instr.pos, "sink call reached");
                self.findings
                    .push(Diagnostic::sink_flow(instr.pos.clone(), fr));
            }

            match instr.kind.flow() {
                Flow::Result => {
                    if let Some(result) = instr.result {
                        for &r in func.referrers(result).iter().rev() {
                            stack.push(r);
                        }
                    }
                }
                Flow::Address(addr) => {
                    // No defining instruction (parameter, global, const)
                    // means this branch of the walk ends here.
                    if let Some(def) = func.def_of(addr) {
                        stack.push(def);
                    }
                }
                Flow::Base(base) => {
                    for &r in func.referrers(base).iter().rev() {
                        stack.push(r);
                    }
                }
                Flow::Stop => {}
            }
        }
    }

    pub fn findings(&self) -> &[Diagnostic] {
        &self.findings
    }

    pub fn into_findings(self) -> Vec<Diagnostic> {
        self.findings
    }
}
