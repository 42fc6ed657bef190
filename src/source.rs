use crate::config::SourceSpec;
use crate::ir::{FuncId, InstKind, InstrId, Program};

/// A call instruction whose result seeds taint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Origin {
    pub func: FuncId,
    pub instr: InstrId,
}

/// Collect every call whose callee statically resolves to the designated
/// clock-read function, in program enumeration order (function by function,
/// block by block, instruction by instruction). Calls through a dynamic
/// callee are skipped; that is a documented precision limit, not an error.
pub fn locate_origins(program: &Program, source: &SourceSpec) -> Vec<Origin> {
    let mut origins = Vec::new();

    for (fi, func) in program.functions.iter().enumerate() {
        for block in &func.blocks {
            for &id in &block.instrs {
                let instr = func.instr(id);
                let InstKind::Call { callee, .. } = &instr.kind else {
                    continue;
                };
                let Some(fr) = callee.resolved() else {
                    continue;
                };
                if source.matches(fr) {
                    #[cfg(feature = "telemetry")]
                    tracing::debug!(
                        func = %func.qualified(),
                        pos = %instr.pos,
                        "clock-read origin found"
                    );
                    origins.push(Origin {
                        func: FuncId(fi as u32),
                        instr: id,
                    });
                }
            }
        }
    }

    origins
}
