//! Shared fixture helpers for the integration tests.
//!
//! Programs are built through the public `FunctionBuilder` API in the same
//! shapes the host frontend produces for the corresponding Go sources.

use nowtaint::ir::{Callee, FuncRef, Function, InstKind, Program, ValueId};

pub const SPANNER: &str = "cloud.google.com/go/spanner";

pub fn static_call(package: &str, name: &str, args: Vec<ValueId>) -> InstKind {
    InstKind::Call {
        callee: Callee::Static(FuncRef::new(package, name)),
        args,
    }
}

pub fn program(functions: Vec<Function>) -> Program {
    Program { functions }
}
