//! SSA-form program representation consumed by the analysis.
//!
//! The host frontend owns program construction; this module owns the shape
//! of the handoff. A [`Program`] is a list of functions, each with a value
//! table, ordered basic blocks, and an instruction arena. Forward use edges
//! (referrer lists) and result-definition edges are derived, never supplied:
//! [`Program::finalize`] recomputes them from instruction operands, and
//! [`Program::validate`] enforces the well-formedness preconditions the
//! propagator assumes.
//!
//! Programs can be built in-process with [`FunctionBuilder`] or loaded from
//! a JSON dump with [`Program::from_json`].

use std::fmt;

use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::error::{NowTaintError, TaintResult};

/// Index of a value in a function's value table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ValueId(pub u32);

/// Index of an instruction in a function's instruction arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstrId(pub u32);

/// Index of a function in a program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FuncId(pub u32);

/// Source location attached to an instruction, used verbatim in diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub file: String,
    pub line: u32,
    pub column: u32,
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.line, self.column)
    }
}

/// Shorthand constructor used by builders and tests.
pub fn pos(file: &str, line: u32, column: u32) -> Position {
    Position {
        file: file.to_string(),
        line,
        column,
    }
}

/// A statically resolved function: qualified name plus owning package path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FuncRef {
    pub package: String,
    pub name: String,
}

impl FuncRef {
    pub fn new(package: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            package: package.into(),
            name: name.into(),
        }
    }

    /// Fully qualified name, `<package>.<name>`.
    pub fn qualified(&self) -> String {
        format!("{}.{}", self.package, self.name)
    }
}

impl fmt::Display for FuncRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.package, self.name)
    }
}

/// Call target. Calls through a value (interface dispatch, closures) carry
/// no `FuncRef` and are invisible to source location and sink matching.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Callee {
    Static(FuncRef),
    Dynamic,
}

impl Callee {
    /// The resolved target, if the call is static.
    pub fn resolved(&self) -> Option<&FuncRef> {
        match self {
            Callee::Static(fr) => Some(fr),
            Callee::Dynamic => None,
        }
    }
}

/// The closed set of instruction kinds the analysis understands.
///
/// Operand fields hold `ValueId`s into the owning function's value table.
/// The propagation behavior of each kind lives in `taint::InstKind::flow`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum InstKind {
    Call { callee: Callee, args: Vec<ValueId> },
    Store { addr: ValueId, value: ValueId },
    FieldAddr { base: ValueId, field: String },
    IndexAddr { base: ValueId, index: ValueId },
    Phi { edges: Vec<ValueId> },
    BinOp { x: ValueId, y: ValueId },
    UnOp { x: ValueId },
    ChangeType { x: ValueId },
    Convert { x: ValueId },
    MultiConvert { x: ValueId },
    ChangeInterface { x: ValueId },
    SliceToArrayPointer { x: ValueId },
    MakeInterface { x: ValueId },
    Slice { x: ValueId },
    Field { base: ValueId, field: String },
    Lookup { map: ValueId, key: ValueId },
    Select { channels: Vec<ValueId> },
    Range { x: ValueId },
    Next { iter: ValueId },
    TypeAssert { x: ValueId },
    Extract { tuple: ValueId, index: u32 },
    Send { chan: ValueId, value: ValueId },
    MapUpdate { map: ValueId, key: ValueId, value: ValueId },
    Alloc,
    MakeClosure { bindings: Vec<ValueId> },
    MakeMap,
    MakeChan,
    MakeSlice,
    Return { results: Vec<ValueId> },
    RunDefers,
    Panic { x: ValueId },
    Go { args: Vec<ValueId> },
    Defer { args: Vec<ValueId> },
    DebugRef { x: ValueId },
}

impl InstKind {
    /// All value operands of this instruction, in a fixed order.
    /// Referrer edges are derived from exactly this list.
    pub fn operands(&self) -> Vec<ValueId> {
        use InstKind::*;
        match self {
            Call { args, .. } => args.clone(),
            Store { addr, value } => vec![*addr, *value],
            FieldAddr { base, .. } | Field { base, .. } => vec![*base],
            IndexAddr { base, index } => vec![*base, *index],
            Phi { edges } => edges.clone(),
            BinOp { x, y } => vec![*x, *y],
            UnOp { x }
            | ChangeType { x }
            | Convert { x }
            | MultiConvert { x }
            | ChangeInterface { x }
            | SliceToArrayPointer { x }
            | MakeInterface { x }
            | Slice { x }
            | Range { x }
            | TypeAssert { x }
            | Panic { x }
            | DebugRef { x } => vec![*x],
            Lookup { map, key } => vec![*map, *key],
            Select { channels } => channels.clone(),
            Next { iter } => vec![*iter],
            Extract { tuple, .. } => vec![*tuple],
            Send { chan, value } => vec![*chan, *value],
            MapUpdate { map, key, value } => vec![*map, *key, *value],
            Alloc | MakeMap | MakeChan | MakeSlice | RunDefers => Vec::new(),
            MakeClosure { bindings } => bindings.clone(),
            Return { results } => results.clone(),
            Go { args } | Defer { args } => args.clone(),
        }
    }

    /// Lowercase mnemonic used by the program dump.
    pub fn mnemonic(&self) -> &'static str {
        use InstKind::*;
        match self {
            Call { .. } => "call",
            Store { .. } => "store",
            FieldAddr { .. } => "field_addr",
            IndexAddr { .. } => "index_addr",
            Phi { .. } => "phi",
            BinOp { .. } => "binop",
            UnOp { .. } => "unop",
            ChangeType { .. } => "change_type",
            Convert { .. } => "convert",
            MultiConvert { .. } => "multi_convert",
            ChangeInterface { .. } => "change_interface",
            SliceToArrayPointer { .. } => "slice_to_array_pointer",
            MakeInterface { .. } => "make_interface",
            Slice { .. } => "slice",
            Field { .. } => "field",
            Lookup { .. } => "lookup",
            Select { .. } => "select",
            Range { .. } => "range",
            Next { .. } => "next",
            TypeAssert { .. } => "type_assert",
            Extract { .. } => "extract",
            Send { .. } => "send",
            MapUpdate { .. } => "map_update",
            Alloc => "alloc",
            MakeClosure { .. } => "make_closure",
            MakeMap => "make_map",
            MakeChan => "make_chan",
            MakeSlice => "make_slice",
            Return { .. } => "return",
            RunDefers => "run_defers",
            Panic { .. } => "panic",
            Go { .. } => "go",
            Defer { .. } => "defer",
            DebugRef { .. } => "debug_ref",
        }
    }
}

/// How a value came to exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueKind {
    Param,
    Result,
    Const,
    Global,
}

/// An SSA value: a parameter, an instruction result, a constant, or a
/// global. Referrer lists are recomputed by `finalize`, never deserialized.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Value {
    pub kind: ValueKind,
    #[serde(default)]
    pub name: String,
    #[serde(skip)]
    referrers: Vec<InstrId>,
}

impl Value {
    /// Instructions that consume this value (the forward use edges), in
    /// instruction enumeration order.
    pub fn referrers(&self) -> &[InstrId] {
        &self.referrers
    }
}

/// One instruction. Identity is `(FuncId, InstrId)`; only instructions with
/// `result: Some(_)` define a value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Instruction {
    #[serde(flatten)]
    pub kind: InstKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<ValueId>,
    pub pos: Position,
}

/// A basic block: an ordered slice of the instruction arena.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Block {
    pub instrs: Vec<InstrId>,
}

/// A function in SSA form.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Function {
    pub name: String,
    pub package: String,
    pub values: Vec<Value>,
    pub blocks: Vec<Block>,
    pub instrs: Vec<Instruction>,
    #[serde(skip)]
    defs: Vec<Option<InstrId>>,
}

impl Function {
    pub fn func_ref(&self) -> FuncRef {
        FuncRef::new(self.package.clone(), self.name.clone())
    }

    pub fn qualified(&self) -> String {
        format!("{}.{}", self.package, self.name)
    }

    pub fn value(&self, id: ValueId) -> &Value {
        &self.values[id.0 as usize]
    }

    pub fn instr(&self, id: InstrId) -> &Instruction {
        &self.instrs[id.0 as usize]
    }

    /// The instruction defining `id`, if any. Parameters, constants, and
    /// globals have no defining instruction.
    pub fn def_of(&self, id: ValueId) -> Option<InstrId> {
        self.defs.get(id.0 as usize).copied().flatten()
    }

    pub fn referrers(&self, id: ValueId) -> &[InstrId] {
        self.value(id).referrers()
    }

    /// Recompute referrer lists and the result-definition map from the
    /// instruction arena. Out-of-range ids are ignored here; `validate`
    /// rejects them.
    fn finalize(&mut self) {
        for v in &mut self.values {
            v.referrers.clear();
        }
        self.defs = vec![None; self.values.len()];

        for (i, instr) in self.instrs.iter().enumerate() {
            let id = InstrId(i as u32);
            if let Some(r) = instr.result
                && let Some(slot) = self.defs.get_mut(r.0 as usize)
            {
                *slot = Some(id);
            }
            for op in instr.kind.operands() {
                if let Some(v) = self.values.get_mut(op.0 as usize) {
                    v.referrers.push(id);
                }
            }
        }
    }

    fn validate(&self) -> TaintResult<()> {
        let n_values = self.values.len();
        let n_instrs = self.instrs.len();
        let qualified = self.qualified();

        let mut defined = vec![false; n_values];
        for (i, instr) in self.instrs.iter().enumerate() {
            for op in instr.kind.operands() {
                if op.0 as usize >= n_values {
                    return Err(NowTaintError::malformed(format!(
                        "{qualified}: instruction {i} references value {} out of range",
                        op.0
                    )));
                }
            }
            if let Some(r) = instr.result {
                let idx = r.0 as usize;
                if idx >= n_values {
                    return Err(NowTaintError::malformed(format!(
                        "{qualified}: instruction {i} defines value {} out of range",
                        r.0
                    )));
                }
                if self.values[idx].kind != ValueKind::Result {
                    return Err(NowTaintError::malformed(format!(
                        "{qualified}: instruction {i} defines value {} which is not result-kind",
                        r.0
                    )));
                }
                if defined[idx] {
                    return Err(NowTaintError::malformed(format!(
                        "{qualified}: value {} defined by more than one instruction",
                        r.0
                    )));
                }
                defined[idx] = true;
            }
        }

        let mut placed = vec![false; n_instrs];
        for (b, block) in self.blocks.iter().enumerate() {
            for id in &block.instrs {
                let idx = id.0 as usize;
                if idx >= n_instrs {
                    return Err(NowTaintError::malformed(format!(
                        "{qualified}: block {b} references instruction {} out of range",
                        id.0
                    )));
                }
                if placed[idx] {
                    return Err(NowTaintError::malformed(format!(
                        "{qualified}: instruction {} appears in more than one block",
                        id.0
                    )));
                }
                placed[idx] = true;
            }
        }
        if let Some(idx) = placed.iter().position(|p| !p) {
            return Err(NowTaintError::malformed(format!(
                "{qualified}: instruction {idx} belongs to no block"
            )));
        }

        Ok(())
    }

    fn value_label(&self, id: ValueId) -> String {
        let v = self.value(id);
        if v.name.is_empty() {
            format!("v{}", id.0)
        } else {
            v.name.clone()
        }
    }

    fn render_instr(&self, id: InstrId) -> String {
        let instr = self.instr(id);
        let mut line = String::new();
        if let Some(r) = instr.result {
            line.push_str(&self.value_label(r));
            line.push_str(" = ");
        }
        line.push_str(instr.kind.mnemonic());
        match &instr.kind {
            InstKind::Call { callee, args } => {
                let target = match callee {
                    Callee::Static(fr) => fr.qualified(),
                    Callee::Dynamic => "<dynamic>".to_string(),
                };
                let rendered = args.iter().map(|a| self.value_label(*a)).join(", ");
                line.push_str(&format!(" {target}({rendered})"));
            }
            InstKind::Store { addr, value } => {
                line.push_str(&format!(
                    " {} <- {}",
                    self.value_label(*addr),
                    self.value_label(*value)
                ));
            }
            InstKind::FieldAddr { base, field } | InstKind::Field { base, field } => {
                line.push_str(&format!(" {}.{}", self.value_label(*base), field));
            }
            InstKind::Extract { tuple, index } => {
                line.push_str(&format!(" {}#{}", self.value_label(*tuple), index));
            }
            kind => {
                let ops = kind.operands();
                if !ops.is_empty() {
                    line.push(' ');
                    line.push_str(&ops.iter().map(|o| self.value_label(*o)).join(", "));
                }
            }
        }
        line
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "func {}:", self.qualified())?;
        let params = self
            .values
            .iter()
            .filter(|v| v.kind == ValueKind::Param)
            .map(|v| v.name.as_str())
            .join(", ");
        if !params.is_empty() {
            writeln!(f, "  params: {params}")?;
        }
        for (b, block) in self.blocks.iter().enumerate() {
            writeln!(f, "  b{b}:")?;
            for id in &block.instrs {
                writeln!(f, "    {}", self.render_instr(*id))?;
            }
        }
        Ok(())
    }
}

/// A whole program: the process-wide, read-only analysis input.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Program {
    pub functions: Vec<Function>,
}

impl Program {
    /// Parse a JSON program dump, recompute derived edges, and validate.
    pub fn from_json(raw: &str) -> TaintResult<Self> {
        let mut program: Program =
            serde_json::from_str(raw).map_err(|e| NowTaintError::parse(e.to_string()))?;
        program.finalize();
        program.validate()?;
        Ok(program)
    }

    /// Recompute referrer lists and definition maps for every function.
    /// Builders call this; it is idempotent.
    pub fn finalize(&mut self) {
        for func in &mut self.functions {
            func.finalize();
        }
    }

    /// Enforce the host-contract preconditions: all operand, result, and
    /// block indices in range, each result defined once, each instruction
    /// placed in exactly one block. A violation is fatal (see `error`).
    pub fn validate(&self) -> TaintResult<()> {
        for func in &self.functions {
            func.validate()?;
        }
        Ok(())
    }

    pub fn function(&self, id: FuncId) -> &Function {
        &self.functions[id.0 as usize]
    }
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for func in &self.functions {
            write!(f, "{func}")?;
        }
        Ok(())
    }
}

/// Incremental constructor for a [`Function`], used by in-process hosts and
/// the test suite. Instructions append to the current block; `block` starts
/// a new one.
pub struct FunctionBuilder {
    func: Function,
    next_temp: u32,
}

impl FunctionBuilder {
    pub fn new(package: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            func: Function {
                name: name.into(),
                package: package.into(),
                values: Vec::new(),
                blocks: vec![Block { instrs: Vec::new() }],
                instrs: Vec::new(),
                defs: Vec::new(),
            },
            next_temp: 0,
        }
    }

    fn add_value(&mut self, kind: ValueKind, name: String) -> ValueId {
        let id = ValueId(self.func.values.len() as u32);
        self.func.values.push(Value {
            kind,
            name,
            referrers: Vec::new(),
        });
        id
    }

    pub fn param(&mut self, name: &str) -> ValueId {
        self.add_value(ValueKind::Param, name.to_string())
    }

    pub fn constant(&mut self, name: &str) -> ValueId {
        self.add_value(ValueKind::Const, name.to_string())
    }

    pub fn global(&mut self, name: &str) -> ValueId {
        self.add_value(ValueKind::Global, name.to_string())
    }

    /// Start a new basic block; subsequent instructions land there.
    pub fn block(&mut self) -> usize {
        self.func.blocks.push(Block { instrs: Vec::new() });
        self.func.blocks.len() - 1
    }

    /// Append an instruction that defines no value.
    pub fn push(&mut self, kind: InstKind, pos: Position) -> InstrId {
        self.push_instr(kind, None, pos)
    }

    /// Append an instruction and allocate a fresh result value for it.
    pub fn push_value(&mut self, kind: InstKind, pos: Position) -> ValueId {
        let name = format!("t{}", self.next_temp);
        self.next_temp += 1;
        let result = self.add_value(ValueKind::Result, name);
        self.push_instr(kind, Some(result), pos);
        result
    }

    fn push_instr(&mut self, kind: InstKind, result: Option<ValueId>, pos: Position) -> InstrId {
        let id = InstrId(self.func.instrs.len() as u32);
        self.func.instrs.push(Instruction { kind, result, pos });
        self.func
            .blocks
            .last_mut()
            .expect("builder always has a current block")
            .instrs
            .push(id);
        id
    }

    pub fn finish(mut self) -> Function {
        self.func.finalize();
        self.func
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call_static(package: &str, name: &str, args: Vec<ValueId>) -> InstKind {
        InstKind::Call {
            callee: Callee::Static(FuncRef::new(package, name)),
            args,
        }
    }

    #[test]
    fn builder_computes_referrer_edges() {
        let mut b = FunctionBuilder::new("main", "main");
        let now = b.push_value(call_static("time", "Now", vec![]), pos("m.go", 3, 9));
        let boxed = b.push_value(InstKind::MakeInterface { x: now }, pos("m.go", 4, 9));
        b.push_value(
            call_static("cloud.google.com/go/spanner", "Insert", vec![boxed]),
            pos("m.go", 4, 2),
        );
        let func = b.finish();

        assert_eq!(func.referrers(now), &[InstrId(1)]);
        assert_eq!(func.referrers(boxed), &[InstrId(2)]);
        assert_eq!(func.def_of(boxed), Some(InstrId(1)));
    }

    #[test]
    fn params_have_no_defining_instruction() {
        let mut b = FunctionBuilder::new("main", "main");
        let p = b.param("ctx");
        b.push(InstKind::Return { results: vec![p] }, pos("m.go", 5, 1));
        let func = b.finish();

        assert_eq!(func.def_of(p), None);
        assert_eq!(func.referrers(p), &[InstrId(0)]);
    }

    #[test]
    fn validate_rejects_dangling_operand() {
        let mut func = {
            let mut b = FunctionBuilder::new("main", "main");
            let x = b.param("x");
            b.push_value(InstKind::UnOp { x }, pos("m.go", 2, 1));
            b.finish()
        };
        // Corrupt the operand after the fact, as a broken host would.
        func.instrs[0].kind = InstKind::UnOp { x: ValueId(99) };

        let program = Program {
            functions: vec![func],
        };
        let err = program.validate().unwrap_err();
        assert!(err.to_string().contains("out of range"));
    }

    #[test]
    fn validate_rejects_duplicate_result_definition() {
        let mut func = {
            let mut b = FunctionBuilder::new("main", "main");
            let x = b.param("x");
            b.push_value(InstKind::UnOp { x }, pos("m.go", 2, 1));
            b.push_value(InstKind::UnOp { x }, pos("m.go", 3, 1));
            b.finish()
        };
        let first = func.instrs[0].result;
        func.instrs[1].result = first;

        let program = Program {
            functions: vec![func],
        };
        let err = program.validate().unwrap_err();
        assert!(err.to_string().contains("more than one instruction"));
    }

    #[test]
    fn validate_rejects_unplaced_instruction() {
        let mut func = {
            let mut b = FunctionBuilder::new("main", "main");
            let x = b.param("x");
            b.push_value(InstKind::UnOp { x }, pos("m.go", 2, 1));
            b.finish()
        };
        func.blocks[0].instrs.clear();

        let program = Program {
            functions: vec![func],
        };
        let err = program.validate().unwrap_err();
        assert!(err.to_string().contains("belongs to no block"));
    }

    #[test]
    fn json_round_trip_preserves_edges() {
        let mut b = FunctionBuilder::new("main", "main");
        let now = b.push_value(call_static("time", "Now", vec![]), pos("m.go", 3, 9));
        b.push_value(InstKind::MakeInterface { x: now }, pos("m.go", 4, 9));
        let program = Program {
            functions: vec![b.finish()],
        };

        let raw = serde_json::to_string(&program).expect("serialize");
        let reloaded = Program::from_json(&raw).expect("reload");
        assert_eq!(reloaded.functions[0].referrers(now), &[InstrId(1)]);
    }
}
