//! Intermediate representation consumed by the heuristic and the state model
//!
//! A small, SSA-shaped IR: every value (instruction, argument, global,
//! function address, constant) owns a stable [`ValueId`]. Instructions live
//! in basic blocks, blocks in functions, functions in a [`KModule`].
//!
//! Modules are assembled with [`ModuleBuilder`] and validated on `build()`:
//! - every block of a defined function is non-empty and ends with exactly one terminator
//! - branch and phi targets belong to the same function
//! - direct calls to non-variadic functions pass the declared number of arguments

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::errors::{NvmError, Result};

/// Stable identity of any IR value
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct ValueId(pub u32);

/// Instructions are values
pub type InstId = ValueId;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct FunctionId(pub u32);

/// Module-wide block index
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct BlockId(pub u32);

impl fmt::Display for ValueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

impl fmt::Display for FunctionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "f{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceLocation {
    pub file: String,
    pub line: u32,
}

/// Intrinsics the heuristic cares about, recognised by declaration name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Intrinsic {
    /// Cache-line write-back (`clflush`, `clflushopt`, `clwb`)
    Flush,
    /// Store fence (`sfence`, `mfence`)
    Fence,
    VaStart,
    VaCopy,
    VaEnd,
}

impl Intrinsic {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "llvm.x86.clflush" | "llvm.x86.clflushopt" | "llvm.x86.clwb" | "clflush"
            | "clflushopt" | "clwb" | "_mm_clflush" | "_mm_clflushopt" | "_mm_clwb" => {
                Some(Self::Flush)
            }
            "llvm.x86.sse.sfence" | "llvm.x86.sse2.mfence" | "sfence" | "mfence"
            | "_mm_sfence" | "_mm_mfence" => Some(Self::Fence),
            "llvm.va_start" => Some(Self::VaStart),
            "llvm.va_copy" => Some(Self::VaCopy),
            "llvm.va_end" => Some(Self::VaEnd),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Callee {
    Direct(FunctionId),
    /// Call through a function pointer value
    Indirect(ValueId),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstKind {
    Alloca,
    Load { ptr: ValueId },
    Store { value: ValueId, ptr: ValueId },
    Gep { base: ValueId, indices: Vec<ValueId> },
    Cast { src: ValueId },
    Phi { incoming: Vec<(ValueId, BlockId)> },
    Call { callee: Callee, args: Vec<ValueId> },
    Ret { value: Option<ValueId> },
    Br { cond: Option<ValueId>, targets: Vec<BlockId> },
    Unreachable,
    /// Any other computation, only its operands matter
    Other { operands: Vec<ValueId> },
}

impl InstKind {
    pub fn is_terminator(&self) -> bool {
        matches!(self, Self::Ret { .. } | Self::Br { .. } | Self::Unreachable)
    }

    pub fn opcode_name(&self) -> &'static str {
        match self {
            Self::Alloca => "alloca",
            Self::Load { .. } => "load",
            Self::Store { .. } => "store",
            Self::Gep { .. } => "getelementptr",
            Self::Cast { .. } => "cast",
            Self::Phi { .. } => "phi",
            Self::Call { .. } => "call",
            Self::Ret { .. } => "ret",
            Self::Br { .. } => "br",
            Self::Unreachable => "unreachable",
            Self::Other { .. } => "op",
        }
    }

    /// Value operands, in source order
    pub fn operands(&self) -> Vec<ValueId> {
        match self {
            Self::Alloca | Self::Unreachable => Vec::new(),
            Self::Load { ptr } => vec![*ptr],
            Self::Store { value, ptr } => vec![*value, *ptr],
            Self::Gep { base, indices } => {
                let mut ops = vec![*base];
                ops.extend(indices.iter().copied());
                ops
            }
            Self::Cast { src } => vec![*src],
            Self::Phi { incoming } => incoming.iter().map(|(v, _)| *v).collect(),
            Self::Call { callee, args } => {
                let mut ops = Vec::with_capacity(args.len() + 1);
                if let Callee::Indirect(fp) = callee {
                    ops.push(*fp);
                }
                ops.extend(args.iter().copied());
                ops
            }
            Self::Ret { value } => value.iter().copied().collect(),
            Self::Br { cond, .. } => cond.iter().copied().collect(),
            Self::Other { operands } => operands.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct KInstruction {
    pub id: InstId,
    pub function: FunctionId,
    pub block: BlockId,
    pub kind: InstKind,
    pub location: Option<SourceLocation>,
}

#[derive(Debug, Clone)]
pub struct BasicBlock {
    pub id: BlockId,
    pub function: FunctionId,
    pub name: String,
    pub insts: Vec<InstId>,
}

#[derive(Debug, Clone)]
pub struct KFunction {
    pub id: FunctionId,
    pub name: String,
    /// The function's address as a first-class value
    pub value: ValueId,
    pub params: Vec<ValueId>,
    pub blocks: Vec<BlockId>,
    pub variadic: bool,
    pub intrinsic: Option<Intrinsic>,
}

impl KFunction {
    /// Functions without a body are external declarations
    pub fn is_declaration(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn entry_block(&self) -> Option<BlockId> {
        self.blocks.first().copied()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Instruction,
    Argument { function: FunctionId, index: usize },
    Global,
    Function(FunctionId),
    Constant,
}

#[derive(Debug, Clone)]
pub struct ValueInfo {
    pub kind: ValueKind,
    pub name: String,
}

/// A whole program: functions, globals and every value they mention
#[derive(Debug, Clone, Default)]
pub struct KModule {
    name: String,
    values: Vec<ValueInfo>,
    insts: FxHashMap<InstId, KInstruction>,
    blocks: Vec<BasicBlock>,
    functions: Vec<KFunction>,
    globals: Vec<ValueId>,
    function_by_name: FxHashMap<String, FunctionId>,
}

impl KModule {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn functions(&self) -> &[KFunction] {
        &self.functions
    }

    pub fn defined_functions(&self) -> impl Iterator<Item = &KFunction> {
        self.functions.iter().filter(|f| !f.is_declaration())
    }

    pub fn function(&self, id: FunctionId) -> &KFunction {
        &self.functions[id.0 as usize]
    }

    pub fn function_by_name(&self, name: &str) -> Option<FunctionId> {
        self.function_by_name.get(name).copied()
    }

    pub fn globals(&self) -> &[ValueId] {
        &self.globals
    }

    pub fn value_count(&self) -> usize {
        self.values.len()
    }

    pub fn value(&self, v: ValueId) -> Option<&ValueInfo> {
        self.values.get(v.0 as usize)
    }

    pub fn value_name(&self, v: ValueId) -> &str {
        self.value(v).map(|info| info.name.as_str()).unwrap_or("<unknown>")
    }

    pub fn instruction(&self, id: InstId) -> Option<&KInstruction> {
        self.insts.get(&id)
    }

    pub fn instruction_count(&self) -> usize {
        self.insts.len()
    }

    pub fn block(&self, id: BlockId) -> &BasicBlock {
        &self.blocks[id.0 as usize]
    }

    /// All instructions of `f` in block order
    pub fn instructions_of(&self, f: FunctionId) -> impl Iterator<Item = &KInstruction> + '_ {
        self.function(f)
            .blocks
            .iter()
            .flat_map(move |b| self.block(*b).insts.iter())
            .filter_map(move |i| self.insts.get(i))
    }

    pub fn first_instruction(&self, f: FunctionId) -> Option<InstId> {
        let entry = self.function(f).entry_block()?;
        self.block(entry).insts.first().copied()
    }

    /// First non-phi instruction of the entry block
    pub fn entry_first_non_phi(&self, f: FunctionId) -> Option<InstId> {
        let entry = self.function(f).entry_block()?;
        self.block(entry).insts.iter().copied().find(|i| {
            self.instruction(*i)
                .map(|inst| !matches!(inst.kind, InstKind::Phi { .. }))
                .unwrap_or(false)
        })
    }

    /// Control-flow successors: the next instruction in the block, or the
    /// first instruction of each branch target
    pub fn successors(&self, id: InstId) -> Vec<InstId> {
        let Some(inst) = self.instruction(id) else {
            return Vec::new();
        };
        match &inst.kind {
            InstKind::Br { targets, .. } => targets
                .iter()
                .filter_map(|b| self.block(*b).insts.first().copied())
                .collect(),
            InstKind::Ret { .. } | InstKind::Unreachable => Vec::new(),
            _ => {
                let insts = &self.block(inst.block).insts;
                insts
                    .iter()
                    .position(|i| *i == id)
                    .and_then(|pos| insts.get(pos + 1).copied())
                    .into_iter()
                    .collect()
            }
        }
    }

    pub fn is_global(&self, v: ValueId) -> bool {
        matches!(self.value(v).map(|i| i.kind), Some(ValueKind::Global))
    }

    pub fn function_of_value(&self, v: ValueId) -> Option<FunctionId> {
        match self.value(v)?.kind {
            ValueKind::Function(f) => Some(f),
            _ => None,
        }
    }

    /// Values that denote an abstract memory object
    pub fn is_allocation_site(&self, v: ValueId) -> bool {
        match self.value(v).map(|i| i.kind) {
            Some(ValueKind::Global) | Some(ValueKind::Function(_)) => true,
            Some(ValueKind::Instruction) => matches!(
                self.instruction(v).map(|i| &i.kind),
                Some(InstKind::Alloca) | Some(InstKind::Call { .. })
            ),
            _ => false,
        }
    }

    pub fn called_function(&self, id: InstId) -> Option<FunctionId> {
        match &self.instruction(id)?.kind {
            InstKind::Call {
                callee: Callee::Direct(f),
                ..
            } => Some(*f),
            _ => None,
        }
    }

    pub fn is_call(&self, id: InstId) -> bool {
        matches!(
            self.instruction(id).map(|i| &i.kind),
            Some(InstKind::Call { .. })
        )
    }

    pub fn is_return(&self, id: InstId) -> bool {
        matches!(
            self.instruction(id).map(|i| &i.kind),
            Some(InstKind::Ret { .. })
        )
    }

    pub fn intrinsic_of(&self, id: InstId) -> Option<Intrinsic> {
        self.called_function(id)
            .and_then(|f| self.function(f).intrinsic)
    }

    /// Call arguments, empty for non-calls
    pub fn call_args(&self, id: InstId) -> &[ValueId] {
        match self.instruction(id).map(|i| &i.kind) {
            Some(InstKind::Call { args, .. }) => args,
            _ => &[],
        }
    }

    /// Direct call edges between defined functions, one per call site
    pub fn call_graph_edges(&self) -> Vec<(FunctionId, FunctionId)> {
        let mut edges = Vec::new();
        for f in self.defined_functions() {
            for inst in self.instructions_of(f.id) {
                if let Some(callee) = self.called_function(inst.id) {
                    if !self.function(callee).is_declaration() {
                        edges.push((f.id, callee));
                    }
                }
            }
        }
        edges
    }

    /// `function:%name` with the source location when known
    pub fn describe(&self, v: ValueId) -> String {
        match self.instruction(v) {
            Some(inst) => {
                let func = &self.function(inst.function).name;
                match &inst.location {
                    Some(loc) => format!(
                        "{}:%{} ({}) at {}:{}",
                        func,
                        self.value_name(v),
                        inst.kind.opcode_name(),
                        loc.file,
                        loc.line
                    ),
                    None => format!("{}:%{} ({})", func, self.value_name(v), inst.kind.opcode_name()),
                }
            }
            None => format!("@{}", self.value_name(v)),
        }
    }
}

/// Builds and validates a [`KModule`]
#[derive(Debug, Default)]
pub struct ModuleBuilder {
    module: KModule,
}

impl ModuleBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            module: KModule {
                name: name.into(),
                ..KModule::default()
            },
        }
    }

    fn new_value(&mut self, kind: ValueKind, name: impl Into<String>) -> ValueId {
        let id = ValueId(self.module.values.len() as u32);
        self.module.values.push(ValueInfo {
            kind,
            name: name.into(),
        });
        id
    }

    fn add_function(&mut self, name: &str, params: &[&str], variadic: bool) -> FunctionId {
        let id = FunctionId(self.module.functions.len() as u32);
        let value = self.new_value(ValueKind::Function(id), name);
        let params = params
            .iter()
            .enumerate()
            .map(|(index, p)| {
                self.new_value(
                    ValueKind::Argument {
                        function: id,
                        index,
                    },
                    *p,
                )
            })
            .collect();
        self.module.functions.push(KFunction {
            id,
            name: name.to_string(),
            value,
            params,
            blocks: Vec::new(),
            variadic,
            intrinsic: Intrinsic::from_name(name),
        });
        self.module.function_by_name.insert(name.to_string(), id);
        id
    }

    /// Declare a function; it stays external until [`Self::define`] adds blocks
    pub fn declare_function(&mut self, name: &str, params: &[&str]) -> FunctionId {
        self.add_function(name, params, false)
    }

    pub fn declare_variadic(&mut self, name: &str, params: &[&str]) -> FunctionId {
        self.add_function(name, params, true)
    }

    pub fn global(&mut self, name: &str) -> ValueId {
        let v = self.new_value(ValueKind::Global, name);
        self.module.globals.push(v);
        v
    }

    pub fn constant(&mut self, name: &str) -> ValueId {
        self.new_value(ValueKind::Constant, name)
    }

    pub fn function_value(&self, f: FunctionId) -> ValueId {
        self.module.function(f).value
    }

    pub fn param(&self, f: FunctionId, index: usize) -> ValueId {
        self.module.function(f).params[index]
    }

    pub fn define(&mut self, f: FunctionId) -> FunctionBuilder<'_> {
        FunctionBuilder {
            builder: self,
            function: f,
            current: None,
            location: None,
        }
    }

    pub fn build(self) -> Result<KModule> {
        let module = self.module;
        for func in module.defined_functions() {
            for &b in &func.blocks {
                let block = module.block(b);
                let Some((last, body)) = block.insts.split_last() else {
                    return Err(NvmError::invalid_module(format!(
                        "block '{}' in '{}' is empty",
                        block.name, func.name
                    )));
                };
                if !module.insts[last].kind.is_terminator() {
                    return Err(NvmError::invalid_module(format!(
                        "block '{}' in '{}' does not end with a terminator",
                        block.name, func.name
                    )));
                }
                if body.iter().any(|i| module.insts[i].kind.is_terminator()) {
                    return Err(NvmError::invalid_module(format!(
                        "block '{}' in '{}' has a terminator before its end",
                        block.name, func.name
                    )));
                }
                for i in &block.insts {
                    validate_instruction(&module, func, &module.insts[i])?;
                }
            }
        }
        Ok(module)
    }
}

fn validate_instruction(module: &KModule, func: &KFunction, inst: &KInstruction) -> Result<()> {
    let foreign_block = |b: &BlockId| {
        module
            .blocks
            .get(b.0 as usize)
            .map(|blk| blk.function != func.id)
            .unwrap_or(true)
    };
    match &inst.kind {
        InstKind::Br { targets, .. } if targets.iter().any(foreign_block) => {
            Err(NvmError::invalid_module(format!(
                "branch %{} in '{}' targets a block of another function",
                module.value_name(inst.id),
                func.name
            )))
        }
        InstKind::Phi { incoming } if incoming.iter().any(|(_, b)| foreign_block(b)) => {
            Err(NvmError::invalid_module(format!(
                "phi %{} in '{}' names a block of another function",
                module.value_name(inst.id),
                func.name
            )))
        }
        InstKind::Call {
            callee: Callee::Direct(f),
            args,
        } => {
            let callee = module.function(*f);
            if !callee.variadic && callee.params.len() != args.len() {
                return Err(NvmError::invalid_module(format!(
                    "call %{} passes {} arguments to '{}' which takes {}",
                    module.value_name(inst.id),
                    args.len(),
                    callee.name,
                    callee.params.len()
                )));
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

/// Appends blocks and instructions to one function
pub struct FunctionBuilder<'m> {
    builder: &'m mut ModuleBuilder,
    function: FunctionId,
    current: Option<BlockId>,
    location: Option<SourceLocation>,
}

impl<'m> FunctionBuilder<'m> {
    pub fn id(&self) -> FunctionId {
        self.function
    }

    pub fn param(&self, index: usize) -> ValueId {
        self.builder.param(self.function, index)
    }

    /// Create a block without moving the insertion point
    pub fn add_block(&mut self, name: &str) -> BlockId {
        let module = &mut self.builder.module;
        let id = BlockId(module.blocks.len() as u32);
        module.blocks.push(BasicBlock {
            id,
            function: self.function,
            name: name.to_string(),
            insts: Vec::new(),
        });
        module.functions[self.function.0 as usize].blocks.push(id);
        id
    }

    /// Create a block and move the insertion point to it
    pub fn block(&mut self, name: &str) -> BlockId {
        let id = self.add_block(name);
        self.current = Some(id);
        id
    }

    pub fn position_at_end(&mut self, block: BlockId) -> &mut Self {
        self.current = Some(block);
        self
    }

    /// Source location attached to every following instruction
    pub fn at(&mut self, file: &str, line: u32) -> &mut Self {
        self.location = Some(SourceLocation {
            file: file.to_string(),
            line,
        });
        self
    }

    fn push(&mut self, name: &str, kind: InstKind) -> InstId {
        let block = match self.current {
            Some(b) => b,
            None => self.block("entry"),
        };
        let id = self.builder.new_value(ValueKind::Instruction, name);
        let module = &mut self.builder.module;
        module.blocks[block.0 as usize].insts.push(id);
        module.insts.insert(
            id,
            KInstruction {
                id,
                function: self.function,
                block,
                kind,
                location: self.location.clone(),
            },
        );
        id
    }

    pub fn alloca(&mut self, name: &str) -> InstId {
        self.push(name, InstKind::Alloca)
    }

    pub fn load(&mut self, name: &str, ptr: ValueId) -> InstId {
        self.push(name, InstKind::Load { ptr })
    }

    pub fn store(&mut self, value: ValueId, ptr: ValueId) -> InstId {
        self.push("store", InstKind::Store { value, ptr })
    }

    pub fn gep(&mut self, name: &str, base: ValueId, indices: &[ValueId]) -> InstId {
        self.push(
            name,
            InstKind::Gep {
                base,
                indices: indices.to_vec(),
            },
        )
    }

    pub fn cast(&mut self, name: &str, src: ValueId) -> InstId {
        self.push(name, InstKind::Cast { src })
    }

    pub fn phi(&mut self, name: &str, incoming: &[(ValueId, BlockId)]) -> InstId {
        self.push(
            name,
            InstKind::Phi {
                incoming: incoming.to_vec(),
            },
        )
    }

    pub fn call(&mut self, name: &str, callee: FunctionId, args: &[ValueId]) -> InstId {
        self.push(
            name,
            InstKind::Call {
                callee: Callee::Direct(callee),
                args: args.to_vec(),
            },
        )
    }

    pub fn call_indirect(&mut self, name: &str, fn_ptr: ValueId, args: &[ValueId]) -> InstId {
        self.push(
            name,
            InstKind::Call {
                callee: Callee::Indirect(fn_ptr),
                args: args.to_vec(),
            },
        )
    }

    pub fn op(&mut self, name: &str, operands: &[ValueId]) -> InstId {
        self.push(
            name,
            InstKind::Other {
                operands: operands.to_vec(),
            },
        )
    }

    pub fn ret(&mut self, value: Option<ValueId>) -> InstId {
        self.push("ret", InstKind::Ret { value })
    }

    pub fn br(&mut self, target: BlockId) -> InstId {
        self.push(
            "br",
            InstKind::Br {
                cond: None,
                targets: vec![target],
            },
        )
    }

    pub fn cond_br(&mut self, cond: ValueId, then_block: BlockId, else_block: BlockId) -> InstId {
        self.push(
            "br",
            InstKind::Br {
                cond: Some(cond),
                targets: vec![then_block, else_block],
            },
        )
    }

    pub fn unreachable(&mut self) -> InstId {
        self.push("unreachable", InstKind::Unreachable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn diamond() -> (KModule, FunctionId) {
        let mut mb = ModuleBuilder::new("diamond");
        let main = mb.declare_function("main", &[]);
        let c = mb.constant("c");
        {
            let mut fb = mb.define(main);
            fb.block("entry");
            let left = fb.add_block("left");
            let right = fb.add_block("right");
            let exit = fb.add_block("exit");
            fb.cond_br(c, left, right);
            fb.position_at_end(left);
            fb.br(exit);
            fb.position_at_end(right);
            fb.br(exit);
            fb.position_at_end(exit);
            fb.phi("p", &[(c, left), (c, right)]);
            fb.ret(None);
        }
        (mb.build().unwrap(), main)
    }

    #[test]
    fn test_successors_follow_branches() {
        let (module, main) = diamond();
        let first = module.first_instruction(main).unwrap();
        let succs = module.successors(first);
        assert_eq!(succs.len(), 2);
        for s in succs {
            assert_eq!(module.successors(s).len(), 1);
        }
    }

    #[test]
    fn test_entry_first_non_phi_skips_phis() {
        let mut mb = ModuleBuilder::new("m");
        let f = mb.declare_function("f", &["x"]);
        let x = mb.param(f, 0);
        {
            let mut fb = mb.define(f);
            let entry = fb.block("entry");
            fb.phi("p", &[(x, entry)]);
            fb.ret(None);
        }
        let module = mb.build().unwrap();
        let first = module.entry_first_non_phi(f).unwrap();
        assert!(module.is_return(first));
    }

    #[test]
    fn test_build_rejects_unterminated_block() {
        let mut mb = ModuleBuilder::new("bad");
        let f = mb.declare_function("f", &[]);
        mb.define(f).alloca("a");
        assert!(matches!(mb.build(), Err(NvmError::InvalidModule(_))));
    }

    #[test]
    fn test_build_rejects_arity_mismatch() {
        let mut mb = ModuleBuilder::new("bad");
        let g = mb.declare_function("g", &["a", "b"]);
        let f = mb.declare_function("f", &[]);
        let c = mb.constant("c");
        {
            let mut fb = mb.define(f);
            fb.call("r", g, &[c]);
            fb.ret(None);
        }
        assert!(mb.build().is_err());
    }

    #[test]
    fn test_intrinsics_recognised_by_name() {
        let mut mb = ModuleBuilder::new("m");
        let flush = mb.declare_function("llvm.x86.clwb", &["p"]);
        let fence = mb.declare_function("llvm.x86.sse.sfence", &[]);
        let module = mb.build().unwrap();
        assert_eq!(module.function(flush).intrinsic, Some(Intrinsic::Flush));
        assert_eq!(module.function(fence).intrinsic, Some(Intrinsic::Fence));
        assert!(module.function(flush).is_declaration());
    }

    #[test]
    fn test_allocation_sites() {
        let mut mb = ModuleBuilder::new("m");
        let g = mb.global("g");
        let c = mb.constant("c");
        let mmap = mb.declare_function("mmap", &[]);
        let f = mb.declare_function("f", &[]);
        let (a, call, ld);
        {
            let mut fb = mb.define(f);
            a = fb.alloca("a");
            call = fb.call("p", mmap, &[]);
            ld = fb.load("l", a);
            fb.ret(None);
        }
        let fv = mb.function_value(f);
        let module = mb.build().unwrap();
        assert!(module.is_allocation_site(g));
        assert!(module.is_allocation_site(a));
        assert!(module.is_allocation_site(call));
        assert!(module.is_allocation_site(fv));
        assert!(!module.is_allocation_site(ld));
        assert!(!module.is_allocation_site(c));
    }
}
