// This module defines the per-function IR containers. A Proc owns a dense vector of
// instructions addressed by InstId and a dense vector of basic blocks, each listing the ids
// of its instructions in execution order; keeping instructions outside the blocks lets an
// instruction be detached and re-appended elsewhere without invalidating any id. Block 0
// is the entry and block 1 the exit, both created with the proc. Registers come from four
// independent pools (locals, integer temps, float temps, generic temps), each handing out
// zero-based numbers with a LIFO free list and remembering its high-water mark for frame
// sizing. The constant pool, upvalue descriptors and the analysis results attached by the
// CFG builder (graph and dominator tree) also live here.

//! Procs, basic blocks, instructions and register pools.

use super::constant::{ConstantPool, ConstantValue};
use super::opcode::Opcode;
use super::pseudo::{Pseudo, TempKind, TypeTag};
use super::{BlockId, InstId, ProcId};
use crate::core::{DominatorTree, Graph};

/// Zero-based register numbers with LIFO reuse.
#[derive(Debug, Default, Clone)]
pub struct RegisterPool {
    next: u32,
    free: Vec<u32>,
}

impl RegisterPool {
    pub fn alloc(&mut self) -> u32 {
        if let Some(reg) = self.free.pop() {
            return reg;
        }
        let reg = self.next;
        self.next += 1;
        reg
    }

    pub fn free(&mut self, reg: u32) {
        debug_assert!(reg < self.next, "register {} was never allocated", reg);
        debug_assert!(!self.free.contains(&reg), "register {} freed twice", reg);
        self.free.push(reg);
    }

    /// Claim `reg` itself. Registers skipped to reach it become free.
    pub fn take(&mut self, reg: u32) {
        if let Some(pos) = self.free.iter().position(|&r| r == reg) {
            self.free.remove(pos);
            return;
        }
        debug_assert!(reg >= self.next, "register {} is already live", reg);
        for skipped in (self.next..reg).rev() {
            self.free.push(skipped);
        }
        self.next = self.next.max(reg + 1);
    }

    /// Number of distinct registers ever handed out.
    pub fn high_water(&self) -> u32 {
        self.next
    }

    /// Registers currently allocated.
    pub fn live(&self) -> u32 {
        self.next - self.free.len() as u32
    }
}

#[derive(Debug, Clone)]
pub struct Instruction<'a> {
    pub opcode: Opcode,
    pub operands: Vec<Pseudo<'a>>,
    pub targets: Vec<Pseudo<'a>>,
    /// Block currently holding the instruction.
    pub block: BlockId,
}

#[derive(Debug, Clone)]
pub struct BasicBlock {
    pub index: BlockId,
    pub insts: Vec<InstId>,
}

/// How a closure reaches one of its upvalues.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UpvalueDesc<'a> {
    pub name: &'a str,
    pub ty: TypeTag,
    /// Parent local register when `in_parent_local`, else the parent's upvalue index.
    pub source_index: u32,
    pub in_parent_local: bool,
}

pub const ENTRY_BLOCK: BlockId = BlockId(0);
pub const EXIT_BLOCK: BlockId = BlockId(1);

/// One compiled function.
#[derive(Debug)]
pub struct Proc<'a> {
    pub id: ProcId,
    pub name: Option<&'a str>,
    pub parent: Option<ProcId>,
    pub children: Vec<ProcId>,
    pub blocks: Vec<BasicBlock>,
    pub instructions: Vec<Instruction<'a>>,
    pub constants: ConstantPool<'a>,
    pub upvalues: Vec<UpvalueDesc<'a>>,
    pub num_params: u32,
    pub is_vararg: bool,
    locals: RegisterPool,
    temp_int: RegisterPool,
    temp_float: RegisterPool,
    temp_any: RegisterPool,
    pub cfg: Option<Graph>,
    pub dominators: Option<DominatorTree>,
}

impl<'a> Proc<'a> {
    /// New proc with its entry and exit blocks.
    pub(crate) fn new(id: ProcId, parent: Option<ProcId>) -> Self {
        let mut proc = Self {
            id,
            name: None,
            parent,
            children: Vec::new(),
            blocks: Vec::new(),
            instructions: Vec::new(),
            constants: ConstantPool::new(),
            upvalues: Vec::new(),
            num_params: 0,
            is_vararg: false,
            locals: RegisterPool::default(),
            temp_int: RegisterPool::default(),
            temp_float: RegisterPool::default(),
            temp_any: RegisterPool::default(),
            cfg: None,
            dominators: None,
        };
        proc.new_block();
        proc.new_block();
        proc
    }

    pub fn new_block(&mut self) -> BlockId {
        let index = BlockId(self.blocks.len() as u32);
        self.blocks.push(BasicBlock {
            index,
            insts: Vec::new(),
        });
        index
    }

    pub fn block(&self, id: BlockId) -> &BasicBlock {
        &self.blocks[id.0 as usize]
    }

    pub fn inst(&self, id: InstId) -> &Instruction<'a> {
        &self.instructions[id.0 as usize]
    }

    pub fn inst_mut(&mut self, id: InstId) -> &mut Instruction<'a> {
        &mut self.instructions[id.0 as usize]
    }

    /// Instructions of `block` in execution order.
    pub fn block_insts(&self, block: BlockId) -> impl Iterator<Item = &Instruction<'a>> + '_ {
        self.block(block).insts.iter().map(move |&id| self.inst(id))
    }

    /// Last instruction of `block`, if any.
    pub fn last_inst(&self, block: BlockId) -> Option<&Instruction<'a>> {
        self.block(block).insts.last().map(|&id| self.inst(id))
    }

    pub fn is_terminated(&self, block: BlockId) -> bool {
        self.last_inst(block)
            .map(|inst| inst.opcode.is_terminator())
            .unwrap_or(false)
    }

    /// Append an instruction to `block`.
    pub fn emit(
        &mut self,
        block: BlockId,
        opcode: Opcode,
        operands: Vec<Pseudo<'a>>,
        targets: Vec<Pseudo<'a>>,
    ) -> InstId {
        let id = InstId(self.instructions.len() as u32);
        log::trace!("proc {} L{}: emit {}", self.id.0, block.0, opcode);
        self.instructions.push(Instruction {
            opcode,
            operands,
            targets,
            block,
        });
        self.blocks[block.0 as usize].insts.push(id);
        id
    }

    /// Move `inst` to the end of `block`.
    pub fn relocate(&mut self, inst: InstId, block: BlockId) {
        let from = self.inst(inst).block;
        self.blocks[from.0 as usize].insts.retain(|&id| id != inst);
        self.blocks[block.0 as usize].insts.push(inst);
        self.inst_mut(inst).block = block;
    }

    fn pool(&mut self, kind: TempKind) -> &mut RegisterPool {
        match kind {
            TempKind::Int => &mut self.temp_int,
            TempKind::Float => &mut self.temp_float,
            TempKind::Any => &mut self.temp_any,
        }
    }

    pub fn alloc_temp(&mut self, kind: TempKind) -> Pseudo<'a> {
        let reg = self.pool(kind).alloc();
        Pseudo::temp(kind, reg)
    }

    /// Return a temporary to its pool. Open ranges and range selections own
    /// the generic temp they start at; everything else is ignored.
    pub fn free_temp(&mut self, pseudo: Pseudo<'a>) {
        match pseudo {
            Pseudo::TempInt(r) => self.temp_int.free(r),
            Pseudo::TempFloat(r) => self.temp_float.free(r),
            Pseudo::TempAny(r) => self.temp_any.free(r),
            Pseudo::Range { base, count: -1 } => self.temp_any.free(base),
            Pseudo::RangeSelect { base, .. } => self.temp_any.free(base),
            _ => {}
        }
    }

    /// Hold the generic temp `reg`, e.g. a call result beyond the first.
    pub fn reserve_temp(&mut self, reg: u32) -> Pseudo<'a> {
        self.temp_any.take(reg);
        Pseudo::TempAny(reg)
    }

    pub fn alloc_local(&mut self) -> u32 {
        self.locals.alloc()
    }

    pub fn free_local(&mut self, reg: u32) {
        self.locals.free(reg);
    }

    pub fn num_locals(&self) -> u32 {
        self.locals.high_water()
    }

    /// High-water mark of a temporary pool.
    pub fn max_temps(&self, kind: TempKind) -> u32 {
        match kind {
            TempKind::Int => self.temp_int.high_water(),
            TempKind::Float => self.temp_float.high_water(),
            TempKind::Any => self.temp_any.high_water(),
        }
    }

    /// Temporaries of `kind` that are still allocated.
    pub fn live_temps(&self, kind: TempKind) -> u32 {
        match kind {
            TempKind::Int => self.temp_int.live(),
            TempKind::Float => self.temp_float.live(),
            TempKind::Any => self.temp_any.live(),
        }
    }

    /// Constant pseudo for `value`; the flag is true if it was newly added.
    pub fn intern_constant(&mut self, value: ConstantValue<'a>) -> (Pseudo<'a>, bool) {
        let (index, inserted) = self.constants.intern(value);
        (Pseudo::Constant(index), inserted)
    }

    pub fn constant(&self, pseudo: Pseudo<'_>) -> Option<ConstantValue<'a>> {
        match pseudo {
            Pseudo::Constant(k) => self.constants.get(k),
            _ => None,
        }
    }

    /// Position of `child` in this proc's child list.
    pub fn child_index(&self, child: ProcId) -> Option<usize> {
        self.children.iter().position(|&c| c == child)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_proc_has_entry_and_exit() {
        let proc = Proc::new(ProcId(0), None);
        assert_eq!(proc.blocks.len(), 2);
        assert_eq!(proc.blocks[0].index, ENTRY_BLOCK);
        assert_eq!(proc.blocks[1].index, EXIT_BLOCK);
    }

    #[test]
    fn test_lifo_register_reuse() {
        let mut proc = Proc::new(ProcId(0), None);
        let t0 = proc.alloc_temp(TempKind::Any);
        let t1 = proc.alloc_temp(TempKind::Any);
        proc.free_temp(t1);
        assert_eq!(proc.alloc_temp(TempKind::Any), t1);
        proc.free_temp(t1);
        proc.free_temp(t0);
        assert_eq!(proc.alloc_temp(TempKind::Any), t0);
        assert_eq!(proc.max_temps(TempKind::Any), 2);
    }

    #[test]
    fn test_reserve_temp_claims_a_specific_register() {
        let mut proc = Proc::new(ProcId(0), None);
        let t0 = proc.alloc_temp(TempKind::Any);
        let t1 = proc.alloc_temp(TempKind::Any);
        proc.free_temp(t1);

        // a free register is taken off the free list
        assert_eq!(proc.reserve_temp(1), t1);
        assert_eq!(proc.live_temps(TempKind::Any), 2);

        // one past the high-water mark leaves the gap free
        assert_eq!(proc.reserve_temp(3), Pseudo::TempAny(3));
        assert_eq!(proc.max_temps(TempKind::Any), 4);
        assert_eq!(proc.alloc_temp(TempKind::Any), Pseudo::TempAny(2));
        assert_eq!(proc.alloc_temp(TempKind::Any), Pseudo::TempAny(4));
        assert_ne!(t0, Pseudo::TempAny(2));
    }

    #[test]
    fn test_pools_are_independent() {
        let mut proc = Proc::new(ProcId(0), None);
        assert_eq!(proc.alloc_temp(TempKind::Int), Pseudo::TempInt(0));
        assert_eq!(proc.alloc_temp(TempKind::Float), Pseudo::TempFloat(0));
        assert_eq!(proc.alloc_temp(TempKind::Any), Pseudo::TempAny(0));
        assert_eq!(proc.alloc_local(), 0);
    }

    #[test]
    fn test_free_temp_ignores_borrowed_ranges() {
        let mut proc = Proc::new(ProcId(0), None);
        let r = proc.alloc_temp(TempKind::Any);
        let Pseudo::TempAny(base) = r else { unreachable!() };

        proc.free_temp(Pseudo::Range { base, count: 1 });
        proc.free_temp(Pseudo::Constant(0));
        proc.free_temp(Pseudo::Nil);
        assert_eq!(proc.live_temps(TempKind::Any), 1);

        proc.free_temp(Pseudo::Range { base, count: -1 });
        assert_eq!(proc.live_temps(TempKind::Any), 0);
    }

    #[test]
    fn test_relocate_moves_instruction() {
        let mut proc = Proc::new(ProcId(0), None);
        let b2 = proc.new_block();
        let a = proc.emit(ENTRY_BLOCK, Opcode::Mov, vec![Pseudo::Nil], vec![Pseudo::TempAny(0)]);
        let b = proc.emit(ENTRY_BLOCK, Opcode::Mov, vec![Pseudo::True], vec![Pseudo::TempAny(1)]);
        proc.relocate(a, b2);
        assert_eq!(proc.block(ENTRY_BLOCK).insts, vec![b]);
        assert_eq!(proc.block(b2).insts, vec![a]);
        assert_eq!(proc.inst(a).block, b2);
    }
}
