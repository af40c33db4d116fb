// This module is the IR object model shared by the linearizer, the CFG builder and the
// code generator. A Module owns every Proc of one compilation unit in a dense vector;
// procs, blocks and instructions refer to each other through small integer ids (ProcId,
// BlockId, InstId) resolved against their owner, never through pointers. new_proc()
// registers the proc as its parent's next child, so a child's position in its parent's
// child list is fixed at creation time and doubles as the closure index the generated
// code hands to the host.

//! Intermediate representation: pseudos, instructions, blocks and procs.

pub mod constant;
pub mod opcode;
pub mod print;
pub mod proc;
pub mod pseudo;

pub use constant::{ConstantPool, ConstantValue};
pub use opcode::{OpFamily, OpInfo, Opcode};
pub use proc::{BasicBlock, Instruction, Proc, RegisterPool, UpvalueDesc, ENTRY_BLOCK, EXIT_BLOCK};
pub use pseudo::{Pseudo, SymbolRef, TempKind, TypeTag};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProcId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstId(pub u32);

/// All procs of one compilation unit. The first proc created is the root.
#[derive(Debug, Default)]
pub struct Module<'a> {
    procs: Vec<Proc<'a>>,
}

impl<'a> Module<'a> {
    pub fn new() -> Self {
        Self { procs: Vec::new() }
    }

    /// Create a proc, registering it as `parent`'s next child.
    pub fn new_proc(&mut self, parent: Option<ProcId>) -> ProcId {
        let id = ProcId(self.procs.len() as u32);
        self.procs.push(Proc::new(id, parent));
        if let Some(parent) = parent {
            self.procs[parent.0 as usize].children.push(id);
        }
        id
    }

    pub fn root(&self) -> Option<ProcId> {
        self.procs.first().map(|p| p.id)
    }

    pub fn proc(&self, id: ProcId) -> &Proc<'a> {
        &self.procs[id.0 as usize]
    }

    pub fn proc_mut(&mut self, id: ProcId) -> &mut Proc<'a> {
        &mut self.procs[id.0 as usize]
    }

    pub fn procs(&self) -> &[Proc<'a>] {
        &self.procs
    }

    pub fn len(&self) -> usize {
        self.procs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.procs.is_empty()
    }

    /// Text dump of every proc, parents before children.
    pub fn dump(&self) -> String {
        self.to_string()
    }
}
