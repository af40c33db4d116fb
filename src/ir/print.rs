//! Text dump of the IR.
//!
//! ```text
//! define Proc%0
//! L0 (entry)
//!     ADDii {local(x, 0), 1 Kint(0)} {Tint(0)}
//!     RET {Tint(0)} {L1}
//! L1 (exit)
//! ```

use super::constant::ConstantDisplay;
use super::proc::{Instruction, Proc, ENTRY_BLOCK, EXIT_BLOCK};
use super::pseudo::Pseudo;
use super::Module;
use std::fmt;

impl<'a> Proc<'a> {
    fn write_pseudos(&self, f: &mut fmt::Formatter<'_>, pseudos: &[Pseudo<'a>]) -> fmt::Result {
        write!(f, " {{")?;
        for (i, p) in pseudos.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            match (p, self.constant(*p)) {
                (Pseudo::Constant(index), Some(value)) => write!(
                    f,
                    "{}",
                    ConstantDisplay {
                        index: *index,
                        value
                    }
                )?,
                _ => write!(f, "{}", p)?,
            }
        }
        write!(f, "}}")
    }

    fn write_inst(&self, f: &mut fmt::Formatter<'_>, inst: &Instruction<'a>) -> fmt::Result {
        write!(f, "\t{}", inst.opcode)?;
        if !inst.operands.is_empty() {
            self.write_pseudos(f, &inst.operands)?;
        }
        if !inst.targets.is_empty() {
            self.write_pseudos(f, &inst.targets)?;
        }
        writeln!(f)
    }
}

impl fmt::Display for Proc<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "define Proc%{}", self.id.0)?;
        if let Some(name) = self.name {
            write!(f, " ({})", name)?;
        }
        writeln!(f)?;
        for block in &self.blocks {
            write!(f, "L{}", block.index.0)?;
            if block.index == ENTRY_BLOCK {
                write!(f, " (entry)")?;
            } else if block.index == EXIT_BLOCK {
                write!(f, " (exit)")?;
            }
            writeln!(f)?;
            for &id in &block.insts {
                self.write_inst(f, self.inst(id))?;
            }
        }
        Ok(())
    }
}

impl fmt::Display for Module<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for proc in self.procs() {
            write!(f, "{}", proc)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::{BlockId, ConstantValue, Opcode, ProcId};
    use super::*;

    #[test]
    fn test_dump_format() {
        let mut module = Module::new();
        let id = module.new_proc(None);
        let proc = module.proc_mut(id);
        let (one, _) = proc.intern_constant(ConstantValue::Integer(1));
        proc.emit(
            ENTRY_BLOCK,
            Opcode::AddII,
            vec![Pseudo::TempInt(1), one],
            vec![Pseudo::TempInt(0)],
        );
        proc.emit(
            ENTRY_BLOCK,
            Opcode::Ret,
            vec![Pseudo::TempInt(0)],
            vec![Pseudo::Block(EXIT_BLOCK)],
        );
        assert_eq!(module.proc(id).id, ProcId(0));

        let text = module.dump();
        assert_eq!(
            text,
            "define Proc%0\nL0 (entry)\n\tADDii {Tint(1), 1 Kint(0)} {Tint(0)}\n\tRET {Tint(0)} {L1}\nL1 (exit)\n"
        );
        assert_eq!(BlockId(1), EXIT_BLOCK);
    }
}
