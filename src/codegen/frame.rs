//! Stack frame layout of a generated function.
//!
//! Locals take the first slots, generic temporaries follow. Native integer and
//! float temporaries are C locals and take no slot.

use crate::ir::{ConstantValue, Opcode, Proc, Pseudo, SymbolRef, TempKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameLayout {
    num_locals: u32,
    size: u32,
}

impl FrameLayout {
    pub fn compute(proc: &Proc<'_>) -> Self {
        let num_locals = proc.num_locals();
        let mut layout = Self {
            num_locals,
            size: num_locals + proc.max_temps(TempKind::Any),
        };

        for inst in &proc.instructions {
            for pseudo in inst.operands.iter().chain(&inst.targets) {
                if let Pseudo::RangeSelect { .. } = pseudo {
                    if let Some(slot) = layout.slot(pseudo) {
                        layout.widen(slot + 1);
                    }
                }
            }
            if inst.opcode != Opcode::Call {
                continue;
            }
            let Some(func) = inst.operands.first().and_then(|p| layout.slot(p)) else {
                continue;
            };
            let fixed = inst.operands[1..]
                .iter()
                .filter(|p| !p.is_open_range())
                .count() as u32;
            layout.widen(func + 1 + fixed);
            let expected = inst
                .targets
                .get(1)
                .and_then(|k| proc.constant(*k))
                .and_then(|value| match value {
                    ConstantValue::Integer(n) if n > 0 => Some(n as u32),
                    _ => None,
                });
            if let Some(n) = expected {
                layout.widen(func + n);
            }
        }

        log::trace!(
            "proc {}: {} locals, frame of {} slots",
            proc.id.0,
            layout.num_locals,
            layout.size
        );
        layout
    }

    fn widen(&mut self, reach: u32) {
        self.size = self.size.max(reach);
    }

    pub fn num_locals(&self) -> u32 {
        self.num_locals
    }

    /// Slots the host must reserve above the function's base.
    pub fn size(&self) -> u32 {
        self.size
    }

    /// Frame slot of a pseudo stored on the stack.
    pub fn slot(&self, pseudo: &Pseudo<'_>) -> Option<u32> {
        match *pseudo {
            Pseudo::Symbol(SymbolRef::Local { reg, .. }) => Some(reg),
            Pseudo::TempAny(r) => Some(self.num_locals + r),
            Pseudo::Range { base, .. } => Some(self.num_locals + base),
            Pseudo::RangeSelect { base, index } => Some(self.num_locals + base + index),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Module, ProcId, TypeTag, ENTRY_BLOCK};

    #[test]
    fn test_temps_follow_locals() {
        let mut module = Module::new();
        let id = module.new_proc(None);
        let proc = module.proc_mut(id);
        proc.alloc_local();
        proc.alloc_local();
        proc.alloc_temp(TempKind::Any);
        proc.alloc_temp(TempKind::Int);

        let frame = FrameLayout::compute(proc);
        assert_eq!(frame.size(), 3);
        assert_eq!(frame.slot(&Pseudo::TempAny(0)), Some(2));
        let x = Pseudo::Symbol(SymbolRef::Local {
            name: "x",
            reg: 1,
            ty: TypeTag::Any,
        });
        assert_eq!(frame.slot(&x), Some(1));
        assert_eq!(frame.slot(&Pseudo::TempInt(0)), None);
    }

    #[test]
    fn test_call_window_widens_frame() {
        let mut module = Module::new();
        let id = module.new_proc(None);
        assert_eq!(id, ProcId(0));
        let proc = module.proc_mut(id);
        let callee = proc.alloc_temp(TempKind::Any);
        let (expected, _) = proc.intern_constant(ConstantValue::Integer(4));
        proc.emit(
            ENTRY_BLOCK,
            Opcode::Call,
            vec![callee, Pseudo::Nil, Pseudo::True],
            vec![Pseudo::Range { base: 0, count: -1 }, expected],
        );

        // four results land higher than the two fixed arguments
        let frame = FrameLayout::compute(proc);
        assert_eq!(frame.size(), 4);
    }
}
