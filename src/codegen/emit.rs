// This module turns one proc into one C function. FunctionEmitter walks the blocks in index
// order (the exit block last) and emits a statement group per instruction, dispatching on
// the opcode family. Operands are materialised according to where they live: native
// integer and float temporaries are the C locals i_N / f_N, locals and generic temporaries
// are frame slots &base[slot], upvalues go through the closure, string constants address the
// prototype's constant table through the index the host returned, and integer and float
// constants are written inline. A helper that needs a tagged value for something that has
// none (a native temporary, a literal, a sentinel) gets a scratch TValue, ival<d> or
// fval<d>, where the discriminator d is the operand position so the operands of one
// instruction never share a wrapper. Calls and returns move a forwarded multi-value tail
// between two windows whose offsets from base are both known here, so the copy direction is
// decided at generation time. Failing guards store an error code and jump to the shared
// Lraise_error label.

//! C emission for a single proc.

use super::frame::FrameLayout;
use crate::core::{CompileError, CompileResult};
use crate::ir::{
    BlockId, ConstantValue, Instruction, OpFamily, Opcode, Proc, Pseudo, SymbolRef, TempKind,
    TypeTag, EXIT_BLOCK,
};
use hashbrown::HashMap;
use std::fmt::Write;

/// Scratch tagged values per scalar kind.
const WRAPPERS: usize = 3;

/// Static representation of a value as seen by the generated code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Repr {
    Int,
    Float,
    /// Stored in a TValue that can be addressed.
    Tagged,
    Nil,
    Boolean(bool),
}

/// Integer literal as C source.
pub fn c_int(value: i64) -> String {
    if value == i64::MIN {
        "(-9223372036854775807LL - 1)".to_string()
    } else if value < 0 {
        format!("({})", value)
    } else {
        value.to_string()
    }
}

/// Float literal as C source.
pub fn c_float(value: f64) -> String {
    if value.is_nan() {
        "(0.0/0.0)".to_string()
    } else if value.is_infinite() {
        let text = if value > 0.0 { "(1.0/0.0)" } else { "(-1.0/0.0)" };
        text.to_string()
    } else if value < 0.0 || (value == 0.0 && value.is_sign_negative()) {
        format!("({:?})", value)
    } else {
        format!("{:?}", value)
    }
}

fn label(block: BlockId) -> String {
    format!("L{}", block.0)
}

/// Copy `count` tagged values from `base + src` to `base + dst`. The copy runs
/// downwards when the destination is above the source so no value is
/// overwritten before it has been read.
pub fn window_copy(dst: i64, src: i64, count: &str) -> Vec<String> {
    use std::cmp::Ordering;
    match dst.cmp(&src) {
        Ordering::Equal => vec!["/* tail already in place */".to_string()],
        Ordering::Greater => vec![format!(
            "for (int j_ = {} - 1; j_ >= 0; j_--) {{ setobj(L, base + ({}) + j_, base + ({}) + j_); }}",
            count, dst, src
        )],
        Ordering::Less => vec![format!(
            "for (int j_ = 0; j_ < {}; j_++) {{ setobj(L, base + ({}) + j_, base + ({}) + j_); }}",
            count, dst, src
        )],
    }
}

pub struct FunctionEmitter<'p, 'a> {
    proc: &'p Proc<'a>,
    frame: FrameLayout,
    /// Constant pool index to the host's string constant index.
    strings: &'p HashMap<u32, u32>,
    name: &'p str,
    out: String,
    indent: usize,
}

impl<'p, 'a> FunctionEmitter<'p, 'a> {
    pub fn new(proc: &'p Proc<'a>, frame: FrameLayout, strings: &'p HashMap<u32, u32>, name: &'p str) -> Self {
        Self {
            proc,
            frame,
            strings,
            name,
            out: String::new(),
            indent: 1,
        }
    }

    /// Emit the whole function and return its text.
    pub fn emit(mut self) -> CompileResult<String> {
        let proc = self.proc;
        self.prologue();
        for block in &proc.blocks {
            if block.index == EXIT_BLOCK {
                continue;
            }
            self.emit_label(&label(block.index));
            for &id in &block.insts {
                self.emit_inst(proc.inst(id))?;
            }
        }
        self.epilogue();
        Ok(self.out)
    }

    fn line(&mut self, text: &str) {
        for _ in 0..self.indent {
            self.out.push_str("  ");
        }
        self.out.push_str(text);
        self.out.push('\n');
    }

    fn emit_label(&mut self, name: &str) {
        let _ = writeln!(self.out, "{}:", name);
    }

    fn open(&mut self) {
        self.line("{");
        self.indent += 1;
    }

    fn close(&mut self) {
        self.indent -= 1;
        self.line("}");
    }

    fn raise(&mut self, code: &str) {
        self.line(&format!("error_code = {};", code));
        self.line("goto Lraise_error;");
    }

    /// `if (cond) { raise(code) }`.
    fn guard(&mut self, failed: &str, code: &str) {
        self.line(&format!("if ({}) {{", failed));
        self.indent += 1;
        self.raise(code);
        self.close();
    }

    fn prologue(&mut self) {
        let _ = writeln!(self.out, "int {}(ravel_State *L) {{", self.name);
        self.line("ravel_CallInfo *ci = L->ci;");
        self.line("ravel_Closure *cl = clvalue(ci->func);");
        self.line("TValue *k = cl->k;");
        self.line("StkId base = ci->func + 1;");
        self.line("int error_code = 0;");
        self.line("int nresults = 0;");
        let wrappers: Vec<String> = (0..WRAPPERS)
            .map(|d| format!("ival{}", d))
            .chain((0..WRAPPERS).map(|d| format!("fval{}", d)))
            .collect();
        self.line(&format!("TValue {};", wrappers.join(", ")));
        for i in 0..self.proc.max_temps(TempKind::Int) {
            self.line(&format!("ravel_int i_{} = 0;", i));
        }
        for i in 0..self.proc.max_temps(TempKind::Float) {
            self.line(&format!("ravel_num f_{} = 0.0;", i));
        }
        self.line("(void)k;");
        self.line("L->top = ci->top;");
    }

    fn epilogue(&mut self) {
        self.emit_label(&label(EXIT_BLOCK));
        self.line("return ravel_return(L, ci->func, nresults);");
        self.emit_label("Lraise_error");
        self.line("ravel_raise_error(L, error_code);");
        self.line("return 0;");
        self.out.push_str("}\n");
    }

    fn invalid(&self, reason: impl Into<String>) -> CompileError {
        CompileError::invalid_operand(self.proc.id.0, reason)
    }

    fn unexpected(&self, opcode: Opcode) -> CompileError {
        CompileError::UnexpectedOpcode {
            opcode: opcode.name(),
            stage: "code generation",
        }
    }

    fn operand(&self, inst: &Instruction<'a>, i: usize) -> CompileResult<Pseudo<'a>> {
        inst.operands
            .get(i)
            .copied()
            .ok_or_else(|| self.invalid(format!("{} is missing operand {}", inst.opcode, i)))
    }

    fn target(&self, inst: &Instruction<'a>, i: usize) -> CompileResult<Pseudo<'a>> {
        inst.targets
            .get(i)
            .copied()
            .ok_or_else(|| self.invalid(format!("{} is missing target {}", inst.opcode, i)))
    }

    fn block_target(&self, inst: &Instruction<'a>, i: usize) -> CompileResult<BlockId> {
        let target = self.target(inst, i)?;
        target
            .as_block()
            .ok_or_else(|| self.invalid(format!("{} target {} is not a block", inst.opcode, target)))
    }

    fn repr(&self, pseudo: Pseudo<'a>) -> CompileResult<Repr> {
        Ok(match pseudo {
            Pseudo::TempInt(_) => Repr::Int,
            Pseudo::TempFloat(_) => Repr::Float,
            Pseudo::Nil => Repr::Nil,
            Pseudo::True => Repr::Boolean(true),
            Pseudo::False => Repr::Boolean(false),
            Pseudo::Constant(_) => match self.proc.constant(pseudo) {
                Some(ConstantValue::Integer(_)) => Repr::Int,
                Some(ConstantValue::Number(_)) => Repr::Float,
                Some(ConstantValue::String(_)) => Repr::Tagged,
                None => return Err(self.invalid(format!("unknown constant {}", pseudo))),
            },
            Pseudo::Symbol(SymbolRef::Local { .. } | SymbolRef::Upvalue { .. })
            | Pseudo::TempAny(_)
            | Pseudo::Range { .. }
            | Pseudo::RangeSelect { .. } => Repr::Tagged,
            Pseudo::Symbol(SymbolRef::Global { .. }) | Pseudo::Proc(_) | Pseudo::Block(_) => {
                return Err(self.invalid(format!("{} is not a value", pseudo)))
            }
        })
    }

    /// Address of the TValue holding `pseudo`, if it has one.
    fn address(&self, pseudo: Pseudo<'a>) -> CompileResult<Option<String>> {
        if let Pseudo::Symbol(SymbolRef::Upvalue { index, .. }) = pseudo {
            return Ok(Some(format!("cl->upvals[{}]->v", index)));
        }
        if let Pseudo::Constant(index) = pseudo {
            if let Some(ConstantValue::String(_)) = self.proc.constant(pseudo) {
                let host = self
                    .strings
                    .get(&index)
                    .ok_or_else(|| self.invalid(format!("string constant {} was not interned", index)))?;
                return Ok(Some(format!("&k[{}]", host)));
            }
            return Ok(None);
        }
        Ok(self.frame.slot(&pseudo).map(|slot| format!("&base[{}]", slot)))
    }

    fn tagged_address(&self, pseudo: Pseudo<'a>) -> CompileResult<String> {
        self.address(pseudo)?
            .ok_or_else(|| self.invalid(format!("{} has no tagged storage", pseudo)))
    }

    /// Pointer to a TValue holding `pseudo`, filling wrapper `d` when the
    /// value has no storage of its own.
    fn tvalue(&mut self, pseudo: Pseudo<'a>, d: usize) -> CompileResult<String> {
        if let Some(address) = self.address(pseudo)? {
            return Ok(address);
        }
        let (wrapper, set) = match self.repr(pseudo)? {
            Repr::Int => (format!("&ival{}", d), format!("setivalue(&ival{}, {});", d, self.int_value(pseudo)?)),
            Repr::Float => (
                format!("&fval{}", d),
                format!("setfltvalue(&fval{}, {});", d, self.float_value(pseudo)?),
            ),
            Repr::Nil => (format!("&ival{}", d), format!("setnilvalue(&ival{});", d)),
            Repr::Boolean(b) => (format!("&ival{}", d), format!("setbvalue(&ival{}, {});", d, b as i32)),
            Repr::Tagged => return Err(self.invalid(format!("{} has no tagged storage", pseudo))),
        };
        self.line(&set);
        Ok(wrapper)
    }

    /// C expression of type ravel_int.
    fn int_value(&self, pseudo: Pseudo<'a>) -> CompileResult<String> {
        match pseudo {
            Pseudo::TempInt(r) => Ok(format!("i_{}", r)),
            Pseudo::Constant(_) => match self.proc.constant(pseudo) {
                Some(ConstantValue::Integer(n)) => Ok(c_int(n)),
                _ => Err(self.invalid(format!("{} is not an integer constant", pseudo))),
            },
            _ => match self.address(pseudo)? {
                Some(address) => Ok(format!("ivalue({})", address)),
                None => Err(self.invalid(format!("{} has no integer value", pseudo))),
            },
        }
    }

    /// C expression of type ravel_num; integers are converted.
    fn float_value(&self, pseudo: Pseudo<'a>) -> CompileResult<String> {
        match pseudo {
            Pseudo::TempFloat(r) => Ok(format!("f_{}", r)),
            Pseudo::TempInt(r) => Ok(format!("((ravel_num)i_{})", r)),
            Pseudo::Constant(_) => match self.proc.constant(pseudo) {
                Some(ConstantValue::Number(n)) => Ok(c_float(n)),
                Some(ConstantValue::Integer(n)) => Ok(c_float(n as f64)),
                _ => Err(self.invalid(format!("{} is not a numeric constant", pseudo))),
            },
            Pseudo::Symbol(SymbolRef::Local { ty: TypeTag::Integer, .. } | SymbolRef::Upvalue { ty: TypeTag::Integer, .. }) => {
                Ok(format!("((ravel_num){})", self.int_value(pseudo)?))
            }
            _ => match self.address(pseudo)? {
                Some(address) => Ok(format!("fltvalue({})", address)),
                None => Err(self.invalid(format!("{} has no float value", pseudo))),
            },
        }
    }

    fn store_int(&mut self, dest: Pseudo<'a>, value: &str) -> CompileResult<()> {
        match dest {
            Pseudo::TempInt(r) => self.line(&format!("i_{} = {};", r, value)),
            _ => {
                let address = self.tagged_address(dest)?;
                self.line(&format!("setivalue({}, {});", address, value));
            }
        }
        Ok(())
    }

    fn store_float(&mut self, dest: Pseudo<'a>, value: &str) -> CompileResult<()> {
        match dest {
            Pseudo::TempFloat(r) => self.line(&format!("f_{} = {};", r, value)),
            _ => {
                let address = self.tagged_address(dest)?;
                self.line(&format!("setfltvalue({}, {});", address, value));
            }
        }
        Ok(())
    }

    fn store_bool(&mut self, dest: Pseudo<'a>, value: &str) -> CompileResult<()> {
        let address = self.tagged_address(dest)?;
        self.line(&format!("setbvalue({}, {});", address, value));
        Ok(())
    }

    /// Write any value into the TValue at `dest`.
    fn store_tagged(&mut self, dest: &str, src: Pseudo<'a>) -> CompileResult<()> {
        let text = match self.repr(src)? {
            Repr::Int => format!("setivalue({}, {});", dest, self.int_value(src)?),
            Repr::Float => format!("setfltvalue({}, {});", dest, self.float_value(src)?),
            Repr::Nil => format!("setnilvalue({});", dest),
            Repr::Boolean(b) => format!("setbvalue({}, {});", dest, b as i32),
            Repr::Tagged => format!("setobj(L, {}, {});", dest, self.tagged_address(src)?),
        };
        self.line(&text);
        Ok(())
    }

    /// C condition that is true when `pseudo` is nil or false.
    fn falsy(&self, pseudo: Pseudo<'a>) -> CompileResult<String> {
        Ok(match self.repr(pseudo)? {
            Repr::Nil | Repr::Boolean(false) => "1".to_string(),
            Repr::Int | Repr::Float | Repr::Boolean(true) => "0".to_string(),
            Repr::Tagged => format!("l_isfalse({})", self.tagged_address(pseudo)?),
        })
    }

    fn emit_inst(&mut self, inst: &Instruction<'a>) -> CompileResult<()> {
        self.line(&format!("/* {} */", inst.opcode));
        match inst.opcode.info().family {
            OpFamily::Control => self.emit_control(inst),
            OpFamily::Move => self.emit_move(inst),
            OpFamily::Arith | OpFamily::Bitwise => self.emit_arith(inst),
            OpFamily::Compare => self.emit_compare(inst),
            OpFamily::Unary => self.emit_unary(inst),
            OpFamily::Cast => self.emit_cast(inst),
            OpFamily::Load => self.emit_load(inst),
            OpFamily::Store => self.emit_store(inst),
            OpFamily::Call => self.emit_call(inst),
            OpFamily::Closure => self.emit_closure(inst),
            OpFamily::Constructor => self.emit_constructor(inst),
        }
    }

    fn emit_control(&mut self, inst: &Instruction<'a>) -> CompileResult<()> {
        match inst.opcode {
            Opcode::Br => {
                let target = self.block_target(inst, 0)?;
                self.line(&format!("goto {};", label(target)));
            }
            Opcode::Cbr => {
                let cond = self.operand(inst, 0)?;
                let on_true = label(self.block_target(inst, 0)?);
                let on_false = label(self.block_target(inst, 1)?);
                match self.falsy(cond)?.as_str() {
                    "1" => self.line(&format!("goto {};", on_false)),
                    "0" => self.line(&format!("goto {};", on_true)),
                    test => {
                        let text = format!("if (!{}) goto {}; else goto {};", test, on_true, on_false);
                        self.line(&text);
                    }
                }
            }
            Opcode::Ret => self.emit_return(inst)?,
            other => return Err(self.unexpected(other)),
        }
        Ok(())
    }

    /// Split call arguments or return values into fixed values and an open tail.
    fn split_tail<'v>(values: &'v [Pseudo<'a>]) -> (&'v [Pseudo<'a>], Option<Pseudo<'a>>) {
        match values.split_last() {
            Some((last, fixed)) if last.is_open_range() => (fixed, Some(*last)),
            _ => (values, None),
        }
    }

    /// A range clamped to one value stands for its first element.
    fn single(value: Pseudo<'a>) -> Pseudo<'a> {
        match value {
            Pseudo::Range { base, count: 1 } => Pseudo::RangeSelect { base, index: 0 },
            other => other,
        }
    }

    fn emit_return(&mut self, inst: &Instruction<'a>) -> CompileResult<()> {
        let (fixed, tail) = Self::split_tail(&inst.operands);
        self.open();
        if !fixed.is_empty() {
            self.line(&format!("TValue rvals_[{}];", fixed.len()));
            for (i, &value) in fixed.iter().enumerate() {
                self.store_tagged(&format!("&rvals_[{}]", i), Self::single(value))?;
            }
        }
        if let Some(tail) = tail {
            let src = self.tail_slot(tail)?;
            self.line(&format!("int ntail_ = (int)(L->top - &base[{}]);", src));
            // results start at the function slot, one below base
            for text in window_copy(fixed.len() as i64 - 1, src as i64, "ntail_") {
                self.line(&text);
            }
        }
        for i in 0..fixed.len() {
            self.line(&format!("setobj(L, ci->func + {}, &rvals_[{}]);", i, i));
        }
        match tail {
            Some(_) => self.line(&format!("nresults = {} + ntail_;", fixed.len())),
            None => self.line(&format!("nresults = {};", fixed.len())),
        }
        self.line(&format!("goto {};", label(EXIT_BLOCK)));
        self.close();
        Ok(())
    }

    fn tail_slot(&self, tail: Pseudo<'a>) -> CompileResult<u32> {
        self.frame
            .slot(&tail)
            .ok_or_else(|| self.invalid(format!("{} is not a stack range", tail)))
    }

    fn emit_call(&mut self, inst: &Instruction<'a>) -> CompileResult<()> {
        let callee = self.operand(inst, 0)?;
        let func = match callee {
            Pseudo::TempAny(_) => self.tail_slot(callee)?,
            _ => return Err(self.invalid(format!("callee {} is not a generic temporary", callee))),
        };
        let expected = match self.proc.constant(self.target(inst, 1)?) {
            Some(ConstantValue::Integer(n)) => n,
            _ => return Err(self.invalid("call without an expected result count")),
        };
        let (fixed, tail) = Self::split_tail(&inst.operands[1..]);

        self.open();
        self.line(&format!("StkId func_ = &base[{}];", func));
        if let Some(tail) = tail {
            let src = self.tail_slot(tail)?;
            let dst = func as usize + 1 + fixed.len();
            self.line(&format!("int ntail_ = (int)(L->top - &base[{}]);", src));
            for text in window_copy(dst as i64, src as i64, "ntail_") {
                self.line(&text);
            }
        }
        for (i, &arg) in fixed.iter().enumerate().rev() {
            self.store_tagged(&format!("func_ + {}", i + 1), Self::single(arg))?;
        }
        let top = match tail {
            Some(_) => format!("L->top = func_ + {} + ntail_;", fixed.len() + 1),
            None => format!("L->top = func_ + {};", fixed.len() + 1),
        };
        self.line(&top);
        self.line(&format!("ravel_call(L, func_, {});", expected));
        self.line("base = ci->func + 1;");
        if expected >= 0 {
            self.line("L->top = ci->top;");
        }
        self.close();
        Ok(())
    }

    fn emit_closure(&mut self, inst: &Instruction<'a>) -> CompileResult<()> {
        let Pseudo::Proc(child) = self.operand(inst, 0)? else {
            return Err(self.invalid("closure operand is not a proc"));
        };
        let index = self
            .proc
            .child_index(child)
            .ok_or_else(|| self.invalid(format!("Proc%{} is not a child", child.0)))?;
        let dest = self.tagged_address(self.target(inst, 0)?)?;
        self.line(&format!("ravel_closure(L, cl, base, {}, {});", index, dest));
        Ok(())
    }

    fn emit_constructor(&mut self, inst: &Instruction<'a>) -> CompileResult<()> {
        let helper = match inst.opcode {
            Opcode::NewTable => "ravel_newtable",
            Opcode::NewIArray => "ravel_newiarray",
            Opcode::NewFArray => "ravel_newfarray",
            other => return Err(self.unexpected(other)),
        };
        let dest = self.tagged_address(self.target(inst, 0)?)?;
        self.line(&format!("{}(L, {});", helper, dest));
        Ok(())
    }

    fn emit_move(&mut self, inst: &Instruction<'a>) -> CompileResult<()> {
        let src = self.operand(inst, 0)?;
        let dest = self.target(inst, 0)?;
        match inst.opcode {
            Opcode::Mov => match dest {
                Pseudo::TempInt(_) => {
                    let value = self.int_value(src)?;
                    self.store_int(dest, &value)?;
                }
                Pseudo::TempFloat(_) => {
                    let value = self.float_value(src)?;
                    self.store_float(dest, &value)?;
                }
                _ => {
                    let address = self.tagged_address(dest)?;
                    self.store_tagged(&address, src)?;
                }
            },
            Opcode::MovI => {
                let value = self.int_value(src)?;
                self.store_int(dest, &value)?;
            }
            Opcode::MovF | Opcode::MovIF => {
                let value = self.float_value(src)?;
                self.store_float(dest, &value)?;
            }
            Opcode::MovFI => {
                let value = self.float_value(src)?;
                self.open();
                self.line("ravel_int n_;");
                self.guard(&format!("!ravel_flttointeger({}, &n_)", value), "RAVEL_ERR_INTEGER_EXPECTED");
                self.store_int(dest, "n_")?;
                self.close();
            }
            other => return Err(self.unexpected(other)),
        }
        Ok(())
    }

    fn emit_arith(&mut self, inst: &Instruction<'a>) -> CompileResult<()> {
        let a = self.operand(inst, 0)?;
        let b = self.operand(inst, 1)?;
        let dest = self.target(inst, 0)?;

        match inst.opcode {
            Opcode::AddII | Opcode::SubII | Opcode::MulII | Opcode::BAndII | Opcode::BOrII | Opcode::BXorII => {
                let op = match inst.opcode {
                    Opcode::AddII => "+",
                    Opcode::SubII => "-",
                    Opcode::MulII => "*",
                    Opcode::BAndII => "&",
                    Opcode::BOrII => "|",
                    _ => "^",
                };
                let value = format!("ravel_intop({}, {}, {})", op, self.int_value(a)?, self.int_value(b)?);
                self.store_int(dest, &value)
            }
            Opcode::ShlII => {
                let value = format!("ravel_shiftl({}, {})", self.int_value(a)?, self.int_value(b)?);
                self.store_int(dest, &value)
            }
            Opcode::ShrII => {
                let value = format!(
                    "ravel_shiftl({}, ravel_intop(-, 0, {}))",
                    self.int_value(a)?,
                    self.int_value(b)?
                );
                self.store_int(dest, &value)
            }
            Opcode::AddFF | Opcode::AddIF | Opcode::SubFF | Opcode::SubFI | Opcode::SubIF | Opcode::MulFF
            | Opcode::MulIF | Opcode::DivFF | Opcode::DivFI | Opcode::DivIF | Opcode::DivII => {
                let op = match inst.opcode {
                    Opcode::AddFF | Opcode::AddIF => "+",
                    Opcode::SubFF | Opcode::SubFI | Opcode::SubIF => "-",
                    Opcode::MulFF | Opcode::MulIF => "*",
                    _ => "/",
                };
                let value = format!("{} {} {}", self.float_value(a)?, op, self.float_value(b)?);
                self.store_float(dest, &value)
            }
            Opcode::Concat => {
                let dest = self.tagged_address(dest)?;
                let (x, y) = (self.tvalue(a, 0)?, self.tvalue(b, 1)?);
                self.line(&format!("ravel_concat(L, {}, {}, {});", dest, x, y));
                Ok(())
            }
            generic => {
                let op = match generic {
                    Opcode::Add => "RAVEL_OPADD",
                    Opcode::Sub => "RAVEL_OPSUB",
                    Opcode::Mul => "RAVEL_OPMUL",
                    Opcode::Div => "RAVEL_OPDIV",
                    Opcode::IDiv => "RAVEL_OPIDIV",
                    Opcode::Mod => "RAVEL_OPMOD",
                    Opcode::Pow => "RAVEL_OPPOW",
                    Opcode::BAnd => "RAVEL_OPBAND",
                    Opcode::BOr => "RAVEL_OPBOR",
                    Opcode::BXor => "RAVEL_OPBXOR",
                    Opcode::Shl => "RAVEL_OPSHL",
                    Opcode::Shr => "RAVEL_OPSHR",
                    other => return Err(self.unexpected(other)),
                };
                let dest = self.tagged_address(dest)?;
                let (x, y) = (self.tvalue(a, 0)?, self.tvalue(b, 1)?);
                self.line(&format!("ravel_arith(L, {}, {}, {}, {});", op, dest, x, y));
                Ok(())
            }
        }
    }

    fn emit_compare(&mut self, inst: &Instruction<'a>) -> CompileResult<()> {
        let a = self.operand(inst, 0)?;
        let b = self.operand(inst, 1)?;
        let dest = self.target(inst, 0)?;
        let value = match inst.opcode {
            Opcode::EqII | Opcode::LtII | Opcode::LeII => {
                let op = match inst.opcode {
                    Opcode::EqII => "==",
                    Opcode::LtII => "<",
                    _ => "<=",
                };
                format!("{} {} {}", self.int_value(a)?, op, self.int_value(b)?)
            }
            Opcode::EqFF | Opcode::LtFF | Opcode::LeFF => {
                let op = match inst.opcode {
                    Opcode::EqFF => "==",
                    Opcode::LtFF => "<",
                    _ => "<=",
                };
                format!("{} {} {}", self.float_value(a)?, op, self.float_value(b)?)
            }
            Opcode::Eq | Opcode::Lt | Opcode::Le => {
                let helper = match inst.opcode {
                    Opcode::Eq => "ravel_equal",
                    Opcode::Lt => "ravel_lessthan",
                    _ => "ravel_lessequal",
                };
                let (x, y) = (self.tvalue(a, 0)?, self.tvalue(b, 1)?);
                format!("{}(L, {}, {})", helper, x, y)
            }
            other => return Err(self.unexpected(other)),
        };
        self.store_bool(dest, &value)
    }

    fn emit_unary(&mut self, inst: &Instruction<'a>) -> CompileResult<()> {
        let a = self.operand(inst, 0)?;
        let dest = self.target(inst, 0)?;
        match inst.opcode {
            Opcode::UnmI => {
                let value = format!("ravel_intop(-, 0, {})", self.int_value(a)?);
                self.store_int(dest, &value)
            }
            Opcode::UnmF => {
                let value = format!("-{}", self.float_value(a)?);
                self.store_float(dest, &value)
            }
            Opcode::Not => {
                let value = self.falsy(a)?;
                self.store_bool(dest, &value)
            }
            Opcode::LenI => {
                let array = self.tagged_address(a)?;
                self.store_int(dest, &format!("ravel_arraylen({})", array))
            }
            Opcode::Len => {
                let dest = self.tagged_address(dest)?;
                let x = self.tvalue(a, 0)?;
                self.line(&format!("ravel_objlen(L, {}, {});", dest, x));
                Ok(())
            }
            Opcode::Unm | Opcode::BNot => {
                let op = if inst.opcode == Opcode::Unm { "RAVEL_OPUNM" } else { "RAVEL_OPBNOT" };
                let dest = self.tagged_address(dest)?;
                let x = self.tvalue(a, 0)?;
                self.line(&format!("ravel_arith(L, {}, {}, {}, {});", op, dest, x, x));
                Ok(())
            }
            other => Err(self.unexpected(other)),
        }
    }

    /// Type assertions. A value already held natively is converted statically;
    /// anything tagged is checked at run time, whatever its declared type.
    fn emit_cast(&mut self, inst: &Instruction<'a>) -> CompileResult<()> {
        let src = self.operand(inst, 0)?;
        let dest = self.target(inst, 0)?;
        let repr = self.repr(src)?;
        match inst.opcode {
            Opcode::ToInt => match repr {
                Repr::Int => {
                    let value = self.int_value(src)?;
                    self.store_int(dest, &value)
                }
                Repr::Float => {
                    let value = self.float_value(src)?;
                    self.open();
                    self.line("ravel_int n_;");
                    self.guard(&format!("!ravel_flttointeger({}, &n_)", value), "RAVEL_ERR_INTEGER_EXPECTED");
                    self.store_int(dest, "n_")?;
                    self.close();
                    Ok(())
                }
                Repr::Tagged => {
                    let address = self.tagged_address(src)?;
                    self.open();
                    self.line("ravel_int n_;");
                    self.guard(&format!("!ravel_tointeger({}, &n_)", address), "RAVEL_ERR_INTEGER_EXPECTED");
                    self.store_int(dest, "n_")?;
                    self.close();
                    Ok(())
                }
                Repr::Nil | Repr::Boolean(_) => {
                    self.raise("RAVEL_ERR_INTEGER_EXPECTED");
                    Ok(())
                }
            },
            Opcode::ToFlt => match repr {
                Repr::Int | Repr::Float => {
                    let value = self.float_value(src)?;
                    self.store_float(dest, &value)
                }
                Repr::Tagged => {
                    let address = self.tagged_address(src)?;
                    self.open();
                    self.line("ravel_num n_;");
                    self.guard(&format!("!ravel_tonumber({}, &n_)", address), "RAVEL_ERR_NUMBER_EXPECTED");
                    self.store_float(dest, "n_")?;
                    self.close();
                    Ok(())
                }
                Repr::Nil | Repr::Boolean(_) => {
                    self.raise("RAVEL_ERR_NUMBER_EXPECTED");
                    Ok(())
                }
            },
            other => {
                let (tag, code, nil_ok) = match other {
                    Opcode::ToIArray => ("RAVEL_TIARRAY", "RAVEL_ERR_INTEGER_ARRAY_EXPECTED", false),
                    Opcode::ToFArray => ("RAVEL_TFARRAY", "RAVEL_ERR_NUMBER_ARRAY_EXPECTED", false),
                    Opcode::ToTable => ("RAVEL_TTABLE", "RAVEL_ERR_TABLE_EXPECTED", false),
                    Opcode::ToString => ("RAVEL_TSTRING", "RAVEL_ERR_STRING_EXPECTED", true),
                    Opcode::ToClosure => ("RAVEL_TFUNCTION", "RAVEL_ERR_CLOSURE_EXPECTED", true),
                    _ => return Err(self.unexpected(other)),
                };
                let value = self.tvalue(src, 0)?;
                let failed = if nil_ok {
                    format!("!ttisnil({}) && ttype({}) != {}", value, value, tag)
                } else {
                    format!("ttype({}) != {}", value, tag)
                };
                self.guard(&failed, code);
                if !src.same_storage(&dest) {
                    let address = self.tagged_address(dest)?;
                    self.line(&format!("setobj(L, {}, {});", address, value));
                }
                Ok(())
            }
        }
    }

    fn string_key(&self, key: Pseudo<'a>) -> CompileResult<String> {
        match self.proc.constant(key) {
            Some(ConstantValue::String(_)) => self.tagged_address(key),
            _ => Err(self.invalid(format!("{} is not a string constant key", key))),
        }
    }

    fn emit_load(&mut self, inst: &Instruction<'a>) -> CompileResult<()> {
        let dest = self.target(inst, 0)?;
        if inst.opcode == Opcode::LoadGlobal {
            let name = self.string_key(self.operand(inst, 1)?)?;
            let dest = self.tagged_address(dest)?;
            self.line(&format!("ravel_getglobal(L, cl, {}, {});", name, dest));
            return Ok(());
        }

        let container = self.operand(inst, 0)?;
        let key = self.operand(inst, 1)?;
        match inst.opcode {
            Opcode::IArrayGet | Opcode::FArrayGet => {
                let (ty, helper) = if inst.opcode == Opcode::IArrayGet {
                    ("ravel_int", "ravel_iarray_get")
                } else {
                    ("ravel_num", "ravel_farray_get")
                };
                let array = self.tvalue(container, 0)?;
                let index = self.int_value(key)?;
                self.open();
                self.line(&format!("{} v_;", ty));
                self.guard(
                    &format!("!{}({}, {}, &v_)", helper, array, index),
                    "RAVEL_ERR_ARRAY_OUT_OF_BOUNDS",
                );
                if inst.opcode == Opcode::IArrayGet {
                    self.store_int(dest, "v_")?;
                } else {
                    self.store_float(dest, "v_")?;
                }
                self.close();
            }
            Opcode::Get | Opcode::TableGet => {
                let dest = self.tagged_address(dest)?;
                let (t, k) = (self.tvalue(container, 0)?, self.tvalue(key, 1)?);
                self.line(&format!("ravel_gettable(L, {}, {}, {});", t, k, dest));
            }
            Opcode::GetIK | Opcode::TableGetIK => {
                let dest = self.tagged_address(dest)?;
                let t = self.tvalue(container, 0)?;
                let k = self.int_value(key)?;
                self.line(&format!("ravel_geti(L, {}, {}, {});", t, k, dest));
            }
            Opcode::GetSK | Opcode::TableGetSK => {
                let dest = self.tagged_address(dest)?;
                let t = self.tvalue(container, 0)?;
                let k = self.string_key(key)?;
                self.line(&format!("ravel_getfield(L, {}, {}, {});", t, k, dest));
            }
            other => return Err(self.unexpected(other)),
        }
        Ok(())
    }

    fn emit_store(&mut self, inst: &Instruction<'a>) -> CompileResult<()> {
        if inst.opcode == Opcode::StoreGlobal {
            let name = self.string_key(self.operand(inst, 1)?)?;
            let value = self.tvalue(self.operand(inst, 2)?, 2)?;
            self.line(&format!("ravel_setglobal(L, cl, {}, {});", name, value));
            return Ok(());
        }

        let container = self.operand(inst, 0)?;
        let key = self.operand(inst, 1)?;
        let value = self.operand(inst, 2)?;
        match inst.opcode {
            Opcode::IArraySet => {
                let array = self.tvalue(container, 0)?;
                let index = self.int_value(key)?;
                self.open();
                self.line("ravel_int v_;");
                match self.repr(value)? {
                    Repr::Int => {
                        let v = self.int_value(value)?;
                        self.line(&format!("v_ = {};", v));
                    }
                    Repr::Float => {
                        let v = self.float_value(value)?;
                        self.guard(&format!("!ravel_flttointeger({}, &v_)", v), "RAVEL_ERR_INTEGER_EXPECTED");
                    }
                    Repr::Tagged => {
                        let v = self.tagged_address(value)?;
                        self.guard(&format!("!ttisinteger({})", v), "RAVEL_ERR_INTEGER_EXPECTED");
                        self.line(&format!("v_ = ivalue({});", v));
                    }
                    Repr::Nil | Repr::Boolean(_) => self.raise("RAVEL_ERR_INTEGER_EXPECTED"),
                }
                self.guard(
                    &format!("!ravel_iarray_set(L, {}, {}, v_)", array, index),
                    "RAVEL_ERR_ARRAY_OUT_OF_BOUNDS",
                );
                self.close();
            }
            Opcode::FArraySet => {
                let array = self.tvalue(container, 0)?;
                let index = self.int_value(key)?;
                self.open();
                self.line("ravel_num v_;");
                match self.repr(value)? {
                    Repr::Int | Repr::Float => {
                        let v = self.float_value(value)?;
                        self.line(&format!("v_ = {};", v));
                    }
                    Repr::Tagged => {
                        let v = self.tagged_address(value)?;
                        self.line(&format!("if (ttisfloat({})) v_ = fltvalue({});", v, v));
                        self.line(&format!("else if (ttisinteger({})) v_ = (ravel_num)ivalue({});", v, v));
                        self.line("else {");
                        self.indent += 1;
                        self.raise("RAVEL_ERR_NUMBER_EXPECTED");
                        self.close();
                    }
                    Repr::Nil | Repr::Boolean(_) => self.raise("RAVEL_ERR_NUMBER_EXPECTED"),
                }
                self.guard(
                    &format!("!ravel_farray_set(L, {}, {}, v_)", array, index),
                    "RAVEL_ERR_ARRAY_OUT_OF_BOUNDS",
                );
                self.close();
            }
            Opcode::Put | Opcode::TableSet => {
                let (t, k, v) = (self.tvalue(container, 0)?, self.tvalue(key, 1)?, self.tvalue(value, 2)?);
                self.line(&format!("ravel_settable(L, {}, {}, {});", t, k, v));
            }
            Opcode::PutIK | Opcode::TableSetIK => {
                let t = self.tvalue(container, 0)?;
                let k = self.int_value(key)?;
                let v = self.tvalue(value, 2)?;
                self.line(&format!("ravel_seti(L, {}, {}, {});", t, k, v));
            }
            Opcode::PutSK | Opcode::TableSetSK => {
                let t = self.tvalue(container, 0)?;
                let k = self.string_key(key)?;
                let v = self.tvalue(value, 2)?;
                self.line(&format!("ravel_setfield(L, {}, {}, {});", t, k, v));
            }
            other => return Err(self.unexpected(other)),
        }
        Ok(())
    }
}
