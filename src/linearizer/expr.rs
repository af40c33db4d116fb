//! Expression lowering.

use super::ops::{self, KeyClass, OperandClass};
use super::{AssignTarget, Assignable, ExprValue, Linearizer};
use crate::ast::{BinaryOp, Expr, ExprKind, SymbolId, SymbolKind, TableItem, UnaryOp, VarType};
use crate::core::{CompileError, CompileResult};
use crate::ir::{ConstantValue, InstId, Opcode, Pseudo, SymbolRef, TempKind, TypeTag};

impl<'s, 'a> Linearizer<'s, 'a> {
    /// Lower `expr` where exactly one value is used.
    pub(super) fn linearize_expr(&mut self, expr: &Expr) -> CompileResult<Pseudo<'a>> {
        let value = self.linearize_expr_value(expr)?;
        Ok(self.single_value(value))
    }

    /// Narrow a call result to its first value.
    pub(super) fn single_value(&mut self, value: ExprValue<'a>) -> Pseudo<'a> {
        match (value.call, value.pseudo) {
            (Some(call), Pseudo::Range { base, .. }) => {
                self.set_expected_results(call, 1);
                Pseudo::RangeSelect { base, index: 0 }
            }
            _ => value.pseudo,
        }
    }

    /// Lower `expr`, leaving a call's result count open for the consumer.
    pub(super) fn linearize_expr_value(&mut self, expr: &Expr) -> CompileResult<ExprValue<'a>> {
        let pseudo = match &expr.kind {
            ExprKind::Nil => Pseudo::Nil,
            ExprKind::True => Pseudo::True,
            ExprKind::False => Pseudo::False,
            ExprKind::Integer(i) => self.int_constant(*i),
            ExprKind::Number(n) => self.constant(ConstantValue::Number(*n)),
            ExprKind::String(s) => self.string_constant(s),
            ExprKind::Vararg => return Err(CompileError::unimplemented("vararg expression '...'")),
            ExprKind::Symbol(id) => self.linearize_symbol(*id)?,
            ExprKind::Index { object, key } => self.linearize_index(object, key)?,
            ExprKind::Call { callee, args } => return self.linearize_call(callee, None, args),
            ExprKind::MethodCall {
                object,
                method,
                args,
            } => return self.linearize_call(object, Some(method), args),
            ExprKind::Unary { op, operand } => self.linearize_unary(*op, operand)?,
            ExprKind::Binary { op, lhs, rhs } => self.linearize_binary(*op, lhs, rhs)?,
            ExprKind::Function(func) => {
                let parent = self.ctx.proc;
                let child = self.linearize_function(func, Some(parent))?;
                let target = self.proc().alloc_temp(TempKind::Any);
                self.emit(Opcode::Closure, vec![Pseudo::Proc(child)], vec![target]);
                target
            }
            ExprKind::Table(items) => self.linearize_table(&expr.ty, items)?,
        };
        Ok(ExprValue::plain(pseudo))
    }

    fn linearize_symbol(&mut self, id: SymbolId) -> CompileResult<Pseudo<'a>> {
        let symbol = self.symbol(id)?;
        let name = self.session.intern_str(&symbol.name);
        let ty = TypeTag::from(&symbol.ty);
        match symbol.kind {
            SymbolKind::Local { .. } => match self.lookup_local(id) {
                Some(reg) => Ok(Pseudo::Symbol(SymbolRef::Local { name, reg, ty })),
                None => Err(self.error(format!("local '{}' is not in scope", name))),
            },
            SymbolKind::Upvalue { index, .. } => Ok(Pseudo::Symbol(SymbolRef::Upvalue { name, index, ty })),
            SymbolKind::Global => Ok(self.emit_load_global(name).0),
        }
    }

    fn emit_load_global(&mut self, name: &'a str) -> (Pseudo<'a>, InstId) {
        let key = self.constant(ConstantValue::String(name));
        let target = self.proc().alloc_temp(TempKind::Any);
        let inst = self.emit(
            Opcode::LoadGlobal,
            vec![Pseudo::Symbol(SymbolRef::Global { name }), key],
            vec![target],
        );
        (target, inst)
    }

    fn key_class(&self, key: Pseudo<'a>, ty: &VarType) -> KeyClass {
        match self.proc_ref().constant(key) {
            Some(ConstantValue::String(_)) => KeyClass::StringConstant,
            Some(ConstantValue::Integer(_)) => KeyClass::Int,
            _ if ty.is_integer() => KeyClass::Int,
            _ => KeyClass::Other,
        }
    }

    fn linearize_index(&mut self, object: &Expr, key: &Expr) -> CompileResult<Pseudo<'a>> {
        let container = self.linearize_expr(object)?;
        let index = self.linearize_expr(key)?;
        let spec = ops::specialize_load(&object.ty, self.key_class(index, &key.ty));
        self.free(index);
        self.free(container);
        let target = self.proc().alloc_temp(spec.result);
        self.emit(spec.opcode, vec![container, index], vec![target]);
        Ok(target)
    }

    /// Lower the left-hand side of an assignment. Indexed targets and globals
    /// still emit their load; the assignment rewrites it later.
    pub(super) fn linearize_target(&mut self, expr: &Expr) -> CompileResult<AssignTarget<'a>> {
        match &expr.kind {
            ExprKind::Symbol(id) => {
                let symbol = self.symbol(*id)?;
                if let SymbolKind::Global = symbol.kind {
                    let name = self.session.intern_str(&symbol.name);
                    let (discarded, inst) = self.emit_load_global(name);
                    return Ok(AssignTarget::Indexed(Assignable {
                        inst,
                        discarded,
                        held: Vec::new(),
                    }));
                }
                Ok(AssignTarget::Variable(self.linearize_symbol(*id)?))
            }
            ExprKind::Index { object, key } => {
                let container = self.linearize_expr(object)?;
                let index = self.linearize_expr(key)?;
                let spec = ops::specialize_load(&object.ty, self.key_class(index, &key.ty));
                let discarded = self.proc().alloc_temp(spec.result);
                let inst = self.emit(spec.opcode, vec![container, index], vec![discarded]);
                Ok(AssignTarget::Indexed(Assignable {
                    inst,
                    discarded,
                    held: vec![container, index],
                }))
            }
            _ => Err(self.error("expression cannot be assigned to")),
        }
    }

    /// Turn the load named by `target` into the matching store of `value`,
    /// moved to the end of the current block so it runs after the right-hand side.
    pub(super) fn rewrite_as_store(&mut self, target: &Assignable<'a>, value: Pseudo<'a>) -> CompileResult<()> {
        self.ensure_open_block();
        let block = self.ctx.block;
        let proc = self.proc();
        let inst = proc.inst_mut(target.inst);
        let Some(store) = inst.opcode.store_counterpart() else {
            return Err(CompileError::UnexpectedOpcode {
                opcode: inst.opcode.name(),
                stage: "assignment",
            });
        };
        log::trace!("rewriting {} into {}", inst.opcode, store);
        inst.opcode = store;
        inst.targets.clear();
        inst.operands.push(value);
        proc.relocate(target.inst, block);
        self.session.record_load_rewritten();
        Ok(())
    }

    /// Release what an assignment target kept alive, newest first.
    pub(super) fn release_target(&mut self, target: AssignTarget<'a>) {
        if let AssignTarget::Indexed(assignable) = target {
            self.free(assignable.discarded);
            for held in assignable.held.into_iter().rev() {
                self.free(held);
            }
        }
    }

    /// Lower a call. With `method`, `callee` is the receiver: the method is
    /// looked up on it and it is passed as the first argument.
    pub(super) fn linearize_call(
        &mut self,
        callee: &Expr,
        method: Option<&str>,
        args: &[Expr],
    ) -> CompileResult<ExprValue<'a>> {
        let mut operands = Vec::with_capacity(args.len() + 2);
        let mut owned = Vec::new();

        let function = match method {
            Some(name) => {
                // The receiver moves into the first argument slot above the
                // callee, so nothing below the call's results stays free.
                let value = self.linearize_expr(callee)?;
                self.free(value);
                let function = self.proc().alloc_temp(TempKind::Any);
                let receiver = self.proc().alloc_temp(TempKind::Any);
                self.emit_move(value, TypeTag::from(&callee.ty), receiver);
                let key = self.string_constant(name);
                let lookup = match callee.ty {
                    VarType::Table => Opcode::TableGetSK,
                    _ => Opcode::GetSK,
                };
                self.emit(lookup, vec![receiver, key], vec![function]);
                operands.push(function);
                operands.push(receiver);
                owned.push(receiver);
                function
            }
            None => {
                let value = self.linearize_expr(callee)?;
                let function = match value {
                    Pseudo::TempAny(_) => value,
                    _ => {
                        self.free(value);
                        let function = self.proc().alloc_temp(TempKind::Any);
                        self.emit_move(value, TypeTag::Any, function);
                        function
                    }
                };
                operands.push(function);
                function
            }
        };
        let Pseudo::TempAny(base) = function else {
            return Err(self.error("callee register is not a generic temporary"));
        };

        for (i, arg) in args.iter().enumerate() {
            let value = self.linearize_expr_value(arg)?;
            let operand = match (value.call, value.pseudo) {
                (Some(call), Pseudo::Range { base: tail, .. }) if i + 1 < args.len() => {
                    self.set_expected_results(call, 1);
                    Pseudo::Range { base: tail, count: 1 }
                }
                _ => value.pseudo,
            };
            operands.push(operand);
            owned.push(value.pseudo);
        }

        let expected = self.int_constant(-1);
        let result = Pseudo::Range { base, count: -1 };
        let inst = self.emit(Opcode::Call, operands, vec![result, expected]);
        for pseudo in owned.into_iter().rev() {
            self.free(pseudo);
        }
        Ok(ExprValue {
            pseudo: result,
            call: Some(inst),
        })
    }

    fn linearize_unary(&mut self, op: UnaryOp, operand: &Expr) -> CompileResult<Pseudo<'a>> {
        let value = self.linearize_expr(operand)?;
        let spec = ops::specialize_unary(op, &operand.ty);
        self.free(value);
        let target = self.proc().alloc_temp(spec.result);
        self.emit(spec.opcode, vec![value], vec![target]);
        Ok(target)
    }

    fn linearize_binary(&mut self, op: BinaryOp, lhs: &Expr, rhs: &Expr) -> CompileResult<Pseudo<'a>> {
        if matches!(op, BinaryOp::And | BinaryOp::Or) {
            return self.linearize_logical(op, lhs, rhs);
        }

        let a = self.linearize_expr(lhs)?;
        let b = self.linearize_expr(rhs)?;
        let (class_a, class_b) = (OperandClass::of(&lhs.ty), OperandClass::of(&rhs.ty));
        let canonical = ops::canonicalize(op, class_a, class_b);
        let (x, y, class_x, class_y) = if canonical.swap {
            (b, a, class_b, class_a)
        } else {
            (a, b, class_a, class_b)
        };
        let spec = ops::specialize_binary(canonical.op, class_x, class_y)
            .ok_or_else(|| self.error(format!("no opcode for operator {:?}", canonical.op)))?;

        self.free(b);
        self.free(a);
        let target = self.proc().alloc_temp(spec.result);
        self.emit(spec.opcode, vec![x, y], vec![target]);

        if canonical.negate {
            self.free(target);
            let negated = self.proc().alloc_temp(TempKind::Any);
            self.emit(Opcode::Not, vec![target], vec![negated]);
            return Ok(negated);
        }
        Ok(target)
    }

    /// `and`/`or` as control flow: the left value lands in the result temp and
    /// the right operand is only evaluated on the branch that needs it.
    fn linearize_logical(&mut self, op: BinaryOp, lhs: &Expr, rhs: &Expr) -> CompileResult<Pseudo<'a>> {
        let left = self.linearize_expr(lhs)?;
        self.free(left);
        let result = self.proc().alloc_temp(TempKind::Any);
        self.emit_move(left, TypeTag::Any, result);

        let rhs_block = self.new_block();
        let end_block = self.new_block();
        let (on_true, on_false) = match op {
            BinaryOp::And => (rhs_block, end_block),
            _ => (end_block, rhs_block),
        };
        self.emit(
            Opcode::Cbr,
            vec![result],
            vec![Pseudo::Block(on_true), Pseudo::Block(on_false)],
        );

        self.start_block(rhs_block);
        let right = self.linearize_expr(rhs)?;
        self.free(right);
        self.emit_move(right, TypeTag::Any, result);
        self.start_block(end_block);
        Ok(result)
    }

    fn linearize_table(&mut self, ty: &VarType, items: &[TableItem]) -> CompileResult<Pseudo<'a>> {
        let (constructor, positional_store) = match ty {
            VarType::IntegerArray => (Opcode::NewIArray, Opcode::IArraySet),
            VarType::NumberArray => (Opcode::NewFArray, Opcode::FArraySet),
            _ => (Opcode::NewTable, Opcode::TableSetIK),
        };
        let table = self.proc().alloc_temp(TempKind::Any);
        self.emit(constructor, Vec::new(), vec![table]);

        let mut position = 1;
        for item in items {
            let (store, key, value) = match item {
                TableItem::Positional(value) => {
                    let key = self.int_constant(position);
                    position += 1;
                    (positional_store, key, self.linearize_expr(value)?)
                }
                TableItem::Named(name, value) => {
                    if constructor != Opcode::NewTable {
                        return Err(self.error(format!("array constructor cannot set field '{}'", name)));
                    }
                    let key = self.string_constant(name);
                    (Opcode::TableSetSK, key, self.linearize_expr(value)?)
                }
                TableItem::Keyed(key_expr, value) => {
                    let key = self.linearize_expr(key_expr)?;
                    let store = match (constructor, self.key_class(key, &key_expr.ty)) {
                        (Opcode::NewTable, KeyClass::StringConstant) => Opcode::TableSetSK,
                        (Opcode::NewTable, KeyClass::Int) => Opcode::TableSetIK,
                        (Opcode::NewTable, KeyClass::Other) => Opcode::TableSet,
                        _ => positional_store,
                    };
                    (store, key, self.linearize_expr(value)?)
                }
            };
            self.emit(store, vec![table, key, value], Vec::new());
            self.free(value);
            self.free(key);
        }
        Ok(table)
    }
}
