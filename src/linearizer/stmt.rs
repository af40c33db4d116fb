//! Statement lowering.

use super::{AssignTarget, Linearizer};
use crate::ast::{Block, Expr, ExprKind, FunctionExpr, IfClause, Stmt, SymbolId};
use crate::core::{CompileError, CompileResult};
use crate::ir::{ConstantValue, Opcode, Pseudo, SymbolRef, TempKind, TypeTag, EXIT_BLOCK};

/// Values of an expression list, plus the temporaries to release afterwards.
struct ValueList<'a> {
    values: Vec<(Pseudo<'a>, TypeTag)>,
    owned: Vec<Pseudo<'a>>,
}

impl<'s, 'a> Linearizer<'s, 'a> {
    pub(super) fn linearize_stmts(&mut self, stmts: &[Stmt]) -> CompileResult<()> {
        for (i, stmt) in stmts.iter().enumerate() {
            if self.current_terminated() {
                log::warn!(
                    "proc {}: skipping {} unreachable statement(s)",
                    self.ctx.proc.0,
                    stmts.len() - i
                );
                break;
            }
            self.linearize_stmt(stmt)?;
        }
        Ok(())
    }

    fn linearize_block(&mut self, block: &Block) -> CompileResult<()> {
        self.open_scope();
        self.linearize_stmts(&block.stmts)?;
        self.close_scope();
        Ok(())
    }

    fn linearize_stmt(&mut self, stmt: &Stmt) -> CompileResult<()> {
        match stmt {
            Stmt::Local { vars, exprs } => self.linearize_local(vars, exprs),
            Stmt::LocalFunction { var, func } => self.linearize_local_function(*var, func),
            Stmt::Assign { targets, exprs } => self.linearize_assign(targets, exprs),
            Stmt::Expr(expr) => self.linearize_expr_stmt(expr),
            Stmt::Return(exprs) => self.linearize_return(exprs),
            Stmt::Do(block) => self.linearize_block(block),
            Stmt::If {
                clauses,
                else_block,
            } => self.linearize_if(clauses, else_block.as_ref()),
            Stmt::While { cond, body } => self.linearize_while(cond, body),
            Stmt::Repeat { body, cond } => self.linearize_repeat(body, cond),
            Stmt::NumericFor {
                var,
                start,
                limit,
                step,
                body,
            } => self.linearize_numeric_for(*var, start, limit, step.as_ref(), body),
            Stmt::GenericFor { .. } => Err(CompileError::unimplemented("generic for loop")),
            Stmt::Break => {
                let Some(&exit) = self.ctx.loop_exits.last() else {
                    return Err(self.error("break outside of a loop"));
                };
                self.emit(Opcode::Br, Vec::new(), vec![Pseudo::Block(exit)]);
                Ok(())
            }
            Stmt::Goto(label) => Err(CompileError::unimplemented(format!("goto {}", label))),
            Stmt::Label(label) => Err(CompileError::unimplemented(format!("label ::{}::", label))),
        }
    }

    /// Evaluate `exprs` for `wanted` destinations. A trailing call fills the
    /// remaining destinations; expressions beyond `wanted` are evaluated and dropped.
    fn linearize_expr_list(&mut self, exprs: &[Expr], wanted: usize) -> CompileResult<ValueList<'a>> {
        let mut list = ValueList {
            values: Vec::with_capacity(wanted),
            owned: Vec::new(),
        };
        for (i, expr) in exprs.iter().enumerate() {
            let value = self.linearize_expr_value(expr)?;
            if i >= wanted {
                if let Some(call) = value.call {
                    self.set_expected_results(call, 0);
                }
                list.owned.push(value.pseudo);
                continue;
            }
            let last = i + 1 == exprs.len();
            match (value.call, value.pseudo) {
                (Some(call), Pseudo::Range { base, .. }) if last && wanted > i + 1 => {
                    let count = wanted - i;
                    self.set_expected_results(call, count as i64);
                    list.owned.push(value.pseudo);
                    for index in 0..count as u32 {
                        list.values.push((Pseudo::RangeSelect { base, index }, TypeTag::Any));
                        // results past the first stay claimed until released
                        if index > 0 {
                            let held = self.proc().reserve_temp(base + index);
                            list.owned.push(held);
                        }
                    }
                }
                _ => {
                    let pseudo = self.single_value(value);
                    let tag = self.value_tag(pseudo, TypeTag::from(&expr.ty));
                    list.values.push((pseudo, tag));
                    list.owned.push(pseudo);
                }
            }
        }
        Ok(list)
    }

    fn release_values(&mut self, list: ValueList<'a>) {
        for pseudo in list.owned.into_iter().rev() {
            self.free(pseudo);
        }
    }

    /// Value a declared local starts with when no expression supplies one.
    fn default_value(&mut self, local: Pseudo<'a>) -> (Pseudo<'a>, TypeTag) {
        match local {
            Pseudo::Symbol(SymbolRef::Local { ty: TypeTag::Integer, .. }) => {
                (self.int_constant(0), TypeTag::Integer)
            }
            Pseudo::Symbol(SymbolRef::Local { ty: TypeTag::Number, .. }) => {
                (self.constant(ConstantValue::Number(0.0)), TypeTag::Number)
            }
            _ => (Pseudo::Nil, TypeTag::Nil),
        }
    }

    fn linearize_local(&mut self, vars: &[SymbolId], exprs: &[Expr]) -> CompileResult<()> {
        let list = self.linearize_expr_list(exprs, vars.len())?;

        let mut locals = Vec::with_capacity(vars.len());
        for &var in vars {
            locals.push(self.declare_local(var)?);
        }
        for (i, &local) in locals.iter().enumerate() {
            let (value, tag) = match list.values.get(i) {
                Some(&v) => v,
                None => self.default_value(local),
            };
            self.emit_move(value, tag, local);
        }
        self.release_values(list);
        Ok(())
    }

    fn linearize_local_function(&mut self, var: SymbolId, func: &FunctionExpr) -> CompileResult<()> {
        let local = self.declare_local(var)?;
        let parent = self.ctx.proc;
        let child = self.linearize_function(func, Some(parent))?;
        let closure = self.proc().alloc_temp(TempKind::Any);
        self.emit(Opcode::Closure, vec![Pseudo::Proc(child)], vec![closure]);
        self.free(closure);
        self.emit_move(closure, TypeTag::Closure, local);
        Ok(())
    }

    fn linearize_assign(&mut self, targets: &[Expr], exprs: &[Expr]) -> CompileResult<()> {
        let mut lhs = Vec::with_capacity(targets.len());
        for target in targets {
            lhs.push(self.linearize_target(target)?);
        }
        let mut list = self.linearize_expr_list(exprs, targets.len())?;

        // Variables read on the right must keep their old value until every
        // target has been written.
        if targets.len() > 1 {
            for entry in list.values.iter_mut() {
                let (value, tag) = *entry;
                if let Pseudo::Symbol(SymbolRef::Local { .. } | SymbolRef::Upvalue { .. }) = value {
                    let kind = match tag {
                        TypeTag::Integer => TempKind::Int,
                        TypeTag::Number => TempKind::Float,
                        _ => TempKind::Any,
                    };
                    let copy = self.proc().alloc_temp(kind);
                    self.emit_move(value, tag, copy);
                    list.owned.push(copy);
                    *entry = (copy, tag);
                }
            }
        }

        for (i, target) in lhs.iter().enumerate().rev() {
            let (value, tag) = list.values.get(i).copied().unwrap_or((Pseudo::Nil, TypeTag::Nil));
            match target {
                AssignTarget::Variable(dest) => self.emit_move(value, tag, *dest),
                AssignTarget::Indexed(assignable) => self.rewrite_as_store(assignable, value)?,
            }
        }

        self.release_values(list);
        for target in lhs.into_iter().rev() {
            self.release_target(target);
        }
        Ok(())
    }

    fn linearize_expr_stmt(&mut self, expr: &Expr) -> CompileResult<()> {
        let value = self.linearize_expr_value(expr)?;
        match value.call {
            Some(call) => self.set_expected_results(call, 0),
            None => log::debug!("proc {}: expression statement has no effect", self.ctx.proc.0),
        }
        self.free(value.pseudo);
        Ok(())
    }

    fn linearize_return(&mut self, exprs: &[Expr]) -> CompileResult<()> {
        let mut operands = Vec::with_capacity(exprs.len());
        for (i, expr) in exprs.iter().enumerate() {
            let pseudo = if i + 1 == exprs.len() {
                self.linearize_expr_value(expr)?.pseudo
            } else {
                self.linearize_expr(expr)?
            };
            operands.push(pseudo);
        }
        self.emit(Opcode::Ret, operands.clone(), vec![Pseudo::Block(EXIT_BLOCK)]);
        for pseudo in operands.into_iter().rev() {
            self.free(pseudo);
        }
        Ok(())
    }

    fn linearize_if(&mut self, clauses: &[IfClause], else_block: Option<&Block>) -> CompileResult<()> {
        let end = self.new_block();
        let then_blocks: Vec<_> = clauses.iter().map(|_| self.new_block()).collect();
        let test_blocks: Vec<_> = clauses.iter().skip(1).map(|_| self.new_block()).collect();
        let else_target = else_block.map(|_| self.new_block());

        for (i, clause) in clauses.iter().enumerate() {
            if i > 0 {
                self.start_block(test_blocks[i - 1]);
            }
            let cond = self.linearize_expr(&clause.cond)?;
            let on_false = match test_blocks.get(i) {
                Some(&next) => next,
                None => else_target.unwrap_or(end),
            };
            self.free(cond);
            self.emit(
                Opcode::Cbr,
                vec![cond],
                vec![Pseudo::Block(then_blocks[i]), Pseudo::Block(on_false)],
            );
            self.start_block(then_blocks[i]);
            self.linearize_block(&clause.body)?;
            self.branch_to(end);
        }

        if let (Some(block), Some(target)) = (else_block, else_target) {
            self.start_block(target);
            self.linearize_block(block)?;
            self.branch_to(end);
        }
        self.start_block(end);
        Ok(())
    }

    fn linearize_while(&mut self, cond: &Expr, body: &Block) -> CompileResult<()> {
        let cond_block = self.new_block();
        let body_block = self.new_block();
        let end = self.new_block();

        self.start_block(cond_block);
        let value = self.linearize_expr(cond)?;
        self.free(value);
        self.emit(
            Opcode::Cbr,
            vec![value],
            vec![Pseudo::Block(body_block), Pseudo::Block(end)],
        );

        self.start_block(body_block);
        self.ctx.loop_exits.push(end);
        self.linearize_block(body)?;
        self.ctx.loop_exits.pop();
        self.branch_to(cond_block);

        self.start_block(end);
        Ok(())
    }

    /// The condition is evaluated inside the body's scope.
    fn linearize_repeat(&mut self, body: &Block, cond: &Expr) -> CompileResult<()> {
        let body_block = self.new_block();
        let end = self.new_block();

        self.start_block(body_block);
        self.ctx.loop_exits.push(end);
        self.open_scope();
        self.linearize_stmts(&body.stmts)?;
        let value = self.linearize_expr(cond)?;
        self.free(value);
        self.emit(
            Opcode::Cbr,
            vec![value],
            vec![Pseudo::Block(end), Pseudo::Block(body_block)],
        );
        self.close_scope();
        self.ctx.loop_exits.pop();

        self.start_block(end);
        Ok(())
    }

    fn linearize_numeric_for(
        &mut self,
        var: SymbolId,
        start: &Expr,
        limit: &Expr,
        step: Option<&Expr>,
        body: &Block,
    ) -> CompileResult<()> {
        let constant_step = match step {
            None => Some(1),
            Some(Expr {
                kind: ExprKind::Integer(n),
                ..
            }) => Some(*n),
            Some(_) => None,
        };
        match constant_step {
            Some(step) if start.ty.is_integer() && limit.ty.is_integer() => {
                self.linearize_integer_for(var, start, limit, step, body)
            }
            _ => self.linearize_generic_for(var, start, limit, step, body),
        }
    }

    /// Integer loop with a compile-time step: the index lives in a native int.
    fn linearize_integer_for(
        &mut self,
        var: SymbolId,
        start: &Expr,
        limit: &Expr,
        step: i64,
        body: &Block,
    ) -> CompileResult<()> {
        let first = self.linearize_expr(start)?;
        let last = self.linearize_expr(limit)?;
        let index = self.proc().alloc_temp(TempKind::Int);
        let bound = self.proc().alloc_temp(TempKind::Int);
        self.emit_move(first, TypeTag::Integer, index);
        self.emit_move(last, TypeTag::Integer, bound);
        self.free(last);
        self.free(first);
        let step_value = self.int_constant(step);

        let test_block = self.new_block();
        let body_block = self.new_block();
        let end = self.new_block();

        self.start_block(test_block);
        let in_range = self.proc().alloc_temp(TempKind::Any);
        let operands = if step >= 0 {
            vec![index, bound]
        } else {
            vec![bound, index]
        };
        self.emit(Opcode::LeII, operands, vec![in_range]);
        self.free(in_range);
        self.emit(
            Opcode::Cbr,
            vec![in_range],
            vec![Pseudo::Block(body_block), Pseudo::Block(end)],
        );

        self.start_block(body_block);
        self.linearize_loop_body(var, index, TypeTag::Integer, body, end)?;
        if !self.current_terminated() {
            self.emit(Opcode::AddII, vec![index, step_value], vec![index]);
            self.emit(Opcode::Br, Vec::new(), vec![Pseudo::Block(test_block)]);
        }

        self.start_block(end);
        self.free(bound);
        self.free(index);
        Ok(())
    }

    /// Loop whose step sign is only known at run time.
    fn linearize_generic_for(
        &mut self,
        var: SymbolId,
        start: &Expr,
        limit: &Expr,
        step: Option<&Expr>,
        body: &Block,
    ) -> CompileResult<()> {
        let first = self.linearize_expr(start)?;
        let last = self.linearize_expr(limit)?;
        let (increment, increment_ty) = match step {
            Some(expr) => (self.linearize_expr(expr)?, TypeTag::from(&expr.ty)),
            None => (self.int_constant(1), TypeTag::Integer),
        };
        let index = self.proc().alloc_temp(TempKind::Any);
        let bound = self.proc().alloc_temp(TempKind::Any);
        let stride = self.proc().alloc_temp(TempKind::Any);
        self.emit_move(first, TypeTag::from(&start.ty), index);
        self.emit_move(last, TypeTag::from(&limit.ty), bound);
        self.emit_move(increment, increment_ty, stride);
        self.free(increment);
        self.free(last);
        self.free(first);
        let zero = self.int_constant(0);

        let test_block = self.new_block();
        let ascending = self.new_block();
        let descending = self.new_block();
        let body_block = self.new_block();
        let end = self.new_block();

        self.start_block(test_block);
        let negative = self.proc().alloc_temp(TempKind::Any);
        self.emit(Opcode::Lt, vec![stride, zero], vec![negative]);
        self.free(negative);
        self.emit(
            Opcode::Cbr,
            vec![negative],
            vec![Pseudo::Block(descending), Pseudo::Block(ascending)],
        );

        for (block, operands) in [(ascending, [index, bound]), (descending, [bound, index])] {
            self.start_block(block);
            let in_range = self.proc().alloc_temp(TempKind::Any);
            self.emit(Opcode::Le, operands.to_vec(), vec![in_range]);
            self.free(in_range);
            self.emit(
                Opcode::Cbr,
                vec![in_range],
                vec![Pseudo::Block(body_block), Pseudo::Block(end)],
            );
        }

        self.start_block(body_block);
        self.linearize_loop_body(var, index, TypeTag::Any, body, end)?;
        if !self.current_terminated() {
            self.emit(Opcode::Add, vec![index, stride], vec![index]);
            self.emit(Opcode::Br, Vec::new(), vec![Pseudo::Block(test_block)]);
        }

        self.start_block(end);
        self.free(stride);
        self.free(bound);
        self.free(index);
        Ok(())
    }

    /// Body of a numeric loop: the loop variable is a fresh local per iteration.
    fn linearize_loop_body(
        &mut self,
        var: SymbolId,
        index: Pseudo<'a>,
        index_tag: TypeTag,
        body: &Block,
        exit: crate::ir::BlockId,
    ) -> CompileResult<()> {
        self.open_scope();
        let local = self.declare_local(var)?;
        self.emit_move(index, index_tag, local);
        self.ctx.loop_exits.push(exit);
        self.linearize_stmts(&body.stmts)?;
        self.ctx.loop_exits.pop();
        self.close_scope();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::ast::build::TreeBuilder;
    use crate::ast::*;
    use crate::core::test_utils::test::TestContext;
    use crate::core::CompileError;
    use crate::ir::{Opcode, Pseudo};
    use crate::linearizer::linearize;

    fn opcodes(module: &crate::ir::Module<'_>, proc: usize) -> Vec<Opcode> {
        let proc = &module.procs()[proc];
        proc.blocks
            .iter()
            .flat_map(|b| b.insts.iter().map(|&id| proc.inst(id).opcode))
            .collect()
    }

    #[test]
    fn test_local_declaration_pads_with_nil() {
        let ctx = TestContext::new();
        let session = ctx.create_session();
        let mut b = TreeBuilder::new();
        let f = b.function_id();
        let x = b.local(f, "x", VarType::Any);
        let y = b.local(f, "y", VarType::Any);
        let tree = b.finish(FunctionExpr::new(
            f,
            vec![],
            vec![Stmt::Local {
                vars: vec![x, y],
                exprs: vec![Expr::int(1)],
            }],
        ));

        let module = linearize(&session, &tree).unwrap();
        let proc = &module.procs()[0];
        let movs: Vec<_> = proc.instructions.iter().filter(|i| i.opcode == Opcode::Mov).collect();
        assert_eq!(movs.len(), 2);
        assert_eq!(movs[1].operands[0], Pseudo::Nil);
    }

    #[test]
    fn test_typed_local_from_any_is_guarded() {
        let ctx = TestContext::new();
        let session = ctx.create_session();
        let mut b = TreeBuilder::new();
        let f = b.function_id();
        let g = b.global("g");
        let n = b.local(f, "n", VarType::Integer);
        let body = vec![Stmt::Local {
            vars: vec![n],
            exprs: vec![b.var(g)],
        }];
        let tree = b.finish(FunctionExpr::new(f, vec![], body));

        let module = linearize(&session, &tree).unwrap();
        assert_eq!(
            opcodes(&module, 0),
            vec![Opcode::LoadGlobal, Opcode::ToInt, Opcode::Ret]
        );
    }

    #[test]
    fn test_statements_after_return_are_skipped() {
        let ctx = TestContext::new();
        let session = ctx.create_session();
        let mut b = TreeBuilder::new();
        let f = b.function_id();
        let g = b.global("g");
        let body = vec![
            Stmt::Return(vec![]),
            Stmt::Expr(Expr::call(b.var(g), vec![])),
        ];
        let tree = b.finish(FunctionExpr::new(f, vec![], body));

        let module = linearize(&session, &tree).unwrap();
        assert_eq!(opcodes(&module, 0), vec![Opcode::Ret]);
    }

    #[test]
    fn test_break_outside_loop_is_rejected() {
        let ctx = TestContext::new();
        let session = ctx.create_session();
        let mut b = TreeBuilder::new();
        let f = b.function_id();
        let tree = b.finish(FunctionExpr::new(f, vec![], vec![Stmt::Break]));

        let err = linearize(&session, &tree).unwrap_err();
        assert!(matches!(err, CompileError::InvalidOperand { .. }));
    }

    #[test]
    fn test_multiple_assignment_snapshots_locals() {
        let ctx = TestContext::new();
        let session = ctx.create_session();
        let mut b = TreeBuilder::new();
        let f = b.function_id();
        let x = b.local(f, "x", VarType::Any);
        let y = b.local(f, "y", VarType::Any);
        let body = vec![
            Stmt::Local {
                vars: vec![x, y],
                exprs: vec![Expr::int(1), Expr::int(2)],
            },
            Stmt::Assign {
                targets: vec![b.var(x), b.var(y)],
                exprs: vec![b.var(y), b.var(x)],
            },
        ];
        let tree = b.finish(FunctionExpr::new(f, vec![], body));

        let module = linearize(&session, &tree).unwrap();
        let proc = &module.procs()[0];
        let movs: Vec<_> = proc.instructions.iter().filter(|i| i.opcode == Opcode::Mov).collect();
        // two initialisers, two snapshots, two assignments
        assert_eq!(movs.len(), 6);
        assert_eq!(movs[2].targets[0], Pseudo::TempAny(0));
        assert_eq!(movs[3].targets[0], Pseudo::TempAny(1));
        // assigned right to left, from the snapshots
        assert_eq!(movs[4].operands[0], Pseudo::TempAny(1));
        assert_eq!(movs[5].operands[0], Pseudo::TempAny(0));
    }
}
