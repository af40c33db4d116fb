// This module implements the linearizer: a depth-first walk over the typed syntax tree that
// emits IR into a Module. All traversal state is explicit: the Linearizer holds the session,
// the symbol table, the module under construction and one FunctionContext (current proc,
// current block, the lexical scope stack mapping symbols to local registers, the loop-exit
// stack, and the targets of the function's upvalues). Entering a closure swaps in a fresh
// context and restores the enclosing one afterwards, so nothing is ambient. Expressions
// return pseudos; call expressions also return the id of their Call instruction so the
// consumer can patch the expected result count, and assignment targets return an
// Assignable handle naming the load instruction the assignment rewrites into a store.
// Any construct that is not implemented aborts the whole unit with
// CompileError::Unimplemented.

//! Syntax tree to IR lowering.

mod expr;
pub mod ops;
mod stmt;

use crate::ast::{FunctionExpr, FunctionId, Symbol, SymbolId, SymbolKind, SymbolTable, SyntaxTree};
use crate::core::{CompilationSession, CompileError, CompileResult};
use crate::ir::{
    BlockId, ConstantValue, InstId, Module, Opcode, ProcId, Proc, Pseudo, SymbolRef, TypeTag,
    UpvalueDesc, ENTRY_BLOCK, EXIT_BLOCK,
};

/// Lower `tree` into a module; the main function becomes the root proc.
pub fn linearize<'a>(
    session: &CompilationSession<'a>,
    tree: &SyntaxTree,
) -> CompileResult<Module<'a>> {
    let mut linearizer = Linearizer {
        session,
        symbols: &tree.symbols,
        module: Module::new(),
        ctx: FunctionContext::new(ProcId(0), tree.main.id, Vec::new()),
    };
    linearizer.linearize_function(&tree.main, None)?;
    Ok(linearizer.module)
}

/// Per-function traversal state.
struct FunctionContext {
    proc: ProcId,
    function: FunctionId,
    block: BlockId,
    /// Innermost scope last; each entry maps a symbol to its local register.
    scopes: Vec<Vec<(SymbolId, u32)>>,
    loop_exits: Vec<BlockId>,
    /// Captured locals, in upvalue index order.
    upvalue_targets: Vec<SymbolId>,
}

impl FunctionContext {
    fn new(proc: ProcId, function: FunctionId, upvalue_targets: Vec<SymbolId>) -> Self {
        Self {
            proc,
            function,
            block: ENTRY_BLOCK,
            scopes: Vec::new(),
            loop_exits: Vec::new(),
            upvalue_targets,
        }
    }
}

/// Result of linearizing an expression in a context that may take several values.
#[derive(Debug, Clone, Copy)]
struct ExprValue<'a> {
    pseudo: Pseudo<'a>,
    /// The call that produced `pseudo`, whose expected result count is still open.
    call: Option<InstId>,
}

impl<'a> ExprValue<'a> {
    fn plain(pseudo: Pseudo<'a>) -> Self {
        Self { pseudo, call: None }
    }
}

/// Load instruction an assignment will rewrite into a store.
#[derive(Debug, Clone)]
struct Assignable<'a> {
    inst: InstId,
    /// Result of the load, dropped by the rewrite.
    discarded: Pseudo<'a>,
    /// Container and key temporaries that must stay live until the store.
    held: Vec<Pseudo<'a>>,
}

#[derive(Debug, Clone)]
enum AssignTarget<'a> {
    /// Local or upvalue, assigned with a move.
    Variable(Pseudo<'a>),
    Indexed(Assignable<'a>),
}

struct Linearizer<'s, 'a> {
    session: &'s CompilationSession<'a>,
    symbols: &'s SymbolTable,
    module: Module<'a>,
    ctx: FunctionContext,
}

impl<'s, 'a> Linearizer<'s, 'a> {
    fn proc(&mut self) -> &mut Proc<'a> {
        self.module.proc_mut(self.ctx.proc)
    }

    fn proc_ref(&self) -> &Proc<'a> {
        self.module.proc(self.ctx.proc)
    }

    fn symbol(&self, id: SymbolId) -> CompileResult<&'s Symbol> {
        self.symbols
            .get(id)
            .ok_or(CompileError::UnknownSymbol { id: id.0 })
    }

    fn error(&self, reason: impl Into<String>) -> CompileError {
        CompileError::invalid_operand(self.ctx.proc.0, reason)
    }

    fn current_terminated(&self) -> bool {
        self.proc_ref().is_terminated(self.ctx.block)
    }

    fn new_block(&mut self) -> BlockId {
        self.proc().new_block()
    }

    /// Make `block` current, branching to it if the previous block is still open.
    fn start_block(&mut self, block: BlockId) {
        if !self.current_terminated() {
            let from = self.ctx.block;
            self.proc()
                .emit(from, Opcode::Br, Vec::new(), vec![Pseudo::Block(block)]);
            self.session.record_instruction(Opcode::Br.name());
        }
        self.ctx.block = block;
    }

    /// Branch to `target` unless the current block already ended.
    fn branch_to(&mut self, target: BlockId) {
        if !self.current_terminated() {
            self.emit(Opcode::Br, Vec::new(), vec![Pseudo::Block(target)]);
        }
    }

    /// Code following a terminator lands in a fresh block with no predecessors.
    fn ensure_open_block(&mut self) {
        if self.current_terminated() {
            let block = self.new_block();
            log::debug!(
                "proc {}: L{} is terminated, continuing in unreachable L{}",
                self.ctx.proc.0,
                self.ctx.block.0,
                block.0
            );
            self.ctx.block = block;
        }
    }

    fn emit(&mut self, opcode: Opcode, operands: Vec<Pseudo<'a>>, targets: Vec<Pseudo<'a>>) -> InstId {
        self.ensure_open_block();
        let block = self.ctx.block;
        self.session.record_instruction(opcode.name());
        self.proc().emit(block, opcode, operands, targets)
    }

    fn free(&mut self, pseudo: Pseudo<'a>) {
        self.proc().free_temp(pseudo);
    }

    fn constant(&mut self, value: ConstantValue<'a>) -> Pseudo<'a> {
        let (pseudo, inserted) = self.proc().intern_constant(value);
        if inserted {
            self.session.record_constant_interned();
        }
        pseudo
    }

    fn int_constant(&mut self, value: i64) -> Pseudo<'a> {
        self.constant(ConstantValue::Integer(value))
    }

    fn string_constant(&mut self, value: &str) -> Pseudo<'a> {
        let interned = self.session.intern_str(value);
        self.constant(ConstantValue::String(interned))
    }

    /// Set how many results the caller of `call` consumes.
    fn set_expected_results(&mut self, call: InstId, count: i64) {
        let k = self.int_constant(count);
        let inst = self.proc().inst_mut(call);
        if let Some(slot) = inst.targets.get_mut(1) {
            *slot = k;
        }
    }

    /// Static type of a value, preferring what the pseudo itself proves.
    fn value_tag(&self, pseudo: Pseudo<'a>, declared: TypeTag) -> TypeTag {
        match pseudo {
            Pseudo::TempInt(_) => TypeTag::Integer,
            Pseudo::TempFloat(_) => TypeTag::Number,
            Pseudo::Nil => TypeTag::Nil,
            Pseudo::True | Pseudo::False => TypeTag::Boolean,
            Pseudo::Range { .. } | Pseudo::RangeSelect { .. } => TypeTag::Any,
            Pseudo::Constant(_) => match self.proc_ref().constant(pseudo) {
                Some(ConstantValue::Integer(_)) => TypeTag::Integer,
                Some(ConstantValue::Number(_)) => TypeTag::Number,
                Some(ConstantValue::String(_)) => TypeTag::String,
                None => declared,
            },
            _ => declared,
        }
    }

    /// Copy `src` into `dest`, converting or guarding by the destination type.
    fn emit_move(&mut self, src: Pseudo<'a>, src_tag: TypeTag, dest: Pseudo<'a>) {
        if src.same_storage(&dest) {
            return;
        }
        let dest_tag = match dest {
            Pseudo::TempInt(_) => TypeTag::Integer,
            Pseudo::TempFloat(_) => TypeTag::Number,
            Pseudo::Symbol(sym) => sym.ty(),
            _ => TypeTag::Any,
        };
        let opcode = ops::move_opcode(dest_tag, src_tag);
        self.emit(opcode, vec![src], vec![dest]);
    }

    fn open_scope(&mut self) {
        self.ctx.scopes.push(Vec::new());
    }

    /// Release the locals of the innermost scope, newest first.
    fn close_scope(&mut self) {
        if let Some(scope) = self.ctx.scopes.pop() {
            for (_, reg) in scope.into_iter().rev() {
                self.proc().free_local(reg);
            }
        }
    }

    /// Bring `id` into the innermost scope with a fresh local register.
    fn declare_local(&mut self, id: SymbolId) -> CompileResult<Pseudo<'a>> {
        let symbol = self.symbol(id)?;
        let reg = self.proc().alloc_local();
        match self.ctx.scopes.last_mut() {
            Some(scope) => scope.push((id, reg)),
            None => return Err(self.error(format!("local '{}' declared outside any scope", symbol.name))),
        }
        Ok(Pseudo::Symbol(SymbolRef::Local {
            name: self.session.intern_str(&symbol.name),
            reg,
            ty: TypeTag::from(&symbol.ty),
        }))
    }

    fn lookup_local(&self, id: SymbolId) -> Option<u32> {
        self.ctx
            .scopes
            .iter()
            .rev()
            .flat_map(|scope| scope.iter().rev())
            .find(|(sym, _)| *sym == id)
            .map(|&(_, reg)| reg)
    }

    /// Describe how a closure with these upvalues reaches each of them from
    /// the current (enclosing) function.
    fn resolve_upvalues(&self, func: &FunctionExpr) -> CompileResult<(Vec<UpvalueDesc<'a>>, Vec<SymbolId>)> {
        let mut descs = Vec::with_capacity(func.upvalues.len());
        let mut targets = Vec::with_capacity(func.upvalues.len());
        for &id in &func.upvalues {
            let symbol = self.symbol(id)?;
            let SymbolKind::Upvalue { target, .. } = symbol.kind else {
                return Err(self.error(format!("'{}' is listed as an upvalue but is not one", symbol.name)));
            };
            let captured = self.symbol(target)?;
            let (source_index, in_parent_local) = match captured.kind {
                SymbolKind::Local { function } if function == self.ctx.function => {
                    let reg = self.lookup_local(target).ok_or_else(|| {
                        self.error(format!("captured local '{}' is not in scope", captured.name))
                    })?;
                    (reg, true)
                }
                _ => {
                    let index = self
                        .ctx
                        .upvalue_targets
                        .iter()
                        .position(|&t| t == target)
                        .ok_or_else(|| {
                            self.error(format!(
                                "'{}' is not reachable from the enclosing function",
                                captured.name
                            ))
                        })?;
                    (index as u32, false)
                }
            };
            descs.push(UpvalueDesc {
                name: self.session.intern_str(&symbol.name),
                ty: TypeTag::from(&symbol.ty),
                source_index,
                in_parent_local,
            });
            targets.push(target);
        }
        Ok((descs, targets))
    }

    /// Create a proc for `func` and lower its body in a fresh context.
    fn linearize_function(&mut self, func: &FunctionExpr, parent: Option<ProcId>) -> CompileResult<ProcId> {
        let (upvalues, targets) = match parent {
            Some(_) => self.resolve_upvalues(func)?,
            None => (Vec::new(), Vec::new()),
        };

        let id = self.module.new_proc(parent);
        let name = func.name.as_deref().map(|n| self.session.intern_str(n));
        {
            let proc = self.module.proc_mut(id);
            proc.name = name;
            proc.upvalues = upvalues;
            proc.is_vararg = func.is_vararg;
            proc.num_params = func.params.len() as u32;
        }

        let saved = std::mem::replace(&mut self.ctx, FunctionContext::new(id, func.id, targets));
        let result = self.linearize_body(func);
        self.ctx = saved;
        result?;
        Ok(id)
    }

    fn linearize_body(&mut self, func: &FunctionExpr) -> CompileResult<()> {
        self.open_scope();
        for &param in &func.params {
            let pseudo = self.declare_local(param)?;
            if let Pseudo::Symbol(sym) = pseudo {
                if let Some(guard) = ops::param_guard(sym.ty()) {
                    self.emit(guard, vec![pseudo], vec![pseudo]);
                }
            }
        }

        self.linearize_stmts(&func.body.stmts)?;
        if !self.current_terminated() {
            self.emit(Opcode::Ret, Vec::new(), vec![Pseudo::Block(EXIT_BLOCK)]);
        }
        self.close_scope();

        let proc = self.proc_ref();
        log::debug!(
            "linearized proc {} ({} blocks, {} instructions, {} constants)",
            proc.id.0,
            proc.blocks.len(),
            proc.instructions.len(),
            proc.constants.len()
        );
        self.session
            .record_proc_linearized(proc.blocks.len(), proc.instructions.len());
        Ok(())
    }
}

