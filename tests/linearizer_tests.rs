//! Lowering of small programs into IR.

use bumpalo::Bump;
use ravel::ast::build::TreeBuilder;
use ravel::ast::{BinaryOp, Expr, ExprKind, FunctionExpr, Stmt, SyntaxTree, TableItem, VarType};
use ravel::ir::{ConstantValue, Module, Opcode, Pseudo, TempKind, ENTRY_BLOCK};
use ravel::linearizer::linearize;
use ravel::{CompilationSession, CompileError};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn lower<'a>(session: &CompilationSession<'a>, tree: &SyntaxTree) -> Module<'a> {
    linearize(session, tree).unwrap_or_else(|e| panic!("linearize failed: {}", e))
}

fn opcodes(module: &Module<'_>, proc: usize) -> Vec<Opcode> {
    let proc = &module.procs()[proc];
    proc.blocks
        .iter()
        .flat_map(|b| b.insts.iter().map(|&id| proc.inst(id).opcode))
        .collect()
}

#[test]
fn test_equal_literals_share_a_constant() {
    init_logging();
    let arena = Bump::new();
    let session = CompilationSession::new(&arena);
    let mut b = TreeBuilder::new();
    let f = b.function_id();
    let x = b.local(f, "x", VarType::Any);
    let y = b.local(f, "y", VarType::Any);
    let z = b.local(f, "z", VarType::Any);
    let body = vec![
        Stmt::Local { vars: vec![x], exprs: vec![Expr::int(1)] },
        Stmt::Local { vars: vec![y], exprs: vec![Expr::int(1)] },
        Stmt::Local { vars: vec![z], exprs: vec![Expr::num(1.0)] },
    ];
    let tree = b.finish(FunctionExpr::new(f, vec![], body));

    let module = lower(&session, &tree);
    let proc = &module.procs()[0];
    let movs: Vec<_> = proc.instructions.iter().filter(|i| i.opcode == Opcode::Mov).collect();
    assert_eq!(movs.len(), 3);
    assert_eq!(movs[0].operands[0], movs[1].operands[0]);
    assert_ne!(movs[0].operands[0], movs[2].operands[0]);
    assert_eq!(proc.constants.len(), 2);
    assert_eq!(session.stats().constants_interned, 2);
}

#[test]
fn test_temporaries_are_reused_lifo() {
    let arena = Bump::new();
    let session = CompilationSession::new(&arena);
    let mut b = TreeBuilder::new();
    let f = b.function_id();
    let g = b.global("g");
    let h = b.global("h");
    let x = b.local(f, "x", VarType::Any);
    let y = b.local(f, "y", VarType::Any);
    let sum = |b: &TreeBuilder| Expr::binary(BinaryOp::Add, b.var(g), b.var(h), VarType::Any);
    let body = vec![
        Stmt::Local { vars: vec![x], exprs: vec![sum(&b)] },
        Stmt::Local { vars: vec![y], exprs: vec![sum(&b)] },
    ];
    let tree = b.finish(FunctionExpr::new(f, vec![], body));

    let module = lower(&session, &tree);
    let proc = &module.procs()[0];
    let adds: Vec<_> = proc.instructions.iter().filter(|i| i.opcode == Opcode::Add).collect();
    assert_eq!(adds.len(), 2);
    // the most recently freed operand register comes back first
    assert_eq!(adds[0].targets, vec![Pseudo::TempAny(0)]);
    assert_eq!(adds[1].operands, vec![Pseudo::TempAny(0), Pseudo::TempAny(1)]);
    assert_eq!(proc.max_temps(TempKind::Any), 2);
    assert_eq!(proc.live_temps(TempKind::Any), 0);
}

#[test]
fn test_array_element_assignment_is_a_single_store() {
    let arena = Bump::new();
    let session = CompilationSession::new(&arena);
    let mut b = TreeBuilder::new();
    let f = b.function_id();
    let a = b.local(f, "a", VarType::IntegerArray);
    let body = vec![
        Stmt::Local {
            vars: vec![a],
            exprs: vec![Expr::table(vec![], VarType::IntegerArray)],
        },
        Stmt::Assign {
            targets: vec![Expr::index(b.var(a), Expr::int(0), VarType::Integer)],
            exprs: vec![Expr::int(1)],
        },
    ];
    let tree = b.finish(FunctionExpr::new(f, vec![], body));

    let module = lower(&session, &tree);
    assert_eq!(
        opcodes(&module, 0),
        vec![Opcode::NewIArray, Opcode::Mov, Opcode::IArraySet, Opcode::Ret]
    );
    let proc = &module.procs()[0];
    let store = proc
        .instructions
        .iter()
        .find(|i| i.opcode == Opcode::IArraySet)
        .unwrap();
    assert_eq!(store.operands.len(), 3);
    assert!(store.targets.is_empty());
    assert_eq!(proc.constant(store.operands[1]), Some(ConstantValue::Integer(0)));
    assert_eq!(proc.constant(store.operands[2]), Some(ConstantValue::Integer(1)));
    assert_eq!(session.stats().load_store_rewrites, 1);
}

#[test]
fn test_array_element_read_feeds_a_call() {
    let arena = Bump::new();
    let session = CompilationSession::new(&arena);
    let mut b = TreeBuilder::new();
    let f = b.function_id();
    let print = b.global("print");
    let a = b.local(f, "a", VarType::IntegerArray);
    let body = vec![
        Stmt::Local {
            vars: vec![a],
            exprs: vec![Expr::table(vec![], VarType::IntegerArray)],
        },
        Stmt::Expr(Expr::call(
            b.var(print),
            vec![Expr::index(b.var(a), Expr::int(0), VarType::Integer)],
        )),
    ];
    let tree = b.finish(FunctionExpr::new(f, vec![], body));

    let module = lower(&session, &tree);
    let proc = &module.procs()[0];
    let load = proc
        .instructions
        .iter()
        .find(|i| i.opcode == Opcode::IArrayGet)
        .unwrap();
    let call = proc.instructions.iter().find(|i| i.opcode == Opcode::Call).unwrap();
    assert_eq!(load.targets, vec![Pseudo::TempInt(0)]);
    assert_eq!(call.operands[1], load.targets[0]);
    // a call used as a statement discards its results
    assert_eq!(proc.constant(call.targets[1]), Some(ConstantValue::Integer(0)));
    assert!(!proc.instructions.iter().any(|i| i.opcode == Opcode::IArraySet));
}

#[test]
fn test_function_adding_one() {
    let arena = Bump::new();
    let session = CompilationSession::new(&arena);
    let mut b = TreeBuilder::new();
    let f = b.function_id();
    let x = b.local(f, "x", VarType::Any);
    let sum = Expr::binary(BinaryOp::Add, b.var(x), Expr::int(1), VarType::Any);
    let tree = b.finish(FunctionExpr::new(f, vec![x], vec![Stmt::Return(vec![sum])]));

    let module = lower(&session, &tree);
    assert_eq!(module.len(), 1);
    let proc = &module.procs()[0];
    assert_eq!(proc.num_params, 1);
    assert_eq!(proc.num_locals(), 1);
    assert_eq!(opcodes(&module, 0), vec![Opcode::Add, Opcode::Ret]);

    let add = &proc.instructions[0];
    assert!(matches!(add.operands[0], Pseudo::Symbol(_)));
    assert_eq!(proc.constant(add.operands[1]), Some(ConstantValue::Integer(1)));
    assert_eq!(proc.instructions[1].operands, add.targets);
}

#[test]
fn test_logical_operators_branch() {
    let arena = Bump::new();
    let session = CompilationSession::new(&arena);
    let mut b = TreeBuilder::new();
    let f = b.function_id();
    let p = b.local(f, "p", VarType::Any);
    let q = b.local(f, "q", VarType::Any);
    let and = Expr::binary(BinaryOp::And, b.var(p), b.var(q), VarType::Any);
    let or = Expr::binary(BinaryOp::Or, b.var(p), b.var(q), VarType::Any);
    let body = vec![Stmt::Return(vec![and, or])];
    let tree = b.finish(FunctionExpr::new(f, vec![p, q], body));

    let module = lower(&session, &tree);
    let proc = &module.procs()[0];
    // entry, exit, and a right-hand block plus a join block per operator
    assert_eq!(proc.blocks.len(), 6);

    let and_branch = proc.last_inst(ENTRY_BLOCK).unwrap();
    assert_eq!(and_branch.opcode, Opcode::Cbr);
    assert_eq!(and_branch.targets, vec![Pseudo::Block(ravel::ir::BlockId(2)), Pseudo::Block(ravel::ir::BlockId(3))]);

    let or_branch = proc.last_inst(ravel::ir::BlockId(3)).unwrap();
    assert_eq!(or_branch.opcode, Opcode::Cbr);
    assert_eq!(or_branch.targets, vec![Pseudo::Block(ravel::ir::BlockId(5)), Pseudo::Block(ravel::ir::BlockId(4))]);
}

#[test]
fn test_call_results_spread_over_locals() {
    let arena = Bump::new();
    let session = CompilationSession::new(&arena);
    let mut b = TreeBuilder::new();
    let f = b.function_id();
    let g = b.global("g");
    let x = b.local(f, "x", VarType::Any);
    let y = b.local(f, "y", VarType::Any);
    let body = vec![Stmt::Local {
        vars: vec![x, y],
        exprs: vec![Expr::call(b.var(g), vec![])],
    }];
    let tree = b.finish(FunctionExpr::new(f, vec![], body));

    let module = lower(&session, &tree);
    let proc = &module.procs()[0];
    let call = proc.instructions.iter().find(|i| i.opcode == Opcode::Call).unwrap();
    assert_eq!(proc.constant(call.targets[1]), Some(ConstantValue::Integer(2)));
    let movs: Vec<_> = proc.instructions.iter().filter(|i| i.opcode == Opcode::Mov).collect();
    assert_eq!(movs[0].operands[0], Pseudo::RangeSelect { base: 0, index: 0 });
    assert_eq!(movs[1].operands[0], Pseudo::RangeSelect { base: 0, index: 1 });
}

#[test]
fn test_trailing_call_argument_stays_open() {
    let arena = Bump::new();
    let session = CompilationSession::new(&arena);
    let mut b = TreeBuilder::new();
    let f = b.function_id();
    let print = b.global("print");
    let g = b.global("g");
    let body = vec![Stmt::Expr(Expr::call(
        b.var(print),
        vec![Expr::int(1), Expr::call(b.var(g), vec![])],
    ))];
    let tree = b.finish(FunctionExpr::new(f, vec![], body));

    let module = lower(&session, &tree);
    let proc = &module.procs()[0];
    let calls: Vec<_> = proc.instructions.iter().filter(|i| i.opcode == Opcode::Call).collect();
    assert_eq!(calls.len(), 2);
    // inner call forwards every result
    assert_eq!(proc.constant(calls[0].targets[1]), Some(ConstantValue::Integer(-1)));
    assert!(calls[1].operands[2].is_open_range());
}

#[test]
fn test_integer_for_loop_uses_native_index() {
    let arena = Bump::new();
    let session = CompilationSession::new(&arena);
    let mut b = TreeBuilder::new();
    let f = b.function_id();
    let i = b.local(f, "i", VarType::Integer);
    let body = vec![Stmt::NumericFor {
        var: i,
        start: Expr::int(1),
        limit: Expr::int(10),
        step: None,
        body: Default::default(),
    }];
    let tree = b.finish(FunctionExpr::new(f, vec![], body));

    let module = lower(&session, &tree);
    assert_eq!(
        opcodes(&module, 0),
        vec![
            Opcode::MovI,
            Opcode::MovI,
            Opcode::Br,
            Opcode::LeII,
            Opcode::Cbr,
            Opcode::MovI,
            Opcode::AddII,
            Opcode::Br,
            Opcode::Ret,
        ]
    );
    assert_eq!(module.procs()[0].max_temps(TempKind::Int), 2);
}

#[test]
fn test_table_constructor_stores() {
    let arena = Bump::new();
    let session = CompilationSession::new(&arena);
    let mut b = TreeBuilder::new();
    let f = b.function_id();
    let t = b.local(f, "t", VarType::Table);
    let items = vec![
        TableItem::Positional(Expr::int(10)),
        TableItem::Named("name".to_string(), Expr::string("ravel")),
    ];
    let body = vec![Stmt::Local {
        vars: vec![t],
        exprs: vec![Expr::table(items, VarType::Table)],
    }];
    let tree = b.finish(FunctionExpr::new(f, vec![], body));

    let module = lower(&session, &tree);
    assert_eq!(
        opcodes(&module, 0),
        vec![
            Opcode::NewTable,
            Opcode::TableSetIK,
            Opcode::TableSetSK,
            Opcode::Mov,
            Opcode::Ret,
        ]
    );
}

#[test]
fn test_closure_gets_a_child_proc() {
    let arena = Bump::new();
    let session = CompilationSession::new(&arena);
    let mut b = TreeBuilder::new();
    let main = b.function_id();
    let inner = b.function_id();
    let n = b.local(main, "n", VarType::Integer);
    let up = b.upvalue(n, 0);
    let get = FunctionExpr::new(inner, vec![], vec![Stmt::Return(vec![b.var(up)])]).with_upvalues(vec![up]);
    let body = vec![
        Stmt::Local { vars: vec![n], exprs: vec![Expr::int(3)] },
        Stmt::Return(vec![Expr::function(get)]),
    ];
    let tree = b.finish(FunctionExpr::new(main, vec![], body));

    let module = lower(&session, &tree);
    assert_eq!(module.len(), 2);
    let child = &module.procs()[1];
    assert_eq!(child.parent, Some(ravel::ir::ProcId(0)));
    assert_eq!(child.upvalues.len(), 1);
    assert_eq!(child.upvalues[0].source_index, 0);
    assert!(child.upvalues[0].in_parent_local);
    assert!(opcodes(&module, 0).contains(&Opcode::Closure));
}

#[test]
fn test_unsupported_constructs_abort() {
    let arena = Bump::new();
    let session = CompilationSession::new(&arena);
    let mut b = TreeBuilder::new();
    let f = b.function_id();
    let goto = b.finish(FunctionExpr::new(f, vec![], vec![Stmt::Goto("top".to_string())]));
    let err = linearize(&session, &goto).unwrap_err();
    assert!(matches!(err, CompileError::Unimplemented { .. }));

    let mut b = TreeBuilder::new();
    let f = b.function_id();
    let vararg = Expr::new(VarType::Any, ExprKind::Vararg);
    let tree = b.finish(FunctionExpr::new(f, vec![], vec![Stmt::Return(vec![vararg])]));
    let err = linearize(&session, &tree).unwrap_err();
    assert!(err.to_string().contains("vararg"));
}

#[test]
fn test_method_call_result_survives_a_later_call() {
    init_logging();
    let arena = Bump::new();
    let session = CompilationSession::new(&arena);
    let mut b = TreeBuilder::new();
    let f = b.function_id();
    let obj = b.local(f, "obj", VarType::Any);
    let x = b.local(f, "x", VarType::Any);
    let g = b.global("f");
    // x = obj:m() + f(1)
    let sum = Expr::binary(
        BinaryOp::Add,
        Expr::method_call(b.var(obj), "m", vec![]),
        Expr::call(b.var(g), vec![Expr::int(1)]),
        VarType::Any,
    );
    let body = vec![Stmt::Assign {
        targets: vec![b.var(x)],
        exprs: vec![sum],
    }];
    let tree = b.finish(FunctionExpr::new(f, vec![obj, x], body));

    let module = lower(&session, &tree);
    let proc = &module.procs()[0];
    let calls: Vec<_> = proc.instructions.iter().filter(|i| i.opcode == Opcode::Call).collect();
    // the receiver sits right above the method's callee register
    assert_eq!(calls[0].operands, vec![Pseudo::TempAny(0), Pseudo::TempAny(1)]);
    assert_eq!(calls[1].operands[0], Pseudo::TempAny(1));

    let add = proc.instructions.iter().find(|i| i.opcode == Opcode::Add).unwrap();
    assert_eq!(
        add.operands,
        vec![
            Pseudo::RangeSelect { base: 0, index: 0 },
            Pseudo::RangeSelect { base: 1, index: 0 }
        ]
    );
    assert_eq!(proc.live_temps(TempKind::Any), 0);
}

#[test]
fn test_spread_results_are_not_reused_by_snapshots() {
    init_logging();
    let arena = Bump::new();
    let session = CompilationSession::new(&arena);
    let mut b = TreeBuilder::new();
    let f = b.function_id();
    let a = b.local(f, "a", VarType::Any);
    let x = b.local(f, "x", VarType::Any);
    let y = b.local(f, "y", VarType::Any);
    let z = b.local(f, "z", VarType::Any);
    let g = b.global("f");
    // x, y, z = a, f()
    let body = vec![Stmt::Assign {
        targets: vec![b.var(x), b.var(y), b.var(z)],
        exprs: vec![b.var(a), Expr::call(b.var(g), vec![])],
    }];
    let tree = b.finish(FunctionExpr::new(f, vec![a, x, y, z], body));

    let module = lower(&session, &tree);
    let proc = &module.procs()[0];
    assert_eq!(
        opcodes(&module, 0),
        vec![
            Opcode::LoadGlobal,
            Opcode::Call,
            Opcode::Mov,
            Opcode::Mov,
            Opcode::Mov,
            Opcode::Mov,
            Opcode::Ret
        ]
    );
    let movs: Vec<_> = proc.instructions.iter().filter(|i| i.opcode == Opcode::Mov).collect();
    // the copy of `a` lands above both call results
    assert_eq!(movs[0].targets, vec![Pseudo::TempAny(2)]);
    assert_eq!(movs[1].operands, vec![Pseudo::RangeSelect { base: 0, index: 1 }]);
    assert_eq!(movs[2].operands, vec![Pseudo::RangeSelect { base: 0, index: 0 }]);
    assert_eq!(movs[3].operands, vec![Pseudo::TempAny(2)]);
    assert_eq!(proc.max_temps(TempKind::Any), 3);
    assert_eq!(proc.live_temps(TempKind::Any), 0);
}
