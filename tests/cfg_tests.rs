//! Control flow graphs and dominators of lowered procs.

use bumpalo::Bump;
use ravel::ast::build::TreeBuilder;
use ravel::ast::{Block, Expr, FunctionExpr, IfClause, Stmt, VarType};
use ravel::cfg::{build_cfg, control_flow_graph};
use ravel::core::{DominatorTree, EdgeKind, Graph};
use ravel::ir::{Module, ProcId};
use ravel::linearizer::linearize;
use ravel::{CompilationSession, CompileError};

fn lowered<'a>(session: &CompilationSession<'a>, body: impl FnOnce(&mut TreeBuilder, ravel::ast::FunctionId) -> (Vec<ravel::ast::SymbolId>, Vec<Stmt>)) -> Module<'a> {
    let mut b = TreeBuilder::new();
    let f = b.function_id();
    let (params, stmts) = body(&mut b, f);
    let tree = b.finish(FunctionExpr::new(f, params, stmts));
    let mut module = linearize(session, &tree).unwrap_or_else(|e| panic!("linearize failed: {}", e));
    build_cfg(session, &mut module, ProcId(0)).unwrap_or_else(|e| panic!("cfg failed: {}", e));
    module
}

#[test]
fn test_if_else_diamond() {
    let arena = Bump::new();
    let session = CompilationSession::new(&arena);
    let module = lowered(&session, |b, f| {
        let c = b.local(f, "c", VarType::Any);
        let x = b.local(f, "x", VarType::Any);
        let stmts = vec![
            Stmt::Local { vars: vec![x], exprs: vec![] },
            Stmt::If {
                clauses: vec![IfClause {
                    cond: b.var(c),
                    body: Block::new(vec![Stmt::Assign {
                        targets: vec![b.var(x)],
                        exprs: vec![Expr::int(1)],
                    }]),
                }],
                else_block: Some(Block::new(vec![Stmt::Assign {
                    targets: vec![b.var(x)],
                    exprs: vec![Expr::int(2)],
                }])),
            },
        ];
        (vec![c], stmts)
    });

    // L2 joins, L3 is the then branch, L4 the else branch
    let proc = &module.procs()[0];
    let cfg = proc.cfg.as_ref().unwrap();
    assert!(cfg.has_edge(0, 3));
    assert!(cfg.has_edge(0, 4));
    assert!(cfg.has_edge(3, 2));
    assert!(cfg.has_edge(4, 2));
    assert!(cfg.has_edge(2, 1));
    assert!(cfg.unreachable_nodes().is_empty());

    let dom = proc.dominators.as_ref().unwrap();
    assert_eq!(dom.idom(2), Some(0));
    assert_eq!(dom.idom(3), Some(0));
    assert_eq!(dom.idom(4), Some(0));
    assert_eq!(dom.idom(1), Some(2));
}

#[test]
fn test_while_loop_has_a_backward_edge() {
    let arena = Bump::new();
    let session = CompilationSession::new(&arena);
    let module = lowered(&session, |b, f| {
        let c = b.local(f, "c", VarType::Any);
        let stmts = vec![Stmt::While {
            cond: b.var(c),
            body: Block::new(vec![Stmt::Break]),
        }];
        (vec![c], stmts)
    });

    let cfg = module.procs()[0].cfg.as_ref().unwrap();
    // L2 tests, L3 is the body, L4 follows the loop
    assert_eq!(cfg.edge_kind(0, 2), Some(EdgeKind::Tree));
    assert!(cfg.has_edge(2, 3));
    assert!(cfg.has_edge(3, 4));
    assert!(!cfg.has_edge(3, 2));

    let module = lowered(&session, |b, f| {
        let c = b.local(f, "c", VarType::Any);
        let stmts = vec![Stmt::While {
            cond: b.var(c),
            body: Block::default(),
        }];
        (vec![c], stmts)
    });
    let cfg = module.procs()[0].cfg.as_ref().unwrap();
    assert_eq!(cfg.edge_kind(3, 2), Some(EdgeKind::Backward));
    let dom = module.procs()[0].dominators.as_ref().unwrap();
    assert!(dom.dominates(2, 3));
    assert!(dom.dominates(2, 4));
}

#[test]
fn test_chain_dominators() {
    let mut graph = Graph::new(0);
    graph.add_edge(0, 1);
    graph.add_edge(1, 2);
    graph.classify();

    let dom = DominatorTree::compute(&graph);
    assert_eq!(dom.idom(2), Some(1));
    assert_eq!(dom.idom(1), Some(0));
    assert_eq!(dom.to_string(), "IDOM(L0) = L0\nIDOM(L1) = L0\nIDOM(L2) = L1\n");
}

#[test]
fn test_code_after_return_is_dropped() {
    let arena = Bump::new();
    let session = CompilationSession::new(&arena);
    let module = lowered(&session, |b, f| {
        let g = b.global("g");
        let stmts = vec![
            Stmt::Return(vec![]),
            Stmt::Expr(Expr::call(b.var(g), vec![])),
        ];
        (vec![], stmts)
    });

    let proc = &module.procs()[0];
    assert_eq!(proc.blocks.len(), 2);
    assert_eq!(proc.cfg.as_ref().unwrap().edge_count(), 1);
}

#[test]
fn test_cfg_requires_terminators() {
    let arena = Bump::new();
    let session = CompilationSession::new(&arena);
    let mut module = lowered(&session, |_, _| (vec![], vec![]));
    let proc = module.proc_mut(ProcId(0));
    proc.new_block();

    let err = control_flow_graph(&module, ProcId(0)).unwrap_err();
    assert!(matches!(err, CompileError::UnterminatedBlock { proc: 0, block: 2 }));
}

#[test]
fn test_graph_display() {
    let arena = Bump::new();
    let session = CompilationSession::new(&arena);
    let module = lowered(&session, |_, _| (vec![], vec![]));
    let cfg = module.procs()[0].cfg.as_ref().unwrap();
    assert_eq!(cfg.to_string(), "L0 -> L1[tree]\nL1 ->\n");
    assert_eq!(session.stats().cfgs_built, 1);
}
