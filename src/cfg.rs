// This module derives the control-flow graph of every proc from its block terminators. Each
// block is a graph node with the block index as node id; Br and Cbr contribute edges to the
// blocks named in their targets and Ret contributes an edge to the exit block. Terminators
// are checked rather than inferred: an empty block or a block ending in anything else is a
// contract violation reported as CompileError::UnterminatedBlock. Once the edges are in,
// the graph is classified (which also produces the reverse postorder) and the dominator tree
// is computed from it; both are attached to the proc before its children are processed.

//! CFG construction and dominator analysis per proc.

use crate::core::{CompilationSession, CompileError, CompileResult, DominatorTree, Graph};
use crate::ir::{Module, Opcode, ProcId, Pseudo, ENTRY_BLOCK, EXIT_BLOCK};

/// Build and attach the CFG and dominator tree of `proc` and all its descendants.
pub fn build_cfg(session: &CompilationSession<'_>, module: &mut Module<'_>, proc: ProcId) -> CompileResult<()> {
    let graph = control_flow_graph(module, proc)?;
    let dominators = DominatorTree::compute(&graph);

    let unreachable = graph.unreachable_nodes();
    if !unreachable.is_empty() {
        log::debug!("proc {}: unreachable blocks {:?}", proc.0, unreachable);
    }
    log::debug!(
        "proc {}: cfg with {} nodes and {} edges",
        proc.0,
        graph.node_count(),
        graph.edge_count()
    );
    session.record_cfg_built(graph.edge_count());

    let target = module.proc_mut(proc);
    target.cfg = Some(graph);
    target.dominators = Some(dominators);

    let children = module.proc(proc).children.clone();
    for child in children {
        build_cfg(session, module, child)?;
    }
    Ok(())
}

/// Classified graph of one proc's blocks.
pub fn control_flow_graph(module: &Module<'_>, id: ProcId) -> CompileResult<Graph> {
    let proc = module.proc(id);
    let mut graph = Graph::new(ENTRY_BLOCK.0);
    graph.add_node((proc.blocks.len() as u32).saturating_sub(1));

    for block in &proc.blocks {
        if block.index == EXIT_BLOCK {
            continue;
        }
        let unterminated = CompileError::UnterminatedBlock {
            proc: id.0,
            block: block.index.0,
        };
        let Some(last) = proc.last_inst(block.index) else {
            return Err(unterminated);
        };
        match last.opcode {
            Opcode::Br | Opcode::Cbr => {
                let mut targets = last.targets.iter().filter_map(Pseudo::as_block).peekable();
                if targets.peek().is_none() {
                    return Err(CompileError::invalid_operand(
                        id.0,
                        format!("{} in L{} has no target block", last.opcode, block.index.0),
                    ));
                }
                for target in targets {
                    graph.add_edge(block.index.0, target.0);
                }
            }
            Opcode::Ret => {
                graph.add_edge(block.index.0, EXIT_BLOCK.0);
            }
            _ => return Err(unterminated),
        }
    }

    graph.classify();
    Ok(graph)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::test_utils::test::TestContext;
    use crate::core::EdgeKind;
    use crate::ir::{BlockId, TempKind};

    fn ret(module: &mut Module<'_>, proc: ProcId, block: BlockId) {
        module
            .proc_mut(proc)
            .emit(block, Opcode::Ret, Vec::new(), vec![Pseudo::Block(EXIT_BLOCK)]);
    }

    fn br(module: &mut Module<'_>, proc: ProcId, from: BlockId, to: BlockId) {
        module
            .proc_mut(proc)
            .emit(from, Opcode::Br, Vec::new(), vec![Pseudo::Block(to)]);
    }

    #[test]
    fn test_diamond_dominators() {
        let _ = env_logger::builder().is_test(true).try_init();
        let ctx = TestContext::new();
        let session = ctx.create_session();
        let mut module = Module::new();
        let p = module.new_proc(None);
        let (b, c, d) = {
            let proc = module.proc_mut(p);
            (proc.new_block(), proc.new_block(), proc.new_block())
        };
        let cond = module.proc_mut(p).alloc_temp(TempKind::Any);
        module.proc_mut(p).emit(
            ENTRY_BLOCK,
            Opcode::Cbr,
            vec![cond],
            vec![Pseudo::Block(b), Pseudo::Block(c)],
        );
        br(&mut module, p, b, d);
        br(&mut module, p, c, d);
        ret(&mut module, p, d);

        build_cfg(&session, &mut module, p).unwrap();
        let proc = module.proc(p);
        let dom = proc.dominators.as_ref().unwrap();
        assert_eq!(dom.idom(d.0), Some(ENTRY_BLOCK.0));
        assert_eq!(dom.idom(EXIT_BLOCK.0), Some(d.0));
        assert!(proc.cfg.as_ref().unwrap().has_edge(d.0, EXIT_BLOCK.0));
    }

    #[test]
    fn test_chain_dominators() {
        let ctx = TestContext::new();
        let session = ctx.create_session();
        let mut module = Module::new();
        let p = module.new_proc(None);
        let (b, c) = {
            let proc = module.proc_mut(p);
            (proc.new_block(), proc.new_block())
        };
        br(&mut module, p, ENTRY_BLOCK, b);
        br(&mut module, p, b, c);
        ret(&mut module, p, c);

        build_cfg(&session, &mut module, p).unwrap();
        let dom = module.proc(p).dominators.as_ref().unwrap();
        assert_eq!(dom.idom(c.0), Some(b.0));
        assert_eq!(dom.idom(b.0), Some(ENTRY_BLOCK.0));
        assert!(dom.dominates(b.0, EXIT_BLOCK.0));
    }

    #[test]
    fn test_loop_edge_is_backward() {
        let ctx = TestContext::new();
        let session = ctx.create_session();
        let mut module = Module::new();
        let p = module.new_proc(None);
        let (head, body, end) = {
            let proc = module.proc_mut(p);
            (proc.new_block(), proc.new_block(), proc.new_block())
        };
        let cond = module.proc_mut(p).alloc_temp(TempKind::Any);
        br(&mut module, p, ENTRY_BLOCK, head);
        module.proc_mut(p).emit(
            head,
            Opcode::Cbr,
            vec![cond],
            vec![Pseudo::Block(body), Pseudo::Block(end)],
        );
        br(&mut module, p, body, head);
        ret(&mut module, p, end);

        build_cfg(&session, &mut module, p).unwrap();
        let graph = module.proc(p).cfg.as_ref().unwrap();
        assert_eq!(graph.edge_kind(body.0, head.0), Some(EdgeKind::Backward));
        assert_eq!(session.stats().cfg_edges, 5);
    }

    #[test]
    fn test_empty_block_is_rejected() {
        let ctx = TestContext::new();
        let session = ctx.create_session();
        let mut module = Module::new();
        let p = module.new_proc(None);
        let b = module.proc_mut(p).new_block();
        br(&mut module, p, ENTRY_BLOCK, b);

        let err = build_cfg(&session, &mut module, p).unwrap_err();
        assert!(matches!(err, CompileError::UnterminatedBlock { proc: 0, block: 2 }));
    }

    #[test]
    fn test_non_terminator_is_rejected() {
        let ctx = TestContext::new();
        let session = ctx.create_session();
        let mut module = Module::new();
        let p = module.new_proc(None);
        module.proc_mut(p).emit(
            ENTRY_BLOCK,
            Opcode::Mov,
            vec![Pseudo::Nil],
            vec![Pseudo::TempAny(0)],
        );

        let err = build_cfg(&session, &mut module, p).unwrap_err();
        assert!(matches!(err, CompileError::UnterminatedBlock { proc: 0, block: 0 }));
    }

    #[test]
    fn test_children_get_their_own_graph() {
        let ctx = TestContext::new();
        let session = ctx.create_session();
        let mut module = Module::new();
        let root = module.new_proc(None);
        let child = module.new_proc(Some(root));
        ret(&mut module, root, ENTRY_BLOCK);
        ret(&mut module, child, ENTRY_BLOCK);

        build_cfg(&session, &mut module, root).unwrap();
        assert!(module.proc(child).cfg.is_some());
        assert!(module.proc(child).dominators.is_some());
        assert_eq!(session.stats().cfgs_built, 2);
    }
}
