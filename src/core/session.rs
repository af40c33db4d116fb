// This module provides arena-based compilation session management using the bumpalo crate.
// CompilationSession owns a borrowed Bump arena for the lifetime of one compilation unit and
// is the single place where strings that outlive the syntax tree (symbol names, string
// constants, upvalue names) are interned, so IR pseudos can carry plain &'arena str slices
// and stay Copy. The session also gathers SessionStats while the pipeline runs: procs
// linearized, blocks and instructions emitted (with a per-opcode breakdown), constants
// interned, load-to-store rewrites, CFG edges, and the size of the generated C source per
// function. Nothing allocated in the arena is ever freed individually; the whole unit is
// released when the arena is dropped.

//! Arena-based compilation session management.
//!
//! All strings referenced by the IR are interned in the session arena, so the
//! IR can be torn down as a unit together with the arena.

use bumpalo::Bump;
use hashbrown::HashSet;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;

/// Arena-based compilation session.
pub struct CompilationSession<'arena> {
    /// Arena holding the interned strings.
    arena: &'arena Bump,

    /// Session statistics for debugging and tuning.
    stats: RefCell<SessionStats>,

    /// String interning so equal names share one arena slice.
    interned_strings: RefCell<HashSet<&'arena str>>,
}

impl<'arena> CompilationSession<'arena> {
    /// Create a new compilation session with the given arena.
    pub fn new(arena: &'arena Bump) -> Self {
        Self {
            arena,
            stats: RefCell::new(SessionStats::default()),
            interned_strings: RefCell::new(HashSet::new()),
        }
    }

    /// Intern a string in the arena.
    pub fn intern_str(&self, s: &str) -> &'arena str {
        let mut strings = self.interned_strings.borrow_mut();
        if let Some(&interned) = strings.get(s) {
            return interned;
        }

        let interned: &'arena str = self.arena.alloc_str(s);
        strings.insert(interned);
        interned
    }

    /// Record that a proc finished linearization.
    pub fn record_proc_linearized(&self, blocks: usize, instructions: usize) {
        let mut stats = self.stats.borrow_mut();
        stats.procs_linearized += 1;
        stats.blocks_created += blocks;
        stats.instructions_emitted += instructions;
    }

    /// Record an emitted instruction by opcode name.
    pub fn record_instruction(&self, opcode: &str) {
        let mut stats = self.stats.borrow_mut();
        *stats
            .instruction_counts
            .entry(opcode.to_string())
            .or_insert(0) += 1;
    }

    /// Record a newly interned constant.
    pub fn record_constant_interned(&self) {
        self.stats.borrow_mut().constants_interned += 1;
    }

    /// Record a load instruction rewritten into a store.
    pub fn record_load_rewritten(&self) {
        self.stats.borrow_mut().load_store_rewrites += 1;
    }

    /// Record the edges of a freshly built CFG.
    pub fn record_cfg_built(&self, edges: usize) {
        let mut stats = self.stats.borrow_mut();
        stats.cfgs_built += 1;
        stats.cfg_edges += edges;
    }

    /// Record that a C function body was generated.
    pub fn record_function_generated(&self, name: &str, source_size: usize) {
        let mut stats = self.stats.borrow_mut();
        stats.functions_generated += 1;
        stats.total_source_size += source_size;

        if stats.largest_function_size < source_size {
            stats.largest_function_size = source_size;
            stats.largest_function_name = name.to_string();
        }
    }

    /// Get compilation statistics.
    pub fn stats(&self) -> SessionStats {
        self.stats.borrow().clone()
    }
}

/// Compilation session statistics.
#[derive(Debug, Default, Clone)]
pub struct SessionStats {
    /// Number of procs linearized.
    pub procs_linearized: usize,

    /// Basic blocks created by the linearizer.
    pub blocks_created: usize,

    /// Instructions emitted by the linearizer.
    pub instructions_emitted: usize,

    /// Count of each opcode emitted.
    pub instruction_counts: HashMap<String, usize>,

    /// Distinct constants interned across all procs.
    pub constants_interned: usize,

    /// Loads rewritten into stores by assignments.
    pub load_store_rewrites: usize,

    /// Number of CFGs built.
    pub cfgs_built: usize,

    /// Total edges across all CFGs.
    pub cfg_edges: usize,

    /// Number of C functions generated.
    pub functions_generated: usize,

    /// Total generated C source size (bytes).
    pub total_source_size: usize,

    /// Largest generated function.
    pub largest_function_size: usize,

    /// Name of largest generated function.
    pub largest_function_name: String,
}

impl fmt::Display for SessionStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Compilation Session Statistics:")?;
        writeln!(f, "  Procs linearized: {}", self.procs_linearized)?;
        writeln!(f, "  Blocks created: {}", self.blocks_created)?;
        writeln!(f, "  Instructions emitted: {}", self.instructions_emitted)?;
        writeln!(f, "  Constants interned: {}", self.constants_interned)?;
        writeln!(f, "  Load/store rewrites: {}", self.load_store_rewrites)?;
        writeln!(f, "  CFG edges: {} ({} graphs)", self.cfg_edges, self.cfgs_built)?;
        writeln!(f, "  Functions generated: {}", self.functions_generated)?;
        writeln!(f, "  Total source size: {} bytes", self.total_source_size)?;

        if !self.largest_function_name.is_empty() {
            writeln!(
                f,
                "  Largest function: {} ({} bytes)",
                self.largest_function_name, self.largest_function_size
            )?;
        }

        if !self.instruction_counts.is_empty() {
            writeln!(f, "  Instruction breakdown:")?;
            let mut sorted: Vec<_> = self.instruction_counts.iter().collect();
            sorted.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));

            for (opcode, count) in sorted.into_iter().take(10) {
                writeln!(f, "    {}: {}", opcode, count)?;
            }
        }

        Ok(())
    }
}
