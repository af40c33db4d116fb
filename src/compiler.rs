// This module ties the pipeline together. A Compiler borrows the session of one compilation
// unit and owns its options; compile() runs the stages strictly in order over the whole
// unit: linearize the tree, build the CFG and dominator tree of every proc, generate the C
// unit through the host, have the host compile that unit once, then look up each generated
// function by name and attach it to its prototype. Any error from any stage aborts the
// unit; nothing is attached unless the native compile succeeded. lower() stops after the
// analysis stages, which is what tools that only inspect the IR need.

//! End-to-end compilation pipeline.

use crate::ast::SyntaxTree;
use crate::cfg::build_cfg;
use crate::codegen::{CodeGenerator, GeneratedUnit, Host};
use crate::config::CompilerOptions;
use crate::core::{CompilationSession, CompileResult};
use crate::ir::Module;
use crate::linearizer::linearize;

/// Result of compiling one unit.
#[derive(Debug)]
pub struct CompiledUnit<'a, P> {
    pub module: Module<'a>,
    pub unit: GeneratedUnit<P>,
}

pub struct Compiler<'s, 'a> {
    session: &'s CompilationSession<'a>,
    options: CompilerOptions,
}

impl<'s, 'a> Compiler<'s, 'a> {
    pub fn new(session: &'s CompilationSession<'a>, options: CompilerOptions) -> Self {
        Self { session, options }
    }

    pub fn session(&self) -> &'s CompilationSession<'a> {
        self.session
    }

    pub fn options(&self) -> &CompilerOptions {
        &self.options
    }

    /// Linearize `tree` and attach a CFG and dominator tree to every proc.
    pub fn lower(&self, tree: &SyntaxTree) -> CompileResult<Module<'a>> {
        let mut module = linearize(self.session, tree)?;
        if let Some(root) = module.root() {
            build_cfg(self.session, &mut module, root)?;
        }
        log::debug!("lowered {} procs", module.len());
        Ok(module)
    }

    /// Generate the C unit for an already lowered module.
    pub fn generate<H: Host>(
        &self,
        module: &Module<'a>,
        host: &mut H,
        root: H::Prototype,
    ) -> CompileResult<GeneratedUnit<H::Prototype>> {
        CodeGenerator::new(&self.options).generate(self.session, module, host, root)
    }

    /// Run the whole pipeline, attaching one compiled function to each
    /// prototype of the tree rooted at `root`.
    pub fn compile<H: Host>(
        &self,
        tree: &SyntaxTree,
        host: &mut H,
        root: H::Prototype,
    ) -> CompileResult<CompiledUnit<'a, H::Prototype>> {
        let module = self.lower(tree)?;
        let unit = self.generate(&module, host, root)?;

        let native = host.compile_native_source(&unit.source)?;
        for function in &unit.functions {
            let compiled = host.lookup_function(&native, &function.name)?;
            host.attach_compiled_function(&function.prototype, compiled)?;
            log::info!(
                "compiled {} ({} stack slots)",
                function.name,
                function.frame.size()
            );
        }
        Ok(CompiledUnit { module, unit })
    }
}
