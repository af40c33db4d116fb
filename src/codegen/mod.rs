// This module drives C code generation for a whole module. The proc tree is walked parents
// first; for each proc the host prototype is brought up to date before any text is produced
// (upvalue descriptors, parameter count, every string constant interned so the emitter can
// address it by host index), the frame is laid out, the function body is emitted, and the
// frame size is reported back. Children get their prototypes from new_child_prototype in
// child-list order, so the child index a Closure instruction carries matches the host's
// prototype order. The generated unit is the preamble followed by one function per proc,
// each named <prefix><proc id>.

//! C code generation through host callbacks.

pub mod emit;
pub mod frame;
pub mod host;
pub mod preamble;

pub use frame::FrameLayout;
pub use host::{Host, HostEvent, RecordedPrototype, RecordingHost};
pub use preamble::DEFAULT_PREAMBLE;

use crate::config::CompilerOptions;
use crate::core::{CompilationSession, CompileResult};
use crate::ir::{ConstantValue, Module, ProcId};
use emit::FunctionEmitter;
use hashbrown::HashMap;

/// One generated C function and the prototype it belongs to.
#[derive(Debug, Clone)]
pub struct GeneratedFunction<P> {
    pub proc: ProcId,
    pub name: String,
    pub prototype: P,
    pub frame: FrameLayout,
}

/// A complete C translation unit.
#[derive(Debug, Clone)]
pub struct GeneratedUnit<P> {
    pub source: String,
    pub functions: Vec<GeneratedFunction<P>>,
}

pub struct CodeGenerator<'o> {
    options: &'o CompilerOptions,
}

impl<'o> CodeGenerator<'o> {
    pub fn new(options: &'o CompilerOptions) -> Self {
        Self { options }
    }

    /// Generate every proc of `module`, starting at the root proc whose
    /// prototype is `root`.
    pub fn generate<H: Host>(
        &self,
        session: &CompilationSession<'_>,
        module: &Module<'_>,
        host: &mut H,
        root: H::Prototype,
    ) -> CompileResult<GeneratedUnit<H::Prototype>> {
        let mut unit = GeneratedUnit {
            source: String::new(),
            functions: Vec::with_capacity(module.len()),
        };
        if self.options.emit_preamble {
            unit.source.push_str(self.options.preamble());
            unit.source.push('\n');
        }
        if let Some(id) = module.root() {
            self.generate_proc(session, module, id, host, root, &mut unit)?;
        }
        Ok(unit)
    }

    /// Name of the C function generated for `proc`.
    pub fn function_name(&self, proc: ProcId) -> String {
        format!("{}{}", self.options.function_prefix, proc.0)
    }

    fn generate_proc<H: Host>(
        &self,
        session: &CompilationSession<'_>,
        module: &Module<'_>,
        id: ProcId,
        host: &mut H,
        proto: H::Prototype,
        unit: &mut GeneratedUnit<H::Prototype>,
    ) -> CompileResult<()> {
        let proc = module.proc(id);
        for upvalue in &proc.upvalues {
            host.declare_upvalue(
                &proto,
                upvalue.name,
                upvalue.source_index,
                upvalue.in_parent_local,
                upvalue.ty,
            )?;
        }
        host.set_parameter_count(&proto, proc.num_params)?;

        let mut strings = HashMap::new();
        for (index, value) in proc.constants.iter() {
            if let ConstantValue::String(s) = value {
                strings.insert(index, host.intern_string_constant(&proto, s.as_bytes())?);
            }
        }

        let frame = FrameLayout::compute(proc);
        let name = self.function_name(id);
        let text = FunctionEmitter::new(proc, frame, &strings, &name).emit()?;
        host.set_max_stack_slots(&proto, frame.size())?;

        log::debug!("generated {} ({} bytes, {} stack slots)", name, text.len(), frame.size());
        session.record_function_generated(&name, text.len());
        unit.source.push_str(&text);
        unit.source.push('\n');
        unit.functions.push(GeneratedFunction {
            proc: id,
            name,
            prototype: proto.clone(),
            frame,
        });

        for &child in &proc.children {
            let child_proto = host.new_child_prototype(&proto)?;
            self.generate_proc(session, module, child, host, child_proto, unit)?;
        }
        Ok(())
    }
}
