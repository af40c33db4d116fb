// This module defines the Host trait, the bridge between the code generator and the runtime
// that will execute the compiled functions. The runtime owns one function prototype per proc;
// the generator never builds prototypes itself but drives the host through callbacks so the
// host's prototype tree stays a mirror of the proc tree: a child prototype per closure,
// string constants interned into the prototype's constant table (the returned index is what
// the generated C uses to address them), upvalue descriptors, parameter count and frame
// size. After the C unit is generated the host compiles it once and hands back function
// pointers by name, which are attached to their prototypes. The associated types keep the
// trait independent of how a host represents prototypes, compiled modules and functions.
// RecordingHost is the in-crate implementation: it records every callback as a HostEvent,
// which is what the driver binary and the tests use.

//! Host runtime callbacks.

use crate::core::{CompileError, CompileResult};
use crate::ir::TypeTag;
use hashbrown::HashMap;

/// Callbacks into the runtime that owns the function prototypes.
///
/// Every method may fail; a failure aborts the compilation unit with the
/// error the host returns.
pub trait Host {
    /// Handle to one function prototype.
    type Prototype: Clone;
    /// Result of compiling the generated C unit.
    type Module;
    /// Callable compiled function.
    type Function;

    /// Create the prototype for the next closure nested in `parent`.
    fn new_child_prototype(&mut self, parent: &Self::Prototype) -> CompileResult<Self::Prototype>;

    /// Add a string to the prototype's constant table, returning its index.
    fn intern_string_constant(&mut self, proto: &Self::Prototype, bytes: &[u8]) -> CompileResult<u32>;

    /// Append an upvalue descriptor to the prototype.
    fn declare_upvalue(
        &mut self,
        proto: &Self::Prototype,
        name: &str,
        source_index: u32,
        in_parent_local: bool,
        ty: TypeTag,
    ) -> CompileResult<()>;

    fn set_parameter_count(&mut self, proto: &Self::Prototype, count: u32) -> CompileResult<()>;

    fn set_max_stack_slots(&mut self, proto: &Self::Prototype, slots: u32) -> CompileResult<()>;

    fn attach_compiled_function(&mut self, proto: &Self::Prototype, function: Self::Function) -> CompileResult<()>;

    /// Compile a complete C translation unit.
    fn compile_native_source(&mut self, source: &str) -> CompileResult<Self::Module>;

    fn lookup_function(&mut self, module: &Self::Module, name: &str) -> CompileResult<Self::Function>;
}

/// One callback received by a [`RecordingHost`].
#[derive(Debug, Clone, PartialEq)]
pub enum HostEvent {
    NewChildPrototype { parent: u32, child: u32 },
    InternString { proto: u32, value: String, index: u32 },
    DeclareUpvalue {
        proto: u32,
        name: String,
        source_index: u32,
        in_parent_local: bool,
        ty: TypeTag,
    },
    SetParameterCount { proto: u32, count: u32 },
    SetMaxStackSlots { proto: u32, slots: u32 },
    CompileNativeSource { bytes: usize },
    LookupFunction { name: String },
    AttachCompiledFunction { proto: u32, function: String },
}

/// Prototype state kept by the recording host.
#[derive(Debug, Clone, Default)]
pub struct RecordedPrototype {
    pub parent: Option<u32>,
    pub children: Vec<u32>,
    pub strings: Vec<String>,
    pub upvalues: Vec<(String, u32, bool, TypeTag)>,
    pub num_params: u32,
    pub max_stack_slots: u32,
    pub function: Option<String>,
}

/// Host that records every callback instead of talking to a runtime.
///
/// Prototypes are plain indices, the first one (0) being the root. The
/// "compiled module" is the C source itself and functions are their names.
#[derive(Debug, Clone)]
pub struct RecordingHost {
    pub prototypes: Vec<RecordedPrototype>,
    pub events: Vec<HostEvent>,
    pub source: Option<String>,
    /// Per prototype, string constant to its index.
    interned: Vec<HashMap<String, u32>>,
    fail_compile: Option<String>,
}

impl RecordingHost {
    pub fn new() -> Self {
        Self {
            prototypes: vec![RecordedPrototype::default()],
            events: Vec::new(),
            source: None,
            interned: vec![HashMap::new()],
            fail_compile: None,
        }
    }

    /// Prototype handed to the compiler for the main function.
    pub fn root(&self) -> u32 {
        0
    }

    /// Make `compile_native_source` fail with `reason`.
    pub fn failing_compile(mut self, reason: &str) -> Self {
        self.fail_compile = Some(reason.to_string());
        self
    }

    pub fn prototype(&self, proto: u32) -> Option<&RecordedPrototype> {
        self.prototypes.get(proto as usize)
    }

    fn prototype_mut(&mut self, proto: u32) -> CompileResult<&mut RecordedPrototype> {
        self.prototypes.get_mut(proto as usize).ok_or_else(|| CompileError::Host {
            reason: format!("unknown prototype {}", proto),
        })
    }
}

impl Default for RecordingHost {
    fn default() -> Self {
        Self::new()
    }
}

impl Host for RecordingHost {
    type Prototype = u32;
    type Module = String;
    type Function = String;

    fn new_child_prototype(&mut self, parent: &u32) -> CompileResult<u32> {
        let child = self.prototypes.len() as u32;
        self.prototype_mut(*parent)?.children.push(child);
        self.prototypes.push(RecordedPrototype {
            parent: Some(*parent),
            ..RecordedPrototype::default()
        });
        self.interned.push(HashMap::new());
        self.events.push(HostEvent::NewChildPrototype {
            parent: *parent,
            child,
        });
        Ok(child)
    }

    fn intern_string_constant(&mut self, proto: &u32, bytes: &[u8]) -> CompileResult<u32> {
        let value = String::from_utf8_lossy(bytes).into_owned();
        let next = self.prototype_mut(*proto)?.strings.len() as u32;
        let table = &mut self.interned[*proto as usize];
        let index = *table.entry(value.clone()).or_insert(next);
        if index == next {
            self.prototypes[*proto as usize].strings.push(value.clone());
        }
        self.events.push(HostEvent::InternString {
            proto: *proto,
            value,
            index,
        });
        Ok(index)
    }

    fn declare_upvalue(
        &mut self,
        proto: &u32,
        name: &str,
        source_index: u32,
        in_parent_local: bool,
        ty: TypeTag,
    ) -> CompileResult<()> {
        self.prototype_mut(*proto)?
            .upvalues
            .push((name.to_string(), source_index, in_parent_local, ty));
        self.events.push(HostEvent::DeclareUpvalue {
            proto: *proto,
            name: name.to_string(),
            source_index,
            in_parent_local,
            ty,
        });
        Ok(())
    }

    fn set_parameter_count(&mut self, proto: &u32, count: u32) -> CompileResult<()> {
        self.prototype_mut(*proto)?.num_params = count;
        self.events.push(HostEvent::SetParameterCount { proto: *proto, count });
        Ok(())
    }

    fn set_max_stack_slots(&mut self, proto: &u32, slots: u32) -> CompileResult<()> {
        self.prototype_mut(*proto)?.max_stack_slots = slots;
        self.events.push(HostEvent::SetMaxStackSlots { proto: *proto, slots });
        Ok(())
    }

    fn attach_compiled_function(&mut self, proto: &u32, function: String) -> CompileResult<()> {
        self.prototype_mut(*proto)?.function = Some(function.clone());
        self.events.push(HostEvent::AttachCompiledFunction {
            proto: *proto,
            function,
        });
        Ok(())
    }

    fn compile_native_source(&mut self, source: &str) -> CompileResult<String> {
        if let Some(reason) = &self.fail_compile {
            return Err(CompileError::Host {
                reason: reason.clone(),
            });
        }
        self.events.push(HostEvent::CompileNativeSource { bytes: source.len() });
        self.source = Some(source.to_string());
        Ok(source.to_string())
    }

    fn lookup_function(&mut self, module: &String, name: &str) -> CompileResult<String> {
        self.events.push(HostEvent::LookupFunction {
            name: name.to_string(),
        });
        let definition = format!("int {}(ravel_State *L)", name);
        if !module.contains(&definition) {
            return Err(CompileError::Host {
                reason: format!("function {} not found in compiled module", name),
            });
        }
        Ok(name.to_string())
    }
}
