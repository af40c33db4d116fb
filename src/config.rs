//! Compiler configuration.

use crate::codegen::DEFAULT_PREAMBLE;

/// Default prefix of generated C function names.
pub const DEFAULT_FUNCTION_PREFIX: &str = "ravel_proc_";

/// Options controlling one compilation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompilerOptions {
    /// Prefix of every generated function name; the proc id is appended.
    pub function_prefix: String,

    /// Replacement for the built-in C preamble
    pub preamble_override: Option<String>,

    /// Whether the unit starts with the preamble at all. Hosts that compile
    /// generated units against their own header turn this off.
    pub emit_preamble: bool,
}

impl CompilerOptions {
    pub fn new() -> Self {
        Self {
            function_prefix: DEFAULT_FUNCTION_PREFIX.to_string(),
            preamble_override: None,
            emit_preamble: true,
        }
    }

    pub fn with_function_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.function_prefix = prefix.into();
        self
    }

    /// Use `preamble` instead of [`DEFAULT_PREAMBLE`].
    pub fn with_preamble(mut self, preamble: impl Into<String>) -> Self {
        self.preamble_override = Some(preamble.into());
        self.emit_preamble = true;
        self
    }

    pub fn without_preamble(mut self) -> Self {
        self.emit_preamble = false;
        self
    }

    /// Preamble text placed at the top of a generated unit.
    pub fn preamble(&self) -> &str {
        self.preamble_override.as_deref().unwrap_or(DEFAULT_PREAMBLE)
    }
}

impl Default for CompilerOptions {
    fn default() -> Self {
        Self::new()
    }
}
