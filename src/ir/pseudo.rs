//! Operand and result descriptors.

use super::{BlockId, ProcId};
use crate::ast::VarType;
use std::fmt;

/// Static type of a slot, reduced to what the code generator cares about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeTag {
    Any,
    Integer,
    Number,
    IntegerArray,
    NumberArray,
    Table,
    String,
    Boolean,
    Nil,
    Closure,
    UserDefined,
}

impl From<&VarType> for TypeTag {
    fn from(ty: &VarType) -> Self {
        match ty {
            VarType::Any => TypeTag::Any,
            VarType::Integer => TypeTag::Integer,
            VarType::Number => TypeTag::Number,
            VarType::IntegerArray => TypeTag::IntegerArray,
            VarType::NumberArray => TypeTag::NumberArray,
            VarType::Table => TypeTag::Table,
            VarType::String => TypeTag::String,
            VarType::Boolean => TypeTag::Boolean,
            VarType::Nil => TypeTag::Nil,
            VarType::Function => TypeTag::Closure,
            VarType::UserDefined(_) => TypeTag::UserDefined,
        }
    }
}

impl TypeTag {
    pub fn as_str(self) -> &'static str {
        match self {
            TypeTag::Any => "any",
            TypeTag::Integer => "integer",
            TypeTag::Number => "number",
            TypeTag::IntegerArray => "integer[]",
            TypeTag::NumberArray => "number[]",
            TypeTag::Table => "table",
            TypeTag::String => "string",
            TypeTag::Boolean => "boolean",
            TypeTag::Nil => "nil",
            TypeTag::Closure => "closure",
            TypeTag::UserDefined => "userdata",
        }
    }
}

/// A variable binding as seen by the IR.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SymbolRef<'a> {
    /// Local variable living in stack slot `reg`.
    Local { name: &'a str, reg: u32, ty: TypeTag },
    /// Captured variable at `index` in the closure's upvalue array.
    Upvalue { name: &'a str, index: u32, ty: TypeTag },
    /// Global binding; has no register.
    Global { name: &'a str },
}

impl<'a> SymbolRef<'a> {
    pub fn name(&self) -> &'a str {
        match *self {
            SymbolRef::Local { name, .. }
            | SymbolRef::Upvalue { name, .. }
            | SymbolRef::Global { name } => name,
        }
    }

    pub fn ty(&self) -> TypeTag {
        match *self {
            SymbolRef::Local { ty, .. } | SymbolRef::Upvalue { ty, .. } => ty,
            SymbolRef::Global { .. } => TypeTag::Any,
        }
    }
}

/// Register pool a temporary is drawn from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TempKind {
    Int,
    Float,
    Any,
}

/// Tagged operand/result descriptor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Pseudo<'a> {
    Symbol(SymbolRef<'a>),
    /// Native integer held in a C local.
    TempInt(u32),
    /// Native float held in a C local.
    TempFloat(u32),
    /// Tagged value in a stack slot above the locals.
    TempAny(u32),
    /// Index into the owning proc's constant pool.
    Constant(u32),
    /// Child closure, only used by `Closure`.
    Proc(ProcId),
    Nil,
    True,
    False,
    Block(BlockId),
    /// `count` values starting at generic temp `base`; -1 runs to the stack top.
    Range { base: u32, count: i32 },
    /// Value `index` of the range starting at `base`.
    RangeSelect { base: u32, index: u32 },
}

/// Register space a pseudo lives in, used for storage identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StorageClass {
    Local,
    Upvalue,
    Int,
    Float,
    Stack,
}

impl<'a> Pseudo<'a> {
    pub fn temp(kind: TempKind, reg: u32) -> Self {
        match kind {
            TempKind::Int => Pseudo::TempInt(reg),
            TempKind::Float => Pseudo::TempFloat(reg),
            TempKind::Any => Pseudo::TempAny(reg),
        }
    }

    pub fn is_temp(&self) -> bool {
        matches!(
            self,
            Pseudo::TempInt(_) | Pseudo::TempFloat(_) | Pseudo::TempAny(_)
        )
    }

    /// Unbounded call-result range.
    pub fn is_open_range(&self) -> bool {
        matches!(self, Pseudo::Range { count: -1, .. })
    }

    pub fn as_block(&self) -> Option<BlockId> {
        match *self {
            Pseudo::Block(b) => Some(b),
            _ => None,
        }
    }

    fn storage(&self) -> Option<(StorageClass, u32)> {
        match *self {
            Pseudo::Symbol(SymbolRef::Local { reg, .. }) => Some((StorageClass::Local, reg)),
            Pseudo::Symbol(SymbolRef::Upvalue { index, .. }) => {
                Some((StorageClass::Upvalue, index))
            }
            Pseudo::TempInt(r) => Some((StorageClass::Int, r)),
            Pseudo::TempFloat(r) => Some((StorageClass::Float, r)),
            Pseudo::TempAny(r) | Pseudo::Range { base: r, .. } => Some((StorageClass::Stack, r)),
            Pseudo::RangeSelect { base, index } => Some((StorageClass::Stack, base + index)),
            _ => None,
        }
    }

    /// True when both pseudos name the same register of the same kind.
    /// Constants, sentinels and globals never share storage.
    pub fn same_storage(&self, other: &Pseudo<'_>) -> bool {
        match (self.storage(), other.storage()) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for Pseudo<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Pseudo::Symbol(SymbolRef::Local { name, reg, .. }) => write!(f, "local({}, {})", name, reg),
            Pseudo::Symbol(SymbolRef::Upvalue { name, index, .. }) => {
                write!(f, "Upval({}, {})", name, index)
            }
            Pseudo::Symbol(SymbolRef::Global { name }) => write!(f, "global({})", name),
            Pseudo::TempInt(r) => write!(f, "Tint({})", r),
            Pseudo::TempFloat(r) => write!(f, "Tflt({})", r),
            Pseudo::TempAny(r) => write!(f, "T({})", r),
            Pseudo::Constant(k) => write!(f, "K({})", k),
            Pseudo::Proc(p) => write!(f, "Proc%{}", p.0),
            Pseudo::Nil => write!(f, "nil"),
            Pseudo::True => write!(f, "true"),
            Pseudo::False => write!(f, "false"),
            Pseudo::Block(b) => write!(f, "L{}", b.0),
            Pseudo::Range { base, count: -1 } => write!(f, "T({}..)", base),
            Pseudo::Range { base, count } => write!(f, "T({}..{})", base, base + *count as u32),
            Pseudo::RangeSelect { base, index } => write!(f, "T({}[{}])", base, index),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_storage() {
        let a = Pseudo::TempAny(2);
        assert!(a.same_storage(&Pseudo::TempAny(2)));
        assert!(!a.same_storage(&Pseudo::TempInt(2)));
        assert!(a.same_storage(&Pseudo::Range { base: 2, count: -1 }));
        assert!(a.same_storage(&Pseudo::RangeSelect { base: 2, index: 0 }));

        let x = Pseudo::Symbol(SymbolRef::Local { name: "x", reg: 0, ty: TypeTag::Any });
        let y = Pseudo::Symbol(SymbolRef::Local { name: "y", reg: 0, ty: TypeTag::Integer });
        assert!(x.same_storage(&y));
        assert!(!x.same_storage(&Pseudo::TempAny(0)));
    }

    #[test]
    fn test_constants_and_globals_never_alias() {
        assert!(!Pseudo::Constant(0).same_storage(&Pseudo::Constant(0)));
        assert!(!Pseudo::Nil.same_storage(&Pseudo::Nil));
        let g = Pseudo::Symbol(SymbolRef::Global { name: "print" });
        assert!(!g.same_storage(&g));
    }

    #[test]
    fn test_display() {
        assert_eq!(Pseudo::Range { base: 1, count: -1 }.to_string(), "T(1..)");
        assert_eq!(Pseudo::Range { base: 1, count: 2 }.to_string(), "T(1..3)");
        assert_eq!(Pseudo::RangeSelect { base: 1, index: 0 }.to_string(), "T(1[0])");
        assert_eq!(Pseudo::TempInt(3).to_string(), "Tint(3)");
    }
}
