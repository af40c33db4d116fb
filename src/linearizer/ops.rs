//! Opcode selection tables.
//!
//! Every specialised opcode is picked by an explicit match on the operator and
//! the static classes of its operands, never by offsetting a base opcode.

use crate::ast::{BinaryOp, UnaryOp, VarType};
use crate::ir::{Opcode, TempKind, TypeTag};

/// Static operand class used as the specialisation key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandClass {
    Int,
    Float,
    Other,
}

impl OperandClass {
    pub fn of(ty: &VarType) -> Self {
        match ty {
            VarType::Integer => OperandClass::Int,
            VarType::Number => OperandClass::Float,
            _ => OperandClass::Other,
        }
    }
}

/// Specialised opcode and the pool its result comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Specialized {
    pub opcode: Opcode,
    pub result: TempKind,
}

const fn spec(opcode: Opcode, result: TempKind) -> Specialized {
    Specialized { opcode, result }
}

/// Operator after the swap rules, and how to get there.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Canonical {
    pub op: BinaryOp,
    /// Emit the operands in reverse order.
    pub swap: bool,
    /// Follow the instruction with a `Not`.
    pub negate: bool,
}

/// Apply the swap rules: `>`/`>=` become `<`/`<=` with swapped operands,
/// `~=` becomes `==` plus `not`, and a commutative op with a float first and
/// an integer second is reordered so the float comes second.
pub fn canonicalize(op: BinaryOp, lhs: OperandClass, rhs: OperandClass) -> Canonical {
    use OperandClass::*;
    let (op, swap, negate) = match (op, lhs, rhs) {
        (BinaryOp::Gt, _, _) => (BinaryOp::Lt, true, false),
        (BinaryOp::Ge, _, _) => (BinaryOp::Le, true, false),
        (BinaryOp::Ne, _, _) => (BinaryOp::Eq, false, true),
        (BinaryOp::Add | BinaryOp::Mul, Float, Int) => (op, true, false),
        _ => (op, false, false),
    };
    Canonical { op, swap, negate }
}

/// Opcode for a canonical binary operator. `and`/`or` are lowered to control
/// flow and have no entry.
pub fn specialize_binary(op: BinaryOp, lhs: OperandClass, rhs: OperandClass) -> Option<Specialized> {
    use OperandClass::{Float as F, Int as I};
    use TempKind::{Any, Float, Int};
    let s = match (op, lhs, rhs) {
        (BinaryOp::Add, I, I) => spec(Opcode::AddII, Int),
        (BinaryOp::Add, I, F) => spec(Opcode::AddIF, Float),
        (BinaryOp::Add, F, F) => spec(Opcode::AddFF, Float),
        (BinaryOp::Add, _, _) => spec(Opcode::Add, Any),

        (BinaryOp::Sub, I, I) => spec(Opcode::SubII, Int),
        (BinaryOp::Sub, I, F) => spec(Opcode::SubIF, Float),
        (BinaryOp::Sub, F, I) => spec(Opcode::SubFI, Float),
        (BinaryOp::Sub, F, F) => spec(Opcode::SubFF, Float),
        (BinaryOp::Sub, _, _) => spec(Opcode::Sub, Any),

        (BinaryOp::Mul, I, I) => spec(Opcode::MulII, Int),
        (BinaryOp::Mul, I, F) => spec(Opcode::MulIF, Float),
        (BinaryOp::Mul, F, F) => spec(Opcode::MulFF, Float),
        (BinaryOp::Mul, _, _) => spec(Opcode::Mul, Any),

        (BinaryOp::Div, I, I) => spec(Opcode::DivII, Float),
        (BinaryOp::Div, I, F) => spec(Opcode::DivIF, Float),
        (BinaryOp::Div, F, I) => spec(Opcode::DivFI, Float),
        (BinaryOp::Div, F, F) => spec(Opcode::DivFF, Float),
        (BinaryOp::Div, _, _) => spec(Opcode::Div, Any),

        (BinaryOp::IDiv, _, _) => spec(Opcode::IDiv, Any),
        (BinaryOp::Mod, _, _) => spec(Opcode::Mod, Any),
        (BinaryOp::Pow, _, _) => spec(Opcode::Pow, Any),
        (BinaryOp::Concat, _, _) => spec(Opcode::Concat, Any),

        (BinaryOp::BAnd, I, I) => spec(Opcode::BAndII, Int),
        (BinaryOp::BAnd, _, _) => spec(Opcode::BAnd, Any),
        (BinaryOp::BOr, I, I) => spec(Opcode::BOrII, Int),
        (BinaryOp::BOr, _, _) => spec(Opcode::BOr, Any),
        (BinaryOp::BXor, I, I) => spec(Opcode::BXorII, Int),
        (BinaryOp::BXor, _, _) => spec(Opcode::BXor, Any),
        (BinaryOp::Shl, I, I) => spec(Opcode::ShlII, Int),
        (BinaryOp::Shl, _, _) => spec(Opcode::Shl, Any),
        (BinaryOp::Shr, I, I) => spec(Opcode::ShrII, Int),
        (BinaryOp::Shr, _, _) => spec(Opcode::Shr, Any),

        (BinaryOp::Eq, I, I) => spec(Opcode::EqII, Any),
        (BinaryOp::Eq, F, F) => spec(Opcode::EqFF, Any),
        (BinaryOp::Eq, _, _) => spec(Opcode::Eq, Any),
        (BinaryOp::Lt, I, I) => spec(Opcode::LtII, Any),
        (BinaryOp::Lt, F, F) => spec(Opcode::LtFF, Any),
        (BinaryOp::Lt, _, _) => spec(Opcode::Lt, Any),
        (BinaryOp::Le, I, I) => spec(Opcode::LeII, Any),
        (BinaryOp::Le, F, F) => spec(Opcode::LeFF, Any),
        (BinaryOp::Le, _, _) => spec(Opcode::Le, Any),

        (BinaryOp::Ne | BinaryOp::Gt | BinaryOp::Ge | BinaryOp::And | BinaryOp::Or, _, _) => {
            return None
        }
    };
    Some(s)
}

pub fn specialize_unary(op: UnaryOp, operand: &VarType) -> Specialized {
    use TempKind::{Any, Float, Int};
    match (op, OperandClass::of(operand)) {
        (UnaryOp::Neg, OperandClass::Int) => spec(Opcode::UnmI, Int),
        (UnaryOp::Neg, OperandClass::Float) => spec(Opcode::UnmF, Float),
        (UnaryOp::Neg, _) => spec(Opcode::Unm, Any),
        (UnaryOp::Not, _) => spec(Opcode::Not, Any),
        (UnaryOp::Len, _) if operand.is_array() => spec(Opcode::LenI, Int),
        (UnaryOp::Len, _) => spec(Opcode::Len, Any),
        (UnaryOp::BNot, _) => spec(Opcode::BNot, Any),
        (UnaryOp::ToInteger, _) => spec(Opcode::ToInt, Int),
        (UnaryOp::ToNumber, _) => spec(Opcode::ToFlt, Float),
        (UnaryOp::ToIntegerArray, _) => spec(Opcode::ToIArray, Any),
        (UnaryOp::ToNumberArray, _) => spec(Opcode::ToFArray, Any),
        (UnaryOp::ToTable, _) => spec(Opcode::ToTable, Any),
        (UnaryOp::ToString, _) => spec(Opcode::ToString, Any),
        (UnaryOp::ToClosure, _) => spec(Opcode::ToClosure, Any),
    }
}

/// Shape of an index key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyClass {
    Int,
    StringConstant,
    Other,
}

/// Load opcode for `container[key]`.
pub fn specialize_load(container: &VarType, key: KeyClass) -> Specialized {
    use TempKind::{Any, Float, Int};
    match (container, key) {
        (VarType::IntegerArray, KeyClass::Int) => spec(Opcode::IArrayGet, Int),
        (VarType::NumberArray, KeyClass::Int) => spec(Opcode::FArrayGet, Float),
        (VarType::Table, KeyClass::StringConstant) => spec(Opcode::TableGetSK, Any),
        (VarType::Table, KeyClass::Int) => spec(Opcode::TableGetIK, Any),
        (VarType::Table, KeyClass::Other) => spec(Opcode::TableGet, Any),
        (_, KeyClass::StringConstant) => spec(Opcode::GetSK, Any),
        (_, KeyClass::Int) => spec(Opcode::GetIK, Any),
        (_, KeyClass::Other) => spec(Opcode::Get, Any),
    }
}

/// Guard or conversion moving a `src` value into a `dest` slot.
pub fn move_opcode(dest: TypeTag, src: TypeTag) -> Opcode {
    match (dest, src) {
        (TypeTag::Integer, TypeTag::Integer) => Opcode::MovI,
        (TypeTag::Integer, TypeTag::Number) => Opcode::MovFI,
        (TypeTag::Integer, _) => Opcode::ToInt,
        (TypeTag::Number, TypeTag::Number) => Opcode::MovF,
        (TypeTag::Number, TypeTag::Integer) => Opcode::MovIF,
        (TypeTag::Number, _) => Opcode::ToFlt,
        (TypeTag::IntegerArray, s) if s != TypeTag::IntegerArray => Opcode::ToIArray,
        (TypeTag::NumberArray, s) if s != TypeTag::NumberArray => Opcode::ToFArray,
        (TypeTag::Table, s) if s != TypeTag::Table => Opcode::ToTable,
        (TypeTag::String, s) if s != TypeTag::String => Opcode::ToString,
        (TypeTag::Closure, s) if s != TypeTag::Closure => Opcode::ToClosure,
        _ => Opcode::Mov,
    }
}

/// Entry guard for a typed parameter.
pub fn param_guard(ty: TypeTag) -> Option<Opcode> {
    match ty {
        TypeTag::Integer => Some(Opcode::ToInt),
        TypeTag::Number => Some(Opcode::ToFlt),
        TypeTag::IntegerArray => Some(Opcode::ToIArray),
        TypeTag::NumberArray => Some(Opcode::ToFArray),
        TypeTag::Table => Some(Opcode::ToTable),
        TypeTag::String => Some(Opcode::ToString),
        TypeTag::Closure => Some(Opcode::ToClosure),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::OperandClass::*;
    use super::*;

    #[test]
    fn test_commutative_swap_puts_float_second() {
        let c = canonicalize(BinaryOp::Add, Float, Int);
        assert!(c.swap);
        let s = specialize_binary(c.op, Int, Float).unwrap();
        assert_eq!(s.opcode, Opcode::AddIF);
        assert_eq!(s.result, TempKind::Float);

        assert!(!canonicalize(BinaryOp::Sub, Float, Int).swap);
        assert_eq!(specialize_binary(BinaryOp::Sub, Float, Int).unwrap().opcode, Opcode::SubFI);
    }

    #[test]
    fn test_relational_duals() {
        let gt = canonicalize(BinaryOp::Gt, Int, Int);
        assert_eq!((gt.op, gt.swap, gt.negate), (BinaryOp::Lt, true, false));
        let ge = canonicalize(BinaryOp::Ge, Other, Other);
        assert_eq!((ge.op, ge.swap), (BinaryOp::Le, true));
        let ne = canonicalize(BinaryOp::Ne, Float, Float);
        assert_eq!((ne.op, ne.swap, ne.negate), (BinaryOp::Eq, false, true));
        assert_eq!(specialize_binary(BinaryOp::Ne, Int, Int), None);
    }

    #[test]
    fn test_result_kinds() {
        assert_eq!(specialize_binary(BinaryOp::Add, Int, Int).unwrap().result, TempKind::Int);
        assert_eq!(specialize_binary(BinaryOp::Div, Int, Int).unwrap().result, TempKind::Float);
        assert_eq!(specialize_binary(BinaryOp::IDiv, Int, Int).unwrap().opcode, Opcode::IDiv);
        let le = specialize_binary(BinaryOp::Le, Int, Int).unwrap();
        assert_eq!((le.opcode, le.result), (Opcode::LeII, TempKind::Any));
        assert_eq!(specialize_binary(BinaryOp::Add, Other, Int).unwrap().opcode, Opcode::Add);
    }

    #[test]
    fn test_load_and_move_tables() {
        let s = specialize_load(&VarType::IntegerArray, KeyClass::Int);
        assert_eq!((s.opcode, s.result), (Opcode::IArrayGet, TempKind::Int));
        assert_eq!(specialize_load(&VarType::Table, KeyClass::StringConstant).opcode, Opcode::TableGetSK);
        assert_eq!(specialize_load(&VarType::Any, KeyClass::Other).opcode, Opcode::Get);
        assert_eq!(specialize_load(&VarType::IntegerArray, KeyClass::Other).opcode, Opcode::Get);

        assert_eq!(move_opcode(TypeTag::Integer, TypeTag::Any), Opcode::ToInt);
        assert_eq!(move_opcode(TypeTag::Number, TypeTag::Integer), Opcode::MovIF);
        assert_eq!(move_opcode(TypeTag::Table, TypeTag::Table), Opcode::Mov);
        assert_eq!(move_opcode(TypeTag::Any, TypeTag::Integer), Opcode::Mov);
    }
}
