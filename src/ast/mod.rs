// This module defines the typed syntax tree the back end consumes. The tree is produced by
// an external parser and type checker: every expression node carries its resolved static
// type (VarType) and every variable reference is a SymbolId into a SymbolTable, where each
// symbol is a local of some function, an upvalue (naming the captured local and its index
// in the capturing function's upvalue list) or a global. Functions and closures are
// FunctionExpr nodes with their parameters, upvalue list and body block. All types derive
// serde's Serialize/Deserialize so a front end can hand the tree over as JSON; build.rs
// contains the constructor helpers tests and embedders use to assemble trees by hand.

//! Typed syntax tree consumed by the linearizer.

pub mod build;

use serde::{Deserialize, Serialize};
use std::fmt;

/// Resolved static type of an expression or symbol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum VarType {
    #[default]
    Any,
    Integer,
    Number,
    IntegerArray,
    NumberArray,
    Table,
    String,
    Boolean,
    Nil,
    Function,
    UserDefined(String),
}

impl VarType {
    pub fn is_integer(&self) -> bool {
        matches!(self, VarType::Integer)
    }

    pub fn is_number(&self) -> bool {
        matches!(self, VarType::Number)
    }

    pub fn is_numeric(&self) -> bool {
        self.is_integer() || self.is_number()
    }

    pub fn is_array(&self) -> bool {
        matches!(self, VarType::IntegerArray | VarType::NumberArray)
    }
}

impl fmt::Display for VarType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VarType::Any => write!(f, "any"),
            VarType::Integer => write!(f, "integer"),
            VarType::Number => write!(f, "number"),
            VarType::IntegerArray => write!(f, "integer[]"),
            VarType::NumberArray => write!(f, "number[]"),
            VarType::Table => write!(f, "table"),
            VarType::String => write!(f, "string"),
            VarType::Boolean => write!(f, "boolean"),
            VarType::Nil => write!(f, "nil"),
            VarType::Function => write!(f, "closure"),
            VarType::UserDefined(name) => write!(f, "{}", name),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SymbolId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FunctionId(pub u32);

/// How a symbol is bound.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SymbolKind {
    /// Local variable (or parameter) of `function`.
    Local { function: FunctionId },
    /// Captured local `target`; `index` is its slot in the capturing
    /// function's upvalue list.
    Upvalue { target: SymbolId, index: u32 },
    /// Global variable, looked up by name at run time.
    Global,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Symbol {
    pub name: String,
    pub ty: VarType,
    pub kind: SymbolKind,
}

/// All symbols referenced by one syntax tree.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SymbolTable {
    symbols: Vec<Symbol>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, symbol: Symbol) -> SymbolId {
        let id = SymbolId(self.symbols.len() as u32);
        self.symbols.push(symbol);
        id
    }

    pub fn get(&self, id: SymbolId) -> Option<&Symbol> {
        self.symbols.get(id.0 as usize)
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnaryOp {
    Neg,
    Not,
    Len,
    BNot,
    ToInteger,
    ToNumber,
    ToIntegerArray,
    ToNumberArray,
    ToTable,
    ToString,
    ToClosure,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    IDiv,
    Mod,
    Pow,
    Concat,
    BAnd,
    BOr,
    BXor,
    Shl,
    Shr,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

/// An expression with its resolved type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expr {
    pub ty: VarType,
    pub kind: ExprKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ExprKind {
    Nil,
    True,
    False,
    Integer(i64),
    Number(f64),
    String(String),
    Vararg,
    Symbol(SymbolId),
    /// `object[key]`, and `object.name` with a string literal key.
    Index {
        object: Box<Expr>,
        key: Box<Expr>,
    },
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
    },
    /// `object:method(args)`.
    MethodCall {
        object: Box<Expr>,
        method: String,
        args: Vec<Expr>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Function(Box<FunctionExpr>),
    Table(Vec<TableItem>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TableItem {
    Positional(Expr),
    Named(String, Expr),
    Keyed(Expr, Expr),
}

/// A lexical block; locals declared inside go out of scope at its end.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub stmts: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IfClause {
    pub cond: Expr,
    pub body: Block,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Stmt {
    Local {
        vars: Vec<SymbolId>,
        exprs: Vec<Expr>,
    },
    LocalFunction {
        var: SymbolId,
        func: Box<FunctionExpr>,
    },
    Assign {
        targets: Vec<Expr>,
        exprs: Vec<Expr>,
    },
    Expr(Expr),
    Return(Vec<Expr>),
    Do(Block),
    If {
        clauses: Vec<IfClause>,
        else_block: Option<Block>,
    },
    While {
        cond: Expr,
        body: Block,
    },
    Repeat {
        body: Block,
        cond: Expr,
    },
    NumericFor {
        var: SymbolId,
        start: Expr,
        limit: Expr,
        step: Option<Expr>,
        body: Block,
    },
    GenericFor {
        vars: Vec<SymbolId>,
        exprs: Vec<Expr>,
        body: Block,
    },
    Break,
    Goto(String),
    Label(String),
}

/// A function body: the main chunk or any closure literal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionExpr {
    pub id: FunctionId,
    pub name: Option<String>,
    pub params: Vec<SymbolId>,
    pub is_vararg: bool,
    /// Upvalue symbols in index order.
    pub upvalues: Vec<SymbolId>,
    pub body: Block,
}

/// Type-checked input of one compilation unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyntaxTree {
    pub symbols: SymbolTable,
    pub main: FunctionExpr,
}

impl SyntaxTree {
    /// Read a tree serialised by an external front end.
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
