//! Helpers for assembling typed syntax trees by hand.
//!
//! The front end normally produces trees; these helpers exist for tests,
//! embedders and tools that synthesise small programs.

use super::*;

/// Allocates function ids and symbols while a tree is being assembled.
#[derive(Debug, Default)]
pub struct TreeBuilder {
    symbols: SymbolTable,
    next_function: u32,
}

impl TreeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve the id of a new function body.
    pub fn function_id(&mut self) -> FunctionId {
        let id = FunctionId(self.next_function);
        self.next_function += 1;
        id
    }

    pub fn local(&mut self, function: FunctionId, name: &str, ty: VarType) -> SymbolId {
        self.symbols.add(Symbol {
            name: name.to_string(),
            ty,
            kind: SymbolKind::Local { function },
        })
    }

    /// Upvalue capturing `target`, at `index` in the capturing function's list.
    pub fn upvalue(&mut self, target: SymbolId, index: u32) -> SymbolId {
        let (name, ty) = self
            .symbols
            .get(target)
            .map(|s| (s.name.clone(), s.ty.clone()))
            .unwrap_or_default();
        self.symbols.add(Symbol {
            name,
            ty,
            kind: SymbolKind::Upvalue { target, index },
        })
    }

    pub fn global(&mut self, name: &str) -> SymbolId {
        self.symbols.add(Symbol {
            name: name.to_string(),
            ty: VarType::Any,
            kind: SymbolKind::Global,
        })
    }

    /// Reference to a symbol, typed with the symbol's declared type.
    pub fn var(&self, id: SymbolId) -> Expr {
        let ty = self.symbols.get(id).map(|s| s.ty.clone()).unwrap_or_default();
        Expr::symbol(id, ty)
    }

    pub fn symbols(&self) -> &SymbolTable {
        &self.symbols
    }

    pub fn finish(self, main: FunctionExpr) -> SyntaxTree {
        SyntaxTree {
            symbols: self.symbols,
            main,
        }
    }
}

impl Expr {
    pub fn new(ty: VarType, kind: ExprKind) -> Self {
        Self { ty, kind }
    }

    pub fn nil() -> Self {
        Self::new(VarType::Nil, ExprKind::Nil)
    }

    pub fn boolean(value: bool) -> Self {
        let kind = if value { ExprKind::True } else { ExprKind::False };
        Self::new(VarType::Boolean, kind)
    }

    pub fn int(value: i64) -> Self {
        Self::new(VarType::Integer, ExprKind::Integer(value))
    }

    pub fn num(value: f64) -> Self {
        Self::new(VarType::Number, ExprKind::Number(value))
    }

    pub fn string(value: &str) -> Self {
        Self::new(VarType::String, ExprKind::String(value.to_string()))
    }

    pub fn symbol(id: SymbolId, ty: VarType) -> Self {
        Self::new(ty, ExprKind::Symbol(id))
    }

    pub fn index(object: Expr, key: Expr, ty: VarType) -> Self {
        Self::new(
            ty,
            ExprKind::Index {
                object: Box::new(object),
                key: Box::new(key),
            },
        )
    }

    /// `object.name`
    pub fn field(object: Expr, name: &str) -> Self {
        Self::index(object, Expr::string(name), VarType::Any)
    }

    pub fn call(callee: Expr, args: Vec<Expr>) -> Self {
        Self::new(
            VarType::Any,
            ExprKind::Call {
                callee: Box::new(callee),
                args,
            },
        )
    }

    pub fn method_call(object: Expr, method: &str, args: Vec<Expr>) -> Self {
        Self::new(
            VarType::Any,
            ExprKind::MethodCall {
                object: Box::new(object),
                method: method.to_string(),
                args,
            },
        )
    }

    pub fn unary(op: UnaryOp, operand: Expr, ty: VarType) -> Self {
        Self::new(
            ty,
            ExprKind::Unary {
                op,
                operand: Box::new(operand),
            },
        )
    }

    pub fn binary(op: BinaryOp, lhs: Expr, rhs: Expr, ty: VarType) -> Self {
        Self::new(
            ty,
            ExprKind::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            },
        )
    }

    pub fn function(func: FunctionExpr) -> Self {
        Self::new(VarType::Function, ExprKind::Function(Box::new(func)))
    }

    pub fn table(items: Vec<TableItem>, ty: VarType) -> Self {
        Self::new(ty, ExprKind::Table(items))
    }
}

impl Block {
    pub fn new(stmts: Vec<Stmt>) -> Self {
        Self { stmts }
    }
}

impl FunctionExpr {
    pub fn new(id: FunctionId, params: Vec<SymbolId>, body: Vec<Stmt>) -> Self {
        Self {
            id,
            name: None,
            params,
            is_vararg: false,
            upvalues: Vec::new(),
            body: Block::new(body),
        }
    }

    pub fn with_upvalues(mut self, upvalues: Vec<SymbolId>) -> Self {
        self.upvalues = upvalues;
        self
    }

    pub fn named(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_symbols() {
        let mut b = TreeBuilder::new();
        let f = b.function_id();
        let x = b.local(f, "x", VarType::Integer);
        let up = b.upvalue(x, 0);
        let g = b.global("print");

        assert_eq!(b.var(x).ty, VarType::Integer);
        assert_eq!(b.var(up).ty, VarType::Integer);
        assert_eq!(
            b.symbols().get(up).map(|s| s.kind.clone()),
            Some(SymbolKind::Upvalue { target: x, index: 0 })
        );
        assert_eq!(b.symbols().get(g).map(|s| s.name.as_str()), Some("print"));
    }

    #[test]
    fn test_json_round_trip() {
        let mut b = TreeBuilder::new();
        let f = b.function_id();
        let x = b.local(f, "x", VarType::Integer);
        let body = vec![Stmt::Return(vec![Expr::binary(
            BinaryOp::Add,
            b.var(x),
            Expr::int(1),
            VarType::Integer,
        )])];
        let tree = b.finish(FunctionExpr::new(f, vec![x], body));

        let text = tree.to_json().unwrap();
        let back = SyntaxTree::from_json(&text).unwrap();
        assert_eq!(back, tree);
    }
}
