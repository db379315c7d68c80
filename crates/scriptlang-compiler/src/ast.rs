//! Plain, arena-indexed AST. Every node carries its own [`Span`]; no
//! lossless trivia (whitespace/comments) is retained, since the language
//! doesn't need source round-tripping, only diagnostics and lowering.

use scriptlang_core::{Arena, Id, Span, Symbol};

pub type ExprId = Id<ExprNode>;
pub type StmtId = Id<StmtNode>;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum UnOp {
    Not,
    Neg,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    And,
    Or,
    BitAnd,
    BitOr,
    BitXor,
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
}

/// A declarator chain: a base type name plus `Array`/`Ref` wrappers applied
/// outside-in, exactly as written (`INT[4]` parses to `Array(Named("INT"), 4)`,
/// `REF INT` to `Ref(Named("INT"))`).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TypeExpr {
    Named(Symbol),
    Array(Box<TypeExpr>, u32),
    Ref(Box<TypeExpr>),
}

#[derive(Clone, Debug, PartialEq)]
pub enum ExprKind {
    Ident(Symbol),
    IntLit(i64),
    FloatLit(f64),
    BoolLit(bool),
    StringLit(Symbol),
    Paren(ExprId),
    Member(ExprId, Symbol),
    Index(ExprId, ExprId),
    Call(ExprId, Vec<ExprId>),
    Unary(UnOp, ExprId),
    Binary(BinOp, ExprId, ExprId),
    Vector(Vec<ExprId>),
}

#[derive(Clone, Debug, PartialEq)]
pub struct ExprNode {
    pub kind: ExprKind,
    pub span: Span,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum AssignOp {
    Assign,
    AddAssign,
    SubAssign,
    MulAssign,
    DivAssign,
    ModAssign,
    AndAssign,
    OrAssign,
    XorAssign,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Param {
    pub name: Symbol,
    pub ty: TypeExpr,
    pub span: Span,
}

#[derive(Clone, Debug, PartialEq)]
pub enum StmtKind {
    Expr(ExprId),
    VarDecl {
        name: Symbol,
        ty: TypeExpr,
        initializer: Option<ExprId>,
    },
    Assign {
        lhs: ExprId,
        op: AssignOp,
        rhs: ExprId,
    },
    If {
        cond: ExprId,
        then_block: Vec<StmtId>,
        else_block: Option<Vec<StmtId>>,
    },
    While {
        cond: ExprId,
        body: Vec<StmtId>,
    },
    Repeat {
        limit: ExprId,
        counter: ExprId,
        body: Vec<StmtId>,
    },
    Switch {
        value: ExprId,
        cases: Vec<(i64, Vec<StmtId>)>,
        default: Option<Vec<StmtId>>,
    },
    Return(Option<ExprId>),
    Break,
    Continue,
}

#[derive(Clone, Debug, PartialEq)]
pub struct StmtNode {
    pub kind: StmtKind,
    pub span: Span,
}

#[derive(Clone, Debug, PartialEq)]
pub struct FunctionDecl {
    pub name: Symbol,
    pub params: Vec<Param>,
    pub return_type: Option<TypeExpr>,
    pub body: Option<Vec<StmtId>>,
    pub span: Span,
}

#[derive(Clone, Debug, PartialEq)]
pub struct StructDecl {
    pub name: Symbol,
    pub fields: Vec<Param>,
    pub span: Span,
}

#[derive(Clone, Debug, PartialEq)]
pub struct DeclStmt {
    pub name: Symbol,
    pub ty: TypeExpr,
    pub initializer: Option<ExprId>,
    pub span: Span,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Item {
    ScriptName(Symbol),
    ScriptHash(i64),
    Using(String),
    Proc(FunctionDecl),
    Func(FunctionDecl),
    ProtoProc(FunctionDecl),
    ProtoFunc(FunctionDecl),
    NativeProc(FunctionDecl),
    NativeFunc(FunctionDecl),
    Struct(StructDecl),
    Const(DeclStmt),
    Static(DeclStmt),
    Global { block: u32, owner: Symbol, decls: Vec<DeclStmt> },
}

/// A full translation unit: every expression/statement arena plus the
/// top-level item list, in source order.
#[derive(Debug, Default)]
pub struct Ast {
    pub exprs: Arena<ExprNode>,
    pub stmts: Arena<StmtNode>,
    pub items: Vec<Item>,
}

impl Ast {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_expr(&mut self, kind: ExprKind, span: Span) -> ExprId {
        self.exprs.push(ExprNode { kind, span })
    }

    pub fn push_stmt(&mut self, kind: StmtKind, span: Span) -> StmtId {
        self.stmts.push(StmtNode { kind, span })
    }

    pub fn expr(&self, id: ExprId) -> &ExprNode {
        self.exprs.get(id)
    }

    pub fn stmt(&self, id: StmtId) -> &StmtNode {
        self.stmts.get(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scriptlang_core::{FileId, Interner, Position};

    fn span() -> Span {
        Span::new(FileId::from_raw(0), Position::new(1, 1), Position::new(1, 1), (0, 0))
    }

    #[test]
    fn push_and_read_expr() {
        let mut ast = Ast::new();
        let id = ast.push_expr(ExprKind::IntLit(42), span());
        assert_eq!(ast.expr(id).kind, ExprKind::IntLit(42));
    }

    #[test]
    fn nested_binary_expr_references_children_by_id() {
        let mut ast = Ast::new();
        let lhs = ast.push_expr(ExprKind::IntLit(1), span());
        let rhs = ast.push_expr(ExprKind::IntLit(2), span());
        let bin = ast.push_expr(ExprKind::Binary(BinOp::Add, lhs, rhs), span());
        match &ast.expr(bin).kind {
            ExprKind::Binary(BinOp::Add, l, r) => {
                assert_eq!(*l, lhs);
                assert_eq!(*r, rhs);
            }
            _ => panic!("expected Binary"),
        }
    }

    #[test]
    fn type_expr_chain_is_built_outside_in() {
        let mut interner = Interner::new();
        let int_name = interner.intern("INT");
        let array_of_int = TypeExpr::Array(Box::new(TypeExpr::Named(int_name)), 4);
        let ref_of_array = TypeExpr::Ref(Box::new(array_of_int));
        match ref_of_array {
            TypeExpr::Ref(inner) => match *inner {
                TypeExpr::Array(base, len) => {
                    assert_eq!(len, 4);
                    assert_eq!(*base, TypeExpr::Named(int_name));
                }
                _ => panic!("expected Array"),
            },
            _ => panic!("expected Ref"),
        }
    }
}
