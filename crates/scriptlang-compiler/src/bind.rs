//! Binder: lowers the checked AST into a bound tree carrying a resolved
//! [`TypeId`] on every expression and a resolved [`SymbolId`] on every
//! name-bearing node, per §3 "Bound tree". Purely a re-shaping pass — all
//! the actual resolution happened in [`crate::second_pass`]; this module
//! just walks the same shape one more time and threads the results through
//! instead of leaving callers to juggle two side-tables keyed by `ExprId`.

use crate::ast::{Ast, AssignOp, BinOp, ExprId, StmtId, UnOp};
use crate::first_pass::{FirstPassOutput, FunctionEntry};
use crate::second_pass::SecondPassOutput;
use crate::symtab::{SymbolId, SymbolTable, VariableKind};
use crate::types::TypeId;
use scriptlang_core::{Span, Symbol};

#[derive(Clone, Debug)]
pub struct BoundExpr {
    pub kind: BoundExprKind,
    pub ty: TypeId,
    pub span: Span,
}

#[derive(Clone, Debug)]
pub enum BoundExprKind {
    /// `None` when the name failed to resolve (an `UndeclaredName`
    /// diagnostic was already raised for it in the second pass).
    Ident(Option<SymbolId>, Symbol),
    IntLit(i64),
    FloatLit(f64),
    BoolLit(bool),
    StringLit(Symbol),
    Paren(Box<BoundExpr>),
    Member(Box<BoundExpr>, Symbol),
    Index(Box<BoundExpr>, Box<BoundExpr>),
    Call(Box<BoundExpr>, Vec<BoundExpr>),
    Unary(UnOp, Box<BoundExpr>),
    Binary(BinOp, Box<BoundExpr>, Box<BoundExpr>),
    Vector(Vec<BoundExpr>),
}

#[derive(Clone, Debug)]
pub struct BoundStmt {
    pub kind: BoundStmtKind,
    pub span: Span,
}

#[derive(Clone, Debug)]
pub enum BoundStmtKind {
    Expr(BoundExpr),
    VarDecl {
        /// `None` only on a `DuplicateSymbol` error, where no table entry
        /// was created for this declaration.
        symbol: Option<SymbolId>,
        name: Symbol,
        initializer: Option<BoundExpr>,
    },
    Assign {
        lhs: BoundExpr,
        op: AssignOp,
        rhs: BoundExpr,
    },
    If {
        cond: BoundExpr,
        then_block: Vec<BoundStmt>,
        else_block: Option<Vec<BoundStmt>>,
    },
    While {
        cond: BoundExpr,
        body: Vec<BoundStmt>,
    },
    Repeat {
        limit: BoundExpr,
        counter: BoundExpr,
        body: Vec<BoundStmt>,
    },
    Switch {
        value: BoundExpr,
        cases: Vec<(i64, Vec<BoundStmt>)>,
        default: Option<Vec<BoundStmt>>,
    },
    Return(Option<BoundExpr>),
    Break,
    Continue,
}

/// A function with a body, fully bound. Frame layout (`args_size`,
/// `locals_size`) and parameter symbols live on the `FunctionSymbol` and in
/// [`SecondPassOutput::param_symbols`], not duplicated here.
pub struct BoundFunction {
    pub symbol: SymbolId,
    pub body: Vec<BoundStmt>,
}

pub struct BoundProgram {
    pub statics: Vec<(SymbolId, Option<BoundExpr>)>,
    pub functions: Vec<BoundFunction>,
}

/// Binds every function body and static/global initializer gathered by the
/// first pass, using the types and symbol bindings the second pass already
/// computed.
pub fn bind(
    ast: &Ast,
    symbols: &SymbolTable,
    first_pass: &FirstPassOutput,
    second_pass: &SecondPassOutput,
) -> BoundProgram {
    let statics = first_pass
        .static_decls
        .iter()
        .map(|&(sid, init)| (sid, init.map(|e| bind_expr(ast, symbols, second_pass, e))))
        .collect();

    let functions = first_pass
        .functions
        .iter()
        .map(|f: &FunctionEntry| BoundFunction {
            symbol: f.symbol,
            body: bind_block(ast, symbols, second_pass, &f.body),
        })
        .collect();

    BoundProgram { statics, functions }
}

fn bind_block(ast: &Ast, symbols: &SymbolTable, second_pass: &SecondPassOutput, stmts: &[StmtId]) -> Vec<BoundStmt> {
    stmts.iter().map(|&id| bind_stmt(ast, symbols, second_pass, id)).collect()
}

/// Binds `id`, inlining it as a literal if it resolves to a `CONST` name:
/// the constant's own initializer was already folded to a literal by the
/// const evaluator, so a reference to it carries no runtime symbol — it
/// binds as though the literal had been written at the use site.
fn bind_expr(ast: &Ast, symbols: &SymbolTable, second_pass: &SecondPassOutput, id: ExprId) -> BoundExpr {
    let node = ast.expr(id);
    let span = node.span;
    let ty = *second_pass
        .expr_types
        .get(&id)
        .expect("every reachable expression was typed by the second pass");
    if let crate::ast::ExprKind::Ident(_) = &node.kind {
        if let Some(sid) = second_pass.expr_symbols.get(&id).copied() {
            if let Some(var) = symbols.get(sid).as_variable() {
                if var.kind == VariableKind::Constant {
                    let literal = var.initializer.expect("const was folded to a literal by const_eval");
                    let mut bound = bind_expr(ast, symbols, second_pass, literal);
                    bound.span = span;
                    return bound;
                }
            }
        }
    }
    let kind = match &node.kind {
        crate::ast::ExprKind::Ident(sym) => {
            BoundExprKind::Ident(second_pass.expr_symbols.get(&id).copied(), *sym)
        }
        crate::ast::ExprKind::IntLit(v) => BoundExprKind::IntLit(*v),
        crate::ast::ExprKind::FloatLit(v) => BoundExprKind::FloatLit(*v),
        crate::ast::ExprKind::BoolLit(v) => BoundExprKind::BoolLit(*v),
        crate::ast::ExprKind::StringLit(s) => BoundExprKind::StringLit(*s),
        crate::ast::ExprKind::Paren(inner) => {
            BoundExprKind::Paren(Box::new(bind_expr(ast, symbols, second_pass, *inner)))
        }
        crate::ast::ExprKind::Member(base, field) => {
            BoundExprKind::Member(Box::new(bind_expr(ast, symbols, second_pass, *base)), *field)
        }
        crate::ast::ExprKind::Index(base, index) => BoundExprKind::Index(
            Box::new(bind_expr(ast, symbols, second_pass, *base)),
            Box::new(bind_expr(ast, symbols, second_pass, *index)),
        ),
        crate::ast::ExprKind::Call(callee, args) => BoundExprKind::Call(
            Box::new(bind_expr(ast, symbols, second_pass, *callee)),
            args.iter().map(|&a| bind_expr(ast, symbols, second_pass, a)).collect(),
        ),
        crate::ast::ExprKind::Unary(op, inner) => {
            BoundExprKind::Unary(*op, Box::new(bind_expr(ast, symbols, second_pass, *inner)))
        }
        crate::ast::ExprKind::Binary(op, lhs, rhs) => BoundExprKind::Binary(
            *op,
            Box::new(bind_expr(ast, symbols, second_pass, *lhs)),
            Box::new(bind_expr(ast, symbols, second_pass, *rhs)),
        ),
        crate::ast::ExprKind::Vector(elems) => {
            BoundExprKind::Vector(elems.iter().map(|&e| bind_expr(ast, symbols, second_pass, e)).collect())
        }
    };
    BoundExpr { kind, ty, span }
}

fn bind_stmt(ast: &Ast, symbols: &SymbolTable, second_pass: &SecondPassOutput, id: StmtId) -> BoundStmt {
    let node = ast.stmt(id);
    let span = node.span;
    let kind = match node.kind.clone() {
        crate::ast::StmtKind::Expr(e) => BoundStmtKind::Expr(bind_expr(ast, symbols, second_pass, e)),
        crate::ast::StmtKind::VarDecl { name, initializer, .. } => BoundStmtKind::VarDecl {
            symbol: second_pass.stmt_symbols.get(&id).copied(),
            name,
            initializer: initializer.map(|e| bind_expr(ast, symbols, second_pass, e)),
        },
        crate::ast::StmtKind::Assign { lhs, op, rhs } => BoundStmtKind::Assign {
            lhs: bind_expr(ast, symbols, second_pass, lhs),
            op,
            rhs: bind_expr(ast, symbols, second_pass, rhs),
        },
        crate::ast::StmtKind::If { cond, then_block, else_block } => BoundStmtKind::If {
            cond: bind_expr(ast, symbols, second_pass, cond),
            then_block: bind_block(ast, symbols, second_pass, &then_block),
            else_block: else_block.map(|b| bind_block(ast, symbols, second_pass, &b)),
        },
        crate::ast::StmtKind::While { cond, body } => BoundStmtKind::While {
            cond: bind_expr(ast, symbols, second_pass, cond),
            body: bind_block(ast, symbols, second_pass, &body),
        },
        crate::ast::StmtKind::Repeat { limit, counter, body } => BoundStmtKind::Repeat {
            limit: bind_expr(ast, symbols, second_pass, limit),
            counter: bind_expr(ast, symbols, second_pass, counter),
            body: bind_block(ast, symbols, second_pass, &body),
        },
        crate::ast::StmtKind::Switch { value, cases, default } => BoundStmtKind::Switch {
            value: bind_expr(ast, symbols, second_pass, value),
            cases: cases
                .into_iter()
                .map(|(v, body)| (v, bind_block(ast, symbols, second_pass, &body)))
                .collect(),
            default: default.map(|b| bind_block(ast, symbols, second_pass, &b)),
        },
        crate::ast::StmtKind::Return(e) => {
            BoundStmtKind::Return(e.map(|e| bind_expr(ast, symbols, second_pass, e)))
        }
        crate::ast::StmtKind::Break => BoundStmtKind::Break,
        crate::ast::StmtKind::Continue => BoundStmtKind::Continue,
    };
    BoundStmt { kind, span }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::const_eval;
    use crate::first_pass;
    use crate::lexer::tokenize;
    use crate::parser::Parser;
    use crate::second_pass;
    use crate::symtab::SymbolTable;
    use crate::types::Type;
    use scriptlang_core::{Arena, FileId, Interner};
    use std::collections::HashMap;

    fn bind_source(src: &str) -> BoundProgram {
        let mut interner = Interner::new();
        let (toks, _) = tokenize(FileId::from_raw(0), src);
        let parser = Parser::new(FileId::from_raw(0), toks, &mut interner);
        let (mut ast, mut diags) = parser.parse_program();
        let mut types = Arena::<Type>::new();
        let mut symbols = SymbolTable::new();
        let vec3_ty = first_pass::register_builtins(&mut types, &mut symbols, &mut interner);
        let fp_out = first_pass::register(&ast, &mut types, &mut symbols, &interner, &mut diags);
        first_pass::resolve_types(&mut types, &symbols, &interner, &HashMap::new(), &mut diags);
        const_eval::run(&mut ast, &mut symbols, &interner, fp_out.const_queue.clone(), &mut diags);
        let sp_out = second_pass::run(&ast, &mut types, &mut symbols, &interner, vec3_ty, &fp_out, &mut diags);
        assert!(diags.is_empty(), "unexpected diagnostics: {diags:?}");
        bind(&ast, &symbols, &fp_out, &sp_out)
    }

    #[test]
    fn binds_a_typed_return_expression() {
        let prog = bind_source("FUNC INT ADD(INT a, INT b)\nRETURN a+b\nENDFUNC\n");
        assert_eq!(prog.functions.len(), 1);
        match &prog.functions[0].body[0].kind {
            BoundStmtKind::Return(Some(expr)) => match &expr.kind {
                BoundExprKind::Binary(BinOp::Add, lhs, rhs) => {
                    assert!(matches!(lhs.kind, BoundExprKind::Ident(Some(_), _)));
                    assert!(matches!(rhs.kind, BoundExprKind::Ident(Some(_), _)));
                }
                other => panic!("expected Binary(Add, ..), got {other:?}"),
            },
            other => panic!("expected Return(Some(..)), got {other:?}"),
        }
    }

    #[test]
    fn var_decl_carries_its_resolved_symbol() {
        let prog = bind_source("PROC MAIN()\nINT x := 1\nENDPROC\n");
        match &prog.functions[0].body[0].kind {
            BoundStmtKind::VarDecl { symbol, initializer, .. } => {
                assert!(symbol.is_some());
                assert!(matches!(initializer.as_ref().unwrap().kind, BoundExprKind::IntLit(1)));
            }
            other => panic!("expected VarDecl, got {other:?}"),
        }
    }

    #[test]
    fn static_initializer_is_bound() {
        let prog = bind_source("INT total := 0\n");
        assert_eq!(prog.statics.len(), 1);
        assert!(matches!(prog.statics[0].1.as_ref().unwrap().kind, BoundExprKind::IntLit(0)));
    }

    #[test]
    fn const_reference_inlines_its_folded_literal() {
        let prog = bind_source("CONST INT LIMIT := 10\nPROC MAIN()\nINT x := LIMIT\nENDPROC\n");
        match &prog.functions[0].body[0].kind {
            BoundStmtKind::VarDecl { initializer: Some(expr), .. } => {
                assert!(matches!(expr.kind, BoundExprKind::IntLit(10)));
            }
            other => panic!("expected VarDecl with initializer, got {other:?}"),
        }
    }

    #[test]
    fn vector_literal_binds_every_component() {
        let prog = bind_source("PROC MAIN()\nVEC3 v := <<1.0,2.0,3.0>>\nENDPROC\n");
        match &prog.functions[0].body[0].kind {
            BoundStmtKind::VarDecl { initializer: Some(expr), .. } => match &expr.kind {
                BoundExprKind::Vector(elems) => assert_eq!(elems.len(), 3),
                other => panic!("expected Vector, got {other:?}"),
            },
            other => panic!("expected VarDecl with initializer, got {other:?}"),
        }
    }
}
