//! Constant folding: drains the `CONST` work queue built by [`crate::first_pass`]
//! to a fixed point, reducing each initializer to a literal. See §4.4.

use std::collections::{HashMap, HashSet, VecDeque};

use scriptlang_core::Span;

use crate::ast::{Ast, BinOp, ExprId, ExprKind, UnOp};
use crate::diagnostics::{DiagnosticMessage, Diagnostics, Kind};
use crate::first_pass::ConstQueueEntry;
use crate::symtab::{SymbolId, SymbolTable, VariableKind};

/// One folded constant cell. Strings stay symbolic references into the
/// interner; everything else is an 8-byte scalar view.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ConstValue {
    Int(i64),
    Float(f64),
    Bool(bool),
    Str(scriptlang_core::Symbol),
}

/// Drains `queue` to a fixed point. Symbols that fold successfully get
/// their `VariableSymbol::initializer` rewritten to a literal AST node so
/// downstream passes never need to re-run the interpreter.
pub fn run(
    ast: &mut Ast,
    symbols: &mut SymbolTable,
    interner: &scriptlang_core::Interner,
    queue: Vec<ConstQueueEntry>,
    diagnostics: &mut Diagnostics,
) -> HashMap<SymbolId, ConstValue> {
    let mut pending = VecDeque::new();
    for entry in queue {
        match scan_initializer(ast, symbols, interner, entry.initializer) {
            Ok(_) => pending.push_back((entry, usize::MAX)),
            Err((span, message)) => {
                diagnostics.push(DiagnosticMessage::error(Kind::NonConstInConst, span, message));
            }
        }
    }

    let mut folded: HashMap<SymbolId, ConstValue> = HashMap::new();

    while let Some((entry, last_unresolved)) = pending.pop_front() {
        let deps = scan_initializer(ast, symbols, interner, entry.initializer)
            .expect("already validated const-only on first scan");
        let unresolved: Vec<SymbolId> = deps.into_iter().filter(|d| !folded.contains_key(d)).collect();

        if unresolved.is_empty() {
            match eval(ast, entry.initializer, symbols, &folded) {
                Ok(value) => {
                    folded.insert(entry.symbol, value);
                    let span = ast.expr(entry.initializer).span;
                    let literal = push_literal(ast, value, span);
                    if let Some(var) = symbols.get_mut(entry.symbol).as_variable_mut() {
                        var.initializer = Some(literal);
                    }
                }
                Err(message) => {
                    let span = ast.expr(entry.initializer).span;
                    diagnostics.push(DiagnosticMessage::error(Kind::TypeMismatch, span, message));
                }
            }
        } else if unresolved.len() < last_unresolved {
            pending.push_back((entry, unresolved.len()));
        } else {
            let span = ast.expr(entry.initializer).span;
            let name = symbols.get(entry.symbol).name();
            diagnostics.push(DiagnosticMessage::error(
                Kind::CircularConstant,
                span,
                format!("constant `{}` depends on itself", interner.resolve(name)),
            ));
        }
    }

    folded
}

fn push_literal(ast: &mut Ast, value: ConstValue, span: Span) -> ExprId {
    let kind = match value {
        ConstValue::Int(v) => ExprKind::IntLit(v),
        ConstValue::Float(v) => ExprKind::FloatLit(v),
        ConstValue::Bool(v) => ExprKind::BoolLit(v),
        ConstValue::Str(s) => ExprKind::StringLit(s),
    };
    ast.push_expr(kind, span)
}

/// Walks `expr`, collecting the set of other `CONST` symbols it references.
/// A reference to a `Static`/`Global`/`Local` variable, a call, a member
/// access, or an index is rejected immediately (not entered into the
/// dependency queue) since only `CONST`-to-`CONST` references participate
/// in fixed-point iteration.
fn scan_initializer(
    ast: &Ast,
    symbols: &SymbolTable,
    interner: &scriptlang_core::Interner,
    expr: ExprId,
) -> Result<HashSet<SymbolId>, (Span, String)> {
    let node = ast.expr(expr);
    match &node.kind {
        ExprKind::IntLit(_) | ExprKind::FloatLit(_) | ExprKind::BoolLit(_) | ExprKind::StringLit(_) => {
            Ok(HashSet::new())
        }
        ExprKind::Ident(name) => match symbols.lookup(*name) {
            Some(sid) => match symbols.get(sid).as_variable() {
                Some(v) if v.kind == VariableKind::Constant => Ok(HashSet::from([sid])),
                Some(_) => Err((node.span, format!("`{}` is not a constant", interner.resolve(*name)))),
                None => Err((node.span, format!("`{}` is not a value", interner.resolve(*name)))),
            },
            None => Err((node.span, format!("undeclared name `{}`", interner.resolve(*name)))),
        },
        ExprKind::Paren(inner) => scan_initializer(ast, symbols, interner, *inner),
        ExprKind::Unary(_, inner) => scan_initializer(ast, symbols, interner, *inner),
        ExprKind::Binary(_, lhs, rhs) => {
            let mut deps = scan_initializer(ast, symbols, interner, *lhs)?;
            deps.extend(scan_initializer(ast, symbols, interner, *rhs)?);
            Ok(deps)
        }
        ExprKind::Vector(components) => {
            let mut deps = HashSet::new();
            for c in components {
                deps.extend(scan_initializer(ast, symbols, interner, *c)?);
            }
            Ok(deps)
        }
        ExprKind::Member(..) | ExprKind::Index(..) | ExprKind::Call(..) => {
            Err((node.span, "only literals and other constants may appear in a CONST initializer".to_string()))
        }
    }
}

fn eval(
    ast: &Ast,
    expr: ExprId,
    symbols: &SymbolTable,
    folded: &HashMap<SymbolId, ConstValue>,
) -> Result<ConstValue, String> {
    match &ast.expr(expr).kind {
        ExprKind::IntLit(v) => Ok(ConstValue::Int(*v)),
        ExprKind::FloatLit(v) => Ok(ConstValue::Float(*v)),
        ExprKind::BoolLit(v) => Ok(ConstValue::Bool(*v)),
        ExprKind::StringLit(s) => Ok(ConstValue::Str(*s)),
        ExprKind::Ident(name) => {
            let sid = symbols.lookup(*name).expect("validated by scan_initializer");
            folded.get(&sid).copied().ok_or_else(|| "dependency not yet folded".to_string())
        }
        ExprKind::Paren(inner) => eval(ast, *inner, symbols, folded),
        ExprKind::Unary(UnOp::Not, inner) => match eval(ast, *inner, symbols, folded)? {
            ConstValue::Bool(b) => Ok(ConstValue::Bool(!b)),
            _ => Err("NOT requires a BOOL operand".to_string()),
        },
        ExprKind::Unary(UnOp::Neg, inner) => match eval(ast, *inner, symbols, folded)? {
            ConstValue::Int(v) => Ok(ConstValue::Int(-v)),
            ConstValue::Float(v) => Ok(ConstValue::Float(-v)),
            _ => Err("unary `-` requires an INT or FLOAT operand".to_string()),
        },
        ExprKind::Binary(op, lhs, rhs) => {
            let l = eval(ast, *lhs, symbols, folded)?;
            let r = eval(ast, *rhs, symbols, folded)?;
            eval_binary(*op, l, r)
        }
        ExprKind::Vector(_) => Err("vector literals are not a CONST basic type".to_string()),
        ExprKind::Member(..) | ExprKind::Index(..) | ExprKind::Call(..) => {
            unreachable!("rejected by scan_initializer before reaching eval")
        }
    }
}

fn eval_binary(op: BinOp, l: ConstValue, r: ConstValue) -> Result<ConstValue, String> {
    use ConstValue::*;
    match (op, l, r) {
        (BinOp::Add, Int(a), Int(b)) => Ok(Int(a.wrapping_add(b))),
        (BinOp::Sub, Int(a), Int(b)) => Ok(Int(a.wrapping_sub(b))),
        (BinOp::Mul, Int(a), Int(b)) => Ok(Int(a.wrapping_mul(b))),
        (BinOp::Div, Int(a), Int(b)) => b.checked_eq_zero_err(a, i64::wrapping_div),
        (BinOp::Mod, Int(a), Int(b)) => b.checked_eq_zero_err(a, i64::wrapping_rem),
        (BinOp::Add, Float(a), Float(b)) => Ok(Float(a + b)),
        (BinOp::Sub, Float(a), Float(b)) => Ok(Float(a - b)),
        (BinOp::Mul, Float(a), Float(b)) => Ok(Float(a * b)),
        (BinOp::Div, Float(a), Float(b)) => Ok(Float(a / b)),
        (BinOp::BitAnd, Int(a), Int(b)) => Ok(Int(a & b)),
        (BinOp::BitOr, Int(a), Int(b)) => Ok(Int(a | b)),
        (BinOp::BitXor, Int(a), Int(b)) => Ok(Int(a ^ b)),
        (BinOp::And, Bool(a), Bool(b)) => Ok(Bool(a && b)),
        (BinOp::Or, Bool(a), Bool(b)) => Ok(Bool(a || b)),
        (BinOp::Eq, a, b) => Ok(Bool(values_equal(a, b))),
        (BinOp::Ne, a, b) => Ok(Bool(!values_equal(a, b))),
        (BinOp::Gt, Int(a), Int(b)) => Ok(Bool(a > b)),
        (BinOp::Ge, Int(a), Int(b)) => Ok(Bool(a >= b)),
        (BinOp::Lt, Int(a), Int(b)) => Ok(Bool(a < b)),
        (BinOp::Le, Int(a), Int(b)) => Ok(Bool(a <= b)),
        (BinOp::Gt, Float(a), Float(b)) => Ok(Bool(a > b)),
        (BinOp::Ge, Float(a), Float(b)) => Ok(Bool(a >= b)),
        (BinOp::Lt, Float(a), Float(b)) => Ok(Bool(a < b)),
        (BinOp::Le, Float(a), Float(b)) => Ok(Bool(a <= b)),
        _ => Err(format!("operator {op:?} is not defined for these operand types")),
    }
}

fn values_equal(a: ConstValue, b: ConstValue) -> bool {
    use ConstValue::*;
    match (a, b) {
        (Int(a), Int(b)) => a == b,
        (Float(a), Float(b)) => a == b,
        (Bool(a), Bool(b)) => a == b,
        (Str(a), Str(b)) => a == b,
        _ => false,
    }
}

/// Small helper so integer division/modulo share the same divide-by-zero
/// guard without repeating it at each call site.
trait CheckedIntOp {
    fn checked_eq_zero_err(self, a: i64, f: fn(i64, i64) -> i64) -> Result<ConstValue, String>;
}

impl CheckedIntOp for i64 {
    fn checked_eq_zero_err(self, a: i64, f: fn(i64, i64) -> i64) -> Result<ConstValue, String> {
        if self == 0 {
            Err("division by zero in constant expression".to_string())
        } else {
            Ok(ConstValue::Int(f(a, self)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::first_pass;
    use crate::lexer::tokenize;
    use crate::parser::Parser;
    use scriptlang_core::{Arena, FileId, Interner};

    fn run_source(src: &str) -> (HashMap<SymbolId, ConstValue>, Diagnostics, SymbolTable) {
        let mut interner = Interner::new();
        let (toks, _) = tokenize(FileId::from_raw(0), src);
        let parser = Parser::new(FileId::from_raw(0), toks, &mut interner);
        let (mut ast, mut diags) = parser.parse_program();
        let mut types = Arena::new();
        let mut symbols = SymbolTable::new();
        let out = first_pass::register(&ast, &mut types, &mut symbols, &interner, &mut diags);
        let folded = run(&mut ast, &mut symbols, &interner, out.const_queue, &mut diags);
        (folded, diags, symbols)
    }

    #[test]
    fn constant_chain_folds_regardless_of_declaration_order() {
        let (folded, diags, _symbols) = run_source("CONST INT X := Y+1\nCONST INT Y := 2\n");
        assert!(diags.is_empty());
        assert_eq!(folded.len(), 2);
        assert!(folded.values().any(|v| *v == ConstValue::Int(3)));
        assert!(folded.values().any(|v| *v == ConstValue::Int(2)));
    }

    #[test]
    fn self_referential_constant_is_circular() {
        let (_folded, diags, _symbols) = run_source("CONST INT Z := Z+1\n");
        assert_eq!(diags.error_count(), 1);
    }

    #[test]
    fn non_const_reference_is_rejected_immediately() {
        let (_folded, diags, _symbols) =
            run_source("INT counter\nCONST INT X := counter+1\n");
        assert!(diags.has_errors());
    }

    #[test]
    fn arithmetic_and_comparison_fold() {
        let (folded, diags, _symbols) = run_source("CONST BOOL B := (1+2) == 3\n");
        assert!(diags.is_empty());
        assert_eq!(folded.len(), 1);
        assert_eq!(*folded.values().next().unwrap(), ConstValue::Bool(true));
    }
}
