//! Second pass: types every expression, checks every statement, and lays
//! out each function's frame. See §4.5-4.7.

use std::collections::{HashMap, HashSet};

use scriptlang_core::{Arena, Interner, Span, Symbol};

use crate::ast::{Ast, AssignOp, BinOp, ExprId, ExprKind, StmtId, StmtKind, TypeExpr, UnOp};
use crate::diagnostics::{DiagnosticMessage, Diagnostics, Kind};
use crate::first_pass::{basic_for_name, FirstPassOutput, FunctionEntry};
use crate::symtab::{SymbolEntry, SymbolId, SymbolTable, VariableKind, VariableSymbol};
use crate::types::{structurally_equal, Basic, Type, TypeId};

/// Per-expression types and per-name-expression symbol bindings, handed to
/// the binder. Keyed by [`ExprId`] rather than stored inline on the AST so
/// the AST itself stays a plain parser product.
pub struct SecondPassOutput {
    pub expr_types: HashMap<ExprId, TypeId>,
    pub expr_symbols: HashMap<ExprId, SymbolId>,
    /// The `VariableSymbol` a `VarDecl` statement registered, keyed by the
    /// statement itself (its scope is gone by the time the binder runs, so
    /// it can't be recovered by name lookup).
    pub stmt_symbols: HashMap<StmtId, SymbolId>,
    /// Each function's parameter symbols, in declaration order, keyed by
    /// the function's own `SymbolId`.
    pub param_symbols: HashMap<SymbolId, Vec<SymbolId>>,
}

/// Runs expression typing, statement checks, and frame layout over every
/// function and static/global initializer gathered by the first pass.
pub fn run(
    ast: &Ast,
    types: &mut Arena<Type>,
    symbols: &mut SymbolTable,
    interner: &Interner,
    vec3_ty: TypeId,
    first_pass: &FirstPassOutput,
    diagnostics: &mut Diagnostics,
) -> SecondPassOutput {
    let mut checker = Checker::new(ast, types, symbols, interner, vec3_ty, diagnostics);
    checker.check_statics(&first_pass.static_decls);
    for func in &first_pass.functions {
        checker.check_function(func);
    }
    checker.finish()
}

struct Checker<'a> {
    ast: &'a Ast,
    types: &'a mut Arena<Type>,
    symbols: &'a mut SymbolTable,
    interner: &'a Interner,
    diagnostics: &'a mut Diagnostics,
    vec3_ty: TypeId,
    int_ty: TypeId,
    float_ty: TypeId,
    bool_ty: TypeId,
    string_ty: TypeId,
    /// Bound to every expression that fails to type-check, so downstream
    /// passes never have to treat "no type" as a distinct case.
    error_ty: TypeId,
    expr_types: HashMap<ExprId, TypeId>,
    expr_symbols: HashMap<ExprId, SymbolId>,
    stmt_symbols: HashMap<StmtId, SymbolId>,
    param_symbols: HashMap<SymbolId, Vec<SymbolId>>,
}

impl<'a> Checker<'a> {
    fn new(
        ast: &'a Ast,
        types: &'a mut Arena<Type>,
        symbols: &'a mut SymbolTable,
        interner: &'a Interner,
        vec3_ty: TypeId,
        diagnostics: &'a mut Diagnostics,
    ) -> Self {
        let int_ty = types.push(Type::Basic(Basic::Int));
        let float_ty = types.push(Type::Basic(Basic::Float));
        let bool_ty = types.push(Type::Basic(Basic::Bool));
        let string_ty = types.push(Type::Basic(Basic::String));
        // No declaration site names this one; the symbol is never resolved
        // by name, only matched against by `Type::is_unresolved`.
        let error_ty = types.push(Type::Unresolved(Symbol::from_raw(u32::MAX)));
        Self {
            ast,
            types,
            symbols,
            interner,
            diagnostics,
            vec3_ty,
            int_ty,
            float_ty,
            bool_ty,
            string_ty,
            error_ty,
            expr_types: HashMap::new(),
            expr_symbols: HashMap::new(),
            stmt_symbols: HashMap::new(),
            param_symbols: HashMap::new(),
        }
    }

    fn finish(self) -> SecondPassOutput {
        SecondPassOutput {
            expr_types: self.expr_types,
            expr_symbols: self.expr_symbols,
            stmt_symbols: self.stmt_symbols,
            param_symbols: self.param_symbols,
        }
    }

    fn diag(&mut self, kind: Kind, span: Span, message: impl Into<String>) {
        self.diagnostics.push(DiagnosticMessage::error(kind, span, message));
    }

    fn check_statics(&mut self, decls: &[(SymbolId, Option<ExprId>)]) {
        let mut static_cursor = 0u32;
        let mut global_cursor = 0u32;
        for &(sid, init) in decls {
            let var = self.symbols.get(sid).as_variable().unwrap().clone();
            let slot_cursor = match var.kind {
                VariableKind::Global => &mut global_cursor,
                _ => &mut static_cursor,
            };
            let slot = *slot_cursor;
            *slot_cursor += Type::slot_size(var.ty, self.types);
            if let Some(v) = self.symbols.get_mut(sid).as_variable_mut() {
                v.frame_slot = Some(slot);
            }
            match self.types.get(var.ty) {
                Type::Ref(_) => self.diag(
                    Kind::InvalidGlobalType,
                    var.span,
                    format!("`{}` cannot be declared REF", self.interner.resolve(var.name)),
                ),
                Type::Function(_) if var.kind == VariableKind::Global => self.diag(
                    Kind::InvalidGlobalType,
                    var.span,
                    format!("`{}` cannot be a function type", self.interner.resolve(var.name)),
                ),
                Type::Basic(Basic::String) if init.is_some() => self.diag(
                    Kind::InvalidStaticInitializer,
                    var.span,
                    format!("`{}` may not carry an initializer", self.interner.resolve(var.name)),
                ),
                _ => {}
            }
            if let Some(e) = init {
                let ety = self.type_expr(e);
                if !assignable_ctx(var.ty, ety, self.types, true) {
                    self.diag(
                        Kind::TypeMismatch,
                        var.span,
                        format!("cannot initialize `{}`: type mismatch", self.interner.resolve(var.name)),
                    );
                }
            }
        }
    }

    fn check_function(&mut self, func: &FunctionEntry) {
        let fn_ty = self.symbols.get(func.symbol).ty();
        let sig = match self.types.get(fn_ty) {
            Type::Function(sig) => sig.clone(),
            _ => return,
        };
        let span = self.symbols.get(func.symbol).as_function().unwrap().span;

        self.symbols.enter_scope();

        let mut args_cursor = 0u32;
        let mut param_ids = Vec::with_capacity(func.params.len());
        for (param, &param_ty) in func.params.iter().zip(sig.params.iter()) {
            let slot = args_cursor;
            args_cursor += Type::slot_size(param_ty, self.types);
            if let Ok(pid) = self.symbols.add(SymbolEntry::Variable(VariableSymbol {
                name: param.name,
                span: param.span,
                ty: param_ty,
                kind: VariableKind::LocalArgument,
                frame_slot: Some(slot),
                initializer: None,
            })) {
                param_ids.push(pid);
            }
        }
        self.param_symbols.insert(func.symbol, param_ids);
        let args_size = args_cursor;
        // Caller frame-link and return address, per the target ABI (§4.7).
        let mut locals_cursor = args_size + 2;

        for &stmt in &func.body {
            self.check_stmt(stmt, sig.return_type, &mut locals_cursor);
        }
        let locals_size = locals_cursor - (args_size + 2);

        self.symbols.exit_scope();

        if sig.return_type.is_some() && !ends_in_return(&func.body, self.ast) {
            self.diag(Kind::MissingReturn, span, "not every path through this function returns a value");
        }

        if let Some(fs) = self.symbols.get_mut(func.symbol).as_function_mut() {
            fs.args_size = Some(args_size);
            fs.locals_size = Some(locals_size);
        }
    }

    fn check_stmt(&mut self, id: StmtId, ret_ty: Option<TypeId>, locals_cursor: &mut u32) {
        let span = self.ast.stmt(id).span;
        let kind = self.ast.stmt(id).kind.clone();
        match kind {
            StmtKind::Expr(e) => {
                self.type_expr(e);
            }
            StmtKind::VarDecl { name, ty, initializer } => {
                let var_ty = self.resolve_type_expr(&ty, span);
                if let Some(init) = initializer {
                    let init_ty = self.type_expr(init);
                    if !assignable_ctx(var_ty, init_ty, self.types, true) {
                        self.diag(
                            Kind::TypeMismatch,
                            span,
                            format!("cannot initialize `{}`: type mismatch", self.interner.resolve(name)),
                        );
                    }
                }
                let slot = *locals_cursor;
                *locals_cursor += Type::slot_size(var_ty, self.types);
                match self.symbols.add(SymbolEntry::Variable(VariableSymbol {
                    name,
                    span,
                    ty: var_ty,
                    kind: VariableKind::Local,
                    frame_slot: Some(slot),
                    initializer,
                })) {
                    Ok(sid) => {
                        self.stmt_symbols.insert(id, sid);
                    }
                    Err(_) => self.diag(
                        Kind::DuplicateSymbol,
                        span,
                        format!("`{}` is already declared in this scope", self.interner.resolve(name)),
                    ),
                }
            }
            StmtKind::Assign { lhs, op, rhs } => {
                if !self.is_lvalue(lhs) {
                    self.diag(Kind::TypeMismatch, span, "left-hand side of assignment is not an lvalue");
                }
                let lt = self.type_expr(lhs);
                if matches!(self.types.get(lt), Type::Ref(inner) if matches!(self.types.get(*inner), Type::Basic(Basic::Any)))
                {
                    self.diag(Kind::TypeMismatch, span, "cannot assign through a REF ANY");
                }
                let rt = self.type_expr(rhs);
                let ok = match op {
                    AssignOp::Assign => assignable_ctx(lt, rt, self.types, true),
                    _ => self.compound_op_holds(op, lt, rt),
                };
                if !ok {
                    self.diag(Kind::TypeMismatch, span, "incompatible types in assignment");
                }
            }
            StmtKind::If { cond, then_block, else_block } => {
                self.require_bool(cond, span, "IF");
                for s in &then_block {
                    self.check_stmt(*s, ret_ty, locals_cursor);
                }
                if let Some(else_block) = &else_block {
                    for s in else_block {
                        self.check_stmt(*s, ret_ty, locals_cursor);
                    }
                }
            }
            StmtKind::While { cond, body } => {
                self.require_bool(cond, span, "WHILE");
                for s in &body {
                    self.check_stmt(*s, ret_ty, locals_cursor);
                }
            }
            StmtKind::Repeat { limit, counter, body } => {
                let lt = self.type_expr(limit);
                if !structurally_equal(lt, self.int_ty, self.types) {
                    self.diag(Kind::TypeMismatch, span, "REPEAT limit must be INT");
                }
                if !self.is_lvalue(counter) {
                    self.diag(Kind::TypeMismatch, span, "REPEAT counter must be an lvalue");
                }
                let ct = self.type_expr(counter);
                if !structurally_equal(ct, self.int_ty, self.types) {
                    self.diag(Kind::TypeMismatch, span, "REPEAT counter must be INT");
                }
                for s in &body {
                    self.check_stmt(*s, ret_ty, locals_cursor);
                }
            }
            StmtKind::Switch { value, cases, default } => {
                let vt = self.type_expr(value);
                if !structurally_equal(vt, self.int_ty, self.types) {
                    self.diag(Kind::TypeMismatch, span, "SWITCH value must be INT");
                }
                let mut seen = HashSet::new();
                for (case_value, body) in &cases {
                    if !seen.insert(*case_value) {
                        self.diag(Kind::DuplicateCase, span, format!("duplicate case value `{case_value}`"));
                    }
                    for s in body {
                        self.check_stmt(*s, ret_ty, locals_cursor);
                    }
                }
                if let Some(default) = &default {
                    for s in default {
                        self.check_stmt(*s, ret_ty, locals_cursor);
                    }
                }
            }
            StmtKind::Return(expr) => match (ret_ty, expr) {
                (Some(rt), Some(e)) => {
                    let et = self.type_expr(e);
                    if !assignable_ctx(rt, et, self.types, false) {
                        self.diag(Kind::TypeMismatch, span, "returned value has an incompatible type");
                    }
                }
                (Some(_), None) => self.diag(Kind::TypeMismatch, span, "function must return a value"),
                (None, Some(e)) => {
                    self.type_expr(e);
                    self.diag(Kind::TypeMismatch, span, "procedure cannot return a value");
                }
                (None, None) => {}
            },
            StmtKind::Break | StmtKind::Continue => {}
        }
    }

    fn require_bool(&mut self, cond: ExprId, span: Span, construct: &str) {
        let ct = self.type_expr(cond);
        if !structurally_equal(ct, self.bool_ty, self.types) {
            self.diag(Kind::TypeMismatch, span, format!("{construct} condition must be BOOL"));
        }
    }

    fn compound_op_holds(&self, op: AssignOp, lt: TypeId, rt: TypeId) -> bool {
        use AssignOp::*;
        match op {
            AddAssign | SubAssign | MulAssign | DivAssign | ModAssign => {
                Type::is_numeric(lt, self.types) && structurally_equal(lt, rt, self.types)
            }
            AndAssign | OrAssign | XorAssign => {
                matches!(self.types.get(lt), Type::Basic(Basic::Int)) && structurally_equal(lt, rt, self.types)
            }
            Assign => unreachable!("Assign handled separately"),
        }
    }

    fn is_lvalue(&self, id: ExprId) -> bool {
        match &self.ast.expr(id).kind {
            ExprKind::Ident(_) | ExprKind::Member(_, _) | ExprKind::Index(_, _) => true,
            ExprKind::Paren(inner) => self.is_lvalue(*inner),
            _ => false,
        }
    }

    /// Resolves a type annotation written inside a function body. Unlike
    /// the first pass's top-level walk, named references are resolved
    /// immediately rather than left as `Unresolved`: every struct has
    /// already been fully resolved by the time a function body is checked.
    fn resolve_type_expr(&mut self, te: &TypeExpr, span: Span) -> TypeId {
        match te {
            TypeExpr::Named(sym) => {
                let text = self.interner.resolve(*sym);
                if let Some(basic) = basic_for_name(text) {
                    return self.types.push(Type::Basic(basic));
                }
                match self.symbols.lookup(*sym) {
                    Some(sid) => match self.symbols.get(sid).as_type() {
                        Some(t) => t.ty,
                        None => {
                            self.diag(Kind::UndeclaredName, span, format!("`{text}` is not a type"));
                            self.error_ty
                        }
                    },
                    None => {
                        self.diag(Kind::UndeclaredName, span, format!("undeclared type `{text}`"));
                        self.error_ty
                    }
                }
            }
            TypeExpr::Array(inner, len) => {
                let elem = self.resolve_type_expr(inner, span);
                self.types.push(Type::Array(elem, *len))
            }
            TypeExpr::Ref(inner) => {
                let elem = self.resolve_type_expr(inner, span);
                self.types.push(Type::Ref(elem))
            }
        }
    }

    fn type_expr(&mut self, id: ExprId) -> TypeId {
        if let Some(&ty) = self.expr_types.get(&id) {
            return ty;
        }
        let node = self.ast.expr(id);
        let span = node.span;
        let ty = match node.kind.clone() {
            ExprKind::Ident(sym) => match self.symbols.lookup(sym) {
                Some(sid) => {
                    self.expr_symbols.insert(id, sid);
                    self.symbols.get(sid).ty()
                }
                None => {
                    self.diag(Kind::UndeclaredName, span, format!("undeclared name `{}`", self.interner.resolve(sym)));
                    self.error_ty
                }
            },
            ExprKind::IntLit(_) => self.int_ty,
            ExprKind::FloatLit(_) => self.float_ty,
            ExprKind::BoolLit(_) => self.bool_ty,
            ExprKind::StringLit(_) => self.string_ty,
            ExprKind::Paren(inner) => self.type_expr(inner),
            ExprKind::Member(base, field) => {
                let bt = self.type_expr(base);
                let target = deref_once(bt, self.types);
                match self.types.get(target).clone() {
                    Type::Struct { fields, .. } => match fields.iter().find(|f| f.name == field) {
                        Some(f) => f.ty,
                        None => {
                            self.diag(Kind::UnknownMember, span, format!("no field `{}`", self.interner.resolve(field)));
                            self.error_ty
                        }
                    },
                    _ => {
                        self.diag(Kind::TypeMismatch, span, "member access on a non-struct type");
                        self.error_ty
                    }
                }
            }
            ExprKind::Index(base, index) => {
                let bt = self.type_expr(base);
                let it = self.type_expr(index);
                if !structurally_equal(it, self.int_ty, self.types) {
                    self.diag(Kind::TypeMismatch, span, "array index must be INT");
                }
                let target = deref_once(bt, self.types);
                match self.types.get(target).clone() {
                    Type::Array(elem, _) => elem,
                    _ => {
                        self.diag(Kind::TypeMismatch, span, "indexing a non-array type");
                        self.error_ty
                    }
                }
            }
            ExprKind::Call(callee, args) => {
                let ct = self.type_expr(callee);
                match self.types.get(ct).clone() {
                    Type::Function(sig) => {
                        if sig.params.len() != args.len() {
                            self.diag(
                                Kind::ArityMismatch,
                                span,
                                format!("expected {} argument(s), found {}", sig.params.len(), args.len()),
                            );
                        }
                        for (i, &arg) in args.iter().enumerate() {
                            let at = self.type_expr(arg);
                            if let Some(&pt) = sig.params.get(i) {
                                if !assignable_ctx(pt, at, self.types, false) {
                                    self.diag(
                                        Kind::TypeMismatch,
                                        span,
                                        format!("argument {} has an incompatible type", i + 1),
                                    );
                                }
                            }
                        }
                        sig.return_type.unwrap_or(self.error_ty)
                    }
                    _ => {
                        self.diag(Kind::TypeMismatch, span, "called value is not a function");
                        self.error_ty
                    }
                }
            }
            ExprKind::Unary(op, inner) => {
                let it = self.type_expr(inner);
                match op {
                    UnOp::Not => {
                        if !structurally_equal(it, self.bool_ty, self.types) {
                            self.diag(Kind::TypeMismatch, span, "`NOT` requires a BOOL operand");
                        }
                        self.bool_ty
                    }
                    UnOp::Neg => {
                        if !Type::is_numeric(it, self.types) {
                            self.diag(Kind::TypeMismatch, span, "unary `-` requires an INT or FLOAT operand");
                            self.error_ty
                        } else {
                            it
                        }
                    }
                }
            }
            ExprKind::Binary(op, lhs, rhs) => {
                let lt = self.type_expr(lhs);
                let rt = self.type_expr(rhs);
                self.type_binary(op, lt, rt, span)
            }
            ExprKind::Vector(elems) => self.type_vector(&elems, span),
        };
        self.expr_types.insert(id, ty);
        ty
    }

    fn type_binary(&mut self, op: BinOp, lt: TypeId, rt: TypeId, span: Span) -> TypeId {
        use BinOp::*;
        match op {
            Add | Sub | Mul | Div | Mod => {
                if Type::is_numeric(lt, self.types) && structurally_equal(lt, rt, self.types) {
                    lt
                } else {
                    self.diag(Kind::TypeMismatch, span, "arithmetic requires two operands of the same numeric type");
                    self.error_ty
                }
            }
            BitAnd | BitOr | BitXor => {
                if matches!(self.types.get(lt), Type::Basic(Basic::Int)) && structurally_equal(lt, rt, self.types) {
                    lt
                } else {
                    self.diag(Kind::TypeMismatch, span, "bitwise operators require INT operands");
                    self.error_ty
                }
            }
            Eq | Ne | Gt | Ge | Lt | Le => {
                if Type::is_numeric(lt, self.types) && structurally_equal(lt, rt, self.types) {
                    self.bool_ty
                } else {
                    self.diag(Kind::TypeMismatch, span, "comparison requires two operands of the same numeric type");
                    self.error_ty
                }
            }
            And | Or => {
                if structurally_equal(lt, self.bool_ty, self.types) && structurally_equal(rt, self.bool_ty, self.types) {
                    self.bool_ty
                } else {
                    self.diag(Kind::TypeMismatch, span, "logical operators require BOOL operands");
                    self.error_ty
                }
            }
        }
    }

    /// `<<a,b,c>>` requires exactly three FLOAT-assignable components, where
    /// an inner expression already typed `VEC3` contributes all three of its
    /// own (destructuring concatenation, §4.3).
    fn type_vector(&mut self, elems: &[ExprId], span: Span) -> TypeId {
        let mut total = 0u32;
        for &e in elems {
            let et = self.type_expr(e);
            if structurally_equal(et, self.vec3_ty, self.types) {
                total += 3;
            } else {
                if !assignable_ctx(self.float_ty, et, self.types, true) {
                    self.diag(Kind::TypeMismatch, span, "vector component must be FLOAT-assignable");
                }
                total += 1;
            }
        }
        if total != 3 {
            self.diag(Kind::TypeMismatch, span, "vector literal must supply exactly three components");
        }
        self.vec3_ty
    }
}

fn deref_once(ty: TypeId, arena: &Arena<Type>) -> TypeId {
    match arena.get(ty) {
        Type::Ref(inner) => *inner,
        _ => ty,
    }
}

/// Assignability with the `considerReferences` axis from §4.3/§9: local
/// declarations and plain assignment (`true`) tolerate a bare `T` binding to
/// a `Ref(T)` destination; `RETURN` and call-argument binding (`false`) do
/// not, so a `Ref(T)` parameter or return type requires an explicit `Ref(T)`
/// argument.
fn assignable_ctx(dst: TypeId, src: TypeId, arena: &Arena<Type>, consider_references: bool) -> bool {
    if structurally_equal(dst, src, arena) {
        return true;
    }
    match arena.get(dst) {
        Type::Ref(inner) if matches!(arena.get(*inner), Type::Basic(Basic::Any)) => Type::slot_size(src, arena) == 1,
        Type::Ref(inner) if consider_references => {
            structurally_equal(*inner, src, arena)
                || matches!(arena.get(src), Type::Ref(s) if structurally_equal(*inner, *s, arena))
        }
        Type::Basic(Basic::Any) => Type::slot_size(src, arena) == 1,
        _ => false,
    }
}

/// Structural reachability check for `MissingReturn` (§4.6): the last
/// statement of `stmts` is a `RETURN`, or an `IF`/`SWITCH` whose every arm
/// (including an `ELSE`/`DEFAULT`) ends in `RETURN`.
fn ends_in_return(stmts: &[StmtId], ast: &Ast) -> bool {
    match stmts.last() {
        None => false,
        Some(&id) => match &ast.stmt(id).kind {
            StmtKind::Return(_) => true,
            StmtKind::If { then_block, else_block: Some(else_block), .. } => {
                ends_in_return(then_block, ast) && ends_in_return(else_block, ast)
            }
            StmtKind::Switch { cases, default: Some(default), .. } => {
                cases.iter().all(|(_, body)| ends_in_return(body, ast)) && ends_in_return(default, ast)
            }
            _ => false,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::first_pass::{self, register_builtins};
    use crate::lexer::tokenize;
    use crate::parser::Parser;
    use scriptlang_core::FileId;

    fn check(src: &str) -> (SecondPassOutput, Diagnostics, SymbolTable, Arena<Type>) {
        let mut interner = Interner::new();
        let (toks, _) = tokenize(FileId::from_raw(0), src);
        let parser = Parser::new(FileId::from_raw(0), toks, &mut interner);
        let (ast, mut diags) = parser.parse_program();
        let mut types = Arena::new();
        let mut symbols = SymbolTable::new();
        let vec3_ty = register_builtins(&mut types, &mut symbols, &mut interner);
        let fp_out = first_pass::register(&ast, &mut types, &mut symbols, &interner, &mut diags);
        first_pass::resolve_types(&mut types, &symbols, &interner, &HashMap::new(), &mut diags);
        let out = run(&ast, &mut types, &mut symbols, &interner, vec3_ty, &fp_out, &mut diags);
        (out, diags, symbols, types)
    }

    #[test]
    fn well_typed_function_has_no_diagnostics() {
        let src = "FUNC INT ADD(INT a, INT b)\nRETURN a+b\nENDFUNC\n";
        let (_out, diags, _symbols, _types) = check(src);
        assert!(diags.is_empty());
    }

    #[test]
    fn missing_return_is_reported() {
        let src = "FUNC INT F()\nINT x := 1\nENDFUNC\n";
        let (_out, diags, _symbols, _types) = check(src);
        assert!(diags.has_errors());
    }

    #[test]
    fn if_with_return_in_both_arms_satisfies_missing_return() {
        let src = "FUNC INT F(BOOL b)\nIF b\nRETURN 1\nELSE\nRETURN 0\nENDIF\nENDFUNC\n";
        let (_out, diags, _symbols, _types) = check(src);
        assert!(diags.is_empty());
    }

    #[test]
    fn mismatched_arithmetic_operand_types_are_rejected() {
        let src = "FUNC INT F()\nFLOAT x := 1.0\nRETURN x+1\nENDFUNC\n";
        let (_out, diags, _symbols, _types) = check(src);
        assert!(diags.has_errors());
    }

    #[test]
    fn if_condition_must_be_bool() {
        let src = "PROC MAIN()\nINT x := 1\nIF x\nENDIF\nENDPROC\n";
        let (_out, diags, _symbols, _types) = check(src);
        assert!(diags.has_errors());
    }

    #[test]
    fn parameters_and_locals_get_distinct_frame_slots() {
        let src = "PROC MAIN(INT a, INT b)\nINT c := 0\nINT d := 0\nENDPROC\n";
        let mut interner = Interner::new();
        let (toks, _) = tokenize(FileId::from_raw(0), src);
        let parser = Parser::new(FileId::from_raw(0), toks, &mut interner);
        let (ast, mut diags) = parser.parse_program();
        let mut types = Arena::new();
        let mut symbols = SymbolTable::new();
        let vec3_ty = register_builtins(&mut types, &mut symbols, &mut interner);
        let fp_out = first_pass::register(&ast, &mut types, &mut symbols, &interner, &mut diags);
        first_pass::resolve_types(&mut types, &symbols, &interner, &HashMap::new(), &mut diags);
        let _ = run(&ast, &mut types, &mut symbols, &interner, vec3_ty, &fp_out, &mut diags);
        assert!(diags.is_empty());

        let main_sym = interner.intern("MAIN");
        let sid = symbols.lookup(main_sym).unwrap();
        let func = symbols.get(sid).as_function().unwrap();
        assert_eq!(func.args_size, Some(2));
        assert_eq!(func.locals_size, Some(2));
    }

    #[test]
    fn vector_literal_types_as_vec3() {
        let src = "PROC MAIN()\nVEC3 v := <<1.0,2.0,3.0>>\nENDPROC\n";
        let (_out, diags, _symbols, _types) = check(src);
        assert!(diags.is_empty());
    }

    #[test]
    fn duplicate_switch_case_is_reported() {
        let src = "PROC MAIN()\nINT x := 0\nSWITCH x\nCASE 1:\nBREAK\nCASE 1:\nBREAK\nENDSWITCH\nENDPROC\n";
        let (_out, diags, _symbols, _types) = check(src);
        assert!(diags.has_errors());
    }
}
