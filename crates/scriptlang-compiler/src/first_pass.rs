//! First pass: registers every top-level symbol with a (possibly
//! `Unresolved`) type, then resolves type references transitively and
//! detects struct cycles. See §4.2.

use std::collections::HashMap;
use std::collections::HashSet;

use scriptlang_core::{Arena, Span, Symbol};

use crate::ast::{self, Ast, Item, Param, TypeExpr};
use crate::diagnostics::{DiagnosticMessage, Diagnostics, Kind};
use crate::symtab::{
    FunctionBody, FunctionSymbol, SymbolEntry, SymbolId, SymbolTable, TypeSymbol, VariableKind,
    VariableSymbol,
};
use crate::types::{Basic, Field, FunctionSig, Type, TypeId};

/// What the first pass hands to constant folding: one entry per `CONST`
/// declaration, its symbol and its (still-AST) initializer expression.
#[derive(Clone, Copy)]
pub struct ConstQueueEntry {
    pub symbol: SymbolId,
    pub initializer: ast::ExprId,
}

/// Top-level facts gathered while walking items, separate from the symbol
/// table entries themselves.
/// A defined `PROC`/`FUNC`, carried forward so the second pass can see
/// parameter names (the symbol table only stores their `Type`s).
pub struct FunctionEntry {
    pub symbol: SymbolId,
    pub params: Vec<Param>,
    pub body: Vec<ast::StmtId>,
}

#[derive(Default)]
pub struct FirstPassOutput {
    pub script_name: Option<Symbol>,
    pub script_hash: Option<i64>,
    pub usings: Vec<String>,
    pub const_queue: Vec<ConstQueueEntry>,
    /// Every `PROC`/`FUNC` with a body, in declaration order, consumed by
    /// the second pass.
    pub functions: Vec<FunctionEntry>,
    /// Non-const static declarations with their optional initializer.
    pub static_decls: Vec<(SymbolId, Option<ast::ExprId>)>,
    /// The block index of the script's `GLOBAL` section, if it declares one.
    /// A script may only own a single globals block; later ones overwrite
    /// this silently rather than erroring, since block ownership beyond the
    /// index itself is out of scope here.
    pub globals_block_index: Option<u32>,
}

pub(crate) fn basic_for_name(name: &str) -> Option<Basic> {
    match name {
        "INT" => Some(Basic::Int),
        "FLOAT" => Some(Basic::Float),
        "BOOL" => Some(Basic::Bool),
        "STRING" => Some(Basic::String),
        "ANY" => Some(Basic::Any),
        _ => None,
    }
}

pub(crate) fn type_expr_to_id(
    te: &TypeExpr,
    types: &mut Arena<Type>,
    interner: &scriptlang_core::Interner,
) -> TypeId {
    match te {
        TypeExpr::Named(sym) => {
            let text = interner.resolve(*sym);
            match basic_for_name(text) {
                Some(basic) => types.push(Type::Basic(basic)),
                None => types.push(Type::Unresolved(*sym)),
            }
        }
        TypeExpr::Array(inner, len) => {
            let elem = type_expr_to_id(inner, types, interner);
            types.push(Type::Array(elem, *len))
        }
        TypeExpr::Ref(inner) => {
            let elem = type_expr_to_id(inner, types, interner);
            types.push(Type::Ref(elem))
        }
    }
}

fn params_to_type_ids(
    params: &[Param],
    types: &mut Arena<Type>,
    interner: &scriptlang_core::Interner,
) -> Vec<TypeId> {
    params.iter().map(|p| type_expr_to_id(&p.ty, types, interner)).collect()
}

/// Runs the registration walk: every item becomes a symbol-table entry (or
/// session-level fact for `SCRIPT_NAME`/`SCRIPT_HASH`/`USING`).
pub fn register(
    ast: &Ast,
    types: &mut Arena<Type>,
    symbols: &mut SymbolTable,
    interner: &scriptlang_core::Interner,
    diagnostics: &mut Diagnostics,
) -> FirstPassOutput {
    let mut out = FirstPassOutput::default();

    for item in &ast.items {
        match item {
            Item::ScriptName(name) => out.script_name = Some(*name),
            Item::ScriptHash(hash) => out.script_hash = Some(*hash),
            Item::Using(path) => out.usings.push(path.clone()),
            Item::Struct(decl) => {
                let fields: Vec<Field> = decl
                    .fields
                    .iter()
                    .map(|f| Field { name: f.name, ty: type_expr_to_id(&f.ty, types, interner) })
                    .collect();
                let ty = types.push(Type::Struct { name: decl.name, fields });
                let _ = symbols.add(SymbolEntry::Type(TypeSymbol {
                    name: decl.name,
                    span: decl.span,
                    ty,
                }));
            }
            Item::Proc(decl) | Item::Func(decl) => {
                let params = params_to_type_ids(&decl.params, types, interner);
                let return_type = decl.return_type.as_ref().map(|t| type_expr_to_id(t, types, interner));
                let ty = types.push(Type::Function(FunctionSig { params, return_type }));
                match symbols.add(SymbolEntry::Function(FunctionSymbol {
                    name: decl.name,
                    span: decl.span,
                    ty,
                    body: FunctionBody::Defined { entry_label: None },
                    locals_size: None,
                    args_size: None,
                })) {
                    Ok(sid) => out.functions.push(FunctionEntry {
                        symbol: sid,
                        params: decl.params.clone(),
                        body: decl.body.clone().unwrap_or_default(),
                    }),
                    Err(_) => diagnostics.push(DiagnosticMessage::error(
                        Kind::DuplicateSymbol,
                        decl.span,
                        format!("`{}` is already declared in this scope", interner.resolve(decl.name)),
                    )),
                }
            }
            Item::ProtoProc(decl) | Item::ProtoFunc(decl) => {
                let params = params_to_type_ids(&decl.params, types, interner);
                let return_type = decl.return_type.as_ref().map(|t| type_expr_to_id(t, types, interner));
                let ty = types.push(Type::Function(FunctionSig { params, return_type }));
                let _ = symbols.add(SymbolEntry::Function(FunctionSymbol {
                    name: decl.name,
                    span: decl.span,
                    ty,
                    body: FunctionBody::Prototype,
                    locals_size: None,
                    args_size: None,
                }));
            }
            Item::NativeProc(decl) | Item::NativeFunc(decl) => {
                let params = params_to_type_ids(&decl.params, types, interner);
                let return_type = decl.return_type.as_ref().map(|t| type_expr_to_id(t, types, interner));
                let ty = types.push(Type::Function(FunctionSig { params, return_type }));
                let hash = native_hash(interner.resolve(decl.name));
                let _ = symbols.add(SymbolEntry::Function(FunctionSymbol {
                    name: decl.name,
                    span: decl.span,
                    ty,
                    body: FunctionBody::Native { hash },
                    locals_size: None,
                    args_size: None,
                }));
            }
            Item::Const(decl) => {
                let ty = type_expr_to_id(&decl.ty, types, interner);
                match symbols.add(SymbolEntry::Variable(VariableSymbol {
                    name: decl.name,
                    span: decl.span,
                    ty,
                    kind: VariableKind::Constant,
                    frame_slot: None,
                    initializer: None,
                })) {
                    Ok(sid) => {
                        if let Some(init) = decl.initializer {
                            out.const_queue.push(ConstQueueEntry { symbol: sid, initializer: init });
                        }
                    }
                    Err(_) => diagnostics.push(DiagnosticMessage::error(
                        Kind::DuplicateSymbol,
                        decl.span,
                        format!("`{}` is already declared", interner.resolve(decl.name)),
                    )),
                }
            }
            Item::Static(decl) => {
                let ty = type_expr_to_id(&decl.ty, types, interner);
                match symbols.add(SymbolEntry::Variable(VariableSymbol {
                    name: decl.name,
                    span: decl.span,
                    ty,
                    kind: VariableKind::Static,
                    frame_slot: None,
                    initializer: None,
                })) {
                    Ok(sid) => out.static_decls.push((sid, decl.initializer)),
                    Err(_) => diagnostics.push(DiagnosticMessage::error(
                        Kind::DuplicateSymbol,
                        decl.span,
                        format!("`{}` is already declared", interner.resolve(decl.name)),
                    )),
                }
            }
            Item::Global { block, decls, .. } => {
                out.globals_block_index = Some(*block);
                for decl in decls {
                    let ty = type_expr_to_id(&decl.ty, types, interner);
                    match symbols.add(SymbolEntry::Variable(VariableSymbol {
                        name: decl.name,
                        span: decl.span,
                        ty,
                        kind: VariableKind::Global,
                        frame_slot: None,
                        initializer: None,
                    })) {
                        Ok(sid) => out.static_decls.push((sid, decl.initializer)),
                        Err(_) => diagnostics.push(DiagnosticMessage::error(
                            Kind::DuplicateSymbol,
                            decl.span,
                            format!("`{}` is already declared", interner.resolve(decl.name)),
                        )),
                    }
                }
            }
        }
    }

    out
}

/// Registers the implicit prelude: currently just `VEC3`, the 3-float
/// struct that vector literals (`<<x,y,z>>`) bind to. Carries [`Span::unknown`]
/// since it has no declaration site in user source.
pub fn register_builtins(
    types: &mut Arena<Type>,
    symbols: &mut SymbolTable,
    interner: &mut scriptlang_core::Interner,
) -> TypeId {
    let float_ty = types.push(Type::Basic(Basic::Float));
    let x = interner.intern("X");
    let y = interner.intern("Y");
    let z = interner.intern("Z");
    let name = interner.intern("VEC3");
    let vec3_ty = types.push(Type::Struct {
        name,
        fields: vec![
            Field { name: x, ty: float_ty },
            Field { name: y, ty: float_ty },
            Field { name: z, ty: float_ty },
        ],
    });
    let _ = symbols.add(SymbolEntry::Type(TypeSymbol { name, span: Span::unknown(), ty: vec3_ty }));
    vec3_ty
}

/// A cheap non-cryptographic hash, standing in for the real hashing scheme
/// the host engine uses to address natives (out of scope per §1).
fn native_hash(name: &str) -> u64 {
    let mut h: u64 = 0xcbf2_9ce4_8422_2325;
    for b in name.bytes() {
        h ^= b as u64;
        h = h.wrapping_mul(0x100_0000_01b3);
    }
    h
}

/// Resolves every `Unresolved` type placeholder in place, then checks for
/// struct cycles. Spans are used only for diagnostics; `struct_spans` maps
/// a struct's own `TypeId` to its declaration span.
pub fn resolve_types(
    types: &mut Arena<Type>,
    symbols: &SymbolTable,
    interner: &scriptlang_core::Interner,
    struct_spans: &HashMap<TypeId, Span>,
    diagnostics: &mut Diagnostics,
) {
    let ids: Vec<TypeId> = types.iter().map(|(id, _)| id).collect();

    for &id in &ids {
        let name = match types.get(id) {
            Type::Unresolved(name) => *name,
            _ => continue,
        };
        match symbols.lookup(name) {
            Some(sid) => match symbols.get(sid).as_type() {
                Some(type_sym) => {
                    let resolved = types.get(type_sym.ty).clone();
                    *types.get_mut(id) = resolved;
                }
                None => diagnostics.push(DiagnosticMessage::error(
                    Kind::UndeclaredName,
                    Span::unknown(),
                    format!("`{}` is not a type", interner.resolve(name)),
                )),
            },
            None => diagnostics.push(DiagnosticMessage::error(
                Kind::UndeclaredName,
                Span::unknown(),
                format!("undeclared type `{}`", interner.resolve(name)),
            )),
        }
    }

    for &id in &ids {
        let (name, mut fields) = match types.get(id) {
            Type::Struct { name, fields } => (*name, fields.clone()),
            _ => continue,
        };
        if let Some(i) = fields.iter().position(|f| struct_reaches(name, f.ty, types, &mut HashSet::new())) {
            let span = struct_spans.get(&id).copied().unwrap_or_else(Span::unknown);
            diagnostics.push(DiagnosticMessage::error(
                Kind::CircularType,
                span,
                format!("circular type: struct `{}` transitively contains itself", interner.resolve(name)),
            ));
            let placeholder = types.push(Type::Unresolved(name));
            fields[i].ty = placeholder;
            *types.get_mut(id) = Type::Struct { name, fields };
        }
    }
}

/// Does `current` (or any non-`Ref` type it structurally contains) name the
/// struct `origin`? `Ref` indirection breaks the cycle since it's a single
/// pointer slot, not inline storage (T1/T2 in §3).
fn struct_reaches(origin: Symbol, current: TypeId, arena: &Arena<Type>, visited: &mut HashSet<TypeId>) -> bool {
    if !visited.insert(current) {
        return false;
    }
    match arena.get(current) {
        Type::Struct { name, fields } => {
            *name == origin || fields.iter().any(|f| struct_reaches(origin, f.ty, arena, visited))
        }
        Type::Array(elem, _) => struct_reaches(origin, *elem, arena, visited),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::tokenize;
    use crate::parser::Parser;
    use scriptlang_core::{FileId, Interner};

    fn first_pass(src: &str) -> (Arena<Type>, SymbolTable, FirstPassOutput, Diagnostics, Interner) {
        let mut interner = Interner::new();
        let (toks, _) = tokenize(FileId::from_raw(0), src);
        let parser = Parser::new(FileId::from_raw(0), toks, &mut interner);
        let (ast, mut diags) = parser.parse_program();
        let mut types = Arena::new();
        let mut symbols = SymbolTable::new();
        let out = register(&ast, &mut types, &mut symbols, &interner, &mut diags);
        resolve_types(&mut types, &symbols, &interner, &HashMap::new(), &mut diags);
        (types, symbols, out, diags, interner)
    }

    #[test]
    fn struct_field_type_resolves_to_declared_struct() {
        let src = "STRUCT INNER\nINT x\nENDSTRUCT\nSTRUCT OUTER\nINNER i\nENDSTRUCT\n";
        let (_types, symbols, _out, diags, mut interner) = first_pass(src);
        assert!(diags.is_empty());
        let outer_name = interner.intern("OUTER");
        let outer_id = symbols.lookup(outer_name).unwrap();
        assert!(symbols.get(outer_id).as_type().is_some());
    }

    #[test]
    fn direct_self_reference_is_circular_type_error() {
        let src = "STRUCT A\nA b\nENDSTRUCT\n";
        let (_types, _symbols, _out, diags, _interner) = first_pass(src);
        assert_eq!(diags.error_count(), 1);
    }

    #[test]
    fn ref_to_self_is_not_circular() {
        let src = "STRUCT NODE\n&NODE next\nENDSTRUCT\n";
        let (_types, _symbols, _out, diags, _interner) = first_pass(src);
        assert!(diags.is_empty());
    }

    #[test]
    fn undeclared_type_name_is_reported() {
        let src = "STRUCT A\nNOPE x\nENDSTRUCT\n";
        let (_types, _symbols, _out, diags, _interner) = first_pass(src);
        assert!(diags.has_errors());
    }

    #[test]
    fn const_initializer_is_queued() {
        let src = "CONST INT X := 3\n";
        let (_types, _symbols, out, diags, _interner) = first_pass(src);
        assert!(diags.is_empty());
        assert_eq!(out.const_queue.len(), 1);
    }
}
