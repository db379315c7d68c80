//! Lexically scoped symbol table with RAII scope guards.

use std::collections::HashMap;

use scriptlang_core::{Span, Symbol};

use crate::types::TypeId;

pub type SymbolId = scriptlang_core::Id<SymbolEntry>;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum VariableKind {
    Static,
    Global,
    Constant,
    Local,
    LocalArgument,
}

#[derive(Clone, Debug)]
pub struct VariableSymbol {
    pub name: Symbol,
    pub span: Span,
    pub ty: TypeId,
    pub kind: VariableKind,
    pub frame_slot: Option<u32>,
    /// Present once the const-folding evaluator (or the parser, for plain
    /// declarations) has bound a literal initializer.
    pub initializer: Option<crate::ast::ExprId>,
}

#[derive(Clone, Debug)]
pub enum FunctionBody {
    /// Has a body in this translation unit.
    Defined { entry_label: Option<u32> },
    /// Declared `NATIVE`; identified by a 64-bit hash for the native db.
    Native { hash: u64 },
    /// A `PROTO` type-only alias with no callable body yet.
    Prototype,
}

#[derive(Clone, Debug)]
pub struct FunctionSymbol {
    pub name: Symbol,
    pub span: Span,
    pub ty: TypeId,
    pub body: FunctionBody,
    pub locals_size: Option<u32>,
    pub args_size: Option<u32>,
}

#[derive(Clone, Debug)]
pub struct TypeSymbol {
    pub name: Symbol,
    pub span: Span,
    pub ty: TypeId,
}

/// One named entity: a type, variable, or function.
#[derive(Clone, Debug)]
pub enum SymbolEntry {
    Type(TypeSymbol),
    Variable(VariableSymbol),
    Function(FunctionSymbol),
}

impl SymbolEntry {
    pub fn name(&self) -> Symbol {
        match self {
            SymbolEntry::Type(t) => t.name,
            SymbolEntry::Variable(v) => v.name,
            SymbolEntry::Function(f) => f.name,
        }
    }

    pub fn ty(&self) -> TypeId {
        match self {
            SymbolEntry::Type(t) => t.ty,
            SymbolEntry::Variable(v) => v.ty,
            SymbolEntry::Function(f) => f.ty,
        }
    }

    pub fn as_type(&self) -> Option<&TypeSymbol> {
        match self {
            SymbolEntry::Type(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_variable(&self) -> Option<&VariableSymbol> {
        match self {
            SymbolEntry::Variable(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_variable_mut(&mut self) -> Option<&mut VariableSymbol> {
        match self {
            SymbolEntry::Variable(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_function(&self) -> Option<&FunctionSymbol> {
        match self {
            SymbolEntry::Function(f) => Some(f),
            _ => None,
        }
    }

    pub fn as_function_mut(&mut self) -> Option<&mut FunctionSymbol> {
        match self {
            SymbolEntry::Function(f) => Some(f),
            _ => None,
        }
    }
}

/// Result of `add`: the symbol already existed in the current scope.
#[derive(Debug)]
pub struct DuplicateSymbol;

/// Result of `import`: a root-scope name collided with an existing one.
#[derive(Debug)]
pub struct DuplicateImport(pub Symbol);

type Scope = HashMap<Symbol, SymbolId>;

/// A chain of scopes over an arena of [`SymbolEntry`] values.
///
/// Names are matched case-insensitively for lookup purposes at the parser
/// layer (identifiers are interned as written; the parser normalizes case
/// before interning a reference so that `Lookup` never needs to re-derive
/// a case-folded key here).
pub struct SymbolTable {
    arena: scriptlang_core::Arena<SymbolEntry>,
    scopes: Vec<Scope>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self {
            arena: scriptlang_core::Arena::new(),
            scopes: vec![Scope::new()],
        }
    }

    pub fn get(&self, id: SymbolId) -> &SymbolEntry {
        self.arena.get(id)
    }

    pub fn get_mut(&mut self, id: SymbolId) -> &mut SymbolEntry {
        self.arena.get_mut(id)
    }

    /// Insert `entry` into the current (innermost) scope.
    pub fn add(&mut self, entry: SymbolEntry) -> Result<SymbolId, DuplicateSymbol> {
        let name = entry.name();
        if self.scopes.last().unwrap().contains_key(&name) {
            return Err(DuplicateSymbol);
        }
        let id = self.arena.push(entry);
        self.scopes.last_mut().unwrap().insert(name, id);
        Ok(id)
    }

    /// Walk the scope chain from innermost to outermost, returning the
    /// first match.
    pub fn lookup(&self, name: Symbol) -> Option<SymbolId> {
        self.scopes.iter().rev().find_map(|scope| scope.get(&name).copied())
    }

    pub fn enter_scope(&mut self) {
        self.scopes.push(Scope::new());
    }

    pub fn exit_scope(&mut self) {
        assert!(self.scopes.len() > 1, "cannot pop the root scope");
        self.scopes.pop();
    }

    /// Begin a scope that is automatically popped when the returned guard
    /// is dropped, so every exit path (including `?` early-returns) releases
    /// it.
    pub fn scope_guard(&mut self) -> ScopeGuard<'_> {
        self.enter_scope();
        ScopeGuard { table: self }
    }

    /// Copy only the root-scope symbols of `other` into this table's root
    /// scope. Nested scopes of `other` are not visible to the import.
    pub fn import(&mut self, other: &SymbolTable) -> Vec<DuplicateImport> {
        let mut collisions = Vec::new();
        let root = &other.scopes[0];
        for (&name, &id) in root {
            let entry = other.arena.get(id).clone();
            if self.scopes[0].contains_key(&name) {
                collisions.push(DuplicateImport(name));
                continue;
            }
            let new_id = self.arena.push(entry);
            self.scopes[0].insert(name, new_id);
        }
        collisions
    }

    pub fn depth(&self) -> usize {
        self.scopes.len()
    }
}

impl Default for SymbolTable {
    fn default() -> Self {
        Self::new()
    }
}

/// RAII guard returned by [`SymbolTable::scope_guard`]; pops the scope on
/// drop regardless of how the enclosing function returns.
pub struct ScopeGuard<'a> {
    table: &'a mut SymbolTable,
}

impl std::ops::Deref for ScopeGuard<'_> {
    type Target = SymbolTable;
    fn deref(&self) -> &SymbolTable {
        self.table
    }
}

impl std::ops::DerefMut for ScopeGuard<'_> {
    fn deref_mut(&mut self) -> &mut SymbolTable {
        self.table
    }
}

impl Drop for ScopeGuard<'_> {
    fn drop(&mut self) {
        self.table.exit_scope();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Basic, Type};
    use scriptlang_core::{FileId, Interner, Position};

    fn dummy_span() -> Span {
        Span::new(FileId::from_raw(0), Position::new(1, 1), Position::new(1, 1), (0, 0))
    }

    fn make_table_with_int() -> (SymbolTable, scriptlang_core::Arena<Type>, Symbol) {
        let mut interner = Interner::new();
        let name = interner.intern("x");
        let mut types = scriptlang_core::Arena::new();
        let int_ty = types.push(Type::Basic(Basic::Int));
        let mut table = SymbolTable::new();
        table
            .add(SymbolEntry::Variable(VariableSymbol {
                name,
                span: dummy_span(),
                ty: int_ty,
                kind: VariableKind::Local,
                frame_slot: None,
                initializer: None,
            }))
            .unwrap();
        (table, types, name)
    }

    #[test]
    fn add_and_lookup_roundtrip() {
        let (table, _types, name) = make_table_with_int();
        let id = table.lookup(name).unwrap();
        assert_eq!(table.get(id).name(), name);
    }

    #[test]
    fn same_scope_shadowing_is_forbidden() {
        let (mut table, types, name) = make_table_with_int();
        let int_ty = types.iter().next().unwrap().0;
        let result = table.add(SymbolEntry::Variable(VariableSymbol {
            name,
            span: dummy_span(),
            ty: int_ty,
            kind: VariableKind::Local,
            frame_slot: None,
            initializer: None,
        }));
        assert!(result.is_err());
    }

    #[test]
    fn outer_scope_shadowing_is_permitted() {
        let (mut table, types, name) = make_table_with_int();
        let int_ty = types.iter().next().unwrap().0;
        {
            let mut guard = table.scope_guard();
            guard
                .add(SymbolEntry::Variable(VariableSymbol {
                    name,
                    span: dummy_span(),
                    ty: int_ty,
                    kind: VariableKind::Local,
                    frame_slot: None,
                    initializer: None,
                }))
                .unwrap();
        }
        assert_eq!(table.depth(), 1);
    }

    #[test]
    fn scope_guard_pops_on_drop_even_through_early_return() {
        let mut table = SymbolTable::new();
        fn helper(table: &mut SymbolTable) -> Option<()> {
            let _guard = table.scope_guard();
            None?;
            Some(())
        }
        helper(&mut table);
        assert_eq!(table.depth(), 1);
    }

    #[test]
    fn lookup_walks_chain_to_innermost_match() {
        let (mut table, _types, name) = make_table_with_int();
        let inner_id;
        {
            let mut guard = table.scope_guard();
            let mut types2 = scriptlang_core::Arena::new();
            let float_ty = types2.push(Type::Basic(Basic::Float));
            inner_id = guard
                .add(SymbolEntry::Variable(VariableSymbol {
                    name,
                    span: dummy_span(),
                    ty: float_ty,
                    kind: VariableKind::Local,
                    frame_slot: None,
                    initializer: None,
                }))
                .unwrap();
            assert_eq!(guard.lookup(name).unwrap(), inner_id);
        }
        // Back in outer scope, the inner shadow is gone.
        let outer_id = table.lookup(name).unwrap();
        assert_ne!(outer_id, inner_id);
    }

    #[test]
    fn import_copies_root_scope_and_reports_collisions() {
        let (source, _types, name) = make_table_with_int();
        let mut dest = SymbolTable::new();
        let collisions = dest.import(&source);
        assert!(collisions.is_empty());
        assert!(dest.lookup(name).is_some());

        let collisions_again = dest.import(&source);
        assert_eq!(collisions_again.len(), 1);
        assert_eq!(collisions_again[0].0, name);
    }
}
