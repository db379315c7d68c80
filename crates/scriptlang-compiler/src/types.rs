//! The type system: basic types, arrays, refs, structs and function
//! signatures, all stored in an [`scriptlang_core::Arena`] and addressed by
//! [`TypeId`] so that mutually-recursive struct and function types don't
//! need `Rc<RefCell<_>>`.

use scriptlang_core::{Arena, Id, Symbol};

pub type TypeId = Id<Type>;

/// A basic (one-slot) scalar kind.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Basic {
    Int,
    Float,
    Bool,
    String,
    Any,
}

/// A field of a `Struct` type.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Field {
    pub name: Symbol,
    pub ty: TypeId,
}

/// A function or procedure signature.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FunctionSig {
    pub params: Vec<TypeId>,
    /// `None` for a procedure (no return value).
    pub return_type: Option<TypeId>,
}

/// A type-graph node.
///
/// `Unresolved` is a placeholder written during the first pass's top-level
/// walk for any type annotation that is just a bare name; [`crate::first_pass`]
/// replaces it in place (write-through on its owning `TypeId`) once the
/// named `TypeSymbol` is known.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Type {
    Basic(Basic),
    Array(TypeId, u32),
    Ref(TypeId),
    Struct { name: Symbol, fields: Vec<Field> },
    Function(FunctionSig),
    /// A name that hasn't been looked up yet (or failed to resolve).
    Unresolved(Symbol),
}

impl Type {
    /// Number of 8-byte frame slots this type occupies, per §4.7:
    /// Basic = 1, Ref = 1, Array(T,n) = 1 + n·size(T) (leading slot is the
    /// length), Struct = sum of field sizes.
    pub fn slot_size(id: TypeId, arena: &Arena<Type>) -> u32 {
        match arena.get(id) {
            Type::Basic(_) | Type::Ref(_) => 1,
            Type::Array(elem, len) => 1 + len * Type::slot_size(*elem, arena),
            Type::Struct { fields, .. } => {
                fields.iter().map(|f| Type::slot_size(f.ty, arena)).sum()
            }
            Type::Function(_) => 1,
            Type::Unresolved(_) => 1,
        }
    }

    pub fn is_unresolved(id: TypeId, arena: &Arena<Type>) -> bool {
        matches!(arena.get(id), Type::Unresolved(_))
    }

    pub fn is_numeric(id: TypeId, arena: &Arena<Type>) -> bool {
        matches!(arena.get(id), Type::Basic(Basic::Int) | Type::Basic(Basic::Float))
    }
}

/// Structural equality of two types, following `TypeId` links recursively.
/// Two `Unresolved` placeholders are equal only if they name the same
/// symbol (used for self-reference checks before resolution completes).
pub fn structurally_equal(a: TypeId, b: TypeId, arena: &Arena<Type>) -> bool {
    if a == b {
        return true;
    }
    match (arena.get(a), arena.get(b)) {
        (Type::Basic(x), Type::Basic(y)) => x == y,
        (Type::Array(ea, na), Type::Array(eb, nb)) => {
            na == nb && structurally_equal(*ea, *eb, arena)
        }
        (Type::Ref(ea), Type::Ref(eb)) => structurally_equal(*ea, *eb, arena),
        (Type::Struct { name: na, .. }, Type::Struct { name: nb, .. }) => na == nb,
        (Type::Function(fa), Type::Function(fb)) => {
            fa.params.len() == fb.params.len()
                && fa
                    .params
                    .iter()
                    .zip(&fb.params)
                    .all(|(p, q)| structurally_equal(*p, *q, arena))
                && match (fa.return_type, fb.return_type) {
                    (Some(ra), Some(rb)) => structurally_equal(ra, rb, arena),
                    (None, None) => true,
                    _ => false,
                }
        }
        (Type::Unresolved(na), Type::Unresolved(nb)) => na == nb,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scriptlang_core::Interner;

    #[test]
    fn basic_types_are_one_slot() {
        let mut arena = Arena::new();
        let int_ty = arena.push(Type::Basic(Basic::Int));
        assert_eq!(Type::slot_size(int_ty, &arena), 1);
    }

    #[test]
    fn array_slot_size_includes_length_slot() {
        let mut arena = Arena::new();
        let int_ty = arena.push(Type::Basic(Basic::Int));
        let arr_ty = arena.push(Type::Array(int_ty, 4));
        assert_eq!(Type::slot_size(arr_ty, &arena), 1 + 4);
    }

    #[test]
    fn struct_slot_size_is_sum_of_fields() {
        let mut interner = Interner::new();
        let x = interner.intern("x");
        let y = interner.intern("y");
        let mut arena = Arena::new();
        let float_ty = arena.push(Type::Basic(Basic::Float));
        let name = interner.intern("VEC3");
        let struct_ty = arena.push(Type::Struct {
            name,
            fields: vec![
                Field { name: x, ty: float_ty },
                Field { name: y, ty: float_ty },
            ],
        });
        assert_eq!(Type::slot_size(struct_ty, &arena), 2);
    }
}
