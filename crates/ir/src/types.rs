//! # Type System
//!
//! A small closed set of first-order types, interned per module so that
//! identical types share a [`TypeId`] and compare by identity. Pointer and
//! array types are interned per contained type; two `i32*` handles obtained
//! independently are always the same id.

use index_vec::IndexVec;
use rustc_hash::FxHashMap;

use crate::TypeId;

/// The structural description of a type.
///
/// Types are immutable once interned. `Function` types carry a `variadic`
/// flag for the formatted-output runtime routine; ordinary Tern functions
/// are never variadic.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeKind {
    /// The absence of a value (function results only)
    Void,

    /// The type of a basic block used as a branch target
    Label,

    /// An integer of the given bit width (i1, i8, i32)
    Int(u8),

    /// A 32-bit IEEE float
    Float,

    /// A function signature
    Function {
        ret: TypeId,
        params: Vec<TypeId>,
        variadic: bool,
    },

    /// A pointer to a value of the contained type
    Pointer(TypeId),

    /// A fixed-length array of the contained type
    Array { elem: TypeId, len: usize },
}

/// The per-module table of interned types.
///
/// The common scalar types are interned at construction so their ids are
/// available without a mutable borrow.
#[derive(Debug, Clone)]
pub struct TypeStore {
    kinds: IndexVec<TypeId, TypeKind>,
    interned: FxHashMap<TypeKind, TypeId>,
    void: TypeId,
    label: TypeId,
    i1: TypeId,
    i8: TypeId,
    i32: TypeId,
    float: TypeId,
}

impl TypeStore {
    pub fn new() -> Self {
        let mut store = Self {
            kinds: IndexVec::new(),
            interned: FxHashMap::default(),
            void: TypeId::from_raw(0),
            label: TypeId::from_raw(0),
            i1: TypeId::from_raw(0),
            i8: TypeId::from_raw(0),
            i32: TypeId::from_raw(0),
            float: TypeId::from_raw(0),
        };
        store.void = store.intern(TypeKind::Void);
        store.label = store.intern(TypeKind::Label);
        store.i1 = store.intern(TypeKind::Int(1));
        store.i8 = store.intern(TypeKind::Int(8));
        store.i32 = store.intern(TypeKind::Int(32));
        store.float = store.intern(TypeKind::Float);
        store
    }

    /// Interns a type kind, returning the id of the canonical instance.
    pub fn intern(&mut self, kind: TypeKind) -> TypeId {
        if let Some(&id) = self.interned.get(&kind) {
            return id;
        }
        let id = self.kinds.push(kind.clone());
        self.interned.insert(kind, id);
        id
    }

    /// Returns the structural description of an interned type.
    pub fn kind(&self, id: TypeId) -> &TypeKind {
        &self.kinds[id]
    }

    pub const fn void(&self) -> TypeId {
        self.void
    }

    pub const fn label(&self) -> TypeId {
        self.label
    }

    pub const fn bool(&self) -> TypeId {
        self.i1
    }

    pub const fn i8(&self) -> TypeId {
        self.i8
    }

    pub const fn i32(&self) -> TypeId {
        self.i32
    }

    pub const fn float(&self) -> TypeId {
        self.float
    }

    pub fn int(&mut self, bits: u8) -> TypeId {
        self.intern(TypeKind::Int(bits))
    }

    pub fn pointer(&mut self, pointee: TypeId) -> TypeId {
        self.intern(TypeKind::Pointer(pointee))
    }

    pub fn array(&mut self, elem: TypeId, len: usize) -> TypeId {
        self.intern(TypeKind::Array { elem, len })
    }

    pub fn function(&mut self, ret: TypeId, params: Vec<TypeId>) -> TypeId {
        self.intern(TypeKind::Function {
            ret,
            params,
            variadic: false,
        })
    }

    pub fn variadic_function(&mut self, ret: TypeId, params: Vec<TypeId>) -> TypeId {
        self.intern(TypeKind::Function {
            ret,
            params,
            variadic: true,
        })
    }

    /// Returns true if `id` is an integer type of any width.
    pub fn is_int(&self, id: TypeId) -> bool {
        matches!(self.kind(id), TypeKind::Int(_))
    }

    pub fn is_float(&self, id: TypeId) -> bool {
        matches!(self.kind(id), TypeKind::Float)
    }

    pub fn is_pointer(&self, id: TypeId) -> bool {
        matches!(self.kind(id), TypeKind::Pointer(_))
    }

    /// Returns the contained type of a pointer, or None for other kinds.
    pub fn pointee(&self, id: TypeId) -> Option<TypeId> {
        match self.kind(id) {
            TypeKind::Pointer(p) => Some(*p),
            _ => None,
        }
    }

    /// Returns the element type of an array, or None for other kinds.
    pub fn element(&self, id: TypeId) -> Option<TypeId> {
        match self.kind(id) {
            TypeKind::Array { elem, .. } => Some(*elem),
            _ => None,
        }
    }

    /// Returns the result type of a function type.
    ///
    /// # Panics
    /// Panics if `id` is not a function type; callers hold a function's
    /// type id, so anything else is a contract violation.
    pub fn result_of(&self, id: TypeId) -> TypeId {
        match self.kind(id) {
            TypeKind::Function { ret, .. } => *ret,
            other => panic!("expected function type, found {other:?}"),
        }
    }

    /// Returns the parameter types and variadic flag of a function type.
    pub fn params_of(&self, id: TypeId) -> (&[TypeId], bool) {
        match self.kind(id) {
            TypeKind::Function {
                params, variadic, ..
            } => (params, *variadic),
            other => panic!("expected function type, found {other:?}"),
        }
    }
}

impl Default for TypeStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_types_are_preinterned() {
        let store = TypeStore::new();
        assert_eq!(store.kind(store.void()), &TypeKind::Void);
        assert_eq!(store.kind(store.i32()), &TypeKind::Int(32));
        assert_eq!(store.kind(store.bool()), &TypeKind::Int(1));
        assert_eq!(store.kind(store.float()), &TypeKind::Float);
    }

    #[test]
    fn pointer_types_intern_per_pointee() {
        let mut store = TypeStore::new();
        let p1 = store.pointer(store.i32());
        let p2 = store.pointer(store.i32());
        let pf = store.pointer(store.float());
        assert_eq!(p1, p2);
        assert_ne!(p1, pf);
        assert_eq!(store.pointee(p1), Some(store.i32()));
    }

    #[test]
    fn array_types_intern_per_element_and_length() {
        let mut store = TypeStore::new();
        let a1 = store.array(store.i32(), 8);
        let a2 = store.array(store.i32(), 8);
        let a3 = store.array(store.i32(), 9);
        assert_eq!(a1, a2);
        assert_ne!(a1, a3);

        // Nested arrays intern per contained type as well
        let aa1 = store.array(a1, 2);
        let aa2 = store.array(a2, 2);
        assert_eq!(aa1, aa2);
    }

    #[test]
    fn function_types_intern_per_signature() {
        let mut store = TypeStore::new();
        let f1 = store.function(store.i32(), vec![store.i32()]);
        let f2 = store.function(store.i32(), vec![store.i32()]);
        let f3 = store.function(store.void(), vec![store.i32()]);
        assert_eq!(f1, f2);
        assert_ne!(f1, f3);

        // Variadic and non-variadic signatures are distinct types
        let v = store.variadic_function(store.i32(), vec![store.i32()]);
        assert_ne!(f1, v);
        assert_eq!(store.params_of(v).1, true);
    }
}
