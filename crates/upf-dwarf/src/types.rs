//! The type model and the process-wide type catalogue.

use bitflags::bitflags;
use rustc_hash::FxHashMap;

bitflags! {
    /// C type qualifiers.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct Modifiers: u8 {
        const CONST = 1 << 0;
        const VOLATILE = 1 << 1;
        const RESTRICT = 1 << 2;
        const ATOMIC = 1 << 3;
    }
}

/// Index into the [`TypeCatalogue`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TypeId(u32);

impl TypeId {
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// A struct or union member.
#[derive(Clone, Debug)]
pub struct Member {
    pub name: String,
    pub type_id: TypeId,
    /// Byte offset from the start of the record, or bit offset when
    /// `bit_size` is non-zero.
    pub offset: u64,
    /// 0 for ordinary members; the field width in bits for bit-fields.
    pub bit_size: u32,
}

/// One enumerator constant.
#[derive(Clone, Debug)]
pub struct Enumerator {
    pub name: String,
    pub value: i64,
}

/// Struct/union payload.
#[derive(Clone, Debug, Default)]
pub struct StructType {
    pub members: Vec<Member>,
}

/// Enum payload.
#[derive(Clone, Debug)]
pub struct EnumType {
    pub underlying: TypeId,
    pub enumerators: Vec<Enumerator>,
}

/// Array payload. An empty `lengths` list means the array size is not a
/// compile-time constant.
#[derive(Clone, Debug)]
pub struct ArrayType {
    pub element: TypeId,
    pub lengths: Vec<u64>,
}

/// Function payload: `None` return type means `void`.
#[derive(Clone, Debug, Default)]
pub struct FunctionType {
    pub return_type: Option<TypeId>,
    pub params: Vec<TypeId>,
}

/// The kind-specific part of a type.
#[derive(Clone, Debug)]
pub enum TypeKind {
    Struct(StructType),
    Union(StructType),
    Enum(EnumType),
    Array(ArrayType),
    /// `None` pointee means `void*`.
    Pointer(Option<TypeId>),
    Function(FunctionType),
    U1,
    U2,
    U4,
    U8,
    S1,
    S2,
    S4,
    S8,
    F4,
    F8,
    Bool,
    Schar,
    Uchar,
    Void,
    Unknown,
}

/// A parsed C type.
#[derive(Clone, Debug)]
pub struct Type {
    pub name: Option<String>,
    pub kind: TypeKind,
    pub modifiers: Modifiers,
    /// Size in bytes; `None` when not known statically.
    pub size: Option<u64>,
}

impl Type {
    #[must_use]
    pub const fn new(name: Option<String>, kind: TypeKind, size: Option<u64>) -> Self {
        Self {
            name,
            kind,
            modifiers: Modifiers::empty(),
            size,
        }
    }

    /// Placeholder for types the engine cannot represent.
    #[must_use]
    pub const fn unknown(name: Option<String>) -> Self {
        Self::new(name, TypeKind::Unknown, None)
    }

    #[must_use]
    pub const fn is_pointer(&self) -> bool {
        matches!(self.kind, TypeKind::Pointer(_))
    }
}

/// Pointer width of the only supported target.
pub const POINTER_SIZE: u64 = 8;

/// Append-only, de-duplicated sequence of parsed types.
///
/// Entries are keyed by the absolute offset of the DIE they were parsed
/// from; parsing the same DIE again returns the existing index. Synthetic
/// entries (pointer wraps, array strips) have no DIE key.
#[derive(Debug, Default)]
pub struct TypeCatalogue {
    types: Vec<Type>,
    by_die: FxHashMap<usize, TypeId>,
}

impl TypeCatalogue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.types.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    #[must_use]
    pub fn get(&self, id: TypeId) -> &Type {
        &self.types[id.index()]
    }

    /// The memoised index for `die`, if it was parsed before.
    #[must_use]
    pub fn lookup_die(&self, die: usize) -> Option<TypeId> {
        self.by_die.get(&die).copied()
    }

    /// Append `ty`, memoising it under `die`. If the DIE is already present
    /// (possible for self-referential records parsed re-entrantly) the first
    /// entry keeps the key.
    pub fn insert(&mut self, die: usize, ty: Type) -> TypeId {
        let id = self.push(ty);
        self.by_die.entry(die).or_insert(id);
        id
    }

    /// Append a type with no backing DIE.
    pub fn insert_synthetic(&mut self, ty: Type) -> TypeId {
        self.push(ty)
    }

    pub(crate) fn get_mut(&mut self, id: TypeId) -> &mut Type {
        &mut self.types[id.index()]
    }

    fn push(&mut self, ty: Type) -> TypeId {
        let id = TypeId(u32::try_from(self.types.len()).expect("type catalogue overflow"));
        self.types.push(ty);
        id
    }

    /// A synthetic pointer to `pointee`.
    pub fn pointer_to(&mut self, pointee: TypeId) -> TypeId {
        self.insert_synthetic(Type::new(
            None,
            TypeKind::Pointer(Some(pointee)),
            Some(POINTER_SIZE),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_memoises_by_die() {
        let mut catalogue = TypeCatalogue::new();
        let id = catalogue.insert(100, Type::new(Some("int".into()), TypeKind::S4, Some(4)));
        assert_eq!(catalogue.lookup_die(100), Some(id));
        assert_eq!(catalogue.lookup_die(101), None);
    }

    #[test]
    fn test_first_entry_keeps_die_key() {
        let mut catalogue = TypeCatalogue::new();
        let first = catalogue.insert(100, Type::unknown(None));
        let second = catalogue.insert(100, Type::unknown(None));
        assert_ne!(first, second);
        assert_eq!(catalogue.lookup_die(100), Some(first));
    }

    #[test]
    fn test_synthetic_entries_have_no_key() {
        let mut catalogue = TypeCatalogue::new();
        let element = catalogue.insert(1, Type::new(Some("int".into()), TypeKind::S4, Some(4)));
        let pointer = catalogue.pointer_to(element);
        assert!(matches!(
            catalogue.get(pointer).kind,
            TypeKind::Pointer(Some(id)) if id == element
        ));
        assert_eq!(catalogue.get(pointer).size, Some(POINTER_SIZE));
    }
}
