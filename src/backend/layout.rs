//! Query surface of the aggregate layout engine.
//!
//! The layout engine itself (offset computation, bit packing, alignment) is
//! a separate part of the back end; the alias engine only ever *reads* the
//! ordered field records registered here.

use hashbrown::HashMap;

use crate::{
    index::Index,
    intern::InternedSymbol,
    middle::ty::{FieldId, TypeId},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Bytes(pub u64);

impl Bytes {
    pub fn bytes(self) -> u64 {
        self.0
    }

    pub fn bits(self) -> u64 {
        self.bytes() * 8
    }
}

impl core::fmt::Display for Bytes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One field of an aggregate type, as reported by the layout engine
#[derive(Debug, Clone)]
pub struct FieldInfo {
    pub id: FieldId,
    pub name: InternedSymbol,
    pub offset: Bytes,
    pub size: Bytes,
    pub ty: TypeId,
    /// Whether the front end saw this field's address escape through an
    /// access value, forcing accesses of it to admit aliasing through any
    /// access value of its type
    pub is_aliased: bool,
}

/// Ordered field records per aggregate type. Offsets within one aggregate
/// are non-decreasing and the fields exhaustively cover the aggregate's
/// storage.
#[derive(Debug, Default)]
pub struct LayoutTable {
    fields: HashMap<TypeId, Vec<FieldInfo>>,
    next_field: u32,
}

impl LayoutTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a field to `owner`'s layout, returning its program-wide id
    pub fn add_field(
        &mut self,
        owner: TypeId,
        name: &str,
        offset: u64,
        size: u64,
        ty: TypeId,
        is_aliased: bool,
    ) -> FieldId {
        let id = FieldId::new(self.next_field as usize);
        self.next_field += 1;

        let fields = self.fields.entry(owner).or_default();

        debug_assert!(
            fields.last().is_none_or(|last| last.offset.0 <= offset),
            "layout engine reported fields out of offset order"
        );

        fields.push(FieldInfo {
            id,
            name: InternedSymbol::new(name),
            offset: Bytes(offset),
            size: Bytes(size),
            ty,
            is_aliased,
        });

        id
    }

    /// Registers an aggregate with no addressable sub-objects
    pub fn define_empty(&mut self, owner: TypeId) {
        self.fields.entry(owner).or_default();
    }

    pub fn fields(&self, ty: TypeId) -> Option<&[FieldInfo]> {
        self.fields.get(&ty).map(Vec::as_slice)
    }
}
