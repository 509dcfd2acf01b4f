//! The back end's view of the resolved program's types.
//!
//! Reef is strongly nominally typed: two structurally identical types are
//! still distinct unless one is declared from the other. The front end hands
//! us every type with its derivation link intact, and the alias engine
//! leans on exactly that chain to decide which names may refer to the same
//! bytes. The interesting queries live at the bottom of this file:
//!
//!   1) [`TypeTable::base_type_for_aliasing`] collapses a type onto the
//!      canonical representative used as the unit of alias equivalence
//!   2) [`TypeTable::is_subtype_for_aliasing`] tells whether two types are
//!      already identified by that collapse
//!   3) [`TypeTable::has_universal_aliasing`] honors the front end's
//!      "may alias anything" escape hatch, including via ancestors

use colored::Colorize;
use strum::EnumIter;

use crate::{
    backend::layout::Bytes,
    index::{IndexVec, simple_index},
    intern::InternedSymbol,
};

simple_index! {
    /// Identifies a type in the back end's [`TypeTable`]
    pub struct TypeId;
}

simple_index! {
    /// Identifies a single field declaration. Field ids are unique across
    /// the whole program (not per record) so they can key per-field caches.
    pub struct FieldId;
}

simple_index! {
    /// Identifies a compilation unit
    pub struct UnitId;
}

/// How a type relates to the declaration it was introduced from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Derivation {
    /// A root declaration with no parent
    Root,
    /// A subtype: constrains the value set but shares its parent's
    /// representation and, for aliasing purposes, its identity
    Subtype,
    /// A derived type whose representation is identical to its parent's
    DerivedSameRepr,
    /// A derived type that changed representation (size or packing)
    DerivedNewRepr,
    /// A tagged extension of a tagged parent type
    Tagged,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter)]
pub enum ScalarKind {
    Integer,
    Float,
    Boolean,
    Character,
}

impl core::fmt::Display for ScalarKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScalarKind::Integer => write!(f, "integer"),
            ScalarKind::Float => write!(f, "float"),
            ScalarKind::Boolean => write!(f, "boolean"),
            ScalarKind::Character => write!(f, "character"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeKind {
    /// A type with no run-time representation at all
    Void,
    /// A named elementary type
    Scalar(ScalarKind),
    /// A pointer-like type designating another type
    Access {
        designated: TypeId,
        /// Access-to-subprogram values are never loaded as data, so the
        /// alias engine ignores puns involving them
        to_subprogram: bool,
    },
    /// A record; its field layout is reported by the layout engine, not
    /// stored here
    Record,
    Array {
        element: TypeId,
        /// Unconstrained arrays have no static bounds and therefore no
        /// native size
        unconstrained: bool,
    },
    /// Representation wrapper: the inner value padded out to enforce a
    /// coarser alignment or size
    Padded { inner: TypeId },
    /// Representation wrapper: the inner value truncated to a narrower
    /// in-memory width
    Truncated { inner: TypeId },
}

#[derive(Debug, Clone)]
pub struct TypeData {
    pub name: InternedSymbol,
    pub kind: TypeKind,
    /// Total storage size; `None` when the type has no native representation
    pub size: Option<Bytes>,
    /// Previous link of the derivation chain; `None` iff `derivation` is
    /// [`Derivation::Root`]
    pub parent: Option<TypeId>,
    pub derivation: Derivation,
    /// Compilation unit the type is declared in
    pub unit: UnitId,
    /// Front-end marker: accesses of this type may alias anything. Set when
    /// the front end could not prove a punning site safe.
    pub universal_alias: bool,
    /// Front-end marker: this type opted out of alias analysis entirely
    pub suppressed: bool,
}

#[derive(Debug)]
pub struct Unit {
    pub name: InternedSymbol,
}

#[derive(Debug, Default)]
pub struct TypeTable {
    types: IndexVec<TypeId, TypeData>,
    units: IndexVec<UnitId, Unit>,
}

impl TypeTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_unit(&mut self, name: &str) -> UnitId {
        self.units.push(Unit {
            name: InternedSymbol::new(name),
        })
    }

    fn add(&mut self, data: TypeData) -> TypeId {
        self.types.push(data)
    }

    pub fn void(&mut self, name: &str, unit: UnitId) -> TypeId {
        self.add(TypeData {
            name: InternedSymbol::new(name),
            kind: TypeKind::Void,
            size: None,
            parent: None,
            derivation: Derivation::Root,
            unit,
            universal_alias: false,
            suppressed: false,
        })
    }

    pub fn scalar(&mut self, name: &str, kind: ScalarKind, size: u64, unit: UnitId) -> TypeId {
        self.add(TypeData {
            name: InternedSymbol::new(name),
            kind: TypeKind::Scalar(kind),
            size: Some(Bytes(size)),
            parent: None,
            derivation: Derivation::Root,
            unit,
            universal_alias: false,
            suppressed: false,
        })
    }

    pub fn record(&mut self, name: &str, size: u64, unit: UnitId) -> TypeId {
        self.add(TypeData {
            name: InternedSymbol::new(name),
            kind: TypeKind::Record,
            size: Some(Bytes(size)),
            parent: None,
            derivation: Derivation::Root,
            unit,
            universal_alias: false,
            suppressed: false,
        })
    }

    pub fn array(&mut self, name: &str, element: TypeId, size: u64, unit: UnitId) -> TypeId {
        self.add(TypeData {
            name: InternedSymbol::new(name),
            kind: TypeKind::Array {
                element,
                unconstrained: false,
            },
            size: Some(Bytes(size)),
            parent: None,
            derivation: Derivation::Root,
            unit,
            universal_alias: false,
            suppressed: false,
        })
    }

    pub fn unconstrained_array(&mut self, name: &str, element: TypeId, unit: UnitId) -> TypeId {
        self.add(TypeData {
            name: InternedSymbol::new(name),
            kind: TypeKind::Array {
                element,
                unconstrained: true,
            },
            size: None,
            parent: None,
            derivation: Derivation::Root,
            unit,
            universal_alias: false,
            suppressed: false,
        })
    }

    pub fn access(&mut self, name: &str, designated: TypeId, unit: UnitId) -> TypeId {
        self.add(TypeData {
            name: InternedSymbol::new(name),
            kind: TypeKind::Access {
                designated,
                to_subprogram: false,
            },
            size: Some(Bytes(8)),
            parent: None,
            derivation: Derivation::Root,
            unit,
            universal_alias: false,
            suppressed: false,
        })
    }

    pub fn access_to_subprogram(&mut self, name: &str, designated: TypeId, unit: UnitId) -> TypeId {
        self.add(TypeData {
            name: InternedSymbol::new(name),
            kind: TypeKind::Access {
                designated,
                to_subprogram: true,
            },
            size: Some(Bytes(8)),
            parent: None,
            derivation: Derivation::Root,
            unit,
            universal_alias: false,
            suppressed: false,
        })
    }

    /// Declares a subtype. Subtypes share their parent's kind, size, and
    /// alias identity.
    pub fn subtype(&mut self, name: &str, parent: TypeId, unit: UnitId) -> TypeId {
        let parent_data = self[parent].clone();

        self.add(TypeData {
            name: InternedSymbol::new(name),
            kind: parent_data.kind,
            size: parent_data.size,
            parent: Some(parent),
            derivation: Derivation::Subtype,
            unit,
            universal_alias: false,
            suppressed: false,
        })
    }

    /// Declares a derived type with representation identical to its parent's
    pub fn derived(&mut self, name: &str, parent: TypeId, unit: UnitId) -> TypeId {
        let parent_data = self[parent].clone();

        self.add(TypeData {
            name: InternedSymbol::new(name),
            kind: parent_data.kind,
            size: parent_data.size,
            parent: Some(parent),
            derivation: Derivation::DerivedSameRepr,
            unit,
            universal_alias: false,
            suppressed: false,
        })
    }

    /// Declares a derived type whose representation differs from its parent's
    pub fn derived_new_repr(
        &mut self,
        name: &str,
        parent: TypeId,
        size: u64,
        unit: UnitId,
    ) -> TypeId {
        let kind = self[parent].kind;

        self.add(TypeData {
            name: InternedSymbol::new(name),
            kind,
            size: Some(Bytes(size)),
            parent: Some(parent),
            derivation: Derivation::DerivedNewRepr,
            unit,
            universal_alias: false,
            suppressed: false,
        })
    }

    /// Declares a tagged extension of a tagged record type
    pub fn tagged(&mut self, name: &str, parent: TypeId, size: u64, unit: UnitId) -> TypeId {
        self.add(TypeData {
            name: InternedSymbol::new(name),
            kind: TypeKind::Record,
            size: Some(Bytes(size)),
            parent: Some(parent),
            derivation: Derivation::Tagged,
            unit,
            universal_alias: false,
            suppressed: false,
        })
    }

    /// Wraps `inner` padded out to `size` bytes
    pub fn padded(&mut self, name: &str, inner: TypeId, size: u64, unit: UnitId) -> TypeId {
        self.add(TypeData {
            name: InternedSymbol::new(name),
            kind: TypeKind::Padded { inner },
            size: Some(Bytes(size)),
            parent: None,
            derivation: Derivation::Root,
            unit,
            universal_alias: false,
            suppressed: false,
        })
    }

    /// Wraps `inner` truncated to a narrower `size`-byte in-memory width
    pub fn truncated(&mut self, name: &str, inner: TypeId, size: u64, unit: UnitId) -> TypeId {
        self.add(TypeData {
            name: InternedSymbol::new(name),
            kind: TypeKind::Truncated { inner },
            size: Some(Bytes(size)),
            parent: None,
            derivation: Derivation::Root,
            unit,
            universal_alias: false,
            suppressed: false,
        })
    }

    pub fn mark_universal_alias(&mut self, ty: TypeId) {
        self.types[ty].universal_alias = true;
    }

    pub fn suppress(&mut self, ty: TypeId) {
        self.types[ty].suppressed = true;
    }

    pub fn name(&self, ty: TypeId) -> &'static str {
        self[ty].name.value()
    }

    pub fn unit_name(&self, unit: UnitId) -> &'static str {
        self.units[unit].name.value()
    }

    pub fn size(&self, ty: TypeId) -> Option<Bytes> {
        self[ty].size
    }

    pub fn is_aggregate(&self, ty: TypeId) -> bool {
        match self[ty].kind {
            TypeKind::Record | TypeKind::Array { .. } => true,
            TypeKind::Padded { inner } | TypeKind::Truncated { inner } => self.is_aggregate(inner),
            TypeKind::Void | TypeKind::Scalar(_) | TypeKind::Access { .. } => false,
        }
    }

    pub fn is_access(&self, ty: TypeId) -> bool {
        matches!(self[ty].kind, TypeKind::Access { .. })
    }

    pub fn is_unconstrained_array(&self, ty: TypeId) -> bool {
        matches!(
            self[ty].kind,
            TypeKind::Array {
                unconstrained: true,
                ..
            }
        )
    }

    /// The designated type of a pointer-like type, when the designee is a
    /// data type (access-to-subprogram values are never loaded as data)
    pub fn designated_data(&self, ty: TypeId) -> Option<TypeId> {
        match self[ty].kind {
            TypeKind::Access {
                designated,
                to_subprogram: false,
            } => Some(designated),
            _ => None,
        }
    }

    /// One collapse step of the canonicalizer; `None` when `ty` is already
    /// its own canonical base
    fn canonical_step(&self, ty: TypeId) -> Option<TypeId> {
        let data = &self[ty];
        let parent = data.parent?;

        match data.derivation {
            Derivation::Subtype => Some(parent),
            Derivation::DerivedSameRepr if self.is_aggregate(ty) => Some(parent),
            Derivation::Tagged => Some(parent),
            Derivation::Root | Derivation::DerivedSameRepr | Derivation::DerivedNewRepr => None,
        }
    }

    /// The canonical representative of `ty` used as the unit of alias
    /// equivalence: subtypes collapse onto their full base, and base
    /// aggregate types that are same-representation derivations or tagged
    /// extensions collapse onto their parent. Iterated to a fixed point, so
    /// the result is idempotent.
    pub fn base_type_for_aliasing(&self, mut ty: TypeId) -> TypeId {
        while let Some(parent) = self.canonical_step(ty) {
            ty = parent;
        }

        ty
    }

    /// Whether `ty` is its own canonical base
    pub fn is_base_type(&self, ty: TypeId) -> bool {
        self.canonical_step(ty).is_none()
    }

    /// Whether `ty` is reachable from `of` by repeated application of the
    /// canonicalizer (every type is a subtype of itself)
    pub fn is_subtype_for_aliasing(&self, ty: TypeId, of: TypeId) -> bool {
        let mut current = of;

        loop {
            if current == ty {
                return true;
            }

            match self.canonical_step(current) {
                Some(parent) => current = parent,
                None => return false,
            }
        }
    }

    /// Whether `ty`, or any ancestor reachable via the canonicalizer, was
    /// explicitly marked "may alias anything" by the front end
    pub fn has_universal_aliasing(&self, ty: TypeId) -> bool {
        let mut current = ty;

        loop {
            if self[current].universal_alias {
                return true;
            }

            match self.canonical_step(current) {
                Some(parent) => current = parent,
                None => return false,
            }
        }
    }

    /// Formats a type name for diagnostics
    pub fn display(&self, ty: TypeId) -> colored::ColoredString {
        self.name(ty).yellow()
    }
}

impl core::ops::Index<TypeId> for TypeTable {
    type Output = TypeData;

    fn index(&self, index: TypeId) -> &Self::Output {
        &self.types[index]
    }
}
