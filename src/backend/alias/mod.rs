//! Type-based alias metadata engine.
//!
//! For every memory access the lowering engine emits, this module decides
//! what the downstream optimizer may assume about which other accesses could
//! touch the same bytes. The scheme is rooted entirely in declared type
//! identity plus the explicit type-puns observed in the program; it performs
//! no general pointer or escape analysis. Producing an unsound tag silently
//! miscompiles the program downstream, so every failure path here degrades
//! to "no tag" (see [`NoTag`]), which only reduces optimization opportunity.
//!
//! The engine runs in three stages:
//!
//!   1) at construction, [`punning`] scans the whole program's type-pun
//!      sites once and populates the punning-group table
//!   2) whenever the lowering engine performs a memory access,
//!      [`AliasAnalysis::annotate`] resolves the access's tag (from a
//!      tracked provenance or, failing that, from the static type) via the
//!      memoized builders in [`tags`]
//!   3) the tag tree is narrowed to the most specific node covering the
//!      accessed byte range and attached to the instruction
//!
//! All state lives on the [`AliasAnalysis`] session context owned by the
//! compilation pass. The engine is single-threaded; the write-once memo
//! caches rely on that.

pub mod emit;
pub mod punning;
pub mod tags;

use hashbrown::HashMap;

use self::{
    punning::{PunGroupTable, PunSite, PunWarning},
    tags::{Tag, TagData, TagId, TagKind},
};
use crate::{
    backend::layout::{Bytes, LayoutTable},
    index::IndexVec,
    intern::InternedSymbol,
    middle::{
        lir,
        ty::{FieldId, TypeId, TypeTable, UnitId},
    },
};

/// Per-compilation configuration of the alias engine
#[derive(Debug, Clone, Copy)]
pub struct AliasConfig {
    /// Master switch; off when compiling without aggressive type-based
    /// optimization
    pub enabled: bool,
    /// Whether code generation is enabled (gates the cross-unit pun warning)
    pub codegen_enabled: bool,
    /// The compilation unit currently being compiled
    pub main_unit: UnitId,
}

/// Why no tag was produced for a type. Every variant degrades silently to
/// "may alias everything", which is always conservative.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoTag {
    /// The engine is globally disabled for this compilation
    Disabled,
    /// The type has no native representation (void, or dynamically sized)
    NoRepresentation,
    /// The type (or an ancestor) explicitly opted into universal aliasing
    UniversalAliasing,
    /// The type belongs to a punning group whose members are structurally
    /// incompatible
    InvalidPunGroup,
    /// An aggregate with no addressable sub-object; there is nothing to
    /// type-pun into
    EmptyAggregate,
    /// A shape this engine does not model structurally
    UnsupportedShape,
}

/// The (Native, For-aliased) pair memoized once per type
#[derive(Debug, Clone, Copy)]
pub(crate) struct TagPair {
    pub native: TagId,
    pub for_aliased: TagId,
}

/// Provenance attached to a reference-typed value when it is created, and
/// propagated unchanged by operations that reinterpret a pointer without
/// changing its target address
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessDescriptor {
    /// Suppresses annotation entirely
    AliasesAll,
    /// Provenance tracked by the lowering engine: a previously computed base
    /// tag plus the byte offset of this reference within it
    Tracked { tag: TagId, offset: Bytes },
    /// No tracked provenance; the annotator falls back to the access's
    /// static type
    Untracked,
}

/// The alias-analysis annotation attached to a memory instruction. The
/// offset is deliberately the original (pre-narrowing) one: consuming
/// analyses use it to test for overlap between two annotated accesses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AliasAnnotation {
    pub base: TagId,
    pub access: TagId,
    pub offset: Bytes,
    pub size: Bytes,
}

/// Session context owning the tag arena, both memo caches, the
/// punning-group table, and the collected warnings. One per compilation
/// pass; never a process-wide static, so parallel multi-module compilations
/// stay independent.
pub struct AliasAnalysis<'ctx> {
    pub(crate) types: &'ctx TypeTable,
    pub(crate) layouts: &'ctx LayoutTable,
    pub(crate) config: AliasConfig,
    /// Arena of every tag node minted this session; index 0 is the root
    pub(crate) tags: IndexVec<TagId, Tag>,
    pub(crate) root: TagId,
    pub(crate) type_cache: HashMap<TypeId, TagPair>,
    pub(crate) field_cache: HashMap<FieldId, TagId>,
    pub(crate) pun_groups: PunGroupTable,
    warnings: Vec<PunWarning>,
    pub(crate) unique_counter: u32,
}

impl<'ctx> AliasAnalysis<'ctx> {
    /// Builds the session context, running the one-shot punning scan before
    /// any tag can be requested. The scan may mark types with universal
    /// aliasing, which is why the type table comes in mutably.
    pub fn new(
        types: &'ctx mut TypeTable,
        layouts: &'ctx LayoutTable,
        pun_sites: &[PunSite],
        config: AliasConfig,
    ) -> Self {
        let mut pun_groups = PunGroupTable::new();
        let mut warnings = Vec::new();

        if config.enabled {
            pun_groups.scan(types, pun_sites, &config, &mut warnings);
        }

        let types: &'ctx TypeTable = types;

        let mut tags = IndexVec::new();
        let root = tags.push(Tag {
            name: InternedSymbol::new("reef-alias-root"),
            parent: None,
            data: TagData::Root,
        });

        Self {
            types,
            layouts,
            config,
            tags,
            root,
            type_cache: HashMap::new(),
            field_cache: HashMap::new(),
            pun_groups,
            warnings,
            unique_counter: 0,
        }
    }

    /// The root of the whole tag hierarchy; never attached to an access
    pub fn root(&self) -> TagId {
        self.root
    }

    pub fn tag(&self, id: TagId) -> &Tag {
        &self.tags[id]
    }

    pub fn warnings(&self) -> &[PunWarning] {
        &self.warnings
    }

    /// Prints every collected cross-unit pun warning to stderr
    pub fn report_warnings(&self) {
        for warning in &self.warnings {
            warning.report(self.types);
        }
    }

    /// Resolves and attaches alias metadata to a memory instruction. Called
    /// by the lowering engine once per emitted access; does nothing for
    /// non-memory instructions, zero-sized accesses, suppressed descriptors,
    /// and types no tag could be built for (the instruction then remains
    /// analyzable only through ordinary def/use reasoning downstream).
    pub fn annotate(&mut self, instruction: &mut lir::Instruction, descriptor: AccessDescriptor) {
        let (ty, slot) = match instruction {
            lir::Instruction::Load { ty, annotation, .. }
            | lir::Instruction::Store { ty, annotation, .. } => (*ty, annotation),
            _ => return,
        };

        let (base, offset) = match descriptor {
            AccessDescriptor::AliasesAll => return,
            AccessDescriptor::Tracked { tag, offset } => (tag, offset),
            AccessDescriptor::Untracked => match self.get_tag(ty, TagKind::Native) {
                Ok(tag) => (tag, Bytes(0)),
                Err(_) => return,
            },
        };

        let Some(size) = self.types.size(ty) else {
            return;
        };
        if size.0 == 0 {
            return;
        }

        let (access, _) = self.narrow(base, offset, size);

        *slot = Some(AliasAnnotation {
            base,
            access,
            offset,
            size,
        });
    }
}
