//! Construction and narrowing of alias tags.
//!
//! A tag is an immutable tree node asserting "accesses through this name may
//! alias only accesses through this name or its ancestors". Scalar types get
//! a sized leaf; aggregates get an ordered-field struct node mirroring the
//! layout engine's report. Every type is given at most four tags, all
//! derived from the same structural description:
//!
//!   1) `Native` for an ordinary access of the full type
//!   2) `ForAliased`, a child of `Native`, for accesses known to go through
//!      an access value of the type
//!   3) `Unique`, minted fresh on every request, for objects provably
//!      disjoint from every other access of the type
//!   4) `UniqueAliased`, combining both properties
//!
//! `Native` and `ForAliased` are memoized once per type; `Unique` and
//! `UniqueAliased` are never cached, since each request must be
//! distinguishable from every other.

use strum::EnumIter;

use super::{AliasAnalysis, NoTag, TagPair};
use crate::{
    backend::layout::{Bytes, FieldInfo},
    index::simple_index,
    intern::InternedSymbol,
    middle::ty::{TypeId, TypeKind},
};

simple_index! {
    /// Identifies a tag node in the session's arena
    pub struct TagId;
}

/// Which of a type's four tags is being requested
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter)]
pub enum TagKind {
    Native,
    ForAliased,
    Unique,
    UniqueAliased,
}

#[derive(Debug, Clone)]
pub struct Tag {
    pub name: InternedSymbol,
    /// The coarser name this tag may alias under; `None` only for the
    /// analysis root
    pub parent: Option<TagId>,
    pub data: TagData,
}

#[derive(Debug, Clone)]
pub enum TagData {
    /// The root of the hierarchy; never attached to an access
    Root,
    /// A named, sized leaf
    Scalar { size: Bytes },
    /// An ordered sequence of fields with non-decreasing offsets
    Struct { size: Bytes, fields: Vec<TagField> },
}

#[derive(Debug, Clone, Copy)]
pub struct TagField {
    pub offset: Bytes,
    pub size: Bytes,
    pub tag: TagId,
}

impl Tag {
    pub fn size(&self) -> Bytes {
        match &self.data {
            TagData::Root => Bytes(0),
            TagData::Scalar { size } | TagData::Struct { size, .. } => *size,
        }
    }

    pub fn is_struct(&self) -> bool {
        matches!(self.data, TagData::Struct { .. })
    }
}

impl<'ctx> AliasAnalysis<'ctx> {
    /// Resolves the `kind` tag for `ty`, building and memoizing the
    /// (Native, For-aliased) pair on first need
    pub fn get_tag(&mut self, ty: TypeId, kind: TagKind) -> Result<TagId, NoTag> {
        if !self.config.enabled {
            return Err(NoTag::Disabled);
        }
        if self.types.size(ty).is_none() {
            return Err(NoTag::NoRepresentation);
        }
        if self.types.has_universal_aliasing(ty) {
            return Err(NoTag::UniversalAliasing);
        }

        // A type that was punned must end up with tags identical to its
        // whole group's, so before building anything of our own, adopt a
        // pair some other member already built. An invalid group suppresses
        // tags for every member unconditionally.
        if let Some(group) = self.pun_groups.group_of(ty) {
            if !self.pun_groups.group(group).valid {
                return Err(NoTag::InvalidPunGroup);
            }

            if !self.type_cache.contains_key(&ty) {
                let adopted = self
                    .pun_groups
                    .group(group)
                    .members
                    .iter()
                    .find_map(|member| self.type_cache.get(member).copied());

                if let Some(pair) = adopted {
                    self.type_cache.insert(ty, pair);
                }
            }
        }

        let pair = match self.type_cache.get(&ty).copied() {
            Some(pair) => pair,
            None => {
                let pair = self.build_pair(ty)?;
                self.type_cache.insert(ty, pair);
                pair
            }
        };

        Ok(self.select(pair, ty, kind))
    }

    fn select(&mut self, pair: TagPair, ty: TypeId, kind: TagKind) -> TagId {
        match kind {
            TagKind::Native => pair.native,
            TagKind::ForAliased => pair.for_aliased,
            TagKind::Unique => self.mint_unique(ty, pair.native),
            TagKind::UniqueAliased => self.mint_unique(ty, pair.for_aliased),
        }
    }

    /// Builds a fresh, never-cached node with the same shape as `parent`.
    /// Two mints for the same type are distinct on purpose.
    fn mint_unique(&mut self, ty: TypeId, parent: TagId) -> TagId {
        let serial = self.unique_counter;
        self.unique_counter += 1;

        let name = InternedSymbol::new(&format!("{}#u{}", self.types.name(ty), serial));
        let data = self.tags[parent].data.clone();

        self.tags.push(Tag {
            name,
            parent: Some(parent),
            data,
        })
    }

    /// Builds the memoized (Native, For-aliased) pair for a type that has
    /// neither a cached pair nor a punned sibling with one
    fn build_pair(&mut self, ty: TypeId) -> Result<TagPair, NoTag> {
        // A truncation wrapper around a primitive inherits the inner
        // representation's tags as-is.
        if let TypeKind::Truncated { inner } = self.types[ty].kind {
            self.get_tag(inner, TagKind::Native)?;
            return Ok(self.type_cache[&inner]);
        }

        let base = self.types.base_type_for_aliasing(ty);
        let parent = if base == ty {
            self.root
        } else {
            self.get_tag(base, TagKind::Native)?
        };

        let Some(size) = self.types.size(ty) else {
            return Err(NoTag::NoRepresentation);
        };

        let data = match self.types[ty].kind {
            TypeKind::Void => return Err(NoTag::NoRepresentation),
            TypeKind::Scalar(_) | TypeKind::Access { .. } => TagData::Scalar { size },
            TypeKind::Record | TypeKind::Array { .. } => {
                let layouts = self.layouts;
                let Some(fields) = layouts.fields(ty) else {
                    return Err(NoTag::UnsupportedShape);
                };
                if fields.is_empty() {
                    // No addressable sub-object, hence nothing to pun into.
                    return Err(NoTag::EmptyAggregate);
                }

                let mut tag_fields = Vec::with_capacity(fields.len());
                for field in fields {
                    let tag = self.get_field_tag(field)?;
                    tag_fields.push(TagField {
                        offset: field.offset,
                        size: field.size,
                        tag,
                    });
                }

                TagData::Struct {
                    size,
                    fields: tag_fields,
                }
            }
            TypeKind::Padded { inner } => {
                // The sole field covers the payload only, so optimizers
                // looking at the value never see the padding bytes as part
                // of the access.
                let inner_tag = self.get_tag(inner, TagKind::Native)?;
                let Some(inner_size) = self.types.size(inner) else {
                    return Err(NoTag::NoRepresentation);
                };

                TagData::Struct {
                    size,
                    fields: vec![TagField {
                        offset: Bytes(0),
                        size: inner_size,
                        tag: inner_tag,
                    }],
                }
            }
            TypeKind::Truncated { .. } => unreachable!("handled above"),
        };

        let name = self.types[ty].name;
        let native = self.tags.push(Tag {
            name,
            parent: Some(parent),
            data: data.clone(),
        });

        let for_aliased = self.tags.push(Tag {
            name: InternedSymbol::new(&format!("{}#a", name.value())),
            parent: Some(native),
            data,
        });

        Ok(TagPair {
            native,
            for_aliased,
        })
    }

    /// Resolves the tag standing in for one aggregate field, keyed by the
    /// field's program-wide identity rather than its type: two fields of the
    /// same type get distinct leaves (sharing the type's tag as parent), so
    /// accesses of one never clobber analysis of the other
    fn get_field_tag(&mut self, field: &FieldInfo) -> Result<TagId, NoTag> {
        if let Some(tag) = self.field_cache.get(&field.id) {
            return Ok(*tag);
        }

        let kind = if field.is_aliased {
            TagKind::ForAliased
        } else {
            TagKind::Native
        };
        let child = self.get_tag(field.ty, kind)?;

        let tag = if self.types.is_aggregate(field.ty) {
            // Aggregate fields reuse the type's struct node directly so
            // narrowing can keep descending.
            child
        } else {
            self.tags.push(Tag {
                name: field.name,
                parent: Some(child),
                data: TagData::Scalar { size: field.size },
            })
        };

        self.field_cache.insert(field.id, tag);
        Ok(tag)
    }

    /// Walks down a struct tag to the most specific node covering
    /// `access_size` bytes at `offset`, returning it with the offset reduced
    /// to be relative to that node.
    ///
    /// Preconditions: a non-zero offset requires a struct node, and a leaf
    /// can only be narrowed by its exact size. Given those, the walk cannot
    /// fail: a struct's fields exhaustively cover its storage and the last
    /// field is always a valid fallback.
    pub fn narrow(&self, tag: TagId, offset: Bytes, access_size: Bytes) -> (TagId, Bytes) {
        let node = &self.tags[tag];

        debug_assert!(offset.0 == 0 || node.is_struct());
        debug_assert!(node.is_struct() || access_size == node.size());

        if node.size() == access_size {
            return (tag, offset);
        }

        let TagData::Struct { fields, .. } = &node.data else {
            return (tag, offset);
        };

        // The field containing `offset` is the first one whose successor
        // starts past it.
        let mut index = fields.len() - 1;
        for i in 0..fields.len() {
            if i + 1 == fields.len() || fields[i + 1].offset > offset {
                index = i;
                break;
            }
        }

        let field = &fields[index];
        self.narrow(field.tag, Bytes(offset.0 - field.offset.0), access_size)
    }
}

#[cfg(test)]
mod tests {
    use strum::IntoEnumIterator;

    use super::*;
    use crate::{
        backend::{
            alias::{AliasConfig, punning::PunSite},
            layout::LayoutTable,
        },
        middle::ty::{ScalarKind, TypeTable, UnitId},
    };

    struct Fixture {
        types: TypeTable,
        layouts: LayoutTable,
        puns: Vec<PunSite>,
        config: AliasConfig,
    }

    impl Fixture {
        fn new() -> Self {
            let mut types = TypeTable::new();
            let main_unit = types.add_unit("main");

            Self {
                types,
                layouts: LayoutTable::new(),
                puns: Vec::new(),
                config: AliasConfig {
                    enabled: true,
                    codegen_enabled: true,
                    main_unit,
                },
            }
        }

        fn unit(&self) -> UnitId {
            self.config.main_unit
        }

        fn pun(&mut self, source: TypeId, target: TypeId) {
            let unit = self.unit();
            let source = self.types.access("source_ptr", source, unit);
            let target = self.types.access("target_ptr", target, unit);
            self.puns.push(PunSite {
                source,
                target,
                unit,
                in_body: false,
            });
        }

        fn analysis(&mut self) -> AliasAnalysis<'_> {
            AliasAnalysis::new(&mut self.types, &self.layouts, &self.puns, self.config)
        }
    }

    #[test]
    fn native_tags_are_cached_and_stable() {
        let mut fixture = Fixture::new();
        let unit = fixture.unit();
        let money = fixture
            .types
            .scalar("money", ScalarKind::Integer, 8, unit);

        let mut analysis = fixture.analysis();
        let first = analysis.get_tag(money, TagKind::Native).unwrap();
        let second = analysis.get_tag(money, TagKind::Native).unwrap();

        assert_eq!(first, second);
    }

    #[test]
    fn unique_tags_are_never_cached() {
        let mut fixture = Fixture::new();
        let unit = fixture.unit();
        let money = fixture
            .types
            .scalar("money", ScalarKind::Integer, 8, unit);

        let mut analysis = fixture.analysis();
        let native = analysis.get_tag(money, TagKind::Native).unwrap();
        let first = analysis.get_tag(money, TagKind::Unique).unwrap();
        let second = analysis.get_tag(money, TagKind::Unique).unwrap();

        assert_ne!(first, second);
        assert_eq!(analysis.tag(first).parent, Some(native));
        assert_eq!(analysis.tag(second).parent, Some(native));
    }

    #[test]
    fn for_aliased_is_a_child_of_native() {
        let mut fixture = Fixture::new();
        let unit = fixture.unit();
        let money = fixture
            .types
            .scalar("money", ScalarKind::Integer, 8, unit);

        let mut analysis = fixture.analysis();
        let native = analysis.get_tag(money, TagKind::Native).unwrap();
        let for_aliased = analysis.get_tag(money, TagKind::ForAliased).unwrap();
        let unique_aliased = analysis.get_tag(money, TagKind::UniqueAliased).unwrap();

        assert_eq!(analysis.tag(for_aliased).parent, Some(native));
        assert_eq!(analysis.tag(unique_aliased).parent, Some(for_aliased));
        assert_eq!(analysis.tag(native).parent, Some(analysis.root()));
    }

    #[test]
    fn subtypes_resolve_to_their_base_tag_chain() {
        let mut fixture = Fixture::new();
        let unit = fixture.unit();
        let meters = fixture
            .types
            .scalar("meters", ScalarKind::Integer, 8, unit);
        let distance = fixture.types.subtype("distance", meters, unit);

        let mut analysis = fixture.analysis();
        let meters_tag = analysis.get_tag(meters, TagKind::Native).unwrap();
        let distance_tag = analysis.get_tag(distance, TagKind::Native).unwrap();

        // A subtype collapses to its base before a node is ever built.
        assert_ne!(meters_tag, distance_tag);
        assert_eq!(analysis.tag(distance_tag).parent, Some(meters_tag));
    }

    #[test]
    fn punned_types_share_the_identical_native_node() {
        let mut fixture = Fixture::new();
        let unit = fixture.unit();
        let money = fixture
            .types
            .scalar("money", ScalarKind::Integer, 8, unit);
        let ticks = fixture
            .types
            .scalar("ticks", ScalarKind::Integer, 8, unit);
        fixture.pun(money, ticks);

        let mut analysis = fixture.analysis();
        let money_tag = analysis.get_tag(money, TagKind::Native).unwrap();
        let ticks_tag = analysis.get_tag(ticks, TagKind::Native).unwrap();

        assert_eq!(money_tag, ticks_tag);
        assert_eq!(
            analysis.get_tag(money, TagKind::ForAliased).unwrap(),
            analysis.get_tag(ticks, TagKind::ForAliased).unwrap()
        );
    }

    #[test]
    fn invalid_groups_suppress_every_kind_for_every_member() {
        let mut fixture = Fixture::new();
        let unit = fixture.unit();
        let float32 = fixture
            .types
            .scalar("float32", ScalarKind::Float, 4, unit);
        let coords = fixture.types.array("coords", float32, 8, unit);
        let money = fixture
            .types
            .scalar("money", ScalarKind::Integer, 8, unit);
        fixture
            .layouts
            .add_field(coords, "coords[]", 0, 8, float32, false);
        fixture.pun(coords, money);

        let mut analysis = fixture.analysis();

        for ty in [coords, money] {
            for kind in TagKind::iter() {
                assert_eq!(analysis.get_tag(ty, kind), Err(NoTag::InvalidPunGroup));
            }
        }
    }

    #[test]
    fn record_narrowing_reaches_the_field_leaf() {
        let mut fixture = Fixture::new();
        let unit = fixture.unit();
        let float32 = fixture
            .types
            .scalar("float32", ScalarKind::Float, 4, unit);
        let point = fixture.types.record("point", 8, unit);
        fixture
            .layouts
            .add_field(point, "point.x", 0, 4, float32, false);
        fixture
            .layouts
            .add_field(point, "point.y", 4, 4, float32, false);

        let mut analysis = fixture.analysis();
        let point_tag = analysis.get_tag(point, TagKind::Native).unwrap();

        let TagData::Struct { fields, .. } = &analysis.tag(point_tag).data else {
            panic!("expected a struct node for a record");
        };
        let y_leaf = fields[1].tag;

        let (tag, offset) = analysis.narrow(point_tag, Bytes(4), Bytes(4));
        assert_eq!(tag, y_leaf);
        assert_eq!(offset, Bytes(0));
    }

    #[test]
    fn narrowing_the_whole_node_returns_it_unchanged() {
        let mut fixture = Fixture::new();
        let unit = fixture.unit();
        let float32 = fixture
            .types
            .scalar("float32", ScalarKind::Float, 4, unit);
        let point = fixture.types.record("point", 8, unit);
        fixture
            .layouts
            .add_field(point, "point.x", 0, 4, float32, false);
        fixture
            .layouts
            .add_field(point, "point.y", 4, 4, float32, false);

        let mut analysis = fixture.analysis();
        let point_tag = analysis.get_tag(point, TagKind::Native).unwrap();

        assert_eq!(
            analysis.narrow(point_tag, Bytes(0), Bytes(8)),
            (point_tag, Bytes(0))
        );
    }

    #[test]
    fn narrowing_descends_nested_records() {
        let mut fixture = Fixture::new();
        let unit = fixture.unit();
        let float32 = fixture
            .types
            .scalar("float32", ScalarKind::Float, 4, unit);
        let point = fixture.types.record("point", 8, unit);
        let segment = fixture.types.record("segment", 16, unit);
        fixture
            .layouts
            .add_field(point, "point.x", 0, 4, float32, false);
        fixture
            .layouts
            .add_field(point, "point.y", 4, 4, float32, false);
        fixture
            .layouts
            .add_field(segment, "segment.from", 0, 8, point, false);
        fixture
            .layouts
            .add_field(segment, "segment.to", 8, 8, point, false);

        let mut analysis = fixture.analysis();
        let segment_tag = analysis.get_tag(segment, TagKind::Native).unwrap();
        let point_tag = analysis.get_tag(point, TagKind::Native).unwrap();

        // segment.to.y sits at offset 12; its leaf is point's second field.
        let TagData::Struct { fields, .. } = &analysis.tag(point_tag).data else {
            panic!("expected a struct node for a record");
        };
        let y_leaf = fields[1].tag;

        let (tag, offset) = analysis.narrow(segment_tag, Bytes(12), Bytes(4));
        assert_eq!(tag, y_leaf);
        assert_eq!(offset, Bytes(0));

        // Narrowing to a whole embedded record stops at the struct node,
        // with the offset rebased to it.
        let (tag, offset) = analysis.narrow(segment_tag, Bytes(8), Bytes(8));
        assert_eq!(tag, point_tag);
        assert_eq!(offset, Bytes(0));
    }

    #[test]
    fn sibling_fields_of_one_type_get_distinct_leaves_with_a_shared_parent() {
        let mut fixture = Fixture::new();
        let unit = fixture.unit();
        let float32 = fixture
            .types
            .scalar("float32", ScalarKind::Float, 4, unit);
        let point = fixture.types.record("point", 8, unit);
        fixture
            .layouts
            .add_field(point, "point.x", 0, 4, float32, false);
        fixture
            .layouts
            .add_field(point, "point.y", 4, 4, float32, false);

        let mut analysis = fixture.analysis();
        let point_tag = analysis.get_tag(point, TagKind::Native).unwrap();
        let float_tag = analysis.get_tag(float32, TagKind::Native).unwrap();

        let TagData::Struct { fields, .. } = &analysis.tag(point_tag).data else {
            panic!("expected a struct node for a record");
        };
        assert_ne!(fields[0].tag, fields[1].tag);
        assert_eq!(analysis.tag(fields[0].tag).parent, Some(float_tag));
        assert_eq!(analysis.tag(fields[1].tag).parent, Some(float_tag));
    }

    #[test]
    fn aliased_fields_hang_off_the_for_aliased_tag() {
        let mut fixture = Fixture::new();
        let unit = fixture.unit();
        let float32 = fixture
            .types
            .scalar("float32", ScalarKind::Float, 4, unit);
        let cell = fixture.types.record("cell", 4, unit);
        fixture
            .layouts
            .add_field(cell, "cell.value", 0, 4, float32, true);

        let mut analysis = fixture.analysis();
        let cell_tag = analysis.get_tag(cell, TagKind::Native).unwrap();
        let for_aliased = analysis.get_tag(float32, TagKind::ForAliased).unwrap();

        let TagData::Struct { fields, .. } = &analysis.tag(cell_tag).data else {
            panic!("expected a struct node for a record");
        };
        assert_eq!(analysis.tag(fields[0].tag).parent, Some(for_aliased));
    }

    #[test]
    fn empty_aggregates_get_no_tag() {
        let mut fixture = Fixture::new();
        let unit = fixture.unit();
        let nothing = fixture.types.record("nothing", 0, unit);
        fixture.layouts.define_empty(nothing);

        let mut analysis = fixture.analysis();

        assert_eq!(
            analysis.get_tag(nothing, TagKind::Native),
            Err(NoTag::EmptyAggregate)
        );
    }

    #[test]
    fn aggregates_without_layout_are_unsupported() {
        let mut fixture = Fixture::new();
        let unit = fixture.unit();
        let mystery = fixture.types.record("mystery", 8, unit);

        let mut analysis = fixture.analysis();

        assert_eq!(
            analysis.get_tag(mystery, TagKind::Native),
            Err(NoTag::UnsupportedShape)
        );
    }

    #[test]
    fn a_failing_field_poisons_the_whole_aggregate() {
        let mut fixture = Fixture::new();
        let unit = fixture.unit();
        let opaque = fixture
            .types
            .scalar("opaque", ScalarKind::Integer, 4, unit);
        fixture.types.mark_universal_alias(opaque);
        let wrapper = fixture.types.record("wrapper", 4, unit);
        fixture
            .layouts
            .add_field(wrapper, "wrapper.inner", 0, 4, opaque, false);

        let mut analysis = fixture.analysis();

        assert_eq!(
            analysis.get_tag(wrapper, TagKind::Native),
            Err(NoTag::UniversalAliasing)
        );
    }

    #[test]
    fn void_and_dynamic_types_have_no_representation() {
        let mut fixture = Fixture::new();
        let unit = fixture.unit();
        let void = fixture.types.void("void", unit);
        let byte = fixture.types.scalar("byte", ScalarKind::Integer, 1, unit);
        let blob = fixture.types.unconstrained_array("blob", byte, unit);

        let mut analysis = fixture.analysis();

        assert_eq!(
            analysis.get_tag(void, TagKind::Native),
            Err(NoTag::NoRepresentation)
        );
        assert_eq!(
            analysis.get_tag(blob, TagKind::Native),
            Err(NoTag::NoRepresentation)
        );
    }

    #[test]
    fn disabled_analysis_produces_no_tags() {
        let mut fixture = Fixture::new();
        fixture.config.enabled = false;
        let unit = fixture.unit();
        let money = fixture
            .types
            .scalar("money", ScalarKind::Integer, 8, unit);

        let mut analysis = fixture.analysis();

        assert_eq!(analysis.get_tag(money, TagKind::Native), Err(NoTag::Disabled));
    }

    #[test]
    fn padding_wrappers_expose_only_the_payload() {
        let mut fixture = Fixture::new();
        let unit = fixture.unit();
        let flag = fixture.types.scalar("flag", ScalarKind::Boolean, 1, unit);
        let padded = fixture.types.padded("flag.padded", flag, 8, unit);

        let mut analysis = fixture.analysis();
        let flag_tag = analysis.get_tag(flag, TagKind::Native).unwrap();
        let padded_tag = analysis.get_tag(padded, TagKind::Native).unwrap();

        let node = analysis.tag(padded_tag);
        assert_eq!(node.size(), Bytes(8));

        let TagData::Struct { fields, .. } = &node.data else {
            panic!("expected a one-field struct for a padding wrapper");
        };
        assert_eq!(fields.len(), 1);
        assert_eq!(fields[0].offset, Bytes(0));
        assert_eq!(fields[0].size, Bytes(1));
        assert_eq!(fields[0].tag, flag_tag);
    }

    #[test]
    fn truncation_wrappers_inherit_the_inner_tag() {
        let mut fixture = Fixture::new();
        let unit = fixture.unit();
        let counter = fixture
            .types
            .scalar("counter", ScalarKind::Integer, 4, unit);
        let truncated = fixture.types.truncated("counter.narrow", counter, 3, unit);

        let mut analysis = fixture.analysis();
        let counter_tag = analysis.get_tag(counter, TagKind::Native).unwrap();
        let truncated_tag = analysis.get_tag(truncated, TagKind::Native).unwrap();

        assert_eq!(counter_tag, truncated_tag);
    }

    #[test]
    fn recursive_records_through_access_types_terminate() {
        let mut fixture = Fixture::new();
        let unit = fixture.unit();
        let node = fixture.types.record("node", 16, unit);
        let node_ptr = fixture.types.access("node_ptr", node, unit);
        let value = fixture
            .types
            .scalar("value", ScalarKind::Integer, 8, unit);
        fixture
            .layouts
            .add_field(node, "node.value", 0, 8, value, false);
        fixture
            .layouts
            .add_field(node, "node.next", 8, 8, node_ptr, false);

        let mut analysis = fixture.analysis();
        let tag = analysis.get_tag(node, TagKind::Native).unwrap();

        assert!(analysis.tag(tag).is_struct());
    }
}
