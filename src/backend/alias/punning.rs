//! Whole-program scan of explicit type-puns.
//!
//! An unchecked conversion between two pointer-like types lets the program
//! reach the same bytes under two unrelated declared names. The only way to
//! keep type-based aliasing sound in that situation is to force both
//! designated types to share identical alias tags, so before any tag is
//! built we scan every pun site the front end recorded and group the
//! designated types into equivalence classes. A group whose members are
//! structurally incompatible (different sizes, an aggregate, a mismatched
//! base-type property) is poisoned whole: aliasing information is
//! all-or-nothing per group, since partial tagging would require
//! case-by-case reasoning the rest of the engine does not support.
//!
//! Groups are grown monotonically and never deleted; they are consulted
//! lazily the first time any member needs a tag.

use colored::Colorize;
use hashbrown::HashMap;

use super::AliasConfig;
use crate::{
    index::{IndexVec, simple_index},
    middle::ty::{TypeId, TypeTable, UnitId},
};

simple_index! {
    /// Identifies a punning group
    pub struct PunGroupId;
}

/// An explicit type-pun site observed by the front end: a reinterpretation
/// of a `source`-typed pointer value as a `target`-typed one
#[derive(Debug, Clone, Copy)]
pub struct PunSite {
    pub source: TypeId,
    pub target: TypeId,
    /// Compilation unit containing the pun
    pub unit: UnitId,
    /// Whether the pun occurs inside a subprogram or package body (as
    /// opposed to a declarative region visible across units)
    pub in_body: bool,
}

/// An equivalence class of designated types forced to share alias tags
#[derive(Debug)]
pub struct PunGroup {
    /// Grown monotonically; a group absorbed by another is left behind empty
    pub members: Vec<TypeId>,
    /// Cleared permanently the first time two incompatible members meet
    pub valid: bool,
}

#[derive(Debug, Default)]
pub struct PunGroupTable {
    groups: IndexVec<PunGroupId, PunGroup>,
    member_map: HashMap<TypeId, PunGroupId>,
}

impl PunGroupTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn group_of(&self, ty: TypeId) -> Option<PunGroupId> {
        self.member_map.get(&ty).copied()
    }

    pub fn group(&self, id: PunGroupId) -> &PunGroup {
        &self.groups[id]
    }

    /// Whether `ty` belongs to a group that has been poisoned
    pub fn is_invalid_member(&self, ty: TypeId) -> bool {
        self.group_of(ty)
            .is_some_and(|group| !self.groups[group].valid)
    }

    /// The one-shot whole-program scan, run before any tag is requested and
    /// never re-entered
    pub(crate) fn scan(
        &mut self,
        types: &mut TypeTable,
        sites: &[PunSite],
        config: &AliasConfig,
        warnings: &mut Vec<PunWarning>,
    ) {
        for site in sites {
            self.record(types, *site, config, warnings);
        }
    }

    fn record(
        &mut self,
        types: &mut TypeTable,
        site: PunSite,
        config: &AliasConfig,
        warnings: &mut Vec<PunWarning>,
    ) {
        // Only puns between pointer-like types whose designated types are
        // both data types concern us; access-to-subprogram values are never
        // loaded as data.
        let Some(source) = types.designated_data(site.source) else {
            return;
        };
        let Some(target) = types.designated_data(site.target) else {
            return;
        };

        // The front end already handled an opted-out target another way.
        if types[target].suppressed {
            return;
        }

        // Already identified under the canonicalizer, or the target admits
        // aliasing with anything: no group needed.
        if types.is_subtype_for_aliasing(source, target)
            || types.is_subtype_for_aliasing(target, source)
            || types.has_universal_aliasing(target)
        {
            return;
        }

        // A pun in a body involving a type from a third unit cannot be
        // safely grouped: the other unit may be compiled without ever seeing
        // this site.
        if site.in_body {
            let is_local = |ty: TypeId| {
                let unit = types[ty].unit;
                unit == site.unit || unit == config.main_unit
            };

            if !is_local(source) || !is_local(target) {
                if is_local(target) && !types.is_access(target) {
                    types.mark_universal_alias(target);
                    return;
                }

                if config.codegen_enabled && !types.is_unconstrained_array(target) {
                    warnings.push(PunWarning { site, target });
                }
                // Best effort: group the pair anyway.
            }
        }

        self.merge(types, source, target);
    }

    /// Merges two designated types into the group table. If neither operand
    /// is already a base type, their canonical bases are unified first, so
    /// that invalidity on the base-type join propagates to the subtype join.
    fn merge(&mut self, types: &TypeTable, t1: TypeId, t2: TypeId) -> PunGroupId {
        let b1 = types.base_type_for_aliasing(t1);
        let b2 = types.base_type_for_aliasing(t2);

        if b1 != t1 && b2 != t2 {
            let base_group = self.merge(types, b1, b2);
            let group = self.unify(types, t1, t2);

            if !self.groups[base_group].valid {
                self.groups[group].valid = false;
            }

            group
        } else {
            self.unify(types, t1, t2)
        }
    }

    /// Joins `t1` and `t2` into a single group, creating, growing, or
    /// fusing groups as needed, and poisons the result if the pair is
    /// structurally incompatible
    fn unify(&mut self, types: &TypeTable, t1: TypeId, t2: TypeId) -> PunGroupId {
        if t1 == t2 {
            return match self.group_of(t1) {
                Some(group) => group,
                None => {
                    let group = self.groups.push(PunGroup {
                        members: vec![t1],
                        valid: true,
                    });
                    self.member_map.insert(t1, group);
                    group
                }
            };
        }

        let compatible = types.size(t1).is_some()
            && types.size(t1) == types.size(t2)
            && !types.is_aggregate(t1)
            && !types.is_aggregate(t2)
            && types.is_base_type(t1) == types.is_base_type(t2);

        let group = match (self.group_of(t1), self.group_of(t2)) {
            (None, None) => {
                let group = self.groups.push(PunGroup {
                    members: vec![t1, t2],
                    valid: true,
                });
                self.member_map.insert(t1, group);
                self.member_map.insert(t2, group);
                group
            }
            (Some(group), None) => {
                self.groups[group].members.push(t2);
                self.member_map.insert(t2, group);
                group
            }
            (None, Some(group)) => {
                self.groups[group].members.push(t1);
                self.member_map.insert(t1, group);
                group
            }
            (Some(g1), Some(g2)) if g1 == g2 => g1,
            (Some(g1), Some(g2)) => {
                // Fuse: move every member of g2 into g1.
                let moved = std::mem::take(&mut self.groups[g2].members);
                let moved_valid = self.groups[g2].valid;

                for member in &moved {
                    self.member_map.insert(*member, g1);
                }
                self.groups[g1].members.extend(moved);

                if !moved_valid {
                    self.groups[g1].valid = false;
                }

                g1
            }
        };

        if !compatible {
            self.groups[group].valid = false;
        }

        group
    }
}

/// The single user-facing diagnostic this engine owns (every other failure
/// degrades silently to "no tag")
#[derive(Debug, Clone, Copy)]
pub struct PunWarning {
    pub site: PunSite,
    /// The designated target type of the offending pun
    pub target: TypeId,
}

impl PunWarning {
    pub fn report(&self, types: &TypeTable) {
        eprintln!(
            "{}: type-pun to {} in {} involves a type from another compilation unit and cannot be safely modeled; consider compiling without type-based aliasing or marking {} as universally aliased",
            "warning".yellow(),
            types.display(self.target),
            types.unit_name(self.site.unit).white(),
            types.display(self.target),
        );
    }
}
