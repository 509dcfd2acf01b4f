//! Back end of the Reef bootstrap compiler.
//!
//! The front end hands us a fully resolved, type-checked program. This crate
//! lowers it towards the target intermediate representation and, crucially,
//! decides what the downstream optimizer may assume about which memory
//! accesses can touch the same bytes. That decision is owned by the
//! type-based alias metadata engine in [`backend::alias`]:
//!
//!   1) [`backend::alias::punning`] scans the whole program once for explicit
//!      type-puns between pointer-like types and records which designated
//!      types are forced to share alias metadata
//!   2) [`backend::alias::tags`] builds, on demand and memoized, the tree of
//!      alias tags mirroring every accessed type's layout
//!   3) [`backend::alias::AliasAnalysis::annotate`] attaches the narrowed
//!      result to individual load/store instructions in the [`middle::lir`]
//!
//! An unsound tag silently miscompiles the program downstream, so every
//! failure path in the engine degrades to "no tag" instead, which only costs
//! optimization opportunity.

pub mod backend;
pub mod index;
pub mod intern;
pub mod middle;
