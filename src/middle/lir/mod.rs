//! LIR (Low-level Intermediate Representation). In this form, abstract
//! concepts like loops and conditionals are simplified to labels and jumps,
//! and memory traffic is explicit: every load and store names the static
//! type it accesses and carries a slot for the alias metadata the
//! [`crate::backend::alias`] engine attaches during lowering.

use std::collections::{BTreeMap, BTreeSet};

use crate::{
    backend::alias::{AccessDescriptor, AliasAnnotation},
    index::{Index, simple_index},
    intern::InternedSymbol,
    middle::ty::TypeId,
};

pub mod pretty_print;

#[derive(Debug, Default)]
pub struct Module {
    pub function_definitions: BTreeMap<FunctionId, FunctionDefinition>,
}

simple_index! {
    /// Identifies a function definition within an LIR module
    pub struct FunctionId;
}

impl FunctionId {
    pub const ZERO: Self = Self(0);
}

#[derive(Debug)]
pub struct FunctionDefinition {
    pub symbol_name: InternedSymbol,
    /// Allocated virtual registers used to store temporary data
    pub registers: BTreeMap<RegisterId, Register>,
    pub arguments: Vec<RegisterId>,
    pub blocks: BTreeMap<BlockId, Block>,
}

impl FunctionDefinition {
    pub fn new(symbol_name: &str) -> Self {
        Self {
            symbol_name: InternedSymbol::new(symbol_name),
            registers: BTreeMap::new(),
            arguments: Vec::new(),
            blocks: BTreeMap::new(),
        }
    }

    pub fn create_register(&mut self, ty: TypeId) -> RegisterId {
        self.create_register_with_provenance(ty, AccessDescriptor::Untracked)
    }

    /// Creates a reference-typed register whose provenance the lowering
    /// engine tracked when producing the value
    pub fn create_register_with_provenance(
        &mut self,
        ty: TypeId,
        provenance: AccessDescriptor,
    ) -> RegisterId {
        let id = RegisterId::new(self.registers.len());
        self.registers.insert(id, Register { id, ty, provenance });
        id
    }

    /// Called for operations that reinterpret a pointer without changing its
    /// target address (address-of, in-object pointer arithmetic): the
    /// destination inherits the source's provenance unchanged.
    pub fn copy_provenance(&mut self, from: RegisterId, to: RegisterId) {
        let provenance = self.registers[&from].provenance;
        if let Some(register) = self.registers.get_mut(&to) {
            register.provenance = provenance;
        }
    }

    pub fn create_block(&mut self) -> BlockId {
        let id = BlockId::new(self.blocks.len());
        self.blocks.insert(
            id,
            Block {
                id,
                instructions: Vec::new(),
                predecessors: BTreeSet::new(),
            },
        );
        id
    }

    pub fn push_instruction(&mut self, block: BlockId, instruction: Instruction) {
        self.blocks
            .get_mut(&block)
            .expect("pushing an instruction to a block that was never created")
            .instructions
            .push(instruction);
    }
}

#[derive(Debug)]
pub struct Block {
    pub id: BlockId,
    pub instructions: Vec<Instruction>,
    pub predecessors: BTreeSet<BlockId>,
}

impl Block {
    pub fn returns(&self) -> bool {
        self.instructions
            .last()
            .is_some_and(|i| matches!(i, Instruction::Return { .. }))
    }
}

simple_index! {
    /// Identifies an LIR block
    pub struct BlockId;
}

impl BlockId {
    pub const ZERO: Self = Self(0);
}

/// A temporary virtual register holding a value of some type
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Register {
    pub id: RegisterId,
    pub ty: TypeId,
    /// Where this value points, for aliasing purposes; only meaningful for
    /// reference-typed registers
    pub provenance: AccessDescriptor,
}

simple_index! {
    /// Identifies a virtual LIR register which holds a temporary value
    pub struct RegisterId;
}

impl RegisterId {
    pub const ZERO: Self = Self(0);
}

#[derive(Debug, Clone, PartialEq)]
pub enum Instruction {
    Move {
        destination: RegisterId,
        source: Operand,
    },
    /// Reads `ty`-typed memory at `address`
    Load {
        destination: RegisterId,
        address: Operand,
        ty: TypeId,
        annotation: Option<AliasAnnotation>,
    },
    /// Writes `value` to `ty`-typed memory at `address`
    Store {
        address: Operand,
        value: Operand,
        ty: TypeId,
        annotation: Option<AliasAnnotation>,
    },
    Branch {
        condition: Operand,
        positive: BlockId,
        negative: BlockId,
    },
    Jump {
        destination: BlockId,
    },
    Return {
        value: Option<Operand>,
    },
    Comment(String),
}

impl Instruction {
    /// The alias metadata attached to this instruction, if it is a memory
    /// access that received any
    pub fn annotation(&self) -> Option<&AliasAnnotation> {
        match self {
            Instruction::Load { annotation, .. } | Instruction::Store { annotation, .. } => {
                annotation.as_ref()
            }
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Immediate {
    Int(u64),
    Float(f64),
    Bool(bool),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Operand {
    Immediate(Immediate),
    Register(RegisterId),
}
