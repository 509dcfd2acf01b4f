//! Serialization of the produced alias metadata into the target
//! intermediate representation's native format.
//!
//! The reachable tag tree is written as a small DAG of numbered records:
//! scalar leaves as `(name, size, parent)`, struct nodes as the same plus a
//! list of `(offset, size, child)` triples, and each annotated instruction
//! as the 4-tuple `(base, access, offset, size)` consuming analyses expect.
//! Only nodes reachable from an attached annotation are emitted; numbering
//! is first-use order, so output is deterministic for a given module.

use std::fmt::Write;

use hashbrown::HashMap;
use itertools::Itertools;

use super::{
    AliasAnalysis,
    tags::{TagData, TagId},
};
use crate::middle::lir;

struct Emitter<'a, 'ctx> {
    analysis: &'a AliasAnalysis<'ctx>,
    numbers: HashMap<TagId, usize>,
    order: Vec<TagId>,
}

impl<'a, 'ctx> Emitter<'a, 'ctx> {
    fn number(&mut self, tag: TagId) -> usize {
        if let Some(number) = self.numbers.get(&tag) {
            return *number;
        }

        let number = self.order.len();
        self.numbers.insert(tag, number);
        self.order.push(tag);
        number
    }

    fn record(&mut self, tag: TagId) -> String {
        let number = self.numbers[&tag];
        let node = self.analysis.tag(tag);

        match &node.data {
            TagData::Root => format!("!{number} = !{{ \"{}\" }}", node.name),
            TagData::Scalar { size } => {
                let parent = self.number(node.parent.unwrap());
                format!("!{number} = !{{ \"{}\", {size}, !{parent} }}", node.name)
            }
            TagData::Struct { size, fields } => {
                let parent = self.number(node.parent.unwrap());
                let fields = fields
                    .iter()
                    .map(|field| format!("({}, {}, !{})", field.offset, field.size, {
                        self.number(field.tag)
                    }))
                    .collect::<Vec<_>>()
                    .join(", ");

                format!(
                    "!{number} = !{{ \"{}\", {size}, !{parent}, {fields} }}",
                    node.name
                )
            }
        }
    }
}

/// Writes the alias metadata of every annotated instruction in `module`,
/// followed by the records of every tag node those annotations reach
pub fn write_metadata(analysis: &AliasAnalysis<'_>, module: &lir::Module) -> String {
    let mut emitter = Emitter {
        analysis,
        numbers: HashMap::new(),
        order: Vec::new(),
    };

    let mut out = String::new();

    for function in module.function_definitions.values() {
        let annotated = function
            .blocks
            .values()
            .flat_map(|block| {
                block
                    .instructions
                    .iter()
                    .enumerate()
                    .filter_map(move |(i, instruction)| {
                        instruction.annotation().map(|annotation| (block.id, i, annotation))
                    })
            })
            .collect_vec();

        if annotated.is_empty() {
            continue;
        }

        writeln!(out, "function {}:", function.symbol_name).unwrap();

        for (block, index, annotation) in annotated {
            let base = emitter.number(annotation.base);
            let access = emitter.number(annotation.access);

            writeln!(
                out,
                "  {block}[{index}]: !{{ !{base}, !{access}, {}, {} }}",
                annotation.offset, annotation.size,
            )
            .unwrap();
        }
    }

    if !out.is_empty() && !emitter.order.is_empty() {
        out.push('\n');
    }

    // Records may reference parents and children that have no number yet;
    // those get appended to the worklist as they are encountered.
    let mut index = 0;
    while index < emitter.order.len() {
        let tag = emitter.order[index];
        index += 1;

        let record = emitter.record(tag);
        writeln!(out, "{record}").unwrap();
    }

    out
}
