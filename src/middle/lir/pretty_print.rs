use colored::Colorize;
use itertools::Itertools;

use crate::{
    backend::alias::{AliasAnalysis, AliasAnnotation},
    index::Index,
    middle::lir,
};

pub fn pretty_print_function(function: &lir::FunctionDefinition, analysis: &AliasAnalysis<'_>) {
    print!(
        "{} {}{}",
        "fn".magenta(),
        function.symbol_name.value().blue(),
        "(".white()
    );

    print!(
        "{}",
        function
            .arguments
            .iter()
            .map(|arg| arg.to_string())
            .join(", ")
            .white()
    );

    println!("{}", ") {".white());

    for block in function.blocks.values() {
        println!("{}", format!("{}:", block.id).bright_red());

        for instruction in &block.instructions {
            print!("    ");

            println!("{}", format_instruction(instruction, analysis));
        }
    }

    println!("{}", "}".white())
}

fn format_instruction(instruction: &lir::Instruction, analysis: &AliasAnalysis<'_>) -> String {
    match instruction {
        lir::Instruction::Move {
            destination,
            source,
        } => format!("{destination} {} {source}", "=".white()),
        lir::Instruction::Load {
            destination,
            address,
            annotation,
            ..
        } => format!(
            "{destination} {} {} {address}{}",
            "=".white(),
            "load".cyan(),
            format_annotation(annotation.as_ref(), analysis)
        ),
        lir::Instruction::Store {
            address,
            value,
            annotation,
            ..
        } => format!(
            "{} {value} {} {address}{}",
            "store".cyan(),
            "->".white(),
            format_annotation(annotation.as_ref(), analysis)
        ),
        lir::Instruction::Branch {
            condition,
            positive,
            negative,
        } => format!(
            "{} {condition} {positive} {} {negative}",
            "branch".cyan(),
            "else".magenta()
        ),
        lir::Instruction::Jump { destination } => format!("{} {destination}", "jump".cyan()),
        lir::Instruction::Return { value: Some(value) } => {
            format!("{} {value}", "return".cyan())
        }
        lir::Instruction::Return { value: None } => "return".cyan().to_string(),
        lir::Instruction::Comment(text) => format!("; {text}").bright_black().to_string(),
    }
}

fn format_annotation(annotation: Option<&AliasAnnotation>, analysis: &AliasAnalysis<'_>) -> String {
    let Some(annotation) = annotation else {
        return String::new();
    };

    format!(
        " !alias({} -> {}, +{}, {}b)",
        analysis.tag(annotation.base).name,
        analysis.tag(annotation.access).name,
        annotation.offset,
        annotation.size,
    )
    .bright_black()
    .to_string()
}

impl core::fmt::Display for lir::RegisterId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "r{}", self.index())
    }
}

impl core::fmt::Display for lir::BlockId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "b{}", self.index())
    }
}

impl core::fmt::Display for lir::Immediate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            lir::Immediate::Int(value) => write!(f, "{value}"),
            lir::Immediate::Float(value) => write!(f, "{value}"),
            lir::Immediate::Bool(value) => write!(f, "{value}"),
        }
    }
}

impl core::fmt::Display for lir::Operand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            lir::Operand::Immediate(immediate) => write!(f, "{immediate}"),
            lir::Operand::Register(register) => write!(f, "{register}"),
        }
    }
}
