pub mod lir;
pub mod ty;
