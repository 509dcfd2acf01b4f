pub mod alias;
pub mod layout;
