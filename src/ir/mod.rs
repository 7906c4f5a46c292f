pub mod ast;
pub mod loops;
pub mod pprint;
pub mod symbols;
