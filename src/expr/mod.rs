pub mod ast;
pub mod constant_fold;
pub mod pprint;
pub mod subs;
pub mod types;

#[cfg(test)]
pub mod ast_builder;
