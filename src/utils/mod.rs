pub mod ast;
pub mod constant_fold;
pub mod debug;
pub mod err;
pub mod name;
pub mod pprint;
pub mod smap;
