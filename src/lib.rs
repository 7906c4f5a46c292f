pub mod backend;
pub mod eval;
pub mod expr;
pub mod field;
pub mod ir;
pub mod kernel;
pub mod option;
pub mod utils;
pub mod vectorize;

pub use backend::dot::print_dot;
pub use backend::{get_headers, print_kernel};
pub use expr::ast::{Assignment, Expr};
pub use field::Field;
pub use ir::ast::KernelFunction;
pub use kernel::gpu::call_parameters;
pub use kernel::openmp::add_openmp;
pub use kernel::{create_indexed_kernel, create_kernel};
pub use option::{KernelConfig, PrintOptions, VectorizeOptions};
pub use utils::err::{CompileError, CompileResult, ErrorKind};
pub use vectorize::vectorize;

use crate::option::Dialect;

// Generated source code of a kernel together with the headers it includes.
#[derive(Clone, Debug, PartialEq)]
pub struct GeneratedCode {
    pub code: String,
    pub headers: Vec<String>,
}

// Builds a kernel from the assignments and prints it in the requested dialect. This is the
// complete pipeline from symbolic update rules to source code.
pub fn generate(
    assignments: Vec<Assignment>,
    config: &KernelConfig,
    dialect: Dialect
) -> CompileResult<GeneratedCode> {
    let kernel = create_kernel(assignments, config)?;
    let code = print_kernel(&kernel, &PrintOptions::new(dialect))?;
    let headers = get_headers(&kernel).into_iter().collect();
    Ok(GeneratedCode {code, headers})
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::expr::ast_builder::*;
    use crate::utils::ast::ElemSize;

    #[test]
    fn generate_c_kernel() {
        let src = field2d("src", ElemSize::F64);
        let dst = field2d("dst", ElemSize::F64);
        let out = generate(jacobi(&src, &dst), &KernelConfig::default(), Dialect::C).unwrap();
        assert!(out.code.starts_with("FUNC_PREFIX void kernel("));
        assert_eq!(out.headers, vec!["<math.h>".to_string(), "<stdint.h>".to_string()]);
    }

    #[test]
    fn generate_reports_type_conflicts() {
        let f = field2d("f", ElemSize::F64);
        let asgs = vec![assign(
            at(&f, &[0, 0]),
            add(typed_sym("a", ElemSize::F32), typed_sym("a", ElemSize::F64))
        )];
        let e = generate(asgs, &KernelConfig::default(), Dialect::C).unwrap_err();
        assert_eq!(e.kind(), ErrorKind::Type);
    }
}
