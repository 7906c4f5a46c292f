use crate::ir::ast::*;
use crate::ir::loops::add_prefix_to_outermost_loop;
use crate::option::Target;
use crate::stencil_compile_error;
use crate::utils::err::*;

const PARALLEL_PRAGMA: &str = "#pragma omp parallel";
const FOR_PRAGMA: &str = "#pragma omp for schedule(static)";

fn is_parallel_region(node: &Node) -> bool {
    match node {
        Node::Block {pragma: Some(p), ..} => p.starts_with(PARALLEL_PRAGMA),
        _ => false
    }
}

// Parallelizes the outermost loop of a CPU kernel among the threads of an OpenMP parallel region
// enclosing the whole body.
pub fn add_openmp(kernel: KernelFunction, num_threads: Option<usize>) -> CompileResult<KernelFunction> {
    if kernel.target != Target::Cpu {
        return stencil_compile_error!("OpenMP can only be used in CPU kernels");
    }
    if kernel.body.iter().any(is_parallel_region) {
        return stencil_compile_error!(
            "Kernel {0} already contains an OpenMP parallel region", kernel.name
        );
    }
    let KernelFunction {body, ..} = kernel;
    let (found, body) = add_prefix_to_outermost_loop(body, FOR_PRAGMA);
    if !found {
        return stencil_compile_error!("Cannot add OpenMP to a kernel without loops");
    }
    let pragma = match num_threads {
        Some(n) => format!("{PARALLEL_PRAGMA} num_threads({n})"),
        None => PARALLEL_PRAGMA.to_string()
    };
    Ok(KernelFunction {body: vec![Node::Block {body, pragma: Some(pragma)}], ..kernel})
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::expr::ast_builder::*;
    use crate::ir::loops::all_loops;
    use crate::kernel::create_kernel;
    use crate::option::{KernelConfig, VectorizeOptions};
    use crate::utils::ast::ElemSize;
    use crate::vectorize::vectorize;

    fn jacobi_kernel() -> KernelFunction {
        let src = field2d("src", ElemSize::F64);
        let dst = field2d("dst", ElemSize::F64);
        create_kernel(jacobi(&src, &dst), &KernelConfig::default()).unwrap()
    }

    #[test]
    fn pragmas_on_region_and_outer_loop() {
        let k = add_openmp(jacobi_kernel(), Some(4)).unwrap();
        match &k.body[0] {
            Node::Block {pragma, body} => {
                assert_eq!(pragma.as_deref(), Some("#pragma omp parallel num_threads(4)"));
                let loops = all_loops(body);
                match loops[0] {
                    Node::Loop {prefix_lines, ..} => {
                        assert_eq!(prefix_lines, &vec![FOR_PRAGMA.to_string()]);
                    },
                    _ => panic!()
                }
            },
            n => panic!("unexpected node {n:?}")
        }
    }

    fn doubling_kernel(config: &KernelConfig) -> KernelFunction {
        let f = field("f", 1, ElemSize::F64);
        let asgs = vec![assign(at(&f, &[0]), mul(at(&f, &[0]), float(2.0)))];
        create_kernel(asgs, config).unwrap()
    }

    fn assert_all_loops_shared(k: &KernelFunction) {
        let loops = all_loops(&k.body);
        assert_eq!(loops.len(), 2);
        for l in loops {
            match l {
                Node::Loop {prefix_lines, ..} => {
                    assert_eq!(prefix_lines, &vec![FOR_PRAGMA.to_string()]);
                },
                _ => panic!()
            }
        }
    }

    #[test]
    fn remainder_loop_is_shared_among_threads() {
        let opts = VectorizeOptions {assume_inner_stride_one: true, ..VectorizeOptions::default()};
        let config = KernelConfig::default().with_openmp(None).with_vectorization(opts);
        assert_all_loops_shared(&doubling_kernel(&config));
    }

    #[test]
    fn openmp_after_vectorization_shares_remainder_loop() {
        let opts = VectorizeOptions {assume_inner_stride_one: true, ..VectorizeOptions::default()};
        let k = vectorize(doubling_kernel(&KernelConfig::default()), &opts).unwrap();
        assert_all_loops_shared(&add_openmp(k, None).unwrap());
    }

    #[test]
    fn twice_fails() {
        let k = add_openmp(jacobi_kernel(), None).unwrap();
        assert!(add_openmp(k, None).is_err());
    }

    #[test]
    fn gpu_kernel_fails() {
        let src = field2d("src", ElemSize::F64);
        let dst = field2d("dst", ElemSize::F64);
        let k = create_kernel(jacobi(&src, &dst), &KernelConfig::gpu()).unwrap();
        assert!(add_openmp(k, None).is_err());
    }
}
