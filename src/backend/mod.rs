pub mod dot;
pub mod printer;

use crate::ir::ast::*;
use crate::option::{Dialect, PrintOptions, Target};
use crate::stencil_compile_error;
use crate::utils::err::*;
use crate::utils::pprint::PrettyPrintEnv;
use crate::utils::smap::SFold;
use printer::CodePrinter;

use lazy_static::lazy_static;

use std::collections::BTreeSet;

const C_FUNCTIONS: [&str; 27] = [
    "sqrt", "cbrt", "exp", "exp2", "log", "log2", "log10", "sin", "cos", "tan", "asin", "acos",
    "atan", "atan2", "sinh", "cosh", "tanh", "fabs", "abs", "floor", "ceil", "round", "fmod",
    "fmin", "fmax", "min", "max",
];

lazy_static! {
    static ref KNOWN_C: BTreeSet<&'static str> = C_FUNCTIONS.into_iter().collect();

    static ref KNOWN_CUDA: BTreeSet<&'static str> = C_FUNCTIONS.into_iter()
        .chain(["rsqrt", "erf", "sqrtf", "expf", "logf", "__expf", "__logf"])
        .collect();

    static ref KNOWN_OPENCL: BTreeSet<&'static str> = C_FUNCTIONS.into_iter()
        .chain(["rsqrt", "erf", "native_exp", "native_log", "native_sin", "native_cos"])
        .collect();
}

// The functions a dialect can call without further declarations.
pub fn known_functions(dialect: Dialect) -> &'static BTreeSet<&'static str> {
    match dialect {
        Dialect::C => &KNOWN_C,
        Dialect::Cuda => &KNOWN_CUDA,
        Dialect::OpenCl => &KNOWN_OPENCL,
    }
}

fn node_headers(mut acc: BTreeSet<String>, node: &Node) -> BTreeSet<String> {
    match node {
        Node::CustomCode {headers, ..} => acc.extend(headers.iter().cloned()),
        Node::Block {pragma: Some(p), ..} if p.starts_with("#pragma omp") => {
            acc.insert("<omp.h>".to_string());
        },
        Node::TempAlloc {..} | Node::TempFree {..} => {
            acc.insert("<stdlib.h>".to_string());
        },
        _ => ()
    };
    node.sfold(acc, node_headers)
}

// The headers the printed code of a kernel includes: those of its instruction set and those
// required by individual nodes.
pub fn get_headers(kernel: &KernelFunction) -> BTreeSet<String> {
    let mut headers = BTreeSet::new();
    if kernel.target == Target::Cpu {
        headers.insert("<math.h>".to_string());
        headers.insert("<stdint.h>".to_string());
    }
    if let Some(is) = &kernel.instruction_set {
        headers.extend(is.headers.iter().cloned());
    }
    kernel.body.iter().fold(headers, node_headers)
}

// Prints a kernel as a function definition, or only its declaration, in the requested dialect.
pub fn print_kernel(kernel: &KernelFunction, opts: &PrintOptions) -> CompileResult<String> {
    if kernel.instruction_set.is_some() && opts.dialect != Dialect::C {
        return stencil_compile_error!(
            "Vectorized kernel {0} can only be printed as C code", kernel.name
        );
    }
    let printer = CodePrinter::new(opts.dialect, kernel.instruction_set.as_ref(), opts.f32_literals);
    if opts.signature_only {
        let (_, s) = printer.print_signature(PrettyPrintEnv::new(), kernel)?;
        Ok(format!("{s};"))
    } else {
        printer.print_function(kernel)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::expr::ast_builder::*;
    use crate::kernel::{create_indexed_kernel, create_kernel};
    use crate::option::{GpuIndexing, KernelConfig, VectorizeOptions};
    use crate::utils::ast::ElemSize;
    use crate::utils::name::Name;

    use regex::Regex;

    fn jacobi_kernel(config: &KernelConfig) -> KernelFunction {
        let src = field2d("src", ElemSize::F64);
        let dst = field2d("dst", ElemSize::F64);
        create_kernel(jacobi(&src, &dst), config).unwrap()
    }

    fn print_c(k: &KernelFunction) -> String {
        print_kernel(k, &PrintOptions::new(Dialect::C)).unwrap()
    }

    #[test]
    fn jacobi_c_code() {
        let s = print_c(&jacobi_kernel(&KernelConfig::default()));
        assert!(s.starts_with(
            "FUNC_PREFIX void kernel(double * RESTRICT _data_dst, const double * RESTRICT _data_src, "
        ));
        let outer = Regex::new(
            r"for \(int64_t ctr_0 = 1; ctr_0 < _size_dst_0 - 1; ctr_0 \+= 1\)"
        ).unwrap();
        assert!(outer.is_match(&s));
        let inner = Regex::new(
            r"\n    for \(int64_t ctr_1 = 1; ctr_1 < _size_dst_1 - 1; ctr_1 \+= 1\)\n    \{"
        ).unwrap();
        assert!(inner.is_match(&s));
        let store = Regex::new(r"_data_dst_00\[[^\]]*\] = \(.*\) / 4\.0;").unwrap();
        assert!(store.is_match(&s));
        let decl = Regex::new(r"const double \* RESTRICT _data_src_01 = _data_src \+ ").unwrap();
        assert!(decl.is_match(&s));
        assert!(s.ends_with("\n}"));
    }

    #[test]
    fn signature_only() {
        let mut opts = PrintOptions::new(Dialect::C);
        opts.signature_only = true;
        let config = KernelConfig::default().with_function_name("jacobi").with_debug_print(false);
        let s = print_kernel(&jacobi_kernel(&config), &opts).unwrap();
        assert!(s.starts_with("FUNC_PREFIX void jacobi("));
        assert!(s.ends_with(");"));
        assert!(!s.contains('{'));
    }

    #[test]
    fn vectorized_c_code() {
        let opts = VectorizeOptions {assume_inner_stride_one: true, ..VectorizeOptions::default()};
        let k = jacobi_kernel(&KernelConfig::default().with_vectorization(opts));
        let s = print_c(&k);
        let store = Regex::new(r"_mm256_storeu_pd\(&_data_dst_00\[ctr_1\],_mm256_div_pd\(").unwrap();
        assert!(store.is_match(&s));
        assert!(s.contains("_mm256_loadu_pd(&_data_src_01[ctr_1])"));
        assert!(s.contains("ctr_1 += 4"));
        assert!(get_headers(&k).contains("<immintrin.h>"));
        assert!(print_kernel(&k, &PrintOptions::new(Dialect::Cuda)).is_err());
    }

    #[test]
    fn vectorized_blend_on_scalar_condition() {
        let f = field2d("f", ElemSize::F64);
        let g = field2d("g", ElemSize::F64);
        let asgs = vec![assign(at(&g, &[0, 0]), piecewise(vec![
            (at(&f, &[0, 0]), lt(sym("w"), float(0.0))),
            (float(0.0), boolean(true)),
        ]))];
        let opts = VectorizeOptions {assume_inner_stride_one: true, ..VectorizeOptions::default()};
        let k = create_kernel(asgs, &KernelConfig::default().with_vectorization(opts)).unwrap();
        let s = print_c(&k);
        let blend = Regex::new(
            r"_mm256_blendv_pd\(_mm256_set_pd\(0\.0,0\.0,0\.0,0\.0\),_mm256_loadu_pd\(&_data_f_00\[ctr_1\]\),_mm256_cmp_pd\(_mm256_set_pd\(\(\(w < 0\.0\) \? 1\.0 : 0\.0\),"
        ).unwrap();
        assert!(blend.is_match(&s));
        assert!(!s.contains("_mm256_set_pd(w < 0.0"));
    }

    #[test]
    fn openmp_code_and_headers() {
        let k = jacobi_kernel(&KernelConfig::default().with_openmp(Some(2)));
        let s = print_c(&k);
        assert!(s.contains("#pragma omp parallel num_threads(2)\n  {"));
        assert!(s.contains("    #pragma omp for schedule(static)\n    for (int64_t ctr_0"));
        let headers = get_headers(&k);
        assert!(headers.contains("<omp.h>"));
        assert!(headers.contains("<math.h>"));
    }

    #[test]
    fn cuda_code() {
        let k = jacobi_kernel(&KernelConfig::gpu());
        let s = print_kernel(&k, &PrintOptions::new(Dialect::Cuda)).unwrap();
        assert!(s.starts_with("FUNC_PREFIX __launch_bounds__(128) void kernel("));
        assert!(s.contains("const int64_t ctr_1 = 1 + (blockIdx.x * blockDim.x + threadIdx.x);"));
        assert!(s.contains("if (ctr_0 < _size_dst_0 - 1 && ctr_1 < _size_dst_1 - 1)"));
        assert!(!get_headers(&k).contains("<math.h>"));
    }

    #[test]
    fn cuda_line_indexing_has_no_launch_bounds() {
        let k = jacobi_kernel(&KernelConfig::gpu().with_gpu_indexing(GpuIndexing::Line));
        let s = print_kernel(&k, &PrintOptions::new(Dialect::Cuda)).unwrap();
        assert!(s.starts_with("FUNC_PREFIX void kernel("));
    }

    #[test]
    fn opencl_code() {
        let k = jacobi_kernel(&KernelConfig::gpu());
        let s = print_kernel(&k, &PrintOptions::new(Dialect::OpenCl)).unwrap();
        assert!(s.starts_with("__kernel void kernel(__global double * RESTRICT _data_dst, "));
        assert!(s.contains("get_group_id(0) * get_local_size(0) + get_local_id(0)"));
    }

    #[test]
    fn gpu_kernel_in_c_fails() {
        let k = jacobi_kernel(&KernelConfig::gpu());
        assert!(print_kernel(&k, &PrintOptions::new(Dialect::C)).is_err());
    }

    #[test]
    fn float_kernel_literals() {
        let src = field2d("src", ElemSize::F32);
        let dst = field2d("dst", ElemSize::F32);
        let k = create_kernel(jacobi(&src, &dst), &KernelConfig::default()).unwrap();
        let s = print_c(&k);
        assert!(s.contains("/ 4.0f;"));
        let mut opts = PrintOptions::new(Dialect::C);
        opts.f32_literals = Some(false);
        let s = print_kernel(&k, &opts).unwrap();
        assert!(s.contains("/ 4.0;"));
    }

    #[test]
    fn print_symbol_header() {
        let mut k = jacobi_kernel(&KernelConfig::default());
        k.body.push(Node::print_symbol(&Name::new("_size_dst_0")));
        assert!(get_headers(&k).contains("<iostream>"));
        assert!(print_c(&k).contains("std::cout << \"_size_dst_0  =  \" << _size_dst_0 << std::endl;"));
    }

    #[test]
    fn indexed_kernel_code() {
        let f = field2d("f", ElemSize::F64);
        let st = crate::expr::types::Type::Struct {
            id: "Cell".to_string(),
            members: vec![("x".to_string(), ElemSize::I32), ("y".to_string(), ElemSize::I32)]
        };
        let idx = crate::field::Field::create_index_field("idx", st).unwrap();
        let asgs = vec![assign(at(&f, &[0, 0]), float(0.0))];
        let k = create_indexed_kernel(asgs, vec![idx], &KernelConfig::default()).unwrap();
        let s = print_c(&k);
        assert!(s.contains("const int32_t x = _data_idx[ctr_0].x;"));
        assert!(s.contains("for (int64_t ctr_0 = 0; ctr_0 < _size_idx_0; ctr_0 += 1)"));
    }
}
