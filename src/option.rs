use crate::expr::types::{create_type, Type};
use crate::utils::ast::ElemSize;
use crate::utils::err::*;
use crate::vectorize::instruction_sets::InstructionSet;

use std::collections::BTreeMap;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Target {
    #[default] Cpu, Gpu
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Dialect {
    #[default] C, Cuda, OpenCl
}

impl std::fmt::Display for Dialect {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Dialect::C => write!(f, "C"),
            Dialect::Cuda => write!(f, "CUDA"),
            Dialect::OpenCl => write!(f, "OpenCL"),
        }
    }
}

// The number of cells skipped at the boundaries of each spatial dimension.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum GhostLayers {
    // Inferred from the largest offset of any field access in each dimension.
    #[default] Auto,
    Uniform(i64),
    // One (lower, upper) pair per spatial dimension.
    PerDim(Vec<(i64, i64)>),
}

// A slice of one dimension of the iteration space. Negative bounds count from the end of the
// dimension and a missing stop means the end of the dimension.
#[derive(Clone, Debug, PartialEq)]
pub struct SliceSpec {
    pub start: i64,
    pub stop: Option<i64>,
    pub step: i64,
}

impl SliceSpec {
    pub fn new(start: i64, stop: Option<i64>, step: i64) -> Self {
        SliceSpec {start, stop, step}
    }

    pub fn full() -> Self {
        SliceSpec {start: 0, stop: None, step: 1}
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub enum Nontemporal {
    #[default] Disabled,
    All,
    Fields(Vec<String>),
}

impl Nontemporal {
    pub fn applies_to(&self, field: &str) -> bool {
        match self {
            Nontemporal::Disabled => false,
            Nontemporal::All => true,
            Nontemporal::Fields(fields) => fields.iter().any(|f| f == field),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct VectorizeOptions {
    pub instruction_set: InstructionSet,

    // Assume that the base pointers of all fields are aligned to the vector width, such that
    // accesses without a shift relative to the loop counter can use aligned loads and stores.
    pub assume_aligned: bool,

    // Selects the fields whose stores bypass the cache. Only aligned stores are streamed.
    pub nontemporal: Nontemporal,

    // Replace the stride of the fastest varying dimension by one. Without this, only fields with
    // a fixed shape can be vectorized.
    pub assume_inner_stride_one: bool,

    // Assume the fastest dimension is padded up to a multiple of the vector width, such that the
    // vector loop may run past the end of the iteration space instead of using a scalar tail.
    pub assume_sufficient_line_padding: bool,
}

impl Default for VectorizeOptions {
    fn default() -> Self {
        VectorizeOptions {
            instruction_set: InstructionSet::Avx,
            assume_aligned: false,
            nontemporal: Nontemporal::Disabled,
            assume_inner_stride_one: false,
            assume_sufficient_line_padding: false,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum GpuIndexing {
    // Each thread updates one cell. The iteration space is split into blocks of the given size.
    Block {block_size: [i64; 3]},
    // Each block updates one line of the fastest coordinate, with one thread per cell.
    Line,
}

impl Default for GpuIndexing {
    fn default() -> Self {
        GpuIndexing::Block {block_size: [128, 1, 1]}
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct KernelConfig {
    /////////////////////////
    // CONSTRUCTION FLAGS //
    /////////////////////////

    // Determines whether the kernel is a CPU loop nest or a GPU kernel.
    pub target: Target,

    // The name of the generated function.
    pub function_name: String,

    // The type of symbols without an explicit type.
    pub data_type: ElemSize,

    // Explicit types of named symbols.
    pub type_overrides: BTreeMap<String, Type>,

    // Restricts iteration to a slice per spatial dimension. When set, ghost layers are ignored.
    pub iteration_slice: Option<Vec<SliceSpec>>,

    pub ghost_layers: GhostLayers,

    // Disables the check that no cell reads a neighbour value written by the same kernel.
    pub skip_independence_check: bool,

    // Member names of the coordinates in the index field of an indexed kernel.
    pub coordinate_names: Vec<String>,

    ///////////////
    // CPU FLAGS //
    ///////////////

    pub cpu_openmp: bool,

    pub omp_num_threads: Option<usize>,

    // When set, the innermost loop of a CPU kernel is vectorized.
    pub cpu_vectorize: Option<VectorizeOptions>,

    ///////////////
    // GPU FLAGS //
    ///////////////

    pub gpu_indexing: GpuIndexing,

    /////////////////
    // DEBUG FLAGS //
    /////////////////

    // Enable to print the intermediate IR of every construction stage to standard output.
    pub debug_print: bool,
}

impl Default for KernelConfig {
    fn default() -> Self {
        KernelConfig {
            target: Target::Cpu,
            function_name: "kernel".to_string(),
            data_type: ElemSize::F64,
            type_overrides: BTreeMap::new(),
            iteration_slice: None,
            ghost_layers: GhostLayers::Auto,
            skip_independence_check: false,
            coordinate_names: vec!["x".to_string(), "y".to_string(), "z".to_string()],
            cpu_openmp: false,
            omp_num_threads: None,
            cpu_vectorize: None,
            gpu_indexing: GpuIndexing::default(),
            debug_print: false,
        }
    }
}

impl KernelConfig {
    pub fn gpu() -> Self {
        KernelConfig {target: Target::Gpu, ..KernelConfig::default()}
    }

    pub fn with_function_name(self, function_name: &str) -> Self {
        KernelConfig {function_name: function_name.to_string(), ..self}
    }

    pub fn with_data_type(self, data_type: ElemSize) -> Self {
        KernelConfig {data_type, ..self}
    }

    // Declares the type of a symbol from a type string such as "float32" or "int64".
    pub fn with_type_override(mut self, symbol: &str, ty: &str) -> CompileResult<Self> {
        self.type_overrides.insert(symbol.to_string(), create_type(ty)?);
        Ok(self)
    }

    pub fn with_ghost_layers(self, ghost_layers: GhostLayers) -> Self {
        KernelConfig {ghost_layers, ..self}
    }

    pub fn with_iteration_slice(self, slice: Vec<SliceSpec>) -> Self {
        KernelConfig {iteration_slice: Some(slice), ..self}
    }

    pub fn with_openmp(self, num_threads: Option<usize>) -> Self {
        KernelConfig {cpu_openmp: true, omp_num_threads: num_threads, ..self}
    }

    pub fn with_vectorization(self, opts: VectorizeOptions) -> Self {
        KernelConfig {cpu_vectorize: Some(opts), ..self}
    }

    pub fn with_gpu_indexing(self, gpu_indexing: GpuIndexing) -> Self {
        KernelConfig {gpu_indexing, ..self}
    }

    pub fn with_debug_print(self, debug_print: bool) -> Self {
        KernelConfig {debug_print, ..self}
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct PrintOptions {
    pub dialect: Dialect,

    // Print only the function signature, terminated by a semicolon.
    pub signature_only: bool,

    // Overrides the precision of floating-point literals: when set to true every literal is
    // printed as a 32-bit constant, when false as a 64-bit constant. When unset, the type of each
    // literal decides.
    pub f32_literals: Option<bool>,
}

impl PrintOptions {
    pub fn new(dialect: Dialect) -> Self {
        PrintOptions {dialect, ..PrintOptions::default()}
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn default_config() {
        let config = KernelConfig::default();
        assert_eq!(config.target, Target::Cpu);
        assert_eq!(config.function_name, "kernel");
        assert_eq!(config.gpu_indexing, GpuIndexing::Block {block_size: [128, 1, 1]});
    }

    #[test]
    fn type_override_from_string() {
        let config = KernelConfig::default().with_type_override("n", "int32").unwrap();
        assert_eq!(config.type_overrides.get("n"), Some(&Type::scalar(ElemSize::I32)));
        assert!(KernelConfig::default().with_type_override("n", "complex").is_err());
    }

    #[test]
    fn nontemporal_selection() {
        let nt = Nontemporal::Fields(vec!["dst".to_string()]);
        assert!(nt.applies_to("dst"));
        assert!(!nt.applies_to("src"));
        assert!(Nontemporal::All.applies_to("src"));
        assert!(!Nontemporal::Disabled.applies_to("src"));
    }
}
