pub mod gpu;
pub mod iteration;
pub mod openmp;
pub mod params;
pub mod resolve;
pub mod typing;

use crate::expr::ast::*;
use crate::expr::types::Type;
use crate::field::{Field, FieldType};
use crate::ir::ast::*;
use crate::option::{KernelConfig, Target};
use crate::stencil_compile_error;
use crate::utils::ast::ElemSize;
use crate::utils::debug::*;
use crate::utils::err::*;
use crate::utils::name::Name;
use crate::vectorize::vectorize;
use iteration::*;
use resolve::Resolver;
use typing::TypedBody;

use std::collections::BTreeSet;

fn read_only_fields(typed: &TypedBody) -> BTreeSet<String> {
    typed.fields.iter()
        .filter(|f| typed.is_read_only(&f.name))
        .map(|f| f.name.clone())
        .collect()
}

// Applies the CPU-specific transformations requested in the configuration.
fn finalize_cpu_kernel(
    kernel: KernelFunction,
    config: &KernelConfig,
    debug_env: &DebugEnv
) -> CompileResult<KernelFunction> {
    let kernel = if config.cpu_openmp {
        let kernel = openmp::add_openmp(kernel, config.omp_num_threads)?;
        debug_env.print("OpenMP", &kernel);
        kernel
    } else {
        kernel
    };
    match &config.cpu_vectorize {
        Some(opts) => {
            let kernel = vectorize(kernel, opts)?;
            debug_env.print("Vectorized", &kernel);
            Ok(kernel)
        },
        None => Ok(kernel)
    }
}

fn make_kernel(
    body: Vec<Node>,
    typed: &TypedBody,
    config: &KernelConfig,
    ghost_layers: Vec<(i64, i64)>,
    gpu_indexing: Option<GpuIndexingInfo>
) -> CompileResult<KernelFunction> {
    let params = params::kernel_parameters(&body, &typed.fields)?;
    Ok(KernelFunction {
        name: config.function_name.clone(),
        params,
        body,
        target: config.target,
        fields_accessed: typed.fields.clone(),
        ghost_layers,
        instruction_set: None,
        gpu_indexing,
    })
}

// Creates a kernel applying the assignments to every cell of the iteration space. On the CPU,
// the cells are traversed by a loop nest with one loop per spatial dimension, while on the GPU
// each thread updates one cell.
pub fn create_kernel(
    assignments: Vec<Assignment>,
    config: &KernelConfig
) -> CompileResult<KernelFunction> {
    let debug_env = DebugEnv::new(config);
    let typed = typing::type_assignments(assignments, config, BTreeSet::new())?;
    debug_env.print("Typed assignments", &typed.nodes);

    let spatial = typed.spatial_fields();
    let spatial_dims = match spatial.first() {
        Some(f) => f.spatial_dims,
        None => return stencil_compile_error!("Cannot create a kernel that accesses no fields")
    };
    let accesses = typed.accesses().into_iter()
        .filter(|a| a.field.field_type == FieldType::Generic)
        .collect::<Vec<_>>();
    let ghost_layers = resolve_ghost_layers(&config.ghost_layers, &accesses, spatial_dims)?;
    tracing::debug!("Ghost layers of kernel {0}: {ghost_layers:?}", config.function_name);
    let shape = common_shape(&spatial)?;
    let order = loop_order(&spatial)?;
    let bounds = loop_bounds(&shape, &ghost_layers, &config.iteration_slice)?;
    let read_only = read_only_fields(&typed);

    match config.target {
        Target::Cpu => {
            let resolver = Resolver::loop_counters(order.clone(), read_only, true);
            let (body, pointers) = resolver.resolve(typed.nodes.clone());
            let body = build_loop_nest(body, &order, &bounds, pointers);
            let kernel = make_kernel(body, &typed, config, ghost_layers, None)?;
            debug_env.print("Loop nest", &kernel);
            finalize_cpu_kernel(kernel, config, &debug_env)
        },
        Target::Gpu => {
            let resolver = Resolver::loop_counters(order.clone(), read_only, false);
            let (body, _) = resolver.resolve(typed.nodes.clone());
            let coords = gpu::map_coordinates(&config.gpu_indexing, &order, &bounds)?;
            let mut nodes = coords.decls;
            nodes.push(Node::Conditional {cond: coords.guard, thn: body, els: None});
            let kernel = make_kernel(nodes, &typed, config, ghost_layers, Some(coords.info))?;
            debug_env.print("GPU kernel", &kernel);
            Ok(kernel)
        }
    }
}

fn coordinate_symbols(
    index_fields: &[Field],
    names: &[String],
    spatial_dims: usize
) -> CompileResult<Vec<Expr>> {
    if spatial_dims > names.len() {
        return stencil_compile_error!(
            "The kernel has {spatial_dims} spatial dimensions, but only {0} coordinate names \
             are given", names.len()
        );
    }
    let first = &index_fields[0];
    names[..spatial_dims].iter()
        .map(|n| {
            for f in index_fields {
                if f.dtype.member_type(n).map(|sz| !sz.is_integer()).unwrap_or(true) {
                    return stencil_compile_error!(
                        "Index field {0} has no integer coordinate member {n}", f.name
                    );
                }
            }
            let sz = first.dtype.member_type(n).unwrap_or(ElemSize::I64);
            Ok(Expr::Symbol {id: Name::new(n.clone()), ty: Type::scalar(sz)})
        })
        .collect()
}

// Creates a kernel visiting only the cells listed in a coordinate list. Each entry of the index
// fields is a struct holding the coordinates of one cell, and possibly further values that the
// assignments may read.
pub fn create_indexed_kernel(
    assignments: Vec<Assignment>,
    index_fields: Vec<Field>,
    config: &KernelConfig
) -> CompileResult<KernelFunction> {
    let debug_env = DebugEnv::new(config);
    if index_fields.is_empty() {
        return stencil_compile_error!("An indexed kernel needs at least one index field");
    }
    if let Some(f) = index_fields.iter().find(|f| f.field_type != FieldType::Indexed) {
        return stencil_compile_error!("Field {0} is not an index field", f.name);
    }

    let coordinate_names = config.coordinate_names.iter()
        .map(|s| Name::new(s.clone()))
        .collect::<BTreeSet<Name>>();
    let typed = typing::type_assignments(assignments, config, coordinate_names)?;
    debug_env.print("Typed assignments", &typed.nodes);
    let spatial_dims = typed.spatial_fields().first().map(|f| f.spatial_dims).unwrap_or(0);
    let coords = coordinate_symbols(&index_fields, &config.coordinate_names, spatial_dims)?;

    let list = &index_fields[0];
    let mut body = coords.iter()
        .map(|c| {
            let label = c.get_symbol().map(|id| id.get_str().as_str()).unwrap_or("");
            Ok(Node::declare(c.clone(), list.member(label)?, true))
        })
        .collect::<CompileResult<Vec<Node>>>()?;
    body.extend(typed.nodes.clone());

    let mut read_only = read_only_fields(&typed);
    read_only.extend(index_fields.iter().map(|f| f.name.clone()));
    let resolver = Resolver::fixed_coordinates(coords, read_only);
    let (body, _) = resolver.resolve(body);

    let mut typed = typed;
    for f in index_fields.iter() {
        if !typed.fields.iter().any(|g| g.name == f.name) {
            typed.fields.push(f.clone());
        }
    }

    let bounds = loop_bounds(&[list.shape[0].clone()], &[(0, 0)], &None)?;
    match config.target {
        Target::Cpu => {
            let body = build_loop_nest(body, &[0], &bounds, vec![]);
            let kernel = make_kernel(body, &typed, config, vec![], None)?;
            debug_env.print("Indexed loop", &kernel);
            finalize_cpu_kernel(kernel, config, &debug_env)
        },
        Target::Gpu => {
            let coords = gpu::map_coordinates(&config.gpu_indexing, &[0], &bounds)?;
            let mut nodes = coords.decls;
            nodes.push(Node::Conditional {cond: coords.guard, thn: body, els: None});
            let kernel = make_kernel(nodes, &typed, config, vec![], Some(coords.info))?;
            debug_env.print("Indexed GPU kernel", &kernel);
            Ok(kernel)
        }
    }
}
