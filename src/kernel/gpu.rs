use super::iteration::LoopBounds;
use crate::expr::ast::*;
use crate::expr::constant_fold::fold_expr;
use crate::expr::types::{retype, Type};
use crate::ir::ast::*;
use crate::ir::loops::loop_counter_name;
use crate::option::GpuIndexing;
use crate::stencil_compile_error;
use crate::utils::ast::{BinOp, ElemSize};
use crate::utils::err::*;

// The declarations of the cell coordinates of a GPU thread, the condition under which the thread
// is within the iteration space and the indexing description used to compute launch parameters.
pub struct GpuCoordinates {
    pub decls: Vec<Node>,
    pub guard: Expr,
    pub info: GpuIndexingInfo,
}

fn thread_coordinate(offset: Expr, bounds: &LoopBounds) -> Expr {
    let e = match bounds.range.step {
        1 => bounds.start.clone() + offset,
        step => bounds.start.clone() + offset * Expr::index(step)
    };
    fold_expr(retype(e))
}

fn block_offset(dim: Dim) -> Expr {
    Expr::gpu_index(GpuIndexKind::BlockIdx, dim) * Expr::gpu_index(GpuIndexKind::BlockDim, dim) +
        Expr::gpu_index(GpuIndexKind::ThreadIdx, dim)
}

fn declare_counter(coord: usize, value: Expr) -> Node {
    let id = loop_counter_name(coord);
    Node::declare(Expr::Symbol {id, ty: Type::scalar(ElemSize::I64)}, value, true)
}

fn guard_condition(bounds: &[LoopBounds]) -> Expr {
    let conds = bounds.iter().enumerate()
        .map(|(coord, b)| {
            let ctr = Expr::Symbol {id: loop_counter_name(coord), ty: Type::scalar(ElemSize::I64)};
            Expr::binop(ctr, BinOp::Lt, b.stop.clone())
        })
        .reduce(|l, r| Expr::binop(l, BinOp::And, r))
        .unwrap_or_else(|| Expr::boolean(true));
    retype(conds)
}

// Maps the spatial coordinates, given from the slowest to the fastest by `order`, to the thread
// and block indices of a GPU launch. The fastest coordinate is always mapped to the x-dimension so
// that consecutive threads access consecutive elements.
pub fn map_coordinates(
    indexing: &GpuIndexing,
    order: &[usize],
    bounds: &[LoopBounds]
) -> CompileResult<GpuCoordinates> {
    let n = order.len();
    let mut dims = vec![Dim::X; n];
    let mut decls = vec![];
    let mapping = match indexing {
        GpuIndexing::Block {block_size} => {
            if n > 3 {
                return stencil_compile_error!(
                    "Block indexing supports at most 3 spatial dimensions, found {n}"
                );
            }
            let mut sz = Dim3::default();
            for (i, coord) in order.iter().rev().enumerate() {
                let dim = Dim::from_index(i).unwrap_or(Dim::Z);
                dims[*coord] = dim;
                sz = sz.with_dim(&dim, block_size[i].max(1));
            }
            for coord in 0..n {
                let value = thread_coordinate(block_offset(dims[coord]), &bounds[coord]);
                decls.push(declare_counter(coord, value));
            }
            GpuMapping::Block {block_size: sz, dims: dims.clone()}
        },
        GpuIndexing::Line => {
            if n > 4 {
                return stencil_compile_error!(
                    "Line indexing supports at most 4 spatial dimensions, found {n}"
                );
            }
            let fastest = match order.last() {
                Some(c) => *c,
                None => return stencil_compile_error!("Cannot map a kernel without coordinates")
            };
            for (i, coord) in order.iter().rev().skip(1).enumerate() {
                dims[*coord] = Dim::from_index(i).unwrap_or(Dim::Z);
            }
            for coord in 0..n {
                let offset = if coord == fastest {
                    Expr::gpu_index(GpuIndexKind::ThreadIdx, Dim::X)
                } else {
                    Expr::gpu_index(GpuIndexKind::BlockIdx, dims[coord])
                };
                decls.push(declare_counter(coord, thread_coordinate(offset, &bounds[coord])));
            }
            GpuMapping::Line {fastest, dims}
        }
    };
    let info = GpuIndexingInfo {
        mapping,
        ranges: bounds.iter().map(|b| b.range.clone()).collect()
    };
    Ok(GpuCoordinates {decls, guard: guard_condition(bounds), info})
}

fn ceil_div(n: i64, d: i64) -> i64 {
    (n + d - 1) / d
}

// The launch configuration of a GPU kernel for arrays with the given spatial shape.
pub fn call_parameters(kernel: &KernelFunction, shape: &[i64]) -> CompileResult<LaunchArgs> {
    let info = match &kernel.gpu_indexing {
        Some(info) => info,
        None => return stencil_compile_error!("Kernel {0} is not a GPU kernel", kernel.name)
    };
    if shape.len() != info.ranges.len() {
        return stencil_compile_error!(
            "Kernel {0} iterates over {1} dimensions, but the given shape has {2}",
            kernel.name, info.ranges.len(), shape.len()
        );
    }
    let extents = info.ranges.iter().zip(shape.iter())
        .map(|(r, n)| r.num_iterations(*n))
        .collect::<Vec<i64>>();
    let args = match &info.mapping {
        GpuMapping::Block {block_size, dims} => {
            dims.iter().zip(extents.iter())
                .fold(LaunchArgs::default(), |args, (dim, n)| {
                    let threads = block_size.get_dim(dim);
                    args.with_threads_dim(dim, threads)
                        .with_blocks_dim(dim, ceil_div(*n, threads))
                })
        },
        GpuMapping::Line {fastest, dims} => {
            dims.iter().zip(extents.iter()).enumerate()
                .fold(LaunchArgs::default(), |args, (coord, (dim, n))| {
                    if coord == *fastest {
                        args.with_threads_dim(&Dim::X, *n)
                    } else {
                        args.with_blocks_dim(dim, *n)
                    }
                })
        }
    };
    Ok(args)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::kernel::iteration::loop_bounds;
    use crate::expr::ast_builder::*;
    use crate::utils::pprint::PrettyPrint;

    fn kernel_with(info: GpuIndexingInfo) -> KernelFunction {
        KernelFunction {
            name: "k".to_string(), params: vec![], body: vec![],
            target: crate::option::Target::Gpu, fields_accessed: vec![], ghost_layers: vec![],
            instruction_set: None, gpu_indexing: Some(info)
        }
    }

    #[test]
    fn block_indexing_maps_fastest_to_x() {
        let bounds = loop_bounds(&[int(10), int(20)], &[(1, 1), (1, 1)], &None).unwrap();
        let idx = GpuIndexing::Block {block_size: [128, 2, 1]};
        let c = map_coordinates(&idx, &[0, 1], &bounds).unwrap();
        match &c.decls[1] {
            Node::Assignment {rhs, ..} => {
                assert_eq!(rhs.pprint_default(), "1 + (blockIdx.x * blockDim.x + threadIdx.x)");
            },
            n => panic!("unexpected node {n:?}")
        }
        assert_eq!(c.guard.pprint_default(), "ctr_0 < 9 && ctr_1 < 19");
        assert_eq!(
            c.info.mapping,
            GpuMapping::Block {block_size: Dim3 {x: 128, y: 2, z: 1}, dims: vec![Dim::Y, Dim::X]}
        );
    }

    #[test]
    fn block_launch_parameters() {
        let bounds = loop_bounds(&[int(10), int(300)], &[(1, 1), (1, 1)], &None).unwrap();
        let idx = GpuIndexing::Block {block_size: [128, 1, 1]};
        let c = map_coordinates(&idx, &[0, 1], &bounds).unwrap();
        let args = call_parameters(&kernel_with(c.info), &[10, 300]).unwrap();
        assert_eq!(args.threads, Dim3 {x: 128, y: 1, z: 1});
        assert_eq!(args.blocks, Dim3 {x: 3, y: 8, z: 1});
    }

    #[test]
    fn line_launch_parameters() {
        let bounds = loop_bounds(&[int(10), int(300)], &[(0, 0), (0, 0)], &None).unwrap();
        let c = map_coordinates(&GpuIndexing::Line, &[0, 1], &bounds).unwrap();
        let args = call_parameters(&kernel_with(c.info), &[10, 300]).unwrap();
        assert_eq!(args.threads, Dim3 {x: 300, y: 1, z: 1});
        assert_eq!(args.blocks, Dim3 {x: 10, y: 1, z: 1});
    }

    #[test]
    fn too_many_dimensions() {
        let bounds = loop_bounds(&vec![int(4); 4], &[(0, 0); 4], &None).unwrap();
        let idx = GpuIndexing::default();
        assert!(map_coordinates(&idx, &[0, 1, 2, 3], &bounds).is_err());
        assert!(map_coordinates(&GpuIndexing::Line, &[0, 1, 2, 3], &bounds).is_ok());
    }

    #[test]
    fn shape_mismatch_fails() {
        let bounds = loop_bounds(&[int(4)], &[(0, 0)], &None).unwrap();
        let c = map_coordinates(&GpuIndexing::default(), &[0], &bounds).unwrap();
        assert!(call_parameters(&kernel_with(c.info), &[4, 4]).is_err());
    }
}
