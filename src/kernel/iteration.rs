use crate::expr::ast::Expr;
use crate::expr::constant_fold::fold_expr;
use crate::expr::types::retype;
use crate::field::{Field, FieldAccess};
use crate::ir::ast::*;
use crate::ir::loops::loop_counter_name;
use crate::option::{GhostLayers, SliceSpec};
use crate::stencil_compile_error;
use crate::utils::err::*;

use std::collections::BTreeSet;

// The number of ghost layers at the (lower, upper) end of each spatial dimension. Fields declared
// with ghost layers are never iterated closer to their border than that.
pub fn infer_ghost_layers(accesses: &[FieldAccess], spatial_dims: usize) -> Vec<(i64, i64)> {
    (0..spatial_dims)
        .map(|d| {
            let n = accesses.iter()
                .map(|a| a.required_ghost_layers(d))
                .max()
                .unwrap_or(0);
            (n, n)
        })
        .collect()
}

pub fn resolve_ghost_layers(
    requested: &GhostLayers,
    accesses: &[FieldAccess],
    spatial_dims: usize
) -> CompileResult<Vec<(i64, i64)>> {
    let gls = match requested {
        GhostLayers::Auto => infer_ghost_layers(accesses, spatial_dims),
        GhostLayers::Uniform(n) => vec![(*n, *n); spatial_dims],
        GhostLayers::PerDim(v) => {
            if v.len() != spatial_dims {
                return stencil_compile_error!(
                    "Ghost layers given for {0} dimensions, but the kernel iterates over {1}",
                    v.len(), spatial_dims
                );
            }
            v.clone()
        }
    };
    if gls.iter().any(|(l, u)| *l < 0 || *u < 0) {
        return stencil_compile_error!("Ghost layer counts must be non-negative, found {gls:?}");
    }
    Ok(gls)
}

// The spatial shape of the iteration space. Fields with a fixed shape must agree on it and take
// precedence over fields with a symbolic shape, of which the first by name is used.
pub fn common_shape(fields: &[&Field]) -> CompileResult<Vec<Expr>> {
    let spatial_shape = |f: &Field| f.shape[..f.spatial_dims].to_vec();
    let fixed = fields.iter()
        .filter(|f| f.has_fixed_shape())
        .map(|f| spatial_shape(f))
        .collect::<Vec<Vec<Expr>>>();
    if let Some(first) = fixed.first() {
        if fixed.iter().any(|s| s != first) {
            let names = fields.iter()
                .filter(|f| f.has_fixed_shape())
                .map(|f| f.name.clone())
                .collect::<Vec<String>>()
                .join(", ");
            return stencil_compile_error!("Fields {names} have different fixed shapes");
        }
        return Ok(first.clone());
    }
    let mut generic = fields.to_vec();
    generic.sort_by(|l, r| l.name.cmp(&r.name));
    match generic.first() {
        Some(f) => Ok(spatial_shape(f)),
        None => stencil_compile_error!("Cannot create a kernel that accesses no fields")
    }
}

// The order of the loops from the outermost to the innermost, which iterates over the fastest
// varying coordinate of all fields.
pub fn loop_order(fields: &[&Field]) -> CompileResult<Vec<usize>> {
    let layouts = fields.iter()
        .map(|f| f.spatial_layout())
        .collect::<BTreeSet<Vec<usize>>>();
    if layouts.len() > 1 {
        let desc = fields.iter()
            .map(|f| format!("{0}: {1:?}", f.name, f.spatial_layout()))
            .collect::<Vec<String>>()
            .join(", ");
        return stencil_compile_error!("Fields have different memory layouts: {desc}");
    }
    match layouts.into_iter().next() {
        Some(l) => Ok(l),
        None => stencil_compile_error!("Cannot create a kernel that accesses no fields")
    }
}

fn shape_offset(shape: &Expr, n: i64) -> Expr {
    let e = if n < 0 {
        shape.clone() - Expr::index(-n)
    } else {
        shape.clone() + Expr::index(n)
    };
    fold_expr(retype(e))
}

fn slice_bound(bound: i64, shape: &Expr) -> (Expr, Bound) {
    if bound < 0 {
        (shape_offset(shape, bound), Bound::FromEnd(-bound))
    } else {
        (Expr::index(bound), Bound::FromStart(bound))
    }
}

// The bounds of the loop over one spatial dimension, both as expressions and as a description
// relative to the array extent.
pub struct LoopBounds {
    pub start: Expr,
    pub stop: Expr,
    pub step: Expr,
    pub range: IterationRange,
}

pub fn loop_bounds(
    shape: &[Expr],
    ghost_layers: &[(i64, i64)],
    slice: &Option<Vec<SliceSpec>>
) -> CompileResult<Vec<LoopBounds>> {
    match slice {
        Some(slices) => {
            if slices.len() != shape.len() {
                return stencil_compile_error!(
                    "Iteration slice given for {0} dimensions, but the fields have {1}",
                    slices.len(), shape.len()
                );
            }
            slices.iter().zip(shape.iter())
                .map(|(s, sh)| {
                    if s.step <= 0 {
                        return stencil_compile_error!(
                            "Iteration slice step must be positive, found {0}", s.step
                        );
                    }
                    let (start, start_bound) = slice_bound(s.start, sh);
                    let (stop, stop_bound) = match s.stop {
                        Some(n) => slice_bound(n, sh),
                        None => (sh.clone(), Bound::FromEnd(0))
                    };
                    let range = IterationRange {
                        start: start_bound, stop: stop_bound, step: s.step
                    };
                    Ok(LoopBounds {start, stop, step: Expr::index(s.step), range})
                })
                .collect()
        },
        None => {
            Ok(ghost_layers.iter().zip(shape.iter())
                .map(|((lo, hi), sh)| {
                    let range = IterationRange {
                        start: Bound::FromStart(*lo), stop: Bound::FromEnd(*hi), step: 1
                    };
                    LoopBounds {
                        start: Expr::index(*lo),
                        stop: shape_offset(sh, -hi),
                        step: Expr::index(1),
                        range
                    }
                })
                .collect())
        }
    }
}

// Wraps a body in one loop per spatial coordinate, in the given order from the outermost loop to
// the innermost one. The nodes in `prefixes[k]` are placed at the start of the body of the loop at
// nesting level `k`.
pub fn build_loop_nest(
    body: Vec<Node>,
    order: &[usize],
    bounds: &[LoopBounds],
    mut prefixes: Vec<Vec<Node>>
) -> Vec<Node> {
    prefixes.resize(order.len(), vec![]);
    order.iter().zip(prefixes.into_iter()).rev().fold(body, |body, (coord, prefix)| {
        let b = &bounds[*coord];
        let body = prefix.into_iter().chain(body.into_iter()).collect::<Vec<Node>>();
        vec![Node::Loop {
            counter: loop_counter_name(*coord),
            coord: *coord,
            start: b.start.clone(),
            stop: b.stop.clone(),
            step: b.step.clone(),
            body,
            prefix_lines: vec![],
        }]
    })
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::expr::ast_builder::*;
    use crate::field::layout::Layout;
    use crate::utils::ast::ElemSize;

    #[test]
    fn ghost_layers_per_dimension() {
        let f = field2d("f", ElemSize::F64);
        let accesses = vec![
            f.access(vec![2, 0], vec![]).unwrap(),
            f.access(vec![0, -1], vec![]).unwrap(),
        ];
        assert_eq!(infer_ghost_layers(&accesses, 2), vec![(2, 2), (1, 1)]);
    }

    #[test]
    fn declared_ghost_layers_are_a_minimum() {
        let f = field2d("f", ElemSize::F64).with_ghost_layers(2);
        let accesses = vec![
            f.access(vec![0, 0], vec![]).unwrap(),
            f.access(vec![0, 3], vec![]).unwrap(),
        ];
        assert_eq!(infer_ghost_layers(&accesses, 2), vec![(2, 2), (3, 3)]);
    }

    #[test]
    fn ghost_layers_monotonic() {
        let f = field2d("f", ElemSize::F64);
        let mut accesses = vec![];
        let mut prev = vec![(0, 0); 2];
        for r in 0..4 {
            accesses.push(f.access(vec![r, -r], vec![]).unwrap());
            let gl = infer_ghost_layers(&accesses, 2);
            assert!(gl.iter().zip(prev.iter()).all(|(a, b)| a.0 >= b.0 && a.1 >= b.1));
            assert_eq!(gl, vec![(r, r), (r, r)]);
            prev = gl;
        }
    }

    #[test]
    fn explicit_ghost_layers() {
        let gl = resolve_ghost_layers(&GhostLayers::PerDim(vec![(1, 2)]), &[], 1).unwrap();
        assert_eq!(gl, vec![(1, 2)]);
        assert!(resolve_ghost_layers(&GhostLayers::PerDim(vec![(1, 2)]), &[], 2).is_err());
        assert!(resolve_ghost_layers(&GhostLayers::Uniform(-1), &[], 2).is_err());
    }

    #[test]
    fn fixed_shape_takes_precedence() {
        let a = field2d("a", ElemSize::F64);
        let b = fixed_field("b", vec![10, 20], ElemSize::F64);
        assert_eq!(common_shape(&[&a, &b]).unwrap(), vec![int(10), int(20)]);
        let c = fixed_field("c", vec![10, 21], ElemSize::F64);
        assert!(common_shape(&[&b, &c]).is_err());
    }

    #[test]
    fn symbolic_shape_of_first_field() {
        let a = field2d("a", ElemSize::F64);
        let b = field2d("b", ElemSize::F64);
        let shape = common_shape(&[&b, &a]).unwrap();
        assert_eq!(shape[0], Expr::size_symbol("_size_a_0".to_string()));
    }

    #[test]
    fn loop_order_follows_layout() {
        let ty = scalar(ElemSize::F64);
        let f = Field::create_generic("f", 3, ty.clone(), vec![], Layout::Reverse).unwrap();
        assert_eq!(loop_order(&[&f]).unwrap(), vec![2, 1, 0]);
        let g = Field::create_generic("g", 3, ty, vec![], Layout::Numpy).unwrap();
        assert!(loop_order(&[&f, &g]).is_err());
    }

    #[test]
    fn bounds_from_ghost_layers() {
        let bounds = loop_bounds(&[int(10)], &[(1, 2)], &None).unwrap();
        assert_eq!(bounds[0].start, int(1));
        assert_eq!(bounds[0].stop, int(8));
        assert_eq!(bounds[0].range.num_iterations(10), 7);
    }

    #[test]
    fn bounds_from_slice() {
        let slice = Some(vec![SliceSpec::new(2, Some(-1), 3)]);
        let bounds = loop_bounds(&[int(12)], &[(0, 0)], &slice).unwrap();
        assert_eq!(bounds[0].start, int(2));
        assert_eq!(bounds[0].stop, int(11));
        assert_eq!(bounds[0].step, int(3));
        assert_eq!(bounds[0].range.num_iterations(12), 3);
        let bad = Some(vec![SliceSpec::new(0, None, 0)]);
        assert!(loop_bounds(&[int(12)], &[(0, 0)], &bad).is_err());
    }

    #[test]
    fn nest_order() {
        let bounds = loop_bounds(&[int(4), int(5)], &[(0, 0), (0, 0)], &None).unwrap();
        let decl = Node::declare(typed_sym("p", ElemSize::I64), int(0), false);
        let nest = build_loop_nest(vec![], &[0, 1], &bounds, vec![vec![decl.clone()]]);
        match &nest[0] {
            Node::Loop {coord: 0, body, ..} => {
                assert_eq!(body[0], decl);
                assert!(matches!(&body[1], Node::Loop {coord: 1, ..}));
            },
            n => panic!("unexpected node {n:?}")
        }
    }
}
