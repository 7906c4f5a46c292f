pub mod instruction_sets;

use crate::expr::ast::*;
use crate::expr::constant_fold::fold_expr;
use crate::expr::subs::{contains, substitute};
use crate::expr::types::*;
use crate::field::{Field, FieldType};
use crate::ir::ast::*;
use crate::ir::loops::{all_loops, map_innermost_loops};
use crate::kernel::params::kernel_parameters;
use crate::option::{Target, VectorizeOptions};
use crate::stencil_vectorize_error;
use crate::utils::ast::{BinOp, ElemSize, UnOp};
use crate::utils::err::*;
use crate::utils::name::Name;
use crate::utils::smap::*;
use instruction_sets::*;

use std::collections::{BTreeMap, BTreeSet};

struct VectorizeEnv<'a> {
    width: usize,
    elem: ElemSize,
    opts: &'a VectorizeOptions,
    counters: BTreeSet<Name>,
}

fn map_node_exprs(node: Node, f: &impl Fn(Expr) -> Expr) -> Node {
    let node = <Node as SMapAccum<Expr>>::smap(node, |e| f(e));
    <Node as SMapAccum<Node>>::smap(node, |n| map_node_exprs(n, f))
}

fn fold_node_exprs<A>(acc: A, node: &Node, f: &impl Fn(A, &Expr) -> A) -> A {
    let acc = <Node as SFold<Expr>>::sfold(node, acc, |acc, e| f(acc, e));
    <Node as SFold<Node>>::sfold(node, acc, |acc, n| fold_node_exprs(acc, n, f))
}

// The element type shared by all floating-point fields of a kernel.
fn common_float_type(fields: &[Field]) -> CompileResult<ElemSize> {
    let sizes = fields.iter()
        .filter_map(|f| f.dtype.get_scalar_elem_size())
        .filter(|sz| sz.is_floating_point())
        .cloned()
        .collect::<BTreeSet<ElemSize>>();
    if sizes.len() != 1 {
        let names = fields.iter()
            .map(|f| format!("{0}: {1}", f.name, f.dtype))
            .collect::<Vec<String>>()
            .join(", ");
        return stencil_vectorize_error!(
            "Cannot vectorize kernels that access fields of different (or no) floating-point \
             types: {names}"
        );
    }
    match sizes.into_iter().next() {
        Some(sz) => Ok(sz),
        None => stencil_vectorize_error!("Cannot vectorize a kernel without floating-point fields")
    }
}

// Replaces the stride of the fastest spatial dimension of every field by one. The caller
// guarantees that the fields passed to the kernel are contiguous in that dimension.
fn replace_inner_stride_with_one(body: Vec<Node>, fields: &[Field]) -> Vec<Node> {
    let map = fields.iter()
        .filter(|f| f.field_type == FieldType::Generic)
        .filter_map(|f| {
            let d = *f.spatial_layout().last()?;
            match &f.strides[d] {
                Expr::Symbol {id, ..} => Some((id.clone(), Expr::index(1))),
                _ => None
            }
        })
        .collect::<BTreeMap<Name, Expr>>();
    body.into_iter()
        .map(|n| map_node_exprs(n, &|e| fold_expr(retype(substitute(e, &map)))))
        .collect()
}

fn uses_symbol(e: &Expr, id: &Name) -> bool {
    contains(e, &|e| e.get_symbol() == Some(id))
}

// Splits an index into the loop counter and the remaining terms, if the counter only appears as
// an additive term with coefficient one.
fn remove_counter(e: &Expr, ctr: &Name) -> Option<Expr> {
    match e {
        Expr::Symbol {id, ..} if id == ctr => Some(Expr::index(0)),
        Expr::BinOp {lhs, op: BinOp::Add, rhs, ..} => {
            if !uses_symbol(rhs, ctr) {
                remove_counter(lhs, ctr).map(|r| r + *rhs.clone())
            } else if !uses_symbol(lhs, ctr) {
                remove_counter(rhs, ctr).map(|r| *lhs.clone() + r)
            } else {
                None
            }
        },
        Expr::BinOp {lhs, op: BinOp::Sub, rhs, ..} if !uses_symbol(rhs, ctr) => {
            remove_counter(lhs, ctr).map(|r| r - *rhs.clone())
        },
        Expr::BinOp {lhs, op: BinOp::Mul, rhs, ..} => match (lhs.as_ref(), rhs.as_ref()) {
            (Expr::Int {v: 1, ..}, e) | (e, Expr::Int {v: 1, ..}) => remove_counter(e, ctr),
            _ => None
        },
        _ => None
    }
}

// Determines whether the loop counter is read as a value, rather than only as part of the index
// of a memory access.
fn reads_counter_value(e: &Expr, ctr: &Name) -> bool {
    match e {
        Expr::ResolvedAccess {..} | Expr::VectorAccess {..} => false,
        Expr::Symbol {id, ..} => id == ctr,
        _ => e.sfold(false, |acc, e| acc || reads_counter_value(e, ctr))
    }
}

fn collect_accesses(mut acc: Vec<Expr>, e: &Expr) -> Vec<Expr> {
    match e {
        Expr::ResolvedAccess {..} => {
            acc.push(e.clone());
            acc
        },
        _ => e.sfold(acc, collect_accesses)
    }
}

impl<'a> VectorizeEnv<'a> {
    fn vector_type(&self, ty: &Type) -> Type {
        ty.to_vector(self.width)
    }

    // Decides how an access in the loop over `ctr` is loaded or stored. Returns None if the
    // access does not use the counter and stays scalar, and an error message if the loop cannot
    // be vectorized.
    fn classify_access(&self, e: &Expr, ctr: &Name) -> Result<Option<(bool, bool)>, String> {
        if let Expr::ResolvedAccess {index, field, ty, ..} = e {
            if !uses_symbol(index, ctr) {
                return Ok(None);
            }
            let rest = match remove_counter(index, ctr) {
                Some(rest) => rest,
                None => {
                    return Err("Could not vectorize loop because of non-consecutive memory access".to_string());
                }
            };
            if ty.get_scalar_elem_size() != Some(&self.elem) {
                return Err(format!(
                    "Could not vectorize loop because field {field} has element type {ty}"
                ));
            }
            let zeros = self.counters.iter()
                .map(|c| (c.clone(), Expr::index(0)))
                .collect::<BTreeMap<Name, Expr>>();
            let shift = fold_expr(retype(substitute(rest, &zeros)));
            let aligned = self.opts.assume_aligned && matches!(shift, Expr::Int {v: 0, ..});
            let nontemporal = self.opts.nontemporal.applies_to(field);
            Ok(Some((aligned, nontemporal)))
        } else {
            Ok(None)
        }
    }

    fn vectorize_accesses(&self, e: Expr, ctr: &Name) -> Expr {
        match self.classify_access(&e, ctr) {
            Ok(Some((aligned, nontemporal))) => {
                let ty = self.vector_type(e.get_type());
                Expr::VectorAccess {access: Box::new(e), aligned, nontemporal, ty}
            },
            _ => e.smap(|e| self.vectorize_accesses(e, ctr))
        }
    }

    fn split_loop(&self, loop_node: Node) -> (Node, Option<Node>) {
        match loop_node {
            Node::Loop {counter, coord, start, stop, step, body, prefix_lines} => {
                let w = Expr::index(self.width as i64);
                let range = stop.clone() - start.clone();
                if self.opts.assume_sufficient_line_padding {
                    let padded = (range + w.clone() - Expr::index(1)) / w.clone() * w;
                    let new_stop = fold_expr(retype(start.clone() + padded));
                    let main = Node::Loop {
                        counter, coord, start, stop: new_stop, step, body, prefix_lines
                    };
                    (main, None)
                } else {
                    let cut = fold_expr(retype(start.clone() + range / w.clone() * w));
                    if cut == stop {
                        let main = Node::Loop {counter, coord, start, stop, step, body, prefix_lines};
                        return (main, None);
                    }
                    // The remainder loop shares the work-sharing prefix of the main loop, so that
                    // each of its iterations runs on exactly one thread.
                    let tail = Node::Loop {
                        counter: counter.clone(), coord, start: cut.clone(), stop,
                        step: step.clone(), body: body.clone(),
                        prefix_lines: prefix_lines.clone()
                    };
                    let main = Node::Loop {
                        counter, coord, start, stop: cut, step, body, prefix_lines
                    };
                    (main, Some(tail))
                }
            },
            n => (n, None)
        }
    }

    fn vectorize_loop(&self, loop_node: Node) -> CompileResult<Vec<Node>> {
        let (ctr, start, step) = match &loop_node {
            Node::Loop {counter, start, step, ..} => (counter.clone(), start.clone(), step.clone()),
            _ => return Ok(vec![loop_node])
        };
        if !matches!(step, Expr::Int {v: 1, ..}) {
            tracing::warn!("Could not vectorize loop over {ctr} with step {step:?}");
            return Ok(vec![loop_node]);
        }

        let reads_counter = <Node as SFold<Node>>::sfold(&loop_node, false, |acc, n| {
            let f = |acc: bool, e: &Expr| acc || reads_counter_value(e, &ctr);
            acc || fold_node_exprs(false, n, &f)
        });
        if reads_counter {
            tracing::warn!("Could not vectorize loop because its counter {ctr} is used as a value");
            return Ok(vec![loop_node]);
        }

        let accesses = fold_node_exprs(vec![], &loop_node, &collect_accesses);
        for a in accesses.iter() {
            if let Err(msg) = self.classify_access(a, &ctr) {
                tracing::warn!("{msg}");
                return Ok(vec![loop_node]);
            }
        }

        let (main, tail) = self.split_loop(loop_node);
        let main = match main {
            Node::Loop {counter, coord, stop, body, prefix_lines, ..} => {
                if let (Expr::Int {v: s, ..}, Expr::Int {v: e, ..}) = (&start, &stop) {
                    if s >= e {
                        return Ok(tail.into_iter().collect());
                    }
                }
                let body = body.into_iter()
                    .map(|n| map_node_exprs(n, &|e| self.vectorize_accesses(e, &counter)))
                    .collect::<Vec<Node>>();
                let (_, body) = self.insert_casts_in_nodes(body, BTreeMap::new())?;
                let step = Expr::index(self.width as i64);
                Node::Loop {counter, coord, start, stop, step, body, prefix_lines}
            },
            n => n
        };
        Ok(vec![Some(main), tail].into_iter().flatten().collect())
    }

    fn cast_to(&self, e: Expr, target: &Type) -> Expr {
        if e.get_type() == target {
            e
        } else {
            Expr::cast(e, target.clone())
        }
    }

    // The vector type scalar operands are broadcast to when at least one operand is a vector.
    fn vector_target(&self, args: &[&Expr]) -> Option<Type> {
        if args.iter().any(|a| a.get_type().is_vector()) {
            let target = collate_types(args.iter().map(|a| a.get_type()));
            Some(self.vector_type(&target))
        } else {
            None
        }
    }

    fn insert_casts(&self, e: Expr) -> Expr {
        match e {
            Expr::Cast {..} | Expr::VectorAccess {..} => e,
            Expr::BinOp {lhs, op: BinOp::Pow, rhs, ty} => {
                let lhs = self.insert_casts(*lhs);
                retype_node(Expr::BinOp {lhs: Box::new(lhs), op: BinOp::Pow, rhs, ty})
            },
            Expr::BinOp {lhs, op, rhs, ty} if VecOp::from_binop(&op).is_some() => {
                let lhs = self.insert_casts(*lhs);
                let rhs = self.insert_casts(*rhs);
                let (lhs, rhs) = match self.vector_target(&[&lhs, &rhs]) {
                    Some(target) => (self.cast_to(lhs, &target), self.cast_to(rhs, &target)),
                    None => (lhs, rhs)
                };
                retype_node(Expr::BinOp {lhs: Box::new(lhs), op, rhs: Box::new(rhs), ty})
            },
            Expr::UnOp {op, arg, ty} if op != UnOp::BitNeg => {
                let arg = self.insert_casts(*arg);
                retype_node(Expr::UnOp {op, arg: Box::new(arg), ty})
            },
            Expr::Call {func, args, ty} => {
                let args = args.into_iter()
                    .map(|a| self.insert_casts(a))
                    .collect::<Vec<Expr>>();
                let refs = args.iter().collect::<Vec<&Expr>>();
                match self.vector_target(&refs) {
                    Some(target) => {
                        let args = args.into_iter().map(|a| self.cast_to(a, &target)).collect();
                        Expr::Call {func, args, ty: self.vector_type(&ty)}
                    },
                    None => Expr::Call {func, args, ty}
                }
            },
            Expr::Piecewise {branches, ty} => {
                let (values, conds): (Vec<Expr>, Vec<Expr>) = branches.into_iter()
                    .map(|(v, c)| (self.insert_casts(v), self.insert_casts(c)))
                    .unzip();
                let mut value_ty = collate_types(values.iter().map(|v| v.get_type()));
                if value_ty.is_unknown() {
                    value_ty = ty;
                }
                let mut cond_ty = collate_types(conds.iter()
                    .filter(|c| !c.is_true_literal())
                    .map(|c| c.get_type()));
                if cond_ty.is_unknown() {
                    cond_ty = Type::boolean();
                }
                if cond_ty.is_vector() && !value_ty.is_vector() {
                    value_ty = self.vector_type(&value_ty);
                }
                if value_ty.is_vector() && !cond_ty.is_vector() {
                    cond_ty = self.vector_type(&cond_ty);
                }
                let branches = values.into_iter().zip(conds.into_iter())
                    .map(|(v, c)| {
                        let c = if c.is_true_literal() { c } else { self.cast_to(c, &cond_ty) };
                        (self.cast_to(v, &value_ty), c)
                    })
                    .collect();
                Expr::Piecewise {branches, ty: value_ty}
            },
            _ => e
        }
    }

    fn substitute_promoted(&self, e: Expr, promoted: &BTreeMap<Name, Expr>) -> Expr {
        match e {
            Expr::ResolvedAccess {..} | Expr::VectorAccess {..} => e,
            Expr::Symbol {id, ty} => match promoted.get(&id) {
                Some(r) => r.clone(),
                None => Expr::Symbol {id, ty}
            },
            _ => e.smap(|e| self.substitute_promoted(e, promoted))
        }
    }

    // Inserts broadcasts where scalar values meet vector values. A symbol assigned a vector value
    // becomes a vector symbol for the remainder of its scope.
    fn insert_casts_in_nodes(
        &self,
        nodes: Vec<Node>,
        mut promoted: BTreeMap<Name, Expr>
    ) -> CompileResult<(BTreeMap<Name, Expr>, Vec<Node>)> {
        let mut acc = vec![];
        for node in nodes {
            let node = match node {
                Node::Assignment {lhs, rhs, is_decl, is_const} => {
                    let rhs = self.insert_casts(self.substitute_promoted(rhs, &promoted));
                    let rhs_ty = rhs.get_type().clone();
                    match lhs {
                        Expr::Symbol {id, ty} if rhs_ty.is_vector() && !ty.is_vector() => {
                            let ty = self.vector_type(&ty);
                            let lhs = Expr::Symbol {id: id.clone(), ty};
                            promoted.insert(id, lhs.clone());
                            Node::Assignment {lhs, rhs, is_decl, is_const}
                        },
                        Expr::Symbol {id, ty} => {
                            let lhs = self.substitute_promoted(Expr::Symbol {id, ty}, &promoted);
                            Node::Assignment {lhs, rhs, is_decl, is_const}
                        },
                        Expr::VectorAccess {..} => {
                            let target = lhs.get_type().clone();
                            let rhs = self.cast_to(rhs, &target);
                            Node::Assignment {lhs, rhs, is_decl, is_const}
                        },
                        lhs => {
                            if rhs_ty.is_vector() {
                                return stencil_vectorize_error!(
                                    "Cannot store a vector value in the scalar location {lhs:?}"
                                );
                            }
                            Node::Assignment {lhs, rhs, is_decl, is_const}
                        }
                    }
                },
                Node::Conditional {cond, thn, els} => {
                    let cond = self.insert_casts(self.substitute_promoted(cond, &promoted));
                    let (_, thn) = self.insert_casts_in_nodes(thn, promoted.clone())?;
                    let els = match els {
                        Some(els) => Some(self.insert_casts_in_nodes(els, promoted.clone())?.1),
                        None => None
                    };
                    Node::Conditional {cond, thn, els}
                },
                Node::Block {body, pragma} => {
                    let (_, body) = self.insert_casts_in_nodes(body, promoted.clone())?;
                    Node::Block {body, pragma}
                },
                Node::Loop {counter, coord, start, stop, step, body, prefix_lines} => {
                    let (_, body) = self.insert_casts_in_nodes(body, promoted.clone())?;
                    Node::Loop {counter, coord, start, stop, step, body, prefix_lines}
                },
                n => n
            };
            acc.push(node);
        }
        Ok((promoted, acc))
    }
}

// Vectorizes the innermost loops of a CPU kernel with the intrinsics of the selected instruction
// set. Loops that cannot be vectorized are left unchanged.
pub fn vectorize(kernel: KernelFunction, opts: &VectorizeOptions) -> CompileResult<KernelFunction> {
    if kernel.instruction_set.is_some() {
        return stencil_vectorize_error!("Kernel {0} has already been vectorized", kernel.name);
    }
    if kernel.target != Target::Cpu {
        return stencil_vectorize_error!("Only CPU kernels can be vectorized");
    }
    let elem = common_float_type(&kernel.fields_accessed)?;
    let is = get_instruction_set(opts.instruction_set, elem)?;

    let body = if opts.assume_inner_stride_one {
        replace_inner_stride_with_one(kernel.body, &kernel.fields_accessed)
    } else {
        kernel.body
    };
    let counters = all_loops(&body).into_iter()
        .filter_map(|l| match l {
            Node::Loop {counter, ..} => Some(counter.clone()),
            _ => None
        })
        .collect::<BTreeSet<Name>>();
    let env = VectorizeEnv {width: is.width, elem, opts, counters};
    let body = map_innermost_loops(body, &|l| env.vectorize_loop(l))?;
    let params = kernel_parameters(&body, &kernel.fields_accessed)?;
    Ok(KernelFunction {body, params, instruction_set: Some(is.clone()), ..kernel})
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::expr::ast_builder::*;
    use crate::kernel::create_kernel;
    use crate::option::{KernelConfig, Nontemporal};

    fn opts() -> VectorizeOptions {
        VectorizeOptions {assume_inner_stride_one: true, ..VectorizeOptions::default()}
    }

    fn inner_loops(k: &KernelFunction) -> Vec<Node> {
        all_loops(&k.body).into_iter()
            .filter(|l| crate::ir::loops::is_innermost_loop(l))
            .cloned()
            .collect()
    }

    fn vector_accesses(n: &Node) -> Vec<Expr> {
        fn collect(mut acc: Vec<Expr>, e: &Expr) -> Vec<Expr> {
            if let Expr::VectorAccess {..} = e {
                acc.push(e.clone());
            }
            e.sfold(acc, collect)
        }
        fold_node_exprs(vec![], n, &collect)
    }

    #[test]
    fn jacobi_main_and_tail_loop() {
        let src = field2d("src", ElemSize::F64);
        let dst = field2d("dst", ElemSize::F64);
        let k = create_kernel(jacobi(&src, &dst), &KernelConfig::default()).unwrap();
        let k = vectorize(k, &opts()).unwrap();
        assert_eq!(k.instruction_set.as_ref().map(|is| is.width), Some(4));
        let loops = inner_loops(&k);
        assert_eq!(loops.len(), 2);
        match &loops[0] {
            Node::Loop {step, ..} => assert_eq!(step, &int(4)),
            _ => panic!()
        }
        match &loops[1] {
            Node::Loop {step, ..} => assert_eq!(step, &int(1)),
            _ => panic!()
        }
        assert_eq!(vector_accesses(&loops[0]).len(), 5);
        assert!(vector_accesses(&loops[1]).is_empty());
        assert!(!k.params.iter().any(|p| p.id.get_str() == "_stride_src_1"));
    }

    #[test]
    fn divisible_fixed_range_has_no_tail() {
        let src = fixed_field("src", vec![4, 10], ElemSize::F64);
        let dst = fixed_field("dst", vec![4, 10], ElemSize::F64);
        let asgs = vec![assign(at(&dst, &[0, 0]), mul(at(&src, &[0, 0]), float(2.0)))];
        let config = KernelConfig::default().with_ghost_layers(crate::option::GhostLayers::Uniform(1));
        let k = vectorize(create_kernel(asgs, &config).unwrap(), &opts()).unwrap();
        assert_eq!(inner_loops(&k).len(), 1);
    }

    #[test]
    fn alignment_of_center_access() {
        let src = fixed_field("src", vec![4, 16], ElemSize::F64);
        let dst = fixed_field("dst", vec![4, 16], ElemSize::F64);
        let k = create_kernel(jacobi(&src, &dst), &KernelConfig::default()).unwrap();
        let o = VectorizeOptions {
            assume_aligned: true,
            nontemporal: Nontemporal::Fields(vec!["dst".to_string()]),
            ..opts()
        };
        let k = vectorize(k, &o).unwrap();
        let accesses = vector_accesses(&inner_loops(&k)[0]);
        let flags = accesses.iter()
            .map(|a| match a {
                Expr::VectorAccess {access, aligned, nontemporal, ..} => match access.as_ref() {
                    Expr::ResolvedAccess {field, ..} => (field.clone(), *aligned, *nontemporal),
                    _ => panic!()
                },
                _ => panic!()
            })
            .collect::<Vec<_>>();
        assert!(flags.contains(&("dst".to_string(), true, true)));
        assert!(flags.contains(&("src".to_string(), false, false)));
        let aligned_src = flags.iter().filter(|(f, a, _)| f == "src" && *a).count();
        assert_eq!(aligned_src, 2);
    }

    #[test]
    fn symbolic_inner_stride_stays_scalar() {
        let src = field2d("src", ElemSize::F64);
        let dst = field2d("dst", ElemSize::F64);
        let k = create_kernel(jacobi(&src, &dst), &KernelConfig::default()).unwrap();
        let o = VectorizeOptions {assume_inner_stride_one: false, ..opts()};
        let k = vectorize(k, &o).unwrap();
        let loops = inner_loops(&k);
        assert_eq!(loops.len(), 1);
        assert!(vector_accesses(&loops[0]).is_empty());
    }

    #[test]
    fn mixed_precision_fails() {
        let a = field2d("a", ElemSize::F64);
        let b = field2d("b", ElemSize::F32);
        let asgs = vec![assign(at(&a, &[0, 0]), at(&b, &[0, 0]))];
        let k = create_kernel(asgs, &KernelConfig::default()).unwrap();
        let e = vectorize(k, &opts()).unwrap_err();
        assert_eq!(e.kind(), ErrorKind::Vectorize);
    }

    #[test]
    fn vectorizing_twice_fails() {
        let src = field2d("src", ElemSize::F64);
        let dst = field2d("dst", ElemSize::F64);
        let k = create_kernel(jacobi(&src, &dst), &KernelConfig::default()).unwrap();
        let k = vectorize(k, &opts()).unwrap();
        assert!(vectorize(k, &opts()).is_err());
    }

    #[test]
    fn scalar_constant_is_broadcast() {
        let f = field2d("f", ElemSize::F32);
        let g = field2d("g", ElemSize::F32);
        let asgs = vec![
            assign(sym("t"), mul(at(&f, &[0, 0]), sym("w"))),
            assign(at(&g, &[0, 0]), add(sym("t"), float(1.0))),
        ];
        let config = KernelConfig::default().with_data_type(ElemSize::F32);
        let k = create_kernel(asgs, &config).unwrap();
        let k = vectorize(k, &opts()).unwrap();
        assert_eq!(k.instruction_set.as_ref().map(|is| is.width), Some(8));
        let main = &inner_loops(&k)[0];
        match main {
            Node::Loop {body, ..} => {
                match &body[0] {
                    Node::Assignment {lhs, rhs: Expr::BinOp {rhs, ..}, ..} => {
                        assert_eq!(lhs.get_type(), &Type::Vector {sz: ElemSize::F32, width: 8});
                        assert!(matches!(rhs.as_ref(), Expr::Cast {..}));
                    },
                    n => panic!("unexpected node {n:?}")
                }
                match &body[1] {
                    Node::Assignment {rhs: Expr::BinOp {lhs, rhs, ..}, ..} => {
                        assert!(lhs.get_type().is_vector());
                        assert!(matches!(rhs.as_ref(), Expr::Cast {..}));
                    },
                    n => panic!("unexpected node {n:?}")
                }
            },
            _ => panic!()
        }
    }

    #[test]
    fn piecewise_becomes_vector() {
        let f = field2d("f", ElemSize::F64);
        let g = field2d("g", ElemSize::F64);
        let asgs = vec![assign(at(&g, &[0, 0]), piecewise(vec![
            (float(0.0), lt(at(&f, &[0, 0]), float(0.0))),
            (at(&f, &[0, 0]), boolean(true)),
        ]))];
        let k = create_kernel(asgs, &KernelConfig::default()).unwrap();
        let k = vectorize(k, &opts()).unwrap();
        match &inner_loops(&k)[0] {
            Node::Loop {body, ..} => match &body[0] {
                Node::Assignment {rhs: Expr::Piecewise {branches, ty}, ..} => {
                    assert!(ty.is_vector());
                    assert!(matches!(&branches[0].0, Expr::Cast {..}));
                    assert!(branches[0].1.get_type().is_vector());
                    assert!(branches[1].1.is_true_literal());
                },
                n => panic!("unexpected node {n:?}")
            },
            _ => panic!()
        }
    }

    #[test]
    fn counter_read_as_value_stays_scalar() {
        let f = field2d("f", ElemSize::F64);
        let asgs = vec![assign(at(&f, &[0, 0]), add(at(&f, &[0, 0]), sym("ctr_1")))];
        let k = create_kernel(asgs, &KernelConfig::default()).unwrap();
        let k = vectorize(k, &opts()).unwrap();
        let loops = inner_loops(&k);
        assert_eq!(loops.len(), 1);
        assert!(vector_accesses(&loops[0]).is_empty());
    }

    #[test]
    fn line_padding_extends_loop() {
        let src = field2d("src", ElemSize::F64);
        let dst = field2d("dst", ElemSize::F64);
        let k = create_kernel(jacobi(&src, &dst), &KernelConfig::default()).unwrap();
        let o = VectorizeOptions {assume_sufficient_line_padding: true, ..opts()};
        let k = vectorize(k, &o).unwrap();
        assert_eq!(inner_loops(&k).len(), 1);
    }
}
