use crate::expr::ast::*;
use crate::expr::constant_fold::fold_expr;
use crate::expr::types::{retype, Type};
use crate::field::{FieldAccess, FieldType};
use crate::ir::ast::Node;
use crate::ir::loops::loop_counter_name;
use crate::utils::name::Name;
use crate::utils::smap::*;

use std::collections::BTreeSet;

// Declarations of partial base pointers, one list per loop nesting level.
#[derive(Debug, Default)]
pub struct PointerDecls {
    pub levels: Vec<Vec<Node>>,
    defined: BTreeSet<String>,
}

impl PointerDecls {
    fn add(mut self, level: usize, id: &str, decl: impl FnOnce() -> Node) -> Self {
        if self.defined.insert(id.to_string()) {
            if self.levels.len() <= level {
                self.levels.resize(level + 1, vec![]);
            }
            self.levels[level].push(decl());
        }
        self
    }
}

// Lowers field accesses to element offsets relative to base pointers.
//
// With partial pointers enabled, the base pointer of each access is advanced once per enclosing
// loop level by the contribution of that level's coordinate, so that the innermost loop only adds
// the contribution of the fastest coordinate. Index dimensions are folded into the pointer of the
// outermost level.
pub struct Resolver {
    loop_order: Vec<usize>,
    partial_pointers: bool,
    coordinates: Vec<Expr>,
    list_counter: Expr,
    read_only: BTreeSet<String>,
}

fn counter_symbol(coord: usize) -> Expr {
    Expr::size_symbol(loop_counter_name(coord).get_str().clone())
}

fn offset_suffix(dim: usize, ofs: i64) -> String {
    if ofs < 0 {
        format!("_{dim}m{0}", -ofs)
    } else {
        format!("_{dim}{ofs}")
    }
}

fn sum_terms(terms: Vec<Expr>) -> Expr {
    let e = terms.into_iter()
        .reduce(|l, r| l + r)
        .unwrap_or_else(|| Expr::index(0));
    fold_expr(retype(e))
}

impl Resolver {
    // A resolver for kernels whose cell coordinates are the loop counters.
    pub fn loop_counters(
        loop_order: Vec<usize>,
        read_only: BTreeSet<String>,
        partial_pointers: bool
    ) -> Resolver {
        let coordinates = (0..loop_order.len()).map(counter_symbol).collect();
        Resolver {
            loop_order, partial_pointers, coordinates, list_counter: counter_symbol(0), read_only
        }
    }

    // A resolver for indexed kernels, where the cell coordinates are read from the coordinate
    // list indexed by the first loop counter.
    pub fn fixed_coordinates(coordinates: Vec<Expr>, read_only: BTreeSet<String>) -> Resolver {
        let loop_order = (0..coordinates.len()).collect();
        Resolver {
            loop_order, partial_pointers: false, coordinates, list_counter: counter_symbol(0),
            read_only
        }
    }

    fn pointer_type(&self, access: &FieldAccess) -> Type {
        Type::Pointer {
            ty: Box::new(access.field.dtype.clone()),
            is_const: self.read_only.contains(&access.field.name),
            restrict: true
        }
    }

    // The contribution of a spatial dimension to the element offset of an access.
    fn spatial_terms(&self, access: &FieldAccess, dim: usize) -> Vec<Expr> {
        let stride = &access.field.strides[dim];
        let coord = self.coordinates.get(dim).cloned().unwrap_or_else(|| counter_symbol(dim));
        let ofs = access.offsets[dim];
        let mut terms = vec![stride.clone() * coord];
        if ofs != 0 {
            terms.push(stride.clone() * Expr::index(ofs));
        }
        terms
    }

    fn index_terms(&self, access: &FieldAccess) -> Vec<Expr> {
        let sdims = access.field.spatial_dims;
        access.index.iter().enumerate()
            .filter(|(_, idx)| **idx != 0)
            .map(|(i, idx)| access.field.strides[sdims + i].clone() * Expr::index(*idx))
            .collect()
    }

    fn resolve_list_access(&self, access: FieldAccess) -> Expr {
        let ty = access.elem_type();
        let ptr_ty = self.pointer_type(&access);
        let mut terms = vec![self.list_counter.clone()];
        if let Some(ofs) = access.offsets.first().filter(|o| **o != 0) {
            terms.push(Expr::index(*ofs));
        }
        Expr::ResolvedAccess {
            base: Name::new(access.field.base_pointer_name()),
            base_ty: ptr_ty,
            index: Box::new(sum_terms(terms)),
            field: access.field.name.clone(),
            member: access.member,
            ty
        }
    }

    fn resolve_access(&self, mut acc: PointerDecls, access: FieldAccess) -> (PointerDecls, Expr) {
        if access.field.field_type == FieldType::Indexed {
            return (acc, self.resolve_list_access(access));
        }
        let ty = access.elem_type();
        let ptr_ty = self.pointer_type(&access);
        let mut ptr_name = access.field.base_pointer_name();
        let n = self.loop_order.len().min(access.field.spatial_dims);
        let levels = if self.partial_pointers && n >= 2 {
            self.loop_order[..n - 1].to_vec()
        } else {
            vec![]
        };

        for (level, coord) in levels.iter().enumerate() {
            let mut terms = self.spatial_terms(&access, *coord);
            let mut name = format!("{ptr_name}{0}", offset_suffix(*coord, access.offsets[*coord]));
            if level == 0 {
                terms.extend(self.index_terms(&access));
                let sdims = access.field.spatial_dims;
                for (i, idx) in access.index.iter().enumerate() {
                    name = format!("{name}{0}", offset_suffix(sdims + i, *idx));
                }
            }
            let prev = Expr::Symbol {id: Name::new(ptr_name.clone()), ty: ptr_ty.clone()};
            let value = fold_expr(retype(prev + sum_terms(terms)));
            let lhs = Expr::Symbol {id: Name::new(name.clone()), ty: ptr_ty.clone()};
            acc = acc.add(level, &name, || Node::declare(lhs, value, false));
            ptr_name = name;
        }

        let inner_dims = if levels.is_empty() {
            self.loop_order.iter()
                .filter(|d| **d < access.field.spatial_dims)
                .cloned()
                .collect::<Vec<usize>>()
        } else {
            vec![self.loop_order[n - 1]]
        };
        let mut terms = inner_dims.into_iter()
            .flat_map(|d| self.spatial_terms(&access, d))
            .collect::<Vec<Expr>>();
        if levels.is_empty() {
            terms.extend(self.index_terms(&access));
        }
        let e = Expr::ResolvedAccess {
            base: Name::new(ptr_name),
            base_ty: ptr_ty,
            index: Box::new(sum_terms(terms)),
            field: access.field.name.clone(),
            member: access.member,
            ty
        };
        (acc, e)
    }

    fn resolve_expr(&self, acc: PointerDecls, e: Expr) -> (PointerDecls, Expr) {
        match e {
            Expr::FieldAccess {access, ..} => self.resolve_access(acc, access),
            _ => e.smap_accum_l(acc, |acc, e| self.resolve_expr(acc, e))
        }
    }

    fn resolve_node(&self, acc: PointerDecls, node: Node) -> (PointerDecls, Node) {
        let (acc, node) = <Node as SMapAccum<Expr>>::smap_accum_l(node, acc, |acc, e| {
            self.resolve_expr(acc, e)
        });
        <Node as SMapAccum<Node>>::smap_accum_l(node, acc, |acc, n| self.resolve_node(acc, n))
    }

    // Resolves all field accesses of the given nodes. The returned declarations define the
    // partial pointers, to be placed at the start of the body of the loop at each nesting level.
    pub fn resolve(&self, nodes: Vec<Node>) -> (Vec<Node>, Vec<Vec<Node>>) {
        let (acc, nodes) = nodes.into_iter()
            .fold((PointerDecls::default(), vec![]), |(acc, mut nodes), n| {
                let (acc, n) = self.resolve_node(acc, n);
                nodes.push(n);
                (acc, nodes)
            });
        (nodes, acc.levels)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::expr::ast_builder::*;
    use crate::utils::ast::ElemSize;
    use crate::utils::pprint::PrettyPrint;

    fn read_only(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn partial_pointer_per_outer_level() {
        let src = field2d("src", ElemSize::F64);
        let dst = field2d("dst", ElemSize::F64);
        let r = Resolver::loop_counters(vec![0, 1], read_only(&["src"]), true);
        let nodes = vec![Node::assign(at(&dst, &[0, 0]), at(&src, &[1, -1]))];
        let (nodes, levels) = r.resolve(nodes);
        assert_eq!(levels.len(), 1);
        let names = levels[0].iter()
            .map(|n| match n {
                Node::Assignment {lhs, ..} => lhs.get_symbol().unwrap().get_str().clone(),
                _ => panic!()
            })
            .collect::<Vec<String>>();
        assert_eq!(names, vec!["_data_dst_00".to_string(), "_data_src_01".to_string()]);
        match &nodes[0] {
            Node::Assignment {rhs: Expr::ResolvedAccess {base, base_ty, index, ..}, ..} => {
                assert_eq!(base.get_str(), "_data_src_01");
                assert!(matches!(base_ty, Type::Pointer {is_const: true, ..}));
                assert_eq!(index.pprint_default(), "_stride_src_1 * ctr_1 + _stride_src_1 * -1");
            },
            n => panic!("unexpected node {n:?}")
        }
    }

    #[test]
    fn shared_partial_pointer_is_declared_once() {
        let src = field2d("src", ElemSize::F64);
        let dst = field2d("dst", ElemSize::F64);
        let r = Resolver::loop_counters(vec![0, 1], read_only(&["src"]), true);
        let nodes = vec![Node::assign(
            at(&dst, &[0, 0]),
            add(at(&src, &[0, 1]), at(&src, &[0, -1]))
        )];
        let (_, levels) = r.resolve(nodes);
        assert_eq!(levels[0].len(), 2);
    }

    #[test]
    fn fixed_strides_fold() {
        let f = fixed_field("f", vec![4, 6], ElemSize::F64);
        let r = Resolver::loop_counters(vec![0, 1], BTreeSet::new(), false);
        let (nodes, levels) = r.resolve(vec![Node::assign(at(&f, &[1, 0]), float(0.0))]);
        assert!(levels.is_empty());
        match &nodes[0] {
            Node::Assignment {lhs: Expr::ResolvedAccess {base, index, ..}, ..} => {
                assert_eq!(base.get_str(), "_data_f");
                assert_eq!(index.pprint_default(), "6 * ctr_0 + 6 + ctr_1");
            },
            n => panic!("unexpected node {n:?}")
        }
    }

    #[test]
    fn index_dimensions_in_outer_pointer() {
        let ty = scalar(ElemSize::F64);
        let f = crate::field::Field::create_generic(
            "f", 2, ty, vec![3], crate::field::layout::Layout::Numpy
        ).unwrap();
        let r = Resolver::loop_counters(vec![0, 1], BTreeSet::new(), true);
        let (_, levels) = r.resolve(vec![Node::assign(f.at_index(&[0, 0], &[2]).unwrap(), float(0.0))]);
        match &levels[0][0] {
            Node::Assignment {lhs, rhs, ..} => {
                assert_eq!(lhs.get_symbol().unwrap().get_str(), "_data_f_00_22");
                assert_eq!(rhs.pprint_default(), "_data_f + (_stride_f_0 * ctr_0 + _stride_f_2 * 2)");
            },
            n => panic!("unexpected node {n:?}")
        }
    }

    #[test]
    fn list_access_uses_list_counter() {
        let st = Type::Struct {
            id: "Idx".to_string(),
            members: vec![("x".to_string(), ElemSize::I32)]
        };
        let idx = crate::field::Field::create_index_field("idx", st).unwrap();
        let r = Resolver::fixed_coordinates(vec![typed_sym("x", ElemSize::I32)], BTreeSet::new());
        let (nodes, _) = r.resolve(vec![Node::declare(
            typed_sym("x", ElemSize::I32), idx.member("x").unwrap(), true
        )]);
        match &nodes[0] {
            Node::Assignment {rhs: Expr::ResolvedAccess {index, member, ..}, ..} => {
                assert_eq!(index.as_ref(), &typed_sym("ctr_0", ElemSize::I64));
                assert_eq!(member, &Some("x".to_string()));
            },
            n => panic!("unexpected node {n:?}")
        }
    }
}
