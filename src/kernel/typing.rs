use crate::expr::ast::*;
use crate::expr::subs::collect_field_accesses;
use crate::expr::types::*;
use crate::field::{Field, FieldAccess, FieldType};
use crate::ir::ast::Node;
use crate::ir::symbols::all_definitions;
use crate::option::KernelConfig;
use crate::utils::ast::ElemSize;
use crate::utils::err::*;
use crate::utils::name::Name;
use crate::utils::smap::*;
use crate::{stencil_compile_error, stencil_name_error, stencil_type_error};

use std::collections::{BTreeMap, BTreeSet};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FieldRole {
    ReadOnly, WriteOnly, ReadWrite
}

// The assignments of a kernel after typing, as declaration and store nodes, together with the
// fields they access.
#[derive(Clone, Debug)]
pub struct TypedBody {
    pub nodes: Vec<Node>,
    pub fields: Vec<Field>,
    pub roles: BTreeMap<String, FieldRole>,
}

impl TypedBody {
    pub fn is_read_only(&self, field: &str) -> bool {
        self.roles.get(field) == Some(&FieldRole::ReadOnly)
    }

    pub fn spatial_fields(&self) -> Vec<&Field> {
        self.fields.iter()
            .filter(|f| f.field_type == FieldType::Generic)
            .collect()
    }

    pub fn accesses(&self) -> Vec<FieldAccess> {
        self.nodes.iter().fold(vec![], |acc, n| {
            n.sfold(acc, collect_field_accesses)
        })
    }
}

fn is_counter_name(id: &Name) -> bool {
    let s = id.get_str();
    s.strip_prefix("ctr_")
        .map(|d| !d.is_empty() && d.chars().all(|c| c.is_ascii_digit()))
        .unwrap_or(false)
}

fn collect_explicit_types(
    mut acc: BTreeMap<Name, Type>,
    e: &Expr
) -> CompileResult<BTreeMap<Name, Type>> {
    match e {
        Expr::Symbol {id, ty} if !ty.is_unknown() => {
            match acc.get(id) {
                Some(prev) if prev != ty => {
                    stencil_type_error!(
                        "Conflicting type declarations of symbol {0}: {prev} and {ty}",
                        id.get_str()
                    )
                },
                _ => {
                    acc.insert(id.clone(), ty.clone());
                    Ok(acc)
                }
            }
        },
        _ => e.sfold_result(Ok(acc), collect_explicit_types)
    }
}

struct TypeEnv<'a> {
    explicit: BTreeMap<Name, Type>,
    config: &'a KernelConfig,
    int_symbols: BTreeSet<Name>,
}

impl<'a> TypeEnv<'a> {
    fn new(
        assignments: &[Assignment],
        config: &'a KernelConfig,
        int_symbols: BTreeSet<Name>
    ) -> CompileResult<TypeEnv<'a>> {
        let explicit = assignments.iter().try_fold(BTreeMap::new(), |acc, a| {
            let acc = collect_explicit_types(acc, &a.lhs)?;
            collect_explicit_types(acc, &a.rhs)
        })?;
        for (id, ty) in explicit.iter() {
            if let Some(o) = config.type_overrides.get(id.get_str()) {
                if o != ty {
                    return stencil_type_error!(
                        "Conflicting type declarations of symbol {0}: {ty} in the \
                         assignments and {o} in the configuration",
                        id.get_str()
                    );
                }
            }
        }
        Ok(TypeEnv {explicit, config, int_symbols})
    }

    fn lookup(&self, id: &Name) -> Type {
        if let Some(ty) = self.explicit.get(id) {
            ty.clone()
        } else if let Some(ty) = self.config.type_overrides.get(id.get_str()) {
            ty.clone()
        } else if is_counter_name(id) || self.int_symbols.contains(id) {
            Type::scalar(ElemSize::I64)
        } else {
            Type::scalar(self.config.data_type)
        }
    }

    // The type of a symbol defined by an assignment. Without a declared type, a boolean
    // right-hand side makes the symbol boolean.
    fn lookup_lhs(&self, id: &Name, rhs: &Expr) -> Type {
        let declared = self.explicit.contains_key(id) ||
            self.config.type_overrides.contains_key(id.get_str());
        if !declared && rhs.get_type().is_bool() {
            Type::boolean()
        } else {
            self.lookup(id)
        }
    }
}

fn type_symbols(env: &TypeEnv, defined: &BTreeMap<Name, Type>, e: Expr) -> Expr {
    match e {
        Expr::Symbol {id, ..} => {
            let ty = defined.get(&id).cloned().unwrap_or_else(|| env.lookup(&id));
            Expr::Symbol {id, ty}
        },
        _ => e.smap(|e| type_symbols(env, defined, e))
    }
}

// Literals of an untyped precision take the floating-point type of the operation they appear in,
// such that a constant in a single-precision expression is printed as a single-precision
// constant.
fn literal_context(e: &Expr) -> Option<Type> {
    match e {
        Expr::BinOp {lhs, rhs, ty, ..} if !ty.is_float() => {
            vec![lhs, rhs].into_iter()
                .filter(|c| !c.is_literal())
                .map(|c| c.get_type())
                .find(|t| t.is_float())
                .cloned()
        },
        Expr::BinOp {ty, ..} | Expr::UnOp {ty, ..} | Expr::Piecewise {ty, ..} if ty.is_float() => {
            Some(ty.clone())
        },
        _ => None
    }
}

fn adopt_literal_types(e: Expr) -> Expr {
    let e = e.smap(adopt_literal_types);
    match literal_context(&e) {
        Some(ty) => e.smap(|c| match c {
            Expr::Float {v, ..} => Expr::Float {v, ty: ty.clone()},
            Expr::Rational {num, den, ..} => Expr::Rational {num, den, ty: ty.clone()},
            c => c
        }),
        None => e
    }
}

fn classify_fields(
    assignments: &[Assignment]
) -> CompileResult<(Vec<Field>, BTreeMap<String, FieldRole>)> {
    let mut fields: BTreeMap<String, Field> = BTreeMap::new();
    let mut read = BTreeSet::new();
    let mut written = BTreeSet::new();
    let mut record = |acc: &FieldAccess| -> CompileResult<()> {
        match fields.get(&acc.field.name) {
            Some(f) if f != &acc.field || f.field_type != acc.field.field_type => {
                stencil_compile_error!(
                    "Field {0} is used with two different definitions", acc.field.name
                )
            },
            Some(_) => Ok(()),
            None => {
                fields.insert(acc.field.name.clone(), acc.field.clone());
                Ok(())
            }
        }
    };
    for a in assignments {
        if let Expr::FieldAccess {access, ..} = &a.lhs {
            record(access)?;
            written.insert(access.field.name.clone());
        }
        for access in collect_field_accesses(vec![], &a.rhs) {
            record(&access)?;
            read.insert(access.field.name.clone());
        }
    }
    let roles = fields.keys()
        .map(|id| {
            let role = match (read.contains(id), written.contains(id)) {
                (true, true) => FieldRole::ReadWrite,
                (false, true) => FieldRole::WriteOnly,
                _ => FieldRole::ReadOnly,
            };
            (id.clone(), role)
        })
        .collect::<BTreeMap<String, FieldRole>>();
    for (id, role) in roles.iter() {
        let indexed = fields.get(id).map(|f| f.field_type == FieldType::Indexed).unwrap_or(false);
        if indexed && *role != FieldRole::ReadOnly {
            return stencil_compile_error!(
                "Field {id} is used both as the coordinate list of the kernel and as an \
                 output field"
            );
        }
    }
    Ok((fields.into_values().collect(), roles))
}

fn validate_spatial_dims(fields: &[Field]) -> CompileResult<()> {
    let dims = fields.iter()
        .filter(|f| f.field_type == FieldType::Generic)
        .map(|f| f.spatial_dims)
        .collect::<BTreeSet<usize>>();
    if dims.len() > 1 {
        let names = fields.iter()
            .map(|f| format!("{0} ({1}D)", f.name, f.spatial_dims))
            .collect::<Vec<String>>()
            .join(", ");
        stencil_compile_error!("All fields must have the same spatial dimensionality: {names}")
    } else {
        Ok(())
    }
}

// Ensures that the cells of the iteration space can be updated in any order: a written field
// must be written at a single offset, and it may only be read at that offset.
fn check_independence(assignments: &[Assignment]) -> CompileResult<()> {
    let mut writes: BTreeMap<String, Vec<i64>> = BTreeMap::new();
    for a in assignments {
        if let Expr::FieldAccess {access, ..} = &a.lhs {
            match writes.get(&access.field.name) {
                Some(ofs) if ofs != &access.offsets => {
                    return stencil_compile_error!(
                        "Field {0} is written at two different locations: {1:?} and {2:?}",
                        access.field.name, ofs, access.offsets
                    );
                },
                Some(_) => (),
                None => {
                    writes.insert(access.field.name.clone(), access.offsets.clone());
                }
            }
        }
    }
    for a in assignments {
        for access in collect_field_accesses(vec![], &a.rhs) {
            if let Some(ofs) = writes.get(&access.field.name) {
                if ofs != &access.offsets {
                    return stencil_compile_error!(
                        "Field {0} is read at {1:?} and written at {2:?}, so it cannot be \
                         updated in place",
                        access.field.name, access.offsets, ofs
                    );
                }
            }
        }
    }
    Ok(())
}

// Types all symbols of the assignments and translates them into IR nodes. Symbols on the
// left-hand side become constant declarations and field accesses become stores. Symbols in
// `int_symbols` are typed as integers unless declared otherwise.
pub fn type_assignments(
    assignments: Vec<Assignment>,
    config: &KernelConfig,
    int_symbols: BTreeSet<Name>
) -> CompileResult<TypedBody> {
    let env = TypeEnv::new(&assignments, config, int_symbols)?;
    let (fields, roles) = classify_fields(&assignments)?;
    validate_spatial_dims(&fields)?;
    if !config.skip_independence_check {
        check_independence(&assignments)?;
    }

    let mut defined: BTreeMap<Name, Type> = BTreeMap::new();
    let mut nodes = vec![];
    for Assignment {lhs, rhs} in assignments {
        let rhs = type_symbols(&env, &defined, rhs);
        let rhs = adopt_literal_types(retype(rhs));
        match lhs {
            Expr::Symbol {id, ..} => {
                if rhs_uses_symbol(&rhs, &id) {
                    return stencil_name_error!(
                        "Symbol {0} is used in its own definition", id.get_str()
                    );
                }
                let ty = env.lookup_lhs(&id, &rhs);
                defined.insert(id.clone(), ty.clone());
                nodes.push(Node::declare(Expr::Symbol {id, ty}, rhs, true));
            },
            Expr::FieldAccess {access, ty} => {
                nodes.push(Node::assign(Expr::FieldAccess {access, ty}, rhs));
            },
            lhs => {
                return stencil_compile_error!(
                    "Invalid left-hand side of an assignment: {lhs:?}. Expected a symbol or \
                     a field access"
                );
            }
        }
    }

    let mut seen = BTreeSet::new();
    for id in all_definitions(&nodes) {
        if !seen.insert(id.clone()) {
            return stencil_name_error!(
                "Symbol {0} is defined more than once. Each symbol may only be assigned once",
                id.get_str()
            );
        }
    }
    used_before_definition(&nodes)?;

    for (id, role) in roles.iter() {
        tracing::debug!("Field {id} is {role:?}");
    }
    Ok(TypedBody {nodes, fields, roles})
}

fn rhs_uses_symbol(rhs: &Expr, id: &Name) -> bool {
    crate::expr::subs::contains(rhs, &|e| e.get_symbol() == Some(id))
}

// A symbol referenced before the assignment defining it would silently become a parameter of the
// kernel.
fn used_before_definition(nodes: &[Node]) -> CompileResult<()> {
    let defined_later = nodes.iter()
        .filter_map(|n| match n {
            Node::Assignment {lhs: Expr::Symbol {id, ..}, is_decl: true, ..} => Some(id.clone()),
            _ => None
        })
        .collect::<BTreeSet<Name>>();
    let mut defined = BTreeSet::new();
    for n in nodes {
        if let Node::Assignment {lhs, rhs, ..} = n {
            let early = defined_later.iter()
                .filter(|id| !defined.contains(*id))
                .find(|id| rhs_uses_symbol(rhs, id));
            if let Some(id) = early {
                return stencil_name_error!(
                    "Symbol {0} is used before its definition", id.get_str()
                );
            }
            if let Expr::Symbol {id, ..} = lhs {
                defined.insert(id.clone());
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::expr::ast_builder::*;

    fn cfg() -> KernelConfig {
        KernelConfig::default()
    }

    #[test]
    fn jacobi_roles() {
        let src = field2d("src", ElemSize::F64);
        let dst = field2d("dst", ElemSize::F64);
        let body = type_assignments(jacobi(&src, &dst), &cfg(), BTreeSet::new()).unwrap();
        assert_eq!(body.roles.get("src"), Some(&FieldRole::ReadOnly));
        assert_eq!(body.roles.get("dst"), Some(&FieldRole::WriteOnly));
        assert_eq!(body.fields.len(), 2);
        assert!(body.is_read_only("src"));
    }

    #[test]
    fn symbols_get_default_type() {
        let f = field2d("f", ElemSize::F32);
        let asgs = vec![
            assign(sym("a"), mul(sym("w"), at(&f, &[0, 0]))),
            assign(at(&f, &[0, 0]), sym("a")),
        ];
        let config = cfg().with_data_type(ElemSize::F32);
        let body = type_assignments(asgs, &config, BTreeSet::new()).unwrap();
        match &body.nodes[0] {
            Node::Assignment {lhs, rhs, is_decl: true, is_const: true} => {
                assert_eq!(lhs.get_type(), &scalar(ElemSize::F32));
                assert_eq!(rhs.get_type(), &scalar(ElemSize::F32));
            },
            n => panic!("unexpected node {n:?}")
        }
    }

    #[test]
    fn float_literal_adopts_single_precision() {
        let f = field2d("f", ElemSize::F32);
        let asgs = vec![assign(at(&f, &[0, 0]), mul(at(&f, &[0, 0]), float(0.5)))];
        let body = type_assignments(asgs, &cfg(), BTreeSet::new()).unwrap();
        match &body.nodes[0] {
            Node::Assignment {rhs: Expr::BinOp {rhs, ..}, ..} => {
                assert_eq!(rhs.get_type(), &scalar(ElemSize::F32));
            },
            n => panic!("unexpected node {n:?}")
        }
    }

    #[test]
    fn type_override_applies() {
        let f = field2d("f", ElemSize::F64);
        let asgs = vec![assign(at(&f, &[0, 0]), sym("n"))];
        let config = cfg().with_type_override("n", "int32").unwrap();
        let body = type_assignments(asgs, &config, BTreeSet::new()).unwrap();
        match &body.nodes[0] {
            Node::Assignment {rhs, ..} => assert_eq!(rhs.get_type(), &scalar(ElemSize::I32)),
            n => panic!("unexpected node {n:?}")
        }
    }

    #[test]
    fn conflicting_types_fail() {
        let f = field2d("f", ElemSize::F64);
        let asgs = vec![assign(
            at(&f, &[0, 0]),
            add(typed_sym("a", ElemSize::F32), typed_sym("a", ElemSize::F64))
        )];
        let e = type_assignments(asgs, &cfg(), BTreeSet::new()).unwrap_err();
        assert_eq!(e.kind(), ErrorKind::Type);
    }

    #[test]
    fn conflicting_override_fails() {
        let f = field2d("f", ElemSize::F64);
        let asgs = vec![assign(at(&f, &[0, 0]), typed_sym("a", ElemSize::F32))];
        let config = cfg().with_type_override("a", "double").unwrap();
        assert!(type_assignments(asgs, &config, BTreeSet::new()).is_err());
    }

    #[test]
    fn redefinition_fails() {
        let f = field2d("f", ElemSize::F64);
        let asgs = vec![
            assign(sym("a"), float(1.0)),
            assign(sym("a"), float(2.0)),
            assign(at(&f, &[0, 0]), sym("a")),
        ];
        let e = type_assignments(asgs, &cfg(), BTreeSet::new()).unwrap_err();
        assert_eq!(e.kind(), ErrorKind::Name);
    }

    #[test]
    fn use_before_definition_fails() {
        let f = field2d("f", ElemSize::F64);
        let asgs = vec![
            assign(at(&f, &[0, 0]), sym("a")),
            assign(sym("a"), float(2.0)),
        ];
        assert!(type_assignments(asgs, &cfg(), BTreeSet::new()).is_err());
    }

    #[test]
    fn invalid_lhs_fails() {
        let asgs = vec![assign(add(sym("a"), sym("b")), float(1.0))];
        assert!(type_assignments(asgs, &cfg(), BTreeSet::new()).is_err());
    }

    #[test]
    fn dimensionality_mismatch_fails() {
        let a = field("a", 2, ElemSize::F64);
        let b = field("b", 3, ElemSize::F64);
        let asgs = vec![assign(at(&a, &[0, 0]), at(&b, &[0, 0, 0]))];
        assert!(type_assignments(asgs, &cfg(), BTreeSet::new()).is_err());
    }

    #[test]
    fn in_place_neighbour_read_fails() {
        let f = field2d("f", ElemSize::F64);
        let asgs = vec![assign(at(&f, &[0, 0]), at(&f, &[1, 0]))];
        assert!(type_assignments(asgs.clone(), &cfg(), BTreeSet::new()).is_err());
        let mut config = cfg();
        config.skip_independence_check = true;
        assert!(type_assignments(asgs, &config, BTreeSet::new()).is_ok());
    }

    #[test]
    fn in_place_center_update() {
        let f = field2d("f", ElemSize::F64);
        let asgs = vec![assign(at(&f, &[0, 0]), mul(at(&f, &[0, 0]), float(2.0)))];
        let body = type_assignments(asgs, &cfg(), BTreeSet::new()).unwrap();
        assert_eq!(body.roles.get("f"), Some(&FieldRole::ReadWrite));
    }

    #[test]
    fn two_write_offsets_fail() {
        let f = field2d("f", ElemSize::F64);
        let asgs = vec![
            assign(at(&f, &[0, 0]), float(1.0)),
            assign(at(&f, &[1, 0]), float(1.0)),
        ];
        assert!(type_assignments(asgs, &cfg(), BTreeSet::new()).is_err());
    }

    #[test]
    fn counters_are_integers() {
        let f = field2d("f", ElemSize::F64);
        let asgs = vec![assign(at(&f, &[0, 0]), sym("ctr_1"))];
        let body = type_assignments(asgs, &cfg(), BTreeSet::new()).unwrap();
        match &body.nodes[0] {
            Node::Assignment {rhs, ..} => assert_eq!(rhs.get_type(), &scalar(ElemSize::I64)),
            n => panic!("unexpected node {n:?}")
        }
    }

    #[test]
    fn boolean_temporary() {
        let f = field2d("f", ElemSize::F64);
        let asgs = vec![
            assign(sym("c"), lt(at(&f, &[0, 0]), float(0.0))),
            assign(at(&f, &[0, 0]), piecewise(vec![
                (float(0.0), sym("c")), (at(&f, &[0, 0]), boolean(true))
            ])),
        ];
        let body = type_assignments(asgs, &cfg(), BTreeSet::new()).unwrap();
        match &body.nodes[0] {
            Node::Assignment {lhs, ..} => assert_eq!(lhs.get_type(), &Type::boolean()),
            n => panic!("unexpected node {n:?}")
        }
    }
}
