use super::ast::*;
use crate::stencil_type_error;
use crate::utils::ast::{BinOp, ElemSize, UnOp};
use crate::utils::err::*;
use crate::utils::smap::SMapAccum;

use lazy_static::lazy_static;

use std::collections::BTreeMap;
use std::fmt;

#[derive(Clone, Debug, PartialEq)]
pub enum Type {
    // The type of a symbol that has not been assigned a type yet. No expression of this type
    // survives the typing stage of kernel construction.
    Unknown,
    Scalar {sz: ElemSize},
    Pointer {ty: Box<Type>, is_const: bool, restrict: bool},
    Vector {sz: ElemSize, width: usize},
    Struct {id: String, members: Vec<(String, ElemSize)>},
}

impl Type {
    pub fn scalar(sz: ElemSize) -> Type {
        Type::Scalar {sz}
    }

    pub fn boolean() -> Type {
        Type::Scalar {sz: ElemSize::Bool}
    }

    pub fn pointer(ty: Type) -> Type {
        Type::Pointer {ty: Box::new(ty), is_const: false, restrict: true}
    }

    pub fn get_scalar_elem_size<'a>(&'a self) -> Option<&'a ElemSize> {
        match self {
            Type::Scalar {sz} => Some(sz),
            _ => None,
        }
    }

    // The element size of a scalar or the lanes of a vector.
    pub fn base_elem_size(&self) -> Option<ElemSize> {
        match self {
            Type::Scalar {sz} | Type::Vector {sz, ..} => Some(*sz),
            _ => None
        }
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, Type::Unknown)
    }

    pub fn is_vector(&self) -> bool {
        matches!(self, Type::Vector {..})
    }

    pub fn is_pointer(&self) -> bool {
        matches!(self, Type::Pointer {..})
    }

    pub fn is_float(&self) -> bool {
        self.base_elem_size().map(|sz| sz.is_floating_point()).unwrap_or(false)
    }

    pub fn is_int(&self) -> bool {
        self.base_elem_size().map(|sz| sz.is_integer()).unwrap_or(false)
    }

    pub fn is_bool(&self) -> bool {
        self.base_elem_size().map(|sz| sz.is_boolean()).unwrap_or(false)
    }

    pub fn vector_width(&self) -> Option<usize> {
        match self {
            Type::Vector {width, ..} => Some(*width),
            _ => None
        }
    }

    // The vector-typed variant of a scalar type. Vector types are returned unchanged.
    pub fn to_vector(&self, width: usize) -> Type {
        match self {
            Type::Scalar {sz} => Type::Vector {sz: *sz, width},
            Type::Vector {..} => self.clone(),
            _ => self.clone()
        }
    }

    // The type of the value a pointer refers to.
    pub fn pointee<'a>(&'a self) -> Option<&'a Type> {
        match self {
            Type::Pointer {ty, ..} => Some(ty),
            _ => None
        }
    }

    pub fn member_type(&self, label: &str) -> Option<ElemSize> {
        match self {
            Type::Struct {members, ..} => {
                members.iter().find(|(id, _)| id == label).map(|(_, sz)| *sz)
            },
            _ => None
        }
    }

    pub fn size_in_bytes(&self) -> i64 {
        match self {
            Type::Unknown => 0,
            Type::Scalar {sz} => sz.size_in_bytes(),
            Type::Pointer {..} => 8,
            Type::Vector {sz, width} => sz.size_in_bytes() * (*width as i64),
            Type::Struct {members, ..} => {
                members.iter().map(|(_, sz)| sz.size_in_bytes()).sum()
            },
        }
    }
}

impl Default for Type {
    fn default() -> Self {
        Type::Unknown
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Type::Unknown => write!(f, "?"),
            Type::Scalar {sz} => write!(f, "{}", sz.c_name()),
            Type::Pointer {ty, is_const, ..} => {
                if *is_const {
                    write!(f, "{ty} const *")
                } else {
                    write!(f, "{ty} *")
                }
            },
            Type::Vector {sz, width} => write!(f, "{0}x{1}", sz.c_name(), width),
            Type::Struct {id, ..} => write!(f, "struct {id}"),
        }
    }
}

lazy_static! {
    static ref TYPEMAP: BTreeMap<&'static str, ElemSize> = vec![
        ("bool", ElemSize::Bool),
        ("int8", ElemSize::I8),
        ("int16", ElemSize::I16),
        ("int32", ElemSize::I32),
        ("int64", ElemSize::I64),
        ("int", ElemSize::I64),
        ("uint8", ElemSize::U8),
        ("uint16", ElemSize::U16),
        ("uint32", ElemSize::U32),
        ("uint64", ElemSize::U64),
        ("float32", ElemSize::F32),
        ("float", ElemSize::F32),
        ("float64", ElemSize::F64),
        ("double", ElemSize::F64),
    ].into_iter().collect();
}

pub fn parse_elem_size(s: &str) -> CompileResult<ElemSize> {
    let key = s.trim().trim_end_matches("_t");
    match TYPEMAP.get(key) {
        Some(sz) => Ok(*sz),
        None => stencil_type_error!("Unknown data type '{s}'")
    }
}

// Parses a C-like type string such as "double", "const float *" or "int64 * const".
pub fn create_type(s: &str) -> CompileResult<Type> {
    let tokens = s.replace('*', " * ");
    let tokens = tokens.split_whitespace().collect::<Vec<&str>>();
    let mut base: Option<ElemSize> = None;
    let mut base_const = false;
    let mut ty: Option<Type> = None;
    for tok in tokens {
        match tok {
            "const" => {
                if let Some(Type::Pointer {ty: inner, restrict, ..}) = ty {
                    ty = Some(Type::Pointer {ty: inner, is_const: true, restrict});
                } else {
                    base_const = true;
                }
            },
            "restrict" | "RESTRICT" => (),
            "*" => {
                let inner = match ty.take() {
                    Some(t) => t,
                    None => match base {
                        Some(sz) => Type::Scalar {sz},
                        None => return stencil_type_error!("Pointer without base type in '{s}'")
                    }
                };
                // A pointer to constant data is marked on the innermost pointer.
                let is_const = base_const && !inner.is_pointer();
                ty = Some(Type::Pointer {ty: Box::new(inner), is_const, restrict: false});
            },
            _ => {
                if base.is_some() {
                    return stencil_type_error!("Multiple base types in '{s}'");
                }
                base = Some(parse_elem_size(tok)?);
            }
        }
    }
    match (ty, base) {
        (Some(t), _) => Ok(t),
        (None, Some(sz)) => Ok(Type::Scalar {sz}),
        (None, None) => stencil_type_error!("Empty type string")
    }
}

// Determines the common type of a sequence of operand types. A vector operand makes the result a
// vector, and pointers dominate integer offsets in pointer arithmetic.
pub fn collate_types<'a>(types: impl IntoIterator<Item = &'a Type>) -> Type {
    let mut sz: Option<ElemSize> = None;
    let mut width: Option<usize> = None;
    let mut ptr: Option<Type> = None;
    for ty in types {
        match ty {
            Type::Scalar {sz: s} => {
                sz = Some(sz.map(|x| ElemSize::collate(x, *s)).unwrap_or(*s));
            },
            Type::Vector {sz: s, width: w} => {
                sz = Some(sz.map(|x| ElemSize::collate(x, *s)).unwrap_or(*s));
                width = width.or(Some(*w));
            },
            Type::Pointer {..} => {
                if ptr.is_none() {
                    ptr = Some(ty.clone());
                }
            },
            Type::Struct {..} | Type::Unknown => (),
        }
    }
    match (ptr, sz, width) {
        (Some(p), _, _) => p,
        (None, Some(sz), Some(width)) => Type::Vector {sz, width},
        (None, Some(sz), None) => Type::Scalar {sz},
        (None, None, _) => Type::Unknown,
    }
}

// Literal numbers adapt to the type of the expression they are combined with, so that an integer
// literal added to a 32-bit float does not promote the sum to a wider type.
fn is_weak_literal(e: &Expr) -> bool {
    matches!(e, Expr::Int {..} | Expr::Float {..} | Expr::Rational {..})
}

fn collate_operands(args: &[&Expr]) -> Type {
    let strong = args.iter()
        .filter(|e| !is_weak_literal(e))
        .map(|e| e.get_type())
        .filter(|ty| !ty.is_unknown())
        .collect::<Vec<&Type>>();
    let weak_float = args.iter().any(|e| is_weak_literal(e) && e.get_type().is_float());
    if strong.is_empty() {
        collate_types(args.iter().map(|e| e.get_type()))
    } else {
        let ty = collate_types(strong.into_iter());
        if weak_float && (ty.is_int() || ty.is_bool()) {
            let float = Type::Scalar {sz: ElemSize::F64};
            collate_types(vec![&ty, &float])
        } else {
            ty
        }
    }
}

fn boolean_like(ty: &Type) -> Type {
    match ty.vector_width() {
        Some(width) => Type::Vector {sz: ElemSize::Bool, width},
        None => Type::boolean()
    }
}

// Recomputes the type annotation of a node from the types of its (already typed) children. Leaf
// types are left untouched.
pub fn retype_node(e: Expr) -> Expr {
    match e {
        Expr::UnOp {op, arg, ..} => {
            let ty = match op {
                UnOp::Not => boolean_like(arg.get_type()),
                UnOp::Neg | UnOp::BitNeg => arg.get_type().clone(),
            };
            Expr::UnOp {op, arg, ty}
        },
        Expr::BinOp {lhs, op, rhs, ..} => {
            let operand_ty = collate_operands(&[&lhs, &rhs]);
            let ty = if op.produces_boolean() {
                boolean_like(&operand_ty)
            } else if op == BinOp::Pow {
                let base_ty = lhs.get_type().clone();
                if base_ty.is_int() && rhs.get_type().is_float() {
                    collate_types(vec![&base_ty, rhs.get_type()])
                } else {
                    base_ty
                }
            } else {
                operand_ty
            };
            Expr::BinOp {lhs, op, rhs, ty}
        },
        Expr::Piecewise {branches, ..} => {
            let values = branches.iter().map(|(v, _)| v).collect::<Vec<&Expr>>();
            let value_ty = collate_operands(&values);
            let cond_width = branches.iter()
                .filter_map(|(_, c)| c.get_type().vector_width())
                .next();
            let ty = match cond_width {
                Some(width) => value_ty.to_vector(width),
                None => value_ty
            };
            Expr::Piecewise {branches, ty}
        },
        Expr::Call {func, args, ty} => {
            let ty = if ty.is_unknown() {
                let refs = args.iter().collect::<Vec<&Expr>>();
                match collate_operands(&refs) {
                    Type::Unknown => Type::Scalar {sz: ElemSize::F64},
                    t => t
                }
            } else {
                ty
            };
            Expr::Call {func, args, ty}
        },
        Expr::AddressOf {e, ..} => {
            let ty = Type::Pointer {ty: Box::new(e.get_type().clone()), is_const: false, restrict: false};
            Expr::AddressOf {e, ty}
        },
        Expr::Symbol {..} | Expr::Bool {..} | Expr::Int {..} | Expr::Float {..} |
        Expr::Rational {..} | Expr::Cast {..} | Expr::FieldAccess {..} |
        Expr::ResolvedAccess {..} | Expr::VectorAccess {..} | Expr::GpuIndex {..} => e,
    }
}

// Recomputes all type annotations of an expression bottom-up.
pub fn retype(e: Expr) -> Expr {
    retype_node(e.smap(retype))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::expr::ast_builder::*;

    #[test]
    fn parse_scalar_types() {
        assert_eq!(create_type("double").unwrap(), Type::scalar(ElemSize::F64));
        assert_eq!(create_type("float32").unwrap(), Type::scalar(ElemSize::F32));
        assert_eq!(create_type("int64_t").unwrap(), Type::scalar(ElemSize::I64));
        assert!(create_type("quad").is_err());
    }

    #[test]
    fn parse_const_pointer() {
        let t1 = create_type("const double *").unwrap();
        let t2 = create_type("double const *").unwrap();
        assert_eq!(t1, t2);
        assert_eq!(t1.to_string(), "double const *");
    }

    #[test]
    fn collation_with_vectors() {
        let double = Type::scalar(ElemSize::F64);
        let float = Type::scalar(ElemSize::F32);
        let double4 = Type::Vector {sz: ElemSize::F64, width: 4};
        let float4 = Type::Vector {sz: ElemSize::F32, width: 4};
        assert_eq!(collate_types(vec![&double, &float]), double);
        assert_eq!(collate_types(vec![&double4, &float]), double4);
        assert_eq!(collate_types(vec![&double4, &float4]), double4);
    }

    #[test]
    fn integer_literal_adopts_float_type() {
        let e = retype(add(typed_sym("x", ElemSize::F32), int(1)));
        assert_eq!(e.get_type(), &Type::scalar(ElemSize::F32));
    }

    #[test]
    fn float_literal_promotes_integer() {
        let e = retype(mul(typed_sym("n", ElemSize::I32), float(0.5)));
        assert!(e.get_type().is_float());
    }

    #[test]
    fn comparison_is_boolean() {
        let e = retype(lt(typed_sym("x", ElemSize::F64), float(1.0)));
        assert_eq!(e.get_type(), &Type::boolean());
    }

    #[test]
    fn piecewise_with_vector_condition_is_vector() {
        let cond = Expr::Symbol {
            id: "c".into(), ty: Type::Vector {sz: ElemSize::Bool, width: 4}
        };
        let e = retype(piecewise(vec![
            (float(1.0), cond),
            (float(2.0), boolean(true)),
        ]));
        assert_eq!(e.get_type(), &Type::Vector {sz: ElemSize::F64, width: 4});
    }
}
