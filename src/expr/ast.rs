use super::types::Type;
use crate::field::FieldAccess;
use crate::utils::ast::{BinOp, ElemSize, UnOp};
use crate::utils::name::Name;
use crate::utils::smap::*;

use std::fmt;
use std::ops;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum GpuIndexKind {
    ThreadIdx, BlockIdx, BlockDim, GridDim
}

impl fmt::Display for GpuIndexKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            GpuIndexKind::ThreadIdx => write!(f, "threadIdx"),
            GpuIndexKind::BlockIdx => write!(f, "blockIdx"),
            GpuIndexKind::BlockDim => write!(f, "blockDim"),
            GpuIndexKind::GridDim => write!(f, "gridDim"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Dim {
    X, Y, Z
}

impl Dim {
    pub fn from_index(idx: usize) -> Option<Dim> {
        match idx {
            0 => Some(Dim::X),
            1 => Some(Dim::Y),
            2 => Some(Dim::Z),
            _ => None
        }
    }

    pub fn index(&self) -> usize {
        match self {
            Dim::X => 0,
            Dim::Y => 1,
            Dim::Z => 2,
        }
    }
}

impl fmt::Display for Dim {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Dim::X => write!(f, "x"),
            Dim::Y => write!(f, "y"),
            Dim::Z => write!(f, "z"),
        }
    }
}

// A symbolic expression over scalar symbols and field accesses. Kernel construction lowers field
// accesses to resolved accesses, and vectorization wraps resolved accesses in vector accesses.
#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    Symbol {id: Name, ty: Type},
    Bool {v: bool, ty: Type},
    Int {v: i64, ty: Type},
    Float {v: f64, ty: Type},
    Rational {num: i64, den: i64, ty: Type},
    UnOp {op: UnOp, arg: Box<Expr>, ty: Type},
    BinOp {lhs: Box<Expr>, op: BinOp, rhs: Box<Expr>, ty: Type},
    // A sequence of (value, condition) pairs. The value of the first branch whose condition holds
    // is the result, so a total piecewise ends with a branch whose condition is true.
    Piecewise {branches: Vec<(Expr, Expr)>, ty: Type},
    Call {func: String, args: Vec<Expr>, ty: Type},
    Cast {e: Box<Expr>, ty: Type},
    AddressOf {e: Box<Expr>, ty: Type},
    FieldAccess {access: FieldAccess, ty: Type},
    // A field access lowered to an element offset relative to a (possibly partial) base pointer.
    ResolvedAccess {
        base: Name, base_ty: Type, index: Box<Expr>, field: String,
        member: Option<String>, ty: Type
    },
    // A SIMD-width load or store of consecutive elements starting at a resolved access.
    VectorAccess {access: Box<Expr>, aligned: bool, nontemporal: bool, ty: Type},
    GpuIndex {kind: GpuIndexKind, dim: Dim, ty: Type},
}

impl Expr {
    pub fn get_type<'a>(&'a self) -> &'a Type {
        match self {
            Expr::Symbol {ty, ..} => ty,
            Expr::Bool {ty, ..} => ty,
            Expr::Int {ty, ..} => ty,
            Expr::Float {ty, ..} => ty,
            Expr::Rational {ty, ..} => ty,
            Expr::UnOp {ty, ..} => ty,
            Expr::BinOp {ty, ..} => ty,
            Expr::Piecewise {ty, ..} => ty,
            Expr::Call {ty, ..} => ty,
            Expr::Cast {ty, ..} => ty,
            Expr::AddressOf {ty, ..} => ty,
            Expr::FieldAccess {ty, ..} => ty,
            Expr::ResolvedAccess {ty, ..} => ty,
            Expr::VectorAccess {ty, ..} => ty,
            Expr::GpuIndex {ty, ..} => ty,
        }
    }

    pub fn symbol(id: impl Into<String>) -> Expr {
        Expr::Symbol {id: Name::new(id), ty: Type::Unknown}
    }

    pub fn typed_symbol(id: impl Into<String>, ty: Type) -> Expr {
        Expr::Symbol {id: Name::new(id), ty}
    }

    // A symbol holding a size, stride or counter value.
    pub fn size_symbol(id: String) -> Expr {
        Expr::Symbol {id: Name::new(id), ty: Type::scalar(ElemSize::I64)}
    }

    pub fn index(v: i64) -> Expr {
        Expr::Int {v, ty: Type::scalar(ElemSize::I64)}
    }

    pub fn float(v: f64) -> Expr {
        Expr::Float {v, ty: Type::scalar(ElemSize::F64)}
    }

    pub fn boolean(v: bool) -> Expr {
        Expr::Bool {v, ty: Type::boolean()}
    }

    pub fn rational(num: i64, den: i64) -> Expr {
        Expr::Rational {num, den, ty: Type::scalar(ElemSize::F64)}
    }

    pub fn unop(op: UnOp, arg: Expr) -> Expr {
        Expr::UnOp {op, arg: Box::new(arg), ty: Type::Unknown}
    }

    pub fn binop(lhs: Expr, op: BinOp, rhs: Expr) -> Expr {
        Expr::BinOp {lhs: Box::new(lhs), op, rhs: Box::new(rhs), ty: Type::Unknown}
    }

    pub fn pow(base: Expr, exponent: Expr) -> Expr {
        Expr::binop(base, BinOp::Pow, exponent)
    }

    pub fn call(func: &str, args: Vec<Expr>) -> Expr {
        Expr::Call {func: func.to_string(), args, ty: Type::Unknown}
    }

    pub fn piecewise(branches: Vec<(Expr, Expr)>) -> Expr {
        Expr::Piecewise {branches, ty: Type::Unknown}
    }

    pub fn cast(e: Expr, ty: Type) -> Expr {
        Expr::Cast {e: Box::new(e), ty}
    }

    pub fn gpu_index(kind: GpuIndexKind, dim: Dim) -> Expr {
        Expr::GpuIndex {kind, dim, ty: Type::scalar(ElemSize::I64)}
    }

    pub fn is_literal(&self) -> bool {
        matches!(self, Expr::Bool {..} | Expr::Int {..} | Expr::Float {..} | Expr::Rational {..})
    }

    pub fn is_true_literal(&self) -> bool {
        matches!(self, Expr::Bool {v: true, ..})
    }

    pub fn get_symbol<'a>(&'a self) -> Option<&'a Name> {
        match self {
            Expr::Symbol {id, ..} => Some(id),
            _ => None
        }
    }

    // The numeric value of a literal, treating rationals as floating-point numbers.
    pub fn numeric_value(&self) -> Option<f64> {
        match self {
            Expr::Int {v, ..} => Some(*v as f64),
            Expr::Float {v, ..} => Some(*v),
            Expr::Rational {num, den, ..} if *den != 0 => Some(*num as f64 / *den as f64),
            _ => None
        }
    }
}

impl SMapAccum<Expr> for Expr {
    fn smap_accum_l_result<A, E>(
        self,
        acc: Result<A, E>,
        f: impl Fn(A, Expr) -> Result<(A, Expr), E>
    ) -> Result<(A, Expr), E> {
        match self {
            Expr::UnOp {op, arg, ty} => {
                let (acc, arg) = f(acc?, *arg)?;
                Ok((acc, Expr::UnOp {op, arg: Box::new(arg), ty}))
            },
            Expr::BinOp {lhs, op, rhs, ty} => {
                let (acc, lhs) = f(acc?, *lhs)?;
                let (acc, rhs) = f(acc, *rhs)?;
                Ok((acc, Expr::BinOp {lhs: Box::new(lhs), op, rhs: Box::new(rhs), ty}))
            },
            Expr::Piecewise {branches, ty} => {
                let (acc, branches) = branches.into_iter()
                    .fold(Ok((acc?, vec![])), |acc, (v, c)| {
                        let (acc, mut branches) = acc?;
                        let (acc, v) = f(acc, v)?;
                        let (acc, c) = f(acc, c)?;
                        branches.push((v, c));
                        Ok((acc, branches))
                    })?;
                Ok((acc, Expr::Piecewise {branches, ty}))
            },
            Expr::Call {func, args, ty} => {
                let (acc, args) = args.smap_accum_l_result(acc, &f)?;
                Ok((acc, Expr::Call {func, args, ty}))
            },
            Expr::Cast {e, ty} => {
                let (acc, e) = f(acc?, *e)?;
                Ok((acc, Expr::Cast {e: Box::new(e), ty}))
            },
            Expr::AddressOf {e, ty} => {
                let (acc, e) = f(acc?, *e)?;
                Ok((acc, Expr::AddressOf {e: Box::new(e), ty}))
            },
            Expr::ResolvedAccess {base, base_ty, index, field, member, ty} => {
                let (acc, index) = f(acc?, *index)?;
                Ok((acc, Expr::ResolvedAccess {
                    base, base_ty, index: Box::new(index), field, member, ty
                }))
            },
            Expr::VectorAccess {access, aligned, nontemporal, ty} => {
                let (acc, access) = f(acc?, *access)?;
                Ok((acc, Expr::VectorAccess {access: Box::new(access), aligned, nontemporal, ty}))
            },
            Expr::Symbol {..} | Expr::Bool {..} | Expr::Int {..} | Expr::Float {..} |
            Expr::Rational {..} | Expr::FieldAccess {..} | Expr::GpuIndex {..} => {
                Ok((acc?, self))
            },
        }
    }
}

impl SFold<Expr> for Expr {
    fn sfold_result<A, E>(
        &self,
        acc: Result<A, E>,
        f: impl Fn(A, &Expr) -> Result<A, E>
    ) -> Result<A, E> {
        match self {
            Expr::UnOp {arg, ..} => f(acc?, arg),
            Expr::BinOp {lhs, rhs, ..} => f(f(acc?, lhs)?, rhs),
            Expr::Piecewise {branches, ..} => {
                branches.iter().fold(acc, |acc, (v, c)| f(f(acc?, v)?, c))
            },
            Expr::Call {args, ..} => args.sfold_result(acc, &f),
            Expr::Cast {e, ..} | Expr::AddressOf {e, ..} => f(acc?, e),
            Expr::ResolvedAccess {index, ..} => f(acc?, index),
            Expr::VectorAccess {access, ..} => f(acc?, access),
            Expr::Symbol {..} | Expr::Bool {..} | Expr::Int {..} | Expr::Float {..} |
            Expr::Rational {..} | Expr::FieldAccess {..} | Expr::GpuIndex {..} => acc,
        }
    }
}

impl ops::Add for Expr {
    type Output = Expr;
    fn add(self, rhs: Expr) -> Expr {
        Expr::binop(self, BinOp::Add, rhs)
    }
}

impl ops::Sub for Expr {
    type Output = Expr;
    fn sub(self, rhs: Expr) -> Expr {
        Expr::binop(self, BinOp::Sub, rhs)
    }
}

impl ops::Mul for Expr {
    type Output = Expr;
    fn mul(self, rhs: Expr) -> Expr {
        Expr::binop(self, BinOp::Mul, rhs)
    }
}

impl ops::Div for Expr {
    type Output = Expr;
    fn div(self, rhs: Expr) -> Expr {
        Expr::binop(self, BinOp::Div, rhs)
    }
}

impl ops::Neg for Expr {
    type Output = Expr;
    fn neg(self) -> Expr {
        Expr::unop(UnOp::Neg, self)
    }
}

// A pair of a left-hand side, either a symbol or a field access, and the expression assigned to
// it.
#[derive(Clone, Debug, PartialEq)]
pub struct Assignment {
    pub lhs: Expr,
    pub rhs: Expr,
}

impl Assignment {
    pub fn new(lhs: Expr, rhs: Expr) -> Assignment {
        Assignment {lhs, rhs}
    }
}
