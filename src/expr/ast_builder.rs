use super::ast::*;
use super::types::Type;
use crate::field::Field;
use crate::field::layout::Layout;
use crate::utils::ast::*;

pub fn scalar(sz: ElemSize) -> Type {
    Type::Scalar {sz}
}

pub fn sym(id: &str) -> Expr {
    Expr::symbol(id)
}

pub fn typed_sym(id: &str, sz: ElemSize) -> Expr {
    Expr::typed_symbol(id, scalar(sz))
}

pub fn int(v: i64) -> Expr {
    Expr::index(v)
}

pub fn float(v: f64) -> Expr {
    Expr::float(v)
}

pub fn float32(v: f64) -> Expr {
    Expr::Float {v, ty: scalar(ElemSize::F32)}
}

pub fn boolean(v: bool) -> Expr {
    Expr::boolean(v)
}

pub fn rational(num: i64, den: i64) -> Expr {
    Expr::rational(num, den)
}

pub fn binop(lhs: Expr, op: BinOp, rhs: Expr) -> Expr {
    Expr::binop(lhs, op, rhs)
}

pub fn add(lhs: Expr, rhs: Expr) -> Expr {
    binop(lhs, BinOp::Add, rhs)
}

pub fn sub(lhs: Expr, rhs: Expr) -> Expr {
    binop(lhs, BinOp::Sub, rhs)
}

pub fn mul(lhs: Expr, rhs: Expr) -> Expr {
    binop(lhs, BinOp::Mul, rhs)
}

pub fn div(lhs: Expr, rhs: Expr) -> Expr {
    binop(lhs, BinOp::Div, rhs)
}

pub fn pow(lhs: Expr, rhs: Expr) -> Expr {
    binop(lhs, BinOp::Pow, rhs)
}

pub fn lt(lhs: Expr, rhs: Expr) -> Expr {
    binop(lhs, BinOp::Lt, rhs)
}

pub fn gt(lhs: Expr, rhs: Expr) -> Expr {
    binop(lhs, BinOp::Gt, rhs)
}

pub fn eq(lhs: Expr, rhs: Expr) -> Expr {
    binop(lhs, BinOp::Eq, rhs)
}

pub fn neg(arg: Expr) -> Expr {
    Expr::unop(UnOp::Neg, arg)
}

pub fn call(func: &str, args: Vec<Expr>) -> Expr {
    Expr::call(func, args)
}

pub fn piecewise(branches: Vec<(Expr, Expr)>) -> Expr {
    Expr::piecewise(branches)
}

pub fn assign(lhs: Expr, rhs: Expr) -> Assignment {
    Assignment::new(lhs, rhs)
}

pub fn field2d(name: &str, sz: ElemSize) -> Field {
    Field::create_generic(name, 2, scalar(sz), vec![], Layout::Numpy).unwrap()
}

pub fn field(name: &str, spatial_dims: usize, sz: ElemSize) -> Field {
    Field::create_generic(name, spatial_dims, scalar(sz), vec![], Layout::Numpy).unwrap()
}

pub fn fixed_field(name: &str, shape: Vec<i64>, sz: ElemSize) -> Field {
    Field::create_fixed_size(name, shape, scalar(sz), vec![], Layout::Numpy).unwrap()
}

pub fn at(f: &Field, offsets: &[i64]) -> Expr {
    f.at(offsets).unwrap()
}

// The four-point Jacobi update of the interior of a two-dimensional field.
pub fn jacobi(src: &Field, dst: &Field) -> Vec<Assignment> {
    let sum = add(
        add(at(src, &[1, 0]), at(src, &[-1, 0])),
        add(at(src, &[0, 1]), at(src, &[0, -1]))
    );
    vec![assign(at(dst, &[0, 0]), div(sum, float(4.0)))]
}
