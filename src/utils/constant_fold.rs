use crate::utils::ast::{BinOp, UnOp};

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Literal {
    Bool(bool), Int(i64), Float(f64)
}

// An expression type that can be constant folded. The folding rules are shared between the
// symbolic expressions and any other tree reusing the same operator vocabulary.
pub trait CFExpr<T> {
    fn mk_unop(op: UnOp, arg: Self, ty: T) -> Self
        where Self: Sized;
    fn mk_binop(lhs: Self, op: BinOp, rhs: Self, ty: T) -> Self
        where Self: Sized;
    fn bool_expr(v: bool, ty: T) -> Self
        where Self: Sized;
    fn int_expr(v: i64, ty: T) -> Self
        where Self: Sized;
    fn float_expr(v: f64, ty: T) -> Self
        where Self: Sized;

    fn literal(&self) -> Option<Literal>;
}

pub trait CFType {
    fn is_bool(&self) -> bool;
    fn is_int(&self) -> bool;
    fn is_float(&self) -> bool;
}

pub fn constant_fold_unop<T, E: CFExpr<T>>(op: UnOp, arg: E, ty: T) -> E {
    match (op, arg.literal()) {
        (UnOp::Neg, Some(Literal::Int(v))) => CFExpr::int_expr(-v, ty),
        (UnOp::BitNeg, Some(Literal::Int(v))) => CFExpr::int_expr(!v, ty),
        (UnOp::Neg, Some(Literal::Float(v))) => CFExpr::float_expr(-v, ty),
        (UnOp::Not, Some(Literal::Bool(v))) => CFExpr::bool_expr(!v, ty),
        _ => CFExpr::mk_unop(op, arg, ty)
    }
}

fn is_bool_neutral_elem(op: &BinOp, v: bool) -> bool {
    match op {
        BinOp::And => v,
        BinOp::Or => !v,
        _ => false
    }
}

fn is_int_neutral_elem(op: &BinOp, v: i64, is_rhs: bool) -> bool {
    match op {
        BinOp::Add => v == 0,
        BinOp::Sub if is_rhs => v == 0,
        BinOp::Mul => v == 1,
        BinOp::Div if is_rhs => v == 1,
        _ => false
    }
}

fn is_float_neutral_elem(op: &BinOp, v: f64, is_rhs: bool) -> bool {
    match op {
        BinOp::Add => v == 0.0,
        BinOp::Sub if is_rhs => v == 0.0,
        BinOp::Mul => v == 1.0,
        BinOp::Div if is_rhs => v == 1.0,
        _ => false
    }
}

fn is_int_zero_product(op: &BinOp, v: i64) -> bool {
    *op == BinOp::Mul && v == 0
}

fn apply_int_int_binop(lv: i64, op: &BinOp, rv: i64) -> Option<Literal> {
    let o = match op {
        BinOp::Add => lv.checked_add(rv).map(Literal::Int),
        BinOp::Sub => lv.checked_sub(rv).map(Literal::Int),
        BinOp::Mul => lv.checked_mul(rv).map(Literal::Int),
        // Integer division truncates towards zero, as in C.
        BinOp::Div if rv != 0 => Some(Literal::Int(lv / rv)),
        BinOp::Rem if rv != 0 => Some(Literal::Int(lv % rv)),
        BinOp::BitAnd => Some(Literal::Int(lv & rv)),
        BinOp::BitOr => Some(Literal::Int(lv | rv)),
        BinOp::BitXor => Some(Literal::Int(lv ^ rv)),
        BinOp::BitShl if (0..64).contains(&rv) => Some(Literal::Int(lv << rv)),
        BinOp::BitShr if (0..64).contains(&rv) => Some(Literal::Int(lv >> rv)),
        BinOp::Eq => Some(Literal::Bool(lv == rv)),
        BinOp::Neq => Some(Literal::Bool(lv != rv)),
        BinOp::Leq => Some(Literal::Bool(lv <= rv)),
        BinOp::Geq => Some(Literal::Bool(lv >= rv)),
        BinOp::Lt => Some(Literal::Bool(lv < rv)),
        BinOp::Gt => Some(Literal::Bool(lv > rv)),
        _ => None
    };
    o
}

fn apply_float_float_binop(lv: f64, op: &BinOp, rv: f64) -> Option<Literal> {
    match op {
        BinOp::Add => Some(Literal::Float(lv + rv)),
        BinOp::Sub => Some(Literal::Float(lv - rv)),
        BinOp::Mul => Some(Literal::Float(lv * rv)),
        BinOp::Div => Some(Literal::Float(lv / rv)),
        BinOp::Eq => Some(Literal::Bool(lv == rv)),
        BinOp::Neq => Some(Literal::Bool(lv != rv)),
        BinOp::Leq => Some(Literal::Bool(lv <= rv)),
        BinOp::Geq => Some(Literal::Bool(lv >= rv)),
        BinOp::Lt => Some(Literal::Bool(lv < rv)),
        BinOp::Gt => Some(Literal::Bool(lv > rv)),
        _ => None
    }
}

fn apply_bool_bool_binop(lv: bool, op: &BinOp, rv: bool) -> Option<Literal> {
    match op {
        BinOp::And => Some(Literal::Bool(lv && rv)),
        BinOp::Or => Some(Literal::Bool(lv || rv)),
        _ => None
    }
}

fn literal_expr<T: CFType, E: CFExpr<T>>(lit: Literal, ty: T) -> E {
    match lit {
        Literal::Bool(v) => CFExpr::bool_expr(v, ty),
        Literal::Int(v) => CFExpr::int_expr(v, ty),
        Literal::Float(v) => CFExpr::float_expr(v, ty),
    }
}

pub fn constant_fold_binop<T: CFType, E: CFExpr<T>>(lhs: E, op: BinOp, rhs: E, ty: T) -> E {
    let folded = match (lhs.literal(), rhs.literal()) {
        (Some(Literal::Bool(l)), Some(Literal::Bool(r))) => apply_bool_bool_binop(l, &op, r),
        (Some(Literal::Int(l)), Some(Literal::Int(r))) if ty.is_int() || ty.is_bool() => {
            apply_int_int_binop(l, &op, r)
        },
        (Some(Literal::Float(l)), Some(Literal::Float(r))) if ty.is_float() || ty.is_bool() => {
            apply_float_float_binop(l, &op, r)
        },
        _ => None
    };
    if let Some(lit) = folded {
        return literal_expr(lit, ty);
    }
    match (lhs.literal(), rhs.literal()) {
        (None, Some(Literal::Bool(v))) if is_bool_neutral_elem(&op, v) => lhs,
        (Some(Literal::Bool(v)), None) if is_bool_neutral_elem(&op, v) => rhs,
        (None, Some(Literal::Int(v))) if is_int_neutral_elem(&op, v, true) => lhs,
        (Some(Literal::Int(v)), None) if is_int_neutral_elem(&op, v, false) => rhs,
        (None, Some(Literal::Int(v))) if is_int_zero_product(&op, v) && ty.is_int() => rhs,
        (Some(Literal::Int(v)), None) if is_int_zero_product(&op, v) && ty.is_int() => lhs,
        (None, Some(Literal::Float(v))) if is_float_neutral_elem(&op, v, true) => lhs,
        (Some(Literal::Float(v)), None) if is_float_neutral_elem(&op, v, false) => rhs,
        _ => CFExpr::mk_binop(lhs, op, rhs, ty)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn int_arithmetic() {
        assert_eq!(apply_int_int_binop(1, &BinOp::Add, 2), Some(Literal::Int(3)));
        assert_eq!(apply_int_int_binop(7, &BinOp::Div, 2), Some(Literal::Int(3)));
        assert_eq!(apply_int_int_binop(-7, &BinOp::Div, 2), Some(Literal::Int(-3)));
        assert_eq!(apply_int_int_binop(3, &BinOp::Lt, 4), Some(Literal::Bool(true)));
    }

    #[test]
    fn int_division_by_zero_not_folded() {
        assert_eq!(apply_int_int_binop(3, &BinOp::Div, 0), None);
        assert_eq!(apply_int_int_binop(3, &BinOp::Rem, 0), None);
    }

    #[test]
    fn int_overflow_not_folded() {
        assert_eq!(apply_int_int_binop(i64::MAX, &BinOp::Add, 1), None);
    }

    #[test]
    fn float_arithmetic() {
        assert_eq!(apply_float_float_binop(1.5, &BinOp::Add, 2.5), Some(Literal::Float(4.0)));
        assert_eq!(apply_float_float_binop(1.5, &BinOp::Rem, 2.5), None);
        assert_eq!(apply_float_float_binop(1.5, &BinOp::Eq, 2.5), Some(Literal::Bool(false)));
    }

    #[test]
    fn neutral_elements() {
        assert!(is_int_neutral_elem(&BinOp::Sub, 0, true));
        assert!(!is_int_neutral_elem(&BinOp::Sub, 0, false));
        assert!(is_float_neutral_elem(&BinOp::Mul, 1.0, false));
        assert!(is_bool_neutral_elem(&BinOp::And, true));
        assert!(!is_bool_neutral_elem(&BinOp::Or, true));
    }
}
