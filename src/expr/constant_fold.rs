use super::ast::*;
use super::types::Type;
use crate::utils::ast::{BinOp, UnOp};
use crate::utils::constant_fold::*;
use crate::utils::smap::SMapAccum;

impl CFExpr<Type> for Expr {
    fn mk_unop(op: UnOp, arg: Expr, ty: Type) -> Expr {
        Expr::UnOp {op, arg: Box::new(arg), ty}
    }

    fn mk_binop(lhs: Expr, op: BinOp, rhs: Expr, ty: Type) -> Expr {
        Expr::BinOp {lhs: Box::new(lhs), op, rhs: Box::new(rhs), ty}
    }

    fn bool_expr(v: bool, ty: Type) -> Expr {
        Expr::Bool {v, ty}
    }

    fn int_expr(v: i64, ty: Type) -> Expr {
        Expr::Int {v, ty}
    }

    fn float_expr(v: f64, ty: Type) -> Expr {
        Expr::Float {v, ty}
    }

    fn literal(&self) -> Option<Literal> {
        match self {
            Expr::Bool {v, ..} => Some(Literal::Bool(*v)),
            Expr::Int {v, ..} => Some(Literal::Int(*v)),
            Expr::Float {v, ..} => Some(Literal::Float(*v)),
            _ => None
        }
    }
}

impl CFType for Type {
    fn is_bool(&self) -> bool {
        *self == Type::boolean()
    }

    fn is_int(&self) -> bool {
        matches!(self, Type::Scalar {sz} if sz.is_integer())
    }

    fn is_float(&self) -> bool {
        matches!(self, Type::Scalar {sz} if sz.is_floating_point())
    }
}

// Folds literal subexpressions and removes neutral elements. Only integer products with zero are
// removed, as a floating-point product with zero is not zero for infinite or NaN operands.
pub fn fold_expr(e: Expr) -> Expr {
    match e {
        Expr::UnOp {op, arg, ty} => {
            let arg = fold_expr(*arg);
            constant_fold_unop(op, arg, ty)
        },
        Expr::BinOp {lhs, op, rhs, ty} => {
            let lhs = fold_expr(*lhs);
            let rhs = fold_expr(*rhs);
            constant_fold_binop(lhs, op, rhs, ty)
        },
        Expr::Symbol {..} | Expr::Bool {..} | Expr::Int {..} | Expr::Float {..} |
        Expr::Rational {..} | Expr::Piecewise {..} | Expr::Call {..} | Expr::Cast {..} |
        Expr::AddressOf {..} | Expr::FieldAccess {..} | Expr::ResolvedAccess {..} |
        Expr::VectorAccess {..} | Expr::GpuIndex {..} => e.smap(fold_expr)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::expr::ast_builder::*;
    use crate::expr::types::retype;
    use crate::utils::ast::ElemSize;

    fn fold(e: Expr) -> Expr {
        fold_expr(retype(e))
    }

    #[test]
    fn fold_integer_index() {
        let e = add(mul(int(2), int(3)), int(4));
        assert_eq!(fold(e), int(10));
    }

    #[test]
    fn remove_zero_offset() {
        let x = typed_sym("ctr_0", ElemSize::I64);
        assert_eq!(fold(add(x.clone(), int(0))), x);
        assert_eq!(fold(add(int(0), x.clone())), x);
    }

    #[test]
    fn remove_integer_zero_product() {
        let x = typed_sym("_stride_f_0", ElemSize::I64);
        assert_eq!(fold(mul(x, int(0))), int(0));
    }

    #[test]
    fn keep_float_zero_product() {
        let x = typed_sym("a", ElemSize::F64);
        let e = fold(mul(x, float(0.0)));
        assert!(matches!(e, Expr::BinOp {op: BinOp::Mul, ..}));
    }

    #[test]
    fn fold_nested_in_call() {
        let e = call("sqrt", vec![add(float(1.0), float(3.0))]);
        match fold(e) {
            Expr::Call {args, ..} => assert_eq!(args[0], float(4.0)),
            e => panic!("unexpected expression {e:?}")
        }
    }
}
