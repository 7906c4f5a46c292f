use crate::expr::types::Type;
use crate::stencil_compile_error;
use crate::utils::ast::{BinOp, ElemSize, UnOp};
use crate::utils::err::*;

use std::collections::BTreeMap;

// A runtime value of the evaluator. Pointers refer to an element of a named buffer, and vectors
// hold one scalar value per lane.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Float(f64),
    Pointer {buffer: String, offset: i64},
    Struct(BTreeMap<String, Value>),
    Vector(Vec<Value>),
}

impl Value {
    pub fn as_int(&self) -> CompileResult<i64> {
        match self {
            Value::Int(v) => Ok(*v),
            Value::Bool(b) => Ok(*b as i64),
            v => stencil_compile_error!("Expected an integer value, found {v:?}")
        }
    }

    pub fn as_float(&self) -> CompileResult<f64> {
        match self {
            Value::Float(v) => Ok(*v),
            Value::Int(v) => Ok(*v as f64),
            Value::Bool(b) => Ok(if *b { 1.0 } else { 0.0 }),
            v => stencil_compile_error!("Expected a numeric value, found {v:?}")
        }
    }

    pub fn as_bool(&self) -> CompileResult<bool> {
        match self {
            Value::Bool(b) => Ok(*b),
            Value::Int(v) => Ok(*v != 0),
            Value::Float(v) => Ok(*v != 0.0),
            v => stencil_compile_error!("Expected a boolean value, found {v:?}")
        }
    }

    pub fn member(&self, label: &str) -> CompileResult<Value> {
        match self {
            Value::Struct(members) => match members.get(label) {
                Some(v) => Ok(v.clone()),
                None => stencil_compile_error!("Struct value has no member {label}")
            },
            v => stencil_compile_error!("Cannot access member {label} of {v:?}")
        }
    }

    fn width(&self) -> Option<usize> {
        match self {
            Value::Vector(lanes) => Some(lanes.len()),
            _ => None
        }
    }

    fn lane(&self, i: usize) -> Value {
        match self {
            Value::Vector(lanes) => lanes[i].clone(),
            v => v.clone()
        }
    }
}

fn round_f32(v: f64) -> f64 {
    v as f32 as f64
}

// Converts a scalar value to the representation of an element type.
pub fn convert(v: Value, sz: &ElemSize) -> CompileResult<Value> {
    match sz {
        ElemSize::F32 => Ok(Value::Float(round_f32(v.as_float()?))),
        ElemSize::F64 => Ok(Value::Float(v.as_float()?)),
        ElemSize::Bool => Ok(Value::Bool(v.as_bool()?)),
        _ => match v {
            Value::Float(f) => Ok(Value::Int(f as i64)),
            v => Ok(Value::Int(v.as_int()?)),
        }
    }
}

// Converts a value to the representation of a type, broadcasting scalars to vector types.
pub fn convert_to(v: Value, ty: &Type) -> CompileResult<Value> {
    match ty {
        Type::Scalar {sz} => convert(v, sz),
        Type::Vector {sz, width} => {
            let lanes = (0..*width)
                .map(|i| convert(v.lane(i), sz))
                .collect::<CompileResult<Vec<Value>>>()?;
            Ok(Value::Vector(lanes))
        },
        _ => Ok(v)
    }
}

// Rounds the result of an operation typed as 32-bit float.
pub fn round_to(v: Value, ty: &Type) -> Value {
    if ty.base_elem_size() != Some(ElemSize::F32) {
        return v;
    }
    match v {
        Value::Float(f) => Value::Float(round_f32(f)),
        Value::Vector(lanes) => Value::Vector(lanes.into_iter().map(|l| round_to(l, ty)).collect()),
        v => v
    }
}

// Applies a scalar operation lane by lane when any of the arguments is a vector.
pub fn lanewise(
    args: Vec<Value>,
    f: impl Fn(&[Value]) -> CompileResult<Value>
) -> CompileResult<Value> {
    match args.iter().filter_map(|a| a.width()).max() {
        Some(width) => {
            let lanes = (0..width)
                .map(|i| {
                    let lane_args = args.iter().map(|a| a.lane(i)).collect::<Vec<Value>>();
                    f(&lane_args)
                })
                .collect::<CompileResult<Vec<Value>>>()?;
            Ok(Value::Vector(lanes))
        },
        None => f(&args)
    }
}

fn checked_int(op: &BinOp, l: i64, r: i64, v: Option<i64>) -> CompileResult<Value> {
    match v {
        Some(v) => Ok(Value::Int(v)),
        None => stencil_compile_error!("Integer operation {l} {op} {r} overflows or is undefined")
    }
}

fn int_binop(op: &BinOp, l: i64, r: i64) -> CompileResult<Value> {
    let shift = u32::try_from(r).ok();
    let v = match op {
        BinOp::Add => Value::Int(l.wrapping_add(r)),
        BinOp::Sub => Value::Int(l.wrapping_sub(r)),
        BinOp::Mul => Value::Int(l.wrapping_mul(r)),
        BinOp::Div | BinOp::Rem if r == 0 => {
            return stencil_compile_error!("Integer division by zero");
        },
        BinOp::Div => return checked_int(op, l, r, l.checked_div(r)),
        BinOp::Rem => return checked_int(op, l, r, l.checked_rem(r)),
        BinOp::Pow if r >= 0 => Value::Int(l.wrapping_pow(r as u32)),
        BinOp::Pow => Value::Float((l as f64).powf(r as f64)),
        BinOp::And => Value::Bool(l != 0 && r != 0),
        BinOp::Or => Value::Bool(l != 0 || r != 0),
        BinOp::BitAnd => Value::Int(l & r),
        BinOp::BitOr => Value::Int(l | r),
        BinOp::BitXor => Value::Int(l ^ r),
        BinOp::BitShl => return checked_int(op, l, r, shift.and_then(|n| l.checked_shl(n))),
        BinOp::BitShr => return checked_int(op, l, r, shift.and_then(|n| l.checked_shr(n))),
        BinOp::Eq => Value::Bool(l == r),
        BinOp::Neq => Value::Bool(l != r),
        BinOp::Leq => Value::Bool(l <= r),
        BinOp::Geq => Value::Bool(l >= r),
        BinOp::Lt => Value::Bool(l < r),
        BinOp::Gt => Value::Bool(l > r),
    };
    Ok(v)
}

fn float_binop(op: &BinOp, l: f64, r: f64) -> CompileResult<Value> {
    let v = match op {
        BinOp::Add => Value::Float(l + r),
        BinOp::Sub => Value::Float(l - r),
        BinOp::Mul => Value::Float(l * r),
        BinOp::Div => Value::Float(l / r),
        BinOp::Rem => Value::Float(l % r),
        BinOp::Pow => Value::Float(l.powf(r)),
        BinOp::And => Value::Bool(l != 0.0 && r != 0.0),
        BinOp::Or => Value::Bool(l != 0.0 || r != 0.0),
        BinOp::Eq => Value::Bool(l == r),
        BinOp::Neq => Value::Bool(l != r),
        BinOp::Leq => Value::Bool(l <= r),
        BinOp::Geq => Value::Bool(l >= r),
        BinOp::Lt => Value::Bool(l < r),
        BinOp::Gt => Value::Bool(l > r),
        BinOp::BitAnd | BinOp::BitOr | BinOp::BitXor | BinOp::BitShl | BinOp::BitShr => {
            return stencil_compile_error!("Bitwise operator {op} applied to floating-point values");
        }
    };
    Ok(v)
}

fn scalar_binop(op: &BinOp, l: &Value, r: &Value) -> CompileResult<Value> {
    match (l, r) {
        (Value::Pointer {buffer, offset}, Value::Int(i)) if *op == BinOp::Add => {
            Ok(Value::Pointer {buffer: buffer.clone(), offset: offset + i})
        },
        (Value::Int(i), Value::Pointer {buffer, offset}) if *op == BinOp::Add => {
            Ok(Value::Pointer {buffer: buffer.clone(), offset: offset + i})
        },
        (Value::Pointer {buffer, offset}, Value::Int(i)) if *op == BinOp::Sub => {
            Ok(Value::Pointer {buffer: buffer.clone(), offset: offset - i})
        },
        (Value::Bool(l), Value::Bool(r)) => match op {
            BinOp::And | BinOp::BitAnd => Ok(Value::Bool(*l && *r)),
            BinOp::Or | BinOp::BitOr => Ok(Value::Bool(*l || *r)),
            BinOp::BitXor | BinOp::Neq => Ok(Value::Bool(l != r)),
            BinOp::Eq => Ok(Value::Bool(l == r)),
            _ => int_binop(op, *l as i64, *r as i64)
        },
        (Value::Int(_) | Value::Bool(_), Value::Int(_) | Value::Bool(_)) => {
            int_binop(op, l.as_int()?, r.as_int()?)
        },
        (Value::Float(_), Value::Int(_) | Value::Float(_) | Value::Bool(_)) |
        (Value::Int(_) | Value::Bool(_), Value::Float(_)) => {
            float_binop(op, l.as_float()?, r.as_float()?)
        },
        _ => stencil_compile_error!("Operator {op} cannot be applied to {l:?} and {r:?}")
    }
}

pub fn binop(op: &BinOp, l: Value, r: Value) -> CompileResult<Value> {
    lanewise(vec![l, r], |args| scalar_binop(op, &args[0], &args[1]))
}

pub fn unop(op: &UnOp, v: Value) -> CompileResult<Value> {
    lanewise(vec![v], |args| match (op, &args[0]) {
        (UnOp::Neg, Value::Int(i)) => Ok(Value::Int(-i)),
        (UnOp::Neg, Value::Float(f)) => Ok(Value::Float(-f)),
        (UnOp::Not, v) => Ok(Value::Bool(!v.as_bool()?)),
        (UnOp::BitNeg, Value::Int(i)) => Ok(Value::Int(!i)),
        (op, v) => stencil_compile_error!("Operator {op:?} cannot be applied to {v:?}")
    })
}

fn float_fn(args: &[Value], f: impl Fn(f64) -> f64) -> CompileResult<Value> {
    match args {
        [a] => Ok(Value::Float(f(a.as_float()?))),
        _ => stencil_compile_error!("Expected one argument, found {0}", args.len())
    }
}

fn float_fn2(args: &[Value], f: impl Fn(f64, f64) -> f64) -> CompileResult<Value> {
    match args {
        [a, b] => Ok(Value::Float(f(a.as_float()?, b.as_float()?))),
        _ => stencil_compile_error!("Expected two arguments, found {0}", args.len())
    }
}

fn scalar_call(func: &str, args: &[Value]) -> CompileResult<Value> {
    match func {
        "sqrt" | "fast_sqrt" => float_fn(args, f64::sqrt),
        "fast_inv_sqrt" => float_fn(args, |x| 1.0 / x.sqrt()),
        "cbrt" => float_fn(args, f64::cbrt),
        "exp" => float_fn(args, f64::exp),
        "exp2" => float_fn(args, f64::exp2),
        "log" => float_fn(args, f64::ln),
        "log2" => float_fn(args, f64::log2),
        "log10" => float_fn(args, f64::log10),
        "sin" => float_fn(args, f64::sin),
        "cos" => float_fn(args, f64::cos),
        "tan" => float_fn(args, f64::tan),
        "asin" => float_fn(args, f64::asin),
        "acos" => float_fn(args, f64::acos),
        "atan" => float_fn(args, f64::atan),
        "sinh" => float_fn(args, f64::sinh),
        "cosh" => float_fn(args, f64::cosh),
        "tanh" => float_fn(args, f64::tanh),
        "floor" => float_fn(args, f64::floor),
        "ceil" => float_fn(args, f64::ceil),
        "round" => float_fn(args, f64::round),
        "fabs" => float_fn(args, f64::abs),
        "abs" => match args {
            [Value::Int(i)] => Ok(Value::Int(i.abs())),
            _ => float_fn(args, f64::abs)
        },
        "fast_division" => float_fn2(args, |a, b| a / b),
        "atan2" => float_fn2(args, f64::atan2),
        "fmod" => float_fn2(args, |a, b| a % b),
        "pow" => float_fn2(args, f64::powf),
        "fmin" | "min" => match args {
            [Value::Int(a), Value::Int(b)] => Ok(Value::Int(*a.min(b))),
            _ => float_fn2(args, f64::min)
        },
        "fmax" | "max" => match args {
            [Value::Int(a), Value::Int(b)] => Ok(Value::Int(*a.max(b))),
            _ => float_fn2(args, f64::max)
        },
        _ => stencil_compile_error!("Cannot evaluate call to unknown function {func}")
    }
}

pub fn call(func: &str, args: Vec<Value>) -> CompileResult<Value> {
    lanewise(args, |args| scalar_call(func, args))
}

#[cfg(test)]
mod test {
    use super::*;

    fn vec_f(v: &[f64]) -> Value {
        Value::Vector(v.iter().map(|x| Value::Float(*x)).collect())
    }

    #[test]
    fn integer_division_truncates() {
        assert_eq!(binop(&BinOp::Div, Value::Int(-7), Value::Int(2)).unwrap(), Value::Int(-3));
        assert!(binop(&BinOp::Div, Value::Int(1), Value::Int(0)).is_err());
    }

    #[test]
    fn undefined_integer_operations_fail() {
        assert!(binop(&BinOp::Div, Value::Int(i64::MIN), Value::Int(-1)).is_err());
        assert!(binop(&BinOp::Rem, Value::Int(i64::MIN), Value::Int(-1)).is_err());
        assert!(binop(&BinOp::BitShl, Value::Int(1), Value::Int(64)).is_err());
        assert!(binop(&BinOp::BitShr, Value::Int(1), Value::Int(-1)).is_err());
        assert_eq!(binop(&BinOp::BitShl, Value::Int(1), Value::Int(3)).unwrap(), Value::Int(8));
    }

    #[test]
    fn mixed_arithmetic_promotes() {
        let v = binop(&BinOp::Mul, Value::Int(2), Value::Float(0.5)).unwrap();
        assert_eq!(v, Value::Float(1.0));
    }

    #[test]
    fn pointer_arithmetic() {
        let p = Value::Pointer {buffer: "f".to_string(), offset: 3};
        let q = binop(&BinOp::Add, p, Value::Int(4)).unwrap();
        assert_eq!(q, Value::Pointer {buffer: "f".to_string(), offset: 7});
    }

    #[test]
    fn vectors_broadcast_scalars() {
        let v = binop(&BinOp::Add, vec_f(&[1.0, 2.0]), Value::Float(1.0)).unwrap();
        assert_eq!(v, vec_f(&[2.0, 3.0]));
        let c = binop(&BinOp::Lt, vec_f(&[1.0, 3.0]), Value::Float(2.0)).unwrap();
        assert_eq!(c, Value::Vector(vec![Value::Bool(true), Value::Bool(false)]));
    }

    #[test]
    fn f32_rounding() {
        let ty = Type::scalar(ElemSize::F32);
        assert_eq!(round_to(Value::Float(0.1), &ty), Value::Float(0.1f32 as f64));
        assert_eq!(convert(Value::Float(2.7), &ElemSize::I32).unwrap(), Value::Int(2));
    }

    #[test]
    fn calls() {
        assert_eq!(call("sqrt", vec![Value::Float(4.0)]).unwrap(), Value::Float(2.0));
        assert_eq!(call("max", vec![Value::Int(1), Value::Int(3)]).unwrap(), Value::Int(3));
        assert!(call("foo", vec![]).is_err());
    }
}
