use super::ast::*;
use crate::utils::ast::{BinOp, UnOp};
use crate::utils::pprint::*;

use itertools::Itertools;

use std::cmp::Ordering;

fn print_unop(op: &UnOp) -> &'static str {
    match op {
        UnOp::Neg => "-",
        UnOp::Not => "!",
        UnOp::BitNeg => "~",
    }
}

pub fn parenthesize_child(parent: &BinOp, child: &Expr, is_rhs: bool) -> bool {
    match child {
        Expr::BinOp {op, ..} => match BinOp::precedence(parent, op) {
            Ordering::Greater => true,
            Ordering::Equal => is_rhs,
            Ordering::Less => false,
        },
        _ => false
    }
}

fn pprint_operand(
    env: PrettyPrintEnv,
    parent: &BinOp,
    e: &Expr,
    is_rhs: bool
) -> (PrettyPrintEnv, String) {
    let (env, s) = e.pprint(env);
    if parenthesize_child(parent, e, is_rhs) {
        (env, format!("({s})"))
    } else {
        (env, s)
    }
}

impl PrettyPrint for Expr {
    fn pprint(&self, env: PrettyPrintEnv) -> (PrettyPrintEnv, String) {
        match self {
            Expr::Symbol {id, ..} => id.pprint(env),
            Expr::Bool {v, ..} => (env, v.to_string()),
            Expr::Int {v, ..} => (env, v.to_string()),
            Expr::Float {v, ..} => (env, print_float(*v)),
            Expr::Rational {num, den, ..} => (env, format!("{num}/{den}")),
            Expr::UnOp {op, arg, ..} => {
                let (env, arg) = arg.pprint(env);
                let op = print_unop(op);
                match arg.chars().all(|c| c.is_alphanumeric() || c == '_') {
                    true => (env, format!("{op}{arg}")),
                    false => (env, format!("{op}({arg})")),
                }
            },
            Expr::BinOp {lhs, op, rhs, ..} => {
                let (env, l) = pprint_operand(env, op, lhs, false);
                let (env, r) = pprint_operand(env, op, rhs, true);
                (env, format!("{l} {op} {r}"))
            },
            Expr::Piecewise {branches, ..} => {
                let (env, strs) = branches.iter()
                    .fold((env, vec![]), |(env, mut strs), (v, c)| {
                        let (env, v) = v.pprint(env);
                        let (env, c) = c.pprint(env);
                        strs.push(format!("({v}, {c})"));
                        (env, strs)
                    });
                (env, format!("Piecewise({})", strs.into_iter().join(", ")))
            },
            Expr::Call {func, args, ..} => {
                let (env, args) = pprint_iter(args.iter(), env, ", ");
                (env, format!("{func}({args})"))
            },
            Expr::Cast {e, ty} => {
                let (env, e) = e.pprint(env);
                (env, format!("({ty})({e})"))
            },
            Expr::AddressOf {e, ..} => {
                let (env, e) = e.pprint(env);
                (env, format!("&({e})"))
            },
            Expr::FieldAccess {access, ..} => (env, access.to_string()),
            Expr::ResolvedAccess {base, index, member, ..} => {
                let (env, base) = base.pprint(env);
                let (env, index) = index.pprint(env);
                match member {
                    Some(label) => (env, format!("{base}[{index}].{label}")),
                    None => (env, format!("{base}[{index}]"))
                }
            },
            Expr::VectorAccess {access, aligned, nontemporal, ty} => {
                let (env, access) = access.pprint(env);
                let mut flags = vec![];
                if *aligned {
                    flags.push("aligned");
                }
                if *nontemporal {
                    flags.push("nontemporal");
                }
                let flags = if flags.is_empty() {
                    String::new()
                } else {
                    format!(", {}", flags.join(", "))
                };
                (env, format!("vec<{ty}>({access}{flags})"))
            },
            Expr::GpuIndex {kind, dim, ..} => (env, format!("{kind}.{dim}")),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::expr::ast_builder::*;

    #[test]
    fn print_respects_precedence() {
        let e = mul(add(sym("a"), sym("b")), sym("c"));
        assert_eq!(e.pprint_default(), "(a + b) * c");
        let e = add(sym("a"), mul(sym("b"), sym("c")));
        assert_eq!(e.pprint_default(), "a + b * c");
    }

    #[test]
    fn print_right_associated_subtraction() {
        let e = sub(sym("a"), sub(sym("b"), sym("c")));
        assert_eq!(e.pprint_default(), "a - (b - c)");
    }

    #[test]
    fn print_field_access() {
        let f = field2d("src", crate::utils::ast::ElemSize::F64);
        assert_eq!(at(&f, &[1, -1]).pprint_default(), "src[1,-1]");
    }
}
