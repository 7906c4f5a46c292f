use super::known_functions;
use crate::expr::ast::*;
use crate::expr::pprint::parenthesize_child;
use crate::expr::types::Type;
use crate::ir::ast::*;
use crate::option::Dialect;
use crate::stencil_compile_error;
use crate::utils::ast::{BinOp, ElemSize, UnOp};
use crate::utils::err::*;
use crate::utils::pprint::*;
use crate::vectorize::instruction_sets::{InstructionSetDesc, VecOp};

use itertools::Itertools;

type PrintResult = CompileResult<(PrettyPrintEnv, String)>;

// Prints the IR of a kernel as source code of one dialect. The instruction set, if any, provides
// the intrinsics used for vector-typed expressions.
pub struct CodePrinter<'a> {
    pub dialect: Dialect,
    pub instruction_set: Option<&'a InstructionSetDesc>,
    pub f32_literals: Option<bool>,
}

fn is_atomic(s: &str) -> bool {
    s.chars().all(|c| c.is_alphanumeric() || c == '_' || c == '.')
}

fn parenthesize(s: String) -> String {
    if is_atomic(&s) { s } else { format!("({s})") }
}

fn integer_exponent(e: &Expr) -> Option<i64> {
    match e {
        Expr::Int {v, ..} => Some(*v),
        Expr::Float {v, ..} if v.fract() == 0.0 && v.abs() < 8.0 => Some(*v as i64),
        _ => None
    }
}

fn is_square_root(e: &Expr) -> bool {
    matches!(e.numeric_value(), Some(v) if v == 0.5)
}

impl<'a> CodePrinter<'a> {
    pub fn new(
        dialect: Dialect,
        instruction_set: Option<&'a InstructionSetDesc>,
        f32_literals: Option<bool>
    ) -> Self {
        CodePrinter {dialect, instruction_set, f32_literals}
    }

    fn vector_ops(&self) -> CompileResult<&'a InstructionSetDesc> {
        match self.instruction_set {
            Some(is) => Ok(is),
            None => stencil_compile_error!("Cannot print vector code without an instruction set")
        }
    }

    fn not_supported(&self, code: String) -> String {
        format!("Not supported in {0}: {code}", self.dialect)
    }

    fn print_float_literal(&self, v: f64, ty: &Type) -> String {
        let is_f32 = self.f32_literals
            .unwrap_or_else(|| ty.get_scalar_elem_size() == Some(&ElemSize::F32));
        let s = print_float(v);
        if is_f32 && v.is_finite() {
            format!("{s}f")
        } else {
            s
        }
    }

    fn broadcast(&self, v: f64) -> CompileResult<String> {
        let is = self.vector_ops()?;
        let lit = self.print_float_literal(v, &Type::scalar(is.elem));
        is.format(VecOp::MakeVec, &[lit])
    }

    pub fn print_type(&self, ty: &Type) -> CompileResult<String> {
        match ty {
            Type::Scalar {sz} => Ok(sz.c_name().to_string()),
            Type::Vector {sz, ..} => Ok(self.vector_ops()?.vector_type_name(sz)),
            Type::Pointer {ty, is_const, restrict} => {
                let global = if self.dialect == Dialect::OpenCl { "__global " } else { "" };
                let qualifier = if *is_const { "const " } else { "" };
                let restrict = if *restrict { " RESTRICT" } else { "" };
                Ok(format!("{global}{qualifier}{0} *{restrict}", self.print_type(ty)?))
            },
            Type::Struct {id, ..} => Ok(format!("struct {id}")),
            Type::Unknown => stencil_compile_error!("Cannot print a value of unknown type"),
        }
    }

    fn print_args(&self, env: PrettyPrintEnv, args: &[Expr]) -> CompileResult<(PrettyPrintEnv, Vec<String>)> {
        args.iter().try_fold((env, vec![]), |(env, mut strs), a| {
            let (env, s) = self.print_expr(env, a)?;
            strs.push(s);
            Ok((env, strs))
        })
    }

    fn print_gpu_index(&self, kind: &GpuIndexKind, dim: &Dim) -> CompileResult<String> {
        match self.dialect {
            Dialect::Cuda => Ok(format!("{kind}.{dim}")),
            Dialect::OpenCl => {
                let f = match kind {
                    GpuIndexKind::ThreadIdx => "get_local_id",
                    GpuIndexKind::BlockIdx => "get_group_id",
                    GpuIndexKind::BlockDim => "get_local_size",
                    GpuIndexKind::GridDim => "get_global_size",
                };
                Ok(format!("{f}({0})", dim.index()))
            },
            Dialect::C => stencil_compile_error!("Unknown indexing symbol {kind}.{dim} in C code"),
        }
    }

    fn print_pow(&self, env: PrettyPrintEnv, base: &Expr, exponent: &Expr, is_vector: bool) -> PrintResult {
        let (env, b) = self.print_expr(env, base)?;
        let n = integer_exponent(exponent);
        if is_vector {
            let is = self.vector_ops()?;
            let product = |n: i64| -> CompileResult<String> {
                (1..n).try_fold(b.clone(), |acc, _| is.format(VecOp::Mul, &[acc, b.clone()]))
            };
            let s = match n {
                Some(n) if n > 0 && n < 8 => product(n)?,
                Some(n) if n < 0 && n > -8 => is.format(VecOp::Div, &[self.broadcast(1.0)?, product(-n)?])?,
                _ if is_square_root(exponent) => is.format(VecOp::Sqrt, &[b])?,
                _ => {
                    return stencil_compile_error!(
                        "Cannot print vectorized power with exponent {exponent:?}"
                    );
                }
            };
            Ok((env, s))
        } else {
            let product = |n: i64| format!("({0})", vec![parenthesize(b.clone()); n as usize].join("*"));
            let s = match n {
                Some(n) if n > 0 && n < 8 => product(n),
                Some(n) if n < 0 && n > -8 => format!("(1 / {0})", product(-n)),
                _ if is_square_root(exponent) => format!("sqrt({b})"),
                _ => {
                    let (_, e) = self.print_expr(PrettyPrintEnv::new(), exponent)?;
                    format!("pow({b}, {e})")
                }
            };
            Ok((env, s))
        }
    }

    fn print_vector_binop(&self, env: PrettyPrintEnv, lhs: &Expr, op: &BinOp, rhs: &Expr) -> PrintResult {
        let is = self.vector_ops()?;
        let vop = match VecOp::from_binop(op) {
            Some(vop) => vop,
            None => return stencil_compile_error!("Operator {op} is not supported on vectors")
        };
        let (env, l) = self.print_expr(env, lhs)?;
        let (env, r) = self.print_expr(env, rhs)?;
        Ok((env, is.format(vop, &[l, r])?))
    }

    fn print_scalar_binop(&self, env: PrettyPrintEnv, lhs: &Expr, op: &BinOp, rhs: &Expr, ty: &Type) -> PrintResult {
        let (env, l) = self.print_expr(env, lhs)?;
        let (env, r) = self.print_expr(env, rhs)?;
        let s = match op {
            BinOp::Eq => format!("(({l}) == ({r}))"),
            _ if op.is_bitwise() => format!("({l} {op} {r})"),
            BinOp::Rem if ty.is_float() => format!("fmod({l}, {r})"),
            _ => {
                let l = if parenthesize_child(op, lhs, false) { format!("({l})") } else { l };
                let r = if parenthesize_child(op, rhs, true) { format!("({r})") } else { r };
                format!("{l} {op} {r}")
            }
        };
        Ok((env, s))
    }

    fn print_unop(&self, env: PrettyPrintEnv, op: &UnOp, arg: &Expr, is_vector: bool) -> PrintResult {
        let (env, a) = self.print_expr(env, arg)?;
        let s = match (op, is_vector) {
            (UnOp::Neg, true) => {
                self.vector_ops()?.format(VecOp::Mul, &[self.broadcast(-1.0)?, a])?
            },
            (_, true) => return stencil_compile_error!("Operator {op:?} is not supported on vectors"),
            (UnOp::Neg, false) => format!("-{0}", parenthesize(a)),
            (UnOp::Not, false) => format!("!({a})"),
            (UnOp::BitNeg, false) => format!("~{0}", parenthesize(a)),
        };
        Ok((env, s))
    }

    // Piecewise expressions are folded from their last branch, which has to be unconditional,
    // into nested selections.
    fn print_piecewise(&self, env: PrettyPrintEnv, branches: &[(Expr, Expr)], is_vector: bool) -> PrintResult {
        let (last, rest) = match branches.split_last() {
            Some((last, rest)) if last.1.is_true_literal() => (last, rest),
            _ => {
                return stencil_compile_error!(
                    "Piecewise expression requires an unconditional last branch"
                );
            }
        };
        let (env, init) = self.print_expr(env, &last.0)?;
        rest.iter().rev().try_fold((env, init), |(env, acc), (v, c)| {
            let (env, v) = self.print_expr(env, v)?;
            let (env, c) = self.print_expr(env, c)?;
            let s = if is_vector {
                self.vector_ops()?.format(VecOp::Blendv, &[acc, v, c])?
            } else {
                format!("(({c}) ? ({v}) : ({acc}))")
            };
            Ok((env, s))
        })
    }

    fn print_fast_function(&self, func: &str, args: &[String]) -> CompileResult<String> {
        let s = match (func, args, self.dialect) {
            ("fast_division", [a, b], Dialect::Cuda) => format!("__fdividef({a}, {b})"),
            ("fast_division", [a, b], Dialect::OpenCl) => format!("native_divide({a}, {b})"),
            ("fast_division", [a, b], Dialect::C) => format!("(({a}) / ({b}))"),
            ("fast_sqrt", [a], Dialect::Cuda) => format!("__fsqrt_rn({a})"),
            ("fast_sqrt", [a], Dialect::OpenCl) => format!("native_sqrt({a})"),
            ("fast_sqrt", [a], Dialect::C) => format!("sqrt({a})"),
            ("fast_inv_sqrt", [a], Dialect::Cuda) => format!("__frsqrt_rn({a})"),
            ("fast_inv_sqrt", [a], Dialect::OpenCl) => format!("native_rsqrt({a})"),
            ("fast_inv_sqrt", [a], Dialect::C) => format!("(1.0 / sqrt({a}))"),
            _ => {
                return stencil_compile_error!(
                    "Invalid number of arguments {0} to {func}", args.len()
                );
            }
        };
        Ok(s)
    }

    fn print_call(&self, env: PrettyPrintEnv, func: &str, args: &[Expr], is_vector: bool) -> PrintResult {
        let (env, args) = self.print_args(env, args)?;
        if is_vector {
            let is = self.vector_ops()?;
            let s = match (func, args.as_slice()) {
                ("sqrt" | "fast_sqrt", [a]) => is.format(VecOp::Sqrt, &[a.clone()])?,
                ("fast_division", [a, b]) => is.format(VecOp::Div, &[a.clone(), b.clone()])?,
                ("fast_inv_sqrt", [a]) => {
                    let root = is.format(VecOp::Sqrt, &[a.clone()])?;
                    is.format(VecOp::Div, &[self.broadcast(1.0)?, root])?
                },
                _ => return stencil_compile_error!("Function {func} cannot be vectorized")
            };
            return Ok((env, s));
        }
        let s = match func {
            "fast_division" | "fast_sqrt" | "fast_inv_sqrt" => self.print_fast_function(func, &args)?,
            f if known_functions(self.dialect).contains(f) => format!("{f}({0})", args.join(", ")),
            f => self.not_supported(format!("{f}({0})", args.join(", ")))
        };
        Ok((env, s))
    }

    fn print_cast(&self, env: PrettyPrintEnv, e: &Expr, ty: &Type) -> PrintResult {
        let (env, s) = self.print_expr(env, e)?;
        if ty.is_vector() && ty.is_bool() && !e.get_type().is_vector() {
            // Blends select on the lane mask, so a scalar condition becomes a comparison of its
            // broadcast value against zero.
            let is = self.vector_ops()?;
            let elem = Type::scalar(is.elem);
            let one = self.print_float_literal(1.0, &elem);
            let zero = self.print_float_literal(0.0, &elem);
            let lanes = is.format(VecOp::MakeVec, &[format!("(({s}) ? {one} : {zero})")])?;
            Ok((env, is.format(VecOp::Neq, &[lanes, self.broadcast(0.0)?])?))
        } else if ty.is_vector() {
            Ok((env, self.vector_ops()?.format(VecOp::MakeVec, &[s])?))
        } else {
            Ok((env, format!("(({0})({s}))", self.print_type(ty)?)))
        }
    }

    fn print_vector_load(&self, env: PrettyPrintEnv, access: &Expr, aligned: bool) -> PrintResult {
        let (env, s) = self.print_expr(env, access)?;
        let op = if aligned { VecOp::LoadA } else { VecOp::LoadU };
        Ok((env, self.vector_ops()?.format(op, &[format!("&{s}")])?))
    }

    pub fn print_expr(&self, env: PrettyPrintEnv, e: &Expr) -> PrintResult {
        match e {
            Expr::Symbol {id, ..} => Ok(id.pprint(env)),
            Expr::Bool {v, ..} => Ok((env, v.to_string())),
            Expr::Int {v, ..} => Ok((env, v.to_string())),
            Expr::Float {v, ty} => Ok((env, self.print_float_literal(*v, ty))),
            Expr::Rational {num, den, ty} => {
                Ok((env, self.print_float_literal(*num as f64 / *den as f64, ty)))
            },
            Expr::UnOp {op, arg, ty} => self.print_unop(env, op, arg, ty.is_vector()),
            Expr::BinOp {lhs, op: BinOp::Pow, rhs, ty} => {
                self.print_pow(env, lhs, rhs, ty.is_vector())
            },
            Expr::BinOp {lhs, op, rhs, ty} if ty.is_vector() => {
                self.print_vector_binop(env, lhs, op, rhs)
            },
            Expr::BinOp {lhs, op, rhs, ty} => self.print_scalar_binop(env, lhs, op, rhs, ty),
            Expr::Piecewise {branches, ty} => self.print_piecewise(env, branches, ty.is_vector()),
            Expr::Call {func, args, ty} => self.print_call(env, func, args, ty.is_vector()),
            Expr::Cast {e, ty} => self.print_cast(env, e, ty),
            Expr::AddressOf {e, ..} => {
                let (env, s) = self.print_expr(env, e)?;
                Ok((env, format!("&{0}", parenthesize(s))))
            },
            Expr::FieldAccess {access, ..} => {
                stencil_compile_error!("Field access {access} must be resolved before printing")
            },
            Expr::ResolvedAccess {base, index, member, ..} => {
                let (env, base) = base.pprint(env);
                let (env, index) = self.print_expr(env, index)?;
                match member {
                    Some(label) => Ok((env, format!("{base}[{index}].{label}"))),
                    None => Ok((env, format!("{base}[{index}]")))
                }
            },
            Expr::VectorAccess {access, aligned, ..} => self.print_vector_load(env, access, *aligned),
            Expr::GpuIndex {kind, dim, ..} => Ok((env, self.print_gpu_index(kind, dim)?)),
        }
    }

    fn print_body(&self, env: PrettyPrintEnv, body: &[Node]) -> PrintResult {
        let indent = env.print_indent();
        let env = env.incr_indent();
        let (env, body) = self.print_nodes(env, body)?;
        Ok((env.decr_indent(), format!("{indent}{{\n{body}\n{indent}}}")))
    }

    pub fn print_nodes(&self, env: PrettyPrintEnv, nodes: &[Node]) -> PrintResult {
        let (env, strs) = nodes.iter().try_fold((env, vec![]), |(env, mut strs), n| {
            let (env, s) = self.print_node(env, n)?;
            strs.push(s);
            Ok::<_, CompileError>((env, strs))
        })?;
        Ok((env, strs.into_iter().join("\n")))
    }

    fn print_assignment(&self, env: PrettyPrintEnv, lhs: &Expr, rhs: &Expr, is_decl: bool, is_const: bool) -> PrintResult {
        let indent = env.print_indent();
        if let Expr::VectorAccess {access, aligned, nontemporal, ..} = lhs {
            let (env, dst) = self.print_expr(env, access)?;
            let (env, value) = self.print_expr(env, rhs)?;
            let op = match (aligned, nontemporal) {
                (false, _) => VecOp::StoreU,
                (true, true) => VecOp::Stream,
                (true, false) => VecOp::StoreA,
            };
            let store = self.vector_ops()?.format(op, &[format!("&{dst}"), value])?;
            return Ok((env, format!("{indent}{store};")));
        }
        let (env, l) = self.print_expr(env, lhs)?;
        let (env, r) = self.print_expr(env, rhs)?;
        let prefix = if is_decl {
            let qualifier = if is_const { "const " } else { "" };
            format!("{qualifier}{0} ", self.print_type(lhs.get_type())?)
        } else {
            String::new()
        };
        Ok((env, format!("{indent}{prefix}{l} = {r};")))
    }

    pub fn print_node(&self, env: PrettyPrintEnv, node: &Node) -> PrintResult {
        let indent = env.print_indent();
        match node {
            Node::Block {body, pragma} => {
                let pragma = match pragma {
                    Some(p) => format!("{indent}{p}\n"),
                    None => String::new()
                };
                let (env, body) = self.print_body(env, body)?;
                Ok((env, format!("{pragma}{body}")))
            },
            Node::Loop {counter, start, stop, step, body, prefix_lines, ..} => {
                let (env, ctr) = counter.pprint(env);
                let (env, start) = self.print_expr(env, start)?;
                let (env, stop) = self.print_expr(env, stop)?;
                let (env, step) = self.print_expr(env, step)?;
                let prefix = prefix_lines.iter()
                    .map(|l| format!("{indent}{l}\n"))
                    .join("");
                let (env, body) = self.print_body(env, body)?;
                let header = format!(
                    "{indent}for (int64_t {ctr} = {start}; {ctr} < {stop}; {ctr} += {step})"
                );
                Ok((env, format!("{prefix}{header}\n{body}")))
            },
            Node::Conditional {cond, thn, els} => {
                let (env, cond) = self.print_expr(env, cond)?;
                let (env, thn) = self.print_body(env, thn)?;
                match els {
                    Some(els) => {
                        let (env, els) = self.print_body(env, els)?;
                        Ok((env, format!("{indent}if ({cond})\n{thn}\n{indent}else\n{els}")))
                    },
                    None => Ok((env, format!("{indent}if ({cond})\n{thn}")))
                }
            },
            Node::Assignment {lhs, rhs, is_decl, is_const} => {
                self.print_assignment(env, lhs, rhs, *is_decl, *is_const)
            },
            Node::TempAlloc {id, ty, size, offset} => {
                let (env, id) = id.pprint(env);
                let (env, size) = self.print_expr(env, size)?;
                let ty_str = self.print_type(ty)?;
                let elem = match ty.pointee() {
                    Some(t) => self.print_type(t)?,
                    None => return stencil_compile_error!("Temporary {id} must have a pointer type")
                };
                let s = format!(
                    "{indent}{ty_str} {id} = ({ty_str}) aligned_alloc(64, ({size}) * sizeof({elem})) + {offset};"
                );
                Ok((env, s))
            },
            Node::TempFree {id, offset, ..} => {
                let (env, id) = id.pprint(env);
                Ok((env, format!("{indent}free({id} - {offset});")))
            },
            Node::CustomCode {code, ..} => {
                Ok((env, code.lines().map(|l| format!("{indent}{l}")).join("\n")))
            },
            Node::ThreadBlockSync => match self.dialect {
                Dialect::Cuda => Ok((env, format!("{indent}__syncthreads();"))),
                _ => Ok((env, format!("{indent}{0}", self.not_supported("__syncthreads();".to_string()))))
            },
        }
    }

    pub fn print_param(&self, env: PrettyPrintEnv, p: &Param) -> PrintResult {
        let (env, id) = p.id.pprint(env);
        Ok((env, format!("{0} {id}", self.print_type(&p.ty)?)))
    }

    fn function_prefix(&self, kernel: &KernelFunction) -> String {
        match self.dialect {
            Dialect::C => "FUNC_PREFIX".to_string(),
            Dialect::Cuda => match &kernel.gpu_indexing {
                Some(GpuIndexingInfo {mapping: GpuMapping::Block {block_size, ..}, ..}) => {
                    format!("FUNC_PREFIX __launch_bounds__({0})", block_size.prod())
                },
                _ => "FUNC_PREFIX".to_string()
            },
            Dialect::OpenCl => "__kernel".to_string(),
        }
    }

    pub fn print_signature(&self, env: PrettyPrintEnv, kernel: &KernelFunction) -> PrintResult {
        let (env, params) = kernel.params.iter().try_fold((env, vec![]), |(env, mut strs), p| {
            let (env, s) = self.print_param(env, p)?;
            strs.push(s);
            Ok::<_, CompileError>((env, strs))
        })?;
        let prefix = self.function_prefix(kernel);
        Ok((env, format!("{prefix} void {0}({1})", kernel.name, params.join(", "))))
    }

    pub fn print_function(&self, kernel: &KernelFunction) -> CompileResult<String> {
        let (env, signature) = self.print_signature(PrettyPrintEnv::new(), kernel)?;
        let (_, body) = self.print_body(env, &kernel.body)?;
        Ok(format!("{signature}\n{body}"))
    }
}
