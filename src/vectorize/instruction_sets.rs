use crate::stencil_vectorize_error;
use crate::utils::ast::{BinOp, ElemSize};
use crate::utils::err::*;

use lazy_static::lazy_static;
use strum::IntoEnumIterator;
use strum_macros::EnumIter;

use std::collections::BTreeMap;
use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, EnumIter)]
pub enum InstructionSet {
    Sse, Avx, Avx512
}

impl InstructionSet {
    pub fn parse(s: &str) -> CompileResult<InstructionSet> {
        InstructionSet::iter()
            .find(|is| is.to_string() == s.to_lowercase())
            .map(Ok)
            .unwrap_or_else(|| stencil_vectorize_error!("Unknown instruction set '{s}'"))
    }

    fn prefix(&self) -> &'static str {
        match self {
            InstructionSet::Sse => "_mm",
            InstructionSet::Avx => "_mm256",
            InstructionSet::Avx512 => "_mm512",
        }
    }

    fn register_bits(&self) -> usize {
        match self {
            InstructionSet::Sse => 128,
            InstructionSet::Avx => 256,
            InstructionSet::Avx512 => 512,
        }
    }

    fn headers(&self) -> Vec<String> {
        let headers: &[&str] = match self {
            InstructionSet::Sse => &[
                "<xmmintrin.h>", "<emmintrin.h>", "<pmmintrin.h>",
                "<tmmintrin.h>", "<smmintrin.h>", "<nmmintrin.h>"
            ],
            InstructionSet::Avx | InstructionSet::Avx512 => &["<immintrin.h>"],
        };
        headers.iter().map(|s| s.to_string()).collect()
    }
}

impl fmt::Display for InstructionSet {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            InstructionSet::Sse => write!(f, "sse"),
            InstructionSet::Avx => write!(f, "avx"),
            InstructionSet::Avx512 => write!(f, "avx512"),
        }
    }
}

// Abstract vector operations with an intrinsic template in every instruction set.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, EnumIter)]
pub enum VecOp {
    Add, Sub, Mul, Div,
    Eq, Neq, Geq, Leq, Lt, Gt,
    And, Or,
    Blendv, Sqrt,
    MakeVec, MakeZero,
    LoadU, LoadA, StoreU, StoreA, Stream,
}

impl VecOp {
    pub fn from_binop(op: &BinOp) -> Option<VecOp> {
        match op {
            BinOp::Add => Some(VecOp::Add),
            BinOp::Sub => Some(VecOp::Sub),
            BinOp::Mul => Some(VecOp::Mul),
            BinOp::Div => Some(VecOp::Div),
            BinOp::Eq => Some(VecOp::Eq),
            BinOp::Neq => Some(VecOp::Neq),
            BinOp::Geq => Some(VecOp::Geq),
            BinOp::Leq => Some(VecOp::Leq),
            BinOp::Lt => Some(VecOp::Lt),
            BinOp::Gt => Some(VecOp::Gt),
            BinOp::And | BinOp::BitAnd => Some(VecOp::And),
            BinOp::Or | BinOp::BitOr => Some(VecOp::Or),
            _ => None
        }
    }

    fn is_comparison(&self) -> bool {
        matches!(self, VecOp::Eq | VecOp::Neq | VecOp::Geq | VecOp::Leq | VecOp::Lt | VecOp::Gt)
    }

    // The intrinsic name and the argument list of the AVX-style template.
    fn base_template(&self) -> (&'static str, &'static [&'static str]) {
        match self {
            VecOp::Add => ("add", &["{0}", "{1}"]),
            VecOp::Sub => ("sub", &["{0}", "{1}"]),
            VecOp::Mul => ("mul", &["{0}", "{1}"]),
            VecOp::Div => ("div", &["{0}", "{1}"]),
            VecOp::Eq => ("cmp", &["{0}", "{1}", "_CMP_EQ_UQ"]),
            VecOp::Neq => ("cmp", &["{0}", "{1}", "_CMP_NEQ_UQ"]),
            VecOp::Geq => ("cmp", &["{0}", "{1}", "_CMP_GE_OQ"]),
            VecOp::Leq => ("cmp", &["{0}", "{1}", "_CMP_LE_OQ"]),
            VecOp::Lt => ("cmp", &["{0}", "{1}", "_CMP_NGE_UQ"]),
            VecOp::Gt => ("cmp", &["{0}", "{1}", "_CMP_NLE_UQ"]),
            VecOp::And => ("and", &["{0}", "{1}"]),
            VecOp::Or => ("or", &["{0}", "{1}"]),
            VecOp::Blendv => ("blendv", &["{0}", "{1}", "{2}"]),
            VecOp::Sqrt => ("sqrt", &["{0}"]),
            VecOp::MakeVec => ("set", &[]),
            VecOp::MakeZero => ("setzero", &[]),
            VecOp::LoadU => ("loadu", &["{0}"]),
            VecOp::LoadA => ("load", &["{0}"]),
            VecOp::StoreU => ("storeu", &["{0}", "{1}"]),
            VecOp::StoreA => ("store", &["{0}", "{1}"]),
            VecOp::Stream => ("stream", &["{0}", "{1}"]),
        }
    }
}

// The intrinsics of one instruction set for one floating-point element type.
#[derive(Clone, Debug, PartialEq)]
pub struct InstructionSetDesc {
    pub name: InstructionSet,
    pub elem: ElemSize,
    pub width: usize,
    pub headers: Vec<String>,
    ops: BTreeMap<VecOp, String>,
}

fn sse_comparison(op: &VecOp) -> &'static str {
    match op {
        VecOp::Eq => "cmpeq",
        VecOp::Neq => "cmpneq",
        VecOp::Geq => "cmpge",
        VecOp::Leq => "cmple",
        VecOp::Lt => "cmplt",
        _ => "cmpgt",
    }
}

fn x86_template(is: InstructionSet, elem: ElemSize, width: usize, op: VecOp) -> String {
    let pre = is.prefix();
    let suf = if elem == ElemSize::F64 { "pd" } else { "ps" };
    let (name, args) = op.base_template();
    match (is, op) {
        (_, VecOp::MakeVec) => {
            let args = vec!["{0}"; width].join(",");
            format!("{pre}_{name}_{suf}({args})")
        },
        (InstructionSet::Sse, op) if op.is_comparison() => {
            format!("{pre}_{0}_{suf}({{0}},{{1}})", sse_comparison(&op))
        },
        (InstructionSet::Avx512, VecOp::And) => format!("_kand_mask{width}({{0}}, {{1}})"),
        (InstructionSet::Avx512, VecOp::Or) => format!("_kor_mask{width}({{0}}, {{1}})"),
        (InstructionSet::Avx512, VecOp::Blendv) => {
            format!("{pre}_mask_blend_{suf}({{2}}, {{0}}, {{1}})")
        },
        (InstructionSet::Avx512, op) if op.is_comparison() => {
            format!("{pre}_{name}_{suf}_mask({0})", args.join(","))
        },
        _ => format!("{pre}_{name}_{suf}({0})", args.join(","))
    }
}

fn x86_instruction_set(is: InstructionSet, elem: ElemSize) -> InstructionSetDesc {
    let width = is.register_bits() / (8 * elem.size_in_bytes() as usize);
    let ops = VecOp::iter()
        .map(|op| (op, x86_template(is, elem, width, op)))
        .collect::<BTreeMap<VecOp, String>>();
    InstructionSetDesc {name: is, elem, width, headers: is.headers(), ops}
}

lazy_static! {
    static ref INSTRUCTION_SETS: BTreeMap<(InstructionSet, ElemSize), InstructionSetDesc> = {
        InstructionSet::iter()
            .flat_map(|is| [ElemSize::F32, ElemSize::F64].into_iter().map(move |sz| (is, sz)))
            .map(|(is, sz)| ((is, sz), x86_instruction_set(is, sz)))
            .collect()
    };
}

pub fn get_instruction_set(
    is: InstructionSet,
    elem: ElemSize
) -> CompileResult<&'static InstructionSetDesc> {
    match INSTRUCTION_SETS.get(&(is, elem)) {
        Some(desc) => Ok(desc),
        None => stencil_vectorize_error!("No {is} instruction set for elements of type {elem}")
    }
}

// Substitutes the positional placeholders {0}, {1}, ... of a template.
pub fn format_template(template: &str, args: &[String]) -> String {
    args.iter()
        .enumerate()
        .fold(template.to_string(), |acc, (i, arg)| acc.replace(&format!("{{{i}}}"), arg))
}

impl InstructionSetDesc {
    pub fn template<'a>(&'a self, op: VecOp) -> CompileResult<&'a str> {
        match self.ops.get(&op) {
            Some(t) => Ok(t),
            None => stencil_vectorize_error!("Operation {op:?} missing in the {0} table", self.name)
        }
    }

    pub fn format(&self, op: VecOp, args: &[String]) -> CompileResult<String> {
        Ok(format_template(self.template(op)?, args))
    }

    fn bits(&self) -> usize {
        self.width * 8 * self.elem.size_in_bytes() as usize
    }

    // The name of the vector register type holding lanes of the given element type.
    pub fn vector_type_name(&self, sz: &ElemSize) -> String {
        let bits = self.bits();
        match sz {
            ElemSize::Bool if self.name == InstructionSet::Avx512 => {
                format!("__mmask{0}", self.width)
            },
            ElemSize::Bool => self.vector_type_name(&self.elem),
            ElemSize::F64 => format!("__m{bits}d"),
            ElemSize::F32 => format!("__m{bits}"),
            _ => format!("__m{bits}i"),
        }
    }
}
