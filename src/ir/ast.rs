use crate::expr::ast::{Dim, Expr};
use crate::expr::types::Type;
use crate::field::Field;
use crate::option::Target;
use crate::utils::name::Name;
use crate::utils::smap::*;
use crate::vectorize::instruction_sets::InstructionSetDesc;

use std::collections::BTreeSet;

#[derive(Clone, Debug, PartialEq)]
pub enum Node {
    // A scope of statements. A pragma line, if present, is printed before the opening brace.
    Block {body: Vec<Node>, pragma: Option<String>},

    // A counted loop over one spatial coordinate. The prefix lines (e.g., OpenMP pragmas) are
    // printed on the lines preceding the loop header.
    Loop {
        counter: Name, coord: usize, start: Expr, stop: Expr, step: Expr,
        body: Vec<Node>, prefix_lines: Vec<String>
    },

    Conditional {cond: Expr, thn: Vec<Node>, els: Option<Vec<Node>>},

    // An assignment to a symbol or a memory location. Declarations introduce the symbol on their
    // left-hand side, optionally as a constant.
    Assignment {lhs: Expr, rhs: Expr, is_decl: bool, is_const: bool},

    // Allocation of an aligned temporary buffer of `size` elements. The pointer is shifted by
    // `offset` elements from the start of the allocation.
    TempAlloc {id: Name, ty: Type, size: Expr, offset: i64},

    TempFree {id: Name, ty: Type, offset: i64},

    // Opaque code inserted verbatim into the output. The declared symbol sets make the node take
    // part in the symbol analysis.
    CustomCode {
        code: String, reads: BTreeSet<Name>, defines: BTreeSet<Name>, headers: Vec<String>
    },

    // A barrier among all threads of a GPU thread block.
    ThreadBlockSync,
}

impl Node {
    pub fn block(body: Vec<Node>) -> Node {
        Node::Block {body, pragma: None}
    }

    pub fn assign(lhs: Expr, rhs: Expr) -> Node {
        Node::Assignment {lhs, rhs, is_decl: false, is_const: false}
    }

    pub fn declare(lhs: Expr, rhs: Expr, is_const: bool) -> Node {
        Node::Assignment {lhs, rhs, is_decl: true, is_const}
    }

    // A node printing the value of a symbol to standard output.
    pub fn print_symbol(id: &Name) -> Node {
        let code = format!("std::cout << \"{0}  =  \" << {0} << std::endl;", id.get_str());
        Node::CustomCode {
            code,
            reads: vec![id.clone()].into_iter().collect(),
            defines: BTreeSet::new(),
            headers: vec!["<iostream>".to_string()],
        }
    }

    pub fn is_loop(&self) -> bool {
        matches!(self, Node::Loop {..})
    }
}

impl SMapAccum<Node> for Node {
    fn smap_accum_l_result<A, E>(
        self,
        acc: Result<A, E>,
        f: impl Fn(A, Node) -> Result<(A, Node), E>
    ) -> Result<(A, Node), E> {
        match self {
            Node::Block {body, pragma} => {
                let (acc, body) = body.smap_accum_l_result(acc, &f)?;
                Ok((acc, Node::Block {body, pragma}))
            },
            Node::Loop {counter, coord, start, stop, step, body, prefix_lines} => {
                let (acc, body) = body.smap_accum_l_result(acc, &f)?;
                Ok((acc, Node::Loop {counter, coord, start, stop, step, body, prefix_lines}))
            },
            Node::Conditional {cond, thn, els} => {
                let (acc, thn) = thn.smap_accum_l_result(acc, &f)?;
                let (acc, els) = match els {
                    Some(els) => {
                        let (acc, els) = els.smap_accum_l_result(Ok(acc), &f)?;
                        (acc, Some(els))
                    },
                    None => (acc, None)
                };
                Ok((acc, Node::Conditional {cond, thn, els}))
            },
            Node::Assignment {..} | Node::TempAlloc {..} | Node::TempFree {..} |
            Node::CustomCode {..} | Node::ThreadBlockSync => Ok((acc?, self)),
        }
    }
}

impl SFold<Node> for Node {
    fn sfold_result<A, E>(
        &self,
        acc: Result<A, E>,
        f: impl Fn(A, &Node) -> Result<A, E>
    ) -> Result<A, E> {
        match self {
            Node::Block {body, ..} => body.sfold_result(acc, &f),
            Node::Loop {body, ..} => body.sfold_result(acc, &f),
            Node::Conditional {thn, els, ..} => {
                let acc = thn.sfold_result(acc, &f);
                match els {
                    Some(els) => els.sfold_result(acc, &f),
                    None => acc
                }
            },
            Node::Assignment {..} | Node::TempAlloc {..} | Node::TempFree {..} |
            Node::CustomCode {..} | Node::ThreadBlockSync => acc,
        }
    }
}

// Maps over the expressions stored directly in a node, without descending into child nodes.
impl SMapAccum<Expr> for Node {
    fn smap_accum_l_result<A, E>(
        self,
        acc: Result<A, E>,
        f: impl Fn(A, Expr) -> Result<(A, Expr), E>
    ) -> Result<(A, Node), E> {
        match self {
            Node::Loop {counter, coord, start, stop, step, body, prefix_lines} => {
                let (acc, start) = f(acc?, start)?;
                let (acc, stop) = f(acc, stop)?;
                let (acc, step) = f(acc, step)?;
                Ok((acc, Node::Loop {counter, coord, start, stop, step, body, prefix_lines}))
            },
            Node::Conditional {cond, thn, els} => {
                let (acc, cond) = f(acc?, cond)?;
                Ok((acc, Node::Conditional {cond, thn, els}))
            },
            Node::Assignment {lhs, rhs, is_decl, is_const} => {
                let (acc, lhs) = f(acc?, lhs)?;
                let (acc, rhs) = f(acc, rhs)?;
                Ok((acc, Node::Assignment {lhs, rhs, is_decl, is_const}))
            },
            Node::TempAlloc {id, ty, size, offset} => {
                let (acc, size) = f(acc?, size)?;
                Ok((acc, Node::TempAlloc {id, ty, size, offset}))
            },
            Node::Block {..} | Node::TempFree {..} | Node::CustomCode {..} |
            Node::ThreadBlockSync => Ok((acc?, self)),
        }
    }
}

impl SFold<Expr> for Node {
    fn sfold_result<A, E>(
        &self,
        acc: Result<A, E>,
        f: impl Fn(A, &Expr) -> Result<A, E>
    ) -> Result<A, E> {
        match self {
            Node::Loop {start, stop, step, ..} => f(f(f(acc?, start)?, stop)?, step),
            Node::Conditional {cond, ..} => f(acc?, cond),
            Node::Assignment {lhs, rhs, ..} => f(f(acc?, lhs)?, rhs),
            Node::TempAlloc {size, ..} => f(acc?, size),
            Node::Block {..} | Node::TempFree {..} | Node::CustomCode {..} |
            Node::ThreadBlockSync => acc,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum ParamKind {
    FieldPointer {field: String},
    FieldShape {field: String, dim: usize},
    FieldStride {field: String, dim: usize},
    Scalar,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Param {
    pub id: Name,
    pub ty: Type,
    pub kind: ParamKind,
}

impl Param {
    pub fn is_field_parameter(&self) -> bool {
        !matches!(self.kind, ParamKind::Scalar)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Dim3 {
    pub x: i64,
    pub y: i64,
    pub z: i64,
}

impl Dim3 {
    pub fn get_dim(&self, dim: &Dim) -> i64 {
        match dim {
            Dim::X => self.x,
            Dim::Y => self.y,
            Dim::Z => self.z,
        }
    }

    pub fn with_dim(self, dim: &Dim, n: i64) -> Dim3 {
        match dim {
            Dim::X => Dim3 {x: n, ..self},
            Dim::Y => Dim3 {y: n, ..self},
            Dim::Z => Dim3 {z: n, ..self},
        }
    }

    pub fn prod(&self) -> i64 {
        self.x * self.y * self.z
    }
}

impl Default for Dim3 {
    fn default() -> Self {
        Dim3 {x: 1, y: 1, z: 1}
    }
}

// The number of blocks and threads per block of a GPU kernel launch.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LaunchArgs {
    pub blocks: Dim3,
    pub threads: Dim3
}

impl LaunchArgs {
    pub fn with_blocks_dim(mut self, dim: &Dim, n: i64) -> Self {
        self.blocks = self.blocks.with_dim(dim, n);
        self
    }

    pub fn with_threads_dim(mut self, dim: &Dim, n: i64) -> Self {
        self.threads = self.threads.with_dim(dim, n);
        self
    }
}

// The iteration range of one spatial dimension, relative to the shape of the arrays the kernel is
// called with. A bound is either an absolute index or a distance from the end of the dimension.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Bound {
    FromStart(i64),
    FromEnd(i64),
}

impl Bound {
    pub fn resolve(&self, extent: i64) -> i64 {
        match self {
            Bound::FromStart(n) => *n,
            Bound::FromEnd(n) => extent - n,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct IterationRange {
    pub start: Bound,
    pub stop: Bound,
    pub step: i64,
}

impl IterationRange {
    // The number of iterations for an array dimension of the given extent.
    pub fn num_iterations(&self, extent: i64) -> i64 {
        let start = self.start.resolve(extent);
        let stop = self.stop.resolve(extent);
        if stop <= start || self.step <= 0 {
            0
        } else {
            (stop - start + self.step - 1) / self.step
        }
    }
}

// How the spatial coordinates of a GPU kernel are derived from the thread and block indices. The
// dimension of coordinate `c` is found at position `c` of `dims`.
#[derive(Clone, Debug, PartialEq)]
pub enum GpuMapping {
    // Coordinate `c` is computed from the block and thread indices of dimension `dims[c]`.
    Block {block_size: Dim3, dims: Vec<Dim>},
    // The fastest coordinate is the x-index of the thread, the others are block indices of
    // dimension `dims[c]`.
    Line {fastest: usize, dims: Vec<Dim>},
}

#[derive(Clone, Debug, PartialEq)]
pub struct GpuIndexingInfo {
    pub mapping: GpuMapping,
    pub ranges: Vec<IterationRange>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct KernelFunction {
    pub name: String,
    pub params: Vec<Param>,
    pub body: Vec<Node>,
    pub target: Target,
    pub fields_accessed: Vec<Field>,
    pub ghost_layers: Vec<(i64, i64)>,
    pub instruction_set: Option<InstructionSetDesc>,
    pub gpu_indexing: Option<GpuIndexingInfo>,
}

impl KernelFunction {
    pub fn get_field<'a>(&'a self, name: &str) -> Option<&'a Field> {
        self.fields_accessed.iter().find(|f| f.name == name)
    }
}
