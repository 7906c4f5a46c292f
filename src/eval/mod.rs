pub mod value;

use crate::expr::ast::*;
use crate::expr::types::Type;
use crate::field::layout::strides_from_shape;
use crate::field::{Field, FieldType};
use crate::ir::ast::*;
use crate::kernel::gpu::call_parameters;
use crate::option::Target;
use crate::utils::err::*;
use crate::utils::name::Name;
use crate::{stencil_compile_error, stencil_name_error, stencil_type_error};
use value::*;

use itertools::Itertools;

use std::collections::BTreeMap;

// The contents of an array passed to a kernel. Elements are stored densely in the order given by
// the layout of the field the array is created for.
#[derive(Clone, Debug, PartialEq)]
pub struct Array {
    pub dtype: Type,
    pub shape: Vec<i64>,
    pub strides: Vec<i64>,
    pub data: Vec<Value>,
}

fn convert_elem(v: Value, dtype: &Type) -> CompileResult<Value> {
    match (dtype, v) {
        (Type::Struct {..}, v @ Value::Struct(_)) => Ok(v),
        (Type::Struct {id, ..}, v) => {
            stencil_type_error!("Cannot store {v:?} in an array of struct {id}")
        },
        (ty, v) => convert_to(v, ty)
    }
}

impl Array {
    // Creates an array for a field with the given spatial extents, filled with one value.
    pub fn new(field: &Field, spatial_shape: &[i64], fill: Value) -> CompileResult<Array> {
        Array::from_fn(field, spatial_shape, |_| fill.clone())
    }

    // Creates an array for a field whose elements are computed from their full index.
    pub fn from_fn(
        field: &Field,
        spatial_shape: &[i64],
        f: impl Fn(&[i64]) -> Value
    ) -> CompileResult<Array> {
        if spatial_shape.len() != field.spatial_dims {
            return stencil_compile_error!(
                "Field {0} has {1} spatial dimensions, but the array shape has {2}",
                field.name, field.spatial_dims, spatial_shape.len()
            );
        }
        if spatial_shape.iter().any(|n| *n < 0) {
            return stencil_compile_error!("Array of field {0} has a negative extent", field.name);
        }
        let shape = spatial_shape.iter()
            .chain(field.index_shape.iter())
            .cloned()
            .collect::<Vec<i64>>();
        let strides = strides_from_shape(&shape, &field.layout);
        let len = shape.iter().product::<i64>() as usize;
        let mut data = vec![Value::Int(0); len];
        for idx in shape.iter().map(|n| 0..*n).multi_cartesian_product() {
            let ofs = idx.iter().zip(strides.iter()).map(|(i, s)| i * s).sum::<i64>();
            data[ofs as usize] = convert_elem(f(&idx), &field.dtype)?;
        }
        Ok(Array {dtype: field.dtype.clone(), shape, strides, data})
    }

    fn offset(&self, idx: &[i64]) -> CompileResult<usize> {
        if idx.len() != self.shape.len() {
            return stencil_compile_error!(
                "Index {idx:?} does not match array of shape {0:?}", self.shape
            );
        }
        if idx.iter().zip(self.shape.iter()).any(|(i, n)| *i < 0 || i >= n) {
            return stencil_compile_error!(
                "Index {idx:?} is out of bounds for array of shape {0:?}", self.shape
            );
        }
        let ofs = idx.iter().zip(self.strides.iter()).map(|(i, s)| i * s).sum::<i64>();
        Ok(ofs as usize)
    }

    pub fn get(&self, idx: &[i64]) -> CompileResult<Value> {
        let ofs = self.offset(idx)?;
        Ok(self.data[ofs].clone())
    }

    pub fn set(&mut self, idx: &[i64], v: Value) -> CompileResult<()> {
        let ofs = self.offset(idx)?;
        self.data[ofs] = convert_elem(v, &self.dtype)?;
        Ok(())
    }

    // Checks that the array can be passed as the given field of a kernel.
    fn validate(&self, field: &Field) -> CompileResult<()> {
        if self.dtype != field.dtype {
            return stencil_type_error!(
                "Array passed as field {0} has element type {1}, expected {2}",
                field.name, self.dtype, field.dtype
            );
        }
        if self.shape.len() != field.rank() {
            return stencil_compile_error!(
                "Array passed as field {0} has rank {1}, expected {2}",
                field.name, self.shape.len(), field.rank()
            );
        }
        let fixed = field.shape.iter().zip(self.shape.iter())
            .chain(field.strides.iter().zip(self.strides.iter()));
        for (e, n) in fixed {
            if let Expr::Int {v, ..} = e {
                if v != n {
                    return stencil_compile_error!(
                        "Array passed as field {0} does not match its fixed shape or strides",
                        field.name
                    );
                }
            }
        }
        Ok(())
    }
}

// Counts of the array elements read and written by a kernel invocation.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ExecStats {
    pub loads: usize,
    pub stores: usize,
}

#[derive(Clone, Copy, Debug)]
struct GpuContext {
    thread_idx: Dim3,
    block_idx: Dim3,
    launch: (Dim3, Dim3),
}

// Executes the node tree of a kernel on in-memory arrays. Scalars live in a stack of scopes
// mirroring the blocks of the printed code.
struct Evaluator<'a> {
    arrays: &'a mut BTreeMap<String, Array>,
    temps: BTreeMap<String, Vec<Value>>,
    scopes: Vec<BTreeMap<Name, Value>>,
    gpu: Option<GpuContext>,
    stats: ExecStats,
}

impl<'a> Evaluator<'a> {
    fn new(arrays: &'a mut BTreeMap<String, Array>) -> Self {
        Evaluator {
            arrays, temps: BTreeMap::new(), scopes: vec![BTreeMap::new()], gpu: None,
            stats: ExecStats::default()
        }
    }

    fn lookup(&self, id: &Name) -> CompileResult<Value> {
        match self.scopes.iter().rev().find_map(|s| s.get(id)) {
            Some(v) => Ok(v.clone()),
            None => stencil_name_error!("Symbol {id} is used before it is defined")
        }
    }

    fn declare(&mut self, id: Name, v: Value) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(id, v);
        }
    }

    fn update(&mut self, id: Name, v: Value) {
        match self.scopes.iter_mut().rev().find(|s| s.contains_key(&id)) {
            Some(scope) => { scope.insert(id, v); },
            None => self.declare(id, v)
        }
    }

    fn buffer(&self, name: &str) -> CompileResult<&[Value]> {
        match self.arrays.get(name) {
            Some(a) => Ok(a.data.as_slice()),
            None => match self.temps.get(name) {
                Some(t) => Ok(t.as_slice()),
                None => stencil_compile_error!("Access to unknown or freed buffer {name}")
            }
        }
    }

    fn buffer_mut(&mut self, name: &str) -> CompileResult<(&mut Vec<Value>, Option<Type>)> {
        match self.arrays.get_mut(name) {
            Some(a) => Ok((&mut a.data, Some(a.dtype.clone()))),
            None => match self.temps.get_mut(name) {
                Some(t) => Ok((t, None)),
                None => stencil_compile_error!("Access to unknown or freed buffer {name}")
            }
        }
    }

    fn address(&mut self, access: &Expr) -> CompileResult<(String, i64, Option<String>)> {
        match access {
            Expr::ResolvedAccess {base, index, member, ..} => {
                match self.lookup(base)? {
                    Value::Pointer {buffer, offset} => {
                        let idx = self.eval_expr(index)?.as_int()?;
                        Ok((buffer, offset + idx, member.clone()))
                    },
                    v => stencil_compile_error!(
                        "Base {base} of a memory access is not a pointer: {v:?}"
                    )
                }
            },
            _ => stencil_compile_error!("Expected a resolved memory access")
        }
    }

    fn load(&mut self, buffer: &str, ofs: i64, member: &Option<String>) -> CompileResult<Value> {
        let data = self.buffer(buffer)?;
        let v = match data.get(ofs as usize).filter(|_| ofs >= 0) {
            Some(v) => v.clone(),
            None => {
                return stencil_compile_error!(
                    "Load from {buffer} at offset {ofs} is out of bounds"
                );
            }
        };
        self.stats.loads += 1;
        match member {
            Some(label) => v.member(label),
            None => Ok(v)
        }
    }

    fn store(
        &mut self,
        buffer: &str,
        ofs: i64,
        member: &Option<String>,
        v: Value
    ) -> CompileResult<()> {
        let (data, dtype) = self.buffer_mut(buffer)?;
        let slot = match data.get_mut(ofs as usize).filter(|_| ofs >= 0) {
            Some(slot) => slot,
            None => {
                return stencil_compile_error!("Store to {buffer} at offset {ofs} is out of bounds");
            }
        };
        match (member, slot) {
            (Some(label), Value::Struct(members)) => {
                let ty = dtype.and_then(|ty| ty.member_type(label));
                let v = match ty {
                    Some(sz) => convert(v, &sz)?,
                    None => v
                };
                members.insert(label.clone(), v);
            },
            (Some(label), v) => {
                return stencil_compile_error!("Cannot store to member {label} of {v:?}");
            },
            (None, slot) => {
                *slot = match dtype {
                    Some(ty) => convert_elem(v, &ty)?,
                    None => v
                };
            }
        }
        self.stats.stores += 1;
        Ok(())
    }

    fn gpu_index(&self, kind: &GpuIndexKind, dim: &Dim) -> CompileResult<Value> {
        let ctx = match &self.gpu {
            Some(ctx) => ctx,
            None => {
                return stencil_compile_error!("GPU index {kind}.{dim} used outside a GPU kernel");
            }
        };
        let v = match kind {
            GpuIndexKind::ThreadIdx => ctx.thread_idx.get_dim(dim),
            GpuIndexKind::BlockIdx => ctx.block_idx.get_dim(dim),
            GpuIndexKind::BlockDim => ctx.launch.1.get_dim(dim),
            GpuIndexKind::GridDim => ctx.launch.0.get_dim(dim),
        };
        Ok(Value::Int(v))
    }

    fn eval_piecewise(&mut self, branches: &[(Expr, Expr)], ty: &Type) -> CompileResult<Value> {
        let evaluated = branches.iter()
            .map(|(v, c)| -> CompileResult<(Value, Value)> {
                Ok((self.eval_expr(v)?, self.eval_expr(c)?))
            })
            .collect::<CompileResult<Vec<(Value, Value)>>>()?;
        let width = ty.vector_width();
        let select = |lane: Option<usize>| -> CompileResult<Value> {
            let pick = |v: &Value| match (v, lane) {
                (Value::Vector(lanes), Some(i)) => lanes[i].clone(),
                (v, _) => v.clone()
            };
            for (v, c) in evaluated.iter() {
                if pick(c).as_bool()? {
                    return Ok(pick(v));
                }
            }
            stencil_compile_error!("No branch of a piecewise expression applies")
        };
        match width {
            Some(w) => {
                let lanes = (0..w).map(|i| select(Some(i))).collect::<CompileResult<Vec<Value>>>()?;
                convert_to(Value::Vector(lanes), ty)
            },
            None => convert_to(select(None)?, ty)
        }
    }

    fn eval_expr(&mut self, e: &Expr) -> CompileResult<Value> {
        match e {
            Expr::Symbol {id, ..} => self.lookup(id),
            Expr::Bool {v, ..} => Ok(Value::Bool(*v)),
            Expr::Int {v, ty} => convert_to(Value::Int(*v), ty),
            Expr::Float {v, ty} => convert_to(Value::Float(*v), ty),
            Expr::Rational {num, den, ty} => {
                convert_to(Value::Float(*num as f64 / *den as f64), ty)
            },
            Expr::UnOp {op, arg, ty} => {
                let v = unop(op, self.eval_expr(arg)?)?;
                Ok(round_to(v, ty))
            },
            Expr::BinOp {lhs, op, rhs, ty} => {
                let v = binop(op, self.eval_expr(lhs)?, self.eval_expr(rhs)?)?;
                Ok(round_to(v, ty))
            },
            Expr::Piecewise {branches, ty} => self.eval_piecewise(branches, ty),
            Expr::Call {func, args, ty} => {
                let args = args.iter()
                    .map(|a| self.eval_expr(a))
                    .collect::<CompileResult<Vec<Value>>>()?;
                Ok(round_to(call(func, args)?, ty))
            },
            Expr::Cast {e, ty} => convert_to(self.eval_expr(e)?, ty),
            Expr::AddressOf {e, ..} => {
                let (buffer, offset, _) = self.address(e)?;
                Ok(Value::Pointer {buffer, offset})
            },
            Expr::FieldAccess {access, ..} => {
                stencil_compile_error!(
                    "Cannot evaluate unresolved access to field {0}", access.field.name
                )
            },
            Expr::ResolvedAccess {..} => {
                let (buffer, ofs, member) = self.address(e)?;
                self.load(&buffer, ofs, &member)
            },
            Expr::VectorAccess {access, ty, ..} => {
                let (buffer, ofs, member) = self.address(access)?;
                let width = ty.vector_width().unwrap_or(1) as i64;
                let lanes = (0..width)
                    .map(|i| self.load(&buffer, ofs + i, &member))
                    .collect::<CompileResult<Vec<Value>>>()?;
                Ok(Value::Vector(lanes))
            },
            Expr::GpuIndex {kind, dim, ..} => self.gpu_index(kind, dim),
        }
    }

    fn assign(&mut self, lhs: &Expr, rhs: &Expr, is_decl: bool) -> CompileResult<()> {
        let v = self.eval_expr(rhs)?;
        match lhs {
            Expr::Symbol {id, ty} => {
                let v = match ty {
                    Type::Scalar {..} | Type::Vector {..} => convert_to(v, ty)?,
                    _ => v
                };
                if is_decl {
                    self.declare(id.clone(), v);
                } else {
                    self.update(id.clone(), v);
                }
                Ok(())
            },
            Expr::ResolvedAccess {..} => {
                let (buffer, ofs, member) = self.address(lhs)?;
                self.store(&buffer, ofs, &member, v)
            },
            Expr::VectorAccess {access, ty, ..} => {
                let (buffer, ofs, member) = self.address(access)?;
                let width = ty.vector_width().unwrap_or(1);
                let lanes = match v {
                    Value::Vector(lanes) if lanes.len() == width => lanes,
                    v => vec![v; width]
                };
                for (i, l) in lanes.into_iter().enumerate() {
                    self.store(&buffer, ofs + i as i64, &member, l)?;
                }
                Ok(())
            },
            _ => stencil_compile_error!("Invalid left-hand side of an assignment")
        }
    }

    fn scoped(&mut self, nodes: &[Node], bindings: Vec<(Name, Value)>) -> CompileResult<()> {
        self.scopes.push(bindings.into_iter().collect());
        let r = self.exec_nodes(nodes);
        self.scopes.pop();
        r
    }

    fn exec_node(&mut self, node: &Node) -> CompileResult<()> {
        match node {
            Node::Block {body, ..} => self.scoped(body, vec![]),
            Node::Loop {counter, start, stop, step, body, ..} => {
                let start = self.eval_expr(start)?.as_int()?;
                let stop = self.eval_expr(stop)?.as_int()?;
                let step = self.eval_expr(step)?.as_int()?;
                if step <= 0 {
                    return stencil_compile_error!(
                        "Loop over {counter} has non-positive step {step}"
                    );
                }
                for i in (start..stop).step_by(step as usize) {
                    self.scoped(body, vec![(counter.clone(), Value::Int(i))])?;
                }
                Ok(())
            },
            Node::Conditional {cond, thn, els} => {
                if self.eval_expr(cond)?.as_bool()? {
                    self.scoped(thn, vec![])
                } else if let Some(els) = els {
                    self.scoped(els, vec![])
                } else {
                    Ok(())
                }
            },
            Node::Assignment {lhs, rhs, is_decl, ..} => self.assign(lhs, rhs, *is_decl),
            Node::TempAlloc {id, ty, size, offset} => {
                let size = self.eval_expr(size)?.as_int()?;
                let zero = match ty.pointee().and_then(|t| t.get_scalar_elem_size()) {
                    Some(sz) => convert(Value::Int(0), sz)?,
                    None => Value::Int(0)
                };
                let buffer = format!("tmp:{0}", id.print_with_sym());
                self.temps.insert(buffer.clone(), vec![zero; size.max(0) as usize]);
                self.declare(id.clone(), Value::Pointer {buffer, offset: *offset});
                Ok(())
            },
            Node::TempFree {id, ..} => {
                self.temps.remove(&format!("tmp:{0}", id.print_with_sym()));
                Ok(())
            },
            Node::CustomCode {code, ..} => {
                stencil_compile_error!("Cannot evaluate custom code: {code}")
            },
            Node::ThreadBlockSync => {
                stencil_compile_error!("Cannot evaluate thread block synchronization")
            },
        }
    }

    fn exec_nodes(&mut self, nodes: &[Node]) -> CompileResult<()> {
        nodes.iter().try_for_each(|n| self.exec_node(n))
    }
}

fn array_of<'a>(arrays: &'a BTreeMap<String, Array>, field: &str) -> CompileResult<&'a Array> {
    match arrays.get(field) {
        Some(a) => Ok(a),
        None => stencil_name_error!("No array given for field {field}")
    }
}

fn extent(values: &[i64], field: &str, dim: usize) -> CompileResult<Value> {
    match values.get(dim) {
        Some(n) => Ok(Value::Int(*n)),
        None => stencil_compile_error!("Array of field {field} has no dimension {dim}")
    }
}

// The initial values of the kernel parameters: field pointers refer to the start of their array,
// shapes and strides are read from the arrays and scalars are looked up by name.
fn bind_parameters(
    kernel: &KernelFunction,
    arrays: &BTreeMap<String, Array>,
    scalars: &BTreeMap<String, Value>
) -> CompileResult<Vec<(Name, Value)>> {
    kernel.params.iter()
        .map(|p| {
            let v = match &p.kind {
                ParamKind::FieldPointer {field} => {
                    let a = array_of(arrays, field)?;
                    if let Some(f) = kernel.get_field(field) {
                        a.validate(f)?;
                    }
                    Value::Pointer {buffer: field.clone(), offset: 0}
                },
                ParamKind::FieldShape {field, dim} => {
                    extent(&array_of(arrays, field)?.shape, field, *dim)?
                },
                ParamKind::FieldStride {field, dim} => {
                    extent(&array_of(arrays, field)?.strides, field, *dim)?
                },
                ParamKind::Scalar => match scalars.get(p.id.get_str()) {
                    Some(v) => convert_to(v.clone(), &p.ty)?,
                    None => return stencil_name_error!("No value given for parameter {0}", p.id)
                }
            };
            Ok((p.id.clone(), v))
        })
        .collect()
}

// The spatial shape determining the launch configuration of a GPU kernel. Indexed kernels are
// launched over their coordinate list.
fn launch_shape(
    kernel: &KernelFunction,
    arrays: &BTreeMap<String, Array>
) -> CompileResult<Vec<i64>> {
    let fields = &kernel.fields_accessed;
    let field = fields.iter().find(|f| f.field_type == FieldType::Indexed)
        .or_else(|| fields.iter().find(|f| f.field_type == FieldType::Generic));
    match field {
        Some(f) => {
            let a = array_of(arrays, &f.name)?;
            Ok(a.shape.iter().take(f.spatial_dims).cloned().collect())
        },
        None => stencil_compile_error!("Kernel {0} accesses no fields", kernel.name)
    }
}

fn grid(d: &Dim3) -> Vec<Dim3> {
    itertools::iproduct!(0..d.z, 0..d.y, 0..d.x)
        .map(|(z, y, x)| Dim3 {x, y, z})
        .collect()
}

// Runs a kernel on in-memory arrays, keyed by field name. CPU kernels execute their loop nest
// directly, while GPU kernels execute their body once per thread of the launch configuration
// computed for the given arrays.
pub fn run_kernel(
    kernel: &KernelFunction,
    arrays: &mut BTreeMap<String, Array>,
    scalars: &BTreeMap<String, Value>
) -> CompileResult<ExecStats> {
    let bindings = bind_parameters(kernel, arrays, scalars)?;
    let launch = match kernel.target {
        Target::Cpu => None,
        Target::Gpu => Some(call_parameters(kernel, &launch_shape(kernel, arrays)?)?),
    };
    tracing::debug!("Evaluating kernel {0} with launch configuration {launch:?}", kernel.name);

    let mut ev = Evaluator::new(arrays);
    ev.scopes = vec![bindings.into_iter().collect()];
    match launch {
        None => ev.exec_nodes(&kernel.body)?,
        Some(args) => {
            let threads = grid(&args.threads);
            for block_idx in grid(&args.blocks) {
                for thread_idx in threads.iter() {
                    ev.gpu = Some(GpuContext {
                        thread_idx: *thread_idx, block_idx, launch: (args.blocks, args.threads)
                    });
                    ev.scoped(&kernel.body, vec![])?;
                }
            }
        }
    };
    tracing::debug!(
        "Kernel {0} performed {1} loads and {2} stores",
        kernel.name, ev.stats.loads, ev.stats.stores
    );
    Ok(ev.stats)
}
