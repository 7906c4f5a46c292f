pub mod layout;

use crate::expr::ast::Expr;
use crate::expr::types::Type;
use crate::stencil_compile_error;
use crate::utils::ast::ElemSize;
use crate::utils::err::*;
use layout::*;

use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FieldType {
    // A regular array iterated over by the loop nest of a kernel.
    Generic,
    // A one-dimensional list of structs holding the coordinates visited by an indexed kernel.
    Indexed,
}

// A named N-dimensional array. The first `spatial_dims` dimensions are spatial and the remaining
// ones select a component of a cell. Fields are immutable after construction.
#[derive(Clone, Debug)]
pub struct Field {
    pub name: String,
    pub field_type: FieldType,
    pub dtype: Type,
    pub spatial_dims: usize,
    pub index_shape: Vec<i64>,
    pub shape: Vec<Expr>,
    pub strides: Vec<Expr>,
    pub layout: Vec<usize>,
    pub ghost_layers: usize,
}

fn validate_name(name: &str) -> CompileResult<()> {
    let valid = name.chars().next().map(|c| c.is_alphabetic() || c == '_').unwrap_or(false)
        && name.chars().all(|c| c.is_alphanumeric() || c == '_');
    if valid {
        Ok(())
    } else {
        stencil_compile_error!("Invalid field name '{name}'")
    }
}

impl Field {
    // A field whose shape and strides are passed to the kernel as parameters. Index dimensions
    // always have a fixed size.
    pub fn create_generic(
        name: &str,
        spatial_dims: usize,
        dtype: Type,
        index_shape: Vec<i64>,
        layout: Layout
    ) -> CompileResult<Field> {
        validate_name(name)?;
        let rank = spatial_dims + index_shape.len();
        let layout = layout.permutation(spatial_dims, index_shape.len())?;
        let shape = (0..rank)
            .map(|d| {
                if d < spatial_dims {
                    Expr::size_symbol(Field::shape_symbol_name(name, d))
                } else {
                    Expr::index(index_shape[d - spatial_dims])
                }
            })
            .collect::<Vec<Expr>>();
        let strides = (0..rank)
            .map(|d| Expr::size_symbol(Field::stride_symbol_name(name, d)))
            .collect::<Vec<Expr>>();
        Ok(Field {
            name: name.to_string(), field_type: FieldType::Generic, dtype, spatial_dims,
            index_shape, shape, strides, layout, ghost_layers: 0
        })
    }

    // A field with a shape known at compile time. The shape lists the sizes of the spatial
    // dimensions only.
    pub fn create_fixed_size(
        name: &str,
        spatial_shape: Vec<i64>,
        dtype: Type,
        index_shape: Vec<i64>,
        layout: Layout
    ) -> CompileResult<Field> {
        validate_name(name)?;
        if spatial_shape.iter().chain(index_shape.iter()).any(|n| *n <= 0) {
            return stencil_compile_error!("Field {name} has a non-positive extent in its shape");
        }
        let spatial_dims = spatial_shape.len();
        let full_shape = spatial_shape.into_iter()
            .chain(index_shape.iter().cloned())
            .collect::<Vec<i64>>();
        let layout = layout.permutation(spatial_dims, index_shape.len())?;
        let strides = strides_from_shape(&full_shape, &layout);
        Ok(Field {
            name: name.to_string(), field_type: FieldType::Generic, dtype, spatial_dims,
            index_shape,
            shape: full_shape.into_iter().map(Expr::index).collect(),
            strides: strides.into_iter().map(Expr::index).collect(),
            layout, ghost_layers: 0
        })
    }

    // The coordinate list of an indexed kernel: a contiguous one-dimensional array of structs.
    pub fn create_index_field(name: &str, struct_ty: Type) -> CompileResult<Field> {
        validate_name(name)?;
        if !matches!(struct_ty, Type::Struct {..}) {
            return stencil_compile_error!("Index field {name} must have a struct element type");
        }
        Ok(Field {
            name: name.to_string(), field_type: FieldType::Indexed, dtype: struct_ty,
            spatial_dims: 1, index_shape: vec![],
            shape: vec![Expr::size_symbol(Field::shape_symbol_name(name, 0))],
            strides: vec![Expr::index(1)],
            layout: vec![0], ghost_layers: 0
        })
    }

    pub fn with_ghost_layers(self, ghost_layers: usize) -> Field {
        Field {ghost_layers, ..self}
    }

    pub fn shape_symbol_name(name: &str, d: usize) -> String {
        format!("_size_{name}_{d}")
    }

    pub fn stride_symbol_name(name: &str, d: usize) -> String {
        format!("_stride_{name}_{d}")
    }

    pub fn base_pointer_name(&self) -> String {
        format!("_data_{0}", self.name)
    }

    pub fn rank(&self) -> usize {
        self.spatial_dims + self.index_shape.len()
    }

    pub fn index_dims(&self) -> usize {
        self.index_shape.len()
    }

    pub fn has_fixed_shape(&self) -> bool {
        self.shape.iter().all(|s| matches!(s, Expr::Int {..}))
    }

    pub fn spatial_layout(&self) -> Vec<usize> {
        spatial_layout(&self.layout, self.spatial_dims)
    }

    pub fn elem_size(&self) -> Option<ElemSize> {
        self.dtype.get_scalar_elem_size().cloned()
    }

    pub fn access(&self, offsets: Vec<i64>, index: Vec<i64>) -> CompileResult<FieldAccess> {
        FieldAccess::new(self.clone(), offsets, index, None)
    }

    // Expression referring to the cell at a relative offset of the current cell.
    pub fn at(&self, offsets: &[i64]) -> CompileResult<Expr> {
        Ok(self.access(offsets.to_vec(), vec![])?.into_expr())
    }

    pub fn at_index(&self, offsets: &[i64], index: &[i64]) -> CompileResult<Expr> {
        Ok(self.access(offsets.to_vec(), index.to_vec())?.into_expr())
    }

    pub fn center(&self) -> CompileResult<Expr> {
        self.at(&vec![0; self.spatial_dims])
    }

    // The member of a struct-typed field at the current cell.
    pub fn member(&self, label: &str) -> CompileResult<Expr> {
        let offsets = vec![0; self.spatial_dims];
        let acc = FieldAccess::new(self.clone(), offsets, vec![], Some(label.to_string()))?;
        Ok(acc.into_expr())
    }
}

impl PartialEq for Field {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.dtype == other.dtype &&
            self.spatial_dims == other.spatial_dims && self.index_shape == other.index_shape
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

// An access to a field at a relative spatial offset of the current cell, selecting an index
// component (for fields with index dimensions) or a struct member.
#[derive(Clone, Debug, PartialEq)]
pub struct FieldAccess {
    pub field: Field,
    pub offsets: Vec<i64>,
    pub index: Vec<i64>,
    pub member: Option<String>,
}

impl FieldAccess {
    pub fn new(
        field: Field,
        offsets: Vec<i64>,
        index: Vec<i64>,
        member: Option<String>
    ) -> CompileResult<FieldAccess> {
        if offsets.len() != field.spatial_dims {
            return stencil_compile_error!(
                "Access to field {0} with {1} offsets, but the field has {2} spatial dimensions",
                field.name, offsets.len(), field.spatial_dims
            );
        }
        let index = if index.is_empty() && !field.index_shape.is_empty() {
            vec![0; field.index_shape.len()]
        } else {
            index
        };
        if index.len() != field.index_shape.len() {
            return stencil_compile_error!(
                "Access to field {0} with {1} index components, but the field has {2}",
                field.name, index.len(), field.index_shape.len()
            );
        }
        let out_of_bounds = index.iter().zip(field.index_shape.iter())
            .any(|(i, n)| *i < 0 || i >= n);
        if out_of_bounds {
            return stencil_compile_error!(
                "Index {index:?} is out of bounds for field {0} with index shape {1:?}",
                field.name, field.index_shape
            );
        }
        if let Some(label) = &member {
            if field.dtype.member_type(label).is_none() {
                return stencil_compile_error!(
                    "Field {0} has no struct member named {label}", field.name
                );
            }
        }
        Ok(FieldAccess {field, offsets, index, member})
    }

    // The type of the accessed element.
    pub fn elem_type(&self) -> Type {
        match &self.member {
            Some(label) => match self.field.dtype.member_type(label) {
                Some(sz) => Type::Scalar {sz},
                None => Type::Unknown
            },
            None => self.field.dtype.clone()
        }
    }

    // The number of ghost layers needed in a spatial dimension for this access to stay within the
    // array bounds.
    pub fn required_ghost_layers(&self, dim: usize) -> i64 {
        let n = self.offsets.get(dim).map(|o| o.abs()).unwrap_or(0);
        n.max(self.field.ghost_layers as i64)
    }

    pub fn neighbor(&self, dim: usize, offset: i64) -> FieldAccess {
        let mut offsets = self.offsets.clone();
        if let Some(o) = offsets.get_mut(dim) {
            *o += offset;
        }
        FieldAccess {offsets, ..self.clone()}
    }

    pub fn into_expr(self) -> Expr {
        let ty = self.elem_type();
        Expr::FieldAccess {access: self, ty}
    }
}

impl fmt::Display for FieldAccess {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let offsets = self.offsets.iter().map(|o| o.to_string()).collect::<Vec<_>>().join(",");
        write!(f, "{0}[{1}]", self.field.name, offsets)?;
        if !self.index.is_empty() {
            let idx = self.index.iter().map(|o| o.to_string()).collect::<Vec<_>>().join(",");
            write!(f, "({idx})")?;
        }
        if let Some(label) = &self.member {
            write!(f, ".{label}")?;
        }
        Ok(())
    }
}
