use crate::field::Field;
use crate::ir::ast::*;
use crate::ir::symbols::undefined_symbols;
use crate::stencil_type_error;
use crate::utils::err::*;
use crate::utils::name::Name;

fn classify(id: &Name, fields: &[Field]) -> ParamKind {
    let s = id.get_str();
    for f in fields {
        if *s == f.base_pointer_name() {
            return ParamKind::FieldPointer {field: f.name.clone()};
        }
        for d in 0..f.rank() {
            if *s == Field::shape_symbol_name(&f.name, d) {
                return ParamKind::FieldShape {field: f.name.clone(), dim: d};
            }
            if *s == Field::stride_symbol_name(&f.name, d) {
                return ParamKind::FieldStride {field: f.name.clone(), dim: d};
            }
        }
    }
    ParamKind::Scalar
}

fn kind_order(kind: &ParamKind) -> usize {
    match kind {
        ParamKind::FieldPointer {..} => 0,
        ParamKind::FieldShape {..} => 1,
        ParamKind::FieldStride {..} => 2,
        ParamKind::Scalar => 3,
    }
}

// The parameters of a kernel are the symbols its body reads without defining them. They are
// ordered by kind (field pointers, shapes, strides, scalars) and then by name.
pub fn kernel_parameters(body: &[Node], fields: &[Field]) -> CompileResult<Vec<Param>> {
    let mut params = undefined_symbols(body).into_iter()
        .map(|(id, ty)| {
            if ty.is_unknown() {
                return stencil_type_error!(
                    "Kernel parameter {0} is only used by custom code and has no type",
                    id.get_str()
                );
            }
            let kind = classify(&id, fields);
            Ok(Param {id, ty, kind})
        })
        .collect::<CompileResult<Vec<Param>>>()?;
    params.sort_by(|l, r| {
        kind_order(&l.kind).cmp(&kind_order(&r.kind))
            .then_with(|| l.id.get_str().cmp(r.id.get_str()))
    });
    for p in params.iter() {
        tracing::debug!("Kernel parameter {0}: {1} ({2:?})", p.id, p.ty, p.kind);
    }
    Ok(params)
}
