use crate::stencil_compile_error;
use crate::utils::err::*;

use std::collections::BTreeSet;

// The memory layout of a field, given as a permutation of its dimensions ordered from the slowest
// to the fastest varying. Spatial dimension 0 is the x-coordinate.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum Layout {
    // Row-major order: the last dimension varies fastest.
    #[default] Numpy,
    // Column-major order: the first dimension varies fastest.
    Reverse,
    // Structure of arrays: index dimensions are slowest, the x-coordinate is fastest.
    Fzyx,
    // Array of structures: the x-coordinate is slowest among the spatial dimensions and the index
    // dimensions are fastest.
    Zyxf,
    Custom(Vec<usize>),
}

impl Layout {
    pub fn permutation(&self, spatial_dims: usize, index_dims: usize) -> CompileResult<Vec<usize>> {
        let rank = spatial_dims + index_dims;
        let spatial = 0..spatial_dims;
        let index = spatial_dims..rank;
        let perm = match self {
            Layout::Numpy => (0..rank).collect(),
            Layout::Reverse => (0..rank).rev().collect(),
            Layout::Fzyx => index.chain(spatial.rev()).collect(),
            Layout::Zyxf => spatial.rev().chain(index).collect(),
            Layout::Custom(p) => p.clone(),
        };
        validate_permutation(&perm, rank)?;
        Ok(perm)
    }
}

pub fn validate_permutation(perm: &[usize], rank: usize) -> CompileResult<()> {
    let distinct = perm.iter().collect::<BTreeSet<&usize>>();
    if perm.len() != rank || distinct.len() != rank || perm.iter().any(|d| *d >= rank) {
        stencil_compile_error!("Layout {perm:?} is not a permutation of {rank} dimensions")
    } else {
        Ok(())
    }
}

// Computes the element strides of a contiguous array with the given shape and layout.
pub fn strides_from_shape(shape: &[i64], layout: &[usize]) -> Vec<i64> {
    let mut strides = vec![0; shape.len()];
    let mut acc = 1;
    for d in layout.iter().rev() {
        strides[*d] = acc;
        acc *= shape[*d];
    }
    strides
}

// The layout restricted to the spatial dimensions.
pub fn spatial_layout(layout: &[usize], spatial_dims: usize) -> Vec<usize> {
    layout.iter()
        .filter(|d| **d < spatial_dims)
        .cloned()
        .collect()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn numpy_layout_strides() {
        let perm = Layout::Numpy.permutation(2, 0).unwrap();
        assert_eq!(perm, vec![0, 1]);
        assert_eq!(strides_from_shape(&[5, 7], &perm), vec![7, 1]);
    }

    #[test]
    fn reverse_layout_strides() {
        let perm = Layout::Reverse.permutation(3, 0).unwrap();
        assert_eq!(strides_from_shape(&[2, 3, 4], &perm), vec![1, 2, 6]);
    }

    #[test]
    fn soa_and_aos_layouts() {
        assert_eq!(Layout::Fzyx.permutation(2, 1).unwrap(), vec![2, 1, 0]);
        assert_eq!(Layout::Zyxf.permutation(2, 1).unwrap(), vec![1, 0, 2]);
        assert_eq!(spatial_layout(&[2, 1, 0], 2), vec![1, 0]);
    }

    #[test]
    fn invalid_custom_layout() {
        assert!(Layout::Custom(vec![0, 0]).permutation(2, 0).is_err());
        assert!(Layout::Custom(vec![0, 2]).permutation(2, 0).is_err());
        assert!(Layout::Custom(vec![1, 0]).permutation(2, 0).is_ok());
    }
}
