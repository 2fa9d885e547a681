//! Row-major dense tensor indexing helpers shared by CPTs and [`crate::core::Factor`].
//!
//! This engine bakes variable/label metadata directly onto its tensors
//! rather than keeping a generic `Tensor<T>` (contrast the pack's
//! `radiate-utils` `Tensor`/`Shape` types, which stay data-agnostic); every
//! factor operation in the algebra needs that metadata to align axes, so
//! the free functions below only do the row-major layout arithmetic and
//! leave ownership of shape/labels to the caller.

/// Computes the row-major strides for a shape: the last axis has stride 1,
/// and each earlier axis's stride is the product of the sizes to its right.
#[must_use]
pub(crate) fn row_major_strides(dims: &[usize]) -> Vec<usize> {
    let mut strides = vec![1usize; dims.len()];
    for axis in (0..dims.len().saturating_sub(1)).rev() {
        strides[axis] = strides[axis + 1] * dims[axis + 1];
    }
    strides
}

/// The total number of cells described by a shape (1 for a rank-0 shape).
#[must_use]
pub(crate) fn cell_count(dims: &[usize]) -> usize {
    dims.iter().product()
}

/// Converts a multi-index into a flat offset given row-major strides.
#[must_use]
pub(crate) fn flat_index(strides: &[usize], index: &[usize]) -> usize {
    strides.iter().zip(index).map(|(s, i)| s * i).sum()
}

/// Converts a flat offset back into a multi-index for the given shape.
#[must_use]
pub(crate) fn unravel_index(dims: &[usize], strides: &[usize], mut flat: usize) -> Vec<usize> {
    let mut index = vec![0usize; dims.len()];
    for axis in 0..dims.len() {
        index[axis] = flat / strides[axis];
        flat %= strides[axis];
    }
    index
}

/// Iterates over every multi-index described by `dims`, in row-major order.
pub(crate) fn indices(dims: &[usize]) -> impl Iterator<Item = Vec<usize>> + '_ {
    let total = cell_count(dims);
    let strides = row_major_strides(dims);
    (0..total).map(move |flat| unravel_index(dims, &strides, flat))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_major_strides() {
        assert_eq!(row_major_strides(&[2, 3, 4]), vec![12, 4, 1]);
        assert_eq!(row_major_strides(&[]), Vec::<usize>::new());
        assert_eq!(row_major_strides(&[5]), vec![1]);
    }

    #[test]
    fn test_roundtrip() {
        let dims = [2, 3, 4];
        let strides = row_major_strides(&dims);
        for flat in 0..cell_count(&dims) {
            let idx = unravel_index(&dims, &strides, flat);
            assert_eq!(flat_index(&strides, &idx), flat);
        }
    }

    #[test]
    fn test_indices_order() {
        let all: Vec<_> = indices(&[2, 2]).collect();
        assert_eq!(all, vec![vec![0, 0], vec![0, 1], vec![1, 0], vec![1, 1]]);
    }
}
