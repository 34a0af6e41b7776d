//! Flat exact-search storage
//!
//! Vectors live in one row-major `Array2<f32>`; a vector's internal id is
//! its row number. Removal compacts the matrix, so rows after a removed
//! one move down.

use ndarray::{Array2, ArrayView1, Axis};
use vitaledge_common::{Result, VectorDbError};

use crate::types::DeletionStrategy;

/// Exact L2 index with sequential internal ids
#[derive(Debug, Clone, PartialEq)]
pub struct FlatIndex {
    dimension: usize,
    vectors: Array2<f32>,
}

impl FlatIndex {
    /// Create empty index for `dimension`-long vectors
    pub fn new(dimension: usize) -> Result<Self> {
        if dimension == 0 {
            return Err(VectorDbError::DimensionInvalid(dimension));
        }

        Ok(Self {
            dimension,
            vectors: Array2::zeros((0, dimension)),
        })
    }

    pub(crate) fn from_array(vectors: Array2<f32>) -> Self {
        Self {
            dimension: vectors.ncols(),
            vectors,
        }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn len(&self) -> usize {
        self.vectors.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Raw row-major storage
    pub fn as_array(&self) -> &Array2<f32> {
        &self.vectors
    }

    /// Removal renumbers every row after the removed one
    pub fn deletion_strategy(&self) -> DeletionStrategy {
        DeletionStrategy::Compact
    }

    /// Check a vector against the index dimension
    pub fn check_dimension(&self, vector: &[f32]) -> Result<()> {
        if vector.len() != self.dimension {
            return Err(VectorDbError::DimensionMismatch {
                expected: self.dimension,
                actual: vector.len(),
            });
        }
        Ok(())
    }

    /// Append vectors, returning the first internal id assigned
    ///
    /// All vectors are validated before any row is written.
    pub fn add(&mut self, vectors: &[Vec<f32>]) -> Result<usize> {
        for vector in vectors {
            self.check_dimension(vector)?;
        }

        let first = self.len();
        for vector in vectors {
            self.vectors
                .push_row(ArrayView1::from(vector.as_slice()))
                .map_err(|e| anyhow::anyhow!("Failed to append vector row: {}", e))?;
        }

        Ok(first)
    }

    /// Stored vector at an internal id
    pub fn row(&self, position: usize) -> Option<ArrayView1<'_, f32>> {
        (position < self.len()).then(|| self.vectors.row(position))
    }

    /// Squared L2 distance from `query` to every stored row, in row order
    pub fn distances(&self, query: &[f32]) -> Result<Vec<f32>> {
        self.check_dimension(query)?;

        let distances = self
            .vectors
            .outer_iter()
            .map(|row| {
                row.iter()
                    .zip(query)
                    .map(|(a, b)| {
                        let d = a - b;
                        d * d
                    })
                    .sum::<f32>()
            })
            .collect();

        Ok(distances)
    }

    /// Physically remove rows, compacting storage
    ///
    /// `positions` must be in range; duplicates are ignored.
    pub fn remove_rows(&mut self, positions: &[usize]) {
        let keep: Vec<usize> = (0..self.len())
            .filter(|p| !positions.contains(p))
            .collect();

        self.vectors = if keep.is_empty() {
            Array2::zeros((0, self.dimension))
        } else {
            self.vectors.select(Axis(0), &keep)
        };
    }

    /// Drop every stored vector
    pub fn reset(&mut self) {
        self.vectors = Array2::zeros((0, self.dimension));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_rejects_zero_dimension() {
        assert!(matches!(
            FlatIndex::new(0),
            Err(VectorDbError::DimensionInvalid(0))
        ));
    }

    #[test]
    fn test_add_assigns_sequential_positions() {
        let mut index = FlatIndex::new(2).unwrap();
        assert_eq!(index.add(&[vec![0.0, 0.0], vec![1.0, 1.0]]).unwrap(), 0);
        assert_eq!(index.add(&[vec![2.0, 2.0]]).unwrap(), 2);
        assert_eq!(index.len(), 3);
        assert_eq!(index.row(2).unwrap().to_vec(), vec![2.0, 2.0]);
        assert!(index.row(3).is_none());
    }

    #[test]
    fn test_add_is_all_or_nothing() {
        let mut index = FlatIndex::new(2).unwrap();
        let result = index.add(&[vec![0.0, 0.0], vec![1.0, 1.0, 1.0]]);
        assert!(matches!(
            result,
            Err(VectorDbError::DimensionMismatch { expected: 2, actual: 3 })
        ));
        assert!(index.is_empty());
    }

    #[test]
    fn test_distances_are_squared_l2() {
        let mut index = FlatIndex::new(2).unwrap();
        index.add(&[vec![0.0, 0.0], vec![3.0, 4.0]]).unwrap();

        let distances = index.distances(&[0.0, 0.0]).unwrap();
        assert_eq!(distances, vec![0.0, 25.0]);
    }

    #[test]
    fn test_remove_rows_compacts() {
        let mut index = FlatIndex::new(1).unwrap();
        index.add(&[vec![10.0], vec![11.0], vec![12.0]]).unwrap();

        index.remove_rows(&[0]);

        assert_eq!(index.len(), 2);
        // Row 1 moved down to row 0
        assert_eq!(index.row(0).unwrap()[0], 11.0);
        assert_eq!(index.deletion_strategy(), DeletionStrategy::Compact);

        index.remove_rows(&[0, 1]);
        assert!(index.is_empty());
        assert_eq!(index.dimension(), 1);
    }
}
