//! Flat (brute force) L2 index over bookmark title embeddings.
//!
//! Rows are stored contiguously and addressed by position, so row `i`
//! belongs to title `i` of the catalog.

use rayon::prelude::*;

/// Flat vector index with exhaustive squared-Euclidean search.
#[derive(Debug, Clone, PartialEq)]
pub struct FlatIndex {
    dimensions: usize,
    /// Row-major, `len() * dimensions` values
    data: Vec<f32>,
    /// Content hash of the text each row was embedded from
    hashes: Vec<u64>,
}

/// A search hit: row position and squared L2 distance to the query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    pub position: usize,
    pub distance: f32,
}

impl FlatIndex {
    /// Create a new empty index. A dimension of 0 is fixed by the first row.
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions,
            data: Vec::new(),
            hashes: Vec::new(),
        }
    }

    /// Create an index with pre-allocated capacity.
    pub fn with_capacity(dimensions: usize, capacity: usize) -> Self {
        Self {
            dimensions,
            data: Vec::with_capacity(dimensions * capacity),
            hashes: Vec::with_capacity(capacity),
        }
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub fn len(&self) -> usize {
        self.hashes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hashes.is_empty()
    }

    /// Append a row.
    pub fn add(&mut self, content_hash: u64, embedding: &[f32]) -> Result<(), IndexError> {
        if embedding.is_empty() {
            return Err(IndexError::EmptyVector);
        }

        if self.dimensions == 0 && self.is_empty() {
            self.dimensions = embedding.len();
        }

        if embedding.len() != self.dimensions {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimensions,
                got: embedding.len(),
            });
        }

        self.data.extend_from_slice(embedding);
        self.hashes.push(content_hash);
        Ok(())
    }

    /// Vector stored at `position`.
    pub fn vector(&self, position: usize) -> Option<&[f32]> {
        if position >= self.len() {
            return None;
        }
        let start = position * self.dimensions;
        Some(&self.data[start..start + self.dimensions])
    }

    pub fn content_hash(&self, position: usize) -> Option<u64> {
        self.hashes.get(position).copied()
    }

    /// Iterate over `(content_hash, vector)` rows in position order.
    pub fn iter(&self) -> impl Iterator<Item = (u64, &[f32])> {
        self.hashes
            .iter()
            .copied()
            .zip(self.data.chunks_exact(self.dimensions.max(1)))
    }

    /// The `k` rows closest to `query`, nearest first.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>, IndexError> {
        if k == 0 || self.is_empty() {
            return Ok(vec![]);
        }

        if query.len() != self.dimensions {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimensions,
                got: query.len(),
            });
        }

        let mut results: Vec<Neighbor> = self
            .data
            .par_chunks_exact(self.dimensions)
            .enumerate()
            .map(|(position, row)| Neighbor {
                position,
                distance: squared_l2(query, row),
            })
            .collect();

        results.sort_by(|a, b| {
            a.distance
                .partial_cmp(&b.distance)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.position.cmp(&b.position))
        });
        results.truncate(k);

        Ok(results)
    }

    /// Nearest rows among `candidates` only. Used for graphs over a sample.
    pub fn search_within(
        &self,
        query: &[f32],
        candidates: &[usize],
        k: usize,
    ) -> Result<Vec<Neighbor>, IndexError> {
        if query.len() != self.dimensions {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimensions,
                got: query.len(),
            });
        }

        let mut results: Vec<Neighbor> = candidates
            .iter()
            .filter_map(|&position| {
                self.vector(position).map(|row| Neighbor {
                    position,
                    distance: squared_l2(query, row),
                })
            })
            .collect();

        results.sort_by(|a, b| {
            a.distance
                .partial_cmp(&b.distance)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.position.cmp(&b.position))
        });
        results.truncate(k);

        Ok(results)
    }
}

pub fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y) * (x - y)).sum()
}

/// Errors that can occur during index operations.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("Dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("Cannot store an empty vector")]
    EmptyVector,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_index() {
        let index = FlatIndex::new(384);
        assert_eq!(index.dimensions(), 384);
        assert!(index.is_empty());
        assert_eq!(index.len(), 0);
    }

    #[test]
    fn test_add_and_get() {
        let mut index = FlatIndex::new(3);
        index.add(12345, &[1.0, 0.0, 0.0]).unwrap();
        index.add(777, &[0.0, 1.0, 0.0]).unwrap();

        assert_eq!(index.len(), 2);
        assert_eq!(index.vector(1).unwrap(), &[0.0, 1.0, 0.0]);
        assert_eq!(index.content_hash(0), Some(12345));
        assert!(index.vector(2).is_none());
    }

    #[test]
    fn test_first_row_fixes_dimension() {
        let mut index = FlatIndex::new(0);
        index.add(1, &[1.0, 2.0]).unwrap();
        assert_eq!(index.dimensions(), 2);

        let result = index.add(2, &[1.0, 2.0, 3.0]);
        assert!(matches!(result, Err(IndexError::DimensionMismatch { .. })));
    }

    #[test]
    fn test_add_dimension_mismatch() {
        let mut index = FlatIndex::new(3);
        let result = index.add(1, &[1.0, 0.0, 0.0, 0.0]);
        assert!(matches!(result, Err(IndexError::DimensionMismatch { .. })));
        assert!(index.is_empty());
    }

    #[test]
    fn test_search_orders_by_distance() {
        let mut index = FlatIndex::new(2);
        index.add(0, &[10.0, 10.0]).unwrap();
        index.add(0, &[1.0, 0.0]).unwrap();
        index.add(0, &[3.0, 0.0]).unwrap();

        let results = index.search(&[0.0, 0.0], 10).unwrap();
        let positions: Vec<usize> = results.iter().map(|n| n.position).collect();
        assert_eq!(positions, vec![1, 2, 0]);
        assert!((results[0].distance - 1.0).abs() < f32::EPSILON);
        assert!((results[1].distance - 9.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_search_with_limit() {
        let mut index = FlatIndex::new(3);
        for i in 0..10 {
            index.add(i, &[1.0, i as f32 * 0.1, 0.0]).unwrap();
        }

        let results = index.search(&[1.0, 0.0, 0.0], 3).unwrap();
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].position, 0);
    }

    #[test]
    fn test_search_empty_and_zero_k() {
        let index = FlatIndex::new(3);
        assert!(index.search(&[1.0, 0.0, 0.0], 5).unwrap().is_empty());

        let mut index = FlatIndex::new(3);
        index.add(1, &[1.0, 0.0, 0.0]).unwrap();
        assert!(index.search(&[1.0, 0.0, 0.0], 0).unwrap().is_empty());
    }

    #[test]
    fn test_search_query_dimension_mismatch() {
        let mut index = FlatIndex::new(3);
        index.add(1, &[1.0, 0.0, 0.0]).unwrap();
        let result = index.search(&[1.0, 0.0], 1);
        assert!(matches!(result, Err(IndexError::DimensionMismatch { .. })));
    }

    #[test]
    fn test_search_within_candidates() {
        let mut index = FlatIndex::new(2);
        index.add(0, &[0.0, 0.0]).unwrap();
        index.add(0, &[1.0, 0.0]).unwrap();
        index.add(0, &[5.0, 0.0]).unwrap();

        let results = index.search_within(&[0.0, 0.0], &[1, 2], 10).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].position, 1);
    }

    #[test]
    fn test_iter_rows() {
        let mut index = FlatIndex::new(2);
        index.add(7, &[1.0, 2.0]).unwrap();
        index.add(8, &[3.0, 4.0]).unwrap();

        let rows: Vec<(u64, Vec<f32>)> = index.iter().map(|(h, v)| (h, v.to_vec())).collect();
        assert_eq!(rows, vec![(7, vec![1.0, 2.0]), (8, vec![3.0, 4.0])]);
    }
}
