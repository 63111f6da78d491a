//! Per-domain vector indexes.
//!
//! A [`DomainIndex`] pairs one [`VectorIndex`] with an index-aligned list of
//! [`Passage`]s: row `i` of the index is the embedding of passage `i`. The
//! length equality is checked every time a `DomainIndex` is constructed, so
//! a value of this type always satisfies it.
//!
//! [`FlatIndex`] is the default vector index: a contiguous row-major arena
//! of unit vectors searched exhaustively by inner product.

use std::cmp::Ordering;

use crate::embedding::{inner_product, l2_normalize};
use crate::error::IndexError;
use crate::models::Passage;

/// One k-nearest-neighbor result: a row number and its similarity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IndexHit {
    pub row: usize,
    pub score: f32,
}

/// Nearest-neighbor search over stored vectors.
///
/// `search` returns up to `k` hits ordered by descending score. Callers must
/// not rely on that ordering across different indexes.
pub trait VectorIndex: Send + Sync {
    fn dims(&self) -> usize;
    /// Number of stored vectors. O(1).
    fn len(&self) -> usize;
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
    fn search(&self, query: &[f32], k: usize) -> Vec<IndexHit>;
}

/// Exact inner-product index over a contiguous `Vec<f32>`.
#[derive(Debug, Clone, PartialEq)]
pub struct FlatIndex {
    dims: usize,
    data: Vec<f32>,
}

impl FlatIndex {
    pub fn new(dims: usize) -> Result<Self, IndexError> {
        if dims == 0 {
            return Err(IndexError::EmptyVector);
        }
        Ok(Self {
            dims,
            data: Vec::new(),
        })
    }

    /// Rebuild an index from previously stored rows, taken as-is.
    pub fn from_rows(dims: usize, data: Vec<f32>) -> Result<Self, IndexError> {
        if dims == 0 {
            return Err(IndexError::EmptyVector);
        }
        if data.len() % dims != 0 {
            return Err(IndexError::DimensionMismatch {
                expected: dims,
                got: data.len() % dims,
            });
        }
        Ok(Self { dims, data })
    }

    /// Normalize and append one vector, returning its row number.
    pub fn add(&mut self, vector: &[f32]) -> Result<usize, IndexError> {
        if vector.len() != self.dims {
            return Err(IndexError::DimensionMismatch {
                expected: self.dims,
                got: vector.len(),
            });
        }
        let row = self.len();
        let start = self.data.len();
        self.data.extend_from_slice(vector);
        l2_normalize(&mut self.data[start..]);
        Ok(row)
    }

    /// Append a batch. Nothing is added unless every vector has the right
    /// dimensionality.
    pub fn add_batch(&mut self, vectors: &[Vec<f32>]) -> Result<(), IndexError> {
        if let Some(bad) = vectors.iter().find(|v| v.len() != self.dims) {
            return Err(IndexError::DimensionMismatch {
                expected: self.dims,
                got: bad.len(),
            });
        }
        self.data.reserve(vectors.len() * self.dims);
        for v in vectors {
            self.add(v)?;
        }
        Ok(())
    }

    pub fn row(&self, row: usize) -> Option<&[f32]> {
        let start = row.checked_mul(self.dims)?;
        self.data.get(start..start + self.dims)
    }

    /// All rows, row-major.
    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }
}

impl VectorIndex for FlatIndex {
    fn dims(&self) -> usize {
        self.dims
    }

    fn len(&self) -> usize {
        self.data.len() / self.dims
    }

    fn search(&self, query: &[f32], k: usize) -> Vec<IndexHit> {
        if k == 0 || query.len() != self.dims {
            return Vec::new();
        }

        let mut hits: Vec<IndexHit> = self
            .data
            .chunks_exact(self.dims)
            .enumerate()
            .map(|(row, v)| IndexHit {
                row,
                score: inner_product(query, v),
            })
            .collect();

        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(Ordering::Equal)
                .then(a.row.cmp(&b.row))
        });
        hits.truncate(k);
        hits
    }
}

/// A vector index and its index-aligned passage metadata.
#[derive(Debug, Clone)]
pub struct DomainIndex<I = FlatIndex> {
    index: I,
    passages: Vec<Passage>,
}

impl<I: VectorIndex> DomainIndex<I> {
    /// Pair an index with its passages.
    ///
    /// Fails with [`IndexError::LengthMismatch`] unless there is exactly one
    /// passage per stored vector.
    pub fn new(index: I, passages: Vec<Passage>) -> Result<Self, IndexError> {
        if index.len() != passages.len() {
            return Err(IndexError::LengthMismatch {
                vectors: index.len(),
                passages: passages.len(),
            });
        }
        Ok(Self { index, passages })
    }

    pub fn index(&self) -> &I {
        &self.index
    }

    pub fn passages(&self) -> &[Passage] {
        &self.passages
    }

    /// Resolve a search row to its passage.
    pub fn passage(&self, row: usize) -> Option<&Passage> {
        self.passages.get(row)
    }

    pub fn vector_count(&self) -> usize {
        self.index.len()
    }

    pub fn into_parts(self) -> (I, Vec<Passage>) {
        (self.index, self.passages)
    }
}

impl DomainIndex<FlatIndex> {
    /// Build a flat index from raw embeddings, one per passage.
    pub fn build(
        dims: usize,
        vectors: &[Vec<f32>],
        passages: Vec<Passage>,
    ) -> Result<Self, IndexError> {
        if vectors.len() != passages.len() {
            return Err(IndexError::LengthMismatch {
                vectors: vectors.len(),
                passages: passages.len(),
            });
        }
        let mut index = FlatIndex::new(dims)?;
        index.add_batch(vectors)?;
        Self::new(index, passages)
    }
}
