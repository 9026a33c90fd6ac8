//! Column-banded probability matrices.
//!
//! Rows run along the read and columns along the template. Each column
//! records the range of rows that were actually filled; every cell outside
//! of it reads as zero, the probability-space negative infinity.
//! Columns are written by the protocol
//! `start_editing_column` -> `set`* -> `finish_editing_column`.
pub mod dense;
pub mod scaled;
pub mod sparse;
pub use dense::DenseMatrix;
pub use scaled::{Direction, ScaledMatrix};
pub use sparse::SparseMatrix;

pub trait Matrix {
    /// A `rows` x `columns` matrix with every column empty.
    fn new(rows: usize, columns: usize) -> Self
    where
        Self: Sized;
    fn rows(&self) -> usize;
    fn columns(&self) -> usize;
    fn is_null(&self) -> bool {
        self.rows() == 0 && self.columns() == 0
    }
    /// Zero outside of the used range, unless `j` is being edited.
    fn get(&self, i: usize, j: usize) -> f64;
    /// Only valid inside the column being edited.
    fn set(&mut self, i: usize, j: usize, v: f64);
    /// Zero-fill the column `j` and start writing to it.
    /// The hint is the row range expected to be written.
    fn start_editing_column(&mut self, j: usize, hint_begin: usize, hint_end: usize);
    fn finish_editing_column(&mut self, j: usize, used_begin: usize, used_end: usize);
    fn used_row_range(&self, j: usize) -> (usize, usize);
    fn is_column_empty(&self, j: usize) -> bool {
        let (begin, end) = self.used_row_range(j);
        end <= begin
    }
    fn clear_column(&mut self, j: usize);
    fn used_entries(&self) -> usize {
        (0..self.columns())
            .map(|j| {
                let (start, end) = self.used_row_range(j);
                end.saturating_sub(start)
            })
            .sum()
    }
    fn used_entries_ratio(&self) -> f64 {
        let size = self.rows() * self.columns();
        if size == 0 {
            0f64
        } else {
            self.used_entries() as f64 / size as f64
        }
    }
    /// Number of cells with backing storage.
    fn allocated_entries(&self) -> usize;
    /// Resize into a `rows` x `columns` matrix with every column empty.
    /// Storage is reused where possible.
    fn reset(&mut self, rows: usize, columns: usize);
}
