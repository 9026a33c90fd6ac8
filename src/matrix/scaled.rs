use super::{Matrix, SparseMatrix};

/// Which way the cumulative scale runs.
/// Alpha accumulates from the first column, beta from the last one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Reverse,
}

/// A matrix whose columns are normalized by their maximum when they are
/// finished. The true value of (i, j) is `get(i, j) * exp(log_scale(j))`
/// where `log_scale(j)` is the cumulative log scale up to j in the direction
/// of the matrix.
#[derive(Debug, Clone)]
pub struct ScaledMatrix<M: Matrix = SparseMatrix> {
    inner: M,
    log_scalars: Vec<f64>,
    direction: Direction,
}

impl<M: Matrix> ScaledMatrix<M> {
    pub fn with_direction(rows: usize, columns: usize, direction: Direction) -> Self {
        Self {
            inner: M::new(rows, columns),
            log_scalars: vec![0f64; columns],
            direction,
        }
    }
    /// The 0x0 matrix, used where there is no matrix yet.
    pub fn null() -> Self {
        Self::with_direction(0, 0, Direction::Forward)
    }
    pub fn direction(&self) -> Direction {
        self.direction
    }
    pub fn set_direction(&mut self, direction: Direction) {
        self.direction = direction;
    }
    /// Cumulative log scale at the column `j`.
    pub fn log_scale(&self, j: usize) -> f64 {
        self.log_scalars[j]
    }
    /// Sum of the log scales of the columns in [begin, end).
    pub fn log_prod_scales(&self, begin: usize, end: usize) -> f64 {
        match self.direction {
            Direction::Forward => {
                let f = if 0 < begin {
                    self.log_scalars[begin - 1]
                } else {
                    0f64
                };
                let l = if 0 < end {
                    self.log_scalars[end - 1]
                } else {
                    0f64
                };
                l - f
            }
            Direction::Reverse => {
                let f = self.log_scalars.get(begin).copied().unwrap_or(0f64);
                let l = self.log_scalars.get(end).copied().unwrap_or(0f64);
                f - l
            }
        }
    }
    /// Sum of the log scales of all columns.
    pub fn log_prod_scales_all(&self) -> f64 {
        match self.direction {
            Direction::Forward => self.log_scalars.last().copied().unwrap_or(0f64),
            Direction::Reverse => self.log_scalars.first().copied().unwrap_or(0f64),
        }
    }
    /// ln of the true value of (i, j).
    pub fn get_log(&self, i: usize, j: usize) -> f64 {
        self.get(i, j).ln() + self.log_scalars[j]
    }
    pub fn inner(&self) -> &M {
        &self.inner
    }
}

impl<M: Matrix> Matrix for ScaledMatrix<M> {
    fn new(rows: usize, columns: usize) -> Self {
        Self::with_direction(rows, columns, Direction::Forward)
    }
    fn rows(&self) -> usize {
        self.inner.rows()
    }
    fn columns(&self) -> usize {
        self.inner.columns()
    }
    #[inline]
    fn get(&self, i: usize, j: usize) -> f64 {
        self.inner.get(i, j)
    }
    #[inline]
    fn set(&mut self, i: usize, j: usize, v: f64) {
        self.inner.set(i, j, v)
    }
    fn start_editing_column(&mut self, j: usize, hint_begin: usize, hint_end: usize) {
        self.inner.start_editing_column(j, hint_begin, hint_end)
    }
    fn finish_editing_column(&mut self, j: usize, used_begin: usize, used_end: usize) {
        let max = (used_begin..used_end)
            .map(|i| self.inner.get(i, j))
            .fold(0f64, f64::max);
        let last = match self.direction {
            Direction::Forward if 0 < j => self.log_scalars[j - 1],
            Direction::Reverse if j + 1 < self.columns() => self.log_scalars[j + 1],
            _ => 0f64,
        };
        if max != 0f64 && max != 1f64 {
            for i in used_begin..used_end {
                let v = self.inner.get(i, j);
                self.inner.set(i, j, v / max);
            }
            self.log_scalars[j] = last + max.ln();
        } else {
            self.log_scalars[j] = last;
        }
        self.inner.finish_editing_column(j, used_begin, used_end);
    }
    fn used_row_range(&self, j: usize) -> (usize, usize) {
        self.inner.used_row_range(j)
    }
    fn clear_column(&mut self, j: usize) {
        self.inner.clear_column(j);
        self.log_scalars[j] = 0f64;
    }
    fn allocated_entries(&self) -> usize {
        self.inner.allocated_entries()
    }
    fn reset(&mut self, rows: usize, columns: usize) {
        self.inner.reset(rows, columns);
        self.log_scalars.clear();
        self.log_scalars.resize(columns, 0f64);
    }
}
