use super::Matrix;

/// Fully allocated matrix, stored column by column.
/// Good for small problems and for checking the sparse one.
#[derive(Debug, Clone)]
pub struct DenseMatrix {
    rows: usize,
    columns: usize,
    mem: Vec<f64>,
    used_ranges: Vec<(usize, usize)>,
    editing: Option<usize>,
}

impl Matrix for DenseMatrix {
    fn new(rows: usize, columns: usize) -> Self {
        Self {
            rows,
            columns,
            mem: vec![0f64; rows * columns],
            used_ranges: vec![(0, 0); columns],
            editing: None,
        }
    }
    fn rows(&self) -> usize {
        self.rows
    }
    fn columns(&self) -> usize {
        self.columns
    }
    fn get(&self, i: usize, j: usize) -> f64 {
        let (start, end) = self.used_ranges[j];
        if self.editing == Some(j) || (start..end).contains(&i) {
            self.mem[j * self.rows + i]
        } else {
            0f64
        }
    }
    fn set(&mut self, i: usize, j: usize, v: f64) {
        debug_assert_eq!(self.editing, Some(j));
        self.mem[j * self.rows + i] = v;
    }
    fn start_editing_column(&mut self, j: usize, _hint_begin: usize, _hint_end: usize) {
        assert!(self.editing.is_none());
        self.editing = Some(j);
        let rows = self.rows;
        self.mem[j * rows..(j + 1) * rows]
            .iter_mut()
            .for_each(|x| *x = 0f64);
    }
    fn finish_editing_column(&mut self, j: usize, used_begin: usize, used_end: usize) {
        assert_eq!(self.editing, Some(j));
        debug_assert!(used_begin <= used_end && used_end <= self.rows);
        self.used_ranges[j] = (used_begin, used_end);
        self.editing = None;
    }
    fn used_row_range(&self, j: usize) -> (usize, usize) {
        self.used_ranges[j]
    }
    fn clear_column(&mut self, j: usize) {
        self.used_ranges[j] = (0, 0);
        let rows = self.rows;
        self.mem[j * rows..(j + 1) * rows]
            .iter_mut()
            .for_each(|x| *x = 0f64);
    }
    fn allocated_entries(&self) -> usize {
        self.mem.len()
    }
    fn reset(&mut self, rows: usize, columns: usize) {
        self.rows = rows;
        self.columns = columns;
        self.mem.clear();
        self.mem.resize(rows * columns, 0f64);
        self.used_ranges.clear();
        self.used_ranges.resize(columns, (0, 0));
        self.editing = None;
    }
}
