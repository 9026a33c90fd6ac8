use super::Matrix;

// Extra rows allocated on both sides of a requested range.
const PADDING: usize = 8;
// A column is reallocated when the new range needs less than this fraction
// of the current storage.
const SHRINK_THRESHOLD: f64 = 0.8;

/// A vector of logical length `len` where only [begin, end) is backed by memory.
#[derive(Debug, Clone)]
pub struct SparseVector {
    len: usize,
    begin: usize,
    end: usize,
    storage: Vec<f64>,
}

impl SparseVector {
    pub fn new(len: usize, begin: usize, end: usize) -> Self {
        debug_assert!(begin <= end && end <= len);
        let begin = begin.saturating_sub(PADDING);
        let end = (end + PADDING).min(len);
        Self {
            len,
            begin,
            end,
            storage: vec![0f64; end - begin],
        }
    }
    /// Destructive. Zero-fill and re-center the storage on [begin, end).
    pub fn reset_for_range(&mut self, begin: usize, end: usize) {
        debug_assert!(begin <= end && end <= self.len);
        let new_begin = begin.saturating_sub(PADDING);
        let new_end = (end + PADDING).min(self.len);
        let new_size = new_end - new_begin;
        let shrink = (new_size as f64) < SHRINK_THRESHOLD * self.storage.len() as f64;
        self.storage.clear();
        self.storage.resize(new_size, 0f64);
        if shrink {
            self.storage.shrink_to_fit();
        }
        self.begin = new_begin;
        self.end = new_end;
    }
    pub fn is_allocated(&self, i: usize) -> bool {
        (self.begin..self.end).contains(&i)
    }
    pub fn get(&self, i: usize) -> f64 {
        if self.is_allocated(i) {
            self.storage[i - self.begin]
        } else {
            0f64
        }
    }
    pub fn set(&mut self, i: usize, v: f64) {
        debug_assert!(i < self.len);
        if !self.is_allocated(i) {
            let new_begin = i.saturating_sub(PADDING).min(self.begin);
            let new_end = (i + PADDING).max(self.end).min(self.len);
            self.expand_allocated(new_begin, new_end);
        }
        self.storage[i - self.begin] = v;
    }
    pub fn clear(&mut self) {
        self.storage.iter_mut().for_each(|x| *x = 0f64);
    }
    pub fn allocated_entries(&self) -> usize {
        self.storage.capacity()
    }
    // Grow the storage to [begin, end), keeping the contents.
    fn expand_allocated(&mut self, begin: usize, end: usize) {
        debug_assert!(begin <= self.begin && self.end <= end && end <= self.len);
        let mut storage = vec![0f64; end - begin];
        let offset = self.begin - begin;
        storage[offset..offset + (self.end - self.begin)]
            .copy_from_slice(&self.storage[..self.end - self.begin]);
        self.storage = storage;
        self.begin = begin;
        self.end = end;
    }
}

/// Matrix allocating each column lazily, sized to the band written in it.
#[derive(Debug, Clone)]
pub struct SparseMatrix {
    rows: usize,
    columns: Vec<Option<SparseVector>>,
    used_ranges: Vec<(usize, usize)>,
    editing: Option<usize>,
}

impl Matrix for SparseMatrix {
    fn new(rows: usize, columns: usize) -> Self {
        Self {
            rows,
            columns: vec![None; columns],
            used_ranges: vec![(0, 0); columns],
            editing: None,
        }
    }
    fn rows(&self) -> usize {
        self.rows
    }
    fn columns(&self) -> usize {
        self.columns.len()
    }
    fn get(&self, i: usize, j: usize) -> f64 {
        let (start, end) = self.used_ranges[j];
        match self.columns[j].as_ref() {
            Some(column) if self.editing == Some(j) || (start..end).contains(&i) => column.get(i),
            _ => 0f64,
        }
    }
    fn set(&mut self, i: usize, j: usize, v: f64) {
        debug_assert_eq!(self.editing, Some(j));
        if let Some(column) = self.columns[j].as_mut() {
            column.set(i, v);
        }
    }
    fn start_editing_column(&mut self, j: usize, hint_begin: usize, hint_end: usize) {
        assert!(self.editing.is_none());
        self.editing = Some(j);
        let hint_end = hint_end.min(self.rows);
        let hint_begin = hint_begin.min(hint_end);
        match self.columns[j].as_mut() {
            Some(column) => column.reset_for_range(hint_begin, hint_end),
            None => self.columns[j] = Some(SparseVector::new(self.rows, hint_begin, hint_end)),
        }
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
        if let Some(column) = self.columns[j].as_mut() {
            column.clear();
        }
    }
    fn allocated_entries(&self) -> usize {
        self.columns
            .iter()
            .filter_map(|c| c.as_ref())
            .map(|c| c.allocated_entries())
            .sum()
    }
    fn reset(&mut self, rows: usize, columns: usize) {
        if rows != self.rows {
            self.columns.clear();
        }
        self.rows = rows;
        self.columns.resize(columns, None);
        self.used_ranges.clear();
        self.used_ranges.resize(columns, (0, 0));
        self.editing = None;
    }
}
