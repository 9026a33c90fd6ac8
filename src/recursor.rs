//! Banded forward-backward recursions.
//!
//! Rows run along the read, columns along the template. Both alpha and beta
//! are pinned: the path starts with a match of the first read base to the
//! first template base, and ends with a match of the last ones.
//! All values are probabilities, kept in range by the column scaling of
//! `ScaledMatrix`.
//!
//! Each column is filled only in a band of rows. The band is guided by the
//! previous column, by the matrix's own previous fill, and by the other
//! matrix, and it ends where the cells fall below `max / exp(score_diff)`.
use crate::error::{Error, Result};
use crate::matrix::{Matrix, ScaledMatrix};
use crate::model::{Model, MoveType, DEFAULT_TEMPLATE_POSITION};
use crate::seq;
use crate::template::TemplateAccess;
use std::marker::PhantomData;

pub const MAX_FLIP_FLOPS: usize = 5;
pub const REBANDING_THRESHOLD: f64 = 0.04;
/// Tolerance of |1 - alpha/beta| when an evaluator is created.
pub const EARLY_ALPHA_BETA_MISMATCH_TOLERANCE: f64 = 0.0001;
/// Tolerance of |1 - alpha/beta| when an evaluator is refilled.
pub const ALPHA_BETA_MISMATCH_TOLERANCE: f64 = 0.001;

/// How two path probabilities are merged into a cell.
pub trait Combiner {
    fn combine(a: f64, b: f64) -> f64;
}

/// Forward algorithm. Sum over paths.
#[derive(Debug, Clone, Copy, Default)]
pub struct SumProduct;

impl Combiner for SumProduct {
    #[inline]
    fn combine(a: f64, b: f64) -> f64 {
        a + b
    }
}

/// Viterbi algorithm. The best path.
#[derive(Debug, Clone, Copy, Default)]
pub struct Viterbi;

impl Combiner for Viterbi {
    #[inline]
    fn combine(a: f64, b: f64) -> f64 {
        a.max(b)
    }
}

#[inline]
fn range_union(x: (usize, usize), y: (usize, usize)) -> (usize, usize) {
    (x.0.min(y.0), x.1.max(y.1))
}

/// The recursions of one read under one model.
#[derive(Debug, Clone)]
pub struct Recursor<C: Combiner = SumProduct> {
    model: Model,
    // Two bit encoded read.
    read: Vec<u8>,
    // Cells below max/score_diff are out of the band.
    score_diff: f64,
    combiner: PhantomData<C>,
}

impl<C: Combiner> Recursor<C> {
    /// `score_diff` is in natural log units.
    pub fn new(model: Model, read: &[u8], score_diff: f64) -> Self {
        Self {
            model,
            read: seq::encode(read),
            score_diff: score_diff.exp(),
            combiner: PhantomData,
        }
    }
    pub fn model(&self) -> &Model {
        &self.model
    }
    pub fn read_len(&self) -> usize {
        self.read.len()
    }
    pub fn undo_counter_weights(&self) -> f64 {
        self.model.undo_counter_weights(self.read.len())
    }
    #[inline]
    fn emission(&self, mv: MoveType, i: usize, prev: u8, curr: u8) -> f64 {
        self.model.emission_pr(mv, self.read[i], prev, curr)
    }
    /// Fill `alpha`, a (|read|+1) x (|tpl|+1) matrix, using `guide` (usually
    /// beta, or the null matrix) to place the band.
    pub fn fill_alpha<T, M>(&self, tpl: &T, guide: &ScaledMatrix<M>, alpha: &mut ScaledMatrix<M>)
    where
        T: TemplateAccess + ?Sized,
        M: Matrix,
    {
        let (rows, columns) = (self.read.len(), tpl.len());
        assert!(alpha.rows() == rows + 1 && alpha.columns() == columns + 1);
        assert!(guide.is_null() || (guide.rows() == rows + 1 && guide.columns() == columns + 1));
        alpha.start_editing_column(0, 0, 1);
        alpha.set(0, 0, 1f64);
        alpha.finish_editing_column(0, 0, 1);
        let (mut hint_begin, mut hint_end) = (1, 1);
        let mut prev = DEFAULT_TEMPLATE_POSITION;
        for j in 1..columns {
            let curr = *tpl.get(j - 1);
            let next_idx = tpl.get(j).idx;
            let (b, e) = self.range_guide(j, guide, alpha, (hint_begin, hint_end));
            hint_begin = b;
            hint_end = e;
            alpha.start_editing_column(j, hint_begin, hint_end);
            let begin_row = hint_begin;
            let (mut score, mut max_score, mut threshold) = (0f64, 0f64, 0f64);
            let mut i = begin_row;
            while i < rows && (threshold <= score || i < hint_end) {
                score = 0f64;
                if 0 < i {
                    let mat = alpha.get(i - 1, j - 1)
                        * prev.mat
                        * self.emission(MoveType::Match, i - 1, prev.idx, curr.idx);
                    score = C::combine(score, mat);
                }
                if 1 < i {
                    let ins = alpha.get(i - 1, j);
                    let branch = ins
                        * curr.branch
                        * self.emission(MoveType::Branch, i - 1, curr.idx, next_idx);
                    score = C::combine(score, branch);
                    let stick = ins
                        * curr.stick
                        * self.emission(MoveType::Stick, i - 1, curr.idx, next_idx);
                    score = C::combine(score, stick);
                }
                if 1 < j {
                    score = C::combine(score, alpha.get(i, j - 1) * prev.del);
                }
                alpha.set(i, j, score);
                if max_score < score {
                    max_score = score;
                    threshold = max_score / self.score_diff;
                }
                i += 1;
            }
            let end_row = i;
            prev = curr;
            hint_end = end_row;
            hint_begin = (begin_row..end_row)
                .find(|&i| threshold <= alpha.get(i, j))
                .unwrap_or(end_row);
            alpha.finish_editing_column(j, begin_row, end_row);
        }
        let last = tpl.get(columns - 1).idx;
        let likelihood = alpha.get(rows - 1, columns - 1)
            * self.emission(MoveType::Match, rows - 1, prev.idx, last);
        alpha.start_editing_column(columns, rows, rows + 1);
        alpha.set(rows, columns, likelihood);
        alpha.finish_editing_column(columns, rows, rows + 1);
    }
    /// Fill `beta`, the backward counterpart of `fill_alpha`.
    pub fn fill_beta<T, M>(&self, tpl: &T, guide: &ScaledMatrix<M>, beta: &mut ScaledMatrix<M>)
    where
        T: TemplateAccess + ?Sized,
        M: Matrix,
    {
        let (rows, columns) = (self.read.len(), tpl.len());
        assert!(beta.rows() == rows + 1 && beta.columns() == columns + 1);
        assert!(guide.is_null() || (guide.rows() == rows + 1 && guide.columns() == columns + 1));
        beta.start_editing_column(columns, rows, rows + 1);
        beta.set(rows, columns, 1f64);
        beta.finish_editing_column(columns, rows, rows + 1);
        let (mut hint_begin, mut hint_end) = (rows, rows);
        for j in (1..columns).rev() {
            let next_idx = tpl.get(j).idx;
            let curr = *tpl.get(j - 1);
            let (b, e) = self.range_guide(j, guide, beta, (hint_begin, hint_end));
            hint_begin = b;
            hint_end = e;
            beta.start_editing_column(j, hint_begin, hint_end);
            let end_row = hint_end;
            let (mut score, mut max_score, mut threshold) = (0f64, 0f64, 0f64);
            // One past the row to be filled.
            let mut i = end_row;
            while 1 < i && (threshold <= score || hint_begin < i) {
                let r = i - 1;
                score = 0f64;
                if r + 1 < rows {
                    let mat = beta.get(r + 1, j + 1)
                        * curr.mat
                        * self.emission(MoveType::Match, r, curr.idx, next_idx);
                    score = C::combine(score, mat);
                } else if r + 1 == rows && j + 1 == columns {
                    let mat = beta.get(r + 1, j + 1)
                        * self.emission(MoveType::Match, r, curr.idx, next_idx);
                    score = C::combine(score, mat);
                }
                if r < rows {
                    let ins = beta.get(r + 1, j);
                    let branch = ins
                        * curr.branch
                        * self.emission(MoveType::Branch, r, curr.idx, next_idx);
                    score = C::combine(score, branch);
                    let stick =
                        ins * curr.stick * self.emission(MoveType::Stick, r, curr.idx, next_idx);
                    score = C::combine(score, stick);
                }
                score = C::combine(score, beta.get(r, j + 1) * curr.del);
                beta.set(r, j, score);
                if max_score < score {
                    max_score = score;
                    threshold = max_score / self.score_diff;
                }
                i -= 1;
            }
            let begin_row = i;
            hint_begin = begin_row;
            hint_end = (begin_row..end_row)
                .rev()
                .find(|&i| threshold <= beta.get(i, j))
                .map(|i| i + 1)
                .unwrap_or(begin_row);
            beta.finish_editing_column(j, begin_row, end_row);
        }
        let first = tpl.get(0).idx;
        let likelihood = beta.get(1, 1)
            * self.emission(MoveType::Match, 0, DEFAULT_TEMPLATE_POSITION.idx, first);
        beta.start_editing_column(0, 0, 1);
        beta.set(0, 0, likelihood);
        beta.finish_editing_column(0, 0, 1);
    }
    /// Log likelihood of the whole alignment, computed by joining `alpha`
    /// and `beta` at a template position.
    ///
    /// `alpha_column`, `beta_column` and `absolute_column` all point to the
    /// same position, in the coordinate of `alpha`, `beta` and `tpl`
    /// respectively. Columns `alpha_column - 2`, `alpha_column - 1` of alpha
    /// and `beta_column`, `beta_column + 1` of beta are read.
    pub fn link_alpha_beta<T, M>(
        &self,
        tpl: &T,
        alpha: &ScaledMatrix<M>,
        alpha_column: usize,
        beta: &ScaledMatrix<M>,
        beta_column: usize,
        absolute_column: usize,
    ) -> f64
    where
        T: TemplateAccess + ?Sized,
        M: Matrix,
    {
        let rows = self.read.len();
        assert!(1 < alpha_column && 1 < absolute_column && absolute_column <= tpl.len());
        let (begin, end) = range_union(
            range_union(
                alpha.used_row_range(alpha_column - 2),
                alpha.used_row_range(alpha_column - 1),
            ),
            range_union(
                beta.used_row_range(beta_column),
                beta.used_row_range(beta_column + 1),
            ),
        );
        let curr = tpl.get(absolute_column - 1);
        let prev = tpl.get(absolute_column - 2);
        let mut v = 0f64;
        for i in begin..end {
            let a = alpha.get(i, alpha_column - 1);
            if i < rows {
                let em = self.emission(MoveType::Match, i, prev.idx, curr.idx);
                v = C::combine(v, a * prev.mat * em * beta.get(i + 1, beta_column));
            }
            v = C::combine(v, a * prev.del * beta.get(i, beta_column));
        }
        v.ln()
            + alpha.log_prod_scales(0, alpha_column)
            + beta.log_prod_scales(beta_column, beta.columns())
    }
    /// Fill the columns [begin_column, begin_column + num_ext_columns) of
    /// alpha for the (mutated) template `tpl` into `ext`, starting from the
    /// column `begin_column - 1` of `alpha`. The columns of `alpha` before
    /// `begin_column` should be valid for `tpl`.
    pub fn extend_alpha<T, M>(
        &self,
        tpl: &T,
        alpha: &ScaledMatrix<M>,
        begin_column: usize,
        ext: &mut ScaledMatrix<M>,
        num_ext_columns: usize,
    ) where
        T: TemplateAccess + ?Sized,
        M: Matrix,
    {
        let (rows, columns) = (self.read.len(), tpl.len());
        assert!(1 < begin_column && 0 < num_ext_columns);
        assert!(begin_column + num_ext_columns <= columns + 1);
        assert!(alpha.rows() == rows + 1 && ext.rows() == rows + 1);
        assert!(num_ext_columns <= ext.columns());
        let (begin_row, end_row) = {
            let (begin, end) = alpha.used_row_range(begin_column);
            let end = (begin_column + 1..alpha.columns())
                .take(num_ext_columns)
                .map(|j| alpha.used_row_range(j).1)
                .fold(end, usize::max);
            if begin_column + num_ext_columns == columns + 1 {
                (begin, rows + 1)
            } else {
                (begin, end)
            }
        };
        for ext_col in 0..num_ext_columns {
            let j = begin_column + ext_col;
            let curr = *tpl.get(j - 1);
            let prev = if 1 < j {
                *tpl.get(j - 2)
            } else {
                DEFAULT_TEMPLATE_POSITION
            };
            let next_idx = if j < columns { tpl.get(j).idx } else { seq::NULL };
            let prev_col = move |i: usize, ext: &ScaledMatrix<M>| -> f64 {
                if ext_col == 0 {
                    alpha.get(i, j - 1)
                } else {
                    ext.get(i, ext_col - 1)
                }
            };
            ext.start_editing_column(ext_col, begin_row, end_row);
            for i in begin_row..end_row {
                let mut score = 0f64;
                if 0 < i {
                    let from = prev_col(i - 1, ext);
                    let em = self.emission(MoveType::Match, i - 1, prev.idx, curr.idx);
                    if i < rows && j < columns {
                        score = from * prev.mat * em;
                    } else if i == rows && j == columns {
                        score = from * em;
                    }
                }
                if 1 < i && i < rows && j < columns {
                    let ins = ext.get(i - 1, ext_col);
                    let branch = ins
                        * curr.branch
                        * self.emission(MoveType::Branch, i - 1, curr.idx, next_idx);
                    score = C::combine(score, branch);
                    let stick = ins
                        * curr.stick
                        * self.emission(MoveType::Stick, i - 1, curr.idx, next_idx);
                    score = C::combine(score, stick);
                }
                if 1 < j && j < columns && i < rows {
                    score = C::combine(score, prev_col(i, ext) * prev.del);
                }
                ext.set(i, ext_col, score);
            }
            ext.finish_editing_column(ext_col, begin_row, end_row);
        }
    }
    /// Fill beta for the (mutated) template `tpl` from the column
    /// `last_column` of the original template back to the first column,
    /// into `ext`. `length_diff` is the length of `tpl` minus the length of
    /// the template `beta` was filled for. The column `last_column + 1` of
    /// `beta` should be valid for `tpl`.
    ///
    /// After this, `ext` has `1 + length_diff + last_column` columns and
    /// `ext(0, 0)` is the total probability, up to scaling.
    pub fn extend_beta<T, M>(
        &self,
        tpl: &T,
        beta: &ScaledMatrix<M>,
        last_column: usize,
        ext: &mut ScaledMatrix<M>,
        length_diff: isize,
    ) where
        T: TemplateAccess + ?Sized,
        M: Matrix,
    {
        let rows = self.read.len();
        let columns = tpl.len() as isize;
        let num_ext_columns = 1 + length_diff + last_column as isize;
        assert!(0 < num_ext_columns && num_ext_columns as usize <= ext.columns());
        assert!(last_column + 1 < beta.columns());
        assert!(beta.rows() == rows + 1 && ext.rows() == rows + 1);
        let last_ext_column = (num_ext_columns - 1) as usize;
        let first_column = -length_diff;
        let (begin_row, end_row) = {
            let (begin, end) = beta.used_row_range(last_column + 1);
            let begin = (0..=last_column)
                .take(num_ext_columns as usize + 1)
                .map(|j| beta.used_row_range(last_column - j).0)
                .fold(begin, usize::min);
            (begin, end)
        };
        // j runs in the original coordinate, jp in the coordinate of `tpl`.
        let mut j = last_column as isize;
        while last_column as isize - num_ext_columns < j {
            let jp = (j + length_diff) as usize;
            let ext_col = last_ext_column - (last_column as isize - j) as usize;
            let next_idx = tpl.get(jp).idx;
            let curr = if 0 < jp {
                *tpl.get(jp - 1)
            } else {
                DEFAULT_TEMPLATE_POSITION
            };
            let next_col = move |i: usize, ext: &ScaledMatrix<M>| -> f64 {
                if ext_col == last_ext_column {
                    beta.get(i, j as usize + 1)
                } else {
                    ext.get(i, ext_col + 1)
                }
            };
            let movable = first_column < j;
            ext.start_editing_column(ext_col, begin_row, end_row);
            for i in (begin_row..end_row).rev() {
                let mut score = 0f64;
                if 0 < i && i < rows && movable {
                    if j < columns {
                        let mat = next_col(i + 1, ext)
                            * curr.mat
                            * self.emission(MoveType::Match, i, curr.idx, next_idx);
                        score = C::combine(score, mat);
                    }
                    let ins = ext.get(i + 1, ext_col);
                    let branch = ins
                        * curr.branch
                        * self.emission(MoveType::Branch, i, curr.idx, next_idx);
                    score = C::combine(score, branch);
                    let stick =
                        ins * curr.stick * self.emission(MoveType::Stick, i, curr.idx, next_idx);
                    score = C::combine(score, stick);
                }
                if 0 < i && movable && j < columns {
                    score = C::combine(score, next_col(i, ext) * curr.del);
                }
                ext.set(i, ext_col, score);
            }
            ext.finish_editing_column(ext_col, begin_row, end_row);
            j -= 1;
        }
        let next = if last_ext_column == 0 {
            beta.get(1, last_column + 1)
        } else {
            ext.get(1, 1)
        };
        let first = tpl.get(0).idx;
        let likelihood =
            next * self.emission(MoveType::Match, 0, DEFAULT_TEMPLATE_POSITION.idx, first);
        ext.start_editing_column(0, 0, 1);
        ext.set(0, 0, likelihood);
        ext.finish_editing_column(0, 0, 1);
    }
    /// Fill alpha and beta, refilling each with the other as the guide until
    /// their totals agree within `tolerance`. Returns the number of refills.
    pub fn fill_alpha_beta<T, M>(
        &self,
        tpl: &T,
        alpha: &mut ScaledMatrix<M>,
        beta: &mut ScaledMatrix<M>,
        tolerance: f64,
    ) -> Result<usize>
    where
        T: TemplateAccess + ?Sized,
        M: Matrix,
    {
        if tpl.is_empty() {
            return Err(Error::TemplateTooSmall);
        }
        let (rows, columns) = (self.read.len(), tpl.len());
        self.fill_alpha(tpl, &ScaledMatrix::null(), alpha);
        self.fill_beta(tpl, alpha, beta);
        let mut flip_flops = 0;
        let max_size = ((REBANDING_THRESHOLD * ((rows + 1) * (columns + 1)) as f64).round()
            as usize)
            .max(100);
        if max_size <= alpha.used_entries() || max_size <= beta.used_entries() {
            self.fill_alpha(tpl, beta, alpha);
            self.fill_beta(tpl, alpha, beta);
            self.fill_alpha(tpl, beta, alpha);
            flip_flops += 3;
        }
        let unweight = self.undo_counter_weights();
        let totals = |alpha: &ScaledMatrix<M>, beta: &ScaledMatrix<M>| {
            let alpha_v = alpha.get(rows, columns).ln() + alpha.log_prod_scales_all() + unweight;
            let beta_v = beta.get(0, 0).ln() + beta.log_prod_scales_all() + unweight;
            (alpha_v, beta_v)
        };
        let (mut alpha_v, mut beta_v) = totals(alpha, beta);
        while flip_flops <= MAX_FLIP_FLOPS {
            if (1f64 - alpha_v / beta_v).abs() <= tolerance {
                break;
            }
            if flip_flops % 2 == 0 {
                self.fill_alpha(tpl, beta, alpha);
            } else {
                self.fill_beta(tpl, alpha, beta);
            }
            flip_flops += 1;
            let (a, b) = totals(alpha, beta);
            alpha_v = a;
            beta_v = b;
        }
        if 1 < flip_flops {
            trace!("FLIPFLOP\t{}\t{}\t{:.4}\t{:.4}", rows, columns, alpha_v, beta_v);
        }
        if tolerance < (1f64 - alpha_v / beta_v).abs() || !beta_v.is_finite() {
            Err(Error::AlphaBetaMismatch)
        } else {
            Ok(flip_flops)
        }
    }
    // The rows of the column j holding the mass of the distribution.
    fn row_range<M: Matrix>(&self, j: usize, matrix: &ScaledMatrix<M>) -> (usize, usize) {
        let (begin, end) = matrix.used_row_range(j);
        let (mut max_row, mut max_score) = (begin, matrix.get(begin, j));
        for i in begin + 1..end {
            let score = matrix.get(i, j);
            if max_score < score {
                max_row = i;
                max_score = score;
            }
        }
        let threshold = max_score / self.score_diff;
        let begin = (begin..max_row)
            .find(|&i| threshold <= matrix.get(i, j))
            .unwrap_or(max_row);
        let mut end = end;
        while max_row < end && matrix.get(end - 1, j) < threshold {
            end -= 1;
        }
        (begin, end)
    }
    // Widen `hint` by the bands of column j in `guide` and `matrix`.
    fn range_guide<M: Matrix>(
        &self,
        j: usize,
        guide: &ScaledMatrix<M>,
        matrix: &ScaledMatrix<M>,
        hint: (usize, usize),
    ) -> (usize, usize) {
        let mut interval = hint;
        if !(guide.is_null() || guide.is_column_empty(j)) {
            interval = range_union(self.row_range(j, guide), interval);
        }
        if !(matrix.is_null() || matrix.is_column_empty(j)) {
            interval = range_union(self.row_range(j, matrix), interval);
        }
        interval
    }
}
