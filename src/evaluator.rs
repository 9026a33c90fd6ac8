//! One read against its window of the template.
//!
//! An evaluator owns the alpha and beta matrices of its read. The likelihood
//! of a mutation is computed by extending alpha (or beta) over the few
//! columns the mutation touches and linking with the other matrix, so
//! scoring never refills a whole matrix unless the template is tiny.
use crate::error::Error;
use crate::matrix::{Direction, Matrix, ScaledMatrix, SparseMatrix};
use crate::model::Model;
use crate::mutation::Mutation;
use crate::recursor::{
    Recursor, ALPHA_BETA_MISMATCH_TOLERANCE, EARLY_ALPHA_BETA_MISMATCH_TOLERANCE,
};
use crate::template::{
    normal_parameters, MutatedTemplate, Template, TemplateAccess, Window, WindowView,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Strand {
    Forward,
    Reverse,
    Unmapped,
}

/// A read with the model of its chemistry and SNR.
#[derive(Debug, Clone, PartialEq)]
pub struct Read {
    pub name: String,
    pub seq: Vec<u8>,
    pub model: Model,
}

impl Read {
    pub fn new(name: &str, seq: &[u8], model: Model) -> Self {
        Self {
            name: name.to_string(),
            seq: seq.to_ascii_uppercase(),
            model,
        }
    }
}

/// A read placed on the forward template: [template_start, template_end).
/// Reverse strand reads are reverse-complemented with respect to the
/// forward template.
#[derive(Debug, Clone, PartialEq)]
pub struct MappedRead {
    pub read: Read,
    pub strand: Strand,
    pub template_start: usize,
    pub template_end: usize,
    pub pin_start: bool,
    pub pin_end: bool,
}

impl MappedRead {
    pub fn new(
        read: Read,
        strand: Strand,
        template_start: usize,
        template_end: usize,
        pin_start: bool,
        pin_end: bool,
    ) -> Self {
        Self {
            read,
            strand,
            template_start,
            template_end,
            pin_start,
            pin_end,
        }
    }
    pub fn len(&self) -> usize {
        self.read.seq.len()
    }
    pub fn is_empty(&self) -> bool {
        self.read.seq.is_empty()
    }
}

/// Every state except `Valid` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EvaluatorState {
    Valid,
    AlphaBetaMismatch,
    PoorZScore,
    TemplateTooSmall,
    Other,
}

impl EvaluatorState {
    pub fn name(&self) -> &'static str {
        match self {
            EvaluatorState::Valid => "VALID",
            EvaluatorState::AlphaBetaMismatch => "ALPHA/BETA MISMATCH",
            EvaluatorState::PoorZScore => "POOR Z-SCORE",
            EvaluatorState::TemplateTooSmall => "TEMPLATE TOO SMALL",
            EvaluatorState::Other => "OTHER",
        }
    }
}

impl std::fmt::Display for EvaluatorState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl From<&Error> for EvaluatorState {
    fn from(e: &Error) -> Self {
        match e {
            Error::AlphaBetaMismatch => EvaluatorState::AlphaBetaMismatch,
            Error::PoorZScore { .. } => EvaluatorState::PoorZScore,
            Error::TemplateTooSmall => EvaluatorState::TemplateTooSmall,
            _ => EvaluatorState::Other,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Evaluator<M: Matrix = SparseMatrix> {
    name: String,
    strand: Strand,
    window: Window,
    recursor: Recursor,
    alpha: ScaledMatrix<M>,
    beta: ScaledMatrix<M>,
    // Scratch for scoring mutations.
    ext: ScaledMatrix<M>,
    state: EvaluatorState,
    num_flip_flops: usize,
    normal_parameters: (f64, f64),
}

impl<M: Matrix> Evaluator<M> {
    /// Fill the matrices of `read` against `window` of `master`.
    /// A NaN `min_z_score` disables the z-score check.
    pub fn new(
        read: &MappedRead,
        master: &Template,
        window: Window,
        min_z_score: f64,
        score_diff: f64,
    ) -> Self {
        let recursor = Recursor::new(read.read.model, &read.read.seq, score_diff);
        let mut evaluator = Self {
            name: read.read.name.clone(),
            strand: read.strand,
            window,
            recursor,
            alpha: ScaledMatrix::null(),
            beta: ScaledMatrix::null(),
            ext: ScaledMatrix::null(),
            state: EvaluatorState::Valid,
            num_flip_flops: 0,
            normal_parameters: (0f64, 0f64),
        };
        if window.len() < 2 {
            evaluator.invalidate(EvaluatorState::TemplateTooSmall);
            return evaluator;
        }
        if let Err(e) = evaluator.recalculate(master, EARLY_ALPHA_BETA_MISMATCH_TOLERANCE) {
            evaluator.invalidate((&e).into());
            return evaluator;
        }
        let z = evaluator.z_score();
        if !min_z_score.is_nan() && (z < min_z_score || !z.is_finite()) {
            debug!("{}\tZ-score\t{:.3}", evaluator.name, z);
            evaluator.invalidate(EvaluatorState::PoorZScore);
        }
        evaluator
    }
    pub fn name(&self) -> &str {
        &self.name
    }
    pub fn model(&self) -> &Model {
        self.recursor.model()
    }
    pub fn strand(&self) -> Strand {
        self.strand
    }
    pub fn window(&self) -> &Window {
        &self.window
    }
    pub fn state(&self) -> EvaluatorState {
        self.state
    }
    pub fn is_valid(&self) -> bool {
        self.state == EvaluatorState::Valid
    }
    pub fn num_flip_flops(&self) -> usize {
        self.num_flip_flops
    }
    pub fn alpha(&self) -> &ScaledMatrix<M> {
        &self.alpha
    }
    pub fn beta(&self) -> &ScaledMatrix<M> {
        &self.beta
    }
    /// Log likelihood of the read against the current template.
    /// NaN once the evaluator is dead.
    pub fn ll(&self) -> f64 {
        if !self.is_valid() {
            return std::f64::NAN;
        }
        self.beta.get(0, 0).ln()
            + self.beta.log_prod_scales_all()
            + self.recursor.undo_counter_weights()
    }
    /// Mean and variance of the log likelihood of a read generated from
    /// the current window.
    pub fn normal_parameters(&self) -> (f64, f64) {
        self.normal_parameters
    }
    pub fn z_score(&self) -> f64 {
        let (mean, var) = self.normal_parameters;
        (self.ll() - mean) / var.sqrt()
    }
    /// Log likelihood of the read if `mutation` were applied. `mutated` is
    /// the master of this evaluator with `mutation` applied on the fly.
    /// Mutations outside of the window give `ll()`.
    pub fn ll_of(&mut self, mutated: &MutatedTemplate, mutation: &Mutation) -> f64 {
        let local = match self.window.translate(mutation) {
            Some(local) if self.is_valid() => local,
            _ => return self.ll(),
        };
        let diff = mutation.length_diff();
        let new_len = (self.window.len() as isize + diff) as usize;
        if new_len == 0 {
            return std::f64::NEG_INFINITY;
        }
        let tpl = WindowView::new(mutated, self.window.start, new_len);
        let rows = self.recursor.read_len() + 1;
        let (start, end) = (local.start(), local.end());
        let beta_link_column = 1 + end;
        let absolute_link_column = (1 + end as isize + diff) as usize;
        let at_begin = start < 3;
        let at_end = self.beta.columns() < end + 3;
        let score = if !at_begin && !at_end {
            let extend_start = start.min(absolute_link_column - 2);
            let extend_length = absolute_link_column - extend_start;
            self.ext.reset(rows, extend_length);
            self.ext.set_direction(Direction::Forward);
            self.recursor
                .extend_alpha(&tpl, &self.alpha, extend_start, &mut self.ext, extend_length);
            self.recursor.link_alpha_beta(
                &tpl,
                &self.ext,
                extend_length,
                &self.beta,
                beta_link_column,
                absolute_link_column,
            ) + self.alpha.log_prod_scales(0, extend_start)
        } else if !at_begin && at_end {
            let extend_start = start - 1;
            let extend_length = new_len - extend_start + 1;
            self.ext.reset(rows, extend_length);
            self.ext.set_direction(Direction::Forward);
            self.recursor
                .extend_alpha(&tpl, &self.alpha, extend_start, &mut self.ext, extend_length);
            self.ext.get(rows - 1, extend_length - 1).ln()
                + self.alpha.log_prod_scales(0, extend_start)
                + self.ext.log_prod_scales(0, extend_length)
        } else if at_begin && !at_end {
            let extend_length = absolute_link_column;
            self.ext.reset(rows, extend_length);
            self.ext.set_direction(Direction::Reverse);
            self.recursor
                .extend_beta(&tpl, &self.beta, end, &mut self.ext, diff);
            self.ext.get(0, 0).ln()
                + self.beta.log_prod_scales(end + 1, self.beta.columns())
                + self.ext.log_prod_scales(0, extend_length)
        } else {
            let mut alpha: ScaledMatrix<M> =
                ScaledMatrix::with_direction(rows, new_len + 1, Direction::Forward);
            self.recursor
                .fill_alpha(&tpl, &ScaledMatrix::null(), &mut alpha);
            alpha.get(rows - 1, new_len).ln() + alpha.log_prod_scales_all()
        };
        score + self.recursor.undo_counter_weights()
    }
    /// Follow `mutations` applied to the master, which is now `master`.
    /// The matrices are refilled when any of them hit the window.
    /// Returns whether this evaluator is still alive.
    pub fn apply_mutations(&mut self, master: &Template, mutations: &[Mutation]) -> bool {
        if !self.is_valid() {
            self.window.apply_mutations(mutations);
            return false;
        }
        if self.window.apply_mutations(mutations) {
            if self.window.len() < 2 {
                self.invalidate(EvaluatorState::TemplateTooSmall);
            } else if let Err(e) = self.recalculate(master, ALPHA_BETA_MISMATCH_TOLERANCE) {
                self.invalidate((&e).into());
            }
        }
        self.is_valid()
    }
    /// Mark this evaluator dead. It is excluded from scoring from now on.
    pub fn invalidate(&mut self, state: EvaluatorState) {
        debug!("{}\t{}->{}", self.name, self.state, state);
        self.state = state;
        self.alpha = ScaledMatrix::null();
        self.beta = ScaledMatrix::null();
        self.ext = ScaledMatrix::null();
    }
    fn recalculate(&mut self, master: &Template, tolerance: f64) -> crate::error::Result<()> {
        let tpl = self.window.view(master);
        let (rows, columns) = (self.recursor.read_len() + 1, tpl.len() + 1);
        self.alpha.reset(rows, columns);
        self.alpha.set_direction(Direction::Forward);
        self.beta.reset(rows, columns);
        self.beta.set_direction(Direction::Reverse);
        self.num_flip_flops = self
            .recursor
            .fill_alpha_beta(&tpl, &mut self.alpha, &mut self.beta, tolerance)?;
        self.normal_parameters = normal_parameters(&tpl, master.model());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gen_seq;
    use crate::matrix::DenseMatrix;
    use crate::model::{Chemistry, Snr};
    use crate::mutation::apply_mutations;
    use crate::seq;
    use rand::{Rng, SeedableRng};
    use rand_xoshiro::Xoshiro256StarStar;
    fn p6c4() -> Model {
        Model::new(Chemistry::P6C4, Snr::new(10f64, 7f64, 5f64, 11f64).unwrap())
    }
    fn forward(read: &[u8], model: Model, start: usize, end: usize, pin: bool) -> MappedRead {
        let read = Read::new("read", read, model);
        MappedRead::new(read, Strand::Forward, start, end, pin, pin)
    }
    fn evaluator<M: Matrix>(master: &Template, read: &MappedRead) -> Evaluator<M> {
        let window = Window::new(
            read.template_start,
            read.template_end,
            read.pin_start,
            read.pin_end,
        );
        Evaluator::new(read, master, window, std::f64::NAN, 12.5)
    }
    fn mutations(tpl: &[u8], rng: &mut Xoshiro256StarStar) -> Vec<Mutation> {
        let mut muts = vec![];
        for i in 0..=tpl.len() {
            let base = seq::BASES[rng.gen_range(0..4)];
            muts.push(Mutation::insertion(i, base));
            if i < tpl.len() {
                let base = seq::BASES[rng.gen_range(0..4)];
                if base != tpl[i] {
                    muts.push(Mutation::substitution(i, base));
                }
                muts.push(Mutation::deletion(i, 1));
            }
            if i + 3 <= tpl.len() && i % 3 == 0 {
                muts.push(Mutation::insertion_bases(i, &tpl[i..i + 3]));
                muts.push(Mutation::deletion(i, 3));
            }
        }
        muts
    }
    #[test]
    fn small_ll() {
        let model = p6c4();
        let master = Template::new(b"ACGTCGT", model).unwrap();
        let read = forward(b"ACGTACGT", model, 0, 7, true);
        let mut eval: Evaluator = evaluator(&master, &read);
        assert!(eval.is_valid());
        let ll = eval.ll();
        assert!((ll + 4.74517984808494).abs() < 0.001, "{}", ll);
        let expected = vec![
            (Mutation::insertion(4, b'A'), 4.002503863645920),
            (Mutation::substitution(2, b'C'), -5.19526526492876),
            (Mutation::deletion(4, 1), -4.33430539094949),
            (Mutation::deletion(6, 1), -9.70299447206563),
            (Mutation::deletion(0, 1), -10.5597017942167),
            (Mutation::substitution(4, b'A'), -0.16699291260157),
            (Mutation::insertion(4, b'G'), -1.60697112438296),
        ];
        for (m, delta) in expected {
            let mutated = master.mutate(&m);
            let score = eval.ll_of(&mutated, &m) - ll;
            assert!((score - delta).abs() < 0.001, "{}\t{}\t{}", m, score, delta);
        }
    }
    #[test]
    fn mutation_equivalence() {
        let mut rng: Xoshiro256StarStar = SeedableRng::seed_from_u64(3290);
        for chem in vec![Chemistry::P6C4, Chemistry::SP1C1Beta] {
            let model = Model::new(chem, Snr::new(10f64, 7f64, 5f64, 11f64).unwrap());
            for len in vec![5, 10, 30] {
                let tpl = gen_seq::generate_seq(&mut rng, len);
                let read = gen_seq::introduce_randomness(&tpl, &mut rng, &gen_seq::PROFILE);
                if read.len() < 2 {
                    continue;
                }
                let master = Template::new(&tpl, model).unwrap();
                let mapped = forward(&read, model, 0, len, true);
                let mut eval: Evaluator = evaluator(&master, &mapped);
                if !eval.is_valid() {
                    continue;
                }
                let ll = eval.ll();
                let used = (eval.alpha().used_entries(), eval.beta().used_entries());
                for m in mutations(&tpl, &mut rng) {
                    let mutated = master.mutate(&m);
                    let score = eval.ll_of(&mutated, &m);
                    assert_eq!(eval.ll(), ll);
                    let used_after = (eval.alpha().used_entries(), eval.beta().used_entries());
                    assert_eq!(used_after, used);
                    let fresh_master = Template::new(&apply_mutations(&tpl, &[m.clone()]), model);
                    let fresh_master = fresh_master.unwrap();
                    let fresh_len = fresh_master.len();
                    let fresh: Evaluator = evaluator(
                        &fresh_master,
                        &forward(&read, model, 0, fresh_len, true),
                    );
                    if !fresh.is_valid() {
                        continue;
                    }
                    let expected = fresh.ll();
                    assert!(
                        (1f64 - score / expected).abs() < 0.001,
                        "{}\t{}\t{}",
                        m,
                        score,
                        expected
                    );
                    // Scoring does not change the state.
                    assert_eq!(eval.ll_of(&mutated, &m), score);
                }
            }
        }
    }
    #[test]
    fn out_of_window() {
        let model = p6c4();
        let mut rng: Xoshiro256StarStar = SeedableRng::seed_from_u64(10);
        let tpl = gen_seq::generate_seq(&mut rng, 50);
        let master = Template::new(&tpl, model).unwrap();
        let read = gen_seq::introduce_randomness(&tpl[10..40], &mut rng, &gen_seq::CCS_PROFILE);
        let mut eval: Evaluator = evaluator(&master, &forward(&read, model, 10, 40, false));
        assert!(eval.is_valid());
        let ll = eval.ll();
        for m in vec![
            Mutation::insertion(5, b'A'),
            Mutation::insertion(10, b'A'),
            Mutation::substitution(45, b'A'),
            Mutation::insertion(40, b'A'),
        ] {
            let mutated = master.mutate(&m);
            assert_eq!(eval.ll_of(&mutated, &m), ll);
        }
        let m = Mutation::deletion(20, 1);
        let mutated = master.mutate(&m);
        assert!(eval.ll_of(&mutated, &m) != ll);
    }
    #[test]
    fn apply_and_refill() {
        let model = p6c4();
        let mut rng: Xoshiro256StarStar = SeedableRng::seed_from_u64(2390);
        let tpl = gen_seq::generate_seq(&mut rng, 60);
        let read = gen_seq::introduce_randomness(&tpl, &mut rng, &gen_seq::CCS_PROFILE);
        let mut master = Template::new(&tpl, model).unwrap();
        let mapped = forward(&read, model, 0, 60, true);
        let mut eval: Evaluator<DenseMatrix> = evaluator(&master, &mapped);
        let muts = vec![Mutation::substitution(10, b'A'), Mutation::deletion(30, 2)];
        master.apply_mutations(&muts);
        assert!(eval.apply_mutations(&master, &muts));
        assert!(eval.is_valid());
        assert_eq!(eval.window().len(), 58);
        let fresh: Evaluator<DenseMatrix> =
            evaluator(&master, &forward(&read, model, 0, 58, true));
        assert!((eval.ll() - fresh.ll()).abs() < 0.001);
        assert!((eval.z_score() - fresh.z_score()).abs() < 0.001);
    }
    #[test]
    fn apply_shrinks_window() {
        let model = p6c4();
        let mut master = Template::new(b"ACGT", model).unwrap();
        let mut eval: Evaluator = evaluator(&master, &forward(b"ACGT", model, 0, 4, true));
        assert!(eval.is_valid());
        let muts = vec![Mutation::deletion(0, 3)];
        master.apply_mutations(&muts);
        assert!(!eval.apply_mutations(&master, &muts));
        assert_eq!(eval.state(), EvaluatorState::TemplateTooSmall);
        assert_eq!(eval.window().len(), 1);
        assert!(!eval.apply_mutations(&master, &[]));
    }
    #[test]
    fn too_small() {
        let model = p6c4();
        let master = Template::new(b"A", model).unwrap();
        let eval: Evaluator = evaluator(&master, &forward(b"A", model, 0, 1, true));
        assert_eq!(eval.state(), EvaluatorState::TemplateTooSmall);
        let master = Template::new(b"AA", model).unwrap();
        let eval: Evaluator = evaluator(&master, &forward(b"AA", model, 0, 2, true));
        assert_eq!(eval.state(), EvaluatorState::Valid);
    }
    #[test]
    fn poor_z_score() {
        let model = p6c4();
        let mut rng: Xoshiro256StarStar = SeedableRng::seed_from_u64(43);
        let tpl = gen_seq::generate_seq(&mut rng, 100);
        let read = gen_seq::generate_seq(&mut rng, 100);
        let master = Template::new(&tpl, model).unwrap();
        let mapped = forward(&read, model, 0, 100, true);
        let window = Window::new(0, 100, true, true);
        let eval: Evaluator = Evaluator::new(&mapped, &master, window, -3.5, 12.5);
        assert!(!eval.is_valid());
        let eval: Evaluator = Evaluator::new(&mapped, &master, window, std::f64::NAN, 12.5);
        if eval.is_valid() {
            assert!(eval.z_score() < -3.5, "{}", eval.z_score());
        }
        let read = gen_seq::introduce_randomness(&tpl, &mut rng, &gen_seq::CCS_PROFILE);
        let mapped = forward(&read, model, 0, 100, true);
        let eval: Evaluator = Evaluator::new(&mapped, &master, window, -3.5, 12.5);
        assert_eq!(eval.state(), EvaluatorState::Valid);
    }
}
