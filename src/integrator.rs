//! Many reads against one template.
//!
//! The integrator owns the consensus and, for each model in use, a forward
//! and a reverse-complement master template. Evaluators look at their
//! masters through windows; mutations are always given in the forward
//! coordinate and mapped onto the reverse strand here.
use crate::error::{Error, Result};
use crate::evaluator::{Evaluator, EvaluatorState, MappedRead, Strand};
use crate::kernel::logmeanexp;
use crate::matrix::{Matrix, SparseMatrix};
use crate::model::ModelKey;
use crate::mutation::{self, Mutation};
use crate::seq;
use crate::template::{MutatedTemplate, Template, Window};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IntegratorConfig {
    /// Reads with z-score below this are dropped at add time. NaN disables it.
    pub min_z_score: f64,
    /// Width of the band in natural log units.
    pub score_diff: f64,
    /// A read is dropped at add time when alpha or beta allocates at least
    /// this fraction of the full (|read|+1) x (|window|+1) matrix.
    /// 1 or more disables it.
    pub add_threshold: f64,
    /// `fast_score` stops summing once the running delta falls below this.
    pub fast_score_threshold: f64,
}

impl Default for IntegratorConfig {
    fn default() -> Self {
        Self {
            min_z_score: -3.5,
            score_diff: 12.5,
            add_threshold: 1f64,
            fast_score_threshold: -12.5,
        }
    }
}

impl IntegratorConfig {
    pub fn new(min_z_score: f64, score_diff: f64) -> Result<Self> {
        if score_diff.is_nan() || score_diff <= 0f64 {
            return Err(Error::InvalidInput(format!(
                "score diff must be positive:{}",
                score_diff
            )));
        }
        Ok(Self {
            min_z_score,
            score_diff,
            ..Self::default()
        })
    }
}

/// How the added reads ended up.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadDispositions {
    pub success: usize,
    pub alpha_beta_mismatch: usize,
    pub poor_z_score: usize,
    pub template_too_small: usize,
    pub other: usize,
}

impl ReadDispositions {
    pub fn record(&mut self, state: EvaluatorState) {
        match state {
            EvaluatorState::Valid => self.success += 1,
            EvaluatorState::AlphaBetaMismatch => self.alpha_beta_mismatch += 1,
            EvaluatorState::PoorZScore => self.poor_z_score += 1,
            EvaluatorState::TemplateTooSmall => self.template_too_small += 1,
            EvaluatorState::Other => self.other += 1,
        }
    }
    pub fn total(&self) -> usize {
        self.success
            + self.alpha_beta_mismatch
            + self.poor_z_score
            + self.template_too_small
            + self.other
    }
}

impl std::ops::AddAssign for ReadDispositions {
    fn add_assign(&mut self, other: Self) {
        self.success += other.success;
        self.alpha_beta_mismatch += other.alpha_beta_mismatch;
        self.poor_z_score += other.poor_z_score;
        self.template_too_small += other.template_too_small;
        self.other += other.other;
    }
}

impl std::fmt::Display for ReadDispositions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Success\t{}", self.success)?;
        writeln!(f, "AlphaBetaMismatch\t{}", self.alpha_beta_mismatch)?;
        writeln!(f, "PoorZScore\t{}", self.poor_z_score)?;
        writeln!(f, "TemplateTooSmall\t{}", self.template_too_small)?;
        write!(f, "Other\t{}", self.other)
    }
}

#[derive(Debug, Clone)]
struct Masters {
    forward: Template,
    reverse: Template,
}

#[derive(Debug, Clone)]
pub struct Integrator<M: Matrix = SparseMatrix> {
    config: IntegratorConfig,
    seq: Vec<u8>,
    masters: HashMap<ModelKey, Masters>,
    evaluators: Vec<Evaluator<M>>,
    dispositions: ReadDispositions,
}

impl<M: Matrix + Send + Sync> Integrator<M> {
    pub fn new(tpl: &[u8], config: IntegratorConfig) -> Result<Self> {
        if !seq::is_dna(tpl) {
            return Err(Error::InvalidInput(format!(
                "template should be ACGT:{}",
                String::from_utf8_lossy(tpl)
            )));
        }
        Ok(Self {
            config,
            seq: tpl.to_ascii_uppercase(),
            masters: HashMap::new(),
            evaluators: vec![],
            dispositions: ReadDispositions::default(),
        })
    }
    pub fn config(&self) -> &IntegratorConfig {
        &self.config
    }
    /// The current consensus.
    pub fn template(&self) -> &[u8] {
        &self.seq
    }
    pub fn len(&self) -> usize {
        self.seq.len()
    }
    pub fn is_empty(&self) -> bool {
        self.seq.is_empty()
    }
    pub fn evaluators(&self) -> &[Evaluator<M>] {
        &self.evaluators
    }
    pub fn dispositions(&self) -> &ReadDispositions {
        &self.dispositions
    }
    /// Add a read. A read whose template span is shorter than two bases is
    /// counted and dropped. Malformed reads are errors.
    pub fn add_read(&mut self, read: &MappedRead) -> Result<EvaluatorState> {
        let len = self.len();
        let (start, end) = (read.template_start, read.template_end);
        if read.strand == Strand::Unmapped {
            return Err(Error::InvalidInput(format!("{} is unmapped", read.read.name)));
        }
        if end <= start || len < end {
            return Err(Error::InvalidInput(format!(
                "{}: invalid template span [{},{}) on {}",
                read.read.name, start, end, len
            )));
        }
        if end - start < 2 {
            debug!("{}\t{}", read.read.name, EvaluatorState::TemplateTooSmall);
            self.dispositions.record(EvaluatorState::TemplateTooSmall);
            return Ok(EvaluatorState::TemplateTooSmall);
        }
        if read.len() < 2 {
            return Err(Error::InvalidInput(format!("{}: read span < 2", read.read.name)));
        }
        if !seq::is_dna(&read.read.seq) {
            return Err(Error::InvalidInput(format!(
                "{}: read should be ACGT",
                read.read.name
            )));
        }
        let model = read.read.model;
        let key = model.key();
        if !self.masters.contains_key(&key) {
            let forward = Template::new(&self.seq, model)?;
            let reverse = Template::new(&seq::reverse_complement(&self.seq), model)?;
            self.masters.insert(key, Masters { forward, reverse });
        }
        let masters = &self.masters[&key];
        let (pin_start, pin_end) = (read.pin_start && start == 0, read.pin_end && end == len);
        let window = Window::new(start, end, pin_start, pin_end);
        let (master, window) = match read.strand {
            Strand::Forward => (&masters.forward, window),
            _ => (&masters.reverse, window.reverse_complement(len)),
        };
        let mut evaluator = Evaluator::new(
            read,
            master,
            window,
            self.config.min_z_score,
            self.config.score_diff,
        );
        let threshold = self.config.add_threshold;
        if evaluator.is_valid() && threshold < 1f64 {
            let full = (read.len() + 1) * (window.len() + 1);
            let max_size = (0.5 + threshold * full as f64) as usize;
            if max_size <= evaluator.alpha().allocated_entries()
                || max_size <= evaluator.beta().allocated_entries()
            {
                debug!("{}\tMemory\t{}", read.read.name, max_size);
                evaluator.invalidate(EvaluatorState::Other);
            }
        }
        let state = evaluator.state();
        debug!("{}\t{}", read.read.name, state);
        self.dispositions.record(state);
        self.evaluators.push(evaluator);
        Ok(state)
    }
    /// Total log likelihood of the live reads.
    pub fn ll(&self) -> f64 {
        self.evaluators
            .iter()
            .filter(|e| e.is_valid())
            .map(|e| e.ll())
            .sum()
    }
    /// Total log likelihood of the live reads if `mutation` were applied.
    pub fn ll_of(&mut self, mutation: &Mutation) -> f64 {
        if mutation.is_any() {
            let lls: Vec<_> = mutation
                .concretes()
                .iter()
                .map(|m| self.ll_of(m))
                .collect();
            return logmeanexp(&lls);
        }
        self.lls_for(mutation)
            .into_iter()
            .filter(|ll| !ll.is_nan())
            .sum()
    }
    /// Per-read log likelihoods if `mutation` were applied. NaN for dead reads.
    pub fn lls_for(&mut self, mutation: &Mutation) -> Vec<f64> {
        debug_assert!(!mutation.is_any());
        let reverse = mutation.reverse_complement(self.len());
        let mutated = mutate_masters(&self.masters, mutation, &reverse);
        self.evaluators
            .par_iter_mut()
            .map(|eval| {
                if !eval.is_valid() {
                    return std::f64::NAN;
                }
                oriented_ll_of(eval, &mutated, mutation, &reverse)
            })
            .collect()
    }
    /// Change of the total log likelihood by `mutation`, summed read by read
    /// and abandoned once it falls below `fast_score_threshold`. Cheap to
    /// reject a bad candidate; exact when the result is above the threshold.
    pub fn fast_score(&mut self, mutation: &Mutation) -> f64 {
        if mutation.is_any() {
            return self.ll_of(mutation) - self.ll();
        }
        let threshold = self.config.fast_score_threshold;
        let reverse = mutation.reverse_complement(self.len());
        let mutated = mutate_masters(&self.masters, mutation, &reverse);
        let mut sum = 0f64;
        for eval in self.evaluators.iter_mut().filter(|e| e.is_valid()) {
            sum += oriented_ll_of(eval, &mutated, mutation, &reverse) - eval.ll();
            if sum < threshold {
                break;
            }
        }
        sum
    }
    /// Per-read log likelihoods. NaN for dead reads.
    pub fn lls(&self) -> Vec<f64> {
        self.evaluators.iter().map(|e| e.ll()).collect()
    }
    pub fn z_scores(&self) -> Vec<f64> {
        self.evaluators.iter().map(|e| e.z_score()).collect()
    }
    pub fn avg_z_score(&self) -> f64 {
        let (mean, var, n) = self
            .evaluators
            .iter()
            .filter(|e| e.is_valid())
            .map(|e| e.normal_parameters())
            .fold((0f64, 0f64, 0), |(m, v, n), (mean, var)| {
                (m + mean, v + var, n + 1)
            });
        let n = n as f64;
        (self.ll() / n - mean / n) / (var / n).sqrt()
    }
    pub fn states(&self) -> Vec<EvaluatorState> {
        self.evaluators.iter().map(|e| e.state()).collect()
    }
    pub fn read_names(&self) -> Vec<&str> {
        self.evaluators.iter().map(|e| e.name()).collect()
    }
    pub fn num_flip_flops(&self) -> Vec<usize> {
        self.evaluators.iter().map(|e| e.num_flip_flops()).collect()
    }
    /// Largest fraction of used alpha entries among the live reads.
    pub fn max_alpha_populated(&self) -> f64 {
        self.evaluators
            .iter()
            .filter(|e| e.is_valid())
            .map(|e| e.alpha().used_entries_ratio())
            .fold(0f64, f64::max)
    }
    pub fn max_beta_populated(&self) -> f64 {
        self.evaluators
            .iter()
            .filter(|e| e.is_valid())
            .map(|e| e.beta().used_entries_ratio())
            .fold(0f64, f64::max)
    }
    pub fn apply_mutation(&mut self, mutation: &Mutation) {
        self.apply_mutations(std::slice::from_ref(mutation));
    }
    /// Apply non-overlapping `mutations`, all in the coordinate of the
    /// current template.
    pub fn apply_mutations(&mut self, mutations: &[Mutation]) {
        debug_assert!(mutations.iter().all(|m| !m.is_any()));
        let len = self.len();
        let reverse: Vec<_> = mutations
            .iter()
            .rev()
            .map(|m| m.reverse_complement(len))
            .collect();
        self.seq = mutation::apply_mutations(&self.seq, mutations);
        for masters in self.masters.values_mut() {
            masters.forward.apply_mutations(mutations);
            masters.reverse.apply_mutations(&reverse);
            debug_assert_eq!(masters.forward.seq(), self.seq.as_slice());
            debug_assert_eq!(seq::reverse_complement(masters.reverse.seq()), self.seq);
        }
        let masters = &self.masters;
        self.evaluators.par_iter_mut().for_each(|eval| {
            let m = &masters[&eval.model().key()];
            match eval.strand() {
                Strand::Forward => eval.apply_mutations(&m.forward, mutations),
                Strand::Reverse => eval.apply_mutations(&m.reverse, &reverse),
                Strand::Unmapped => false,
            };
        });
    }
}

type MutatedMasters<'a> = HashMap<ModelKey, (MutatedTemplate<'a>, MutatedTemplate<'a>)>;

// Both masters of every model with `mutation` applied on the fly.
fn mutate_masters<'a>(
    masters: &'a HashMap<ModelKey, Masters>,
    mutation: &Mutation,
    reverse: &Mutation,
) -> MutatedMasters<'a> {
    masters
        .iter()
        .map(|(key, m)| (*key, (m.forward.mutate(mutation), m.reverse.mutate(reverse))))
        .collect()
}

fn oriented_ll_of<M: Matrix>(
    eval: &mut Evaluator<M>,
    mutated: &MutatedMasters,
    mutation: &Mutation,
    reverse: &Mutation,
) -> f64 {
    let (forward, rev) = &mutated[&eval.model().key()];
    match eval.strand() {
        Strand::Forward => eval.ll_of(forward, mutation),
        Strand::Reverse => eval.ll_of(rev, reverse),
        Strand::Unmapped => std::f64::NAN,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluator::Read;
    use crate::gen_seq;
    use crate::model::{Chemistry, Model, Snr};
    use rand::SeedableRng;
    use rand_xoshiro::Xoshiro256StarStar;
    fn p6c4() -> Model {
        Model::new(Chemistry::P6C4, Snr::new(10f64, 7f64, 5f64, 11f64).unwrap())
    }
    fn mapped(seq: &[u8], strand: Strand, start: usize, end: usize) -> MappedRead {
        let (seq, name) = match strand {
            Strand::Reverse => (seq::reverse_complement(seq), "rev"),
            _ => (seq.to_vec(), "fwd"),
        };
        MappedRead::new(Read::new(name, &seq, p6c4()), strand, start, end, true, true)
    }
    #[test]
    fn small_ll() {
        let expected = vec![
            (Mutation::insertion(4, b'A'), 4.002503863645920),
            (Mutation::substitution(2, b'C'), -5.19526526492876),
            (Mutation::deletion(4, 1), -4.33430539094949),
            (Mutation::deletion(6, 1), -9.70299447206563),
            (Mutation::deletion(0, 1), -10.5597017942167),
            (Mutation::substitution(4, b'A'), -0.16699291260157),
            (Mutation::insertion(4, b'G'), -1.60697112438296),
        ];
        let tpl = b"ACGTCGT";
        let mut ai: Integrator = Integrator::new(tpl, IntegratorConfig::default()).unwrap();
        let read = mapped(b"ACGTACGT", Strand::Forward, 0, tpl.len());
        assert_eq!(ai.add_read(&read).unwrap(), EvaluatorState::Valid);
        let ll = ai.ll();
        assert!((ll + 4.74517984808494).abs() < 0.001, "{}", ll);
        for (m, delta) in expected.iter() {
            let score = ai.ll_of(m) - ll;
            assert!((score - delta).abs() < 0.001, "{}\t{}", m, score);
        }
        // The same pair seen from the other strand.
        let tpl = seq::reverse_complement(tpl);
        let mut ai: Integrator = Integrator::new(&tpl, IntegratorConfig::default()).unwrap();
        let read = mapped(&seq::reverse_complement(b"ACGTACGT"), Strand::Reverse, 0, tpl.len());
        assert_eq!(ai.add_read(&read).unwrap(), EvaluatorState::Valid);
        let ll = ai.ll();
        assert!((ll + 4.74517984808494).abs() < 0.001, "{}", ll);
        for (m, delta) in expected.iter() {
            let m = m.reverse_complement(tpl.len());
            let score = ai.ll_of(&m) - ll;
            assert!((score - delta).abs() < 0.001, "{}\t{}", m, score);
        }
    }
    #[test]
    fn add_read_results() {
        let mut ai: Integrator = Integrator::new(b"A", IntegratorConfig::default()).unwrap();
        let read = mapped(b"A", Strand::Forward, 0, 1);
        assert_eq!(ai.add_read(&read).unwrap(), EvaluatorState::TemplateTooSmall);
        assert_eq!(ai.dispositions().template_too_small, 1);
        let mut ai: Integrator = Integrator::new(b"AA", IntegratorConfig::default()).unwrap();
        let read = mapped(b"AA", Strand::Forward, 0, 2);
        assert_eq!(ai.add_read(&read).unwrap(), EvaluatorState::Valid);
        assert_eq!(ai.dispositions().success, 1);
        let read = mapped(b"AA", Strand::Unmapped, 0, 2);
        assert!(ai.add_read(&read).is_err());
        let read = mapped(b"AA", Strand::Forward, 0, 3);
        assert!(ai.add_read(&read).is_err());
        let read = mapped(b"A", Strand::Forward, 0, 2);
        assert!(ai.add_read(&read).is_err());
        assert!(Integrator::<SparseMatrix>::new(b"ACNT", IntegratorConfig::default()).is_err());
        assert!(IntegratorConfig::new(-3.5, -1f64).is_err());
        assert!(IntegratorConfig::new(-3.5, 0f64).is_err());
        assert!(IntegratorConfig::new(-3.5, std::f64::NAN).is_err());
        assert!(IntegratorConfig::new(-3.5, 12.5).is_ok());
    }
    #[test]
    fn add_threshold() {
        let mut rng: Xoshiro256StarStar = SeedableRng::seed_from_u64(320);
        let tpl = gen_seq::generate_seq(&mut rng, 100);
        let read = gen_seq::introduce_randomness(&tpl, &mut rng, &gen_seq::CCS_PROFILE);
        let read = mapped(&read, Strand::Forward, 0, tpl.len());
        let mut ai: Integrator = Integrator::new(&tpl, IntegratorConfig::default()).unwrap();
        assert_eq!(ai.add_read(&read).unwrap(), EvaluatorState::Valid);
        let config = IntegratorConfig {
            add_threshold: 0.01,
            ..IntegratorConfig::default()
        };
        let mut ai: Integrator = Integrator::new(&tpl, config).unwrap();
        assert_eq!(ai.add_read(&read).unwrap(), EvaluatorState::Other);
        assert_eq!(ai.dispositions().other, 1);
        assert_eq!(ai.dispositions().success, 0);
        assert!(ai.lls()[0].is_nan());
    }
    #[test]
    fn fast_score() {
        let tpl = b"ACGTCGT";
        let read = mapped(b"ACGTACGT", Strand::Forward, 0, tpl.len());
        let mut ai: Integrator = Integrator::new(tpl, IntegratorConfig::default()).unwrap();
        for _ in 0..3 {
            ai.add_read(&read).unwrap();
        }
        let ll = ai.ll();
        let good = Mutation::insertion(4, b'A');
        let full = ai.ll_of(&good) - ll;
        assert!((ai.fast_score(&good) - full).abs() < 1e-9);
        assert!((full - 3f64 * 4.002503863645920).abs() < 0.001);
        // Stops after two reads, once the sum drops below -12.5.
        let bad = Mutation::deletion(0, 1);
        let fast = ai.fast_score(&bad);
        assert!((fast - 2f64 * -10.5597017942167).abs() < 0.001, "{}", fast);
        assert!(ai.ll_of(&bad) - ll < fast);
        let config = IntegratorConfig {
            fast_score_threshold: std::f64::NEG_INFINITY,
            ..IntegratorConfig::default()
        };
        let mut ai: Integrator = Integrator::new(tpl, config).unwrap();
        for _ in 0..3 {
            ai.add_read(&read).unwrap();
        }
        let full = ai.ll_of(&bad) - ai.ll();
        assert!((ai.fast_score(&bad) - full).abs() < 1e-9);
    }
    #[test]
    fn any_mutations() {
        let tpl = b"ACGTCGT";
        let mut ai: Integrator = Integrator::new(tpl, IntegratorConfig::default()).unwrap();
        ai.add_read(&mapped(b"ACGTACGT", Strand::Forward, 0, tpl.len()))
            .unwrap();
        let any = Mutation::any_insertion(4);
        let lls: Vec<_> = any.concretes().iter().map(|m| ai.ll_of(m)).collect();
        let expected = logmeanexp(&lls);
        assert!((ai.ll_of(&any) - expected).abs() < 1e-9);
        let best = lls.iter().copied().fold(std::f64::NEG_INFINITY, f64::max);
        assert!(ai.ll_of(&any) < best);
    }
    #[test]
    fn apply_follows_strands() {
        let mut rng: Xoshiro256StarStar = SeedableRng::seed_from_u64(4234);
        let truth = gen_seq::generate_seq(&mut rng, 80);
        let draft = gen_seq::introduce_errors(&truth, &mut rng, 1, 1, 1);
        let mut ai: Integrator = Integrator::new(&draft, IntegratorConfig::default()).unwrap();
        for i in 0..6 {
            let read = gen_seq::introduce_randomness(&truth, &mut rng, &gen_seq::CCS_PROFILE);
            let strand = if i % 2 == 0 {
                Strand::Forward
            } else {
                Strand::Reverse
            };
            ai.add_read(&mapped(&read, strand, 0, draft.len())).unwrap();
        }
        let muts = vec![
            Mutation::substitution(3, b'A'),
            Mutation::insertion(40, b'C'),
            Mutation::deletion(70, 1),
        ];
        let predicted: Vec<_> = ai
            .lls_for(&muts[1])
            .into_iter()
            .zip(ai.states())
            .filter(|&(_, s)| s == EvaluatorState::Valid)
            .map(|(ll, _)| ll)
            .collect();
        ai.apply_mutation(&muts[1]);
        let applied: Vec<_> = ai.lls().into_iter().filter(|ll| !ll.is_nan()).collect();
        assert_eq!(predicted.len(), applied.len());
        for (p, a) in predicted.iter().zip(applied.iter()) {
            assert!((1f64 - p / a).abs() < 0.001, "{}\t{}", p, a);
        }
        // The deletion shifts by the insertion applied before it.
        let rest = vec![muts[0].clone(), Mutation::deletion(71, 1)];
        ai.apply_mutations(&rest);
        let expected = mutation::apply_mutations(&draft, &muts);
        let stepwise = mutation::apply_mutations(&draft, &muts[1..2]);
        assert_eq!(mutation::apply_mutations(&stepwise, &rest), expected);
        assert_eq!(ai.template(), expected.as_slice());
        for eval in ai.evaluators().iter().filter(|e| e.is_valid()) {
            assert_eq!(eval.window().len(), expected.len());
        }
    }
    #[test]
    fn z_scores() {
        let mut rng: Xoshiro256StarStar = SeedableRng::seed_from_u64(9);
        let tpl = gen_seq::generate_seq(&mut rng, 100);
        let config = IntegratorConfig::new(std::f64::NAN, 12.5).unwrap();
        let mut ai: Integrator = Integrator::new(&tpl, config).unwrap();
        for _ in 0..4 {
            let read = gen_seq::introduce_randomness(&tpl, &mut rng, &gen_seq::CCS_PROFILE);
            ai.add_read(&mapped(&read, Strand::Forward, 0, tpl.len()))
                .unwrap();
        }
        let zs = ai.z_scores();
        assert_eq!(zs.len(), 4);
        assert!(zs.iter().all(|z| z.is_finite() && -3.5 < *z), "{:?}", zs);
        assert!(ai.avg_z_score().is_finite());
        assert!(0f64 < ai.max_alpha_populated() && ai.max_alpha_populated() < 1f64);
        assert_eq!(ai.read_names(), vec!["fwd"; 4]);
    }
}
