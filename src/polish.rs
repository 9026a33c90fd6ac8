//! Greedy hill climbing on the total likelihood.
use crate::enumerator;
use crate::error::{Error, Result};
use crate::integrator::Integrator;
use crate::matrix::Matrix;
use crate::mutation::{self, Mutation, ScoredMutation};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolishConfig {
    pub maximum_iterations: usize,
    /// Accepted mutations in one round are at least this far apart.
    pub mutation_separation: usize,
    /// Radius of the re-enumeration around accepted mutations.
    pub mutation_neighborhood: usize,
}

impl Default for PolishConfig {
    fn default() -> Self {
        Self {
            maximum_iterations: 40,
            mutation_separation: 10,
            mutation_neighborhood: 20,
        }
    }
}

impl PolishConfig {
    pub fn new(
        maximum_iterations: usize,
        mutation_separation: usize,
        mutation_neighborhood: usize,
    ) -> Self {
        Self {
            maximum_iterations,
            mutation_separation,
            mutation_neighborhood,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepeatConfig {
    pub maximum_repeat_size: usize,
    pub minimum_element_count: usize,
    pub maximum_iterations: usize,
}

impl Default for RepeatConfig {
    fn default() -> Self {
        Self {
            maximum_repeat_size: 3,
            minimum_element_count: 3,
            maximum_iterations: 40,
        }
    }
}

/// Summary of a polishing run. The populated ratios and the flip-flops are
/// the maximum over the live reads, one value per round.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PolishResult {
    pub has_converged: bool,
    pub mutations_tested: usize,
    pub mutations_applied: usize,
    pub max_alpha_populated: Vec<f64>,
    pub max_beta_populated: Vec<f64>,
    pub max_num_flip_flops: Vec<usize>,
}

impl PolishResult {
    fn record_round<M: Matrix + Send + Sync>(&mut self, ai: &Integrator<M>) {
        self.max_alpha_populated.push(ai.max_alpha_populated());
        self.max_beta_populated.push(ai.max_beta_populated());
        let flip_flops = ai.num_flip_flops().into_iter().max().unwrap_or(0);
        self.max_num_flip_flops.push(flip_flops);
    }
}

impl std::ops::AddAssign for PolishResult {
    fn add_assign(&mut self, other: Self) {
        self.has_converged &= other.has_converged;
        self.mutations_tested += other.mutations_tested;
        self.mutations_applied += other.mutations_applied;
        self.max_alpha_populated.extend(other.max_alpha_populated);
        self.max_beta_populated.extend(other.max_beta_populated);
        self.max_num_flip_flops.extend(other.max_num_flip_flops);
    }
}

/// Pick the best mutation, drop everything within `separation` of it, and
/// repeat. Ties go to the smaller end, then the smaller start.
pub fn best_mutations(
    mut scored: Vec<ScoredMutation>,
    separation: usize,
) -> Result<Vec<Mutation>> {
    if separation == 0 {
        return Err(Error::InvalidInput("nonzero separation required".to_string()));
    }
    let mut result = vec![];
    while let Some(best) = scored
        .iter()
        .max_by(|a, b| {
            a.score
                .partial_cmp(&b.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(b.end().cmp(&a.end()))
                .then(b.start().cmp(&a.start()))
        })
        .map(|m| m.mutation.clone())
    {
        let start = best.start().saturating_sub(separation);
        let end = best.end() + separation;
        scored.retain(|m| !(start <= m.end() && m.start() < end));
        result.push(best);
    }
    Ok(result)
}

/// Score each of `muts` and keep the ones raising the likelihood.
/// Candidates failing the cheap serial score are not scored in full.
fn score_mutations<M: Matrix + Send + Sync>(
    ai: &mut Integrator<M>,
    muts: &[Mutation],
) -> Vec<ScoredMutation> {
    let ll = ai.ll();
    muts.iter()
        .filter_map(|m| {
            if ai.fast_score(m) <= 0f64 {
                return None;
            }
            let score = ai.ll_of(m);
            if ll < score {
                Some(m.with_score(score))
            } else {
                None
            }
        })
        .collect()
}

/// Polish the template of `ai` by single base mutations until no mutation
/// raises the likelihood, or for `maximum_iterations` rounds.
pub fn polish<M: Matrix + Send + Sync>(
    ai: &mut Integrator<M>,
    config: &PolishConfig,
) -> Result<PolishResult> {
    let mut result = PolishResult::default();
    let mut muts = enumerator::mutations(ai.template());
    let mut history: HashSet<Vec<u8>> = HashSet::new();
    history.insert(ai.template().to_vec());
    for i in 0..config.maximum_iterations {
        let scored = score_mutations(ai, &muts);
        result.mutations_tested += muts.len();
        let best = best_mutations(scored, config.mutation_separation)?;
        debug!(
            "Round\t{}\tTested\t{}\tApplied\t{}\tLL\t{:.3}",
            i,
            muts.len(),
            best.len(),
            ai.ll()
        );
        if best.is_empty() {
            result.has_converged = true;
            return Ok(result);
        }
        let next = mutation::apply_mutations(ai.template(), &best);
        if history.contains(&next) {
            debug!("Cycle detected. Apply {} only", best[0]);
            let applied = vec![best[0].clone()];
            ai.apply_mutations(&applied);
            result.mutations_applied += 1;
            muts = enumerator::nearby_mutations(
                &applied,
                &best,
                ai.template(),
                config.mutation_neighborhood,
            );
        } else {
            ai.apply_mutations(&best);
            result.mutations_applied += best.len();
            muts = enumerator::nearby_mutations(
                &best,
                &best,
                ai.template(),
                config.mutation_neighborhood,
            );
        }
        history.insert(ai.template().to_vec());
        result.record_round(ai);
    }
    Ok(result)
}

/// Polish the template of `ai` by inserting or deleting whole units of
/// tandem repeats.
pub fn polish_repeats<M: Matrix + Send + Sync>(
    ai: &mut Integrator<M>,
    config: &RepeatConfig,
) -> Result<PolishResult> {
    let mut result = PolishResult::default();
    let mut history: HashSet<Vec<u8>> = HashSet::new();
    history.insert(ai.template().to_vec());
    for i in 0..config.maximum_iterations {
        let muts = enumerator::repeat_mutations(ai.template(), config);
        let scored = score_mutations(ai, &muts);
        result.mutations_tested += muts.len();
        let best = best_mutations(scored, 1)?;
        debug!("Repeat round\t{}\tTested\t{}\tApplied\t{}", i, muts.len(), best.len());
        if best.is_empty() {
            result.has_converged = true;
            return Ok(result);
        }
        let next = mutation::apply_mutations(ai.template(), &best);
        let best = if history.contains(&next) {
            vec![best[0].clone()]
        } else {
            best
        };
        ai.apply_mutations(&best);
        result.mutations_applied += best.len();
        history.insert(ai.template().to_vec());
        result.record_round(ai);
    }
    Ok(result)
}

/// Phred scaled `probability`.
pub fn probability_to_qv(probability: f64) -> Result<i32> {
    if !(0f64..=1f64).contains(&probability) {
        return Err(Error::InvalidInput(format!(
            "probability not in [0,1]:{}",
            probability
        )));
    }
    let probability = probability.max(std::f64::MIN_POSITIVE);
    Ok((-10f64 * probability.log10()).round() as i32)
}

/// QV of each base of the template: the probability that the base is wrong
/// is the mass of the single base mutations at the base relative to the
/// current template.
pub fn consensus_qvs<M: Matrix + Send + Sync>(ai: &mut Integrator<M>) -> Result<Vec<i32>> {
    let ll = ai.ll();
    let tpl = ai.template().to_vec();
    (0..tpl.len())
        .map(|i| {
            let score_sum: f64 = enumerator::mutations_in(&tpl, i, i + 1)
                .iter()
                .filter(|m| m.start() <= i)
                .map(|m| ai.ll_of(m) - ll)
                .filter(|&score| score < 0f64)
                .map(f64::exp)
                .sum();
            probability_to_qv(1f64 - 1f64 / (1f64 + score_sum))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluator::{EvaluatorState, MappedRead, Read, Strand};
    use crate::gen_seq;
    use crate::integrator::IntegratorConfig;
    use crate::model::{Chemistry, Model, Snr};
    use crate::seq;
    use rand::SeedableRng;
    use rand_xoshiro::Xoshiro256StarStar;
    fn p6c4() -> Model {
        Model::new(Chemistry::P6C4, Snr::new(10f64, 7f64, 5f64, 11f64).unwrap())
    }
    fn mapped(seq: &[u8], strand: Strand, len: usize) -> MappedRead {
        let read = Read::new("NA", seq, p6c4());
        MappedRead::new(read, strand, 0, len, true, true)
    }
    #[test]
    fn best_mutations_test() {
        let scored = vec![
            Mutation::substitution(5, b'A').with_score(1f64),
            Mutation::substitution(8, b'A').with_score(3f64),
            Mutation::substitution(20, b'A').with_score(2f64),
            Mutation::insertion(30, b'A').with_score(2f64),
            Mutation::substitution(30, b'A').with_score(2f64),
        ];
        assert!(best_mutations(scored.clone(), 0).is_err());
        let best = best_mutations(scored.clone(), 5).unwrap();
        assert_eq!(
            best,
            vec![
                Mutation::substitution(8, b'A'),
                Mutation::substitution(20, b'A'),
                Mutation::insertion(30, b'A'),
            ]
        );
        let best = best_mutations(scored, 1).unwrap();
        assert_eq!(best.len(), 4);
        assert_eq!(best[3], Mutation::substitution(5, b'A'));
    }
    #[test]
    fn qv() {
        assert_eq!(probability_to_qv(0.1).unwrap(), 10);
        assert_eq!(probability_to_qv(0.001).unwrap(), 30);
        assert_eq!(probability_to_qv(1f64).unwrap(), 0);
        assert!(probability_to_qv(0f64).unwrap() > 3000);
        assert!(probability_to_qv(-0.1).is_err());
        assert!(probability_to_qv(1.1).is_err());
    }
    #[test]
    fn result_add_assign() {
        let mut result = PolishResult {
            has_converged: true,
            mutations_tested: 10,
            mutations_applied: 2,
            max_alpha_populated: vec![0.1],
            max_beta_populated: vec![0.2],
            max_num_flip_flops: vec![1],
        };
        let other = PolishResult {
            has_converged: false,
            mutations_tested: 5,
            mutations_applied: 1,
            max_alpha_populated: vec![0.3],
            max_beta_populated: vec![0.4],
            max_num_flip_flops: vec![0],
        };
        result += other;
        assert!(!result.has_converged);
        assert_eq!(result.mutations_tested, 15);
        assert_eq!(result.mutations_applied, 3);
        assert_eq!(result.max_alpha_populated, vec![0.1, 0.3]);
        assert_eq!(result.max_num_flip_flops, vec![1, 0]);
    }
    #[test]
    fn basic() {
        let mut ai: Integrator = Integrator::new(b"GCGTCGT", IntegratorConfig::default()).unwrap();
        let reads = vec![
            mapped(b"ACGTACGT", Strand::Forward, 7),
            mapped(&seq::reverse_complement(b"ACGACGT"), Strand::Reverse, 7),
            mapped(b"ACGACGT", Strand::Forward, 7),
        ];
        for read in reads.iter() {
            ai.add_read(read).unwrap();
        }
        let result = polish(&mut ai, &PolishConfig::default()).unwrap();
        assert!(result.has_converged);
        assert_eq!(ai.template(), b"ACGACGT");
        let qvs = consensus_qvs(&mut ai).unwrap();
        assert_eq!(qvs.len(), 7);
        assert!(qvs.iter().all(|&qv| 0 <= qv));
    }
    #[test]
    fn basic_forward() {
        let mut ai: Integrator = Integrator::new(b"GCGTCGT", IntegratorConfig::default()).unwrap();
        let reads = vec![
            mapped(b"ACGTACGT", Strand::Forward, 7),
            mapped(b"ACGACGT", Strand::Forward, 7),
            mapped(b"ACGACGT", Strand::Forward, 7),
        ];
        for read in reads.iter() {
            assert_eq!(ai.add_read(read).unwrap(), EvaluatorState::Valid);
        }
        let result = polish(&mut ai, &PolishConfig::default()).unwrap();
        assert!(result.has_converged);
        assert_eq!(ai.template(), b"ACGACGT");
    }
    #[test]
    fn di_tri_repeat() {
        let tpl = b"ACGTCAGCAGCAGAGAGTGCA";
        let read = b"ACGTCAGCAGCAGCAGAGAGAGTGCA";
        let mut ai: Integrator = Integrator::new(tpl, IntegratorConfig::default()).unwrap();
        let reads = vec![
            mapped(read, Strand::Forward, tpl.len()),
            mapped(&seq::reverse_complement(read), Strand::Reverse, tpl.len()),
            mapped(read, Strand::Forward, tpl.len()),
        ];
        for read in reads.iter() {
            ai.add_read(read).unwrap();
        }
        let result = polish_repeats(&mut ai, &RepeatConfig::default()).unwrap();
        assert!(result.has_converged);
        assert_eq!(ai.template(), &read[..]);
    }
    #[test]
    fn polish_simulated() {
        let mut rng: Xoshiro256StarStar = SeedableRng::seed_from_u64(4832);
        let truth = gen_seq::generate_seq(&mut rng, 200);
        let draft = gen_seq::introduce_errors(&truth, &mut rng, 2, 2, 2);
        let mut ai: Integrator = Integrator::new(&draft, IntegratorConfig::default()).unwrap();
        let reads = gen_seq::simulate_reads(&truth, &mut rng, 10, &gen_seq::CCS_PROFILE);
        for (read, strand) in reads {
            ai.add_read(&mapped(&read, strand, draft.len())).unwrap();
        }
        let before = ai.ll();
        let result = polish(&mut ai, &PolishConfig::default()).unwrap();
        assert!(result.has_converged);
        assert!(before < ai.ll());
        assert_eq!(ai.template(), truth.as_slice());
        assert_eq!(result.max_alpha_populated.len(), result.max_num_flip_flops.len());
    }
}
