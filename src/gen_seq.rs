//! Random templates and simulated reads, for tests and benches.
use crate::evaluator::Strand;
use crate::seq;
use rand::seq::SliceRandom;
use rand::Rng;

/// Per-base error rates of a simulated read.
#[derive(Debug, Clone, Copy)]
pub struct Profile {
    pub sub: f64,
    pub del: f64,
    pub ins: f64,
}

impl Profile {
    pub fn sum(&self) -> f64 {
        self.sub + self.del + self.ins
    }
    pub fn mul(&self, x: f64) -> Self {
        Self {
            sub: self.sub * x,
            del: self.del * x,
            ins: self.ins * x,
        }
    }
}

/// Noisy single pass reads.
pub const PROFILE: Profile = Profile {
    sub: 0.04,
    del: 0.04,
    ins: 0.07,
};

pub const CCS_PROFILE: Profile = Profile {
    sub: 0.002,
    del: 0.004,
    ins: 0.004,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Edit {
    Keep,
    Substitute,
    Delete,
    Insert,
}

const EDITS: [Edit; 4] = [Edit::Keep, Edit::Substitute, Edit::Delete, Edit::Insert];

impl Edit {
    fn weight(self, p: &Profile) -> f64 {
        match self {
            Edit::Keep => 1f64 - p.sum(),
            Edit::Substitute => p.sub,
            Edit::Delete => p.del,
            Edit::Insert => p.ins,
        }
    }
    fn apply<R: Rng>(self, rng: &mut R, base: u8, read: &mut Vec<u8>) -> bool {
        match self {
            Edit::Keep => read.push(base),
            Edit::Substitute => read.push(other_base(rng, base)),
            Edit::Delete => {}
            Edit::Insert => read.push(random_base(rng)),
        }
        self != Edit::Insert
    }
}

/// A read of `seq` with errors drawn from `p` at each position.
pub fn introduce_randomness<R: Rng>(seq: &[u8], rng: &mut R, p: &Profile) -> Vec<u8> {
    let mut read = Vec::with_capacity(seq.len());
    let mut pos = 0;
    while pos < seq.len() {
        let edit = EDITS
            .choose_weighted(rng, |e| e.weight(p))
            .copied()
            .unwrap_or(Edit::Keep);
        if edit.apply(rng, seq[pos], &mut read) {
            pos += 1;
        }
    }
    read
}

/// A read of `seq` with exactly `sub` substitutions, `del` deletions and
/// `ins` insertions at random positions.
pub fn introduce_errors<R: Rng>(
    seq: &[u8],
    rng: &mut R,
    sub: usize,
    del: usize,
    ins: usize,
) -> Vec<u8> {
    assert!(sub + del <= seq.len());
    let mut edits = vec![Edit::Keep; seq.len() - sub - del];
    edits.extend(std::iter::repeat(Edit::Substitute).take(sub));
    edits.extend(std::iter::repeat(Edit::Delete).take(del));
    edits.extend(std::iter::repeat(Edit::Insert).take(ins));
    edits.shuffle(rng);
    let mut read = Vec::with_capacity(seq.len() + ins);
    let mut pos = 0;
    for edit in edits {
        // Insertions after the last base go to the end.
        let base = seq.get(pos).copied().unwrap_or(b'A');
        if edit.apply(rng, base, &mut read) {
            pos += 1;
        }
    }
    read
}

pub fn generate_seq<R: Rng>(rng: &mut R, len: usize) -> Vec<u8> {
    (0..len)
        .map(|_| seq::BASES[rng.gen_range(0..4)])
        .collect()
}

/// `coverage` reads of `tpl` alternating strands. Reverse strand reads are
/// reverse complemented, as they come off the sequencer.
pub fn simulate_reads<R: Rng>(
    tpl: &[u8],
    rng: &mut R,
    coverage: usize,
    p: &Profile,
) -> Vec<(Vec<u8>, Strand)> {
    (0..coverage)
        .map(|i| {
            let read = introduce_randomness(tpl, rng, p);
            if i % 2 == 0 {
                (read, Strand::Forward)
            } else {
                (seq::reverse_complement(&read), Strand::Reverse)
            }
        })
        .collect()
}

fn other_base<R: Rng>(rng: &mut R, base: u8) -> u8 {
    let others: Vec<u8> = seq::BASES.iter().filter(|&&b| b != base).copied().collect();
    others.choose(rng).copied().unwrap_or(base)
}

fn random_base<R: Rng>(rng: &mut R) -> u8 {
    seq::BASES[rng.gen_range(0..4)]
}
