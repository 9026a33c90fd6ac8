//! Template edits.
//!
//! A mutation replaces the template interval [start, end) by `bases`.
//! Single-base insertions have `start == end`, deletions have no bases.
//! Multi-base insertions and deletions appear when polishing tandem repeats.
use crate::seq;
use std::cmp::Ordering;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MutationType {
    Deletion,
    Insertion,
    Substitution,
    /// An insertion of a base that is not specified.
    AnyInsertion,
    /// A substitution into a base that is not specified.
    AnySubstitution,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Mutation {
    kind: MutationType,
    start: usize,
    end: usize,
    bases: Vec<u8>,
}

impl Mutation {
    pub fn insertion(start: usize, base: u8) -> Self {
        Self::insertion_bases(start, &[base])
    }
    pub fn insertion_bases(start: usize, bases: &[u8]) -> Self {
        debug_assert!(!bases.is_empty() && seq::is_dna(bases));
        Self {
            kind: MutationType::Insertion,
            start,
            end: start,
            bases: bases.to_vec(),
        }
    }
    /// Delete `len` bases from `start`.
    pub fn deletion(start: usize, len: usize) -> Self {
        debug_assert!(0 < len);
        Self {
            kind: MutationType::Deletion,
            start,
            end: start + len,
            bases: vec![],
        }
    }
    pub fn substitution(start: usize, base: u8) -> Self {
        Self::substitution_bases(start, &[base])
    }
    pub fn substitution_bases(start: usize, bases: &[u8]) -> Self {
        debug_assert!(!bases.is_empty() && seq::is_dna(bases));
        Self {
            kind: MutationType::Substitution,
            start,
            end: start + bases.len(),
            bases: bases.to_vec(),
        }
    }
    pub fn any_insertion(start: usize) -> Self {
        Self {
            kind: MutationType::AnyInsertion,
            start,
            end: start,
            bases: vec![],
        }
    }
    pub fn any_substitution(start: usize) -> Self {
        Self {
            kind: MutationType::AnySubstitution,
            start,
            end: start + 1,
            bases: vec![],
        }
    }
    pub fn kind(&self) -> MutationType {
        self.kind
    }
    pub fn start(&self) -> usize {
        self.start
    }
    pub fn end(&self) -> usize {
        self.end
    }
    pub fn bases(&self) -> &[u8] {
        &self.bases
    }
    pub fn is_deletion(&self) -> bool {
        self.kind == MutationType::Deletion
    }
    pub fn is_insertion(&self) -> bool {
        self.kind == MutationType::Insertion
    }
    pub fn is_substitution(&self) -> bool {
        self.kind == MutationType::Substitution
    }
    pub fn is_any(&self) -> bool {
        matches!(
            self.kind,
            MutationType::AnyInsertion | MutationType::AnySubstitution
        )
    }
    /// Number of bases after the edit minus the number before.
    pub fn length_diff(&self) -> isize {
        match self.kind {
            MutationType::AnyInsertion => 1,
            MutationType::AnySubstitution => 0,
            _ => self.bases.len() as isize - (self.end - self.start) as isize,
        }
    }
    /// Concrete mutations an `Any` mutation stands for. Concrete mutations
    /// stand for themselves.
    pub fn concretes(&self) -> Vec<Mutation> {
        match self.kind {
            MutationType::AnyInsertion => seq::BASES
                .iter()
                .map(|&b| Mutation::insertion(self.start, b))
                .collect(),
            MutationType::AnySubstitution => seq::BASES
                .iter()
                .map(|&b| Mutation::substitution(self.start, b))
                .collect(),
            _ => vec![self.clone()],
        }
    }
    /// The same edit on the reverse complement of a template of length `len`.
    pub fn reverse_complement(&self, len: usize) -> Self {
        debug_assert!(self.end <= len);
        Self {
            kind: self.kind,
            start: len - self.end,
            end: len - self.start,
            bases: seq::reverse_complement(&self.bases),
        }
    }
    /// Shift to a coordinate whose origin is at `offset`.
    pub fn translate(&self, offset: usize) -> Self {
        debug_assert!(offset <= self.start);
        Self {
            kind: self.kind,
            start: self.start - offset,
            end: self.end - offset,
            bases: self.bases.clone(),
        }
    }
    pub fn with_score(&self, score: f64) -> ScoredMutation {
        ScoredMutation {
            mutation: self.clone(),
            score,
        }
    }
    /// Order of application: by end, then start, deletions last.
    pub fn site_cmp(&self, other: &Self) -> Ordering {
        self.end
            .cmp(&other.end)
            .then(self.start.cmp(&other.start))
            .then(self.is_deletion().cmp(&other.is_deletion()))
    }
}

impl std::fmt::Display for Mutation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.kind {
            MutationType::Deletion => write!(f, "Deletion({},{})", self.start, self.end),
            _ => write!(
                f,
                "{:?}({},{},'{}')",
                self.kind,
                self.start,
                self.end,
                String::from_utf8_lossy(&self.bases)
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScoredMutation {
    pub mutation: Mutation,
    pub score: f64,
}

impl std::ops::Deref for ScoredMutation {
    type Target = Mutation;
    fn deref(&self) -> &Self::Target {
        &self.mutation
    }
}

fn sorted_by_site(muts: &[Mutation]) -> Vec<&Mutation> {
    let mut sorted: Vec<_> = muts.iter().collect();
    sorted.sort_by(|a, b| a.site_cmp(b));
    sorted
}

/// Apply `muts` to `tpl`. The mutations are applied in site order from the
/// last one, so that every mutation refers to the original coordinate.
/// `Any` mutations are skipped.
pub fn apply_mutations(tpl: &[u8], muts: &[Mutation]) -> Vec<u8> {
    let mut result = tpl.to_vec();
    for m in sorted_by_site(muts).into_iter().rev() {
        if m.is_any() {
            continue;
        }
        debug_assert!(m.end() <= result.len());
        result.splice(m.start()..m.end(), m.bases().iter().copied());
    }
    result
}

/// Alignment transcript from `tpl` to the mutated template:
/// 'M'atch, 'I'nsertion, 'D'eletion, and 'R'eplacement.
pub fn mutations_to_transcript(tpl: &[u8], muts: &[Mutation]) -> String {
    let mut transcript = String::with_capacity(tpl.len() + muts.len());
    let mut tpos = 0;
    for m in sorted_by_site(muts) {
        while tpos < m.start() {
            transcript.push('M');
            tpos += 1;
        }
        match m.kind() {
            MutationType::Insertion | MutationType::AnyInsertion => {
                let len = m.bases().len().max(1);
                transcript.extend(std::iter::repeat('I').take(len));
            }
            MutationType::Deletion => {
                transcript.extend(std::iter::repeat('D').take(m.end() - m.start()));
                tpos = m.end();
            }
            MutationType::Substitution | MutationType::AnySubstitution => {
                transcript.extend(std::iter::repeat('R').take(m.end() - m.start()));
                tpos = m.end();
            }
        }
    }
    while tpos < tpl.len() {
        transcript.push('M');
        tpos += 1;
    }
    transcript
}

/// For each position of `tpl` and its end, the corresponding position in
/// the mutated template. A deleted position maps to its successor.
pub fn target_to_query_positions(tpl: &[u8], muts: &[Mutation]) -> Vec<usize> {
    let transcript = mutations_to_transcript(tpl, muts);
    let mut positions = Vec::with_capacity(tpl.len() + 1);
    let mut qpos = 0;
    for op in transcript.chars() {
        match op {
            'M' | 'R' => {
                positions.push(qpos);
                qpos += 1;
            }
            'D' => positions.push(qpos),
            _ => qpos += 1,
        }
    }
    positions.push(qpos);
    positions
}
