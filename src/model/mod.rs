//! Chemistry models: transition parameters per dinucleotide context and
//! emission probabilities per move.
//!
//! A model is a plain value built once from a chemistry name and an SNR and
//! then handed to templates and evaluators. There is no global registry.
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
pub mod p6c4;
pub mod sp1c1;

/// Signal to noise ratio of each channel.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Snr {
    pub a: f64,
    pub c: f64,
    pub g: f64,
    pub t: f64,
}

impl Snr {
    pub fn new(a: f64, c: f64, g: f64, t: f64) -> Result<Self> {
        let snr = Self { a, c, g, t };
        if snr.values().iter().all(|x| x.is_finite() && 0f64 < *x) {
            Ok(snr)
        } else {
            Err(Error::InvalidInput(format!("invalid SNR: {:?}", snr)))
        }
    }
    pub fn values(&self) -> [f64; 4] {
        [self.a, self.c, self.g, self.t]
    }
    /// SNR of the channel of the two bit encoded base.
    pub fn get(&self, base: u8) -> f64 {
        self.values()[base as usize & 0b11]
    }
    fn key(&self) -> [u64; 4] {
        let [a, c, g, t] = self.values();
        [a.to_bits(), c.to_bits(), g.to_bits(), t.to_bits()]
    }
}

impl std::str::FromStr for Snr {
    type Err = Error;
    /// "A,C,G,T" formatted.
    fn from_str(s: &str) -> Result<Self> {
        let values: Vec<f64> = s
            .split(',')
            .map(|x| x.trim().parse::<f64>())
            .collect::<std::result::Result<_, _>>()
            .map_err(|e| Error::InvalidInput(format!("{}:{}", s, e)))?;
        match values.as_slice() {
            &[a, c, g, t] => Snr::new(a, c, g, t),
            _ => Err(Error::InvalidInput(format!("SNR needs four values:{}", s))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MoveType {
    Match = 0,
    Branch = 1,
    Stick = 2,
    Deletion = 3,
}

/// Transition probabilities out of a template position.
/// They are not required to sum up to one.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TransitionParameters {
    pub mat: f64,
    pub stick: f64,
    pub branch: f64,
    pub del: f64,
}

impl TransitionParameters {
    pub fn new(mat: f64, stick: f64, branch: f64, del: f64) -> Self {
        Self {
            mat,
            stick,
            branch,
            del,
        }
    }
    pub fn total(&self) -> f64 {
        self.mat + self.stick + self.branch + self.del
    }
}

/// A template base with the transition parameters of the context
/// ending at the next base.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TemplatePosition {
    /// ASCII base.
    pub base: u8,
    /// Two bit encoded base.
    pub idx: u8,
    pub mat: f64,
    pub branch: f64,
    pub stick: f64,
    pub del: f64,
}

impl TemplatePosition {
    /// The last position of a template. Only the final match is allowed.
    pub fn terminal(base: u8) -> Self {
        Self {
            base,
            idx: crate::seq::convert_to_twobit(&base),
            mat: 1f64,
            branch: 0f64,
            stick: 0f64,
            del: 0f64,
        }
    }
    pub fn params(&self) -> TransitionParameters {
        TransitionParameters::new(self.mat, self.stick, self.branch, self.del)
    }
}

// Before the first template base, the model sees an "A" and a certain match.
pub const DEFAULT_TEMPLATE_POSITION: TemplatePosition = TemplatePosition {
    base: b'A',
    idx: 0,
    mat: 1f64,
    branch: 0f64,
    stick: 0f64,
    del: 0f64,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Chemistry {
    P6C4,
    SP1C1Beta,
}

impl Chemistry {
    pub fn name(&self) -> &'static str {
        match self {
            Chemistry::P6C4 => "P6-C4",
            Chemistry::SP1C1Beta => "S/P1-C1/beta",
        }
    }
}

impl std::str::FromStr for Chemistry {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self> {
        match s {
            "P6-C4" => Ok(Chemistry::P6C4),
            "S/P1-C1/beta" => Ok(Chemistry::SP1C1Beta),
            _ => Err(Error::InvalidInput(format!("unknown chemistry:{}", s))),
        }
    }
}

impl std::fmt::Display for Chemistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Chemistry plus SNR. Everything the recursions need to know about the
/// sequencing process.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Model {
    chemistry: Chemistry,
    snr: Snr,
}

/// Key of a model, usable in hash maps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ModelKey(Chemistry, [u64; 4]);

impl Model {
    pub fn new(chemistry: Chemistry, snr: Snr) -> Self {
        Self { chemistry, snr }
    }
    pub fn chemistry(&self) -> Chemistry {
        self.chemistry
    }
    pub fn snr(&self) -> &Snr {
        &self.snr
    }
    pub fn key(&self) -> ModelKey {
        ModelKey(self.chemistry, self.snr.key())
    }
    /// Template positions of `tpl`. The input should be "ACGT"-alphabet.
    pub fn populate(&self, tpl: &[u8]) -> Vec<TemplatePosition> {
        match self.chemistry {
            Chemistry::P6C4 => p6c4::populate(tpl, &self.snr),
            Chemistry::SP1C1Beta => sp1c1::populate(tpl),
        }
    }
    /// Probability to emit `emission` by `mv` in the context (prev, curr).
    /// All bases are two bit encoded.
    #[inline]
    pub fn emission_pr(&self, mv: MoveType, emission: u8, prev: u8, curr: u8) -> f64 {
        debug_assert!(mv != MoveType::Deletion);
        match self.chemistry {
            Chemistry::P6C4 => p6c4::emission_pr(mv, emission, prev, curr),
            Chemistry::SP1C1Beta => sp1c1::emission_pr(mv, emission, prev, curr),
        }
    }
    /// Log correction for the counter weight put on each of the `n` emissions.
    pub fn undo_counter_weights(&self, n: usize) -> f64 {
        match self.chemistry {
            Chemistry::P6C4 => p6c4::undo_counter_weights(n),
            Chemistry::SP1C1Beta => 0f64,
        }
    }
    pub fn substitution_rate(&self, prev: u8, curr: u8) -> f64 {
        match self.chemistry {
            Chemistry::P6C4 => p6c4::EPS,
            Chemistry::SP1C1Beta => sp1c1::substitution_rate(prev, curr),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    #[test]
    fn parse_chemistry() {
        assert_eq!("P6-C4".parse::<Chemistry>(), Ok(Chemistry::P6C4));
        assert_eq!("S/P1-C1/beta".parse::<Chemistry>(), Ok(Chemistry::SP1C1Beta));
        assert!("P5-C3".parse::<Chemistry>().is_err());
        assert_eq!(Chemistry::P6C4.to_string(), "P6-C4");
    }
    #[test]
    fn parse_snr() {
        let snr: Snr = "10,7,5,11".parse().unwrap();
        assert_eq!(snr, Snr::new(10f64, 7f64, 5f64, 11f64).unwrap());
        assert!("10,7,5".parse::<Snr>().is_err());
        assert!("10,7,x,11".parse::<Snr>().is_err());
        assert!(Snr::new(10f64, -1f64, 5f64, 11f64).is_err());
        assert!(Snr::new(10f64, std::f64::NAN, 5f64, 11f64).is_err());
    }
    #[test]
    fn populate_terminal() {
        let snr = Snr::new(10f64, 7f64, 5f64, 11f64).unwrap();
        for &chem in &[Chemistry::P6C4, Chemistry::SP1C1Beta] {
            let model = Model::new(chem, snr);
            let tpl = model.populate(b"ACGTTGCA");
            assert_eq!(tpl.len(), 8);
            assert_eq!(tpl[7], TemplatePosition::terminal(b'A'));
            for (pos, &base) in tpl.iter().zip(b"ACGTTGCA".iter()) {
                assert_eq!(pos.base, base);
                assert!(pos.params().total() > 0.9, "{:?}", pos);
            }
            assert!(model.populate(b"").is_empty());
            assert_eq!(model.populate(b"G"), vec![TemplatePosition::terminal(b'G')]);
        }
    }
}
