//! S/P1-C1/beta chemistry. Fixed transition parameters and per-context
//! emission tables. No counter weight.
use super::{MoveType, TemplatePosition};
use crate::seq::convert_to_twobit;

// Rows are AA, CC, GG, TT, NA, NC, NG, NT. Columns are the emitted base.
const MATCH_PMF: [[f64; 4]; 8] = [
    [0.980417570, 0.011537479, 0.005804964, 0.002239987],
    [0.026122324, 0.972937583, 0.000367796, 0.000572296],
    [0.002544283, 0.002239375, 0.962042375, 0.033173967],
    [0.000509814, 0.001489097, 0.094228328, 0.903772761],
    [0.979840156, 0.012582917, 0.005185205, 0.002391722],
    [0.015528755, 0.984439781, 7.91000E-07, 3.07000E-05],
    [0.002667013, 0.002095727, 0.961571053, 0.033666207],
    [0.000506358, 0.001057035, 0.116124340, 0.882312267],
];

const STICK_PMF: [[f64; 4]; 8] = [
    [0.000000000, 0.254503401, 0.574809968, 0.170686631],
    [0.399446202, 0.000000000, 0.510664061, 0.089889737],
    [0.505214805, 0.188597323, 0.000000000, 0.306187872],
    [0.361855644, 0.132870306, 0.505274050, 0.000000000],
    [0.000000000, 0.210676350, 0.615161689, 0.174161960],
    [0.357451562, 0.000000000, 0.473482915, 0.169065523],
    [0.577147745, 0.169785817, 0.000000000, 0.253066438],
    [0.446834358, 0.144605809, 0.408559833, 0.000000000],
];

// Match, Branch, Stick, Deletion.
const PARAMS: [[f64; 4]; 8] = [
    [0.888913751, 0.021169653, 0.034937054, 0.054979542],
    [0.835822697, 0.036126801, 0.091992041, 0.036058461],
    [0.886427657, 0.022596867, 0.039619893, 0.051355584],
    [0.821252207, 0.072798639, 0.068161389, 0.037787765],
    [0.857630366, 0.072058988, 0.036435296, 0.033875351],
    [0.846000625, 0.032981179, 0.076759732, 0.044258463],
    [0.881462348, 0.042444137, 0.039293952, 0.036799562],
    [0.879087800, 0.022178294, 0.057073518, 0.041660389],
];

#[inline]
fn row(prev: u8, curr: u8) -> usize {
    let curr = (curr & 0b11) as usize;
    if prev == curr as u8 {
        curr
    } else {
        curr + 4
    }
}

pub fn populate(tpl: &[u8]) -> Vec<TemplatePosition> {
    let mut result = Vec::with_capacity(tpl.len());
    for w in tpl.windows(2) {
        let (prev, curr) = (convert_to_twobit(&w[0]), convert_to_twobit(&w[1]));
        debug_assert!(curr < 4, "{}", w[1] as char);
        let [mat, branch, stick, del] = PARAMS[row(prev, curr)];
        result.push(TemplatePosition {
            base: w[0],
            idx: prev,
            mat,
            branch,
            stick,
            del,
        });
    }
    if let Some(&last) = tpl.last() {
        result.push(TemplatePosition::terminal(last));
    }
    result
}

#[inline]
pub fn emission_pr(mv: MoveType, emission: u8, prev: u8, curr: u8) -> f64 {
    let em = (emission & 0b11) as usize;
    match mv {
        MoveType::Match => MATCH_PMF[row(prev, curr)][em],
        MoveType::Stick => STICK_PMF[row(prev, curr)][em],
        MoveType::Branch => (curr == emission) as u8 as f64,
        MoveType::Deletion => 0f64,
    }
}

pub fn substitution_rate(prev: u8, curr: u8) -> f64 {
    let row = MATCH_PMF[row(prev, curr)];
    let eps: f64 = (0..4).filter(|&em| em != curr as usize).map(|em| row[em]).sum();
    eps / 3f64
}
