//! Candidate mutations of a template.
//!
//! All the enumerators take the template as an ACGT byte slice and return
//! mutations in its coordinate.
use crate::mutation::Mutation;
use crate::polish::RepeatConfig;
use crate::seq::BASES;
use std::collections::HashSet;

/// Every single base edit at [begin, end): 3 substitutions, 4 insertions
/// and 1 deletion per position.
pub fn all_single_base_mutations_in(tpl: &[u8], begin: usize, end: usize) -> Vec<Mutation> {
    let end = end.min(tpl.len());
    let mut result = vec![];
    for pos in begin.min(end)..end {
        let subs = BASES.iter().filter(|&&b| b != tpl[pos]);
        result.extend(subs.map(|&b| Mutation::substitution(pos, b)));
        result.extend(BASES.iter().map(|&b| Mutation::insertion(pos, b)));
        result.push(Mutation::deletion(pos, 1));
    }
    result
}

pub fn all_single_base_mutations(tpl: &[u8]) -> Vec<Mutation> {
    all_single_base_mutations_in(tpl, 0, tpl.len())
}

/// Single base edits at [begin, end) leaving out the ones giving the same
/// sequence as another: insertions and deletions only at the start of
/// a homopolymer.
pub fn unique_single_base_mutations_in(tpl: &[u8], begin: usize, end: usize) -> Vec<Mutation> {
    let end = end.min(tpl.len());
    let mut result = vec![];
    for pos in begin.min(end)..end {
        let prev = if 0 < pos { tpl[pos - 1] } else { b'-' };
        let subs = BASES.iter().filter(|&&b| b != tpl[pos]);
        result.extend(subs.map(|&b| Mutation::substitution(pos, b)));
        let ins = BASES.iter().filter(|&&b| b != prev);
        result.extend(ins.map(|&b| Mutation::insertion(pos, b)));
        if tpl[pos] != prev {
            result.push(Mutation::deletion(pos, 1));
        }
    }
    result
}

pub fn unique_single_base_mutations(tpl: &[u8]) -> Vec<Mutation> {
    unique_single_base_mutations_in(tpl, 0, tpl.len())
}

/// Unique single base edits at [c - neighborhood, c + neighborhood) for
/// each start c of `centers`.
pub fn unique_nearby_mutations(
    tpl: &[u8],
    centers: &[Mutation],
    neighborhood: usize,
) -> Vec<Mutation> {
    let mut seen = HashSet::new();
    centers
        .iter()
        .flat_map(|c| {
            let begin = c.start().saturating_sub(neighborhood);
            let end = c.start() + neighborhood;
            unique_single_base_mutations_in(tpl, begin, end)
        })
        .filter(|m| seen.insert(m.clone()))
        .collect()
}

/// Push the candidates of the polishing loop at [start, end) to `muts`.
/// Insertions come before the deletion and substitutions of a site.
/// Homopolymer-extending insertions and all but the first deletion of a
/// homopolymer are left out. Insertions at `end` are included.
pub fn push_mutations(muts: &mut Vec<Mutation>, tpl: &[u8], start: usize, end: usize) {
    if start == end {
        return;
    }
    let mut last = if 0 < start { tpl[start - 1] } else { 0 };
    for (i, &curr) in tpl.iter().enumerate().take(end).skip(start) {
        let ins = BASES.iter().filter(|&&b| b != last);
        muts.extend(ins.map(|&b| Mutation::insertion(i, b)));
        if curr != last {
            muts.push(Mutation::deletion(i, 1));
        }
        let subs = BASES.iter().filter(|&&b| b != curr);
        muts.extend(subs.map(|&b| Mutation::substitution(i, b)));
        last = curr;
    }
    let ins = BASES.iter().filter(|&&b| b != last);
    muts.extend(ins.map(|&b| Mutation::insertion(end, b)));
}

pub fn mutations_in(tpl: &[u8], start: usize, end: usize) -> Vec<Mutation> {
    let mut muts = vec![];
    push_mutations(&mut muts, tpl, start, end);
    muts
}

pub fn mutations(tpl: &[u8]) -> Vec<Mutation> {
    mutations_in(tpl, 0, tpl.len())
}

/// Candidates around `centers`, which were given in the coordinate before
/// `applied` were applied. `tpl` is the template after them.
pub fn nearby_mutations(
    applied: &[Mutation],
    centers: &[Mutation],
    tpl: &[u8],
    neighborhood: usize,
) -> Vec<Mutation> {
    let len = tpl.len() as isize;
    let clamp = |x: isize| x.max(0).min(len) as usize;
    let mut applied: Vec<_> = applied.iter().collect();
    applied.sort_by(|a, b| a.site_cmp(b));
    let mut centers: Vec<_> = centers.iter().collect();
    centers.sort_by(|a, b| a.site_cmp(b));
    let n = neighborhood as isize;
    let mut applied = applied.into_iter().peekable();
    let mut length_diff = 0;
    let mut ranges: Vec<(usize, usize)> = vec![];
    for center in centers {
        while let Some(m) = applied.next_if(|m| m.end() <= center.start()) {
            length_diff += m.length_diff();
        }
        let start = clamp(length_diff + center.start() as isize - n);
        let end = clamp(length_diff + center.end() as isize + n);
        match ranges.last_mut() {
            Some(last) if start <= last.1 => last.1 = last.1.max(end),
            _ => ranges.push((start, end)),
        }
    }
    let mut result = vec![];
    for (start, end) in ranges {
        push_mutations(&mut result, tpl, start, end);
    }
    result
}

/// For each tandem repeat of a unit of 2..=`maximum_repeat_size` bases with
/// at least `minimum_element_count` copies starting in [start, end), one
/// more copy and one less. Ordered by unit size, then by position.
pub fn repeat_mutations_in(
    tpl: &[u8],
    config: &RepeatConfig,
    start: usize,
    end: usize,
) -> Vec<Mutation> {
    let end = end.min(tpl.len());
    let mut result = vec![];
    for size in 2..=config.maximum_repeat_size {
        let mut i = start;
        while i + size <= end {
            let unit = &tpl[i..i + size];
            let copies = 1 + tpl[i + size..]
                .chunks_exact(size)
                .take_while(|&chunk| chunk == unit)
                .count();
            if config.minimum_element_count <= copies {
                result.push(Mutation::insertion_bases(i, unit));
                result.push(Mutation::deletion(i, size));
            }
            i += size * (copies - 1) + 1;
        }
    }
    result
}

pub fn repeat_mutations(tpl: &[u8], config: &RepeatConfig) -> Vec<Mutation> {
    repeat_mutations_in(tpl, config, 0, tpl.len())
}
