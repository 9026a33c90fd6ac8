//! The working consensus and its per-position transition parameters.
//!
//! `Template` owns the sequence and its populated positions. Evaluators see
//! it through a `Window`, and mutations under test are seen through a
//! `MutatedTemplate`, which only repopulates the positions around the edit.
use crate::error::{Error, Result};
use crate::model::{Model, TemplatePosition};
use crate::mutation::Mutation;
use crate::seq;

/// Read-only access to a sequence of template positions.
pub trait TemplateAccess {
    fn len(&self) -> usize;
    fn get(&self, i: usize) -> &TemplatePosition;
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
    fn to_seq(&self) -> Vec<u8> {
        (0..self.len()).map(|i| self.get(i).base).collect()
    }
}

impl TemplateAccess for [TemplatePosition] {
    fn len(&self) -> usize {
        <[TemplatePosition]>::len(self)
    }
    fn get(&self, i: usize) -> &TemplatePosition {
        &self[i]
    }
}

impl TemplateAccess for Vec<TemplatePosition> {
    fn len(&self) -> usize {
        Vec::len(self)
    }
    fn get(&self, i: usize) -> &TemplatePosition {
        &self[i]
    }
}

#[derive(Debug, Clone)]
pub struct Template {
    model: Model,
    seq: Vec<u8>,
    positions: Vec<TemplatePosition>,
}

impl Template {
    pub fn new(seq: &[u8], model: Model) -> Result<Self> {
        if !seq::is_dna(seq) {
            let seq = String::from_utf8_lossy(seq);
            return Err(Error::InvalidInput(format!("non-ACGT template:{}", seq)));
        }
        let seq = seq.to_ascii_uppercase();
        let positions = model.populate(&seq);
        Ok(Self {
            model,
            seq,
            positions,
        })
    }
    pub fn model(&self) -> &Model {
        &self.model
    }
    pub fn seq(&self) -> &[u8] {
        &self.seq
    }
    pub fn positions(&self) -> &[TemplatePosition] {
        &self.positions
    }
    /// The template as it would be after `mutation`, without copying.
    pub fn mutate(&self, mutation: &Mutation) -> MutatedTemplate<'_> {
        assert!(!mutation.is_any() && mutation.end() <= self.len());
        let diff = mutation.length_diff();
        let (start, new_end) = (mutation.start(), mutation.start() + mutation.bases().len());
        let patch_begin = start.saturating_sub(1);
        // Context: one base before, the new bases, one base after.
        let mut context = self.seq[patch_begin..start].to_vec();
        context.extend_from_slice(mutation.bases());
        context.extend(self.seq.get(mutation.end()).copied());
        let mut patch = self.model.populate(&context);
        patch.truncate(new_end - patch_begin);
        MutatedTemplate {
            master: self,
            patch_begin,
            patch,
            diff,
        }
    }
    /// Apply `mutation` in place. Only the positions whose context changed
    /// are repopulated.
    pub fn apply_mutation(&mut self, mutation: &Mutation) {
        assert!(!mutation.is_any() && mutation.end() <= self.len());
        let patch = self.mutate(mutation).patch;
        let patch_begin = mutation.start().saturating_sub(1);
        self.seq.splice(
            mutation.start()..mutation.end(),
            mutation.bases().iter().copied(),
        );
        self.positions.splice(patch_begin..mutation.end(), patch);
        debug_assert_eq!(self.seq.len(), self.positions.len());
        debug_assert!(self
            .positions
            .last()
            .map(|p| p == &TemplatePosition::terminal(p.base))
            .unwrap_or(true));
    }
    /// Apply `mutations`, all given in the coordinate of the current template.
    pub fn apply_mutations(&mut self, mutations: &[Mutation]) {
        let mut mutations: Vec<_> = mutations.iter().collect();
        mutations.sort_by(|a, b| a.site_cmp(b));
        for m in mutations.into_iter().rev() {
            self.apply_mutation(m);
        }
    }
}

impl TemplateAccess for Template {
    fn len(&self) -> usize {
        self.positions.len()
    }
    fn get(&self, i: usize) -> &TemplatePosition {
        &self.positions[i]
    }
    fn to_seq(&self) -> Vec<u8> {
        self.seq.clone()
    }
}

/// A template with one mutation applied on the fly. Positions before and
/// after the edited context are read from the master.
#[derive(Debug, Clone)]
pub struct MutatedTemplate<'a> {
    master: &'a Template,
    patch_begin: usize,
    patch: Vec<TemplatePosition>,
    diff: isize,
}

impl<'a> MutatedTemplate<'a> {
    pub fn length_diff(&self) -> isize {
        self.diff
    }
}

impl<'a> TemplateAccess for MutatedTemplate<'a> {
    fn len(&self) -> usize {
        (self.master.len() as isize + self.diff) as usize
    }
    fn get(&self, i: usize) -> &TemplatePosition {
        if i < self.patch_begin {
            self.master.get(i)
        } else if i < self.patch_begin + self.patch.len() {
            &self.patch[i - self.patch_begin]
        } else {
            self.master.get((i as isize - self.diff) as usize)
        }
    }
}

/// The part of a master template a read is mapped to.
/// A pinned end stays attached to the end of the master.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub start: usize,
    pub end: usize,
    pub pin_start: bool,
    pub pin_end: bool,
}

impl Window {
    pub fn new(start: usize, end: usize, pin_start: bool, pin_end: bool) -> Self {
        assert!(start <= end);
        Self {
            start,
            end,
            pin_start,
            pin_end,
        }
    }
    pub fn len(&self) -> usize {
        self.end - self.start
    }
    pub fn is_empty(&self) -> bool {
        self.end == self.start
    }
    /// The same window on the reverse complement of a master of length `len`.
    pub fn reverse_complement(&self, len: usize) -> Self {
        Self::new(len - self.end, len - self.start, self.pin_end, self.pin_start)
    }
    /// True if `mutation` changes the template this window sees.
    pub fn in_range(&self, mutation: &Mutation) -> bool {
        let (start, end) = (mutation.start(), mutation.end());
        (self.pin_start || self.start < end)
            && (self.pin_end || start < self.end)
            && (self.pin_start || self.start <= start)
            && (self.pin_end || end <= self.end)
    }
    /// `mutation` in the coordinate of this window.
    pub fn translate(&self, mutation: &Mutation) -> Option<Mutation> {
        if self.in_range(mutation) {
            Some(mutation.translate(self.start))
        } else {
            None
        }
    }
    /// Follow `mutation` applied on the master. Returns whether the
    /// mutation was inside this window.
    pub fn apply_mutation(&mut self, mutation: &Mutation) -> bool {
        let applied = self.in_range(mutation);
        let diff = mutation.length_diff();
        let shift = |x: usize| (x as isize + diff).max(0) as usize;
        if (self.pin_end && (0 < self.end || 0 < diff))
            || mutation.start() < self.end
            || mutation.end() <= self.start
        {
            self.end = shift(self.end);
        }
        if !self.pin_start && mutation.end() <= self.start {
            self.start = shift(self.start);
        }
        self.end = self.end.max(self.start);
        applied
    }
    /// Follow `mutations`, all in the coordinate of the current master.
    pub fn apply_mutations(&mut self, mutations: &[Mutation]) -> bool {
        let mut mutations: Vec<_> = mutations.iter().collect();
        mutations.sort_by(|a, b| a.site_cmp(b));
        mutations
            .into_iter()
            .rev()
            .fold(false, |applied, m| self.apply_mutation(m) | applied)
    }
    pub fn view<'a, T: TemplateAccess>(&self, tpl: &'a T) -> WindowView<'a, T> {
        WindowView::new(tpl, self.start, self.len())
    }
}

/// `len` positions of `tpl` from `start`.
#[derive(Debug, Clone, Copy)]
pub struct WindowView<'a, T: TemplateAccess> {
    tpl: &'a T,
    start: usize,
    len: usize,
}

impl<'a, T: TemplateAccess> WindowView<'a, T> {
    pub fn new(tpl: &'a T, start: usize, len: usize) -> Self {
        debug_assert!(start + len <= tpl.len());
        Self { tpl, start, len }
    }
}

impl<'a, T: TemplateAccess> TemplateAccess for WindowView<'a, T> {
    fn len(&self) -> usize {
        self.len
    }
    fn get(&self, i: usize) -> &TemplatePosition {
        debug_assert!(i < self.len);
        self.tpl.get(self.start + i)
    }
}

// ln(1/3)
const LOG_THIRD: f64 = -1.0986122886681098;

/// Mean and variance of the log likelihood contributed by a site with the
/// transition parameters of `pos` and the substitution rate `eps`,
/// on a read generated by the model itself.
pub fn site_normal_parameters(pos: &TemplatePosition, eps: f64) -> (f64, f64) {
    let (p_m, p_d, p_b, p_s) = (pos.mat, pos.del, pos.branch, pos.stick);
    let (l_m, l_d, l_b, l_s) = (p_m.ln(), p_d.ln(), p_b.ln(), p_s.ln());
    let (lg_eps, lg_1m_eps) = (eps.ln(), (1f64 - eps).ln());
    let exit = p_m + p_d;
    let insert = p_b + p_s;
    // First moments.
    let e_m = (1f64 - eps) * lg_1m_eps + eps * (LOG_THIRD + lg_eps);
    let e_s = LOG_THIRD;
    let e_md = (l_m + e_m) * p_m / exit + l_d * p_d / exit;
    let e_i = l_b * p_b / insert + (l_s + e_s) * p_s / insert;
    let e_bs = e_i * insert / exit;
    let mean = e_md + e_bs;
    // Second moments.
    let e2_m = (1f64 - eps) * lg_1m_eps.powi(2) + eps * (LOG_THIRD + lg_eps).powi(2);
    let e2_md = (l_m * l_m + 2f64 * l_m * e_m + e2_m) * p_m / exit + l_d * l_d * p_d / exit;
    let e2_s = LOG_THIRD * LOG_THIRD;
    let e2_i = l_b * l_b * p_b / insert + (l_s * l_s + 2f64 * e_s * l_s + e2_s) * p_s / insert;
    let e2_bs = e2_i * insert / exit;
    let moment2 = e2_bs + 2f64 * e_bs * e_md + e2_md;
    (mean, moment2 - mean * mean)
}

/// Mean and variance of the log likelihood of a read generated from `tpl`.
/// The terminal position contributes nothing.
pub fn normal_parameters<T: TemplateAccess + ?Sized>(tpl: &T, model: &Model) -> (f64, f64) {
    (0..tpl.len().saturating_sub(1))
        .map(|i| {
            let prev = if i == 0 { 0 } else { tpl.get(i - 1).idx };
            let pos = tpl.get(i);
            site_normal_parameters(pos, model.substitution_rate(prev, pos.idx))
        })
        .fold((0f64, 0f64), |(mean, var), (m, v)| (mean + m, var + v))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gen_seq;
    use crate::model::{Chemistry, Snr};
    use crate::mutation::apply_mutations;
    use rand::Rng;
    use rand::SeedableRng;
    use rand_xoshiro::Xoshiro256StarStar;
    fn p6c4() -> Model {
        Model::new(Chemistry::P6C4, Snr::new(10f64, 7f64, 5f64, 11f64).unwrap())
    }
    fn all_mutations(tpl: &[u8]) -> Vec<Mutation> {
        let mut muts = vec![];
        for i in 0..=tpl.len() {
            for &b in seq::BASES.iter() {
                muts.push(Mutation::insertion(i, b));
                if i < tpl.len() && tpl[i] != b {
                    muts.push(Mutation::substitution(i, b));
                }
            }
            if i < tpl.len() {
                muts.push(Mutation::deletion(i, 1));
            }
            if i + 2 <= tpl.len() {
                muts.push(Mutation::deletion(i, 2));
                muts.push(Mutation::insertion_bases(i, b"CA"));
            }
        }
        muts
    }
    #[test]
    fn mutated_equals_fresh() {
        let mut rng: Xoshiro256StarStar = SeedableRng::seed_from_u64(4234);
        for chem in vec![Chemistry::P6C4, Chemistry::SP1C1Beta] {
            let model = Model::new(chem, Snr::new(10f64, 7f64, 5f64, 11f64).unwrap());
            for _ in 0..5 {
                let len = rng.gen_range(3..12);
                let seq = gen_seq::generate_seq(&mut rng, len);
                let master = Template::new(&seq, model).unwrap();
                for m in all_mutations(&seq) {
                    let expected = apply_mutations(&seq, &[m.clone()]);
                    let fresh = Template::new(&expected, model).unwrap();
                    let mutated = master.mutate(&m);
                    assert_eq!(mutated.len(), expected.len());
                    for i in 0..expected.len() {
                        assert_eq!(mutated.get(i), fresh.get(i), "{}", m);
                    }
                    let mut applied = master.clone();
                    applied.apply_mutation(&m);
                    assert_eq!(applied.seq(), fresh.seq());
                    assert_eq!(applied.positions(), fresh.positions(), "{}", m);
                }
            }
        }
    }
    #[test]
    fn apply_multiple() {
        let model = p6c4();
        let mut tpl = Template::new(b"GATTACA", model).unwrap();
        let muts = vec![
            Mutation::insertion(0, b'G'),
            Mutation::insertion(2, b'T'),
            Mutation::insertion(3, b'C'),
            Mutation::deletion(4, 1),
            Mutation::substitution(6, b'T'),
        ];
        tpl.apply_mutations(&muts);
        assert_eq!(tpl.seq(), b"GGATTCTCT");
        assert_eq!(tpl.positions(), Template::new(b"GGATTCTCT", model).unwrap().positions());
        assert!(Template::new(b"GATNACA", model).is_err());
    }
    #[test]
    fn window_view() {
        let model = p6c4();
        let master = Template::new(b"ACGTACGTAC", model).unwrap();
        let window = Window::new(2, 6, false, false);
        let view = window.view(&master);
        assert_eq!(view.len(), 4);
        assert_eq!(view.to_seq(), b"GTAC".to_vec());
        let m = Mutation::substitution(3, b'A');
        assert!(window.in_range(&m));
        assert_eq!(window.translate(&m), Some(Mutation::substitution(1, b'A')));
        let mutated = master.mutate(&m);
        let view = WindowView::new(&mutated, 2, 4);
        assert_eq!(view.to_seq(), b"GAAC".to_vec());
        assert!(!window.in_range(&Mutation::insertion(2, b'A')));
        assert!(!window.in_range(&Mutation::insertion(6, b'A')));
        assert!(window.in_range(&Mutation::insertion(3, b'A')));
        assert!(!window.in_range(&Mutation::deletion(1, 2)));
        let pinned = Window::new(0, 10, true, true);
        assert!(pinned.in_range(&Mutation::insertion(0, b'A')));
        assert!(pinned.in_range(&Mutation::insertion(10, b'A')));
        let rev = Window::new(2, 6, true, false).reverse_complement(10);
        assert_eq!(rev, Window::new(4, 8, false, true));
    }
    #[test]
    fn window_follows_mutations() {
        let mut window = Window::new(2, 6, false, false);
        // Before the window.
        assert!(!window.apply_mutation(&Mutation::insertion(0, b'A')));
        assert_eq!((window.start, window.end), (3, 7));
        // Inside.
        assert!(window.apply_mutation(&Mutation::deletion(4, 1)));
        assert_eq!((window.start, window.end), (3, 6));
        // After.
        assert!(!window.apply_mutation(&Mutation::insertion(8, b'A')));
        assert_eq!((window.start, window.end), (3, 6));
        let mut pinned = Window::new(0, 4, true, true);
        assert!(pinned.apply_mutation(&Mutation::insertion(4, b'A')));
        assert_eq!((pinned.start, pinned.end), (0, 5));
        assert!(pinned.apply_mutation(&Mutation::deletion(0, 1)));
        assert_eq!((pinned.start, pinned.end), (0, 4));
        let mut window = Window::new(3, 6, false, false);
        let muts = vec![Mutation::insertion(0, b'A'), Mutation::insertion_bases(4, b"CA")];
        assert!(window.apply_mutations(&muts));
        assert_eq!((window.start, window.end), (4, 9));
    }
    #[test]
    fn normal_parameters_test() {
        let model = p6c4();
        let tpl = Template::new(b"ACGATACATACGATCGA", model).unwrap();
        let (mean, var) = normal_parameters(&tpl, &model);
        assert!((mean + 9.3915588824261888).abs() < 1e-6, "{}", mean);
        assert!((var - 30.392545575324248).abs() < 1e-6, "{}", var);
    }
    #[test]
    fn site_normal_parameters_test() {
        let pos = TemplatePosition {
            base: b'A',
            idx: 0,
            mat: 0.95583140484751283,
            del: 0.00097238955012494488,
            branch: 0.029256323818866534,
            stick: 0.013939881783495679,
        };
        let (mean, var) = site_normal_parameters(&pos, 0.00505052456472967);
        assert!((mean + 0.27568172991312162).abs() < 1e-8, "{}", mean);
        assert!((var - 1.019204780302317).abs() < 1e-8, "{}", var);
    }
}
