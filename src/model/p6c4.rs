//! P6-C4 chemistry. Transition parameters are cubic polynomials of the SNR
//! fitted per context; emissions depend only on (mis)match.
use super::{MoveType, Snr, TemplatePosition};
use crate::seq::convert_to_twobit;

pub const EPS: f64 = 0.00505052456472967;
pub const COUNTER_WEIGHT: f64 = 1.894736842105264607;

// Rows are AA, CC, GG, TT (homopolymer) followed by NA, NC, NG, NT.
// Each row holds the coefficients of the dark (deletion), match and stick
// transitions, relative to the branch.
const PARAMS: [[[f64; 4]; 3]; 8] = [
    [
        [3.76122480667588, -0.536010820176981, 0.0275375059387171, -0.000470200724345621],
        [3.57517725358548, -0.0257545295375707, -0.000163673803286944, 5.3256984681724e-06],
        [0.858421613302247, -0.0276654216841666, -8.85549766507732e-05, -4.85355908595337e-05],
    ],
    [
        [5.66725538674764, -1.10462196933913, 0.0879811093908922, -0.00259393800835979],
        [4.11682756767018, -0.124758322644639, 0.00659795177909886, -0.000361914629195461],
        [3.17103818507405, -0.729020290806687, 0.0749784690396837, -0.00262779517495421],
    ],
    [
        [3.81920778703052, -0.540309003502589, 0.0389569264893982, -0.000901245733796236],
        [3.31322216145728, 0.123514009118836, -0.00807401406655071, 0.000230843924466035],
        [2.06006877520527, -0.451486652688621, 0.0375212898173045, -0.000937676250926241],
    ],
    [
        [5.39308368236762, -1.32931568057267, 0.107844580241936, -0.00316462903462847],
        [4.21031404956015, -0.347546363361823, 0.0293839179303896, -0.000893802212450644],
        [2.33143889851302, -0.586068444099136, 0.040044954697795, -0.000957298861394191],
    ],
    [
        [2.35936060895653, -0.463630601682986, 0.0179206897766131, -0.000230839937063052],
        [3.22847830625841, -0.0886820214931539, 0.00555981712798726, -0.000137686231186054],
        [-0.101031042923432, -0.0138783767832632, -0.00153408019582419, 7.66780338484727e-06],
    ],
    [
        [5.956054206161, -1.71886470811695, 0.153315470604752, -0.00474488595513198],
        [3.89418464416296, -0.174182841558867, 0.0171719290275442, -0.000653629721359769],
        [2.40532887070852, -0.652606650098156, 0.0688783864119339, -0.00246479494650594],
    ],
    [
        [3.53508304630569, -0.788027301381263, 0.0469367803413207, -0.00106221924705805],
        [2.85440184222226, 0.166346531056167, -0.0166161828155307, 0.000439492705370092],
        [0.238188180807376, 0.0589443522886522, -0.0123401045958974, 0.000336854126836293],
    ],
    [
        [5.36199280681367, -1.46099908985536, 0.126755291030074, -0.0039102734460725],
        [3.41597143103046, -0.066984162951578, 0.0138944877787003, -0.000558939998921912],
        [1.37371376794871, -0.246963827944892, 0.0209674231346363, -0.000684856715039738],
    ],
];

pub fn populate(tpl: &[u8], snr: &Snr) -> Vec<TemplatePosition> {
    let mut result = Vec::with_capacity(tpl.len());
    for w in tpl.windows(2) {
        let (prev, curr) = (w[0], w[1]);
        let bp = convert_to_twobit(&curr);
        debug_assert!(bp < 4, "{}", curr as char);
        let row = (if prev == curr { bp } else { bp + 4 }) as usize;
        let s = snr.get(bp);
        let (s2, s3) = (s * s, s * s * s);
        let mut tprobs = [0f64; 3];
        let mut sum = 1f64;
        for (t, coef) in tprobs.iter_mut().zip(PARAMS[row].iter()) {
            *t = (coef[0] + s * coef[1] + s2 * coef[2] + s3 * coef[3]).exp();
            sum += *t;
        }
        result.push(TemplatePosition {
            base: prev,
            idx: convert_to_twobit(&prev),
            mat: tprobs[1] / sum,
            branch: 1f64 / sum,
            stick: tprobs[2] / sum,
            del: tprobs[0] / sum,
        });
    }
    if let Some(&last) = tpl.last() {
        result.push(TemplatePosition::terminal(last));
    }
    result
}

#[inline]
pub fn emission_pr(mv: MoveType, emission: u8, _prev: u8, curr: u8) -> f64 {
    // MATCH, BRANCH, STICK x (match, mismatch)
    const TABLE: [[f64; 2]; 3] = [[1f64 - EPS, EPS / 3f64], [1f64, 0f64], [0f64, 1f64 / 3f64]];
    TABLE[mv as usize][(curr != emission) as usize] * COUNTER_WEIGHT
}

pub fn undo_counter_weights(n: usize) -> f64 {
    -COUNTER_WEIGHT.ln() * n as f64
}
