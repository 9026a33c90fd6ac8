//! Two bit encoding of nucleotides.
//!
//! Templates and reads are kept as ASCII `Vec<u8>` and translated into
//! 0..4 indices only when a model needs to look up its tables.
//! Anything outside "ACGTacgt" is mapped to `NULL`.

pub const ADENINE: u8 = 0b00;
pub const CYTOSINE: u8 = 0b01;
pub const GUANINE: u8 = 0b10;
pub const THYMINE: u8 = 0b11;
pub const NULL: u8 = 0b100;

const fn lookup_table() -> [u8; 256] {
    let mut slots = [NULL; 256];
    slots[b'A' as usize] = ADENINE;
    slots[b'a' as usize] = ADENINE;
    slots[b'C' as usize] = CYTOSINE;
    slots[b'c' as usize] = CYTOSINE;
    slots[b'G' as usize] = GUANINE;
    slots[b'g' as usize] = GUANINE;
    slots[b'T' as usize] = THYMINE;
    slots[b't' as usize] = THYMINE;
    slots
}
pub const LOOKUP_TABLE: [u8; 256] = lookup_table();

pub const BASES: &[u8; 4] = b"ACGT";

/// Convert a char to two bit encoding.
pub const fn convert_to_twobit(base: &u8) -> u8 {
    LOOKUP_TABLE[*base as usize]
}

pub fn encode(xs: &[u8]) -> Vec<u8> {
    xs.iter().map(convert_to_twobit).collect()
}

pub fn is_dna(xs: &[u8]) -> bool {
    xs.iter().all(|x| convert_to_twobit(x) != NULL)
}

pub fn complement(base: u8) -> u8 {
    match base {
        b'A' => b'T',
        b'C' => b'G',
        b'G' => b'C',
        b'T' => b'A',
        b'a' => b't',
        b'c' => b'g',
        b'g' => b'c',
        b't' => b'a',
        _ => b'N',
    }
}

pub fn reverse_complement(xs: &[u8]) -> Vec<u8> {
    xs.iter().rev().map(|&x| complement(x)).collect()
}
