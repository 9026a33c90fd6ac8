//! Consensus polishing by a pair hidden Markov model of the sequencing
//! process. Reads are aligned to a draft template by banded forward and
//! backward recursions, and single base (or repeat unit) mutations of the
//! template are accepted while they raise the total likelihood.
#[macro_use]
extern crate log;
pub mod enumerator;
pub mod error;
pub mod evaluator;
pub mod fasta;
pub mod gen_seq;
pub mod integrator;
pub mod kernel;
pub mod matrix;
pub mod model;
pub mod mutation;
pub mod polish;
pub mod recursor;
pub mod seq;
pub mod template;
