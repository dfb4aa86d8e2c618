//! Light supervision for acoustic model training.
//!
//! Given a possibly inaccurate reference transcription and a decoder's
//! hypothesis lattice for the same utterance, produce a word acceptor that
//! keeps the reference where the two agree and the hypothesis where they do
//! not. Inputs and outputs are keyed text archives.

pub mod combine;
pub mod driver;
pub mod error;
pub mod lattice;
pub mod table;

pub use combine::{combine_light, combine_utterance, lattice_to_word_fst, CombineOptions, Outcome};
pub use driver::{combine_tables, run, Counters};
pub use error::{ParseError, TableError};
pub use lattice::{CompactLattice, CompactLatticeWeight, LatticeScale, LatticeWeight};
pub use table::{FstWriter, RandomAccessLatticeReader, SequentialFstReader, SequentialLatticeReader};
