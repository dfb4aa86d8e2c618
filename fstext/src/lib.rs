//! Helpers over `rustfst` for word-level tropical automata.
//!
//! The functions here are the automaton primitives used when a reference
//! transcription is combined with a hypothesis lattice: symbol extraction and
//! overlap checks ([`symbols`]), the one-state alignment network
//! ([`edit_distance`]), shortest-distance pruning ([`prune`]) and the
//! scale/compose/determinize plumbing in [`utils`].

use rustfst::fst_impls::VectorFst;
use rustfst::semirings::TropicalWeight;

pub mod edit_distance;
pub mod prune;
pub mod symbols;
pub mod utils;

/// Plain tropical-weight vector FST, the only automaton type used downstream.
pub type StdVectorFst = VectorFst<TropicalWeight>;

/// Comparison delta shared by pruning, determinization and minimization.
pub const KDELTA: f32 = 1.0 / 1024.0;

pub use edit_distance::{build_edit_distance, create_edit_distance, EditCosts};
pub use prune::{best_path_cost, prune, shortest_distances};
pub use symbols::{get_input_symbols, get_output_symbols, overlapping_symbols};
pub use utils::{determinize_and_minimize, num_trs_total, scale_fst, sort_and_compose};
