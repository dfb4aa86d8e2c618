//! One-state alignment network between a reference and a hypothesis alphabet.

use anyhow::Result;
use itertools::Itertools;
use rustfst::algorithms::tr_sort;
use rustfst::prelude::*;
use rustfst::EPS_LABEL;

use crate::symbols::{get_input_symbols, get_output_symbols};
use crate::StdVectorFst;

/// Costs attached to the four kinds of alignment arc.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EditCosts {
    pub correct: f32,
    pub substitution: f32,
    pub insertion: f32,
    pub deletion: f32,
}

impl EditCosts {
    /// A match earns -1 and every other edit is free, so the cheapest
    /// alignment is the one with the most matching word pairs.
    pub const LIGHT_SUPERVISION: EditCosts = EditCosts {
        correct: -1.0,
        substitution: 0.0,
        insertion: 0.0,
        deletion: 0.0,
    };

    /// Classical Levenshtein costs.
    pub const LEVENSHTEIN: EditCosts = EditCosts {
        correct: 0.0,
        substitution: 1.0,
        insertion: 1.0,
        deletion: 1.0,
    };
}

impl Default for EditCosts {
    fn default() -> Self {
        Self::LIGHT_SUPERVISION
    }
}

/// Build the alignment network from explicit alphabets.
///
/// Every reference symbol gets a deletion arc `r:ε`, every hypothesis symbol
/// an insertion arc `ε:h`, and every pair a match or substitution arc `r:h`.
/// All arcs loop on the single state, which is both start and final with
/// weight one. The result is sorted on output labels.
///
/// The pair loop is quadratic in the alphabet sizes; per-utterance word
/// alphabets are small enough for that to be fine.
pub fn build_edit_distance(
    ref_syms: &[Label],
    hyp_syms: &[Label],
    costs: EditCosts,
) -> Result<StdVectorFst> {
    let mut fst = StdVectorFst::new();
    let q0 = fst.add_state();
    fst.set_start(q0)?;

    for &r in ref_syms {
        fst.emplace_tr(q0, r, EPS_LABEL, costs.deletion, q0)?;
    }
    for &h in hyp_syms {
        fst.emplace_tr(q0, EPS_LABEL, h, costs.insertion, q0)?;
    }
    for (&r, &h) in ref_syms.iter().cartesian_product(hyp_syms.iter()) {
        let cost = if r == h {
            costs.correct
        } else {
            costs.substitution
        };
        fst.emplace_tr(q0, r, h, cost, q0)?;
    }

    fst.set_final(q0, TropicalWeight::one())?;
    tr_sort(&mut fst, OLabelCompare {});
    Ok(fst)
}

/// Build the alignment network between the output symbols of `fst1` and the
/// input symbols of `fst2`, epsilons excluded.
pub fn create_edit_distance(
    fst1: &StdVectorFst,
    fst2: &StdVectorFst,
    costs: EditCosts,
) -> Result<StdVectorFst> {
    let fst1_syms = get_output_symbols(fst1, false)?;
    let fst2_syms = get_input_symbols(fst2, false)?;
    build_edit_distance(&fst1_syms, &fst2_syms, costs)
}
