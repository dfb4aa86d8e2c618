//! Label-set extraction over the arcs of an FST.

use std::collections::BTreeSet;

use anyhow::Result;
use itertools::{EitherOrBoth, Itertools};
use rustfst::prelude::*;
use rustfst::EPS_LABEL;

use crate::StdVectorFst;

fn collect_labels(
    fst: &StdVectorFst,
    include_eps: bool,
    side: fn(&Tr<TropicalWeight>) -> Label,
) -> Result<Vec<Label>> {
    let mut labels = BTreeSet::new();
    for state in fst.states_iter() {
        for tr in fst.get_trs(state)?.iter() {
            let label = side(tr);
            if include_eps || label != EPS_LABEL {
                labels.insert(label);
            }
        }
    }
    Ok(labels.into_iter().collect())
}

/// Return the sorted, distinct input labels found on any transition of `fst`.
pub fn get_input_symbols(fst: &StdVectorFst, include_eps: bool) -> Result<Vec<Label>> {
    collect_labels(fst, include_eps, |tr| tr.ilabel)
}

/// Return the sorted, distinct output labels found on any transition of `fst`.
pub fn get_output_symbols(fst: &StdVectorFst, include_eps: bool) -> Result<Vec<Label>> {
    collect_labels(fst, include_eps, |tr| tr.olabel)
}

/// Returns false if `reference` has no output symbols in common with the
/// input symbols of `hypothesis`. Epsilon never counts as shared.
pub fn overlapping_symbols(reference: &StdVectorFst, hypothesis: &StdVectorFst) -> Result<bool> {
    let ref_syms = get_output_symbols(reference, false)?;
    let hyp_syms = get_input_symbols(hypothesis, false)?;
    Ok(ref_syms
        .iter()
        .merge_join_by(hyp_syms.iter(), |a, b| a.cmp(b))
        .any(|pair| matches!(pair, EitherOrBoth::Both(_, _))))
}
