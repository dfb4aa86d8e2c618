//! Combining a reference transcription with a hypothesis lattice.
//!
//! The reference and hypothesis word automata are aligned through a one-state
//! edit network that rewards matching words. The best alignments are kept,
//! projected onto the hypothesis side and reduced to a minimal deterministic
//! acceptor with all weights set to one. Where the two agree the result is
//! the agreed word; elsewhere it is whatever the hypothesis says.

use anyhow::{Context, Result};
use fstext::{
    create_edit_distance, determinize_and_minimize, num_trs_total, overlapping_symbols, prune,
    scale_fst, sort_and_compose, EditCosts, StdVectorFst,
};
use rustfst::algorithms::rm_epsilon::rm_epsilon;
use rustfst::algorithms::{project, ProjectType};
use rustfst::prelude::*;
use tracing::{debug, info, warn};

use crate::lattice::{CompactLattice, LatticeScale};

/// Settings for one run of the combination.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CombineOptions {
    /// Prune the composed alignment lattice before projection.
    pub prune: bool,
    /// Cost margin above the best alignment that survives pruning.
    pub prune_multiplier: f32,
    /// Emit the hypothesis as-is when it shares no words with the reference.
    pub return_hyp: bool,
    /// Scale applied to graph costs before conversion.
    pub lm_scale: f32,
    /// Scale applied to acoustic costs before conversion.
    pub acoustic_scale: f32,
}

impl Default for CombineOptions {
    fn default() -> Self {
        Self {
            prune: true,
            prune_multiplier: 0.0,
            return_hyp: true,
            lm_scale: 0.0,
            acoustic_scale: 0.0,
        }
    }
}

impl CombineOptions {
    pub fn lattice_scale(&self) -> LatticeScale {
        LatticeScale::new(self.lm_scale, self.acoustic_scale)
    }
}

/// What happened to one utterance whose hypothesis was found.
#[derive(Debug)]
pub enum Outcome {
    /// Reference and hypothesis overlapped and were combined.
    Combined(StdVectorFst),
    /// No shared words; carries the hypothesis when it is to be emitted.
    NoOverlap(Option<StdVectorFst>),
    /// The combination accepts nothing.
    Empty,
}

impl Outcome {
    /// The automaton to write for this key, if any.
    pub fn into_fst(self) -> Option<StdVectorFst> {
        match self {
            Outcome::Combined(fst) => Some(fst),
            Outcome::NoOverlap(hyp) => hyp,
            Outcome::Empty => None,
        }
    }
}

/// Turn a compact lattice into a word acceptor: scale the costs, drop the
/// alignments, convert and keep the word (output) side.
pub fn lattice_to_word_fst(clat: &CompactLattice, scale: &LatticeScale) -> Result<StdVectorFst> {
    let mut clat = clat.clone();
    clat.scale(scale);
    clat.remove_alignments();
    let mut fst = clat.to_fst()?;
    project(&mut fst, ProjectType::ProjectOutput);
    Ok(fst)
}

/// Align `reference` against `hypothesis` and build the combined acceptor.
///
/// Returns `None` when the alignment lattice accepts nothing, which happens
/// only if one of the inputs accepts nothing.
pub fn combine_light(
    reference: StdVectorFst,
    hypothesis: StdVectorFst,
    options: &CombineOptions,
) -> Result<Option<StdVectorFst>> {
    let edit_distance_fst =
        create_edit_distance(&reference, &hypothesis, EditCosts::LIGHT_SUPERVISION)?;

    // compose(transcription, edit)
    let edit_ref_fst = sort_and_compose(reference, edit_distance_fst)
        .context("composing the reference with the edit network")?;

    // compose(transcription+edit, hypotheses)
    let mut result_fst = sort_and_compose(edit_ref_fst, hypothesis)
        .context("composing the aligned reference with the hypothesis")?;
    debug!(
        "Alignment lattice has {} states and {} arcs",
        result_fst.num_states(),
        num_trs_total(&result_fst)?
    );
    if result_fst.start().is_none() {
        return Ok(None);
    }

    if options.prune {
        info!("Pruning with multiplier {}", options.prune_multiplier);
        prune(&mut result_fst, options.prune_multiplier)?;
        debug!(
            "Pruned alignment lattice has {} states and {} arcs",
            result_fst.num_states(),
            num_trs_total(&result_fst)?
        );
    }

    // Hypothesis words win wherever the alignment did not match.
    project(&mut result_fst, ProjectType::ProjectOutput);
    rm_epsilon(&mut result_fst)?;
    scale_fst(&mut result_fst, 0.0)?;

    let det_fst = determinize_and_minimize(&result_fst)?;
    if det_fst.start().is_none() {
        return Ok(None);
    }
    Ok(Some(det_fst))
}

/// Decide the outcome for one key given both word acceptors.
pub fn combine_utterance(
    key: &str,
    reference: StdVectorFst,
    hypothesis: StdVectorFst,
    options: &CombineOptions,
) -> Result<Outcome> {
    if !overlapping_symbols(&reference, &hypothesis)? {
        warn!("No overlapping symbols between ref and hyp for {key}");
        if options.return_hyp {
            info!("Returning hypothesis for {key}");
            return Ok(Outcome::NoOverlap(Some(hypothesis)));
        }
        return Ok(Outcome::NoOverlap(None));
    }

    info!("Composing key {key}");
    match combine_light(reference, hypothesis, options)
        .with_context(|| format!("combining lattices for {key}"))?
    {
        Some(fst) => Ok(Outcome::Combined(fst)),
        None => {
            warn!("Combined lattice for {key} is empty");
            Ok(Outcome::Empty)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rustfst::utils::acceptor;
    use std::collections::HashSet;

    fn union_of(paths: &[&[Label]]) -> StdVectorFst {
        let mut fst = StdVectorFst::new();
        let q0 = fst.add_state();
        fst.set_start(q0).unwrap();
        for path in paths {
            let mut prev = q0;
            for &label in path.iter() {
                let next = fst.add_state();
                fst.emplace_tr(prev, label, label, 0.0, next).unwrap();
                prev = next;
            }
            fst.set_final(prev, 0.0).unwrap();
        }
        fst
    }

    fn word_paths(fst: &StdVectorFst) -> Vec<Vec<Label>> {
        let mut out: Vec<Vec<Label>> = fst.paths_iter().map(|p| p.olabels.clone()).collect();
        out.sort();
        out
    }

    fn all_weights_one(fst: &StdVectorFst) -> bool {
        fst.states_iter().all(|s| {
            fst.get_trs(s).unwrap().iter().all(|tr| tr.weight.is_one())
                && fst.final_weight(s).unwrap().map_or(true, |w| w.is_one())
        })
    }

    fn is_deterministic(fst: &StdVectorFst) -> bool {
        fst.states_iter().all(|s| {
            let mut seen = HashSet::new();
            fst.get_trs(s).unwrap().iter().all(|tr| seen.insert(tr.ilabel))
        })
    }

    #[test]
    fn test_full_match_beats_substitution() {
        // A B C against {A X C, A B C}
        let reference: StdVectorFst = acceptor(&[1, 2, 3], TropicalWeight::one());
        let hypothesis = union_of(&[&[1, 9, 3], &[1, 2, 3]]);
        let combined = combine_light(reference, hypothesis, &CombineOptions::default())
            .unwrap()
            .unwrap();
        assert_eq!(word_paths(&combined), vec![vec![1, 2, 3]]);
        assert_eq!(combined.num_states(), 4);
        assert!(is_deterministic(&combined));
        assert!(all_weights_one(&combined));
    }

    #[test]
    fn test_mismatch_takes_hypothesis_word() {
        // A B C against A X C: B is replaced by the hypothesis spelling.
        let reference: StdVectorFst = acceptor(&[1, 2, 3], TropicalWeight::one());
        let hypothesis: StdVectorFst = acceptor(&[1, 9, 3], TropicalWeight::one());
        let combined = combine_light(reference, hypothesis, &CombineOptions::default())
            .unwrap()
            .unwrap();
        assert_eq!(word_paths(&combined), vec![vec![1, 9, 3]]);
    }

    #[test]
    fn test_tied_alignments_are_all_kept() {
        // Each hypothesis path matches exactly one reference word.
        let reference: StdVectorFst = acceptor(&[1, 2], TropicalWeight::one());
        let hypothesis = union_of(&[&[1, 7], &[8, 2]]);
        let combined = combine_light(reference, hypothesis, &CombineOptions::default())
            .unwrap()
            .unwrap();
        assert_eq!(word_paths(&combined), vec![vec![1, 7], vec![8, 2]]);
        assert!(is_deterministic(&combined));
    }

    #[test]
    fn test_without_pruning_every_hypothesis_survives() {
        let reference: StdVectorFst = acceptor(&[1, 2, 3], TropicalWeight::one());
        let hypothesis = union_of(&[&[1, 9, 3], &[1, 2, 3]]);
        let options = CombineOptions {
            prune: false,
            ..CombineOptions::default()
        };
        let combined = combine_light(reference, hypothesis, &options).unwrap().unwrap();
        assert_eq!(word_paths(&combined), vec![vec![1, 2, 3], vec![1, 9, 3]]);
        assert!(all_weights_one(&combined));
    }

    #[test]
    fn test_wide_margin_keeps_near_best() {
        let reference: StdVectorFst = acceptor(&[1, 2, 3], TropicalWeight::one());
        let hypothesis = union_of(&[&[1, 9, 3], &[1, 2, 3], &[7, 8, 9]]);
        let options = CombineOptions {
            prune_multiplier: 1.0,
            ..CombineOptions::default()
        };
        let combined = combine_light(reference, hypothesis, &options).unwrap().unwrap();
        // best is -3, "1 9 3" reaches -2, "7 8 9" only 0
        assert_eq!(word_paths(&combined), vec![vec![1, 2, 3], vec![1, 9, 3]]);
    }

    #[test]
    fn test_minimal_result_is_stable() {
        let reference: StdVectorFst = acceptor(&[1, 2], TropicalWeight::one());
        let hypothesis = union_of(&[&[1, 7], &[8, 2]]);
        let combined = combine_light(reference, hypothesis, &CombineOptions::default())
            .unwrap()
            .unwrap();
        let again = determinize_and_minimize(&combined).unwrap();
        assert_eq!(again.num_states(), combined.num_states());
        assert_eq!(num_trs_total(&again).unwrap(), num_trs_total(&combined).unwrap());
    }

    #[test]
    fn test_empty_hypothesis_gives_empty_result() {
        let reference: StdVectorFst = acceptor(&[1, 2], TropicalWeight::one());
        let mut hypothesis: StdVectorFst = acceptor(&[1, 2], TropicalWeight::one());
        // Remove the only final weight: the hypothesis accepts nothing.
        let last = (hypothesis.num_states() - 1) as StateId;
        hypothesis.take_final_weight(last).unwrap();
        let result = combine_light(reference, hypothesis, &CombineOptions::default()).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_no_overlap_returns_hypothesis_unchanged() {
        let reference: StdVectorFst = acceptor(&[1, 2], TropicalWeight::one());
        let hypothesis: StdVectorFst = acceptor(&[3, 4], TropicalWeight::new(2.5));
        let outcome =
            combine_utterance("utt", reference.clone(), hypothesis.clone(), &CombineOptions::default())
                .unwrap();
        match outcome {
            Outcome::NoOverlap(Some(fst)) => assert_eq!(fst, hypothesis),
            other => panic!("unexpected outcome {other:?}"),
        }

        let options = CombineOptions {
            return_hyp: false,
            ..CombineOptions::default()
        };
        let outcome = combine_utterance("utt", reference, hypothesis, &options).unwrap();
        assert!(matches!(outcome, Outcome::NoOverlap(None)));
        assert!(outcome.into_fst().is_none());
    }

    #[test]
    fn test_overlap_is_combined() {
        let reference: StdVectorFst = acceptor(&[1, 2], TropicalWeight::one());
        let hypothesis: StdVectorFst = acceptor(&[1, 5], TropicalWeight::one());
        let outcome =
            combine_utterance("utt", reference, hypothesis, &CombineOptions::default()).unwrap();
        let fst = outcome.into_fst().unwrap();
        assert_eq!(word_paths(&fst), vec![vec![1, 5]]);
    }

    #[test]
    fn test_returned_hypothesis_has_no_dead_paths() {
        let reference: CompactLattice = "0 1 1 0,0,\n1 0,0,\n".parse().unwrap();
        let hypothesis: CompactLattice = "0 1 5 0,0,\n0 1 6 Infinity,0,\n1 0,0,\n".parse().unwrap();
        let scale = LatticeScale::zero();
        let outcome = combine_utterance(
            "utt",
            lattice_to_word_fst(&reference, &scale).unwrap(),
            lattice_to_word_fst(&hypothesis, &scale).unwrap(),
            &CombineOptions::default(),
        )
        .unwrap();
        let fst = outcome.into_fst().unwrap();
        let paths: Vec<(Vec<Label>, f32)> = fst
            .paths_iter()
            .map(|p| (p.olabels.clone(), *p.weight.value()))
            .collect();
        assert_eq!(paths, vec![(vec![5], 0.0)]);
    }

    #[test]
    fn test_dead_hypothesis_arc_is_not_combined() {
        let reference: CompactLattice = "0 1 5 0,0,\n1 0,0,\n".parse().unwrap();
        let hypothesis: CompactLattice = "0 1 5 0,0,\n0 1 6 0,Infinity,\n1 0,0,\n".parse().unwrap();
        let scale = LatticeScale::zero();
        let options = CombineOptions {
            prune: false,
            ..CombineOptions::default()
        };
        let combined = combine_light(
            lattice_to_word_fst(&reference, &scale).unwrap(),
            lattice_to_word_fst(&hypothesis, &scale).unwrap(),
            &options,
        )
        .unwrap()
        .unwrap();
        assert_eq!(word_paths(&combined), vec![vec![5]]);
        assert!(all_weights_one(&combined));
    }

    #[test]
    fn test_lattice_to_word_fst_drops_costs() {
        let clat: CompactLattice = "0 1 4 2.5,3,1_1_2\n1 2 5 1,1,3\n2 0.5,0,\n".parse().unwrap();
        let fst = lattice_to_word_fst(&clat, &LatticeScale::zero()).unwrap();
        assert_eq!(word_paths(&fst), vec![vec![4, 5]]);
        assert!(all_weights_one(&fst));

        let fst = lattice_to_word_fst(&clat, &LatticeScale::new(1.0, 1.0)).unwrap();
        let path = fst.paths_iter().next().unwrap();
        assert_eq!(*path.weight.value(), 8.0);
    }
}
