use anyhow::Result;
use rustfst::algorithms::compose::compose;
use rustfst::algorithms::determinize::{
    determinize_with_config, DeterminizeConfig, DeterminizeType,
};
use rustfst::algorithms::{connect, minimize_with_config, tr_sort, MinimizeConfig};
use rustfst::prelude::*;

use crate::{StdVectorFst, KDELTA};

/// Multiply every transition weight and final weight of `fst` by `scale`.
///
/// Weights that are zero (infinite cost) are left alone, so a scale of
/// `0.0` turns every reachable arc and every final state into weight one.
pub fn scale_fst(fst: &mut StdVectorFst, scale: f32) -> Result<()> {
    let states: Vec<StateId> = fst.states_iter().collect();
    for state in states {
        let trs = fst.pop_trs(state)?;
        for mut tr in trs {
            if !tr.weight.is_zero() {
                tr.weight = TropicalWeight::new(tr.weight.value() * scale);
            }
            fst.add_tr(state, tr)?;
        }
        if let Some(w) = fst.final_weight(state)? {
            if !w.is_zero() {
                fst.set_final(state, TropicalWeight::new(w.value() * scale))?;
            }
        }
    }
    Ok(())
}

/// Sort `fst1` on output labels and `fst2` on input labels, compose them and
/// trim states that are not on a successful path.
pub fn sort_and_compose(mut fst1: StdVectorFst, mut fst2: StdVectorFst) -> Result<StdVectorFst> {
    tr_sort(&mut fst1, OLabelCompare {});
    tr_sort(&mut fst2, ILabelCompare {});
    let mut composed: StdVectorFst = compose(fst1, fst2)?;
    connect(&mut composed)?;
    Ok(composed)
}

/// Determinize `fst` as a functional transducer and minimize the result.
///
/// The input is expected to be epsilon-free; word acceptors produced by
/// projection always are functional.
pub fn determinize_and_minimize(fst: &StdVectorFst) -> Result<StdVectorFst> {
    let mut det_fst: StdVectorFst = determinize_with_config(
        fst,
        DeterminizeConfig {
            delta: KDELTA,
            det_type: DeterminizeType::DeterminizeFunctional,
        },
    )?;
    minimize_with_config(
        &mut det_fst,
        MinimizeConfig {
            delta: KDELTA,
            allow_nondet: false,
        },
    )?;
    Ok(det_fst)
}

/// Number of transitions summed over all states.
pub fn num_trs_total(fst: &StdVectorFst) -> Result<usize> {
    let mut total = 0;
    for state in fst.states_iter() {
        total += fst.num_trs(state)?;
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prune::best_path_cost;
    use rustfst::algorithms::{project, ProjectType};
    use rustfst::utils::{acceptor, transducer};
    use std::collections::HashSet;

    fn is_deterministic(fst: &StdVectorFst) -> bool {
        fst.states_iter().all(|s| {
            let mut seen = HashSet::new();
            fst.get_trs(s).unwrap().iter().all(|tr| seen.insert(tr.ilabel))
        })
    }

    fn paths(fst: &StdVectorFst) -> Vec<(Vec<Label>, f32)> {
        let mut out: Vec<(Vec<Label>, f32)> = fst
            .paths_iter()
            .map(|p| (p.ilabels.clone(), *p.weight.value()))
            .collect();
        out.sort_by(|a, b| a.0.cmp(&b.0));
        out
    }

    #[test]
    fn test_scale_to_zero() {
        let mut fst: StdVectorFst = fst![1, 2 => 1, 2; 3.5];
        fst.emplace_tr(0, 7, 7, 2.0, 1).unwrap();
        scale_fst(&mut fst, 0.0).unwrap();
        for s in fst.states_iter() {
            for tr in fst.get_trs(s).unwrap().iter() {
                assert_eq!(*tr.weight.value(), 0.0);
            }
            if let Some(w) = fst.final_weight(s).unwrap() {
                assert_eq!(*w.value(), 0.0);
            }
        }
    }

    #[test]
    fn test_scale_by_factor() {
        let mut fst = StdVectorFst::new();
        let q0 = fst.add_state();
        let q1 = fst.add_state();
        fst.set_start(q0).unwrap();
        fst.emplace_tr(q0, 1, 1, 1.5, q1).unwrap();
        fst.set_final(q1, -2.0).unwrap();
        scale_fst(&mut fst, 2.0).unwrap();
        let tr = fst.get_trs(q0).unwrap().iter().next().cloned().unwrap();
        assert_eq!(*tr.weight.value(), 3.0);
        assert_eq!(fst.final_weight(q1).unwrap(), Some(TropicalWeight::new(-4.0)));
        assert_eq!(fst.final_weight(q0).unwrap(), None);
    }

    #[test]
    fn test_sort_and_compose_matches_labels() {
        let fst1: StdVectorFst = fst![1, 2 => 3, 4; 1.0];
        let fst2: StdVectorFst = fst![3, 4 => 5, 6; 2.0];
        let composed = sort_and_compose(fst1, fst2).unwrap();
        assert_eq!(paths(&composed), vec![(vec![1, 2], 3.0)]);
    }

    #[test]
    fn test_sort_and_compose_no_match_is_empty() {
        let fst1: StdVectorFst = fst![1 => 3];
        let fst2: StdVectorFst = fst![4 => 5];
        let composed = sort_and_compose(fst1, fst2).unwrap();
        assert_eq!(composed.start(), None);
        assert_eq!(composed.num_states(), 0);
    }

    #[test]
    fn test_determinize_merges_common_prefixes() {
        // Union of "1 2 3" (cost 2) and "1 2 4" (cost 1) sharing no states.
        let mut fst = StdVectorFst::new();
        let q0 = fst.add_state();
        fst.set_start(q0).unwrap();
        for (last, cost) in [(3, 2.0), (4, 1.0)] {
            let a = fst.add_state();
            let b = fst.add_state();
            let c = fst.add_state();
            fst.emplace_tr(q0, 1, 1, 0.0, a).unwrap();
            fst.emplace_tr(a, 2, 2, 0.0, b).unwrap();
            fst.emplace_tr(b, last, last, 0.0, c).unwrap();
            fst.set_final(c, cost).unwrap();
        }
        assert!(!is_deterministic(&fst));
        let det = determinize_and_minimize(&fst).unwrap();
        assert!(is_deterministic(&det));
        assert_eq!(paths(&det), vec![(vec![1, 2, 3], 2.0), (vec![1, 2, 4], 1.0)]);
    }

    #[test]
    fn test_determinize_keeps_minimum_of_duplicates() {
        let mut fst = StdVectorFst::new();
        let q0 = fst.add_state();
        let q1 = fst.add_state();
        let q2 = fst.add_state();
        fst.set_start(q0).unwrap();
        fst.emplace_tr(q0, 5, 5, 3.0, q1).unwrap();
        fst.emplace_tr(q0, 5, 5, 1.0, q2).unwrap();
        fst.set_final(q1, 0.0).unwrap();
        fst.set_final(q2, 0.0).unwrap();
        let det = determinize_and_minimize(&fst).unwrap();
        assert!(is_deterministic(&det));
        assert_eq!(paths(&det), vec![(vec![5], 1.0)]);
        assert_eq!(best_path_cost(&det).unwrap(), Some(1.0));
    }

    #[test]
    fn test_minimize_is_idempotent() {
        let mut fst = StdVectorFst::new();
        let q0 = fst.add_state();
        fst.set_start(q0).unwrap();
        for label in [1, 2] {
            let a = fst.add_state();
            let b = fst.add_state();
            fst.emplace_tr(q0, label, label, 0.0, a).unwrap();
            fst.emplace_tr(a, 9, 9, 0.0, b).unwrap();
            fst.set_final(b, 0.0).unwrap();
        }
        let once = determinize_and_minimize(&fst).unwrap();
        // Both branches end in "9", so the tails merge: 3 states, 3 arcs.
        assert_eq!(once.num_states(), 3);
        assert_eq!(num_trs_total(&once).unwrap(), 3);

        let twice = determinize_and_minimize(&once).unwrap();
        assert_eq!(twice.num_states(), once.num_states());
        assert_eq!(num_trs_total(&twice).unwrap(), num_trs_total(&once).unwrap());
        assert_eq!(paths(&twice), paths(&once));
    }

    #[test]
    fn test_projection_then_determinize() {
        let mut fst: StdVectorFst = fst![1, 2 => 3, 4];
        project(&mut fst, ProjectType::ProjectOutput);
        let det = determinize_and_minimize(&fst).unwrap();
        let expected: StdVectorFst = acceptor(&[3, 4], TropicalWeight::one());
        assert_eq!(paths(&det), paths(&expected));
    }
}
