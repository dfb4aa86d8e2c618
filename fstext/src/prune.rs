//! Shortest-distance pruning in the tropical semiring.
//!
//! Alignment lattices carry negative arc weights (a match costs -1), so the
//! distances are computed by label-correcting relaxation rather than a
//! Dijkstra-style queue. Every cycle in the input must have non-negative
//! total weight; a negative cycle is reported as an error.

use std::collections::VecDeque;

use anyhow::{bail, Result};
use rustfst::algorithms::connect;
use rustfst::prelude::*;
use tracing::debug;

use crate::{StdVectorFst, KDELTA};

/// Adjacency list entry: (next state, arc cost).
type Edge = (usize, f32);

fn relax(adjacency: &[Vec<Edge>], sources: &[(usize, f32)]) -> Result<Vec<f32>> {
    let n = adjacency.len();
    let mut dist = vec![f32::INFINITY; n];
    let mut queued = vec![false; n];
    let mut updates = vec![0usize; n];
    let mut queue = VecDeque::new();

    for &(s, d) in sources {
        if d < dist[s] {
            dist[s] = d;
            if !queued[s] {
                queued[s] = true;
                queue.push_back(s);
            }
        }
    }

    while let Some(s) = queue.pop_front() {
        queued[s] = false;
        for &(next, cost) in &adjacency[s] {
            let candidate = dist[s] + cost;
            if candidate < dist[next] {
                dist[next] = candidate;
                updates[next] += 1;
                if updates[next] > n {
                    bail!("Negative-weight cycle through state {next}; distances are unbounded");
                }
                if !queued[next] {
                    queued[next] = true;
                    queue.push_back(next);
                }
            }
        }
    }
    Ok(dist)
}

/// Forward (from the start state) and backward (to any final state, final
/// weight included) tropical distances of every state, as plain floats with
/// `f32::INFINITY` for unreachable states.
pub fn shortest_distances(fst: &StdVectorFst) -> Result<(Vec<f32>, Vec<f32>)> {
    let n = fst.num_states();
    let mut forward_adj: Vec<Vec<Edge>> = vec![Vec::new(); n];
    let mut backward_adj: Vec<Vec<Edge>> = vec![Vec::new(); n];
    let mut finals = Vec::new();

    for state in fst.states_iter() {
        let s = state as usize;
        for tr in fst.get_trs(state)?.iter() {
            let cost = *tr.weight.value();
            if cost.is_infinite() {
                continue;
            }
            forward_adj[s].push((tr.nextstate as usize, cost));
            backward_adj[tr.nextstate as usize].push((s, cost));
        }
        if let Some(w) = fst.final_weight(state)? {
            if !w.is_zero() {
                finals.push((s, *w.value()));
            }
        }
    }

    let forward = match fst.start() {
        Some(start) => relax(&forward_adj, &[(start as usize, 0.0)])?,
        None => vec![f32::INFINITY; n],
    };
    let backward = relax(&backward_adj, &finals)?;
    Ok((forward, backward))
}

/// Cost of the best successful path, or `None` when nothing is accepted.
pub fn best_path_cost(fst: &StdVectorFst) -> Result<Option<f32>> {
    let Some(start) = fst.start() else {
        return Ok(None);
    };
    let (_, backward) = shortest_distances(fst)?;
    let best = backward[start as usize];
    Ok(if best.is_finite() { Some(best) } else { None })
}

/// Remove every transition and final weight that lies only on paths costing
/// more than `best + threshold`, then trim states left unconnected.
///
/// With `threshold == 0.0` exactly the minimum-cost paths survive, ties
/// included. An FST that accepts nothing is emptied.
pub fn prune(fst: &mut StdVectorFst, threshold: f32) -> Result<()> {
    if threshold.is_nan() || threshold < 0.0 {
        bail!("Pruning threshold must be a non-negative number, got {threshold}");
    }
    let Some(start) = fst.start() else {
        return Ok(());
    };
    let (forward, backward) = shortest_distances(fst)?;
    let best = backward[start as usize];
    let limit = best + threshold + KDELTA;
    debug!("Best path cost {best}, keeping paths up to {limit}");

    let states: Vec<StateId> = fst.states_iter().collect();
    for state in states {
        let s = state as usize;
        let trs = fst.pop_trs(state)?;
        for tr in trs {
            let through = forward[s] + *tr.weight.value() + backward[tr.nextstate as usize];
            if best.is_finite() && through <= limit {
                fst.add_tr(state, tr)?;
            }
        }
        if let Some(w) = fst.final_weight(state)? {
            let through = forward[s] + *w.value();
            if !best.is_finite() || through > limit {
                fst.take_final_weight(state)?;
            }
        }
    }
    connect(fst)?;
    Ok(())
}
