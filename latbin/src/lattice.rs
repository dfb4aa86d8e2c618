//! Compact word lattices as they appear in keyed text archives.
//!
//! A compact lattice is a word acceptor whose weights are a pair of costs
//! (graph, acoustic) plus a sequence of alignment tags. Only the word
//! structure and the summed cost survive conversion to a plain tropical FST.

use std::collections::BTreeMap;
use std::str::FromStr;

use anyhow::Result;
use fstext::StdVectorFst;
use rustfst::prelude::*;

use crate::error::ParseError;

/// Two-component lattice cost. The tropical cost is their sum.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct LatticeWeight {
    pub graph: f32,
    pub acoustic: f32,
}

impl LatticeWeight {
    pub fn new(graph: f32, acoustic: f32) -> Self {
        Self { graph, acoustic }
    }

    pub fn cost(&self) -> f32 {
        self.graph + self.acoustic
    }

    /// Either component infinite: the arc or final weight is dead.
    pub fn is_infinite(&self) -> bool {
        self.graph.is_infinite() || self.acoustic.is_infinite()
    }

    fn scaled(&self, scale: &LatticeScale) -> Self {
        // 0 * inf would give NaN
        if self.is_infinite() {
            return *self;
        }
        let [[gg, ga], [ag, aa]] = scale.0;
        Self {
            graph: gg * self.graph + ga * self.acoustic,
            acoustic: ag * self.graph + aa * self.acoustic,
        }
    }
}

/// 2x2 matrix applied to (graph, acoustic) cost pairs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LatticeScale(pub [[f32; 2]; 2]);

impl LatticeScale {
    /// Diagonal scale: graph costs by `lm_scale`, acoustic costs by `acoustic_scale`.
    pub fn new(lm_scale: f32, acoustic_scale: f32) -> Self {
        Self([[lm_scale, 0.0], [0.0, acoustic_scale]])
    }

    /// The scale used for light supervision: every cost is dropped.
    pub fn zero() -> Self {
        Self::new(0.0, 0.0)
    }
}

/// Lattice cost together with the alignment tags of one arc or final state.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CompactLatticeWeight {
    pub weight: LatticeWeight,
    pub alignment: Vec<i32>,
}

impl CompactLatticeWeight {
    pub fn new(graph: f32, acoustic: f32, alignment: Vec<i32>) -> Self {
        Self {
            weight: LatticeWeight::new(graph, acoustic),
            alignment,
        }
    }
}

impl FromStr for CompactLatticeWeight {
    type Err = String;

    /// `graph,acoustic[,t1_t2_...]`
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let mut fields = s.split(',');
        let graph = parse_cost(fields.next(), s)?;
        let acoustic = parse_cost(fields.next(), s)?;
        let alignment = match fields.next() {
            None | Some("") => Vec::new(),
            Some(tags) => tags
                .split('_')
                .filter(|t| !t.is_empty())
                .map(|t| t.parse::<i32>().map_err(|e| format!("bad alignment tag '{t}': {e}")))
                .collect::<std::result::Result<Vec<_>, _>>()?,
        };
        if fields.next().is_some() {
            return Err(format!("too many fields in weight '{s}'"));
        }
        Ok(Self::new(graph, acoustic, alignment))
    }
}

fn parse_cost(field: Option<&str>, weight: &str) -> std::result::Result<f32, String> {
    let field = field.ok_or_else(|| format!("weight '{weight}' needs graph and acoustic costs"))?;
    match field {
        "Infinity" | "inf" => Ok(f32::INFINITY),
        _ => field
            .parse::<f32>()
            .map_err(|e| format!("bad cost '{field}' in weight '{weight}': {e}")),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompactLatticeArc {
    pub label: Label,
    pub weight: CompactLatticeWeight,
    pub nextstate: StateId,
}

/// Word acceptor with compact lattice weights.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CompactLattice {
    start: Option<StateId>,
    arcs: Vec<Vec<CompactLatticeArc>>,
    finals: Vec<Option<CompactLatticeWeight>>,
}

impl CompactLattice {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_state(&mut self) -> StateId {
        self.arcs.push(Vec::new());
        self.finals.push(None);
        (self.arcs.len() - 1) as StateId
    }

    fn ensure_state(&mut self, state: StateId) {
        while self.arcs.len() <= state as usize {
            self.add_state();
        }
    }

    pub fn num_states(&self) -> usize {
        self.arcs.len()
    }

    pub fn start(&self) -> Option<StateId> {
        self.start
    }

    pub fn set_start(&mut self, state: StateId) {
        self.ensure_state(state);
        self.start = Some(state);
    }

    pub fn add_arc(&mut self, state: StateId, arc: CompactLatticeArc) {
        self.ensure_state(state.max(arc.nextstate));
        self.arcs[state as usize].push(arc);
    }

    pub fn set_final(&mut self, state: StateId, weight: CompactLatticeWeight) {
        self.ensure_state(state);
        self.finals[state as usize] = Some(weight);
    }

    pub fn arcs(&self, state: StateId) -> &[CompactLatticeArc] {
        self.arcs.get(state as usize).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn final_weight(&self, state: StateId) -> Option<&CompactLatticeWeight> {
        self.finals.get(state as usize).and_then(Option::as_ref)
    }

    fn weights_mut(&mut self) -> impl Iterator<Item = &mut CompactLatticeWeight> + '_ {
        self.arcs
            .iter_mut()
            .flat_map(|arcs| arcs.iter_mut().map(|arc| &mut arc.weight))
            .chain(self.finals.iter_mut().flatten())
    }

    /// Apply `scale` to the cost pair of every arc and final weight.
    pub fn scale(&mut self, scale: &LatticeScale) {
        for w in self.weights_mut() {
            w.weight = w.weight.scaled(scale);
        }
    }

    /// Drop the alignment tags, leaving only word labels and costs.
    pub fn remove_alignments(&mut self) {
        for w in self.weights_mut() {
            w.alignment.clear();
        }
    }

    /// Convert to a plain tropical FST with identical input and output
    /// (word) labels and the summed graph and acoustic cost on each arc.
    /// Alignment tags are not carried over. Arcs and final weights with
    /// infinite cost are dead and left out.
    pub fn to_fst(&self) -> Result<StdVectorFst> {
        let mut fst = StdVectorFst::new();
        for _ in 0..self.num_states() {
            fst.add_state();
        }
        for (state, arcs) in self.arcs.iter().enumerate() {
            let state = state as StateId;
            for arc in arcs.iter().filter(|arc| !arc.weight.weight.is_infinite()) {
                fst.emplace_tr(state, arc.label, arc.label, arc.weight.weight.cost(), arc.nextstate)?;
            }
            if let Some(w) = self.final_weight(state) {
                if !w.weight.is_infinite() {
                    fst.set_final(state, w.weight.cost())?;
                }
            }
        }
        if let Some(start) = self.start {
            fst.set_start(start)?;
        }
        Ok(fst)
    }

    /// Parse the body of a text record: one arc or final state per line,
    /// with the line numbers used in error messages.
    ///
    /// Arc lines are `src dst word [weight]`, final lines `state [weight]`;
    /// a missing weight is one. The source of the first line is the start
    /// state. No lines at all is the empty lattice. State ids need not be
    /// dense; they are renumbered in increasing order.
    pub(crate) fn parse_lines<'a, I>(lines: I) -> std::result::Result<Self, ParseError>
    where
        I: IntoIterator<Item = (usize, &'a str)>,
    {
        let mut entries = Vec::new();
        for (line_no, line) in lines {
            let fields: Vec<&str> = line.split_whitespace().collect();
            let state = |i: usize| {
                fields[i]
                    .parse::<StateId>()
                    .map_err(|e| ParseError::new(line_no, format!("bad state '{}': {e}", fields[i])))
            };
            let weight = |i: usize| match fields.get(i) {
                Some(w) => w.parse::<CompactLatticeWeight>().map_err(|e| ParseError::new(line_no, e)),
                None => Ok(CompactLatticeWeight::default()),
            };
            let entry = match fields.len() {
                1 | 2 => RecordLine::Final(state(0)?, weight(1)?),
                3 | 4 => {
                    let label = fields[2]
                        .parse::<Label>()
                        .map_err(|e| ParseError::new(line_no, format!("bad label '{}': {e}", fields[2])))?;
                    RecordLine::Arc(
                        state(0)?,
                        CompactLatticeArc {
                            label,
                            weight: weight(3)?,
                            nextstate: state(1)?,
                        },
                    )
                }
                n => {
                    return Err(ParseError::new(
                        line_no,
                        format!("expected 1 to 4 fields in a compact lattice line, found {n}"),
                    ))
                }
            };
            entries.push(entry);
        }

        let mut ids = BTreeMap::new();
        for entry in &entries {
            match entry {
                RecordLine::Final(s, _) => {
                    ids.insert(*s, 0);
                }
                RecordLine::Arc(src, arc) => {
                    ids.insert(*src, 0);
                    ids.insert(arc.nextstate, 0);
                }
            }
        }
        for (dense, id) in ids.values_mut().enumerate() {
            *id = dense as StateId;
        }

        let mut clat = CompactLattice::new();
        for _ in 0..ids.len() {
            clat.add_state();
        }
        for entry in entries {
            match entry {
                RecordLine::Final(s, w) => {
                    let s = ids[&s];
                    if clat.start.is_none() {
                        clat.set_start(s);
                    }
                    clat.set_final(s, w);
                }
                RecordLine::Arc(src, mut arc) => {
                    let src = ids[&src];
                    arc.nextstate = ids[&arc.nextstate];
                    if clat.start.is_none() {
                        clat.set_start(src);
                    }
                    clat.add_arc(src, arc);
                }
            }
        }
        Ok(clat)
    }
}

enum RecordLine {
    Final(StateId, CompactLatticeWeight),
    Arc(StateId, CompactLatticeArc),
}

impl FromStr for CompactLattice {
    type Err = ParseError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        CompactLattice::parse_lines(
            s.lines()
                .enumerate()
                .map(|(i, l)| (i + 1, l))
                .filter(|(_, l)| !l.trim().is_empty()),
        )
    }
}
