//! The per-archive loop: walk the reference archive in order, look each key
//! up in the hypothesis archive and write whatever the combination yields.

use std::fmt;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::combine::{combine_utterance, lattice_to_word_fst, CombineOptions, Outcome};
use crate::error::TableError;
use crate::lattice::CompactLattice;
use crate::table::{FstWriter, RandomAccessLatticeReader, SequentialLatticeReader};

/// Per-run tallies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Counters {
    /// Keys read from the reference archive.
    pub total: usize,
    /// Keys whose hypothesis was found.
    pub success: usize,
    /// Keys absent from the hypothesis archive.
    pub missing: usize,
    /// Keys where reference and hypothesis share no word.
    pub no_overlap: usize,
    /// Keys whose combination accepted nothing.
    pub empty: usize,
}

impl fmt::Display for Counters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Processed successfully {} out of {} with {} missing lats in hypothesis \
             (returned {} lats without overlap).",
            self.success, self.total, self.missing, self.no_overlap
        )?;
        if self.empty > 0 {
            write!(f, " {} combined lats were empty.", self.empty)?;
        }
        Ok(())
    }
}

/// Combine every reference lattice with its hypothesis and write the results
/// under the reference key, in reference order.
pub fn combine_tables<I>(
    references: I,
    hypotheses: &mut RandomAccessLatticeReader,
    writer: &mut FstWriter,
    options: &CombineOptions,
) -> Result<Counters>
where
    I: IntoIterator<Item = Result<(String, CompactLattice), TableError>>,
{
    let scale = options.lattice_scale();
    let mut counters = Counters::default();

    for entry in references {
        let (key, ref_lat) = entry.context("reading the reference archive")?;
        counters.total += 1;

        let Some(hyp_lat) = hypotheses
            .value(&key)
            .with_context(|| format!("looking up {key} in the hypothesis archive"))?
        else {
            warn!("No lattice found for hypothesis utterance {key}");
            counters.missing += 1;
            continue;
        };
        counters.success += 1;

        let reference = lattice_to_word_fst(&ref_lat, &scale)
            .with_context(|| format!("converting reference lattice {key}"))?;
        let hypothesis = lattice_to_word_fst(hyp_lat, &scale)
            .with_context(|| format!("converting hypothesis lattice {key}"))?;

        let outcome = combine_utterance(&key, reference, hypothesis, options)?;
        match &outcome {
            Outcome::NoOverlap(_) => counters.no_overlap += 1,
            Outcome::Empty => counters.empty += 1,
            Outcome::Combined(_) => {}
        }
        if let Some(fst) = outcome.into_fst() {
            writer.write(&key, &fst)?;
        }
    }

    info!("{counters}");
    Ok(counters)
}

/// Open the three archives, combine, and close the output.
pub fn run(
    ref_rspecifier: &str,
    hyp_rspecifier: &str,
    out_wspecifier: &str,
    options: &CombineOptions,
) -> Result<Counters> {
    let references = SequentialLatticeReader::open(ref_rspecifier)
        .with_context(|| format!("opening reference archive {ref_rspecifier}"))?;
    let mut hypotheses = RandomAccessLatticeReader::open(hyp_rspecifier)
        .with_context(|| format!("opening hypothesis archive {hyp_rspecifier}"))?;
    let mut writer = FstWriter::create(out_wspecifier)
        .with_context(|| format!("opening output archive {out_wspecifier}"))?;

    let counters = combine_tables(references, &mut hypotheses, &mut writer, options)?;
    writer.close()?;
    Ok(counters)
}
