use clap::{ArgAction, Parser};
use colored::Colorize;
use tracing::warn;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use latbin::{run, CombineOptions};

/// Combine reference lattices with hypothesis lattices for lightly
/// supervised training. The best alignments between the two are kept and
/// written as word acceptors with all weights set to one.
///
/// Usage: lattice-combine-light [options] <ref-rspecifier> <hyp-rspecifier> <out-wspecifier>
///  e.g.: lattice-combine-light ark:ref.lats ark:hyp.lats ark,t:out.fsts
#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Reference lattice archive, e.g. ark:ref.lats
    ref_rspecifier: String,

    /// Hypothesis lattice archive, e.g. ark:hyp.lats
    hyp_rspecifier: String,

    /// Output FST archive, e.g. ark,t:out.fsts
    out_wspecifier: String,

    /// Prune the alignment lattice before projection
    #[arg(long, action = ArgAction::Set, require_equals = true, default_value_t = true)]
    prune: bool,

    /// Cost margin above the best alignment kept by pruning
    #[arg(long, default_value_t = 0.0)]
    prune_multiplier: f32,

    /// Output the hypothesis when it shares no words with the reference
    #[arg(long, action = ArgAction::Set, require_equals = true, default_value_t = true)]
    return_hyp: bool,

    /// Scaling factor for graph (language model) costs
    #[arg(long, default_value_t = 0.0)]
    lm_scale: f32,

    /// Scaling factor for acoustic costs
    #[arg(long, default_value_t = 0.0)]
    acoustic_scale: f32,

    /// Log per-key details (debug level)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose > 0 { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    let options = CombineOptions {
        prune: cli.prune,
        prune_multiplier: cli.prune_multiplier,
        return_hyp: cli.return_hyp,
        lm_scale: cli.lm_scale,
        acoustic_scale: cli.acoustic_scale,
    };

    let counters = run(
        &cli.ref_rspecifier,
        &cli.hyp_rspecifier,
        &cli.out_wspecifier,
        &options,
    )?;

    if counters.success > 0 {
        eprintln!("{}", counters.to_string().green());
    } else {
        eprintln!("{}", counters.to_string().yellow());
        warn!("No hypothesis lattice matched any reference key");
    }
    Ok(())
}
