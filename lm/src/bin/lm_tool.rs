//! Inspect and exercise ARPA-like model files from the command line.

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};

use softboard_lm::{DynamicModel, LanguageModel, PredictOptions, Smoothing};

#[derive(Parser)]
#[command(name = "lm-tool", about = "Inspect softboard language models")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print per-level n-gram counts of a model file.
    Counts {
        /// ARPA-like model file
        model: PathBuf,
    },
    /// Predict completions for a context.
    Predict {
        /// ARPA-like model file
        model: PathBuf,
        /// Context tokens; the last one is the completion prefix
        context: Vec<String>,
        /// Maximum number of results
        #[arg(short, long, default_value_t = 10)]
        limit: usize,
        /// Use Witten-Bell smoothing instead of absolute discounting
        #[arg(long)]
        witten_bell: bool,
    },
    /// Learn tokens into a model file (created when missing).
    Learn {
        /// ARPA-like model file
        model: PathBuf,
        /// Tokens to learn
        tokens: Vec<String>,
        /// Model order used when creating a new file
        #[arg(short, long, default_value_t = 3)]
        order: usize,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();

    match cli.command {
        Command::Counts { model } => {
            let mut lm = DynamicModel::new(3);
            lm.load(&model)
                .with_context(|| format!("loading {}", model.display()))?;
            let (counts, totals) = lm.get_counts();
            for (i, (count, total)) in counts.iter().zip(&totals).enumerate() {
                println!("{}-grams: {} unique, {} total", i + 1, count, total);
            }
        }
        Command::Predict {
            model,
            context,
            limit,
            witten_bell,
        } => {
            let mut lm = DynamicModel::new(3);
            lm.load(&model)
                .with_context(|| format!("loading {}", model.display()))?;
            if witten_bell {
                lm.set_smoothing(Smoothing::WittenBellI);
            }

            let mut context: Vec<&str> = context.iter().map(|s| s.as_str()).collect();
            if context.is_empty() {
                context.push("");
            }
            for r in lm.predict(&context, Some(limit), PredictOptions::CASE_INSENSITIVE_SMART) {
                println!("{:.6}  {}", r.p, r.word);
            }
        }
        Command::Learn {
            model,
            tokens,
            order,
        } => {
            let mut lm = DynamicModel::new(order);
            if model.exists() {
                lm.load(&model)
                    .with_context(|| format!("loading {}", model.display()))?;
            }
            lm.learn_tokens(&tokens, true);
            lm.save(&model)
                .with_context(|| format!("saving {}", model.display()))?;
            let (counts, _) = lm.get_counts();
            println!("learned {} tokens, counts now {:?}", tokens.len(), counts);
        }
    }

    Ok(())
}
