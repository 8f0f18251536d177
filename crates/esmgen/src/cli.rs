use super::commands;
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a protein sequence from a seed prompt and predict its
    /// structure, writing the result as a PDB file.
    Generate {
        /// Seed amino-acid sequence; `_` marks positions to fill in.
        #[arg(long)]
        prompt: String,

        /// Output path for the predicted structure.
        #[arg(long, default_value = "./generated_structure.pdb")]
        output: String,

        /// Iterative refinement steps per generation call.
        #[arg(long, default_value_t = 8)]
        num_steps: usize,

        /// Sampling temperature for the sequence track.
        #[arg(long, default_value_t = 0.7)]
        temperature: f64,

        /// Run on CPU rather than on GPU.
        #[arg(long)]
        cpu: bool,

        /// Hugging Face access token (falls back to HF_TOKEN, the cached
        /// hub credential, or an interactive prompt).
        #[arg(long)]
        token: Option<String>,
    },
}

impl Cli {
    pub fn execute(self) -> anyhow::Result<()> {
        match self.command {
            Commands::Generate {
                prompt,
                output,
                num_steps,
                temperature,
                cpu,
                token,
            } => commands::generate::execute(commands::generate::GenerateArgs {
                prompt,
                output,
                num_steps,
                temperature,
                cpu,
                token,
            }),
        }
    }
}
