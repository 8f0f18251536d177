//! The linear generation workflow: load, complete the sequence, predict the
//! structure, write the PDB.
use anyhow::{anyhow, Result};
use esmgen_plms::{
    device, Esm3InferenceClient, ESMProtein, GenerationConfig, Track, ESM3, ESM3_OPEN_SMALL,
};

pub struct GenerateArgs {
    pub prompt: String,
    pub output: String,
    pub num_steps: usize,
    pub temperature: f64,
    pub cpu: bool,
    pub token: Option<String>,
}

pub fn execute(args: GenerateArgs) -> Result<()> {
    let device = device(args.cpu)?;
    let model = ESM3::from_pretrained(ESM3_OPEN_SMALL, args.token.clone(), &device)?;
    run(&model, &args)
}

/// Runs the workflow against any client. The handle is only borrowed, so
/// one loaded model serves repeated runs.
pub fn run(client: &impl Esm3InferenceClient, args: &GenerateArgs) -> Result<()> {
    let sequence_config = GenerationConfig::new(Track::Sequence)
        .with_num_steps(args.num_steps)
        .with_temperature(args.temperature);
    let protein = client.generate(
        ESMProtein::from_sequence(args.prompt.clone()),
        &sequence_config,
    )?;
    let sequence = protein
        .sequence()
        .ok_or_else(|| anyhow!("model returned a protein without a sequence"))?
        .to_string();
    println!("Generated protein sequence: {sequence}");

    let structure_config = GenerationConfig::new(Track::Structure).with_num_steps(args.num_steps);
    let structure = client.generate(ESMProtein::from_sequence(sequence), &structure_config)?;
    structure.to_pdb(&args.output)?;
    println!("Generated protein structure saved to {}", args.output);
    Ok(())
}
