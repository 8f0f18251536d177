use anyhow::{bail, Result};
use candle_core::{DType, Device, Tensor};
use esmgen::commands::generate::{run, GenerateArgs};
use esmgen_plms::{Esm3InferenceClient, ESMProtein, GenerationConfig, Track};
use std::cell::RefCell;

const SEED_SEQUENCE: &str = "DQATSLRILNNGHAFNVEFDDSQDKAVLKGGPLDGTYRLIQFHFHWGSLDGQGSEHTVDKKKYAAELHLVHWNTKYGDFGKAVQQPDGLAVLGIFLKVGSAKPGLQKVVDVLDSIKTKGKSADFTNFDPRGLLPESLDYWTYPGSLTTPP";

/// Stands in for a loaded model; records which tracks were requested.
struct StubClient {
    fail_on_sequence: bool,
    calls: RefCell<Vec<Track>>,
}

impl StubClient {
    fn new() -> Self {
        Self {
            fail_on_sequence: false,
            calls: RefCell::new(Vec::new()),
        }
    }

    fn failing() -> Self {
        Self {
            fail_on_sequence: true,
            calls: RefCell::new(Vec::new()),
        }
    }
}

impl Esm3InferenceClient for StubClient {
    fn generate(&self, protein: ESMProtein, config: &GenerationConfig) -> Result<ESMProtein> {
        self.calls.borrow_mut().push(config.track);
        match config.track {
            Track::Sequence => {
                if self.fail_on_sequence {
                    bail!("device memory exhausted");
                }
                let seed = protein.sequence().unwrap();
                Ok(ESMProtein::from_sequence(seed.replace('_', "A")))
            }
            Track::Structure => {
                let len = protein.len();
                let coords = Tensor::ones((len, 4, 3), DType::F32, &Device::Cpu)?;
                let plddt = Tensor::full(0.9f32, (len,), &Device::Cpu)?;
                Ok(protein.with_coordinates(coords).with_plddt(plddt))
            }
        }
    }
}

fn args_for(output: &std::path::Path) -> GenerateArgs {
    GenerateArgs {
        prompt: SEED_SEQUENCE.to_string(),
        output: output.to_str().unwrap().to_string(),
        num_steps: 8,
        temperature: 0.7,
        cpu: true,
        token: None,
    }
}

#[test]
fn test_workflow_writes_structure_file() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("generated_structure.pdb");
    let client = StubClient::new();

    run(&client, &args_for(&output)).unwrap();

    let text = std::fs::read_to_string(&output).unwrap();
    assert!(text.lines().any(|l| l.starts_with("ATOM")));
    assert_eq!(
        client.calls.borrow().as_slice(),
        &[Track::Sequence, Track::Structure]
    );
}

#[test]
fn test_sequence_output_feeds_structure_input() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("out.pdb");
    let client = StubClient::new();
    let mut args = args_for(&output);
    args.prompt = "MK__TL".to_string();

    run(&client, &args).unwrap();

    // four backbone atoms per residue of the completed sequence
    let text = std::fs::read_to_string(&output).unwrap();
    let atoms = text.lines().filter(|l| l.starts_with("ATOM")).count();
    assert_eq!(atoms, 6 * 4);
}

#[test]
fn test_failed_sequence_generation_stops_workflow() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("never_written.pdb");
    let client = StubClient::failing();

    let result = run(&client, &args_for(&output));

    assert!(result.is_err());
    assert_eq!(client.calls.borrow().as_slice(), &[Track::Sequence]);
    assert!(!output.exists());
}

#[test]
fn test_client_handle_is_reusable() {
    let dir = tempfile::tempdir().unwrap();
    let client = StubClient::new();

    for name in ["first.pdb", "second.pdb"] {
        let output = dir.path().join(name);
        run(&client, &args_for(&output)).unwrap();
        assert!(output.exists());
    }
    assert_eq!(client.calls.borrow().len(), 4);
}
