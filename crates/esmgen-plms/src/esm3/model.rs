//! The ESM3 inference client: checkpoint loading and track generation.
use super::api::{Esm3InferenceClient, GenerationConfig, GenerationError, Track};
use super::config::Esm3Config;
use super::heads::{RegressionHead, StructureCoordinateHead};
use super::pretrained::{fetch_weights, login};
use super::protein::ESMProtein;
use super::rotary::precompute_freqs_cis;
use super::tokenization::{
    EsmSequenceTokenizer, STRUCTURE_BOS_TOKEN, STRUCTURE_CHAINBREAK_TOKEN, STRUCTURE_EOS_TOKEN,
    STRUCTURE_MASK_TOKEN, STRUCTURE_PAD_TOKEN, VQVAE_CODEBOOK_SIZE,
};
use super::transformer::TransformerStack;
use anyhow::{bail, Result};
use candle_core::pickle::PthTensors;
use candle_core::{DType, Device, IndexOp, Module, Tensor};
use candle_nn::{embedding, Embedding, VarBuilder};
use candle_transformers::generation::LogitsProcessor;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const GENERATION_SEED: u64 = 299792458;

pub struct Esm3Output {
    pub sequence_logits: Tensor,
    pub structure_logits: Tensor,
    pub embeddings: Tensor,
}

/// A loaded ESM3 network. Created once, then shared read-only: `generate`
/// takes `&self`, so a single handle serves both workflow calls.
pub struct ESM3 {
    embed_sequence: Embedding,
    embed_structure: Embedding,
    transformer: TransformerStack,
    sequence_head: RegressionHead,
    structure_head: RegressionHead,
    coordinate_head: StructureCoordinateHead,
    freqs_cis: Tensor,
    tokenizer: EsmSequenceTokenizer,
}

impl ESM3 {
    pub fn load(vb: VarBuilder, config: &Esm3Config) -> Result<Self> {
        let embed_sequence = embedding(
            config.sequence_vocab_size,
            config.d_model,
            vb.pp("encoder.sequence_embed"),
        )?;
        let embed_structure = embedding(
            config.structure_vocab_size,
            config.d_model,
            vb.pp("encoder.structure_embed"),
        )?;
        let transformer = TransformerStack::load(vb.pp("transformer"), config)?;
        let sequence_head = RegressionHead::load(
            vb.pp("output_heads.sequence_head"),
            config.d_model,
            config.sequence_vocab_size,
        )?;
        let structure_head = RegressionHead::load(
            vb.pp("output_heads.structure_head"),
            config.d_model,
            config.structure_vocab_size,
        )?;
        let coordinate_head = StructureCoordinateHead::load(
            vb.pp("output_heads.coordinate_head"),
            config.d_model,
            config.trans_scale_factor,
        )?;
        let freqs_cis = precompute_freqs_cis(config.head_dim(), config.max_seq_len)?
            .to_device(vb.device())?;

        Ok(Self {
            embed_sequence,
            embed_structure,
            transformer,
            sequence_head,
            structure_head,
            coordinate_head,
            freqs_cis,
            tokenizer: EsmSequenceTokenizer::new()?,
        })
    }

    /// Authenticates against the hub, fetches the named checkpoint, and
    /// loads it onto `device`. Auth and retrieval failures propagate; no
    /// generation is possible without the returned handle.
    pub fn from_pretrained(
        model_name: &str,
        token: Option<String>,
        device: &Device,
    ) -> Result<Self> {
        let api = login(token)?;
        let weights_path = fetch_weights(&api, model_name)?;
        let pth = PthTensors::new(weights_path, None)?;
        let vb = VarBuilder::from_backend(Box::new(pth), DType::F32, device.clone());
        Self::load(vb, &Esm3Config::esm3_sm_open_v1())
    }

    pub fn device(&self) -> &Device {
        self.freqs_cis.device()
    }

    pub fn forward(
        &self,
        sequence_tokens: &Tensor,
        structure_tokens: Option<&Tensor>,
    ) -> Result<Esm3Output> {
        let mut x = self.embed_sequence.forward(sequence_tokens)?.contiguous()?;
        if let Some(st) = structure_tokens {
            x = (x + self.embed_structure.forward(st)?)?;
        }
        let freqs_cis = self.freqs_cis.narrow(0, 0, sequence_tokens.dim(1)?)?;
        let (embeddings, _residual) = self.transformer.forward(&x, &freqs_cis)?;
        Ok(Esm3Output {
            sequence_logits: self.sequence_head.forward(&embeddings)?,
            structure_logits: self.structure_head.forward(&embeddings)?,
            embeddings,
        })
    }

    fn generate_sequence(&self, protein: ESMProtein, config: &GenerationConfig) -> Result<ESMProtein> {
        let seed = protein
            .sequence()
            .ok_or(GenerationError::MissingSequence(Track::Sequence))?;
        let mut tokens = self.tokenizer.encode(seed)?;
        if tokens.len() <= 2 {
            bail!("cannot generate from an empty sequence");
        }

        let mask_id = self.tokenizer.mask_token_id();
        let mut masked: Vec<usize> = (1..tokens.len() - 1)
            .filter(|&i| tokens[i] == mask_id)
            .collect();
        let invalid = self.tokenizer.invalid_token_ids();
        let vocab_limit = self.tokenizer.vocab_size();

        let mut sampler = sampler_for(config);
        let mut rng = StdRng::seed_from_u64(GENERATION_SEED);
        for count in unmask_schedule(masked.len(), config.num_steps) {
            if masked.is_empty() {
                break;
            }
            let input = Tensor::new(tokens.as_slice(), self.device())?.unsqueeze(0)?;
            let output = self.forward(&input, None)?;
            for _ in 0..count {
                let j = rng.gen_range(0..masked.len());
                let pos = masked.swap_remove(j);
                let logits = output.sequence_logits.i((0, pos))?;
                let logits = mask_invalid_logits(&logits, &invalid, Some(vocab_limit))?;
                tokens[pos] = sampler.sample(&logits)?;
            }
        }

        let generated = self.tokenizer.decode(&tokens)?;
        Ok(ESMProtein::from_sequence(generated))
    }

    fn generate_structure(
        &self,
        protein: ESMProtein,
        config: &GenerationConfig,
    ) -> Result<ESMProtein> {
        let seed = protein
            .sequence()
            .ok_or(GenerationError::MissingSequence(Track::Structure))?
            .to_string();
        let sequence_tokens = self.tokenizer.encode(&seed)?;
        let len = sequence_tokens.len();
        if len <= 2 {
            bail!("cannot generate a structure for an empty sequence");
        }

        let mut structure_tokens = vec![STRUCTURE_MASK_TOKEN; len];
        structure_tokens[0] = STRUCTURE_BOS_TOKEN;
        structure_tokens[len - 1] = STRUCTURE_EOS_TOKEN;
        let mut masked: Vec<usize> = (1..len - 1).collect();
        let invalid = [
            STRUCTURE_MASK_TOKEN,
            STRUCTURE_BOS_TOKEN,
            STRUCTURE_EOS_TOKEN,
            STRUCTURE_PAD_TOKEN,
            STRUCTURE_CHAINBREAK_TOKEN,
        ];

        let sequence_input = Tensor::new(sequence_tokens.as_slice(), self.device())?.unsqueeze(0)?;
        let mut sampler = sampler_for(config);
        let mut rng = StdRng::seed_from_u64(GENERATION_SEED);
        for count in unmask_schedule(masked.len(), config.num_steps) {
            let structure_input =
                Tensor::new(structure_tokens.as_slice(), self.device())?.unsqueeze(0)?;
            let step = self.forward(&sequence_input, Some(&structure_input))?;
            for _ in 0..count {
                let j = rng.gen_range(0..masked.len());
                let pos = masked.swap_remove(j);
                let logits = step.structure_logits.i((0, pos))?;
                let logits =
                    mask_invalid_logits(&logits, &invalid, Some(VQVAE_CODEBOOK_SIZE as usize))?;
                structure_tokens[pos] = sampler.sample(&logits)?;
            }
        }

        // decode the fully unmasked trunk state into backbone coordinates
        let structure_input =
            Tensor::new(structure_tokens.as_slice(), self.device())?.unsqueeze(0)?;
        let final_output = self.forward(&sequence_input, Some(&structure_input))?;
        let (coords, plddt) = self.coordinate_head.forward(&final_output.embeddings)?;
        let coords = coords.narrow(1, 1, len - 2)?.squeeze(0)?;
        let plddt = plddt.narrow(1, 1, len - 2)?.squeeze(0)?;

        Ok(ESMProtein::from_sequence(seed)
            .with_coordinates(coords)
            .with_plddt(plddt))
    }
}

impl Esm3InferenceClient for ESM3 {
    fn generate(&self, protein: ESMProtein, config: &GenerationConfig) -> Result<ESMProtein> {
        config.validate()?;
        match config.track {
            Track::Sequence => self.generate_sequence(protein, config),
            Track::Structure => self.generate_structure(protein, config),
        }
    }
}

fn sampler_for(config: &GenerationConfig) -> LogitsProcessor {
    let temperature = (config.temperature > 0.0).then_some(config.temperature);
    let top_p = (config.top_p < 1.0).then_some(config.top_p);
    LogitsProcessor::new(GENERATION_SEED, temperature, top_p)
}

/// Rules out special and padding ids before sampling by pinning their
/// logits to negative infinity.
fn mask_invalid_logits(
    logits: &Tensor,
    invalid_ids: &[u32],
    vocab_limit: Option<usize>,
) -> Result<Tensor> {
    let vocab = logits.dim(0)?;
    let mut penalty = vec![0f32; vocab];
    for &id in invalid_ids {
        if (id as usize) < vocab {
            penalty[id as usize] = f32::NEG_INFINITY;
        }
    }
    if let Some(limit) = vocab_limit {
        for p in penalty.iter_mut().skip(limit) {
            *p = f32::NEG_INFINITY;
        }
    }
    let penalty = Tensor::from_vec(penalty, vocab, logits.device())?;
    Ok((logits.to_dtype(DType::F32)? + penalty)?)
}

/// Cosine unmasking schedule: how many positions to reveal at each step so
/// that everything is revealed by the last one.
fn unmask_schedule(total_masked: usize, num_steps: usize) -> Vec<usize> {
    let mut remaining = total_masked;
    let mut counts = Vec::with_capacity(num_steps);
    for step in 1..=num_steps {
        let target = if step == num_steps {
            0
        } else {
            let frac =
                (std::f64::consts::FRAC_PI_2 * step as f64 / num_steps as f64).cos();
            ((total_masked as f64 * frac).floor() as usize).min(remaining)
        };
        counts.push(remaining - target);
        remaining = target;
    }
    counts
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tiny_config() -> Esm3Config {
        Esm3Config {
            d_model: 32,
            n_heads: 2,
            n_layers: 1,
            expansion_ratio: 2.0,
            sequence_vocab_size: 64,
            structure_vocab_size: 4101,
            max_seq_len: 64,
            residue_scaling_factor: 1.0,
            trans_scale_factor: 10.0,
        }
    }

    fn tiny_model() -> ESM3 {
        let vb = VarBuilder::zeros(DType::F32, &Device::Cpu);
        ESM3::load(vb, &tiny_config()).unwrap()
    }

    #[test]
    fn test_unmask_schedule_sums_to_total() {
        for (total, steps) in [(0, 8), (1, 8), (10, 3), (150, 8), (5, 1)] {
            let schedule = unmask_schedule(total, steps);
            assert_eq!(schedule.len(), steps);
            assert_eq!(schedule.iter().sum::<usize>(), total);
        }
    }

    #[test]
    fn test_unmask_schedule_single_step_reveals_all() {
        assert_eq!(unmask_schedule(42, 1), vec![42]);
    }

    #[test]
    fn test_mask_invalid_logits() {
        let logits = Tensor::zeros(8, DType::F32, &Device::Cpu).unwrap();
        let masked = mask_invalid_logits(&logits, &[0, 2], Some(6)).unwrap();
        let values = masked.to_vec1::<f32>().unwrap();
        assert!(values[0].is_infinite() && values[0] < 0.0);
        assert!(values[2].is_infinite() && values[2] < 0.0);
        assert_eq!(values[1], 0.0);
        assert!(values[6].is_infinite() && values[7].is_infinite());
    }

    #[test]
    fn test_sequence_generation_fills_masks() {
        let model = tiny_model();
        let config = GenerationConfig::new(Track::Sequence)
            .with_num_steps(4)
            .with_temperature(0.7);
        let protein = ESMProtein::from_sequence("MK__TL__A");
        let generated = model.generate(protein, &config).unwrap();
        let sequence = generated.sequence().unwrap();
        assert_eq!(sequence.len(), 9);
        assert!(!sequence.contains('_'));
        assert_eq!(&sequence[..2], "MK");
    }

    #[test]
    fn test_fully_specified_seed_passes_through() {
        let model = tiny_model();
        let config = GenerationConfig::new(Track::Sequence)
            .with_num_steps(8)
            .with_temperature(0.7);
        let protein = ESMProtein::from_sequence("MKTAYIAK");
        let generated = model.generate(protein, &config).unwrap();
        assert_eq!(generated.sequence().unwrap(), "MKTAYIAK");
    }

    #[test]
    fn test_structure_generation_populates_coordinates() {
        let model = tiny_model();
        let config = GenerationConfig::new(Track::Structure).with_num_steps(2);
        let protein = ESMProtein::from_sequence("MKTAY");
        let generated = model.generate(protein, &config).unwrap();
        let coords = generated.coordinates().unwrap();
        assert_eq!(coords.dims(), &[5, 4, 3]);
        assert_eq!(generated.plddt().unwrap().dims(), &[5]);
        assert_eq!(generated.sequence().unwrap(), "MKTAY");
    }

    #[test]
    fn test_handle_is_reusable() {
        let model = tiny_model();
        let config = GenerationConfig::new(Track::Sequence).with_num_steps(2);
        for _ in 0..2 {
            let out = model
                .generate(ESMProtein::from_sequence("A_C"), &config)
                .unwrap();
            assert_eq!(out.sequence().unwrap().len(), 3);
        }
    }

    #[test]
    fn test_invalid_config_rejected_before_inference() {
        let model = tiny_model();
        let config = GenerationConfig::new(Track::Sequence).with_num_steps(0);
        assert!(model
            .generate(ESMProtein::from_sequence("MKT"), &config)
            .is_err());
    }
}
