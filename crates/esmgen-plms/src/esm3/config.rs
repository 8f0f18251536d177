use serde::{Deserialize, Serialize};

/// Network hyperparameters for an ESM3 checkpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Esm3Config {
    pub d_model: usize,
    pub n_heads: usize,
    pub n_layers: usize,
    /// FFN expansion used by the SwiGLU blocks.
    pub expansion_ratio: f64,
    /// Sequence embedding rows in the checkpoint (vocab padded to 64).
    pub sequence_vocab_size: usize,
    /// VQ-VAE codebook plus the five structure special tokens.
    pub structure_vocab_size: usize,
    pub max_seq_len: usize,
    pub residue_scaling_factor: f64,
    /// Scale applied to predicted backbone translations (Angstroms).
    pub trans_scale_factor: f64,
}

impl Esm3Config {
    /// The `esm3_sm_open_v1` open-small checkpoint.
    pub fn esm3_sm_open_v1() -> Self {
        Self {
            d_model: 1536,
            n_heads: 24,
            n_layers: 48,
            expansion_ratio: 8.0 / 3.0,
            sequence_vocab_size: 64,
            structure_vocab_size: 4096 + 5,
            max_seq_len: 2048,
            residue_scaling_factor: (48f64 / 36.0).sqrt(),
            trans_scale_factor: 10.0,
        }
    }

    pub fn head_dim(&self) -> usize {
        self.d_model / self.n_heads
    }

    pub fn ffn_hidden_dim(&self) -> usize {
        // round to a multiple of 8, matching the checkpoint shapes
        let raw = (self.d_model as f64 * self.expansion_ratio) as usize;
        let multiple_of = 8;
        multiple_of * ((raw + multiple_of - 1) / multiple_of)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_small_shapes() {
        let config = Esm3Config::esm3_sm_open_v1();
        assert_eq!(config.head_dim(), 64);
        assert_eq!(config.ffn_hidden_dim(), 4096);
        assert_eq!(config.structure_vocab_size, 4101);
    }
}
