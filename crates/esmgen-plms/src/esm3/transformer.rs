//! A stack of transformer blocks over the track embeddings.
use super::blocks::TransformerBlock;
use super::config::Esm3Config;
use candle_core::{Module, Result, Tensor};
use candle_nn::{layer_norm, LayerNorm, LayerNormConfig, VarBuilder};

pub struct TransformerStack {
    blocks: Vec<TransformerBlock>,
    norm: LayerNorm,
}

impl TransformerStack {
    pub fn load(vb: VarBuilder, config: &Esm3Config) -> Result<Self> {
        let mut blocks = Vec::with_capacity(config.n_layers);
        for i in 0..config.n_layers {
            blocks.push(TransformerBlock::load(vb.pp("blocks").pp(i), config)?);
        }
        let ln_conf = LayerNormConfig::from(1e-5);
        let norm = layer_norm(config.d_model, ln_conf, vb.pp("norm"))?;
        Ok(Self { blocks, norm })
    }

    /// Returns the normalized embeddings along with the raw residual stream.
    pub fn forward(&self, x: &Tensor, freqs_cis: &Tensor) -> Result<(Tensor, Tensor)> {
        let mut x = x.clone();
        for block in self.blocks.iter() {
            x = block.forward(&x, freqs_cis)?;
        }
        let normalized = self.norm.forward(&x)?;
        Ok((normalized, x))
    }
}
