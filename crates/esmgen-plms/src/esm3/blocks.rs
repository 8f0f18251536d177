//! Transformer block: pre-norm rotary attention plus a SwiGLU feed-forward.
//!
//! Layer naming follows the checkpoint layout
//! (`transformer.blocks.{i}.attn.layernorm_qkv.1.weight`, ...).
use super::config::Esm3Config;
use super::rotary::apply_rotary_emb;
use candle_core::{Module, Result, Tensor, D};
use candle_nn::ops::softmax_last_dim;
use candle_nn::{layer_norm, linear_no_bias, LayerNorm, LayerNormConfig, Linear, VarBuilder};

#[derive(Debug)]
pub struct TransformerBlock {
    qkv_norm: LayerNorm,
    qkv: Linear,
    out_proj: Linear,
    ffn_norm: LayerNorm,
    w12: Linear,
    w3: Linear,
    n_heads: usize,
    d_head: usize,
    residue_scaling_factor: f64,
}

impl TransformerBlock {
    pub fn load(vb: VarBuilder, config: &Esm3Config) -> Result<Self> {
        let d_model = config.d_model;
        let hidden = config.ffn_hidden_dim();
        let ln_conf = LayerNormConfig::from(1e-5);

        let qkv_norm = layer_norm(d_model, ln_conf, vb.pp("attn.layernorm_qkv.0"))?;
        let qkv = linear_no_bias(d_model, d_model * 3, vb.pp("attn.layernorm_qkv.1"))?;
        let out_proj = linear_no_bias(d_model, d_model, vb.pp("attn.out_proj"))?;
        let ffn_norm = layer_norm(d_model, ln_conf, vb.pp("ffn.0"))?;
        let w12 = linear_no_bias(d_model, hidden * 2, vb.pp("ffn.1"))?;
        let w3 = linear_no_bias(hidden, d_model, vb.pp("ffn.3"))?;

        Ok(Self {
            qkv_norm,
            qkv,
            out_proj,
            ffn_norm,
            w12,
            w3,
            n_heads: config.n_heads,
            d_head: config.head_dim(),
            residue_scaling_factor: config.residue_scaling_factor,
        })
    }

    pub fn forward(&self, x: &Tensor, freqs_cis: &Tensor) -> Result<Tensor> {
        let attn = self.attention_block(x, freqs_cis)?;
        let x = (x + (attn / self.residue_scaling_factor)?)?;
        let ff = self.ffn_forward(&x)?;
        &x + (ff / self.residue_scaling_factor)?
    }

    fn attention_block(&self, x: &Tensor, freqs_cis: &Tensor) -> Result<Tensor> {
        let (batch_size, seq_len, d_model) = x.dims3()?;
        let normed = self.qkv_norm.forward(x)?;
        let qkv = self.qkv.forward(&normed)?;
        let chunks = qkv.chunk(3, D::Minus1)?;

        let reshape_heads = |t: &Tensor| -> Result<Tensor> {
            t.reshape((batch_size, seq_len, self.n_heads, self.d_head))
        };
        let xq = reshape_heads(&chunks[0])?.contiguous()?;
        let xk = reshape_heads(&chunks[1])?.contiguous()?;
        let xv = reshape_heads(&chunks[2])?.contiguous()?;

        let (xq, xk) = apply_rotary_emb(&xq, &xk, freqs_cis)?;

        // [batch, heads, seq, head_dim]
        let xq = xq.transpose(1, 2)?.contiguous()?;
        let xk = xk.transpose(1, 2)?.contiguous()?;
        let xv = xv.transpose(1, 2)?.contiguous()?;

        let attn = self.scaled_dot_product_attention(&xq, &xk, &xv)?;
        let attn = attn
            .transpose(1, 2)?
            .reshape((batch_size, seq_len, d_model))?;
        self.out_proj.forward(&attn)
    }

    fn scaled_dot_product_attention(
        &self,
        query: &Tensor,
        key: &Tensor,
        value: &Tensor,
    ) -> Result<Tensor> {
        let scaling = 1.0 / (self.d_head as f64).sqrt();
        let scores = (query.matmul(&key.transpose(D::Minus2, D::Minus1)?)? * scaling)?;
        let attn = softmax_last_dim(&scores)?;
        attn.matmul(value)
    }

    fn ffn_forward(&self, x: &Tensor) -> Result<Tensor> {
        let normed = self.ffn_norm.forward(x)?;
        let w12_out = self.w12.forward(&normed)?;
        let chunks = w12_out.chunk(2, D::Minus1)?;
        // SwiGLU: silu(x1) * x2
        let hidden = chunks[0].silu()?.mul(&chunks[1])?;
        self.w3.forward(&hidden)
    }
}
