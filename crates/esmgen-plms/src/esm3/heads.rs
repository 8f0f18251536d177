//! Output heads over the trunk embeddings.
use candle_core::{Module, Result, Tensor, D};
use candle_nn::ops::sigmoid;
use candle_nn::{layer_norm, linear, LayerNorm, LayerNormConfig, Linear, VarBuilder};

/// Dense -> GELU -> LayerNorm -> projection, the checkpoint's
/// `Sequential(0, 1, 2, 3)` regression head layout.
#[derive(Debug)]
pub struct RegressionHead {
    dense: Linear,
    norm: LayerNorm,
    proj: Linear,
}

impl RegressionHead {
    pub fn load(vb: VarBuilder, d_model: usize, output_dim: usize) -> Result<Self> {
        let ln_conf = LayerNormConfig::from(1e-5);
        Ok(Self {
            dense: linear(d_model, d_model, vb.pp("0"))?,
            norm: layer_norm(d_model, ln_conf, vb.pp("2"))?,
            proj: linear(d_model, output_dim, vb.pp("3"))?,
        })
    }

    pub fn forward(&self, x: &Tensor) -> Result<Tensor> {
        let x = self.dense.forward(x)?.gelu()?;
        let x = self.norm.forward(&x)?;
        self.proj.forward(&x)
    }
}

/// Projects trunk embeddings to per-residue backbone coordinates
/// (N, CA, C, O) and a pLDDT confidence estimate.
#[derive(Debug)]
pub struct StructureCoordinateHead {
    ffn1: Linear,
    norm: LayerNorm,
    proj: Linear,
    plddt_head: Linear,
    trans_scale_factor: f64,
}

impl StructureCoordinateHead {
    pub fn load(vb: VarBuilder, d_model: usize, trans_scale_factor: f64) -> Result<Self> {
        let ln_conf = LayerNormConfig::from(1e-5);
        Ok(Self {
            ffn1: linear(d_model, d_model, vb.pp("ffn1"))?,
            norm: layer_norm(d_model, ln_conf, vb.pp("norm"))?,
            proj: linear(d_model, 4 * 3, vb.pp("proj"))?,
            plddt_head: linear(d_model, 1, vb.pp("plddt_head"))?,
            trans_scale_factor,
        })
    }

    /// Input `[batch, seq, d_model]`; returns coordinates
    /// `[batch, seq, 4, 3]` in Angstroms and pLDDT `[batch, seq]`.
    pub fn forward(&self, x: &Tensor) -> Result<(Tensor, Tensor)> {
        let (batch, seq_len, _) = x.dims3()?;
        let x = self.ffn1.forward(x)?.gelu()?;
        let x = self.norm.forward(&x)?;

        let coords = (self.proj.forward(&x)? * self.trans_scale_factor)?
            .reshape((batch, seq_len, 4, 3))?;
        let plddt = sigmoid(&self.plddt_head.forward(&x)?)?.squeeze(D::Minus1)?;
        Ok((coords, plddt))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::{DType, Device};

    #[test]
    fn test_regression_head_shape() {
        let vb = VarBuilder::zeros(DType::F32, &Device::Cpu);
        let head = RegressionHead::load(vb, 32, 64).unwrap();
        let x = Tensor::randn(0f32, 1f32, (1, 5, 32), &Device::Cpu).unwrap();
        let out = head.forward(&x).unwrap();
        assert_eq!(out.dims(), &[1, 5, 64]);
    }

    #[test]
    fn test_structure_head_shapes() {
        let vb = VarBuilder::zeros(DType::F32, &Device::Cpu);
        let head = StructureCoordinateHead::load(vb, 32, 10.0).unwrap();
        let x = Tensor::randn(0f32, 1f32, (1, 7, 32), &Device::Cpu).unwrap();
        let (coords, plddt) = head.forward(&x).unwrap();
        assert_eq!(coords.dims(), &[1, 7, 4, 3]);
        assert_eq!(plddt.dims(), &[1, 7]);
    }
}
