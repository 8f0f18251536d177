//! Rotary positional embeddings for the attention blocks.
use candle_core::{Device, Result, Tensor, D};

pub fn precompute_freqs_cis(head_dim: usize, seq_len: usize) -> Result<Tensor> {
    let theta: f32 = 10000.0;

    let freqs = (0..head_dim / 2).map(|i| 1.0 / theta.powf((2 * i) as f32 / head_dim as f32));
    let freqs = Tensor::from_iter(freqs, &Device::Cpu)?;

    let t = (0..seq_len).map(|x| x as f32);
    let t = Tensor::from_iter(t, &Device::Cpu)?;

    // outer product: [seq_len, head_dim / 2]
    let freqs = t.unsqueeze(1)?.matmul(&freqs.unsqueeze(0)?)?;

    let freqs_cos = freqs.cos()?;
    let freqs_sin = freqs.sin()?;
    Tensor::stack(&[freqs_cos, freqs_sin], D::Minus1)
}

/// Rotates query and key tensors of shape `[batch, seq, heads, head_dim]`.
pub fn apply_rotary_emb(xq: &Tensor, xk: &Tensor, freqs_cis: &Tensor) -> Result<(Tensor, Tensor)> {
    let (b_sz, seq_len, h, headdim) = xq.dims4()?;
    let complex_dim = 2;
    let half_headdim = headdim / complex_dim;

    let freqs_cis = freqs_cis.narrow(0, 0, seq_len)?;
    let freqs_cis = freqs_cis
        .reshape((seq_len, half_headdim, complex_dim))?
        .unsqueeze(0)?
        .unsqueeze(2)?
        .expand((b_sz, seq_len, h, half_headdim, complex_dim))?;
    let freqs_cos = freqs_cis.narrow(4, 0, 1)?.squeeze(4)?;
    let freqs_sin = freqs_cis.narrow(4, 1, 1)?.squeeze(4)?;

    let complex_mul = |x: &Tensor| -> Result<Tensor> {
        let x = x.reshape((b_sz, seq_len, h, half_headdim, complex_dim))?;
        let real = x.narrow(4, 0, 1)?.squeeze(4)?;
        let imag = x.narrow(4, 1, 1)?.squeeze(4)?;

        let out_real = real.mul(&freqs_cos)?.sub(&imag.mul(&freqs_sin)?)?;
        let out_imag = real.mul(&freqs_sin)?.add(&imag.mul(&freqs_cos)?)?;

        Tensor::stack(&[out_real, out_imag], 4)?.reshape((b_sz, seq_len, h, headdim))
    };

    Ok((complex_mul(xq)?, complex_mul(xk)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_freqs_shape() {
        let freqs = precompute_freqs_cis(64, 16).unwrap();
        assert_eq!(freqs.dims(), &[16, 32, 2]);
    }

    #[test]
    fn test_rotation_preserves_shape_and_norm() {
        let device = Device::Cpu;
        let xq = Tensor::randn(0f32, 1f32, (1, 8, 2, 16), &device).unwrap();
        let xk = Tensor::randn(0f32, 1f32, (1, 8, 2, 16), &device).unwrap();
        let freqs = precompute_freqs_cis(16, 8).unwrap();

        let (rq, rk) = apply_rotary_emb(&xq, &xk, &freqs).unwrap();
        assert_eq!(rq.dims(), xq.dims());
        assert_eq!(rk.dims(), xk.dims());

        // rotation is norm-preserving
        let norm_in = xq.sqr().unwrap().sum_all().unwrap().to_scalar::<f32>().unwrap();
        let norm_out = rq.sqr().unwrap().sum_all().unwrap().to_scalar::<f32>().unwrap();
        assert!((norm_in - norm_out).abs() < 1e-3);
    }
}
