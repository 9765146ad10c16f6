use candle_core::{Result, Tensor};

/// Mean of the unmasked token states per sequence, L2-normalised.
///
/// `hidden` is `[B, T, H]`, `attention_mask` is `[B, T]` with 1 for real tokens;
/// the result is `[B, H]`.
pub fn masked_mean_l2(hidden: &Tensor, attention_mask: &Tensor) -> Result<Tensor> {
    let (batch, seq_len, _) = hidden.dims3()?;
    let (mask_batch, mask_len) = attention_mask.dims2()?;
    if (batch, seq_len) != (mask_batch, mask_len) {
        candle_core::bail!("mask shape ({mask_batch}, {mask_len}) does not match hidden ({batch}, {seq_len})");
    }
    let mask = attention_mask.to_device(hidden.device())?.to_dtype(hidden.dtype())?.unsqueeze(2)?;
    let summed = hidden.broadcast_mul(&mask)?.sum(1)?;
    let counts = mask.sum(1)?.clamp(1e-9f64, f64::MAX)?;
    let mean = summed.broadcast_div(&counts)?;
    let norm = mean.sqr()?.sum_keepdim(1)?.sqrt()?.clamp(1e-12f64, f64::MAX)?;
    mean.broadcast_div(&norm)
}
