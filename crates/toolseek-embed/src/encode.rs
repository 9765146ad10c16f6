use candle_core::{Device, Tensor};
use tokenizers::Tokenizer;

use toolseek_core::EmbedError;

/// XLM-RoBERTa `<pad>` id.
pub const PAD_ID: u32 = 1;

/// Encode a batch into `[B, T]` id and mask tensors, truncated to `max_len`
/// and right-padded to the longest sequence in the batch.
pub fn encode_batch(
    tokenizer: &Tokenizer,
    texts: &[String],
    max_len: usize,
    device: &Device,
) -> Result<(Tensor, Tensor), EmbedError> {
    let encodings = tokenizer
        .encode_batch(texts.to_vec(), true)
        .map_err(|e| EmbedError::Permanent(format!("tokenization failed: {e}")))?;
    let seq_len = encodings.iter().map(|e| e.get_ids().len().min(max_len)).max().unwrap_or(0).max(1);
    let mut ids = Vec::with_capacity(encodings.len() * seq_len);
    let mut mask = Vec::with_capacity(encodings.len() * seq_len);
    for enc in &encodings {
        let take = enc.get_ids().len().min(seq_len);
        ids.extend_from_slice(&enc.get_ids()[..take]);
        mask.extend_from_slice(&enc.get_attention_mask()[..take]);
        ids.extend(std::iter::repeat(PAD_ID).take(seq_len - take));
        mask.extend(std::iter::repeat(0u32).take(seq_len - take));
    }
    let shape = (encodings.len(), seq_len);
    let input_ids = Tensor::from_vec(ids, shape, device).map_err(crate::model_err)?;
    let attention_mask = Tensor::from_vec(mask, shape, device).map_err(crate::model_err)?;
    Ok((input_ids, attention_mask))
}
