//! Residue-level tokenization for the ESM3 sequence track.
use anyhow::{Error as E, Result};
use tokenizers::models::wordlevel::WordLevel;
use tokenizers::Tokenizer;

pub const SEQUENCE_VOCAB: &[&str] = &[
    "<cls>", "<pad>", "<eos>", "<unk>", "L", "A", "G", "V", "S", "E", "R", "T", "I", "D", "P", "K",
    "Q", "N", "F", "Y", "M", "H", "W", "C", "X", "B", "U", "Z", "O", ".", "-", "|", "<mask>",
];

pub const MASK_STR_SHORT: &str = "_";
pub const CHAIN_BREAK_STR: &str = "|";

pub const VQVAE_CODEBOOK_SIZE: u32 = 4096;
pub const STRUCTURE_MASK_TOKEN: u32 = VQVAE_CODEBOOK_SIZE;
pub const STRUCTURE_EOS_TOKEN: u32 = VQVAE_CODEBOOK_SIZE + 1;
pub const STRUCTURE_BOS_TOKEN: u32 = VQVAE_CODEBOOK_SIZE + 2;
pub const STRUCTURE_PAD_TOKEN: u32 = VQVAE_CODEBOOK_SIZE + 3;
pub const STRUCTURE_CHAINBREAK_TOKEN: u32 = VQVAE_CODEBOOK_SIZE + 4;

/// One token per residue over `SEQUENCE_VOCAB`, with cls/eos framing and
/// `_` standing in for a masked position.
pub struct EsmSequenceTokenizer {
    tokenizer: Tokenizer,
}

impl EsmSequenceTokenizer {
    pub fn new() -> Result<Self> {
        let model = WordLevel::builder()
            .vocab(
                SEQUENCE_VOCAB
                    .iter()
                    .enumerate()
                    .map(|(i, tok)| (tok.to_string(), i as u32))
                    .collect(),
            )
            .unk_token("<unk>".to_string())
            .build()
            .map_err(E::msg)?;
        Ok(Self {
            tokenizer: Tokenizer::new(model),
        })
    }

    fn id_of(&self, token: &str) -> u32 {
        self.tokenizer.token_to_id(token).unwrap_or(0)
    }

    pub fn cls_token_id(&self) -> u32 {
        self.id_of("<cls>")
    }

    pub fn pad_token_id(&self) -> u32 {
        self.id_of("<pad>")
    }

    pub fn eos_token_id(&self) -> u32 {
        self.id_of("<eos>")
    }

    pub fn unk_token_id(&self) -> u32 {
        self.id_of("<unk>")
    }

    pub fn mask_token_id(&self) -> u32 {
        self.id_of("<mask>")
    }

    pub fn chain_break_token_id(&self) -> u32 {
        self.id_of(CHAIN_BREAK_STR)
    }

    pub fn vocab_size(&self) -> usize {
        SEQUENCE_VOCAB.len()
    }

    /// Token ids that sequence sampling must never emit.
    pub fn invalid_token_ids(&self) -> Vec<u32> {
        vec![
            self.cls_token_id(),
            self.pad_token_id(),
            self.eos_token_id(),
            self.unk_token_id(),
            self.mask_token_id(),
            self.chain_break_token_id(),
            self.id_of("."),
            self.id_of("-"),
        ]
    }

    /// Encodes a sequence string to ids framed by cls and eos.
    pub fn encode(&self, sequence: &str) -> Result<Vec<u32>> {
        let mut ids = Vec::with_capacity(sequence.chars().count() + 2);
        ids.push(self.cls_token_id());
        for c in sequence.chars() {
            if c.to_string() == MASK_STR_SHORT {
                ids.push(self.mask_token_id());
            } else {
                let id = self
                    .tokenizer
                    .token_to_id(&c.to_string())
                    .unwrap_or_else(|| self.unk_token_id());
                ids.push(id);
            }
        }
        ids.push(self.eos_token_id());
        Ok(ids)
    }

    /// Decodes ids back to a sequence string, dropping the cls/eos frame and
    /// rendering masked positions as `_`.
    pub fn decode(&self, ids: &[u32]) -> Result<String> {
        let mut sequence = String::with_capacity(ids.len());
        for &id in ids {
            if id == self.cls_token_id() || id == self.eos_token_id() || id == self.pad_token_id()
            {
                continue;
            }
            if id == self.mask_token_id() {
                sequence.push_str(MASK_STR_SHORT);
                continue;
            }
            match self.tokenizer.id_to_token(id) {
                Some(tok) if tok.len() == 1 => sequence.push_str(&tok),
                Some(_) | None => sequence.push('X'),
            }
        }
        Ok(sequence)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_frames_with_cls_eos() {
        let tok = EsmSequenceTokenizer::new().unwrap();
        let ids = tok.encode("MKT").unwrap();
        assert_eq!(ids.len(), 5);
        assert_eq!(ids[0], tok.cls_token_id());
        assert_eq!(*ids.last().unwrap(), tok.eos_token_id());
    }

    #[test]
    fn test_roundtrip() {
        let tok = EsmSequenceTokenizer::new().unwrap();
        let seq = "DQATSLRILNNGHAFNVEF";
        let ids = tok.encode(seq).unwrap();
        assert_eq!(tok.decode(&ids).unwrap(), seq);
    }

    #[test]
    fn test_mask_character() {
        let tok = EsmSequenceTokenizer::new().unwrap();
        let ids = tok.encode("A_C").unwrap();
        assert_eq!(ids[2], tok.mask_token_id());
        assert_eq!(tok.decode(&ids).unwrap(), "A_C");
    }

    #[test]
    fn test_unknown_residue_maps_to_unk() {
        let tok = EsmSequenceTokenizer::new().unwrap();
        let ids = tok.encode("J").unwrap();
        assert_eq!(ids[1], tok.unk_token_id());
    }

    #[test]
    fn test_invalid_ids_cover_specials() {
        let tok = EsmSequenceTokenizer::new().unwrap();
        let invalid = tok.invalid_token_ids();
        assert!(invalid.contains(&tok.mask_token_id()));
        assert!(invalid.contains(&tok.cls_token_id()));
        // all twenty canonical residues stay sampleable
        for aa in "ACDEFGHIKLMNPQRSTVWY".chars() {
            let id = tok.encode(&aa.to_string()).unwrap()[1];
            assert!(!invalid.contains(&id), "residue {aa} marked invalid");
        }
    }
}
