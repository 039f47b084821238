//! BPE encoders from tiktoken-rs, shared per tokenizer for the process lifetime.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock};

use tiktoken_rs::CoreBPE;
use tiktoken_rs::tokenizer::{Tokenizer, get_tokenizer};

use super::TokenError;

/// Anything that can report how many tokens a string encodes to.
pub trait TokenEncoder {
    fn encoded_len(&self, text: &str) -> usize;
}

impl TokenEncoder for CoreBPE {
    fn encoded_len(&self, text: &str) -> usize {
        self.encode_ordinary(text).len()
    }
}

/// Tokenizer used when the model name is unknown to tiktoken.
const FALLBACK_TOKENIZER: Tokenizer = Tokenizer::Cl100kBase;

static ENCODERS: OnceLock<Mutex<HashMap<Tokenizer, Arc<CoreBPE>>>> = OnceLock::new();

/// Tokenizer for a model name, falling back to cl100k_base with a warning.
pub fn tokenizer_for_model(model: &str) -> Tokenizer {
    get_tokenizer(model).unwrap_or_else(|| {
        log::warn!("model {} not found; using cl100k_base encoding", model);
        FALLBACK_TOKENIZER
    })
}

/// Encoder for a model name. Built once per tokenizer and cached.
pub fn encoder_for_model(model: &str) -> Result<Arc<CoreBPE>, TokenError> {
    let tokenizer = tokenizer_for_model(model);
    let cache = ENCODERS.get_or_init(|| Mutex::new(HashMap::new()));
    let mut cache = cache
        .lock()
        .map_err(|_| TokenError::Encoding("encoder cache poisoned".to_string()))?;
    if let Some(bpe) = cache.get(&tokenizer) {
        return Ok(Arc::clone(bpe));
    }
    let bpe = tiktoken_rs::get_bpe_from_tokenizer(tokenizer)
        .map_err(|e| TokenError::Encoding(e.to_string()))?;
    let bpe = Arc::new(bpe);
    cache.insert(tokenizer, Arc::clone(&bpe));
    Ok(bpe)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_chat_models_use_cl100k() {
        assert_eq!(tokenizer_for_model("gpt-4-0613"), Tokenizer::Cl100kBase);
        assert_eq!(tokenizer_for_model("gpt-3.5-turbo"), Tokenizer::Cl100kBase);
    }

    #[test]
    fn unknown_model_falls_back_without_error() {
        assert_eq!(tokenizer_for_model("not-a-real-model"), FALLBACK_TOKENIZER);
        let bpe = encoder_for_model("not-a-real-model").unwrap();
        assert!(bpe.encoded_len("hello world") > 0);
    }

    #[test]
    fn encoder_is_cached() {
        let a = encoder_for_model("gpt-4-0613").unwrap();
        let b = encoder_for_model("gpt-3.5-turbo-16k-0613").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn empty_text_has_no_tokens() {
        let bpe = encoder_for_model("gpt-4-0613").unwrap();
        assert_eq!(bpe.encoded_len(""), 0);
    }
}
