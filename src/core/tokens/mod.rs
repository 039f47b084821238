//! Token accounting for chat messages.
//!
//! Each message costs its framing overhead plus the encoded length of every
//! field it carries (role, content, and name when present). The reply priming
//! (`<|start|>assistant<|message|>`) is charged once per call to
//! [`count_message_tokens`], so counting two halves of a list separately
//! over-counts by exactly [`PRIMING_TOKENS`].

mod encoding;
mod framing;

pub use encoding::{TokenEncoder, encoder_for_model, tokenizer_for_model};
pub use framing::{MessageFraming, ResolvedFraming, resolve_family, resolve_framing};

use crate::core::conversation::Message;

/// Tokens every reply is primed with.
pub const PRIMING_TOKENS: usize = 3;

/// Errors from token accounting.
#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error(
        "Token counting is not implemented for model {0}. Supported families: gpt-3.5-turbo, gpt-4"
    )]
    UnsupportedModel(String),
    #[error("Tokenizer unavailable: {0}")]
    Encoding(String),
}

/// Count the tokens `messages` occupy in a request to `model`.
///
/// An empty list costs `PRIMING_TOKENS`.
pub fn count_message_tokens(messages: &[Message], model: &str) -> Result<usize, TokenError> {
    let resolved = resolve_framing(model)?;
    let encoder = encoder_for_model(&resolved.model)?;
    Ok(count_with(messages, resolved.framing, encoder.as_ref()))
}

/// Count with an explicit framing and encoder.
pub fn count_with(
    messages: &[Message],
    framing: MessageFraming,
    encoder: &dyn TokenEncoder,
) -> usize {
    let mut total: i64 = 0;
    for message in messages {
        total += framing.tokens_per_message;
        total += encoder.encoded_len(message.role.as_str()) as i64;
        total += encoder.encoded_len(&message.content) as i64;
        if let Some(name) = &message.name {
            total += encoder.encoded_len(name) as i64;
            total += framing.tokens_per_name;
        }
    }
    total += PRIMING_TOKENS as i64;
    total.max(0) as usize
}

/// Tokens left in `context_window` after the prompt is counted.
pub fn remaining_context(
    messages: &[Message],
    model: &str,
    context_window: usize,
) -> Result<usize, TokenError> {
    Ok(context_window.saturating_sub(count_message_tokens(messages, model)?))
}
