//! Per-model message framing overhead, with one-hop family pinning.

use super::TokenError;

/// Tokens charged per message and per `name` field.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MessageFraming {
    pub tokens_per_message: i64,
    pub tokens_per_name: i64,
}

/// `<|start|>{role/name}\n{content}<|end|>\n` framing of current chat models.
const CHAT: MessageFraming = MessageFraming {
    tokens_per_message: 3,
    tokens_per_name: 1,
};

/// gpt-3.5-turbo-0301: role is omitted when a name is present.
const LEGACY: MessageFraming = MessageFraming {
    tokens_per_message: 4,
    tokens_per_name: -1,
};

const EXACT_FRAMING: &[(&str, MessageFraming)] = &[
    ("gpt-3.5-turbo", CHAT),
    ("gpt-3.5-turbo-0613", CHAT),
    ("gpt-3.5-turbo-16k-0613", CHAT),
    ("gpt-4-0314", CHAT),
    ("gpt-4-32k-0314", CHAT),
    ("gpt-4-0613", CHAT),
    ("gpt-4-32k-0613", CHAT),
    ("gpt-3.5-turbo-0301", LEGACY),
];

/// Family prefix → pinned version. Every pinned version is in `EXACT_FRAMING`.
const FAMILY_PINS: &[(&str, &str)] = &[
    ("gpt-3.5-turbo", "gpt-3.5-turbo-0613"),
    ("gpt-4", "gpt-4-0613"),
];

/// Framing chosen for a model, and the model name it was taken from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedFraming {
    pub model: String,
    pub framing: MessageFraming,
    /// True when `model` is a pinned stand-in for an unlisted version.
    pub pinned: bool,
}

fn exact_framing(model: &str) -> Option<MessageFraming> {
    EXACT_FRAMING
        .iter()
        .find(|(name, _)| *name == model)
        .map(|(_, framing)| *framing)
}

/// Pinned representative for a model's family, if its name has a known prefix.
pub fn resolve_family(model: &str) -> Option<&'static str> {
    FAMILY_PINS
        .iter()
        .find(|(prefix, _)| model.starts_with(prefix))
        .map(|(_, pinned)| *pinned)
}

/// Exact table first, then a single re-dispatch to the family's pinned version.
pub fn resolve_framing(model: &str) -> Result<ResolvedFraming, TokenError> {
    if let Some(framing) = exact_framing(model) {
        return Ok(ResolvedFraming {
            model: model.to_string(),
            framing,
            pinned: false,
        });
    }
    let pinned = resolve_family(model)
        .ok_or_else(|| TokenError::UnsupportedModel(model.to_string()))?;
    let framing =
        exact_framing(pinned).ok_or_else(|| TokenError::UnsupportedModel(pinned.to_string()))?;
    log::warn!(
        "{} may update over time; counting tokens assuming {}",
        model,
        pinned
    );
    Ok(ResolvedFraming {
        model: pinned.to_string(),
        framing,
        pinned: true,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_models_are_not_pinned() {
        let r = resolve_framing("gpt-4-32k-0613").unwrap();
        assert_eq!(r.model, "gpt-4-32k-0613");
        assert_eq!(r.framing, CHAT);
        assert!(!r.pinned);
    }

    #[test]
    fn legacy_model_uses_legacy_framing() {
        let r = resolve_framing("gpt-3.5-turbo-0301").unwrap();
        assert_eq!(r.framing.tokens_per_message, 4);
        assert_eq!(r.framing.tokens_per_name, -1);
    }

    #[test]
    fn unlisted_turbo_version_pins_in_one_hop() {
        let r = resolve_framing("gpt-3.5-turbo-0125").unwrap();
        assert_eq!(r.model, "gpt-3.5-turbo-0613");
        assert_eq!(r.framing, CHAT);
        assert!(r.pinned);
    }

    #[test]
    fn unlisted_gpt_4_version_pins_to_0613() {
        let r = resolve_framing("gpt-4-1106-preview").unwrap();
        assert_eq!(r.model, "gpt-4-0613");
        assert!(r.pinned);
    }

    #[test]
    fn every_pin_is_an_exact_entry() {
        for (_, pinned) in FAMILY_PINS {
            assert!(exact_framing(pinned).is_some(), "{} not in exact table", pinned);
        }
    }

    #[test]
    fn unknown_family_is_unsupported() {
        let err = resolve_framing("text-davinci-003").unwrap_err();
        assert!(matches!(err, TokenError::UnsupportedModel(ref m) if m == "text-davinci-003"));
    }
}
