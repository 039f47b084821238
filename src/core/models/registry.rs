//! Engine registry: engine id → tokenizer model and parameter bounds.
//!
//! Built-in engines are loaded from `config/engines.json` (embedded at compile time).
//! The file holds one `common` block of shared bounds and per-engine token limits;
//! both are assembled into a typed `EngineParameters` per engine at load.

use std::sync::OnceLock;

use serde::Deserialize;

use super::info::{EngineParameters, ParamBounds};

/// Errors from engine lookup or registry loading.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error(
        "Engine {engine} not found. Please use one of the following: {}",
        .known.join(", ")
    )]
    UnknownEngine { engine: String, known: Vec<String> },
    #[error("Invalid engine configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Deserialize)]
struct TokenCommon {
    min: u32,
    step: u32,
    default: u32,
}

#[derive(Debug, Deserialize)]
struct CommonEntry {
    max_tokens: TokenCommon,
    temperature: ParamBounds<f64>,
    top_p: ParamBounds<f64>,
    frequency_penalty: ParamBounds<f64>,
    presence_penalty: ParamBounds<f64>,
}

#[derive(Debug, Deserialize)]
struct TokenLimit {
    max: u32,
    help: String,
}

#[derive(Debug, Deserialize)]
struct EngineEntry {
    id: String,
    tokenizer_model: String,
    description: String,
    /// Defaults to the token max when omitted.
    #[serde(default)]
    context_window: Option<u32>,
    max_tokens: TokenLimit,
}

#[derive(Debug, Deserialize)]
struct EnginesFile {
    common: CommonEntry,
    engines: Vec<EngineEntry>,
}

/// Read-only table of supported engines, in configuration order.
#[derive(Debug, Clone)]
pub struct EngineRegistry {
    engines: Vec<EngineParameters>,
}

impl EngineRegistry {
    /// Parse and assemble a registry from an engines file.
    pub fn from_json(json: &str) -> Result<Self, RegistryError> {
        let file: EnginesFile =
            serde_json::from_str(json).map_err(|e| RegistryError::Invalid(e.to_string()))?;
        let common = file.common;

        let mut engines = Vec::with_capacity(file.engines.len());
        for entry in file.engines {
            if engines
                .iter()
                .any(|e: &EngineParameters| e.engine_id == entry.id)
            {
                return Err(RegistryError::Invalid(format!(
                    "engine '{}' is listed twice",
                    entry.id
                )));
            }
            // Clamp the shared default into this engine's range (e.g. small-output engines).
            let max = entry.max_tokens.max;
            let context_window = entry.context_window.unwrap_or(max);
            if context_window < max {
                return Err(RegistryError::Invalid(format!(
                    "engine '{}': context_window {} is smaller than max_tokens {}",
                    entry.id, context_window, max
                )));
            }
            let params = EngineParameters {
                engine_id: entry.id,
                tokenizer_model: entry.tokenizer_model,
                description: entry.description,
                context_window,
                max_tokens: ParamBounds {
                    min: common.max_tokens.min,
                    max,
                    step: common.max_tokens.step,
                    default: common.max_tokens.default.min(max),
                    help: entry.max_tokens.help,
                },
                temperature: common.temperature.clone(),
                top_p: common.top_p.clone(),
                frequency_penalty: common.frequency_penalty.clone(),
                presence_penalty: common.presence_penalty.clone(),
            };
            if let Some(name) = params.first_inconsistent() {
                return Err(RegistryError::Invalid(format!(
                    "engine '{}': {} default is outside its bounds",
                    params.engine_id, name
                )));
            }
            engines.push(params);
        }

        if engines.is_empty() {
            return Err(RegistryError::Invalid("no engines configured".to_string()));
        }
        Ok(Self { engines })
    }

    pub fn lookup(&self, engine: &str) -> Result<&EngineParameters, RegistryError> {
        self.engines
            .iter()
            .find(|e| e.engine_id == engine)
            .ok_or_else(|| RegistryError::UnknownEngine {
                engine: engine.to_string(),
                known: self.engine_ids().into_iter().map(String::from).collect(),
            })
    }

    /// Translate an engine id to the model name used for token counting.
    pub fn tokenizer_model(&self, engine: &str) -> Result<&str, RegistryError> {
        self.lookup(engine).map(|e| e.tokenizer_model.as_str())
    }

    pub fn engine_ids(&self) -> Vec<&str> {
        self.engines.iter().map(|e| e.engine_id.as_str()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &EngineParameters> {
        self.engines.iter()
    }
}

fn load_builtin_registry() -> EngineRegistry {
    let json = include_str!("../../../config/engines.json");
    EngineRegistry::from_json(json).expect("engines.json must be valid")
}

static BUILTIN_REGISTRY: OnceLock<EngineRegistry> = OnceLock::new();

/// Returns the built-in registry, loading it from config on first access.
pub fn builtin() -> &'static EngineRegistry {
    BUILTIN_REGISTRY.get_or_init(load_builtin_registry)
}

/// Look up an engine in the built-in registry.
pub fn lookup(engine: &str) -> Result<&'static EngineParameters, RegistryError> {
    builtin().lookup(engine)
}

/// Tokenizer-compatible model name for an engine in the built-in registry.
pub fn tokenizer_model(engine: &str) -> Result<&'static str, RegistryError> {
    builtin().tokenizer_model(engine)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_builtin_engine_has_consistent_defaults() {
        for engine in builtin().iter() {
            assert_eq!(
                engine.first_inconsistent(),
                None,
                "engine {} has a default outside its bounds",
                engine.engine_id
            );
        }
    }

    #[test]
    fn gpt_4_32k_bounds() {
        let engine = lookup("gpt-4-32k").unwrap();
        assert_eq!(engine.max_tokens.min, 10);
        assert_eq!(engine.max_tokens.max, 32768);
        assert_eq!(engine.max_tokens.step, 10);
        assert_eq!(engine.temperature.min, 0.0);
        assert_eq!(engine.temperature.max, 2.0);
        assert_eq!(engine.temperature.step, 0.01);
    }

    #[test]
    fn tokenizer_model_translation() {
        let reg = builtin();
        assert_eq!(reg.tokenizer_model("gpt-35-turbo-16k").unwrap(), "gpt-3.5-turbo-16k-0613");
        assert_eq!(reg.tokenizer_model("gpt-4").unwrap(), "gpt-4-0613");
        assert_eq!(reg.tokenizer_model("gpt-4-turbo").unwrap(), "gpt-4-32k-0613");
    }

    #[test]
    fn unknown_engine_lists_known_ids() {
        let err = lookup("gpt-5").unwrap_err();
        match &err {
            RegistryError::UnknownEngine { engine, known } => {
                assert_eq!(engine, "gpt-5");
                assert_eq!(known, &builtin().engine_ids());
            }
            other => panic!("expected UnknownEngine, got {:?}", other),
        }
        let msg = err.to_string();
        assert!(msg.contains("gpt-5"));
        assert!(msg.contains("gpt-4-32k"));
        assert!(msg.contains("gpt-35-turbo-16k"));
    }

    #[test]
    fn duplicate_engine_rejected() {
        let json = r#"{
            "common": {
                "max_tokens": {"min": 10, "step": 10, "default": 100},
                "temperature": {"min": 0.0, "max": 2.0, "step": 0.01, "default": 0.5, "help": ""},
                "top_p": {"min": 0.0, "max": 1.0, "step": 0.01, "default": 0.9, "help": ""},
                "frequency_penalty": {"min": -2.0, "max": 2.0, "step": 0.01, "default": 0.0, "help": ""},
                "presence_penalty": {"min": -2.0, "max": 2.0, "step": 0.01, "default": 0.0, "help": ""}
            },
            "engines": [
                {"id": "a", "tokenizer_model": "gpt-4", "description": "", "max_tokens": {"max": 200, "help": ""}},
                {"id": "a", "tokenizer_model": "gpt-4", "description": "", "max_tokens": {"max": 200, "help": ""}}
            ]
        }"#;
        assert!(matches!(
            EngineRegistry::from_json(json),
            Err(RegistryError::Invalid(_))
        ));
    }

    #[test]
    fn inconsistent_default_rejected() {
        let json = r#"{
            "common": {
                "max_tokens": {"min": 10, "step": 10, "default": 100},
                "temperature": {"min": 0.0, "max": 2.0, "step": 0.01, "default": 3.0, "help": ""},
                "top_p": {"min": 0.0, "max": 1.0, "step": 0.01, "default": 0.9, "help": ""},
                "frequency_penalty": {"min": -2.0, "max": 2.0, "step": 0.01, "default": 0.0, "help": ""},
                "presence_penalty": {"min": -2.0, "max": 2.0, "step": 0.01, "default": 0.0, "help": ""}
            },
            "engines": [
                {"id": "a", "tokenizer_model": "gpt-4", "description": "", "max_tokens": {"max": 200, "help": ""}}
            ]
        }"#;
        let err = EngineRegistry::from_json(json).unwrap_err();
        assert!(err.to_string().contains("temperature"));
    }

    #[test]
    fn token_default_clamped_to_engine_max() {
        let json = r#"{
            "common": {
                "max_tokens": {"min": 10, "step": 10, "default": 800},
                "temperature": {"min": 0.0, "max": 2.0, "step": 0.01, "default": 0.5, "help": ""},
                "top_p": {"min": 0.0, "max": 1.0, "step": 0.01, "default": 0.9, "help": ""},
                "frequency_penalty": {"min": -2.0, "max": 2.0, "step": 0.01, "default": 0.0, "help": ""},
                "presence_penalty": {"min": -2.0, "max": 2.0, "step": 0.01, "default": 0.0, "help": ""}
            },
            "engines": [
                {"id": "small", "tokenizer_model": "gpt-4", "description": "", "max_tokens": {"max": 500, "help": ""}}
            ]
        }"#;
        let reg = EngineRegistry::from_json(json).unwrap();
        assert_eq!(reg.lookup("small").unwrap().max_tokens.default, 500);
    }

    #[test]
    fn context_window_separate_from_reply_limit() {
        let turbo = lookup("gpt-4-turbo").unwrap();
        assert_eq!(turbo.max_tokens.max, 4096);
        assert_eq!(turbo.context_window, 128000);
        for engine in builtin().iter() {
            assert!(engine.context_window >= engine.max_tokens.max, "{}", engine.engine_id);
        }
    }

    #[test]
    fn context_window_defaults_to_token_max() {
        let json = r#"{
            "common": {
                "max_tokens": {"min": 10, "step": 10, "default": 100},
                "temperature": {"min": 0.0, "max": 2.0, "step": 0.01, "default": 0.5, "help": ""},
                "top_p": {"min": 0.0, "max": 1.0, "step": 0.01, "default": 0.9, "help": ""},
                "frequency_penalty": {"min": -2.0, "max": 2.0, "step": 0.01, "default": 0.0, "help": ""},
                "presence_penalty": {"min": -2.0, "max": 2.0, "step": 0.01, "default": 0.0, "help": ""}
            },
            "engines": [
                {"id": "a", "tokenizer_model": "gpt-4", "description": "", "max_tokens": {"max": 200, "help": ""}}
            ]
        }"#;
        let reg = EngineRegistry::from_json(json).unwrap();
        assert_eq!(reg.lookup("a").unwrap().context_window, 200);
    }

    #[test]
    fn context_window_below_token_max_rejected() {
        let json = r#"{
            "common": {
                "max_tokens": {"min": 10, "step": 10, "default": 100},
                "temperature": {"min": 0.0, "max": 2.0, "step": 0.01, "default": 0.5, "help": ""},
                "top_p": {"min": 0.0, "max": 1.0, "step": 0.01, "default": 0.9, "help": ""},
                "frequency_penalty": {"min": -2.0, "max": 2.0, "step": 0.01, "default": 0.0, "help": ""},
                "presence_penalty": {"min": -2.0, "max": 2.0, "step": 0.01, "default": 0.0, "help": ""}
            },
            "engines": [
                {"id": "a", "tokenizer_model": "gpt-4", "description": "", "context_window": 100, "max_tokens": {"max": 200, "help": ""}}
            ]
        }"#;
        let err = EngineRegistry::from_json(json).unwrap_err();
        assert!(err.to_string().contains("context_window"));
    }
}
