//! Typed engine parameter bounds (no dependencies on loading or the API).

use serde::{Deserialize, Serialize};

/// Range, slider step, default and help text for one tunable parameter.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ParamBounds<T> {
    pub min: T,
    pub max: T,
    pub step: T,
    pub default: T,
    pub help: String,
}

impl<T: PartialOrd + Copy> ParamBounds<T> {
    pub fn contains(&self, value: T) -> bool {
        value >= self.min && value <= self.max
    }

    /// `min <= default <= max`.
    pub fn is_consistent(&self) -> bool {
        self.min <= self.max && self.contains(self.default)
    }
}

/// Everything known about one engine (Azure deployment).
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct EngineParameters {
    pub engine_id: String,
    /// Model name used to select the tokenizer and message framing.
    pub tokenizer_model: String,
    pub description: String,
    /// Prompt plus reply tokens the deployment accepts.
    pub context_window: u32,
    pub max_tokens: ParamBounds<u32>,
    pub temperature: ParamBounds<f64>,
    pub top_p: ParamBounds<f64>,
    pub frequency_penalty: ParamBounds<f64>,
    pub presence_penalty: ParamBounds<f64>,
}

impl EngineParameters {
    /// Name of the first parameter whose default falls outside its range.
    pub fn first_inconsistent(&self) -> Option<&'static str> {
        if !self.max_tokens.is_consistent() {
            return Some("max_tokens");
        }
        [
            ("temperature", &self.temperature),
            ("top_p", &self.top_p),
            ("frequency_penalty", &self.frequency_penalty),
            ("presence_penalty", &self.presence_penalty),
        ]
        .into_iter()
        .find(|(_, b)| !b.is_consistent())
        .map(|(name, _)| name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bounds(min: f64, max: f64, default: f64) -> ParamBounds<f64> {
        ParamBounds {
            min,
            max,
            step: 0.1,
            default,
            help: String::new(),
        }
    }

    #[test]
    fn contains_is_inclusive() {
        let b = bounds(0.0, 1.0, 0.5);
        assert!(b.contains(0.0));
        assert!(b.contains(1.0));
        assert!(!b.contains(1.01));
        assert!(!b.contains(-0.01));
    }

    #[test]
    fn default_outside_range_is_inconsistent() {
        assert!(bounds(0.0, 1.0, 1.0).is_consistent());
        assert!(!bounds(0.0, 1.0, 1.5).is_consistent());
        assert!(!bounds(2.0, 1.0, 1.5).is_consistent());
    }
}
