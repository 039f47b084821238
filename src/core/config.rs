use std::env;
use std::time::Duration;

use async_openai::config::AzureConfig;

const DEFAULT_API_VERSION: &str = "2023-12-01-preview";
const DEFAULT_ENGINE: &str = "gpt-35-turbo-16k";
const DEFAULT_SYSTEM_MESSAGE: &str = "Please insert your system message to define your Assistant.";
const DEFAULT_SEARCH_URL: &str = "https://api.bing.microsoft.com/v7.0/search";
const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Sampling values set in the environment; unset fields keep the engine defaults.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SamplingOverrides {
    pub temperature: Option<f64>,
    pub max_tokens: Option<u32>,
    pub top_p: Option<f64>,
    pub frequency_penalty: Option<f64>,
    pub presence_penalty: Option<f64>,
}

/// Bing Web Search credentials.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchConfig {
    pub endpoint: String,
    pub subscription_key: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub api_base: String,
    api_key: String,
    pub api_version: String,
    pub engine: String,
    pub system_message: String,
    pub sampling: SamplingOverrides,
    pub search: Option<SearchConfig>,
    pub request_timeout: Duration,
}

impl Config {
    /// Client config for one engine; the engine id is the Azure deployment id.
    pub fn azure_config(&self, engine: &str) -> AzureConfig {
        AzureConfig::new()
            .with_api_base(&self.api_base)
            .with_api_key(&self.api_key)
            .with_api_version(&self.api_version)
            .with_deployment_id(engine)
    }
}

#[derive(Debug)]
pub enum ConfigError {
    MissingApiKey,
    MissingEndpoint,
    InvalidValue { var: &'static str, value: String },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::MissingApiKey => write!(f, "APIM_KEY is not set"),
            ConfigError::MissingEndpoint => write!(f, "APIM_ENDPOINT is not set"),
            ConfigError::InvalidValue { var, value } => {
                write!(f, "{} has an invalid value: {:?}", var, value)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

fn non_empty(lookup: &impl Fn(&str) -> Option<String>, var: &str) -> Option<String> {
    lookup(var)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_var<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
) -> Result<Option<T>, ConfigError> {
    match non_empty(lookup, var) {
        None => Ok(None),
        Some(raw) => raw
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue { var, value: raw }),
    }
}

/// Engine from `ST_ENGINE`, or the default. Needs no gateway credentials.
pub fn engine_from(lookup: impl Fn(&str) -> Option<String>) -> String {
    non_empty(&lookup, "ST_ENGINE").unwrap_or_else(|| DEFAULT_ENGINE.to_string())
}

/// Search credentials from a variable lookup; `None` without a subscription key.
pub fn search_from(lookup: impl Fn(&str) -> Option<String>) -> Option<SearchConfig> {
    let subscription_key = non_empty(&lookup, "BING_SUBSCRIPTION_KEY")?;
    let endpoint = non_empty(&lookup, "BING_SEARCH_URL")
        .unwrap_or_else(|| DEFAULT_SEARCH_URL.to_string());
    Some(SearchConfig {
        endpoint,
        subscription_key,
    })
}

/// Build configuration from a variable lookup (the environment in production).
pub fn load_from(lookup: impl Fn(&str) -> Option<String>) -> Result<Config, ConfigError> {
    let api_key = non_empty(&lookup, "APIM_KEY").ok_or(ConfigError::MissingApiKey)?;
    let api_base = non_empty(&lookup, "APIM_ENDPOINT").ok_or(ConfigError::MissingEndpoint)?;
    let api_version =
        non_empty(&lookup, "AOAI_API_VERSION").unwrap_or_else(|| DEFAULT_API_VERSION.to_string());
    let engine = engine_from(&lookup);
    let system_message =
        non_empty(&lookup, "SYSTEM").unwrap_or_else(|| DEFAULT_SYSTEM_MESSAGE.to_string());

    let sampling = SamplingOverrides {
        temperature: parse_var(&lookup, "ST_TEMPERATURE")?,
        max_tokens: parse_var(&lookup, "ST_MAX_TOKENS")?,
        top_p: parse_var(&lookup, "ST_TOP_P")?,
        frequency_penalty: parse_var(&lookup, "ST_FREQUENCY_PENALTY")?,
        presence_penalty: parse_var(&lookup, "ST_PRESENCE_PENALTY")?,
    };
    let timeout_secs: u64 =
        parse_var(&lookup, "REQUEST_TIMEOUT_SECS")?.unwrap_or(DEFAULT_TIMEOUT_SECS);

    Ok(Config {
        api_base: api_base.trim_end_matches('/').to_string(),
        api_key,
        api_version,
        engine,
        system_message,
        sampling,
        search: search_from(&lookup),
        request_timeout: Duration::from_secs(timeout_secs),
    })
}

/// Engine from the process environment.
pub fn engine() -> String {
    engine_from(|var| env::var(var).ok())
}

/// Search credentials from the process environment.
pub fn search() -> Option<SearchConfig> {
    search_from(|var| env::var(var).ok())
}

/// Load configuration from environment. Returns an error if the gateway key or endpoint is missing.
pub fn load() -> Result<Config, ConfigError> {
    load_from(|var| env::var(var).ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn load_map(map: &HashMap<String, String>) -> Result<Config, ConfigError> {
        load_from(|k| map.get(k).cloned())
    }

    #[test]
    fn missing_key_is_reported_first() {
        let err = load_map(&vars(&[])).unwrap_err();
        assert!(matches!(err, ConfigError::MissingApiKey));
        assert!(err.to_string().contains("APIM_KEY"));
    }

    #[test]
    fn missing_endpoint() {
        let err = load_map(&vars(&[("APIM_KEY", "k")])).unwrap_err();
        assert!(matches!(err, ConfigError::MissingEndpoint));
    }

    #[test]
    fn defaults_applied() {
        let cfg = load_map(&vars(&[
            ("APIM_KEY", "k"),
            ("APIM_ENDPOINT", "https://gw.example.net/"),
        ]))
        .unwrap();
        assert_eq!(cfg.api_base, "https://gw.example.net");
        assert_eq!(cfg.api_version, DEFAULT_API_VERSION);
        assert_eq!(cfg.engine, DEFAULT_ENGINE);
        assert_eq!(cfg.system_message, DEFAULT_SYSTEM_MESSAGE);
        assert_eq!(cfg.sampling, SamplingOverrides::default());
        assert_eq!(cfg.search, None);
        assert_eq!(cfg.request_timeout, Duration::from_secs(60));
    }

    #[test]
    fn sampling_overrides_parsed() {
        let cfg = load_map(&vars(&[
            ("APIM_KEY", "k"),
            ("APIM_ENDPOINT", "https://gw"),
            ("ST_TEMPERATURE", "0.2"),
            ("ST_MAX_TOKENS", "1200"),
            ("REQUEST_TIMEOUT_SECS", "5"),
        ]))
        .unwrap();
        assert_eq!(cfg.sampling.temperature, Some(0.2));
        assert_eq!(cfg.sampling.max_tokens, Some(1200));
        assert_eq!(cfg.sampling.top_p, None);
        assert_eq!(cfg.request_timeout, Duration::from_secs(5));
    }

    #[test]
    fn invalid_number_names_the_variable() {
        let err = load_map(&vars(&[
            ("APIM_KEY", "k"),
            ("APIM_ENDPOINT", "https://gw"),
            ("ST_MAX_TOKENS", "lots"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("ST_MAX_TOKENS"));
    }

    #[test]
    fn engine_needs_no_credentials() {
        assert_eq!(engine_from(|_| None), DEFAULT_ENGINE);
        let map = vars(&[("ST_ENGINE", "gpt-4")]);
        assert_eq!(engine_from(|k| map.get(k).cloned()), "gpt-4");
    }

    #[test]
    fn search_config_requires_key() {
        assert_eq!(search_from(|_| None), None);
        let map = vars(&[("BING_SUBSCRIPTION_KEY", "bing")]);
        let search = search_from(|k| map.get(k).cloned()).unwrap();
        assert_eq!(search.endpoint, DEFAULT_SEARCH_URL);
        assert_eq!(search.subscription_key, "bing");
    }
}
