//! Build script: validates engines.json at compile time.

use std::collections::HashSet;
use std::path::PathBuf;

fn main() {
    let manifest_dir =
        std::env::var("CARGO_MANIFEST_DIR").expect("CARGO_MANIFEST_DIR set by Cargo");
    let config_path: PathBuf = [&manifest_dir, "config", "engines.json"].iter().collect();
    println!("cargo:rerun-if-changed={}", config_path.display());

    let json = std::fs::read_to_string(&config_path).unwrap_or_else(|e| {
        panic!(
            "Failed to read {}: {}. engines.json must exist and be valid.",
            config_path.display(),
            e
        )
    });

    #[derive(serde::Deserialize)]
    #[allow(dead_code)]
    struct EngineEntry {
        id: String,
        tokenizer_model: String,
        description: String,
        max_tokens: serde_json::Value,
    }
    #[derive(serde::Deserialize)]
    #[allow(dead_code)]
    struct EnginesFile {
        common: serde_json::Value,
        engines: Vec<EngineEntry>,
    }

    let file: EnginesFile = serde_json::from_str(&json).unwrap_or_else(|e| {
        panic!(
            "engines.json is invalid JSON: {}. Fix the file and rebuild.",
            e
        )
    });
    if file.engines.is_empty() {
        panic!("engines.json must list at least one engine");
    }
    let mut seen = HashSet::new();
    for engine in &file.engines {
        if !seen.insert(engine.id.as_str()) {
            panic!("engines.json lists engine '{}' more than once", engine.id);
        }
    }
}
