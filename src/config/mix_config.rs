//! Mix recipe types.
//!
//! Mirrors the command-line surface of the `mix` subcommand so a run can be
//! kept alongside the model files it belongs to.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::layer::DEFAULT_LAYER_CHANGE;
use crate::{Error, Result};

fn default_layer_change() -> String {
    DEFAULT_LAYER_CHANGE.to_string()
}

fn default_out() -> PathBuf {
    PathBuf::from("out.gco")
}

/// One source file declaration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SourceConfig {
    /// G-code file to read.
    pub file: PathBuf,
    /// Source name referenced by range specifications. May stay empty when
    /// this is the only source.
    #[serde(default)]
    pub name: String,
}

/// A complete mixing run, loadable from a JSON file.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MixConfig {
    /// Output height step per layer index (mm).
    pub step: f64,
    /// Forced lift height (mm) overriding each layer's own delta.
    #[serde(default)]
    pub lift: Option<f64>,
    /// Layer-change marker; the slic3r comment when omitted.
    #[serde(default = "default_layer_change")]
    pub layer_change: String,
    /// Source files, in declaration order.
    pub sources: Vec<SourceConfig>,
    /// Range specifications, one entry per `--layer` flag.
    pub layers: Vec<String>,
    /// Output path.
    #[serde(default = "default_out")]
    pub out: PathBuf,
    /// Verbatim prologue file.
    #[serde(default)]
    pub head: Option<PathBuf>,
    /// Verbatim epilogue file.
    #[serde(default)]
    pub tail: Option<PathBuf>,
}

impl MixConfig {
    /// Load a recipe from a JSON file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)?;
        serde_json::from_str(&text).map_err(|err| {
            Error::Config(format!("invalid mix recipe {}: {}", path.display(), err))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_recipe(contents: &str) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("recipe.json");
        let mut file = fs::File::create(&path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        (dir, path)
    }

    #[test]
    fn test_minimal_recipe_gets_defaults() {
        let (_dir, path) = write_recipe(
            r#"{
                "step": 0.2,
                "sources": [{ "file": "in.gcode" }],
                "layers": ["0-10"]
            }"#,
        );
        let config = MixConfig::from_file(&path).unwrap();
        assert_eq!(config.step, 0.2);
        assert_eq!(config.lift, None);
        assert_eq!(config.layer_change, ";Layer change");
        assert_eq!(config.out, PathBuf::from("out.gco"));
        assert_eq!(config.sources.len(), 1);
        assert_eq!(config.sources[0].name, "");
    }

    #[test]
    fn test_full_recipe() {
        let (_dir, path) = write_recipe(
            r#"{
                "step": 0.3,
                "lift": 0.5,
                "layer_change": ";LAYER:",
                "sources": [
                    { "file": "a.gcode", "name": "a" },
                    { "file": "b.gcode", "name": "b" }
                ],
                "layers": ["a;0-5:0-10", "b;0-3:11-14"],
                "out": "mixed.gco",
                "head": "start.gcode",
                "tail": "end.gcode"
            }"#,
        );
        let config = MixConfig::from_file(&path).unwrap();
        assert_eq!(config.lift, Some(0.5));
        assert_eq!(config.layer_change, ";LAYER:");
        assert_eq!(config.layers.len(), 2);
        assert_eq!(config.head, Some(PathBuf::from("start.gcode")));
    }

    #[test]
    fn test_missing_step_is_a_config_error() {
        let (_dir, path) = write_recipe(r#"{ "sources": [], "layers": [] }"#);
        let err = MixConfig::from_file(&path).unwrap_err();
        assert!(err.to_string().contains("recipe"));
    }

    #[test]
    fn test_missing_file_is_an_io_error() {
        let err = MixConfig::from_file("no/such/recipe.json").unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }
}
