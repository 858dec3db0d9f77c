//! # Mixer
//!
//! Reassembles G-code prints layer-by-layer from multiple sliced sources.
//!
//! This library provides the full mixing pipeline:
//! - Layer extraction with Z-lift detection and masking
//! - Range specification parsing (`name;from-from:to-to,...`)
//! - Range validation (orientation, bounds, overlap/gap coverage)
//! - Mixing execution with cyclic source windows and height remapping
//!
//! ## Example
//!
//! ```rust,ignore
//! use mixer::{mix, parse_source, parse_spec, validate_groups, MixOptions};
//!
//! let source = parse_source("a", &gcode_text, ";Layer change")?;
//! let sources = vec![source];
//! let groups = validate_groups(parse_spec("a;0-5:0-20", &sources)?)?;
//! let output = mix(&groups, &MixOptions::new(0.2));
//! output.write_to_file("out.gco")?;
//! ```

// Core modules
pub mod config;
pub mod layer;
pub mod mix;
pub mod range;

// Re-export commonly used types
pub use config::{MixConfig, SourceConfig};
pub use layer::{
    check_source_names, parse_source, Layer, LayerSource, DEFAULT_LAYER_CHANGE, Z_HIGH_TOKEN,
    Z_LOW_TOKEN,
};
pub use mix::{full_range, mix, stack_sources, MixOptions, MixStats, MixedGCode};
pub use range::{parse_spec, validate_groups, RangeGroup};

/// Result type used throughout the mixer.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for mixer operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Render a height as an emitted Z coordinate.
///
/// Three decimal places, matching the precision the detection pattern expects
/// so emitted files re-parse cleanly.
#[inline]
pub fn format_z(height: f64) -> String {
    format!("Z{:.3}", height)
}

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_z() {
        assert_eq!(format_z(0.0), "Z0.000");
        assert_eq!(format_z(1.25), "Z1.250");

        // Rounds to three places
        assert_eq!(format_z(0.2 + 0.1), "Z0.300");
        assert_eq!(format_z(12.3456), "Z12.346");
    }
}
