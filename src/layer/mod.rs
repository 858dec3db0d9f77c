//! Layer extraction - splits raw G-code into height-ordered layer segments.
//!
//! This module contains the layer-side half of the mixing pipeline:
//! - [`Layer`] - one printed slice's worth of tool-path text
//! - [`LayerSource`] - a named, ordered collection of layers from one file
//! - [`parse_source`] - splits a file on the layer-change marker and runs
//!   Z-lift detection on every segment
//!
//! Lift detection masks the detected Z heights with placeholder tokens so the
//! mixing executor can substitute arbitrary target heights later.

use std::sync::OnceLock;

use log::{info, warn};
use regex::Regex;

use crate::{Error, Result};

/// Placeholder masking the lower of the two detected Z heights.
pub const Z_LOW_TOKEN: &str = "ZLOW";

/// Placeholder masking the higher of the two detected Z heights.
pub const Z_HIGH_TOKEN: &str = "ZHIGH";

/// Layer-change comment emitted by slic3r-family slicers.
pub const DEFAULT_LAYER_CHANGE: &str = ";Layer change";

static Z_COORD_REGEX: OnceLock<Regex> = OnceLock::new();

/// Fixed-point Z coordinate token: the axis letter immediately followed by an
/// integer part, a decimal point and a fractional part. No sign, no exponent.
fn z_coord_regex() -> &'static Regex {
    Z_COORD_REGEX.get_or_init(|| Regex::new(r"Z\d+\.\d+").expect("invalid regex pattern"))
}

/// One printed slice's worth of tool-path text.
#[derive(Clone, Debug)]
pub struct Layer {
    /// G-code body with detected Z heights masked by placeholder tokens.
    pub gcode: String,
    /// True when the body contains a genuine two-height vertical movement.
    pub has_lift: bool,
    /// Absolute difference between the two detected heights (mm). Zero
    /// without lift.
    pub lift_delta: f64,
}

impl Layer {
    /// Build a layer from one raw segment, detecting and masking Z movement.
    ///
    /// One distinct Z height is the slice's own height, not a lift; it is
    /// masked as the low token so mixing can remap it. Two distinct heights
    /// are a lift: both are masked and their difference recorded. Three or
    /// more cannot be remapped safely and fail.
    pub fn from_segment(segment: &str) -> Result<Self> {
        let re = z_coord_regex();

        // First matching token per line, deduplicated by exact string.
        let mut heights: Vec<&str> = Vec::new();
        for line in segment.lines() {
            if let Some(m) = re.find(line) {
                if !heights.contains(&m.as_str()) {
                    heights.push(m.as_str());
                }
            }
        }

        match heights.len() {
            0 => Ok(Layer {
                gcode: segment.to_string(),
                has_lift: false,
                lift_delta: 0.0,
            }),
            1 => {
                let base = heights[0];
                let gcode = re.replace_all(segment, |caps: &regex::Captures| {
                    let token = &caps[0];
                    if token == base {
                        Z_LOW_TOKEN.to_string()
                    } else {
                        token.to_string()
                    }
                });
                Ok(Layer {
                    gcode: gcode.into_owned(),
                    has_lift: false,
                    lift_delta: 0.0,
                })
            }
            2 => {
                let a = parse_height(heights[0])?;
                let b = parse_height(heights[1])?;
                let (low, high) = if a < b {
                    (heights[0], heights[1])
                } else {
                    (heights[1], heights[0])
                };

                // Single pass, whole tokens only: a low token that is a
                // prefix of the high token cannot corrupt it.
                let gcode = re.replace_all(segment, |caps: &regex::Captures| {
                    let token = &caps[0];
                    if token == low {
                        Z_LOW_TOKEN.to_string()
                    } else if token == high {
                        Z_HIGH_TOKEN.to_string()
                    } else {
                        token.to_string()
                    }
                });
                Ok(Layer {
                    gcode: gcode.into_owned(),
                    has_lift: true,
                    lift_delta: (a - b).abs(),
                })
            }
            n => Err(Error::Parse(format!(
                "ambiguous vertical movement: expected at most 2 distinct Z heights, found {}",
                n
            ))),
        }
    }
}

fn parse_height(token: &str) -> Result<f64> {
    token[1..]
        .parse()
        .map_err(|_| Error::Parse(format!("invalid Z coordinate \"{}\"", token)))
}

/// A named, ordered collection of layers parsed from one source file.
#[derive(Clone, Debug, Default)]
pub struct LayerSource {
    /// Source identity; empty only when a single anonymous source is loaded.
    pub name: String,
    /// Layers in file order.
    pub layers: Vec<Layer>,
    /// True when any contained layer carries a lift.
    pub has_lift: bool,
}

impl LayerSource {
    /// Number of layers in this source.
    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }
}

/// Split raw G-code into layers on the layer-change marker.
///
/// Segment 0 is the pre-marker content; every further segment follows one
/// marker occurrence. A file without the marker degrades to a single layer
/// with a logged notice.
///
/// Slicers may place the marker above the final positioning move of a layer;
/// a segment's last line carrying a Z coordinate therefore belongs to the
/// next segment and is moved there before lift detection runs.
pub fn parse_source(name: &str, gcode: &str, layer_change: &str) -> Result<LayerSource> {
    let mut source = LayerSource {
        name: name.to_string(),
        ..Default::default()
    };

    if !gcode.contains(layer_change) {
        warn!(
            "source '{}': no layer-change marker found, treating the whole file as one layer",
            name
        );
        let layer = layer_for(&source, 0, gcode)?;
        source.has_lift = layer.has_lift;
        source.layers.push(layer);
        return Ok(source);
    }

    let mut segments: Vec<String> = gcode.split(layer_change).map(str::to_string).collect();
    info!("source '{}': found {} layers", name, segments.len());

    // Carry pass: pull trailing positioning moves forward.
    for i in 0..segments.len() {
        let carry = match segments[i].lines().last() {
            Some(last) if z_coord_regex().is_match(last) => Some(last.to_string()),
            _ => None,
        };
        if let Some(line) = carry {
            if let Some(pos) = segments[i].rfind(&line) {
                if i + 1 < segments.len() {
                    segments[i + 1].insert_str(0, &line);
                }
                segments[i].truncate(pos);
            }
        }
    }

    for (i, segment) in segments.iter().enumerate() {
        let layer = layer_for(&source, i, segment)?;
        source.has_lift |= layer.has_lift;
        source.layers.push(layer);
    }

    if source.has_lift {
        info!("source '{}': Z-lift detected", name);
    }

    Ok(source)
}

fn layer_for(source: &LayerSource, index: usize, segment: &str) -> Result<Layer> {
    Layer::from_segment(segment).map_err(|err| match err {
        Error::Parse(msg) => Error::Parse(format!(
            "source '{}' layer {}: {}",
            source.name, index, msg
        )),
        other => other,
    })
}

/// Multiple sources must carry unique, non-empty names.
pub fn check_source_names(sources: &[LayerSource]) -> Result<()> {
    if sources.len() <= 1 {
        return Ok(());
    }
    for (i, source) in sources.iter().enumerate() {
        if source.name.is_empty() {
            return Err(Error::Config(
                "all sources must be named when using multiple sources".to_string(),
            ));
        }
        if sources[..i].iter().any(|other| other.name == source.name) {
            return Err(Error::Config(format!(
                "source name appears twice: \"{}\"",
                source.name
            )));
        }
    }
    Ok(())
}
