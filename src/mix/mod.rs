//! Mixing executor - replays validated range groups into output G-code.
//!
//! This module contains the output-side half of the mixing pipeline:
//! - [`MixOptions`] - height step, forced lift, layer-change marker
//! - [`mix`] - walks sorted groups, cycling each source window and remapping
//!   every emitted layer onto the output height ladder
//! - [`MixedGCode`] - the assembled output document
//! - [`stack_sources`] / [`full_range`] - the continuous restacking mode,
//!   expressed as one implicit full-range group over the combined sources

use std::fs;
use std::path::Path;

use log::info;

use crate::layer::{LayerSource, DEFAULT_LAYER_CHANGE, Z_HIGH_TOKEN, Z_LOW_TOKEN};
use crate::range::RangeGroup;
use crate::{format_z, Error, Result};

/// Feed rate for synthetic travel moves injected by a forced lift.
const LIFT_FEED: &str = "F9000.000";

/// Options driving the mixing pass.
#[derive(Clone, Debug)]
pub struct MixOptions {
    /// Output height per layer index: layer `i` sits at `i * step` mm.
    pub step: f64,
    /// Forced lift height (mm) overriding each layer's own delta.
    pub lift: Option<f64>,
    /// Layer-change marker emitted before every layer.
    pub layer_change: String,
}

impl MixOptions {
    /// Options with the default marker and no forced lift.
    pub fn new(step: f64) -> Self {
        MixOptions {
            step,
            lift: None,
            layer_change: DEFAULT_LAYER_CHANGE.to_string(),
        }
    }
}

/// Counters accumulated while mixing.
#[derive(Clone, Copy, Debug, Default)]
pub struct MixStats {
    /// Layers emitted.
    pub layer_count: usize,
    /// Layers emitted with a lift, own or forced.
    pub lifted_count: usize,
}

/// The assembled output document.
#[derive(Clone, Debug)]
pub struct MixedGCode {
    content: String,
    /// Counters accumulated while mixing.
    pub stats: MixStats,
}

impl MixedGCode {
    /// The full output text.
    pub fn content(&self) -> &str {
        &self.content
    }

    /// Number of lines in the output.
    pub fn line_count(&self) -> usize {
        self.content.lines().count()
    }

    /// Write the output to a file.
    pub fn write_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        fs::write(path, &self.content)?;
        Ok(())
    }
}

/// Replay validated, sorted range groups into a single output document.
///
/// Group windows cycle: a window shorter than its target range repeats from
/// its start, in the window's own direction. The validator has proven every
/// window index in bounds, so indexing here is direct.
pub fn mix(groups: &[RangeGroup<'_>], options: &MixOptions) -> MixedGCode {
    let mut content = String::new();
    let mut stats = MixStats::default();

    for group in groups {
        emit_group(group, options, &mut content, &mut stats);
    }

    MixedGCode { content, stats }
}

fn emit_group(
    group: &RangeGroup<'_>,
    options: &MixOptions,
    content: &mut String,
    stats: &mut MixStats,
) {
    let forward = group.from_start <= group.from_end;
    let mut cursor = group.from_start;

    for i in group.to_start..=group.to_end {
        let layer = &group.source.layers[cursor];
        let height = i as f64 * options.step;
        let z_low = format_z(height);

        content.push_str(&options.layer_change);
        content.push('\n');

        if layer.has_lift {
            let lift = options.lift.unwrap_or(layer.lift_delta);
            let z_high = format_z(height + lift);
            content.push_str(
                &layer
                    .gcode
                    .replace(Z_LOW_TOKEN, &z_low)
                    .replace(Z_HIGH_TOKEN, &z_high),
            );
            info!(
                "mixing layer {} at {:.2} mm from '{}':{} with {:.2} zlift",
                i, height, group.source.name, cursor, lift
            );
            stats.lifted_count += 1;
        } else if let Some(lift) = options.lift {
            // Non-lifting layer under a forced lift: give it a synthetic
            // travel hop before the body.
            content.push_str(&format!("G1 {} {}\n", format_z(height + lift), LIFT_FEED));
            content.push_str(&layer.gcode.replace(Z_LOW_TOKEN, &z_low));
            info!(
                "mixing layer {} at {:.2} mm from '{}':{} with {:.2} layer-change zlift",
                i, height, group.source.name, cursor, lift
            );
            stats.lifted_count += 1;
        } else {
            content.push_str(&layer.gcode.replace(Z_LOW_TOKEN, &z_low));
            info!(
                "mixing layer {} at {:.2} mm from '{}':{}",
                i, height, group.source.name, cursor
            );
        }

        stats.layer_count += 1;

        if cursor == group.from_end {
            cursor = group.from_start;
        } else if forward {
            cursor += 1;
        } else {
            cursor -= 1;
        }
    }
}

/// Flatten sources into one anonymous combined source, in declaration order.
pub fn stack_sources(sources: &[LayerSource]) -> LayerSource {
    let mut combined = LayerSource::default();
    for source in sources {
        combined.layers.extend(source.layers.iter().cloned());
        combined.has_lift |= source.has_lift;
    }
    combined
}

/// The implicit group replaying a whole source across `count` output layers.
pub fn full_range(source: &LayerSource, count: usize) -> Result<RangeGroup<'_>> {
    if source.layers.is_empty() {
        return Err(Error::Config("cannot stack an empty source".to_string()));
    }
    if count == 0 {
        return Err(Error::Config(
            "output layer count must be at least 1".to_string(),
        ));
    }
    Ok(RangeGroup {
        source,
        from_start: 0,
        from_end: source.layer_count() - 1,
        to_start: 0,
        to_end: count - 1,
    })
}
