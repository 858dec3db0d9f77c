//! Range specification parsing and validation.
//!
//! A specification addresses layers of a named source and maps windows of
//! them onto target output heights:
//!
//! ```text
//! spec      := [ name ";" ] group ( "," group )*
//! group     := fromRange [ ":" toRange ]
//! fromRange := INT | INT "-" INT
//! toRange   := INT | INT "-" INT
//! ```
//!
//! A bare `fromRange` targets the same indices it reads from. The source
//! window may run in either direction; the target range may not. Validation
//! proves that the target ranges of all groups together tile the output
//! without overlap or gap, and returns them sorted bottom-up for the
//! executor.

use std::fmt;

use log::debug;

use crate::layer::LayerSource;
use crate::{Error, Result};

/// One mixing instruction: a cyclic read window over a source, mapped onto a
/// target output height range.
#[derive(Clone, Copy, Debug)]
pub struct RangeGroup<'a> {
    /// The source supplying layers.
    pub source: &'a LayerSource,
    /// First source index read.
    pub from_start: usize,
    /// Last source index of the window; below `from_start` plays in reverse.
    pub from_end: usize,
    /// First output index written.
    pub to_start: usize,
    /// Last output index written; never below `to_start`.
    pub to_end: usize,
}

impl fmt::Display for RangeGroup<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{};{}-{}:{}-{}",
            self.source.name, self.from_start, self.from_end, self.to_start, self.to_end
        )
    }
}

/// Parse one range specification against the loaded sources.
///
/// A `name;` prefix selects the source by exact name. Without a prefix the
/// single loaded source is used implicitly; with several loaded the spec is
/// ambiguous and rejected.
pub fn parse_spec<'a>(spec: &str, sources: &'a [LayerSource]) -> Result<Vec<RangeGroup<'a>>> {
    let (source, ranges) = match spec.split_once(';') {
        Some((name, rest)) => (find_source(sources, name)?, rest),
        None => (sole_source(sources, spec)?, spec),
    };

    let mut groups = Vec::new();
    for token in ranges.split(',') {
        groups.push(parse_group(token, spec, source)?);
    }
    Ok(groups)
}

fn find_source<'a>(sources: &'a [LayerSource], name: &str) -> Result<&'a LayerSource> {
    sources
        .iter()
        .find(|source| source.name == name)
        .ok_or_else(|| Error::Config(format!("layer source not valid: \"{}\"", name)))
}

fn sole_source<'a>(sources: &'a [LayerSource], spec: &str) -> Result<&'a LayerSource> {
    match sources.len() {
        0 => Err(Error::Config("no sources loaded".to_string())),
        1 => Ok(&sources[0]),
        _ => Err(Error::Config(format!(
            "ambiguous layer spec \"{}\": sources must be named when more than one is loaded",
            spec
        ))),
    }
}

fn parse_group<'a>(
    token: &str,
    spec: &str,
    source: &'a LayerSource,
) -> Result<RangeGroup<'a>> {
    let parse_int = |text: &str| -> Result<usize> {
        text.parse().map_err(|_| {
            Error::Parse(format!("layer range not valid: \"{}\" in \"{}\"", token, spec))
        })
    };
    let parse_range = |text: &str| -> Result<(usize, usize)> {
        match text.split_once('-') {
            Some((start, end)) => Ok((parse_int(start)?, parse_int(end)?)),
            None => {
                let value = parse_int(text)?;
                Ok((value, value))
            }
        }
    };

    let (from, to) = match token.split_once(':') {
        Some((from, to)) => (parse_range(from)?, parse_range(to)?),
        None => {
            let range = parse_range(token)?;
            (range, range)
        }
    };

    Ok(RangeGroup {
        source,
        from_start: from.0,
        from_end: from.1,
        to_start: to.0,
        to_end: to.1,
    })
}

/// Check orientation, source bounds, and target coverage; return the groups
/// sorted ascending by their first output index.
///
/// The target intervals of all groups together must tile `[0, max]` exactly:
/// any output index claimed twice or claimed never is fatal.
pub fn validate_groups<'a>(mut groups: Vec<RangeGroup<'a>>) -> Result<Vec<RangeGroup<'a>>> {
    for group in &groups {
        if group.to_start > group.to_end {
            return Err(Error::Config(format!(
                "layer range not valid, target start above target end: \"{}\"",
                group
            )));
        }
        let count = group.source.layer_count();
        if group.from_start >= count || group.from_end >= count {
            return Err(Error::Config(format!(
                "layer range not valid, outside source '{}' with {} layers: \"{}\"",
                group.source.name, count, group
            )));
        }
    }

    groups.sort_by_key(|group| group.to_start);

    if let Some(max) = groups.iter().map(|group| group.to_end).max() {
        let mut used = vec![false; max + 1];
        for group in &groups {
            for i in group.to_start..=group.to_end {
                if used[i] {
                    return Err(Error::Config(format!("overlapping output layer: {}", i)));
                }
                used[i] = true;
            }
        }
        if let Some(gap) = used.iter().position(|&taken| !taken) {
            return Err(Error::Config(format!("empty output layer: {}", gap)));
        }
    }

    debug!("validated {} range groups", groups.len());
    Ok(groups)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layer::Layer;

    fn make_source(name: &str, layers: usize) -> LayerSource {
        LayerSource {
            name: name.to_string(),
            layers: vec![
                Layer {
                    gcode: String::new(),
                    has_lift: false,
                    lift_delta: 0.0,
                };
                layers
            ],
            has_lift: false,
        }
    }

    fn bounds(group: &RangeGroup) -> (usize, usize, usize, usize) {
        (group.from_start, group.from_end, group.to_start, group.to_end)
    }

    #[test]
    fn test_bare_integer() {
        let sources = vec![make_source("", 10)];
        let groups = parse_spec("5", &sources).unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(bounds(&groups[0]), (5, 5, 5, 5));
    }

    #[test]
    fn test_from_range_targets_itself() {
        let sources = vec![make_source("", 10)];
        let groups = parse_spec("1-4", &sources).unwrap();
        assert_eq!(bounds(&groups[0]), (1, 4, 1, 4));
    }

    #[test]
    fn test_single_from_single_to() {
        let sources = vec![make_source("", 10)];
        let groups = parse_spec("1:2", &sources).unwrap();
        assert_eq!(bounds(&groups[0]), (1, 1, 2, 2));
    }

    #[test]
    fn test_single_from_to_range() {
        let sources = vec![make_source("", 10)];
        let groups = parse_spec("1:2-6", &sources).unwrap();
        assert_eq!(bounds(&groups[0]), (1, 1, 2, 6));
    }

    #[test]
    fn test_from_range_to_range() {
        let sources = vec![make_source("", 10)];
        let groups = parse_spec("1-2:3-4", &sources).unwrap();
        assert_eq!(bounds(&groups[0]), (1, 2, 3, 4));
    }

    #[test]
    fn test_from_range_single_to() {
        let sources = vec![make_source("", 10)];
        let groups = parse_spec("1-2:5", &sources).unwrap();
        assert_eq!(bounds(&groups[0]), (1, 2, 5, 5));
    }

    #[test]
    fn test_comma_splitting_is_associative() {
        let sources = vec![make_source("a", 10)];
        let combined = parse_spec("a;1-2:3-4,5", &sources).unwrap();
        let first = parse_spec("a;1-2:3-4", &sources).unwrap();
        let second = parse_spec("a;5", &sources).unwrap();
        assert_eq!(combined.len(), 2);
        assert_eq!(bounds(&combined[0]), bounds(&first[0]));
        assert_eq!(bounds(&combined[1]), bounds(&second[0]));
    }

    #[test]
    fn test_named_source_resolution() {
        let sources = vec![make_source("a", 10), make_source("b", 10)];
        let groups = parse_spec("b;0-3", &sources).unwrap();
        assert_eq!(groups[0].source.name, "b");
    }

    #[test]
    fn test_unknown_source_name() {
        let sources = vec![make_source("a", 10)];
        let err = parse_spec("b;0-3", &sources).unwrap_err();
        assert!(err.to_string().contains("\"b\""));
    }

    #[test]
    fn test_unnamed_spec_ambiguous_with_multiple_sources() {
        let sources = vec![make_source("a", 10), make_source("b", 10)];
        assert!(parse_spec("0-3", &sources).is_err());
    }

    #[test]
    fn test_malformed_token_names_fragment_and_spec() {
        let sources = vec![make_source("a", 10)];
        let err = parse_spec("a;1-2:3-4,1-x", &sources).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("\"1-x\""));
        assert!(message.contains("\"a;1-2:3-4,1-x\""));
    }

    #[test]
    fn test_empty_group_rejected() {
        let sources = vec![make_source("a", 10)];
        assert!(parse_spec("a;1-2,", &sources).is_err());
    }

    #[test]
    fn test_validate_rejects_inverted_target() {
        let sources = vec![make_source("", 10)];
        let groups = parse_spec("1-2:5-3", &sources).unwrap();
        let err = validate_groups(groups).unwrap_err();
        assert!(err.to_string().contains("target start above target end"));
    }

    #[test]
    fn test_validate_rejects_out_of_bounds_window() {
        let sources = vec![make_source("", 3)];
        let groups = parse_spec("1-3:0-5", &sources).unwrap();
        let err = validate_groups(groups).unwrap_err();
        assert!(err.to_string().contains("outside source"));
    }

    #[test]
    fn test_validate_accepts_last_layer_window() {
        let sources = vec![make_source("", 3)];
        let groups = parse_spec("0-2:0-5", &sources).unwrap();
        assert!(validate_groups(groups).is_ok());
    }

    #[test]
    fn test_validate_rejects_overlap() {
        let sources = vec![make_source("", 10)];
        let mut groups = parse_spec("0-5", &sources).unwrap();
        groups.extend(parse_spec("5-8", &sources).unwrap());
        let err = validate_groups(groups).unwrap_err();
        assert!(err.to_string().contains("overlapping output layer: 5"));
    }

    #[test]
    fn test_validate_rejects_gap() {
        let sources = vec![make_source("", 10)];
        let mut groups = parse_spec("0-2", &sources).unwrap();
        groups.extend(parse_spec("4-6", &sources).unwrap());
        let err = validate_groups(groups).unwrap_err();
        assert!(err.to_string().contains("empty output layer: 3"));
    }

    #[test]
    fn test_validate_sorts_by_target_start() {
        let sources = vec![make_source("", 10)];
        let mut groups = parse_spec("4-6", &sources).unwrap();
        groups.extend(parse_spec("0-3", &sources).unwrap());
        let sorted = validate_groups(groups).unwrap();
        assert_eq!(sorted[0].to_start, 0);
        assert_eq!(sorted[1].to_start, 4);
    }

    #[test]
    fn test_validate_accepts_empty_list() {
        assert!(validate_groups(Vec::new()).unwrap().is_empty());
    }

    #[test]
    fn test_group_display() {
        let sources = vec![make_source("a", 10)];
        let groups = parse_spec("a;1-2:3-4", &sources).unwrap();
        assert_eq!(groups[0].to_string(), "a;1-2:3-4");
    }
}
