//! Mix recipe files.
//!
//! A recipe is the declarative alternative to spelling every flag out on the
//! command line: a JSON document naming the sources, range specifications,
//! and numeric parameters of one mixing run.

mod mix_config;

pub use mix_config::{MixConfig, SourceConfig};
