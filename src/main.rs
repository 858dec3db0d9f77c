//! Mixer CLI - Command-line interface for the mixer library
//!
//! Usage:
//!   mixer-cli mix --step 0.3 -s in.gcode:a -s in2.gcode:b -l "a;0-5,6-7:6-20,21" -l "b;22-29"
//!   mixer-cli mix --config recipe.json
//!   mixer-cli stack -s coarse.gcode -s fine.gcode --step 0.2 -o out.gco
//!   mixer-cli info -s in.gcode:a -s in2.gcode:b

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use log::{info, LevelFilter};
use mixer::{
    check_source_names, full_range, mix, parse_source, parse_spec, stack_sources, validate_groups,
    LayerSource, MixConfig, MixOptions, MixedGCode, DEFAULT_LAYER_CHANGE,
};
use rayon::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};

/// Reassembles G-code prints layer-by-layer from multiple sliced sources
#[derive(Parser, Debug)]
#[command(name = "mixer-cli")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Suppress per-layer progress output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Enable debug output
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Mix source layers onto a new height ladder per range specifications
    Mix {
        /// Source G-code file, optionally named
        #[arg(
            short,
            long,
            value_name = "FILE[:NAME]",
            required_unless_present = "config"
        )]
        source: Vec<String>,

        /// Range specification
        #[arg(
            short,
            long,
            value_name = "[NAME;]FROM[:TO][,...]",
            required_unless_present = "config"
        )]
        layer: Vec<String>,

        /// Output height step per layer index (mm)
        #[arg(short = 't', long, value_name = "MM", required_unless_present = "config")]
        step: Option<f64>,

        /// Forced Z-lift height (mm) overriding each layer's own delta
        #[arg(long, value_name = "MM")]
        lift: Option<f64>,

        /// Layer-change marker comment
        #[arg(
            short = 'c',
            long = "layerchange",
            value_name = "STRING",
            default_value = DEFAULT_LAYER_CHANGE
        )]
        layer_change: String,

        /// Output G-code file
        #[arg(short, long, value_name = "FILE", default_value = "out.gco")]
        out: PathBuf,

        /// File emitted verbatim before the mixed layers
        #[arg(long, value_name = "FILE")]
        head: Option<PathBuf>,

        /// File emitted verbatim after the mixed layers
        #[arg(long, value_name = "FILE")]
        tail: Option<PathBuf>,

        /// JSON mix recipe - replaces the source/layer/step flags
        #[arg(
            long,
            value_name = "FILE",
            conflicts_with_all = ["source", "layer", "step", "lift", "layer_change", "out", "head", "tail"]
        )]
        config: Option<PathBuf>,

        /// Number of threads to use (0 = auto)
        #[arg(short = 'j', long, default_value = "0")]
        threads: usize,
    },

    /// Restack every source layer bottom-up onto a new height ladder
    Stack {
        /// Source G-code file
        #[arg(short, long, value_name = "FILE", required = true)]
        source: Vec<String>,

        /// Output height step per layer index (mm)
        #[arg(short = 't', long, value_name = "MM")]
        step: f64,

        /// Number of output layers (default: every loaded layer once)
        #[arg(short = 'n', long, value_name = "N")]
        count: Option<usize>,

        /// Forced Z-lift height (mm) overriding each layer's own delta
        #[arg(long, value_name = "MM")]
        lift: Option<f64>,

        /// Layer-change marker comment
        #[arg(
            short = 'c',
            long = "layerchange",
            value_name = "STRING",
            default_value = DEFAULT_LAYER_CHANGE
        )]
        layer_change: String,

        /// Output G-code file
        #[arg(short, long, value_name = "FILE", default_value = "out.gco")]
        out: PathBuf,

        /// File emitted verbatim before the stacked layers
        #[arg(long, value_name = "FILE")]
        head: Option<PathBuf>,

        /// File emitted verbatim after the stacked layers
        #[arg(long, value_name = "FILE")]
        tail: Option<PathBuf>,

        /// Number of threads to use (0 = auto)
        #[arg(short = 'j', long, default_value = "0")]
        threads: usize,
    },

    /// Read the sources, print their layer information, and stop
    Info {
        /// Source G-code file, optionally named
        #[arg(short, long, value_name = "FILE[:NAME]", required = true)]
        source: Vec<String>,

        /// Layer-change marker comment
        #[arg(
            short = 'c',
            long = "layerchange",
            value_name = "STRING",
            default_value = DEFAULT_LAYER_CHANGE
        )]
        layer_change: String,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    let log_level = if cli.debug {
        LevelFilter::Debug
    } else if cli.quiet {
        LevelFilter::Warn
    } else {
        LevelFilter::Info
    };

    env_logger::Builder::new()
        .filter_level(log_level)
        .format_timestamp(None)
        .init();

    match cli.command {
        Commands::Mix {
            source,
            layer,
            step,
            lift,
            layer_change,
            out,
            head,
            tail,
            config,
            threads,
        } => cmd_mix(
            source,
            layer,
            step,
            lift,
            layer_change,
            out,
            head,
            tail,
            config,
            threads,
        ),
        Commands::Stack {
            source,
            step,
            count,
            lift,
            layer_change,
            out,
            head,
            tail,
            threads,
        } => cmd_stack(
            source,
            step,
            count,
            lift,
            layer_change,
            out,
            head,
            tail,
            threads,
        ),
        Commands::Info {
            source,
            layer_change,
        } => cmd_info(source, layer_change),
    }
}

/// Everything one mixing run needs, resolved from a recipe or from flags.
struct RunPlan {
    declared: Vec<(PathBuf, String)>,
    specs: Vec<String>,
    options: MixOptions,
    out: PathBuf,
    head: Option<PathBuf>,
    tail: Option<PathBuf>,
}

#[allow(clippy::too_many_arguments)]
fn cmd_mix(
    source: Vec<String>,
    layer: Vec<String>,
    step: Option<f64>,
    lift: Option<f64>,
    layer_change: String,
    out: PathBuf,
    head: Option<PathBuf>,
    tail: Option<PathBuf>,
    config_file: Option<PathBuf>,
    threads: usize,
) -> Result<()> {
    let plan = if let Some(path) = config_file {
        info!("Loading mix recipe from: {}", path.display());
        let config = MixConfig::from_file(&path).context("Failed to load mix recipe")?;
        RunPlan {
            declared: config
                .sources
                .iter()
                .map(|s| (s.file.clone(), s.name.clone()))
                .collect(),
            specs: config.layers.clone(),
            options: MixOptions {
                step: config.step,
                lift: config.lift,
                layer_change: config.layer_change.clone(),
            },
            out: config.out,
            head: config.head,
            tail: config.tail,
        }
    } else {
        let step = step.context("--step is required without --config")?;
        RunPlan {
            declared: source
                .iter()
                .map(|arg| parse_source_arg(arg))
                .collect::<Result<Vec<_>>>()?,
            specs: layer,
            options: MixOptions {
                step,
                lift,
                layer_change,
            },
            out,
            head,
            tail,
        }
    };

    init_thread_pool(threads)?;

    let progress = pipeline_bar();
    progress.set_message("Reading sources...");
    progress.set_position(5);

    let sources = load_sources(&plan.declared, &plan.options.layer_change)?;
    check_source_names(&sources)?;

    progress.set_message("Parsing ranges...");
    progress.set_position(40);

    let mut groups = Vec::new();
    for spec in &plan.specs {
        groups.extend(parse_spec(spec, &sources)?);
    }
    let groups = validate_groups(groups)?;

    progress.set_message("Mixing layers...");
    progress.set_position(60);

    let output = mix(&groups, &plan.options);

    progress.set_message("Writing output...");
    progress.set_position(90);

    write_output(&plan.out, &output, plan.head.as_deref(), plan.tail.as_deref())?;

    progress.set_position(100);
    progress.finish_with_message("Done!");

    println!();
    println!("Mixing complete!");
    println!("  Output: {}", plan.out.display());
    println!("  Layers: {}", output.stats.layer_count);
    println!("  Lifted layers: {}", output.stats.lifted_count);
    println!("  G-code lines: {}", output.line_count());

    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn cmd_stack(
    source: Vec<String>,
    step: f64,
    count: Option<usize>,
    lift: Option<f64>,
    layer_change: String,
    out: PathBuf,
    head: Option<PathBuf>,
    tail: Option<PathBuf>,
    threads: usize,
) -> Result<()> {
    init_thread_pool(threads)?;

    let progress = pipeline_bar();
    progress.set_message("Reading sources...");
    progress.set_position(5);

    let declared = source
        .iter()
        .map(|arg| parse_source_arg(arg))
        .collect::<Result<Vec<_>>>()?;
    let sources = load_sources(&declared, &layer_change)?;

    progress.set_message("Stacking layers...");
    progress.set_position(50);

    let combined = stack_sources(&sources);
    let total = combined.layer_count();
    let count = count.unwrap_or(total);
    info!(
        "Stacking {} layers from {} sources into {} output layers",
        total,
        sources.len(),
        count
    );

    let group = full_range(&combined, count)?;
    let groups = validate_groups(vec![group])?;
    let options = MixOptions {
        step,
        lift,
        layer_change,
    };
    let output = mix(&groups, &options);

    progress.set_message("Writing output...");
    progress.set_position(90);

    write_output(&out, &output, head.as_deref(), tail.as_deref())?;

    progress.set_position(100);
    progress.finish_with_message("Done!");

    println!();
    println!("Stacking complete!");
    println!("  Output: {}", out.display());
    println!("  Layers: {}", output.stats.layer_count);
    println!("  G-code lines: {}", output.line_count());

    Ok(())
}

fn cmd_info(source: Vec<String>, layer_change: String) -> Result<()> {
    let declared = source
        .iter()
        .map(|arg| parse_source_arg(arg))
        .collect::<Result<Vec<_>>>()?;
    let sources = load_sources(&declared, &layer_change)?;
    check_source_names(&sources)?;

    println!("Sources:");
    for ((file, _), source) in declared.iter().zip(&sources) {
        let name = if source.name.is_empty() {
            "(anonymous)"
        } else {
            &source.name
        };
        println!(
            "  {:<12} {:<32} {:>5} layers  {}",
            name,
            file.display(),
            source.layer_count(),
            if source.has_lift { "Z-lift" } else { "" }
        );
    }

    Ok(())
}

/// Split a FILE[:NAME] source argument. Names are single words.
fn parse_source_arg(arg: &str) -> Result<(PathBuf, String)> {
    match arg.split_once(':') {
        Some((file, name)) => {
            if file.is_empty()
                || name.is_empty()
                || !name.chars().all(|c| c.is_alphanumeric() || c == '_')
            {
                bail!("source parameter not valid: \"{}\"", arg);
            }
            Ok((PathBuf::from(file), name.to_string()))
        }
        None => {
            if arg.is_empty() {
                bail!("source parameter not valid: \"{}\"", arg);
            }
            Ok((PathBuf::from(arg), String::new()))
        }
    }
}

fn init_thread_pool(threads: usize) -> Result<()> {
    if threads > 0 {
        rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()
            .context("Failed to initialize thread pool")?;
    }
    Ok(())
}

fn pipeline_bar() -> ProgressBar {
    let progress = ProgressBar::new(100);
    progress.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}% {msg}")
            .unwrap()
            .progress_chars("#>-"),
    );
    progress
}

/// Read and parse every declared source, in declaration order.
///
/// Sources are independent, so they parse in parallel; collect keeps the
/// declared order deterministic.
fn load_sources(declared: &[(PathBuf, String)], layer_change: &str) -> Result<Vec<LayerSource>> {
    declared
        .par_iter()
        .map(|(file, name)| {
            info!("Reading file '{}'", file.display());
            let gcode = fs::read_to_string(file)
                .with_context(|| format!("Failed to read source file: {}", file.display()))?;
            parse_source(name, &gcode, layer_change)
                .with_context(|| format!("Failed to parse source file: {}", file.display()))
        })
        .collect()
}

/// Assemble the final document: provenance header, head file, mixed layers,
/// tail file.
fn write_output(
    out: &Path,
    output: &MixedGCode,
    head: Option<&Path>,
    tail: Option<&Path>,
) -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let mut document = format!("; mixer-cli {}\n", args.join(" "));

    if let Some(path) = head {
        document.push_str(
            &fs::read_to_string(path)
                .with_context(|| format!("Failed to read head file: {}", path.display()))?,
        );
    }
    document.push_str(output.content());
    if let Some(path) = tail {
        document.push_str(
            &fs::read_to_string(path)
                .with_context(|| format!("Failed to read tail file: {}", path.display()))?,
        );
    }

    fs::write(out, document)
        .with_context(|| format!("Failed to write output file: {}", out.display()))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_cli() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_source_arg_named() {
        let (file, name) = parse_source_arg("in.gcode:a").unwrap();
        assert_eq!(file, PathBuf::from("in.gcode"));
        assert_eq!(name, "a");
    }

    #[test]
    fn test_parse_source_arg_anonymous() {
        let (file, name) = parse_source_arg("in.gcode").unwrap();
        assert_eq!(file, PathBuf::from("in.gcode"));
        assert_eq!(name, "");
    }

    #[test]
    fn test_parse_source_arg_rejects_bad_names() {
        assert!(parse_source_arg("in.gcode:").is_err());
        assert!(parse_source_arg(":a").is_err());
        assert!(parse_source_arg("in.gcode:a b").is_err());
        assert!(parse_source_arg("").is_err());
    }
}
