#![allow(
    clippy::needless_pass_by_value,    // clap requires owned values
    clippy::fn_params_excessive_bools, // CLI commands have many boolean flags
)]

//! docmerge CLI - template inspection, merging and preview
//!
//! ```bash
//! # Show the text and variables of a template
//! docmerge extract offer.docx
//!
//! # Merge an entry (JSON object of values) into a template
//! docmerge merge offer.docx --entry ana.json -o offer-ana.docx
//!
//! # Same, as an HTML preview on stdout
//! docmerge merge offer.docx --entry ana.json --preview
//! ```

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use docmerge_backend::{DocxTextExtractor, MergeEngine, PreviewRenderer, TextExtractor};
use docmerge_core::{DocmergeConfig, Entry, ScalarValue, Variable};
use docmerge_ocr::{OcrEngine, TesseractCli};
use docmerge_pipeline::{TemplateImporter, Upload};
use docmerge_storage::MemoryFileStorage;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Verbosity level for output control
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Verbosity {
    Quiet,
    Normal,
    Verbose,
}

impl Verbosity {
    const fn from_flags(quiet: bool, verbose: bool) -> Self {
        if quiet {
            Self::Quiet
        } else if verbose {
            Self::Verbose
        } else {
            Self::Normal
        }
    }

    const fn should_show_output(self) -> bool {
        !matches!(self, Self::Quiet)
    }

    const fn log_filter(self) -> &'static str {
        match self {
            Self::Quiet => "docmerge=error",
            Self::Normal => "docmerge=warn",
            Self::Verbose => "docmerge=debug",
        }
    }
}

#[derive(Parser, Debug)]
#[command(
    name = "docmerge",
    about = "Merge form entries into DOCX templates",
    long_about = "Detect {{placeholders}} in DOCX templates, merge entry values into them \
                  and render HTML previews.",
    version
)]
struct Args {
    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Show detailed processing information
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Configuration file (default: ./docmerge.toml, then ~/.docmerge.toml)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the text and detected variables of a template
    Extract {
        /// DOCX template or scanned image
        #[arg(value_name = "FILE")]
        input: PathBuf,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Merge entry values into a template
    #[command(long_about = "Merge entry values into a template.\n\
                      \n\
                      The entry file is a JSON object of values, e.g. \
                      {\"first_name\": \"Ana\", \"start\": \"2024-03-09\"}, or an entry \
                      with a \"values\" object.")]
    Merge {
        /// DOCX template
        #[arg(value_name = "TEMPLATE")]
        template: PathBuf,

        /// JSON file with the entry values
        #[arg(short, long, value_name = "JSON")]
        entry: PathBuf,

        /// JSON file with variable definitions (labels, helper bindings)
        #[arg(long, value_name = "JSON")]
        variables: Option<PathBuf>,

        /// Output file (default: <template>-merged.docx, or stdout with --preview)
        #[arg(short, long, value_name = "OUTPUT")]
        output: Option<PathBuf>,

        /// Render an HTML preview instead of a document
        #[arg(long)]
        preview: bool,

        /// Fail instead of returning the unmerged template
        #[arg(long)]
        strict: bool,
    },

    /// Render a DOCX file as an HTML preview
    Preview {
        #[arg(value_name = "DOCX")]
        input: PathBuf,

        /// Output file (default: stdout)
        #[arg(short, long, value_name = "OUTPUT")]
        output: Option<PathBuf>,
    },

    /// Run OCR on an image
    Ocr {
        #[arg(value_name = "IMAGE")]
        input: PathBuf,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands
#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Create a docmerge.toml with the default settings
    Init {
        /// Create in user home directory (~/.docmerge.toml) instead of current directory
        #[arg(long)]
        global: bool,

        /// Overwrite existing configuration file
        #[arg(long)]
        force: bool,
    },

    /// Display the current effective configuration
    Show {
        /// Output as JSON instead of TOML
        #[arg(long)]
        json: bool,
    },

    /// Show which configuration file is in effect
    Path,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let verbosity = Verbosity::from_flags(args.quiet, args.verbose);

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(verbosity.log_filter())),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = DocmergeConfig::load(args.config.as_deref())
        .context("Failed to load configuration")?;

    match args.command {
        Commands::Extract { input, json } => extract_command(&config, &input, json).await,
        Commands::Merge {
            template,
            entry,
            variables,
            output,
            preview,
            strict,
        } => merge_command(
            &config,
            &template,
            &entry,
            variables.as_deref(),
            output,
            preview,
            strict,
            verbosity,
        ),
        Commands::Preview { input, output } => preview_command(&input, output.as_deref()),
        Commands::Ocr { input } => ocr_command(&config, &input).await,
        Commands::Config { action } => config_command(&config, action, verbosity),
    }
}

async fn extract_command(config: &DocmergeConfig, input: &Path, json: bool) -> Result<()> {
    let bytes = fs::read(input).with_context(|| format!("Failed to read {}", input.display()))?;
    let filename = file_name(input);

    // nothing is persisted from the CLI
    let importer = TemplateImporter::new(
        Arc::new(TesseractCli::new(&config.ocr)),
        Arc::new(MemoryFileStorage::new()),
        config.ocr.fallback_message.clone(),
    );
    let outcome = importer
        .import(&Upload::new(bytes, filename, None))
        .await
        .with_context(|| format!("Failed to extract {}", input.display()))?;

    if json {
        let value = serde_json::json!({
            "templateText": outcome.template_text,
            "detectedVariables": outcome.detected_variables,
            "extractionDegraded": outcome.extraction_degraded,
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    if outcome.extraction_degraded {
        eprintln!(
            "{} No text could be extracted; variables must be added manually",
            "Warning:".yellow().bold()
        );
    }
    println!("{}", outcome.template_text);
    println!();
    println!(
        "{} ({})",
        "Variables".bold(),
        outcome.detected_variables.len()
    );
    for var in &outcome.detected_variables {
        println!("  {:<24} {}", var.name.cyan(), var.label);
    }
    Ok(())
}

/// Entry values from either a plain object or an object with `values`
fn load_entry(path: &Path) -> Result<Entry> {
    let content =
        fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let mut json: serde_json::Value = serde_json::from_str(&content)
        .with_context(|| format!("Invalid JSON in {}", path.display()))?;
    if json.get("values").is_some_and(serde_json::Value::is_object) {
        json = json["values"].take();
    }
    let values: HashMap<String, ScalarValue> = serde_json::from_value(json)
        .with_context(|| format!("{} is not an object of scalar values", path.display()))?;

    let id = path
        .file_stem()
        .map_or_else(|| "entry".to_string(), |s| s.to_string_lossy().into_owned());
    Ok(Entry::new(id, "cli", values))
}

#[allow(clippy::too_many_arguments)]
fn merge_command(
    config: &DocmergeConfig,
    template: &Path,
    entry: &Path,
    variables: Option<&Path>,
    output: Option<PathBuf>,
    preview: bool,
    strict: bool,
    verbosity: Verbosity,
) -> Result<()> {
    let bytes =
        fs::read(template).with_context(|| format!("Failed to read {}", template.display()))?;
    let entry = load_entry(entry)?;
    let variables: Vec<Variable> = match variables {
        Some(path) => {
            let content = fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            serde_json::from_str(&content)
                .with_context(|| format!("Invalid variable list in {}", path.display()))?
        }
        None => Vec::new(),
    };

    let raw_text = DocxTextExtractor::new().extract_text(&bytes).unwrap_or_else(|e| {
        tracing::warn!("Could not read template text: {e}");
        String::new()
    });
    let outcome = MergeEngine::new(&config.merge)
        .merge(&bytes, &raw_text, &variables, &entry)
        .with_context(|| format!("Failed to merge {}", template.display()))?;

    if outcome.degraded {
        let reason = outcome.reason.as_deref().unwrap_or("verification failed");
        if strict {
            bail!(
                "Merge degraded: {reason} (unresolved: {})",
                outcome.unresolved.join(", ")
            );
        }
        eprintln!(
            "{} Merge degraded, writing the unmerged template: {reason}",
            "Warning:".yellow().bold()
        );
        if !outcome.unresolved.is_empty() {
            eprintln!("  unresolved: {}", outcome.unresolved.join(", "));
        }
    }

    if preview {
        let html = PreviewRenderer::new().render(&outcome.bytes)?;
        return write_text_output(&html, output.as_deref());
    }

    let path = output.unwrap_or_else(|| merged_path(template));
    fs::write(&path, &outcome.bytes)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    if verbosity.should_show_output() {
        println!(
            "{} {} ({} substitutions)",
            "Wrote".green().bold(),
            path.display(),
            outcome.substitutions
        );
    }
    Ok(())
}

fn preview_command(input: &Path, output: Option<&Path>) -> Result<()> {
    let bytes = fs::read(input).with_context(|| format!("Failed to read {}", input.display()))?;
    let html = PreviewRenderer::new()
        .render(&bytes)
        .with_context(|| format!("Failed to render {}", input.display()))?;
    write_text_output(&html, output)
}

async fn ocr_command(config: &DocmergeConfig, input: &Path) -> Result<()> {
    let engine = TesseractCli::new(&config.ocr);
    let text = engine
        .recognize(input)
        .await
        .with_context(|| format!("OCR of {} failed", input.display()))?;
    println!("{}", text.trim_end());
    Ok(())
}

fn config_command(config: &DocmergeConfig, action: ConfigAction, verbosity: Verbosity) -> Result<()> {
    match action {
        ConfigAction::Init { global, force } => config_init(global, force, verbosity),
        ConfigAction::Show { json } => {
            if json {
                println!("{}", serde_json::to_string_pretty(config)?);
            } else {
                print!("{}", config.to_toml()?);
            }
            Ok(())
        }
        ConfigAction::Path => {
            match DocmergeConfig::discover_path() {
                Some(path) => println!("{}", path.display()),
                None => println!("(none, using defaults)"),
            }
            Ok(())
        }
    }
}

/// Create a new configuration file with the default settings
fn config_init(global: bool, force: bool, verbosity: Verbosity) -> Result<()> {
    let config_path = if global {
        dirs::home_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not determine home directory"))?
            .join(".docmerge.toml")
    } else {
        PathBuf::from("docmerge.toml")
    };

    if config_path.exists() && !force {
        bail!(
            "Configuration file already exists: {} (use --force to overwrite)",
            config_path.display()
        );
    }

    let content = format!(
        "# docmerge configuration\n# Environment variables DOCMERGE_* override these values.\n\n{}",
        DocmergeConfig::default().to_toml()?
    );
    fs::write(&config_path, content)
        .with_context(|| format!("Failed to write config file: {}", config_path.display()))?;

    if verbosity.should_show_output() {
        println!(
            "{} Created configuration file: {}",
            "Success:".green().bold(),
            config_path.display()
        );
    }
    Ok(())
}

fn write_text_output(text: &str, output: Option<&Path>) -> Result<()> {
    match output {
        Some(path) => fs::write(path, text)
            .with_context(|| format!("Failed to write {}", path.display())),
        None => {
            println!("{text}");
            Ok(())
        }
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map_or_else(|| "upload".to_string(), |n| n.to_string_lossy().into_owned())
}

/// `offer.docx` → `offer-merged.docx` next to the template
fn merged_path(template: &Path) -> PathBuf {
    let stem = template.file_stem().unwrap_or_default().to_string_lossy();
    template.with_file_name(format!("{stem}-merged.docx"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merged_path() {
        assert_eq!(
            merged_path(Path::new("/tmp/offer.docx")),
            PathBuf::from("/tmp/offer-merged.docx")
        );
    }

    #[test]
    fn test_load_entry_accepts_both_shapes() {
        let dir = tempfile::tempdir().unwrap();
        let plain = dir.path().join("ana.json");
        fs::write(&plain, r#"{"first_name": "Ana", "age": 31}"#).unwrap();
        let entry = load_entry(&plain).unwrap();
        assert_eq!(entry.id, "ana");
        assert_eq!(entry.values["age"], ScalarValue::Number(31.0));

        let wrapped = dir.path().join("bo.json");
        fs::write(&wrapped, r#"{"id": "x", "values": {"first_name": "Bo"}}"#).unwrap();
        let entry = load_entry(&wrapped).unwrap();
        assert_eq!(entry.values["first_name"], ScalarValue::Text("Bo".into()));

        let bad = dir.path().join("bad.json");
        fs::write(&bad, r#"{"nested": {"a": 1}}"#).unwrap();
        assert!(load_entry(&bad).is_err());
    }

    #[test]
    fn test_verbosity_filters() {
        assert_eq!(Verbosity::from_flags(true, false).log_filter(), "docmerge=error");
        assert_eq!(Verbosity::from_flags(false, true).log_filter(), "docmerge=debug");
        assert!(!Verbosity::Quiet.should_show_output());
    }
}
