// Command-line interface for driving plugins outside the host application
use clap::{Parser, Subcommand};
use serde_json::Value;
use std::path::PathBuf;

use crate::error::{exit_codes, EngineError};
use crate::manifest::{discover_plugins, PluginManifest};
use crate::model::{LabelerProfile, Module};
use crate::runner::{ParamOverrides, ParserContext, PluginRunner, TemplateResult};

#[derive(Parser)]
#[command(
    name = "labelscript",
    about = "Run and validate label-editing plugins from the command line",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Quiet mode, only print errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Color output: auto, always, never
    #[arg(long, global = true)]
    pub color: Option<String>,

    /// Pass the debug flag into script executions
    #[arg(long, global = true)]
    pub debug: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List plugins discovered in the given directories
    List {
        /// Plugin search directories, in precedence order. Defaults to the
        /// platform data directory.
        #[arg(long = "plugin-dir")]
        plugin_dirs: Vec<PathBuf>,
    },
    /// Load and validate one plugin directory
    Validate {
        /// Plugin directory containing plugin.json
        plugin: PathBuf,
    },
    /// Run a template plugin and print the generated entries
    Template {
        /// Plugin directory containing plugin.json
        plugin: PathBuf,
        /// Labeler profile JSON file
        #[arg(long)]
        labeler: PathBuf,
        /// Input text files
        #[arg(long = "input")]
        inputs: Vec<PathBuf>,
        /// Text encoding of the input files
        #[arg(long)]
        encoding: Option<String>,
        /// Sample file names visible to the script
        #[arg(long = "sample")]
        samples: Vec<String>,
        /// Parameter override as key=value (value parsed as JSON, else string)
        #[arg(long = "param")]
        params: Vec<String>,
    },
    /// Run a macro plugin over a module file and print the edited entries
    Macro {
        /// Plugin directory containing plugin.json
        plugin: PathBuf,
        /// Labeler profile JSON file
        #[arg(long)]
        labeler: PathBuf,
        /// Module JSON file (a module object or a plain entry array)
        #[arg(long)]
        module: PathBuf,
        /// Parameter override as key=value (value parsed as JSON, else string)
        #[arg(long = "param")]
        params: Vec<String>,
    },
    /// Run the labeler's project constructor over a sample directory
    Construct {
        /// Root sample directory
        root: PathBuf,
        /// Labeler profile JSON file
        #[arg(long)]
        labeler: PathBuf,
        /// Accepted sample file extensions
        #[arg(long = "extension", default_values_t = vec!["wav".to_string()])]
        extensions: Vec<String>,
        /// Text encoding for label files
        #[arg(long)]
        encoding: Option<String>,
        /// Parameter override as key=value (value parsed as JSON, else string)
        #[arg(long = "param")]
        params: Vec<String>,
    },
    /// Parse a raw label file with the labeler's parser and print the entries
    Parse {
        /// Raw label file
        input: PathBuf,
        /// Labeler profile JSON file
        #[arg(long)]
        labeler: PathBuf,
        /// Sample file names visible to the script
        #[arg(long = "sample")]
        samples: Vec<String>,
        /// Text encoding of the label file
        #[arg(long)]
        encoding: Option<String>,
        /// Parameter override as key=value (value parsed as JSON, else string)
        #[arg(long = "param")]
        params: Vec<String>,
    },
}

/// Run the CLI and return the process exit code.
pub fn run(cli: Cli) -> i32 {
    match execute(cli) {
        Ok(()) => exit_codes::SUCCESS,
        Err(error) => {
            if let Some(engine_error) = error.downcast_ref::<EngineError>() {
                eprintln!("{}", engine_error.user_message("en"));
                engine_error.exit_code()
            } else {
                eprintln!("Error: {error:#}");
                exit_codes::GENERAL_ERROR
            }
        }
    }
}

fn execute(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::List { plugin_dirs } => {
            let plugin_dirs = if plugin_dirs.is_empty() {
                crate::manifest::default_plugin_dirs()
            } else {
                plugin_dirs
            };
            let plugins = discover_plugins(&plugin_dirs);
            for plugin in &plugins {
                println!(
                    "{}\t{}\t{} (by {})",
                    plugin.name,
                    plugin.kind.as_str(),
                    plugin.displayed_name_text(),
                    plugin.author
                );
            }
            if plugins.is_empty() {
                eprintln!("no plugins found");
            }
            Ok(())
        }
        Commands::Validate { plugin } => {
            let manifest = PluginManifest::load_from_dir(&plugin)?;
            println!(
                "OK: {} ({} plugin, {} parameters)",
                manifest.name,
                manifest.kind.as_str(),
                manifest.parameter_defs().len()
            );
            Ok(())
        }
        Commands::Template {
            plugin,
            labeler,
            inputs,
            encoding,
            samples,
            params,
        } => {
            let manifest = PluginManifest::load_from_dir(&plugin)?;
            let runner = runner_for(&labeler, cli.debug)?;
            let input_paths: Vec<&std::path::Path> =
                inputs.iter().map(PathBuf::as_path).collect();
            let outcome = runner.run_template(
                &manifest,
                &parse_overrides(&params),
                &input_paths,
                encoding.as_deref(),
                &samples,
            )?;
            if let Some(report) = &outcome.report {
                eprintln!("{}", report.default_text());
            }
            match outcome.value {
                TemplateResult::Entries(entries) => print_json(&entries)?,
                TemplateResult::RawLines(lines) => {
                    for line in lines {
                        println!("{line}");
                    }
                }
            }
            Ok(())
        }
        Commands::Macro {
            plugin,
            labeler,
            module,
            params,
        } => {
            let manifest = PluginManifest::load_from_dir(&plugin)?;
            let runner = runner_for(&labeler, cli.debug)?;
            let module = load_module(&module)?;
            let outcome = runner.run_macro(&manifest, &parse_overrides(&params), &module)?;
            if let Some(report) = &outcome.report {
                eprintln!("{}", report.default_text());
            }
            print_json(&outcome.value.entries)?;
            Ok(())
        }
        Commands::Construct {
            root,
            labeler,
            extensions,
            encoding,
            params,
        } => {
            let runner = runner_for(&labeler, cli.debug)?;
            let outcome = runner.run_project_constructor(
                &root,
                &parse_overrides(&params),
                encoding.as_deref(),
                &extensions,
            )?;
            print_json(&outcome.value)?;
            Ok(())
        }
        Commands::Parse {
            input,
            labeler,
            samples,
            encoding,
            params,
        } => {
            let runner = runner_for(&labeler, cli.debug)?;
            let lines = crate::filesystem::FileSystem::read_lines(&input, encoding.as_deref())?;
            let context = ParserContext {
                input_file_name: input
                    .file_name()
                    .map(|name| name.to_string_lossy().into_owned()),
                sample_file_names: samples,
                overrides: parse_overrides(&params),
                encoding,
            };
            let entries = runner.parse_lines(&lines, &context)?;
            print_json(&entries)?;
            Ok(())
        }
    }
}

fn runner_for(labeler_path: &PathBuf, debug: bool) -> anyhow::Result<PluginRunner> {
    let labeler = LabelerProfile::load(labeler_path)?;
    Ok(PluginRunner::new(labeler).with_debug(debug))
}

/// Parse `key=value` overrides; values parse as JSON when possible, else as
/// plain strings.
fn parse_overrides(params: &[String]) -> ParamOverrides {
    let mut overrides = ParamOverrides::new();
    for param in params {
        let Some((key, raw)) = param.split_once('=') else {
            tracing::warn!(param = %param, "ignoring override without '='");
            continue;
        };
        let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::from(raw));
        overrides.insert(key.to_string(), value);
    }
    overrides
}

fn load_module(path: &PathBuf) -> anyhow::Result<Module> {
    let text = std::fs::read_to_string(path)?;
    if let Ok(module) = serde_json::from_str::<Module>(&text) {
        return Ok(module);
    }
    let entries = serde_json::from_str(&text)?;
    let mut module = Module::new("module", ".");
    module.entries = entries;
    Ok(module)
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_overrides_json_and_string() {
        let overrides = parse_overrides(&[
            "repeat=3".to_string(),
            "suffix=_2".to_string(),
            "enabled=true".to_string(),
        ]);
        assert_eq!(overrides["repeat"], Value::from(3));
        assert_eq!(overrides["suffix"], Value::from("_2"));
        assert_eq!(overrides["enabled"], Value::from(true));
    }

    #[test]
    fn test_cli_parses_subcommands() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
