//! TOOLRELAY CLI
//!
//! Compile attribute descriptions, flatten engine output, and run scripted
//! sessions whose tool calls cross a stdio boundary.

#![warn(missing_docs)]
#![warn(clippy::all)]

mod run;

use clap::{Parser, Subcommand};
use color_eyre::Result;
use color_eyre::eyre::WrapErr;
use std::path::{Path, PathBuf};
use toolrelay_core::StructuredContent;
use toolrelay_tool::{AttributeDescription, ContentFlattener, SchemaCompiler};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "toolrelay")]
#[command(about = "TOOLRELAY - tool invocation broker and schema compiler", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile an attribute description into a schema
    Compile {
        /// Path to the attribute description
        #[arg(short, long)]
        file: PathBuf,
        /// Name of the root object
        #[arg(short, long, default_value = "Root")]
        name: String,
        /// Print JSON Schema instead of the schema tree
        #[arg(long)]
        json_schema: bool,
    },
    /// Flatten generated content into a plain value
    Flatten {
        /// Path to the content
        #[arg(short, long)]
        file: PathBuf,
    },
    /// Run a scripted session over stdio
    Run {
        /// Tool definitions
        #[arg(short, long)]
        tools: PathBuf,
        /// Scripted engine turns
        #[arg(short, long)]
        script: PathBuf,
        /// Prompt for the generation
        #[arg(short, long)]
        prompt: String,
        /// Runtime configuration
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

fn compile_file(path: &Path, name: &str, json_schema: bool) -> Result<String> {
    let text = std::fs::read_to_string(path)
        .wrap_err_with(|| format!("reading {}", path.display()))?;
    let description = AttributeDescription::from_json_str(&text)?;
    let schema = SchemaCompiler::new().compile(&description, name);

    let output = if json_schema {
        serde_json::to_string_pretty(&schema.to_json_schema())?
    } else {
        serde_json::to_string_pretty(&schema)?
    };
    Ok(output)
}

fn flatten_file(path: &Path) -> Result<String> {
    let text = std::fs::read_to_string(path)
        .wrap_err_with(|| format!("reading {}", path.display()))?;
    let value = ContentFlattener::new().flatten(&StructuredContent::from_json_text(text));
    Ok(serde_json::to_string_pretty(&value.to_json())?)
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("toolrelay=info")),
        )
        .init();

    match cli.command {
        Commands::Compile {
            file,
            name,
            json_schema,
        } => {
            println!("{}", compile_file(&file, &name, json_schema)?);
            Ok(())
        }
        Commands::Flatten { file } => {
            println!("{}", flatten_file(&file)?);
            Ok(())
        }
        Commands::Run {
            tools,
            script,
            prompt,
            config,
        } => {
            let options = run::RunOptions::load(&tools, &script, config.as_deref())?;
            let text =
                run::run_session(options, &prompt, run::stdin_lines(), tokio::io::stdout())
                    .await?;
            println!("{}", text);
            Ok(())
        }
    }
}
