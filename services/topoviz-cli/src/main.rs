//! topoviz command-line runner.
//!
//! Loads a workflow document, collects its inputs from a params file or
//! console prompts, and renders the requested figures.

mod config;
mod params;
mod prompt;

use std::io;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use serde_json::Map;
use topoviz_common::TopovizError;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};
use workflow::{RunMode, Workflow};

use config::CliConfig;

#[derive(Parser, Debug)]
#[command(name = "topoviz")]
#[command(about = "Run a topoviz workflow document")]
struct Args {
    /// Workflow JSON file
    workflow: PathBuf,

    /// Read inputs from a params file; without a path, write
    /// `<workflow>.params` with the defaults and exit
    #[arg(long)]
    file: Option<Option<PathBuf>>,

    /// Renderer(s) to run: fig2d, fig3d or both (default: the document's run.mode)
    #[arg(long)]
    mode: Option<String>,

    /// Prompt only for inputs that select data files
    #[arg(long)]
    fast: bool,

    /// Directory for relative output paths
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Log level
    #[arg(long, default_value = "warn")]
    log_level: String,

    /// Emit logs as JSON
    #[arg(long)]
    log_json: bool,
}

fn init_tracing(level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let builder = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_level(true)
        .with_writer(io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn run(args: Args) -> Result<()> {
    let config = CliConfig::from_env()?;
    let workflow = Workflow::from_file(&args.workflow)
        .with_context(|| format!("Failed to load workflow {}", args.workflow.display()))?;
    workflow.validate_defaults()?;

    let provided = match &args.file {
        Some(None) => {
            let path = params::default_params_path(&args.workflow);
            params::write_params_file(&path, workflow.input_specs())?;
            println!("Wrote default params to {}", path.display());
            return Ok(());
        }
        Some(Some(path)) => params::read_params_file(path)?,
        None if workflow.interactive() => {
            let only = args.fast.then(|| workflow.loader_inputs());
            prompt::prompt_inputs(
                workflow.input_specs(),
                only.as_ref(),
                &mut io::stdin().lock(),
                &mut io::stdout(),
            )?
        }
        None => {
            info!("Workflow is not interactive; using input defaults");
            Map::new()
        }
    };

    let mode = match &args.mode {
        Some(mode) => Some(mode.parse::<RunMode>()?),
        None => config.mode,
    };
    let workflow = match args.output_dir.or(config.output_dir) {
        Some(dir) => workflow.with_output_dir(dir),
        None => workflow,
    };

    let inputs = workflow.resolve_inputs(&provided)?;
    let output = workflow.run(&inputs, mode)?;

    if let Some(rendered) = &output.fig2d {
        match &rendered.saved {
            Some(path) => println!("Saved 2D figure to {}", path.display()),
            None => println!("Rendered 2D figure (no fig2d.save_path set)"),
        }
    }
    if let Some(rendered) = &output.fig3d {
        println!("Saved 3D screenshot to {}", rendered.screenshot.display());
        println!("Camera position: {}", serde_json::to_string(&rendered.camera)?);
    }
    Ok(())
}

fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    let args = Args::parse();
    init_tracing(&args.log_level, args.log_json);

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            match err.chain().find_map(|cause| cause.downcast_ref::<TopovizError>()) {
                Some(cause) => {
                    error!(code = cause.error_code(), error = %cause, "Workflow failed");
                    eprintln!("{}: {:#}", cause.error_code(), err);
                }
                None => eprintln!("Error: {:#}", err),
            }
            ExitCode::FAILURE
        }
    }
}
