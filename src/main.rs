use anyhow::Result;
use clap::Parser;
use gui_forms::cache::CacheFile;
use gui_forms::classpath::ResolutionContextBuilder;
use gui_forms::cli::{Cli, Commands};
use gui_forms::config::{
    host_environment, resolve_build_dir, resolve_compile_classpath, resolve_instrumenter,
    resolve_output_dir, resolve_source_dir,
};
use gui_forms::descriptor::FormParser;
use gui_forms::orchestrator::{Orchestrator, RunOptions};
use gui_forms::transform::ExternalTransformer;
use serde::Serialize;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Debug, Serialize)]
struct CleanResult {
    cache_file: PathBuf,
    removed: bool,
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_new(&cli.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    match cli.resolved_command() {
        Commands::Clean => {
            let cache = CacheFile::new(&resolve_build_dir(&cli));
            let removed = cache.delete();
            let result = CleanResult {
                cache_file: cache.path().to_path_buf(),
                removed,
            };
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Commands::Classpath => {
            let env = host_environment(&cli);
            let compile_classpath = resolve_compile_classpath(&cli)?;
            let context = ResolutionContextBuilder::new(&env).build(&compile_classpath)?;
            println!("{}", serde_json::to_string_pretty(&context)?);
        }
        Commands::Instrument {
            use_jb_scaling,
            instrumenter,
        } => {
            let options = RunOptions {
                source_dir: resolve_source_dir(&cli),
                output_dir: resolve_output_dir(&cli),
                build_dir: resolve_build_dir(&cli),
                compile_classpath: resolve_compile_classpath(&cli)?,
                use_jb_scaling,
            };
            let transformer = ExternalTransformer::new(resolve_instrumenter(instrumenter.as_deref())?);
            let orchestrator = Orchestrator::new(host_environment(&cli), FormParser, transformer);
            let report = orchestrator.run(&options)?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            if report.has_errors() {
                return Ok(ExitCode::FAILURE);
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}
