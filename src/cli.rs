use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Clone, Parser)]
#[command(name = "gui-forms")]
#[command(about = "Instrument compiled classes bound to GUI form descriptors, skipping up-to-date pairs")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Directory holding the `.form` descriptors [default: src/main/java]
    #[arg(long, value_name = "DIR", global = true)]
    pub source: Option<PathBuf>,

    /// Compiled class root, also where descriptors are published [default: target/classes]
    #[arg(long, value_name = "DIR", global = true)]
    pub output: Option<PathBuf>,

    /// Intermediate build directory holding the cache file [default: target]
    #[arg(long, value_name = "DIR", global = true)]
    pub build_dir: Option<PathBuf>,

    /// Compile dependency; repeatable, each value may be a path list
    #[arg(long, value_name = "PATHS", global = true)]
    pub classpath: Vec<String>,

    /// File listing compile dependencies, one per line
    #[arg(long, value_name = "FILE", global = true)]
    pub classpath_file: Option<PathBuf>,

    /// Target runtime home [default: $JAVA_HOME]
    #[arg(long, value_name = "DIR", global = true)]
    pub java_home: Option<PathBuf>,

    #[arg(long, value_name = "FILTER", default_value = "info", global = true)]
    pub log_level: String,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Commands {
    /// Instrument every stale descriptor/class pair (default)
    Instrument {
        #[arg(long)]
        use_jb_scaling: bool,

        #[arg(long, value_name = "JAR")]
        instrumenter: Option<PathBuf>,
    },
    /// Print the resolved classpath
    Classpath,
    /// Delete the cache file so the next run reprocesses everything
    Clean,
}

impl Cli {
    pub fn resolved_command(&self) -> Commands {
        self.command.clone().unwrap_or(Commands::Instrument {
            use_jb_scaling: false,
            instrumenter: None,
        })
    }
}
