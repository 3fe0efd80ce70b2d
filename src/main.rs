//! flowline CLI: execute a named flow from the command line.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::info;

use flowline::{Config, IndexMap, Runtime};

/// Chain templated HTTP API calls from YAML flow definitions.
#[derive(Parser)]
#[command(name = "flowline", version)]
struct Args {
    /// Basename of the YAML file containing a flow definition
    flow: String,

    /// Basename of a profile YAML file to include (repeatable)
    #[arg(long = "profile", value_name = "PROFILE")]
    profiles: Vec<String>,

    /// Directory containing flow configuration data (default: current directory)
    #[arg(long, value_name = "DIR")]
    data_path: Option<PathBuf>,

    /// Directory containing flow definitions (default: <data-path>/flows)
    #[arg(long, value_name = "DIR")]
    flow_path: Option<PathBuf>,

    /// Location of user-defined template functions (default: <data-path>/functions)
    #[arg(long, value_name = "DIR")]
    function_path: Option<PathBuf>,

    /// Directory containing profile YAML files (default: <data-path>/profiles)
    #[arg(long, value_name = "DIR")]
    profile_path: Option<PathBuf>,

    /// Directory containing template files (default: <data-path>/templates)
    #[arg(long, value_name = "DIR")]
    template_path: Option<PathBuf>,
}

impl Args {
    fn config(&self) -> Config {
        let mut config = Config::new();
        if let Some(path) = &self.data_path {
            config = config.with_data_path(path);
        }
        if let Some(path) = &self.flow_path {
            config = config.with_flow_path(path);
        }
        if let Some(path) = &self.function_path {
            config = config.with_function_path(path);
        }
        if let Some(path) = &self.profile_path {
            config = config.with_profile_path(path);
        }
        if let Some(path) = &self.template_path {
            config = config.with_template_path(path);
        }
        config
    }
}

fn run(args: &Args) -> anyhow::Result<bool> {
    let config = args.config();
    info!(
        data = %config.data_path().display(),
        flows = %config.flow_path().display(),
        functions = %config.function_path().display(),
        profiles = %config.profile_path().display(),
        templates = %config.template_path().display(),
        "data paths"
    );

    let runtime = Runtime::new(config)?;
    let flow = runtime.execute(&args.flow, &args.profiles, IndexMap::new())?;
    Ok(flow.succeeded())
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    match run(&args) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("flowline: {e:#}");
            ExitCode::FAILURE
        }
    }
}
