//! Judgebox CLI
//!
//! A command-line tool for judging code in disposable Docker containers.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use judgebox::{Config, DockerRuntime, EXAMPLE_CONFIG, ExecutionRequest, Judge, ResourceLimits};
use tracing::{Level, debug, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "judgebox")]
#[command(about = "A tool for running untrusted code in disposable containers")]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a new configuration file
    Init {
        /// Output path (default: judgebox.toml)
        #[arg(short, long, default_value = "judgebox.toml")]
        output: PathBuf,

        /// Overwrite existing file
        #[arg(short, long)]
        force: bool,
    },

    /// Run a program (compile if needed, then execute)
    Run {
        /// Source file to run
        #[arg(value_name = "FILE")]
        source: PathBuf,

        /// Language ID (e.g., cpp, python)
        #[arg(short, long)]
        language: String,

        /// Input file fed to the program's stdin ("-" reads this process's stdin)
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Time limit in seconds
        #[arg(short, long)]
        time_limit: Option<f64>,

        /// Memory limit in KB
        #[arg(short, long)]
        memory_limit: Option<u64>,

        /// Print the result as JSON instead of the program's output
        #[arg(long)]
        json: bool,
    },

    /// List available languages
    Languages,

    /// Show effective configuration
    ShowConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::from_default_env().add_directive(Level::DEBUG.into())
    } else {
        EnvFilter::from_default_env().add_directive(Level::INFO.into())
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config = if let Some(ref path) = cli.config {
        info!(?path, "loading configuration");
        Config::from_file(path).context("failed to load configuration")?
    } else {
        debug!("using default configuration");
        Config::default()
    };

    match cli.command {
        Commands::Init { output, force } => init_config(&output, force).await,
        Commands::Run {
            source,
            language,
            input,
            time_limit,
            memory_limit,
            json,
        } => {
            let limits = ResourceLimits {
                time_limit,
                memory_limit,
                ..Default::default()
            };
            run_execute(config, &source, language, input.as_deref(), limits, json).await
        }
        Commands::Languages => {
            list_languages(&config);
            Ok(())
        }
        Commands::ShowConfig => {
            show_config(&config);
            Ok(())
        }
    }
}

async fn read_input(path: &Path) -> Result<String> {
    if path == Path::new("-") {
        let mut input = String::new();
        tokio::io::AsyncReadExt::read_to_string(&mut tokio::io::stdin(), &mut input)
            .await
            .context("failed to read stdin")?;
        return Ok(input);
    }
    tokio::fs::read_to_string(path)
        .await
        .context("failed to read input file")
}

async fn run_execute(
    config: Config,
    source: &Path,
    language: String,
    input: Option<&Path>,
    limits: ResourceLimits,
    json: bool,
) -> Result<()> {
    let code = tokio::fs::read_to_string(source)
        .await
        .context("failed to read source file")?;

    let mut request = ExecutionRequest::new(language, code);
    if let Some(path) = input {
        request = request.with_input(read_input(path).await?);
    }
    // Only explicitly-specified values, so they don't override per-language defaults
    if limits != ResourceLimits::default() {
        request = request.with_limits(limits);
    }

    let runtime = DockerRuntime::connect(&config).context("failed to connect to docker")?;
    runtime
        .ping()
        .await
        .context("docker daemon is not reachable")?;
    let judge = Judge::new(config, Arc::new(runtime));
    info!(language = %request.language, "running program");
    let result = judge.execute(&request).await?;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&result).context("failed to serialize result")?
        );
    } else {
        print!("{}", result.output);
        if !result.error.is_empty() {
            eprint!("{}", result.error);
        }
    }

    if result.truncated {
        warn!("output exceeded the configured cap and was truncated");
    }

    // Log execution info via tracing (stderr), keeping stdout clean for piping
    info!(
        status = ?result.status,
        time = format_args!("{}ms", result.execution_time_ms),
        exit_code = ?result.exit_code,
        "execution result"
    );

    if result.is_success() {
        Ok(())
    } else {
        let code = result
            .exit_code
            .and_then(|code| i32::try_from(code).ok())
            .filter(|code| *code > 0)
            .unwrap_or(1);
        std::process::exit(code);
    }
}

fn list_languages(config: &Config) {
    println!("Available languages:\n");

    let mut languages: Vec<_> = config.languages.iter().collect();
    languages.sort_by_key(|(id, _)| *id);

    for (id, lang) in languages {
        let lang_type = if lang.is_compiled() {
            "compiled"
        } else {
            "interpreted"
        };
        println!("  {:<15} {} ({})", id, lang.name, lang_type);
    }
}

fn show_config(config: &Config) {
    println!("Image: {}", config.image);
    println!(
        "Docker host: {}",
        config.docker_host.as_deref().unwrap_or("(platform default)")
    );
    println!("Working directory: {}", config.working_dir);
    println!("User: {}", config.user.as_deref().unwrap_or("(image default)"));
    println!("Max concurrent environments: {}", config.max_concurrent);
    println!();
    println!("Default resource limits:");
    println!("  Time limit: {:?} s", config.default_limits.time_limit);
    println!(
        "  Compile time limit: {:?} s",
        config.default_limits.compile_time_limit
    );
    println!(
        "  Memory limit: {:?} KB",
        config.default_limits.memory_limit
    );
    println!("  CPU limit: {:?} cores", config.default_limits.cpu_limit);
    println!("  Max processes: {:?}", config.default_limits.max_processes);
    println!("  Max output: {:?} KB", config.default_limits.max_output);
    println!();
    println!("Languages configured: {}", config.languages.len());
}

async fn init_config(output: &Path, force: bool) -> Result<()> {
    if output.exists() && !force {
        anyhow::bail!(
            "Configuration file already exists at '{}'. Use --force to overwrite.",
            output.display()
        );
    }

    tokio::fs::write(output, EXAMPLE_CONFIG)
        .await
        .context("failed to write configuration file")?;

    println!("Created configuration file at '{}'", output.display());
    Ok(())
}
