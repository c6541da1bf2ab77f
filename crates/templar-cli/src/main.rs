//! `templar` - translate templates between Liquid and Nunjucks.

mod config;

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::io::{Read, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use templar::{TranslateArgs, translate};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "templar", version, about = "Translate templates between Liquid and Nunjucks")]
struct Cli {
    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Translate a template
    Translate {
        /// Source language
        #[arg(long)]
        from: Option<String>,

        /// Target language
        #[arg(long)]
        to: Option<String>,

        /// Input file (stdin if omitted)
        #[arg(value_name = "INPUT")]
        input: Option<PathBuf>,

        /// Output file (stdout if omitted)
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,

        /// Config file (defaults to ./templar.toml when present)
        #[arg(long, value_name = "FILE")]
        config: Option<PathBuf>,
    },

    /// List built-in languages
    Languages,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run(command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Translate {
            from,
            to,
            input,
            output,
            config: config_path,
        } => {
            let cwd = config::working_dir()?;
            let config = config::Config::load(config_path.as_deref(), &cwd)?;
            let (from, to) = config.resolve(from, to);

            let source = read_input(input.as_deref())?;
            let mut args = TranslateArgs::new().input(source);
            args.from = from;
            args.to = to;

            let translated = translate(&args).context("translation failed")?;
            write_output(output.as_deref(), &translated)
        }
        Commands::Languages => {
            let mut stdout = std::io::stdout().lock();
            for language in templar::languages() {
                writeln!(stdout, "{language}")?;
            }
            Ok(())
        }
    }
}

fn read_input(path: Option<&std::path::Path>) -> anyhow::Result<String> {
    match path {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display())),
        None => {
            let mut source = String::new();
            std::io::stdin()
                .read_to_string(&mut source)
                .context("failed to read stdin")?;
            Ok(source)
        }
    }
}

fn write_output(path: Option<&std::path::Path>, text: &str) -> anyhow::Result<()> {
    match path {
        Some(path) => std::fs::write(path, text)
            .with_context(|| format!("failed to write {}", path.display())),
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(text.as_bytes())?;
            stdout.flush()?;
            Ok(())
        }
    }
}
