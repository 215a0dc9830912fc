use anyhow::Context;
use clap::Parser;
use mdcmp_common::DiffOptions;
use mdcmp_core::{compare, Configuration};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "mdcmp")]
#[command(author = "MDCompare Contributors")]
#[command(version = "0.1.0")]
#[command(about = "Structural diff for legacy configuration containers", long_about = None)]
struct Cli {
    /// First configuration file
    first: PathBuf,

    /// Second configuration file
    second: PathBuf,

    /// Descend into procedure/function bodies of changed modules
    #[arg(short = 'm', long)]
    modules: bool,

    /// Attribute changed units to developers by signature markers
    #[arg(short = 'a', long)]
    authors: bool,

    /// TOML file with the developer-signature table
    #[arg(long)]
    signatures: Option<PathBuf>,

    /// Output the report as JSON
    #[arg(long)]
    json: bool,

    /// Write <file>.errorlog sidecars listing unrecognized descriptor
    /// categories
    #[arg(long)]
    errorlog: bool,
}

fn main() -> ExitCode {
    // report goes to stdout; logging stays on stderr
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::from(2)
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    if !cli.first.exists() {
        anyhow::bail!("configuration does not exist: {}", cli.first.display());
    }
    if !cli.second.exists() {
        anyhow::bail!("configuration does not exist: {}", cli.second.display());
    }

    let signatures = match &cli.signatures {
        Some(path) => mdcmp_common::load_signatures(path)
            .with_context(|| format!("loading signature table {}", path.display()))?,
        None => Default::default(),
    };

    let progress = |message: &str, percent: u32| debug!("{:3}% {}", percent, message);

    let first = Configuration::load_with(&cli.first, Some(&progress), None)
        .with_context(|| format!("loading {}", cli.first.display()))?;
    let second = Configuration::load_with(&cli.second, Some(&progress), None)
        .with_context(|| format!("loading {}", cli.second.display()))?;

    for config in [&first, &second] {
        for warning in &config.warnings {
            debug!("{}: {}", config.source.display(), warning);
        }
        if cli.errorlog {
            if let Some(path) = config.write_error_log()? {
                info!("wrote {}", path.display());
            }
        }
    }

    let options = DiffOptions {
        diff_module_bodies: cli.modules,
        attribute_authors: cli.authors,
        signatures,
    };
    let report = compare(&first, &second, &options);

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{}", report);
    }

    Ok(())
}
