use std::{
    path::{Path, PathBuf},
    thread,
    time::Duration,
};

use clap::{Args, Parser, Subcommand};
use kiln::{Config, ConfigError, Importers, Pipeline, TickStats};

#[derive(Debug, Args)]
struct ProjectArgs {
    /// Project directory or any directory inside it.
    #[arg(value_name = "path", default_value = ".")]
    path: PathBuf,

    /// Source root. Overrides `sources` from the manifest. May be repeated.
    #[arg(long = "source", value_name = "dir")]
    sources: Vec<PathBuf>,

    /// Artifacts directory. Overrides `artifacts` from the manifest.
    #[arg(long = "artifacts", value_name = "dir")]
    artifacts: Option<PathBuf>,

    /// Reimport every document regardless of staleness.
    #[arg(long = "clean")]
    clean: bool,
}

#[derive(Debug, Subcommand)]
#[command(rename_all = "kebab-case")]
enum Command {
    /// Imports stale documents and exits.
    Build {
        #[command(flatten)]
        project: ProjectArgs,
    },
    /// Imports stale documents, then keeps importing changes.
    Watch {
        #[command(flatten)]
        project: ProjectArgs,

        /// Milliseconds between ticks.
        #[arg(long = "tick-ms", value_name = "ms", default_value_t = 100)]
        tick_ms: u64,

        /// Stop after this many ticks.
        #[arg(long = "ticks", value_name = "count")]
        ticks: Option<u64>,
    },
}

#[derive(Debug, Parser)]
#[command(name = "kiln")]
#[command(about = "Incremental asset import pipeline")]
#[command(rename_all = "kebab-case")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

fn main() -> miette::Result<()> {
    install_tracing()?;

    let cli = Cli::parse();

    match cli.command {
        Command::Build { project } => {
            let config = load_config(&project, false)?;
            let mut pipeline = open_pipeline(&config);

            let stats = pipeline.init(project.clean)?;
            report(&stats);

            if stats.failed > 0 {
                miette::bail!("{} imports failed", stats.failed);
            }
        }
        Command::Watch {
            project,
            tick_ms,
            ticks,
        } => {
            let config = load_config(&project, true)?;
            let mut pipeline = open_pipeline(&config);
            let imported = pipeline.subscribe();
            let manifest = pipeline.manifest_flag();

            let stats = pipeline.init(project.clean)?;
            report(&stats);
            for event in imported.try_iter() {
                tracing::trace!("Initial import of '{}'", event.name);
            }

            let tick = Duration::from_millis(tick_ms);
            let mut count = 0;
            while ticks.map_or(true, |ticks| count < ticks) {
                pipeline.update();
                for event in imported.try_iter() {
                    println!("{} -> {}", event.name, event.target.display());
                }
                if manifest.take() {
                    tracing::debug!("Artifacts changed, manifest is outdated");
                }

                count += 1;
                thread::sleep(tick);
            }

            pipeline.shutdown();
        }
    }

    Ok(())
}

fn install_tracing() -> miette::Result<()> {
    use tracing_subscriber::{layer::SubscriberExt as _, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    if let Err(err) = tracing::subscriber::set_global_default(
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .finish()
            .with(tracing_error::ErrorLayer::default()),
    ) {
        miette::bail!("Failed to install tracing subscriber: {}", err);
    }

    Ok(())
}

fn load_config(args: &ProjectArgs, watch: bool) -> miette::Result<Config> {
    let mut config = match Config::find(&args.path) {
        Ok(config) => config,
        Err(ConfigError::NotFound { .. }) if !args.sources.is_empty() => {
            tracing::info!("No manifest found, using command line configuration");
            Config::new(&args.path)?
        }
        Err(err) => return Err(err.into()),
    };

    if !args.sources.is_empty() {
        config.sources = args.sources.iter().map(|p| absolute(p)).collect();
    }
    if let Some(artifacts) = &args.artifacts {
        config.artifacts = absolute(artifacts);
    }
    config.watch = watch;

    Ok(config)
}

fn open_pipeline(config: &Config) -> Pipeline {
    if config.passthrough.is_empty() {
        tracing::warn!("No importers configured, nothing will be imported");
    }
    Pipeline::open(config, Importers::new())
}

fn report(stats: &TickStats) {
    println!(
        "{} imported, {} failed, {} skipped",
        stats.imported, stats.failed, stats.skipped
    );
}

fn absolute(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_owned())
}
