use anyhow::Context;
use clap::{Parser, Subcommand};
use image_curator_core::{
    config::LogLevel, logging, Config, Curator, DuplicateReport, GroupType, RemovalOptions,
    SimilarityIndex,
};
use log::{info, LevelFilter};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "image-curator")]
#[command(about = "Find, remove and search duplicate and similar images")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Write rolling log files here instead of logging to stderr
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    /// Do not read or write the hash cache
    #[arg(long, global = true)]
    no_cache: bool,

    /// Verbosity level
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Report exact and similar duplicates without changing anything
    Scan {
        #[arg(required = true)]
        directories: Vec<PathBuf>,

        /// Write the full report as JSON
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Remove duplicates, keeping one master per group
    Dedupe {
        #[arg(required = true)]
        directories: Vec<PathBuf>,

        /// Show what would happen without touching any file
        #[arg(long)]
        dry_run: bool,

        /// Move duplicates here instead of deleting them
        #[arg(long)]
        backup_dir: Option<PathBuf>,

        /// Also remove members of similar (not byte-identical) groups
        #[arg(long)]
        include_similar: bool,

        /// Replace exact duplicates with hardlinks to their master
        #[arg(long, conflicts_with_all = ["backup_dir", "include_similar"])]
        hardlink: bool,
    },

    /// Build or query a similarity index
    Index {
        #[command(subcommand)]
        command: IndexCommands,
    },

    /// Generate default configuration file
    GenerateConfig {
        #[arg(default_value = "image-curator.json")]
        path: PathBuf,
    },
}

#[derive(Subcommand)]
enum IndexCommands {
    /// Index every image under the given directories
    Build {
        #[arg(required = true)]
        directories: Vec<PathBuf>,

        /// Directory the index and its manifest are written to
        #[arg(long)]
        out: PathBuf,
    },

    /// Find the images most similar to a query image
    Search {
        /// Directory written by `index build`
        #[arg(long)]
        index: PathBuf,

        #[arg(long)]
        query: PathBuf,

        /// Number of results
        #[arg(short, default_value_t = 10)]
        k: usize,

        /// Keep the query image in its own results
        #[arg(long)]
        include_self: bool,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if let Commands::GenerateConfig { path } = &cli.command {
        Config::default().save_to_file(path)?;
        println!("Configuration file generated at: {}", path.display());
        return Ok(());
    }

    let mut config = match &cli.config {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("loading configuration from {}", path.display()))?,
        None => Config::default(),
    };
    if cli.verbose > 0 {
        config.log_level = if cli.verbose == 1 {
            LogLevel::Debug
        } else {
            LogLevel::Trace
        };
    }
    if cli.log_dir.is_some() {
        config.log_dir = cli.log_dir.clone();
    }
    if cli.no_cache {
        config.cache_path = None;
    }
    init_logging(&config)?;

    let curator = Curator::new(config)?;
    let cancel = curator.cancel_token();
    ctrlc::set_handler(move || {
        eprintln!("Interrupt received, finishing current work...");
        cancel.cancel();
    })
    .context("installing Ctrl-C handler")?;

    match cli.command {
        Commands::Scan {
            directories,
            output,
        } => {
            let report = scan(&curator, &directories)?;
            if let Some(output) = output {
                let file = std::fs::File::create(&output)
                    .with_context(|| format!("creating {}", output.display()))?;
                serde_json::to_writer_pretty(file, &report)?;
                println!("Report written to {}", output.display());
            }
            Ok(())
        }

        Commands::Dedupe {
            directories,
            dry_run,
            backup_dir,
            include_similar,
            hardlink,
        } => {
            let report = scan(&curator, &directories)?;
            let stats = if hardlink {
                curator.create_hardlinks(&report.groups, dry_run)
            } else {
                let options = RemovalOptions {
                    dry_run,
                    backup_dir,
                    include_similar,
                };
                curator.remove_duplicates(&report.groups, &options)
            };

            let prefix = if dry_run { "Would have" } else { "Have" };
            if hardlink {
                println!("{} linked {} files", prefix, stats.linked);
            } else {
                println!(
                    "{} removed {} exact and {} similar duplicates",
                    prefix, stats.removed_exact, stats.removed_similar
                );
            }
            println!(
                "{} freed {}, skipped {}, errors {}",
                prefix,
                format_bytes(stats.bytes_freed),
                stats.skipped,
                stats.errors
            );
            Ok(())
        }

        Commands::Index {
            command: IndexCommands::Build { directories, out },
        } => {
            let inputs = curator.discover_images(&directories)?;
            let (index, stats) = curator.build_index(&inputs)?;
            index.persist(&out)?;

            println!(
                "Indexed {} images ({} cached, {} extracted, {} skipped) into {}",
                stats.indexed,
                stats.cached,
                stats.extracted,
                stats.skipped,
                out.display()
            );
            for failure in &stats.failures {
                println!("  skipped {}: {}", failure.path.display(), failure.error);
            }
            Ok(())
        }

        Commands::Index {
            command:
                IndexCommands::Search {
                    index,
                    query,
                    k,
                    include_self,
                },
        } => {
            let index = SimilarityIndex::restore(&index)
                .with_context(|| format!("restoring index from {}; rebuild it", index.display()))?;
            let results = curator.find_similar(&index, &query, k, include_self)?;

            if results.is_empty() {
                println!("No similar images found");
            }
            for (rank, result) in results.iter().enumerate() {
                println!(
                    "{:>3}. {:.4}  (distance {:.4})  {}",
                    rank + 1,
                    result.similarity,
                    result.distance,
                    result.path.display()
                );
            }
            Ok(())
        }

        Commands::GenerateConfig { .. } => Ok(()),
    }
}

/// Rolling log files when a log directory is configured, stderr otherwise
fn init_logging(config: &Config) -> anyhow::Result<()> {
    match &config.log_dir {
        Some(dir) => {
            logging::init_logger(dir, config.log_level)?;
        }
        None => {
            env_logger::Builder::new()
                .filter_level(LevelFilter::from(config.log_level))
                .parse_env(logging::LOG_ENV_VAR)
                .init();
        }
    }
    Ok(())
}

fn scan(curator: &Curator, directories: &[PathBuf]) -> anyhow::Result<DuplicateReport> {
    let inputs = curator.discover_images(directories)?;
    info!("Discovered {} images", inputs.len());

    let report = curator.find_duplicates(&inputs)?;
    print_report(&report);
    Ok(report)
}

fn print_report(report: &DuplicateReport) {
    println!(
        "{} images: {} exact groups, {} similar groups, {} reclaimable",
        report.total_images,
        report.exact_group_count,
        report.similar_group_count,
        format_bytes(report.total_potential_savings)
    );

    for group in &report.groups {
        let kind = match group.group_type {
            GroupType::Exact => "exact",
            GroupType::Similar => "similar",
        };
        println!("\n[{}] keep {}", kind, group.master.display());
        for duplicate in &group.duplicates {
            let score = group.similarity_scores.get(duplicate).copied().unwrap_or(1.0);
            println!("    {:.3}  {}", score, duplicate.display());
        }
    }

    if report.error_count > 0 {
        println!("\n{} files could not be processed:", report.error_count);
        for failure in &report.failures {
            println!("    {}: {}", failure.path.display(), failure.error);
        }
    }
}

fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{:.1} {}", value, UNITS[unit])
}
