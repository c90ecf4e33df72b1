//! Relation Migrator CLI
//!
//! Runs the migration, exports the inheritance graph, and manages configuration.

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use relation_migrator::{MigrationConfig, Migrator, Severity};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "relation-migrator")]
#[command(about = "Migrate extended data type relations into table foreign keys")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve, synthesize and write back
    Run {
        /// Config file to load (optional)
        #[arg(short, long)]
        config: Option<String>,

        /// Target model root (repeatable, replaces configured targets)
        #[arg(short, long = "target")]
        targets: Vec<PathBuf>,

        /// Reference model root (repeatable, replaces configured references)
        #[arg(short, long = "reference")]
        references: Vec<PathBuf>,

        /// Report directory
        #[arg(long)]
        report_dir: Option<PathBuf>,

        /// Compute and report without rewriting documents
        #[arg(long)]
        dry_run: bool,

        /// Exit non-zero when any error-level observation was recorded
        #[arg(long)]
        strict: bool,
    },

    /// Export the inheritance graph as DOT
    Graph {
        /// Config file to load (optional)
        #[arg(short, long)]
        config: Option<String>,

        /// Output file (stdout when omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Only list inheritance cycles
        #[arg(long)]
        cycles: bool,
    },

    /// View and manage configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Show current configuration
    Show {
        /// Config file to load (optional)
        #[arg(short, long)]
        config: Option<String>,

        /// Output as TOML
        #[arg(long)]
        toml: bool,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Initialize a new config file
    Init {
        /// Output path (default: relations.toml)
        #[arg(short, long, default_value = "relations.toml")]
        output: String,
    },

    /// Validate configuration
    Validate {
        /// Config file to validate
        #[arg(short, long)]
        config: Option<String>,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn load_config(path: Option<&str>) -> anyhow::Result<MigrationConfig> {
    MigrationConfig::load_from(path)
        .with_context(|| format!("loading configuration{}", path.map(|p| format!(" from {}", p)).unwrap_or_default()))
}

fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Run {
            config,
            targets,
            references,
            report_dir,
            dry_run,
            strict,
        } => {
            let mut cfg = load_config(config.as_deref())?;
            if !targets.is_empty() {
                cfg.corpus.targets = targets;
            }
            if !references.is_empty() {
                cfg.corpus.references = references;
            }
            if let Some(dir) = report_dir {
                cfg.output.report_dir = dir;
            }
            cfg.output.dry_run |= dry_run;

            if cfg.corpus.targets.is_empty() {
                anyhow::bail!("no target model roots configured");
            }

            println!("🔄 Migrating relations");
            for root in &cfg.corpus.targets {
                println!("   target:    {}", root.display());
            }
            for root in &cfg.corpus.references {
                println!("   reference: {}", root.display());
            }
            if cfg.output.dry_run {
                println!("   (dry run, no documents are rewritten)");
            }
            println!();

            let report_dir = cfg.output.report_dir.clone();
            let outcome = Migrator::new(cfg).run()?;
            let summary = &outcome.summary;

            println!("📊 Results");
            println!("   Extended data types read:      {}", summary.extended_types_read);
            println!("   Extended data types rewritten: {}", summary.extended_types_rewritten);
            println!("   Tables read:                   {}", summary.tables_read);
            println!("   Tables rewritten:              {}", summary.tables_rewritten);
            println!("   Foreign keys created:          {}", summary.foreign_keys_created);
            println!();
            println!("{}", outcome.diagnostics.format_summary());
            println!("📁 Reports written to {}", report_dir.display());

            let errors = outcome
                .diagnostics
                .all()
                .iter()
                .filter(|o| o.kind.severity() == Severity::Error)
                .count();
            if errors > 0 {
                println!("❌ {} error-level observations", errors);
                if strict {
                    std::process::exit(1);
                }
            } else {
                println!("✅ Migration complete");
            }
        }

        Commands::Graph { config, output, cycles } => {
            let cfg = load_config(config.as_deref())?;
            let resolution = Migrator::new(cfg).resolve()?;
            let graph = &resolution.graph;

            if cycles {
                let found = graph.cycles();
                if found.is_empty() {
                    println!("✅ No inheritance cycles");
                } else {
                    println!("❌ {} inheritance cycles", found.len());
                    for cycle in &found {
                        println!("   └─ {}", cycle.join(" -> "));
                    }
                }
                return Ok(());
            }

            let dot = graph.to_dot();
            match output {
                Some(path) => {
                    std::fs::write(&path, dot)
                        .with_context(|| format!("writing {}", path.display()))?;
                    println!(
                        "✅ Wrote {} records, {} edges to {}",
                        graph.record_count(),
                        graph.edge_count(),
                        path.display()
                    );
                }
                None => println!("{}", dot),
            }
        }

        Commands::Config { command } => match command {
            ConfigCommands::Show { config, toml, json } => {
                let cfg = load_config(config.as_deref())?;

                if json {
                    println!("{}", serde_json::to_string_pretty(&cfg)?);
                } else if toml {
                    println!("{}", ::toml::to_string_pretty(&cfg)?);
                } else {
                    println!("📋 Relation Migrator Configuration\n");
                    println!("Corpus:");
                    println!("  Targets:");
                    for root in &cfg.corpus.targets {
                        println!("    - {}", root.display());
                    }
                    println!("  References:");
                    for root in &cfg.corpus.references {
                        println!("    - {}", root.display());
                    }

                    println!("\nLayout:");
                    println!("  Extended data types: {}", cfg.layout.edt_dirs.join(", "));
                    println!("  Tables: {}", cfg.layout.table_dirs.join(", "));

                    println!("\nOutput:");
                    println!("  Reports: {:?}", cfg.output.report_dir);
                    println!("  Dry run: {}", cfg.output.dry_run);
                }
            }

            ConfigCommands::Init { output } => {
                let cfg = MigrationConfig::default();
                cfg.save(&output)
                    .with_context(|| format!("writing {}", output))?;
                println!("✅ Created config file: {}", output);
            }

            ConfigCommands::Validate { config } => match MigrationConfig::load_from(config.as_deref()) {
                Ok(cfg) => {
                    println!("✅ Configuration is valid");
                    println!("   Targets: {}", cfg.corpus.targets.len());
                    println!("   References: {}", cfg.corpus.references.len());
                    println!("   Reports: {:?}", cfg.output.report_dir);
                }
                Err(e) => {
                    eprintln!("❌ Configuration error: {}", e);
                    std::process::exit(1);
                }
            },
        },
    }

    Ok(())
}
