//! Recolor CLI - rule evolution over a storage directory.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use recolor_core::{Grid, Task};
use recolor_execution::{EngineConfig, ExecutionEngine};
use recolor_storage::JsonStorage;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "recolor")]
#[command(about = "Rule evolution and meta-learning for grid recoloring", long_about = None)]
struct Cli {
    /// Storage directory
    #[arg(long, global = true, default_value = ".recolor")]
    root: PathBuf,

    /// Engine config file (JSON)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Seed for reproducible runs
    #[arg(long, global = true)]
    seed: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Solve every task in a file and write predictions
    Solve {
        /// Tasks file: a list of tasks or an object keyed by task id
        tasks: PathBuf,
        /// Predictions output file (stdout when absent)
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Mutate and amplify cached rules, then adjust meta weights
    Evolve {
        /// Mean confidence of the previous round
        #[arg(long)]
        last: f64,
        /// Mean confidence of this round
        #[arg(long)]
        current: f64,
    },
    /// Cluster, promote, diversify and rehearse
    Consolidate,
    /// Rebuild clustered meta-rules
    Cluster,
    /// Promote strong replay entries
    Promote,
    /// Synthesize meta-rule variants
    Diversify,
    /// Reinject meta-rules into the rule cache
    Rehearse,
    /// Show status
    Status,
}

/// Tasks file layouts.
#[derive(Deserialize)]
#[serde(untagged)]
enum TasksFile {
    List(Vec<Task>),
    Keyed(BTreeMap<String, Task>),
}

impl TasksFile {
    fn into_tasks(self) -> Vec<Task> {
        match self {
            TasksFile::List(tasks) => tasks,
            TasksFile::Keyed(map) => map
                .into_iter()
                .map(|(id, mut task)| {
                    if task.id.is_empty() {
                        task.id = id;
                    }
                    task
                })
                .collect(),
        }
    }
}

/// Predictions for one task.
#[derive(Serialize)]
struct TaskPredictions {
    attempts: Vec<Vec<Grid>>,
    confidence: f64,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => EngineConfig::load(path)
            .await
            .with_context(|| format!("reading config {}", path.display()))?,
        None => EngineConfig::default(),
    };
    if cli.seed.is_some() {
        config.seed = cli.seed;
    }

    // Open storage
    let storage = JsonStorage::new(&cli.root).await?;
    let mut engine = ExecutionEngine::with_config(storage, config);

    match cli.command {
        Commands::Solve { tasks, out } => {
            let tasks = read_tasks(&tasks).await?;
            let solutions = engine.solve_all(&tasks).await?;

            let mut predictions = BTreeMap::new();
            let mut total = 0.0;
            for solution in solutions {
                total += solution.prediction.mean_confidence;
                predictions.insert(
                    solution.task_id,
                    TaskPredictions {
                        attempts: solution.prediction.attempts,
                        confidence: solution.prediction.mean_confidence,
                    },
                );
            }
            let rendered = serde_json::to_string_pretty(&predictions)?;
            match out {
                Some(path) => {
                    tokio::fs::write(&path, rendered).await?;
                    println!(
                        "Wrote predictions for {} tasks to {}",
                        predictions.len(),
                        path.display()
                    );
                }
                None => println!("{}", rendered),
            }
            if !predictions.is_empty() {
                info!("Mean confidence {:.3}", total / predictions.len() as f64);
            }
        }
        Commands::Evolve { last, current } => {
            let report = engine.evolve(last, current).await?;
            println!("Mutated: {}", report.mutated);
            println!("Amplified: {}", report.amplified);
            println!(
                "Cache: {} rules, mean confidence {:.3}",
                report.cache.rules, report.cache.mean_confidence
            );
        }
        Commands::Consolidate => {
            let report = engine.consolidate().await?;
            println!("Clustered: {}", report.clustered);
            println!(
                "Promoted: {} (threshold {:.3})",
                report.promotion.promoted, report.promotion.threshold
            );
            println!("Diversified: {}", report.diversified);
            println!("Rehearsed: {}", report.rehearsed);
            for adjustment in &report.reinforced {
                println!(
                    "  {} -> {:.3}: {}",
                    adjustment.rule_type, adjustment.value, adjustment.reason
                );
            }
        }
        Commands::Cluster => {
            let built = engine.cluster().await?;
            for (id, rule) in &built {
                println!("  {} | {} keys | {}", id, rule.color_map.len(), rule.confidence);
            }
            println!("Built {} meta-rules", built.len());
        }
        Commands::Promote => {
            let summary = engine.promote().await?;
            println!(
                "Promoted {}/{} replay entries (threshold {:.3})",
                summary.promoted, summary.replay_size, summary.threshold
            );
        }
        Commands::Diversify => {
            let added = engine.diversify().await?;
            println!("Added {} variants", added);
        }
        Commands::Rehearse => {
            let written = engine.rehearse().await?;
            println!("Rehearsed {} meta-rules", written);
        }
        Commands::Status => {
            let status = engine.status().await;
            println!("Recolor Status ({})", cli.root.display());
            println!(
                "  Rule cache: {} rules, mean confidence {:.3}, {} rehearsal",
                status.cache.rules, status.cache.mean_confidence, status.cache.rehearsal_entries
            );
            for (rule_type, count) in &status.cache.by_type {
                println!("    {}: {}", rule_type, count);
            }
            println!("  Meta rules: {}", status.meta_rules);
            match status.best_replay {
                Some(best) => println!(
                    "  Replay: {} entries, best {:.3}",
                    status.replay_entries, best
                ),
                None => println!("  Replay: empty"),
            }
            println!("  Type memory summary: {:.3}", status.type_summary);
            for (rule_type, weight) in status.weights.0.iter() {
                println!("  Weight {}: {:.3}", rule_type, weight);
            }
            if let Some(last) = &status.last_promotion {
                println!(
                    "  Last promotion: {} at {} ({} promoted)",
                    last.run_id, last.timestamp, last.promoted
                );
            }
        }
    }

    Ok(())
}

async fn read_tasks(path: &Path) -> Result<Vec<Task>> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("reading tasks {}", path.display()))?;
    let file: TasksFile = serde_json::from_str(&raw)
        .with_context(|| format!("parsing tasks {}", path.display()))?;
    Ok(file.into_tasks())
}
