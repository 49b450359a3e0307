//! Rulegate - commit-time governance for the semantic rule store
//!
//! The `rulegate` command validates staged changes against the governance
//! pipeline and queries the rule store directly.
//!
//! ## Commands
//!
//! - `check`: run the validation pipeline over staged paths (the commit
//!   hook entry point; exit 0 allowed, 1 blocked, 2 fatal configuration)
//! - `query`: ranked rule-store query, comprehensive or checkpoint-selective

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::Level;

use rulegate_core::{
    ChangeKind, ChangedArtifact, GateConfig, GateError, Orchestrator, PerformanceMonitor,
    QueryKind, QueryObservation, Recommendation, ValidationLevel,
};
use rulegate_store::{
    Checkpoint, CollectionKind, QueryFilter, Rule, RuleStore, ScoredRule, Workflow,
    COMPREHENSIVE_TOP_K,
};

#[derive(Parser)]
#[command(name = "rulegate")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Commit-time governance for the semantic rule store", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate staged changes; exits 0 when the commit is allowed
    Check {
        /// Gate configuration file (JSON); defaults apply when omitted
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Commit message, consulted for emergency-bypass keywords
        #[arg(short, long)]
        message: Option<String>,

        /// Validation level (minimal|standard|strict|paranoid)
        #[arg(short, long)]
        level: Option<String>,

        /// File listing staged paths, one per line
        #[arg(long)]
        staged_list: Option<PathBuf>,

        /// Rule seed file (JSON) to load into the in-process store
        #[arg(long)]
        rules: Option<PathBuf>,

        /// Staged paths to validate
        paths: Vec<PathBuf>,
    },

    /// Ranked rule-store query
    Query {
        /// Collection to query (editorial_rules, platform_rules, ...)
        #[arg(short, long)]
        collection: String,

        /// Query text
        #[arg(short, long)]
        text: String,

        /// Restrict results to one platform
        #[arg(short, long)]
        platform: Option<String>,

        /// Result width
        #[arg(long, default_value_t = COMPREHENSIVE_TOP_K)]
        top_k: usize,

        /// Selective checkpoint (pre|mid|post); comprehensive when omitted
        #[arg(long)]
        checkpoint: Option<String>,

        /// Rule seed file (JSON) to load into the in-process store
        #[arg(long)]
        rules: Option<PathBuf>,
    },
}

/// One entry of the rule seed file.
#[derive(serde::Deserialize)]
struct SeedEntry {
    collection: String,
    rule: Rule,
}

/// Output of the `query` command: ranked hits plus whatever tuning
/// advisories the monitor derived from the run.
#[derive(serde::Serialize)]
struct QueryReport {
    results: Vec<ScoredRule>,
    recommendations: Vec<Recommendation>,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    rulegate_core::init_tracing(cli.json, level);

    let code = match run(cli.command).await {
        Ok(code) => code,
        Err(e) => {
            // Fatal path: bad config, bad seed file, bad flags. Distinct
            // from a blocked commit (exit 1).
            eprintln!("rulegate: {e:#}");
            if let Some(gate) = e.downcast_ref::<GateError>() {
                eprintln!("remediation: {}", gate.remediation());
            }
            2
        }
    };
    std::process::exit(code);
}

async fn run(command: Commands) -> Result<i32> {
    match command {
        Commands::Check {
            config,
            message,
            level,
            staged_list,
            rules,
            paths,
        } => {
            cmd_check(
                config.as_deref(),
                message.as_deref(),
                level.as_deref(),
                staged_list.as_deref(),
                rules.as_deref(),
                paths,
            )
            .await
        }
        Commands::Query {
            collection,
            text,
            platform,
            top_k,
            checkpoint,
            rules,
        } => cmd_query(
            &collection,
            &text,
            platform.as_deref(),
            top_k,
            checkpoint.as_deref(),
            rules.as_deref(),
        ),
    }
}

async fn cmd_check(
    config_path: Option<&Path>,
    message: Option<&str>,
    level_flag: Option<&str>,
    staged_list: Option<&Path>,
    rules: Option<&Path>,
    paths: Vec<PathBuf>,
) -> Result<i32> {
    let config = load_config(config_path)?;
    let cli_level = level_flag.map(parse_level).transpose()?;
    let level = config.resolve_level(cli_level);
    let store = load_store(rules)?;
    let gate = Orchestrator::for_store(config, store)?;

    // Enumeration happens here, outside the pipeline, so an unreadable
    // staged list is reported through the fail-closed path instead of
    // aborting with a fatal exit.
    let enumeration = enumerate(staged_list, paths);
    let report = gate.run_enumerated(enumeration, message, level).await;

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(report.exit_code())
}

fn cmd_query(
    collection: &str,
    text: &str,
    platform: Option<&str>,
    top_k: usize,
    checkpoint: Option<&str>,
    rules: Option<&Path>,
) -> Result<i32> {
    let kind = CollectionKind::from_name(collection)
        .with_context(|| format!("unknown collection '{collection}'"))?;
    let store = load_store(rules)?;
    let monitor = PerformanceMonitor::default();

    let platform_filter = platform.map(|p| QueryFilter::eq("platform", p));
    let started = std::time::Instant::now();
    let (hits, query_kind) = match checkpoint {
        Some(name) => {
            let checkpoint = parse_checkpoint(name)?;
            (
                store.query_selective(kind, text, checkpoint, platform_filter)?,
                QueryKind::Selective,
            )
        }
        None => {
            let filter = platform_filter.unwrap_or_else(QueryFilter::all_rules);
            (
                store.query(kind, text, &filter, Workflow::Comprehensive, top_k)?,
                QueryKind::Comprehensive,
            )
        }
    };

    monitor.observe(QueryObservation {
        kind: query_kind,
        latency: started.elapsed(),
        result_count: hits.len(),
        filter_fields: platform.map(|_| "platform".to_string()).into_iter().collect(),
    });
    monitor.flush();

    let report = QueryReport {
        results: hits,
        recommendations: monitor.recommendations(),
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(0)
}

fn load_config(path: Option<&Path>) -> Result<GateConfig> {
    match path {
        Some(path) => {
            let json = fs::read_to_string(path)
                .with_context(|| format!("could not read config {}", path.display()))?;
            Ok(GateConfig::from_json(&json)?)
        }
        None => Ok(GateConfig::default()),
    }
}

fn load_store(seed: Option<&Path>) -> Result<Arc<RuleStore>> {
    let store = Arc::new(RuleStore::new());
    if let Some(path) = seed {
        let json = fs::read_to_string(path)
            .with_context(|| format!("could not read rule seed {}", path.display()))?;
        let entries: Vec<SeedEntry> =
            serde_json::from_str(&json).context("rule seed file is malformed")?;
        for entry in entries {
            let kind = CollectionKind::from_name(&entry.collection).with_context(|| {
                format!("rule seed references unknown collection '{}'", entry.collection)
            })?;
            store.upsert(kind, entry.rule)?;
        }
    }
    Ok(store)
}

fn enumerate(
    staged_list: Option<&Path>,
    paths: Vec<PathBuf>,
) -> std::result::Result<Vec<ChangedArtifact>, String> {
    let paths = match staged_list {
        Some(list) => fs::read_to_string(list)
            .map_err(|e| format!("could not read staged list {}: {e}", list.display()))?
            .lines()
            .filter(|l| !l.trim().is_empty())
            .map(PathBuf::from)
            .collect(),
        None => paths,
    };
    Ok(paths
        .into_iter()
        .map(|path| {
            // A path that is not on disk may be a deletion or a typo; the
            // pipeline surfaces it as a warning either way.
            let kind = if path.exists() {
                ChangeKind::Modified
            } else {
                ChangeKind::Missing
            };
            ChangedArtifact::new(path, kind)
        })
        .collect())
}

fn parse_level(name: &str) -> Result<ValidationLevel> {
    match ValidationLevel::from_name(name) {
        Some(level) => Ok(level),
        None => bail!("unknown validation level '{name}' (minimal|standard|strict|paranoid)"),
    }
}

fn parse_checkpoint(name: &str) -> Result<Checkpoint> {
    match name {
        "pre" | "pre_writing" => Ok(Checkpoint::PreWriting),
        "mid" | "mid_writing" => Ok(Checkpoint::MidWriting),
        "post" | "post_writing" => Ok(Checkpoint::PostWriting),
        _ => bail!("unknown checkpoint '{name}' (pre|mid|post)"),
    }
}
