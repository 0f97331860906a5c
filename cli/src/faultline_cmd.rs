use crate::config::{ENTITIES_FILENAME, FaultlineConfig};
use crate::frames::{parse_frame_flag, parse_request_document};
use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use faultline_call_graph::CallGraph;
use faultline_entity_store::{CodeEntity, EntityStore, MemoryEntityStore};
use faultline_indexer::{IndexPhase, IndexProgress, IndexState, ProgressCallback};
use faultline_localizer::{
    Candidate, Degradation, FaultLocalizer, LocalizeRequest, LocalizeStats, Localization,
    MatchSource, ScoreBreakdown,
};
use owo_colors::OwoColorize;
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, UNIX_EPOCH};
use tokio::io::AsyncReadExt;
use tracing::{debug, info};

/// Localize failures against an indexed codebase
#[derive(Debug, Parser)]
#[command(name = "faultline", version)]
pub struct FaultlineCli {
    /// Directory holding the index
    #[arg(long, value_name = "PATH", global = true, default_value = ".faultline")]
    pub index_dir: PathBuf,

    /// TOML file overriding store, indexer, retrieval, fusion, graph and cache settings
    #[arg(short, long, value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    /// Log more (-v debug, -vv trace). RUST_LOG takes precedence.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: FaultlineCommand,
}

#[derive(Debug, Subcommand)]
pub enum FaultlineCommand {
    /// Index entity manifests under a source tree
    Index(IndexArgs),

    /// Rank the code entities most likely responsible for a failure
    Localize(LocalizeArgs),

    /// Show index statistics
    Status(StatusArgs),

    /// Delete the index
    Clear(ClearArgs),
}

#[derive(Debug, Args)]
pub struct IndexArgs {
    /// Root of the source tree (defaults to current directory)
    #[arg(value_name = "SOURCE_ROOT", default_value = ".")]
    pub source_root: PathBuf,

    /// Re-index every file, ignoring stored content hashes
    #[arg(short, long)]
    pub force: bool,

    /// Only print the summary line
    #[arg(short, long)]
    pub quiet: bool,
}

#[derive(Debug, Args)]
pub struct LocalizeArgs {
    /// Exception type and message, or any other description of the failure
    #[arg(short, long, value_name = "TEXT", default_value = "")]
    pub text: String,

    /// Stack frame as FILE:LINE:METHOD, innermost first; repeatable
    #[arg(short, long = "frame", value_name = "FRAME")]
    pub frames: Vec<String>,

    /// JSON request or frame list; `-` reads stdin
    #[arg(short, long, value_name = "PATH")]
    pub input: Option<PathBuf>,

    /// Precomputed query embedding, comma separated
    #[arg(long, value_name = "FLOATS", value_delimiter = ',')]
    pub query_vector: Option<Vec<f32>>,

    /// Number of candidates to return
    #[arg(short = 'n', long)]
    pub top_k: Option<usize>,

    /// Wall-clock budget; sources still running when it expires are dropped
    #[arg(long, value_name = "MS")]
    pub budget_ms: Option<u64>,

    /// Print the result as JSON
    #[arg(long)]
    pub json: bool,

    /// Show the per-source score breakdown
    #[arg(short, long)]
    pub explain: bool,
}

#[derive(Debug, Args)]
pub struct StatusArgs {
    /// Print the status as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct ClearArgs {
    /// Skip confirmation prompt
    #[arg(short = 'y', long)]
    pub yes: bool,
}

impl FaultlineCli {
    pub async fn run(self) -> Result<()> {
        let config = FaultlineConfig::load(self.config.as_deref())?;
        let workspace = Workspace {
            index_dir: self.index_dir,
            config,
        };

        match self.command {
            FaultlineCommand::Index(args) => run_index(&workspace, args).await,
            FaultlineCommand::Localize(args) => run_localize(&workspace, args).await,
            FaultlineCommand::Status(args) => run_status(&workspace, args).await,
            FaultlineCommand::Clear(args) => run_clear(&workspace, args).await,
        }
    }
}

struct Workspace {
    index_dir: PathBuf,
    config: FaultlineConfig,
}

impl Workspace {
    fn entities_path(&self) -> PathBuf {
        self.index_dir.join(ENTITIES_FILENAME)
    }

    fn require_index(&self) -> Result<()> {
        if !self.entities_path().exists() {
            bail!(
                "Index not found at {}. Run 'faultline index' first.",
                self.index_dir.display()
            );
        }
        Ok(())
    }

    async fn open_store(&self) -> Result<Arc<MemoryEntityStore>> {
        let path = self.entities_path();
        let store = MemoryEntityStore::open(&path, self.config.store.clone())
            .await
            .with_context(|| format!("Failed to open entity store at {}", path.display()))?;
        Ok(Arc::new(store))
    }

    async fn localizer(&self, store: Arc<MemoryEntityStore>, force: bool) -> Result<FaultLocalizer> {
        let mut config = self.config.localizer_config_for(&self.index_dir);
        // Stored hashes are meaningless without the entities they describe
        if force || !self.entities_path().exists() {
            config.indexer.incremental = false;
        }
        FaultLocalizer::new(config, store)
            .await
            .context("Failed to initialize localizer")
    }
}

async fn run_index(workspace: &Workspace, args: IndexArgs) -> Result<()> {
    let source_root = args
        .source_root
        .canonicalize()
        .with_context(|| format!("Source root not found: {}", args.source_root.display()))?;

    if !args.quiet {
        println!(
            "{} Indexing {}",
            "▶".bright_blue(),
            source_root.display()
        );
        println!(
            "{} Index will be stored at {}",
            "▶".bright_blue(),
            workspace.index_dir.display()
        );
    }

    let store = workspace.open_store().await?;
    let localizer = workspace.localizer(store.clone(), args.force).await?;

    let progress = if args.quiet {
        None
    } else {
        let callback: ProgressCallback = Arc::new(report_progress);
        Some(callback)
    };
    let report = localizer
        .index_with_progress(&source_root, progress)
        .await
        .context("Failed to index source tree")?;

    store
        .save(&workspace.entities_path())
        .await
        .context("Failed to save entity store")?;
    let graph = localizer.graph().await.stats();

    if args.quiet {
        println!(
            "Indexed {} files ({} entities)",
            report.indexed_count, report.entity_count
        );
        return Ok(());
    }

    println!("\n{} Indexing complete!", "✓".bright_green());
    println!("  Files indexed: {}", report.indexed_count.bright_cyan());
    println!("  Files unchanged: {}", report.unchanged_count.bright_cyan());
    println!("  Files removed: {}", report.removed_count.bright_cyan());
    println!("  Files failed: {}", report.skipped_count.bright_cyan());
    println!("  Entities: {}", report.entity_count.bright_cyan());
    println!(
        "  Call edges: {} ({} unresolved)",
        graph.edges.bright_cyan(),
        graph.unresolved
    );
    println!("  Generation: {}", report.generation);

    for error in &report.errors {
        println!("  {} {}: {}", "!".bright_yellow(), error.path, error.reason);
    }

    Ok(())
}

fn report_progress(progress: IndexProgress) {
    match progress.phase {
        IndexPhase::Parsing => debug!(
            "[{}/{}] {}",
            progress.current,
            progress.total,
            progress.current_file.as_deref().unwrap_or_default()
        ),
        phase => debug!("{phase:?} ({}/{})", progress.current, progress.total),
    }
}

async fn run_localize(workspace: &Workspace, args: LocalizeArgs) -> Result<()> {
    workspace.require_index()?;
    let request = build_request(&args).await?;
    if request.frames.is_empty() && request.free_text.trim().is_empty() {
        bail!("Nothing to localize: pass --text, --frame or --input");
    }
    debug!("Localizing {} frames", request.frames.len());

    let store = workspace.open_store().await?;
    let localizer = workspace.localizer(store, false).await?;

    let localization = match args.budget_ms {
        Some(ms) => {
            localizer
                .localize_within(&request, Duration::from_millis(ms))
                .await
        }
        None => localizer.localize_detailed(&request).await,
    }
    .context("Localization failed")?;
    info!(
        "Localized to {} candidates in {}ms",
        localization.candidates.len(),
        localization.stats.total_time_ms
    );

    let report = LocalizeReport::resolve(localizer.store().as_ref(), &localization).await?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_candidates(&report, args.explain);
    }
    Ok(())
}

async fn build_request(args: &LocalizeArgs) -> Result<LocalizeRequest> {
    let mut request = match &args.input {
        Some(path) => parse_request_document(&read_input(path).await?)?,
        None => LocalizeRequest::default(),
    };

    if !args.text.is_empty() {
        request.free_text = if request.free_text.is_empty() {
            args.text.clone()
        } else {
            format!("{}\n{}", request.free_text, args.text)
        };
    }
    for raw in &args.frames {
        request.frames.push(parse_frame_flag(raw)?);
    }
    if let Some(top_k) = args.top_k {
        request.top_k = Some(top_k);
    }
    if let Some(vector) = &args.query_vector {
        request.query_vector = Some(vector.clone());
    }
    Ok(request)
}

async fn read_input(path: &Path) -> Result<String> {
    if path == Path::new("-") {
        let mut content = String::new();
        tokio::io::stdin()
            .read_to_string(&mut content)
            .await
            .context("Failed to read request from stdin")?;
        return Ok(content);
    }
    tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read request {}", path.display()))
}

/// A candidate joined with the entity it names
#[derive(Debug, Serialize)]
struct CandidateReport {
    rank: usize,
    entity_id: String,
    full_name: Option<String>,
    file_path: Option<String>,
    start_line: Option<usize>,
    end_line: Option<usize>,
    score: f32,
    score_breakdown: ScoreBreakdown,
    matched_reason: Vec<MatchSource>,
    graph_depth: Option<usize>,
}

impl CandidateReport {
    fn new(rank: usize, candidate: &Candidate, entity: Option<CodeEntity>) -> Self {
        Self {
            rank,
            entity_id: candidate.entity_id.clone(),
            full_name: entity.as_ref().map(|e| e.full_name.clone()),
            file_path: entity.as_ref().map(|e| e.file_path.clone()),
            start_line: entity.as_ref().map(|e| e.start_line),
            end_line: entity.as_ref().map(|e| e.end_line),
            score: candidate.score,
            score_breakdown: candidate.score_breakdown,
            matched_reason: candidate.matched_reason.clone(),
            graph_depth: candidate.graph_depth,
        }
    }

    fn location(&self) -> String {
        match (&self.file_path, self.start_line, self.end_line) {
            (Some(file), Some(start), Some(end)) => format!("{file}:{start}-{end}"),
            _ => "<removed>".to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
struct LocalizeReport {
    candidates: Vec<CandidateReport>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    degraded: Vec<Degradation>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    timed_out: Vec<MatchSource>,
    graph_generation: u64,
    stats: LocalizeStats,
}

impl LocalizeReport {
    async fn resolve(store: &dyn EntityStore, localization: &Localization) -> Result<Self> {
        let mut candidates = Vec::with_capacity(localization.candidates.len());
        for (idx, candidate) in localization.candidates.iter().enumerate() {
            let entity = store.get(&candidate.entity_id).await?;
            candidates.push(CandidateReport::new(idx + 1, candidate, entity));
        }

        Ok(Self {
            candidates,
            degraded: localization.degraded.clone(),
            timed_out: localization.timed_out.clone(),
            graph_generation: localization.graph_generation,
            stats: localization.stats.clone(),
        })
    }
}

fn print_candidates(report: &LocalizeReport, explain: bool) {
    for degradation in &report.degraded {
        println!(
            "{} {} unavailable: {}",
            "!".bright_yellow(),
            degradation.source,
            degradation.reason
        );
    }
    if !report.timed_out.is_empty() {
        let sources: Vec<String> = report.timed_out.iter().map(ToString::to_string).collect();
        println!(
            "{} Budget expired before {} finished",
            "!".bright_yellow(),
            sources.join(", ")
        );
    }

    if report.candidates.is_empty() {
        println!("{} No candidates found", "✗".bright_red());
        return;
    }

    println!(
        "{} {} candidates in {}ms\n",
        "✓".bright_green(),
        report.candidates.len().to_string().bright_cyan(),
        report.stats.total_time_ms.to_string().bright_cyan()
    );

    for candidate in &report.candidates {
        let sources: Vec<String> = candidate
            .matched_reason
            .iter()
            .map(ToString::to_string)
            .collect();
        println!(
            "{}. {} {}",
            candidate.rank.to_string().bright_yellow(),
            candidate
                .full_name
                .as_deref()
                .unwrap_or(&candidate.entity_id)
                .bright_cyan(),
            candidate.location().bright_black()
        );
        println!(
            "   {} {:.3} {} {}",
            "Score:".bright_black(),
            candidate.score.bright_green(),
            "Sources:".bright_black(),
            sources.join("+")
        );
        if explain {
            let breakdown = &candidate.score_breakdown;
            println!(
                "   direct {:.3}  graph {:.3}  lexical {:.3}  vector {:.3}  depth {}",
                breakdown.direct,
                breakdown.graph,
                breakdown.lexical,
                breakdown.vector,
                candidate
                    .graph_depth
                    .map_or_else(|| "-".to_string(), |depth| depth.to_string())
            );
        }
    }

    if explain {
        let stats = &report.stats;
        println!("\n{}", "Statistics:".bright_blue());
        println!(
            "  Direct + expansion: {}ms ({} direct, {} expanded)",
            stats.direct_time_ms, stats.direct_count, stats.expanded_count
        );
        println!(
            "  Retrieval: {}ms ({} hits)",
            stats.retrieval_time_ms, stats.retrieved_count
        );
        println!("  Fusion: {}ms", stats.fusion_time_ms);
        println!("  Graph generation: {}", report.graph_generation);
    }
}

#[derive(Debug, Serialize)]
struct StatusReport {
    index_dir: PathBuf,
    root_dir: Option<PathBuf>,
    entities: usize,
    files: usize,
    generation: u64,
    call_edges: usize,
    unresolved_calls: usize,
    /// Seconds since the Unix epoch
    last_update: Option<u64>,
}

async fn run_status(workspace: &Workspace, args: StatusArgs) -> Result<()> {
    if !workspace.entities_path().exists() {
        println!(
            "{} Index not found at {}",
            "✗".bright_red(),
            workspace.index_dir.display()
        );
        println!("  Run 'faultline index' to create an index.");
        return Ok(());
    }

    let store = workspace.open_store().await?;
    let snapshot = store.snapshot().await?;
    let graph = CallGraph::build(&snapshot.entities, snapshot.generation).stats();
    let state = IndexState::load(&workspace.index_dir).context("Failed to read index state")?;

    let files: BTreeSet<&str> = snapshot
        .entities
        .iter()
        .map(|entity| entity.file_path.as_str())
        .collect();
    let status = StatusReport {
        index_dir: workspace.index_dir.clone(),
        root_dir: (!state.root_dir.as_os_str().is_empty()).then(|| state.root_dir.clone()),
        entities: snapshot.entities.len(),
        files: files.len(),
        generation: snapshot.generation,
        call_edges: graph.edges,
        unresolved_calls: graph.unresolved,
        last_update: state
            .last_update
            .and_then(|time| time.duration_since(UNIX_EPOCH).ok())
            .map(|elapsed| elapsed.as_secs()),
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }

    println!("{} Index Status", "▶".bright_blue());
    println!(
        "  Location: {}",
        status.index_dir.display().to_string().bright_cyan()
    );
    if let Some(root) = &status.root_dir {
        println!("  Source root: {}", root.display());
    }
    println!("  Entities: {}", status.entities.bright_cyan());
    println!("  Files: {}", status.files.bright_cyan());
    println!(
        "  Call edges: {} ({} unresolved)",
        status.call_edges.bright_cyan(),
        status.unresolved_calls
    );
    println!("  Generation: {}", status.generation);
    Ok(())
}

async fn run_clear(workspace: &Workspace, args: ClearArgs) -> Result<()> {
    let index_dir = &workspace.index_dir;
    if !index_dir.exists() {
        println!("{} No index found at {}", "✗".bright_red(), index_dir.display());
        return Ok(());
    }

    if !args.yes {
        print!(
            "Are you sure you want to clear the index at {}? [y/N] ",
            index_dir.display()
        );
        use std::io::{self, Write};
        io::stdout().flush()?;

        let mut input = String::new();
        io::stdin().read_line(&mut input)?;

        if !input.trim().eq_ignore_ascii_case("y") {
            println!("Cancelled.");
            return Ok(());
        }
    }

    tokio::fs::remove_dir_all(index_dir)
        .await
        .context("Failed to remove index directory")?;

    println!("{} Index cleared", "✓".bright_green());
    Ok(())
}
