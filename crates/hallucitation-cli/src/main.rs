use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use hallucitation_core::config_file::{self, ConfigFile};
use hallucitation_core::score::gptzero::GptZero;
use hallucitation_core::verify::crossref::CrossRef;
use hallucitation_core::{
    Config, HttpClient, Pipeline, PipelineEvent, RateLimiters, Store, TextExtractor,
};
use hallucitation_pdf_mupdf::MupdfBackend;
use hallucitation_reporting::ImportOptions;
use indicatif::{ProgressBar, ProgressStyle};
use tokio_util::sync::CancellationToken;

mod logging;
mod output;

use output::ColorMode;

/// Hallucinated Citation Detector - batch-check the reference lists of academic PDFs
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Config file (default: .hallucitation.toml over the platform config)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// SQLite results database
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Directory for hallucitation.log
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    /// Show info-level logs on stderr
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Load the paper-metadata CSV into the results database
    Import {
        /// Paper-metadata CSV (Paper_ID, Domain_Category, ..., Processing_Status)
        csv: Option<PathBuf>,

        /// Directory holding {Paper_ID}.pdf
        #[arg(long)]
        pdf_dir: Option<PathBuf>,
    },

    /// Process pending papers
    Run {
        /// Process at most this many papers
        #[arg(long)]
        limit: Option<usize>,

        /// Re-run one paper regardless of its status
        #[arg(long, value_name = "PAPER_ID")]
        force: Option<String>,

        #[command(flatten)]
        services: ServiceArgs,
    },

    /// Retry citations recorded while CrossRef or GPTZero was unavailable
    Reverify {
        #[command(flatten)]
        services: ServiceArgs,
    },

    /// Reset papers to pending
    Requeue {
        /// Papers to re-queue
        paper_ids: Vec<String>,

        /// Re-queue every paper in error
        #[arg(long)]
        errors: bool,
    },

    /// Show paper and citation counts
    Status,

    /// Write paper_metadata.csv, citations_extracted.csv and hallucination_coding.csv
    Export {
        /// Output directory
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Extract, segment and parse one PDF without querying any service
    DryRun {
        /// Path to the PDF
        pdf: PathBuf,
    },
}

#[derive(Args, Debug)]
struct ServiceArgs {
    /// GPTZero API key
    #[arg(long)]
    gptzero_key: Option<String>,

    /// Contact email sent to CrossRef (polite pool)
    #[arg(long)]
    mailto: Option<String>,

    /// AI probability at or above which an unmatched citation is hallucinated
    #[arg(long)]
    threshold: Option<f64>,

    /// Attempts per external request
    #[arg(long)]
    max_retries: Option<u32>,

    /// Per-request timeout in seconds
    #[arg(long)]
    timeout: Option<u64>,

    /// Minimum seconds between requests to the same service
    #[arg(long)]
    request_delay: Option<f64>,

    /// Citations of one paper checked at the same time
    #[arg(long)]
    concurrency: Option<usize>,
}

/// Filesystem locations, resolved as flag > config file > default.
struct Paths {
    pdf_dir: PathBuf,
    metadata_csv: PathBuf,
    db: PathBuf,
    output_dir: PathBuf,
    log_dir: PathBuf,
}

impl Paths {
    fn resolve(cli: &Cli, file: &ConfigFile) -> Self {
        let paths = file.paths.clone().unwrap_or_default();
        let pick = |flag: &Option<PathBuf>, configured: Option<String>, default: &str| {
            flag.clone()
                .or_else(|| configured.map(PathBuf::from))
                .unwrap_or_else(|| PathBuf::from(default))
        };
        Self {
            pdf_dir: pick(&None, paths.pdf_dir, "pdfs"),
            metadata_csv: pick(&None, paths.metadata_csv, "paper_metadata.csv"),
            db: pick(&cli.db, paths.db_path, "hallucitation.sqlite"),
            output_dir: pick(&None, paths.output_dir, "output"),
            log_dir: pick(&cli.log_dir, paths.log_dir, "logs"),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let file = match &cli.config {
        Some(path) => {
            if !path.exists() {
                anyhow::bail!("Config file not found: {}", path.display());
            }
            config_file::load_from_path(path)
                .with_context(|| format!("Could not parse config file {}", path.display()))?
        }
        None => config_file::load_config(),
    };
    let paths = Paths::resolve(&cli, &file);
    let color = ColorMode(!cli.no_color);
    let _log_guard = logging::init(&paths.log_dir, cli.verbose, color.enabled())?;

    let mut stdout = std::io::stdout();
    match &cli.command {
        Command::Import { csv, pdf_dir } => {
            let csv = csv.clone().unwrap_or(paths.metadata_csv);
            let pdf_dir = pdf_dir.clone().unwrap_or(paths.pdf_dir);
            let mut options = ImportOptions::new(pdf_dir);
            if let Some(domains) = file.domains() {
                options = options.with_domains(domains);
            }
            import(&csv, &options, &paths.db, &mut stdout, color)
        }
        Command::Run {
            limit,
            force,
            services,
        } => {
            let config = build_config(&file, services)?;
            run(config, &paths.db, *limit, force.as_deref(), &mut stdout, color).await
        }
        Command::Reverify { services } => {
            let config = build_config(&file, services)?;
            reverify(config, &paths.db, &mut stdout, color).await
        }
        Command::Requeue { paper_ids, errors } => {
            requeue(&paths.db, paper_ids, *errors, &mut stdout)
        }
        Command::Status => {
            let store = open_store(&paths.db)?;
            output::print_status(&mut stdout, &store.counts()?, color)?;
            Ok(())
        }
        Command::Export { out } => {
            let store = open_store(&paths.db)?;
            let out = out.clone().unwrap_or(paths.output_dir);
            let summary = hallucitation_reporting::export_all(&store, &out)?;
            output::print_export_summary(&mut stdout, &summary)?;
            Ok(())
        }
        Command::DryRun { pdf } => {
            let mut config = Config::default();
            file.apply_to(&mut config)?;
            dry_run(pdf, &config, &mut stdout, color).await
        }
    }
}

/// Resolve runtime configuration: CLI flags > environment > config file > defaults.
fn build_config(file: &ConfigFile, args: &ServiceArgs) -> anyhow::Result<Config> {
    let mut config = Config::default();
    file.apply_to(&mut config)?;

    if let Ok(key) = std::env::var("GPTZERO_API_KEY") {
        config.gptzero_api_key = Some(key);
    }
    if let Ok(mailto) = std::env::var("CROSSREF_MAILTO") {
        config.crossref_mailto = Some(mailto);
    }

    if let Some(key) = &args.gptzero_key {
        config.gptzero_api_key = Some(key.clone());
    }
    if let Some(mailto) = &args.mailto {
        config.crossref_mailto = Some(mailto.clone());
    }
    if let Some(t) = args.threshold {
        if !(0.0..=1.0).contains(&t) {
            anyhow::bail!("--threshold must be between 0 and 1, got {t}");
        }
        config.policy.threshold = t;
    }
    if let Some(n) = args.max_retries {
        config.max_retries = n.max(1);
    }
    if let Some(secs) = args.timeout {
        config.request_timeout = Duration::from_secs(secs);
    }
    if let Some(secs) = args.request_delay {
        if !secs.is_finite() || secs < 0.0 {
            anyhow::bail!("--request-delay must be a non-negative number of seconds");
        }
        config.inter_request_delay = Duration::from_secs_f64(secs);
        config.rate_limiters = Arc::new(RateLimiters::new(config.inter_request_delay));
    }
    if let Some(n) = args.concurrency {
        config.citation_concurrency = n.max(1);
    }

    tracing::debug!(?config, "resolved configuration");
    Ok(config)
}

fn open_store(db: &Path) -> anyhow::Result<Store> {
    Store::open(db).with_context(|| format!("Could not open results database {}", db.display()))
}

/// Wire the real services into a pipeline. Fails without a GPTZero key.
fn build_pipeline(config: Config, db: &Path) -> anyhow::Result<Pipeline> {
    let http = HttpClient::new(config.retry_policy(), Arc::clone(&config.rate_limiters))?;
    let detector = GptZero::new(http.clone(), config.gptzero_api_key.clone())
        .context("AI scoring needs a GPTZero key: pass --gptzero-key or set GPTZERO_API_KEY")?
        .with_endpoint(config.gptzero_url.clone());
    let authority = CrossRef::new(http, config.crossref_mailto.clone())
        .with_base_url(config.crossref_url.clone());
    if config.crossref_mailto.is_none() {
        tracing::warn!("no CrossRef contact email configured; requests use the public pool");
    }

    let store = open_store(db)?;
    Ok(Pipeline::new(
        Arc::new(config),
        TextExtractor::new(Arc::new(MupdfBackend::new())),
        Arc::new(authority),
        Arc::new(detector),
        store,
    ))
}

fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let cancel_clone = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, stopping after the current paper");
            cancel_clone.cancel();
        }
    });
    cancel
}

fn progress_bar(len: u64, color: ColorMode) -> ProgressBar {
    let template = if color.enabled() {
        "{spinner:.green} [{bar:40.green/dim}] {pos}/{len} papers ({eta}) {msg}"
    } else {
        "{spinner} [{bar:40}] {pos}/{len} papers ({eta}) {msg}"
    };
    let bar = ProgressBar::new(len);
    if let Ok(style) = ProgressStyle::with_template(template) {
        bar.set_style(style.progress_chars("=> "));
    }
    bar.enable_steady_tick(Duration::from_millis(120));
    bar
}

fn import(
    csv: &Path,
    options: &ImportOptions,
    db: &Path,
    w: &mut dyn Write,
    color: ColorMode,
) -> anyhow::Result<()> {
    if !csv.exists() {
        anyhow::bail!("Metadata CSV not found: {}", csv.display());
    }
    if !options.pdf_dir.is_dir() {
        tracing::warn!(dir = %options.pdf_dir.display(), "PDF directory does not exist yet");
    }
    let store = open_store(db)?;
    let summary = hallucitation_reporting::import_metadata(&store, csv, options)?;
    output::print_import_summary(w, &summary, color)?;
    Ok(())
}

async fn run(
    config: Config,
    db: &Path,
    limit: Option<usize>,
    force: Option<&str>,
    w: &mut dyn Write,
    color: ColorMode,
) -> anyhow::Result<()> {
    let pipeline = build_pipeline(config, db)?;
    let counts = pipeline.store()?.counts()?;
    if counts.pending + counts.processed + counts.error == 0 {
        anyhow::bail!("No papers in {}. Run `hallucitation import` first.", db.display());
    }

    let todo = match force {
        Some(_) => 1,
        None => {
            let waiting = counts.pending + counts.error;
            limit.map_or(waiting, |l| l.min(waiting))
        }
    };
    if todo == 0 {
        writeln!(w, "Nothing to do: every paper is processed.")?;
        return Ok(());
    }

    let bar = progress_bar(todo as u64, color);
    let progress = {
        let bar = bar.clone();
        move |event: PipelineEvent| {
            if let PipelineEvent::PaperStarted { paper_id, .. } = &event {
                bar.set_message(paper_id.clone());
            }
            if let Some(line) = output::progress_line(&event, color) {
                bar.println(line);
                bar.inc(1);
            }
        }
    };

    let summary = match force {
        Some(paper_id) => {
            let outcome = pipeline.reprocess(paper_id, &progress).await?;
            summarize_one(outcome)
        }
        None => {
            let cancel = cancel_on_ctrl_c();
            pipeline.run_batch(limit, &cancel, &progress).await?
        }
    };
    bar.finish_and_clear();

    output::print_run_summary(w, &summary, color)?;
    Ok(())
}

fn summarize_one(outcome: hallucitation_core::PaperOutcome) -> hallucitation_core::RunSummary {
    use hallucitation_core::{Classification, PaperOutcome, RunSummary};

    match outcome {
        PaperOutcome::Processed(records) => {
            let count = |c: Classification| records.iter().filter(|r| r.classification == c).count();
            RunSummary {
                papers_processed: 1,
                citations: records.len(),
                real: count(Classification::Real),
                hallucinated: count(Classification::Hallucinated),
                uncertain: count(Classification::Uncertain),
                ..RunSummary::default()
            }
        }
        PaperOutcome::Failed(_) => RunSummary {
            papers_errored: 1,
            ..RunSummary::default()
        },
    }
}

async fn reverify(
    config: Config,
    db: &Path,
    w: &mut dyn Write,
    color: ColorMode,
) -> anyhow::Result<()> {
    let pipeline = build_pipeline(config, db)?;
    let waiting = pipeline.store()?.counts()?.awaiting_reverify;
    if waiting == 0 {
        writeln!(w, "No citations are waiting for re-verification.")?;
        return Ok(());
    }

    let progress = |event: PipelineEvent| {
        if let Some(line) = output::progress_line(&event, color) {
            println!("{line}");
        }
    };
    let cancel = cancel_on_ctrl_c();
    let summary = pipeline.reverify(&cancel, &progress).await?;
    output::print_reverify_summary(w, &summary, color)?;
    Ok(())
}

fn requeue(db: &Path, paper_ids: &[String], errors: bool, w: &mut dyn Write) -> anyhow::Result<()> {
    if paper_ids.is_empty() && !errors {
        anyhow::bail!("Name at least one paper id, or pass --errors");
    }
    let store = open_store(db)?;
    let mut requeued = 0;
    if errors {
        requeued += store.requeue_errors()?;
    }
    for id in paper_ids {
        if store.requeue(id)? {
            requeued += 1;
        } else {
            anyhow::bail!("Unknown paper: {id}");
        }
    }
    writeln!(w, "Re-queued {requeued} papers")?;
    Ok(())
}

async fn dry_run(
    pdf: &Path,
    config: &Config,
    w: &mut dyn Write,
    color: ColorMode,
) -> anyhow::Result<()> {
    if !pdf.exists() {
        anyhow::bail!("File not found: {}", pdf.display());
    }
    let file_name = pdf
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| pdf.display().to_string());

    let extractor = TextExtractor::new(Arc::new(MupdfBackend::new()));
    let report = hallucitation_core::dry_run(&extractor, config, pdf).await;
    output::print_dry_run(w, &file_name, &report, color)?;
    Ok(())
}
