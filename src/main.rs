use altyazi_fetch::candidate::{Candidate, Language, most_downloaded};
use altyazi_fetch::config::Config;
use altyazi_fetch::error::FetchError;
use altyazi_fetch::init;
use altyazi_fetch::pipeline::{self, RunReport};
use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

const DEFAULT_QUERY: &str = "avengers endgame";

/// Download the most popular Turkish and English subtitles for a film or series.
#[derive(Debug, Parser)]
#[command(name = "altyazi-fetch", version, about)]
struct Args {
    /// Film or series title, e.g. "avengers endgame"
    #[arg(value_name = "QUERY")]
    title: Option<String>,

    /// Same as the positional QUERY
    #[arg(short, long, conflicts_with = "title")]
    query: Option<String>,

    /// Output directory
    #[arg(short, long)]
    out: Option<PathBuf>,

    /// Polite pause between request phases, in seconds
    #[arg(long)]
    delay: Option<f64>,

    /// Per-request timeout, in seconds
    #[arg(long)]
    timeout: Option<u64>,

    /// Site root, mainly for mirrors and testing
    #[arg(long)]
    base_url: Option<String>,

    /// Languages to fetch (tr, en); repeat or comma-separate
    #[arg(short, long = "lang", value_name = "LANG", value_delimiter = ',')]
    languages: Vec<Language>,

    /// JSON config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Only list the candidates, do not download
    #[arg(long)]
    list: bool,

    #[arg(short, long)]
    verbose: bool,
}

fn init_tracing(verbose: bool) {
    let fallback = if verbose { "altyazi_fetch=debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn load_config(args: &Args) -> Result<Config, FetchError> {
    let mut cfg = match &args.config {
        Some(path) => Config::load(path)
            .await
            .map_err(|e| FetchError::Config(format!("{e:#}")))?,
        None => Config::default(),
    };

    if let Some(out) = &args.out {
        cfg.out_dir = out.clone();
    }
    if let Some(delay) = args.delay {
        cfg.delay_secs = delay;
    }
    if let Some(timeout) = args.timeout {
        cfg.timeout_secs = timeout;
    }
    if let Some(base_url) = &args.base_url {
        cfg.base_url = base_url.clone();
    }
    if !args.languages.is_empty() {
        cfg.languages = args.languages.clone();
    }

    cfg.validate()
        .map_err(|e| FetchError::Config(format!("{e:#}")))?;
    Ok(cfg)
}

fn print_candidates(candidates: &[Candidate]) {
    let best = most_downloaded(candidates);
    for c in candidates {
        let picked = best.get(c.language) == Some(c);
        println!(
            "{} {:<8} {:>10}  {}  [{}]  {}",
            if picked { "*" } else { " " },
            c.language.tag(),
            c.downloads_formatted,
            c.title,
            c.translator.as_deref().unwrap_or("unknown"),
            c.url
        );
    }
    println!("\n{} candidates (* = most downloaded per language)", candidates.len());
}

fn print_summary(report: &RunReport) {
    println!("\nDone: \"{}\"", report.query);
    for outcome in &report.outcomes {
        if outcome.files.is_empty() {
            println!("{}: no files", outcome.language);
            continue;
        }
        println!("{} subtitle files:", outcome.language);
        for path in &outcome.files {
            println!("   {}", path.display());
        }
    }
    println!("\n{} subtitle files ready", report.total_files());
}

async fn run(args: Args) -> Result<(), FetchError> {
    let cfg = load_config(&args).await?;
    let query = args
        .query
        .or(args.title)
        .unwrap_or_else(|| DEFAULT_QUERY.to_string());

    if args.list {
        let candidates = pipeline::list(&cfg, &query).await?;
        print_candidates(&candidates);
        return Ok(());
    }

    init::ensure_output_dir(&cfg.out_dir).await?;
    let report = pipeline::run(&cfg, &query).await?;
    print_summary(&report);
    Ok(())
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    init_tracing(args.verbose);

    let code = match run(args).await {
        Ok(()) => 0,
        Err(err) => {
            eprintln!("[ERROR] {err}");
            err.exit_code()
        }
    };
    std::process::exit(code);
}
