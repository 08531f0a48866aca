use clap::{Parser, Subcommand};
use pagesift_cli::envelope::{add_envelope_fields, error_payload, warning_hints_from};
use pagesift_cli::StderrProgress;
use pagesift_core::{
    Chunker, Error, ExtractionMode, FetchStrategy, Result, DEFAULT_SUMMARY_MAX_WORDS,
    DEFAULT_SUMMARY_MIN_WORDS,
};
use std::process::ExitCode;
use pagesift_local::config::{self, Defaults, ModelBackendKind};
use pagesift_local::{normalize_html, Pipeline, RenderConfig};

#[derive(Parser, Debug)]
#[command(name = "pagesift")]
#[command(
    about = "Scrape a web page, reduce it to visible text, and extract from it with a language model",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Fetch a page and print its cleaned visible text (json).
    Scrape(ScrapeCmd),
    /// Normalize a local HTML file to visible text (offline).
    Clean(CleanCmd),
    /// Fetch a page, chunk it, and run one extraction per chunk (json).
    Parse(ParseCmd),
    /// Diagnose configuration issues (json; no secrets).
    Doctor(DoctorCmd),
    /// Print version info.
    Version(VersionCmd),
}

#[derive(clap::Args, Debug)]
struct ScrapeCmd {
    url: String,
    /// Fetch strategy: rendered|static
    #[arg(long, default_value = "rendered")]
    strategy: String,
    /// Max characters of text to include in the output.
    #[arg(long)]
    preview_chars: Option<usize>,
    /// Output format: json|text
    #[arg(long = "output", alias = "format", default_value = "json")]
    output: String,
}

#[derive(clap::Args, Debug)]
struct CleanCmd {
    /// HTML file to normalize.
    #[arg(long)]
    file: std::path::PathBuf,
    /// Output format: json|text
    #[arg(long = "output", alias = "format", default_value = "text")]
    output: String,
}

#[derive(clap::Args, Debug)]
#[command(group(
    clap::ArgGroup::new("mode")
        .required(true)
        .args(["description", "summary", "keywords"])
))]
struct ParseCmd {
    url: String,
    /// Free query: describe what to extract.
    #[arg(long)]
    description: Option<String>,
    /// Summarize each chunk.
    #[arg(long)]
    summary: bool,
    /// Extract named entities of one category.
    #[arg(long)]
    keywords: bool,
    /// Entity category for --keywords (default: PAGESIFT_KEYWORD_CATEGORY or MISC).
    #[arg(long, requires = "keywords")]
    category: Option<String>,
    /// Lower word bound for --summary.
    #[arg(long, default_value_t = DEFAULT_SUMMARY_MIN_WORDS)]
    min_words: usize,
    /// Upper word bound for --summary.
    #[arg(long, default_value_t = DEFAULT_SUMMARY_MAX_WORDS)]
    max_words: usize,
    /// Characters per chunk (default: PAGESIFT_CHUNK_CHARS or 6000).
    #[arg(long)]
    chunk_chars: Option<usize>,
    /// Fetch strategy: rendered|static
    #[arg(long, default_value = "rendered")]
    strategy: String,
    /// Include per-chunk results in the JSON payload.
    #[arg(long)]
    include_chunks: bool,
    /// Suppress progress lines on stderr.
    #[arg(long)]
    quiet: bool,
    /// Output format: json|text
    #[arg(long = "output", alias = "format", default_value = "json")]
    output: String,
}

#[derive(clap::Args, Debug)]
struct DoctorCmd {
    /// Output format: json|text
    #[arg(long = "output", alias = "format", default_value = "json")]
    output: String,
    /// Run `node --version` to confirm the rendered strategy can start its helper.
    #[arg(long, action = clap::ArgAction::Set, default_value_t = true)]
    check_node: bool,
    /// Timeout for the node probe (ms).
    #[arg(long, default_value_t = 3000)]
    timeout_ms: u64,
}

#[derive(clap::Args, Debug)]
struct VersionCmd {
    /// Output format: json|text
    #[arg(long = "output", alias = "format", default_value = "json")]
    output: String,
}

fn is_text(output: &str) -> bool {
    output.eq_ignore_ascii_case("text")
}

/// Print a library error in the requested format; the caller turns it into the exit code.
fn report_failure(kind: &str, output: &str, err: &Error, elapsed_ms: u128) {
    tracing::error!(code = err.code(), error = %err, "{kind} failed");
    if is_text(output) {
        eprintln!("error: {err}");
    } else {
        println!("{}", error_payload(kind, err, elapsed_ms));
    }
}

fn init_tracing() -> anyhow::Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_env("PAGESIFT_LOG")
        .or_else(|_| tracing_subscriber::EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to install log subscriber: {e}"))
}

fn load_dotenv() {
    let disabled = std::env::var("PAGESIFT_DOTENV")
        .map(|v| matches!(v.trim(), "0" | "false" | "no" | "off"))
        .unwrap_or(false);
    if !disabled {
        // Does not override variables already set in the process environment.
        let _ = dotenvy::dotenv();
    }
}

async fn scrape(args: &ScrapeCmd) -> Result<()> {
    let t0 = std::time::Instant::now();
    let strategy: FetchStrategy = args.strategy.parse()?;
    let pipeline = Pipeline::from_env()?;
    let page = pipeline.scrape(&args.url, strategy).await?;

    let preview_chars = args
        .preview_chars
        .unwrap_or_else(|| Defaults::from_env().preview_chars);
    let text_chars = page.text.char_count();
    let preview = page.text.preview(preview_chars);
    let truncated = text_chars > preview_chars;

    if is_text(&args.output) {
        println!("{preview}");
        return Ok(());
    }

    let mut warnings: Vec<&'static str> = Vec::new();
    if page.captcha_detected {
        warnings.push("captcha_detected");
    }
    if page.text.is_empty() {
        warnings.push("empty_page");
    }
    if truncated {
        warnings.push("preview_truncated");
    }
    let mut payload = serde_json::json!({
        "ok": true,
        "url": page.url,
        "final_url": page.final_url,
        "strategy": page.strategy,
        "status": page.status,
        "captcha_detected": page.captcha_detected,
        "text_chars": text_chars,
        "truncated": truncated,
        "text": preview,
        "warnings": warnings,
        "warning_hints": warning_hints_from(&warnings),
    });
    add_envelope_fields(&mut payload, "scrape", t0.elapsed().as_millis());
    println!("{payload}");
    Ok(())
}

fn clean(args: &CleanCmd) -> Result<()> {
    let t0 = std::time::Instant::now();
    let html = std::fs::read_to_string(&args.file)
        .map_err(|e| Error::InvalidParams(format!("cannot read {}: {e}", args.file.display())))?;
    let text = normalize_html(&html);
    if is_text(&args.output) {
        if !text.is_empty() {
            println!("{text}");
        }
        return Ok(());
    }
    let mut payload = serde_json::json!({
        "ok": true,
        "file": args.file.to_string_lossy(),
        "text_chars": text.char_count(),
        "text": text,
    });
    add_envelope_fields(&mut payload, "clean", t0.elapsed().as_millis());
    println!("{payload}");
    Ok(())
}

fn parse_mode(args: &ParseCmd, defaults: &Defaults) -> ExtractionMode {
    if let Some(d) = &args.description {
        ExtractionMode::free_query(d.clone())
    } else if args.summary {
        ExtractionMode::Summary {
            min_words: args.min_words,
            max_words: args.max_words,
        }
    } else {
        ExtractionMode::keywords(
            args.category
                .clone()
                .unwrap_or_else(|| defaults.keyword_category.clone()),
        )
    }
}

async fn parse(args: &ParseCmd) -> Result<()> {
    let t0 = std::time::Instant::now();
    let defaults = Defaults::from_env();
    let mode = parse_mode(args, &defaults);
    let strategy: FetchStrategy = args.strategy.parse()?;
    let chunker = Chunker::new(args.chunk_chars.unwrap_or(defaults.chunk_chars))?;
    mode.validate()?;
    let pipeline = Pipeline::from_env()?
        .with_model_from_env()?
        .with_chunker(chunker);
    let model = pipeline
        .dispatcher()
        .map(|d| d.model_name())
        .unwrap_or("none");

    let progress = StderrProgress { quiet: args.quiet };
    let out = pipeline.run(&args.url, strategy, &mode, &progress).await?;

    if is_text(&args.output) {
        if !out.aggregated.text.is_empty() {
            println!("{}", out.aggregated.text);
        }
        return Ok(());
    }

    let mut warnings: Vec<&'static str> = Vec::new();
    if out.captcha_detected {
        warnings.push("captcha_detected");
    }
    if out.clean_text.is_empty() {
        warnings.push("empty_page");
    }
    if out.aggregated.chunks_failed > 0 {
        warnings.push("chunks_failed");
    }
    if out.aggregated.is_empty() && !out.clean_text.is_empty() {
        warnings.push("empty_result");
    }
    let mut payload = serde_json::json!({
        "ok": true,
        "url": out.url,
        "final_url": out.final_url,
        "strategy": out.strategy,
        "mode": mode,
        "model": model,
        "chunk_chars": chunker.max_chars(),
        "chunk_count": out.chunk_count,
        "chunks_empty": out.aggregated.chunks_empty,
        "chunks_failed": out.aggregated.chunks_failed,
        "result": out.aggregated.text,
        "warnings": warnings,
        "warning_hints": warning_hints_from(&warnings),
    });
    if args.include_chunks {
        payload["chunks"] = serde_json::json!(out.results);
    }
    add_envelope_fields(&mut payload, "parse", t0.elapsed().as_millis());
    println!("{payload}");
    Ok(())
}

/// Always succeeds; problems are reported as failing checks inside the payload.
async fn doctor(args: &DoctorCmd) -> Result<()> {
    fn has_env(k: &str) -> bool {
        std::env::var(k).ok().is_some_and(|v| !v.trim().is_empty())
    }

    let t0 = std::time::Instant::now();
    let render = RenderConfig::from_env();
    let defaults = Defaults::from_env();
    let backend = ModelBackendKind::from_env();

    let mut checks: Vec<serde_json::Value> = Vec::new();

    let render_err = render.validate().err();
    checks.push(serde_json::json!({
        "name": "render_configured",
        "ok": render_err.is_none(),
        "message": render_err.as_ref().map(|e| e.to_string()).unwrap_or_else(|| "rendered strategy is configured".to_string()),
        "hint": if render_err.is_none() { "" } else { "Set PAGESIFT_BROWSER_ENDPOINT to a CDP websocket, or PAGESIFT_BROWSER_LOCAL=1. The static strategy works without either." },
    }));

    let model_err = config::model_http_client()
        .and_then(config::model_from_env)
        .err();
    checks.push(serde_json::json!({
        "name": "model_configured",
        "ok": model_err.is_none(),
        "message": model_err.as_ref().map(|e| e.to_string()).unwrap_or_else(|| "model backend is configured".to_string()),
        "hint": if model_err.is_none() { "" } else { "Set PAGESIFT_MODEL_BACKEND and the matching base URL/model variables." },
    }));

    let chunk_err = Chunker::new(defaults.chunk_chars).err();
    checks.push(serde_json::json!({
        "name": "chunk_chars_valid",
        "ok": chunk_err.is_none(),
        "message": chunk_err.as_ref().map(|e| e.to_string()).unwrap_or_else(|| format!("chunk length {}", defaults.chunk_chars)),
        "hint": if chunk_err.is_none() { "" } else { "PAGESIFT_CHUNK_CHARS must be at least 1." },
    }));

    let mut node_ok: Option<bool> = None;
    let mut node_version: Option<String> = None;
    let mut node_elapsed_ms: Option<u128> = None;
    if args.check_node {
        let check_t0 = std::time::Instant::now();
        let mut cmd = tokio::process::Command::new(&render.node_bin);
        cmd.arg("--version").kill_on_drop(true);
        let res = tokio::time::timeout(
            std::time::Duration::from_millis(args.timeout_ms),
            cmd.output(),
        )
        .await;
        node_elapsed_ms = Some(check_t0.elapsed().as_millis());
        match res {
            Ok(Ok(o)) if o.status.success() => {
                node_ok = Some(true);
                node_version = Some(String::from_utf8_lossy(&o.stdout).trim().to_string());
            }
            _ => node_ok = Some(false),
        }
    }
    checks.push(serde_json::json!({
        "name": "node_available",
        "ok": if args.check_node { node_ok.unwrap_or(false) } else { true },
        "skipped": !args.check_node,
        "message": if !args.check_node {
            "node probe skipped"
        } else if node_ok.unwrap_or(false) {
            "node is available"
        } else {
            "node could not be started"
        },
        "hint": if !args.check_node || node_ok.unwrap_or(false) { "" } else { "Install Node.js and Playwright, or point PAGESIFT_NODE at a node binary." },
        "version": node_version,
        "elapsed_ms": node_elapsed_ms,
    }));

    let ok = checks.iter().all(|c| c["ok"].as_bool().unwrap_or(false));
    let mut payload = serde_json::json!({
        "ok": ok,
        "name": "pagesift",
        "version": env!("CARGO_PKG_VERSION"),
        "platform": {
            "os": std::env::consts::OS,
            "arch": std::env::consts::ARCH,
        },
        "configured": {
            "render": {
                "endpoint": render.endpoint.is_some(),
                "launch_local": render.launch_local,
                "disabled": render.disabled,
            },
            "model": {
                "backend": backend.as_ref().map(|b| b.as_str()).unwrap_or("invalid"),
                "ollama_base_url": has_env("PAGESIFT_OLLAMA_BASE_URL"),
                "openai_compat_base_url": has_env("PAGESIFT_OPENAI_COMPAT_BASE_URL"),
                "openai_compat_api_key": has_env("PAGESIFT_OPENAI_COMPAT_API_KEY"),
            },
            "chunk_chars": defaults.chunk_chars,
            "keyword_category": defaults.keyword_category,
        },
        "checks": checks,
    });
    add_envelope_fields(&mut payload, "doctor", t0.elapsed().as_millis());

    if is_text(&args.output) {
        println!("pagesift {} (ok={})", env!("CARGO_PKG_VERSION"), ok);
        println!(
            "render: endpoint={} launch_local={}",
            render.endpoint.is_some(),
            render.launch_local
        );
        println!(
            "model: backend={}",
            payload["configured"]["model"]["backend"]
                .as_str()
                .unwrap_or("?")
        );
        println!("checks:");
        if let Some(arr) = payload["checks"].as_array() {
            for c in arr {
                let name = c["name"].as_str().unwrap_or("?");
                let ok = c["ok"].as_bool().unwrap_or(false);
                if c["skipped"].as_bool().unwrap_or(false) {
                    println!("- {name}: skipped");
                } else {
                    println!("- {}: {}", name, if ok { "ok" } else { "fail" });
                }
            }
        }
    } else {
        println!("{payload}");
    }
    Ok(())
}

fn version(args: &VersionCmd) -> Result<()> {
    if is_text(&args.output) {
        println!("pagesift {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }
    let mut v = serde_json::json!({
        "ok": true,
        "name": "pagesift",
        "version": env!("CARGO_PKG_VERSION"),
    });
    add_envelope_fields(&mut v, "version", 0);
    println!("{v}");
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    load_dotenv();
    init_tracing()?;

    let cli = Cli::parse();

    let t0 = std::time::Instant::now();
    let (kind, output, res) = match &cli.command {
        Commands::Scrape(args) => ("scrape", &args.output, scrape(args).await),
        Commands::Clean(args) => ("clean", &args.output, clean(args)),
        Commands::Parse(args) => ("parse", &args.output, parse(args).await),
        Commands::Doctor(args) => ("doctor", &args.output, doctor(args).await),
        Commands::Version(args) => ("version", &args.output, version(args)),
    };
    match res {
        Ok(()) => Ok(ExitCode::SUCCESS),
        Err(e) => {
            report_failure(kind, output, &e, t0.elapsed().as_millis());
            Ok(ExitCode::FAILURE)
        }
    }
}
