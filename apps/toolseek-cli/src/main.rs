use std::collections::HashMap;
use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use toolseek_core::catalog::CatalogLoader;
use toolseek_core::config::{resolve_with_base, Config};
use toolseek_core::traits::{CorpusStore, EmbeddingProvider};
use toolseek_core::types::{Method, RetrievalMethod};
use toolseek_core::Error;
use toolseek_embed::embedder_from_settings;
use toolseek_hybrid::{
    evaluate, load_labelled, FusionStrategy, Hits, RetrievalRequest, RetrievalResponse, RetrievalService, ToolRegistry,
};
use toolseek_vector::open_store;

const USAGE: &str = "Usage: toolseek <command> [args...]

Commands:
  ingest [dir] [--update]          register every *.json descriptor under dir
  query \"<text>\" [options]         search registered tools
      --method <dense|sparse|keyword|hybrid>   (default hybrid)
      --n <count>                              (default retrieval.default_n_results)
      --strategy <weighted|adaptive|rank_fusion>
      --weight <method>=<value>                repeatable, overrides fusion weights
      --json                                   print the full response as JSON
  eval <file> [options]            hit rate over labelled {query, tool} pairs (.json or .csv)
      --method <dense|sparse|keyword|hybrid>   (default hybrid)
      --n <count>                              (default 10)
      --out <path>                             write per-query results as JSON
  select [name]                    show one tool or all tools
  delete <name>                    remove a tool";

fn parse_args() -> (String, Vec<String>) {
    let mut args: Vec<String> = env::args().skip(1).collect();
    if args.is_empty() {
        eprintln!("{USAGE}");
        std::process::exit(1);
    }
    let cmd = args.remove(0);
    (cmd, args)
}

fn flag_value<'a>(args: &'a [String], i: usize, flag: &str) -> anyhow::Result<&'a str> {
    args.get(i + 1).map(String::as_str).ok_or_else(|| anyhow!("{flag} requires a value"))
}

struct App {
    config: Config,
    store: Arc<dyn CorpusStore>,
    embedder: Arc<dyn EmbeddingProvider>,
}

impl App {
    async fn open() -> anyhow::Result<Self> {
        let config = Config::load().context("loading configuration")?;
        let embed = config.embed()?;
        let embedder = embedder_from_settings(&embed).map_err(Error::from)?;
        let store = open_store(&config.store()?, embedder.dim()).await?;
        Ok(Self { config, store, embedder })
    }

    fn registry(&self) -> ToolRegistry {
        ToolRegistry::new(Arc::clone(&self.store), Arc::clone(&self.embedder))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let (cmd, args) = parse_args();
    let app = App::open().await?;
    debug!(command = %cmd, embedder = app.embedder.id(), "store and embedder ready");
    match cmd.as_str() {
        "ingest" => ingest(&app, &args).await,
        "query" => query(&app, &args).await,
        "eval" => eval(&app, &args).await,
        "select" => select(&app, args.first().map(String::as_str)).await,
        "delete" => {
            let name = args.first().ok_or_else(|| anyhow!("Usage: toolseek delete <name>"))?;
            app.registry().delete(name).await?;
            println!("Deleted '{name}'");
            Ok(())
        }
        _ => {
            eprintln!("Unknown command: {cmd}\n\n{USAGE}");
            std::process::exit(1);
        }
    }
}

async fn ingest(app: &App, args: &[String]) -> anyhow::Result<()> {
    let mut dir = None;
    let mut update = false;
    for arg in args {
        match arg.as_str() {
            "--update" | "-u" => update = true,
            a if !a.starts_with('-') => dir = Some(PathBuf::from(a)),
            other => bail!("unknown ingest flag {other}"),
        }
    }
    let dir = match dir {
        Some(d) => d,
        None => {
            let configured: String = app.config.get("catalog.dir").unwrap_or_else(|_| "tools".to_string());
            resolve_with_base(&env::current_dir()?, configured)
        }
    };
    let entries = CatalogLoader::new().load_dir(&dir)?;
    println!("Ingesting {} descriptors from {}", entries.len(), dir.display());

    let registry = app.registry();
    let pb = ProgressBar::new(entries.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} tools ({percent}%) {msg}")?
            .progress_chars("#>-"),
    );
    let summary = registry
        .ingest(&entries, update, |entry| {
            pb.set_message(entry.descriptor.name.clone());
            pb.inc(1);
        })
        .await;
    pb.finish_with_message("done");
    println!("Inserted {}, updated {}, skipped {}", summary.inserted, summary.updated, summary.skipped);
    Ok(())
}

async fn query(app: &App, args: &[String]) -> anyhow::Result<()> {
    let retrieval = app.config.retrieval()?;
    let mut text = None;
    let mut method = RetrievalMethod::Hybrid;
    let mut n = retrieval.default_n_results;
    let mut strategy = None;
    let mut weights: HashMap<Method, f32> = HashMap::new();
    let mut json = false;

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--method" | "-m" => {
                method = flag_value(args, i, "--method")?.parse()?;
                i += 1;
            }
            "--n" | "-n" => {
                n = flag_value(args, i, "--n")?.parse().context("--n requires a number")?;
                i += 1;
            }
            "--strategy" | "-s" => {
                strategy = Some(flag_value(args, i, "--strategy")?.parse::<FusionStrategy>()?);
                i += 1;
            }
            "--weight" | "-w" => {
                let pair = flag_value(args, i, "--weight")?;
                let (m, v) =
                    pair.split_once('=').ok_or_else(|| anyhow!("--weight expects <method>=<value>, got {pair}"))?;
                weights.insert(m.parse()?, v.parse().with_context(|| format!("invalid weight {v}"))?);
                i += 1;
            }
            "--json" => json = true,
            a if !a.starts_with('-') && text.is_none() => text = Some(a.to_string()),
            other => bail!("unexpected argument {other}"),
        }
        i += 1;
    }
    let text = text.ok_or_else(|| anyhow!("Usage: toolseek query \"<text>\" [options]"))?;

    let service = RetrievalService::new(Arc::clone(&app.store), Arc::clone(&app.embedder), &retrieval)?;
    let mut request = RetrievalRequest::new(text, method, n);
    request.strategy = strategy;
    if !weights.is_empty() {
        request.weights = Some(weights);
    }
    let response = service.retrieve(&request).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&response)?);
    } else {
        print_response(&response);
    }
    Ok(())
}

async fn eval(app: &App, args: &[String]) -> anyhow::Result<()> {
    let mut file = None;
    let mut method = RetrievalMethod::Hybrid;
    let mut n = 10;
    let mut out = None;

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--method" | "-m" => {
                method = flag_value(args, i, "--method")?.parse()?;
                i += 1;
            }
            "--n" | "-n" => {
                n = flag_value(args, i, "--n")?.parse().context("--n requires a number")?;
                i += 1;
            }
            "--out" | "-o" => {
                out = Some(PathBuf::from(flag_value(args, i, "--out")?));
                i += 1;
            }
            a if !a.starts_with('-') && file.is_none() => file = Some(PathBuf::from(a)),
            other => bail!("unexpected argument {other}"),
        }
        i += 1;
    }
    let file = file.ok_or_else(|| anyhow!("Usage: toolseek eval <file> [options]"))?;
    let cases = load_labelled(&file)?;
    println!("Evaluating {} queries from {} ({method}, n={n})", cases.len(), file.display());

    let service = RetrievalService::new(Arc::clone(&app.store), Arc::clone(&app.embedder), &app.config.retrieval()?)?;
    let pb = ProgressBar::new(cases.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg}")?
            .progress_chars("#>-"),
    );
    let mut hits = 0usize;
    let report = evaluate(&service, &cases, method, n, |outcome| {
        if outcome.hit {
            hits += 1;
        }
        pb.set_message(format!("hits {hits}, last {:.1} ms", outcome.elapsed_ms));
        pb.inc(1);
    })
    .await?;
    pb.finish_with_message("done");

    for outcome in report.outcomes.iter().filter(|o| !o.hit) {
        let top: Vec<&str> = outcome.retrieved.iter().take(3).map(String::as_str).collect();
        println!("miss: {:<40} expected {:<24} got [{}]", outcome.query, outcome.expected, top.join(", "));
    }
    println!(
        "hit@{n}: {}/{} = {:.3}  latency mean {:.1} ms, max {:.1} ms",
        report.hits(),
        report.total(),
        report.hit_rate(),
        report.mean_latency_ms(),
        report.max_latency_ms()
    );
    if let Some(out) = out {
        std::fs::write(&out, serde_json::to_string_pretty(&report)?)
            .with_context(|| format!("writing {}", out.display()))?;
        println!("Per-query results written to {}", out.display());
    }
    Ok(())
}

fn print_response(response: &RetrievalResponse) {
    if response.is_degraded() {
        for (method, reason) in &response.failures {
            eprintln!("warning: {method} unavailable: {reason}");
        }
    }
    let contributing: Vec<&str> = response.contributing.iter().map(|m| m.as_str()).collect();
    println!("methods: {}", contributing.join(", "));
    if response.hits.is_empty() {
        println!("no matching tools");
        return;
    }
    match &response.hits {
        Hits::Single(hits) => {
            for (rank, hit) in hits.iter().enumerate() {
                println!("{:>2}. {:<32} {:.4}  ({})", rank + 1, hit.tool_id, hit.score.raw(), hit.source);
            }
        }
        Hits::Fused(hits) => {
            for (rank, hit) in hits.iter().enumerate() {
                let parts: Vec<String> = hit
                    .breakdown
                    .iter()
                    .map(|(m, s)| format!("{m}={:.3}/{:.3}", s.raw(), s.normalized()))
                    .collect();
                println!("{:>2}. {:<32} {:.4}  [{}]", rank + 1, hit.tool_id, hit.fused_score, parts.join(" "));
            }
        }
    }
}

async fn select(app: &App, name: Option<&str>) -> anyhow::Result<()> {
    let entries = app.registry().select(name).await?;
    if entries.is_empty() {
        println!("no tools registered");
    }
    for entry in entries {
        println!("{}", entry.name);
        println!("  {}", entry.text);
        if let Some(q) = &entry.hypothetical_queries {
            println!("  queries: {q}");
        }
        if let Some(updated) = entry.metadata.get("updated_at").and_then(|v| v.as_str()) {
            println!("  updated: {updated}");
        }
    }
    Ok(())
}
