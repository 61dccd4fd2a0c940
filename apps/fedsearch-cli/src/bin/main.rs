use std::env;
use std::path::PathBuf;

use fedsearch_core::config::{resolve_with_base, Config};
use fedsearch_core::loader::DocumentLoader;
use fedsearch_core::{KeywordQuery, SearchQuery, SimilarityQuery, SimilarityTarget};
use fedsearch_federate::Federator;
use fedsearch_text::TantivyKeywordIndex;
use fedsearch_vector::LanceSimilarityIndex;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const USAGE: &str = "Usage: fedsearch <ingest|search> [args...]

  ingest [path] [--limit N]
      Load JSONL documents from a file or directory into both indices.

  search [--text Q] [--filter F] [--target-id ID | --target-vector X,Y,..]
         [--descriptors PREDICATE] [--page N] [--page-size N]
         [--strategy full_merge|filter_both|incremental] [--set key=value]...
         [--continuation TOKEN]
      Run one federated page request and print it as JSON.

  --debug raises log verbosity (RUST_LOG overrides).";

struct Paths { keyword_index: PathBuf, similarity_db: PathBuf, similarity_table: String }

impl Paths {
    fn from_config(config: &Config) -> anyhow::Result<Self> {
        let base = env::current_dir()?;
        let keyword: String = config.get("data.keyword_index_dir").unwrap_or_else(|_| "./data/indexes/tantivy".to_string());
        let similarity: String = config.get("data.similarity_db_uri").unwrap_or_else(|_| "./data/indexes/lancedb".to_string());
        let table: String = config.get("data.similarity_table").unwrap_or_else(|_| "documents".to_string());
        Ok(Self { keyword_index: resolve_with_base(&base, keyword), similarity_db: resolve_with_base(&base, similarity), similarity_table: table })
    }
}

fn init_tracing(debug: bool) {
    let fallback = if debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn value<'a>(args: &'a [String], i: usize, flag: &str) -> anyhow::Result<&'a str> {
    args.get(i + 1).map(String::as_str).ok_or_else(|| anyhow::anyhow!("{} requires a value", flag))
}

fn number(args: &[String], i: usize, flag: &str) -> anyhow::Result<usize> {
    value(args, i, flag)?.parse().map_err(|_| anyhow::anyhow!("{} requires a number", flag))
}

async fn ingest(config: &Config, args: &[String]) -> anyhow::Result<()> {
    let mut path = None; let mut limit = None;
    let mut i = 0; while i < args.len() { match args[i].as_str() {
        "--limit" => { limit = Some(number(args, i, "--limit")?); i += 1; }
        a if !a.starts_with('-') => path = Some(PathBuf::from(a)),
        a => anyhow::bail!("unknown ingest flag {}", a),
    } i += 1; }
    let path = match path {
        Some(p) => p,
        None => resolve_with_base(&env::current_dir()?, config.get::<String>("data.documents").unwrap_or_else(|_| "./data/documents".to_string())),
    };
    let paths = Paths::from_config(config)?;
    let loader = limit.map_or_else(DocumentLoader::new, DocumentLoader::with_limit);
    let docs = loader.load(&path)?;
    info!("Ingesting {} documents from {}", docs.len(), path.display());

    let keyword = TantivyKeywordIndex::create(paths.keyword_index.clone())?;
    let indexed = keyword.index_documents(&docs)?;
    info!("Keyword index at {} holds {} documents", paths.keyword_index.display(), indexed);

    match docs.iter().find_map(|d| d.vector.as_ref()) {
        Some(first) => {
            let dim = i32::try_from(first.len())?;
            let similarity = LanceSimilarityIndex::create(&paths.similarity_db, &paths.similarity_table, dim).await?;
            let written = similarity.index_documents(&docs).await?;
            info!("Similarity table '{}' holds {} vectors", paths.similarity_table, written);
        }
        None => info!("No document carries a vector; similarity index left untouched"),
    }
    Ok(())
}

fn parse_vector(raw: &str) -> anyhow::Result<Vec<f32>> {
    raw.split(',').map(|x| x.trim().parse::<f32>().map_err(|_| anyhow::anyhow!("invalid vector component '{}'", x))).collect()
}

async fn search(config: &Config, args: &[String]) -> anyhow::Result<()> {
    let mut keyword = KeywordQuery::default(); let mut similarity = SimilarityQuery::default();
    let mut page = 1usize; let mut page_size = 15usize;
    let mut overrides: Vec<(String, String)> = Vec::new(); let mut continuation = None;
    let mut i = 0; while i < args.len() { match args[i].as_str() {
        "--text" => { keyword.text = Some(value(args, i, "--text")?.to_string()); i += 1; }
        "--filter" => { keyword.filter = Some(value(args, i, "--filter")?.to_string()); i += 1; }
        "--descriptors" => { similarity.filter = Some(value(args, i, "--descriptors")?.to_string()); i += 1; }
        "--target-id" => { let id = value(args, i, "--target-id")?.parse().map_err(|_| anyhow::anyhow!("--target-id requires a document id"))?; similarity.target = Some(SimilarityTarget::Document(id)); i += 1; }
        "--target-vector" => { similarity.target = Some(SimilarityTarget::Vector(parse_vector(value(args, i, "--target-vector")?)?)); i += 1; }
        "--page" => { page = number(args, i, "--page")?; i += 1; }
        "--page-size" => { page_size = number(args, i, "--page-size")?; i += 1; }
        "--strategy" => { overrides.push(("strategy".to_string(), value(args, i, "--strategy")?.to_string())); i += 1; }
        "--set" => {
            let pair = value(args, i, "--set")?;
            let (k, v) = pair.split_once('=').ok_or_else(|| anyhow::anyhow!("--set expects key=value, got '{}'", pair))?;
            overrides.push((k.to_string(), v.to_string())); i += 1;
        }
        "--continuation" => { continuation = Some(value(args, i, "--continuation")?.to_string()); i += 1; }
        a => anyhow::bail!("unknown search flag {}", a),
    } i += 1; }

    let federation = config.federation()?;
    let mut query = SearchQuery::new(keyword, similarity).with_page(page, page_size);
    if !overrides.is_empty() {
        query = query.with_tuning(federation.with_overrides(overrides.iter().map(|(k, v)| (k.as_str(), v.as_str())))?);
    }

    let paths = Paths::from_config(config)?;
    let keyword_index = TantivyKeywordIndex::open(paths.keyword_index)?;
    let similarity_index = LanceSimilarityIndex::open(&paths.similarity_db.to_string_lossy(), &paths.similarity_table).await?;
    let federator = Federator::new(keyword_index, similarity_index, federation)?;

    let result = match federator.search_encoded(&query, continuation.as_deref()).await {
        Ok(result) => result,
        Err(e) => {
            eprintln!("Error ({}): {}", e.status(), e);
            std::process::exit(2);
        }
    };
    let more = result.has_more(page, page_size);
    let out = serde_json::json!({
        "ids": result.ids,
        "count": result.count,
        "distances": result.distances,
        "note": result.note,
        "more": more,
        "continuation": result.continuation.as_ref().map(|c| c.encode()),
    });
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}

fn split_debug(args: Vec<String>) -> (bool, Vec<String>) {
    let debug = args.iter().any(|a| a == "--debug");
    (debug, args.into_iter().filter(|a| a != "--debug").collect())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let (debug, mut args) = split_debug(env::args().skip(1).collect());
    init_tracing(debug);
    if args.is_empty() { eprintln!("{}", USAGE); std::process::exit(1); }
    let cmd = args.remove(0);
    let config = Config::load().map_err(|e| { eprintln!("Error loading config: {}", e); e })?;
    match cmd.as_str() {
        "ingest" => ingest(&config, &args).await,
        "search" => search(&config, &args).await,
        "-h" | "--help" | "help" => { println!("{}", USAGE); Ok(()) }
        _ => { eprintln!("Unknown command: {}\n\n{}", cmd, USAGE); std::process::exit(1); }
    }
}
