use std::io::Read;
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use colored::Colorize;
use serde_json::{json, Map, Value};

use kvshape::{RepoError, Repository, RepositoryConfig};
use kvshape_schema::{SchemaError, SchemaFile};
use kvshape_store::{Batch, InMemoryStore};

use crate::cli::*;

pub async fn run_command(cli: Cli) -> anyhow::Result<()> {
    let format = cli.format;
    match cli.command {
        Command::Plan(args) => cmd_plan(&open(&args)?, format),
        Command::Roundtrip(args) => cmd_roundtrip(&open(&args)?, format).await,
        Command::Validate(args) => cmd_validate(&open(&args)?, format),
    }
}

/// A compiled schema, its document, and a fresh in-memory store.
struct Workspace {
    repo: Repository<Value>,
    store: Arc<InMemoryStore>,
    document: Value,
}

fn open(args: &DocumentArgs) -> anyhow::Result<Workspace> {
    let schema = SchemaFile::load(&args.schema)?;
    let model = Arc::new(schema.compile()?);
    let store = Arc::new(InMemoryStore::new());
    let mut repo = Repository::from_descriptor(model, store.clone());
    if let Some(path) = &args.config {
        repo = repo.with_config(&RepositoryConfig::load(path)?)?;
    }
    let document = read_document(&args.input)?;
    Ok(Workspace {
        repo,
        store,
        document,
    })
}

fn read_document(path: &Path) -> anyhow::Result<Value> {
    let text = if path == Path::new("-") {
        let mut text = String::new();
        std::io::stdin().read_to_string(&mut text)?;
        text
    } else {
        std::fs::read_to_string(path).with_context(|| format!("cannot read {}", path.display()))?
    };
    serde_json::from_str(&text).with_context(|| format!("{} is not valid JSON", path.display()))
}

fn cmd_plan(ws: &Workspace, format: OutputFormat) -> anyhow::Result<()> {
    let batch = ws.repo.plan_save(&ws.document)?;
    match format {
        OutputFormat::Text => {
            println!(
                "Plan for {} at {}: {} commands",
                ws.repo.model().name().bold(),
                ws.repo.key().cyan(),
                batch.len()
            );
            println!("{batch}");
        }
        OutputFormat::Json => {
            let out = json!({
                "model": ws.repo.model().name(),
                "key": ws.repo.key(),
                "commands": batch.commands(),
            });
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
    }
    Ok(())
}

/// Outcome of saving a document and reading it back.
#[derive(Debug)]
struct RoundTrip {
    batch: Batch,
    keys: Vec<String>,
    loaded: Option<Value>,
    matches: bool,
}

async fn round_trip(ws: &Workspace) -> anyhow::Result<RoundTrip> {
    let batch = ws.repo.plan_save(&ws.document)?;
    ws.repo.save_model(&ws.document).await?;
    let keys = ws.store.keys();
    let loaded = ws.repo.load_model().await?;
    let matches = loaded.as_ref() == Some(&without_nulls(&ws.document));
    Ok(RoundTrip {
        batch,
        keys,
        loaded,
        matches,
    })
}

async fn cmd_roundtrip(ws: &Workspace, format: OutputFormat) -> anyhow::Result<()> {
    let report = round_trip(ws).await?;
    match format {
        OutputFormat::Text => {
            println!("Saved {} commands, {} keys:", report.batch.len(), report.keys.len());
            for key in &report.keys {
                println!("  {}", key.dimmed());
            }
            match &report.loaded {
                Some(value) => println!("Loaded: {}", serde_json::to_string_pretty(value)?),
                None => println!("Loaded: {}", "absent".yellow()),
            }
            if report.matches {
                println!("{} Document round-tripped.", "✓".green().bold());
            } else {
                println!("{} Loaded document differs from input.", "✗".red().bold());
            }
        }
        OutputFormat::Json => {
            let out = json!({
                "commands": report.batch.len(),
                "keys": report.keys,
                "loaded": report.loaded,
                "matches": report.matches,
            });
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
    }
    Ok(())
}

/// Validation goes through the same path as a save, overrides included.
fn check(ws: &Workspace) -> Result<(), RepoError> {
    ws.repo.plan_save(&ws.document).map(drop)
}

fn cmd_validate(ws: &Workspace, format: OutputFormat) -> anyhow::Result<()> {
    let result = check(ws);
    match (format, &result) {
        (OutputFormat::Text, Ok(())) => {
            println!("{} Document matches {}.", "✓".green().bold(), ws.repo.model().name().bold())
        }
        (OutputFormat::Text, Err(err)) => println!("{} {err}", "✗".red().bold()),
        (OutputFormat::Json, _) => {
            let error = match &result {
                Err(RepoError::Schema(SchemaError::TypeMismatch {
                    key,
                    expected,
                    found,
                })) => json!({ "key": key, "expected": expected, "found": found }),
                Err(other) => json!({ "message": other.to_string() }),
                Ok(()) => Value::Null,
            };
            let out = json!({ "valid": result.is_ok(), "error": error });
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
    }
    result.context("document rejected")
}

/// Drop `null` object members recursively; they load back as missing.
fn without_nulls(value: &Value) -> Value {
    match value {
        Value::Object(fields) => Value::Object(
            fields
                .iter()
                .filter(|(_, v)| !v.is_null())
                .map(|(k, v)| (k.clone(), without_nulls(v)))
                .collect::<Map<String, Value>>(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(without_nulls).collect()),
        other => other.clone(),
    }
}
