use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serde_json::Value;
use time::OffsetDateTime;
use uigf_export_core::{build_document, UigfDocument};
use uigf_export_store_sqlite::GachaStore;

#[derive(Debug, Parser)]
#[command(name = "uigf-export")]
#[command(about = "Export gacha-pull history from a save database as UIGF v3.0 JSON")]
struct Cli {
    #[arg(long, default_value = "./Userdata.db")]
    db: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Export one uid's pull history to a UIGF v3.0 JSON file.
    Export(ExportArgs),
    /// List the distinct uids present in the save database.
    Uids,
}

#[derive(Debug, Args)]
struct ExportArgs {
    #[arg(long)]
    out: PathBuf,
    /// Uid to export; defaults to the first distinct uid in the store.
    #[arg(long)]
    uid: Option<i64>,
}

fn emit_json(value: Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Command::Export(args) => run_export(&cli.db, &args),
        Command::Uids => run_uids(&cli.db),
    }
}

fn run_export(db: &Path, args: &ExportArgs) -> Result<()> {
    // Connection scope ends before any output file I/O begins.
    let (uid, records) = {
        let store = GachaStore::open(db)?;
        let uid = store.resolve_archive_id(args.uid)?;
        let records = store.records_for_archive(uid)?;
        (uid, records)
    };

    let outcome = build_document(&uid.to_string(), &records, OffsetDateTime::now_utc())?;
    for skipped in &outcome.skipped {
        eprintln!(
            "warning: unknown pool type {} on record {}; skipping",
            skipped.query_type, skipped.id
        );
    }

    write_document(&args.out, &outcome.document)?;

    emit_json(serde_json::json!({
        "uid": outcome.document.info.uid,
        "records_exported": outcome.document.list.len(),
        "records_skipped": outcome.skipped.len(),
        "region_time_zone": outcome.document.info.region_time_zone,
        "out": args.out,
    }))
}

fn run_uids(db: &Path) -> Result<()> {
    let store = GachaStore::open(db)?;
    let uids = store.list_archive_ids()?;
    emit_json(serde_json::json!({ "uids": uids }))
}

/// Serialize the document as pretty UTF-8 JSON (non-ASCII unescaped) and
/// move it into place over the destination. Writing to a temporary sibling
/// first means a failed run never leaves a partial file at the output path.
fn write_document(out: &Path, document: &UigfDocument) -> Result<()> {
    let body = serde_json::to_vec_pretty(document).context("failed to serialize UIGF document")?;

    let staging = staging_path(out);
    fs::write(&staging, &body)
        .with_context(|| format!("failed to write export file {}", staging.display()))?;
    fs::rename(&staging, out)
        .with_context(|| format!("failed to move export file into place at {}", out.display()))?;
    Ok(())
}

fn staging_path(out: &Path) -> PathBuf {
    let mut name = out
        .file_name()
        .map_or_else(|| OsString::from("uigf_export.json"), OsString::from);
    name.push(".tmp");
    out.with_file_name(name)
}
