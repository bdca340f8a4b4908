// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! `bom`: developer tool for Echo BOM documents.
//!
//! Inspects documents, converts them to and from JSON and prints the
//! effective reader/writer configuration.

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use echo_bom::{
    builtin, read_document, write_document, BomConfig, Document, ObjectNode, ResolvedNode,
};
use tracing::{debug, info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "bom", author, version, about = "Echo Binary Object Model tool")]
struct Cli {
    /// JSON configuration file (missing keys take their defaults)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the header, record statistics and type tree of a document
    Inspect {
        /// Document to inspect
        file: PathBuf,
    },
    /// Render a document as JSON
    ToJson {
        /// Document to convert
        file: PathBuf,
        /// Emit single-line JSON
        #[arg(long)]
        compact: bool,
    },
    /// Build a document from JSON
    FromJson {
        /// JSON input
        json: PathBuf,
        /// Output document
        #[arg(short, long)]
        out: PathBuf,
        /// Write repeated records in full instead of as references
        #[arg(long)]
        no_dedup: bool,
    },
    /// Print the effective configuration as JSON
    Config,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose)?;
    let config = load_config(cli.config.as_deref())?;
    let stdout = io::stdout();
    let mut out = stdout.lock();
    match cli.command {
        Command::Inspect { file } => inspect(&mut out, &file, &config),
        Command::ToJson { file, compact } => to_json(&mut out, &file, &config, compact),
        Command::FromJson {
            json,
            out: target,
            no_dedup,
        } => from_json(&mut out, &json, &target, &config, no_dedup),
        Command::Config => {
            writeln!(out, "{}", config.to_json_pretty()?)?;
            Ok(())
        }
    }
}

fn init_logging(verbose: u8) -> Result<()> {
    let level = match verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(io::stderr)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber).context("install log subscriber")
}

fn load_config(path: Option<&Path>) -> Result<BomConfig> {
    let Some(path) = path else {
        return Ok(BomConfig::default());
    };
    let bytes = std::fs::read(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    let config = BomConfig::from_json_slice(&bytes)
        .with_context(|| format!("invalid config {}", path.display()))?;
    debug!(path = %path.display(), "loaded config");
    Ok(config)
}

fn open_document(path: &Path, config: &BomConfig) -> Result<Document> {
    let file = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    read_document(&mut BufReader::new(file), config.reader)
        .with_context(|| format!("failed to read document {}", path.display()))
}

fn inspect(out: &mut impl Write, path: &Path, config: &BomConfig) -> Result<()> {
    let doc = open_document(path, config)?;
    writeln!(out, "version: {}", doc.header.version)?;
    writeln!(out, "dedup:   {}", doc.header.dedup)?;
    writeln!(out, "root:    {}", doc.root_id)?;
    writeln!(
        out,
        "records: {} value, {} ref, {} bytes",
        doc.stats.value_records, doc.stats.ref_records, doc.stats.bytes_read
    )?;
    let (mut objects, mut arrays, mut values) = (0usize, 0usize, 0usize);
    for id in doc.context.ids() {
        match doc.context.get(id) {
            Some(ResolvedNode::Object(_)) => objects += 1,
            Some(ResolvedNode::Array(_)) => arrays += 1,
            Some(ResolvedNode::Value(_)) => values += 1,
            None => {}
        }
    }
    writeln!(out, "unique:  {objects} objects, {arrays} arrays, {values} values")?;
    writeln!(out, "tree:")?;
    write_tree(out, &doc.root, 1)
}

fn write_tree(out: &mut impl Write, node: &ObjectNode, depth: usize) -> Result<()> {
    let indent = "  ".repeat(depth);
    writeln!(out, "{indent}{} [{}]", node.type_tag().name(), node.content_id())?;
    for (name, value) in node.properties() {
        let shown = match value.ty().builtin_base() {
            Some(builtin::STRING) => format!("{:?}", value.read_string()?),
            Some(builtin::BYTES) => hex::encode(value.bytes()),
            _ => format!("{} bytes", value.len()),
        };
        writeln!(out, "{indent}  .{name}: {} = {shown}", value.ty().name())?;
    }
    for child in node.children() {
        write_tree(out, child, depth + 1)?;
    }
    Ok(())
}

fn to_json(out: &mut impl Write, path: &Path, config: &BomConfig, compact: bool) -> Result<()> {
    let mut doc = open_document(path, config)?;
    let json = doc
        .root
        .to_json(&mut doc.context)
        .context("failed to render document as JSON")?;
    if compact {
        serde_json::to_writer(&mut *out, &json)?;
    } else {
        serde_json::to_writer_pretty(&mut *out, &json)?;
    }
    writeln!(out)?;
    Ok(())
}

fn from_json(
    out: &mut impl Write,
    json_path: &Path,
    target: &Path,
    config: &BomConfig,
    no_dedup: bool,
) -> Result<()> {
    let bytes = std::fs::read(json_path)
        .with_context(|| format!("failed to read {}", json_path.display()))?;
    let json: serde_json::Value = serde_json::from_slice(&bytes)
        .with_context(|| format!("invalid JSON in {}", json_path.display()))?;
    let root = ObjectNode::from_json(&json).context("JSON does not describe a BOM object")?;

    let mut writer_config = config.writer;
    if no_dedup {
        writer_config.dedup = false;
    }
    let file =
        File::create(target).with_context(|| format!("failed to create {}", target.display()))?;
    let mut sink = BufWriter::new(file);
    let (id, stats) = write_document(&mut sink, &root, writer_config)
        .with_context(|| format!("failed to write {}", target.display()))?;
    sink.flush()?;
    info!(%id, bytes = stats.bytes_written, "document written");
    writeln!(
        out,
        "wrote {} ({} bytes, {} value records, {} ref records)",
        target.display(),
        stats.bytes_written,
        stats.value_records,
        stats.ref_records
    )?;
    Ok(())
}
