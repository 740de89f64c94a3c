use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use uuid::Uuid;

use taxclaw::backend::backend_for;
use taxclaw::config::{self, BackendKind, Config, ConfigError, PRIVACY_WARNING};
use taxclaw::export::{export, ExportFormat};
use taxclaw::ingest::{read_page_text, stage_file};
use taxclaw::pipeline::extract::RetryPolicy;
use taxclaw::pipeline::processor::{refresh_status, DocumentProcessor};
use taxclaw::pipeline::review::ReviewPolicy;
use taxclaw::store::{RecordStore, SqliteRecordStore};
use taxclaw::{RecordStatus, SchemaRegistry};

#[derive(Parser)]
#[command(name = "taxclaw", version, about = "Local-first tax document extraction")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Extract records from a tax document.
    Ingest {
        /// Document to ingest (page text, form-feed separated pages).
        file: PathBuf,
        /// Tax year the document belongs to.
        #[arg(long)]
        year: i32,
        /// Person or entity the document belongs to.
        #[arg(long)]
        filer: Option<String>,
    },
    /// List extracted records.
    List {
        #[arg(long)]
        filer: Option<String>,
        #[arg(long)]
        year: Option<i32>,
    },
    /// Show one record with its fields and correction history.
    Show { id: Uuid },
    /// Correct a field value. Requires the record version from `show`.
    Correct {
        id: Uuid,
        field_key: String,
        value: String,
        /// Record version the correction was prepared against.
        #[arg(long)]
        version: i64,
    },
    /// Export records.
    Export {
        /// Output file; stdout when omitted. Writing to a file marks the
        /// exported records.
        #[arg(long)]
        out: Option<PathBuf>,
        /// wide, long, or json.
        #[arg(long, default_value = "wide")]
        format: ExportFormat,
        #[arg(long)]
        filer: Option<String>,
        #[arg(long)]
        year: Option<i32>,
        /// Export only these records.
        #[arg(long)]
        id: Vec<Uuid>,
    },
    /// Show or change configuration.
    Config {
        /// local or cloud.
        #[arg(long)]
        backend: Option<String>,
        /// Acknowledge that cloud mode sends document content to Anthropic.
        #[arg(long)]
        acknowledge_cloud: bool,
    },
}

fn main() -> Result<()> {
    taxclaw::init_tracing();
    let cli = Cli::parse();
    let config = Config::load()?;

    match cli.command {
        Command::Ingest { file, year, filer } => ingest(&config, &file, year, filer.as_deref()),
        Command::List { filer, year } => list(&config, filer.as_deref(), year),
        Command::Show { id } => show(&config, &id),
        Command::Correct {
            id,
            field_key,
            value,
            version,
        } => correct(&config, &id, &field_key, &value, version),
        Command::Export {
            out,
            format,
            filer,
            year,
            id,
        } => run_export(&config, out.as_deref(), format, filer.as_deref(), year, &id),
        Command::Config {
            backend,
            acknowledge_cloud,
        } => configure(config, backend.as_deref(), acknowledge_cloud),
    }
}

fn open_store(config: &Config, registry: &Arc<SchemaRegistry>) -> Result<Arc<SqliteRecordStore>> {
    let path = config.db_path();
    let store = SqliteRecordStore::open(&path, registry.clone())
        .with_context(|| format!("opening database at {}", path.display()))?;
    Ok(Arc::new(store))
}

fn ingest(config: &Config, file: &std::path::Path, year: i32, filer: Option<&str>) -> Result<()> {
    let registry = Arc::new(SchemaRegistry::with_builtin());
    let store = open_store(config, &registry)?;

    let backend = match backend_for(config) {
        Ok(backend) => backend,
        Err(ConfigError::CloudModeNotAcknowledged) => {
            eprintln!("{PRIVACY_WARNING}");
            eprintln!(
                "Run `taxclaw config --acknowledge-cloud` to accept, or switch back to the local backend."
            );
            bail!("cloud mode not acknowledged");
        }
        Err(e) => return Err(e.into()),
    };

    let staged = stage_file(file, &config.uploads_dir())?;
    let pages = read_page_text(&staged.stored_path)?;

    let processor = DocumentProcessor::new(
        registry,
        backend,
        store.clone(),
        ReviewPolicy::from_config(config),
        RetryPolicy::from_config(config),
    );
    let outcome = processor.process(&staged, &pages, filer, year)?;

    if outcome.duplicate {
        println!("already ingested ({} records):", outcome.record_ids.len());
    }
    for id in &outcome.record_ids {
        let record = store.load(id)?;
        println!(
            "{id}  {}  {}  v{}",
            record.form_type,
            record.status.as_str(),
            record.version
        );
    }
    Ok(())
}

fn list(config: &Config, filer: Option<&str>, year: Option<i32>) -> Result<()> {
    let registry = Arc::new(SchemaRegistry::with_builtin());
    let store = open_store(config, &registry)?;
    for summary in store.list(filer, year)? {
        println!(
            "{}  {}  {}  {}  {}{}",
            summary.id,
            summary.tax_year,
            summary.form_type,
            summary.filer.as_deref().unwrap_or("-"),
            summary.status.as_str(),
            if summary.extraction_failed {
                "  (extraction failed)"
            } else {
                ""
            }
        );
    }
    Ok(())
}

fn show(config: &Config, id: &Uuid) -> Result<()> {
    let registry = Arc::new(SchemaRegistry::with_builtin());
    let store = open_store(config, &registry)?;
    let record = store.load(id)?;

    println!("record   {id}  (version {})", record.version);
    println!("form     {}  tax year {}", record.form_type, record.tax_year);
    println!("filer    {}", record.filer.as_deref().unwrap_or("-"));
    println!("file     {}", record.source_file.original_filename);
    println!("status   {}", record.status.as_str());
    if record.extraction_failed {
        println!("warning  extraction failed; all fields need manual entry");
    }
    println!();
    for field in &record.fields {
        let value = field
            .normalized
            .as_ref()
            .map(|v| v.render())
            .unwrap_or_else(|| "(absent)".to_string());
        println!(
            "  {:32} {:20} {:.2} {}",
            field.key,
            value,
            field.confidence,
            field.source.as_str()
        );
    }

    let corrections = store.corrections(id)?;
    if !corrections.is_empty() {
        println!();
        println!("corrections:");
        for c in corrections {
            println!(
                "  {}  {}: {} -> {}",
                c.corrected_at,
                c.field_key,
                c.prior_value.as_deref().unwrap_or("(absent)"),
                c.corrected_value
            );
        }
    }
    Ok(())
}

fn correct(config: &Config, id: &Uuid, field_key: &str, value: &str, version: i64) -> Result<()> {
    let registry = Arc::new(SchemaRegistry::with_builtin());
    let store = open_store(config, &registry)?;
    store.update_field(id, field_key, value, version)?;
    let status = refresh_status(
        store.as_ref(),
        &registry,
        &ReviewPolicy::from_config(config),
        id,
    )?;
    println!("corrected {field_key}; record now {}", status.as_str());
    Ok(())
}

fn run_export(
    config: &Config,
    out: Option<&std::path::Path>,
    format: ExportFormat,
    filer: Option<&str>,
    year: Option<i32>,
    ids: &[Uuid],
) -> Result<()> {
    let registry = Arc::new(SchemaRegistry::with_builtin());
    let store = open_store(config, &registry)?;

    let records = if ids.is_empty() {
        store
            .list(filer, year)?
            .iter()
            .map(|s| store.load(&s.id))
            .collect::<Result<Vec<_>, _>>()?
    } else {
        ids.iter().map(|id| store.load(id)).collect::<Result<Vec<_>, _>>()?
    };
    if records.is_empty() {
        bail!("no records to export");
    }

    let bytes = export(&records, &registry, format)?;
    match out {
        Some(path) => {
            std::fs::write(path, &bytes)
                .with_context(|| format!("writing {}", path.display()))?;
            // Exporting never mutates field state; the status annotation is
            // applied only once the bytes are safely on disk.
            for record in &records {
                store.set_status(&record.id, RecordStatus::Exported)?;
            }
            println!("exported {} records to {}", records.len(), path.display());
        }
        None => {
            use std::io::Write;
            std::io::stdout().write_all(&bytes)?;
        }
    }
    Ok(())
}

fn configure(mut config: Config, backend: Option<&str>, acknowledge_cloud: bool) -> Result<()> {
    let mut changed = false;
    if let Some(backend) = backend {
        config.backend = match backend {
            "local" => BackendKind::Local,
            "cloud" => BackendKind::Cloud,
            other => bail!("unknown backend {other:?} (expected local or cloud)"),
        };
        changed = true;
    }
    if acknowledge_cloud {
        config.cloud_ack = true;
        changed = true;
    }

    if changed {
        if config.backend == BackendKind::Cloud && !config.cloud_ack {
            eprintln!("{PRIVACY_WARNING}");
        }
        config.save()?;
        println!("configuration saved to {}", config::config_path().display());
    } else {
        println!("{}", serde_json::to_string_pretty(&config)?);
    }
    Ok(())
}
