use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tracing::info;

use gridstore::utils::limits::READ_BUFFER_SIZE;
use gridstore::{
    ByteStream, Filter, FindOptions, LocalBucket, ObjectId, ObjectStore, SortOrder, StoreConfig,
    StoredObjectMetadata, WriteOptions,
};

#[derive(Parser)]
#[command(name = "gridstore")]
#[command(about = "Chunked object store operations")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(long, help = "Config file path")]
    config: Option<String>,

    #[arg(long, help = "Data directory path (overrides config)")]
    data: Option<String>,

    #[arg(long, help = "Bucket name (overrides config)")]
    bucket: Option<String>,

    #[arg(long, help = "Output as JSON")]
    json: bool,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Store a file
    Put {
        path: PathBuf,
        #[arg(long, help = "Stored filename (defaults to the file's name)")]
        name: Option<String>,
        #[arg(long, help = "Store under this 24-char hex id")]
        id: Option<ObjectId>,
        #[arg(long)]
        chunk_size: Option<u32>,
        #[arg(long)]
        content_type: Option<String>,
    },
    /// Read an object to a file or stdout
    Get {
        #[arg(long, conflicts_with = "name", required_unless_present = "name")]
        id: Option<ObjectId>,
        #[arg(long)]
        name: Option<String>,
        #[arg(long, help = "Output file (stdout if omitted)")]
        out: Option<PathBuf>,
    },
    /// List stored objects, newest first
    Ls {
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Show one object's metadata record
    Stat {
        #[arg(long, conflicts_with = "name", required_unless_present = "name")]
        id: Option<ObjectId>,
        #[arg(long)]
        name: Option<String>,
    },
    /// Delete an object by id
    Rm {
        #[arg(long)]
        id: ObjectId,
    },
    GenerateConfig {
        #[arg(long, default_value = "gridstore.toml", help = "Config file path")]
        output: String,
    },
}

fn lookup_filter(id: Option<ObjectId>, name: Option<String>) -> Filter {
    Filter {
        id,
        filename: name,
        ..Filter::default()
    }
}

fn print_record(record: &StoredObjectMetadata) {
    println!(
        "   {}  {:>10}  {}  {}",
        record.id,
        record.length,
        record.upload_date.format("%Y-%m-%d %H:%M:%S"),
        record.filename
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gridstore=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Commands::GenerateConfig { output } = &cli.command {
        StoreConfig::default().save(output)?;
        if cli.json {
            println!("{}", serde_json::json!({"config": output}));
        } else {
            println!("✅ Wrote default config to {}", output);
        }
        return Ok(());
    }

    let mut config = StoreConfig::load_or_create(cli.config.as_deref())?;

    if let Some(data) = cli.data {
        config.data_directory = data.into();
    }
    if let Some(bucket) = cli.bucket {
        config.bucket_name = bucket;
    }
    config.validate()?;
    config.ensure_directories()?;

    let bucket = LocalBucket::from_config(&config)
        .await
        .with_context(|| format!("opening bucket in {:?}", config.data_directory))?;
    let mut store = ObjectStore::new(Arc::new(bucket))?;
    if config.max_read_bytes > 0 {
        store = store.with_max_read_bytes(config.max_read_bytes as usize);
    }
    info!("Using bucket '{}' in {:?}", store.bucket_name(), config.data_directory);

    match cli.command {
        Commands::Put { path, name, id, chunk_size, content_type } => {
            let filename = match name {
                Some(name) => name,
                None => path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .context("cannot derive a filename from the path; pass --name")?,
            };

            let mut options = WriteOptions::named(filename.clone());
            options.id = id;
            options.upload.chunk_size_bytes = chunk_size;
            options.upload.content_type = content_type;

            let file = tokio::fs::File::open(&path)
                .await
                .with_context(|| format!("opening {:?}", path))?;
            let id = store.write(ByteStream::from_reader(file, READ_BUFFER_SIZE), &options).await?;

            if cli.json {
                println!("{}", serde_json::json!({"id": id, "filename": filename}));
            } else {
                println!("✅ Stored {} as {}", filename, id);
            }
        }
        Commands::Get { id, name, out } => {
            let data = store.read(&lookup_filter(id, name)).await?;
            match out {
                Some(out) => {
                    tokio::fs::write(&out, &data).await?;
                    if cli.json {
                        println!("{}", serde_json::json!({"bytes": data.len(), "out": out}));
                    } else {
                        println!("✅ Wrote {} bytes to {:?}", data.len(), out);
                    }
                }
                None => {
                    let mut stdout = tokio::io::stdout();
                    stdout.write_all(&data).await?;
                    stdout.flush().await?;
                }
            }
        }
        Commands::Ls { name, limit } => {
            let filter = lookup_filter(None, name);
            let mut options = FindOptions::new().sort(SortOrder::Descending);
            options.limit = limit;
            let records = store.find(&filter, &options).await?;

            if cli.json {
                println!("{}", serde_json::to_string_pretty(&records)?);
            } else {
                println!("📋 Objects in '{}'", store.bucket_name());
                println!("==================");
                if records.is_empty() {
                    println!("   No objects found");
                }
                for record in &records {
                    print_record(record);
                }
            }
        }
        Commands::Stat { id, name } => {
            let filter = lookup_filter(id, name);
            let options = FindOptions::new().sort(SortOrder::Descending);
            match store.find_one(&filter, &options).await? {
                Some(record) => {
                    if cli.json {
                        println!("{}", serde_json::to_string_pretty(&record)?);
                    } else {
                        println!("📄 {}", record.filename);
                        println!("   Id: {}", record.id);
                        println!("   Length: {} bytes", record.length);
                        println!("   Chunks: {} x {} bytes", record.chunk_count(), record.chunk_size);
                        println!("   Uploaded: {}", record.upload_date);
                        println!("   SHA-256: {}", record.sha256);
                        if let Some(content_type) = &record.content_type {
                            println!("   Content type: {}", content_type);
                        }
                    }
                }
                None => {
                    if cli.json {
                        println!("{}", serde_json::json!({"error": "Object not found"}));
                    } else {
                        println!("❌ Object not found");
                    }
                }
            }
        }
        Commands::Rm { id } => {
            let deleted = store.delete(&Filter::by_id(id)).await?;
            if cli.json {
                println!("{}", serde_json::json!({"deleted": deleted}));
            } else {
                println!("🗑️  Deleted {}", deleted);
            }
        }
        Commands::GenerateConfig { .. } => {}
    }

    Ok(())
}
