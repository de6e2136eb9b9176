use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use seeker_core::pipeline::{Extract, ModelPaths};
use seeker_core::{codec, FacePipeline, Location};
use serde_json::Value;
use std::path::{Path, PathBuf};

#[zbus::proxy(
    interface = "org.seeker.Seeker1",
    default_service = "org.seeker.Seeker1",
    default_path = "/org/seeker/Seeker1"
)]
trait Seeker {
    fn match_image(&self, image: &[u8]) -> zbus::Result<String>;
    fn list_records(&self) -> zbus::Result<String>;
    fn get_record(&self, id: &str) -> zbus::Result<String>;
    fn add_record(&self, metadata: &str, image: &[u8]) -> zbus::Result<String>;
    fn remove_record(&self, id: &str) -> zbus::Result<bool>;
    fn status(&self) -> zbus::Result<String>;
}

#[derive(Parser)]
#[command(name = "seeker", about = "Seeker missing-person face matching CLI")]
struct Cli {
    /// Talk to a daemon on the system bus instead of the session bus
    #[arg(long, global = true)]
    system: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Match a photo against every stored record
    Match {
        /// Image file (JPEG, PNG, ...)
        image: PathBuf,
    },
    /// List stored records
    List,
    /// Show one record as JSON
    Show {
        /// Record ID
        id: String,
    },
    /// Add a missing-person record
    Add {
        #[arg(long)]
        name: String,
        #[arg(long)]
        age: String,
        #[arg(long)]
        gender: String,
        #[arg(long)]
        last_seen: String,
        #[arg(long)]
        date_missing: String,
        #[arg(long)]
        contact: String,
        #[arg(long)]
        description: String,
        /// Photo of the person
        #[arg(long)]
        image: Option<PathBuf>,
    },
    /// Remove a record
    Remove {
        /// Record ID to remove
        id: String,
    },
    /// Show daemon status
    Status,
    /// Run face detection locally (bypasses the daemon)
    Detect {
        image: PathBuf,
        /// Directory holding the model files
        #[arg(long)]
        model_dir: Option<PathBuf>,
        /// Upsampling passes for the fast tier (at least 2)
        #[arg(long, default_value_t = 2, value_parser = clap::value_parser!(u32).range(2..))]
        upsample: u32,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Detect {
            image,
            model_dir,
            upsample,
        } => detect(&image, model_dir, upsample),
        command => run_remote(command, cli.system).await,
    }
}

async fn run_remote(command: Commands, system: bool) -> Result<()> {
    let connection = if system {
        zbus::Connection::system().await?
    } else {
        zbus::Connection::session().await?
    };
    let proxy = SeekerProxy::new(&connection)
        .await
        .context("seekerd is not reachable on the bus")?;

    match command {
        Commands::Match { image } => {
            let bytes = std::fs::read(&image).with_context(|| format!("reading {}", image.display()))?;
            let response: Value = serde_json::from_str(&proxy.match_image(&bytes).await?)?;
            print_match(&response);
        }
        Commands::List => {
            let records: Vec<Value> = serde_json::from_str(&proxy.list_records().await?)?;
            if records.is_empty() {
                println!("No records stored");
            }
            for record in &records {
                println!(
                    "{}  {}  (missing since {}, last seen {})",
                    field(record, "id"),
                    field(record, "name"),
                    field(record, "dateMissing"),
                    field(record, "lastSeenLocation"),
                );
            }
        }
        Commands::Show { id } => {
            let record: Value = serde_json::from_str(&proxy.get_record(&id).await?)?;
            println!("{}", serde_json::to_string_pretty(&record)?);
        }
        Commands::Add {
            name,
            age,
            gender,
            last_seen,
            date_missing,
            contact,
            description,
            image,
        } => {
            let metadata = serde_json::json!({
                "name": name,
                "age": age,
                "gender": gender,
                "lastSeenLocation": last_seen,
                "dateMissing": date_missing,
                "contactNumber": contact,
                "description": description,
            });
            let bytes = match &image {
                Some(path) => std::fs::read(path).with_context(|| format!("reading {}", path.display()))?,
                None => Vec::new(),
            };
            let id = proxy.add_record(&metadata.to_string(), &bytes).await?;
            println!("Added record {id}");
        }
        Commands::Remove { id } => {
            if proxy.remove_record(&id).await? {
                println!("Removed record {id}");
            } else {
                bail!("no record with id {id}");
            }
        }
        Commands::Status => {
            let status: Value = serde_json::from_str(&proxy.status().await?)?;
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
        Commands::Detect { .. } => bail!("detect runs locally and does not use the daemon"),
    }

    Ok(())
}

fn field<'a>(value: &'a Value, key: &str) -> &'a str {
    value.get(key).and_then(Value::as_str).unwrap_or("-")
}

fn print_match(response: &Value) {
    println!("{}", field(response, "message"));
    println!(
        "scanned {} records, skipped {}{}",
        response["scanned"],
        response["skipped"],
        if response["truncated"].as_bool().unwrap_or(false) {
            " (scan deadline reached, results partial)"
        } else {
            ""
        }
    );
    let Some(matches) = response["matches"].as_array() else {
        return;
    };
    for m in matches {
        println!(
            "  {:.2}  {}  age {}, {}; last seen {} on {}; contact {}",
            m["match_score"].as_f64().unwrap_or(0.0),
            field(m, "name"),
            field(m, "age"),
            field(m, "gender"),
            field(m, "lastSeenLocation"),
            field(m, "dateMissing"),
            field(m, "contactNumber"),
        );
    }
}

/// Local diagnostic: load the models and report what each stage finds.
fn detect(image: &Path, model_dir: Option<PathBuf>, upsample: u32) -> Result<()> {
    let model_dir = model_dir
        .or_else(|| std::env::var("SEEKER_MODEL_DIR").ok().map(PathBuf::from))
        .unwrap_or_else(seeker_core::default_model_dir);
    println!("Loading models from {}", model_dir.display());
    let mut pipeline = FacePipeline::load(&ModelPaths::in_dir(&model_dir), upsample)?;

    let bytes = std::fs::read(image).with_context(|| format!("reading {}", image.display()))?;
    let grid = codec::decode_image(&bytes)?;
    tracing::debug!(bytes = bytes.len(), "decoded input image");
    println!("Image: {}x{}", grid.width(), grid.height());

    match pipeline.locate(&grid) {
        Location::Found { tier, regions } => {
            println!("Detected {} face(s) with the {:?} tier", regions.len(), tier);
            for (i, r) in regions.iter().enumerate() {
                println!(
                    "  face {}: top={} right={} bottom={} left={} confidence={:.3}{}",
                    i,
                    r.top,
                    r.right,
                    r.bottom,
                    r.left,
                    r.confidence,
                    if r.landmarks.is_some() { " (landmarks)" } else { "" }
                );
            }
        }
        Location::Empty => {
            println!("No face detected");
            return Ok(());
        }
    }

    let signatures = pipeline.extract(&grid).into_signatures();
    println!("Encoded {} signature(s)", signatures.len());
    Ok(())
}
