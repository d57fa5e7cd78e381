use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tokio::net::TcpListener;
use tracing::info;

use crop_doctor::models::{DiagnosisRequest, ImagePayload};
use crop_doctor::report::{import_json, write_exports, JsonExporter, PdfExporter};
use crop_doctor::types::AppError;
use crop_doctor::utils::init_tracing;
use crop_doctor::{create_router, AppState, Config, DiagnosisPipeline, ReportRecord};

#[derive(Parser)]
#[command(name = "crop-doctor", version, about = "Diagnose crop diseases from leaf photographs")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the HTTP API
    Serve,
    /// Diagnose one photo and write the PDF and JSON reports
    Diagnose {
        image: PathBuf,
        /// Crop shown in the photo, if known
        #[arg(long)]
        crop: Option<String>,
        #[arg(long)]
        out_dir: Option<PathBuf>,
    },
    /// Re-render the PDF of an exported JSON report
    Render {
        json: PathBuf,
        #[arg(long)]
        out_dir: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    init_tracing();

    let cli = Cli::parse();
    let config = Config::from_env()?;

    match cli.command {
        Command::Serve => {
            serve(config).await?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Diagnose { image, crop, out_dir } => {
            let out_dir = out_dir.unwrap_or_else(|| config.report.output_dir.clone());
            match diagnose(&config, &image, crop, &out_dir).await {
                Ok(()) => Ok(ExitCode::SUCCESS),
                Err(e) => {
                    eprintln!("error [{}]: {}", e.kind(), e.user_message());
                    info!(error = %e, "Diagnosis aborted");
                    Ok(ExitCode::FAILURE)
                }
            }
        }
        Command::Render { json, out_dir } => {
            let out_dir = out_dir.unwrap_or_else(|| config.report.output_dir.clone());
            let bytes = tokio::fs::read(&json).await?;
            let record = import_json(&bytes)?;
            let pdf = PdfExporter::new(config.report.public_base_url.clone());
            for path in write_exports(&record, &out_dir, &[&pdf]).await? {
                println!("{}", path.display());
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn serve(config: Config) -> anyhow::Result<()> {
    info!("Configuration loaded: {:?}", config.server);

    let pipeline = DiagnosisPipeline::from_config(&config)?;
    let state = AppState::new(config.clone(), pipeline);
    let app = create_router(state);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    info!("Server listening on {}", addr);

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .await
        .map_err(|e| anyhow::anyhow!("Server error: {}", e))?;

    Ok(())
}

async fn diagnose(config: &Config, image: &Path, crop: Option<String>, out_dir: &Path) -> Result<(), AppError> {
    let bytes = tokio::fs::read(image)
        .await
        .map_err(|e| AppError::InputRejected(format!("cannot read {}: {}", image.display(), e)))?;
    let payload = ImagePayload::from_bytes(bytes, config.pipeline.max_image_bytes)?;
    let request = DiagnosisRequest::new(payload, crop);

    let pipeline = DiagnosisPipeline::from_config(config)?;
    let record = pipeline.run(&request).await?;

    let pdf = PdfExporter::new(config.report.public_base_url.clone());
    let written = write_exports(&record, out_dir, &[&pdf, &JsonExporter]).await?;

    print_summary(&record);
    for path in written {
        println!("  wrote {}", path.display());
    }
    Ok(())
}

fn print_summary(record: &ReportRecord) {
    let diagnosis = &record.diagnosis;
    println!("Report {}", record.id);
    if diagnosis.is_inconclusive() {
        println!("  Diagnosis: inconclusive ({})", diagnosis.crop);
    } else {
        println!(
            "  Diagnosis: {} on {} ({:.0}% confidence, {} severity)",
            diagnosis.disease_name,
            diagnosis.crop,
            diagnosis.confidence * 100.0,
            diagnosis.severity
        );
    }
    println!("  Treatments: {}", record.treatments.len());
    println!("  Instruction steps: {}", record.instructions.steps.len());
    for notice in &record.notices {
        println!("  note [{}]: {}", notice.section, notice.message);
    }
}
