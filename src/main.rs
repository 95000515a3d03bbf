//! Loan Scoring Pipeline - Main Entry Point
//!
//! `serve` consumes applications from NATS and publishes decisions; the other
//! subcommands score local files or inspect the artifact bundle.

use anyhow::{bail, Context, Result};
use async_nats::Message;
use clap::{Parser, Subcommand};
use futures::{Stream, StreamExt};
use loan_scoring_pipeline::{
    config::{AppConfig, LoggingConfig},
    consumer::{decode_application, ApplicationConsumer},
    error::ErrorKind,
    ingest::{allowed_file, CsvBatch},
    metrics::{MetricsReporter, PipelineMetrics},
    models::loader::ArtifactLoader,
    producer::DecisionProducer,
    scoring::LoanScorer,
    types::{ApplicationForm, DecisionMessage, RejectionMessage},
};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "loan-scoring-pipeline", version, about = "Credit application scoring")]
struct Cli {
    /// Path to the configuration file
    #[arg(long, global = true, env = "LOAN_CONFIG", default_value = loan_scoring_pipeline::config::DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Artifact bundle directory (overrides artifacts.bundle_dir)
    #[arg(long, global = true)]
    bundle: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Score applications received over NATS
    Serve,
    /// Score every row of a CSV file
    ScoreFile {
        input: PathBuf,
        /// Output CSV (stdout when omitted)
        #[arg(long, short)]
        output: Option<PathBuf>,
        /// Report bad rows in place instead of failing the batch
        #[arg(long)]
        row_isolation: bool,
    },
    /// Score one application stored as JSON
    ScoreJson { input: PathBuf },
    /// Load the artifact bundle and report its shape
    CheckArtifacts,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let (mut config, config_error) = match AppConfig::load_from_path(&cli.config) {
        Ok(config) => (config, None),
        Err(e) => (AppConfig::default(), Some(e)),
    };
    init_tracing(&config.logging)?;

    match config_error {
        None => info!(path = %cli.config.display(), "Configuration loaded"),
        Some(e) => warn!(
            path = %cli.config.display(),
            error = format!("{e:#}"),
            "Failed to load config, using defaults"
        ),
    }
    if let Some(bundle) = cli.bundle {
        config.artifacts.bundle_dir = bundle;
    }

    match cli.command {
        Command::Serve => serve(config).await,
        Command::ScoreFile {
            input,
            output,
            row_isolation,
        } => score_file(&config, &input, output.as_deref(), row_isolation),
        Command::ScoreJson { input } => score_json(&config, &input),
        Command::CheckArtifacts => check_artifacts(&config),
    }
}

fn init_tracing(logging: &LoggingConfig) -> Result<()> {
    let filter = match tracing_subscriber::EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => tracing_subscriber::EnvFilter::try_new(format!(
            "loan_scoring_pipeline={}",
            logging.level
        ))?,
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr);
    if logging.format == "json" {
        builder.json().init();
    } else {
        builder.pretty().init();
    }
    Ok(())
}

fn load_scorer(config: &AppConfig) -> Result<LoanScorer> {
    let artifacts = ArtifactLoader::with_threads(config.artifacts.onnx_threads)
        .load_bundle(&config.artifacts.bundle_dir)
        .with_context(|| {
            format!(
                "Failed to load artifact bundle from {}",
                config.artifacts.bundle_dir.display()
            )
        })?;
    Ok(LoanScorer::new(Arc::new(artifacts)))
}

fn check_artifacts(config: &AppConfig) -> Result<()> {
    let scorer = load_scorer(config)?;
    let pipeline = scorer.pipeline();

    println!("bundle_version: {}", scorer.bundle_version());
    println!("classifier: {}", scorer.engine().classifier_name());
    println!("decision_threshold: {}", scorer.engine().decision_threshold());
    println!("feature_count: {}", pipeline.feature_count());
    for (index, name) in pipeline.feature_names().iter().enumerate() {
        println!("  {index:>3} {name}");
    }
    Ok(())
}

fn score_json(config: &AppConfig, input: &Path) -> Result<()> {
    let raw = std::fs::read_to_string(input)
        .with_context(|| format!("Failed to read {}", input.display()))?;
    let form: ApplicationForm = serde_json::from_str(&raw)
        .with_context(|| format!("{} is not a valid application", input.display()))?;

    let scorer = load_scorer(config)?;
    let result = scorer.score_application(&form)?;
    let message = DecisionMessage::new(form.application_id.clone(), result, scorer.bundle_version());

    println!("{}", serde_json::to_string_pretty(&message)?);
    Ok(())
}

fn score_file(
    config: &AppConfig,
    input: &Path,
    output: Option<&Path>,
    row_isolation: bool,
) -> Result<()> {
    let file_name = input
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    if !allowed_file(&file_name, &config.batch.allowed_extensions) {
        bail!(
            "{} rejected: allowed extensions are {:?}",
            input.display(),
            config.batch.allowed_extensions
        );
    }

    let scorer = load_scorer(config)?
        .with_row_isolation(row_isolation || config.batch.row_isolation);
    let batch = CsvBatch::from_path(input)
        .with_context(|| format!("Failed to read {}", input.display()))?;

    let started = Instant::now();
    let report = scorer.score_batch(&batch)?;
    info!(
        input = %input.display(),
        rows = report.len(),
        approved = report.approved_count(),
        failed = report.failed_count(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Batch scored"
    );

    match output {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("Failed to create {}", path.display()))?;
            report.write_csv(BufWriter::new(file))?;
            info!(output = %path.display(), "Batch report written");
        }
        None => {
            let stdout = io::stdout();
            let mut handle = stdout.lock();
            report.write_csv(&mut handle)?;
            handle.flush()?;
        }
    }
    Ok(())
}

async fn serve(config: AppConfig) -> Result<()> {
    info!("Starting Loan Scoring Pipeline");

    let scorer = Arc::new(load_scorer(&config)?);
    info!(
        version = %scorer.bundle_version(),
        features = scorer.pipeline().feature_count(),
        classifier = %scorer.engine().classifier_name(),
        "Scorer initialized"
    );

    let metrics = Arc::new(PipelineMetrics::new());

    let client = async_nats::connect(&config.nats.url)
        .await
        .with_context(|| format!("Failed to connect to NATS at {}", config.nats.url))?;
    info!("Connected to NATS at {}", config.nats.url);

    let consumer = ApplicationConsumer::new(client.clone(), &config.nats.application_subject);
    let producer = Arc::new(DecisionProducer::new(
        client.clone(),
        &config.nats.decision_subject,
        &config.nats.rejection_subject,
    ));

    let workers = config.pipeline.workers.max(1);
    info!(
        workers = workers,
        applications = %consumer.subject(),
        decisions = %producer.decision_subject(),
        rejections = %producer.rejection_subject(),
        "Starting application processing loop"
    );

    // Bounds the number of applications scored concurrently
    let semaphore = Arc::new(Semaphore::new(workers));
    let processed_count = Arc::new(AtomicU64::new(0));

    let reporter = MetricsReporter::new(metrics.clone(), config.pipeline.metrics_interval_secs);
    tokio::spawn(reporter.start());

    let mut subscription = consumer.subscribe().await?;

    // One listener for the whole loop so a signal during a busy wait is not lost
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    while let Some((message, permit)) =
        next_job(&mut subscription, &semaphore, shutdown.as_mut()).await?
    {
        let scorer = scorer.clone();
        let producer = producer.clone();
        let metrics = metrics.clone();
        let processed_count = processed_count.clone();

        tokio::spawn(async move {
            handle_message(&scorer, &producer, &metrics, message).await;

            let count = processed_count.fetch_add(1, Ordering::Relaxed) + 1;
            if count % 100 == 0 {
                info!(
                    processed = count,
                    throughput = format!("{:.1} app/s", metrics.get_throughput()),
                    avg_latency_us = metrics.get_processing_stats().mean_us,
                    "Processing milestone"
                );
            }
            drop(permit);
        });
    }

    // Wait for in-flight applications before the final summary
    let _ = semaphore.acquire_many(workers as u32).await;
    if let Err(e) = client.flush().await {
        warn!(error = %e, "Failed to flush NATS client");
    }

    info!("Pipeline shutting down...");
    metrics.print_summary();
    Ok(())
}

/// Next message with a worker permit, or `None` once the stream ends or
/// shutdown resolves. Shutdown is watched while waiting for either.
async fn next_job<S, F>(
    messages: &mut S,
    semaphore: &Arc<Semaphore>,
    mut shutdown: Pin<&mut F>,
) -> Result<Option<(S::Item, OwnedSemaphorePermit)>>
where
    S: Stream + Unpin,
    F: Future<Output = ()>,
{
    let message = tokio::select! {
        message = messages.next() => match message {
            Some(message) => message,
            None => return Ok(None),
        },
        _ = shutdown.as_mut() => {
            info!("Shutdown signal received");
            return Ok(None);
        }
    };

    let permit = tokio::select! {
        permit = semaphore.clone().acquire_owned() => permit.context("Worker semaphore closed")?,
        _ = shutdown.as_mut() => {
            info!("Shutdown signal received while all workers were busy");
            return Ok(None);
        }
    };
    Ok(Some((message, permit)))
}

/// Resolves on the first Ctrl-C. A listener that fails to install never resolves.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}

async fn handle_message(
    scorer: &LoanScorer,
    producer: &DecisionProducer,
    metrics: &PipelineMetrics,
    message: Message,
) {
    let start_time = Instant::now();
    let reply = message.reply.clone();

    let form = match decode_application(&message) {
        Ok(form) => form,
        Err(e) => {
            metrics.record_rejection(ErrorKind::Validation);
            let rejection = RejectionMessage::malformed(format!("malformed application: {e}"));
            if let Err(e) = producer.send_rejection(reply, &rejection).await {
                error!(error = %e, "Failed to publish rejection");
            }
            return;
        }
    };

    match scorer.score_application(&form) {
        Ok(result) => {
            let processing_time = start_time.elapsed();
            metrics.record_decision(processing_time, &result);

            let decision =
                DecisionMessage::new(form.application_id.clone(), result, scorer.bundle_version());
            if let Err(e) = producer.send_decision(reply, &decision).await {
                error!(
                    application_id = ?form.application_id,
                    error = %e,
                    "Failed to publish decision"
                );
            } else {
                debug!(
                    application_id = ?form.application_id,
                    decision = %result.decision,
                    probability = result.probability,
                    processing_time_us = processing_time.as_micros() as u64,
                    "Application scored"
                );
            }
        }
        Err(e) => {
            metrics.record_rejection(e.kind());
            let rejection = RejectionMessage::from_error(form.application_id.clone(), &e);
            if let Err(e) = producer.send_rejection(reply, &rejection).await {
                error!(
                    application_id = ?form.application_id,
                    error = %e,
                    "Failed to publish rejection"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::sync::oneshot;

    async fn fired(rx: oneshot::Receiver<()>) {
        let _ = rx.await;
    }

    #[tokio::test]
    async fn test_shutdown_between_messages_is_observed() {
        let semaphore = Arc::new(Semaphore::new(2));
        let (tx, rx) = oneshot::channel();
        let shutdown = fired(rx);
        tokio::pin!(shutdown);
        let mut messages = futures::stream::iter(vec![1]).chain(futures::stream::pending());

        let first = next_job(&mut messages, &semaphore, shutdown.as_mut())
            .await
            .unwrap();
        assert!(matches!(first, Some((1, _))));

        tx.send(()).unwrap();
        let next = tokio::time::timeout(
            Duration::from_secs(1),
            next_job(&mut messages, &semaphore, shutdown.as_mut()),
        )
        .await
        .expect("shutdown not observed")
        .unwrap();
        assert!(next.is_none());
    }

    #[tokio::test]
    async fn test_shutdown_while_workers_busy_is_observed() {
        let semaphore = Arc::new(Semaphore::new(1));
        let _busy = semaphore.clone().acquire_owned().await.unwrap();
        let (tx, rx) = oneshot::channel();
        let shutdown = fired(rx);
        tokio::pin!(shutdown);
        let mut messages = futures::stream::iter(vec![1, 2]);

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            let _ = tx.send(());
        });

        let next = tokio::time::timeout(
            Duration::from_secs(1),
            next_job(&mut messages, &semaphore, shutdown.as_mut()),
        )
        .await
        .expect("shutdown not observed")
        .unwrap();
        assert!(next.is_none());
    }

    #[tokio::test]
    async fn test_stream_end_stops_loop() {
        let semaphore = Arc::new(Semaphore::new(1));
        let shutdown = std::future::pending::<()>();
        tokio::pin!(shutdown);
        let mut messages = futures::stream::iter(Vec::<u32>::new());

        let next = next_job(&mut messages, &semaphore, shutdown.as_mut())
            .await
            .unwrap();
        assert!(next.is_none());
    }
}
