use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use log::{error, info, warn};

use docflow::logging::{self, LogFormat};
use docflow::trigger::{DispatchReport, RunDispatcher, UploadEvent};
use docflow::workflow::{log_events, NoopProgress, RunEventBroadcaster, RunOutcome};
use docflow::{load_config, App, StatusStore};

/// Exit code for `status` when the document has no record.
const EXIT_NOT_FOUND: u8 = 2;

#[derive(Parser, Debug)]
#[command(
    name = "docflow",
    version,
    about = "Fan-out/fan-in document workflow orchestrator"
)]
struct Cli {
    /// Log output format.
    #[arg(long, value_enum, default_value_t = LogFormat::Pretty, global = true)]
    log_format: LogFormat,

    /// Log filter directive. Overrides `RUST_LOG`.
    #[arg(long, global = true)]
    log_filter: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Process existing uploads, then watch the upload bucket until Ctrl-C.
    Run {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Run the workflow once for a single uploaded object.
    Submit {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long)]
        bucket: String,
        #[arg(long)]
        key: String,
    },
    /// Print the recorded status of a document as JSON.
    Status {
        #[arg(short, long)]
        config: PathBuf,
        key: String,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = logging::init(cli.log_format, cli.log_filter.as_deref()) {
        eprintln!("docflow: {}", e);
        return ExitCode::FAILURE;
    }

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to start async runtime: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(execute(cli.command)) {
        Ok(code) => code,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

async fn execute(command: Command) -> docflow::Result<ExitCode> {
    match command {
        Command::Run { config } => run(config).await,
        Command::Submit {
            config,
            bucket,
            key,
        } => submit(config, bucket, key).await,
        Command::Status { config, key } => status(config, key),
    }
}

async fn run(config_path: PathBuf) -> docflow::Result<ExitCode> {
    let app = App::from_config(load_config(&config_path)?)?;
    info!("Starting docflow v{}", env!("CARGO_PKG_VERSION"));

    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let shutdown = Arc::clone(&shutdown);
        ctrlc::set_handler(move || {
            info!("Received shutdown signal");
            shutdown.store(true, Ordering::Relaxed);
        })
        .map_err(docflow::WorkerError::from)?;
    }

    let events = RunEventBroadcaster::default();
    let event_log = tokio::spawn(log_events(events.subscribe()));
    let (dispatcher, mut reports) = RunDispatcher::start(
        Arc::clone(&app.orchestrator),
        app.router(),
        Arc::new(events.reporter()),
        app.config.workflow.chunk_concurrency.max(1) * 4,
    );
    drop(events);

    let tally = tokio::spawn(async move {
        let (mut completed, mut failed) = (0usize, 0usize);
        while let Some(report) = reports.recv().await {
            if let DispatchReport::Finished { result, .. } = report {
                match result.map(|r| r.outcome) {
                    Ok(RunOutcome::Completed { .. }) => completed += 1,
                    Ok(RunOutcome::Skipped { .. }) => {}
                    _ => failed += 1,
                }
            }
        }
        (completed, failed)
    });

    // The watcher reports existing uploads itself once it is watching.
    let watcher = app.watcher();
    let sender = dispatcher.sender();
    let watch = tokio::task::spawn_blocking(move || {
        watcher.watch(
            move |event: UploadEvent| {
                if sender.blocking_send(event).is_err() {
                    warn!("Dispatcher closed, dropping upload event");
                }
            },
            shutdown,
        )
    });

    match watch.await {
        Ok(result) => result?,
        Err(e) => error!("Watcher task failed: {}", e),
    }
    dispatcher.shutdown().await;

    if let Ok((completed, failed)) = tally.await {
        info!("Stopped: {} runs completed, {} failed", completed, failed);
    }
    if let Ok(logged) = event_log.await {
        info!("{} run events observed", logged);
    }
    Ok(ExitCode::SUCCESS)
}

async fn submit(config_path: PathBuf, bucket: String, key: String) -> docflow::Result<ExitCode> {
    let app = App::from_config(load_config(&config_path)?)?;

    let event = UploadEvent::new(bucket, key);
    let Some(request) = app.router().route(&event) else {
        error!(
            "Object does not match upload bucket '{}' and prefix",
            app.config.upload.bucket
        );
        return Ok(ExitCode::FAILURE);
    };

    let report = app.orchestrator.run(request, &NoopProgress).await?;
    let failed = report.is_failed();
    let outcome = match &report.outcome {
        RunOutcome::Completed { .. } => "completed",
        RunOutcome::Failed { .. } => "failed",
        RunOutcome::Skipped { .. } => "skipped",
    };
    let view = app.status.get_status(&report.document_key)?.map(|s| s.view());

    let summary = serde_json::json!({
        "runId": report.run_id,
        "documentKey": report.document_key,
        "outcome": outcome,
        "history": report.history,
        "elapsedMs": report.elapsed.as_millis() as u64,
        "status": view,
    });
    println!("{}", serde_json::to_string_pretty(&summary).unwrap_or_default());

    Ok(if failed {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

fn status(config_path: PathBuf, key: String) -> docflow::Result<ExitCode> {
    let config = load_config(&config_path)?;
    let store = docflow::app::open_status_store(&config)?;

    match store.get_status(&key)? {
        Some(status) => {
            let json = serde_json::to_string_pretty(&status.view()).unwrap_or_default();
            println!("{}", json);
            Ok(ExitCode::SUCCESS)
        }
        None => {
            eprintln!("not found: {}", key);
            Ok(ExitCode::from(EXIT_NOT_FOUND))
        }
    }
}
