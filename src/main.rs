// MedScan - main.rs
//
// Command-line entry point. Handles:
// 1. CLI argument parsing
// 2. config.toml loading and logging initialisation
// 3. Store, clock and analysis client wiring
// 4. Driving one scan session per image, honouring the cooldown between them
// 5. Optional history export

use clap::Parser;
use medscan::app::scan::{ScanConfig, ScanDeps, ScanStateMachine};
use medscan::app::service::HttpAnalysisService;
use medscan::core::export;
use medscan::core::model::{NormalizedForensicResult, NormalizedMedicineInfo, ScanState};
use medscan::platform::clock::SystemClock;
use medscan::platform::config::{self, PlatformPaths};
use medscan::platform::fs;
use medscan::platform::store::{DisabledStore, JsonFileStore, KeyValueStore};
use medscan::util::constants;
use medscan::util::error::{ConfigError, ExportError, Result};
use medscan::util::logging;
use serde::Serialize;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

/// MedScan - medicine authenticity scanner.
///
/// Sends each image to the configured analysis service, one at a time, and
/// prints the reconciled result as JSON.
#[derive(Parser, Debug)]
#[command(name = "MedScan", version, about)]
struct Cli {
    /// Images to scan, in order.
    #[arg(required = true)]
    images: Vec<PathBuf>,

    /// Directory holding config.toml (defaults to the platform config dir).
    #[arg(short = 'c', long = "config-dir")]
    config_dir: Option<PathBuf>,

    /// Analysis endpoint, overriding `[service] endpoint`.
    #[arg(short = 'e', long = "endpoint")]
    endpoint: Option<String>,

    /// Write the session history to this file (.csv or .json).
    #[arg(short = 'o', long = "export")]
    export: Option<PathBuf>,

    /// Do not persist the cooldown deadline.
    #[arg(long = "ephemeral")]
    ephemeral: bool,

    /// Enable debug logging (equivalent to RUST_LOG=debug).
    #[arg(short = 'd', long = "debug")]
    debug: bool,
}

/// JSON shape printed for each terminal session.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Report<'a> {
    scan_id: Option<String>,
    timestamp: Option<String>,
    image: Option<&'a str>,
    state: ScanState,
    #[serde(skip_serializing_if = "Option::is_none")]
    medicine_info: Option<&'a NormalizedMedicineInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    forensic_result: Option<&'a NormalizedForensicResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    warning: Option<&'a str>,
}

impl<'a> Report<'a> {
    fn of(sm: &'a ScanStateMachine) -> Self {
        let session = sm.session();
        Self {
            scan_id: session.scan_id.map(|id| id.to_string()),
            timestamp: session.scanned_at.map(|t| t.to_rfc3339()),
            image: sm.current_image().map(|img| img.label.as_str()),
            state: sm.state(),
            medicine_info: sm.medicine_info(),
            forensic_result: sm.forensic_result(),
            error: sm.error(),
            warning: sm.warning(),
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let platform_paths = PlatformPaths::resolve();
    let config_dir = cli
        .config_dir
        .clone()
        .unwrap_or_else(|| platform_paths.config_dir.clone());
    let (app_config, warnings) = config::load_config(&config_dir);

    logging::init(cli.debug, app_config.log_level.as_deref());

    tracing::info!(
        version = constants::APP_VERSION,
        debug = cli.debug,
        "MedScan starting"
    );
    for warning in &warnings {
        tracing::warn!(warning = %warning, "Config warning");
    }

    match run(cli, app_config, platform_paths).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "MedScan failed");
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(
    cli: Cli,
    app_config: config::AppConfig,
    platform_paths: PlatformPaths,
) -> Result<()> {
    let endpoint = cli
        .endpoint
        .clone()
        .or_else(|| app_config.endpoint.clone())
        .ok_or_else(|| ConfigError::Missing {
            field: "service.endpoint",
            hint: "Set it in config.toml or pass --endpoint.".to_string(),
        })?;

    let api_key = std::env::var(&app_config.api_key_env).ok();
    if api_key.is_none() {
        tracing::debug!(var = %app_config.api_key_env, "No API key in environment");
    }
    let service = HttpAnalysisService::new(endpoint, api_key, app_config.request_timeout)?;
    tracing::info!(endpoint = service.endpoint(), "Analysis service configured");

    let store: Arc<dyn KeyValueStore> = if cli.ephemeral || !app_config.persist {
        tracing::info!("Cooldown persistence disabled");
        Arc::new(DisabledStore)
    } else {
        let store = JsonFileStore::new(platform_paths.store_path());
        tracing::debug!(path = %store.path().display(), "Cooldown store");
        Arc::new(store)
    };

    let (images, input_errors) = fs::read_image_files(
        cli.images.iter().map(PathBuf::as_path),
        app_config.preprocess.max_input_bytes,
    );
    if images.is_empty() {
        // Nothing usable: report the first failure as the run's error.
        return match input_errors.into_iter().next() {
            Some(e) => Err(e.into()),
            None => Ok(()),
        };
    }
    for e in &input_errors {
        eprintln!("skipped: {e}");
    }

    let deps = ScanDeps {
        service: Arc::new(service),
        store,
        clock: Arc::new(SystemClock),
    };
    let mut sm = ScanStateMachine::new(deps, ScanConfig::from(&app_config));

    cool_down(&mut sm).await;
    if !sm.submit_images(images).is_accepted() {
        return Ok(());
    }

    loop {
        sm.wait_until_settled().await;
        print_report(&sm)?;

        if sm.queue_len() == 0 {
            break;
        }
        cool_down(&mut sm).await;
        if !sm.analyze_next().is_accepted() {
            break;
        }
    }

    if let Some(path) = &cli.export {
        let written = export::export_to_file(sm.history(), path)?;
        eprintln!("exported {written} scan(s) to {}", path.display());
    }

    Ok(())
}

async fn cool_down(sm: &mut ScanStateMachine) {
    let remaining = sm.cooldown_remaining();
    if remaining > 0 {
        eprintln!("cooling down: {remaining}s before the next scan");
        sm.wait_for_cooldown(|left| tracing::debug!(left, "Cooling down"))
            .await;
    }
}

fn print_report(sm: &ScanStateMachine) -> Result<()> {
    let json = serde_json::to_string_pretty(&Report::of(sm)).map_err(|source| ExportError::Json {
        path: PathBuf::from("<stdout>"),
        source,
    })?;
    println!("{json}");
    Ok(())
}
