use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use serde::Serialize;
use tracing::{info, warn};

use inbox_triage::config::TriageConfig;
use inbox_triage::connector::{EmlDirConnector, FetchScope, JsonFileConnector, MailConnector};
use inbox_triage::drafting::{HttpDraftGenerator, HttpGeneratorConfig};
use inbox_triage::error::{Error, PipelineError};
use inbox_triage::pipeline::TriagePipeline;
use inbox_triage::pipeline::sender::SenderHistory;
use inbox_triage::pipeline::types::DecisionRecord;
use inbox_triage::queue::{DecisionQueue, MetricsReport, batch_id};

/// Written to `TRIAGE_AUDIT_FILE` when set.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AuditLog<'a> {
    metrics: &'a MetricsReport,
    records: &'a [DecisionRecord],
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // stdout carries only the queue JSON
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let Some(source) = std::env::args().nth(1).map(PathBuf::from) else {
        eprintln!("Usage: inbox-triage <records.json | eml-dir>");
        eprintln!("  config: TRIAGE_CONFIG_FILE=triage.json or TRIAGE_* variables");
        std::process::exit(2);
    };

    let config = load_config()?;
    let mut pipeline = TriagePipeline::new(config).context("invalid configuration")?;

    if let Some(generator_config) = HttpGeneratorConfig::from_env() {
        info!(
            endpoint = %generator_config.endpoint,
            model = %generator_config.model,
            "Using HTTP draft generator"
        );
        pipeline = pipeline.with_generator(Arc::new(HttpDraftGenerator::new(generator_config)));
    }
    if let Ok(path) = std::env::var("TRIAGE_SENDER_HISTORY_FILE") {
        let raw = std::fs::read_to_string(&path)
            .with_context(|| format!("reading sender history {path}"))?;
        let history: SenderHistory =
            serde_json::from_str(&raw).with_context(|| format!("parsing sender history {path}"))?;
        pipeline = pipeline.with_sender_history(history);
    }

    let scope = FetchScope {
        time_range_days: env_number("TRIAGE_TIME_RANGE_DAYS")?,
        query: std::env::var("TRIAGE_QUERY").ok(),
        max_results: env_number("TRIAGE_MAX_RESULTS")?,
    };
    let connector = connector_for(&source);

    let outcome = match pipeline.run_from_connector(connector.as_ref(), &scope).await {
        Ok(outcome) => outcome,
        Err(Error::Pipeline(PipelineError::Ingestion(e))) => {
            print_queue(&DecisionQueue::empty(batch_id(std::iter::empty())))?;
            return Err(e).context("ingestion failed");
        }
        Err(e) => return Err(e.into()),
    };

    let metrics = &outcome.metrics;
    info!(
        total = metrics.total_emails,
        skipped = metrics.skipped_records,
        vip = metrics.vip_count,
        hidden_urgency = metrics.hidden_urgency_count,
        reply_all_risk = metrics.reply_all_risk_count,
        superseded = metrics.superseded_count,
        fallback_drafts = metrics.fallback_drafts,
        minutes_saved = metrics.estimated_minutes_saved,
        "Run complete"
    );

    if let Ok(path) = std::env::var("TRIAGE_AUDIT_FILE") {
        let audit = AuditLog {
            metrics,
            records: &outcome.records,
        };
        std::fs::write(&path, serde_json::to_string_pretty(&audit)?)
            .with_context(|| format!("writing audit file {path}"))?;
    }

    print_queue(&outcome.queue)
}

fn load_config() -> anyhow::Result<TriageConfig> {
    match std::env::var("TRIAGE_CONFIG_FILE") {
        Ok(path) => TriageConfig::from_json_file(Path::new(&path))
            .with_context(|| format!("loading config file {path}")),
        Err(_) => TriageConfig::from_env().context("reading TRIAGE_* environment"),
    }
}

/// A directory is read as `.eml` files, anything else as a JSON record file.
fn connector_for(source: &Path) -> Box<dyn MailConnector> {
    if source.is_dir() {
        Box::new(EmlDirConnector::new(source))
    } else {
        if source.extension().is_some_and(|ext| ext != "json") {
            warn!(path = %source.display(), "Source is not a .json file, parsing as JSON anyway");
        }
        Box::new(JsonFileConnector::new(source))
    }
}

fn env_number<T: std::str::FromStr>(key: &str) -> anyhow::Result<Option<T>> {
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| anyhow::anyhow!("{key}: cannot parse '{raw}'")),
        Err(_) => Ok(None),
    }
}

fn print_queue(queue: &DecisionQueue) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(queue)?);
    Ok(())
}
