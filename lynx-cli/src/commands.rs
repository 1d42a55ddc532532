//! CLI command implementations

use crate::config::AppConfig;
use anyhow::{anyhow, bail, Context, Result};
use lynx_common::{Caller, CallerId, DocumentId, ExecutionOutcome};
use lynx_history::{DailyStats, ExecutionRecord, ExecutionStats, HistoryStore, Page};
use lynx_sandbox::{ExecutionRequest, ExecutionService, SweepReport, WorkspaceReaper};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tracing::{debug, info};

/// Execute one source file and print the outcome
///
/// # Arguments
/// * `config` - Effective application configuration
/// * `file` - Path of the source file, or `-` for stdin
/// * `caller` - Authenticated caller; history is recorded only when set
/// * `document` - Saved document the run belongs to
/// * `timeout` - Per-run deadline, capped at the configured timeout
/// * `json` - Print the whole outcome as JSON
///
/// Returns whether the execution succeeded.
pub async fn execute_run(
    config: &AppConfig,
    file: &str,
    caller: Option<String>,
    document: Option<String>,
    timeout: Option<Duration>,
    json: bool,
) -> Result<bool> {
    let source = read_source(file).await?;

    let mut service = ExecutionService::with_process_supervisor(config.sandbox()?)
        .context("Invalid sandbox configuration")?;

    let caller = Caller::from(caller.map(CallerId::from));
    if !caller.is_anonymous() {
        let store = open_store(config).await?;
        service = service.with_history(Arc::new(store));
    }

    let mut request = ExecutionRequest::new(source).with_caller(caller);
    if let Some(document) = document {
        request = request.with_document(document);
    }
    if let Some(timeout) = timeout {
        request = request.with_timeout(timeout);
    }

    let outcome = service.execute(request).await;
    if json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    } else {
        print_outcome(&outcome);
    }
    Ok(outcome.success)
}

async fn read_source(file: &str) -> Result<String> {
    if file == "-" {
        let mut source = String::new();
        tokio::io::stdin()
            .read_to_string(&mut source)
            .await
            .context("Failed to read source from stdin")?;
        Ok(source)
    } else {
        tokio::fs::read_to_string(file)
            .await
            .with_context(|| format!("Failed to read source file {}", file))
    }
}

fn print_outcome(outcome: &ExecutionOutcome) {
    let (stdout, stderr) = render_outcome(outcome);
    print!("{}", stdout);
    if let Some(line) = stderr {
        eprintln!("{}", line);
    }
}

/// Terminal text for an outcome: program stdout and the failure line.
/// Stdout is dropped when the failure message already quotes it.
fn render_outcome(outcome: &ExecutionOutcome) -> (&str, Option<String>) {
    let Some(error) = &outcome.error else {
        return (&outcome.output, None);
    };
    let quoted = outcome.output.trim();
    let stdout = if quoted.is_empty() || error.contains(quoted) {
        ""
    } else {
        outcome.output.as_str()
    };
    (stdout, Some(format!("✗ {}", error)))
}

/// Open the configured history database
pub async fn open_store(config: &AppConfig) -> Result<HistoryStore> {
    let path = config.database_path()?;
    debug!(path = %path.display(), "Opening history database");
    HistoryStore::open(&path)
        .await
        .with_context(|| format!("Failed to open history database {}", path.display()))
}

/// List a caller's executions, optionally for one document
///
/// # Arguments
/// * `store` - History store
/// * `caller` - Caller whose records are listed
/// * `document` - Restrict to this document
/// * `page` - Limit/offset window
/// * `json` - Print records as JSON
pub async fn execute_history_list(
    store: &HistoryStore,
    caller: &CallerId,
    document: Option<&DocumentId>,
    page: Page,
    json: bool,
) -> Result<()> {
    let result = match document {
        Some(document) => store.list_for_document(caller, document, page).await?,
        None => store.list_for_caller(caller, page).await?,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }

    if result.records.is_empty() {
        println!("No executions recorded for {}", caller);
        return Ok(());
    }
    for record in &result.records {
        println!("{}", format_record_line(record));
    }
    println!(
        "\nShowing {}-{} of {}",
        page.offset as usize + 1,
        page.offset as usize + result.records.len(),
        result.total
    );
    Ok(())
}

/// Show one record in full
pub async fn execute_history_show(
    store: &HistoryStore,
    caller: &CallerId,
    id: &str,
    json: bool,
) -> Result<()> {
    let record = store
        .get(caller, id)
        .await?
        .ok_or_else(|| anyhow!("No execution {} for caller {}", id, caller))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&record)?);
        return Ok(());
    }

    println!("{}", format_record_line(&record));
    if let Some(failure) = &record.failure {
        println!("Failure: {}", failure);
    }
    if let Some(error) = &record.error {
        println!("\n--- Error ---\n{}", error);
    }
    if let Some(output) = record.output.as_deref().filter(|o| !o.is_empty()) {
        println!("\n--- Output ---\n{}", output.trim_end());
    }
    Ok(())
}

/// Aggregates for a caller or one of their documents
pub async fn execute_history_stats(
    store: &HistoryStore,
    caller: &CallerId,
    document: Option<&DocumentId>,
    json: bool,
) -> Result<()> {
    let stats = match document {
        Some(document) => store.stats_for_document(caller, document).await?,
        None => store.stats_for_caller(caller).await?,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
    } else {
        print!("{}", format_stats(&stats));
    }
    Ok(())
}

/// Per-day execution counts over the trailing `days`
pub async fn execute_history_daily(
    store: &HistoryStore,
    caller: &CallerId,
    days: u32,
    json: bool,
) -> Result<()> {
    let daily = store.daily_stats(caller, days).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&daily)?);
        return Ok(());
    }
    if daily.is_empty() {
        println!("No executions in the last {} days", days);
    }
    for day in &daily {
        println!("{}", format_daily_line(day));
    }
    Ok(())
}

/// Delete a caller's history, or only one document's
pub async fn execute_history_delete(
    store: &HistoryStore,
    caller: &CallerId,
    document: Option<&DocumentId>,
) -> Result<()> {
    let deleted = match document {
        Some(document) => store.delete_for_document(caller, document).await?,
        None => store.delete_for_caller(caller).await?,
    };
    println!("✓ Deleted {} execution records", deleted);
    Ok(())
}

/// Drop records older than `older_than`
pub async fn execute_history_purge(store: &HistoryStore, older_than: Duration) -> Result<()> {
    let age = chrono::Duration::from_std(older_than)
        .map_err(|_| anyhow!("Retention {:?} is out of range", older_than))?;
    let cutoff = chrono::Utc::now() - age;
    let purged = store.purge_older_than(cutoff).await?;
    println!(
        "✓ Purged {} execution records older than {}",
        purged,
        humantime::format_duration(older_than)
    );
    Ok(())
}

/// Sweep the workspace root once, or keep the reaper running until Ctrl-C
pub async fn execute_reap(config: &AppConfig, watch: bool) -> Result<()> {
    let sandbox = config.sandbox()?;
    let reaper = WorkspaceReaper::new(
        &sandbox.workspace_root,
        sandbox.retention,
        sandbox.sweep_interval,
    );

    if !watch {
        let report = reaper.sweep().await;
        println!("{}", format_sweep(reaper.root(), &report));
        return Ok(());
    }

    let handle = reaper.spawn();
    info!("Reaper running, press Ctrl-C to stop");
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    handle.shutdown().await;
    Ok(())
}

/// Print the effective configuration
pub fn execute_config_show(config: &AppConfig, path: &Path) -> Result<()> {
    println!("# {}", path.display());
    if !path.exists() {
        println!("# (file not found, showing defaults)");
    }
    print!("{}", toml::to_string_pretty(config)?);
    Ok(())
}

/// Write the default configuration to `path`
pub fn execute_config_init(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        bail!(
            "Config file {} already exists (use --force to overwrite)",
            path.display()
        );
    }
    AppConfig::default().save_to(path)?;
    println!("✓ Wrote default configuration to {}", path.display());
    Ok(())
}

fn format_record_line(record: &ExecutionRecord) -> String {
    let status = if record.success { "ok  " } else { "FAIL" };
    let document = record.document_id.as_deref().unwrap_or("-");
    format!(
        "{}  {}  {}  {:>6}ms  doc={}",
        record.created_at.format("%Y-%m-%d %H:%M:%S"),
        status,
        record.id,
        record.duration_ms,
        document
    )
}

fn format_stats(stats: &ExecutionStats) -> String {
    let mut out = String::new();
    out.push_str(&format!("Executions:         {}\n", stats.total));
    out.push_str(&format!("Successful:         {}\n", stats.successful));
    out.push_str(&format!("Failed:             {}\n", stats.failed));
    if let Some(rate) = stats.success_rate() {
        out.push_str(&format!("Success rate:       {:.1}%\n", rate * 100.0));
    }
    if let (Some(avg), Some(min), Some(max)) = (
        stats.avg_duration_ms,
        stats.min_duration_ms,
        stats.max_duration_ms,
    ) {
        out.push_str(&format!(
            "Duration (ms):      avg {:.1}, min {}, max {}\n",
            avg, min, max
        ));
    }
    out.push_str(&format!("Documents:          {}\n", stats.distinct_documents));
    if let Some(last) = stats.last_executed {
        out.push_str(&format!(
            "Last executed:      {}\n",
            last.format("%Y-%m-%d %H:%M:%S UTC")
        ));
    }
    out
}

fn format_daily_line(day: &DailyStats) -> String {
    format!(
        "{}  {:>5} runs  {:>5} ok  {:>5} failed",
        day.day,
        day.executions,
        day.successful,
        day.executions - day.successful
    )
}

fn format_sweep(root: &Path, report: &SweepReport) -> String {
    format!(
        "✓ Swept {}: scanned {}, removed {} files and {} directories, {} failures",
        root.display(),
        report.scanned,
        report.removed,
        report.removed_dirs,
        report.failed
    )
}
