// src/lib.rs

pub mod capability;
pub mod cli;
pub mod config;
pub mod dag;
pub mod engine;
pub mod errors;
pub mod logging;
pub mod serve;
pub mod sink;
pub mod task;
pub mod types;
pub mod watch;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use owo_colors::{OwoColorize, Stream};
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::cli::{CliArgs, Command};
use crate::config::loader::{load_or_default, project_root_for};
use crate::config::model::ConfigFile;
use crate::config::paths::PathConfig;
use crate::engine::{dispatch_results, Reloader, Runtime, RuntimeEvent, TaskGraph};
use crate::errors::SitepipeError;
use crate::serve::DevServer;
use crate::sink::{ConsoleErrorSink, ErrorSink};
use crate::types::BuildResult;

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading and path resolution
/// - the task graph
/// - (optional) dev server, reload broadcaster and file watcher
/// - Ctrl-C handling
///
/// Returns `Ok(false)` when startup validation failed or, for `build`, when
/// any task failed. Both have already been reported.
pub async fn run(args: CliArgs) -> Result<bool> {
    let sink: Arc<dyn ErrorSink> = Arc::new(ConsoleErrorSink::new());
    let command = args.command();
    let config_path = PathBuf::from(&args.config);

    let (cfg, paths, graph) = match prepare(&config_path) {
        Ok(prepared) => prepared,
        Err(err) => {
            sink.report_fatal(&err);
            return Ok(false);
        }
    };

    if args.dry_run {
        print_dry_run(&cfg, &paths, &graph).await;
        return Ok(true);
    }

    let Some(options) = command.build_options() else {
        clean_output(paths.output())?;
        return Ok(true);
    };

    if cfg.build().clean && !options.no_clean {
        clean_output(paths.output())?;
    }

    let started = Instant::now();
    let results = graph.run_all().await;
    print_summary(&results, started.elapsed());
    let success = results.iter().all(|r| r.success);

    if !command.watches() {
        dispatch_results(&results, None, sink.as_ref());
        return Ok(success);
    }

    let server = match command {
        Command::Serve(_) => Some(DevServer::start(paths.output(), cfg.server())?),
        _ => None,
    };
    let reloader: Option<Arc<dyn Reloader>> = server
        .as_ref()
        .map(|s| s.reloader() as Arc<dyn Reloader>);
    dispatch_results(&results, reloader.as_deref(), sink.as_ref());

    let (rt_tx, rt_rx) = mpsc::channel::<RuntimeEvent>(64);

    let debounce = Duration::from_millis(cfg.build().watch_debounce_ms);
    let watcher = crate::watch::spawn_watcher(paths.source(), debounce, rt_tx.clone())?;

    // Ctrl-C → graceful shutdown.
    {
        let tx = rt_tx.clone();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                eprintln!("failed to listen for Ctrl+C: {e}");
                return;
            }
            let _ = tx.send(RuntimeEvent::ShutdownRequested).await;
        });
    }
    drop(rt_tx);

    info!(source = %paths.source().display(), "watching for changes");

    let mut runtime = Runtime::new(Arc::clone(&graph), rt_rx, Arc::clone(&sink));
    if let Some(reloader) = reloader {
        runtime = runtime.with_reloader(reloader);
    }
    runtime.run().await;

    drop(watcher);
    if let Some(server) = server {
        server.shutdown();
    }

    info!("bye");
    Ok(true)
}

/// Load the config, resolve paths and validate the task graph.
fn prepare(
    config_path: &Path,
) -> std::result::Result<(ConfigFile, Arc<PathConfig>, Arc<TaskGraph>), SitepipeError> {
    let cfg = load_or_default(config_path)?;
    let project_root = project_root_for(config_path);
    let paths = Arc::new(PathConfig::resolve(&project_root, cfg.paths())?);
    let graph = Arc::new(TaskGraph::from_config(&cfg, Arc::clone(&paths))?);
    Ok((cfg, paths, graph))
}

/// Delete the output root, if present.
fn clean_output(output: &Path) -> Result<()> {
    if !output.exists() {
        debug!(output = %output.display(), "output root absent; nothing to clean");
        return Ok(());
    }
    std::fs::remove_dir_all(output)
        .with_context(|| format!("failed to clean output root {}", output.display()))?;
    info!(output = %output.display(), "cleaned output root");
    Ok(())
}

/// One line per task, then the list of failed tasks if any.
fn print_summary(results: &[BuildResult], elapsed: Duration) {
    for result in results {
        let status = if result.success {
            "ok".if_supports_color(Stream::Stdout, |s| s.green()).to_string()
        } else {
            "FAILED".if_supports_color(Stream::Stdout, |s| s.red()).to_string()
        };
        println!(
            "  {:<12} {:>6}  {} artifact(s), {} skipped",
            result.task_name,
            status,
            result.artifact_paths.len(),
            result.skipped
        );
    }

    let failed: Vec<&str> = results
        .iter()
        .filter(|r| !r.success)
        .map(|r| r.task_name.as_str())
        .collect();

    if failed.is_empty() {
        println!(
            "built {} task(s) in {} ms",
            results.len(),
            elapsed.as_millis()
        );
    } else {
        println!(
            "{} of {} task(s) failed: {}",
            failed.len(),
            results.len(),
            failed.join(", ")
        );
    }
}

/// Print resolved paths and tasks in topological order.
async fn print_dry_run(cfg: &ConfigFile, paths: &PathConfig, graph: &TaskGraph) {
    println!("sitepipe dry-run");
    println!("  source = {}", paths.source().display());
    println!("  output = {}", paths.output().display());
    println!("  watch_debounce_ms = {}", cfg.build().watch_debounce_ms);
    println!();

    let order = graph.topological_order().await;
    println!("tasks ({}), in run order:", order.len());
    for name in &order {
        let Some(task) = cfg.tasks().get(name) else {
            continue;
        };
        println!("  - {name}");
        println!("      kind: {}", format!("{:?}", task.kind).to_lowercase());
        println!("      input: {:?}", task.input);
        if let Some(watch) = task.watch.as_ref().filter(|w| !w.is_empty()) {
            println!("      watch: {watch:?}");
        }
        if !task.exclude.is_empty() {
            println!("      exclude: {:?}", task.exclude);
        }
        if let Some(base) = &task.base {
            println!("      base: {base}");
        }
        if !task.output.is_empty() {
            println!("      output: {}", task.output);
        }
        if !task.after.is_empty() {
            println!("      after: {:?}", task.after);
        }
        if !task.rename.is_empty() {
            println!("      rename: {:?}", task.rename);
        }
        if task.effective_incremental() {
            println!("      incremental: true");
        }
    }

    debug!("dry-run complete (no execution)");
}
