//! `rigsmith build`: run the pipeline for one rig.
//!
//! The build itself is synchronous and runs on a blocking thread. The async
//! side drives the progress bar from the event bus and turns Ctrl+C into a
//! cancellation, which aborts the session between components.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use rigsmith_core::artifact::ArtifactHandlers;
use rigsmith_core::event::EventBus;
use rigsmith_core::hook::{DisabledHooks, HookRunner};
use rigsmith_core::orchestrator::{BuildContext, BuildOrchestrator, OrchestratorSettings};
use rigsmith_core::scene::MemoryScene;
use rigsmith_core::session::BuildSession;
use rigsmith_infra::artifact::FsArtifactStore;
use rigsmith_infra::hook_runner::ProcessHookRunner;
use rigsmith_infra::publish::{PublishRecord, PublishTarget, publish};
use rigsmith_observe::span_attrs;
use rigsmith_types::build::{BuildReport, BuildStage, EntryOutcome};
use rigsmith_types::event::BuildEvent;

use super::OpenRig;
use super::scene_file::{read_scene_or_new, write_scene};

const EVENT_CAPACITY: usize = 256;

pub struct BuildArgs {
    pub rig: PathBuf,
    pub until: BuildStage,
    pub optimize: bool,
    pub only: Option<String>,
    pub no_hooks: bool,
    pub scene: Option<PathBuf>,
    pub publish: bool,
    pub report: Option<PathBuf>,
}

/// Stages to run: everything up to `until`, or the full pipeline with `optimize`.
pub fn stages_for(until: BuildStage, optimize: bool) -> Vec<BuildStage> {
    if optimize {
        BuildStage::Optimize.through()
    } else {
        until.through()
    }
}

pub async fn handle_build(args: BuildArgs, json: bool, quiet: bool, detail: bool) -> Result<ExitCode> {
    let opened = OpenRig::open(&args.rig)
        .await
        .with_context(|| format!("failed to open rig at {}", args.rig.display()))?;
    let registry = opened.registry();
    let library = opened.library();
    let mut session = BuildSession::prepare(&opened.rig, &registry, &library, args.only.as_deref())?;
    let stages = stages_for(args.until, args.optimize);

    let mut scene = match &args.scene {
        Some(path) => read_scene_or_new(path).await?,
        None => MemoryScene::new(),
    };

    let events = EventBus::new(EVENT_CAPACITY);
    let progress = (!json && !quiet).then(|| {
        spawn_progress(events.subscribe(), (session.records().len() * stages.len()) as u64)
    });

    let cancel = CancellationToken::new();
    let interrupt = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("interrupt received, cancelling build");
                cancel.cancel();
            }
        })
    };

    let span = tracing::info_span!(
        "build",
        { span_attrs::RIG_NAME } = %opened.rig.rig_name,
        { span_attrs::SESSION_ID } = %session.id(),
        { span_attrs::TARGET_STAGE } = %stages.last().copied().unwrap_or(BuildStage::Initialize),
        { span_attrs::COMPONENT_COUNT } = session.records().len(),
        { span_attrs::OUTCOME } = tracing::field::Empty,
    );
    let settings = OrchestratorSettings {
        control_tag: opened.config.control_tag.clone(),
        ..OrchestratorSettings::default()
    };
    let paths = opened.paths.clone();
    let hook_timeout = Duration::from_secs(opened.config.hook_timeout_secs);
    let no_hooks = args.no_hooks;
    let runtime = tokio::runtime::Handle::current();

    let (mut scene, result) = tokio::task::spawn_blocking(move || {
        let _entered = span.enter();
        let mut store = FsArtifactStore::new(ArtifactHandlers::standard());
        let mut hooks: Box<dyn HookRunner + Send> = if no_hooks {
            Box::new(DisabledHooks)
        } else {
            Box::new(ProcessHookRunner::new(runtime, hook_timeout))
        };
        let cx = BuildContext {
            scene: &mut scene,
            artifacts: &mut store,
            hooks: hooks.as_mut(),
            paths,
            cancel,
            events: Some(events),
        };
        let result = BuildOrchestrator::new(&registry, cx)
            .with_settings(settings)
            .run(&mut session, &stages);
        if let Ok(report) = &result {
            span.record(span_attrs::OUTCOME, report.outcome.to_string().as_str());
        }
        (scene, result)
    })
    .await
    .context("build task failed")?;

    interrupt.abort();
    if let Some((bar, task)) = progress {
        // The bus is gone once the build returns, so the task ends on its own.
        let _ = task.await;
        bar.finish_and_clear();
    }

    let report = result?;

    let published = if args.publish && !report.is_aborted() {
        let target = PublishTarget::for_rig(&opened.rig, &opened.paths)?;
        Some(publish(&mut scene, &target, opened.config.publish_versioning)?)
    } else {
        None
    };

    if let Some(path) = &args.scene {
        write_scene(path, &scene).await?;
    }
    if let Some(path) = &args.report {
        tokio::fs::write(path, serde_json::to_string_pretty(&report)?)
            .await
            .with_context(|| format!("failed to write report {}", path.display()))?;
    }

    if json {
        let out = serde_json::json!({ "report": report, "publish": published });
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else if !quiet {
        print_report(&report, published.as_ref(), detail);
    }

    Ok(if report.is_aborted() {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

// ---------------------------------------------------------------------------
// Progress
// ---------------------------------------------------------------------------

fn spawn_progress(
    mut rx: broadcast::Receiver<BuildEvent>,
    total: u64,
) -> (ProgressBar, JoinHandle<()>) {
    let bar = ProgressBar::new(total);
    bar.set_style(
        ProgressStyle::default_bar()
            .template("{prefix:>10.cyan.bold} [{bar:30.cyan/blue}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> "),
    );
    bar.enable_steady_tick(Duration::from_millis(100));

    let handle = bar.clone();
    let task = tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(BuildEvent::StageStarted { stage, .. }) => handle.set_prefix(stage.to_string()),
                Ok(BuildEvent::ComponentStarted { component, .. }) => handle.set_message(component),
                Ok(BuildEvent::ComponentFinished { .. }) => handle.inc(1),
                Ok(BuildEvent::HookStarted { kind, path, .. }) => {
                    handle.set_message(format!("{kind} hook {path}"));
                }
                Ok(BuildEvent::StageFinished { .. }) => handle.set_message(""),
                Ok(BuildEvent::SessionFinished { .. }) | Err(RecvError::Closed) => break,
                Err(RecvError::Lagged(missed)) => {
                    tracing::debug!(missed, "progress display fell behind");
                }
            }
        }
    });
    (bar, task)
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

fn outcome_cell(outcome: EntryOutcome) -> Cell {
    let cell = Cell::new(outcome.to_string());
    match outcome {
        EntryOutcome::Completed => cell.fg(Color::Green),
        EntryOutcome::Skipped => cell.fg(Color::DarkGrey),
        EntryOutcome::Warning => cell.fg(Color::Yellow),
        EntryOutcome::Failed | EntryOutcome::Cancelled => cell.fg(Color::Red),
    }
}

fn print_report(report: &BuildReport, published: Option<&PublishRecord>, detail: bool) {
    println!();
    if report.is_aborted() {
        println!("  {} {}", style("✗").red().bold(), report.status_line());
    } else {
        println!("  {} {}", style("✓").green().bold(), report.status_line());
    }

    let shown: Vec<_> = report
        .entries
        .iter()
        .filter(|e| detail || !matches!(e.outcome, EntryOutcome::Completed | EntryOutcome::Skipped))
        .collect();
    if !shown.is_empty() {
        let mut table = Table::new();
        table.load_preset(presets::UTF8_FULL_CONDENSED);
        table.set_content_arrangement(ContentArrangement::Dynamic);
        table.set_header(vec![
            Cell::new("Stage").fg(Color::White),
            Cell::new("Subject").fg(Color::White),
            Cell::new("Outcome").fg(Color::White),
            Cell::new("Message").fg(Color::White),
        ]);
        for entry in shown {
            table.add_row(vec![
                Cell::new(entry.stage.to_string()).fg(Color::Cyan),
                Cell::new(entry.subject.to_string()),
                outcome_cell(entry.outcome),
                Cell::new(entry.message.as_deref().unwrap_or("")).fg(Color::DarkGrey),
            ]);
        }
        println!();
        println!("{table}");
    }

    if !report.skipped_artifacts.is_empty() {
        println!();
        println!(
            "  {} {} artifact file{} skipped:",
            style("!").yellow().bold(),
            report.skipped_artifacts.len(),
            if report.skipped_artifacts.len() == 1 { "" } else { "s" }
        );
        for skipped in &report.skipped_artifacts {
            println!(
                "    {} {} {}",
                style("•").dim(),
                skipped.path.display(),
                style(format!("({})", skipped.reason)).dim()
            );
        }
    }

    if let Some(record) = published {
        println!();
        println!(
            "  {} Published to {}",
            style("✓").green().bold(),
            style(record.path.display()).cyan()
        );
        if let (Some(version), Some(path)) = (record.version, &record.versioned_path) {
            println!("    {} v{version:03} {}", style("•").dim(), style(path.display()).dim());
        }
    }
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stages_stop_at_until() {
        assert_eq!(
            stages_for(BuildStage::Guide, false),
            vec![BuildStage::Initialize, BuildStage::Guide]
        );
        assert_eq!(stages_for(BuildStage::Finalize, false), BuildStage::STANDARD.to_vec());
    }

    #[test]
    fn test_optimize_runs_full_pipeline() {
        assert_eq!(stages_for(BuildStage::Guide, true), BuildStage::ALL.to_vec());
    }
}
