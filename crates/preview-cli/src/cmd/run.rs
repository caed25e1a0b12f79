use crate::controller;
use crate::output::{ids, print_json, print_table};
use crate::settings::RemoteArgs;
use anyhow::Context;
use preview_core::config::ControllerConfig;
use preview_core::reconciler::{PassOutcome, PassReport};
use preview_core::scheduler::{LoopConfig, Scheduler};
use tracing::{info, warn};

// ---------------------------------------------------------------------------
// run
// ---------------------------------------------------------------------------

/// Reconcile on a fixed interval until SIGINT or SIGTERM.
pub fn run(cfg: ControllerConfig, remote: RemoteArgs) -> anyhow::Result<()> {
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async move {
        let controller = controller::start(cfg, &remote).await?;
        let loop_cfg = LoopConfig::from_config(controller.reconciler.config());
        let mut scheduler = Scheduler::new(controller.reconciler.clone(), loop_cfg);

        let stopper = scheduler.stopper();
        tokio::spawn(async move {
            shutdown_signal().await;
            info!("shutdown requested, letting the current pass finish");
            stopper.stop();
        });

        scheduler
            .run()
            .await
            .context("reconciliation loop stopped after repeated failures")?;
        Ok(())
    })
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for SIGINT");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

// ---------------------------------------------------------------------------
// once
// ---------------------------------------------------------------------------

pub fn once(cfg: ControllerConfig, remote: RemoteArgs, json: bool) -> anyhow::Result<()> {
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async move {
        let controller = controller::start(cfg, &remote).await?;
        let outcome = controller
            .reconciler
            .run_pass()
            .await
            .context("reconciliation pass failed")?;
        match outcome {
            PassOutcome::Completed(report) => print_report(&report, json),
            PassOutcome::Skipped => anyhow::bail!("another pass holds the working copy"),
        }
    })
}

fn print_report(report: &PassReport, json: bool) -> anyhow::Result<()> {
    if json {
        return print_json(report);
    }

    println!("created:  {}", ids(&report.created));
    println!("removed:  {}", ids(&report.removed));
    println!("updated:  {}", ids(&report.updated));
    println!("commits:  {}", report.commits);
    if report.environments.is_empty() {
        println!("No open merge requests.");
        return Ok(());
    }
    println!();

    let rows = report
        .environments
        .iter()
        .map(|(id, env)| {
            vec![
                id.to_string(),
                env.status.to_string(),
                env.latest_tag.clone(),
                env.comment
                    .map(|c| format!("{c:?}").to_lowercase())
                    .unwrap_or_else(|| "failed".to_string()),
            ]
        })
        .collect();
    print_table(&["MR", "STATUS", "LATEST TAG", "COMMENT"], rows);
    Ok(())
}
