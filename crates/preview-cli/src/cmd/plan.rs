use crate::controller;
use crate::output::{ids, print_json};
use crate::settings::RemoteArgs;
use anyhow::Context;
use preview_core::config::ControllerConfig;

/// Print the diff the next pass would act on. Nothing is written.
pub fn run(cfg: ControllerConfig, remote: RemoteArgs, json: bool) -> anyhow::Result<()> {
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async move {
        let controller = controller::start(cfg, &remote).await?;
        let plan = controller
            .reconciler
            .plan()
            .await
            .context("failed to compute plan")?;

        if json {
            return print_json(&plan);
        }
        let collect = |set: &std::collections::BTreeSet<u64>| set.iter().copied().collect::<Vec<_>>();
        println!("open merge requests: {}", plan.requests.len());
        println!("create:    {}", ids(&collect(&plan.diff.to_create)));
        println!("remove:    {}", ids(&collect(&plan.diff.to_remove)));
        println!("unchanged: {}", ids(&collect(&plan.diff.unchanged)));
        if plan.diff.is_converged() {
            println!("Tree is converged.");
        }
        Ok(())
    })
}
