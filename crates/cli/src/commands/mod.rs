use std::io::Write;
use std::sync::Arc;

use tokio::sync::watch;

use common::api::{ActionRequest, CycleReport};
use engine::config::{self, EngineConfig};
use engine::confirm;
use engine::dispatch;
use engine::endpoint::DynEndpointClient;
use engine::redfish::RedfishClient;
use engine::registry::Registry;

use crate::args::{GlobalArgs, OutputMode};
use crate::source;
use crate::view;

pub mod completions;
pub mod metrics;
pub mod monitor;
pub mod policy;
pub mod power;
pub mod status;

pub struct CommandContext {
    pub cfg: EngineConfig,
    pub client: DynEndpointClient,
    pub globals: GlobalArgs,
}

impl CommandContext {
    /// Engine config layered under CLI flag overrides, plus the stock
    /// Redfish client.
    pub fn new(globals: GlobalArgs) -> anyhow::Result<Self> {
        let mut cfg = config::load()?;
        apply_global_overrides(&mut cfg, &globals);
        cfg.validate()?;

        let client: DynEndpointClient = Arc::new(RedfishClient::new(&cfg)?);
        Ok(Self {
            cfg,
            client,
            globals,
        })
    }

    pub fn load_registry(&self) -> anyhow::Result<Registry> {
        let registry = source::load_targets(&self.globals)?;
        if registry.rejected() > 0 {
            eprintln!(
                "Warning: {} invalid target record(s) skipped.",
                registry.rejected()
            );
        }
        println!("Loaded {} target(s).", registry.len());
        Ok(registry)
    }

    pub fn emit_report(&self, report: &CycleReport) -> anyhow::Result<()> {
        match self.globals.output {
            OutputMode::Table => println!("{}", view::render_report(report)),
            OutputMode::Json => println!("{}", view::to_pretty_json(report)?),
        }
        Ok(())
    }
}

fn apply_global_overrides(cfg: &mut EngineConfig, globals: &GlobalArgs) {
    if let Some(workers) = globals.workers {
        cfg.max_concurrency = workers;
    }
    if let Some(timeout) = globals.timeout_secs {
        cfg.target_timeout_secs = timeout;
    }
    if globals.insecure {
        cfg.tls_insecure_skip_verify = true;
    }
}

/// One dispatch + aggregate pass for a one-shot command.
pub async fn run_one_cycle(
    ctx: &CommandContext,
    registry: &Registry,
    action: &ActionRequest,
) -> anyhow::Result<CycleReport> {
    let (_shutdown_tx, shutdown_rx) = watch::channel(false);
    dispatch::run_cycle(
        registry.targets(),
        action,
        ctx.client.clone(),
        &ctx.cfg,
        shutdown_rx,
    )
    .await
}

/// Gate a destructive batch action: one prompt for the whole batch, or the
/// audited `--yes` bypass.
pub fn confirm_action(
    globals: &GlobalArgs,
    action: &ActionRequest,
    target_count: usize,
    description: &str,
) -> anyhow::Result<bool> {
    if !action.kind.requires_confirmation() || globals.yes {
        return Ok(confirm::evaluate(action, target_count, None, globals.yes).is_granted());
    }

    let answer = prompt_answer(&format!("{description} {target_count} system(s)? (y/n):"))?;
    Ok(confirm::evaluate(action, target_count, Some(&answer), false).is_granted())
}

fn prompt_answer(question: &str) -> anyhow::Result<String> {
    print!("{question} ");
    std::io::stdout().flush()?;
    let mut answer = String::new();
    std::io::stdin().read_line(&mut answer)?;
    Ok(answer)
}

/// Exit signaling: the run succeeds only when no target failed. The report
/// has already been rendered by this point; partial failure never suppresses
/// the successful targets' results.
pub fn finish(report: &CycleReport) -> anyhow::Result<()> {
    if report.failed > 0 {
        anyhow::bail!("{} of {} targets failed", report.failed, report.total);
    }
    Ok(())
}
