use common::api::{ActionKind, ActionRequest};
use engine::sink::{CsvFileSink, ReportSink};
use tracing::warn;

use crate::args::MetricsArgs;
use crate::commands::{finish, run_one_cycle, CommandContext};

pub async fn handle_metrics(ctx: &CommandContext, args: MetricsArgs) -> anyhow::Result<()> {
    let registry = ctx.load_registry()?;

    println!("Getting power and CPU readings...");
    let report = run_one_cycle(ctx, &registry, &ActionRequest::new(ActionKind::Metrics)).await?;

    if let Some(path) = &args.output_csv {
        match CsvFileSink::truncating(path).write(&report) {
            Ok(()) => println!("Readings saved to {}", path.display()),
            Err(err) => warn!(error = %err, "failed to write metrics CSV"),
        }
    }

    ctx.emit_report(&report)?;
    finish(&report)
}
