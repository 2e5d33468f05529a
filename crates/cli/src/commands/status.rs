use common::api::{ActionKind, ActionRequest};
use engine::sink::{CsvFileSink, ReportSink};
use tracing::warn;

use crate::args::StatusArgs;
use crate::commands::{finish, run_one_cycle, CommandContext};

pub async fn handle_status(ctx: &CommandContext, args: StatusArgs) -> anyhow::Result<()> {
    let registry = ctx.load_registry()?;

    let action = if args.details {
        ActionRequest::detailed_status()
    } else {
        ActionRequest::new(ActionKind::Status)
    };

    println!("Checking system status...");
    let report = run_one_cycle(ctx, &registry, &action).await?;

    if let Some(path) = &args.output_csv {
        match CsvFileSink::truncating(path).write(&report) {
            Ok(()) => println!("Status saved to {}", path.display()),
            Err(err) => warn!(error = %err, "failed to write status CSV"),
        }
    }

    ctx.emit_report(&report)?;
    finish(&report)
}
