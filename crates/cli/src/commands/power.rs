use common::api::{ActionKind, ActionRequest};

use crate::args::PowerCommands;
use crate::commands::{confirm_action, finish, run_one_cycle, CommandContext};

pub async fn handle_power(ctx: &CommandContext, command: PowerCommands) -> anyhow::Result<()> {
    let registry = ctx.load_registry()?;

    let (action, description) = match command {
        PowerCommands::On => (ActionRequest::new(ActionKind::PowerOn), "Power ON"),
        PowerCommands::Off => (
            ActionRequest::new(ActionKind::PowerOffGraceful),
            "Gracefully shut down",
        ),
        PowerCommands::ForceOff => (
            ActionRequest::new(ActionKind::PowerOffForced),
            "Force power OFF",
        ),
    };

    if !confirm_action(&ctx.globals, &action, registry.len(), description)? {
        println!("Operation cancelled.");
        return Ok(());
    }

    println!("Dispatching {}...", action.kind);
    let report = run_one_cycle(ctx, &registry, &action).await?;

    ctx.emit_report(&report)?;
    finish(&report)
}
