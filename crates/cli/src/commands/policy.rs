use common::api::{ActionKind, ActionRequest};

use crate::args::PolicyCommands;
use crate::commands::{confirm_action, finish, run_one_cycle, CommandContext};

pub async fn handle_policy(ctx: &CommandContext, command: PolicyCommands) -> anyhow::Result<()> {
    let registry = ctx.load_registry()?;

    let (action, description) = match command {
        PolicyCommands::Get => (
            ActionRequest::new(ActionKind::GetPowerPolicy),
            String::new(),
        ),
        PolicyCommands::Set { policy } => {
            let description = format!("Set power policy to '{policy}' for");
            (ActionRequest::set_power_policy(policy), description)
        }
    };

    if action.kind == ActionKind::SetPowerPolicy
        && !confirm_action(&ctx.globals, &action, registry.len(), &description)?
    {
        println!("Operation cancelled.");
        return Ok(());
    }

    let report = run_one_cycle(ctx, &registry, &action).await?;

    ctx.emit_report(&report)?;
    finish(&report)
}
