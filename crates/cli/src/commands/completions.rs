use clap::CommandFactory;

use crate::args::{Cli, CompletionShell};

pub fn generate_completions(shell: CompletionShell) {
    let mut cmd = Cli::command();
    clap_complete::generate(
        clap_complete::Shell::from(shell),
        &mut cmd,
        "bmcfleet",
        &mut std::io::stdout(),
    );
}
