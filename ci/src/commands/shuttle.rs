use argh::FromArgs;

use crate::Flag;
use crate::Prepare;
use crate::PreparedCommand;
use crate::commands::ShuttleCheckCommand;
use crate::commands::ShuttleClippyCommand;
use crate::commands::ShuttleTestCommand;

/// Builds, lints and runs the randomized-schedule tests for the pool
/// (`shuttle-check`, `shuttle-clippy` and `shuttle-test`).
#[derive(FromArgs, Default)]
#[argh(subcommand, name = "shuttle")]
pub struct ShuttleCommand {}

impl Prepare for ShuttleCommand {
    fn prepare<'a>(&self, sh: &'a xshell::Shell, flags: Flag) -> Vec<PreparedCommand<'a>> {
        [
            ShuttleCheckCommand::default().prepare(sh, flags),
            ShuttleClippyCommand::default().prepare(sh, flags),
            ShuttleTestCommand::default().prepare(sh, flags),
        ]
        .into_iter()
        .flatten()
        .collect()
    }
}
