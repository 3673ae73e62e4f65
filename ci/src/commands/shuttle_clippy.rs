use argh::FromArgs;
use xshell::cmd;

use crate::Flag;
use crate::Prepare;
use crate::PreparedCommand;

/// Runs clippy over the shuttle build of the pool and its shuttle tests.
#[derive(FromArgs, Default)]
#[argh(subcommand, name = "shuttle-clippy")]
pub struct ShuttleClippyCommand {}

impl Prepare for ShuttleClippyCommand {
    fn prepare<'a>(&self, sh: &'a xshell::Shell, _flags: Flag) -> Vec<PreparedCommand<'a>> {
        let command = PreparedCommand::new::<Self>(
            cmd!(
                sh,
                "cargo clippy --test shuttle --features shuttle -- -Dwarnings"
            ),
            "Clippy found problems in the shuttle build, see the output above.",
        );
        vec![command]
    }
}
