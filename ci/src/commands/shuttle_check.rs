use argh::FromArgs;
use xshell::cmd;

use crate::{Flag, Prepare, PreparedCommand};

/// Builds the pool against shuttle's primitives, with its shuttle tests.
#[derive(FromArgs, Default)]
#[argh(subcommand, name = "shuttle-check")]
pub struct ShuttleCheckCommand {}

impl Prepare for ShuttleCheckCommand {
    fn prepare<'a>(&self, sh: &'a xshell::Shell, _flags: Flag) -> Vec<PreparedCommand<'a>> {
        let command = PreparedCommand::new::<Self>(
            cmd!(sh, "cargo check --test shuttle --features shuttle"),
            "The shuttle build of tidepool failed, see the compiler output above.",
        );
        vec![command]
    }
}
