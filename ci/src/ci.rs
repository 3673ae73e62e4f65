use argh::FromArgs;

use crate::{
    commands,
    prepare::{Flag, Prepare, PreparedCommand},
};

/// The CI command line tool for tidepool.
#[derive(FromArgs)]
pub struct CI {
    #[argh(subcommand)]
    command: Option<Commands>,

    /// continue running commands even if one fails.
    #[argh(switch)]
    keep_going: bool,
}

impl CI {
    /// Runs the chosen subcommand, or the full check list if none was given.
    ///
    /// Panics with a summary of every failed command, so the process exits
    /// non-zero.
    pub fn run(self) {
        let sh = xshell::Shell::new().unwrap();

        let prepared_commands = self.prepare(&sh);

        let mut failures = vec![];

        for command in prepared_commands {
            if command.command.envs(command.env_vars).run().is_err() {
                let name = command.name;
                let message = command.failure_message;

                if self.keep_going {
                    // One line per failure.
                    failures.push(format!("- {name}: {message}"));
                } else {
                    failures.push(format!("{name}: {message}"));
                    break;
                }
            }
        }

        if !failures.is_empty() {
            let failures = failures.join("\n");

            panic!(
                "One or more CI commands failed:\n\
                {failures}"
            );
        }
    }

    fn prepare<'a>(&self, sh: &'a xshell::Shell) -> Vec<PreparedCommand<'a>> {
        let mut flags = Flag::empty();

        if self.keep_going {
            flags |= Flag::KEEP_GOING;
        }

        match &self.command {
            Some(command) => command.prepare(sh, flags),
            None => {
                // Static checks first, then the two test suites.
                let mut cmds = vec![];
                cmds.append(&mut commands::FormatCommand::default().prepare(sh, flags));
                cmds.append(&mut commands::ClippyCommand::default().prepare(sh, flags));
                cmds.append(&mut commands::LintsCommand::default().prepare(sh, flags));
                cmds.append(&mut commands::CompileCheckCommand::default().prepare(sh, flags));
                cmds.append(&mut commands::TestCommand::default().prepare(sh, flags));
                cmds.append(&mut commands::ShuttleTestCommand::default().prepare(sh, flags));
                cmds
            }
        }
    }
}

/// The checks the runner knows about.
#[derive(FromArgs)]
#[argh(subcommand)]
enum Commands {
    // Compile commands
    Compile(commands::CompileCommand),
    CompileCheck(commands::CompileCheckCommand),
    // Test commands
    Test(commands::TestCommand),
    // Lint commands
    Lints(commands::LintsCommand),
    Clippy(commands::ClippyCommand),
    Format(commands::FormatCommand),
    // Shuttle commands
    Shuttle(commands::ShuttleCommand),
    ShuttleCheck(commands::ShuttleCheckCommand),
    ShuttleClippy(commands::ShuttleClippyCommand),
    ShuttleTest(commands::ShuttleTestCommand),
}

impl Prepare for Commands {
    fn prepare<'a>(&self, sh: &'a xshell::Shell, flags: Flag) -> Vec<PreparedCommand<'a>> {
        match self {
            // Compile commands
            Commands::Compile(subcommand) => subcommand.prepare(sh, flags),
            Commands::CompileCheck(subcommand) => subcommand.prepare(sh, flags),
            // Test commands
            Commands::Test(subcommand) => subcommand.prepare(sh, flags),
            // Lint commands
            Commands::Lints(subcommand) => subcommand.prepare(sh, flags),
            Commands::Clippy(subcommand) => subcommand.prepare(sh, flags),
            Commands::Format(subcommand) => subcommand.prepare(sh, flags),
            // Shuttle commands
            Commands::Shuttle(subcommand) => subcommand.prepare(sh, flags),
            Commands::ShuttleCheck(subcommand) => subcommand.prepare(sh, flags),
            Commands::ShuttleClippy(subcommand) => subcommand.prepare(sh, flags),
            Commands::ShuttleTest(subcommand) => subcommand.prepare(sh, flags),
        }
    }
}
