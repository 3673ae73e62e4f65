//! Local CI runner for tidepool.
//!
//! Each subcommand expands to one or more cargo invocations. With no
//! subcommand, every check that the hosted CI runs is run in order.

mod ci;
mod commands;
mod prepare;

pub use self::{ci::*, prepare::*};

fn main() {
    argh::from_env::<CI>().run();
}
