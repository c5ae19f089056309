//! Command dispatch: bridges CLI args -> session calls -> output formatting.

pub mod call;
pub mod config_cmd;
pub mod history;
pub mod serve;
pub mod states;
pub mod watch;

use homelink_core::Session;

use crate::cli::{Command, GlobalOpts};
use crate::error::CliError;

/// Dispatch a command that runs over an authenticated session.
pub async fn dispatch(cmd: Command, session: &Session, global: &GlobalOpts) -> Result<(), CliError> {
    match cmd {
        Command::States(args) => states::list(session, args, global).await,
        Command::Get(args) => states::get(session, args, global).await,
        Command::Call(args) => call::handle(session, args, global).await,
        // Everything else is handled before a session is opened
        Command::Serve(_)
        | Command::History(_)
        | Command::Watch(_)
        | Command::Config(_)
        | Command::Completions(_) => unreachable!(),
    }
}
