//! Command dispatch: bridges CLI args -> session operations -> output.

pub mod config_cmd;
pub mod dashboard;
pub mod orgs;
pub mod ping;
pub mod staff;
pub mod util;
pub mod watch;

use std::time::Duration;

use orgsync_core::{ConnectionState, Session};

use crate::cli::{Command, GlobalOpts};
use crate::error::CliError;

/// Whether a command needs the push channel open.
pub fn wants_push(cmd: &Command) -> bool {
    match cmd {
        Command::Watch(_) | Command::Ping(_) => true,
        Command::Dashboard(args) => args.connect,
        _ => false,
    }
}

/// Dispatch a server-bound command to the appropriate handler.
pub async fn dispatch(
    cmd: Command,
    session: &Session,
    global: &GlobalOpts,
    timeout: Duration,
) -> Result<(), CliError> {
    match cmd {
        Command::Orgs(args) => orgs::handle(session, args, global).await,
        Command::Staff(args) => staff::handle(session, args, global).await,
        Command::Watch(args) => watch::handle(session, args, global).await,
        Command::Dashboard(args) => dashboard::handle(session, args, global, timeout).await,
        Command::Ping(args) => ping::handle(session, args, global).await,
        // Config and Completions are handled before dispatch
        Command::Config(_) | Command::Completions(_) => Err(CliError::Internal(
            "local command reached server dispatch".into(),
        )),
    }
}

/// Wait until the push channel is connected, it gives up, or `limit` passes.
pub async fn wait_connected(session: &Session, limit: Duration) -> Result<(), CliError> {
    let mut states = session.connection_changes();
    let settled = tokio::time::timeout(
        limit,
        states.wait_for(|s| s.is_connected() || *s == ConnectionState::GivenUp),
    )
    .await;

    match settled {
        Ok(Ok(state)) if state.is_connected() => Ok(()),
        Ok(_) => Err(CliError::NotConnected),
        Err(_) => Err(CliError::Timeout {
            seconds: limit.as_secs(),
        }),
    }
}
