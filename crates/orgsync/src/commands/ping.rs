//! Push channel round-trip check.

use std::time::Duration;

use serde::Serialize;

use orgsync_core::Session;

use crate::cli::{GlobalOpts, PingArgs};
use crate::error::CliError;
use crate::output;

#[derive(Serialize)]
struct PingReport {
    namespace: String,
    round_trip_ms: u64,
}

pub async fn handle(session: &Session, args: PingArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let wait = Duration::from_secs(args.wait.max(1));
    super::wait_connected(session, wait).await?;

    let elapsed = session.ping(wait).await?;
    let report = PingReport {
        namespace: session.transport().namespace().to_owned(),
        round_trip_ms: u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
    };
    let out = output::render_single(
        &global.output,
        &report,
        |r| format!("pong from {} in {} ms", r.namespace, r.round_trip_ms),
        |r| r.round_trip_ms.to_string(),
    )?;
    output::print_output(&out, global.quiet);
    Ok(())
}
