//! Dashboard summary.

use std::fmt::Write as _;
use std::time::Duration;

use orgsync_core::{DashboardSummary, Session};

use crate::cli::{DashboardArgs, GlobalOpts, OutputFormat};
use crate::error::CliError;
use crate::output;

use super::util;

pub async fn handle(
    session: &Session,
    args: DashboardArgs,
    global: &GlobalOpts,
    connect_wait: Duration,
) -> Result<(), CliError> {
    if args.connect {
        // A refused or unreachable socket only clears the flag.
        let _ = super::wait_connected(session, connect_wait).await;
    }
    tokio::try_join!(session.organizations().refresh(), session.staff().refresh())?;

    let summary = session.dashboard();
    let out = match global.output {
        OutputFormat::Table => render_summary(&summary, output::should_color(&global.color)),
        OutputFormat::Plain => format!("{}\n{}", summary.organization_count, summary.staff_count),
        OutputFormat::Json => output::render_json(&summary, false)?,
        OutputFormat::JsonCompact => output::render_json(&summary, true)?,
        OutputFormat::Yaml => output::render_yaml(&summary)?,
    };
    output::print_output(&out, global.quiet);
    Ok(())
}

fn render_summary(summary: &DashboardSummary, color: bool) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Organizations: {}", summary.organization_count);
    let _ = writeln!(out, "Staff:         {}", summary.staff_count);
    for (role, count) in &summary.role_counts {
        let _ = writeln!(out, "  {:<12} {count}", format!("{role}:"));
    }
    let live = if summary.connected { "live" } else { "offline" };
    let _ = writeln!(out, "Push:          {live}");

    if !summary.recent_staff.is_empty() {
        let _ = writeln!(out, "\nRecent staff:");
        for member in &summary.recent_staff {
            let when = output::paint_dim(&util::format_time(member.created_at), color);
            let _ = writeln!(out, "  {:<24} {:<10} {when}", member.full_name(), member.role.to_string());
        }
    }
    out.trim_end().to_owned()
}
