//! Staff command handlers.

use tabled::Tabled;

use orgsync_core::{EntityId, NewStaff, Session, Staff, StaffPatch, StaffRole};

use crate::cli::{GlobalOpts, StaffArgs, StaffCommand};
use crate::error::CliError;
use crate::output;

use super::util;

const LIST_COMMAND: &str = "staff list";

// ── Table row ───────────────────────────────────────────────────────

#[derive(Tabled)]
struct StaffRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Email")]
    email: String,
    #[tabled(rename = "Role")]
    role: String,
    #[tabled(rename = "Organization")]
    organization: String,
}

impl From<&Staff> for StaffRow {
    fn from(s: &Staff) -> Self {
        Self {
            id: s.id.to_string(),
            name: s.full_name(),
            email: s.email.clone(),
            role: s.role.to_string(),
            organization: organization_label(s),
        }
    }
}

fn organization_label(s: &Staff) -> String {
    s.organization
        .name()
        .map_or_else(|| s.organization.id().to_string(), str::to_owned)
}

fn detail(s: &Staff) -> String {
    util::detail_block(&[
        ("ID", s.id.to_string()),
        ("Name", s.full_name()),
        ("Email", s.email.clone()),
        ("Phone", s.phone.clone()),
        ("Role", s.role.to_string()),
        ("Organization", organization_label(s)),
        ("Created", util::format_time(s.created_at)),
        ("Updated", util::format_time(s.updated_at)),
    ])
}

fn with_role(mut members: Vec<Staff>, role: Option<StaffRole>) -> Vec<Staff> {
    if let Some(role) = role {
        members.retain(|s| s.role == role);
    }
    members
}

// ── Handler ─────────────────────────────────────────────────────────

pub async fn handle(session: &Session, args: StaffArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        StaffCommand::List { organization, role } => {
            let members = match organization {
                Some(id) => session.staff_for_organization(&EntityId::from(id)).await?,
                None => session.staff().refresh().await?.items.to_vec(),
            };
            let members = with_role(members, role.map(Into::into));
            let out = output::render_list(
                &global.output,
                &members,
                |s| StaffRow::from(s),
                |s| s.id.to_string(),
            )?;
            output::print_output(&out, global.quiet);
            Ok(())
        }

        StaffCommand::Get { id } => {
            let member = session
                .staff()
                .fetch(&EntityId::from(id))
                .await
                .map_err(|e| CliError::from(e).with_list_hint(LIST_COMMAND))?;
            let out = output::render_single(&global.output, &member, detail, |s| s.id.to_string())?;
            output::print_output(&out, global.quiet);
            Ok(())
        }

        StaffCommand::Create {
            first_name,
            last_name,
            email,
            phone,
            organization,
            role,
        } => {
            let draft = NewStaff {
                first_name,
                last_name,
                email,
                phone,
                organization: EntityId::from(organization),
                role: role.into(),
            };
            let member = session.staff_mutations().create(&draft).await?;
            let out = output::render_single(&global.output, &member, detail, |s| s.id.to_string())?;
            output::print_output(&out, global.quiet);
            if !global.quiet {
                eprintln!("Staff member created");
            }
            Ok(())
        }

        StaffCommand::Update {
            id,
            first_name,
            last_name,
            email,
            phone,
            organization,
            role,
        } => {
            let patch = StaffPatch {
                first_name,
                last_name,
                email,
                phone,
                organization: organization.map(EntityId::from),
                role: role.map(Into::into),
            };
            util::require_changes(patch != StaffPatch::default())?;
            let member = session
                .staff_mutations()
                .update(&EntityId::from(id), &patch)
                .await
                .map_err(|e| CliError::from(e).with_list_hint(LIST_COMMAND))?;
            let out = output::render_single(&global.output, &member, detail, |s| s.id.to_string())?;
            output::print_output(&out, global.quiet);
            if !global.quiet {
                eprintln!("Staff member updated");
            }
            Ok(())
        }

        StaffCommand::Delete { id } => {
            if !util::confirm(
                &format!("Delete staff member '{id}'? This cannot be undone."),
                global.yes,
            )? {
                return Ok(());
            }
            session
                .staff_mutations()
                .delete(&EntityId::from(id))
                .await
                .map_err(|e| CliError::from(e).with_list_hint(LIST_COMMAND))?;
            if !global.quiet {
                eprintln!("Staff member deleted");
            }
            Ok(())
        }
    }
}
