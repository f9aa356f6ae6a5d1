//! Organization command handlers.

use tabled::Tabled;

use orgsync_core::{
    EntityId, NewOrganization, Organization, OrganizationOption, OrganizationPatch, Session,
    organizations_csv,
};

use crate::cli::{GlobalOpts, OrgsArgs, OrgsCommand};
use crate::error::CliError;
use crate::output;

use super::util;

const LIST_COMMAND: &str = "orgs list";

// ── Table rows ──────────────────────────────────────────────────────

#[derive(Tabled)]
struct OrganizationRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Email")]
    email: String,
    #[tabled(rename = "Phone")]
    phone: String,
    #[tabled(rename = "Created")]
    created: String,
}

impl From<&Organization> for OrganizationRow {
    fn from(o: &Organization) -> Self {
        Self {
            id: o.id.to_string(),
            name: o.name.clone(),
            email: o.email.clone().unwrap_or_default(),
            phone: o.phone.clone().unwrap_or_default(),
            created: util::format_time(o.created_at),
        }
    }
}

#[derive(Tabled)]
struct OptionRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Name")]
    name: String,
}

fn detail(o: &Organization) -> String {
    util::detail_block(&[
        ("ID", o.id.to_string()),
        ("Name", o.name.clone()),
        ("Address", o.address.clone().unwrap_or_default()),
        ("Email", o.email.clone().unwrap_or_default()),
        ("Phone", o.phone.clone().unwrap_or_default()),
        ("Created", util::format_time(o.created_at)),
        ("Updated", util::format_time(o.updated_at)),
    ])
}

// ── Handler ─────────────────────────────────────────────────────────

pub async fn handle(session: &Session, args: OrgsArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        OrgsCommand::List => {
            let snap = session.organizations().refresh().await?;
            let out = output::render_list(
                &global.output,
                snap.items.as_slice(),
                |o| OrganizationRow::from(o),
                |o| o.id.to_string(),
            )?;
            output::print_output(&out, global.quiet);
            Ok(())
        }

        OrgsCommand::Get { id } => {
            let org = session
                .organizations()
                .fetch(&EntityId::from(id))
                .await
                .map_err(|e| CliError::from(e).with_list_hint(LIST_COMMAND))?;
            let out = output::render_single(&global.output, &org, detail, |o| o.id.to_string())?;
            output::print_output(&out, global.quiet);
            Ok(())
        }

        OrgsCommand::Create {
            name,
            address,
            phone,
            email,
        } => {
            let draft = NewOrganization {
                name,
                address,
                phone,
                email,
            };
            let org = session.organization_mutations().create(&draft).await?;
            let out = output::render_single(&global.output, &org, detail, |o| o.id.to_string())?;
            output::print_output(&out, global.quiet);
            if !global.quiet {
                eprintln!("Organization created");
            }
            Ok(())
        }

        OrgsCommand::Update {
            id,
            name,
            address,
            phone,
            email,
        } => {
            let patch = OrganizationPatch {
                name,
                address,
                phone,
                email,
            };
            util::require_changes(patch != OrganizationPatch::default())?;
            let org = session
                .organization_mutations()
                .update(&EntityId::from(id), &patch)
                .await
                .map_err(|e| CliError::from(e).with_list_hint(LIST_COMMAND))?;
            let out = output::render_single(&global.output, &org, detail, |o| o.id.to_string())?;
            output::print_output(&out, global.quiet);
            if !global.quiet {
                eprintln!("Organization updated");
            }
            Ok(())
        }

        OrgsCommand::Delete { id } => {
            if !util::confirm(
                &format!("Delete organization '{id}'? This cannot be undone."),
                global.yes,
            )? {
                return Ok(());
            }
            session
                .organization_mutations()
                .delete(&EntityId::from(id))
                .await
                .map_err(|e| CliError::from(e).with_list_hint(LIST_COMMAND))?;
            if !global.quiet {
                eprintln!("Organization deleted");
            }
            Ok(())
        }

        OrgsCommand::Export { file } => {
            let snap = session.organizations().refresh().await?;
            let csv = organizations_csv(&snap.items);
            match file {
                Some(path) => {
                    tokio::fs::write(&path, format!("{csv}\n")).await?;
                    if !global.quiet {
                        eprintln!("Exported {} organizations to {}", snap.len(), path.display());
                    }
                }
                None => output::print_output(&csv, global.quiet),
            }
            Ok(())
        }

        OrgsCommand::Options => {
            let options = session.organization_options().await?;
            let out = output::render_list(
                &global.output,
                &options,
                |o: &OrganizationOption| OptionRow {
                    id: o.id.to_string(),
                    name: o.name.clone(),
                },
                |o| o.id.to_string(),
            )?;
            output::print_output(&out, global.quiet);
            Ok(())
        }
    }
}
