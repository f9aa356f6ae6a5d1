//! Live view: snapshots, connection transitions, and change notices until
//! Ctrl-C.

use chrono::Local;
use serde::Serialize;

use orgsync_core::{
    ChangeNotice, ConnectionState, EntityKind, EntitySnapshot, Resource, Session, Subscription,
};

use crate::cli::{GlobalOpts, OutputFormat, WatchArgs};
use crate::error::CliError;
use crate::output;

/// One line of watch output.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WatchLine {
    Snapshot {
        kind: EntityKind,
        count: usize,
        status: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    Connection {
        state: String,
    },
    Change {
        kind: EntityKind,
        source: String,
    },
}

impl WatchLine {
    fn snapshot<R: Resource>(snap: &EntitySnapshot<R>) -> Self {
        Self::Snapshot {
            kind: R::KIND,
            count: snap.len(),
            status: snap.status.to_string(),
            error: snap.error.clone(),
        }
    }

    fn render(&self, color: bool) -> String {
        let stamp = output::paint_dim(&Local::now().format("%H:%M:%S").to_string(), color);
        let body = match self {
            Self::Snapshot {
                kind,
                count,
                status,
                error,
            } => match error {
                Some(err) => format!("{kind}: {count} records ({status}: {err})"),
                None => format!("{kind}: {count} records ({status})"),
            },
            Self::Connection { state } => format!("push: {state}"),
            Self::Change { kind, source } => format!("{kind} changed ({source})"),
        };
        format!("{stamp} {body}")
    }
}

async fn next_from<T>(sub: &mut Option<Subscription<T>>) -> Option<T> {
    match sub {
        Some(sub) => sub.next().await,
        None => std::future::pending().await,
    }
}

pub async fn handle(session: &Session, args: WatchArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let only: Option<EntityKind> = args.kind.map(Into::into);
    let follows = |kind: EntityKind| only.is_none_or(|k| k == kind);

    let mut organizations = follows(EntityKind::Organization).then(|| session.organizations().subscribe());
    let mut staff = follows(EntityKind::Staff).then(|| session.staff().subscribe());
    let mut connection = session.connection_changes();
    let mut notices = session.notices();

    let color = output::should_color(&global.color);
    let structured = !matches!(global.output, OutputFormat::Table | OutputFormat::Plain);
    let emit = |line: &WatchLine| -> Result<(), CliError> {
        let text = if structured {
            output::render_json(line, true)?
        } else {
            line.render(color)
        };
        output::print_output(&text, global.quiet);
        Ok(())
    };

    emit(&WatchLine::Connection {
        state: output::paint_state(*connection.borrow_and_update(), color && !structured),
    })?;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,

            Some(snap) = next_from(&mut organizations) => {
                emit(&WatchLine::snapshot(&snap))?;
            }

            Some(snap) = next_from(&mut staff) => {
                emit(&WatchLine::snapshot(&snap))?;
            }

            changed = connection.changed() => {
                if changed.is_err() {
                    break;
                }
                let state: ConnectionState = *connection.borrow_and_update();
                emit(&WatchLine::Connection {
                    state: output::paint_state(state, color && !structured),
                })?;
            }

            notice = notices.recv() => {
                match notice {
                    Ok(ChangeNotice { kind, source }) if follows(kind) => {
                        emit(&WatchLine::Change { kind, source: source.to_string() })?;
                    }
                    Ok(_) | Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => {}
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
        }
    }

    tracing::debug!("watch stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn change_lines_serialize_with_a_type_tag() {
        let line = WatchLine::Change {
            kind: EntityKind::Staff,
            source: "push:created".into(),
        };
        assert_eq!(
            output::render_json(&line, true).ok().as_deref(),
            Some(r#"{"type":"change","kind":"staff","source":"push:created"}"#)
        );
        assert!(line.render(false).ends_with("staff changed (push:created)"));
    }
}
