// ── Derived views ──
//
// Dashboard counters and CSV export, computed from store snapshots.

use std::collections::BTreeMap;

use orgsync_api::{Organization, Staff, StaffRole};
use serde::Serialize;
use strum::IntoEnumIterator;

/// How many staff members the dashboard lists as recent.
pub const RECENT_STAFF_LIMIT: usize = 5;

#[derive(Debug, Clone, Serialize)]
pub struct DashboardSummary {
    pub organization_count: usize,
    pub staff_count: usize,
    /// Every role, including those with no members.
    pub role_counts: BTreeMap<StaffRole, usize>,
    /// Newest first.
    pub recent_staff: Vec<Staff>,
    pub connected: bool,
}

impl DashboardSummary {
    pub fn build(organizations: &[Organization], staff: &[Staff], connected: bool) -> Self {
        let mut role_counts: BTreeMap<StaffRole, usize> =
            StaffRole::iter().map(|role| (role, 0)).collect();
        for member in staff {
            *role_counts.entry(member.role).or_default() += 1;
        }

        let mut recent_staff = staff.to_vec();
        // `None` sorts before `Some`, so undated records end up last.
        recent_staff.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        recent_staff.truncate(RECENT_STAFF_LIMIT);

        Self {
            organization_count: organizations.len(),
            staff_count: staff.len(),
            role_counts,
            recent_staff,
            connected,
        }
    }
}

const CSV_HEADERS: [&str; 5] = ["Name", "Address", "Email", "Phone", "Created At"];

/// Organizations as CSV: a header row, then one quoted row per record.
/// Dates are `YYYY-MM-DD`.
pub fn organizations_csv(organizations: &[Organization]) -> String {
    let mut lines = Vec::with_capacity(organizations.len() + 1);
    lines.push(CSV_HEADERS.join(","));
    for org in organizations {
        let created = org
            .created_at
            .map(|t| t.format("%Y-%m-%d").to_string())
            .unwrap_or_default();
        let row = [
            org.name.as_str(),
            org.address.as_deref().unwrap_or_default(),
            org.email.as_deref().unwrap_or_default(),
            org.phone.as_deref().unwrap_or_default(),
            created.as_str(),
        ]
        .map(quote);
        lines.push(row.join(","));
    }
    lines.join("\n")
}

fn quote(field: &str) -> String {
    format!("\"{}\"", field.replace('"', "\"\""))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::{TimeZone, Utc};
    use orgsync_api::{EntityId, OrganizationRef};
    use pretty_assertions::assert_eq;

    use super::*;

    fn org(id: &str, name: &str) -> Organization {
        Organization {
            id: EntityId::from(id),
            name: name.into(),
            address: None,
            phone: None,
            email: None,
            created_at: None,
            updated_at: None,
        }
    }

    fn member(id: &str, role: StaffRole, day: Option<u32>) -> Staff {
        Staff {
            id: EntityId::from(id),
            first_name: id.to_uppercase(),
            last_name: "Tester".into(),
            email: format!("{id}@acme.test"),
            phone: String::new(),
            organization: OrganizationRef::Id(EntityId::from("o1")),
            role,
            created_at: day.map(|d| Utc.with_ymd_and_hms(2024, 3, d, 9, 0, 0).unwrap()),
            updated_at: None,
        }
    }

    #[test]
    fn dashboard_counts_roles_and_picks_recent() {
        let staff = vec![
            member("a", StaffRole::Developer, Some(1)),
            member("b", StaffRole::Developer, Some(7)),
            member("c", StaffRole::Manager, None),
            member("d", StaffRole::Developer, Some(3)),
            member("e", StaffRole::Developer, Some(5)),
            member("f", StaffRole::Manager, Some(2)),
            member("g", StaffRole::Developer, Some(6)),
        ];
        let summary = DashboardSummary::build(&[org("o1", "Acme")], &staff, true);

        assert_eq!(summary.organization_count, 1);
        assert_eq!(summary.staff_count, 7);
        assert_eq!(summary.role_counts[&StaffRole::Developer], 5);
        assert_eq!(summary.role_counts[&StaffRole::Manager], 2);
        assert_eq!(summary.role_counts[&StaffRole::Admin], 0);

        let recent: Vec<&str> = summary.recent_staff.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(recent, vec!["b", "g", "e", "d", "f"]);
        assert!(summary.connected);
    }

    #[test]
    fn csv_quotes_fields_and_formats_dates() {
        let mut acme = org("o1", "Acme \"West\"");
        acme.address = Some("1 Main St, Springfield".into());
        acme.email = Some("hi@acme.test".into());
        acme.created_at = Some(Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap());

        let csv = organizations_csv(&[acme, org("o2", "Globex")]);
        insta::assert_snapshot!(csv, @r###"
        Name,Address,Email,Phone,Created At
        "Acme ""West""","1 Main St, Springfield","hi@acme.test","","2024-03-01"
        "Globex","","","",""
        "###);
    }

    #[test]
    fn csv_of_nothing_is_just_headers() {
        assert_eq!(organizations_csv(&[]), "Name,Address,Email,Phone,Created At");
    }
}
