use std::collections::BTreeSet;

use super::times::TimelineEntry;
use crate::models::ticket::RawComment;

/// Union of everyone touching a ticket, as lower-cased identifiers:
/// assignee, reporter, comment authors (whitespace stripped), timeline
/// users, and escalation / permitted-user lists. Comment authors keep the
/// original collision behavior: two humans whose display names concatenate
/// identically become one identifier.
pub fn extract_people_involved(
    assignee: Option<&str>,
    reporter: Option<&str>,
    comments: &[RawComment],
    timeline: &[TimelineEntry],
    escalation_lists: &[Vec<String>],
) -> BTreeSet<String> {
    let mut people = BTreeSet::new();

    for name in [assignee, reporter].into_iter().flatten() {
        let lower = name.trim().to_lowercase();
        if !lower.is_empty() {
            people.insert(lower);
        }
    }

    for comment in comments {
        let stripped: String = comment
            .author
            .to_lowercase()
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect();
        if !stripped.is_empty() {
            people.insert(stripped);
        }
    }

    for entry in timeline {
        if !entry.user.is_empty() {
            people.insert(entry.user.clone());
        }
    }

    for list in escalation_lists {
        for name in list {
            let lower = name.trim().to_lowercase();
            if !lower.is_empty() {
                people.insert(lower);
            }
        }
    }

    people
}
