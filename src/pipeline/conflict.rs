//! Same-sender, same-thread conflict resolution.

use std::collections::BTreeMap;

use tracing::debug;

use crate::pipeline::types::EmailRecord;

/// Collapses duplicates within a (sender, thread) group to the latest email.
pub struct ConflictResolver;

impl ConflictResolver {
    /// Map from superseded batch index to the index of the email that replaces it.
    ///
    /// The latest timestamp wins; equal timestamps fall to the later batch
    /// position. Different threads from the same sender never collapse.
    pub fn resolve<'a>(
        emails: impl IntoIterator<Item = (usize, &'a EmailRecord)>,
    ) -> BTreeMap<usize, usize> {
        let mut groups: BTreeMap<(String, &str), Vec<(usize, &EmailRecord)>> = BTreeMap::new();
        for (index, email) in emails {
            groups
                .entry((email.from.trim().to_lowercase(), email.thread_id.as_str()))
                .or_default()
                .push((index, email));
        }

        let mut superseded = BTreeMap::new();
        for ((sender, thread), members) in &groups {
            let Some(&(winner, _)) = members
                .iter()
                .max_by_key(|(index, email)| (email.timestamp, *index))
            else {
                continue;
            };
            for &(index, _) in members {
                if index != winner {
                    superseded.insert(index, winner);
                }
            }
            if members.len() > 1 {
                debug!(
                    sender = %sender,
                    thread = %thread,
                    kept = winner,
                    dropped = members.len() - 1,
                    "Collapsed same-thread duplicates"
                );
            }
        }
        superseded
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn make_email(id: &str, from: &str, thread: &str, hour: u32) -> EmailRecord {
        EmailRecord {
            message_id: id.into(),
            thread_id: thread.into(),
            from: from.into(),
            to: vec!["me@corp.com".into()],
            cc: vec![],
            bcc: vec![],
            subject: "Status".into(),
            body: "any update?".into(),
            timestamp: Utc.with_ymd_and_hms(2025, 3, 5, hour, 0, 0).unwrap(),
            thread_position: 1,
            labels: vec![],
            has_attachments: false,
            awaiting_reply: false,
        }
    }

    #[test]
    fn latest_in_thread_wins() {
        let emails = vec![
            make_email("m2", "a@x.com", "T", 10),
            make_email("m3", "a@x.com", "T", 11),
            make_email("m1", "a@x.com", "T", 9),
        ];
        let superseded = ConflictResolver::resolve(emails.iter().enumerate());
        assert_eq!(superseded.len(), 2);
        assert_eq!(superseded[&0], 1);
        assert_eq!(superseded[&2], 1);
        assert!(!superseded.contains_key(&1));
    }

    #[test]
    fn different_threads_are_kept() {
        let emails = vec![
            make_email("m1", "a@x.com", "T1", 9),
            make_email("m2", "a@x.com", "T2", 10),
        ];
        assert!(ConflictResolver::resolve(emails.iter().enumerate()).is_empty());
    }

    #[test]
    fn sender_match_ignores_case() {
        let emails = vec![
            make_email("m1", "A@X.com", "T", 9),
            make_email("m2", "a@x.com", "T", 10),
        ];
        let superseded = ConflictResolver::resolve(emails.iter().enumerate());
        assert_eq!(superseded[&0], 1);
    }

    #[test]
    fn equal_timestamps_keep_later_position() {
        let emails = vec![
            make_email("m1", "a@x.com", "T", 9),
            make_email("m2", "a@x.com", "T", 9),
        ];
        let superseded = ConflictResolver::resolve(emails.iter().enumerate());
        assert_eq!(superseded[&0], 1);
    }
}
