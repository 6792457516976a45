//! Row selection shared by the event log backends
//!
//! The in-memory log applies these to every row. The Postgres log uses them
//! whenever a filter carries a pattern, after fetching the candidates that
//! survive the exact predicates, so both backends answer a query identically.

use chrono::{DateTime, Utc};
use std::cmp::Ordering;
use std::collections::HashMap;

use crate::envelope::Envelope;
use crate::identity::IdentityFilter;
use crate::payload::{API_VERSION_PATH, KIND_PATH, NAME_PATH};

const PRIMARY_OWNER_API_VERSION: &str = "metadata.ownerReferences.0.apiVersion";
const PRIMARY_OWNER_KIND: &str = "metadata.ownerReferences.0.kind";
const PRIMARY_OWNER_NAME: &str = "metadata.ownerReferences.0.name";

/// Which payload fields a filter applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchTarget {
    /// The object the event describes
    Identity,
    /// The first entry of `metadata.ownerReferences`
    PrimaryOwner,
}

impl MatchTarget {
    fn paths(self) -> [&'static str; 3] {
        match self {
            Self::Identity => [API_VERSION_PATH, KIND_PATH, NAME_PATH],
            Self::PrimaryOwner => [
                PRIMARY_OWNER_API_VERSION,
                PRIMARY_OWNER_KIND,
                PRIMARY_OWNER_NAME,
            ],
        }
    }
}

pub fn matches(envelope: &Envelope, target: MatchTarget, filter: &IdentityFilter) -> bool {
    let p = &envelope.payload;
    let [api_version, kind, name] = target.paths();
    filter.matches(p.opt_str(api_version), p.opt_str(kind), p.opt_str(name))
}

/// Recency order: later time first, then greater id
pub fn by_recency(a: &Envelope, b: &Envelope) -> Ordering {
    b.time.cmp(&a.time).then_with(|| b.id.cmp(&a.id))
}

/// Most recent candidate with `time <= as_of`
pub fn latest<I>(candidates: I, as_of: Option<DateTime<Utc>>) -> Option<Envelope>
where
    I: IntoIterator<Item = Envelope>,
{
    candidates
        .into_iter()
        .filter(|e| as_of.map_or(true, |t| e.time <= t))
        .min_by(by_recency)
}

/// Keep the latest row per uid, then order by (uid, time desc) with uid-less rows last
pub fn latest_per_uid(candidates: Vec<Envelope>, limit: i64) -> Vec<Envelope> {
    let mut latest: HashMap<String, Envelope> = HashMap::new();
    let mut without_uid = Vec::new();

    for envelope in candidates {
        match envelope.uid().map(str::to_string) {
            Some(uid) => match latest.get(&uid) {
                Some(current) if by_recency(current, &envelope) != Ordering::Greater => {}
                _ => {
                    latest.insert(uid, envelope);
                }
            },
            None => without_uid.push(envelope),
        }
    }

    let mut keyed: Vec<Envelope> = latest.into_values().collect();
    keyed.sort_by(|a, b| a.uid().cmp(&b.uid()).then_with(|| by_recency(a, b)));
    without_uid.sort_by(by_recency);
    keyed.extend(without_uid);

    keyed.truncate(usize::try_from(limit).unwrap_or(0));
    keyed
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use event_bus::new_event;
    use serde_json::{json, Value};

    fn t(minutes: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap() + Duration::minutes(minutes)
    }

    fn envelope(id: &str, minutes: i64, data: Value) -> Envelope {
        Envelope::from_cloud_event(new_event(id, "t", "/test", t(minutes), data).unwrap()).unwrap()
    }

    #[test]
    fn test_word_boundary_pattern() {
        let pod = envelope(
            "p",
            0,
            json!({"apiVersion": "v1", "kind": "Pod", "metadata": {"name": "web-1"}}),
        );
        let filter = IdentityFilter::from_patterns(None, None, Some(r"\bweb\b")).unwrap();
        assert!(matches(&pod, MatchTarget::Identity, &filter));

        let named = IdentityFilter::from_patterns(None, None, Some("(?P<n>web)")).unwrap();
        assert!(matches(&pod, MatchTarget::Identity, &named));
        assert!(!matches(&pod, MatchTarget::PrimaryOwner, &named));
    }

    #[test]
    fn test_latest_respects_as_of_and_ties() {
        let rows = vec![
            envelope("a", 0, json!({})),
            envelope("c", 5, json!({})),
            envelope("b", 5, json!({})),
        ];

        assert_eq!(latest(rows.clone(), None).unwrap().id, "c");
        assert_eq!(latest(rows.clone(), Some(t(4))).unwrap().id, "a");
        assert!(latest(rows, Some(t(-1))).is_none());
    }
}
