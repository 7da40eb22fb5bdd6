use std::collections::HashSet;
use std::hash::Hash;

use uuid::Uuid;

use crate::types::{Association, AssociationPair};

/// Distinct company and collection identifiers referenced by a batch payload.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReferencedIds {
    pub company_ids: HashSet<i64>,
    pub collection_ids: HashSet<Uuid>,
}

impl ReferencedIds {
    pub fn is_empty(&self) -> bool {
        self.company_ids.is_empty() && self.collection_ids.is_empty()
    }
}

/// Collects the distinct ids referenced anywhere in the payload.
pub fn referenced_ids(pairs: &[AssociationPair]) -> ReferencedIds {
    let mut ids = ReferencedIds::default();
    for pair in pairs {
        ids.company_ids.insert(pair.company_id);
        ids.collection_ids.insert(pair.collection_id);
    }
    ids
}

/// Returns the first requested id that was not found by the lookup pass.
///
/// Iteration order over the set is arbitrary; callers only rely on *some*
/// missing id being reported.
pub fn first_missing<T: Copy + Eq + Hash>(
    requested: &HashSet<T>,
    found: &HashSet<T>,
) -> Option<T> {
    requested.iter().find(|id| !found.contains(*id)).copied()
}

/// Plans the pairs to insert, in payload order.
///
/// A pair is skipped when it is already stored or when an earlier copy of it
/// appears in the same payload, so one batch never produces duplicate rows.
pub fn plan_creations(
    requested: &[AssociationPair],
    existing: &HashSet<AssociationPair>,
) -> Vec<AssociationPair> {
    let mut planned: HashSet<AssociationPair> = HashSet::new();
    requested
        .iter()
        .filter(|pair| !existing.contains(*pair) && planned.insert(**pair))
        .copied()
        .collect()
}

/// Filters the stored associations down to those whose pair was requested.
///
/// Requested pairs that are not stored simply never show up, which is what
/// makes batch delete idempotent for the caller.
pub fn plan_deletions(
    existing: Vec<Association>,
    requested: &[AssociationPair],
) -> Vec<Association> {
    let targets: HashSet<AssociationPair> = requested.iter().copied().collect();
    existing
        .into_iter()
        .filter(|association| targets.contains(&association.pair()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collection(n: u128) -> Uuid {
        Uuid::from_u128(n)
    }

    fn pair(company_id: i64, collection: Uuid) -> AssociationPair {
        AssociationPair {
            company_id,
            collection_id: collection,
        }
    }

    #[test]
    fn referenced_ids_deduplicates() {
        let a = collection(1);
        let b = collection(2);
        let ids = referenced_ids(&[pair(1, a), pair(1, b), pair(2, a), pair(1, a)]);

        assert_eq!(ids.company_ids, HashSet::from([1, 2]));
        assert_eq!(ids.collection_ids, HashSet::from([a, b]));
    }

    #[test]
    fn referenced_ids_of_empty_payload_is_empty() {
        assert!(referenced_ids(&[]).is_empty());
    }

    #[test]
    fn first_missing_reports_an_unfound_id() {
        let requested = HashSet::from([1_i64, 2, 3]);
        let found = HashSet::from([1_i64, 3]);
        assert_eq!(first_missing(&requested, &found), Some(2));
    }

    #[test]
    fn first_missing_is_none_when_all_found() {
        let requested = HashSet::from([1_i64, 2]);
        let found = HashSet::from([1_i64, 2, 9]);
        assert_eq!(first_missing(&requested, &found), None);
    }

    #[test]
    fn plan_creations_skips_stored_pairs() {
        let a = collection(1);
        let stored = HashSet::from([pair(1, a)]);
        let planned = plan_creations(&[pair(1, a), pair(2, a)], &stored);
        assert_eq!(planned, vec![pair(2, a)]);
    }

    #[test]
    fn plan_creations_deduplicates_within_the_batch() {
        let a = collection(1);
        let planned = plan_creations(&[pair(1, a), pair(1, a), pair(2, a)], &HashSet::new());
        assert_eq!(planned, vec![pair(1, a), pair(2, a)]);
    }

    #[test]
    fn plan_creations_preserves_payload_order() {
        let a = collection(1);
        let b = collection(2);
        let planned = plan_creations(&[pair(3, b), pair(1, a), pair(2, a)], &HashSet::new());
        assert_eq!(planned, vec![pair(3, b), pair(1, a), pair(2, a)]);
    }

    #[test]
    fn plan_deletions_keeps_only_targeted_pairs() {
        let a = collection(1);
        let b = collection(2);
        let stored = vec![
            Association {
                id: 10,
                company_id: 1,
                collection_id: a,
            },
            Association {
                id: 11,
                company_id: 1,
                collection_id: b,
            },
        ];

        let victims = plan_deletions(stored, &[pair(1, a), pair(7, a)]);
        assert_eq!(victims.len(), 1);
        assert_eq!(victims[0].id, 10);
    }

    #[test]
    fn plan_deletions_of_absent_pair_is_empty() {
        let victims = plan_deletions(Vec::new(), &[pair(1, collection(1))]);
        assert!(victims.is_empty());
    }
}
