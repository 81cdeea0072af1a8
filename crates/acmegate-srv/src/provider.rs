//! Zone-scoped challenge record store.
//!
//! The store is the DNS-01 seam: the external certificate manager stages
//! challenge TXT tokens here, and the challenge responder reads them back
//! when the validation server queries. Records are keyed by zone name, with
//! the challenge zone (`_acme-challenge.<domain>.`) acting as the key for
//! staged tokens.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use hickory_proto::rr::RecordType;

/// A single staged DNS record.
///
/// Immutable once created; equality is structural over
/// `(rtype, name, data, ttl)`, which [`ChallengeProvider::delete`] relies on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChallengeRecord {
    /// Fully qualified record name.
    pub name: String,
    /// Record type.
    pub rtype: RecordType,
    /// Record payload (the challenge token for TXT records).
    pub data: String,
    /// Time-to-live.
    pub ttl: Duration,
}

impl ChallengeRecord {
    /// Convenience constructor for a TXT challenge record.
    pub fn txt(name: impl Into<String>, data: impl Into<String>, ttl: Duration) -> Self {
        Self {
            name: name.into(),
            rtype: RecordType::TXT,
            data: data.into(),
            ttl,
        }
    }
}

/// Staging interface shared between the external certificate manager (which
/// writes challenge tokens) and the challenge responder (which reads them).
#[async_trait]
pub trait DnsProvider: Send + Sync {
    /// Append `records` to `zone`, returning the full accumulated set for
    /// the zone, not just the newly appended tail.
    async fn append_records(
        &self,
        zone: &str,
        records: Vec<ChallengeRecord>,
    ) -> crate::Result<Vec<ChallengeRecord>>;

    /// Delete every stored record structurally equal to one of `records`,
    /// returning the input records that matched.
    async fn delete_records(
        &self,
        zone: &str,
        records: Vec<ChallengeRecord>,
    ) -> crate::Result<Vec<ChallengeRecord>>;

    /// All records currently staged for `zone`.
    async fn get_records(&self, zone: &str) -> crate::Result<Vec<ChallengeRecord>>;
}

/// In-memory, zone-keyed record store.
///
/// One mutex guards the whole map, making every operation atomic relative to
/// the others across all zones. Challenge traffic is a handful of queries
/// plus occasional issuance writes, so a single lock wins over per-zone
/// sharding.
///
/// Zone entries are created lazily on first append and never removed; the
/// set of zones under management is static and small.
#[derive(Debug, Default)]
pub struct ChallengeProvider {
    zones: Mutex<HashMap<String, Vec<ChallengeRecord>>>,
}

impl ChallengeProvider {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append records to a zone, creating the zone entry on first write.
    ///
    /// Returns the full accumulated set for the zone. Callers that want only
    /// the new records must track the pre-append length themselves. Record
    /// contents are not validated and duplicates are legal.
    pub fn append(&self, zone: &str, records: Vec<ChallengeRecord>) -> Vec<ChallengeRecord> {
        let mut zones = self.lock();
        let entries = zones.entry(zone.to_string()).or_default();
        entries.extend(records);
        entries.clone()
    }

    /// Delete stored records structurally equal to any of `records`.
    ///
    /// A zone that was never written returns an empty result without error.
    /// The surviving set is rebuilt in a single pass so every stored entry is
    /// visited exactly once, no matter how many are removed. The returned
    /// records come from the input list (every input record that matched a
    /// removed entry), so their count is not necessarily the remove count.
    pub fn delete(&self, zone: &str, records: &[ChallengeRecord]) -> Vec<ChallengeRecord> {
        let mut zones = self.lock();
        let Some(entries) = zones.get_mut(zone) else {
            return Vec::new();
        };
        let mut deleted = Vec::new();
        entries.retain(|entry| {
            let matched: Vec<ChallengeRecord> =
                records.iter().filter(|r| **r == *entry).cloned().collect();
            if matched.is_empty() {
                true
            } else {
                deleted.extend(matched);
                false
            }
        });
        deleted
    }

    /// All records for a zone.
    ///
    /// A zone that was never written is an error; a zone whose records were
    /// all deleted returns an empty set.
    pub fn get(&self, zone: &str) -> crate::Result<Vec<ChallengeRecord>> {
        self.lock()
            .get(zone)
            .cloned()
            .ok_or_else(|| crate::AcmeSrvError::RecordsNotFound(zone.to_string()))
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Vec<ChallengeRecord>>> {
        self.zones.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl DnsProvider for ChallengeProvider {
    async fn append_records(
        &self,
        zone: &str,
        records: Vec<ChallengeRecord>,
    ) -> crate::Result<Vec<ChallengeRecord>> {
        Ok(self.append(zone, records))
    }

    async fn delete_records(
        &self,
        zone: &str,
        records: Vec<ChallengeRecord>,
    ) -> crate::Result<Vec<ChallengeRecord>> {
        Ok(self.delete(zone, &records))
    }

    async fn get_records(&self, zone: &str) -> crate::Result<Vec<ChallengeRecord>> {
        self.get(zone)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn record(data: &str) -> ChallengeRecord {
        ChallengeRecord::txt("_acme-challenge.example.org.", data, Duration::from_secs(60))
    }

    fn records(n: usize) -> Vec<ChallengeRecord> {
        (0..n).map(|i| record(&format!("tok{i}"))).collect()
    }

    #[test]
    fn test_append_returns_accumulated_set() {
        let provider = ChallengeProvider::new();
        let first = provider.append("zone.", records(2));
        assert_eq!(first.len(), 2);

        // The second append returns old + new, in order.
        let second = provider.append("zone.", vec![record("tok9")]);
        assert_eq!(second.len(), 3);
        assert_eq!(second[0].data, "tok0");
        assert_eq!(second[1].data, "tok1");
        assert_eq!(second[2].data, "tok9");
    }

    #[test]
    fn test_append_then_get_preserves_order() {
        let provider = ChallengeProvider::new();
        provider.append("zone.", records(5));
        let stored = provider.get("zone.").unwrap();
        let data: Vec<&str> = stored.iter().map(|r| r.data.as_str()).collect();
        assert_eq!(data, vec!["tok0", "tok1", "tok2", "tok3", "tok4"]);
    }

    #[test]
    fn test_get_unknown_zone_fails() {
        let provider = ChallengeProvider::new();
        let err = provider.get("missing.").unwrap_err();
        assert!(matches!(err, crate::AcmeSrvError::RecordsNotFound(_)));
    }

    #[test]
    fn test_get_emptied_zone_returns_empty() {
        let provider = ChallengeProvider::new();
        provider.append("zone.", records(1));
        provider.delete("zone.", &records(1));
        // The zone entry survives its last record.
        assert!(provider.get("zone.").unwrap().is_empty());
    }

    #[test]
    fn test_delete_on_unknown_zone_is_empty() {
        let provider = ChallengeProvider::new();
        let deleted = provider.delete("missing.", &records(2));
        assert!(deleted.is_empty());
    }

    #[test]
    fn test_delete_removes_structural_matches() {
        let provider = ChallengeProvider::new();
        provider.append("zone.", records(3));

        let deleted = provider.delete("zone.", &[record("tok1")]);
        assert_eq!(deleted, vec![record("tok1")]);

        let remaining = provider.get("zone.").unwrap();
        assert_eq!(remaining, vec![record("tok0"), record("tok2")]);
    }

    #[test]
    fn test_delete_is_idempotent_once_exhausted() {
        let provider = ChallengeProvider::new();
        provider.append("zone.", records(3));

        provider.delete("zone.", &[record("tok1")]);
        let second = provider.delete("zone.", &[record("tok1")]);
        assert!(second.is_empty());
        assert_eq!(provider.get("zone.").unwrap().len(), 2);
    }

    #[test]
    fn test_delete_removes_adjacent_duplicates() {
        // Duplicate stored entries next to each other must both go; an
        // index-compensation bug would silently skip the second one.
        let provider = ChallengeProvider::new();
        provider.append(
            "zone.",
            vec![record("dup"), record("dup"), record("other")],
        );

        let deleted = provider.delete("zone.", &[record("dup")]);
        assert_eq!(deleted.len(), 2);
        assert_eq!(provider.get("zone.").unwrap(), vec![record("other")]);
    }

    #[test]
    fn test_delete_ttl_mismatch_is_not_a_match() {
        let provider = ChallengeProvider::new();
        provider.append("zone.", vec![record("tok")]);

        let mut wrong_ttl = record("tok");
        wrong_ttl.ttl = Duration::from_secs(30);
        let deleted = provider.delete("zone.", &[wrong_ttl]);
        assert!(deleted.is_empty());
        assert_eq!(provider.get("zone.").unwrap().len(), 1);
    }

    #[test]
    fn test_trait_surface_matches_inherent_ops() {
        let provider = ChallengeProvider::new();
        tokio_test::block_on(async {
            let appended = provider
                .append_records("zone.", records(2))
                .await
                .unwrap();
            assert_eq!(appended.len(), 2);

            let got = provider.get_records("zone.").await.unwrap();
            assert_eq!(got, appended);

            let deleted = provider
                .delete_records("zone.", vec![record("tok0")])
                .await
                .unwrap();
            assert_eq!(deleted, vec![record("tok0")]);
        });
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_appends_do_not_cross_zones() {
        let provider = Arc::new(ChallengeProvider::new());

        let mut zones = Vec::new();
        for _ in 0..3 {
            let zone = uuid::Uuid::new_v4().to_string();
            let recs: Vec<ChallengeRecord> = (0..5)
                .map(|_| {
                    ChallengeRecord::txt(
                        uuid::Uuid::new_v4().to_string(),
                        uuid::Uuid::new_v4().to_string(),
                        Duration::from_secs(60),
                    )
                })
                .collect();
            zones.push((zone, recs));
        }

        let mut handles = Vec::new();
        for (zone, recs) in &zones {
            let provider = Arc::clone(&provider);
            let zone = zone.clone();
            let recs = recs.clone();
            handles.push(tokio::spawn(async move {
                let full = provider.append_records(&zone, recs.clone()).await.unwrap();
                assert_eq!(full, recs);
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        // Each zone observes exactly its own records, in append order.
        for (zone, recs) in &zones {
            let stored = provider.get_records(zone).await.unwrap();
            assert_eq!(&stored, recs);
        }
    }
}
