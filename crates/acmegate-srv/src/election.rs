//! Leader-election gate: serializes certificate issuance across replicas.
//!
//! Every node in the cluster shares one DNS-01 provider namespace, so only
//! one of them may drive issuance for a zone at a time. The election
//! transport (typically a distributed key-value store's election primitive)
//! stays behind the [`Election`] trait; this module only consumes
//! "campaign, resolve on win".

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use tracing::{error, info, warn};

/// External leader-election primitive.
///
/// `campaign` resolves once this node is confirmed leader for `election`, or
/// fails if the campaign is abandoned or the transport errors. Losing is not
/// a state: a node that never wins stays parked in this call.
#[async_trait]
pub trait Election: Send + Sync {
    /// Contend for leadership of `election`, proposing `proposal`.
    async fn campaign(&self, election: &str, proposal: &str) -> crate::Result<()>;
}

/// Election primitive for single-node deployments: every campaign wins
/// immediately. Doubles as the test stand-in for the external transport.
#[derive(Debug, Default, Clone, Copy)]
pub struct StandaloneElection;

#[async_trait]
impl Election for StandaloneElection {
    async fn campaign(&self, _election: &str, _proposal: &str) -> crate::Result<()> {
        Ok(())
    }
}

/// Runs a callback at most once per leadership win.
///
/// Wins are numbered by a monotonic generation counter. If leadership flaps
/// and a newer campaign wins while an older callback is still running, the
/// older completion is logged as stale instead of being acted on, so two
/// overlapping issuance attempts can never both count.
pub struct ElectionGate<E> {
    election: E,
    name: String,
    proposal: String,
    generation: AtomicU64,
}

impl<E: Election> ElectionGate<E> {
    /// Wrap an election primitive for the named election.
    pub fn new(election: E, name: impl Into<String>, proposal: impl Into<String>) -> Self {
        Self {
            election,
            name: name.into(),
            proposal: proposal.into(),
            generation: AtomicU64::new(0),
        }
    }

    /// Current election generation; zero until the first win.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Run one campaign; on win, invoke `on_win` exactly once.
    ///
    /// A campaign failure propagates to the caller. An `on_win` error is
    /// logged and swallowed: issuance is not retried until the next campaign
    /// cycle or process restart.
    pub async fn campaign<F, Fut>(&self, on_win: F) -> crate::Result<()>
    where
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = crate::Result<()>> + Send,
    {
        info!(
            election = %self.name,
            proposal = %self.proposal,
            "campaigning for issuance leadership"
        );
        self.election.campaign(&self.name, &self.proposal).await?;

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        info!(election = %self.name, generation, "leadership won");

        let result = on_win().await;

        if self.generation.load(Ordering::SeqCst) != generation {
            warn!(
                election = %self.name,
                generation,
                "stale leadership callback completed after re-election, ignoring"
            );
            return Ok(());
        }

        if let Err(e) = result {
            error!(election = %self.name, generation, "leadership callback failed: {e}");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;
    use std::time::Duration;

    /// Election that always fails its campaign.
    struct BrokenElection;

    #[async_trait]
    impl Election for BrokenElection {
        async fn campaign(&self, election: &str, _proposal: &str) -> crate::Result<()> {
            Err(crate::AcmeSrvError::Election(format!(
                "campaign lost for {election}"
            )))
        }
    }

    #[tokio::test]
    async fn test_callback_runs_exactly_once_per_win() {
        let gate = ElectionGate::new(StandaloneElection, "issuance", "node1");
        let calls = Arc::new(AtomicUsize::new(0));

        let counted = Arc::clone(&calls);
        gate.campaign(move || async move {
            counted.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .await
        .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(gate.generation(), 1);
    }

    #[tokio::test]
    async fn test_callback_error_is_swallowed() {
        let gate = ElectionGate::new(StandaloneElection, "issuance", "node1");
        let result = gate
            .campaign(|| async { Err(crate::AcmeSrvError::Election("boom".into())) })
            .await;
        // The campaign itself succeeded; only the callback failed.
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_campaign_failure_propagates() {
        let gate = ElectionGate::new(BrokenElection, "issuance", "node1");
        let calls = Arc::new(AtomicUsize::new(0));

        let counted = Arc::clone(&calls);
        let result = gate
            .campaign(move || async move {
                counted.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .await;

        assert!(result.is_err());
        // The callback never ran.
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(gate.generation(), 0);
    }

    #[tokio::test]
    async fn test_generation_increments_per_win() {
        let gate = ElectionGate::new(StandaloneElection, "issuance", "node1");
        gate.campaign(|| async { Ok(()) }).await.unwrap();
        gate.campaign(|| async { Ok(()) }).await.unwrap();
        assert_eq!(gate.generation(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_overlapping_wins_leave_consistent_generation() {
        // A slow callback overlapping a fast re-election completes as stale;
        // both campaigns still resolve cleanly.
        let gate = Arc::new(ElectionGate::new(StandaloneElection, "issuance", "node1"));

        let slow_gate = Arc::clone(&gate);
        let slow = tokio::spawn(async move {
            slow_gate
                .campaign(|| async {
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    Ok(())
                })
                .await
        });

        tokio::time::sleep(Duration::from_millis(10)).await;
        gate.campaign(|| async { Ok(()) }).await.unwrap();

        slow.await.unwrap().unwrap();
        assert_eq!(gate.generation(), 2);
    }
}
