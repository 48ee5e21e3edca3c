// SPDX-License-Identifier: MIT
//! Per-PR mutual exclusion.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tracing::warn;

use crate::error::Error;
use crate::id::PrId;
use crate::lock::{Lease, LockOptions, Locker};

use super::{ApproveOptions, Reviewer};

/// Serializes all mutating actions on a PR behind a distributed lock.
///
/// Concurrent deliveries for the same PR (synchronize + labeled, or a
/// redelivery race) would otherwise interleave their list/act sequences and
/// defeat deduplication. Acquisition failure fails closed: no mutation is
/// attempted. While the delegate runs, a heartbeat task refreshes the lease
/// on the configured period so a slow action chain does not outlive its
/// lease and lose exclusivity mid-flight. Release failure is logged only,
/// lease expiry reclaims the lock either way.
pub struct MutexReviewer {
    next: Arc<dyn Reviewer>,
    locker: Arc<dyn Locker>,
    opts: LockOptions,
}

impl MutexReviewer {
    pub fn new(next: Arc<dyn Reviewer>, locker: Arc<dyn Locker>, opts: LockOptions) -> Self {
        Self { next, locker, opts }
    }

    async fn locked<F, Fut>(&self, id: &PrId, op: F) -> Result<(), Error>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<(), Error>>,
    {
        let lease = self
            .locker
            .acquire(&id.lock_key(), &self.opts)
            .await
            .map_err(|err| Error::fault(format!("acquiring lock for {id}"), err))?;

        let heartbeat = self.spawn_heartbeat(&lease);
        let result = op().await;
        heartbeat.abort();

        if let Err(err) = self.locker.release(lease).await {
            warn!(pr = %id, error = %err, "failed to release PR lock");
        }
        result
    }

    /// Refresh the lease every heartbeat period until aborted.
    fn spawn_heartbeat(&self, lease: &Lease) -> JoinHandle<()> {
        let locker = Arc::clone(&self.locker);
        let lease = lease.clone();
        let period = self.opts.heartbeat;
        let duration = self.opts.lease;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                match locker.refresh(&lease, duration).await {
                    Ok(true) => {}
                    Ok(false) => {
                        warn!(key = %lease.key, "lease lost while refreshing");
                        return;
                    }
                    Err(err) => {
                        warn!(key = %lease.key, error = %err, "failed to refresh lease");
                    }
                }
            }
        })
    }
}

#[async_trait]
impl Reviewer for MutexReviewer {
    async fn approve(&self, id: &PrId, body: &str, opts: &ApproveOptions) -> Result<(), Error> {
        self.locked(id, || self.next.approve(id, body, opts)).await
    }

    async fn comment(&self, id: &PrId, body: &str) -> Result<(), Error> {
        self.locked(id, || self.next.comment(id, body)).await
    }

    async fn request_changes(&self, id: &PrId, body: &str) -> Result<(), Error> {
        self.locked(id, || self.next.request_changes(id, body)).await
    }

    async fn dismiss(&self, id: &PrId, message: &str) -> Result<(), Error> {
        self.locked(id, || self.next.dismiss(id, message)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lock::{InProcessLocker, Lease};
    use crate::review::base::tests::{approve_opts, pr};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    /// Reviewer that asserts it is never entered concurrently.
    #[derive(Default)]
    struct OverlapDetector {
        in_flight: AtomicU32,
        max_in_flight: AtomicU32,
        calls: AtomicU32,
    }

    impl OverlapDetector {
        async fn enter(&self) {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            self.calls.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl Reviewer for OverlapDetector {
        async fn approve(
            &self,
            _id: &PrId,
            _body: &str,
            _opts: &ApproveOptions,
        ) -> Result<(), Error> {
            self.enter().await;
            Ok(())
        }

        async fn comment(&self, _id: &PrId, _body: &str) -> Result<(), Error> {
            self.enter().await;
            Ok(())
        }

        async fn request_changes(&self, _id: &PrId, _body: &str) -> Result<(), Error> {
            self.enter().await;
            Ok(())
        }

        async fn dismiss(&self, _id: &PrId, _message: &str) -> Result<(), Error> {
            self.enter().await;
            Ok(())
        }
    }

    fn opts() -> LockOptions {
        LockOptions {
            lease: Duration::from_secs(5),
            heartbeat: Duration::from_millis(50),
            refresh_period: Duration::from_millis(5),
        }
    }

    #[tokio::test]
    async fn concurrent_actions_on_one_pr_are_serialized() {
        let detector = Arc::new(OverlapDetector::default());
        let reviewer = Arc::new(MutexReviewer::new(
            detector.clone(),
            Arc::new(InProcessLocker::new()),
            opts(),
        ));

        let mut tasks = Vec::new();
        for _ in 0..4 {
            let reviewer = reviewer.clone();
            tasks.push(tokio::spawn(async move {
                reviewer.approve(&pr(), "lgtm", &approve_opts(false)).await
            }));
        }
        for task in tasks {
            task.await.expect("join").expect("approve");
        }

        assert_eq!(detector.calls.load(Ordering::SeqCst), 4);
        assert_eq!(detector.max_in_flight.load(Ordering::SeqCst), 1);
    }

    /// Reviewer that holds the lock longer than one lease duration.
    struct SlowAction(Duration);

    impl SlowAction {
        async fn run(&self) -> Result<(), Error> {
            tokio::time::sleep(self.0).await;
            Ok(())
        }
    }

    #[async_trait]
    impl Reviewer for SlowAction {
        async fn approve(
            &self,
            _id: &PrId,
            _body: &str,
            _opts: &ApproveOptions,
        ) -> Result<(), Error> {
            self.run().await
        }

        async fn comment(&self, _id: &PrId, _body: &str) -> Result<(), Error> {
            self.run().await
        }

        async fn request_changes(&self, _id: &PrId, _body: &str) -> Result<(), Error> {
            self.run().await
        }

        async fn dismiss(&self, _id: &PrId, _message: &str) -> Result<(), Error> {
            self.run().await
        }
    }

    #[tokio::test]
    async fn heartbeat_keeps_the_lease_through_a_slow_action() {
        let locker = Arc::new(InProcessLocker::new());
        let opts = LockOptions {
            lease: Duration::from_millis(50),
            heartbeat: Duration::from_millis(10),
            refresh_period: Duration::from_millis(5),
        };
        let reviewer = Arc::new(MutexReviewer::new(
            Arc::new(SlowAction(Duration::from_millis(150))),
            locker.clone(),
            opts.clone(),
        ));

        let task = {
            let reviewer = reviewer.clone();
            tokio::spawn(
                async move { reviewer.approve(&pr(), "lgtm", &approve_opts(false)).await },
            )
        };

        // Well past the unrefreshed 50ms expiry. The heartbeat must have
        // kept the lease, so a short-patience contender cannot steal it.
        tokio::time::sleep(Duration::from_millis(80)).await;
        let short = LockOptions {
            lease: Duration::from_millis(10),
            ..opts
        };
        assert!(locker.acquire(&pr().lock_key(), &short).await.is_err());

        task.await.expect("join").expect("approve");
        // Released on completion: the lock is free again.
        let lease = locker
            .acquire(&pr().lock_key(), &short)
            .await
            .expect("free after release");
        locker.release(lease).await.expect("release");
    }

    struct FailingLocker;

    #[async_trait]
    impl Locker for FailingLocker {
        async fn acquire(&self, key: &str, _opts: &LockOptions) -> anyhow::Result<Lease> {
            anyhow::bail!("lock table unavailable for {key}")
        }

        async fn refresh(&self, _lease: &Lease, _duration: Duration) -> anyhow::Result<bool> {
            Ok(false)
        }

        async fn release(&self, _lease: Lease) -> anyhow::Result<bool> {
            Ok(false)
        }
    }

    #[tokio::test]
    async fn acquisition_failure_fails_closed() {
        let detector = Arc::new(OverlapDetector::default());
        let reviewer = MutexReviewer::new(detector.clone(), Arc::new(FailingLocker), opts());

        let err = reviewer
            .approve(&pr(), "lgtm", &approve_opts(false))
            .await
            .expect_err("fail closed");
        assert!(matches!(err, Error::ServiceFault { .. }));
        assert_eq!(detector.calls.load(Ordering::SeqCst), 0);
    }
}
