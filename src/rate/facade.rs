// SPDX-License-Identifier: MIT
//! Ordered throttler set.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::error::Error;
use crate::id::PrId;
use crate::metrics::SharedEmitter;

use super::throttler::Throttle;

/// Runs several throttlers in sequence and short-circuits on the first one
/// that throttles, emitting a metric naming the throttler and key that fired.
pub struct ThrottleFacade {
    throttlers: Vec<Arc<dyn Throttle>>,
    metrics: SharedEmitter,
}

impl ThrottleFacade {
    pub fn new(metrics: SharedEmitter, throttlers: Vec<Arc<dyn Throttle>>) -> Self {
        Self {
            throttlers,
            metrics,
        }
    }
}

#[async_trait]
impl Throttle for ThrottleFacade {
    async fn should_throttle(&self, id: &PrId) -> Result<(), Error> {
        for throttler in &self.throttlers {
            if let Err(err) = throttler.should_throttle(id).await {
                warn!(
                    throttler = throttler.name(),
                    key = %throttler.key(id),
                    %err,
                    "request throttled"
                );
                let mut tags = id.to_tags();
                tags.push(format!("throttler:{}", throttler.name()));
                tags.push(format!("throttleKey:{}", throttler.key(id)));
                self.metrics.emit_dist("throttledPRs", 1.0, &tags);
                return Err(err);
            }
            debug!(throttler = throttler.name(), key = %throttler.key(id), "not throttled");
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "facade"
    }

    fn key(&self, _id: &PrId) -> String {
        "facade".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::CaptureEmitter;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    fn pr() -> PrId {
        PrId {
            owner: "acme".into(),
            repo: "widgets".into(),
            number: 7,
            node_id: "n7".into(),
            repo_full_name: "acme/widgets".into(),
            author: "alice".into(),
            url: "https://git.example.com/acme/widgets/pull/7".into(),
        }
    }

    struct FakeThrottle {
        name: &'static str,
        throttle: bool,
        calls: AtomicU32,
    }

    impl FakeThrottle {
        fn new(name: &'static str, throttle: bool) -> Arc<Self> {
            Arc::new(Self {
                name,
                throttle,
                calls: AtomicU32::new(0),
            })
        }
    }

    #[async_trait]
    impl Throttle for FakeThrottle {
        async fn should_throttle(&self, _id: &PrId) -> Result<(), Error> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.throttle {
                Err(Error::TooManyRequests {
                    message: format!("{} throttled", self.name),
                    retry_after: Duration::from_secs(3),
                })
            } else {
                Ok(())
            }
        }

        fn name(&self) -> &str {
            self.name
        }

        fn key(&self, _id: &PrId) -> String {
            format!("{}/key", self.name)
        }
    }

    #[tokio::test]
    async fn all_clear_passes() {
        let a = FakeThrottle::new("author", false);
        let b = FakeThrottle::new("repo", false);
        let facade = ThrottleFacade::new(
            Arc::new(CaptureEmitter::new()),
            vec![a.clone(), b.clone()],
        );

        facade.should_throttle(&pr()).await.expect("clear");
        assert_eq!(a.calls.load(Ordering::SeqCst), 1);
        assert_eq!(b.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn short_circuits_on_first_throttle() {
        let a = FakeThrottle::new("author", true);
        let b = FakeThrottle::new("repo", false);
        let metrics = Arc::new(CaptureEmitter::new());
        let facade = ThrottleFacade::new(metrics.clone(), vec![a.clone(), b.clone()]);

        let err = facade.should_throttle(&pr()).await.expect_err("throttled");
        assert!(matches!(err, Error::TooManyRequests { .. }));
        // The second throttler is never consulted.
        assert_eq!(b.calls.load(Ordering::SeqCst), 0);

        let throttled = metrics.emitted();
        assert_eq!(throttled.len(), 1);
        assert_eq!(throttled[0].name, "throttledPRs");
        assert!(throttled[0].tags.contains(&"throttler:author".to_string()));
        assert!(throttled[0].tags.contains(&"throttleKey:author/key".to_string()));
    }
}
