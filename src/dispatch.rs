// SPDX-License-Identifier: MIT
//! Webhook delivery dispatch.
//!
//! The transport layer hands every verified delivery here. The dispatcher
//! decides whether the delivery concerns us at all — pull_request events on
//! public repositories that pass the repo filter — and forwards the rest of
//! the work to the [`EventHandler`].

use std::sync::Arc;

use tracing::{debug, info_span, Instrument};

use crate::error::Error;
use crate::filter::EventFilter;
use crate::github::GhEvent;
use crate::handler::EventHandler;
use crate::metrics::SharedEmitter;
use crate::ReqCtx;

pub const EVENT_PULL_REQUEST: &str = "pull_request";

/// Actions that can change a PR's review-worthiness.
pub const HANDLED_ACTIONS: &[&str] = &[
    "opened",
    "reopened",
    "synchronize",
    "ready_for_review",
    "edited",
    "labeled",
    "unlabeled",
];

pub struct Dispatcher {
    filter: Arc<dyn EventFilter>,
    handler: Arc<EventHandler>,
    metrics: SharedEmitter,
}

impl Dispatcher {
    pub fn new(
        filter: Arc<dyn EventFilter>,
        handler: Arc<EventHandler>,
        metrics: SharedEmitter,
    ) -> Self {
        Self {
            filter,
            handler,
            metrics,
        }
    }

    /// Handle one delivery. Deliveries that are not in scope are dropped
    /// with `Ok(())` — a webhook endpoint must ack what it ignores.
    pub async fn dispatch(&self, ctx: &ReqCtx, event: &GhEvent) -> Result<(), Error> {
        if event.event != EVENT_PULL_REQUEST {
            debug!(event = %event.event, "ignoring non-pull_request event");
            return Ok(());
        }
        if !HANDLED_ACTIONS.contains(&event.action.as_str()) {
            debug!(action = %event.action, "ignoring pull_request action");
            return Ok(());
        }
        // Private and internal repositories are out of scope for automated
        // approval.
        if !event.repository.visibility.eq_ignore_ascii_case("public") {
            debug!(
                repo = %event.repository.full_name,
                visibility = %event.repository.visibility,
                "ignoring non-public repository"
            );
            return Ok(());
        }

        let id = event.to_id();
        if !self.filter.should_handle(&id).await? {
            debug!(pr = %id, "delivery filtered out");
            self.metrics.emit_dist("skippedPRs", 1.0, &id.to_tags());
            return Ok(());
        }

        self.metrics.emit_dist("dispatchedPRs", 1.0, &id.to_tags());
        let span = info_span!(
            "handle_delivery",
            pr = %id,
            action = %event.action,
            delivery = %ctx.delivery_id
        );
        self.handler.handle(ctx, event).instrument(span).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::github::{PullRequestDetails, RepositoryDetails};
    use crate::id::PrId;
    use crate::metrics::CaptureEmitter;
    use crate::policy::input::BareInputFactory;
    use crate::policy::report::InMemoryReportStore;
    use crate::policy::types::Decision;
    use crate::policy::{Evaluator, Policy};
    use crate::review::base::tests::FakeApi;
    use crate::review::BaseReviewer;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct CountingPolicy(Arc<AtomicU32>);

    #[async_trait]
    impl Policy for CountingPolicy {
        async fn evaluate(
            &self,
            _ctx: &ReqCtx,
            _module: &str,
            _input: &crate::policy::input::DecisionInput,
        ) -> Result<Decision, Error> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(Decision::default())
        }
    }

    struct AllowAll;

    #[async_trait]
    impl EventFilter for AllowAll {
        async fn should_handle(&self, _id: &PrId) -> Result<bool, Error> {
            Ok(true)
        }
    }

    struct DenyAll;

    #[async_trait]
    impl EventFilter for DenyAll {
        async fn should_handle(&self, _id: &PrId) -> Result<bool, Error> {
            Ok(false)
        }
    }

    fn event(event_name: &str, action: &str, visibility: &str) -> GhEvent {
        GhEvent {
            event: event_name.into(),
            action: action.into(),
            pull_request: PullRequestDetails {
                number: 2,
                node_id: "n2".into(),
                author: "alice".into(),
                html_url: "https://git.example.com/acme/widgets/pull/2".into(),
                ..Default::default()
            },
            repository: RepositoryDetails {
                name: "widgets".into(),
                owner: "acme".into(),
                full_name: "acme/widgets".into(),
                default_branch: "main".into(),
                visibility: visibility.into(),
                ..Default::default()
            },
            organization: None,
        }
    }

    fn ctx() -> ReqCtx {
        ReqCtx {
            request_id: "req-1".into(),
            delivery_id: "del-1".into(),
        }
    }

    fn dispatcher(
        filter: Arc<dyn EventFilter>,
        evaluations: Arc<AtomicU32>,
    ) -> Dispatcher {
        let evaluator = Evaluator::new(
            Arc::new(CountingPolicy(evaluations)),
            Arc::new(BareInputFactory),
            Arc::new(InMemoryReportStore::default()),
            vec!["docs".into()],
            30,
            "v1",
            Arc::new(CaptureEmitter::new()),
        );
        let reviewer = Arc::new(BaseReviewer::new(
            Arc::new(FakeApi::default()),
            "svc-revbot".into(),
            Arc::new(CaptureEmitter::new()),
        ));
        Dispatcher::new(
            filter,
            Arc::new(EventHandler::new(evaluator, reviewer)),
            Arc::new(CaptureEmitter::new()),
        )
    }

    #[tokio::test]
    async fn non_pull_request_events_are_acked_and_dropped() {
        let evals = Arc::new(AtomicU32::new(0));
        let d = dispatcher(Arc::new(AllowAll), evals.clone());

        d.dispatch(&ctx(), &event("push", "created", "public"))
            .await
            .expect("ack");
        d.dispatch(&ctx(), &event("pull_request", "closed", "public"))
            .await
            .expect("ack");
        assert_eq!(evals.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn private_repositories_are_dropped() {
        let evals = Arc::new(AtomicU32::new(0));
        let d = dispatcher(Arc::new(AllowAll), evals.clone());

        d.dispatch(&ctx(), &event("pull_request", "opened", "private"))
            .await
            .expect("ack");
        assert_eq!(evals.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn filtered_repositories_are_dropped() {
        let evals = Arc::new(AtomicU32::new(0));
        let d = dispatcher(Arc::new(DenyAll), evals.clone());

        d.dispatch(&ctx(), &event("pull_request", "opened", "public"))
            .await
            .expect("ack");
        assert_eq!(evals.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn in_scope_delivery_is_evaluated() {
        let evals = Arc::new(AtomicU32::new(0));
        let d = dispatcher(Arc::new(AllowAll), evals.clone());

        d.dispatch(&ctx(), &event("pull_request", "synchronize", "public"))
            .await
            .expect("handle");
        assert_eq!(evals.load(Ordering::SeqCst), 1);
    }
}
