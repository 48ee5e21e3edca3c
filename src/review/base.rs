// SPDX-License-Identifier: MIT
//! The bottom of the reviewer chain: actual platform writes.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::error::Error;
use crate::github::{GithubApi, MergeMethod, ReviewAction};
use crate::id::PrId;
use crate::metrics::SharedEmitter;

use super::{ApproveOptions, Reviewer};

/// Posts reviews and enables auto-merge through [`GithubApi`].
pub struct BaseReviewer {
    api: Arc<dyn GithubApi>,
    service_account: String,
    metrics: SharedEmitter,
}

impl BaseReviewer {
    pub fn new(api: Arc<dyn GithubApi>, service_account: String, metrics: SharedEmitter) -> Self {
        Self {
            api,
            service_account,
            metrics,
        }
    }

    /// Classify an auto-merge failure.
    ///
    /// The platform reports these conditions only as GraphQL error text, so
    /// string matching is the contract we have:
    /// - "auto merge is not allowed": the repository setting is off.
    /// - "has_hooks status" / "clean status": no branch protection rules, so
    ///   the PR is already mergeable and auto-merge has nothing to wait on.
    fn classify_auto_merge_error(&self, id: &PrId, err: anyhow::Error) -> Error {
        let text = err.to_string().to_lowercase();
        if text.contains("auto merge is not allowed") {
            self.metrics
                .emit_dist("autoMergeDisabled", 1.0, &id.to_tags());
            return Error::user("auto-merge is not allowed on this repository", err);
        }
        if text.contains("has_hooks status") || text.contains("clean status") {
            self.metrics
                .emit_dist("noBranchProtectionRules", 1.0, &id.to_tags());
            return Error::user(
                "cannot enable auto-merge: the default branch has no branch protection rules",
                err,
            );
        }
        Error::fault("enabling auto-merge", err)
    }
}

/// PR tags plus the review kind, and the merge method where one applies.
fn review_tags(id: &PrId, review_type: &str, method: Option<MergeMethod>) -> Vec<String> {
    let mut tags = id.to_tags();
    tags.push(format!("reviewType:{review_type}"));
    if let Some(method) = method {
        tags.push(format!("mergeMethod:{method}"));
    }
    tags
}

#[async_trait]
impl Reviewer for BaseReviewer {
    async fn approve(&self, id: &PrId, body: &str, opts: &ApproveOptions) -> Result<(), Error> {
        // Auto-merge must be armed before the review is posted. An APPROVED
        // review left behind by a failed enablement would make the
        // redelivery retry a dedup no-op, and the PR would never merge.
        self.api
            .enable_auto_merge(id, opts.merge_method)
            .await
            .map_err(|err| self.classify_auto_merge_error(id, err))?;
        info!(pr = %id, method = %opts.merge_method, "auto-merge enabled");

        self.api
            .add_review(id, body, ReviewAction::Approve)
            .await
            .map_err(|err| Error::fault("posting approve review", err))?;
        let tags = review_tags(id, "approve", Some(opts.merge_method));
        self.metrics.emit_dist("reviewedPRs", 1.0, &tags);
        self.metrics.emit_dist("approvedPRs", 1.0, &tags);
        info!(pr = %id, "approved");
        Ok(())
    }

    async fn comment(&self, id: &PrId, body: &str) -> Result<(), Error> {
        self.api
            .add_review(id, body, ReviewAction::Comment)
            .await
            .map_err(|err| Error::fault("posting comment review", err))?;
        let tags = review_tags(id, "comment", None);
        self.metrics.emit_dist("reviewedPRs", 1.0, &tags);
        self.metrics.emit_dist("commentedPRs", 1.0, &tags);
        Ok(())
    }

    async fn request_changes(&self, id: &PrId, body: &str) -> Result<(), Error> {
        self.api
            .add_review(id, body, ReviewAction::RequestChanges)
            .await
            .map_err(|err| Error::fault("posting request-changes review", err))?;
        let tags = review_tags(id, "request_changes", None);
        self.metrics.emit_dist("reviewedPRs", 1.0, &tags);
        self.metrics.emit_dist("changesRequestedPRs", 1.0, &tags);
        Ok(())
    }

    async fn dismiss(&self, id: &PrId, message: &str) -> Result<(), Error> {
        let reviews = self
            .api
            .list_reviews(id)
            .await
            .map_err(|err| Error::fault("listing reviews for dismissal", err))?;

        for review in reviews {
            if review.user_login != self.service_account {
                continue;
            }
            if !review.state.eq_ignore_ascii_case("CHANGES_REQUESTED") {
                continue;
            }
            match self.api.dismiss_review(id, review.id, message).await {
                Ok(()) => {
                    self.metrics
                        .emit_dist("dismissedPRs", 1.0, &id.to_tags());
                    info!(pr = %id, review = review.id, "dismissed stale request-changes review");
                }
                Err(err) => {
                    // One stuck review must not block the rest.
                    warn!(pr = %id, review = review.id, error = %err, "failed to dismiss review");
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::github::{MergeMethod, ReviewSummary};
    use crate::metrics::CaptureEmitter;
    use std::sync::Mutex;

    pub(crate) fn pr() -> PrId {
        PrId {
            owner: "acme".into(),
            repo: "widgets".into(),
            number: 11,
            node_id: "n11".into(),
            repo_full_name: "acme/widgets".into(),
            author: "alice".into(),
            url: "https://git.example.com/acme/widgets/pull/11".into(),
        }
    }

    pub(crate) fn approve_opts(auto_merge: bool) -> ApproveOptions {
        ApproveOptions {
            auto_merge_enabled: auto_merge,
            default_branch: "main".into(),
            merge_method: MergeMethod::Squash,
        }
    }

    /// Recording fake for the platform API, shared by the pipeline tests.
    #[derive(Default)]
    pub(crate) struct FakeApi {
        pub reviews: Mutex<Vec<ReviewSummary>>,
        pub root_files: Mutex<Vec<String>>,
        pub required_checks: Mutex<Vec<String>>,
        pub topics: Mutex<Vec<String>>,
        pub added: Mutex<Vec<(String, ReviewAction)>>,
        pub dismissed: Mutex<Vec<u64>>,
        pub auto_merge: Mutex<Vec<MergeMethod>>,
        pub auto_merge_error: Mutex<Option<String>>,
        pub list_topics_error: Mutex<Option<String>>,
    }

    #[async_trait]
    impl GithubApi for FakeApi {
        async fn list_reviews(&self, _id: &PrId) -> anyhow::Result<Vec<ReviewSummary>> {
            Ok(self.reviews.lock().expect("reviews").clone())
        }

        async fn add_review(
            &self,
            _id: &PrId,
            body: &str,
            action: ReviewAction,
        ) -> anyhow::Result<()> {
            self.added
                .lock()
                .expect("added")
                .push((body.to_string(), action));
            Ok(())
        }

        async fn dismiss_review(
            &self,
            _id: &PrId,
            review_id: u64,
            _message: &str,
        ) -> anyhow::Result<()> {
            self.dismissed.lock().expect("dismissed").push(review_id);
            Ok(())
        }

        async fn enable_auto_merge(
            &self,
            _id: &PrId,
            method: MergeMethod,
        ) -> anyhow::Result<()> {
            if let Some(msg) = self.auto_merge_error.lock().expect("err").clone() {
                anyhow::bail!(msg);
            }
            self.auto_merge.lock().expect("auto_merge").push(method);
            Ok(())
        }

        async fn list_required_status_checks(
            &self,
            _id: &PrId,
            _branch: &str,
        ) -> anyhow::Result<Vec<String>> {
            Ok(self.required_checks.lock().expect("checks").clone())
        }

        async fn list_root_files(
            &self,
            _id: &PrId,
            _branch: &str,
        ) -> anyhow::Result<Vec<String>> {
            Ok(self.root_files.lock().expect("files").clone())
        }

        async fn list_topics(&self, _id: &PrId) -> anyhow::Result<Vec<String>> {
            if let Some(msg) = self.list_topics_error.lock().expect("err").clone() {
                anyhow::bail!(msg);
            }
            Ok(self.topics.lock().expect("topics").clone())
        }
    }

    fn base(api: Arc<FakeApi>, metrics: Arc<CaptureEmitter>) -> BaseReviewer {
        BaseReviewer::new(api, "svc-revbot".into(), metrics)
    }

    #[tokio::test]
    async fn approve_posts_review_and_enables_auto_merge() {
        let api = Arc::new(FakeApi::default());
        let metrics = Arc::new(CaptureEmitter::new());
        let reviewer = base(api.clone(), metrics.clone());

        reviewer
            .approve(&pr(), "lgtm", &approve_opts(true))
            .await
            .expect("approve");

        let added = api.added.lock().expect("added").clone();
        assert_eq!(added, vec![("lgtm".to_string(), ReviewAction::Approve)]);
        assert_eq!(
            api.auto_merge.lock().expect("am").as_slice(),
            [MergeMethod::Squash]
        );
        assert_eq!(metrics.count("approvedPRs"), 1);
        assert_eq!(metrics.count("reviewedPRs"), 1);
        let approved = metrics
            .emitted()
            .into_iter()
            .find(|m| m.name == "approvedPRs")
            .expect("approvedPRs");
        assert!(approved.tags.contains(&"reviewType:approve".to_string()));
        assert!(approved.tags.contains(&"mergeMethod:SQUASH".to_string()));
    }

    #[tokio::test]
    async fn failed_auto_merge_leaves_no_review_so_redelivery_can_retry() {
        let api = Arc::new(FakeApi::default());
        *api.auto_merge_error.lock().expect("err") = Some("502 bad gateway".into());
        let metrics = Arc::new(CaptureEmitter::new());
        let reviewer = base(api.clone(), metrics.clone());

        let err = reviewer
            .approve(&pr(), "lgtm", &approve_opts(true))
            .await
            .expect_err("transient failure");
        assert!(matches!(err, Error::ServiceFault { .. }));
        // No review was posted, so a redelivery is not a dedup hit.
        assert!(api.added.lock().expect("added").is_empty());

        *api.auto_merge_error.lock().expect("err") = None;
        reviewer
            .approve(&pr(), "lgtm", &approve_opts(true))
            .await
            .expect("retry");
        assert_eq!(api.added.lock().expect("added").len(), 1);
        assert_eq!(
            api.auto_merge.lock().expect("am").as_slice(),
            [MergeMethod::Squash]
        );
    }

    #[tokio::test]
    async fn auto_merge_not_allowed_is_a_user_error() {
        let api = Arc::new(FakeApi::default());
        *api.auto_merge_error.lock().expect("err") =
            Some("Auto merge is not allowed for this repository".into());
        let metrics = Arc::new(CaptureEmitter::new());
        let reviewer = base(api, metrics.clone());

        let err = reviewer
            .approve(&pr(), "lgtm", &approve_opts(true))
            .await
            .expect_err("auto merge");
        assert!(err.is_user_error());
        assert_eq!(metrics.count("autoMergeDisabled"), 1);
    }

    #[tokio::test]
    async fn missing_branch_protection_is_a_user_error() {
        let api = Arc::new(FakeApi::default());
        *api.auto_merge_error.lock().expect("err") =
            Some("Pull request is in clean status".into());
        let metrics = Arc::new(CaptureEmitter::new());
        let reviewer = base(api, metrics.clone());

        let err = reviewer
            .approve(&pr(), "lgtm", &approve_opts(true))
            .await
            .expect_err("clean status");
        assert!(err.is_user_error());
        assert_eq!(metrics.count("noBranchProtectionRules"), 1);
    }

    #[tokio::test]
    async fn unrecognized_auto_merge_failure_is_a_fault() {
        let api = Arc::new(FakeApi::default());
        *api.auto_merge_error.lock().expect("err") = Some("502 bad gateway".into());
        let reviewer = base(api, Arc::new(CaptureEmitter::new()));

        let err = reviewer
            .approve(&pr(), "lgtm", &approve_opts(true))
            .await
            .expect_err("fault");
        assert!(matches!(err, Error::ServiceFault { .. }));
    }

    #[tokio::test]
    async fn dismiss_targets_only_own_request_changes_reviews() {
        let api = Arc::new(FakeApi::default());
        *api.reviews.lock().expect("reviews") = vec![
            ReviewSummary {
                id: 1,
                user_login: "svc-revbot".into(),
                state: "CHANGES_REQUESTED".into(),
            },
            ReviewSummary {
                id: 2,
                user_login: "svc-revbot".into(),
                state: "APPROVED".into(),
            },
            ReviewSummary {
                id: 3,
                user_login: "carol".into(),
                state: "CHANGES_REQUESTED".into(),
            },
        ];
        let metrics = Arc::new(CaptureEmitter::new());
        let reviewer = base(api.clone(), metrics.clone());

        reviewer.dismiss(&pr(), "resolved").await.expect("dismiss");
        assert_eq!(api.dismissed.lock().expect("dismissed").as_slice(), [1]);
        assert_eq!(metrics.count("dismissedPRs"), 1);
    }
}
