use tracing::{debug, warn};

use crate::types::{ClassifiedPullRequest, RawPullRequest, ReviewState, ReviewStatus};

fn status_for_review(state: &ReviewState) -> Option<ReviewStatus> {
    match state {
        ReviewState::Approved => Some(ReviewStatus::Approved),
        ReviewState::ChangesRequested => Some(ReviewStatus::ChangesRequested),
        ReviewState::Commented => Some(ReviewStatus::Commented),
        ReviewState::Other(_) => None,
    }
}

/// Assigns the review status of `pr` from `username`'s point of view.
///
/// Rules, first match wins:
/// 1. a draft is always [`ReviewStatus::Draft`];
/// 2. the user's latest review decides (approved, changes requested,
///    commented);
/// 3. an open user-typed review request makes it [`ReviewStatus::Awaiting`];
/// 4. otherwise [`ReviewStatus::Unclassified`].
///
/// The API returns at most one latest review per author. Should several
/// reviews by the user show up anyway, the last one wins and the anomaly is
/// logged.
pub fn classify(pr: &RawPullRequest, username: &str) -> ReviewStatus {
    if pr.is_draft {
        return ReviewStatus::Draft;
    }

    let mut matches = 0usize;
    let mut from_review = None;
    for review in pr.reviews_by(username) {
        matches += 1;
        if let Some(status) = status_for_review(&review.state) {
            from_review = Some(status);
        }
    }

    if matches > 1 {
        warn!(
            url = %pr.url,
            username,
            reviews = matches,
            "multiple latest reviews by one author; using the last"
        );
    }

    if let Some(status) = from_review {
        return status;
    }

    if pr.is_review_requested_from(username) {
        return ReviewStatus::Awaiting;
    }

    debug!(url = %pr.url, username, "no review status could be determined");
    ReviewStatus::Unclassified
}

pub fn classify_all(prs: Vec<RawPullRequest>, username: &str) -> Vec<ClassifiedPullRequest> {
    prs.into_iter()
        .map(|pr| {
            let status = classify(&pr, username);
            ClassifiedPullRequest { pr, status }
        })
        .collect()
}
