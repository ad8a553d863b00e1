use std::cmp::Ordering;

use crate::types::ClassifiedPullRequest;

fn display_order(a: &ClassifiedPullRequest, b: &ClassifiedPullRequest) -> Ordering {
    a.status
        .priority()
        .cmp(&b.status.priority())
        .then_with(|| b.pr.created_at.cmp(&a.pr.created_at))
        .then_with(|| a.pr.url.cmp(&b.pr.url))
}

/// Orders pull requests for display: by status priority, then newest first.
///
/// Equal keys fall back to the pull request URL so the result does not
/// depend on the input order.
pub fn rank(mut prs: Vec<ClassifiedPullRequest>) -> Vec<ClassifiedPullRequest> {
    prs.sort_by(display_order);
    prs
}
