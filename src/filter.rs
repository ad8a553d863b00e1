use crate::types::RawPullRequest;

/// Whether a pull request asks for, or already has, `username`'s review.
///
/// Pull requests authored by `username` are never relevant, even when they
/// carry a (self-)review request or a review from the author.
pub fn is_relevant(pr: &RawPullRequest, username: &str) -> bool {
    if pr.is_authored_by(username) {
        return false;
    }

    pr.is_review_requested_from(username) || pr.has_review_by(username)
}

/// Keeps the pull requests that are incoming work for `username`.
pub fn filter_for_user(prs: Vec<RawPullRequest>, username: &str) -> Vec<RawPullRequest> {
    prs.into_iter()
        .filter(|pr| is_relevant(pr, username))
        .collect()
}
