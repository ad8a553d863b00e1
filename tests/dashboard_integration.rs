use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use prdash::{
    ClassifiedPullRequest, Clock, CredentialStore, Dashboard, FetchConfig, FetchErrorKind, Forge,
    LatestReview, QueryError, RawPullRequest, RepositoryRef, ReviewRequest, ReviewState,
    ReviewStatus,
};

#[derive(Clone)]
enum Response {
    PullRequests(Vec<RawPullRequest>),
    Delayed(Duration, Vec<RawPullRequest>),
    Unauthorized,
    Broken,
}

/// Mock GitHub hub for testing
struct MockHub {
    responses: HashMap<RepositoryRef, Response>,
    calls: Mutex<Vec<RepositoryRef>>,
}

impl MockHub {
    fn new(responses: Vec<(RepositoryRef, Response)>) -> Self {
        Self {
            responses: responses.into_iter().collect(),
            calls: Mutex::new(Vec::new()),
        }
    }

    fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl Forge for MockHub {
    async fn query_pull_requests(
        &self,
        repository: &RepositoryRef,
    ) -> Result<Vec<RawPullRequest>, QueryError> {
        self.calls.lock().unwrap().push(repository.clone());
        match self.responses.get(repository).cloned() {
            Some(Response::PullRequests(prs)) => Ok(prs),
            Some(Response::Delayed(delay, prs)) => {
                tokio::time::sleep(delay).await;
                Ok(prs)
            }
            Some(Response::Unauthorized) => Err(QueryError::Unauthorized(
                "401 Bad credentials".to_string(),
            )),
            Some(Response::Broken) => Err(QueryError::DataShape("repository is null".to_string())),
            None => Ok(vec![]),
        }
    }
}

struct TestCredentials {
    present: AtomicBool,
    clears: AtomicUsize,
}

impl TestCredentials {
    fn with_token() -> Arc<Self> {
        Arc::new(Self {
            present: AtomicBool::new(true),
            clears: AtomicUsize::new(0),
        })
    }

    fn without_token() -> Arc<Self> {
        let credentials = Self::with_token();
        credentials.present.store(false, Ordering::SeqCst);
        credentials
    }
}

impl CredentialStore for TestCredentials {
    fn has_token(&self) -> bool {
        self.present.load(Ordering::SeqCst)
    }

    fn clear_token(&self) {
        self.clears.fetch_add(1, Ordering::SeqCst);
        self.present.store(false, Ordering::SeqCst);
    }
}

struct FixedClock(DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
}

fn repo(s: &str) -> RepositoryRef {
    RepositoryRef::parse(s).unwrap()
}

fn pr(repository: &str, number: u32, author: &str, age_hours: i64) -> RawPullRequest {
    RawPullRequest {
        repository: repo(repository),
        author_login: author.to_string(),
        title: format!("{repository} change {number}"),
        url: format!("https://github.com/{repository}/pull/{number}"),
        created_at: now() - chrono::Duration::hours(age_hours),
        is_draft: false,
        latest_reviews: vec![],
        review_requests: vec![],
    }
}

fn requested_from(mut pr: RawPullRequest, login: &str) -> RawPullRequest {
    pr.review_requests.push(ReviewRequest::User {
        login: login.to_string(),
    });
    pr
}

fn reviewed_by(mut pr: RawPullRequest, login: &str, state: ReviewState) -> RawPullRequest {
    pr.latest_reviews.push(LatestReview {
        author_login: login.to_string(),
        state,
    });
    pr
}

fn dashboard(hub: MockHub, credentials: Arc<TestCredentials>) -> Dashboard<MockHub> {
    Dashboard::new(
        hub,
        credentials,
        Arc::new(FixedClock(now())),
        FetchConfig {
            max_retries: 0,
            ..FetchConfig::default()
        },
    )
}

fn urls(prs: &[ClassifiedPullRequest]) -> Vec<&str> {
    prs.iter().map(|c| c.pr.url.as_str()).collect()
}

#[tokio::test]
async fn test_unauthorized_repository_clears_token_once() {
    let a = requested_from(pr("team/a", 1, "alice", 3), "bob");
    let c = reviewed_by(pr("team/c", 2, "carol", 1), "bob", ReviewState::Commented);
    let hub = MockHub::new(vec![
        (repo("team/a"), Response::PullRequests(vec![a.clone()])),
        (repo("team/b"), Response::Unauthorized),
        (repo("team/c"), Response::PullRequests(vec![c.clone()])),
    ]);
    let credentials = TestCredentials::with_token();
    let dashboard = dashboard(hub, credentials.clone());

    let report = dashboard
        .refresh("bob", &[repo("team/a"), repo("team/b"), repo("team/c")])
        .await;

    assert!(!report.cancelled);
    assert_eq!(credentials.clears.load(Ordering::SeqCst), 1);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].repository, repo("team/b"));
    assert_eq!(report.failures[0].error.kind(), FetchErrorKind::Auth);
    assert_eq!(
        urls(&report.pull_requests),
        [
            "https://github.com/team/a/pull/1",
            "https://github.com/team/c/pull/2",
        ]
    );
    assert_eq!(report.fetched_at, now());
}

#[tokio::test]
async fn test_several_unauthorized_repositories_still_clear_once() {
    let hub = MockHub::new(vec![
        (repo("team/a"), Response::Unauthorized),
        (repo("team/b"), Response::Unauthorized),
        (repo("team/c"), Response::Unauthorized),
    ]);
    let credentials = TestCredentials::with_token();
    let dashboard = dashboard(hub, credentials.clone());

    let report = dashboard
        .refresh("bob", &[repo("team/a"), repo("team/b"), repo("team/c")])
        .await;

    assert_eq!(credentials.clears.load(Ordering::SeqCst), 1);
    assert_eq!(report.failures.len(), 3);
    assert!(report.pull_requests.is_empty());
}

#[tokio::test]
async fn test_review_states_and_ranking() {
    let awaiting_old = requested_from(pr("team/a", 1, "alice", 48), "bob");
    let awaiting_new = requested_from(pr("team/a", 2, "alice", 2), "bob");
    let approved = reviewed_by(pr("team/a", 3, "alice", 1), "bob", ReviewState::Approved);
    let changes = reviewed_by(
        pr("team/b", 4, "carol", 30),
        "bob",
        ReviewState::ChangesRequested,
    );
    let mut draft = requested_from(pr("team/b", 5, "carol", 0), "bob");
    draft.is_draft = true;
    let own = requested_from(pr("team/b", 6, "bob", 0), "bob");
    let unrelated = requested_from(pr("team/b", 7, "carol", 0), "dave");

    let hub = MockHub::new(vec![
        (
            repo("team/a"),
            Response::PullRequests(vec![awaiting_old, awaiting_new, approved]),
        ),
        (
            repo("team/b"),
            Response::PullRequests(vec![changes, draft, own, unrelated]),
        ),
    ]);
    let dashboard = dashboard(hub, TestCredentials::with_token());

    let ranked = dashboard
        .refresh_pull_requests("bob", &[repo("team/a"), repo("team/b")])
        .await;

    let summary: Vec<(ReviewStatus, &str)> = ranked
        .iter()
        .map(|c| (c.status, c.pr.url.as_str()))
        .collect();
    assert_eq!(
        summary,
        [
            (ReviewStatus::Awaiting, "https://github.com/team/a/pull/2"),
            (ReviewStatus::Awaiting, "https://github.com/team/a/pull/1"),
            (
                ReviewStatus::ChangesRequested,
                "https://github.com/team/b/pull/4"
            ),
            (ReviewStatus::Approved, "https://github.com/team/a/pull/3"),
            (ReviewStatus::Draft, "https://github.com/team/b/pull/5"),
        ]
    );
}

#[tokio::test]
async fn test_self_requested_pull_request_is_excluded() {
    let own = requested_from(pr("team/a", 1, "bob", 1), "bob");
    let hub = MockHub::new(vec![(repo("team/a"), Response::PullRequests(vec![own]))]);
    let dashboard = dashboard(hub, TestCredentials::with_token());

    assert!(
        dashboard
            .refresh_pull_requests("bob", &[repo("team/a")])
            .await
            .is_empty()
    );
}

#[tokio::test]
async fn test_login_comparison_ignores_case() {
    let requested = requested_from(pr("team/a", 1, "alice", 1), "Bob");
    let own = requested_from(pr("team/a", 2, "BOB", 1), "bob");
    let hub = MockHub::new(vec![(
        repo("team/a"),
        Response::PullRequests(vec![requested, own]),
    )]);
    let dashboard = dashboard(hub, TestCredentials::with_token());

    let ranked = dashboard
        .refresh_pull_requests("bob", &[repo("team/a")])
        .await;
    assert_eq!(urls(&ranked), ["https://github.com/team/a/pull/1"]);
}

#[tokio::test]
async fn test_no_repositories_skips_the_forge() {
    let hub = MockHub::new(vec![]);
    let credentials = TestCredentials::with_token();
    let dashboard = dashboard(hub, credentials);

    let report = dashboard.refresh("bob", &[]).await;

    assert!(report.pull_requests.is_empty());
    assert!(report.failures.is_empty());
    assert!(!report.cancelled);
}

#[tokio::test]
async fn test_no_token_skips_the_forge() {
    let hub = Arc::new(MockHub::new(vec![(
        repo("team/a"),
        Response::PullRequests(vec![requested_from(pr("team/a", 1, "alice", 1), "bob")]),
    )]));
    let dashboard = Dashboard::new(
        SharedHub(hub.clone()),
        TestCredentials::without_token(),
        Arc::new(FixedClock(now())),
        FetchConfig::default(),
    );

    let ranked = dashboard
        .refresh_pull_requests("bob", &[repo("team/a")])
        .await;

    assert!(ranked.is_empty());
    assert_eq!(hub.call_count(), 0);
}

/// Lets a test keep a handle on the hub after handing it to the dashboard.
struct SharedHub(Arc<MockHub>);

#[async_trait]
impl Forge for SharedHub {
    async fn query_pull_requests(
        &self,
        repository: &RepositoryRef,
    ) -> Result<Vec<RawPullRequest>, QueryError> {
        self.0.query_pull_requests(repository).await
    }
}

#[tokio::test]
async fn test_refresh_is_idempotent() {
    let prs = vec![
        requested_from(pr("team/a", 1, "alice", 5), "bob"),
        requested_from(pr("team/a", 2, "carol", 5), "bob"),
        reviewed_by(pr("team/a", 3, "carol", 5), "bob", ReviewState::Commented),
    ];
    let hub = Arc::new(MockHub::new(vec![
        (repo("team/a"), Response::PullRequests(prs)),
        (repo("team/b"), Response::Broken),
    ]));
    let dashboard = Dashboard::new(
        SharedHub(hub.clone()),
        TestCredentials::with_token(),
        Arc::new(FixedClock(now())),
        FetchConfig::default(),
    );
    let repositories = [repo("team/a"), repo("team/b")];

    let first = dashboard.refresh_pull_requests("bob", &repositories).await;
    let second = dashboard.refresh_pull_requests("bob", &repositories).await;

    assert_eq!(first, second);
    assert_eq!(first.len(), 3);
    assert_eq!(hub.call_count(), 4);
}

#[tokio::test]
async fn test_failed_repository_does_not_block_others() {
    let hub = MockHub::new(vec![
        (repo("team/a"), Response::Broken),
        (
            repo("team/b"),
            Response::PullRequests(vec![requested_from(pr("team/b", 1, "alice", 1), "bob")]),
        ),
    ]);
    let credentials = TestCredentials::with_token();
    let dashboard = dashboard(hub, credentials.clone());

    let report = dashboard
        .refresh("bob", &[repo("team/a"), repo("team/b")])
        .await;

    assert_eq!(urls(&report.pull_requests), ["https://github.com/team/b/pull/1"]);
    assert_eq!(report.failures[0].error.kind(), FetchErrorKind::DataShape);
    assert_eq!(credentials.clears.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn test_new_refresh_supersedes_previous() {
    let slow = requested_from(pr("team/slow", 1, "alice", 1), "bob");
    let fast = requested_from(pr("team/fast", 2, "alice", 1), "bob");
    let hub = MockHub::new(vec![
        (
            repo("team/slow"),
            Response::Delayed(Duration::from_secs(5), vec![slow]),
        ),
        (repo("team/fast"), Response::PullRequests(vec![fast])),
    ]);
    let dashboard = dashboard(hub, TestCredentials::with_token());

    let slow_repos = [repo("team/slow")];
    let fast_repos = [repo("team/fast")];
    let first = dashboard.refresh("bob", &slow_repos);
    let second = async {
        tokio::time::sleep(Duration::from_millis(100)).await;
        dashboard.refresh("bob", &fast_repos).await
    };
    let (first, second) = tokio::join!(first, second);

    assert!(first.cancelled);
    assert!(first.pull_requests.is_empty());
    assert!(!second.cancelled);
    assert_eq!(
        urls(&second.pull_requests),
        ["https://github.com/team/fast/pull/2"]
    );
}

#[tokio::test(start_paused = true)]
async fn test_cancel_discards_results() {
    let slow = requested_from(pr("team/slow", 1, "alice", 1), "bob");
    let hub = MockHub::new(vec![(
        repo("team/slow"),
        Response::Delayed(Duration::from_secs(5), vec![slow]),
    )]);
    let dashboard = dashboard(hub, TestCredentials::with_token());

    let repositories = [repo("team/slow")];
    let refresh = dashboard.refresh("bob", &repositories);
    let cancel = async {
        tokio::time::sleep(Duration::from_millis(100)).await;
        dashboard.cancel();
    };
    let (report, ()) = tokio::join!(refresh, cancel);

    assert!(report.cancelled);
    assert!(report.pull_requests.is_empty());

    // The dashboard stays usable after a cancelled cycle.
    let report = dashboard.refresh("bob", &repositories).await;
    assert!(!report.cancelled);
    assert_eq!(report.pull_requests.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_slow_repository_times_out() {
    let hub = MockHub::new(vec![
        (
            repo("team/slow"),
            Response::Delayed(Duration::from_secs(60), vec![]),
        ),
        (
            repo("team/fast"),
            Response::PullRequests(vec![requested_from(pr("team/fast", 1, "alice", 1), "bob")]),
        ),
    ]);
    let dashboard = Dashboard::new(
        hub,
        TestCredentials::with_token(),
        Arc::new(FixedClock(now())),
        FetchConfig {
            timeout: Duration::from_secs(2),
            ..FetchConfig::default()
        },
    );

    let report = dashboard
        .refresh("bob", &[repo("team/slow"), repo("team/fast")])
        .await;

    assert_eq!(report.pull_requests.len(), 1);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].error.kind(), FetchErrorKind::Timeout);
}

/// Answers every query with a fixed GraphQL body.
struct GraphQLBodyHub(serde_json::Value);

#[async_trait]
impl Forge for GraphQLBodyHub {
    async fn query_pull_requests(
        &self,
        repository: &RepositoryRef,
    ) -> Result<Vec<RawPullRequest>, QueryError> {
        prdash::graphql::parse_response(repository, self.0.clone())
    }
}

#[tokio::test]
async fn test_missing_repository_with_status_like_name_keeps_token() {
    let hub = GraphQLBodyHub(serde_json::json!({
        "data": {"repository": null},
        "errors": [{
            "type": "NOT_FOUND",
            "message": "Could not resolve to a Repository with the name 'acme/error-401-page'."
        }]
    }));
    let credentials = TestCredentials::with_token();
    let dashboard = Dashboard::new(
        hub,
        credentials.clone(),
        Arc::new(FixedClock(now())),
        FetchConfig {
            max_retries: 0,
            ..FetchConfig::default()
        },
    );

    let report = dashboard.refresh("bob", &[repo("acme/error-401-page")]).await;

    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].error.kind(), FetchErrorKind::Transient);
    assert_eq!(credentials.clears.load(Ordering::SeqCst), 0);
    assert!(credentials.has_token());
}

#[tokio::test]
async fn test_malformed_response_is_not_retried() {
    let hub = Arc::new(MockHub::new(vec![]));
    struct MalformedHub(Arc<MockHub>);

    #[async_trait]
    impl Forge for MalformedHub {
        async fn query_pull_requests(
            &self,
            repository: &RepositoryRef,
        ) -> Result<Vec<RawPullRequest>, QueryError> {
            self.0.calls.lock().unwrap().push(repository.clone());
            prdash::graphql::parse_response(
                repository,
                serde_json::json!({"data": {"repository": {"pullRequests": {"nodes": [
                    {"title": null, "url": "u", "createdAt": "2024-01-01T00:00:00Z"}
                ]}}}}),
            )
        }
    }

    let credentials = TestCredentials::with_token();
    let dashboard = Dashboard::new(
        MalformedHub(hub.clone()),
        credentials.clone(),
        Arc::new(FixedClock(now())),
        FetchConfig::default(),
    );

    let report = dashboard.refresh("bob", &[repo("acme/widgets")]).await;

    assert_eq!(report.failures[0].error.kind(), FetchErrorKind::DataShape);
    assert_eq!(hub.call_count(), 1);
    assert_eq!(credentials.clears.load(Ordering::SeqCst), 0);
}
