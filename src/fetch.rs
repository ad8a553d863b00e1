use std::{
    sync::atomic::{AtomicBool, Ordering},
    time::{Duration, SystemTime},
};

use futures::{StreamExt, stream};
use reqwest_retry::{RetryDecision, RetryPolicy, policies::ExponentialBackoff};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    error::FetchError,
    types::{CredentialStore, Forge, RawPullRequest, RepositoryRef},
};

/// Tuning knobs for a fetch cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchConfig {
    /// Upper bound for a single query attempt against one repository.
    pub timeout: Duration,
    /// Maximum number of repositories queried at the same time.
    pub max_concurrent: usize,
    /// Retries after a transient failure; 0 disables retrying.
    pub max_retries: u32,
    pub retry_min_backoff: Duration,
    pub retry_max_backoff: Duration,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(15),
            max_concurrent: 8,
            max_retries: 2,
            retry_min_backoff: Duration::from_millis(200),
            retry_max_backoff: Duration::from_secs(5),
        }
    }
}

impl FetchConfig {
    fn retry_policy(&self) -> ExponentialBackoff {
        ExponentialBackoff::builder()
            .retry_bounds(self.retry_min_backoff, self.retry_max_backoff)
            .build_with_max_retries(self.max_retries)
    }
}

/// Result of querying one repository.
#[derive(Debug)]
pub struct FetchOutcome {
    pub repository: RepositoryRef,
    /// Number of query attempts made, including retries.
    pub attempts: u32,
    pub result: Result<Vec<RawPullRequest>, FetchError>,
}

impl FetchOutcome {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }

    pub fn error(&self) -> Option<&FetchError> {
        self.result.as_ref().err()
    }

    /// The fetched pull requests; a failed repository contributes none.
    pub fn pull_requests(&self) -> &[RawPullRequest] {
        match &self.result {
            Ok(prs) => prs,
            Err(_) => &[],
        }
    }

    pub fn into_pull_requests(self) -> Vec<RawPullRequest> {
        self.result.unwrap_or_default()
    }
}

/// Clears the stored token the first time any repository reports an
/// authentication failure during a cycle.
struct AuthSignal<'a> {
    credentials: &'a dyn CredentialStore,
    raised: AtomicBool,
}

impl<'a> AuthSignal<'a> {
    fn new(credentials: &'a dyn CredentialStore) -> Self {
        Self {
            credentials,
            raised: AtomicBool::new(false),
        }
    }

    fn raise(&self, repository: &RepositoryRef) {
        if !self.raised.swap(true, Ordering::AcqRel) {
            warn!(
                repository = %repository,
                "credentials rejected; clearing stored token"
            );
            self.credentials.clear_token();
        }
    }
}

/// Queries every repository concurrently and returns one outcome per
/// repository, in the same order as `repositories`.
///
/// Failures never abort the other queries. Transient failures are retried
/// with exponential backoff, each attempt is bounded by
/// [`FetchConfig::timeout`], and cancelling `cancel` turns every unfinished
/// query into [`FetchError::Cancelled`].
pub async fn fetch_all<F>(
    forge: &F,
    repositories: &[RepositoryRef],
    config: &FetchConfig,
    credentials: &dyn CredentialStore,
    cancel: &CancellationToken,
) -> Vec<FetchOutcome>
where
    F: Forge + ?Sized,
{
    if repositories.is_empty() {
        return Vec::new();
    }

    let auth_signal = AuthSignal::new(credentials);
    let auth_signal = &auth_signal;

    let mut indexed: Vec<(usize, FetchOutcome)> = stream::iter(repositories.iter().enumerate())
        .map(move |(index, repository)| async move {
            let outcome = fetch_one(forge, repository, config, cancel).await;
            if matches!(outcome.result, Err(FetchError::Auth(_))) {
                auth_signal.raise(repository);
            }
            (index, outcome)
        })
        .buffer_unordered(config.max_concurrent.max(1))
        .collect()
        .await;

    indexed.sort_by_key(|(index, _)| *index);
    let outcomes: Vec<FetchOutcome> = indexed.into_iter().map(|(_, outcome)| outcome).collect();

    let failed = outcomes.iter().filter(|outcome| !outcome.is_ok()).count();
    info!(
        repositories = outcomes.len(),
        failed, "fetch cycle complete"
    );

    outcomes
}

async fn fetch_one<F>(
    forge: &F,
    repository: &RepositoryRef,
    config: &FetchConfig,
    cancel: &CancellationToken,
) -> FetchOutcome
where
    F: Forge + ?Sized,
{
    let policy = config.retry_policy();
    let started = SystemTime::now();
    let mut attempts: u32 = 0;

    loop {
        attempts += 1;
        debug!(repository = %repository, attempt = attempts, "querying pull requests");

        let result = tokio::select! {
            _ = cancel.cancelled() => Err(FetchError::Cancelled),
            response = tokio::time::timeout(config.timeout, forge.query_pull_requests(repository)) => {
                match response {
                    Ok(Ok(prs)) => Ok(prs),
                    Ok(Err(err)) => Err(FetchError::from(err)),
                    Err(_) => Err(FetchError::Timeout(config.timeout)),
                }
            }
        };

        if let Err(err) = &result
            && err.is_retryable()
            && let RetryDecision::Retry { execute_after } =
                policy.should_retry(started, attempts - 1)
        {
            let delay = execute_after
                .duration_since(SystemTime::now())
                .unwrap_or_default();
            warn!(
                repository = %repository,
                attempt = attempts,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "transient failure, retrying"
            );
            tokio::select! {
                _ = cancel.cancelled() => {
                    return FetchOutcome {
                        repository: repository.clone(),
                        attempts,
                        result: Err(FetchError::Cancelled),
                    };
                }
                _ = tokio::time::sleep(delay) => continue,
            }
        }

        match &result {
            Ok(prs) => debug!(
                repository = %repository,
                pull_requests = prs.len(),
                "fetched pull requests"
            ),
            Err(FetchError::Cancelled) => debug!(repository = %repository, "fetch cancelled"),
            Err(err) => warn!(
                repository = %repository,
                attempts,
                error = %err,
                "repository contributes no pull requests this cycle"
            ),
        }

        return FetchOutcome {
            repository: repository.clone(),
            attempts,
            result,
        };
    }
}
