use std::sync::{
    Arc, Mutex, PoisonError,
    atomic::{AtomicU64, Ordering},
};

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::{
    classify::classify_all,
    error::FetchError,
    fetch::{FetchConfig, fetch_all},
    filter::filter_for_user,
    rank::rank,
    types::{ClassifiedPullRequest, Clock, CredentialStore, Forge, RepositoryRef},
};

/// A repository that contributed nothing to a refresh.
#[derive(Debug)]
pub struct RepositoryFailure {
    pub repository: RepositoryRef,
    pub error: FetchError,
}

/// Everything produced by one refresh cycle.
#[derive(Debug)]
pub struct RefreshReport {
    /// Relevant pull requests in display order.
    pub pull_requests: Vec<ClassifiedPullRequest>,
    pub failures: Vec<RepositoryFailure>,
    pub fetched_at: DateTime<Utc>,
    /// Set when the cycle was superseded or cancelled before finishing. The
    /// list is empty in that case.
    pub cancelled: bool,
}

impl RefreshReport {
    fn empty(fetched_at: DateTime<Utc>) -> Self {
        Self {
            pull_requests: Vec::new(),
            failures: Vec::new(),
            fetched_at,
            cancelled: false,
        }
    }
}

/// Aggregates, classifies and ranks pull requests across watched
/// repositories.
pub struct Dashboard<F> {
    forge: F,
    credentials: Arc<dyn CredentialStore>,
    clock: Arc<dyn Clock>,
    config: FetchConfig,
    shutdown: CancellationToken,
    generation: AtomicU64,
    in_flight: Mutex<Option<InFlight>>,
}

struct InFlight {
    generation: u64,
    token: CancellationToken,
}

impl<F> Dashboard<F>
where
    F: Forge,
{
    pub fn new(
        forge: F,
        credentials: Arc<dyn CredentialStore>,
        clock: Arc<dyn Clock>,
        config: FetchConfig,
    ) -> Self {
        Self {
            forge,
            credentials,
            clock,
            config,
            shutdown: CancellationToken::new(),
            generation: AtomicU64::new(0),
            in_flight: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &FetchConfig {
        &self.config
    }

    /// Cancels the refresh currently in flight, if any.
    pub fn cancel(&self) {
        if let Some(current) = self
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            debug!(generation = current.generation, "cancelling in-flight refresh");
            current.token.cancel();
        }
    }

    /// Cancels the current refresh and every refresh started afterwards.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    fn begin_cycle(&self) -> (u64, CancellationToken) {
        let generation = self.generation.fetch_add(1, Ordering::Relaxed) + 1;
        let token = self.shutdown.child_token();
        let previous = self
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(InFlight {
                generation,
                token: token.clone(),
            });
        if let Some(previous) = previous {
            debug!(
                generation = previous.generation,
                "superseding previous refresh"
            );
            previous.token.cancel();
        }
        (generation, token)
    }

    /// Runs one full cycle: fetch every repository, keep the pull requests
    /// relevant to `username`, classify and rank them.
    ///
    /// Returns an empty report without touching the forge when no
    /// repositories are configured or no token is available.
    pub async fn refresh(&self, username: &str, repositories: &[RepositoryRef]) -> RefreshReport {
        let started_at = self.clock.now();

        if repositories.is_empty() {
            info!("no repositories configured; nothing to fetch");
            return RefreshReport::empty(started_at);
        }
        if !self.credentials.has_token() {
            info!("no token configured; skipping fetch");
            return RefreshReport::empty(started_at);
        }

        let (generation, cancel) = self.begin_cycle();
        let outcomes = fetch_all(
            &self.forge,
            repositories,
            &self.config,
            self.credentials.as_ref(),
            &cancel,
        )
        .await;

        self.finish_cycle(generation);

        if cancel.is_cancelled() {
            info!("refresh cancelled; discarding results");
            return RefreshReport {
                cancelled: true,
                ..RefreshReport::empty(started_at)
            };
        }

        let mut merged = Vec::new();
        let mut failures = Vec::new();
        for outcome in outcomes {
            match outcome.result {
                Ok(prs) => merged.extend(prs),
                Err(error) => failures.push(RepositoryFailure {
                    repository: outcome.repository,
                    error,
                }),
            }
        }

        let fetched = merged.len();
        let relevant = filter_for_user(merged, username);
        let pull_requests = rank(classify_all(relevant, username));
        info!(
            username,
            fetched,
            relevant = pull_requests.len(),
            failed_repositories = failures.len(),
            "refresh complete"
        );

        RefreshReport {
            pull_requests,
            failures,
            fetched_at: self.clock.now(),
            cancelled: false,
        }
    }

    /// The ranked list for `username`; see [`Dashboard::refresh`].
    pub async fn refresh_pull_requests(
        &self,
        username: &str,
        repositories: &[RepositoryRef],
    ) -> Vec<ClassifiedPullRequest> {
        self.refresh(username, repositories).await.pull_requests
    }

    fn finish_cycle(&self, generation: u64) {
        let mut in_flight = self
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if in_flight
            .as_ref()
            .is_some_and(|current| current.generation == generation)
        {
            *in_flight = None;
        }
    }
}
