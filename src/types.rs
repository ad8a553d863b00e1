use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::QueryError;

/// Login GitHub reports for accounts that no longer exist.
pub const GHOST_LOGIN: &str = "ghost";

/// Errors produced when deriving a [`RepositoryRef`] from user input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepoError {
    EmptyOwner,
    EmptyName,
    InvalidFormat(String),
    InvalidUrl(String),
}

impl fmt::Display for RepoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RepoError::EmptyOwner => write!(f, "repository owner cannot be empty"),
            RepoError::EmptyName => write!(f, "repository name cannot be empty"),
            RepoError::InvalidFormat(s) => {
                write!(f, "repository must be in format 'owner/name', got: '{s}'")
            }
            RepoError::InvalidUrl(s) => write!(f, "not a repository URL: '{s}'"),
        }
    }
}

impl std::error::Error for RepoError {}

/// Identifies a watched repository by owner and name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RepositoryRef {
    owner: String,
    name: String,
}

impl RepositoryRef {
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Result<Self, RepoError> {
        let owner = owner.into();
        let name = name.into();
        if owner.trim().is_empty() {
            return Err(RepoError::EmptyOwner);
        }
        if name.trim().is_empty() {
            return Err(RepoError::EmptyName);
        }
        Ok(Self { owner, name })
    }

    /// Parses the short `owner/name` form.
    pub fn parse(s: &str) -> Result<Self, RepoError> {
        let parts: Vec<&str> = s.trim().split('/').collect();
        match parts.as_slice() {
            [owner, name] => Self::new(*owner, *name),
            _ => Err(RepoError::InvalidFormat(s.to_string())),
        }
    }

    /// Parses a repository URL such as `https://github.com/owner/name`.
    ///
    /// Any trailing path (`/pulls`, `/tree/main`) and a `.git` suffix are
    /// ignored so that URLs copied from a browser or a clone command both
    /// work.
    pub fn parse_url(s: &str) -> Result<Self, RepoError> {
        let url = url::Url::parse(s.trim()).map_err(|_| RepoError::InvalidUrl(s.to_string()))?;
        if url.host_str().is_none() {
            return Err(RepoError::InvalidUrl(s.to_string()));
        }

        let segments: Vec<&str> = url
            .path_segments()
            .map(|segments| segments.filter(|seg| !seg.is_empty()).collect())
            .unwrap_or_default();

        match segments.as_slice() {
            [owner, name, ..] => Self::new(*owner, name.trim_end_matches(".git")),
            _ => Err(RepoError::InvalidUrl(s.to_string())),
        }
    }

    /// Accepts either a URL or the short `owner/name` form.
    pub fn parse_any(s: &str) -> Result<Self, RepoError> {
        if s.contains("://") {
            Self::parse_url(s)
        } else {
            Self::parse(s)
        }
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for RepositoryRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

/// State of the most recent review a reviewer submitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReviewState {
    Approved,
    ChangesRequested,
    Commented,
    Other(String),
}

impl ReviewState {
    /// Decodes the upper-case enum names used by the GraphQL API.
    pub fn from_graphql(s: &str) -> Self {
        match s {
            "APPROVED" => ReviewState::Approved,
            "CHANGES_REQUESTED" => ReviewState::ChangesRequested,
            "COMMENTED" => ReviewState::Commented,
            other => ReviewState::Other(other.to_string()),
        }
    }
}

impl fmt::Display for ReviewState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReviewState::Approved => f.write_str("APPROVED"),
            ReviewState::ChangesRequested => f.write_str("CHANGES_REQUESTED"),
            ReviewState::Commented => f.write_str("COMMENTED"),
            ReviewState::Other(state) => f.write_str(state),
        }
    }
}

/// The latest review submitted by one reviewer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LatestReview {
    pub author_login: String,
    pub state: ReviewState,
}

/// An outstanding request for someone to review a pull request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReviewRequest {
    User { login: String },
    Team { slug: String },
    Other { typename: String },
}

impl ReviewRequest {
    /// Returns the requested user's login, or `None` for team and other
    /// reviewer kinds.
    pub fn user_login(&self) -> Option<&str> {
        match self {
            ReviewRequest::User { login } => Some(login),
            _ => None,
        }
    }
}

impl fmt::Display for ReviewRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReviewRequest::User { login } => f.write_str(login),
            ReviewRequest::Team { slug } => write!(f, "team:{slug}"),
            ReviewRequest::Other { typename } => write!(f, "<{typename}>"),
        }
    }
}

/// Pull request data as returned by a [`Forge`].
#[derive(Debug, Clone, PartialEq)]
pub struct RawPullRequest {
    pub repository: RepositoryRef,
    pub author_login: String,
    pub title: String,
    pub url: String,
    pub created_at: DateTime<Utc>,
    pub is_draft: bool,
    pub latest_reviews: Vec<LatestReview>,
    pub review_requests: Vec<ReviewRequest>,
}

pub(crate) fn same_login(a: &str, b: &str) -> bool {
    a.eq_ignore_ascii_case(b)
}

impl RawPullRequest {
    pub fn is_authored_by(&self, username: &str) -> bool {
        same_login(&self.author_login, username)
    }

    /// True when a user-typed review request names `username`.
    pub fn is_review_requested_from(&self, username: &str) -> bool {
        self.review_requests
            .iter()
            .filter_map(ReviewRequest::user_login)
            .any(|login| same_login(login, username))
    }

    pub fn reviews_by<'a>(&'a self, username: &'a str) -> impl Iterator<Item = &'a LatestReview> {
        self.latest_reviews
            .iter()
            .filter(move |review| same_login(&review.author_login, username))
    }

    pub fn has_review_by(&self, username: &str) -> bool {
        self.reviews_by(username).next().is_some()
    }
}

/// Review-state category assigned to a pull request for one user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReviewStatus {
    Awaiting,
    ChangesRequested,
    Commented,
    Approved,
    Draft,
    /// Nothing in the pull request determines a state for the user.
    Unclassified,
}

impl ReviewStatus {
    /// Sort key; lower values are shown first.
    pub fn priority(&self) -> u8 {
        match self {
            ReviewStatus::Awaiting => 1,
            ReviewStatus::ChangesRequested => 2,
            ReviewStatus::Commented => 3,
            ReviewStatus::Approved => 4,
            ReviewStatus::Draft => 5,
            ReviewStatus::Unclassified => 6,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ReviewStatus::Awaiting => "awaiting",
            ReviewStatus::ChangesRequested => "changes",
            ReviewStatus::Commented => "commented",
            ReviewStatus::Approved => "approved",
            ReviewStatus::Draft => "draft",
            ReviewStatus::Unclassified => "unknown",
        }
    }
}

impl fmt::Display for ReviewStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A relevant pull request together with its derived status.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassifiedPullRequest {
    pub pr: RawPullRequest,
    pub status: ReviewStatus,
}

/// Source of pull request data for a repository.
///
/// Implementations must report authentication failures as
/// [`QueryError::Unauthorized`] so the caller can invalidate the token.
#[async_trait]
pub trait Forge: Send + Sync {
    async fn query_pull_requests(
        &self,
        repository: &RepositoryRef,
    ) -> Result<Vec<RawPullRequest>, QueryError>;
}

/// Access to the stored credential.
pub trait CredentialStore: Send + Sync {
    fn has_token(&self) -> bool;

    /// Forgets the stored token. Calling it again after the token is gone
    /// must be a no-op.
    fn clear_token(&self);
}

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
