//! prdash: a pull request review dashboard.
//!
//! Fetches open pull requests from a set of watched GitHub repositories,
//! keeps the ones relevant to a given user (review requested or already
//! reviewed, never their own), classifies each by review status and ranks
//! them so the pull requests waiting on the user come first.

pub mod classify;
pub mod cli;
pub mod dashboard;
pub mod error;
pub mod fetch;
pub mod filter;
pub mod github;
pub mod graphql;
pub mod rank;
pub mod settings;
pub mod types;

pub use classify::{classify, classify_all};
pub use cli::{Action, DisplayMode, Invocation, RefreshRequest, SettingsCommand, parse_args};
pub use dashboard::{Dashboard, RefreshReport, RepositoryFailure};
pub use error::{FetchError, FetchErrorKind, QueryError};
pub use fetch::{FetchConfig, FetchOutcome, fetch_all};
pub use filter::{filter_for_user, is_relevant};
pub use github::{GitHub, token_from_environment};
pub use rank::rank;
pub use settings::Settings;
pub use types::{
    ClassifiedPullRequest, Clock, CredentialStore, Forge, LatestReview, RawPullRequest, RepoError,
    RepositoryRef, ReviewRequest, ReviewState, ReviewStatus, SystemClock,
};
