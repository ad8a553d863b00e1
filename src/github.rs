use std::process::Command;

use anyhow::{Context, Result};
use async_trait::async_trait;
use octocrab::Octocrab;
use tracing::debug;

use crate::{
    error::QueryError,
    graphql::{create_pull_requests_query, parse_response},
    types::{Forge, RawPullRequest, RepositoryRef},
};

/// Looks for a token the user already has lying around: `GITHUB_TOKEN`,
/// `GH_TOKEN`, then `gh auth token`.
pub fn token_from_environment() -> Option<String> {
    // Prefer environment variables over gh CLI to avoid subprocess overhead.
    for var in ["GITHUB_TOKEN", "GH_TOKEN"] {
        if let Ok(token) = std::env::var(var)
            && !token.trim().is_empty()
        {
            debug!(source = var, "using token from environment");
            return Some(token.trim().to_string());
        }
    }

    let output = Command::new("gh").args(["auth", "token"]).output().ok()?;
    if !output.status.success() {
        return None;
    }
    let token = String::from_utf8(output.stdout).ok()?.trim().to_string();
    if token.is_empty() {
        return None;
    }
    debug!(source = "gh", "using token from gh CLI");
    Some(token)
}

/// [`Forge`] backed by the GitHub GraphQL API.
pub struct GitHub {
    client: Octocrab,
}

impl GitHub {
    pub fn new(token: &str) -> Result<Self> {
        let client = Octocrab::builder()
            .personal_token(token.to_string())
            .build()
            .context("Failed to create GitHub client")?;
        Ok(Self { client })
    }

    pub fn from_client(client: Octocrab) -> Self {
        Self { client }
    }
}

fn query_error(err: octocrab::Error) -> QueryError {
    match err {
        octocrab::Error::GitHub { source, .. } if source.status_code.as_u16() == 401 => {
            QueryError::Unauthorized(source.message.clone())
        }
        // A successful response whose body is not JSON. Error responses that
        // fail to parse surface as `Serde` and stay transient.
        octocrab::Error::Json { source, .. } => {
            QueryError::DataShape(format!("response is not valid JSON: {source}"))
        }
        other => QueryError::Other(anyhow::Error::from(other)),
    }
}

#[async_trait]
impl Forge for GitHub {
    async fn query_pull_requests(
        &self,
        repository: &RepositoryRef,
    ) -> Result<Vec<RawPullRequest>, QueryError> {
        let query = create_pull_requests_query(repository);
        debug!(repository = %repository, "querying open pull requests");
        let body: serde_json::Value = self.client.graphql(&query).await.map_err(query_error)?;
        parse_response(repository, body)
    }
}
