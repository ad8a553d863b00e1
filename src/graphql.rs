use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::warn;

use crate::{
    error::QueryError,
    types::{GHOST_LOGIN, LatestReview, RawPullRequest, RepositoryRef, ReviewRequest, ReviewState},
};

/// Number of open pull requests requested per repository. Only the first
/// page is fetched.
pub const PULL_REQUEST_PAGE_SIZE: u32 = 100;

const PULL_REQUESTS_QUERY: &str = r#"
    query($owner: String!, $name: String!, $first: Int!) {
        repository(owner: $owner, name: $name) {
            pullRequests(states: OPEN, first: $first, orderBy: {field: CREATED_AT, direction: DESC}) {
                nodes {
                    title
                    url
                    createdAt
                    isDraft
                    author {
                        login
                    }
                    latestReviews(first: 100) {
                        nodes {
                            author {
                                login
                            }
                            state
                        }
                    }
                    reviewRequests(first: 100) {
                        nodes {
                            requestedReviewer {
                                __typename
                                ... on User {
                                    login
                                }
                                ... on Team {
                                    slug
                                }
                            }
                        }
                    }
                }
            }
        }
    }
"#;

pub fn create_pull_requests_query(repository: &RepositoryRef) -> serde_json::Value {
    serde_json::json!({
        "query": PULL_REQUESTS_QUERY,
        "variables": {
            "owner": repository.owner(),
            "name": repository.name(),
            "first": PULL_REQUEST_PAGE_SIZE,
        }
    })
}

#[derive(Debug, Deserialize)]
pub struct GraphQLResponse {
    pub data: Option<RepositoryData>,
    #[serde(default)]
    pub errors: Vec<GraphQLError>,
}

#[derive(Debug, Deserialize)]
pub struct GraphQLError {
    pub message: String,
    #[serde(rename = "type")]
    pub kind: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RepositoryData {
    pub repository: Option<GraphQLRepository>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphQLRepository {
    pub pull_requests: Option<Connection<GraphQLPullRequest>>,
}

/// A GraphQL connection; individual nodes may be null.
#[derive(Debug, Deserialize)]
pub struct Connection<T> {
    pub nodes: Option<Vec<Option<T>>>,
}

impl<T> Connection<T> {
    fn into_nodes(self) -> impl Iterator<Item = T> {
        self.nodes.into_iter().flatten().flatten()
    }
}

#[derive(Debug, Deserialize)]
pub struct GraphQLActor {
    pub login: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphQLPullRequest {
    pub title: String,
    pub url: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub is_draft: bool,
    pub author: Option<GraphQLActor>,
    pub latest_reviews: Option<Connection<GraphQLReview>>,
    pub review_requests: Option<Connection<GraphQLReviewRequest>>,
}

#[derive(Debug, Deserialize)]
pub struct GraphQLReview {
    pub author: Option<GraphQLActor>,
    pub state: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphQLReviewRequest {
    pub requested_reviewer: Option<GraphQLRequestedReviewer>,
}

#[derive(Debug, Deserialize)]
pub struct GraphQLRequestedReviewer {
    #[serde(rename = "__typename")]
    pub typename: String,
    pub login: Option<String>,
    pub slug: Option<String>,
}

fn author_login(actor: Option<GraphQLActor>) -> String {
    actor
        .map(|a| a.login)
        .unwrap_or_else(|| GHOST_LOGIN.to_string())
}

/// Converts a requested reviewer into a [`ReviewRequest`]. Users without a
/// login cannot be matched against anyone and are kept as `Other`.
pub fn convert_requested_reviewer(reviewer: GraphQLRequestedReviewer) -> ReviewRequest {
    match (reviewer.typename.as_str(), reviewer.login, reviewer.slug) {
        ("User", Some(login), _) => ReviewRequest::User { login },
        ("Team", _, Some(slug)) => ReviewRequest::Team { slug },
        _ => ReviewRequest::Other {
            typename: reviewer.typename,
        },
    }
}

pub fn convert_graphql_pr(repository: &RepositoryRef, pr: GraphQLPullRequest) -> RawPullRequest {
    let latest_reviews = pr
        .latest_reviews
        .map(|reviews| {
            reviews
                .into_nodes()
                .map(|review| LatestReview {
                    author_login: author_login(review.author),
                    state: ReviewState::from_graphql(&review.state),
                })
                .collect()
        })
        .unwrap_or_default();

    let review_requests = pr
        .review_requests
        .map(|requests| {
            requests
                .into_nodes()
                .filter_map(|request| request.requested_reviewer)
                .map(convert_requested_reviewer)
                .collect()
        })
        .unwrap_or_default();

    RawPullRequest {
        repository: repository.clone(),
        author_login: author_login(pr.author),
        title: pr.title,
        url: pr.url,
        created_at: pr.created_at,
        is_draft: pr.is_draft,
        latest_reviews,
        review_requests,
    }
}

/// Decodes a raw response body and converts it. A body that does not match
/// the expected response types is a [`QueryError::DataShape`].
pub fn parse_response(
    repository: &RepositoryRef,
    body: serde_json::Value,
) -> Result<Vec<RawPullRequest>, QueryError> {
    let response: GraphQLResponse = serde_json::from_value(body).map_err(|err| {
        QueryError::DataShape(format!("malformed response for {repository}: {err}"))
    })?;
    convert_response(repository, response)
}

/// Turns a repository query response into pull requests.
pub fn convert_response(
    repository: &RepositoryRef,
    response: GraphQLResponse,
) -> Result<Vec<RawPullRequest>, QueryError> {
    let GraphQLResponse { data, errors } = response;
    let messages = || {
        errors
            .iter()
            .map(|e| e.message.as_str())
            .collect::<Vec<_>>()
            .join("; ")
    };

    let Some(data) = data else {
        if errors.is_empty() {
            return Err(QueryError::DataShape("response has no data".to_string()));
        }
        return Err(QueryError::Other(anyhow::anyhow!(
            "GraphQL errors: {}",
            messages()
        )));
    };

    let Some(graphql_repo) = data.repository else {
        if errors
            .iter()
            .any(|e| e.kind.as_deref() == Some("NOT_FOUND"))
        {
            return Err(QueryError::Other(anyhow::anyhow!(
                "repository {repository} not found: {}",
                messages()
            )));
        }
        return Err(QueryError::DataShape(format!(
            "repository {repository} is null"
        )));
    };

    if !errors.is_empty() {
        warn!(
            repository = %repository,
            errors = %messages(),
            "partial GraphQL response"
        );
    }

    let nodes = graphql_repo
        .pull_requests
        .and_then(|connection| connection.nodes)
        .ok_or_else(|| {
            QueryError::DataShape(format!("repository {repository} has no pull request nodes"))
        })?;

    let total = nodes.len();
    let prs: Vec<RawPullRequest> = nodes
        .into_iter()
        .flatten()
        .map(|pr| convert_graphql_pr(repository, pr))
        .collect();

    if prs.len() != total {
        warn!(
            repository = %repository,
            skipped = total - prs.len(),
            "skipped null pull request nodes"
        );
    }

    Ok(prs)
}
