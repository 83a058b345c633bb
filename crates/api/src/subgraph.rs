//! GraphQL client for the borrower-enumeration subgraph.
//!
//! Used by the Tracker's bootstrap step to populate `AllKnown` when the
//! Watchlist Store has no prior record of the account universe.

use alloy::primitives::Address;
use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

const QUERY: &str = r#"
query GetAccounts($first: Int!, $lastID: ID!) {
  users(
    first: $first
    where: { id_gt: $lastID, borrowedReservesCount_gt: 0 }
    orderBy: id
    orderDirection: asc
  ) {
    id
  }
}
"#;

#[derive(Debug, Serialize)]
struct GraphQLRequest<'a> {
    query: &'a str,
    variables: Variables,
}

#[derive(Debug, Serialize)]
struct Variables {
    first: u32,
    #[serde(rename = "lastID")]
    last_id: String,
}

#[derive(Debug, Deserialize)]
struct GraphQLResponse {
    #[serde(default)]
    data: Option<UsersData>,
    #[serde(default)]
    errors: Option<Vec<GraphQLError>>,
}

#[derive(Debug, Deserialize)]
struct GraphQLError {
    message: String,
}

#[derive(Debug, Deserialize)]
struct UsersData {
    users: Vec<UserEntry>,
}

#[derive(Debug, Deserialize)]
struct UserEntry {
    id: String,
}

/// Client for the borrower-enumeration subgraph.
pub struct SubgraphClient {
    client: reqwest::Client,
    endpoint: String,
}

/// Batch size used for each page of the subgraph query.
pub const PAGE_SIZE: u32 = 1000;

impl SubgraphClient {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
        }
    }

    /// Enumerate every address with at least one borrowed reserve,
    /// paginating by ascending id until a page returns fewer than
    /// `PAGE_SIZE` results.
    #[instrument(skip(self))]
    pub async fn fetch_all_borrowers(&self) -> Result<Vec<Address>> {
        let mut out = Vec::new();
        let mut last_id = String::from("0x0000000000000000000000000000000000000000");

        loop {
            let page = self.fetch_page(PAGE_SIZE, &last_id).await?;
            let page_len = page.len();
            debug!(page_len, last_id = %last_id, "Fetched subgraph page");

            if page_len == 0 {
                break;
            }

            if let Some(last) = page.last() {
                last_id = format!("{:#x}", last);
            }
            out.extend(page);

            if page_len < PAGE_SIZE as usize {
                break;
            }
        }

        info!(total = out.len(), "Subgraph borrower enumeration complete");
        Ok(out)
    }

    async fn fetch_page(&self, first: u32, last_id: &str) -> Result<Vec<Address>> {
        let request = GraphQLRequest {
            query: QUERY,
            variables: Variables {
                first,
                last_id: last_id.to_string(),
            },
        };

        let response: GraphQLResponse = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await?
            .json()
            .await?;

        if let Some(errors) = response.errors {
            let joined = errors
                .into_iter()
                .map(|e| e.message)
                .collect::<Vec<_>>()
                .join("; ");
            warn!(error = %joined, "Subgraph returned errors");
            return Err(anyhow!("subgraph query failed: {joined}"));
        }

        let users = response
            .data
            .ok_or_else(|| anyhow!("subgraph response had no data"))?
            .users;

        users
            .into_iter()
            .map(|u| {
                u.id.parse::<Address>()
                    .map_err(|e| anyhow!("invalid address in subgraph response: {e}"))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_users_response() {
        let body = r#"{"data":{"users":[{"id":"0x0000000000000000000000000000000000000001"}]}}"#;
        let parsed: GraphQLResponse = serde_json::from_str(body).unwrap();
        let users = parsed.data.unwrap().users;
        assert_eq!(users.len(), 1);
        let expected: Address = "0x0000000000000000000000000000000000000001".parse().unwrap();
        assert_eq!(users[0].id.parse::<Address>().unwrap(), expected);
    }

    #[test]
    fn deserializes_error_response() {
        let body = r#"{"errors":[{"message":"bad query"}]}"#;
        let parsed: GraphQLResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.errors.unwrap()[0].message, "bad query");
    }
}
