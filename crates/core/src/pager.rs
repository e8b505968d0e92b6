//! Pagination merger
//!
//! Drives repeated `list` calls against the remote client and merges the
//! continuation pages into one ordered result. Each page fetch runs under the
//! bounded retry; a page that exhausts its budget fails the whole listing and
//! no partial result is returned.

use crate::error::{Error, Result};
use crate::metadata::BlobMetadata;
use crate::query::Query;
use crate::retry::{RetryPolicy, retry_with_backoff};
use crate::traits::RemoteClient;

/// Outcome of an exact-name lookup
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup {
    Found(BlobMetadata),
    NotFound,
}

impl Lookup {
    pub fn is_found(&self) -> bool {
        matches!(self, Lookup::Found(_))
    }
}

/// List every record under the query prefix, following continuation tokens
///
/// Records come back hydrated (see [`BlobMetadata::hydrate`]) and in remote
/// order. Filters are not applied here.
pub async fn list_all(
    client: &dyn RemoteClient,
    query: &Query,
    page_size: u32,
    retry: &RetryPolicy,
) -> Result<Vec<BlobMetadata>> {
    let prefix = query.prefix.as_str();
    let page_size = page_size.max(1);
    let operation = format!("list '{prefix}'");

    let mut records = Vec::new();
    let mut token: Option<String> = None;
    let mut pages = 0usize;

    loop {
        let current = token.clone();
        let page = retry_with_backoff(
            retry,
            &operation,
            move || client.list(prefix, page_size, current.clone()),
            Error::is_transient,
        )
        .await?;

        pages += 1;
        tracing::debug!(
            prefix,
            page = pages,
            records = page.records.len(),
            more = page.next_token.is_some(),
            "Fetched listing page"
        );
        records.extend(page.records.into_iter().map(BlobMetadata::hydrate));

        match page.next_token {
            Some(next) if !next.is_empty() => {
                if token.as_deref() == Some(next.as_str()) {
                    return Err(Error::General(format!(
                        "Listing of '{prefix}' returned the same continuation token twice"
                    )));
                }
                token = Some(next);
            }
            _ => break,
        }
    }

    Ok(records)
}

/// Resolve one object by exact name with a single-result listing
///
/// Absence is `Lookup::NotFound`, not an error. A record whose name merely
/// starts with `name` does not count.
pub async fn lookup(client: &dyn RemoteClient, name: &str, retry: &RetryPolicy) -> Result<Lookup> {
    let operation = format!("lookup '{name}'");
    let page = retry_with_backoff(
        retry,
        &operation,
        || client.list(name, 1, None),
        Error::is_transient,
    )
    .await?;

    let found = page
        .records
        .into_iter()
        .find(|r| r.name == name)
        .map(BlobMetadata::hydrate);

    tracing::debug!(name, found = found.is_some(), "Resolved object metadata");
    Ok(found.map_or(Lookup::NotFound, Lookup::Found))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MemoryClient, Op};
    use crate::metadata::CONTENT_LENGTH;
    use crate::profile::RetryConfig;

    fn fast_retry() -> RetryPolicy {
        RetryPolicy::from_config(&RetryConfig {
            max_attempts: 2,
            initial_backoff_ms: 1,
            max_backoff_ms: 2,
        })
    }

    #[tokio::test]
    async fn test_list_all_follows_tokens_in_order() {
        let client = MemoryClient::new();
        for name in ["k/e", "k/a", "k/c", "k/b", "k/d"] {
            client.insert(name, vec![1, 2]);
        }

        let records = list_all(&client, &Query::new("k/"), 2, &fast_retry())
            .await
            .unwrap();
        let names: Vec<_> = records.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["k/a", "k/b", "k/c", "k/d", "k/e"]);
        assert_eq!(client.calls(Op::List), 3);
        assert!(records.iter().all(|r| r.metadata.get(CONTENT_LENGTH) == Some("2")));
    }

    #[tokio::test]
    async fn test_list_all_empty_first_page() {
        let client = MemoryClient::new();
        let records = list_all(&client, &Query::new("none/"), 10, &fast_retry())
            .await
            .unwrap();
        assert!(records.is_empty());
        assert_eq!(client.calls(Op::List), 1);
    }

    #[tokio::test]
    async fn test_lookup_exact_name() {
        let client = MemoryClient::new();
        client.insert("config.toml", b"x".to_vec());
        client.insert("config.toml.bak", b"yy".to_vec());

        let found = lookup(&client, "config.toml", &fast_retry()).await.unwrap();
        assert!(matches!(found, Lookup::Found(meta) if meta.size == 1));

        let missing = lookup(&client, "config", &fast_retry()).await.unwrap();
        assert_eq!(missing, Lookup::NotFound);
    }

    #[tokio::test]
    async fn test_lookup_exhaustion() {
        let client = MemoryClient::new();
        client.fail_next(Op::List, 2);
        let err = lookup(&client, "x", &fast_retry()).await.unwrap_err();
        assert!(matches!(err, Error::RetryExhausted { attempts: 2, .. }));
    }
}
