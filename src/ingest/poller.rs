//! Background ingestion loop: conditional fetch, apply, rolling trim.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;

use super::feed_client::{FeedClient, FetchOutcome};
use crate::domain::FeedBody;
use crate::error::GatewayError;
use crate::persistence::models::record_to_fields;
use crate::persistence::{KeyValueStore, WriteOp, keys};

/// Outcome of one successful tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickReport {
    /// The upstream answered not-modified; the store was not touched.
    NotModified,
    /// A fresh body was applied.
    Applied {
        /// Profiles written to the store.
        accepted: usize,
        /// Items dropped: other chain, no token address, or not a profile
        /// object.
        skipped: usize,
        /// Index entries removed by the rolling trim, both indexes summed.
        trimmed: u64,
    },
}

/// Mirrors the upstream feed into the store for a single chain.
#[derive(Debug)]
pub struct Poller {
    store: Arc<dyn KeyValueStore>,
    feed: FeedClient,
    chain: String,
    ttl: Option<Duration>,
    interval: Duration,
}

impl Poller {
    /// Creates a poller ingesting only `chain`.
    ///
    /// `ttl` is both the record expiry and the width of the recency window;
    /// `None` disables both.
    #[must_use]
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        feed: FeedClient,
        chain: impl Into<String>,
        ttl: Option<Duration>,
        interval: Duration,
    ) -> Self {
        Self {
            store,
            feed,
            chain: chain.into(),
            ttl,
            interval,
        }
    }

    /// Runs one fetch/apply/trim cycle at the current time.
    ///
    /// # Errors
    ///
    /// See [`Poller::tick_at`].
    pub async fn tick(&self) -> Result<TickReport, GatewayError> {
        self.tick_at(Utc::now().timestamp_millis()).await
    }

    /// Runs one cycle using `now_ms` as the last-seen score.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Upstream`] when the feed is unreachable or
    /// answers an error status, [`GatewayError::MalformedPayload`] when the
    /// body has neither accepted shape, and [`GatewayError::Store`] when a
    /// store command fails. In every case the validation token is left as
    /// it was, so the next tick fetches the full body again.
    pub async fn tick_at(&self, now_ms: i64) -> Result<TickReport, GatewayError> {
        let etag = self.store.get(keys::FEED_ETAG).await?;

        let (body, new_etag) = match self.feed.fetch(etag.as_deref()).await? {
            FetchOutcome::NotModified => return Ok(TickReport::NotModified),
            FetchOutcome::Fresh { body, etag } => (body, etag),
        };

        let decoded = FeedBody::parse(&body)?.into_profiles();
        let chain_index = keys::latest_for_chain(&self.chain);
        #[allow(clippy::cast_precision_loss)]
        let score = now_ms as f64;

        let mut ops = Vec::new();
        let mut accepted = 0;
        let mut skipped = decoded.undecodable;
        for profile in decoded.profiles {
            if profile.chain_id != self.chain || profile.token_address.is_empty() {
                skipped += 1;
                continue;
            }
            let record = profile.into_record(now_ms);
            let key = keys::token(&record.token_address);

            ops.push(WriteOp::HashSet {
                key: key.clone(),
                fields: record_to_fields(&record),
            });
            if let Some(ttl) = self.ttl {
                ops.push(WriteOp::Expire { key, ttl });
            }
            ops.push(WriteOp::SortedSetAdd {
                key: keys::LATEST_ALL.to_string(),
                member: record.token_address.clone(),
                score,
            });
            ops.push(WriteOp::SortedSetAdd {
                key: chain_index.clone(),
                member: record.token_address,
                score,
            });
            accepted += 1;
        }

        if !ops.is_empty() {
            self.store.apply_batch(ops).await?;
        }
        if let Some(etag) = new_etag {
            self.store.set(keys::FEED_ETAG, &etag, None).await?;
        }

        let trimmed = self.trim(now_ms).await?;

        Ok(TickReport::Applied {
            accepted,
            skipped,
            trimmed,
        })
    }

    /// Drops index entries last seen before `now_ms - ttl` from the
    /// all-chain and chain indexes.
    async fn trim(&self, now_ms: i64) -> Result<u64, GatewayError> {
        let Some(ttl) = self.ttl else {
            return Ok(0);
        };
        let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
        #[allow(clippy::cast_precision_loss)]
        let cutoff = now_ms.saturating_sub(ttl_ms) as f64;

        let mut removed = self
            .store
            .sorted_set_remove_below(keys::LATEST_ALL, cutoff)
            .await?;
        removed += self
            .store
            .sorted_set_remove_below(&keys::latest_for_chain(&self.chain), cutoff)
            .await?;
        Ok(removed)
    }

    /// Ticks, then waits `interval`, until `cancel` fires.
    ///
    /// A failed tick is logged and retried on the next interval. Both the
    /// tick and the wait are abandoned as soon as `cancel` fires.
    pub async fn run(self, cancel: CancellationToken) {
        tracing::info!(
            url = %self.feed.url(),
            chain = %self.chain,
            interval_secs = self.interval.as_secs(),
            "poller started"
        );

        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                result = self.tick() => log_tick(&result),
            }

            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                () = tokio::time::sleep(self.interval) => {}
            }
        }

        tracing::info!("poller stopped");
    }
}

fn log_tick(result: &Result<TickReport, GatewayError>) {
    match result {
        Ok(TickReport::NotModified) => tracing::debug!("feed not modified"),
        Ok(TickReport::Applied {
            accepted,
            skipped,
            trimmed,
        }) => tracing::info!(accepted, skipped, trimmed, "feed applied"),
        Err(e) => tracing::warn!(error = %e, "poll tick failed"),
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::ingest::testing::FakeFeed;
    use crate::persistence::MemoryStore;
    use crate::service::TokenRepository;

    const HOUR_MS: i64 = 3_600_000;

    fn profile(chain: &str, address: &str, description: &str) -> String {
        format!(
            r#"{{"url":"https://dexscreener.com/{chain}/{address}","chainId":"{chain}","tokenAddress":"{address}","description":"{description}","links":[{{"type":"twitter","url":"https://x.com/{address}"}}]}}"#
        )
    }

    async fn setup(ttl: Option<Duration>) -> (FakeFeed, Arc<MemoryStore>, Poller, TokenRepository) {
        let feed = FakeFeed::start().await;
        let store = Arc::new(MemoryStore::new());
        let shared = Arc::clone(&store) as Arc<dyn KeyValueStore>;
        let Ok(client) = FeedClient::new(feed.url(), Duration::from_secs(5)) else {
            panic!("client build failed");
        };
        let poller = Poller::new(
            Arc::clone(&shared),
            client,
            "solana",
            ttl,
            Duration::from_secs(3600),
        );
        (feed, store, poller, TokenRepository::new(shared))
    }

    async fn addresses(repo: &TokenRepository, chain: Option<&str>) -> Vec<String> {
        let listed = match chain {
            Some(chain) => repo.list_latest_by_chain(chain, 0, 50).await,
            None => repo.list_latest(0, 50).await,
        };
        let Ok(records) = listed else {
            panic!("listing failed");
        };
        records.into_iter().map(|r| r.token_address).collect()
    }

    #[tokio::test]
    async fn only_the_configured_chain_is_ingested() {
        let (feed, _, poller, repo) = setup(None).await;
        feed.serve(
            format!(
                "[{},{}]",
                profile("solana", "SoL1", "sol"),
                profile("ethereum", "0xE1", "eth")
            ),
            None,
        )
        .await;

        let Ok(report) = poller.tick_at(1_000).await else {
            panic!("tick failed");
        };
        assert_eq!(
            report,
            TickReport::Applied {
                accepted: 1,
                skipped: 1,
                trimmed: 0
            }
        );
        assert_eq!(addresses(&repo, Some("solana")).await, vec!["SoL1"]);
        assert!(addresses(&repo, Some("ethereum")).await.is_empty());
        assert!(matches!(repo.get_by_address("0xE1").await, Ok(None)));
    }

    #[tokio::test]
    async fn one_bad_item_does_not_stall_the_page() {
        let (feed, store, poller, repo) = setup(None).await;
        feed.serve(
            format!(
                r#"[{},{{"links":[{{"type":"twitter","label":null,"url":null}}]}},{{"tokenAddress":[1]}}]"#,
                profile("solana", "Good1", "good")
            ),
            Some("\"v1\""),
        )
        .await;

        let Ok(report) = poller.tick_at(1_000).await else {
            panic!("tick failed");
        };
        assert_eq!(
            report,
            TickReport::Applied {
                accepted: 1,
                skipped: 2,
                trimmed: 0
            }
        );
        assert_eq!(addresses(&repo, Some("solana")).await, vec!["Good1"]);
        assert!(matches!(store.get(keys::FEED_ETAG).await, Ok(Some(e)) if e == "\"v1\""));
    }

    #[tokio::test]
    async fn wrapped_body_shape_is_accepted() {
        let (feed, _, poller, repo) = setup(None).await;
        feed.serve(
            format!(r#"{{"profiles":[{}]}}"#, profile("solana", "Wrap1", "w")),
            None,
        )
        .await;
        assert!(poller.tick_at(1_000).await.is_ok());
        assert_eq!(addresses(&repo, None).await, vec!["Wrap1"]);
    }

    #[tokio::test]
    async fn reingest_updates_fields_and_moves_to_front() {
        let (feed, _, poller, repo) = setup(None).await;
        feed.serve(
            format!(
                "[{},{}]",
                profile("solana", "A", "first"),
                profile("solana", "B", "b")
            ),
            None,
        )
        .await;
        assert!(poller.tick_at(1_000).await.is_ok());

        feed.serve(format!("[{}]", profile("solana", "B", "b")), None)
            .await;
        assert!(poller.tick_at(2_000).await.is_ok());
        assert_eq!(addresses(&repo, Some("solana")).await, vec!["B", "A"]);

        feed.serve(format!("[{}]", profile("solana", "A", "second")), None)
            .await;
        assert!(poller.tick_at(3_000).await.is_ok());
        assert_eq!(addresses(&repo, Some("solana")).await, vec!["A", "B"]);

        let Ok(Some(a)) = repo.get_by_address("A").await else {
            panic!("A missing");
        };
        assert_eq!(a.description, "second");
        assert_eq!(a.last_seen_ms, Some(3_000));
    }

    #[tokio::test]
    async fn not_modified_leaves_records_untouched() {
        let (feed, store, poller, repo) = setup(None).await;
        feed.serve(format!("[{}]", profile("solana", "Keep", "v1")), Some("\"v1\""))
            .await;
        assert!(poller.tick_at(1_000).await.is_ok());
        assert!(matches!(store.get(keys::FEED_ETAG).await, Ok(Some(t)) if t == "\"v1\""));

        let Ok(report) = poller.tick_at(5_000).await else {
            panic!("not-modified tick failed");
        };
        assert_eq!(report, TickReport::NotModified);
        assert_eq!(feed.last_if_none_match().await.as_deref(), Some("\"v1\""));

        let Ok(Some(kept)) = repo.get_by_address("Keep").await else {
            panic!("record missing");
        };
        assert_eq!(kept.last_seen_ms, Some(1_000));
    }

    #[tokio::test]
    async fn malformed_body_changes_nothing() {
        let (feed, store, poller, repo) = setup(None).await;
        feed.serve(r#"{"unexpected":true}"#, Some("\"bad\"")).await;

        let result = poller.tick_at(1_000).await;
        assert!(matches!(result, Err(GatewayError::MalformedPayload(_))));
        assert!(matches!(store.get(keys::FEED_ETAG).await, Ok(None)));
        assert!(addresses(&repo, None).await.is_empty());
    }

    #[tokio::test]
    async fn upstream_error_status_is_reported() {
        let (feed, store, poller, _) = setup(None).await;
        feed.fail_with(503).await;
        assert!(matches!(
            poller.tick_at(1_000).await,
            Err(GatewayError::Upstream(_))
        ));
        assert!(matches!(store.get(keys::FEED_ETAG).await, Ok(None)));
    }

    #[tokio::test]
    async fn entries_older_than_ttl_are_trimmed_from_both_indexes() {
        let (feed, store, poller, _) = setup(Some(Duration::from_secs(3600))).await;
        feed.serve(format!("[{}]", profile("solana", "Old", "o")), None)
            .await;
        assert!(poller.tick_at(HOUR_MS).await.is_ok());

        feed.serve(format!("[{}]", profile("solana", "New", "n")), None)
            .await;
        let Ok(report) = poller.tick_at(3 * HOUR_MS).await else {
            panic!("tick failed");
        };
        assert_eq!(
            report,
            TickReport::Applied {
                accepted: 1,
                skipped: 0,
                trimmed: 2
            }
        );

        for index in [keys::LATEST_ALL.to_string(), keys::latest_for_chain("solana")] {
            let Ok(members) = store.sorted_set_rev_range(&index, 0, 10).await else {
                panic!("range failed");
            };
            assert_eq!(members, vec!["New"], "index {index}");
        }
    }

    #[tokio::test]
    async fn run_exits_promptly_on_cancel() {
        let (feed, _, poller, repo) = setup(None).await;
        feed.serve(format!("[{}]", profile("solana", "Loop", "l")), None)
            .await;

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(poller.run(cancel.clone()));

        for _ in 0..100 {
            if !addresses(&repo, None).await.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(addresses(&repo, None).await, vec!["Loop"]);

        cancel.cancel();
        let joined = tokio::time::timeout(Duration::from_secs(1), handle).await;
        assert!(matches!(joined, Ok(Ok(()))), "poller kept waiting after cancel");
    }
}
