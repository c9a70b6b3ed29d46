use crate::error::{DictionaryError, Result};
use chrono::{Local, NaiveDate};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use wordbook_kv_store::{get_json, keys, DurableStore, StoreError, TransactionalWriter};

pub const DEFAULT_COST_PER_CALL: f64 = 0.001;
pub const DEFAULT_DAILY_LIMIT: u64 = 100;

/// Date-scoped counter of metered generation calls, stored under `usage-stats`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageStats {
    pub date: NaiveDate,
    pub count: u64,
    pub estimated_cost: f64,
}

impl UsageStats {
    fn empty(date: NaiveDate) -> Self {
        Self {
            date,
            count: 0,
            estimated_cost: 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QuotaStatus {
    pub used: u64,
    pub limit: u64,
    pub remaining: u64,
    pub exceeded: bool,
}

/// Advisory quota bookkeeping. Callers consult [`UsageTracker::check`]
/// before expensive paths; nothing here blocks a request.
pub struct UsageTracker {
    store: Arc<dyn DurableStore>,
    writer: TransactionalWriter,
    cost_per_call: f64,
}

impl UsageTracker {
    pub fn new(store: Arc<dyn DurableStore>, cost_per_call: f64) -> Self {
        let writer = TransactionalWriter::new(store.clone());
        Self {
            store,
            writer,
            cost_per_call: cost_per_call.max(0.0),
        }
    }

    #[must_use]
    pub fn cost_per_call(&self) -> f64 {
        self.cost_per_call
    }

    pub async fn record(&self, calls: u32) -> Result<Option<UsageStats>> {
        self.record_on(today(), calls).await
    }

    /// Adds `calls` to the counter for `date`, resetting it first when the
    /// stored date differs. Zero calls writes nothing.
    pub async fn record_on(&self, date: NaiveDate, calls: u32) -> Result<Option<UsageStats>> {
        if calls == 0 {
            return Ok(None);
        }
        let cost_per_call = self.cost_per_call;
        let updated = self
            .writer
            .apply_json(keys::USAGE_STATS, |current: Option<UsageStats>| {
                let mut stats = match current {
                    Some(stats) if stats.date == date => stats,
                    Some(stale) => {
                        log::info!(
                            "Usage counter rolled over from {} to {date}",
                            stale.date
                        );
                        UsageStats::empty(date)
                    }
                    None => UsageStats::empty(date),
                };
                stats.count += u64::from(calls);
                stats.estimated_cost += f64::from(calls) * cost_per_call;
                Ok::<_, DictionaryError>(stats)
            })
            .await?;
        Ok(Some(updated))
    }

    pub async fn current(&self) -> Result<UsageStats> {
        self.current_on(today()).await
    }

    /// Usage for `date`. A stored counter from another date reads as zero.
    pub async fn current_on(&self, date: NaiveDate) -> Result<UsageStats> {
        let stored = match get_json::<UsageStats>(self.store.as_ref(), keys::USAGE_STATS).await {
            Ok(stored) => stored,
            Err(StoreError::SerializationError(err)) => {
                log::warn!("Ignoring corrupt usage stats: {err}");
                None
            }
            Err(err) => return Err(err.into()),
        };
        Ok(stored
            .filter(|stats| stats.date == date)
            .unwrap_or_else(|| UsageStats::empty(date)))
    }

    pub async fn check(&self, limit: u64) -> Result<QuotaStatus> {
        self.check_on(today(), limit).await
    }

    pub async fn check_on(&self, date: NaiveDate, limit: u64) -> Result<QuotaStatus> {
        let used = self.current_on(date).await?.count;
        Ok(QuotaStatus {
            used,
            limit,
            remaining: limit.saturating_sub(used),
            exceeded: used >= limit,
        })
    }
}

fn today() -> NaiveDate {
    Local::now().date_naive()
}
