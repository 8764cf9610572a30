//! Delivery log: persistence and queries for delivery records.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

use crate::error::{WebhookError, WebhookResult};
use crate::record::{DeliveryRecord, DeliverySummary};

/// Failure analytics row grouped by webhook, event type, status and day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryAggregate {
    pub webhook_id: String,
    pub event_type: String,
    /// Last observed status; `None` when no response was ever received.
    pub status_code: Option<u16>,
    /// UTC day the deliveries were created.
    pub day: NaiveDate,
    /// Deliveries in the group.
    pub total: u64,
    /// Terminal deliveries that did not succeed.
    pub failed: u64,
}

/// Trait for delivery log backends.
///
/// Writes are atomic per `delivery_id`. Terminal records are immutable: every
/// write to one fails with [`WebhookError::RecordFinalized`].
#[async_trait]
pub trait DeliveryLog: Send + Sync {
    /// Inserts or replaces a record.
    async fn upsert(&self, record: &DeliveryRecord) -> WebhookResult<()>;

    /// Replaces an existing record; fails with `NotFound` if it was removed.
    async fn update(&self, record: &DeliveryRecord) -> WebhookResult<()>;

    /// Gets a record by delivery id.
    async fn get(&self, delivery_id: &str) -> WebhookResult<Option<DeliveryRecord>>;

    /// Lists a webhook's deliveries, newest first.
    async fn list(
        &self,
        webhook_id: &str,
        since: Option<DateTime<Utc>>,
        limit: usize,
    ) -> WebhookResult<Vec<DeliverySummary>>;

    /// Deletes every record of a webhook, returning how many were removed.
    async fn delete_for_webhook(&self, webhook_id: &str) -> WebhookResult<usize>;

    /// Aggregates deliveries by `(webhook_id, event_type, status_code, day)`.
    async fn failure_stats(
        &self,
        webhook_id: Option<&str>,
        since: Option<DateTime<Utc>>,
    ) -> WebhookResult<Vec<DeliveryAggregate>>;

    /// Deletes terminal records older than `days`, returning how many were removed.
    async fn cleanup_older_than(&self, days: u32) -> WebhookResult<usize>;
}

struct Row {
    webhook_id: String,
    created_at: DateTime<Utc>,
    record: Mutex<DeliveryRecord>,
}

impl Row {
    fn new(record: &DeliveryRecord) -> Self {
        Self {
            webhook_id: record.webhook_id.clone(),
            created_at: record.created_at,
            record: Mutex::new(record.clone()),
        }
    }

    async fn replace(&self, record: &DeliveryRecord) -> WebhookResult<()> {
        let mut current = self.record.lock().await;
        if current.is_terminal() {
            return Err(WebhookError::RecordFinalized(current.delivery_id.clone()));
        }
        *current = record.clone();
        Ok(())
    }
}

/// In-memory delivery log.
///
/// Each record sits behind its own lock; the map lock is held for writing only
/// while rows are inserted or removed.
pub struct InMemoryDeliveryLog {
    rows: RwLock<HashMap<String, Arc<Row>>>,
}

impl InMemoryDeliveryLog {
    /// Creates a new in-memory delivery log.
    pub fn new() -> Self {
        Self {
            rows: RwLock::new(HashMap::new()),
        }
    }

    async fn row(&self, delivery_id: &str) -> Option<Arc<Row>> {
        self.rows.read().await.get(delivery_id).cloned()
    }

    async fn rows_where(&self, keep: impl Fn(&Row) -> bool) -> Vec<Arc<Row>> {
        self.rows
            .read()
            .await
            .values()
            .filter(|row| keep(row))
            .cloned()
            .collect()
    }
}

impl Default for InMemoryDeliveryLog {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DeliveryLog for InMemoryDeliveryLog {
    async fn upsert(&self, record: &DeliveryRecord) -> WebhookResult<()> {
        if let Some(row) = self.row(&record.delivery_id).await {
            return row.replace(record).await;
        }

        let row = {
            let mut rows = self.rows.write().await;
            match rows.get(&record.delivery_id) {
                Some(existing) => existing.clone(),
                None => {
                    rows.insert(record.delivery_id.clone(), Arc::new(Row::new(record)));
                    return Ok(());
                }
            }
        };
        row.replace(record).await
    }

    async fn update(&self, record: &DeliveryRecord) -> WebhookResult<()> {
        let row = self
            .row(&record.delivery_id)
            .await
            .ok_or_else(|| WebhookError::NotFound(record.delivery_id.clone()))?;
        row.replace(record).await
    }

    async fn get(&self, delivery_id: &str) -> WebhookResult<Option<DeliveryRecord>> {
        match self.row(delivery_id).await {
            Some(row) => Ok(Some(row.record.lock().await.clone())),
            None => Ok(None),
        }
    }

    async fn list(
        &self,
        webhook_id: &str,
        since: Option<DateTime<Utc>>,
        limit: usize,
    ) -> WebhookResult<Vec<DeliverySummary>> {
        let mut rows = self
            .rows_where(|row| row.webhook_id == webhook_id && since.map_or(true, |s| row.created_at >= s))
            .await;
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        rows.truncate(limit);

        let mut summaries = Vec::with_capacity(rows.len());
        for row in rows {
            summaries.push(row.record.lock().await.summary());
        }
        Ok(summaries)
    }

    async fn delete_for_webhook(&self, webhook_id: &str) -> WebhookResult<usize> {
        let mut rows = self.rows.write().await;
        let before = rows.len();
        rows.retain(|_, row| row.webhook_id != webhook_id);
        Ok(before - rows.len())
    }

    async fn failure_stats(
        &self,
        webhook_id: Option<&str>,
        since: Option<DateTime<Utc>>,
    ) -> WebhookResult<Vec<DeliveryAggregate>> {
        let rows = self
            .rows_where(|row| {
                webhook_id.map_or(true, |id| row.webhook_id == id)
                    && since.map_or(true, |s| row.created_at >= s)
            })
            .await;

        let mut groups: BTreeMap<(String, String, Option<u16>, NaiveDate), (u64, u64)> = BTreeMap::new();
        for row in rows {
            let record = row.record.lock().await;
            let key = (
                record.webhook_id.clone(),
                record.event_type.clone(),
                record.status_code,
                record.created_at.date_naive(),
            );
            let counts = groups.entry(key).or_default();
            counts.0 += 1;
            if record.is_terminal() && !record.success {
                counts.1 += 1;
            }
        }

        Ok(groups
            .into_iter()
            .map(|((webhook_id, event_type, status_code, day), (total, failed))| DeliveryAggregate {
                webhook_id,
                event_type,
                status_code,
                day,
                total,
                failed,
            })
            .collect())
    }

    async fn cleanup_older_than(&self, days: u32) -> WebhookResult<usize> {
        let cutoff = Utc::now() - chrono::Duration::days(i64::from(days));
        let candidates = self.rows_where(|row| row.created_at < cutoff).await;

        let mut expired = Vec::new();
        for row in candidates {
            let record = row.record.lock().await;
            if record.is_terminal() {
                expired.push(record.delivery_id.clone());
            }
        }

        let mut rows = self.rows.write().await;
        for delivery_id in &expired {
            rows.remove(delivery_id);
        }
        Ok(expired.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::DeliveryFailure;
    use marketplace_events::Event;

    fn record(webhook_id: &str, event_type: &str) -> DeliveryRecord {
        let event = Event::simple("acct_1", event_type, serde_json::json!({}));
        DeliveryRecord::for_event(webhook_id, &event, 3).unwrap()
    }

    #[tokio::test]
    async fn test_upsert_and_get() {
        let log = InMemoryDeliveryLog::new();
        let mut rec = record("wh_1", "credits.low");

        log.upsert(&rec).await.unwrap();
        rec.record_failure(&DeliveryFailure::Timeout);
        log.upsert(&rec).await.unwrap();

        let stored = log.get(&rec.delivery_id).await.unwrap().unwrap();
        assert_eq!(stored.attempts, 1);
        assert!(log.get("dlv_missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_terminal_record_is_immutable() {
        let log = InMemoryDeliveryLog::new();
        let mut rec = record("wh_1", "credits.low");
        rec.record_success(200, None);
        log.upsert(&rec).await.unwrap();

        rec.success = false;
        let result = log.upsert(&rec).await;
        assert!(matches!(result, Err(WebhookError::RecordFinalized(_))));
        assert!(matches!(log.update(&rec).await, Err(WebhookError::RecordFinalized(_))));

        let stored = log.get(&rec.delivery_id).await.unwrap().unwrap();
        assert!(stored.success);
    }

    #[tokio::test]
    async fn test_update_requires_existing_row() {
        let log = InMemoryDeliveryLog::new();
        let rec = record("wh_1", "credits.low");

        assert!(matches!(log.update(&rec).await, Err(WebhookError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_list_newest_first_with_limit_and_since() {
        let log = InMemoryDeliveryLog::new();
        let mut ids = Vec::new();
        for offset in [30, 20, 10] {
            let mut rec = record("wh_1", "usage.threshold");
            rec.created_at = Utc::now() - chrono::Duration::minutes(offset);
            log.upsert(&rec).await.unwrap();
            ids.push(rec.delivery_id);
        }
        log.upsert(&record("wh_2", "usage.threshold")).await.unwrap();

        let listed = log.list("wh_1", None, 10).await.unwrap();
        let listed_ids: Vec<_> = listed.iter().map(|s| s.delivery_id.clone()).collect();
        assert_eq!(listed_ids, vec![ids[2].clone(), ids[1].clone(), ids[0].clone()]);

        assert_eq!(log.list("wh_1", None, 2).await.unwrap().len(), 2);

        let since = Utc::now() - chrono::Duration::minutes(15);
        let recent = log.list("wh_1", Some(since), 10).await.unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].delivery_id, ids[2]);
    }

    #[tokio::test]
    async fn test_delete_for_webhook() {
        let log = InMemoryDeliveryLog::new();
        log.upsert(&record("wh_1", "credits.low")).await.unwrap();
        log.upsert(&record("wh_1", "credits.low")).await.unwrap();
        log.upsert(&record("wh_2", "credits.low")).await.unwrap();

        assert_eq!(log.delete_for_webhook("wh_1").await.unwrap(), 2);
        assert!(log.list("wh_1", None, 10).await.unwrap().is_empty());
        assert_eq!(log.list("wh_2", None, 10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_failure_stats_grouping() {
        let log = InMemoryDeliveryLog::new();

        for _ in 0..2 {
            let mut rec = record("wh_1", "credits.low");
            for _ in 0..3 {
                rec.record_failure(&DeliveryFailure::HttpStatus { status: 500, body: None });
            }
            log.upsert(&rec).await.unwrap();
        }

        let mut ok = record("wh_1", "credits.low");
        ok.record_success(200, None);
        log.upsert(&ok).await.unwrap();

        let mut yesterday = record("wh_1", "credits.low");
        yesterday.created_at = Utc::now() - chrono::Duration::days(1);
        yesterday.record_success(200, None);
        log.upsert(&yesterday).await.unwrap();

        log.upsert(&record("wh_2", "credits.low")).await.unwrap();

        let stats = log.failure_stats(Some("wh_1"), None).await.unwrap();
        assert_eq!(stats.len(), 3);

        let today = Utc::now().date_naive();
        let failed = stats
            .iter()
            .find(|s| s.status_code == Some(500) && s.day == today)
            .unwrap();
        assert_eq!((failed.total, failed.failed), (2, 2));

        let succeeded = stats
            .iter()
            .find(|s| s.status_code == Some(200) && s.day == today)
            .unwrap();
        assert_eq!((succeeded.total, succeeded.failed), (1, 0));

        let all = log.failure_stats(None, None).await.unwrap();
        assert!(all.iter().any(|s| s.webhook_id == "wh_2" && s.status_code.is_none()));
    }

    #[tokio::test]
    async fn test_cleanup_keeps_pending_records() {
        let log = InMemoryDeliveryLog::new();

        let mut old_done = record("wh_1", "credits.low");
        old_done.created_at = Utc::now() - chrono::Duration::days(40);
        old_done.record_success(200, None);
        log.upsert(&old_done).await.unwrap();

        let mut old_pending = record("wh_1", "credits.low");
        old_pending.created_at = Utc::now() - chrono::Duration::days(40);
        log.upsert(&old_pending).await.unwrap();

        log.upsert(&record("wh_1", "credits.low")).await.unwrap();

        assert_eq!(log.cleanup_older_than(30).await.unwrap(), 1);
        assert!(log.get(&old_done.delivery_id).await.unwrap().is_none());
        assert!(log.get(&old_pending.delivery_id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_concurrent_upserts_of_distinct_deliveries() {
        let log = Arc::new(InMemoryDeliveryLog::new());
        let mut handles = Vec::new();

        for _ in 0..32 {
            let log = log.clone();
            handles.push(tokio::spawn(async move {
                let mut rec = record("wh_1", "credits.low");
                log.upsert(&rec).await.unwrap();
                rec.record_failure(&DeliveryFailure::Timeout);
                log.update(&rec).await.unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let listed = log.list("wh_1", None, 100).await.unwrap();
        assert_eq!(listed.len(), 32);
        assert!(listed.iter().all(|s| s.attempts == 1));
    }
}
