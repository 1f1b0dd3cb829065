use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::warn;

use crate::config::TrackerSettings;
use crate::error::Result;
use crate::metrics::get_metrics;
use crate::models::{
    ErrorCategory, ErrorDetail, ErrorEntry, ErrorReport, RequestContext, Severity,
    ERROR_SCHEMA_VERSION,
};
use crate::store::SharedStore;

pub mod classify;
pub mod fingerprint;

pub use classify::{categorize, score_severity};
pub use fingerprint::fingerprint;

/// Store key for the recency-ordered fingerprint index.
const RECENT_ERRORS_KEY: &str = "errors:recent";

/// Caller-supplied overrides; explicit values take precedence over
/// derivation from the message.
#[derive(Debug, Clone, Copy, Default)]
pub struct TrackOptions {
    pub severity: Option<Severity>,
    pub category: Option<ErrorCategory>,
}

/// Rolling statistics for the current time bucket.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ErrorStats {
    pub window_secs: u64,
    pub window_start: i64,
    pub total: u64,
    pub by_category: HashMap<String, u64>,
    pub by_severity: HashMap<String, u64>,
}

/// Tracks raised errors: classifies, fingerprints, deduplicates against the
/// shared store, and accumulates windowed statistics.
///
/// `track` is fire-and-continue: classification happens inline, all store
/// work runs in a background task, and nothing propagates to the caller.
/// Store unavailability degrades tracking to local-only; critical errors
/// are always mirrored to process output so they are never silently lost.
#[derive(Clone)]
pub struct ErrorTracker {
    settings: TrackerSettings,
    store: Option<Arc<dyn SharedStore>>,
    environment: String,
}

impl ErrorTracker {
    pub fn new(
        settings: TrackerSettings,
        store: Option<Arc<dyn SharedStore>>,
        environment: impl Into<String>,
    ) -> Self {
        Self {
            settings,
            store,
            environment: environment.into(),
        }
    }

    /// Records an error occurrence and returns its fingerprint.
    ///
    /// Must be called from within a tokio runtime; the store round trips
    /// are spawned so the instrumented call path never waits on them.
    pub fn track(
        &self,
        error: &ErrorDetail,
        context: Option<RequestContext>,
        options: TrackOptions,
    ) -> String {
        let report = self.build_report(error, context, options);
        let fp = fingerprint(
            report.category,
            &report.error.message,
            report.error.stack.as_deref(),
            report.context.endpoint.as_deref(),
        );

        if report.severity.is_critical() {
            // Local fallback channel: critical errors must survive store
            // outages.
            tracing::error!(
                fingerprint = %fp,
                category = report.category.as_str(),
                endpoint = report.context.endpoint.as_deref().unwrap_or("-"),
                "Critical error tracked: {}",
                report.error.message
            );
        }

        let tracker = self.clone();
        let spawned_fp = fp.clone();
        tokio::spawn(async move {
            if let Err(e) = tracker.record_occurrence(&spawned_fp, &report).await {
                warn!(fingerprint = %spawned_fp, "Error tracking degraded to local-only: {}", e);
            }
        });

        fp
    }

    /// Classifies an error into a full report without recording it.
    pub fn build_report(
        &self,
        error: &ErrorDetail,
        context: Option<RequestContext>,
        options: TrackOptions,
    ) -> ErrorReport {
        let category = options
            .category
            .unwrap_or_else(|| categorize(&error.message));
        let severity = options
            .severity
            .unwrap_or_else(|| score_severity(&error.message, category));
        let context =
            context.unwrap_or_else(|| RequestContext::new(self.environment.clone()));

        ErrorReport {
            error: error.clone(),
            severity,
            category,
            context,
        }
    }

    /// Applies one occurrence to the store. Returns true when this was the
    /// first occurrence of the fingerprint within the retention window.
    ///
    /// The count bump is a single atomic hash-increment, so concurrent
    /// trackers on the same fingerprint never lose updates; the embedded
    /// report is written only by whichever tracker observed count == 1.
    pub async fn record_occurrence(&self, fp: &str, report: &ErrorReport) -> Result<bool> {
        let Some(store) = &self.store else {
            return Ok(false);
        };
        let store = store.as_ref();
        let retention = self.settings.retention_secs;
        let now = Utc::now();

        let entry_key = format!("errors:entry:{}", fp);
        let count = store.hash_incr(&entry_key, "count", 1).await?;
        let is_new = count == 1;

        if is_new {
            store
                .hash_set(&entry_key, "report", &serde_json::to_string(report)?)
                .await?;
            store
                .hash_set(&entry_key, "first_seen", &now.to_rfc3339())
                .await?;
            store.hash_set(&entry_key, "fingerprint", fp).await?;
            store
                .hash_set(
                    &entry_key,
                    "schema_version",
                    &ERROR_SCHEMA_VERSION.to_string(),
                )
                .await?;
        }
        store
            .hash_set(&entry_key, "last_seen", &now.to_rfc3339())
            .await?;
        store.expire(&entry_key, retention).await?;

        let limited = self.over_rate_limit(store, fp).await?;
        if is_new && !limited {
            store
                .list_push_trim(RECENT_ERRORS_KEY, fp, self.settings.max_recent, retention)
                .await?;
        }

        self.bump_bucket(store, report, now).await?;

        get_metrics().record_error_tracked(
            report.category.as_str(),
            report.severity.as_str(),
            is_new,
        );

        Ok(is_new)
    }

    async fn over_rate_limit(&self, store: &dyn SharedStore, fp: &str) -> Result<bool> {
        let limits = &self.settings.rate_limit;
        if !limits.enabled {
            return Ok(false);
        }

        let key = format!("errors:rl:{}", fp);
        let seen = store.incr_ex(&key, limits.window_secs).await?;
        if seen as u64 > limits.threshold {
            get_metrics().record_error_rate_limited();
            return Ok(true);
        }
        Ok(false)
    }

    async fn bump_bucket(
        &self,
        store: &dyn SharedStore,
        report: &ErrorReport,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let key = self.bucket_key(now, self.settings.bucket_secs);
        store.hash_incr(&key, "total", 1).await?;
        store
            .hash_incr(&key, &format!("category:{}", report.category.as_str()), 1)
            .await?;
        store
            .hash_incr(&key, &format!("severity:{}", report.severity.as_str()), 1)
            .await?;
        store.expire(&key, self.settings.bucket_ttl_secs).await?;
        Ok(())
    }

    fn bucket_key(&self, now: DateTime<Utc>, width_secs: u64) -> String {
        let width = width_secs.max(1) as i64;
        let start = now.timestamp() / width * width;
        format!("errors:stats:{}", start)
    }

    /// Reads the current statistics bucket, a rolling rather than
    /// cumulative view. `window_minutes` defaults to the configured bucket
    /// width; a different width only sees buckets written at that width.
    pub async fn get_stats(&self, window_minutes: Option<u32>) -> ErrorStats {
        let width_secs = window_minutes
            .map(|m| u64::from(m) * 60)
            .unwrap_or(self.settings.bucket_secs);
        let now = Utc::now();
        let key = self.bucket_key(now, width_secs);

        let mut stats = ErrorStats {
            window_secs: width_secs,
            window_start: now.timestamp() / width_secs.max(1) as i64 * width_secs.max(1) as i64,
            ..ErrorStats::default()
        };

        let Some(store) = &self.store else {
            return stats;
        };

        let fields = match store.hash_get_all(&key).await {
            Ok(fields) => fields,
            Err(e) => {
                warn!("Failed to read error stats bucket: {}", e);
                return stats;
            }
        };

        for (field, value) in fields {
            let value = value.parse::<u64>().unwrap_or(0);
            if field == "total" {
                stats.total = value;
            } else if let Some(category) = field.strip_prefix("category:") {
                stats.by_category.insert(category.to_string(), value);
            } else if let Some(severity) = field.strip_prefix("severity:") {
                stats.by_severity.insert(severity.to_string(), value);
            }
        }

        stats
    }

    /// Returns up to `count` deduplicated entries, most recent first.
    /// Entries that fail to decode are skipped with a warning rather than
    /// poisoning the whole read.
    pub async fn get_recent(&self, count: usize) -> Vec<ErrorEntry> {
        let Some(store) = &self.store else {
            return Vec::new();
        };
        if count == 0 {
            return Vec::new();
        }

        let fingerprints = match store
            .list_range(RECENT_ERRORS_KEY, 0, count as isize - 1)
            .await
        {
            Ok(fps) => fps,
            Err(e) => {
                warn!("Failed to read recent error index: {}", e);
                return Vec::new();
            }
        };

        let mut entries = Vec::with_capacity(fingerprints.len());
        for fp in fingerprints {
            let key = format!("errors:entry:{}", fp);
            match store.hash_get_all(&key).await {
                Ok(fields) if !fields.is_empty() => match decode_entry(&fp, &fields) {
                    Ok(entry) => entries.push(entry),
                    Err(e) => warn!(fingerprint = %fp, "Skipping undecodable error entry: {}", e),
                },
                Ok(_) => {} // entry expired between index read and fetch
                Err(e) => warn!(fingerprint = %fp, "Failed to fetch error entry: {}", e),
            }
        }
        entries
    }
}

fn decode_entry(fp: &str, fields: &HashMap<String, String>) -> Result<ErrorEntry> {
    let report: ErrorReport = serde_json::from_str(
        fields
            .get("report")
            .ok_or_else(|| crate::error::AppError::Validation("missing report field".into()))?,
    )?;

    let parse_time = |field: &str| -> Result<DateTime<Utc>> {
        let raw = fields
            .get(field)
            .ok_or_else(|| crate::error::AppError::Validation(format!("missing {}", field)))?;
        DateTime::parse_from_rfc3339(raw)
            .map(|t| t.with_timezone(&Utc))
            .map_err(|e| crate::error::AppError::Validation(format!("bad {}: {}", field, e)))
    };

    Ok(ErrorEntry {
        schema_version: fields
            .get("schema_version")
            .and_then(|v| v.parse().ok())
            .unwrap_or(ERROR_SCHEMA_VERSION),
        fingerprint: fp.to_string(),
        count: fields
            .get("count")
            .and_then(|v| v.parse().ok())
            .unwrap_or(1),
        first_seen: parse_time("first_seen")?,
        last_seen: parse_time("last_seen")?,
        report,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn tracker_with_store() -> (ErrorTracker, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let tracker = ErrorTracker::new(
            TrackerSettings::default(),
            Some(store.clone() as Arc<dyn SharedStore>),
            "test",
        );
        (tracker, store)
    }

    #[tokio::test]
    async fn test_first_occurrence_is_new() {
        let (tracker, _store) = tracker_with_store();
        let report = tracker.build_report(
            &ErrorDetail::new("Error", "request timed out"),
            None,
            TrackOptions::default(),
        );
        let fp = "abcd1234abcd1234";

        assert!(tracker.record_occurrence(fp, &report).await.unwrap());
        assert!(!tracker.record_occurrence(fp, &report).await.unwrap());
    }

    #[tokio::test]
    async fn test_dedup_count_invariant() {
        let (tracker, _store) = tracker_with_store();
        let error = ErrorDetail::new("ValidationError", "invalid amount");
        let context = RequestContext::new("test").with_endpoint("/deposit");
        let report = tracker.build_report(&error, Some(context), TrackOptions::default());
        let fp = fingerprint(
            report.category,
            &report.error.message,
            None,
            Some("/deposit"),
        );

        for _ in 0..5 {
            tracker.record_occurrence(&fp, &report).await.unwrap();
        }

        let recent = tracker.get_recent(10).await;
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].count, 5);
        assert_eq!(recent[0].report.category, ErrorCategory::UserError);
        assert_eq!(recent[0].report.severity, Severity::Low);
        assert!(recent[0].last_seen >= recent[0].first_seen);
    }

    #[tokio::test]
    async fn test_caller_overrides_take_precedence() {
        let (tracker, _store) = tracker_with_store();
        let report = tracker.build_report(
            &ErrorDetail::new("Error", "invalid amount"),
            None,
            TrackOptions {
                severity: Some(Severity::Critical),
                category: Some(ErrorCategory::Payment),
            },
        );
        assert_eq!(report.severity, Severity::Critical);
        assert_eq!(report.category, ErrorCategory::Payment);
    }

    #[tokio::test]
    async fn test_stats_bucket_accumulates() {
        let (tracker, _store) = tracker_with_store();
        let report = tracker.build_report(
            &ErrorDetail::new("Error", "charge failed"),
            None,
            TrackOptions::default(),
        );

        tracker.record_occurrence("fp1", &report).await.unwrap();
        tracker.record_occurrence("fp1", &report).await.unwrap();

        let stats = tracker.get_stats(None).await;
        assert_eq!(stats.total, 2);
        assert_eq!(stats.by_category.get("payment"), Some(&2));
        assert_eq!(stats.by_severity.get("critical"), Some(&2));
    }

    #[tokio::test]
    async fn test_track_without_store_does_not_panic() {
        let tracker = ErrorTracker::new(TrackerSettings::default(), None, "test");
        let fp = tracker.track(
            &ErrorDetail::new("Error", "boom"),
            None,
            TrackOptions::default(),
        );
        assert_eq!(fp.len(), 16);
        assert!(tracker.get_recent(10).await.is_empty());
        assert_eq!(tracker.get_stats(None).await.total, 0);
    }

    #[tokio::test]
    async fn test_recent_index_is_bounded() {
        let store = Arc::new(MemoryStore::new());
        let settings = TrackerSettings {
            max_recent: 3,
            ..TrackerSettings::default()
        };
        let tracker = ErrorTracker::new(
            settings,
            Some(store.clone() as Arc<dyn SharedStore>),
            "test",
        );

        for i in 0..6 {
            let report = tracker.build_report(
                &ErrorDetail::new("Error", format!("distinct failure kind {}", i)),
                None,
                TrackOptions::default(),
            );
            tracker
                .record_occurrence(&format!("fp{}", i), &report)
                .await
                .unwrap();
        }

        assert_eq!(tracker.get_recent(10).await.len(), 3);
    }

    #[tokio::test]
    async fn test_store_failure_surfaces_as_degraded_result() {
        use crate::store::MockSharedStore;

        let mut store = MockSharedStore::new();
        store.expect_hash_incr().returning(|_, _, _| {
            Err(crate::error::AppError::Timeout("redis hash_incr".to_string()))
        });
        store.expect_list_range().returning(|_, _, _| {
            Err(crate::error::AppError::Timeout("redis list_range".to_string()))
        });

        let tracker = ErrorTracker::new(
            TrackerSettings::default(),
            Some(Arc::new(store) as Arc<dyn SharedStore>),
            "test",
        );
        let report = tracker.build_report(
            &ErrorDetail::new("Error", "boom"),
            None,
            TrackOptions::default(),
        );

        assert!(tracker.record_occurrence("fp", &report).await.is_err());
        // Read paths swallow the failure and return empty views.
        assert!(tracker.get_recent(5).await.is_empty());
    }

    #[tokio::test]
    async fn test_rate_limit_skips_index_but_keeps_count() {
        let store = Arc::new(MemoryStore::new());
        let settings = TrackerSettings {
            rate_limit: crate::config::TrackerRateLimitSettings {
                enabled: true,
                threshold: 2,
                window_secs: 60,
            },
            ..TrackerSettings::default()
        };
        let tracker = ErrorTracker::new(
            settings,
            Some(store.clone() as Arc<dyn SharedStore>),
            "test",
        );
        let report = tracker.build_report(
            &ErrorDetail::new("Error", "boom"),
            None,
            TrackOptions::default(),
        );

        for _ in 0..5 {
            tracker.record_occurrence("fp-limited", &report).await.unwrap();
        }

        let recent = tracker.get_recent(10).await;
        // Indexed on first occurrence (under the limit), counted throughout.
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].count, 5);
    }
}
