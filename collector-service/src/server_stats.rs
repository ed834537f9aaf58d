//! Server-wide statistics extraction.
//!
//! Flattens one `serverStatus` document into measurements named
//! `{Section}/{Metric}/{host}`. Fields the server does not report are
//! recorded as 0.

use chrono::{DateTime, Utc};
use common::errors::AppResult;
use common::MetricSink;
use mongodb::bson::Document;

use crate::connection::StatsSource;
use crate::document::StatusDocument;
use crate::mapping::{record_all, MetricSpec};

const DEFAULT_HOST: &str = "no_host";
const BYTES_PER_MEGABYTE: f64 = 1_048_576.0;

const SERVER_METRICS: &[MetricSpec] = &[
    MetricSpec::derive("Asserts/Regular", "asserts", &["asserts", "regular"]),
    MetricSpec::derive("Asserts/Warning", "asserts", &["asserts", "warning"]),
    MetricSpec::derive("Asserts/Message", "asserts", &["asserts", "msg"]),
    MetricSpec::derive("Asserts/User", "asserts", &["asserts", "user"]),
    MetricSpec::derive("Asserts/Rollovers", "asserts", &["asserts", "rollovers"]),
    MetricSpec::gauge("Connections/Available", "connections", &["connections", "available"]),
    MetricSpec::gauge("Connections/Current", "connections", &["connections", "current"]),
    MetricSpec::derive("Metrics/Commands/Find", "ops", &["metrics", "commands", "find", "total"]),
    MetricSpec::derive("Metrics/Commands/Count", "ops", &["metrics", "commands", "count", "total"]),
    MetricSpec::derive(
        "Metrics/Commands/CreateIndexes",
        "ops",
        &["metrics", "commands", "createIndexes", "total"],
    ),
    MetricSpec::derive(
        "Metrics/Commands/MoveChunks",
        "ops",
        &["metrics", "commands", "moveChunk", "total"],
    ),
    MetricSpec::derive("Metrics/Commands/Update", "ops", &["metrics", "commands", "update", "total"]),
    MetricSpec::derive(
        "Metrics/Commands/Distinct",
        "ops",
        &["metrics", "commands", "distinct", "total"],
    ),
    MetricSpec::derive("Metrics/Commands/GetMore", "ops", &["metrics", "commands", "getMore", "total"]),
    MetricSpec::derive("Metrics/Documents/Deleted", "ops", &["metrics", "document", "deleted"]),
    MetricSpec::derive("Metrics/Documents/Returned", "ops", &["metrics", "document", "returned"]),
    MetricSpec::derive("Metrics/Documents/Inserted", "ops", &["metrics", "document", "inserted"]),
    MetricSpec::derive("Metrics/Documents/Updated", "ops", &["metrics", "document", "updated"]),
    MetricSpec::derive("Metrics/NonIndex/Ordering", "ops", &["metrics", "operation", "scanAndOrder"]),
    // getmores issued by secondaries while tailing the oplog
    MetricSpec::derive(
        "Metrics/Repl/GetMores/count",
        "ops",
        &["metrics", "repl", "network", "getmores", "num"],
    ),
    MetricSpec::derive(
        "Metrics/Repl/GetMores/total",
        "ops",
        &["metrics", "repl", "network", "getmores", "totalMillis"],
    ),
    MetricSpec::gauge("Cursors/On", "cursors", &["metrics", "cursors", "open"]),
    MetricSpec::derive("Cursors/TimedOut", "cursors", &["metrics", "cursors", "timedOut"]),
    MetricSpec::gauge("Durability/CommitsInWriteLock", "commits", &["dur", "commitsInWriteLock"]),
    MetricSpec::gauge("Durability/EarlyCommits", "commits", &["dur", "earlyCommits"]),
    MetricSpec::gauge("Durability/JournalCommits", "commits", &["dur", "commits"]),
    MetricSpec::gauge("Durability/JournalBytesWritten", "bytes", &["dur", "journaledMB"])
        .divided_by(BYTES_PER_MEGABYTE),
    MetricSpec::gauge("Durability/DataFileBytesWritten", "bytes", &["dur", "writeToDataFilesMB"])
        .divided_by(BYTES_PER_MEGABYTE),
    MetricSpec::gauge("Durability/Timings/DurationMeasured", "ms", &["dur", "timeMs", "dt"]),
    MetricSpec::gauge(
        "Durability/Timings/LogBufferPreparation",
        "ms",
        &["dur", "timeMs", "prepLogBuffer"],
    ),
    MetricSpec::gauge("Durability/Timings/WriteToJournal", "ms", &["dur", "timeMs", "writeToJournal"]),
    MetricSpec::gauge(
        "Durability/Timings/WriteToDataFiles",
        "ms",
        &["dur", "timeMs", "writeToDataFiles"],
    ),
    MetricSpec::gauge(
        "Durability/Timings/RemapingPrivateView",
        "ms",
        &["dur", "timeMs", "remapPrivateView"],
    ),
    // lockTime is reported in microseconds
    MetricSpec::derive("GlobalLocks/Held", "ms", &["globalLock", "lockTime"]).divided_by(1000.0),
    MetricSpec::derive("GlobalLocks/Ratio", "ratio", &["globalLock", "ratio"]),
    MetricSpec::derive(
        "GlobalLocks/ActiveClients/Total",
        "clients",
        &["globalLock", "activeClients", "total"],
    ),
    MetricSpec::derive(
        "GlobalLocks/ActiveClients/Readers",
        "clients",
        &["globalLock", "activeClients", "readers"],
    ),
    MetricSpec::derive(
        "GlobalLocks/ActiveClients/Writers",
        "clients",
        &["globalLock", "activeClients", "writers"],
    ),
    MetricSpec::derive("GlobalLocks/Queue/Total", "locks", &["globalLock", "currentQueue", "total"]),
    MetricSpec::derive(
        "GlobalLocks/Queue/Readers",
        "readers",
        &["globalLock", "currentQueue", "readers"],
    ),
    MetricSpec::derive(
        "GlobalLocks/Queue/Writers",
        "writers",
        &["globalLock", "currentQueue", "writers"],
    ),
    MetricSpec::gauge("Memory/Resident", "megabytes", &["mem", "resident"]),
    MetricSpec::gauge("Memory/Virtual", "megabytes", &["mem", "virtual"]),
    MetricSpec::derive("Network/Requests", "requests", &["network", "numRequests"]),
    MetricSpec::derive("Network/Transfer/In", "bytes", &["network", "bytesIn"]),
    MetricSpec::derive("Network/Transfer/Out", "bytes", &["network", "bytesOut"]),
    MetricSpec::derive("Operations/Insert", "ops", &["opcounters", "insert"]),
    MetricSpec::derive("Operations/Query", "ops", &["opcounters", "query"]),
    MetricSpec::derive("Operations/Update", "ops", &["opcounters", "update"]),
    MetricSpec::derive("Operations/Delete", "ops", &["opcounters", "delete"]),
    MetricSpec::derive("Operations/GetMore", "ops", &["opcounters", "getmore"]),
    MetricSpec::derive("Operations/Command", "ops", &["opcounters", "command"]),
    MetricSpec::gauge("System/HeapUsage", "bytes", &["extra_info", "heap_usage_bytes"]),
    MetricSpec::derive("System/PageFaults", "faults", &["extra_info", "page_faults"]),
    // Cache sizes go out both as counters and as gauges.
    MetricSpec::derive(
        "WiredTiger/Cache/BytesReadInto/Derived",
        "bytes",
        &["wiredTiger", "cache", "bytes read into cache"],
    ),
    MetricSpec::derive(
        "WiredTiger/Cache/BytesIn/Derived",
        "bytes",
        &["wiredTiger", "cache", "bytes currently in the cache"],
    ),
    MetricSpec::gauge(
        "WiredTiger/Cache/DirtyBytes",
        "bytes",
        &["wiredTiger", "cache", "tracked dirty bytes in the cache"],
    ),
    MetricSpec::gauge(
        "WiredTiger/Cache/BytesReadInto/Gauge",
        "bytes",
        &["wiredTiger", "cache", "bytes read into cache"],
    ),
    MetricSpec::gauge(
        "WiredTiger/Cache/BytesIn/Gauge",
        "bytes",
        &["wiredTiger", "cache", "bytes currently in the cache"],
    ),
    MetricSpec::gauge(
        "WiredTiger/concurrentTransactions/WritesAvailable",
        "tickets",
        &["wiredTiger", "concurrentTransactions", "write", "available"],
    ),
    MetricSpec::gauge(
        "WiredTiger/concurrentTransactions/ReadsAvailable",
        "tickets",
        &["wiredTiger", "concurrentTransactions", "read", "available"],
    ),
];

const PRIMARY_METRICS: &[MetricSpec] = &[
    MetricSpec::derive("Repl/Buffer/Count", "ops", &["metrics", "repl", "buffer", "count"]),
    MetricSpec::derive("Repl/Buffer/SizeBytes", "bytes", &["metrics", "repl", "buffer", "sizeBytes"]),
    MetricSpec::derive(
        "Repl/Buffer/MaxSizeBytes",
        "bytes",
        &["metrics", "repl", "buffer", "maxSizeBytes"],
    ),
];

const SECONDARY_METRICS: &[MetricSpec] = &[
    MetricSpec::derive("Repl/Apply/Ops", "ops", &["metrics", "repl", "apply", "ops"]),
    MetricSpec::derive(
        "Repl/Apply/BatchesNum",
        "bytes",
        &["metrics", "repl", "apply", "batches", "num"],
    ),
    MetricSpec::derive(
        "Repl/Apply/BatchesTotalMillis",
        "bytes",
        &["metrics", "repl", "apply", "batches", "totalMillis"],
    ),
];

/// Replication role of the polled node for this cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplicationRole {
    Primary,
    /// Secondaries, standalone nodes, and nodes whose role is unknown.
    Secondary,
}

impl ReplicationRole {
    /// Reads the role from the top-level `repl` section.
    pub fn from_status(status: &Document) -> Self {
        if status.flag(&["repl", "ismaster"]) || status.flag(&["repl", "isWritablePrimary"]) {
            ReplicationRole::Primary
        } else {
            ReplicationRole::Secondary
        }
    }

    /// Records the replication metrics that only make sense for this role.
    pub fn record(&self, status: &Document, host: &str, sink: &mut MetricSink) {
        match self {
            ReplicationRole::Primary => record_all(PRIMARY_METRICS, status, host, sink),
            ReplicationRole::Secondary => record_all(SECONDARY_METRICS, status, host, sink),
        }
    }
}

/// Fetches `serverStatus` and records it into `sink`.
pub async fn extract_server_stats<S>(source: &S, sink: &mut MetricSink) -> AppResult<()>
where
    S: StatsSource + ?Sized,
{
    tracing::debug!("Fetching server stats");
    let status = source.server_status().await?;
    record_server_status(&status, Utc::now(), sink);
    Ok(())
}

/// Flattens a `serverStatus` document observed at `now`.
pub fn record_server_status(status: &Document, now: DateTime<Utc>, sink: &mut MetricSink) {
    let host = status.text(&["host"]).unwrap_or(DEFAULT_HOST);

    record_all(SERVER_METRICS, status, host, sink);
    record_background_flushing(status, now, host, sink);

    let role = ReplicationRole::from_status(status);
    role.record(status, host, sink);
    tracing::debug!(host = %host, role = ?role, "Recorded server stats");
}

fn record_background_flushing(
    status: &Document,
    now: DateTime<Utc>,
    host: &str,
    sink: &mut MetricSink,
) {
    sink.derive_timing(
        format!("BackgroundFlushes/{}", host),
        "ms",
        status.number(&["backgroundFlushing", "flushes"]),
        status.number(&["backgroundFlushing", "total_ms"]),
        status.number(&["backgroundFlushing", "last_ms"]),
    );

    let now_millis = now.timestamp_millis();
    let last_finished = status
        .timestamp_millis(&["backgroundFlushing", "last_finished"])
        .unwrap_or(now_millis);
    let elapsed_secs = (now_millis - last_finished).max(0) / 1000;
    sink.gauge(
        format!("SecondsSinceLastFlush/{}", host),
        "seconds",
        elapsed_secs as f64,
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use common::models::{MeasurementValue, MetricKind};
    use mongodb::bson::{doc, DateTime as BsonDateTime};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    fn record(status: &Document) -> MetricSink {
        let mut sink = MetricSink::new();
        record_server_status(status, now(), &mut sink);
        sink
    }

    #[test]
    fn test_empty_document_records_zeros_under_default_host() {
        let sink = record(&doc! {});
        assert_eq!(sink.len(), SERVER_METRICS.len() + 2 + SECONDARY_METRICS.len());
        assert!(sink.iter().all(|m| m.name().ends_with("/no_host")));
        assert!(sink.iter().all(|m| m.value.value() == 0.0));
        assert_eq!(sink.value("SecondsSinceLastFlush/no_host"), Some(0.0));
    }

    #[test]
    fn test_host_suffix_and_plain_fields() {
        let sink = record(&doc! {
            "host": "db1:27017",
            "asserts": { "regular": 3, "msg": 1 },
            "connections": { "available": 800, "current": 12 },
            "mem": { "resident": 512, "virtual": 2048 },
            "opcounters": { "insert": 10_i64, "command": 99 },
        });
        assert_eq!(sink.value("Asserts/Regular/db1:27017"), Some(3.0));
        assert_eq!(sink.value("Asserts/Message/db1:27017"), Some(1.0));
        assert_eq!(sink.value("Asserts/Warning/db1:27017"), Some(0.0));
        assert_eq!(sink.value("Connections/Current/db1:27017"), Some(12.0));
        assert_eq!(
            sink.get("Memory/Virtual/db1:27017").unwrap().kind(),
            MetricKind::Gauge
        );
        assert_eq!(sink.value("Operations/Command/db1:27017"), Some(99.0));
    }

    #[test]
    fn test_command_counters_read_total_and_tolerate_missing_commands() {
        let sink = record(&doc! {
            "host": "h",
            "metrics": { "commands": { "find": { "failed": 1, "total": 40 }, "count": {} } },
        });
        assert_eq!(sink.value("Metrics/Commands/Find/h"), Some(40.0));
        assert_eq!(sink.value("Metrics/Commands/Count/h"), Some(0.0));
        assert_eq!(sink.value("Metrics/Commands/GetMore/h"), Some(0.0));
    }

    #[test]
    fn test_repl_network_without_getmores_records_zero() {
        let sink = record(&doc! {
            "host": "h",
            "metrics": { "repl": { "network": { "bytes": 100 } } },
        });
        assert_eq!(sink.value("Metrics/Repl/GetMores/count/h"), Some(0.0));
        assert_eq!(sink.value("Metrics/Repl/GetMores/total/h"), Some(0.0));
    }

    #[test]
    fn test_durability_megabyte_fields_are_divided() {
        let sink = record(&doc! {
            "host": "h",
            "dur": { "journaledMB": 2_097_152, "writeToDataFilesMB": 1_048_576, "timeMs": { "dt": 3012 } },
        });
        assert_eq!(sink.value("Durability/JournalBytesWritten/h"), Some(2.0));
        assert_eq!(sink.value("Durability/DataFileBytesWritten/h"), Some(1.0));
        assert_eq!(sink.value("Durability/Timings/DurationMeasured/h"), Some(3012.0));
    }

    #[test]
    fn test_global_lock_time_is_converted_to_millis() {
        let sink = record(&doc! {
            "host": "h",
            "globalLock": { "lockTime": 5000, "ratio": 0.25, "currentQueue": { "writers": 2 } },
        });
        let held = sink.get("GlobalLocks/Held/h").unwrap();
        assert_eq!(held.kind(), MetricKind::Derive);
        assert_eq!(held.value.value(), 5.0);
        assert_eq!(sink.value("GlobalLocks/Ratio/h"), Some(0.25));
        assert_eq!(sink.value("GlobalLocks/Queue/Writers/h"), Some(2.0));
    }

    #[test]
    fn test_cache_bytes_are_emitted_as_derive_and_gauge() {
        let sink = record(&doc! {
            "host": "h",
            "wiredTiger": { "cache": {
                "bytes read into cache": 42,
                "bytes currently in the cache": 7,
            } },
        });
        let derived = sink.get("WiredTiger/Cache/BytesReadInto/Derived/h").unwrap();
        let gauge = sink.get("WiredTiger/Cache/BytesReadInto/Gauge/h").unwrap();
        assert_eq!(derived.kind(), MetricKind::Derive);
        assert_eq!(gauge.kind(), MetricKind::Gauge);
        assert_eq!(derived.value.value(), 42.0);
        assert_eq!(gauge.value.value(), 42.0);
        assert_eq!(sink.value("WiredTiger/Cache/BytesIn/Derived/h"), Some(7.0));
        assert_eq!(sink.value("WiredTiger/Cache/BytesIn/Gauge/h"), Some(7.0));
    }

    #[test]
    fn test_primary_emits_only_buffer_metrics() {
        let sink = record(&doc! {
            "host": "h",
            "repl": { "ismaster": true },
            "metrics": { "repl": {
                "buffer": { "count": 4, "sizeBytes": 1024, "maxSizeBytes": 268_435_456 },
                "apply": { "ops": 9 },
            } },
        });
        assert_eq!(sink.value("Repl/Buffer/Count/h"), Some(4.0));
        assert_eq!(sink.value("Repl/Buffer/SizeBytes/h"), Some(1024.0));
        assert_eq!(sink.value("Repl/Buffer/MaxSizeBytes/h"), Some(268_435_456.0));
        assert!(sink.get("Repl/Apply/Ops/h").is_none());
        assert!(sink.get("Repl/Apply/BatchesNum/h").is_none());
        assert!(sink.get("Repl/Apply/BatchesTotalMillis/h").is_none());
    }

    #[test]
    fn test_secondary_emits_only_apply_metrics() {
        for status in [
            doc! { "host": "h", "repl": { "ismaster": false, "secondary": true } },
            doc! { "host": "h" },
        ] {
            let mut status = status;
            status.insert(
                "metrics",
                doc! { "repl": { "apply": { "ops": 9, "batches": { "num": 3, "totalMillis": 15 } } } },
            );
            let sink = record(&status);
            assert_eq!(sink.value("Repl/Apply/Ops/h"), Some(9.0));
            assert_eq!(sink.value("Repl/Apply/BatchesNum/h"), Some(3.0));
            assert_eq!(sink.value("Repl/Apply/BatchesTotalMillis/h"), Some(15.0));
            assert!(sink.get("Repl/Buffer/Count/h").is_none());
            assert!(sink.get("Repl/Buffer/SizeBytes/h").is_none());
            assert!(sink.get("Repl/Buffer/MaxSizeBytes/h").is_none());
        }
    }

    #[test]
    fn test_writable_primary_flag_selects_primary() {
        let status = doc! { "repl": { "isWritablePrimary": true } };
        assert_eq!(ReplicationRole::from_status(&status), ReplicationRole::Primary);
        let status = doc! { "repl": { "ismaster": false } };
        assert_eq!(ReplicationRole::from_status(&status), ReplicationRole::Secondary);
    }

    #[test]
    fn test_background_flush_timing_and_elapsed_seconds() {
        let last = BsonDateTime::from_millis(now().timestamp_millis() - 90_500);
        let sink = record(&doc! {
            "host": "h",
            "backgroundFlushing": { "flushes": 10, "total_ms": 250, "last_ms": 20, "last_finished": last },
        });
        assert_eq!(
            sink.get("BackgroundFlushes/h").unwrap().value,
            MeasurementValue::Timing { count: 10.0, total: 250.0, latest: 20.0 }
        );
        assert_eq!(sink.value("SecondsSinceLastFlush/h"), Some(90.0));
    }

    #[test]
    fn test_flush_timestamp_in_future_clamps_to_zero() {
        let later = BsonDateTime::from_millis(now().timestamp_millis() + 5_000);
        let sink = record(&doc! { "backgroundFlushing": { "last_finished": later } });
        assert_eq!(sink.value("SecondsSinceLastFlush/no_host"), Some(0.0));
    }
}
