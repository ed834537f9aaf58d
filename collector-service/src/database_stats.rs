//! Per-database statistics extraction.
//!
//! Runs `dbStats` for each configured database and records eight gauges
//! named `Database/{Metric}/{database}`.

use common::config::DatabaseTargets;
use common::errors::AppResult;
use common::MetricSink;
use mongodb::bson::Document;

use crate::connection::{with_scoped_login, StatsSource};
use crate::mapping::{record_all, MetricSpec};

const DATABASE_METRICS: &[MetricSpec] = &[
    MetricSpec::gauge("Database/Extents", "extents", &["numExtents"]),
    MetricSpec::gauge("Database/Size", "bytes", &["dataSize"]),
    MetricSpec::gauge("Database/FileSize", "bytes", &["storageSize"]),
    MetricSpec::gauge("Database/ObjectsCount", "objects", &["objects"]),
    MetricSpec::gauge("Database/ObjectsAverageSize", "bytes", &["avgObjSize"]),
    MetricSpec::gauge("Database/Collections", "collections", &["collections"]),
    MetricSpec::gauge("Database/IndexCount", "indexes", &["indexes"]),
    MetricSpec::gauge("Database/IndexSize", "bytes", &["indexSize"]),
];

/// Records one `dbStats` document under the database's name.
pub fn record_database_stats(database: &str, stats: &Document, sink: &mut MetricSink) {
    record_all(DATABASE_METRICS, stats, database, sink);
}

/// Fetches and records stats for every target.
///
/// Databases with a credential are read inside a scoped login. The first
/// query failure stops the batch; databases already recorded stay in the
/// sink.
pub async fn extract_database_stats<S>(
    source: &S,
    targets: &DatabaseTargets,
    sink: &mut MetricSink,
) -> AppResult<()>
where
    S: StatsSource + ?Sized,
{
    tracing::debug!(count = targets.len(), "Processing mongo databases");
    for (database, credential) in targets.iter() {
        let stats = match credential {
            Some(credential) => {
                with_scoped_login(source, database, credential, || source.database_stats(database))
                    .await?
            }
            None => source.database_stats(database).await?,
        };
        record_database_stats(database, &stats, sink);
    }
    Ok(())
}
