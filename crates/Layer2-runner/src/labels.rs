//! Resource tagging contract
//!
//! Containers created by the runner carry [`LABEL_OWNERSHIP`] plus run id and
//! version labels. Cached images are named `chp-<repository>:<digest hex>`.
//! These two conventions are the only way the garbage collector tells its own
//! resources apart from anything else sharing the engine.

use std::collections::HashMap;

/// Ownership marker on every container the runner creates
pub const LABEL_OWNERSHIP: &str = "clickhouse-playground";

pub const LABEL_RUN_ID: &str = "clickhouse-playground.run-id";

pub const LABEL_VERSION: &str = "clickhouse-playground.version";

const IMAGE_NAME_PREFIX: &str = "chp-";

/// Labels attached to a query container
pub fn container_labels(run_id: &str, version: &str) -> HashMap<String, String> {
    HashMap::from([
        (LABEL_OWNERSHIP.to_string(), "true".to_string()),
        (LABEL_RUN_ID.to_string(), run_id.to_string()),
        (LABEL_VERSION.to_string(), version.to_string()),
    ])
}

/// Upstream reference for a version, e.g. `clickhouse/clickhouse-server:22.1`
pub fn full_image_name(repository: &str, version: &str) -> String {
    format!("{}:{}", repository, version)
}

/// Cache name for a digest. Version aliases resolving to the same digest map
/// to the same name.
pub fn playground_image_name(repository: &str, digest: &str) -> String {
    let hex = digest.rsplit_once(':').map_or(digest, |(_, hex)| hex);
    format!("{}{}:{}", IMAGE_NAME_PREFIX, repository, hex)
}

/// Whether `name` follows the cache naming convention for `repository`
pub fn is_playground_image_name(name: &str, repository: &str) -> bool {
    name.strip_prefix(IMAGE_NAME_PREFIX)
        .and_then(|rest| rest.strip_prefix(repository))
        .and_then(|rest| rest.strip_prefix(':'))
        .is_some_and(|tag| !tag.is_empty())
}
