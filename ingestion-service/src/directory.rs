use std::collections::HashSet;

use solar_client::db::device_queries;
use sqlx::postgres::PgPool;

use crate::pipeline::{DeviceDirectory, StorageError};

/// Trim and upper-case an identifier for registry comparison.
pub fn fold_device_id(id: &str) -> String {
    id.trim().to_uppercase()
}

/// Whether `candidate` names one of `known`, ignoring case and surrounding
/// whitespace on both sides.
pub fn is_registered(known: &HashSet<String>, candidate: &str) -> bool {
    let wanted = fold_device_id(candidate);
    !wanted.is_empty() && known.iter().any(|k| fold_device_id(k) == wanted)
}

/// Device registry backed by the `devices` table.
#[derive(Clone)]
pub struct PgDeviceDirectory {
    pool: PgPool,
}

impl PgDeviceDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl DeviceDirectory for PgDeviceDirectory {
    async fn known_device_ids(&self) -> Result<HashSet<String>, StorageError> {
        let uids = device_queries::list_device_uids(&self.pool).await.map_err(|e| {
            tracing::error!(error = %e, "device directory query failed");
            StorageError::Directory(e.to_string())
        })?;
        Ok(uids.into_iter().collect())
    }
}

/// Fixed device registry, for tests and offline imports.
#[derive(Debug, Clone, Default)]
pub struct StaticDeviceDirectory {
    ids: HashSet<String>,
}

impl StaticDeviceDirectory {
    pub fn new<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            ids: ids.into_iter().map(Into::into).collect(),
        }
    }
}

#[async_trait::async_trait]
impl DeviceDirectory for StaticDeviceDirectory {
    async fn known_device_ids(&self) -> Result<HashSet<String>, StorageError> {
        Ok(self.ids.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registration_check_ignores_case_and_padding() {
        let known: HashSet<String> = ["ind.raj.sha001 ".to_string()].into_iter().collect();
        assert!(is_registered(&known, "IND.RAJ.SHA001"));
        assert!(is_registered(&known, " Ind.Raj.Sha001"));
        assert!(!is_registered(&known, "IND.RAJ.SHA002"));
        assert!(!is_registered(&known, "   "));
    }

    #[tokio::test]
    async fn static_directory_returns_its_ids() {
        let dir = StaticDeviceDirectory::new(["A", "B"]);
        let ids = dir.known_device_ids().await.unwrap();
        assert_eq!(ids.len(), 2);
        assert!(ids.contains("A"));
    }
}
