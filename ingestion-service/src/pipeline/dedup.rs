use std::collections::HashSet;

use time::OffsetDateTime;

use crate::{
    pipeline::{ReadingStore, StorageError},
    transform::{normalize, Candidate},
};

/// Keep only candidates whose normalized `record_time` is not yet stored for
/// `device_id`, in input order.
///
/// Storage is asked once for the whole batch. Repeats of one time inside the
/// batch collapse to the first occurrence, since the store's unique key would
/// refuse the rest anyway.
pub async fn find_novel(
    store: &dyn ReadingStore,
    device_id: &str,
    candidates: Vec<Candidate>,
) -> Result<Vec<Candidate>, StorageError> {
    if candidates.is_empty() {
        return Ok(candidates);
    }

    let mut times: Vec<OffsetDateTime> = candidates.iter().map(|c| normalize(c.record_time)).collect();
    times.sort_unstable();
    times.dedup();

    let existing = store.existing_record_times(device_id, &times).await?;

    let mut seen: HashSet<OffsetDateTime> = HashSet::with_capacity(candidates.len());
    let novel = candidates
        .into_iter()
        .filter(|c| {
            let t = normalize(c.record_time);
            !existing.contains(&t) && seen.insert(t)
        })
        .collect();

    Ok(novel)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sinks::InMemoryReadingStore;
    use time::macros::datetime;

    #[tokio::test]
    async fn drops_candidates_already_stored_and_keeps_order() {
        let store = InMemoryReadingStore::new();
        let stored = Candidate::at(datetime!(2024-01-01 00:00:01 UTC))
            .into_reading("D1", None, datetime!(2024-01-02 00:00:00 UTC));
        store.insert_many(&[stored]).await.unwrap();

        let candidates = vec![
            Candidate::at(datetime!(2024-01-01 00:00:03 UTC)),
            Candidate::at(datetime!(2024-01-01 00:00:01.400 UTC)),
            Candidate::at(datetime!(2024-01-01 00:00:02 UTC)),
        ];

        let novel = find_novel(&store, "D1", candidates).await.unwrap();
        let times: Vec<_> = novel.iter().map(|c| c.record_time).collect();
        assert_eq!(
            times,
            vec![datetime!(2024-01-01 00:00:03 UTC), datetime!(2024-01-01 00:00:02 UTC)]
        );
        assert_eq!(store.existence_queries(), 1);
    }

    #[tokio::test]
    async fn other_devices_do_not_shadow_candidates() {
        let store = InMemoryReadingStore::new();
        let stored = Candidate::at(datetime!(2024-01-01 00:00:01 UTC))
            .into_reading("D2", None, datetime!(2024-01-02 00:00:00 UTC));
        store.insert_many(&[stored]).await.unwrap();

        let novel = find_novel(&store, "D1", vec![Candidate::at(datetime!(2024-01-01 00:00:01 UTC))])
            .await
            .unwrap();
        assert_eq!(novel.len(), 1);
    }

    #[tokio::test]
    async fn repeated_times_within_a_batch_keep_the_first() {
        let store = InMemoryReadingStore::new();
        let mut first = Candidate::at(datetime!(2024-01-01 00:00:05.100 UTC));
        first.source_ip = Some("first".to_string());
        let mut second = Candidate::at(datetime!(2024-01-01 00:00:05.800 UTC));
        second.source_ip = Some("second".to_string());

        let novel = find_novel(&store, "D1", vec![first, second]).await.unwrap();
        assert_eq!(novel.len(), 1);
        assert_eq!(novel[0].source_ip.as_deref(), Some("first"));
    }

    #[tokio::test]
    async fn empty_input_skips_storage() {
        let store = InMemoryReadingStore::new();
        let novel = find_novel(&store, "D1", Vec::new()).await.unwrap();
        assert!(novel.is_empty());
        assert_eq!(store.existence_queries(), 0);
    }
}
