use std::collections::HashMap;

use parking_lot::RwLock;

use crate::consent::domain::record::ConsentRecord;
use crate::recognition::domain::face_embedding::FaceEmbedding;

/// In-memory mirror of the consent capture directory.
///
/// Keys are logical person names; each name maps to the records of all its
/// capture files, so one person can match through several capture events.
/// The video worker holds a read lock for the duration of one frame's
/// lookups; only the directory monitor writes.
#[derive(Default)]
pub struct ConsentRegistry {
    inner: RwLock<HashMap<String, Vec<ConsentRecord>>>,
}

impl ConsentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a record keyed by its parsed name. Re-inserting the same file
    /// id replaces the old record, so duplicate watcher events are harmless.
    pub fn insert(&self, record: ConsentRecord) {
        let mut map = self.inner.write();
        let records = map.entry(record.name.clone()).or_default();
        records.retain(|r| r.id != record.id);
        records.push(record);
    }

    /// Remove the single record backed by `id`. The name key disappears with
    /// its last record, so no stale entries survive a file deletion.
    pub fn remove_file(&self, id: &str) -> bool {
        let mut map = self.inner.write();
        let mut removed = false;
        map.retain(|_, records| {
            let before = records.len();
            records.retain(|r| r.id != id);
            removed |= records.len() != before;
            !records.is_empty()
        });
        removed
    }

    /// Find the best-matching consented name for an embedding, if any record
    /// reaches `threshold` cosine similarity. One read guard covers the whole
    /// scan, so a frame sees a consistent snapshot.
    pub fn match_embedding(&self, embedding: &FaceEmbedding, threshold: f64) -> Option<String> {
        let map = self.inner.read();
        let mut best: Option<(&str, f64)> = None;
        for (name, records) in map.iter() {
            for record in records {
                let sim = embedding.cosine_similarity(&record.embedding);
                if sim >= threshold && best.map(|(_, b)| sim > b).unwrap_or(true) {
                    best = Some((name, sim));
                }
            }
        }
        best.map(|(name, _)| name.to_string())
    }

    /// Match a whole frame's embeddings under one read guard, so every face
    /// in the frame sees the same registry snapshot.
    pub fn match_all(
        &self,
        embeddings: &[Option<FaceEmbedding>],
        threshold: f64,
    ) -> Vec<Option<String>> {
        let map = self.inner.read();
        embeddings
            .iter()
            .map(|embedding| {
                let embedding = embedding.as_ref()?;
                let mut best: Option<(&str, f64)> = None;
                for (name, records) in map.iter() {
                    for record in records {
                        let sim = embedding.cosine_similarity(&record.embedding);
                        if sim >= threshold && best.map(|(_, b)| sim > b).unwrap_or(true) {
                            best = Some((name, sim));
                        }
                    }
                }
                best.map(|(name, _)| name.to_string())
            })
            .collect()
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inner.read().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn contains(&self, name: &str) -> bool {
        self.inner.read().contains_key(name)
    }

    /// Total number of records across all names.
    pub fn record_count(&self) -> usize {
        self.inner.read().values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }

    pub fn clear(&self) {
        self.inner.write().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, name: &str, values: Vec<f32>) -> ConsentRecord {
        ConsentRecord {
            id: id.to_string(),
            name: name.to_string(),
            timestamp: 20250301120000,
            embedding: FaceEmbedding::new(values),
        }
    }

    #[test]
    fn test_empty_registry() {
        let reg = ConsentRegistry::new();
        assert!(reg.is_empty());
        assert_eq!(reg.record_count(), 0);
        assert!(reg.names().is_empty());
    }

    #[test]
    fn test_insert_and_names() {
        let reg = ConsentRegistry::new();
        reg.insert(record("20250301120000_alice", "alice", vec![1.0, 0.0]));
        reg.insert(record("20250301120001_bob", "bob", vec![0.0, 1.0]));
        assert_eq!(reg.names(), vec!["alice", "bob"]);
        assert!(reg.contains("alice"));
        assert!(!reg.contains("carol"));
    }

    #[test]
    fn test_multiple_records_per_name() {
        let reg = ConsentRegistry::new();
        reg.insert(record("20250301120000_alice", "alice", vec![1.0, 0.0]));
        reg.insert(record("20250301120001_alice", "alice", vec![0.0, 1.0]));
        assert_eq!(reg.names(), vec!["alice"]);
        assert_eq!(reg.record_count(), 2);
    }

    #[test]
    fn test_reinsert_same_id_is_idempotent() {
        let reg = ConsentRegistry::new();
        reg.insert(record("20250301120000_alice", "alice", vec![1.0, 0.0]));
        reg.insert(record("20250301120000_alice", "alice", vec![1.0, 0.0]));
        assert_eq!(reg.record_count(), 1);
    }

    #[test]
    fn test_remove_file_drops_single_record() {
        let reg = ConsentRegistry::new();
        reg.insert(record("20250301120000_alice", "alice", vec![1.0, 0.0]));
        reg.insert(record("20250301120001_alice", "alice", vec![0.0, 1.0]));
        assert!(reg.remove_file("20250301120000_alice"));
        assert_eq!(reg.record_count(), 1);
        assert!(reg.contains("alice"));
    }

    #[test]
    fn test_remove_last_record_removes_name() {
        let reg = ConsentRegistry::new();
        reg.insert(record("20250301120000_alice", "alice", vec![1.0, 0.0]));
        assert!(reg.remove_file("20250301120000_alice"));
        assert!(!reg.contains("alice"));
        assert!(reg.is_empty());
    }

    #[test]
    fn test_remove_unknown_id_is_noop() {
        let reg = ConsentRegistry::new();
        reg.insert(record("20250301120000_alice", "alice", vec![1.0, 0.0]));
        assert!(!reg.remove_file("20250301999999_ghost"));
        assert_eq!(reg.record_count(), 1);
    }

    #[test]
    fn test_delete_then_recreate_restores_state() {
        let reg = ConsentRegistry::new();
        let rec = record("20250301120000_alice", "alice", vec![0.6, 0.8]);
        reg.insert(rec.clone());
        let before = reg.names();

        reg.remove_file(&rec.id);
        assert!(reg.is_empty());

        reg.insert(rec);
        assert_eq!(reg.names(), before);
        assert_eq!(reg.record_count(), 1);
    }

    #[test]
    fn test_match_embedding_above_threshold() {
        let reg = ConsentRegistry::new();
        reg.insert(record("20250301120000_alice", "alice", vec![1.0, 0.0]));
        let probe = FaceEmbedding::new(vec![1.0, 0.05]);
        assert_eq!(reg.match_embedding(&probe, 0.9).as_deref(), Some("alice"));
    }

    #[test]
    fn test_match_embedding_below_threshold() {
        let reg = ConsentRegistry::new();
        reg.insert(record("20250301120000_alice", "alice", vec![1.0, 0.0]));
        let probe = FaceEmbedding::new(vec![0.0, 1.0]);
        assert_eq!(reg.match_embedding(&probe, 0.4), None);
    }

    #[test]
    fn test_match_embedding_picks_best_name() {
        let reg = ConsentRegistry::new();
        reg.insert(record("20250301120000_alice", "alice", vec![1.0, 0.1]));
        reg.insert(record("20250301120001_bob", "bob", vec![1.0, 0.0]));
        let probe = FaceEmbedding::new(vec![1.0, 0.0]);
        assert_eq!(reg.match_embedding(&probe, 0.5).as_deref(), Some("bob"));
    }

    #[test]
    fn test_match_all_mixed_probes() {
        let reg = ConsentRegistry::new();
        reg.insert(record("20250301120000_alice", "alice", vec![1.0, 0.0]));
        let probes = vec![
            Some(FaceEmbedding::new(vec![1.0, 0.02])),
            None,
            Some(FaceEmbedding::new(vec![0.0, 1.0])),
        ];
        let names = reg.match_all(&probes, 0.9);
        assert_eq!(names.len(), 3);
        assert_eq!(names[0].as_deref(), Some("alice"));
        assert_eq!(names[1], None);
        assert_eq!(names[2], None);
    }

    #[test]
    fn test_match_empty_registry() {
        let reg = ConsentRegistry::new();
        let probe = FaceEmbedding::new(vec![1.0, 0.0]);
        assert_eq!(reg.match_embedding(&probe, 0.0), None);
    }

    #[test]
    fn test_clear() {
        let reg = ConsentRegistry::new();
        reg.insert(record("20250301120000_alice", "alice", vec![1.0, 0.0]));
        reg.clear();
        assert!(reg.is_empty());
    }
}
