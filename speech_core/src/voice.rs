//! Enrolled voice samples and their fingerprints.
//!
//! A fingerprint is a deduplication key, not a credential: the same audio
//! uploaded by the same user always hashes to the same digest, so repeat
//! enrollments collapse onto one stored sample.

use std::sync::Arc;

use dashmap::DashMap;
use serde::Serialize;
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Audio bytes are folded into the hash in fixed-size chunks so the digest
/// is independent of how the upload was buffered.
const FINGERPRINT_CHUNK: usize = 8192;

/// Deterministic content hash over {secret, user identity, audio bytes}.
pub fn compute_fingerprint(audio: &[u8], user: &str, secret: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(secret.as_bytes());
    hasher.update(user.as_bytes());
    for chunk in audio.chunks(FINGERPRINT_CHUNK) {
        hasher.update(chunk);
    }
    hex::encode(hasher.finalize())
}

/// An enrolled voice reference.  Immutable once created.
#[derive(Debug, Clone, Serialize)]
pub struct VoiceSample {
    pub id: String,
    pub fingerprint: String,
    pub user: String,
    #[serde(skip)]
    pub audio: Vec<u8>,
}

/// Append-only, fingerprint-keyed store of enrolled voices.  Safe for
/// concurrent use; samples are never mutated or removed.
pub struct VoiceStore {
    secret: String,
    by_fingerprint: DashMap<String, Arc<VoiceSample>>,
    // id -> fingerprint
    ids: DashMap<String, String>,
}

impl VoiceStore {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            by_fingerprint: DashMap::new(),
            ids: DashMap::new(),
        }
    }

    /// Enroll `audio` for `user`.  Re-enrolling identical audio for the
    /// same user returns the existing sample; the entry lock makes the
    /// dedup atomic under concurrent enrollment of the same fingerprint.
    pub fn enroll(&self, user: &str, audio: Vec<u8>) -> Arc<VoiceSample> {
        let fingerprint = compute_fingerprint(&audio, user, &self.secret);
        let sample = self
            .by_fingerprint
            .entry(fingerprint.clone())
            .or_insert_with(|| {
                Arc::new(VoiceSample {
                    id: Uuid::new_v4().to_string(),
                    fingerprint: fingerprint.clone(),
                    user: user.to_owned(),
                    audio,
                })
            })
            .clone();
        self.ids.insert(sample.id.clone(), fingerprint);
        sample
    }

    /// Look a sample up by id or by fingerprint.
    pub fn get(&self, key: &str) -> Option<Arc<VoiceSample>> {
        let fingerprint = self
            .ids
            .get(key)
            .map(|f| f.clone())
            .unwrap_or_else(|| key.to_owned());
        self.by_fingerprint.get(&fingerprint).map(|s| s.clone())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.by_fingerprint.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_fingerprint.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test_secret";

    #[test]
    fn fingerprint_is_deterministic() {
        let audio = vec![7u8; 20_000];
        let a = compute_fingerprint(&audio, "user-1", SECRET);
        let b = compute_fingerprint(&audio, "user-1", SECRET);
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn fingerprint_changes_with_audio_or_user() {
        let audio = vec![7u8; 1024];
        let base = compute_fingerprint(&audio, "user-1", SECRET);

        let mut other_audio = audio.clone();
        other_audio[0] ^= 1;
        assert_ne!(base, compute_fingerprint(&other_audio, "user-1", SECRET));
        assert_ne!(base, compute_fingerprint(&audio, "user-2", SECRET));
        assert_ne!(base, compute_fingerprint(&audio, "user-1", "other_secret"));
    }

    #[test]
    fn enroll_deduplicates_on_fingerprint() {
        let store = VoiceStore::new(SECRET);
        let first = store.enroll("user-1", vec![1, 2, 3]);
        let second = store.enroll("user-1", vec![1, 2, 3]);
        assert_eq!(first.id, second.id);
        assert_eq!(store.len(), 1);

        let third = store.enroll("user-2", vec![1, 2, 3]);
        assert_ne!(first.id, third.id);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn concurrent_enrollment_of_identical_audio_mints_one_id() {
        let store = Arc::new(VoiceStore::new(SECRET));
        let audio = vec![42u8; 10_000];

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                let audio = audio.clone();
                std::thread::spawn(move || store.enroll("user-1", audio).id.clone())
            })
            .collect();
        let ids: Vec<String> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert_eq!(store.len(), 1);
        assert!(ids.iter().all(|id| *id == ids[0]));
        assert!(store.contains(&ids[0]));
    }

    #[test]
    fn samples_resolve_by_id_and_fingerprint() {
        let store = VoiceStore::new(SECRET);
        let sample = store.enroll("user-1", vec![9; 100]);
        assert!(store.contains(&sample.id));
        assert!(store.contains(&sample.fingerprint));
        assert!(!store.contains("nope"));
        assert_eq!(store.get(&sample.id).unwrap().fingerprint, sample.fingerprint);
    }
}
