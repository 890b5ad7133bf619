//! Most recent previous sample per monitored source.

use std::collections::HashMap;
use std::sync::RwLock;

use tracing::debug;

/// Fixed set of keys, each holding at most one sample. Keys are registered
/// at construction and never added or removed afterwards.
#[derive(Debug)]
pub struct SampleHistory<S> {
    slots: HashMap<String, RwLock<Option<S>>>,
}

impl<S: Clone> SampleHistory<S> {
    pub fn new<I, K>(keys: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        let slots = keys
            .into_iter()
            .map(|k| (k.into(), RwLock::new(None)))
            .collect();
        Self { slots }
    }

    pub fn get(&self, key: &str) -> Option<S> {
        let slot = self.slots.get(key)?;
        match slot.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Replace the sample for `key`. Returns `false` for keys that were not
    /// registered.
    pub fn put(&self, key: &str, sample: S) -> bool {
        let Some(slot) = self.slots.get(key) else {
            debug!(key, "ignoring sample for unregistered history key");
            return false;
        };
        match slot.write() {
            Ok(mut guard) => *guard = Some(sample),
            Err(poisoned) => *poisoned.into_inner() = Some(sample),
        }
        true
    }

    pub fn contains(&self, key: &str) -> bool {
        self.slots.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

/// History keys for the aggregate CPU plus each core: "cpu", "cpu0"..
pub fn cpu_keys(core_count: usize) -> Vec<String> {
    std::iter::once("cpu".to_string())
        .chain((0..core_count).map(|i| format!("cpu{i}")))
        .collect()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use super::*;

    #[test]
    fn empty_until_first_put() {
        let history: SampleHistory<u64> = SampleHistory::new(["eth0"]);
        assert_eq!(history.get("eth0"), None);
        assert!(history.put("eth0", 7));
        assert_eq!(history.get("eth0"), Some(7));
        assert!(history.put("eth0", 9));
        assert_eq!(history.get("eth0"), Some(9));
    }

    #[test]
    fn unregistered_keys_are_rejected() {
        let history: SampleHistory<u64> = SampleHistory::new(["cpu"]);
        assert!(!history.put("cpu7", 1));
        assert_eq!(history.get("cpu7"), None);
        assert_eq!(history.len(), 1);
    }

    #[test]
    fn cpu_keys_cover_aggregate_and_cores() {
        assert_eq!(cpu_keys(2), vec!["cpu", "cpu0", "cpu1"]);
        let history: SampleHistory<u8> = SampleHistory::new(cpu_keys(4));
        assert_eq!(history.len(), 5);
        assert!(history.contains("cpu3"));
        assert!(!history.contains("cpu4"));
    }

    #[test]
    fn readers_see_whole_samples() {
        let history = Arc::new(SampleHistory::<[u64; 4]>::new(["cpu"]));
        let writer = {
            let history = Arc::clone(&history);
            thread::spawn(move || {
                for i in 0..1000u64 {
                    history.put("cpu", [i; 4]);
                }
            })
        };
        for _ in 0..1000 {
            if let Some(sample) = history.get("cpu") {
                assert!(sample.iter().all(|v| *v == sample[0]));
            }
        }
        writer.join().unwrap();
        assert_eq!(history.get("cpu"), Some([999; 4]));
    }
}
