use crate::driver::interception::SharedInterception;
use crate::sync::lock;
use crate::types::interception::InterceptionSnapshot;
use std::sync::{Arc, Mutex};

/// Durable `(alias, interception)` entries recorded before each continuation.
#[derive(Default)]
pub struct AliasLedger {
    entries: Mutex<Vec<(String, SharedInterception)>>,
}

impl AliasLedger {
    pub(crate) fn record(&self, alias: String, interception: SharedInterception) {
        lock(&self.entries).push((alias, interception));
    }

    /// Interception most recently recorded under `alias`.
    pub(crate) fn latest(&self, alias: &str) -> Option<SharedInterception> {
        lock(&self.entries)
            .iter()
            .rev()
            .find(|(name, _)| name == alias)
            .map(|(_, interception)| Arc::clone(interception))
    }

    pub fn snapshots(&self, alias: &str) -> Vec<InterceptionSnapshot> {
        lock(&self.entries)
            .iter()
            .filter(|(name, _)| name == alias)
            .map(|(_, interception)| lock(interception).snapshot())
            .collect()
    }

    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        lock(&self.entries).clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::interception::Interception;
    use crate::types::request::RequestData;
    use rstest::rstest;

    fn shared(id: &str) -> SharedInterception {
        Arc::new(Mutex::new(Interception::new(
            id,
            "1",
            RequestData::new("GET", "http://localhost/"),
        )))
    }

    #[rstest]
    fn test_latest_and_clear() {
        let ledger = AliasLedger::default();
        ledger.record("users".to_string(), shared("interceptedRequest1"));
        ledger.record("posts".to_string(), shared("interceptedRequest2"));
        ledger.record("users".to_string(), shared("interceptedRequest3"));

        let latest = ledger.latest("users").expect("Should find alias");
        assert_eq!(lock(&latest).snapshot().id, "interceptedRequest3");
        assert_eq!(ledger.snapshots("users").len(), 2);
        assert!(ledger.latest("comments").is_none());

        ledger.clear();
        assert!(ledger.is_empty());
    }
}
