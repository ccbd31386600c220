//! Most recent producer state.

use std::sync::Arc;

/// Holds the last state payload seen from the producer.
///
/// Never cleared on disconnect: late joiners get stale state rather than none.
#[derive(Debug, Default)]
pub struct StateCache {
    last_message: Option<Arc<str>>,
}

impl StateCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn store(&mut self, payload: Arc<str>) {
        self.last_message = Some(payload);
    }

    pub fn get(&self) -> Option<Arc<str>> {
        self.last_message.clone()
    }

    pub fn is_empty(&self) -> bool {
        self.last_message.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overwrites() {
        let mut cache = StateCache::new();
        assert!(cache.is_empty());
        cache.store("one".into());
        cache.store("two".into());
        assert_eq!(cache.get().as_deref(), Some("two"));
    }
}
