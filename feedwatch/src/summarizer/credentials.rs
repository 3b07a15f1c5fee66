use std::sync::atomic::{AtomicUsize, Ordering};

/// Round-robin pool of API keys shared by every summarization call.
pub struct CredentialPool {
    keys: Vec<String>,
    cursor: AtomicUsize,
}

impl CredentialPool {
    pub fn new(keys: Vec<String>) -> Self {
        let keys = keys.into_iter().map(|k| k.trim().to_string()).filter(|k| !k.is_empty()).collect();
        Self {
            keys,
            cursor: AtomicUsize::new(0),
        }
    }

    pub fn next(&self) -> Option<&str> {
        if self.keys.is_empty() {
            return None;
        }
        let index = self.cursor.fetch_add(1, Ordering::Relaxed) % self.keys.len();
        Some(self.keys[index].as_str())
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rotates_through_keys() {
        let pool = CredentialPool::new(vec!["a".into(), " ".into(), "b".into()]);
        assert_eq!(pool.len(), 2);
        let drawn: Vec<&str> = (0..5).filter_map(|_| pool.next()).collect();
        assert_eq!(drawn, vec!["a", "b", "a", "b", "a"]);
    }

    #[test]
    fn empty_pool_yields_nothing() {
        assert!(CredentialPool::new(vec![]).next().is_none());
    }
}
