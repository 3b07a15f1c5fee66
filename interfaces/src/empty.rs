use async_trait::async_trait;

use crate::defs::SearchCapability;
use crate::defs::SearchHit;

/// Search backend used when no search credentials are configured.
pub struct EmptySearch;

#[async_trait]
impl SearchCapability for EmptySearch {
    async fn query(&self, _text: &str, _k: usize) -> Vec<SearchHit> {
        // Nothing to search with, the fallback stage is skipped.
        vec![]
    }
}
