//! Optional post-sync metadata step, implemented outside the core.

use pixxiden_model::Game;
use pixxiden_stores::BoxFuture;
use thiserror::Error;

#[derive(Debug, Error)]
#[error("enrichment failed: {0}")]
pub struct EnrichError(pub String);

pub trait Enricher: Send + Sync {
    /// Returns augmented copies of `games`. Only descriptive fields of the
    /// returned records are written back; records may be omitted.
    fn enrich<'a>(&'a self, games: &'a [Game]) -> BoxFuture<'a, Result<Vec<Game>, EnrichError>>;
}
