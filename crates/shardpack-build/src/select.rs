//! Size-threshold selection of pack candidates
use crate::artifact::ArtifactSource;
use crate::error::BuildResult;
use rayon::prelude::*;
use serde::Serialize;
use tracing::debug;

/// Artifacts small enough to be merged into one container
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Selection {
    /// Selected ids, in bundle order
    pub ids: Vec<String>,
    /// Serialized size of each selected id
    pub sizes: Vec<u64>,
    /// Sum of `sizes`
    pub total_size: u64,
}

impl Selection {
    /// Packing needs at least two members to save anything
    pub fn is_actionable(&self) -> bool {
        self.ids.len() >= 2
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Pick the bundle's own artifacts of an eligible kind whose serialized
/// size is at most `threshold` bytes.
///
/// Redirected and unknown ids are skipped. Sizes are probed in parallel;
/// the result keeps `bundle_ids` order. A probe failure aborts selection.
pub fn select_for_packing<S, F>(
    source: &S,
    bundle_ids: &[String],
    is_eligible: F,
    threshold: u64,
) -> BuildResult<Selection>
where
    S: ArtifactSource + ?Sized,
    F: Fn(&str) -> bool + Sync,
{
    let candidates: Vec<&str> = bundle_ids
        .iter()
        .filter_map(|id| source.artifact(id))
        .filter(|artifact| !artifact.redirect && is_eligible(&artifact.kind))
        .map(|artifact| artifact.id.as_str())
        .collect();

    let sized = candidates
        .par_iter()
        .map(|id| source.serialized_size(id).map(|size| (*id, size)))
        .collect::<BuildResult<Vec<_>>>()?;

    let mut selection = Selection::default();
    for (id, size) in sized {
        if size <= threshold {
            selection.ids.push(id.to_string());
            selection.sizes.push(size);
            selection.total_size += size;
        }
    }

    debug!(
        candidates = candidates.len(),
        selected = selection.len(),
        total_size = selection.total_size,
        threshold,
        "size-threshold selection"
    );

    Ok(selection)
}
