//! Dependency closure computation for dedup grouping
use crate::artifact::ArtifactSource;
use std::collections::{BTreeSet, HashSet};
use tracing::{debug, warn};

/// Walks dependency edges to find the artifacts a root pulls into its bundle
pub struct DependencyWalker<'a, S: ArtifactSource + ?Sized> {
    source: &'a S,
}

impl<'a, S: ArtifactSource + ?Sized> DependencyWalker<'a, S> {
    /// Create a walker over `source`
    pub fn new(source: &'a S) -> Self {
        Self { source }
    }

    /// Transitive closure of `root` restricted to local artifacts with a
    /// serialized form.
    ///
    /// Redirected dependencies are already satisfied elsewhere and are not
    /// entered. Artifacts without a serialized form are walked through but
    /// not collected. Each id is visited at most once, so cycles back to the
    /// root (or anywhere else) terminate. The root comes last and only if it
    /// qualifies itself.
    pub fn walk(&self, root: &str) -> Vec<String> {
        let Some(root_artifact) = self.source.artifact(root) else {
            warn!(artifact = root, "walk root not found, treating as satisfied");
            return Vec::new();
        };
        if root_artifact.redirect {
            debug!(artifact = root, "walk root is redirected, nothing to collect");
            return Vec::new();
        }

        let mut closure = Vec::new();
        let mut visited: HashSet<&str> = HashSet::new();
        visited.insert(root);

        let mut stack = vec![root_artifact];
        while let Some(current) = stack.pop() {
            // Reverse so the first declared dependency is explored first
            for dep_id in current.dependencies.iter().rev() {
                if !visited.insert(dep_id.as_str()) {
                    continue;
                }

                let Some(dep) = self.source.artifact(dep_id) else {
                    warn!(
                        artifact = %current.id,
                        dependency = %dep_id,
                        "dependency not found, skipping"
                    );
                    continue;
                };

                if dep.redirect {
                    continue;
                }

                if self.source.has_serialized_form(dep) {
                    closure.push(dep.id.clone());
                }
                stack.push(dep);
            }
        }

        if self.source.has_serialized_form(root_artifact) {
            closure.push(root_artifact.id.clone());
        }

        debug!(artifact = root, size = closure.len(), "dependency closure computed");
        closure
    }

    /// Closures for each of `roots`, as sets ready for partitioning
    pub fn closures<I, R>(&self, roots: I) -> Vec<BTreeSet<String>>
    where
        I: IntoIterator<Item = R>,
        R: AsRef<str>,
    {
        roots
            .into_iter()
            .map(|root| self.walk(root.as_ref()).into_iter().collect())
            .collect()
    }
}
