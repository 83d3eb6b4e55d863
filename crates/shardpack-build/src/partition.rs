//! Refinement of overlapping id sets into disjoint groups
//!
//! Given one dependency closure per root artifact, the closures usually
//! share members. Packing each closure as-is would duplicate the shared
//! members, so they are split into the finest disjoint partition where
//! every closure is exactly a union of output groups.
use std::collections::BTreeSet;
use std::fmt::Debug;
use tracing::{debug, warn};

/// How a pending set relates to one already-processed group
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Overlap<T> {
    /// No shared members
    Disjoint,
    /// The processed group lies strictly inside the pending set
    CoversProcessed,
    /// Both sets hold exactly the same members
    Identical,
    /// The pending set lies strictly inside the processed group
    Absorbed,
    /// Each side keeps members of its own; carries the shared part
    Partial(BTreeSet<T>),
}

/// Compare a pending set against a processed group
pub fn classify<T: Ord + Clone>(test: &BTreeSet<T>, processed: &BTreeSet<T>) -> Overlap<T> {
    let shared: BTreeSet<T> = test.intersection(processed).cloned().collect();

    if shared.is_empty() {
        Overlap::Disjoint
    } else if shared.len() == processed.len() && shared.len() == test.len() {
        Overlap::Identical
    } else if shared.len() == processed.len() {
        Overlap::CoversProcessed
    } else if shared.len() == test.len() {
        Overlap::Absorbed
    } else {
        Overlap::Partial(shared)
    }
}

/// Split possibly-overlapping sets into the finest disjoint partition.
///
/// Every input set is the union of some output sets, and the outputs
/// together hold exactly the members of the inputs. Empty inputs produce
/// no output. With `verify`, the result is checked for disjointness and
/// completeness; on failure a warning is logged and the input is returned
/// unsplit.
pub fn split_partition<T>(groups: &[BTreeSet<T>], verify: bool) -> Vec<BTreeSet<T>>
where
    T: Ord + Clone + Debug,
{
    let split = refine(groups);
    debug!(inputs = groups.len(), outputs = split.len(), "partition refined");

    if verify {
        checked(groups, split)
    } else {
        split
    }
}

fn refine<T: Ord + Clone>(groups: &[BTreeSet<T>]) -> Vec<BTreeSet<T>> {
    let mut inputs = groups.iter().filter(|g| !g.is_empty());
    let Some(first) = inputs.next() else {
        return Vec::new();
    };

    let mut processed = vec![first.clone()];

    for group in inputs {
        // Groups split off during this pass are not compared again in it
        let snapshot = processed.len();
        let mut test = group.clone();
        let mut split_off = Vec::new();
        let mut accounted = false;

        for index in 0..snapshot {
            match classify(&test, &processed[index]) {
                Overlap::Disjoint => {}
                Overlap::CoversProcessed => {
                    let existing = &processed[index];
                    test.retain(|m| !existing.contains(m));
                }
                Overlap::Identical => {
                    accounted = true;
                    break;
                }
                Overlap::Absorbed => {
                    processed[index].retain(|m| !test.contains(m));
                    split_off.push(std::mem::take(&mut test));
                    accounted = true;
                    break;
                }
                Overlap::Partial(shared) => {
                    test.retain(|m| !shared.contains(m));
                    processed[index].retain(|m| !shared.contains(m));
                    split_off.push(shared);
                }
            }
        }

        processed.extend(split_off);
        if !accounted {
            processed.push(test);
        }
    }

    processed
}

fn checked<T>(input: &[BTreeSet<T>], split: Vec<BTreeSet<T>>) -> Vec<BTreeSet<T>>
where
    T: Ord + Clone + Debug,
{
    if is_disjoint_cover(input, &split) {
        split
    } else {
        warn!(
            inputs = input.len(),
            outputs = split.len(),
            "partition self-check failed, keeping the unsplit groups"
        );
        input.to_vec()
    }
}

/// Whether `output` is pairwise disjoint and covers exactly the members of `input`
pub fn is_disjoint_cover<T: Ord>(input: &[BTreeSet<T>], output: &[BTreeSet<T>]) -> bool {
    let mut seen = BTreeSet::new();
    for member in output.iter().flatten() {
        if !seen.insert(member) {
            return false;
        }
    }

    let expected: BTreeSet<&T> = input.iter().flatten().collect();
    seen == expected
}
