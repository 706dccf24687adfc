//! Name-keyed diff between two desired sets.

use crate::preset::DesiredSet;

/// What changed between the previous and the next desired set.
///
/// Names keep the order of the set they came from: `removed` follows the
/// previous set, everything else the next one.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Diff {
    pub added: Vec<String>,
    pub removed: Vec<String>,
    pub changed: Vec<String>,
    pub unchanged: Vec<String>,
}

impl Diff {
    pub fn compute(previous: &DesiredSet, next: &DesiredSet) -> Self {
        let mut diff = Diff::default();

        for entry in next.iter() {
            let name = entry.spec.name.clone();
            match previous.get(&name) {
                None => diff.added.push(name),
                Some(old) if old == entry => diff.unchanged.push(name),
                Some(_) => diff.changed.push(name),
            }
        }

        diff.removed = previous
            .names()
            .filter(|name| !next.contains(name))
            .map(str::to_string)
            .collect();

        diff
    }

    /// `true` when applying this diff would change nothing.
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.changed.is_empty()
    }
}
