//! Domain membership predicate used to partition work between queues.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Whitelist (`reverse_match == false`) or blacklist (`reverse_match == true`)
/// of domain ids.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DomainFilter {
    domain_ids: BTreeSet<String>,
    reverse_match: bool,
}

impl DomainFilter {
    pub fn new<I, S>(domain_ids: I, reverse_match: bool) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            domain_ids: domain_ids.into_iter().map(Into::into).collect(),
            reverse_match,
        }
    }

    /// Filter accepting every domain (empty blacklist).
    pub fn all() -> Self {
        Self {
            domain_ids: BTreeSet::new(),
            reverse_match: true,
        }
    }

    pub fn domain_ids(&self) -> &BTreeSet<String> {
        &self.domain_ids
    }

    pub fn reverse_match(&self) -> bool {
        self.reverse_match
    }

    pub fn contains(&self, domain_id: &str) -> bool {
        self.domain_ids.contains(domain_id) != self.reverse_match
    }

    /// Only an empty whitelist accepts nothing; a blacklist is always open
    /// to unknown domains.
    pub fn accepts_nothing(&self) -> bool {
        !self.reverse_match && self.domain_ids.is_empty()
    }

    /// Widen the filter so it also accepts `domain_ids`.
    pub fn include<'a, I>(&self, domain_ids: I) -> Self
    where
        I: IntoIterator<Item = &'a String>,
    {
        let mut filter = self.clone();
        for id in domain_ids {
            if filter.reverse_match {
                filter.domain_ids.remove(id);
            } else {
                filter.domain_ids.insert(id.clone());
            }
        }
        filter
    }

    /// Narrow the filter so it no longer accepts `domain_ids`.
    pub fn exclude<'a, I>(&self, domain_ids: I) -> Self
    where
        I: IntoIterator<Item = &'a String>,
    {
        let mut filter = self.clone();
        for id in domain_ids {
            if filter.reverse_match {
                filter.domain_ids.insert(id.clone());
            } else {
                filter.domain_ids.remove(id);
            }
        }
        filter
    }

    /// Filter accepting the union of both filters' domains.
    pub fn merge(&self, other: &DomainFilter) -> Self {
        match (self.reverse_match, other.reverse_match) {
            (false, false) => Self {
                domain_ids: self.domain_ids.union(&other.domain_ids).cloned().collect(),
                reverse_match: false,
            },
            (true, true) => Self {
                domain_ids: self
                    .domain_ids
                    .intersection(&other.domain_ids)
                    .cloned()
                    .collect(),
                reverse_match: true,
            },
            (false, true) => other.include(&self.domain_ids),
            (true, false) => self.include(&other.domain_ids),
        }
    }

    /// Partition the accepted domains into `(selected, remaining)`.
    ///
    /// `selected` is a whitelist of the ids in `domain_ids` this filter
    /// accepts; `remaining` accepts everything else this filter accepts.
    /// The two never overlap and together accept exactly what `self` does.
    pub fn split(&self, domain_ids: &BTreeSet<String>) -> (DomainFilter, DomainFilter) {
        let selected = DomainFilter {
            domain_ids: domain_ids
                .iter()
                .filter(|id| self.contains(id))
                .cloned()
                .collect(),
            reverse_match: false,
        };
        let remaining = self.exclude(domain_ids);
        (selected, remaining)
    }
}
