//! Revisions of an entity and their assembly from audit rows.

use std::cmp::Ordering;

use audit_store::{RevisionEntity, RevisionType};
use common::RevisionNumber;

use crate::{Result, RevisionMetadata, RevisionMetadataStrategy};

/// One entity snapshot together with the metadata of the revision that produced it.
#[derive(Debug, Clone)]
pub struct Revision<N, T> {
    metadata: RevisionMetadata<N>,
    entity: T,
}

impl<N: RevisionNumber, T> Revision<N, T> {
    pub(crate) fn new(metadata: RevisionMetadata<N>, entity: T) -> Self {
        Self { metadata, entity }
    }

    pub fn metadata(&self) -> &RevisionMetadata<N> {
        &self.metadata
    }

    pub fn entity(&self) -> &T {
        &self.entity
    }

    pub fn revision_number(&self) -> Option<N> {
        self.metadata.revision_number()
    }

    pub fn revision_type(&self) -> Option<RevisionType> {
        self.metadata.revision_type()
    }
}

impl<N: RevisionNumber, T: PartialEq> PartialEq for Revision<N, T> {
    fn eq(&self, other: &Self) -> bool {
        self.metadata == other.metadata && self.entity == other.entity
    }
}

/// Revisions order by their metadata. Two revisions with equal metadata
/// but different entities are incomparable.
impl<N: RevisionNumber, T: PartialEq> PartialOrd for Revision<N, T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match self.metadata.cmp(&other.metadata) {
            Ordering::Equal if self.entity != other.entity => None,
            ordering => Some(ordering),
        }
    }
}

/// An ordered collection of revisions of one entity.
///
/// Iteration starts at the oldest revision unless the collection was
/// [reversed](Revisions::reverse).
#[derive(Debug, Clone)]
pub struct Revisions<N, T> {
    revisions: Vec<Revision<N, T>>,
    latest_last: bool,
}

impl<N: RevisionNumber, T> Revisions<N, T> {
    /// Creates a collection sorted ascending by revision metadata.
    pub fn new(mut revisions: Vec<Revision<N, T>>) -> Self {
        revisions.sort_by(|a, b| a.metadata.cmp(&b.metadata));
        Self {
            revisions,
            latest_last: true,
        }
    }

    /// An empty collection.
    pub fn none() -> Self {
        Self {
            revisions: Vec::new(),
            latest_last: true,
        }
    }

    /// The revision with the highest metadata, independent of iteration order.
    pub fn latest_revision(&self) -> Option<&Revision<N, T>> {
        if self.latest_last {
            self.revisions.last()
        } else {
            self.revisions.first()
        }
    }

    /// Returns the same revisions in opposite iteration order.
    pub fn reverse(&self) -> Self
    where
        T: Clone,
    {
        let mut revisions = self.revisions.clone();
        revisions.reverse();
        Self {
            revisions,
            latest_last: !self.latest_last,
        }
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Revision<N, T>> {
        self.revisions.iter()
    }

    pub fn len(&self) -> usize {
        self.revisions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.revisions.is_empty()
    }
}

impl<N: RevisionNumber, T> Default for Revisions<N, T> {
    fn default() -> Self {
        Self::none()
    }
}

impl<N, T> IntoIterator for Revisions<N, T> {
    type Item = Revision<N, T>;
    type IntoIter = std::vec::IntoIter<Revision<N, T>>;

    fn into_iter(self) -> Self::IntoIter {
        self.revisions.into_iter()
    }
}

impl<'a, N, T> IntoIterator for &'a Revisions<N, T> {
    type Item = &'a Revision<N, T>;
    type IntoIter = std::slice::Iter<'a, Revision<N, T>>;

    fn into_iter(self) -> Self::IntoIter {
        self.revisions.iter()
    }
}

/// Builds [`Revision`] values from entity snapshots and raw markers.
#[derive(Debug, Clone)]
pub struct RevisionAssembler {
    strategy: RevisionMetadataStrategy,
}

impl RevisionAssembler {
    pub fn new(strategy: RevisionMetadataStrategy) -> Self {
        Self { strategy }
    }

    pub fn strategy(&self) -> &RevisionMetadataStrategy {
        &self.strategy
    }

    /// Combines a snapshot with the metadata extracted from its marker.
    pub fn assemble<N: RevisionNumber, T>(
        &self,
        entity: T,
        marker: RevisionEntity,
        revision_type: Option<RevisionType>,
    ) -> Result<Revision<N, T>> {
        let metadata = self.strategy.extract(marker, revision_type)?;
        Ok(Revision::new(metadata, entity))
    }
}
