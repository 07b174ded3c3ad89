//! Wiring of revision repositories.

use std::sync::Arc;

use audit_store::AuditLogStore;
use common::RevisionNumber;

use crate::{
    AuditedEntity, Result, RevisionConfig, RevisionEntityInformation, RevisionError,
    RevisionMetadataStrategy, RevisionQueryEngine, RevisionRepository,
};

/// Creates [`RevisionQueryEngine`]s over one audit log.
///
/// The revision marker configuration and its metadata strategy are resolved
/// once here and shared by every repository the factory hands out.
#[derive(Debug, Clone)]
pub struct RevisionRepositoryFactory<S> {
    store: S,
    revision_entity: RevisionEntityInformation,
    strategy: RevisionMetadataStrategy,
}

impl<S> RevisionRepositoryFactory<S>
where
    S: AuditLogStore + Clone,
{
    /// Creates a factory. Without revision entity information the built-in
    /// marker is assumed.
    pub fn new(store: S, revision_entity: Option<RevisionEntityInformation>) -> Self {
        let revision_entity = revision_entity.unwrap_or_default();
        let strategy = revision_entity.metadata_strategy();

        tracing::debug!(
            revision_entity = revision_entity.entity_name(),
            revision_number = %revision_entity.revision_number_kind(),
            "revision repository factory configured"
        );

        Self {
            store,
            revision_entity,
            strategy,
        }
    }

    pub fn from_config(store: S, config: &RevisionConfig) -> Self {
        Self::new(store, Some(config.revision_entity.clone()))
    }

    pub fn revision_entity_information(&self) -> &RevisionEntityInformation {
        &self.revision_entity
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Creates the repository for entity type `T` with revision numbers of type `N`.
    ///
    /// Fails if `N` is not the number type the configured marker produces.
    pub fn get_repository<T, N>(&self) -> Result<RevisionQueryEngine<S, T, N>>
    where
        T: AuditedEntity,
        N: RevisionNumber,
    {
        let configured = self.revision_entity.revision_number_kind();
        if N::KIND != configured {
            return Err(RevisionError::Misconfiguration(format!(
                "configured a revision entity type of {} with a revision number type of {} \
                 but the repository for {} is typed to a revision number type of {}",
                self.revision_entity.entity_name(),
                configured,
                T::ENTITY_NAME,
                N::KIND
            )));
        }

        tracing::info!(
            entity = T::ENTITY_NAME,
            revision_number = %N::KIND,
            "revision repository created"
        );

        Ok(RevisionQueryEngine::new(
            self.store.clone(),
            self.strategy.clone(),
        ))
    }

    /// Like [`get_repository`](Self::get_repository), behind a shared trait object.
    pub fn get_shared_repository<T, N>(&self) -> Result<Arc<dyn RevisionRepository<T, N>>>
    where
        S: 'static,
        T: AuditedEntity,
        N: RevisionNumber,
    {
        Ok(Arc::new(self.get_repository::<T, N>()?))
    }
}
