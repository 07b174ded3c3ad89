use audit_store::{AuditLogWriter, AuditedChange, InMemoryAuditStore, NewRevision, SortDirection};
use common::EntityId;
use criterion::{Criterion, criterion_group, criterion_main};
use revisions::{AuditedEntity, PageRequest, RevisionRepositoryFactory, SortOrder};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
struct License {
    id: EntityId,
    #[serde(default)]
    name: Option<String>,
}

impl AuditedEntity for License {
    type Id = EntityId;
    const ENTITY_NAME: &'static str = "License";
}

fn populated_store(rt: &tokio::runtime::Runtime, revisions: usize) -> (InMemoryAuditStore, EntityId) {
    let store = InMemoryAuditStore::new();
    let id = EntityId::new();

    rt.block_on(async {
        for step in 0..revisions {
            let license = License {
                id,
                name: Some(format!("v{step}")),
            };
            store
                .commit(
                    NewRevision::default_entity(),
                    vec![AuditedChange::modified("License", &id, &license).unwrap()],
                )
                .await
                .unwrap();
        }
    });

    (store, id)
}

fn bench_find_revisions(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let (store, id) = populated_store(&rt, 500);
    let repository = RevisionRepositoryFactory::new(store, None)
        .get_repository::<License, i32>()
        .unwrap();

    c.bench_function("revisions/find_revisions_500", |b| {
        b.iter(|| rt.block_on(repository.find_revisions(&id)).unwrap());
    });
}

fn bench_find_revisions_page(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let (store, id) = populated_store(&rt, 500);
    let repository = RevisionRepositoryFactory::new(store, None)
        .get_repository::<License, i32>()
        .unwrap();
    let request = PageRequest::of(5, 20)
        .unwrap()
        .with_sort(SortOrder::by_revision_number(SortDirection::Descending));

    c.bench_function("revisions/find_revisions_page_500", |b| {
        b.iter(|| rt.block_on(repository.find_revisions_page(&id, &request)).unwrap());
    });
}

fn bench_find_last_change_revision(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let (store, id) = populated_store(&rt, 500);
    let repository = RevisionRepositoryFactory::new(store, None)
        .get_repository::<License, i32>()
        .unwrap();

    c.bench_function("revisions/find_last_change_revision_500", |b| {
        b.iter(|| rt.block_on(repository.find_last_change_revision(&id)).unwrap());
    });
}

criterion_group!(
    benches,
    bench_find_revisions,
    bench_find_revisions_page,
    bench_find_last_change_revision
);
criterion_main!(benches);
