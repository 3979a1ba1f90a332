//! Edge store behavior across connections to one database file.

mod common;

use common::ACTOR;
use skein::domain::{IssueId, NewDispatch, PullRequestId, RepoId};
use skein::error::Error;
use skein::platform::MemoryPlatform;
use skein::store::{EdgeStore, PairKind, StoreError};
use skein::Relations;
use std::sync::Arc;
use tempfile::tempdir;

#[test]
fn test_racing_inserts_from_two_connections_conflict_once() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("edges.db");
    let first = EdgeStore::open(&path).unwrap();
    let second = EdgeStore::open(&path).unwrap();

    let results: Vec<Result<_, StoreError>> = std::thread::scope(|scope| {
        let handles = [&first, &second].map(|store| {
            scope.spawn(move || {
                store.write(|tx| {
                    tx.insert_pair(PairKind::Dependency, ACTOR, IssueId::new(1), IssueId::new(2))
                })
            })
        });
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    let conflicts = results
        .iter()
        .filter(|r| matches!(r, Err(StoreError::Conflict)))
        .count();
    assert_eq!(conflicts, 1);
    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
}

#[test]
fn test_dispatch_conflict_is_visible_to_other_connections() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("edges.db");
    let first = EdgeStore::open(&path).unwrap();
    let second = EdgeStore::open(&path).unwrap();

    let new = NewDispatch {
        actor: ACTOR,
        source_issue_id: IssueId::new(1),
        target_issue_id: IssueId::new(2),
        repo_id: RepoId::new(3),
        pull_request_id: PullRequestId::new(4),
    };
    first.write(|tx| tx.insert_dispatch(new)).unwrap();

    assert!(second.read(|tx| tx.dispatch_exists(IssueId::new(1))).unwrap());
    let err = second.write(|tx| tx.insert_dispatch(new)).unwrap_err();
    assert!(matches!(err, StoreError::Conflict));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_services_on_separate_connections_agree_on_existence() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("edges.db");
    let host = MemoryPlatform::new();
    let repo = host.add_repository("octo", "widgets", "main");
    let a = host.add_issue(repo.id, "A");
    let b = host.add_issue(repo.id, "B");

    let relations: Vec<Relations> = (0..2)
        .map(|_| Relations::new(Arc::new(EdgeStore::open(&path).unwrap()), host.platform()))
        .collect();
    let handles: Vec<_> = relations
        .into_iter()
        .map(|relations| {
            let (repo, index, other) = (repo.id, a.index, b.id);
            tokio::spawn(async move { relations.add_dependency(ACTOR, repo, index, other).await })
        })
        .collect();

    let mut outcomes = Vec::new();
    for handle in handles {
        outcomes.push(handle.await.unwrap());
    }

    assert_eq!(outcomes.iter().filter(|o| o.is_ok()).count(), 1);
    assert!(outcomes
        .iter()
        .any(|o| matches!(o, Err(Error::DependencyExists { .. }))));
}

#[test]
fn test_schema_is_applied_idempotently() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("edges.db");
    EdgeStore::open(&path).unwrap();
    EdgeStore::open(&path).unwrap();
}
