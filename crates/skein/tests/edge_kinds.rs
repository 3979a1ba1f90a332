//! Properties shared by both issue-to-issue edge kinds.

mod common;

use common::{Fixture, ACTOR};
use rstest::rstest;
use skein::domain::{DependencyDirection, Issue, IssueView};
use skein::error::{Error, ErrorFamily};

#[derive(Debug, Clone, Copy)]
enum Kind {
    Dependency,
    Reaction,
}

async fn add(fx: &Fixture, kind: Kind, from: &Issue, to: &Issue) -> skein::Result<IssueView> {
    match kind {
        Kind::Dependency => {
            fx.relations
                .add_dependency(ACTOR, from.repo_id, from.index, to.id)
                .await
        }
        Kind::Reaction => {
            fx.relations
                .add_reaction(ACTOR, from.repo_id, from.index, to.id)
                .await
        }
    }
}

async fn remove(fx: &Fixture, kind: Kind, from: &Issue, to: &Issue) -> skein::Result<IssueView> {
    match kind {
        Kind::Dependency => {
            fx.relations
                .remove_dependency(
                    ACTOR,
                    from.repo_id,
                    from.index,
                    to.id,
                    DependencyDirection::BlockedBy,
                )
                .await
        }
        Kind::Reaction => {
            fx.relations
                .remove_reaction(ACTOR, from.repo_id, from.index, to.id)
                .await
        }
    }
}

fn outgoing(kind: Kind, view: &IssueView) -> &[Issue] {
    match kind {
        Kind::Dependency => &view.blocked_by,
        Kind::Reaction => &view.children,
    }
}

#[rstest]
#[case::dependency(Kind::Dependency)]
#[case::reaction(Kind::Reaction)]
#[tokio::test]
async fn test_added_edge_appears_once(#[case] kind: Kind) {
    let fx = Fixture::new();
    let a = fx.issue("A");
    let b = fx.issue("B");

    let view = add(&fx, kind, &a, &b).await.unwrap();
    assert_eq!(outgoing(kind, &view), [b]);
}

#[rstest]
#[case::dependency(Kind::Dependency)]
#[case::reaction(Kind::Reaction)]
#[tokio::test]
async fn test_duplicate_and_reverse_are_conflicts(#[case] kind: Kind) {
    let fx = Fixture::new();
    let a = fx.issue("A");
    let b = fx.issue("B");
    add(&fx, kind, &a, &b).await.unwrap();

    let duplicate = add(&fx, kind, &a, &b).await.unwrap_err();
    let reverse = add(&fx, kind, &b, &a).await.unwrap_err();

    assert_eq!(duplicate.family(), ErrorFamily::Conflict);
    assert_eq!(reverse.family(), ErrorFamily::Conflict);
    assert!(matches!(
        duplicate,
        Error::DependencyExists { .. } | Error::GroupReactionExists { .. }
    ));
    assert!(matches!(
        reverse,
        Error::CircularDependency { .. } | Error::CircularGroupReaction { .. }
    ));
}

#[rstest]
#[case::dependency(Kind::Dependency)]
#[case::reaction(Kind::Reaction)]
#[tokio::test]
async fn test_cross_repository_is_always_rejected(#[case] kind: Kind) {
    let fx = Fixture::new();
    let other = fx.other_repo("gadgets");
    let a = fx.issue("A");
    let foreign = fx.host.add_issue(other.id, "Foreign");

    let forward = add(&fx, kind, &a, &foreign).await.unwrap_err();
    let backward = add(&fx, kind, &foreign, &a).await.unwrap_err();

    assert!(matches!(forward, Error::CrossRepository { .. }));
    assert!(matches!(backward, Error::CrossRepository { .. }));
}

#[rstest]
#[case::dependency(Kind::Dependency)]
#[case::reaction(Kind::Reaction)]
#[tokio::test]
async fn test_removing_a_missing_edge_is_not_exists(#[case] kind: Kind) {
    let fx = Fixture::new();
    let a = fx.issue("A");
    let b = fx.issue("B");

    let err = remove(&fx, kind, &a, &b).await.unwrap_err();
    assert_eq!(err.family(), ErrorFamily::NotExists);

    add(&fx, kind, &a, &b).await.unwrap();
    remove(&fx, kind, &a, &b).await.unwrap();
    let again = remove(&fx, kind, &a, &b).await.unwrap_err();
    assert_eq!(again.family(), ErrorFamily::NotExists);
}

#[rstest]
#[case::dependency(Kind::Dependency)]
#[case::reaction(Kind::Reaction)]
#[tokio::test]
async fn test_kinds_are_independent(#[case] kind: Kind) {
    let fx = Fixture::new();
    let a = fx.issue("A");
    let b = fx.issue("B");
    add(&fx, kind, &a, &b).await.unwrap();

    let other = match kind {
        Kind::Dependency => Kind::Reaction,
        Kind::Reaction => Kind::Dependency,
    };
    // The reverse edge of the other kind is not a cycle.
    add(&fx, other, &b, &a).await.unwrap();
}
