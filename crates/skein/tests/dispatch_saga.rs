//! Integration tests for the dispatch saga.

mod common;

use common::{Fixture, ACTOR};
use skein::dispatch::{BranchEffect, Compensation, DispatchRequest, DispatchStep};
use skein::domain::{Issue, RepoId, Repository, UserId, ViewField};
use skein::error::{EntityRef, Error, IssueLocator};
use skein::platform::PlatformError;

fn request(source: &Issue, target: &Repository, base: &str) -> DispatchRequest {
    DispatchRequest {
        actor: ACTOR,
        source_repo: source.repo_id,
        issue_index: source.index,
        target_repo: target.id,
        base: base.to_string(),
    }
}

/// Fixture plus a separate target repository with a `develop` branch.
fn setup() -> (Fixture, Repository) {
    let fx = Fixture::new();
    let target = fx.other_repo("deploy");
    fx.host.add_branch(target.id, "develop");
    (fx, target)
}

// ========== Success ==========

#[tokio::test]
async fn test_dispatch_creates_branch_pull_request_and_edge() {
    let (fx, target) = setup();
    // Burn six indices so the issue is #7.
    for n in 0..6 {
        fx.issue(&format!("filler {n}"));
    }
    let issue = fx.issue("Improve login flow");
    assert_eq!(issue.index, 7);

    let view = fx
        .relations
        .dispatch(&request(&issue, &target, "develop"))
        .await
        .unwrap();

    assert!(fx.host.has_branch(target.id, "7-Improve_login"));
    let dispatch = view.dispatch.unwrap();
    assert_eq!(dispatch.repository, target);
    assert_eq!(dispatch.pull_request.head, "7-Improve_login");
    assert_eq!(dispatch.pull_request.base, "develop");
    assert_eq!(dispatch.pull_request.title, "Improve login flow");
    assert_eq!(dispatch.pull_request.body, "Improve login flow");
    assert_eq!(dispatch.issue.id, dispatch.pull_request.issue_id);
    assert!(dispatch.issue.is_pull);

    let source = fx
        .relations
        .source_of(dispatch.pull_request.id)
        .await
        .unwrap();
    assert_eq!(source, Some(issue));
}

#[tokio::test]
async fn test_empty_title_derives_bare_index_branch() {
    let (fx, target) = setup();
    let issue = fx.issue("");

    fx.relations
        .dispatch(&request(&issue, &target, "develop"))
        .await
        .unwrap();

    assert!(fx.host.has_branch(target.id, &format!("{}-", issue.index)));
}

#[tokio::test]
async fn test_empty_base_uses_default_branch() {
    let (fx, target) = setup();
    let issue = fx.issue("Use defaults");

    let dispatch = fx
        .relations
        .dispatches()
        .dispatch(&request(&issue, &target, ""))
        .await
        .unwrap();

    assert_eq!(dispatch.pull_request.base, target.default_branch);
}

#[tokio::test]
async fn test_existing_branch_is_reused() {
    let (fx, target) = setup();
    let issue = fx.issue("Retry me");
    let branch = skein::dispatch::derive_branch_name(issue.index, &issue.title);
    fx.host.add_branch(target.id, &branch);

    fx.relations
        .dispatch(&request(&issue, &target, "develop"))
        .await
        .unwrap();

    assert_eq!(fx.host.branch_creations(), 0);
    assert_eq!(fx.host.pull_request_creations(), 1);
}

#[tokio::test]
async fn test_dispatch_within_the_same_repository() {
    let fx = Fixture::new();
    let issue = fx.issue("Local fix");

    let view = fx
        .relations
        .dispatch(&request(&issue, &fx.repo, "main"))
        .await
        .unwrap();

    assert_eq!(view.dispatch.unwrap().repository, fx.repo);
}

// ========== Failures before side effects ==========

#[tokio::test]
async fn test_unknown_target_fails_at_resolve_target() {
    let (fx, _) = setup();
    let issue = fx.issue("Lost");
    let mut req = request(&issue, &fx.repo, "main");
    req.target_repo = RepoId::new(4242);

    let err = fx.relations.dispatch(&req).await.unwrap_err();

    assert_eq!(err.step, DispatchStep::ResolveTarget);
    assert!(matches!(err.source, Error::RepositoryNotFound(id) if id == RepoId::new(4242)));
    assert!(err.effects.is_empty());
}

#[tokio::test]
async fn test_unknown_base_fails_at_resolve_base_branch() {
    let (fx, target) = setup();
    let issue = fx.issue("Lost");

    let err = fx
        .relations
        .dispatch(&request(&issue, &target, "release"))
        .await
        .unwrap_err();

    assert_eq!(err.step, DispatchStep::ResolveBaseBranch);
    assert!(matches!(err.source, Error::BranchNotFound { ref branch, .. } if branch == "release"));
}

#[tokio::test]
async fn test_unknown_issue_fails_at_resolve_source_issue() {
    let (fx, target) = setup();
    let req = DispatchRequest {
        actor: ACTOR,
        source_repo: fx.repo.id,
        issue_index: 77,
        target_repo: target.id,
        base: "develop".to_string(),
    };

    let err = fx.relations.dispatch(&req).await.unwrap_err();

    assert_eq!(err.step, DispatchStep::ResolveSourceIssue);
    assert!(matches!(
        err.source,
        Error::IssueNotFound(IssueLocator::Index { index: 77, .. })
    ));
}

#[tokio::test]
async fn test_denied_actor_fails_before_any_mutation() {
    let (fx, target) = setup();
    let issue = fx.issue("Not yours");
    let intruder = UserId::new(13);
    fx.host.deny_branch_creation(target.id, intruder);
    let mut req = request(&issue, &target, "develop");
    req.actor = intruder;

    let err = fx.relations.dispatch(&req).await.unwrap_err();

    assert_eq!(err.step, DispatchStep::AuthorizeBranchCreation);
    assert!(matches!(err.source, Error::PermissionDenied { .. }));
    assert_eq!(err.compensation(), Compensation::NothingToUndo);
    assert_eq!(fx.host.branch_creations(), 0);
    assert_eq!(fx.host.pull_request_creations(), 0);
}

#[tokio::test]
async fn test_branch_failure_leaves_nothing() {
    let (fx, target) = setup();
    let issue = fx.issue("Disk full");
    fx.host.fail_next_branch_creation("no space left");

    let err = fx
        .relations
        .dispatch(&request(&issue, &target, "develop"))
        .await
        .unwrap_err();

    assert_eq!(err.step, DispatchStep::CreateBranch);
    assert!(matches!(
        err.source,
        Error::BranchCreationFailed { source: PlatformError::Rejected(_), .. }
    ));
    assert!(err.effects.is_empty());
}

#[tokio::test]
async fn test_unavailable_platform_is_a_platform_error() {
    let (fx, target) = setup();
    let issue = fx.issue("Offline");
    fx.host.set_unavailable(true);

    let err = fx
        .relations
        .dispatch(&request(&issue, &target, "develop"))
        .await
        .unwrap_err();

    assert_eq!(err.step, DispatchStep::ResolveTarget);
    assert!(matches!(err.source, Error::Platform(PlatformError::Unavailable(_))));
    assert!(!err.source.is_client_error());
}

// ========== Failures after side effects ==========

#[tokio::test]
async fn test_pull_request_failure_leaves_the_branch() {
    let (fx, target) = setup();
    let issue = fx.issue("Flaky forge");
    fx.host.fail_next_pull_request("forge timeout");

    let err = fx
        .relations
        .dispatch(&request(&issue, &target, "develop"))
        .await
        .unwrap_err();

    let branch = skein::dispatch::derive_branch_name(issue.index, &issue.title);
    assert_eq!(err.step, DispatchStep::CreatePullRequest);
    assert!(matches!(err.source, Error::PullRequestCreationFailed { .. }));
    assert_eq!(err.compensation(), Compensation::LeaveBranch);
    assert_eq!(err.effects.branch, Some(BranchEffect::Created(branch.clone())));
    assert!(err.effects.pull_request.is_none());
    assert!(fx.host.has_branch(target.id, &branch));

    // A retry reuses the branch and completes.
    fx.relations
        .dispatch(&request(&issue, &target, "develop"))
        .await
        .unwrap();
    assert_eq!(fx.host.branch_creations(), 1);
}

#[tokio::test]
async fn test_second_dispatch_fails_at_record_step_after_side_effects() {
    let (fx, target) = setup();
    let issue = fx.issue("Only once");
    let req = request(&issue, &target, "develop");
    fx.relations.dispatch(&req).await.unwrap();

    let err = fx.relations.dispatch(&req).await.unwrap_err();

    assert_eq!(err.step, DispatchStep::RecordDispatchEdge);
    assert!(matches!(err.source, Error::DispatchExists(id) if id == issue.id));
    assert_eq!(err.compensation(), Compensation::LeaveBranchAndPullRequest);
    assert!(matches!(err.effects.branch, Some(BranchEffect::Reused(_))));
    let orphan = err.effects.pull_request.unwrap();

    // Both pull requests exist; only the first is linked.
    assert_eq!(fx.host.pull_requests(target.id).len(), 2);
    let linked = fx.relations.get_dispatch(fx.repo.id, issue.index).await.unwrap();
    assert_ne!(linked.pull_request.id, orphan.id);
    assert_eq!(fx.relations.source_of(orphan.id).await.unwrap(), None);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_concurrent_dispatches_record_one_edge() {
    let (fx, target) = setup();
    let issue = fx.issue("Raced twice");
    let req = request(&issue, &target, "develop");

    let spawn = |relations: skein::Relations| {
        let req = req.clone();
        tokio::spawn(async move { relations.dispatch(&req).await })
    };
    let first = spawn(fx.relations.clone());
    let second = spawn(fx.relations.clone());
    let results = [first.await.unwrap(), second.await.unwrap()];

    let successes = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(successes, 1);
    let loser = results.iter().find_map(|r| r.as_ref().err()).unwrap();
    assert_eq!(loser.step, DispatchStep::RecordDispatchEdge);
    assert!(matches!(loser.source, Error::DispatchExists(id) if id == issue.id));
    assert!(loser.effects.branch.is_some());
    let orphan = loser.effects.pull_request.clone().unwrap();

    // One branch, two pull requests, one link.
    assert_eq!(fx.host.branch_creations(), 1);
    assert_eq!(fx.host.pull_requests(target.id).len(), 2);
    let linked = fx.relations.get_dispatch(fx.repo.id, issue.index).await.unwrap();
    assert_ne!(linked.pull_request.id, orphan.id);
}

// ========== Retrieval and removal ==========

#[tokio::test]
async fn test_get_dispatch_without_one_is_not_exists() {
    let (fx, _) = setup();
    let issue = fx.issue("Never dispatched");

    let err = fx
        .relations
        .get_dispatch(fx.repo.id, issue.index)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::DispatchNotExists(id) if id == issue.id));
}

#[tokio::test]
async fn test_remove_dispatch_keeps_branch_and_pull_request() {
    let (fx, target) = setup();
    let issue = fx.issue("Undo link");
    let view = fx
        .relations
        .dispatch(&request(&issue, &target, "develop"))
        .await
        .unwrap();
    let dispatch = view.dispatch.unwrap();

    let view = fx
        .relations
        .remove_dispatch(
            ACTOR,
            fx.repo.id,
            issue.index,
            dispatch.issue.id,
            dispatch.pull_request.id,
        )
        .await
        .unwrap();

    assert!(view.dispatch.is_none());
    assert!(fx.host.has_branch(target.id, &dispatch.pull_request.head));
    assert_eq!(fx.host.pull_requests(target.id).len(), 1);

    let err = fx
        .relations
        .remove_dispatch(
            ACTOR,
            fx.repo.id,
            issue.index,
            dispatch.issue.id,
            dispatch.pull_request.id,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, Error::DispatchNotExists(_)));
}

#[tokio::test]
async fn test_removed_dispatch_can_be_dispatched_again() {
    let (fx, target) = setup();
    let issue = fx.issue("Second chance");
    let req = request(&issue, &target, "develop");
    let first = fx.relations.dispatch(&req).await.unwrap().dispatch.unwrap();

    fx.relations
        .remove_dispatch(ACTOR, fx.repo.id, issue.index, first.issue.id, first.pull_request.id)
        .await
        .unwrap();
    let second = fx.relations.dispatch(&req).await.unwrap().dispatch.unwrap();

    assert_ne!(first.pull_request.id, second.pull_request.id);
}

#[tokio::test]
async fn test_missing_pull_request_is_a_dangling_reference() {
    let (fx, target) = setup();
    let issue = fx.issue("Vanishing PR");
    let dispatch = fx
        .relations
        .dispatch(&request(&issue, &target, "develop"))
        .await
        .unwrap()
        .dispatch
        .unwrap();
    fx.host.remove_pull_request(dispatch.pull_request.id);

    let err = fx
        .relations
        .get_dispatch(fx.repo.id, issue.index)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        Error::DanglingReference { missing: EntityRef::PullRequest(id), .. }
            if id == dispatch.pull_request.id
    ));
}

#[tokio::test]
async fn test_dangling_edge_can_still_be_read_and_removed() {
    let (fx, target) = setup();
    let issue = fx.issue("Orphaned link");
    fx.relations
        .dispatch(&request(&issue, &target, "develop"))
        .await
        .unwrap();
    let edge = fx.relations.dispatch_edge(fx.repo.id, issue.index).await.unwrap();
    fx.host.remove_pull_request(edge.pull_request_id);

    let edge = fx.relations.dispatch_edge(fx.repo.id, issue.index).await.unwrap();
    let view = fx
        .relations
        .remove_dispatch(
            ACTOR,
            fx.repo.id,
            issue.index,
            edge.target_issue_id,
            edge.pull_request_id,
        )
        .await
        .unwrap();

    assert!(view.dispatch.is_none());
    assert!(view.unresolved.is_empty());
    assert!(matches!(
        fx.relations.dispatch_edge(fx.repo.id, issue.index).await,
        Err(Error::DispatchNotExists(_))
    ));
}

// ========== Views answered by writes ==========

#[tokio::test]
async fn test_write_next_to_dangling_dispatch_reports_it_in_the_view() {
    let (fx, target) = setup();
    let issue = fx.issue("Dispatched then orphaned");
    let blocker = fx.issue("Blocker");
    let dispatch = fx
        .relations
        .dispatch(&request(&issue, &target, "develop"))
        .await
        .unwrap()
        .dispatch
        .unwrap();
    fx.host.remove_pull_request(dispatch.pull_request.id);

    let view = fx
        .relations
        .add_dependency(ACTOR, fx.repo.id, issue.index, blocker.id)
        .await
        .unwrap();

    assert_eq!(view.blocked_by, vec![blocker.clone()]);
    assert!(view.dispatch.is_none());
    assert_eq!(view.unresolved.len(), 1);
    assert_eq!(view.unresolved[0].field, ViewField::Dispatch);
    assert_eq!(
        view.unresolved[0].missing,
        EntityRef::PullRequest(dispatch.pull_request.id)
    );

    // The write committed, so repeating it is a duplicate.
    let err = fx
        .relations
        .add_dependency(ACTOR, fx.repo.id, issue.index, blocker.id)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::DependencyExists { .. }));
}

#[tokio::test]
async fn test_write_next_to_deleted_child_keeps_other_relations() {
    let fx = Fixture::new();
    let parent = fx.issue("Epic");
    let gone = fx.issue("Deleted task");
    let kept = fx.issue("Kept task");
    let blocker = fx.issue("Blocker");
    fx.relations
        .add_reaction(ACTOR, fx.repo.id, parent.index, gone.id)
        .await
        .unwrap();
    fx.relations
        .add_dependency(ACTOR, fx.repo.id, parent.index, blocker.id)
        .await
        .unwrap();
    fx.host.remove_issue(gone.id);

    let view = fx
        .relations
        .add_reaction(ACTOR, fx.repo.id, parent.index, kept.id)
        .await
        .unwrap();

    assert!(view.children.is_empty());
    assert_eq!(view.blocked_by, vec![blocker]);
    assert_eq!(view.unresolved.len(), 1);
    assert_eq!(view.unresolved[0].field, ViewField::Children);
    assert_eq!(view.unresolved[0].missing, EntityRef::Issue(gone.id));

    // Reads stay strict.
    assert!(matches!(
        fx.relations.issue_view(fx.repo.id, parent.index).await,
        Err(Error::DanglingReference { .. })
    ));
}

#[tokio::test]
async fn test_deleted_target_repository_purges_dispatches() {
    let (fx, target) = setup();
    let issue = fx.issue("Gone with the repo");
    fx.relations
        .dispatch(&request(&issue, &target, "develop"))
        .await
        .unwrap();
    fx.host.remove_repository(target.id);

    let err = fx
        .relations
        .get_dispatch(fx.repo.id, issue.index)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        Error::DanglingReference { missing: EntityRef::Repository(_), .. }
    ));

    let report = fx.relations.on_repository_deleted(target.id).unwrap();
    assert_eq!(report.dispatches, 1);
    let view = fx.relations.issue_view(fx.repo.id, issue.index).await.unwrap();
    assert!(view.dispatch.is_none());
}
