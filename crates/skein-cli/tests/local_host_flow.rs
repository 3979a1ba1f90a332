//! End-to-end flows through `App` on an on-disk database.

use skein::dispatch::{BranchEffect, DispatchRequest, DispatchStep};
use skein::domain::{DependencyDirection, Repository, UserId};
use skein::error::Error as RelationError;
use skein::graph::CyclePolicy;
use skein_cli::app::App;
use skein_cli::config::{self, SkeinConfig};
use tempfile::TempDir;

const OWNER: UserId = UserId::new(1);

struct Workspace {
    _dir: TempDir,
    app: App,
    source: Repository,
    target: Repository,
}

async fn workspace(policy: CyclePolicy) -> Workspace {
    let dir = TempDir::new().unwrap();
    config::init(dir.path(), SkeinConfig::new(OWNER, policy))
        .await
        .unwrap();
    let app = App::from_directory(dir.path()).await.unwrap();
    let source = app
        .host()
        .add_repository(OWNER, "octo", "widgets", "main")
        .unwrap();
    let target = app
        .host()
        .add_repository(OWNER, "octo", "fixes", "trunk")
        .unwrap();
    Workspace {
        _dir: dir,
        app,
        source,
        target,
    }
}

fn request(ws: &Workspace, index: i64, actor: UserId) -> DispatchRequest {
    DispatchRequest {
        actor,
        source_repo: ws.source.id,
        issue_index: index,
        target_repo: ws.target.id,
        base: String::new(),
    }
}

// ========== Relations ==========

#[tokio::test]
async fn test_dependencies_and_reactions_persist_across_reopen() {
    let ws = workspace(CyclePolicy::Direct).await;
    let host = ws.app.host();
    let a = host.add_issue(ws.source.id, "A").unwrap();
    let b = host.add_issue(ws.source.id, "B").unwrap();
    let relations = ws.app.relations();
    relations
        .add_dependency(OWNER, ws.source.id, a.index, b.id)
        .await
        .unwrap();
    relations
        .add_reaction(OWNER, ws.source.id, b.index, a.id)
        .await
        .unwrap();

    let reopened = App::from_directory(ws.app.skein_dir().parent().unwrap())
        .await
        .unwrap();
    let view = reopened
        .relations()
        .issue_view(ws.source.id, a.index)
        .await
        .unwrap();
    assert_eq!(view.blocked_by, vec![b.clone()]);
    assert_eq!(view.parents, vec![b]);
}

#[tokio::test]
async fn test_configured_transitive_policy_is_applied() {
    let ws = workspace(CyclePolicy::Transitive).await;
    let host = ws.app.host();
    let a = host.add_issue(ws.source.id, "A").unwrap();
    let b = host.add_issue(ws.source.id, "B").unwrap();
    let c = host.add_issue(ws.source.id, "C").unwrap();
    let relations = ws.app.relations();
    relations.add_dependency(OWNER, ws.source.id, a.index, b.id).await.unwrap();
    relations.add_dependency(OWNER, ws.source.id, b.index, c.id).await.unwrap();

    let err = relations
        .add_dependency(OWNER, ws.source.id, c.index, a.id)
        .await
        .unwrap_err();
    assert!(matches!(err, RelationError::CircularDependency { .. }));
}

#[tokio::test]
async fn test_strangers_cannot_manage_dependencies_until_added() {
    let ws = workspace(CyclePolicy::Direct).await;
    let host = ws.app.host();
    let a = host.add_issue(ws.source.id, "A").unwrap();
    let b = host.add_issue(ws.source.id, "B").unwrap();
    let stranger = UserId::new(5);

    let err = ws
        .app
        .relations()
        .add_dependency(stranger, ws.source.id, a.index, b.id)
        .await
        .unwrap_err();
    assert!(matches!(err, RelationError::PermissionDenied { .. }));

    host.add_collaborator(ws.source.id, stranger).unwrap();
    let view = ws
        .app
        .relations()
        .add_dependency(stranger, ws.source.id, a.index, b.id)
        .await
        .unwrap();
    assert_eq!(view.blocked_by, vec![b.clone()]);

    ws.app
        .relations()
        .remove_dependency(stranger, ws.source.id, b.index, a.id, DependencyDirection::Blocking)
        .await
        .unwrap();
}

// ========== Dispatch ==========

#[tokio::test]
async fn test_dispatch_creates_branch_and_pull_request() {
    let ws = workspace(CyclePolicy::Direct).await;
    let issue = ws
        .app
        .host()
        .add_issue(ws.source.id, "Parser rejects empty input")
        .unwrap();

    let view = ws
        .app
        .relations()
        .dispatch(&request(&ws, issue.index, OWNER))
        .await
        .unwrap();

    let dispatch = view.dispatch.unwrap();
    assert_eq!(dispatch.repository, ws.target);
    assert_eq!(dispatch.pull_request.head, "1-Parser_rejects");
    assert_eq!(dispatch.pull_request.base, "trunk");
    assert_eq!(dispatch.pull_request.title, issue.title);
    assert!(dispatch.issue.is_pull);
    assert!(ws.app.host().branch(ws.target.id, "1-Parser_rejects").unwrap().is_some());

    let source = ws
        .app
        .relations()
        .source_of(dispatch.pull_request.id)
        .await
        .unwrap();
    assert_eq!(source, Some(issue));
}

#[tokio::test]
async fn test_second_dispatch_reuses_branch_and_fails_to_record() {
    let ws = workspace(CyclePolicy::Direct).await;
    let issue = ws.app.host().add_issue(ws.source.id, "Flaky test").unwrap();
    let relations = ws.app.relations();
    relations
        .dispatch(&request(&ws, issue.index, OWNER))
        .await
        .unwrap();

    let err = relations
        .dispatch(&request(&ws, issue.index, OWNER))
        .await
        .unwrap_err();

    assert_eq!(err.step, DispatchStep::RecordDispatchEdge);
    assert!(matches!(err.effects.branch, Some(BranchEffect::Reused(_))));
    assert!(err.effects.pull_request.is_some());
    assert!(matches!(err.source, RelationError::DispatchExists(id) if id == issue.id));
    // The orphaned pull request is left for the caller.
    assert_eq!(ws.app.host().pull_requests(ws.target.id).unwrap().len(), 2);
}

#[tokio::test]
async fn test_unauthorized_dispatch_stops_before_any_side_effect() {
    let ws = workspace(CyclePolicy::Direct).await;
    let issue = ws.app.host().add_issue(ws.source.id, "Anything").unwrap();

    let err = ws
        .app
        .relations()
        .dispatch(&request(&ws, issue.index, UserId::new(99)))
        .await
        .unwrap_err();

    assert_eq!(err.step, DispatchStep::AuthorizeBranchCreation);
    assert!(err.effects.is_empty());
    assert_eq!(ws.app.host().branches(ws.target.id).unwrap().len(), 1);
}

#[tokio::test]
async fn test_remove_dispatch_keeps_branch_and_pull_request() {
    let ws = workspace(CyclePolicy::Direct).await;
    let issue = ws.app.host().add_issue(ws.source.id, "Cleanup").unwrap();
    let relations = ws.app.relations();
    relations
        .dispatch(&request(&ws, issue.index, OWNER))
        .await
        .unwrap();
    let dispatch = relations
        .get_dispatch(ws.source.id, issue.index)
        .await
        .unwrap();

    let view = relations
        .remove_dispatch(
            OWNER,
            ws.source.id,
            issue.index,
            dispatch.issue.id,
            dispatch.pull_request.id,
        )
        .await
        .unwrap();

    assert!(view.dispatch.is_none());
    assert_eq!(ws.app.host().pull_requests(ws.target.id).unwrap().len(), 1);
}

#[tokio::test]
async fn test_dangling_dispatch_is_removable_through_its_edge() {
    let ws = workspace(CyclePolicy::Direct).await;
    let issue = ws.app.host().add_issue(ws.source.id, "Lost pull request").unwrap();
    let relations = ws.app.relations();
    let dispatch = relations
        .dispatch(&request(&ws, issue.index, OWNER))
        .await
        .unwrap()
        .dispatch
        .unwrap();
    // Deleting on the host alone takes the pull request with it and skips the purge.
    assert!(ws.app.host().delete_issue(dispatch.issue.id).unwrap());

    let err = relations
        .get_dispatch(ws.source.id, issue.index)
        .await
        .unwrap_err();
    assert!(matches!(err, RelationError::DanglingReference { .. }));

    let edge = relations
        .dispatch_edge(ws.source.id, issue.index)
        .await
        .unwrap();
    let view = relations
        .remove_dispatch(
            OWNER,
            ws.source.id,
            issue.index,
            edge.target_issue_id,
            edge.pull_request_id,
        )
        .await
        .unwrap();
    assert!(view.dispatch.is_none());
    assert!(view.unresolved.is_empty());
}

// ========== Cascades ==========

#[tokio::test]
async fn test_deleting_target_repository_purges_dispatches() {
    let ws = workspace(CyclePolicy::Direct).await;
    let issue = ws.app.host().add_issue(ws.source.id, "Moved").unwrap();
    ws.app
        .relations()
        .dispatch(&request(&ws, issue.index, OWNER))
        .await
        .unwrap();

    let report = ws.app.delete_repository(&ws.target).unwrap();

    assert_eq!(report.dispatches, 1);
    let view = ws
        .app
        .relations()
        .issue_view(ws.source.id, issue.index)
        .await
        .unwrap();
    assert!(view.dispatch.is_none());
}
