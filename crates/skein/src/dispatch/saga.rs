//! Dispatch saga states, compensation policy and failure reporting.
//!
//! A dispatch touches three resources that share no transaction: a branch,
//! a pull request and the dispatch edge. Nothing already created is undone
//! when a later step fails. Instead every failure carries the step it
//! happened in and the side effects that had been produced, so that the
//! caller can retry (branch names are deterministic) or reconcile by hand.

use serde::Serialize;
use std::fmt;
use std::future::Future;
use thiserror::Error;
use tracing::{trace, warn};

use crate::domain::PullRequest;
use crate::error::Error;

/// The states of a dispatch attempt, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum DispatchStep {
    /// Look up the target repository
    ResolveTarget,
    /// Look up the base branch in the target repository
    ResolveBaseBranch,
    /// Look up the issue being dispatched
    ResolveSourceIssue,
    /// Compute the branch name from the issue
    DeriveBranchName,
    /// Ask the gate whether the actor may create branches
    AuthorizeBranchCreation,
    /// Create the branch, or reuse it if present
    CreateBranch,
    /// Open the pull request
    CreatePullRequest,
    /// Store the dispatch edge
    RecordDispatchEdge,
    /// Terminal state
    Success,
}

impl DispatchStep {
    /// Every step, in execution order.
    pub const ALL: [Self; 9] = [
        Self::ResolveTarget,
        Self::ResolveBaseBranch,
        Self::ResolveSourceIssue,
        Self::DeriveBranchName,
        Self::AuthorizeBranchCreation,
        Self::CreateBranch,
        Self::CreatePullRequest,
        Self::RecordDispatchEdge,
        Self::Success,
    ];

    /// Returns the step name used in logs and errors.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ResolveTarget => "resolve-target",
            Self::ResolveBaseBranch => "resolve-base-branch",
            Self::ResolveSourceIssue => "resolve-source-issue",
            Self::DeriveBranchName => "derive-branch-name",
            Self::AuthorizeBranchCreation => "authorize-branch-creation",
            Self::CreateBranch => "create-branch",
            Self::CreatePullRequest => "create-pull-request",
            Self::RecordDispatchEdge => "record-dispatch-edge",
            Self::Success => "success",
        }
    }

    /// What is left behind when this step fails.
    #[must_use]
    pub fn compensation(&self) -> Compensation {
        match self {
            Self::ResolveTarget
            | Self::ResolveBaseBranch
            | Self::ResolveSourceIssue
            | Self::DeriveBranchName
            | Self::AuthorizeBranchCreation
            | Self::CreateBranch => Compensation::NothingToUndo,
            Self::CreatePullRequest => Compensation::LeaveBranch,
            Self::RecordDispatchEdge | Self::Success => Compensation::LeaveBranchAndPullRequest,
        }
    }

    /// Whether this step changes anything outside skein.
    #[must_use]
    pub fn is_mutating(&self) -> bool {
        matches!(
            self,
            Self::CreateBranch | Self::CreatePullRequest | Self::RecordDispatchEdge
        )
    }
}

impl fmt::Display for DispatchStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Policy applied to completed side effects when a step fails.
///
/// No policy deletes anything; they name what stays behind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Compensation {
    /// No side effect happened before the failure
    NothingToUndo,
    /// The branch stays; a retry reuses it
    LeaveBranch,
    /// Branch and pull request both stay for the caller to reconcile
    LeaveBranchAndPullRequest,
}

/// How the dispatch branch came to exist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case", tag = "kind", content = "name")]
pub enum BranchEffect {
    /// Created by this attempt
    Created(String),
    /// Already present and reused
    Reused(String),
}

impl BranchEffect {
    /// The branch name.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Created(name) | Self::Reused(name) => name,
        }
    }
}

/// Side effects produced by a dispatch attempt so far.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SideEffects {
    /// The dispatch branch, once step `CreateBranch` has succeeded
    pub branch: Option<BranchEffect>,

    /// The pull request, once step `CreatePullRequest` has succeeded
    pub pull_request: Option<PullRequest>,
}

impl SideEffects {
    /// Whether anything outside skein was touched.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.branch.is_none() && self.pull_request.is_none()
    }
}

/// A dispatch attempt that stopped before `Success`.
#[derive(Debug, Error)]
#[error("dispatch failed at step {step}: {source}")]
pub struct DispatchError {
    /// Step that failed
    pub step: DispatchStep,

    /// What had already been produced when the step failed
    pub effects: SideEffects,

    /// Why the step failed
    #[source]
    pub source: Error,
}

impl DispatchError {
    /// What the failure leaves behind.
    #[must_use]
    pub fn compensation(&self) -> Compensation {
        self.step.compensation()
    }

    /// Discard the saga context and keep the underlying error.
    #[must_use]
    pub fn into_inner(self) -> Error {
        self.source
    }
}

/// Tracks one dispatch attempt as it moves through its steps.
#[derive(Debug, Default)]
pub(super) struct Saga {
    pub(super) effects: SideEffects,
}

impl Saga {
    /// Run one step, attaching the saga context to its failure.
    pub(super) async fn run<T, F>(&self, step: DispatchStep, work: F) -> Result<T, DispatchError>
    where
        F: Future<Output = crate::error::Result<T>>,
    {
        trace!(step = %step, "Dispatch step");
        work.await.map_err(|source| self.fail(step, source))
    }

    /// Build the failure for `step`.
    pub(super) fn fail(&self, step: DispatchStep, source: Error) -> DispatchError {
        if !self.effects.is_empty() {
            warn!(
                step = %step,
                branch = self.effects.branch.as_ref().map(BranchEffect::name),
                pull_request = self.effects.pull_request.as_ref().map(|pr| pr.id.as_i64()),
                error = %source,
                "Dispatch failed after side effects; leaving them in place"
            );
        }
        DispatchError {
            step,
            effects: self.effects.clone(),
            source,
        }
    }
}
