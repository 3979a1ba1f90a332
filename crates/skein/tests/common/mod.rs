//! Common test utilities shared across integration tests.

#![allow(dead_code)]

use skein::domain::{Issue, Repository, UserId};
use skein::graph::CyclePolicy;
use skein::platform::MemoryPlatform;
use skein::store::EdgeStore;
use skein::Relations;
use std::sync::Arc;

/// The user every test acts as unless it says otherwise
pub const ACTOR: UserId = UserId::new(1);

/// An in-memory host with one repository, wired into a `Relations` facade.
pub struct Fixture {
    pub host: MemoryPlatform,
    pub store: Arc<EdgeStore>,
    pub relations: Relations,
    pub repo: Repository,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_policy(CyclePolicy::Direct)
    }

    pub fn with_policy(policy: CyclePolicy) -> Self {
        let host = MemoryPlatform::new();
        let repo = host.add_repository("octo", "widgets", "main");
        let store = Arc::new(EdgeStore::open_in_memory().unwrap());
        let relations = Relations::new(Arc::clone(&store), host.platform()).with_cycle_policy(policy);
        Self {
            host,
            store,
            relations,
            repo,
        }
    }

    /// Open an issue in the fixture's repository.
    pub fn issue(&self, title: &str) -> Issue {
        self.host.add_issue(self.repo.id, title)
    }

    /// Add a second repository.
    pub fn other_repo(&self, name: &str) -> Repository {
        self.host.add_repository("octo", name, "main")
    }
}
