//! Database schema for the edge tables.
//!
//! The `UNIQUE` and `CHECK` constraints are the final guard against racing
//! writers; the application-level existence checks only exist to produce a
//! precise error before the insert is attempted.

/// Database schema definition.
pub(crate) const SCHEMA: &str = r"
-- Blocking dependencies: issue_id is blocked by dependency_id
CREATE TABLE IF NOT EXISTS issue_dependency (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER NOT NULL,
    issue_id INTEGER NOT NULL,
    dependency_id INTEGER NOT NULL,
    created_unix INTEGER NOT NULL,
    updated_unix INTEGER NOT NULL,
    UNIQUE (issue_id, dependency_id),
    CHECK (issue_id <> dependency_id)
);

CREATE INDEX IF NOT EXISTS idx_issue_dependency_dependency ON issue_dependency(dependency_id);

-- Group reactions: issue_id is the parent of child_id
CREATE TABLE IF NOT EXISTS issue_group_reaction (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER NOT NULL,
    issue_id INTEGER NOT NULL,
    child_id INTEGER NOT NULL,
    created_unix INTEGER NOT NULL,
    updated_unix INTEGER NOT NULL,
    UNIQUE (issue_id, child_id),
    CHECK (issue_id <> child_id)
);

CREATE INDEX IF NOT EXISTS idx_issue_group_reaction_child ON issue_group_reaction(child_id);

-- Dispatches: issue_id was forwarded to pull_request_id, whose own issue is dispatched_id
CREATE TABLE IF NOT EXISTS issue_dispatch (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER NOT NULL,
    issue_id INTEGER NOT NULL UNIQUE,
    dispatched_id INTEGER NOT NULL UNIQUE,
    repo_id INTEGER NOT NULL,
    pull_request_id INTEGER NOT NULL UNIQUE,
    created_unix INTEGER NOT NULL,
    updated_unix INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_issue_dispatch_repo ON issue_dispatch(repo_id);
";
