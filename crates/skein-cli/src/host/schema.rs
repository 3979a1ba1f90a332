//! Database schema for the local host tables.
//!
//! They share the database file with skein's edge tables but are never
//! joined with them: the edge store only ever sees the identifiers.

/// Database schema definition.
pub(crate) const SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS host_repository (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    owner TEXT NOT NULL,
    name TEXT NOT NULL,
    owner_id INTEGER NOT NULL,
    default_branch TEXT NOT NULL,
    next_index INTEGER NOT NULL DEFAULT 0,
    UNIQUE (owner, name)
);

CREATE TABLE IF NOT EXISTS host_collaborator (
    repo_id INTEGER NOT NULL REFERENCES host_repository(id) ON DELETE CASCADE,
    user_id INTEGER NOT NULL,
    PRIMARY KEY (repo_id, user_id)
);

CREATE TABLE IF NOT EXISTS host_branch (
    repo_id INTEGER NOT NULL REFERENCES host_repository(id) ON DELETE CASCADE,
    name TEXT NOT NULL,
    commit_id TEXT NOT NULL,
    protected INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (repo_id, name)
);

CREATE TABLE IF NOT EXISTS host_issue (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    repo_id INTEGER NOT NULL REFERENCES host_repository(id) ON DELETE CASCADE,
    idx INTEGER NOT NULL,
    title TEXT NOT NULL,
    is_pull INTEGER NOT NULL DEFAULT 0,
    UNIQUE (repo_id, idx)
);

-- A pull request shares its index with the issue that backs it
CREATE TABLE IF NOT EXISTS host_pull_request (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    issue_id INTEGER NOT NULL UNIQUE REFERENCES host_issue(id) ON DELETE CASCADE,
    head TEXT NOT NULL,
    base TEXT NOT NULL,
    body TEXT NOT NULL
);
";
