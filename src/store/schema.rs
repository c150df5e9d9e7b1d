pub const SCHEMA: &str = r#"
-- Identities mirror GitHub profiles; github_id never changes
CREATE TABLE IF NOT EXISTS users (
    id TEXT PRIMARY KEY,
    github_id INTEGER NOT NULL UNIQUE,
    handle TEXT NOT NULL,
    email TEXT,
    avatar_url TEXT,
    name TEXT,
    role TEXT NOT NULL DEFAULT 'user' CHECK (role IN ('user', 'admin')),
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

-- Repositories are created on first run submission and owned by one identity
CREATE TABLE IF NOT EXISTS repositories (
    id TEXT PRIMARY KEY,
    owner_id TEXT NOT NULL REFERENCES users(id),
    github_repo_id INTEGER UNIQUE,  -- NULL when the client did not send one
    name TEXT NOT NULL,
    full_name TEXT NOT NULL,
    description TEXT,
    private INTEGER NOT NULL DEFAULT 0,
    html_url TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,

    UNIQUE(owner_id, full_name)
);

-- Measurement records. Quantities are fixed point:
-- energy and co2 in millionths, duration in milliseconds
CREATE TABLE IF NOT EXISTS runs (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL REFERENCES users(id),
    repository_id TEXT NOT NULL REFERENCES repositories(id),
    energy_micros INTEGER NOT NULL CHECK (energy_micros >= 0),
    co2_micros INTEGER NOT NULL CHECK (co2_micros >= 0),
    duration_millis INTEGER NOT NULL CHECK (duration_millis >= 0),
    run_metadata TEXT,
    git_commit_sha TEXT CHECK (git_commit_sha IS NULL OR length(git_commit_sha) = 40),
    branch_name TEXT,
    workflow_name TEXT,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_users_handle ON users(handle COLLATE NOCASE);
CREATE INDEX IF NOT EXISTS idx_repositories_owner ON repositories(owner_id);
CREATE INDEX IF NOT EXISTS idx_runs_repository_created ON runs(repository_id, created_at);
CREATE INDEX IF NOT EXISTS idx_runs_user_created ON runs(user_id, created_at);
"#;
