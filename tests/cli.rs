//! CLI integration tests for ecoci admin commands.
//!
//! Each test uses an isolated temp directory for the database, ensuring tests
//! can run in parallel safely.

#![allow(deprecated)] // Command::cargo_bin deprecation only affects custom build dirs

use std::path::Path;

use assert_cmd::Command;
use assert_fs::TempDir;
use ecoci::store::{SqliteStore, Store};
use ecoci::types::{ProviderProfile, Role};
use predicates::prelude::*;

struct TestContext {
    temp_dir: TempDir,
}

impl TestContext {
    fn new() -> Self {
        Self {
            temp_dir: TempDir::new().expect("failed to create temp dir"),
        }
    }

    fn data_dir(&self) -> &Path {
        self.temp_dir.path()
    }

    fn data_dir_str(&self) -> String {
        self.data_dir().to_string_lossy().to_string()
    }

    fn cmd(&self) -> Command {
        let mut cmd = Command::cargo_bin("ecoci").expect("failed to find binary");
        cmd.env("NO_COLOR", "1");
        for var in [
            "ECOCI_DATA_DIR",
            "ECOCI_JWT_SECRET",
            "GITHUB_CLIENT_ID",
            "GITHUB_CLIENT_SECRET",
        ] {
            cmd.env_remove(var);
        }
        cmd
    }

    fn init(&self) -> assert_cmd::assert::Assert {
        self.cmd()
            .args(["admin", "init", "--data-dir", &self.data_dir_str()])
            .assert()
    }

    fn store(&self) -> SqliteStore {
        SqliteStore::new(self.data_dir().join("ecoci.db")).expect("open store")
    }

    fn seed_user(&self, github_id: i64, handle: &str) {
        self.store()
            .upsert_identity(&ProviderProfile {
                github_id,
                handle: handle.to_string(),
                email: None,
                avatar_url: None,
                name: None,
            })
            .expect("seed user");
    }
}

#[test]
fn test_init_creates_database() {
    let ctx = TestContext::new();

    ctx.init()
        .success()
        .stdout(predicate::str::contains("Database initialized"));

    assert!(ctx.data_dir().join("ecoci.db").exists());

    // Running it again is harmless.
    ctx.init().success();
}

#[test]
fn test_set_role_promotes_user() {
    let ctx = TestContext::new();
    ctx.init().success();
    ctx.seed_user(1, "octocat");

    ctx.cmd()
        .args([
            "admin",
            "set-role",
            "--data-dir",
            &ctx.data_dir_str(),
            "--handle",
            "OctoCat",
            "--role",
            "admin",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("octocat is now admin"));

    let identity = ctx.store().get_identity_by_handle("octocat").unwrap().unwrap();
    assert_eq!(identity.role, Role::Admin);
}

#[test]
fn test_set_role_rejects_unknown_role_and_user() {
    let ctx = TestContext::new();
    ctx.init().success();
    ctx.seed_user(1, "octocat");

    ctx.cmd()
        .args([
            "admin",
            "set-role",
            "--data-dir",
            &ctx.data_dir_str(),
            "--handle",
            "octocat",
            "--role",
            "superuser",
        ])
        .assert()
        .failure();

    ctx.cmd()
        .args([
            "admin",
            "set-role",
            "--data-dir",
            &ctx.data_dir_str(),
            "--handle",
            "ghost",
            "--role",
            "admin",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("No user with handle"));
}

#[test]
fn test_delete_user() {
    let ctx = TestContext::new();
    ctx.init().success();
    ctx.seed_user(1, "octocat");

    ctx.cmd()
        .args([
            "admin",
            "delete-user",
            "--data-dir",
            &ctx.data_dir_str(),
            "--handle",
            "octocat",
        ])
        .assert()
        .success();

    assert!(ctx.store().get_identity_by_handle("octocat").unwrap().is_none());
}

#[test]
fn test_admin_commands_require_init() {
    let ctx = TestContext::new();

    ctx.cmd()
        .args([
            "admin",
            "delete-user",
            "--data-dir",
            &ctx.data_dir_str(),
            "--handle",
            "octocat",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("ecoci admin init"));
}

#[test]
fn test_serve_requires_secrets() {
    let ctx = TestContext::new();

    ctx.cmd()
        .args(["serve", "--data-dir", &ctx.data_dir_str()])
        .assert()
        .failure()
        .stderr(predicate::str::contains("jwt-secret"));
}
