//! End-to-end tests driving the `teamfacts` binary in a scratch directory

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use tempfile::TempDir;

fn teamfacts(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("teamfacts").unwrap();
    cmd.current_dir(dir.path())
        .env("HOME", dir.path())
        .env_remove("TEAMFACTS_DATABASE")
        .env_remove("TEAMFACTS_CONFIG")
        .env_remove("TEAMFACTS_TEAM")
        .env_remove("TEAMFACTS_API_KEY")
        .env_remove("RUST_LOG");
    cmd
}

fn initialized() -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    teamfacts(&dir)
        .args(["init", "--default-team", "acme"])
        .assert()
        .success();
    dir
}

fn json_of(cmd: &mut Command) -> Value {
    let out = cmd.arg("--format").arg("json").assert().success();
    serde_json::from_slice(&out.get_output().stdout).unwrap()
}

#[test]
fn test_commands_need_init() {
    let dir = tempfile::tempdir().unwrap();
    teamfacts(&dir)
        .args(["list"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("teamfacts init"));
}

#[test]
fn test_init_twice_needs_force() {
    let dir = initialized();
    assert!(dir.path().join(".teamfacts/config.toml").exists());
    assert!(dir.path().join(".teamfacts/data.db").exists());
    assert!(dir.path().join(".teamfacts/pending.db").exists());

    teamfacts(&dir)
        .args(["init"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--force"));
    teamfacts(&dir).args(["init", "--force"]).assert().success();
}

#[test]
fn test_add_search_list() {
    let dir = initialized();

    teamfacts(&dir)
        .args(["add", "We ship orders from the Leeds warehouse", "-C", "manufacturing"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Fact added"));

    teamfacts(&dir)
        .args(["search", "warehouse"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Leeds"))
        .stdout(predicate::str::contains("keyword"));

    let listed = json_of(teamfacts(&dir).args(["list"]));
    let facts = listed.as_array().unwrap();
    assert_eq!(facts.len(), 1);
    assert_eq!(facts[0]["team_id"], "acme");
    assert_eq!(facts[0]["category"], "manufacturing");

    // Other teams see nothing
    let other = json_of(teamfacts(&dir).args(["list", "--team", "globex"]));
    assert_eq!(other.as_array().unwrap().len(), 0);
}

#[test]
fn test_empty_content_rejected() {
    let dir = initialized();
    teamfacts(&dir).args(["add", "   "]).assert().failure();
}

#[test]
fn test_propose_contradiction_then_confirm() {
    let dir = initialized();

    teamfacts(&dir).args(["add", "There are 7 dwarfs"]).assert().success();

    let proposal = json_of(teamfacts(&dir).args(["propose", "There are 6 dwarfs", "--key", "conv-1"]));
    assert_eq!(proposal["status"], "awaiting_user");
    assert_eq!(proposal["check"]["conflict_type"], "contradiction");

    let pending = json_of(teamfacts(&dir).args(["pending", "list"]));
    assert_eq!(pending.as_array().unwrap().len(), 1);
    assert_eq!(pending[0]["key"], "conv-1");

    let outcome = json_of(teamfacts(&dir).args(["pending", "confirm", "conv-1"]));
    assert_eq!(outcome["status"], "updated");
    assert_eq!(outcome["fact"]["content"], "There are 6 dwarfs");
    assert_eq!(outcome["superseded"]["content"], "There are 7 dwarfs");

    // Consumed
    teamfacts(&dir)
        .args(["pending", "confirm", "conv-1"])
        .assert()
        .failure();

    let active = json_of(teamfacts(&dir).args(["list"]));
    assert_eq!(active.as_array().unwrap().len(), 1);
    let all = json_of(teamfacts(&dir).args(["list", "--all"]));
    assert_eq!(all.as_array().unwrap().len(), 2);
}

#[test]
fn test_invalidate_is_idempotent() {
    let dir = initialized();
    let fact = json_of(teamfacts(&dir).args(["add", "Our office is in Berlin"]));
    let id = fact["id"].as_str().unwrap().to_string();

    teamfacts(&dir).args(["invalidate", &id]).assert().success();
    teamfacts(&dir).args(["invalidate", &id]).assert().success();

    let shown = json_of(teamfacts(&dir).args(["show", &id]));
    assert!(!shown["valid_until"].is_null());
}

#[test]
fn test_decisions_and_context() {
    let dir = initialized();
    teamfacts(&dir).args(["add", "The team chats on Slack"]).assert().success();
    teamfacts(&dir)
        .args(["decide", "Use Slack for chat", "--why", "cheaper", "-a", "Teams"])
        .assert()
        .success();

    let knowledge = json_of(teamfacts(&dir).args(["knowledge", "slack"]));
    assert_eq!(knowledge["facts"].as_array().unwrap().len(), 1);
    assert_eq!(knowledge["decisions"].as_array().unwrap().len(), 1);

    teamfacts(&dir)
        .args(["context", "slack"])
        .assert()
        .success()
        .stdout(predicate::str::contains("## Known facts"))
        .stdout(predicate::str::contains("## Decisions"));
}

#[test]
fn test_stats_and_config() {
    let dir = initialized();
    teamfacts(&dir).args(["add", "We sell in 12 countries"]).assert().success();

    let stats = json_of(teamfacts(&dir).args(["stats"]));
    assert_eq!(stats["total_facts"], 1);
    assert_eq!(stats["pending_confirmations"], 0);

    teamfacts(&dir)
        .args(["config", "search.default_limit", "3"])
        .assert()
        .success();
    teamfacts(&dir)
        .args(["config", "search.default_limit"])
        .assert()
        .success()
        .stdout(predicate::str::contains("3"));
}

#[test]
fn test_bad_config_value_is_rejected_without_breaking_the_file() {
    let dir = initialized();

    teamfacts(&dir)
        .args(["config", "ai.provider", "bogus"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not a valid setting"));

    let config = std::fs::read_to_string(dir.path().join(".teamfacts/config.toml")).unwrap();
    assert!(!config.contains("bogus"));

    teamfacts(&dir).args(["config", "ai.provider", "local"]).assert().success();
    teamfacts(&dir).args(["list"]).assert().success();
}

#[test]
fn test_pending_keys_do_not_cross_teams() {
    let dir = initialized();

    teamfacts(&dir).args(["add", "There are 7 dwarfs"]).assert().success();
    teamfacts(&dir)
        .args(["add", "We have 3 offices", "--team", "globex"])
        .assert()
        .success();

    teamfacts(&dir)
        .args(["propose", "There are 6 dwarfs", "--key", "conv-1"])
        .assert()
        .success();
    teamfacts(&dir)
        .args(["propose", "We have 4 offices", "--key", "conv-1", "--team", "globex"])
        .assert()
        .success();

    let outcome = json_of(teamfacts(&dir).args(["pending", "save-anyway", "conv-1", "--team", "globex"]));
    assert_eq!(outcome["fact"]["team_id"], "globex");

    let pending = json_of(teamfacts(&dir).args(["pending", "list"]));
    assert_eq!(pending.as_array().unwrap().len(), 1);
    assert_eq!(pending[0]["proposed"]["content"], "There are 6 dwarfs");
}
