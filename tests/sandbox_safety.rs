//! Confinement and cleanup guarantees of the sandbox, exercised through the
//! public filter + sandbox API.

use std::collections::BTreeMap;

use cli_rl_env::difficulty::{DifficultyLevel, LanguageChoice};
use cli_rl_env::episode::{Action, EngineConfig, EpisodeEngine};
use cli_rl_env::executor::{CommandFilter, CommandResult, Sandbox, SandboxConfig, DEFAULT_OUTPUT_CAP, REJECTED_EXIT_CODE};
use cli_rl_env::RejectReason;

fn project() -> BTreeMap<String, String> {
    let mut files = BTreeMap::new();
    files.insert("main.py".to_string(), "def add(a, b):\n    return a - b\n".to_string());
    files.insert("pkg/util.py".to_string(), "X = 1\n".to_string());
    files
}

async fn run(sandbox: &mut Sandbox, command: &str) -> CommandResult {
    let filter = CommandFilter::new();
    match filter.validate(command) {
        Ok(parsed) => sandbox.run(&parsed).await.expect("sandbox root present"),
        Err(rejected) => CommandResult::rejected(&rejected),
    }
}

#[tokio::test]
async fn test_escaping_paths_are_rejected() {
    let mut sandbox = Sandbox::create(&project(), SandboxConfig::default()).unwrap();
    let cases = [
        ("cat /etc/passwd", RejectReason::AbsolutePath),
        ("cat ../../etc/passwd", RejectReason::Traversal),
        ("cat pkg/../../secret", RejectReason::Traversal),
        ("ls ~", RejectReason::HomeDirectory),
        ("echo leak > /tmp/out.txt", RejectReason::AbsolutePath),
        ("rm -rf /", RejectReason::AbsolutePath),
    ];
    for (command, reason) in cases {
        let result = run(&mut sandbox, command).await;
        assert_eq!(result.exit_code, REJECTED_EXIT_CODE, "{}", command);
        assert_eq!(result.rejected, Some(reason), "{}", command);
    }
    sandbox.destroy().unwrap();
}

#[tokio::test]
async fn test_cd_never_leaves_root() {
    let mut sandbox = Sandbox::create(&project(), SandboxConfig::default()).unwrap();
    let root = sandbox.root().to_path_buf();

    run(&mut sandbox, "cd pkg").await;
    assert_eq!(sandbox.cwd(), root.join("pkg"));
    run(&mut sandbox, "cd ..").await;
    run(&mut sandbox, "cd ..").await;
    assert_eq!(sandbox.cwd(), root);

    let pwd = run(&mut sandbox, "pwd").await;
    assert_eq!(pwd.stdout.trim_end(), root.display().to_string());
    sandbox.destroy().unwrap();
}

#[tokio::test]
async fn test_read_only_commands_are_idempotent() {
    let mut sandbox = Sandbox::create(&project(), SandboxConfig::default()).unwrap();
    let before = sandbox.read_files().unwrap();
    let first = run(&mut sandbox, "cat main.py").await;
    let second = run(&mut sandbox, "cat main.py").await;
    assert_eq!(first.stdout, second.stdout);
    assert_eq!(first.stdout, project()["main.py"]);
    assert_eq!(sandbox.read_files().unwrap(), before);
    sandbox.destroy().unwrap();
}

#[tokio::test]
async fn test_large_output_is_truncated() {
    let mut files = project();
    files.insert("big.txt".to_string(), "y".repeat(200 * 1024));
    let mut sandbox = Sandbox::create(&files, SandboxConfig::default()).unwrap();

    let result = run(&mut sandbox, "cat big.txt").await;
    assert!(result.truncated);
    assert_eq!(result.stdout.len(), DEFAULT_OUTPUT_CAP);
    assert_eq!(result.exit_code, 0);
    sandbox.destroy().unwrap();
}

#[tokio::test]
async fn test_sandbox_removed_when_episode_ends() {
    let mut engine = EpisodeEngine::new(EngineConfig::default()).unwrap();
    engine
        .reset(11, DifficultyLevel::Easy, LanguageChoice::Python)
        .await
        .unwrap();
    let outcome = engine
        .step(Action::new(["pwd"], 5.0))
        .await
        .unwrap();
    let root = outcome.info.execution_results[0].stdout.trim_end().to_string();
    assert!(!root.is_empty());
    assert!(outcome.is_done());
    assert!(!std::path::Path::new(&root).exists());
}

#[tokio::test]
async fn test_sandboxes_are_independent() {
    let mut a = Sandbox::create(&project(), SandboxConfig::default()).unwrap();
    let mut b = Sandbox::create(&project(), SandboxConfig::default()).unwrap();
    assert_ne!(a.root(), b.root());

    run(&mut a, "rm main.py").await;
    assert!(!a.root().join("main.py").exists());
    assert!(b.root().join("main.py").exists());

    let listing = run(&mut b, "ls").await;
    assert!(listing.stdout.contains("main.py"));
    a.destroy().unwrap();
    b.destroy().unwrap();
}
