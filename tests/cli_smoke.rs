use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

mod helpers;
use helpers::unique_test_temp_dir;

fn write_config(dir: &Path, yaml: &str) -> PathBuf {
    let p = dir.join("swarm.yaml");
    fs::write(&p, yaml).expect("write temp config");
    p
}

fn run_cli(args: &[&str], envs: &[(&str, &Path)]) -> Output {
    // This env var is provided by Cargo for integration tests.
    let exe = env!("CARGO_BIN_EXE_legal-swarm");
    let mut cmd = Command::new(exe);
    cmd.args(args)
        .env_remove("RUST_LOG")
        .env_remove("LEGAL_SWARM_PROVIDER")
        .env_remove("LEGAL_SWARM_MODEL")
        .env_remove("LEGAL_SWARM_BASE_URL")
        .env_remove("LEGAL_SWARM_TIMEOUT_SECS");
    for (k, v) in envs {
        cmd.env(k, v);
    }
    cmd.output().expect("run legal-swarm binary")
}

fn stdout(out: &Output) -> String {
    String::from_utf8_lossy(&out.stdout).to_string()
}

fn stderr(out: &Output) -> String {
    String::from_utf8_lossy(&out.stderr).to_string()
}

#[cfg(unix)]
fn mock_ollama(dir: &Path) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let bin = dir.join("mock_ollama.sh");
    fs::write(&bin, "#!/bin/sh\ncat >/dev/null\necho \"reply from ${2:-}\"\n").unwrap();
    let mut perms = fs::metadata(&bin).unwrap().permissions();
    perms.set_mode(0o755);
    fs::set_permissions(&bin, perms).unwrap();
    bin
}

#[test]
fn plan_lists_the_five_step_flow() {
    let dir = unique_test_temp_dir("cli-plan");
    let out = run_cli(&["plan"], &[("LEGAL_SWARM_STATE_DIR", dir.as_path())]);
    assert!(out.status.success(), "stderr:\n{}", stderr(&out));

    let text = stdout(&out);
    assert!(text.contains("Swarm:        Legal-Assistant-Swarm"), "stdout:\n{text}");
    assert!(
        text.contains(
            "Contract-Analyzer -> Legal-Researcher -> Compliance-Specialist -> Litigation-Support -> Corporate-Counsel"
        ),
        "stdout:\n{text}"
    );
    assert!(text.contains("4. Corporate-Counsel"), "stdout:\n{text}");
    assert!(text.contains("corporate_agent.json"), "stdout:\n{text}");
}

#[test]
fn run_with_unknown_agent_prints_sentinel() {
    let dir = unique_test_temp_dir("cli-invalid");
    let out = run_cli(
        &["run", "Review the NDA", "--agent", "nonsense"],
        &[("LEGAL_SWARM_STATE_DIR", dir.as_path())],
    );
    assert!(out.status.success(), "stderr:\n{}", stderr(&out));
    assert_eq!(stdout(&out).trim(), "Invalid agent type specified");
}

#[cfg(unix)]
#[test]
fn run_single_agent_through_ollama_with_trace() {
    let dir = unique_test_temp_dir("cli-run");
    let bin = mock_ollama(&dir);
    let cfg = write_config(&dir, "model:\n  provider: ollama\n  name: llama3.1:8b\n");

    let out = run_cli(
        &[
            "--config",
            cfg.to_str().unwrap(),
            "run",
            "Which court has jurisdiction?",
            "--agent",
            "litigation",
            "--trace",
        ],
        &[("LEGAL_SWARM_STATE_DIR", dir.as_path()), ("LEGAL_SWARM_OLLAMA_BIN", bin.as_path())],
    );
    assert!(out.status.success(), "stderr:\n{}", stderr(&out));

    let text = stdout(&out);
    assert!(text.contains("TRACE swarm=Legal-Assistant-Swarm"), "stdout:\n{text}");
    assert!(text.contains("StepStarted step=0.3.Litigation-Support loop=0 pos=3"), "stdout:\n{text}");
    assert!(text.trim_end().ends_with("reply from llama3.1:8b"), "stdout:\n{text}");
    assert!(dir.join("litigation_agent.json").exists());
}

#[cfg(unix)]
#[test]
fn model_failure_exits_nonzero_with_error_chain() {
    let dir = unique_test_temp_dir("cli-fail");
    let cfg = write_config(&dir, "model:\n  provider: ollama\n");
    let missing = dir.join("no-such-ollama");

    let out = run_cli(
        &["--config", cfg.to_str().unwrap(), "run", "x", "--agent", "contract"],
        &[("LEGAL_SWARM_STATE_DIR", dir.as_path()), ("LEGAL_SWARM_OLLAMA_BIN", missing.as_path())],
    );
    assert_eq!(out.status.code(), Some(1));
    let err = stderr(&out);
    assert!(err.contains("Error:"), "stderr:\n{err}");
    assert!(err.contains("Contract-Analyzer"), "stderr:\n{err}");
}

#[test]
fn install_reports_success_and_failure() {
    let dir = unique_test_temp_dir("cli-install");

    let ok = write_config(&dir, "install:\n  label: test model\n  command: [\"true\"]\n");
    let out = run_cli(&["--config", ok.to_str().unwrap(), "install"], &[]);
    assert!(out.status.success(), "stderr:\n{}", stderr(&out));
    assert!(stdout(&out).contains("✅ test model installed successfully!"));

    let bad = dir.join("bad.yaml");
    fs::write(&bad, "install:\n  label: test model\n  command: [\"false\"]\n").unwrap();
    let out = run_cli(&["--config", bad.to_str().unwrap(), "install"], &[]);
    assert_eq!(out.status.code(), Some(1));
    assert!(stdout(&out).contains("❌ Error installing test model:"));
}

#[test]
fn invalid_config_fails_fast() {
    let dir = unique_test_temp_dir("cli-badcfg");
    let cfg = write_config(&dir, "model:\n  nmae: typo\n");
    let out = run_cli(&["--config", cfg.to_str().unwrap(), "plan"], &[]);
    assert_eq!(out.status.code(), Some(1));
    assert!(stderr(&out).contains("failed to load configuration"));
}
