use std::io::Write;
use std::path::Path;

use assert_cmd::Command;
use tempfile::{NamedTempFile, TempDir};

fn jsh() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_jsh"));
    cmd.env_remove("RUST_LOG").env_remove("JSH_LOG");
    cmd
}

fn script(content: &str) -> NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(".js").tempfile().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

fn text(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

#[test]
fn stdin_lines_run_interactively() {
    let out = jsh().write_stdin("1+1\nvar x = 'a' + 'b'\nx\n").output().unwrap();
    assert!(out.status.success());
    assert_eq!(text(&out.stdout), "= 2\n= undefined\n= ab\n");
    assert_eq!(text(&out.stderr), "");
}

#[test]
fn interactive_failures_do_not_end_the_session() {
    let out = jsh()
        .write_stdin("throw new Error('first')\n40 + 2\n")
        .output()
        .unwrap();
    assert!(out.status.success());
    assert_eq!(text(&out.stdout), "= 42\n");
    assert!(text(&out.stderr).starts_with("Error: first\n"));
}

#[test]
fn batch_file_prints_only_what_the_script_prints() {
    let file = script("var n = 6 * 7;\nprint('answer', n);\nn;\n");
    let out = jsh().arg(file.path()).output().unwrap();
    assert!(out.status.success());
    assert_eq!(text(&out.stdout), "answer 42\n");
}

#[test]
fn files_share_one_heap_in_order() {
    let first = script("var shared = 'from first';");
    let second = script("print(shared);");
    let out = jsh().arg(first.path()).arg(second.path()).output().unwrap();
    assert!(out.status.success());
    assert_eq!(text(&out.stdout), "from first\n");
}

#[test]
fn first_failing_file_stops_the_run() {
    let bad = script("null.property;");
    let never = script("print('should not run');");
    let out = jsh().arg(bad.path()).arg(never.path()).output().unwrap();
    assert_eq!(out.status.code(), Some(1));
    assert_eq!(text(&out.stdout), "");
    let stderr = text(&out.stderr);
    assert!(stderr.starts_with("TypeError"), "{stderr}");
    assert!(stderr.ends_with(&format!(
        "error in executing file {}\n",
        bad.path().display()
    )));
}

#[test]
fn missing_file_exits_one() {
    let dir = TempDir::new().unwrap();
    let missing = dir.path().join("nope.js");
    let out = jsh().arg(&missing).output().unwrap();
    assert_eq!(out.status.code(), Some(1));
    assert_eq!(
        text(&out.stderr),
        format!("failed to open source file: {}\n", missing.display())
    );
}

#[test]
fn usage_error_exits_one() {
    let out = jsh().arg("--no-such-flag").output().unwrap();
    assert_eq!(out.status.code(), Some(1));
    assert!(text(&out.stderr).contains("Usage: jsh"));

    let out = jsh().args(["--alloc", "bogus"]).output().unwrap();
    assert_eq!(out.status.code(), Some(1));
}

#[test]
fn help_exits_zero() {
    let out = jsh().arg("--help").output().unwrap();
    assert!(out.status.success());
    assert!(text(&out.stdout).contains("--alloc"));
}

#[test]
fn every_provider_runs_a_file() {
    let dir = TempDir::new().unwrap();
    let file = script("var s = 0; for (var i = 0; i < 1000; i++) s += i; print(s);");
    for kind in ["default", "logging", "hybrid", "external"] {
        let log = dir.path().join(format!("{kind}.log"));
        let out = jsh()
            .args(["--alloc", kind, "--alloc-log"])
            .arg(&log)
            .arg(file.path())
            .output()
            .unwrap();
        assert!(out.status.success(), "{kind}: {}", text(&out.stderr));
        assert_eq!(text(&out.stdout), "499500\n", "{kind}");
    }
    assert!(Path::new(&dir.path().join("logging.log")).exists());
}

#[test]
fn torture_run_survives_failing_scripts() {
    let file = script(
        "var parts = []; for (var i = 0; i < 300; i++) parts.push({ i: i, s: String(i) }); parts.length",
    );
    let out = jsh()
        .args(["--alloc", "torture", "--torture-every", "25"])
        .arg(file.path())
        .output()
        .unwrap();
    // Whether the script survives depends on where the failures land; the
    // host must exit cleanly either way.
    assert!(matches!(out.status.code(), Some(0) | Some(1)));
}

#[test]
fn timeout_flag_stops_runaway_file() {
    let file = script("for (;;) {}");
    let out = jsh()
        .args(["--timeout-ms", "50"])
        .arg(file.path())
        .output()
        .unwrap();
    assert_eq!(out.status.code(), Some(1));
    assert!(text(&out.stderr).contains("interrupted"), "{}", text(&out.stderr));
}

#[test]
fn config_file_is_applied() {
    let mut cfg = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
    writeln!(cfg, "[limits]\ntimeout_ms = 50").unwrap();
    let file = script("while (true) {}");
    let out = jsh()
        .arg("--config")
        .arg(cfg.path())
        .arg(file.path())
        .output()
        .unwrap();
    assert_eq!(out.status.code(), Some(1));
}

#[test]
fn broken_config_is_reported() {
    let mut cfg = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
    writeln!(cfg, "[alloc]\nprovider = \"nonsense\"").unwrap();
    let out = jsh().arg("--config").arg(cfg.path()).write_stdin("").output().unwrap();
    assert_eq!(out.status.code(), Some(1));
    assert!(text(&out.stderr).starts_with("invalid config"));
}
