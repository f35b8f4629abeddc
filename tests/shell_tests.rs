//! End-to-end behaviour of the `pipesh` binary, driven through its stdin.

use std::ffi::OsStr;
use std::fs;
use std::io::{ErrorKind, Write};
use std::os::unix::ffi::OsStrExt;
use std::path::Path;
use std::process::{Command, Output, Stdio};
use std::time::{Duration, Instant};
use tempfile::tempdir;

/// A shell rooted in `dir`, isolated from the user's home and config.
fn pipesh(dir: &Path) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_pipesh"));
    cmd.current_dir(dir)
        .env("HOME", dir)
        .env("XDG_CONFIG_HOME", dir.join(".config"))
        .env_remove("RUST_LOG")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    cmd
}

fn feed(mut cmd: Command, input: impl AsRef<[u8]>) -> Output {
    let mut child = cmd.spawn().expect("failed to start pipesh");
    // Dropping the handle closes the pipe, which is the shell's end of input.
    let mut stdin = child.stdin.take().expect("stdin is piped");
    if let Err(e) = stdin.write_all(input.as_ref()) {
        // The shell may exit before reading anything.
        assert_eq!(e.kind(), ErrorKind::BrokenPipe);
    }
    drop(stdin);
    child.wait_with_output().expect("failed to wait for pipesh")
}

fn run(dir: &Path, input: impl AsRef<[u8]>) -> Output {
    feed(pipesh(dir), input)
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

#[test]
fn runs_external_commands() {
    let dir = tempdir().unwrap();
    let output = run(dir.path(), "echo hello\n");

    assert!(output.status.success());
    assert_eq!(stdout(&output), "hello\n");
    assert_eq!(stderr(&output), "");
}

#[test]
fn wires_pipelines() {
    let dir = tempdir().unwrap();
    let output = run(
        dir.path(),
        "echo hello world | tr a-z A-Z\nprintf 'b\\na\\nc\\n' | sort | head -n 2\n",
    );

    assert!(output.status.success());
    assert_eq!(stdout(&output), "HELLO WORLD\na\nb\n");
}

#[test]
fn last_output_redirection_wins() {
    let dir = tempdir().unwrap();
    let output = run(dir.path(), "echo x > a > b\n");

    assert!(output.status.success());
    assert_eq!(fs::read_to_string(dir.path().join("a")).unwrap(), "");
    assert_eq!(fs::read_to_string(dir.path().join("b")).unwrap(), "x\n");
}

#[test]
fn append_keeps_existing_contents() {
    let dir = tempdir().unwrap();
    run(dir.path(), "echo one > log\necho two >> log\nsort < log > sorted\n");

    assert_eq!(fs::read_to_string(dir.path().join("log")).unwrap(), "one\ntwo\n");
    assert_eq!(fs::read_to_string(dir.path().join("sorted")).unwrap(), "one\ntwo\n");
}

#[test]
fn missing_input_fails_only_the_child() {
    let dir = tempdir().unwrap();
    let output = run(dir.path(), "cat < missing\necho after\n");

    assert!(output.status.success());
    assert_eq!(stderr(&output), "missing: no such file or directory\n");
    assert_eq!(stdout(&output), "after\n");
}

#[test]
fn unknown_program_is_reported_by_the_child() {
    let dir = tempdir().unwrap();
    let output = run(dir.path(), "no-such-program-pipesh\necho still here\n");

    assert_eq!(stderr(&output), "no-such-program-pipesh: no such file or directory\n");
    assert_eq!(stdout(&output), "still here\n");
}

#[test]
fn empty_pipeline_link_rejects_the_whole_line() {
    let dir = tempdir().unwrap();
    let output = run(dir.path(), "touch first ; echo a | | cat\necho next\n");

    assert_eq!(stderr(&output), "Syntax error.\n");
    assert_eq!(stdout(&output), "next\n");
    assert!(!dir.path().join("first").exists());
}

#[test]
fn parse_errors_skip_the_line() {
    let dir = tempdir().unwrap();
    let output = run(dir.path(), "echo 'open\necho a & echo b\necho fine\n");

    assert_eq!(stderr(&output), "Syntax error.\nSyntax error.\n");
    assert_eq!(stdout(&output), "fine\n");
}

#[test]
fn overlong_lines_are_rejected_and_framing_resumes() {
    let dir = tempdir().unwrap();
    let mut cmd = pipesh(dir.path());
    cmd.args(["--max-line-length", "16"]);
    let output = feed(cmd, "echo 0123456789abcdef0123\necho ok\n");

    assert!(output.status.success());
    assert_eq!(stderr(&output), "Syntax error.\n");
    assert_eq!(stdout(&output), "ok\n");
}

#[test]
fn pipelines_in_a_line_run_in_order() {
    let dir = tempdir().unwrap();
    let output = run(dir.path(), "sh -c 'sleep 0.2; echo a' ; echo b\n");

    assert_eq!(stdout(&output), "a\nb\n");
}

#[test]
fn a_pipeline_waits_for_every_stage_not_only_the_last() {
    let dir = tempdir().unwrap();
    let output = run(dir.path(), "sh -c 'sleep 0.4; touch m' | true ; ls\n");

    assert_eq!(stdout(&output), "m\n");
}

#[test]
fn non_utf8_words_reach_programs_byte_for_byte() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join(OsStr::from_bytes(b"caf\xe9")), "inside\n").unwrap();

    let output = run(dir.path(), b"cat caf\xe9\necho made > new\xff\n");

    assert_eq!(stderr(&output), "");
    assert_eq!(stdout(&output), "inside\n");
    assert_eq!(
        fs::read(dir.path().join(OsStr::from_bytes(b"new\xff"))).unwrap(),
        b"made\n"
    );
}

#[test]
fn unterminated_last_line_is_executed() {
    let dir = tempdir().unwrap();
    let output = run(dir.path(), "echo first\necho tail");

    assert_eq!(stdout(&output), "first\ntail\n");
}

#[test]
fn builtin_echo_and_exit() {
    let dir = tempdir().unwrap();
    let output = run(dir.path(), "lecho a   b\nexit\nlecho unreachable\n");

    assert!(output.status.success());
    assert_eq!(stdout(&output), "a b\n");
}

#[test]
fn builtin_cd_and_ls() {
    let dir = tempdir().unwrap();
    let root = fs::canonicalize(dir.path()).unwrap();
    fs::create_dir(root.join("sub")).unwrap();
    fs::write(root.join("sub").join("inside"), "").unwrap();
    fs::write(root.join("sub").join(".hidden"), "").unwrap();

    let mut cmd = pipesh(&root);
    cmd.env("HOME", root.join("sub"));
    let output = feed(cmd, "lcd a b\npwd\nlcd\npwd\nlls\nlls extra\n");

    assert_eq!(
        stdout(&output),
        format!("{}\n{}\ninside\n", root.display(), root.join("sub").display())
    );
    assert_eq!(stderr(&output), "Builtin lcd error.\nBuiltin lls error.\n");
}

#[test]
fn builtin_kill_rejects_malformed_arguments() {
    let dir = tempdir().unwrap();
    let output = run(dir.path(), "lkill\nlkill 12x\nlkill -9 1 2\n");

    assert_eq!(
        stderr(&output),
        "Builtin lkill error.\nBuiltin lkill error.\nBuiltin lkill error.\n"
    );
}

#[test]
fn background_lines_do_not_block() {
    let dir = tempdir().unwrap();
    let mut cmd = pipesh(dir.path());
    // The background child keeps inherited outputs open; don't wait on them.
    cmd.stdout(Stdio::null()).stderr(Stdio::null());

    let started = Instant::now();
    let mut child = cmd.spawn().unwrap();
    child
        .stdin
        .take()
        .unwrap()
        .write_all(b"sleep 3 &\necho done > marker\n")
        .unwrap();
    let status = child.wait().unwrap();

    assert!(status.success());
    assert!(started.elapsed() < Duration::from_millis(2500));
    assert_eq!(fs::read_to_string(dir.path().join("marker")).unwrap(), "done\n");
}

#[test]
fn interactive_session_reports_background_completions() {
    let dir = tempdir().unwrap();
    let mut cmd = pipesh(dir.path());
    cmd.args(["-i", "--prompt", "> "]);
    let output = feed(cmd, "sleep 0.2 &\nsleep 1\n");

    let out = stdout(&output);
    assert!(out.starts_with("> "), "prompt missing: {:?}", out);
    assert!(
        out.contains("terminated. (exited with status 0)\n> "),
        "report missing: {:?}",
        out
    );
    assert_eq!(out.matches("Background process").count(), 1);
}

#[test]
fn non_interactive_session_prints_no_prompt() {
    let dir = tempdir().unwrap();
    let output = run(dir.path(), "sleep 0.1 &\nsleep 0.5\n");

    assert_eq!(stdout(&output), "");
}

#[test]
fn config_file_sets_the_prompt() {
    let dir = tempdir().unwrap();
    let config = dir.path().join("custom.toml");
    fs::write(&config, "prompt = \"pipesh% \"\n").unwrap();

    let mut cmd = pipesh(dir.path());
    cmd.arg("-i").arg("--config").arg(&config);
    let output = feed(cmd, "lecho hi\n");

    assert_eq!(stdout(&output), "pipesh% hi\npipesh% ");
}

#[test]
fn missing_explicit_config_is_fatal() {
    let dir = tempdir().unwrap();
    let mut cmd = pipesh(dir.path());
    cmd.args(["--config", "nope.toml"]);
    let output = feed(cmd, "echo never\n");

    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("nope.toml"));
    assert_eq!(stdout(&output), "");
}

#[cfg(target_os = "linux")]
#[test]
fn pipeline_children_hold_no_stray_descriptors() {
    let dir = tempdir().unwrap();
    let output = run(dir.path(), "ls /proc/self/fd\ntrue | ls /proc/self/fd | cat\n");

    // A middle stage must see exactly what a lone command sees: its three
    // standard streams, the directory `ls` is reading, and nothing else.
    let out = stdout(&output);
    let lines: Vec<&str> = out.lines().collect();
    let (alone, piped) = lines.split_at(lines.len() / 2);
    assert!(alone.starts_with(&["0", "1", "2"]), "unexpected listing: {:?}", out);
    assert_eq!(alone, piped);
}

#[cfg(target_os = "linux")]
#[test]
fn finished_pipelines_leave_no_descriptors_in_the_shell() {
    let dir = tempdir().unwrap();
    let output = run(dir.path(), "true | true | true | true\nls /proc/self/fd\n");

    // Three standard streams plus the directory `ls` is reading.
    assert_eq!(stdout(&output), "0\n1\n2\n3\n");
}
