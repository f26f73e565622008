#![cfg(unix)]

use std::{
    fs::File,
    process::{Command, Output, Stdio},
};

/// run the binary with a stdout it cannot write to
fn run_unwritable(args: &[&str]) -> Output {
    let stdout = File::open("/dev/null").unwrap();
    Command::new(env!("CARGO_BIN_EXE_arcbatch"))
        .args(args)
        .stdout(Stdio::from(stdout))
        .output()
        .unwrap()
}

#[test]
fn failed_help_output_is_logged() {
    let output = run_unwritable(&["--help"]);
    let stderr = String::from_utf8_lossy(&output.stderr);

    assert_eq!(output.status.code(), Some(0));
    assert!(stderr.contains("Cannot print usage"), "{stderr}");
}

#[test]
fn failed_usage_after_bad_options_is_logged() {
    let output = run_unwritable(&["--strict-exit", "run", "--no-such-option"]);
    let stderr = String::from_utf8_lossy(&output.stderr);

    assert_eq!(output.status.code(), Some(2));
    assert!(stderr.contains("Cannot print usage"), "{stderr}");
}
