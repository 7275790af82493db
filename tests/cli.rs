//! Argument-contract tests for the assistant binary: bad invocations must die before any
//! remote call is possible.

use std::process::Command;

fn assistant_bin() -> Command {
	Command::new(assert_cmd::cargo::cargo_bin!("csv_diff_assistant"))
}

#[test]
fn wrong_argument_counts_exit_nonzero() {
	for args in [vec![], vec!["old.csv"], vec!["old.csv", "new.csv", "extra.csv"]] {
		let output = assistant_bin().args(&args).env_remove("OPENAI_API_KEY").output().expect("run csv_diff_assistant");

		assert!(!output.status.success(), "command unexpectedly succeeded for args: {args:?}");
		let stderr = String::from_utf8_lossy(&output.stderr);
		assert!(stderr.contains("Usage"), "no usage message for args {args:?}, stderr: {stderr}");
	}
}

#[test]
fn missing_credential_fails_before_any_remote_call() {
	let dir = tempfile::tempdir().unwrap();
	std::fs::write(dir.path().join("old.csv"), "a,b\n1,2\n").unwrap();
	std::fs::write(dir.path().join("new.csv"), "a,b\n1,3\n").unwrap();

	let output = assistant_bin()
		.current_dir(dir.path())
		.args(["old.csv", "new.csv"])
		.env_remove("OPENAI_API_KEY")
		.output()
		.expect("run csv_diff_assistant");

	assert!(!output.status.success());
	assert!(String::from_utf8_lossy(&output.stderr).contains("OPENAI_API_KEY"));
}
