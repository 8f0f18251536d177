use assert_cmd::Command;

#[test]
fn test_generate_help() {
    let mut cmd = Command::cargo_bin("esmgen").unwrap();
    cmd.arg("generate").arg("--help");
    cmd.assert().success();
}

#[test]
fn test_generate_requires_prompt() {
    let mut cmd = Command::cargo_bin("esmgen").unwrap();
    cmd.arg("generate");
    cmd.assert().failure();
}
