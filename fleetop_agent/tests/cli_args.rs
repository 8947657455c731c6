//! CLI arg parsing tests for fleetop_agent (server)
use assert_cmd::Command;

#[test]
fn help_lists_server_flags() {
    let out = Command::cargo_bin("fleetop_agent")
        .unwrap()
        .arg("--help")
        .output()
        .expect("run fleetop_agent --help");
    assert!(out.status.success());
    let text = String::from_utf8_lossy(&out.stdout);
    for flag in [
        "--port",
        "--bind",
        "--password",
        "--username",
        "--disable-autodiscover",
        "--cached-time",
        "--webserver",
    ] {
        assert!(text.contains(flag), "help text missing {flag}\n{text}");
    }
}

#[test]
fn rejects_bad_values() {
    Command::cargo_bin("fleetop_agent")
        .unwrap()
        .args(["--port", "not-a-port"])
        .assert()
        .failure();
    Command::cargo_bin("fleetop_agent")
        .unwrap()
        .args(["--disable-autodiscover", "--cached-time", "0", "-p", "0"])
        .assert()
        .failure();
}
