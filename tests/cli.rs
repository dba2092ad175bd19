use assert_cmd::Command;

// Configuration errors must abort before any transfer begins, with their
// own exit code distinct from partial-failure runs.

#[test]
fn unknown_port_is_a_configuration_error() {
    Command::cargo_bin("courier")
        .unwrap()
        .env_remove("COURIER_SETTINGS_FILE")
        .args(["--port", "2222"])
        .assert()
        .code(2);
}

#[test]
fn unreadable_settings_file_is_a_configuration_error() {
    Command::cargo_bin("courier")
        .unwrap()
        .args(["--settings", "/nonexistent/presets.toml"])
        .assert()
        .code(2);
}
