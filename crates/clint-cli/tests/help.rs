use assert_cmd::cargo::cargo_bin_cmd;

fn help_output(args: &[&str]) -> String {
    let assert = cargo_bin_cmd!("clint").args(args).assert().success();
    String::from_utf8(assert.get_output().stdout.clone()).expect("utf8 help")
}

#[test]
fn top_level_help_groups_commands() {
    let output = help_output(&["--help"]);
    for command in ["bag", "rebag", "validate", "copy", "show", "add", "edit"] {
        assert!(
            output.contains(&format!("  {command} ")),
            "help missing {command}: {output}"
        );
    }
}

#[test]
fn copy_help_names_the_destination_flags() {
    let output = help_output(&["copy", "--help"]);
    assert!(
        output.contains("clint copy <DIR> --dest PATH --volume MOUNT [--host HOST]"),
        "copy usage missing: {output}"
    );
    assert!(output.contains("Mount point whose free space gates the copy"));
}

#[test]
fn show_help_lists_kinds() {
    let output = help_output(&["show", "--help"]);
    assert!(output.contains("bagaction"), "kinds missing: {output}");
}
