//! Robocopy module tests.


/// Verify all public robocopy types are exported from the library.
#[test]
fn all_robocopy_types_exported() {
    use rcman::robocopy::{
        describe_exit_code, exit_code_is_success, quote_for_display, CommandError,
        RobocopyCommandBuilder, SpawnError,
    };

    let _ = RobocopyCommandBuilder::new();
    let _ = CommandError::MissingSource;
    let _: fn() -> SpawnError = || SpawnError::EmptyCommand;
    assert!(exit_code_is_success(1));
    assert_eq!(describe_exit_code(16), "serious error, no files copied");
    assert_eq!(quote_for_display("x"), "x");
}
