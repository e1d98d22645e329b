//! Unit tests for `AppError` display formatting and conversions.

use command_gate::AppError;

#[test]
fn display_prefixes_each_kind() {
    let cases = [
        (AppError::Config("bad".into()), "config: bad"),
        (AppError::CommandNotFound("nope".into()), "command not found: nope"),
        (AppError::CommandEmpty("missing".into()), "command empty: missing"),
        (AppError::Spawn("refused".into()), "spawn: refused"),
        (AppError::Io("disk".into()), "io: disk"),
        (AppError::Audit("sink".into()), "audit: sink"),
    ];

    for (err, expected) in cases {
        assert_eq!(err.to_string(), expected);
    }
}

#[test]
fn toml_error_converts_to_config() {
    let toml_err = toml::from_str::<toml::Value>("= nope").expect_err("invalid toml");
    let err: AppError = toml_err.into();
    assert!(matches!(err, AppError::Config(_)));
    assert!(err.to_string().starts_with("config: invalid config"));
}

#[test]
fn app_error_is_std_error() {
    fn assert_error<E: std::error::Error>(_: &E) {}
    assert_error(&AppError::Io("x".into()));
}
