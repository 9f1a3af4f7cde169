//! Tests against a real `python3` interpreter.
//!
//! Run with `cargo test -p qflow-shell -- --ignored` on a machine with
//! `python3` on `PATH`.

use qflow_shell::{InterpreterSession, ShellConfig, ShellError};

#[tokio::test]
#[ignore = "Requires python3 on PATH"]
async fn python_evaluates_expression() {
    let session = InterpreterSession::new(ShellConfig::default());
    session.start().await.unwrap();

    assert_eq!(session.execute("x = 1+1\nx").await.unwrap(), "2");
    assert_eq!(session.execute("print(x * 10)").await.unwrap(), "20");

    session.stop().await;
}

#[tokio::test]
#[ignore = "Requires python3 on PATH"]
async fn python_error_is_reported_and_session_survives() {
    let session = InterpreterSession::new(ShellConfig::default());
    session.start().await.unwrap();

    let err = session.execute("undefined_name").await.unwrap_err();
    assert!(matches!(err, ShellError::Interpreter(ref m) if m.contains("NameError")));

    session.execute("y = 5").await.unwrap();
    assert_eq!(session.execute("y").await.unwrap(), "5");

    session.stop().await;
}

#[tokio::test]
#[ignore = "Requires python3 on PATH"]
async fn python_multiline_block() {
    let session = InterpreterSession::new(ShellConfig::default());
    session.start().await.unwrap();

    let out = session
        .execute("for i in range(3):\n    print(i)\n")
        .await
        .unwrap();
    assert_eq!(out, "0\n1\n2");

    session.stop().await;
}
