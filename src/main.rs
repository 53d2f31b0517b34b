//! Interactive Lisp: read forms from stdin, print each result on stdout.
//!
//! Errors and logs go to stderr. Runtime options come from the environment
//! (see `Config::from_env`); `BYTELISP_LOG` sets the log level (default `error`).
//!
//! ```ignore
//! <program.lisp bytelisp
//! ```

use std::process::ExitCode;

use bytelisp::config::Config;

#[cfg(feature = "tracing-subscriber")]
fn init_logging() {
    let level = std::env::var("BYTELISP_LOG")
        .ok()
        .and_then(|v| v.parse::<tracing::Level>().ok())
        .unwrap_or(tracing::Level::ERROR);
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(level)
        .init();
}

#[cfg(not(feature = "tracing-subscriber"))]
fn init_logging() {}

fn main() -> ExitCode {
    init_logging();
    let stdin = std::io::stdin().lock();
    let stdout = std::io::stdout().lock();
    let stderr = std::io::stderr().lock();

    match bytelisp::repl(stdin, stdout, stderr, Config::from_env()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(_) => ExitCode::FAILURE,
    }
}
