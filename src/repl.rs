//! Read-eval-print loop.
//!
//! Input is read a line at a time. Complete forms are evaluated as soon as
//! they are available; a form split across lines waits for the rest.

use std::io::{BufRead, Write};

use crate::config::Config;
use crate::data::Value;
use crate::error::Error;
use crate::eval::EvalEnvironment;
use crate::printer;
use crate::reader::{ReadErr, Reader};

fn io_error(e: Error) -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::Other, e)
}

/// The printed form of a result and a newline, byte for byte.
fn echo(env: &EvalEnvironment, v: Value) -> Result<Vec<u8>, Error> {
    let mut out = Vec::new();
    printer::write(env.store(), v, &mut out)?;
    out.push(b'\n');
    Ok(out)
}

/// Run a session: evaluate each form from `input`, printing results to
/// `output` and diagnostics to `errors`.
///
/// With `abort_on_error`, the first error ends the session and is returned.
/// Otherwise the loop reports it and carries on with the next form; resource
/// errors end the session either way.
pub fn repl(
    mut input: impl BufRead,
    mut output: impl Write,
    mut errors: impl Write,
    config: Config,
) -> std::io::Result<()> {
    let abort_on_error = config.abort_on_error;
    let env = EvalEnvironment::with_config(config).map_err(io_error)?;
    let mut buffer: Vec<u8> = Vec::new();
    let mut line: Vec<u8> = Vec::new();

    loop {
        line.clear();
        let at_eof = input.read_until(b'\n', &mut line)? == 0;
        buffer.extend_from_slice(&line);

        let mut failure = None;
        let mut reader = Reader::new(env.store(), &buffer);
        loop {
            match reader.read() {
                Ok(Some(form)) => {
                    let result = env.eval(form);
                    output.write_all(&env.take_output())?;
                    match result.and_then(|v| echo(&env, v)) {
                        Ok(printed) => output.write_all(&printed)?,
                        Err(e) => {
                            failure = Some(e);
                            break;
                        }
                    }
                }
                Ok(None) => {
                    buffer.clear();
                    break;
                }
                Err(ReadErr::Incomplete(_)) if !at_eof => {
                    let consumed = reader.position();
                    buffer.drain(..consumed);
                    break;
                }
                Err(e) => {
                    failure = Some(Error::from(e));
                    break;
                }
            }
        }
        if failure.is_some() {
            // Whatever followed the failing form is dropped with it.
            buffer.clear();
        }
        output.flush()?;

        if let Some(e) = failure {
            tracing::warn!("{e}");
            writeln!(errors, "{e}")?;
            if let Some(traceback) = env.last_traceback() {
                writeln!(errors, "traceback (innermost last):")?;
                for name in traceback {
                    writeln!(errors, "    {name}")?;
                }
            }
            errors.flush()?;
            if abort_on_error || e.is_fatal() {
                return Err(io_error(e));
            }
        }
        if at_eof {
            return Ok(());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use std::io::Cursor;

    struct Session {
        result: std::io::Result<()>,
        output: String,
        errors: String,
    }

    fn run(input: &str, config: Config) -> Session {
        let mut output = Vec::new();
        let mut errors = Vec::new();
        let result = repl(Cursor::new(input.as_bytes()), &mut output, &mut errors, config);
        Session {
            result,
            output: String::from_utf8_lossy(&output).into_owned(),
            errors: String::from_utf8_lossy(&errors).into_owned(),
        }
    }

    fn error_kind(result: &std::io::Result<()>) -> Option<ErrorKind> {
        result
            .as_ref()
            .err()?
            .get_ref()?
            .downcast_ref::<Error>()
            .map(Error::kind)
    }

    #[test]
    fn prints_each_result() {
        let session = run("(+ 1 2)\n'a\n1 2 3\n", Config::default());
        assert!(session.result.is_ok(), "{:?}", session.result);
        assert_eq!(session.output, "3\na\n1\n2\n3\n");
        assert_eq!(session.errors, "");
    }

    #[test]
    fn forms_span_lines() {
        let session = run("(list 1\n 2)\n\"a\nb\"\n", Config::default());
        assert!(session.result.is_ok(), "{:?}", session.result);
        assert_eq!(session.output, "(1 2)\n\"a\nb\"\n");
    }

    #[test]
    fn last_line_without_newline() {
        let session = run("(+ 2 2)", Config::default());
        assert!(session.result.is_ok(), "{:?}", session.result);
        assert_eq!(session.output, "4\n");
    }

    #[test]
    fn program_output_precedes_result() {
        let session = run("(progn (print 5) 6)\n", Config::default());
        assert_eq!(session.output, "5\n6\n");
    }

    #[test]
    fn error_stops_by_default() {
        let session = run("(car 1)\n(+ 1 1)\n", Config::default());
        assert_eq!(error_kind(&session.result), Some(ErrorKind::Type));
        assert_eq!(session.output, "");
        assert!(session.errors.starts_with("type error"), "{}", session.errors);
        assert!(session.errors.contains("    car\n"), "{}", session.errors);
    }

    #[test]
    fn keep_going_after_errors() {
        let config = Config::default().with_abort_on_error(false);
        let session = run("(car 1)\n(+ 1 1)\n())\n3\n", config);
        assert!(session.result.is_ok(), "{:?}", session.result);
        assert_eq!(session.output, "2\nnil\n3\n");
        assert!(session.errors.contains("type error"), "{}", session.errors);
        assert!(session.errors.contains("syntax error"), "{}", session.errors);
    }

    #[test]
    fn resource_errors_always_stop() {
        let config = Config::default().with_abort_on_error(false);
        let session = run("(* 4611686018427387904 2)\n1\n", config);
        assert_eq!(error_kind(&session.result), Some(ErrorKind::Resource));
        assert_eq!(session.output, "");
    }

    #[test]
    fn results_keep_their_bytes() {
        let input = "(make-string 1 (code-char 200))\n(symbol (make-string 1 (code-char 255)))\n";
        let mut output = Vec::new();
        let result = repl(
            Cursor::new(input.as_bytes()),
            &mut output,
            std::io::sink(),
            Config::default(),
        );
        assert!(result.is_ok(), "{:?}", result);
        assert_eq!(output, b"\"\xc8\"\n\xff\n");
    }

    #[test]
    fn forms_before_a_bad_token_run() {
        let config = Config::default().with_abort_on_error(false);
        let session = run("1 2 #foo\n3\n", config);
        assert!(session.result.is_ok(), "{:?}", session.result);
        assert_eq!(session.output, "1\n2\n3\n");
        assert!(session.errors.contains("reserved symbol"), "{}", session.errors);
    }

    #[test]
    fn end_of_input_inside_a_form() {
        let config = Config::default().with_abort_on_error(false);
        let session = run("1\n(+ 1\n", config);
        assert_eq!(session.output, "1\n");
        assert!(session.errors.contains("syntax error"), "{}", session.errors);

        let session = run("(+ 1", Config::default());
        assert_eq!(error_kind(&session.result), Some(ErrorKind::Syntax));
    }
}
