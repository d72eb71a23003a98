//! Interactive prompts for one benchmark cycle.
//!
//! Input is validated here, once, into typed values; anything invalid is a
//! `ConfigError` and the caller exits non-zero.

use crate::config::{ConfigError, PolyModulusDegree, ProcessCount};
use crate::signals::Shutdown;
use std::io::{BufRead, Write};

const BANNER: &str = "\
+---------------------------------------------------------+
| Performance Test                                        |
+---------------------------------------------------------+
";

/// What the operator asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Request {
    Exit,
    Run {
        processes: ProcessCount,
        degree: PolyModulusDegree,
    },
}

/// Show the banner and ask for a process count and degree.
///
/// Entering `0`, or closing stdin, ends the session.
pub fn ask<R: BufRead, W: Write>(
    input: &mut R,
    output: &mut W,
    max_processes: u32,
) -> Result<Request, ConfigError> {
    let io_err = |e| ConfigError::Prompt { source: e };

    writeln!(output, "{BANNER}").map_err(io_err)?;
    write!(
        output,
        ">Enter number of parallel process(1-{max_processes}) or exit(0): "
    )
    .map_err(io_err)?;
    output.flush().map_err(io_err)?;

    let Some(line) = read_line(input)? else {
        return Ok(Request::Exit);
    };
    let requested: u32 = line
        .parse()
        .map_err(|_| ConfigError::InvalidNumber { input: line.clone() })?;
    if requested == 0 {
        return Ok(Request::Exit);
    }
    let processes = ProcessCount::new(requested, max_processes)?;

    let choices = PolyModulusDegree::ALL
        .iter()
        .map(|d| d.to_string())
        .collect::<Vec<_>>()
        .join(", ");
    write!(output, ">Enter poly_modulus_degree {choices}: ").map_err(io_err)?;
    output.flush().map_err(io_err)?;

    let Some(line) = read_line(input)? else {
        return Ok(Request::Exit);
    };
    let degree = line.parse()?;

    Ok(Request::Run { processes, degree })
}

/// Run a blocking prompt off the runtime, giving up if shutdown is requested.
///
/// Returns `None` when interrupted, before or during the prompt. The blocking
/// read itself cannot be cancelled and is abandoned.
pub async fn ask_interruptible<F>(
    ask: F,
    shutdown: &Shutdown,
) -> Result<Option<Request>, ConfigError>
where
    F: FnOnce() -> Result<Request, ConfigError> + Send + 'static,
{
    if shutdown.is_triggered() {
        return Ok(None);
    }

    let mut shutdown = shutdown.clone();
    let request = tokio::select! {
        res = tokio::task::spawn_blocking(ask) => match res {
            Ok(request) => request?,
            Err(e) => {
                return Err(ConfigError::Prompt {
                    source: std::io::Error::other(e),
                })
            }
        },
        _ = shutdown.wait() => return Ok(None),
    };

    if shutdown.is_triggered() {
        return Ok(None);
    }
    Ok(Some(request))
}

/// Next trimmed line, or `None` at end of input.
fn read_line<R: BufRead>(input: &mut R) -> Result<Option<String>, ConfigError> {
    let mut buf = String::new();
    let n = input
        .read_line(&mut buf)
        .map_err(|e| ConfigError::Prompt { source: e })?;
    if n == 0 {
        return Ok(None);
    }
    Ok(Some(buf.trim().to_string()))
}
