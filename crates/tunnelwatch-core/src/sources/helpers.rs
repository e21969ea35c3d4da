//! Shared helpers used by the subprocess-backed sources.

use std::io;
use std::process::Stdio;

use tokio::process::Command;

use crate::error::SourceError;

// ---------------------------------------------------------------------------
// Shared command utilities
// ---------------------------------------------------------------------------

/// Run a subprocess and return its stdout as a `String`.
///
/// The child is killed if the returned future is dropped, so the collector's
/// per-sample timeout also reaps a hung `snmpget`. A non-zero exit maps to
/// [`SourceError::Timeout`] when the tool reports one on stderr and to
/// [`SourceError::Unreachable`] otherwise.
pub async fn run_command(program: &str, args: &[String]) -> Result<String, SourceError> {
    let output = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => SourceError::Unreachable(format!("{program}: not found")),
            _ => SourceError::Unreachable(format!("{program}: {e}")),
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let stderr = stderr.trim();
        if stderr.contains("Timeout") || stderr.contains("timed out") {
            return Err(SourceError::Timeout);
        }
        return Err(SourceError::Unreachable(if stderr.is_empty() {
            format!("{program} exited with {}", output.status)
        } else {
            stderr.to_string()
        }));
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Parse a non-negative integer, tolerating surrounding whitespace and quotes.
pub fn parse_u64(text: &str) -> Result<u64, SourceError> {
    let cleaned = text.trim().trim_matches('"');
    cleaned
        .parse::<u64>()
        .map_err(|_| SourceError::Malformed(format!("expected an integer, got '{cleaned}'")))
}

/// Parse a float with an optional trailing unit such as `ms` or `%`.
pub fn parse_f64_with_unit(text: &str, unit: &str) -> Result<f64, SourceError> {
    let cleaned = text.trim().trim_matches('"');
    let number = cleaned.strip_suffix(unit).unwrap_or(cleaned).trim();
    match number.parse::<f64>() {
        Ok(v) if v.is_finite() && v >= 0.0 => Ok(v),
        _ => Err(SourceError::Malformed(format!(
            "expected a number, got '{cleaned}'"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integers() {
        assert_eq!(parse_u64(" 42\n").unwrap(), 42);
        assert_eq!(parse_u64("\"7\"").unwrap(), 7);
        assert!(matches!(parse_u64("-1"), Err(SourceError::Malformed(_))));
        assert!(parse_u64("").is_err());
    }

    #[test]
    fn floats_with_units() {
        assert_eq!(parse_f64_with_unit("12.5ms", "ms").unwrap(), 12.5);
        assert_eq!(parse_f64_with_unit("12.5 ms\n", "ms").unwrap(), 12.5);
        assert_eq!(parse_f64_with_unit("3", "ms").unwrap(), 3.0);
        assert!(parse_f64_with_unit("NaN", "ms").is_err());
        assert!(parse_f64_with_unit("fast", "ms").is_err());
    }

    #[tokio::test]
    async fn missing_program_is_unreachable() {
        let err = run_command("tunnelwatch-definitely-not-installed", &[])
            .await
            .unwrap_err();
        assert!(matches!(err, SourceError::Unreachable(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn captures_stdout() {
        let out = run_command("echo", &["hello".to_string()]).await.unwrap();
        assert_eq!(out.trim(), "hello");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn failure_exit_is_unreachable() {
        let err = run_command("false", &[]).await.unwrap_err();
        assert!(matches!(err, SourceError::Unreachable(_)));
    }
}
