use std::{
    io::Write,
    process::{Command, Output, Stdio},
};

use log::trace;
use thiserror::Error;

// sysexits codes spamc reports when spamd cannot be reached.
const EX_UNAVAILABLE: i32 = 69;
const EX_IOERR: i32 = 74;

const ALREADY_LEARNED: &str = "Message was already un/learned";

#[derive(Debug, Error)]
pub enum ScorerError {
    /// The scoring daemon cannot be reached. Fatal for the run: with
    /// no score there is no safe triage decision.
    #[error("spam scorer unavailable: {0}")]
    Unavailable(String),
    /// The scorer answered something unparseable. Scoped to one
    /// message.
    #[error("unreadable scorer report: `{0}`")]
    Protocol(String),
}

/// The scoring daemon seam of the triage loop.
pub trait SpamScorer {
    /// Submits a raw message for scoring and returns its spam score.
    fn score(&mut self, raw: &[u8]) -> Result<f32, ScorerError>;

    /// Submits a raw message as a spam training example. Returns false
    /// when the daemon already knew the message.
    fn learn_spam(&mut self, raw: &[u8]) -> Result<bool, ScorerError>;
}

/// Client around the stock `spamc` program, which owns the wire
/// protocol to spamd.
#[derive(Clone, Debug)]
pub struct SpamcClient {
    command: String,
}

impl SpamcClient {
    pub fn new(command: &str) -> Self {
        Self {
            command: command.to_owned(),
        }
    }

    fn run(&self, arg: &str, raw: &[u8]) -> Result<Output, ScorerError> {
        let mut child = Command::new(&self.command)
            .arg(arg)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .spawn()
            .map_err(|err| {
                ScorerError::Unavailable(format!("cannot run `{}`: {}", self.command, err))
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            // A broken pipe here means spamc bailed out early, most
            // likely because spamd is down.
            stdin.write_all(raw).map_err(|err| {
                ScorerError::Unavailable(format!("cannot pipe message to `{}`: {}", self.command, err))
            })?;
        }

        let output = child.wait_with_output().map_err(|err| {
            ScorerError::Unavailable(format!("cannot wait for `{}`: {}", self.command, err))
        })?;

        match output.status.code() {
            Some(code @ (EX_UNAVAILABLE | EX_IOERR)) => Err(ScorerError::Unavailable(format!(
                "`{}` cannot reach spamd (exit code {})",
                self.command, code,
            ))),
            _ => Ok(output),
        }
    }
}

impl SpamScorer for SpamcClient {
    fn score(&mut self, raw: &[u8]) -> Result<f32, ScorerError> {
        let output = self.run("-c", raw)?;
        let report = String::from_utf8_lossy(&output.stdout);
        trace!("spamc report: {}", report.trim());

        parse_check_report(&report)
    }

    fn learn_spam(&mut self, raw: &[u8]) -> Result<bool, ScorerError> {
        let output = self.run("--learntype=spam", raw)?;
        let report = String::from_utf8_lossy(&output.stdout);
        trace!("spamc learn report: {}", report.trim());

        Ok(report.trim() != ALREADY_LEARNED)
    }
}

/// Parses spamc's check report, a single `score/threshold` line like
/// `6.3/5.0`. The daemon answers `0/0` when it could not check the
/// message, which parses to a score of 0 and never crosses the
/// threshold.
pub fn parse_check_report(report: &str) -> Result<f32, ScorerError> {
    let line = report.lines().next().unwrap_or("").trim();

    line.split('/')
        .next()
        .and_then(|token| token.trim().parse().ok())
        .ok_or_else(|| ScorerError::Protocol(line.to_owned()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_regular_report() {
        assert_eq!(parse_check_report("6.3/5.0\n").unwrap(), 6.3);
        assert_eq!(parse_check_report("-1.2/5.0\n").unwrap(), -1.2);
    }

    #[test]
    fn parses_the_could_not_check_report() {
        assert_eq!(parse_check_report("0/0\n").unwrap(), 0.0);
    }

    #[test]
    fn ignores_trailing_report_lines() {
        assert_eq!(parse_check_report("9.9/5.0\nSpam detection details\n").unwrap(), 9.9);
    }

    #[test]
    fn rejects_garbage() {
        assert!(matches!(
            parse_check_report("SPAMD/1.1 76 EX_PROTOCOL\n"),
            Err(ScorerError::Protocol(_))
        ));
        assert!(matches!(parse_check_report(""), Err(ScorerError::Protocol(_))));
    }
}
