use anyhow::{anyhow, Result};
use log::{debug, info, warn};

use crate::{
    backend::Backend,
    config::Config,
    scorer::{ScorerError, SpamScorer},
};

/// The outcome counts of one mailbox scan.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Report {
    pub mailbox: String,
    pub listed: usize,
    pub spam: usize,
    pub skipped: usize,
}

/// What happened to one candidate message.
enum Verdict {
    Spam,
    Ham,
    Skipped,
}

/// Scans every configured mailbox and applies the configured action to
/// messages scoring above the threshold.
///
/// Vanished messages, unreadable scorer reports, failed actions and
/// unopenable mailboxes are reported and skipped; an unreachable
/// scoring daemon aborts the run (actions already taken stand).
pub fn check(
    backend: &mut impl Backend,
    scorer: &mut impl SpamScorer,
    config: &Config,
) -> Result<Vec<Report>> {
    let mut reports = Vec::new();

    for mailbox in config.mailboxes() {
        let uids = match backend.list_candidates(&mailbox, config.all_mail) {
            Ok(uids) => uids,
            Err(err) => {
                warn!("skipping mailbox `{}`: {}", mailbox, err);
                continue;
            }
        };

        let mut report = Report {
            mailbox: mailbox.clone(),
            listed: uids.len(),
            ..Default::default()
        };

        for uid in uids {
            match triage_one(backend, scorer, config, &mailbox, uid)? {
                Verdict::Spam => report.spam += 1,
                Verdict::Ham => (),
                Verdict::Skipped => report.skipped += 1,
            }
        }

        info!("{}: {} spam messages found", mailbox, report.spam);
        reports.push(report);
    }

    Ok(reports)
}

fn triage_one(
    backend: &mut impl Backend,
    scorer: &mut impl SpamScorer,
    config: &Config,
    mailbox: &str,
    uid: u32,
) -> Result<Verdict> {
    let raw = match backend.fetch(mailbox, uid) {
        Ok(raw) => raw,
        Err(err) => {
            warn!("skipping message {}: {}", uid, err);
            return Ok(Verdict::Skipped);
        }
    };

    let score = match scorer.score(&raw) {
        Ok(score) => score,
        Err(err @ ScorerError::Unavailable(_)) => return Err(err.into()),
        Err(err) => {
            warn!("skipping message {}: {}", uid, err);
            return Ok(Verdict::Skipped);
        }
    };
    debug!("message {} in `{}` scored {}", uid, mailbox, score);

    if score <= config.threshold {
        return Ok(Verdict::Ham);
    }

    match backend.apply_action(mailbox, uid, config.mode, &config.destination) {
        Ok(()) => Ok(Verdict::Spam),
        Err(err) => {
            // The message stays in place and will be reconsidered on
            // the next run.
            warn!("cannot act on message {}: {}", uid, err);
            Ok(Verdict::Skipped)
        }
    }
}

/// Feeds every message of the destination mailbox to the scorer as a
/// spam training example and returns the count of newly learned
/// messages.
pub fn learn(
    backend: &mut impl Backend,
    scorer: &mut impl SpamScorer,
    config: &Config,
) -> Result<usize> {
    info!("starting learning mode on mailbox `{}`", config.destination);

    let uids = backend
        .list_candidates(&config.destination, true)
        .map_err(|err| anyhow!("cannot open mailbox `{}`: {}", config.destination, err))?;

    let mut learned = 0;
    for uid in uids {
        let raw = match backend.fetch(&config.destination, uid) {
            Ok(raw) => raw,
            Err(err) => {
                warn!("skipping message {}: {}", uid, err);
                continue;
            }
        };

        match scorer.learn_spam(&raw) {
            Ok(true) => learned += 1,
            Ok(false) => debug!("message {} was already learned", uid),
            Err(err @ ScorerError::Unavailable(_)) => return Err(err.into()),
            Err(err) => warn!("skipping message {}: {}", uid, err),
        }
    }

    info!("learned {} new messages", learned);
    Ok(learned)
}
