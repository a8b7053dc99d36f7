//! Spam triage for IMAP mailboxes.
//!
//! Scores unread (or all) messages of a mailbox with SpamAssassin's
//! spamd and moves or deletes those scoring above a configurable
//! threshold. One invocation is one independent run: no state is kept
//! between runs, a message already moved out of a mailbox is simply
//! absent from the next listing.

pub mod backend;
pub mod cli;
pub mod config;
pub mod scorer;
pub mod triage;
