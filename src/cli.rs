use std::path::PathBuf;

use clap::Parser;

use crate::config::Mode;

/// Detects and deletes spam from uncooperative IMAP servers.
#[derive(Debug, Parser)]
#[command(name = "imap-checker", version, about)]
pub struct Cli {
    /// The target IMAP server
    #[arg(short, long, value_name = "HOST")]
    pub server: String,

    /// The IMAP server port
    ///
    /// Defaults to 143, or to 993 when --ssl is set.
    #[arg(short, long, value_name = "PORT")]
    pub port: Option<u16>,

    /// Use TLS for connecting to the IMAP server
    #[arg(long)]
    pub ssl: bool,

    /// The user for IMAP authentication
    #[arg(short, long, value_name = "USER")]
    pub user: Option<String>,

    /// The password for IMAP authentication
    #[arg(short = 'w', long, value_name = "PASSWORD")]
    pub password: Option<String>,

    /// Override the default configuration file path
    ///
    /// The default path is the `imap-checker/config` file inside the
    /// platform configuration directory. The file is an ini file with
    /// one section per server hostname.
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// What should be done with spam when found
    #[arg(short, long, value_name = "MODE", value_enum)]
    pub mode: Option<Mode>,

    /// The mailbox where spam is to be moved
    #[arg(short, long, value_name = "MAILBOX")]
    pub destination: Option<String>,

    /// Additional mailboxes other than the inbox to analyze
    #[arg(short = 'b', long = "mailbox", value_name = "MAILBOX")]
    pub mailboxes: Vec<String>,

    /// Check every mail in the mailbox, not only unread mails
    #[arg(long)]
    pub all_mail: bool,

    /// The score above which a message is treated as spam
    #[arg(short, long, value_name = "SCORE")]
    pub threshold: Option<f32>,

    /// Learn new spam from the destination mailbox instead of scanning
    ///
    /// Requires spamd to be started with --allow-tell.
    #[arg(long)]
    pub learn: bool,

    /// The client command used to reach the scoring daemon
    #[arg(long, value_name = "COMMAND", default_value = "spamc")]
    pub spamc: String,

    /// Increase logging verbosity (can be used multiple times)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_is_required() {
        assert!(Cli::try_parse_from(["imap-checker"]).is_err());
        assert!(Cli::try_parse_from(["imap-checker", "-s", "imap.example.org"]).is_ok());
    }

    #[test]
    fn mode_values() {
        let cli =
            Cli::try_parse_from(["imap-checker", "-s", "host", "-m", "delete"]).unwrap();
        assert_eq!(cli.mode, Some(Mode::Delete));

        assert!(Cli::try_parse_from(["imap-checker", "-s", "host", "-m", "drop"]).is_err());
    }

    #[test]
    fn mailboxes_accumulate() {
        let cli = Cli::try_parse_from([
            "imap-checker",
            "-s",
            "host",
            "-b",
            "Archive",
            "-b",
            "Newsletters",
        ])
        .unwrap();
        assert_eq!(cli.mailboxes, ["Archive", "Newsletters"]);
    }
}
