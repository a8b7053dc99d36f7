use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use clap::ValueEnum;
use ini::{Ini, Properties};
use log::debug;

use crate::cli::Cli;

/// The inbox is always scanned, before any configured mailbox.
pub const INBOX: &str = "INBOX";

const DEFAULT_DESTINATION: &str = "Spam";
const DEFAULT_THRESHOLD: f32 = 4.5;
const IMAP_PORT: u16 = 143;
const IMAP_SSL_PORT: u16 = 993;

/// What to do with a message once it is classified as spam.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, ValueEnum)]
pub enum Mode {
    /// Relocate the message to the destination mailbox
    #[default]
    Move,
    /// Mark the message for permanent removal
    Delete,
}

/// The effective configuration of a run, resolved once before any I/O
/// happens and immutable afterwards.
#[derive(Clone, Debug)]
pub struct Config {
    pub host: String,
    pub user: String,
    pub password: String,
    pub domain: Option<String>,
    pub port: u16,
    pub ssl: bool,
    pub boxes: Vec<String>,
    pub all_mail: bool,
    pub mode: Mode,
    pub destination: String,
    pub threshold: f32,
}

impl Config {
    /// Resolves the effective configuration: an explicit CLI value wins
    /// over the ini value, which wins over the documented default.
    pub fn resolve(cli: &Cli) -> Result<Self> {
        let file = FileSection::load(cli.config.as_deref(), &cli.server)?;
        Self::merge(cli, &file)
    }

    fn merge(cli: &Cli, file: &FileSection) -> Result<Self> {
        let user = cli
            .user
            .clone()
            .or_else(|| file.user.clone())
            .ok_or_else(|| anyhow!("missing IMAP user: pass --user or set `user` in the config file"))?;
        let password = cli
            .password
            .clone()
            .or_else(|| file.password.clone())
            .ok_or_else(|| {
                anyhow!("missing IMAP password: pass --password or set `password` in the config file")
            })?;

        // A CLI switch cannot express "explicitly off", so ssl and
        // all-mail degenerate to an OR with the ini value.
        let ssl = cli.ssl || file.ssl.unwrap_or(false);
        let all_mail = cli.all_mail || file.all_mail.unwrap_or(false);

        let port = cli
            .port
            .or(file.port)
            .unwrap_or(if ssl { IMAP_SSL_PORT } else { IMAP_PORT });

        let boxes = if cli.mailboxes.is_empty() {
            file.boxes.clone()
        } else {
            cli.mailboxes.clone()
        };

        Ok(Self {
            host: cli.server.clone(),
            user,
            password,
            domain: file.domain.clone(),
            port,
            ssl,
            boxes,
            all_mail,
            mode: cli.mode.or(file.mode).unwrap_or_default(),
            destination: cli
                .destination
                .clone()
                .or_else(|| file.destination.clone())
                .unwrap_or_else(|| DEFAULT_DESTINATION.into()),
            threshold: cli.threshold.or(file.threshold).unwrap_or(DEFAULT_THRESHOLD),
        })
    }

    /// The IMAP login name, `DOMAIN\user` when a domain is configured.
    pub fn login(&self) -> String {
        match &self.domain {
            Some(domain) => format!("{}\\{}", domain, self.user),
            None => self.user.clone(),
        }
    }

    /// The mailboxes to scan this run, the inbox always first.
    pub fn mailboxes(&self) -> Vec<String> {
        let mut mailboxes = vec![INBOX.to_string()];
        for mailbox in &self.boxes {
            if !mailbox.eq_ignore_ascii_case(INBOX) {
                mailboxes.push(mailbox.clone());
            }
        }
        mailboxes
    }
}

/// The default config file path: `imap-checker/config` inside the
/// platform configuration directory.
pub fn default_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("imap-checker").join("config"))
}

/// The raw values of the ini section matching the server hostname.
#[derive(Debug, Default)]
struct FileSection {
    user: Option<String>,
    password: Option<String>,
    domain: Option<String>,
    port: Option<u16>,
    ssl: Option<bool>,
    boxes: Vec<String>,
    all_mail: Option<bool>,
    mode: Option<Mode>,
    destination: Option<String>,
    threshold: Option<f32>,
}

impl FileSection {
    /// Reads the section named after the host from the ini file.
    ///
    /// An explicitly given path must exist; the default path and the
    /// host section are optional, their absence yields an empty
    /// section (the merge then falls back to CLI values and defaults).
    fn load(path: Option<&Path>, host: &str) -> Result<Self> {
        let path = match path {
            Some(path) => path.to_owned(),
            None => match default_path() {
                Some(path) if path.exists() => path,
                _ => return Ok(Self::default()),
            },
        };

        debug!("read config file {}", path.display());
        let file = Ini::load_from_file(&path)
            .with_context(|| format!("cannot read config file {}", path.display()))?;

        match file.section(Some(host)) {
            Some(section) => Self::from_section(section)
                .with_context(|| format!("invalid section `{}` in {}", host, path.display())),
            None => Ok(Self::default()),
        }
    }

    fn from_section(section: &Properties) -> Result<Self> {
        Ok(Self {
            user: section.get("user").map(str::to_owned),
            password: section.get("password").map(str::to_owned),
            domain: section.get("domain").map(str::to_owned),
            port: section
                .get("port")
                .map(|value| {
                    value
                        .trim()
                        .parse()
                        .map_err(|_| anyhow!("invalid port `{}`", value))
                })
                .transpose()?,
            ssl: section.get("ssl").map(|value| parse_bool("ssl", value)).transpose()?,
            boxes: section
                .get("boxes")
                .map(|value| {
                    value
                        .split(',')
                        .map(|mailbox| mailbox.trim().to_owned())
                        .filter(|mailbox| !mailbox.is_empty())
                        .collect()
                })
                .unwrap_or_default(),
            all_mail: section
                .get("all-mail")
                .map(|value| parse_bool("all-mail", value))
                .transpose()?,
            mode: section
                .get("mode")
                .map(|value| {
                    Mode::from_str(value.trim(), true)
                        .map_err(|_| anyhow!("invalid mode `{}`, expected move or delete", value))
                })
                .transpose()?,
            destination: section.get("destination").map(str::to_owned),
            // The key has always been spelled without its first `h`;
            // existing config files rely on it.
            threshold: section
                .get("treshold")
                .map(|value| {
                    value
                        .trim()
                        .parse()
                        .map_err(|_| anyhow!("invalid treshold `{}`", value))
                })
                .transpose()?,
        })
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(anyhow!("invalid boolean `{}` for key `{}`", value, key)),
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use clap::Parser;

    use super::*;

    fn cli(args: &[&str]) -> Cli {
        let mut argv = vec!["imap-checker"];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).unwrap()
    }

    fn write_config(content: &str) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config");
        fs::write(&path, content).unwrap();
        (dir, path)
    }

    #[test]
    fn defaults_without_config_file() {
        let cli = self::cli(&["-s", "imap.example.org", "-u", "jane", "-w", "secret"]);
        let config = Config::resolve(&cli).unwrap();

        assert_eq!(config.port, 143);
        assert!(!config.ssl);
        assert_eq!(config.mode, Mode::Move);
        assert_eq!(config.destination, "Spam");
        assert_eq!(config.threshold, 4.5);
        assert!(!config.all_mail);
        assert!(config.boxes.is_empty());
    }

    #[test]
    fn ssl_switches_default_port() {
        let cli = self::cli(&["-s", "imap.example.org", "-u", "jane", "-w", "secret", "--ssl"]);
        let config = Config::resolve(&cli).unwrap();
        assert_eq!(config.port, 993);

        let cli = self::cli(&[
            "-s",
            "imap.example.org",
            "-u",
            "jane",
            "-w",
            "secret",
            "--ssl",
            "-p",
            "1993",
        ]);
        let config = Config::resolve(&cli).unwrap();
        assert_eq!(config.port, 1993);
    }

    #[test]
    fn missing_credentials_is_an_error() {
        let cli = self::cli(&["-s", "imap.example.org"]);
        assert!(Config::resolve(&cli).is_err());
    }

    #[test]
    fn reads_section_matching_the_host() {
        let (_dir, path) = write_config(
            "[imap.example.org]\n\
             user = jane\n\
             password = secret\n\
             domain = CORP\n\
             port = 10143\n\
             ssl = yes\n\
             boxes = Archive, Newsletters\n\
             all-mail = true\n\
             treshold = 6.0\n\
             mode = delete\n\
             destination = Junk\n\
             \n\
             [other.example.org]\n\
             user = nobody\n\
             password = nope\n",
        );

        let cli = self::cli(&["-s", "imap.example.org", "-c", path.to_str().unwrap()]);
        let config = Config::resolve(&cli).unwrap();

        assert_eq!(config.user, "jane");
        assert_eq!(config.password, "secret");
        assert_eq!(config.login(), "CORP\\jane");
        assert_eq!(config.port, 10143);
        assert!(config.ssl);
        assert_eq!(config.boxes, ["Archive", "Newsletters"]);
        assert!(config.all_mail);
        assert_eq!(config.threshold, 6.0);
        assert_eq!(config.mode, Mode::Delete);
        assert_eq!(config.destination, "Junk");
    }

    #[test]
    fn cli_values_win_over_the_file() {
        let (_dir, path) = write_config(
            "[imap.example.org]\n\
             user = jane\n\
             password = secret\n\
             port = 10143\n\
             treshold = 6.0\n\
             destination = Junk\n",
        );

        let cli = self::cli(&[
            "-s",
            "imap.example.org",
            "-c",
            path.to_str().unwrap(),
            "-u",
            "john",
            "-p",
            "20143",
            "-t",
            "2.5",
            "-d",
            "Quarantine",
        ]);
        let config = Config::resolve(&cli).unwrap();

        assert_eq!(config.user, "john");
        assert_eq!(config.password, "secret");
        assert_eq!(config.port, 20143);
        assert_eq!(config.threshold, 2.5);
        assert_eq!(config.destination, "Quarantine");
    }

    #[test]
    fn unknown_host_section_falls_back_to_cli() {
        let (_dir, path) = write_config("[other.example.org]\nuser = nobody\npassword = nope\n");

        let cli = self::cli(&[
            "-s",
            "imap.example.org",
            "-c",
            path.to_str().unwrap(),
            "-u",
            "jane",
            "-w",
            "secret",
        ]);
        let config = Config::resolve(&cli).unwrap();
        assert_eq!(config.user, "jane");
    }

    #[test]
    fn invalid_values_are_reported() {
        let (_dir, path) = write_config(
            "[imap.example.org]\n\
             user = jane\n\
             password = secret\n\
             ssl = maybe\n",
        );
        let cli = self::cli(&["-s", "imap.example.org", "-c", path.to_str().unwrap()]);
        assert!(Config::resolve(&cli).is_err());

        let (_dir, path) = write_config(
            "[imap.example.org]\n\
             user = jane\n\
             password = secret\n\
             treshold = high\n",
        );
        let cli = self::cli(&["-s", "imap.example.org", "-c", path.to_str().unwrap()]);
        assert!(Config::resolve(&cli).is_err());
    }

    #[test]
    fn inbox_is_always_scanned_first_and_once() {
        let cli = self::cli(&[
            "-s",
            "imap.example.org",
            "-u",
            "jane",
            "-w",
            "secret",
            "-b",
            "Archive",
            "-b",
            "inbox",
        ]);
        let config = Config::resolve(&cli).unwrap();
        assert_eq!(config.mailboxes(), ["INBOX", "Archive"]);
    }
}
