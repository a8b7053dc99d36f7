use std::{
    io::{Read, Write},
    net::TcpStream,
};

use log::{debug, trace};
use native_tls::{TlsConnector, TlsStream};
use thiserror::Error;

use crate::config::{Config, Mode};

/// Errors raised by the mail backend.
///
/// `Tls`, `Connect` and `Auth` happen before any triage and abort the
/// run. The other variants are scoped to one mailbox or one message;
/// the triage loop reports them and moves on.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("cannot init TLS context: {0}")]
    Tls(#[from] native_tls::Error),
    #[error("cannot connect to {host}:{port}: {source}")]
    Connect {
        source: imap::Error,
        host: String,
        port: u16,
    },
    #[error("cannot login to {host} as {login}: {source}")]
    Auth {
        source: imap::Error,
        host: String,
        login: String,
    },
    #[error("cannot select mailbox `{mailbox}`: {source}")]
    Mailbox {
        source: imap::Error,
        mailbox: String,
    },
    #[error("cannot search mailbox `{mailbox}`: {source}")]
    Search {
        source: imap::Error,
        mailbox: String,
    },
    #[error("cannot fetch message {uid} from `{mailbox}`: {source}")]
    Fetch {
        source: imap::Error,
        uid: u32,
        mailbox: String,
    },
    #[error("message {0} is gone from `{1}`")]
    MessageGone(u32, String),
    #[error("cannot move message {uid} to `{destination}`: {source}")]
    Move {
        source: imap::Error,
        uid: u32,
        destination: String,
    },
    #[error("cannot delete message {uid} from `{mailbox}`: {source}")]
    Delete {
        source: imap::Error,
        uid: u32,
        mailbox: String,
    },
}

/// The mailbox operations the triage loop depends on.
pub trait Backend {
    /// Takes a snapshot of the candidate message UIDs in the given
    /// mailbox, in listing order: unread messages only, unless
    /// `all_mail` is set. The snapshot is not updated as the run
    /// mutates the mailbox.
    fn list_candidates(&mut self, mailbox: &str, all_mail: bool)
        -> Result<Vec<u32>, BackendError>;

    /// Fetches the raw content of one message without touching its
    /// flags.
    fn fetch(&mut self, mailbox: &str, uid: u32) -> Result<Vec<u8>, BackendError>;

    /// Applies the spam action to one message: relocation to the
    /// destination mailbox, or permanent removal.
    fn apply_action(
        &mut self,
        mailbox: &str,
        uid: u32,
        mode: Mode,
        destination: &str,
    ) -> Result<(), BackendError>;
}

/// A live IMAP session, plaintext or TLS-wrapped.
///
/// Call [`ImapBackend::logout`] once the session is not needed
/// anymore, on every exit path.
pub struct ImapBackend<S: Read + Write> {
    sess: imap::Session<S>,
    selected: Option<String>,
}

impl ImapBackend<TlsStream<TcpStream>> {
    /// Connects over TLS and logs in.
    pub fn connect_tls(config: &Config) -> Result<Self, BackendError> {
        debug!("create TLS connector");
        let tls = TlsConnector::builder().build()?;

        debug!("connect to {}:{}", config.host, config.port);
        let client = imap::connect(
            (config.host.as_str(), config.port),
            config.host.as_str(),
            &tls,
        )
        .map_err(|source| BackendError::Connect {
            source,
            host: config.host.clone(),
            port: config.port,
        })?;

        Self::login(client, config)
    }
}

impl ImapBackend<TcpStream> {
    /// Connects in plaintext and logs in.
    pub fn connect_plain(config: &Config) -> Result<Self, BackendError> {
        debug!("connect to {}:{}", config.host, config.port);
        let client = TcpStream::connect((config.host.as_str(), config.port))
            .map_err(imap::Error::Io)
            .and_then(|stream| {
                let mut client = imap::Client::new(stream);
                client.read_greeting()?;
                Ok(client)
            })
            .map_err(|source| BackendError::Connect {
                source,
                host: config.host.clone(),
                port: config.port,
            })?;

        Self::login(client, config)
    }
}

impl<S: Read + Write> ImapBackend<S> {
    fn login(client: imap::Client<S>, config: &Config) -> Result<Self, BackendError> {
        let login = config.login();
        debug!("login as {}", login);
        let sess = client
            .login(&login, &config.password)
            .map_err(|(source, _)| BackendError::Auth {
                source,
                host: config.host.clone(),
                login,
            })?;

        Ok(Self {
            sess,
            selected: None,
        })
    }

    /// Closes the session. Errors are only logged: there is nothing
    /// left to salvage at this point.
    pub fn logout(&mut self) {
        debug!("logout");
        if let Err(err) = self.sess.logout() {
            debug!("logout failed: {}", err);
        }
    }

    fn select(&mut self, mailbox: &str) -> Result<(), BackendError> {
        if self.selected.as_deref() == Some(mailbox) {
            return Ok(());
        }

        self.sess
            .select(mailbox)
            .map_err(|source| BackendError::Mailbox {
                source,
                mailbox: mailbox.to_owned(),
            })?;
        self.selected = Some(mailbox.to_owned());

        Ok(())
    }
}

impl<S: Read + Write> Backend for ImapBackend<S> {
    fn list_candidates(
        &mut self,
        mailbox: &str,
        all_mail: bool,
    ) -> Result<Vec<u32>, BackendError> {
        self.select(mailbox)?;

        let query = if all_mail { "ALL" } else { "UNSEEN" };
        let mut uids: Vec<u32> = self
            .sess
            .uid_search(query)
            .map_err(|source| BackendError::Search {
                source,
                mailbox: mailbox.to_owned(),
            })?
            .into_iter()
            .collect();
        uids.sort_unstable();

        debug!("found {} candidate messages in {}", uids.len(), mailbox);
        trace!("uids: {:?}", uids);

        Ok(uids)
    }

    fn fetch(&mut self, mailbox: &str, uid: u32) -> Result<Vec<u8>, BackendError> {
        self.select(mailbox)?;

        // BODY.PEEK keeps the Seen flag untouched, so a skipped unread
        // message stays unread for the next run.
        let fetches = self
            .sess
            .uid_fetch(uid.to_string(), "(BODY.PEEK[])")
            .map_err(|source| BackendError::Fetch {
                source,
                uid,
                mailbox: mailbox.to_owned(),
            })?;

        match fetches.first().and_then(|fetch| fetch.body()) {
            Some(body) => Ok(body.to_vec()),
            None => Err(BackendError::MessageGone(uid, mailbox.to_owned())),
        }
    }

    fn apply_action(
        &mut self,
        mailbox: &str,
        uid: u32,
        mode: Mode,
        destination: &str,
    ) -> Result<(), BackendError> {
        self.select(mailbox)?;
        let uid_set = uid.to_string();

        if let Mode::Move = mode {
            // COPY does not create the destination mailbox; a missing
            // one surfaces here and the message stays where it is.
            self.sess
                .uid_copy(&uid_set, destination)
                .map_err(|source| BackendError::Move {
                    source,
                    uid,
                    destination: destination.to_owned(),
                })?;
        }

        self.sess
            .uid_store(&uid_set, "+FLAGS (\\Deleted)")
            .map_err(|source| BackendError::Delete {
                source,
                uid,
                mailbox: mailbox.to_owned(),
            })?;
        self.sess
            .expunge()
            .map_err(|source| BackendError::Delete {
                source,
                uid,
                mailbox: mailbox.to_owned(),
            })?;

        Ok(())
    }
}
