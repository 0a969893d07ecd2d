//-
// Copyright (c) 2026, the Postern developers
//
// This file is part of Postern.
//
// Postern is free software: you can  redistribute it and/or modify it under the
// terms of  the GNU General Public  License as published by  the Free Software
// Foundation, either version  3 of the License, or (at  your option) any later
// version.
//
// Postern is distributed  in the hope that  it will be useful,  but WITHOUT ANY
// WARRANTY; without  even the implied  warranty of MERCHANTABILITY  or FITNESS
// FOR  A PARTICULAR  PURPOSE.  See the  GNU General  Public  License for  more
// details.
//
// You should have received a copy of the GNU General Public License along with
// Postern. If not, see <http://www.gnu.org/licenses/>.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::error::Error;

/// The contents of `postern.toml`.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct SystemConfig {
    /// Protocol-level tunables for the IMAP engine.
    pub imap: ImapConfig,

    /// Configuration for STARTTLS. If absent, STARTTLS is refused.
    #[serde(default)]
    pub tls: Option<TlsConfig>,

    /// Where the reference server listens.
    #[serde(default)]
    pub listen: ListenConfig,

    /// Accounts served by the in-memory backend.
    #[serde(default)]
    pub accounts: Vec<AccountConfig>,

    /// Mailboxes which live on other nodes and must be proxied.
    #[serde(default)]
    pub remote_mailboxes: Vec<RemoteMailboxConfig>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ImapConfig {
    /// The number of consecutive malformed commands after which the
    /// connection is dropped.
    ///
    /// There is deliberately no default; every deployment must choose one.
    pub max_consecutive_bad: u32,

    /// Idle timeout, in seconds, before the client has authenticated.
    pub unauthenticated_idle_secs: u64,

    /// Idle timeout, in seconds, once the client has authenticated.
    ///
    /// RFC 3501 requires this to be at least 30 minutes, but that is left to
    /// the administrator.
    pub authenticated_idle_secs: u64,

    /// The longest single line the decoder accepts.
    #[serde(default = "default_max_command_line")]
    pub max_command_line: usize,

    /// The largest literal the decoder accepts.
    #[serde(default = "default_max_literal")]
    pub max_literal: u32,

    /// SASL mechanisms offered through `AUTHENTICATE`, in advertisement
    /// order.
    #[serde(default = "default_auth_mechanisms")]
    pub auth_mechanisms: Vec<String>,

    /// If true and TLS is available, `LOGIN` and `AUTHENTICATE` are refused
    /// until STARTTLS has completed.
    #[serde(default)]
    pub require_tls_for_login: bool,

    /// Free text appended to the greeting.
    #[serde(default = "default_greeting")]
    pub greeting: String,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct TlsConfig {
    /// The path to the TLS private key, which must be in PEM format.
    pub private_key: PathBuf,
    /// The path to the TLS certificate chain, which must be in PEM format.
    pub certificate_chain: PathBuf,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenConfig {
    pub address: String,
}

impl Default for ListenConfig {
    fn default() -> Self {
        ListenConfig {
            address: "127.0.0.1:1143".to_owned(),
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct AccountConfig {
    pub name: String,
    pub password: String,
    /// One of `active`, `locked`, `maintenance`, `closed`.
    #[serde(default = "default_account_status")]
    pub status: String,
    #[serde(default = "default_mailboxes")]
    pub mailboxes: Vec<String>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct RemoteMailboxConfig {
    /// The owning account.
    pub account: String,
    /// The mailbox name as the client sees it.
    pub mailbox: String,
    /// The node that actually hosts the mailbox.
    pub node: String,
}

impl ImapConfig {
    pub fn unauthenticated_idle(&self) -> Duration {
        Duration::from_secs(self.unauthenticated_idle_secs)
    }

    pub fn authenticated_idle(&self) -> Duration {
        Duration::from_secs(self.authenticated_idle_secs)
    }
}

impl SystemConfig {
    /// Load and validate the configuration file at `path`.
    pub fn load(path: &Path) -> Result<Self, Error> {
        let text = fs::read_to_string(path)?;
        let config: SystemConfig = toml::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), Error> {
        if 0 == self.imap.max_consecutive_bad {
            return Err(Error::Config(
                "imap.max_consecutive_bad must be at least 1".to_owned(),
            ));
        }

        if 0 == self.imap.unauthenticated_idle_secs
            || 0 == self.imap.authenticated_idle_secs
        {
            return Err(Error::Config(
                "imap idle timeouts must be non-zero".to_owned(),
            ));
        }

        for mechanism in &self.imap.auth_mechanisms {
            if !crate::imap::sasl::is_supported_mechanism(mechanism) {
                return Err(Error::Config(format!(
                    "unsupported SASL mechanism '{}'",
                    mechanism
                )));
            }
        }

        for account in &self.accounts {
            if crate::account::model::AccountStatus::parse(&account.status)
                .is_none()
            {
                return Err(Error::Config(format!(
                    "account '{}' has unknown status '{}'",
                    account.name, account.status
                )));
            }
        }

        Ok(())
    }
}

fn default_max_command_line() -> usize {
    65536
}

fn default_max_literal() -> u32 {
    64 * 1024 * 1024
}

fn default_auth_mechanisms() -> Vec<String> {
    vec!["PLAIN".to_owned(), "LOGIN".to_owned()]
}

fn default_greeting() -> String {
    concat!(env!("CARGO_PKG_NAME"), " ", env!("CARGO_PKG_VERSION"), " ready")
        .to_owned()
}

fn default_account_status() -> String {
    "active".to_owned()
}

fn default_mailboxes() -> Vec<String> {
    vec!["INBOX".to_owned()]
}
