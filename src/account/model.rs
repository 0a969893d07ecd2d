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

use std::fmt;

use secstr::SecStr;

use crate::imap::syntax::Argument;
use crate::support::error::Error;

/// Administrative status of an account.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AccountStatus {
    Active,
    Locked,
    Maintenance,
    Closed,
}

impl AccountStatus {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(AccountStatus::Active),
            "locked" => Some(AccountStatus::Locked),
            "maintenance" => Some(AccountStatus::Maintenance),
            "closed" => Some(AccountStatus::Closed),
            _ => None,
        }
    }

    /// Whether a session for this account may continue to run commands.
    pub fn is_viable(self) -> bool {
        AccountStatus::Active == self
    }
}

impl fmt::Display for AccountStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match *self {
            AccountStatus::Active => "active",
            AccountStatus::Locked => "locked",
            AccountStatus::Maintenance => "maintenance",
            AccountStatus::Closed => "closed",
        })
    }
}

/// Proof that a user authenticated. Only the backend creates these.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Credentials {
    user: String,
}

impl Credentials {
    pub(crate) fn new(user: String) -> Self {
        Credentials { user }
    }

    pub fn user(&self) -> &str {
        &self.user
    }
}

/// Where a mailbox lives.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MailboxLocation {
    Local,
    /// The mailbox is hosted by `node` and must be proxied.
    Remote { node: String },
    Nonexistent,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReplyStatus {
    Ok,
    No,
}

/// The result of a command carried out by the backend (or a remote node).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BackendReply {
    /// Untagged response data, without the leading `* `.
    pub untagged: Vec<String>,
    pub status: ReplyStatus,
    /// A response code to attach to the tagged response, without brackets.
    pub code: Option<String>,
    pub text: String,
}

impl BackendReply {
    pub fn ok(text: impl Into<String>) -> Self {
        BackendReply {
            untagged: Vec::new(),
            status: ReplyStatus::Ok,
            code: None,
            text: text.into(),
        }
    }

    pub fn no(text: impl Into<String>) -> Self {
        BackendReply {
            untagged: Vec::new(),
            status: ReplyStatus::No,
            code: None,
            text: text.into(),
        }
    }

    pub fn with_untagged(mut self, data: impl Into<String>) -> Self {
        self.untagged.push(data.into());
        self
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }
}

/// The mailbox store and account directory.
///
/// A single backend is shared by every connection, so implementations must
/// be safe for concurrent use.
pub trait Backend: Send + Sync {
    /// Check a user name and password.
    ///
    /// Fails with `Error::AuthenticationFailed` if they do not match.
    fn authenticate(
        &self,
        user: &str,
        password: &SecStr,
    ) -> Result<Credentials, Error>;

    /// Current administrative status of the account.
    fn account_status(&self, credentials: &Credentials) -> AccountStatus;

    fn locate_mailbox(
        &self,
        credentials: &Credentials,
        mailbox: &str,
    ) -> Result<MailboxLocation, Error>;

    /// Open a local mailbox for the Selected state.
    fn select(
        &self,
        credentials: &Credentials,
        mailbox: &str,
        read_only: bool,
    ) -> Result<(Box<dyn MailboxSession>, BackendReply), Error>;

    /// Execute a command that needs an account but no selected mailbox
    /// (`LIST`, `CREATE`, `STATUS`, ...). `command` is upper-case.
    fn execute(
        &self,
        credentials: &Credentials,
        command: &str,
        args: &[Argument],
    ) -> Result<BackendReply, Error>;
}

/// A handle on a selected local mailbox.
///
/// The backend owns the mailbox itself; dropping the handle does not destroy
/// anything, it merely forgets the relation.
pub trait MailboxSession: Send {
    fn name(&self) -> &str;

    fn read_only(&self) -> bool;

    /// Note client activity against the mailbox.
    fn refresh_access_time(&mut self);

    /// Execute a command that requires this mailbox to be selected
    /// (`FETCH`, `STORE`, `SEARCH`, ...).
    fn execute(
        &mut self,
        command: &str,
        args: &[Argument],
    ) -> Result<BackendReply, Error>;

    /// Release the selection, expunging deleted messages if `expunge`.
    fn deselect(&mut self, expunge: bool) -> Result<(), Error>;
}
