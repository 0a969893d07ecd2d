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

//! Per-connection protocol state.
//!
//! All the invariants relating the fields of `Session` to each other are
//! maintained here; the command processor and the server only go through
//! these methods.

use std::fmt;

use log::warn;

use super::proxy::ProxySession;
use super::sasl::Authenticator;
use crate::account::model::{Credentials, MailboxSession};
use crate::support::log_prefix::LogPrefix;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum SessionState {
    NotAuthenticated,
    Authenticated,
    Selected,
    Logout,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match *self {
            SessionState::NotAuthenticated => "NOT AUTHENTICATED",
            SessionState::Authenticated => "AUTHENTICATED",
            SessionState::Selected => "SELECTED",
            SessionState::Logout => "LOGOUT",
        })
    }
}

/// The currently selected mailbox, either here or on another node.
pub enum Selected {
    Local(Box<dyn MailboxSession>),
    Proxied(Box<dyn ProxySession>),
}

impl Selected {
    pub fn name(&self) -> &str {
        match *self {
            Selected::Local(ref mb) => mb.name(),
            Selected::Proxied(ref p) => p.mailbox(),
        }
    }

    pub fn read_only(&self) -> bool {
        match *self {
            Selected::Local(ref mb) => mb.read_only(),
            Selected::Proxied(ref p) => p.read_only(),
        }
    }

    pub fn refresh_access_time(&mut self) {
        match *self {
            Selected::Local(ref mut mb) => mb.refresh_access_time(),
            Selected::Proxied(ref mut p) => p.refresh_access_time(),
        }
    }

    /// Release the selection, logging but otherwise ignoring any failure.
    pub fn release(mut self, log_prefix: &LogPrefix, expunge: bool) {
        let name = self.name().to_owned();
        let result = match self {
            Selected::Local(ref mut mb) => {
                mb.deselect(expunge).map_err(|e| e.to_string())
            }
            Selected::Proxied(ref mut p) => {
                p.close(expunge).map_err(|e| e.to_string())
            }
        };

        if let Err(e) = result {
            warn!("{} Error deselecting {:?}: {}", log_prefix, name, e);
        }
    }
}

/// An `AUTHENTICATE` exchange in progress.
pub struct PendingAuth {
    pub tag: String,
    pub authenticator: Box<dyn Authenticator>,
}

pub struct Session {
    log_prefix: LogPrefix,
    state: SessionState,
    credentials: Option<Credentials>,
    selected: Option<Selected>,
    pending_auth: Option<PendingAuth>,
    consecutive_bad: u32,
    tls_upgraded: bool,
    goodbye_sent: bool,
    last_command: Option<String>,
}

impl Session {
    pub fn new(log_prefix: LogPrefix) -> Self {
        Session {
            log_prefix,
            state: SessionState::NotAuthenticated,
            credentials: None,
            selected: None,
            pending_auth: None,
            consecutive_bad: 0,
            tls_upgraded: false,
            goodbye_sent: false,
            last_command: None,
        }
    }

    pub fn log_prefix(&self) -> &LogPrefix {
        &self.log_prefix
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn credentials(&self) -> Option<&Credentials> {
        self.credentials.as_ref()
    }

    pub fn selected(&self) -> Option<&Selected> {
        self.selected.as_ref()
    }

    pub fn selected_mut(&mut self) -> Option<&mut Selected> {
        self.selected.as_mut()
    }

    /// Move from `NotAuthenticated` to `Authenticated`.
    pub fn log_in(&mut self, credentials: Credentials) {
        debug_assert_eq!(SessionState::NotAuthenticated, self.state);
        self.log_prefix.set_user(credentials.user().to_owned());
        self.credentials = Some(credentials);
        self.pending_auth = None;
        self.state = SessionState::Authenticated;
    }

    /// Enter the `Selected` state. The caller must have released any
    /// previous selection first.
    pub fn select(&mut self, selected: Selected) {
        debug_assert!(self.selected.is_none());
        debug_assert!(self.credentials.is_some());
        self.selected = Some(selected);
        self.state = SessionState::Selected;
    }

    /// Leave the `Selected` state, handing back the selection so the caller
    /// can decide how to release it.
    pub fn deselect(&mut self) -> Option<Selected> {
        let selected = self.selected.take();
        if SessionState::Selected == self.state {
            self.state = SessionState::Authenticated;
        }
        selected
    }

    pub fn begin_handshake(&mut self, pending: PendingAuth) {
        debug_assert_eq!(SessionState::NotAuthenticated, self.state);
        self.pending_auth = Some(pending);
    }

    pub fn has_pending_handshake(&self) -> bool {
        self.pending_auth.is_some()
    }

    /// Remove the in-progress handshake. The caller puts it back with
    /// `begin_handshake` if the exchange continues.
    pub fn take_pending_handshake(&mut self) -> Option<PendingAuth> {
        self.pending_auth.take()
    }

    pub fn tls_upgraded(&self) -> bool {
        self.tls_upgraded
    }

    /// Latch the TLS flag. Returns false (and changes nothing) if it was
    /// already set or the session is past `NotAuthenticated`.
    pub fn mark_tls_upgraded(&mut self) -> bool {
        if self.tls_upgraded || SessionState::NotAuthenticated != self.state {
            return false;
        }
        self.tls_upgraded = true;
        true
    }

    pub fn goodbye_sent(&self) -> bool {
        self.goodbye_sent
    }

    /// Latch the goodbye flag, returning whether the caller is the one
    /// entitled to send it.
    pub fn mark_goodbye_sent(&mut self) -> bool {
        !std::mem::replace(&mut self.goodbye_sent, true)
    }

    pub fn consecutive_bad(&self) -> u32 {
        self.consecutive_bad
    }

    pub fn note_bad(&mut self) {
        self.consecutive_bad = self.consecutive_bad.saturating_add(1);
    }

    pub fn reset_bad(&mut self) {
        self.consecutive_bad = 0;
    }

    pub fn last_command(&self) -> Option<&str> {
        self.last_command.as_deref()
    }

    pub fn set_last_command(&mut self, command: &str) {
        self.last_command = Some(command.to_owned());
    }

    pub fn enter_logout(&mut self) {
        self.state = SessionState::Logout;
    }

    /// Release everything the session holds on to. Safe to call repeatedly.
    pub fn cleanup(&mut self) {
        self.pending_auth = None;
        if let Some(selected) = self.deselect() {
            selected.release(&self.log_prefix, false);
        }
    }
}
