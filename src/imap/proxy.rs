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

//! The interface to other nodes which host mailboxes this node does not.

use std::io;

use log::warn;
use thiserror::Error;

use super::syntax::Argument;
use crate::account::model::{BackendReply, Credentials};
use crate::support::log_prefix::LogPrefix;

#[derive(Error, Debug)]
pub enum ProxyError {
    #[error("Node {0} is unreachable")]
    Unreachable(String),
    #[error("Remote protocol error: {0}")]
    Protocol(String),
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Routes commands to the node owning a mailbox.
///
/// Every failure is reported as a `ProxyError`; the session engine treats
/// all of them the same way and never retries.
pub trait Proxy: Send + Sync {
    /// Select `mailbox` on `node` on behalf of the user.
    fn open(
        &self,
        log_prefix: &LogPrefix,
        credentials: &Credentials,
        node: &str,
        mailbox: &str,
        read_only: bool,
    ) -> Result<(Box<dyn ProxySession>, BackendReply), ProxyError>;

    /// Run a single command that names a mailbox on `node` without selecting
    /// it (e.g. `STATUS`, `APPEND`).
    fn forward(
        &self,
        log_prefix: &LogPrefix,
        credentials: &Credentials,
        node: &str,
        command: &str,
        args: &[Argument],
    ) -> Result<BackendReply, ProxyError>;
}

/// A mailbox selected on a remote node.
pub trait ProxySession: Send {
    fn mailbox(&self) -> &str;

    fn node(&self) -> &str;

    fn read_only(&self) -> bool;

    fn refresh_access_time(&mut self);

    fn forward(
        &mut self,
        command: &str,
        args: &[Argument],
    ) -> Result<BackendReply, ProxyError>;

    /// End the remote selection, expunging if `expunge`.
    fn close(&mut self, expunge: bool) -> Result<(), ProxyError>;
}

/// A proxy for a node that has no route to anywhere.
///
/// Used by the stand-alone server, where any mailbox configured as remote is
/// simply unavailable.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoRouteProxy;

impl Proxy for NoRouteProxy {
    fn open(
        &self,
        log_prefix: &LogPrefix,
        _: &Credentials,
        node: &str,
        mailbox: &str,
        _: bool,
    ) -> Result<(Box<dyn ProxySession>, BackendReply), ProxyError> {
        warn!("{} No route to {} for mailbox {:?}", log_prefix, node, mailbox);
        Err(ProxyError::Unreachable(node.to_owned()))
    }

    fn forward(
        &self,
        log_prefix: &LogPrefix,
        _: &Credentials,
        node: &str,
        command: &str,
        _: &[Argument],
    ) -> Result<BackendReply, ProxyError> {
        warn!("{} No route to {} for {}", log_prefix, node, command);
        Err(ProxyError::Unreachable(node.to_owned()))
    }
}
