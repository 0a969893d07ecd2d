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

use log::info;

use super::defs::*;
use crate::account::model::{MailboxLocation, ReplyStatus};
use crate::imap::request::ParsedCommand;
use crate::imap::session::{Selected, Session};
use crate::imap::transport::Transport;

impl CommandProcessor {
    pub(super) fn cmd_select(
        &self,
        session: &mut Session,
        args: &[s::Argument],
        read_only: bool,
        transport: &mut dyn Transport,
    ) -> CmdResult {
        let mailbox = mailbox_arg(args)?;
        let credentials = credentials(session)?;

        // Any SELECT or EXAMINE deselects the current mailbox, even if the
        // new selection fails.
        if let Some(previous) = session.deselect() {
            previous.release(session.log_prefix(), false);
        }

        let (selected, reply) =
            match self.backend.locate_mailbox(&credentials, &mailbox)? {
                MailboxLocation::Nonexistent => {
                    return Ok(Reply::Tagged(no(
                        Some(s::RespTextCode::Nonexistent),
                        "No such mailbox",
                    )))
                }

                MailboxLocation::Local => {
                    let (handle, reply) =
                        self.backend.select(&credentials, &mailbox, read_only)?;
                    (Selected::Local(handle), reply)
                }

                MailboxLocation::Remote { node } => {
                    info!(
                        "{} Proxying {:?} to {}",
                        session.log_prefix(),
                        mailbox,
                        node
                    );
                    let (remote, reply) = self
                        .proxy
                        .open(
                            session.log_prefix(),
                            &credentials,
                            &node,
                            &mailbox,
                            read_only,
                        )
                        .map_err(Failure::RemoteUnavailable)?;
                    (Selected::Proxied(remote), reply)
                }
            };

        let succeeded = ReplyStatus::Ok == reply.status;
        let response = relay(transport, reply)?;
        if succeeded {
            session.select(selected);
        } else {
            selected.release(session.log_prefix(), false);
        }

        Ok(Reply::Tagged(response))
    }

    /// `CLOSE` (with `expunge`) or `UNSELECT` (without).
    pub(super) fn cmd_close(
        &self,
        session: &mut Session,
        expunge: bool,
    ) -> CmdResult {
        match session.deselect() {
            Some(Selected::Local(mut mailbox)) => {
                let expunge = expunge && !mailbox.read_only();
                mailbox.deselect(expunge)?;
            }
            Some(Selected::Proxied(mut remote)) => {
                let expunge = expunge && !remote.read_only();
                remote
                    .close(expunge)
                    .map_err(Failure::RemoteUnavailable)?;
            }
            None => (),
        }

        Ok(Reply::Tagged(ok(if expunge {
            "CLOSE completed"
        } else {
            "UNSELECT completed"
        })))
    }

    /// A delegated command naming a mailbox which may live on another node.
    pub(super) fn cmd_mailbox_delegated(
        &self,
        session: &mut Session,
        cmd: &ParsedCommand,
        transport: &mut dyn Transport,
    ) -> CmdResult {
        let mailbox = mailbox_arg(&cmd.args)?;
        let credentials = credentials(session)?;

        let reply = match self.backend.locate_mailbox(&credentials, &mailbox)? {
            MailboxLocation::Remote { node } => self
                .proxy
                .forward(
                    session.log_prefix(),
                    &credentials,
                    &node,
                    &cmd.name,
                    &cmd.args,
                )
                .map_err(Failure::RemoteUnavailable)?,
            // Nonexistent mailboxes are still the backend's to report, since
            // APPEND and STATUS have specific responses for them.
            MailboxLocation::Local | MailboxLocation::Nonexistent => {
                self.backend.execute(&credentials, &cmd.name, &cmd.args)?
            }
        };

        Ok(Reply::Tagged(relay(transport, reply)?))
    }
}
