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

use std::borrow::Cow;
use std::sync::Arc;

use log::{info, warn};

use super::defs::*;
use crate::account::model::Backend;
use crate::imap::command::{self, CommandId, CommandDef, MailboxTarget};
use crate::imap::proxy::Proxy;
use crate::imap::request::{ParsedCommand, Request};
use crate::imap::session::{Selected, Session, SessionState};
use crate::imap::stats::{CommandTimer, Stats};
use crate::imap::transport::{send_response, SecurityLayer, Transport};
use crate::support::system_config::SystemConfig;

/// Statistics bucket shared by every command name not in the table.
const UNKNOWN_COMMAND: &str = "UNKNOWN";

impl CommandProcessor {
    pub fn new(
        system_config: Arc<SystemConfig>,
        backend: Arc<dyn Backend>,
        proxy: Arc<dyn Proxy>,
        stats: Arc<dyn Stats>,
    ) -> Self {
        CommandProcessor {
            system_config,
            backend,
            proxy,
            stats,
        }
    }

    pub fn system_config(&self) -> &SystemConfig {
        &self.system_config
    }

    /// Write the greeting for a newly opened connection.
    pub fn greet(
        &self,
        session: &Session,
        transport: &mut dyn Transport,
    ) -> std::io::Result<()> {
        let line = untagged(s::Response::Cond(s::CondResponse {
            cond: s::RespCondType::Ok,
            code: Some(s::RespTextCode::Capability(
                self.capabilities(session, transport),
            )),
            quip: Some(Cow::Borrowed(self.system_config.imap.greeting.as_str())),
        }));
        send_response(transport, &line)
    }

    /// The capabilities to advertise in the session's current state.
    pub fn capabilities(
        &self,
        session: &Session,
        transport: &dyn Transport,
    ) -> Vec<String> {
        let mut caps = BASE_CAPABILITIES
            .iter()
            .map(|&c| c.to_owned())
            .collect::<Vec<_>>();

        if SessionState::NotAuthenticated == session.state() {
            if transport.supports_tls() && !session.tls_upgraded() {
                caps.push("STARTTLS".to_owned());
            }

            if self.login_disabled(session, transport) {
                caps.push("LOGINDISABLED".to_owned());
            } else {
                for mech in &self.system_config.imap.auth_mechanisms {
                    caps.push(format!("AUTH={}", mech.to_ascii_uppercase()));
                }
            }
        }

        caps
    }

    /// Whether `LOGIN` and `AUTHENTICATE` must wait for STARTTLS.
    pub(super) fn login_disabled(
        &self,
        session: &Session,
        transport: &dyn Transport,
    ) -> bool {
        self.system_config.imap.require_tls_for_login
            && transport.supports_tls()
            && !session.tls_upgraded()
    }

    /// Run one complete request through the session.
    ///
    /// Everything the request causes to be sent has been written and flushed
    /// by the time this returns.
    pub fn handle_request(
        &self,
        session: &mut Session,
        request: &Request,
        transport: &mut dyn Transport,
    ) -> Outcome {
        let mut timer = CommandTimer::start(&*self.stats);

        if let Some(selected) = session.selected_mut() {
            selected.refresh_access_time();
        }

        if let Some(credentials) = session.credentials() {
            let status = self.backend.account_status(credentials);
            if !status.is_viable() {
                info!(
                    "{} Account is {}, ending session",
                    session.log_prefix(),
                    status
                );
                if session.mark_goodbye_sent() {
                    let line = untagged(s::Response::cond(
                        s::RespCondType::Bye,
                        Some(s::RespTextCode::Alert),
                        "Account is not active",
                    ));
                    let _ = send_response(transport, &line)
                        .and_then(|_| transport.flush());
                }
                return Outcome::AccountUnviable;
            }
        }

        let outcome = if session.has_pending_handshake() {
            timer.attribute("AUTHENTICATE");
            session.set_last_command("AUTHENTICATE");
            let (tag, result) =
                self.continue_authenticate(session, request.frame(), transport);
            self.finish(session, Some(tag.as_str()), result, transport)
        } else {
            match request.parse() {
                Err(malformed) => self.finish(
                    session,
                    malformed.tag.as_deref(),
                    Err(Failure::Parse(malformed.reason)),
                    transport,
                ),

                Ok(cmd) => {
                    session.set_last_command(&cmd.name);
                    session.log_prefix().set_command(&cmd.tag, &cmd.name);

                    let result = match command::lookup(&cmd.name) {
                        None => {
                            timer.attribute(UNKNOWN_COMMAND);
                            Err(Failure::Malformed(Cow::Owned(format!(
                                "Unknown command {}",
                                cmd.name
                            ))))
                        }
                        Some(def) => {
                            timer.attribute(def.name);
                            self.dispatch(session, def, &cmd, transport)
                        }
                    };
                    self.finish(session, Some(cmd.tag.as_str()), result, transport)
                }
            }
        };

        if Outcome::Malformed == outcome
            && session.consecutive_bad()
                >= self.system_config.imap.max_consecutive_bad
        {
            warn!(
                "{} {} consecutive invalid commands, dropping connection",
                session.log_prefix(),
                session.consecutive_bad()
            );
            return Outcome::TooManyInvalid;
        }

        outcome
    }

    fn dispatch(
        &self,
        session: &mut Session,
        def: &'static CommandDef,
        cmd: &ParsedCommand,
        transport: &mut dyn Transport,
    ) -> CmdResult {
        if !def.requirement.admits(session.state()) {
            return Ok(Reply::Tagged(no(
                Some(s::RespTextCode::ClientBug),
                format!(
                    "{} must be in {} state",
                    def.name,
                    def.requirement.named_state()
                ),
            )));
        }

        match def.id {
            CommandId::Capability => self.cmd_capability(session, transport),
            CommandId::Noop => self.cmd_noop(session, "NOOP", transport),
            CommandId::Check => self.cmd_noop(session, "CHECK", transport),
            CommandId::Logout => self.cmd_log_out(session, transport),
            CommandId::StartTls => self.cmd_start_tls(session, transport),
            CommandId::Login => self.cmd_log_in(session, &cmd.args, transport),
            CommandId::Authenticate => {
                self.cmd_authenticate(session, &cmd.tag, &cmd.args, transport)
            }
            CommandId::Select => {
                self.cmd_select(session, &cmd.args, false, transport)
            }
            CommandId::Examine => {
                self.cmd_select(session, &cmd.args, true, transport)
            }
            CommandId::Close => self.cmd_close(session, true),
            CommandId::Unselect => self.cmd_close(session, false),
            CommandId::Delegated => {
                if MailboxTarget::FirstArg == def.target {
                    self.cmd_mailbox_delegated(session, cmd, transport)
                } else {
                    self.cmd_delegated(session, def, cmd, transport)
                }
            }
        }
    }

    /// Write the tagged response for `result`, classify it, and update the
    /// invalid-command counter accordingly.
    fn finish(
        &self,
        session: &mut Session,
        tag: Option<&str>,
        result: CmdResult,
        transport: &mut dyn Transport,
    ) -> Outcome {
        let (response, outcome) = match result {
            Ok(Reply::Tagged(response)) => {
                let outcome = if SessionState::Logout == session.state() {
                    Outcome::SessionEnded
                } else {
                    Outcome::Completed
                };
                (Some(response), outcome)
            }

            Ok(Reply::Sent) => (None, Outcome::Completed),

            Err(Failure::Parse(reason)) => (
                Some(bad(Some(s::RespTextCode::Parse), reason)),
                Outcome::Malformed,
            ),

            Err(Failure::Malformed(reason)) => {
                (Some(bad(None, reason)), Outcome::Malformed)
            }

            Err(Failure::RemoteUnavailable(e)) => {
                warn!("{} Remote mailbox unavailable: {}", session.log_prefix(), e);
                (
                    Some(no(
                        Some(s::RespTextCode::Unavailable),
                        "Shared folder temporarily unavailable",
                    )),
                    Outcome::RemoteUnavailable,
                )
            }

            Err(Failure::Backend(e)) => (
                Some(backend_error_response(session.log_prefix(), e)),
                Outcome::Completed,
            ),

            Err(Failure::Io(e)) => {
                warn!("{} Write failed: {}", session.log_prefix(), e);
                return Outcome::TransportFailed;
            }
        };

        match outcome {
            Outcome::Malformed => session.note_bad(),
            _ => session.reset_bad(),
        }

        if let Some(response) = response {
            let line = s::ResponseLine {
                // A request with no usable tag still gets an answer.
                tag: tag.map(Cow::Borrowed),
                response,
            };
            if let Err(e) = send_response(transport, &line) {
                warn!("{} Write failed: {}", session.log_prefix(), e);
                return Outcome::TransportFailed;
            }
        }

        if let Err(e) = transport.flush() {
            warn!("{} Flush failed: {}", session.log_prefix(), e);
            return Outcome::TransportFailed;
        }

        outcome
    }

    fn cmd_capability(
        &self,
        session: &Session,
        transport: &mut dyn Transport,
    ) -> CmdResult {
        let caps = self.capabilities(session, transport);
        write_untagged(transport, format!("CAPABILITY {}", caps.join(" ")))?;
        Ok(Reply::Tagged(ok("CAPABILITY completed")))
    }

    fn cmd_noop(
        &self,
        session: &mut Session,
        name: &'static str,
        transport: &mut dyn Transport,
    ) -> CmdResult {
        // A remote mailbox can only report its updates if asked.
        if let Some(Selected::Proxied(remote)) = session.selected_mut()
        {
            let reply = remote
                .forward(name, &[])
                .map_err(Failure::RemoteUnavailable)?;
            return Ok(Reply::Tagged(relay(transport, reply)?));
        }

        Ok(Reply::Tagged(ok(format!("{} completed", name))))
    }

    fn cmd_log_out(
        &self,
        session: &mut Session,
        transport: &mut dyn Transport,
    ) -> CmdResult {
        if session.mark_goodbye_sent() {
            send_response(
                transport,
                &untagged(s::Response::cond(
                    s::RespCondType::Bye,
                    None,
                    format!("{} logging out", TAGLINE),
                )),
            )?;
        }

        session.cleanup();
        session.enter_logout();
        Ok(Reply::Tagged(ok("LOGOUT completed")))
    }

    fn cmd_start_tls(
        &self,
        session: &mut Session,
        transport: &mut dyn Transport,
    ) -> CmdResult {
        if session.tls_upgraded() {
            return Ok(Reply::Tagged(no(
                Some(s::RespTextCode::ClientBug),
                "TLS already started",
            )));
        }

        if let Err(e) = transport.start_security_upgrade(SecurityLayer::Tls) {
            warn!("{} STARTTLS refused: {}", session.log_prefix(), e);
            return Ok(Reply::Tagged(no(
                Some(s::RespTextCode::Cannot),
                "TLS not available",
            )));
        }

        session.mark_tls_upgraded();
        Ok(Reply::Tagged(ok("Begin TLS negotiation now")))
    }

    fn cmd_delegated(
        &self,
        session: &mut Session,
        def: &CommandDef,
        cmd: &ParsedCommand,
        transport: &mut dyn Transport,
    ) -> CmdResult {
        let reply = if SessionState::Selected == def.requirement.named_state()
        {
            match session.selected_mut() {
                Some(Selected::Local(mailbox)) => {
                    mailbox.execute(&cmd.name, &cmd.args)?
                }
                Some(Selected::Proxied(remote)) => remote
                    .forward(&cmd.name, &cmd.args)
                    .map_err(Failure::RemoteUnavailable)?,
                None => {
                    return Ok(Reply::Tagged(no(
                        Some(s::RespTextCode::ClientBug),
                        "No mailbox selected",
                    )))
                }
            }
        } else {
            self.backend
                .execute(&credentials(session)?, &cmd.name, &cmd.args)?
        };

        Ok(Reply::Tagged(relay(transport, reply)?))
    }
}
