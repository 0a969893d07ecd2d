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
use std::io;

use log::{error, info, warn};
use secstr::SecStr;

use super::defs::*;
use crate::account::model::Credentials;
use crate::imap::sasl::{self, Authenticator, AuthStep};
use crate::imap::session::{PendingAuth, Session};
use crate::imap::transport::{send_continuation, Transport};
use crate::support::error::Error;

impl CommandProcessor {
    pub(super) fn cmd_log_in(
        &self,
        session: &mut Session,
        args: &[s::Argument],
        transport: &mut dyn Transport,
    ) -> CmdResult {
        if self.login_disabled(session, transport) {
            return Ok(Reply::Tagged(no(
                Some(s::RespTextCode::PrivacyRequired),
                "LOGIN is disabled until STARTTLS",
            )));
        }

        let (userid, password) = match args {
            [userid, password] => {
                match (userid.as_astring(), password.as_astring()) {
                    (Some(u), Some(p)) => (u, p),
                    _ => {
                        return Err(Failure::Malformed(Cow::Borrowed(
                            "LOGIN arguments must be strings",
                        )))
                    }
                }
            }
            _ => {
                return Err(Failure::Malformed(Cow::Borrowed(
                    "LOGIN takes a user id and a password",
                )))
            }
        };

        let credentials = match self
            .backend
            .authenticate(&userid, &SecStr::from(password.as_bytes().to_vec()))
        {
            Ok(credentials) => credentials,
            Err(Error::AuthenticationFailed) | Err(Error::NxAccount) => {
                // Logins with no password, or with the password typed in the
                // user id field, are not remarkable.
                if !password.is_empty() && password != userid {
                    warn!(
                        "{} Rejected login for user '{}'",
                        session.log_prefix(),
                        userid
                    );
                }

                return Ok(Reply::Tagged(no(
                    Some(s::RespTextCode::AuthenticationFailed),
                    "Bad user id or password",
                )));
            }
            Err(e) => return Err(e.into()),
        };

        if let Err(response) = self.complete_login(session, credentials, transport)
        {
            return Ok(Reply::Tagged(response));
        }

        Ok(Reply::Tagged(s::Response::Cond(s::CondResponse {
            cond: s::RespCondType::Ok,
            code: Some(s::RespTextCode::Capability(
                self.capabilities(session, transport),
            )),
            quip: Some(Cow::Borrowed("User login successful")),
        })))
    }

    pub(super) fn cmd_authenticate(
        &self,
        session: &mut Session,
        tag: &str,
        args: &[s::Argument],
        transport: &mut dyn Transport,
    ) -> CmdResult {
        if self.login_disabled(session, transport) {
            return Ok(Reply::Tagged(no(
                Some(s::RespTextCode::PrivacyRequired),
                "AUTHENTICATE is disabled until STARTTLS",
            )));
        }

        let (mechanism, initial_response) = match args {
            [mechanism] => (mechanism.as_atom(), None),
            [mechanism, ir] => (mechanism.as_atom(), Some(ir)),
            _ => (None, None),
        };
        let mechanism = mechanism.ok_or_else(|| {
            Failure::Malformed(Cow::Borrowed(
                "AUTHENTICATE takes a mechanism and an optional initial response",
            ))
        })?;

        let offered = self
            .system_config
            .imap
            .auth_mechanisms
            .iter()
            .any(|m| m.eq_ignore_ascii_case(mechanism));
        let authenticator = match sasl::new_authenticator(mechanism) {
            Some(authenticator) if offered => authenticator,
            _ => {
                return Ok(Reply::Tagged(no(
                    Some(s::RespTextCode::Cannot),
                    "Unsupported authentication mechanism",
                )))
            }
        };

        let initial_response = match initial_response {
            None => {
                let challenge = base64::encode(&authenticator.initial_challenge());
                send_continuation(transport, &challenge)?;
                session.begin_handshake(PendingAuth {
                    tag: tag.to_owned(),
                    authenticator,
                });
                return Ok(Reply::Sent);
            }
            // RFC 4959 uses a lone `=` for an empty initial response
            Some(s::Argument::Atom(ir)) if "=" == ir.as_str() => Vec::new(),
            Some(ir) => match ir.as_astring().and_then(|ir| base64::decode(&*ir).ok())
            {
                Some(ir) => ir,
                None => {
                    return Err(Failure::Parse(Cow::Borrowed(
                        "Invalid base64 in initial response",
                    )))
                }
            },
        };

        self.auth_step(session, tag, authenticator, &initial_response, transport)
    }

    /// Feed the next client frame into the pending handshake.
    ///
    /// Returns the tag of the `AUTHENTICATE` command along with the result,
    /// since the frame itself is untagged.
    pub(super) fn continue_authenticate(
        &self,
        session: &mut Session,
        frame: &[u8],
        transport: &mut dyn Transport,
    ) -> (String, CmdResult) {
        let PendingAuth { tag, authenticator } =
            match session.take_pending_handshake() {
                Some(pending) => pending,
                None => {
                    return (
                        "*".to_owned(),
                        Err(Failure::Backend(Error::Backend(
                            "no handshake in progress".to_owned(),
                        ))),
                    )
                }
            };

        if b"*" == frame {
            info!(
                "{} AUTHENTICATE {} aborted by client",
                session.log_prefix(),
                authenticator.mechanism()
            );
            return (
                tag,
                Ok(Reply::Tagged(bad(None, "AUTHENTICATE aborted"))),
            );
        }

        let input = match base64::decode(frame) {
            Ok(input) => input,
            Err(_) => {
                return (
                    tag,
                    Err(Failure::Parse(Cow::Borrowed(
                        "Invalid base64 in authentication exchange",
                    ))),
                )
            }
        };

        let result =
            self.auth_step(session, &tag, authenticator, &input, transport);
        (tag, result)
    }

    fn auth_step(
        &self,
        session: &mut Session,
        tag: &str,
        mut authenticator: Box<dyn Authenticator>,
        input: &[u8],
        transport: &mut dyn Transport,
    ) -> CmdResult {
        match authenticator.step(input, &*self.backend) {
            AuthStep::Challenge(challenge) => {
                send_continuation(transport, &base64::encode(&challenge))?;
                session.begin_handshake(PendingAuth {
                    tag: tag.to_owned(),
                    authenticator,
                });
                Ok(Reply::Sent)
            }

            AuthStep::Failed(failure) => {
                warn!(
                    "{} AUTHENTICATE {} failed: {}",
                    session.log_prefix(),
                    authenticator.mechanism(),
                    failure
                );
                Ok(Reply::Tagged(no(
                    Some(s::RespTextCode::AuthenticationFailed),
                    failure.to_string(),
                )))
            }

            AuthStep::Complete => {
                let complete = authenticator.is_complete();
                let credentials = match authenticator.take_credentials() {
                    Some(credentials) if complete => credentials,
                    _ => {
                        return Err(Failure::Backend(Error::Backend(format!(
                            "{} completed without credentials",
                            authenticator.mechanism()
                        ))))
                    }
                };

                if let Err(response) =
                    self.complete_login(session, credentials, transport)
                {
                    return Ok(Reply::Tagged(response));
                }

                if let Some(layer) = authenticator.security_layer() {
                    if let Err(e) = transport.start_security_upgrade(layer) {
                        error!(
                            "{} Failed to install {} security layer: {}",
                            session.log_prefix(),
                            authenticator.mechanism(),
                            e
                        );
                        return Err(Failure::Io(io::Error::new(
                            io::ErrorKind::Other,
                            e.to_string(),
                        )));
                    }
                }

                authenticator.send_success_response(tag, transport)?;
                Ok(Reply::Sent)
            }
        }
    }

    /// Move the session into the authenticated state.
    ///
    /// Fails with the response to send if the account may not log in.
    fn complete_login(
        &self,
        session: &mut Session,
        credentials: Credentials,
        transport: &mut dyn Transport,
    ) -> Result<(), s::Response<'static>> {
        let status = self.backend.account_status(&credentials);
        if !status.is_viable() {
            warn!(
                "{} Refusing login for {} account '{}'",
                session.log_prefix(),
                status,
                credentials.user()
            );
            return Err(no(
                Some(s::RespTextCode::ContactAdmin),
                "Account is not active",
            ));
        }

        session.log_in(credentials);
        info!("{} Login successful", session.log_prefix());
        transport.set_idle_timeout(self.system_config.imap.authenticated_idle());
        Ok(())
    }
}
