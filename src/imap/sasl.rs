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

//! SASL mechanisms used by `AUTHENTICATE`.
//!
//! The engine only knows the `Authenticator` contract: it feeds decoded
//! client responses into `step` until the mechanism reports completion or
//! failure. Base64 handling and the `*` abort are the caller's business.

use std::io;
use std::str;

use secstr::SecStr;
use thiserror::Error;

use super::transport::{SecurityLayer, Transport};
use crate::account::model::{Backend, Credentials};
use crate::support::error::Error;

const MECHANISMS: &[&str] = &["PLAIN", "LOGIN"];

/// The result of feeding one client response to an authenticator.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AuthStep {
    /// The exchange continues; send this (undecoded) challenge.
    Challenge(Vec<u8>),
    /// The client has authenticated.
    Complete,
    Failed(AuthFailure),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthFailure {
    #[error("Malformed authentication exchange: {0}")]
    Malformed(&'static str),
    #[error("Bad user id or password")]
    Rejected,
    #[error("Not authorised to act as {0}")]
    AuthzDenied(String),
    #[error("Authentication temporarily unavailable")]
    Unavailable,
}

pub trait Authenticator: Send {
    fn mechanism(&self) -> &'static str;

    /// The challenge to send if the client gave no initial response.
    fn initial_challenge(&self) -> Vec<u8> {
        Vec::new()
    }

    fn step(&mut self, input: &[u8], backend: &dyn Backend) -> AuthStep;

    fn is_complete(&self) -> bool;

    /// Whether the exchange negotiated a security layer which must be
    /// installed on the transport after the success response.
    fn is_encryption_negotiated(&self) -> bool {
        false
    }

    fn security_layer(&self) -> Option<SecurityLayer> {
        if self.is_encryption_negotiated() {
            Some(SecurityLayer::Sasl {
                mechanism: self.mechanism().to_owned(),
            })
        } else {
            None
        }
    }

    /// Hand over the credentials established by a complete exchange.
    fn take_credentials(&mut self) -> Option<Credentials>;

    /// Write the tagged success response for `tag`.
    fn send_success_response(
        &self,
        tag: &str,
        transport: &mut dyn Transport,
    ) -> io::Result<()> {
        transport.write(
            format!("{} OK {} authentication successful\r\n", tag, self.mechanism())
                .as_bytes(),
        )
    }
}

pub fn is_supported_mechanism(mechanism: &str) -> bool {
    MECHANISMS.iter().any(|m| m.eq_ignore_ascii_case(mechanism))
}

/// Create a fresh authenticator for `mechanism`, if it is one we implement.
pub fn new_authenticator(mechanism: &str) -> Option<Box<dyn Authenticator>> {
    if mechanism.eq_ignore_ascii_case("PLAIN") {
        Some(Box::new(PlainAuthenticator::default()))
    } else if mechanism.eq_ignore_ascii_case("LOGIN") {
        Some(Box::new(LoginAuthenticator::default()))
    } else {
        None
    }
}

fn check_password(
    backend: &dyn Backend,
    user: &str,
    password: SecStr,
) -> Result<Credentials, AuthFailure> {
    match backend.authenticate(user, &password) {
        Ok(creds) => Ok(creds),
        Err(Error::AuthenticationFailed) | Err(Error::NxAccount) => {
            Err(AuthFailure::Rejected)
        }
        Err(_) => Err(AuthFailure::Unavailable),
    }
}

/// RFC 4616 `PLAIN`.
#[derive(Default)]
pub struct PlainAuthenticator {
    credentials: Option<Credentials>,
    complete: bool,
}

impl Authenticator for PlainAuthenticator {
    fn mechanism(&self) -> &'static str {
        "PLAIN"
    }

    fn step(&mut self, input: &[u8], backend: &dyn Backend) -> AuthStep {
        if self.complete {
            return AuthStep::Failed(AuthFailure::Malformed(
                "exchange already complete",
            ));
        }

        let mut parts = input.splitn(3, |&b| 0 == b);
        let (authzid, authcid, password) =
            match (parts.next(), parts.next(), parts.next()) {
                (Some(z), Some(c), Some(p)) => (z, c, p),
                _ => {
                    return AuthStep::Failed(AuthFailure::Malformed(
                        "expected authzid NUL authcid NUL password",
                    ))
                }
            };

        let (authzid, authcid) =
            match (str::from_utf8(authzid), str::from_utf8(authcid)) {
                (Ok(z), Ok(c)) if !c.is_empty() => (z, c),
                _ => {
                    return AuthStep::Failed(AuthFailure::Malformed(
                        "invalid identity",
                    ))
                }
            };

        if !authzid.is_empty() && authzid != authcid {
            return AuthStep::Failed(AuthFailure::AuthzDenied(
                authzid.to_owned(),
            ));
        }

        match check_password(backend, authcid, SecStr::from(password.to_vec()))
        {
            Ok(creds) => {
                self.credentials = Some(creds);
                self.complete = true;
                AuthStep::Complete
            }
            Err(failure) => AuthStep::Failed(failure),
        }
    }

    fn is_complete(&self) -> bool {
        self.complete
    }

    fn take_credentials(&mut self) -> Option<Credentials> {
        self.credentials.take()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum LoginState {
    Username,
    Password(String),
    Done,
}

impl Default for LoginState {
    fn default() -> Self {
        LoginState::Username
    }
}

/// The obsolete but ubiquitous `LOGIN` mechanism.
#[derive(Default)]
pub struct LoginAuthenticator {
    state: LoginState,
    credentials: Option<Credentials>,
}

impl Authenticator for LoginAuthenticator {
    fn mechanism(&self) -> &'static str {
        "LOGIN"
    }

    fn initial_challenge(&self) -> Vec<u8> {
        b"Username:".to_vec()
    }

    fn step(&mut self, input: &[u8], backend: &dyn Backend) -> AuthStep {
        match std::mem::replace(&mut self.state, LoginState::Done) {
            LoginState::Username => match str::from_utf8(input) {
                Ok(user) if !user.is_empty() => {
                    self.state = LoginState::Password(user.to_owned());
                    AuthStep::Challenge(b"Password:".to_vec())
                }
                _ => AuthStep::Failed(AuthFailure::Malformed("invalid user id")),
            },

            LoginState::Password(user) => {
                match check_password(backend, &user, SecStr::from(input.to_vec()))
                {
                    Ok(creds) => {
                        self.credentials = Some(creds);
                        AuthStep::Complete
                    }
                    Err(failure) => AuthStep::Failed(failure),
                }
            }

            LoginState::Done => AuthStep::Failed(AuthFailure::Malformed(
                "exchange already complete",
            )),
        }
    }

    fn is_complete(&self) -> bool {
        LoginState::Done == self.state && self.credentials.is_some()
    }

    fn take_credentials(&mut self) -> Option<Credentials> {
        self.credentials.take()
    }
}
