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
use std::sync::Arc;

use log::{error, warn};

use crate::account::model::{Backend, BackendReply, Credentials, ReplyStatus};
use crate::imap::proxy::{Proxy, ProxyError};
use crate::imap::session::Session;
use crate::imap::stats::Stats;
use crate::imap::transport::{send_response, Transport};
use crate::support::{
    error::Error, log_prefix::LogPrefix, system_config::SystemConfig,
};

pub(super) use crate::imap::syntax as s;

pub(super) static BASE_CAPABILITIES: &[&str] =
    &["IMAP4rev1", "LITERAL+", "SASL-IR", "UNSELECT"];

pub(super) static TAGLINE: &str =
    concat!(env!("CARGO_PKG_NAME"), " ", env!("CARGO_PKG_VERSION"));

/// Turns complete requests into responses, on behalf of any number of
/// sessions.
///
/// The processor itself holds nothing but shared collaborators; everything
/// specific to a connection lives in its `Session`.
pub struct CommandProcessor {
    pub(super) system_config: Arc<SystemConfig>,
    pub(super) backend: Arc<dyn Backend>,
    pub(super) proxy: Arc<dyn Proxy>,
    pub(super) stats: Arc<dyn Stats>,
}

/// How one dispatch cycle ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// The command ran, whether its answer was `OK` or `NO`.
    Completed,
    /// The request could not be understood. Answered with `BAD`.
    Malformed,
    /// Too many malformed requests in a row.
    TooManyInvalid,
    /// A mailbox on another node could not be reached.
    RemoteUnavailable,
    /// The account has been disabled or closed under the session.
    AccountUnviable,
    /// The command ended the session (i.e. `LOGOUT`).
    SessionEnded,
    /// Writing to the client failed.
    TransportFailed,
}

/// What the connection should do after a dispatch cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Disposition {
    Continue,
    Stop,
}

impl Outcome {
    pub fn disposition(self) -> Disposition {
        match self {
            Outcome::Completed | Outcome::Malformed => Disposition::Continue,
            _ => Disposition::Stop,
        }
    }
}

/// The successful result of a command.
pub(super) enum Reply {
    /// Send this as the tagged response.
    Tagged(s::Response<'static>),
    /// The command has already written everything it needs to, or is
    /// waiting on the client.
    Sent,
}

/// Conditions which the dispatcher classifies rather than merely relaying.
#[derive(Debug)]
pub(super) enum Failure {
    /// The request did not lex or parse.
    Parse(Cow<'static, str>),
    /// The request parsed, but is not a valid command.
    Malformed(Cow<'static, str>),
    RemoteUnavailable(ProxyError),
    Backend(Error),
    Io(io::Error),
}

impl From<Error> for Failure {
    fn from(e: Error) -> Self {
        match e {
            // Argument errors found by the backend are malformed requests.
            Error::BadArguments(reason) => Failure::Malformed(Cow::Owned(reason)),
            e => Failure::Backend(e),
        }
    }
}

impl From<io::Error> for Failure {
    fn from(e: io::Error) -> Self {
        Failure::Io(e)
    }
}

pub(super) type CmdResult = Result<Reply, Failure>;

pub(super) fn ok(quip: impl Into<Cow<'static, str>>) -> s::Response<'static> {
    s::Response::cond(s::RespCondType::Ok, None, quip)
}

pub(super) fn no(
    code: Option<s::RespTextCode>,
    quip: impl Into<Cow<'static, str>>,
) -> s::Response<'static> {
    s::Response::cond(s::RespCondType::No, code, quip)
}

pub(super) fn bad(
    code: Option<s::RespTextCode>,
    quip: impl Into<Cow<'static, str>>,
) -> s::Response<'static> {
    s::Response::cond(s::RespCondType::Bad, code, quip)
}

pub(super) fn untagged(response: s::Response<'_>) -> s::ResponseLine<'_> {
    s::ResponseLine {
        tag: None,
        response,
    }
}

pub(super) fn write_untagged(
    transport: &mut dyn Transport,
    data: impl Into<Cow<'static, str>>,
) -> io::Result<()> {
    send_response(transport, &untagged(s::Response::Data(data.into())))
}

/// Write the untagged part of `reply` and convert the rest into the tagged
/// response.
pub(super) fn relay(
    transport: &mut dyn Transport,
    reply: BackendReply,
) -> Result<s::Response<'static>, Failure> {
    for data in reply.untagged {
        write_untagged(transport, data)?;
    }

    Ok(s::Response::cond(
        match reply.status {
            ReplyStatus::Ok => s::RespCondType::Ok,
            ReplyStatus::No => s::RespCondType::No,
        },
        reply.code.map(s::RespTextCode::Other),
        reply.text,
    ))
}

pub(super) fn credentials(session: &Session) -> Result<Credentials, Failure> {
    session.credentials().cloned().ok_or_else(|| {
        Failure::Backend(Error::Backend(
            "command admitted without credentials".to_owned(),
        ))
    })
}

/// The name of the mailbox a command targets, taken from its first
/// argument.
pub(super) fn mailbox_arg(
    args: &[s::Argument],
) -> Result<String, Failure> {
    args.first()
        .and_then(s::Argument::as_astring)
        .map(Cow::into_owned)
        .ok_or_else(|| Failure::Malformed(Cow::Borrowed("Missing mailbox name")))
}

/// Translate a backend error into the `NO` response the client sees.
pub(super) fn backend_error_response(
    log_prefix: &LogPrefix,
    e: Error,
) -> s::Response<'static> {
    match e {
        Error::NxMailbox | Error::NxAccount => no(
            Some(s::RespTextCode::Nonexistent),
            e.to_string(),
        ),
        Error::MailboxExists => no(
            Some(s::RespTextCode::Other("ALREADYEXISTS".to_owned())),
            e.to_string(),
        ),
        Error::AuthenticationFailed => no(
            Some(s::RespTextCode::AuthenticationFailed),
            e.to_string(),
        ),
        Error::MailboxReadOnly | Error::Unsupported(..) => {
            warn!("{} {}", log_prefix, e);
            no(Some(s::RespTextCode::Cannot), e.to_string())
        }
        e => {
            error!("{} Unhandled internal error: {}", log_prefix, e);
            no(
                Some(s::RespTextCode::ServerBug),
                "Unexpected error; check server logs for details",
            )
        }
    }
}
