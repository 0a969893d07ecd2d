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

//! The connection lifecycle controller.
//!
//! `Server` receives the transport's events (open, data, idle, decode error,
//! close) for one connection, and owns the session and the request being
//! assembled. It never blocks on I/O itself; whoever drives the transport
//! calls the event methods.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::{info, warn};

use super::command_processor::{CommandProcessor, Disposition, Outcome};
use super::decoder::DecodeError;
use super::request::{Request, RequestUnit};
use super::session::{Session, SessionState};
use super::syntax as s;
use super::transport::{send_continuation, send_response, Transport};
use crate::support::log_prefix::LogPrefix;

static FAREWELL: &str = concat!(
    env!("CARGO_PKG_NAME"),
    " IMAP4rev1 server terminating connection"
);

/// Raised when the connection has been idle too long.
///
/// The signal can be raised from any thread, but only takes effect at the
/// next point where the connection is between requests.
#[derive(Clone, Debug, Default)]
pub struct IdleSignal(Arc<AtomicBool>);

impl IdleSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fire(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Return whether the signal was raised, lowering it.
    pub fn take(&self) -> bool {
        self.0.swap(false, Ordering::SeqCst)
    }
}

/// Clears the per-request part of the log prefix when dropped, so the
/// context never outlives the dispatch cycle, however it ends.
struct RequestContext(LogPrefix);

impl Drop for RequestContext {
    fn drop(&mut self) {
        self.0.clear_command();
    }
}

pub struct Server<T> {
    transport: T,
    processor: Arc<CommandProcessor>,
    session: Session,
    /// The request currently being assembled, if any.
    request: Option<Request>,
    idle: IdleSignal,
    released: bool,
}

impl<T: Transport> Server<T> {
    pub fn new(transport: T, processor: Arc<CommandProcessor>) -> Self {
        let log_prefix =
            LogPrefix::new("imap".to_owned(), transport.remote_address());
        Server {
            transport,
            processor,
            session: Session::new(log_prefix),
            request: None,
            idle: IdleSignal::new(),
            released: false,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn idle_signal(&self) -> IdleSignal {
        self.idle.clone()
    }

    /// Whether the connection is over and no further events matter.
    pub fn is_finished(&self) -> bool {
        SessionState::Logout == self.session.state() || !self.transport.is_open()
    }

    /// The connection has been established.
    pub fn opened(&mut self) {
        info!("{} Connection established", self.session.log_prefix());
        self.transport.set_idle_timeout(
            self.processor.system_config().imap.unauthenticated_idle(),
        );

        let result = self
            .processor
            .greet(&self.session, &mut self.transport)
            .and_then(|_| self.transport.flush());
        if let Err(e) = result {
            warn!("{} Failed to send greeting: {}", self.session.log_prefix(), e);
            self.terminate(false);
        }
    }

    /// A unit of client input has been decoded.
    pub fn data_received(&mut self, unit: RequestUnit) {
        if self.is_finished() {
            return;
        }

        let request = self.request.get_or_insert_with(Request::new);
        if !request.feed(unit) {
            if request.awaiting_continuation() {
                if let Err(e) = send_continuation(&mut self.transport, "go") {
                    warn!(
                        "{} Failed to send continuation: {}",
                        self.session.log_prefix(),
                        e
                    );
                    self.terminate(false);
                    return;
                }
            }

            self.check_idle();
            return;
        }

        let request = match self.request.take() {
            Some(request) => request,
            None => return,
        };

        let outcome = {
            let _context = RequestContext(self.session.log_prefix().clone());
            self.processor.handle_request(
                &mut self.session,
                &request,
                &mut self.transport,
            )
        };
        drop(request);

        if Disposition::Stop == outcome.disposition() {
            self.terminate(Outcome::TransportFailed != outcome);
            return;
        }

        self.check_idle();
    }

    /// The idle timer expired.
    pub fn idle_timeout(&mut self) {
        self.idle.fire();
        self.check_idle();
    }

    /// The decoder could not make sense of the input.
    pub fn decode_error(&mut self, error: DecodeError) {
        if self.is_finished() {
            return;
        }

        warn!("{} Decode error: {}", self.session.log_prefix(), error);
        self.request = None;

        let line = s::ResponseLine {
            tag: None,
            response: s::Response::cond(
                s::RespCondType::Bad,
                Some(s::RespTextCode::Parse),
                error.to_string(),
            ),
        };
        let result = send_response(&mut self.transport, &line)
            .and_then(|_| self.transport.flush());
        if let Err(e) = result {
            warn!("{} Write failed: {}", self.session.log_prefix(), e);
            self.terminate(false);
            return;
        }

        if error.is_recoverable() {
            self.check_idle();
        } else {
            self.terminate(true);
        }
    }

    /// The transport has been closed, by either side.
    pub fn closed(&mut self) {
        self.request = None;
        if !self.released {
            self.released = true;
            info!("{} Connection closed", self.session.log_prefix());
            self.session.cleanup();
            self.session.enter_logout();
        }

        if self.transport.is_open() {
            self.transport.close();
        }
    }

    /// End the connection from our side, optionally saying goodbye first.
    ///
    /// Does nothing if the transport is already closed.
    pub fn terminate(&mut self, send_farewell: bool) {
        if !self.transport.is_open() {
            return;
        }

        self.request = None;
        self.session.cleanup();

        if self.session.credentials().is_some() && !self.session.goodbye_sent()
        {
            info!(
                "{} Dropping connection for user {}",
                self.session.log_prefix(),
                self.session.log_prefix().user().unwrap_or_default()
            );
        }

        if send_farewell && self.session.mark_goodbye_sent() {
            let line = s::ResponseLine {
                tag: None,
                response: s::Response::cond(
                    s::RespCondType::Bye,
                    None,
                    FAREWELL,
                ),
            };
            // The connection is going away regardless.
            let _ = send_response(&mut self.transport, &line)
                .and_then(|_| self.transport.flush());
        }

        self.transport.close();
        self.session.enter_logout();
    }

    fn check_idle(&mut self) {
        if self.idle.take() && !self.is_finished() {
            info!(
                "{} Idle timeout in state {}",
                self.session.log_prefix(),
                self.session.state()
            );
            self.terminate(true);
        }
    }
}
