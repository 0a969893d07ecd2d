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

//! The interface between the session engine and the byte-level transport.
//!
//! Events flow into the engine through the methods on `Server`; everything
//! the engine needs to do to the connection goes through `Transport`.

use std::io;
use std::time::Duration;

use super::syntax as s;
use crate::support::error::Error;

/// A security layer the transport can be asked to negotiate.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SecurityLayer {
    /// Start TLS as the server side, after the pending response is flushed.
    Tls,
    /// Install a SASL security layer negotiated by the named mechanism.
    Sasl { mechanism: String },
}

pub trait Transport {
    /// Queue `data` for sending.
    fn write(&mut self, data: &[u8]) -> io::Result<()>;

    /// Push everything queued so far out to the client.
    fn flush(&mut self) -> io::Result<()>;

    /// Arrange for `layer` to take effect once the response currently being
    /// written has been flushed.
    ///
    /// Fails with `Error::TlsUnavailable` if the transport cannot do this.
    fn start_security_upgrade(&mut self, layer: SecurityLayer)
        -> Result<(), Error>;

    /// Whether `start_security_upgrade(SecurityLayer::Tls)` could succeed.
    fn supports_tls(&self) -> bool;

    /// Set the idle timeout, replacing any previous value.
    fn set_idle_timeout(&mut self, timeout: Duration);

    fn close(&mut self);

    fn is_open(&self) -> bool;

    fn remote_address(&self) -> String;
}

/// Write a complete response line to `transport`.
pub fn send_response(
    transport: &mut dyn Transport,
    line: &s::ResponseLine<'_>,
) -> io::Result<()> {
    let mut buf = Vec::new();
    line.write_to(&mut buf)?;
    transport.write(&buf)
}

/// Write a continuation request (`+ prompt`) and flush it, since the client
/// will not send anything more until it sees it.
pub fn send_continuation(
    transport: &mut dyn Transport,
    prompt: &str,
) -> io::Result<()> {
    transport.write(b"+ ")?;
    transport.write(prompt.as_bytes())?;
    transport.write(b"\r\n")?;
    transport.flush()
}
