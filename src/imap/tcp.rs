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

//! A blocking TCP transport, one thread per connection.
//!
//! The socket read timeout doubles as the idle timer, and STARTTLS is done
//! with OpenSSL once the `OK` response has been flushed.

use std::io::{self, Read, Write};
use std::mem;
use std::net::{Shutdown, TcpStream};
use std::sync::Arc;
use std::time::Duration;

use log::{info, warn};
use openssl::ssl::{SslAcceptor, SslStream};

use super::command_processor::CommandProcessor;
use super::decoder::Decoder;
use super::server::Server;
use super::transport::{SecurityLayer, Transport};
use crate::support::error::Error;

enum Stream {
    Plain(TcpStream),
    Tls(SslStream<TcpStream>),
    Closed,
}

pub struct TcpTransport {
    stream: Stream,
    acceptor: Option<Arc<SslAcceptor>>,
    peer: String,
    out: Vec<u8>,
    pending_upgrade: Option<SecurityLayer>,
    /// Set when a TLS handshake has completed and the owner has not yet
    /// noticed.
    upgraded: bool,
}

impl TcpTransport {
    pub fn new(
        stream: TcpStream,
        acceptor: Option<Arc<SslAcceptor>>,
        peer: String,
    ) -> Self {
        TcpTransport {
            stream: Stream::Plain(stream),
            acceptor,
            peer,
            out: Vec::new(),
            pending_upgrade: None,
            upgraded: false,
        }
    }

    /// Whether a security upgrade completed since the last call.
    ///
    /// Anything decoded from before the upgrade must be thrown away.
    pub fn take_upgraded(&mut self) -> bool {
        mem::replace(&mut self.upgraded, false)
    }

    pub fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.stream {
            Stream::Plain(ref mut s) => s.read(buf),
            Stream::Tls(ref mut s) => s.read(buf),
            Stream::Closed => Ok(0),
        }
    }

    fn socket(&self) -> Option<&TcpStream> {
        match self.stream {
            Stream::Plain(ref s) => Some(s),
            Stream::Tls(ref s) => Some(s.get_ref()),
            Stream::Closed => None,
        }
    }

    fn start_tls(&mut self) -> io::Result<()> {
        let acceptor = self.acceptor.clone().ok_or_else(|| {
            io::Error::new(io::ErrorKind::Other, Error::TlsUnavailable)
        })?;

        match mem::replace(&mut self.stream, Stream::Closed) {
            Stream::Plain(socket) => match acceptor.accept(socket) {
                Ok(tls) => {
                    info!("imap:{} TLS handshake succeeded", self.peer);
                    self.stream = Stream::Tls(tls);
                    self.upgraded = true;
                    Ok(())
                }
                Err(e) => Err(io::Error::new(
                    io::ErrorKind::Other,
                    format!("TLS handshake failed: {}", e),
                )),
            },
            other => {
                self.stream = other;
                Err(io::Error::new(io::ErrorKind::Other, Error::TlsUnavailable))
            }
        }
    }
}

impl Transport for TcpTransport {
    fn write(&mut self, data: &[u8]) -> io::Result<()> {
        if let Stream::Closed = self.stream {
            return Err(io::Error::new(
                io::ErrorKind::NotConnected,
                Error::TransportClosed,
            ));
        }

        self.out.extend_from_slice(data);
        Ok(())
    }

    fn flush(&mut self) -> io::Result<()> {
        let out = mem::take(&mut self.out);
        let written = match self.stream {
            Stream::Plain(ref mut s) => s.write_all(&out).and_then(|_| s.flush()),
            Stream::Tls(ref mut s) => s.write_all(&out).and_then(|_| s.flush()),
            Stream::Closed => Err(io::Error::new(
                io::ErrorKind::NotConnected,
                Error::TransportClosed,
            )),
        };
        written?;

        match self.pending_upgrade.take() {
            None => Ok(()),
            Some(SecurityLayer::Tls) => self.start_tls(),
            Some(SecurityLayer::Sasl { mechanism }) => Err(io::Error::new(
                io::ErrorKind::Other,
                Error::Unsupported(format!("{} security layer", mechanism)),
            )),
        }
    }

    fn start_security_upgrade(
        &mut self,
        layer: SecurityLayer,
    ) -> Result<(), Error> {
        match layer {
            SecurityLayer::Tls if self.supports_tls() => {
                self.pending_upgrade = Some(SecurityLayer::Tls);
                Ok(())
            }
            SecurityLayer::Tls => Err(Error::TlsUnavailable),
            SecurityLayer::Sasl { mechanism } => Err(Error::Unsupported(
                format!("{} security layer", mechanism),
            )),
        }
    }

    fn supports_tls(&self) -> bool {
        self.acceptor.is_some()
            && matches!(self.stream, Stream::Plain(..))
            && self.pending_upgrade.is_none()
    }

    fn set_idle_timeout(&mut self, timeout: Duration) {
        // A zero timeout is an error for the socket; treat it as "never".
        let timeout = if Duration::from_secs(0) == timeout {
            None
        } else {
            Some(timeout)
        };

        if let Some(socket) = self.socket() {
            if let Err(e) = socket.set_read_timeout(timeout) {
                warn!("imap:{} Unable to set idle timeout: {}", self.peer, e);
            }
        }
    }

    fn close(&mut self) {
        if let Some(socket) = self.socket() {
            let _ = socket.shutdown(Shutdown::Both);
        }
        self.stream = Stream::Closed;
        self.out.clear();
    }

    fn is_open(&self) -> bool {
        !matches!(self.stream, Stream::Closed)
    }

    fn remote_address(&self) -> String {
        self.peer.clone()
    }
}

/// Run one client connection to completion on the current thread.
pub fn serve_connection(
    stream: TcpStream,
    acceptor: Option<Arc<SslAcceptor>>,
    processor: Arc<CommandProcessor>,
) {
    let peer = stream
        .peer_addr()
        .map(|a| a.to_string())
        .unwrap_or_else(|_| "unknown-socket".to_owned());
    let _ = stream.set_nodelay(true);

    let mut decoder = Decoder::new(
        processor.system_config().imap.max_command_line,
        processor.system_config().imap.max_literal,
    );
    let transport = TcpTransport::new(stream, acceptor, peer);
    let mut server = Server::new(transport, processor);
    let log_prefix = server.session().log_prefix().clone();

    server.opened();

    let mut buf = [0u8; 4096];
    while !server.is_finished() {
        let nread = match server.transport_mut().read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if io::ErrorKind::Interrupted == e.kind() => continue,
            Err(e)
                if io::ErrorKind::WouldBlock == e.kind()
                    || io::ErrorKind::TimedOut == e.kind() =>
            {
                server.idle_timeout();
                continue;
            }
            Err(e) => {
                warn!("{} Read failed: {}", log_prefix, e);
                break;
            }
        };

        decoder.push(&buf[..nread]);
        while !server.is_finished() {
            match decoder.next_unit() {
                Ok(Some(unit)) => {
                    server.data_received(unit);
                    if server.transport_mut().take_upgraded() {
                        decoder.reset();
                        break;
                    }
                }
                Ok(None) => break,
                Err(e) => server.decode_error(e),
            }
        }
    }

    server.closed();
}
