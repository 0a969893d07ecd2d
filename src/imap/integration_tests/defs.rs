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

use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use secstr::SecStr;

use crate::account::memory::MemoryBackend;
use crate::account::model::*;
use crate::imap::command_processor::CommandProcessor;
use crate::imap::decoder::Decoder;
use crate::imap::proxy::{Proxy, ProxyError, ProxySession};
use crate::imap::server::{IdleSignal, Server};
use crate::imap::stats::CommandStats;
use crate::imap::syntax::Argument;
use crate::imap::transport::{SecurityLayer, Transport};
use crate::support::error::Error;
use crate::support::log_prefix::LogPrefix;
use crate::support::system_config::SystemConfig;

pub use crate::imap::session::{Selected, SessionState};

pub const GREETING_PREFIX: &str = "* OK [CAPABILITY IMAP4rev1 ";
pub const FAREWELL: &str =
    "* BYE postern IMAP4rev1 server terminating connection";

/// Records everything the engine does to the connection.
#[derive(Debug)]
pub struct FakeTransport {
    pub output: Vec<u8>,
    pub closes: u32,
    pub idle_timeouts: Vec<Duration>,
    pub upgrades: Vec<SecurityLayer>,
    pub tls_available: bool,
    pub fail_writes: bool,
    pending_upgrade: Option<SecurityLayer>,
    open: bool,
}

impl FakeTransport {
    pub fn new(tls_available: bool) -> Self {
        FakeTransport {
            output: Vec::new(),
            closes: 0,
            idle_timeouts: Vec::new(),
            upgrades: Vec::new(),
            tls_available,
            fail_writes: false,
            pending_upgrade: None,
            open: true,
        }
    }

    fn check_writable(&self) -> io::Result<()> {
        if !self.open {
            Err(io::Error::new(io::ErrorKind::NotConnected, "closed"))
        } else if self.fail_writes {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "broken pipe"))
        } else {
            Ok(())
        }
    }
}

impl Transport for FakeTransport {
    fn write(&mut self, data: &[u8]) -> io::Result<()> {
        self.check_writable()?;
        self.output.extend_from_slice(data);
        Ok(())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.check_writable()?;
        if let Some(layer) = self.pending_upgrade.take() {
            self.upgrades.push(layer);
        }
        Ok(())
    }

    fn start_security_upgrade(
        &mut self,
        layer: SecurityLayer,
    ) -> Result<(), Error> {
        match layer {
            SecurityLayer::Tls if !self.supports_tls() => {
                Err(Error::TlsUnavailable)
            }
            layer => {
                self.pending_upgrade = Some(layer);
                Ok(())
            }
        }
    }

    fn supports_tls(&self) -> bool {
        self.tls_available
            && self.pending_upgrade.is_none()
            && !self.upgrades.contains(&SecurityLayer::Tls)
    }

    fn set_idle_timeout(&mut self, timeout: Duration) {
        self.idle_timeouts.push(timeout);
    }

    fn close(&mut self) {
        self.closes += 1;
        self.open = false;
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn remote_address(&self) -> String {
        "192.0.2.1:49152".to_owned()
    }
}

/// Wraps the memory backend so a test can make the idle timer go off while
/// a particular command is running.
pub struct TestBackend {
    inner: MemoryBackend,
    fire_during: Mutex<Option<(String, IdleSignal)>>,
}

impl TestBackend {
    fn fire_if_armed(&self, command: &str) {
        let armed = self.fire_during.lock().unwrap();
        if let Some((ref name, ref signal)) = *armed {
            if name == command {
                signal.fire();
            }
        }
    }
}

impl Backend for TestBackend {
    fn authenticate(
        &self,
        user: &str,
        password: &SecStr,
    ) -> Result<Credentials, Error> {
        self.inner.authenticate(user, password)
    }

    fn account_status(&self, credentials: &Credentials) -> AccountStatus {
        self.inner.account_status(credentials)
    }

    fn locate_mailbox(
        &self,
        credentials: &Credentials,
        mailbox: &str,
    ) -> Result<MailboxLocation, Error> {
        self.inner.locate_mailbox(credentials, mailbox)
    }

    fn select(
        &self,
        credentials: &Credentials,
        mailbox: &str,
        read_only: bool,
    ) -> Result<(Box<dyn MailboxSession>, BackendReply), Error> {
        self.fire_if_armed(if read_only { "EXAMINE" } else { "SELECT" });
        self.inner.select(credentials, mailbox, read_only)
    }

    fn execute(
        &self,
        credentials: &Credentials,
        command: &str,
        args: &[Argument],
    ) -> Result<BackendReply, Error> {
        self.fire_if_armed(command);
        self.inner.execute(credentials, command, args)
    }
}

/// A proxy whose reachability the test controls.
#[derive(Default)]
pub struct TestProxy {
    pub available: bool,
    pub opens: AtomicUsize,
    pub forwards: Mutex<Vec<String>>,
    pub closes: Arc<Mutex<Vec<(String, bool)>>>,
    /// Once raised, every open remote selection fails.
    pub peer_down: Arc<AtomicBool>,
    /// Commands attempted on remote selections, successful or not.
    pub session_forwards: Arc<AtomicUsize>,
}

impl Proxy for TestProxy {
    fn open(
        &self,
        _: &LogPrefix,
        _: &Credentials,
        node: &str,
        mailbox: &str,
        read_only: bool,
    ) -> Result<(Box<dyn ProxySession>, BackendReply), ProxyError> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        if !self.available {
            return Err(ProxyError::Unreachable(node.to_owned()));
        }

        Ok((
            Box::new(TestProxySession {
                mailbox: mailbox.to_owned(),
                node: node.to_owned(),
                read_only,
                closes: Arc::clone(&self.closes),
                peer_down: Arc::clone(&self.peer_down),
                forwards: Arc::clone(&self.session_forwards),
            }),
            BackendReply::ok("Remote SELECT completed")
                .with_untagged("3 EXISTS")
                .with_code(if read_only { "READ-ONLY" } else { "READ-WRITE" }),
        ))
    }

    fn forward(
        &self,
        _: &LogPrefix,
        _: &Credentials,
        node: &str,
        command: &str,
        _: &[Argument],
    ) -> Result<BackendReply, ProxyError> {
        if !self.available {
            return Err(ProxyError::Unreachable(node.to_owned()));
        }

        self.forwards.lock().unwrap().push(command.to_owned());
        Ok(BackendReply::ok(format!("{} completed on {}", command, node)))
    }
}

struct TestProxySession {
    mailbox: String,
    node: String,
    read_only: bool,
    closes: Arc<Mutex<Vec<(String, bool)>>>,
    peer_down: Arc<AtomicBool>,
    forwards: Arc<AtomicUsize>,
}

impl TestProxySession {
    fn check_peer(&self) -> Result<(), ProxyError> {
        if self.peer_down.load(Ordering::SeqCst) {
            Err(ProxyError::Unreachable(self.node.clone()))
        } else {
            Ok(())
        }
    }
}

impl ProxySession for TestProxySession {
    fn mailbox(&self) -> &str {
        &self.mailbox
    }

    fn node(&self) -> &str {
        &self.node
    }

    fn read_only(&self) -> bool {
        self.read_only
    }

    fn refresh_access_time(&mut self) {}

    fn forward(
        &mut self,
        command: &str,
        _: &[Argument],
    ) -> Result<BackendReply, ProxyError> {
        self.forwards.fetch_add(1, Ordering::SeqCst);
        self.check_peer()?;
        Ok(BackendReply::ok(format!("{} completed remotely", command))
            .with_untagged("3 EXISTS"))
    }

    fn close(&mut self, expunge: bool) -> Result<(), ProxyError> {
        self.check_peer()?;
        self.closes
            .lock()
            .unwrap()
            .push((self.mailbox.clone(), expunge));
        Ok(())
    }
}

pub fn config() -> SystemConfig {
    toml::from_str(
        r#"
[imap]
max_consecutive_bad = 3
unauthenticated_idle_secs = 60
authenticated_idle_secs = 1800
"#,
    )
    .unwrap()
}

pub struct Options {
    pub config: SystemConfig,
    pub tls_available: bool,
    pub proxy_available: bool,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            config: config(),
            tls_available: false,
            proxy_available: false,
        }
    }
}

pub struct Harness {
    pub server: Server<FakeTransport>,
    pub memory: MemoryBackend,
    pub backend: Arc<TestBackend>,
    pub proxy: Arc<TestProxy>,
    pub stats: Arc<CommandStats>,
    decoder: Decoder,
}

pub fn set_up() -> Harness {
    set_up_with(Options::default())
}

/// Build a harness and open the connection, discarding the greeting.
pub fn set_up_with(options: Options) -> Harness {
    let mut harness = connect(options);
    let greeting = harness.output();
    assert_eq!(1, greeting.len());
    assert!(greeting[0].starts_with(GREETING_PREFIX));
    harness
}

/// Build a harness and open the connection, leaving the greeting unread.
pub fn connect(options: Options) -> Harness {
    crate::init_test_log();

    let memory = MemoryBackend::new();
    memory.add_account("azure", "hunter2");
    memory.create_mailbox("azure", "INBOX").unwrap();
    memory.create_mailbox("azure", "Archive").unwrap();
    memory
        .add_remote_mailbox("azure", "Shared", "node2.example.com:143")
        .unwrap();
    memory.add_account("lapis", "diamond");
    memory.set_status("lapis", AccountStatus::Locked).unwrap();

    let backend = Arc::new(TestBackend {
        inner: memory.clone(),
        fire_during: Mutex::new(None),
    });
    let proxy = Arc::new(TestProxy {
        available: options.proxy_available,
        ..TestProxy::default()
    });
    let stats = Arc::new(CommandStats::new());
    let decoder = Decoder::new(
        options.config.imap.max_command_line,
        options.config.imap.max_literal,
    );

    let processor = Arc::new(CommandProcessor::new(
        Arc::new(options.config),
        Arc::clone(&backend) as Arc<dyn Backend>,
        Arc::clone(&proxy) as Arc<dyn Proxy>,
        Arc::clone(&stats) as Arc<dyn crate::imap::stats::Stats>,
    ));

    let mut server =
        Server::new(FakeTransport::new(options.tls_available), processor);
    server.opened();

    Harness {
        server,
        memory,
        backend,
        proxy,
        stats,
        decoder,
    }
}

impl Harness {
    /// Deliver raw bytes from the client, the way the TCP read loop would.
    pub fn send(&mut self, data: &[u8]) {
        self.decoder.push(data);
        while !self.server.is_finished() {
            match self.decoder.next_unit() {
                Ok(Some(unit)) => self.server.data_received(unit),
                Ok(None) => break,
                Err(e) => self.server.decode_error(e),
            }
        }
    }

    /// Take everything written since the last call, as lines without their
    /// CRLF.
    pub fn output(&mut self) -> Vec<String> {
        let data = std::mem::take(&mut self.server.transport_mut().output);
        let text = String::from_utf8(data).unwrap();
        let mut lines = text
            .split("\r\n")
            .map(str::to_owned)
            .collect::<Vec<_>>();
        assert_eq!(Some(""), lines.pop().as_deref(), "unterminated output");
        lines
    }

    /// Send one line and return all the lines written in response.
    pub fn command(&mut self, line: &str) -> Vec<String> {
        self.send(format!("{}\r\n", line).as_bytes());
        self.output()
    }

    /// Send one line and return the single tagged response, asserting that
    /// it is the last line written.
    pub fn tagged(&mut self, line: &str) -> String {
        let tag = line.split(' ').next().unwrap().to_owned();
        let mut lines = self.command(line);
        let last = lines.pop().expect("no response");
        assert!(
            last.starts_with(&format!("{} ", tag)),
            "expected tagged response, got {:?}",
            last
        );
        last
    }

    pub fn log_in(&mut self) {
        let response = self.tagged("L1 LOGIN azure hunter2");
        assert!(response.starts_with("L1 OK "), "login failed: {}", response);
    }

    pub fn state(&self) -> SessionState {
        self.server.session().state()
    }

    pub fn transport(&self) -> &FakeTransport {
        self.server.transport()
    }

    /// Make the idle timer expire while the backend is running `command`.
    pub fn fire_idle_during(&self, command: &str) {
        *self.backend.fire_during.lock().unwrap() =
            Some((command.to_owned(), self.server.idle_signal()));
    }
}

pub fn count_matching(lines: &[String], prefix: &str) -> usize {
    lines.iter().filter(|l| l.starts_with(prefix)).count()
}
