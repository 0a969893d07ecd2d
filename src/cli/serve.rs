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

use std::net::TcpListener;
use std::path::Path;
use std::sync::Arc;
use std::thread;

use log::{error, info, warn};
use openssl::ssl::{SslAcceptor, SslFiletype, SslMethod};

use crate::account::memory::MemoryBackend;
use crate::imap::command_processor::CommandProcessor;
use crate::imap::proxy::NoRouteProxy;
use crate::imap::stats::{CommandStats, Stats};
use crate::imap::tcp::serve_connection;
use crate::support::system_config::{SystemConfig, TlsConfig};

// Errors must go through the logger, since stderr may not go anywhere
macro_rules! fatal {
    ($ex:ident, $($stuff:tt)*) => {{
        error!($($stuff)*);
        crate::support::sysexits::$ex.exit()
    }}
}

pub fn serve(system_config: SystemConfig, system_root: impl AsRef<Path>) {
    let system_config = Arc::new(system_config);

    let acceptor = system_config.tls.as_ref().map(|tls| {
        Arc::new(create_ssl_acceptor(tls, system_root.as_ref()))
    });
    if acceptor.is_none() {
        warn!("No [tls] configured; STARTTLS will not be offered");
    }

    let backend = MemoryBackend::from_config(&system_config)
        .unwrap_or_else(|e| fatal!(EX_CONFIG, "{}", e));
    let stats = Arc::new(CommandStats::new());
    let processor = Arc::new(CommandProcessor::new(
        Arc::clone(&system_config),
        Arc::new(backend),
        Arc::new(NoRouteProxy),
        Arc::clone(&stats) as Arc<dyn Stats>,
    ));

    let listener = TcpListener::bind(&system_config.listen.address)
        .unwrap_or_else(|e| {
            fatal!(
                EX_OSERR,
                "Unable to listen on {}: {}",
                system_config.listen.address,
                e
            )
        });
    info!("Listening on {}", system_config.listen.address);

    for stream in listener.incoming() {
        let stream = match stream {
            Ok(stream) => stream,
            Err(e) => {
                warn!("Failed to accept connection: {}", e);
                continue;
            }
        };

        let acceptor = acceptor.clone();
        let processor = Arc::clone(&processor);
        let stats = Arc::clone(&stats);
        let spawned = thread::Builder::new()
            .name("imap-connection".to_owned())
            .spawn(move || {
                serve_connection(stream, acceptor, processor);
                stats.log_summary();
            });
        if let Err(e) = spawned {
            error!("Unable to spawn connection thread: {}", e);
        }
    }
}

fn create_ssl_acceptor(tls: &TlsConfig, system_root: &Path) -> SslAcceptor {
    let mut acceptor =
        match SslAcceptor::mozilla_intermediate_v5(SslMethod::tls_server()) {
            Ok(a) => a,
            Err(e) => fatal!(
                EX_SOFTWARE,
                "Failed to initialise OpenSSL acceptor: {}",
                e
            ),
        };

    let private_key_path = system_root.join(&tls.private_key);
    if let Err(e) =
        acceptor.set_private_key_file(&private_key_path, SslFiletype::PEM)
    {
        fatal!(
            EX_CONFIG,
            "Unable to load TLS private key from '{}': {}",
            private_key_path.display(),
            e
        );
    }

    let certificate_path = system_root.join(&tls.certificate_chain);
    if let Err(e) = acceptor.set_certificate_chain_file(&certificate_path) {
        fatal!(
            EX_CONFIG,
            "Unable to load TLS certificate chain from '{}': {}",
            certificate_path.display(),
            e
        );
    }

    if let Err(e) = acceptor.check_private_key() {
        fatal!(EX_CONFIG, "TLS key seems to be invalid: {}", e);
    }

    acceptor.build()
}
