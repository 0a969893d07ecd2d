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

use std::path::{Path, PathBuf};

use structopt::StructOpt;

use crate::account::memory::MemoryBackend;
use crate::support::sysexits::*;
use crate::support::system_config::SystemConfig;

#[derive(StructOpt)]
#[structopt(max_term_width = 80)]
enum Command {
    /// Accept IMAP connections on the configured listen address.
    ///
    /// Each connection is served on its own thread. If `[tls]` is configured,
    /// clients may upgrade with STARTTLS; otherwise STARTTLS is refused.
    Serve(ServerCommonOptions),
    /// Load and validate the configuration, then exit.
    ///
    /// Exits with status 0 if the configuration is usable, or EX_CONFIG
    /// otherwise.
    CheckConfig(ServerCommonOptions),
}

#[derive(StructOpt, Default)]
pub(super) struct ServerCommonOptions {
    /// The directory containing `postern.toml` etc
    /// [default: /etc/postern or /usr/local/etc/postern]
    #[structopt(long, parse(from_os_str))]
    root: Option<PathBuf>,
}

pub fn main() {
    // Clap exits with status 1 instead of EX_USAGE if we use the more concise
    // API
    let cmd = Command::from_clap(&match Command::clap().get_matches_safe() {
        Ok(matches) => matches,
        Err(
            e @ clap::Error {
                kind: clap::ErrorKind::HelpDisplayed,
                ..
            },
        )
        | Err(
            e @ clap::Error {
                kind: clap::ErrorKind::VersionDisplayed,
                ..
            },
        ) => {
            println!("{}", e.message);
            return;
        }
        Err(e) => {
            eprintln!("{}", e.message);
            EX_USAGE.exit()
        }
    });

    match cmd {
        Command::Serve(common) => {
            let (root, system_config) = load_config(common);
            init_server_log(&root);
            super::serve::serve(system_config, root);
        }
        Command::CheckConfig(common) => {
            let (root, system_config) = load_config(common);
            if let Err(e) = MemoryBackend::from_config(&system_config) {
                eprintln!("{}", e);
                EX_CONFIG.exit();
            }
            println!("Configuration in '{}' is OK", root.display());
        }
    }
}

fn load_config(common: ServerCommonOptions) -> (PathBuf, SystemConfig) {
    let root = common.root.unwrap_or_else(|| {
        if Path::new("/etc/postern/postern.toml").is_file() {
            "/etc/postern".to_owned().into()
        } else if Path::new("/usr/local/etc/postern/postern.toml").is_file() {
            "/usr/local/etc/postern".to_owned().into()
        } else {
            eprintln!(
                "Neither /etc/postern nor /usr/local/etc/postern looks like\n\
                 the Postern root; use --root=/path/to/postern if your\n\
                 installation is elsewhere."
            );
            EX_CONFIG.exit()
        }
    });

    let system_config_path = root.join("postern.toml");
    let system_config = match SystemConfig::load(&system_config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!(
                "Error in config file at '{}': {}",
                system_config_path.display(),
                e
            );
            EX_CONFIG.exit()
        }
    };

    (root, system_config)
}

fn init_server_log(root: &Path) {
    if Ok(true) == nix::unistd::isatty(2) {
        // Running interactively; ignore logging configuration and just write
        // to stderr.
        crate::init_simple_log();
        return;
    }

    // log4rs if there is a configuration for it, syslog otherwise.
    let log_config_file = root.join("logging.toml");
    if log_config_file.is_file() {
        if let Err(e) = log4rs::init_file(
            &log_config_file,
            log4rs::file::Deserializers::new(),
        ) {
            eprintln!(
                "Failed to initialise logging from '{}': {}",
                log_config_file.display(),
                e
            );
            EX_CONFIG.exit();
        }
    } else {
        let formatter = syslog::Formatter3164 {
            facility: syslog::Facility::LOG_MAIL,
            hostname: None,
            process: env!("CARGO_PKG_NAME").to_owned(),
            pid: nix::unistd::getpid().as_raw(),
        };
        let result = syslog::unix(formatter)
            .map_err(|e| e.to_string())
            .and_then(|logger| {
                log::set_boxed_logger(Box::new(syslog::BasicLogger::new(
                    logger,
                )))
                .map_err(|e| e.to_string())
            });
        match result {
            Ok(()) => log::set_max_level(log::LevelFilter::Info),
            Err(e) => {
                eprintln!("Failed to connect to syslog: {}", e);
                EX_OSERR.exit()
            }
        }
    }
}
