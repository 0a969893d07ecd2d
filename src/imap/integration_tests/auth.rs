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

use std::time::Duration;

use super::defs::*;

const PLAIN_AZURE: &str = "AGF6dXJlAGh1bnRlcjI=";

#[test]
fn plain_in_two_frames() {
    let mut harness = set_up();

    assert_eq!(
        vec!["+ ".to_owned()],
        harness.command("a1 AUTHENTICATE PLAIN")
    );
    assert!(harness.server.session().has_pending_handshake());
    assert_eq!(SessionState::NotAuthenticated, harness.state());

    let lines = harness.command(PLAIN_AZURE);
    assert_eq!(
        vec!["a1 OK PLAIN authentication successful".to_owned()],
        lines
    );
    assert!(!harness.server.session().has_pending_handshake());
    assert_eq!(SessionState::Authenticated, harness.state());
    assert_eq!(
        Some(&Duration::from_secs(1800)),
        harness.transport().idle_timeouts.last()
    );
    // No security layer was negotiated
    assert!(harness.transport().upgrades.is_empty());

    // The session now accepts ordinary commands again
    assert_eq!("a2 OK NOOP completed", harness.tagged("a2 NOOP"));
}

#[test]
fn plain_with_initial_response() {
    let mut harness = set_up();

    assert_eq!(
        vec!["a1 OK PLAIN authentication successful".to_owned()],
        harness.command(&format!("a1 AUTHENTICATE plain {}", PLAIN_AZURE))
    );
    assert_eq!(SessionState::Authenticated, harness.state());
}

#[test]
fn login_mechanism_challenges() {
    let mut harness = set_up();

    assert_eq!(
        vec!["+ VXNlcm5hbWU6".to_owned()],
        harness.command("a1 AUTHENTICATE LOGIN")
    );
    assert_eq!(
        vec!["+ UGFzc3dvcmQ6".to_owned()],
        harness.command("YXp1cmU=")
    );
    assert_eq!(
        vec!["a1 OK LOGIN authentication successful".to_owned()],
        harness.command("aHVudGVyMg==")
    );
    assert_eq!(SessionState::Authenticated, harness.state());
    assert_eq!(Some("AUTHENTICATE"), harness.server.session().last_command());
}

#[test]
fn rejected_credentials() {
    let mut harness = set_up();

    harness.command("a1 AUTHENTICATE PLAIN");
    assert_eq!(
        vec!["a1 NO [AUTHENTICATIONFAILED] Bad user id or password".to_owned()],
        harness.command("AGF6dXJlAHdyb25n")
    );
    assert_eq!(SessionState::NotAuthenticated, harness.state());
    assert!(!harness.server.session().has_pending_handshake());
    assert_eq!(0, harness.server.session().consecutive_bad());

    // Another attempt is allowed
    harness.command("a2 AUTHENTICATE PLAIN");
    assert_eq!(
        vec!["a2 OK PLAIN authentication successful".to_owned()],
        harness.command(PLAIN_AZURE)
    );
}

#[test]
fn client_abort() {
    let mut harness = set_up();

    harness.command("a1 AUTHENTICATE PLAIN");
    assert_eq!(
        vec!["a1 BAD AUTHENTICATE aborted".to_owned()],
        harness.command("*")
    );
    assert!(!harness.server.session().has_pending_handshake());
    assert_eq!(0, harness.server.session().consecutive_bad());
    assert_eq!("a2 OK NOOP completed", harness.tagged("a2 NOOP"));
}

#[test]
fn commands_are_not_run_mid_handshake() {
    let mut harness = set_up();

    harness.command("a1 AUTHENTICATE PLAIN");
    // This is taken as the client's response, not as a command
    assert_eq!(
        vec![
            "a1 BAD [PARSE] Invalid base64 in authentication exchange"
                .to_owned()
        ],
        harness.command("a2 LOGOUT")
    );
    assert_eq!(SessionState::NotAuthenticated, harness.state());
    assert!(!harness.server.is_finished());
    assert_eq!(1, harness.server.session().consecutive_bad());
}

#[test]
fn unknown_mechanism() {
    let mut harness = set_up();

    assert_eq!(
        "a1 NO [CANNOT] Unsupported authentication mechanism",
        harness.tagged("a1 AUTHENTICATE CRAM-MD5")
    );
    assert_eq!(
        "a2 BAD [PARSE] Invalid base64 in initial response",
        harness.tagged("a2 AUTHENTICATE PLAIN !!!")
    );
    assert_eq!(
        "a3 BAD AUTHENTICATE takes a mechanism and an optional initial \
         response",
        harness.tagged("a3 AUTHENTICATE")
    );
}

#[test]
fn mechanism_must_be_offered() {
    let mut config = config();
    config.imap.auth_mechanisms = vec!["PLAIN".to_owned()];
    let mut harness = connect(Options {
        config,
        ..Options::default()
    });

    let greeting = harness.output();
    assert!(greeting[0].contains(" AUTH=PLAIN]"));
    assert!(!greeting[0].contains("AUTH=LOGIN"));
    assert_eq!(
        "a1 NO [CANNOT] Unsupported authentication mechanism",
        harness.tagged("a1 AUTHENTICATE LOGIN")
    );
}

#[test]
fn inactive_account_refused_after_handshake() {
    let mut harness = set_up();

    // \0lapis\0diamond
    assert_eq!(
        "a1 NO [CONTACTADMIN] Account is not active",
        harness.tagged("a1 AUTHENTICATE PLAIN AGxhcGlzAGRpYW1vbmQ=")
    );
    assert_eq!(SessionState::NotAuthenticated, harness.state());
}
