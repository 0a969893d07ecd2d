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
use crate::account::model::AccountStatus;
use crate::imap::transport::SecurityLayer;

#[test]
fn commands_in_wrong_state_are_refused() {
    let mut harness = set_up();

    assert_eq!(
        "a1 NO [CLIENTBUG] SELECT must be in AUTHENTICATED state",
        harness.tagged("a1 SELECT INBOX")
    );
    assert_eq!(SessionState::NotAuthenticated, harness.state());
    assert_eq!(
        "a2 NO [CLIENTBUG] FETCH must be in SELECTED state",
        harness.tagged("a2 FETCH 1:* FLAGS")
    );
    assert_eq!(SessionState::NotAuthenticated, harness.state());

    harness.log_in();
    assert_eq!(
        "a3 NO [CLIENTBUG] LOGIN must be in NOT AUTHENTICATED state",
        harness.tagged("a3 LOGIN azure hunter2")
    );
    assert_eq!(
        "a4 NO [CLIENTBUG] STARTTLS must be in NOT AUTHENTICATED state",
        harness.tagged("a4 STARTTLS")
    );
    assert_eq!(
        "a5 NO [CLIENTBUG] CLOSE must be in SELECTED state",
        harness.tagged("a5 CLOSE")
    );
    assert_eq!(SessionState::Authenticated, harness.state());
    assert_eq!(0, harness.server.session().consecutive_bad());
}

#[test]
fn too_many_invalid_commands() {
    let mut harness = set_up();

    assert_eq!("a1 BAD Unknown command BOGUS", harness.tagged("a1 BOGUS"));
    let lines = harness.command("(((");
    assert_eq!(1, lines.len());
    assert!(lines[0].starts_with("* BAD [PARSE] "));
    assert!(!harness.server.is_finished());

    let lines = harness.command("a3");
    assert_eq!(
        vec![
            "a3 BAD [PARSE] Missing command".to_owned(),
            FAREWELL.to_owned(),
        ],
        lines
    );
    assert!(harness.server.is_finished());
    assert_eq!(1, harness.transport().closes);
}

#[test]
fn valid_command_resets_invalid_count() {
    let mut harness = set_up();

    harness.tagged("a1 BOGUS");
    harness.tagged("a2 BOGUS");
    harness.tagged("a3 NOOP");
    harness.tagged("a4 BOGUS");
    harness.tagged("a5 BOGUS");
    assert!(!harness.server.is_finished());
    assert_eq!(2, harness.server.session().consecutive_bad());

    // Being refused for the wrong state is still a valid command
    harness.tagged("a6 SELECT INBOX");
    harness.tagged("a7 BOGUS");
    harness.tagged("a8 BOGUS");
    assert!(!harness.server.is_finished());

    harness.command("a9 BOGUS");
    assert!(harness.server.is_finished());
}

#[test]
fn delegated_commands_without_arguments_are_invalid() {
    let mut harness = set_up();
    harness.log_in();

    assert_eq!(
        "c1 BAD Missing or invalid mailbox name",
        harness.tagged("c1 CREATE")
    );
    assert_eq!(1, harness.server.session().consecutive_bad());
    harness.tagged("c2 RENAME foo");
    assert_eq!(2, harness.server.session().consecutive_bad());
    assert!(!harness.server.is_finished());

    assert_eq!(
        vec![
            "c3 BAD Missing or invalid mailbox name".to_owned(),
            FAREWELL.to_owned(),
        ],
        harness.command("c3 CREATE")
    );
    assert!(harness.server.is_finished());
    assert_eq!(1, harness.transport().closes);
}

#[test]
fn selected_commands_without_arguments_are_invalid() {
    let mut harness = set_up();
    harness.log_in();
    harness.tagged("a1 SELECT INBOX");

    assert_eq!(
        "a2 BAD FETCH takes a sequence set and data items",
        harness.tagged("a2 FETCH")
    );
    assert_eq!(1, harness.server.session().consecutive_bad());
    assert_eq!(SessionState::Selected, harness.state());
}

#[test]
fn login_and_timeouts() {
    let mut harness = set_up();

    assert_eq!(
        "a1 NO [AUTHENTICATIONFAILED] Bad user id or password",
        harness.tagged("a1 LOGIN azure wrong")
    );
    assert_eq!(
        "a2 NO [AUTHENTICATIONFAILED] Bad user id or password",
        harness.tagged("a2 LOGIN nobody hunter2")
    );
    assert_eq!(
        "a3 BAD LOGIN takes a user id and a password",
        harness.tagged("a3 LOGIN azure")
    );
    assert_eq!(1, harness.server.session().consecutive_bad());
    assert_eq!(SessionState::NotAuthenticated, harness.state());

    let response = harness.tagged("a4 LOGIN azure \"hunter2\"");
    // Capabilities after login drop the pre-authentication ones
    assert_eq!(
        "a4 OK [CAPABILITY IMAP4rev1 LITERAL+ SASL-IR UNSELECT] \
         User login successful",
        response
    );
    assert_eq!(SessionState::Authenticated, harness.state());
    assert_eq!(
        Some("azure"),
        harness.server.session().credentials().map(|c| c.user())
    );
    assert_eq!(
        vec![Duration::from_secs(60), Duration::from_secs(1800)],
        harness.transport().idle_timeouts
    );
}

#[test]
fn inactive_account_cannot_log_in() {
    let mut harness = set_up();

    assert_eq!(
        "a1 NO [CONTACTADMIN] Account is not active",
        harness.tagged("a1 LOGIN lapis diamond")
    );
    assert_eq!(SessionState::NotAuthenticated, harness.state());
    assert!(!harness.server.is_finished());
}

#[test]
fn account_becoming_inactive_ends_session() {
    let mut harness = set_up();
    harness.log_in();
    harness.tagged("a1 SELECT INBOX");

    harness
        .memory
        .set_status("azure", AccountStatus::Locked)
        .unwrap();

    let lines = harness.command("a2 NOOP");
    assert_eq!(vec!["* BYE [ALERT] Account is not active".to_owned()], lines);
    assert!(harness.server.is_finished());
    assert_eq!(1, harness.transport().closes);
    assert!(harness.server.session().selected().is_none());
}

#[test]
fn start_tls_only_once() {
    let mut harness = set_up_with(Options {
        tls_available: true,
        ..Options::default()
    });

    assert_eq!(
        "a1 OK Begin TLS negotiation now",
        harness.tagged("a1 STARTTLS")
    );
    assert_eq!(vec![SecurityLayer::Tls], harness.transport().upgrades);
    assert!(harness.server.session().tls_upgraded());

    assert_eq!(
        "a2 NO [CLIENTBUG] TLS already started",
        harness.tagged("a2 STARTTLS")
    );
    assert_eq!(1, harness.transport().upgrades.len());

    let lines = harness.command("a3 CAPABILITY");
    assert!(!lines[0].contains("STARTTLS"));
    assert_eq!(SessionState::NotAuthenticated, harness.state());
}

#[test]
fn start_tls_without_tls() {
    let mut harness = set_up();

    assert_eq!(
        "a1 NO [CANNOT] TLS not available",
        harness.tagged("a1 STARTTLS")
    );
    assert!(!harness.server.session().tls_upgraded());
    assert!(harness.transport().upgrades.is_empty());
}

#[test]
fn login_waits_for_tls_when_required() {
    let mut config = config();
    config.imap.require_tls_for_login = true;
    let mut harness = connect(Options {
        config,
        tls_available: true,
        ..Options::default()
    });

    let greeting = harness.output();
    assert!(greeting[0].contains(" STARTTLS LOGINDISABLED]"));
    assert!(!greeting[0].contains("AUTH="));

    assert_eq!(
        "a1 NO [PRIVACYREQUIRED] LOGIN is disabled until STARTTLS",
        harness.tagged("a1 LOGIN azure hunter2")
    );
    assert_eq!(
        "a2 NO [PRIVACYREQUIRED] AUTHENTICATE is disabled until STARTTLS",
        harness.tagged("a2 AUTHENTICATE PLAIN")
    );
    harness.tagged("a3 STARTTLS");
    assert!(harness.tagged("a4 LOGIN azure hunter2").starts_with("a4 OK "));
}

#[test]
fn local_selection() {
    let mut harness = set_up();
    harness.memory.deliver("azure", "INBOX", &[], 100).unwrap();
    harness
        .memory
        .deliver("azure", "INBOX", &["\\Deleted"], 200)
        .unwrap();
    harness.log_in();

    let lines = harness.command("a1 SELECT inbox");
    assert_eq!(4, lines.len());
    assert!(lines[0].starts_with("* FLAGS ("));
    assert_eq!("* 2 EXISTS", lines[1]);
    assert!(lines[2].starts_with("* OK [UIDNEXT "));
    assert_eq!("a1 OK [READ-WRITE] SELECT completed", lines[3]);
    assert_eq!(SessionState::Selected, harness.state());
    assert!(harness.memory.last_access("azure", "INBOX").is_some());

    let lines = harness.command("a2 FETCH 1:* FLAGS");
    assert_eq!(3, lines.len());
    assert_eq!(2, count_matching(&lines, "* "));
    assert!(lines[1].ends_with("FLAGS (\\Deleted))"));
    assert_eq!("a2 OK FETCH completed", lines[2]);

    assert_eq!(
        "a3 NO [CANNOT] Operation not supported by backend: UID",
        harness.tagged("a3 UID FETCH 1:* FLAGS")
    );
    assert_eq!("a4 OK CHECK completed", harness.tagged("a4 CHECK"));

    assert_eq!("a5 OK CLOSE completed", harness.tagged("a5 CLOSE"));
    assert_eq!(SessionState::Authenticated, harness.state());
    assert!(harness.server.session().selected().is_none());

    // CLOSE expunged the deleted message
    let lines = harness.command("a6 STATUS INBOX (MESSAGES)");
    assert!(lines[0].starts_with("* STATUS \"INBOX\" (MESSAGES 1 "));
    assert_eq!("a6 OK STATUS completed", lines[1]);
}

#[test]
fn examine_is_read_only() {
    let mut harness = set_up();
    harness
        .memory
        .deliver("azure", "INBOX", &["\\Deleted"], 10)
        .unwrap();
    harness.log_in();

    assert_eq!(
        "a1 OK [READ-ONLY] EXAMINE completed",
        harness.tagged("a1 EXAMINE INBOX")
    );
    assert_eq!(
        "a2 NO [CANNOT] Mailbox is read-only",
        harness.tagged("a2 EXPUNGE")
    );
    assert_eq!("a3 OK UNSELECT completed", harness.tagged("a3 UNSELECT"));
    assert_eq!(SessionState::Authenticated, harness.state());

    // Neither EXAMINE nor UNSELECT expunged anything
    let lines = harness.command("a4 STATUS INBOX (MESSAGES)");
    assert!(lines[0].starts_with("* STATUS \"INBOX\" (MESSAGES 1 "));
}

#[test]
fn failed_select_leaves_nothing_selected() {
    let mut harness = set_up();
    harness.log_in();
    harness.tagged("a1 SELECT INBOX");
    assert_eq!(SessionState::Selected, harness.state());

    assert_eq!(
        "a2 NO [NONEXISTENT] No such mailbox",
        harness.tagged("a2 SELECT Nowhere")
    );
    assert_eq!(SessionState::Authenticated, harness.state());
    assert!(harness.server.session().selected().is_none());

    assert_eq!(
        "a3 BAD Missing mailbox name",
        harness.tagged("a3 SELECT")
    );
}

#[test]
fn account_level_commands() {
    let mut harness = set_up();
    harness.log_in();

    assert_eq!("a1 OK CREATE completed", harness.tagged("a1 CREATE Drafts"));
    assert_eq!(
        "a2 NO [ALREADYEXISTS] Mailbox already exists",
        harness.tagged("a2 CREATE Drafts")
    );
    assert_eq!(
        "a3 NO [CANNOT] INBOX cannot be deleted",
        harness.tagged("a3 DELETE INBOX")
    );

    harness.send(b"a4 APPEND Drafts (\\Draft) {3+}\r\nabc\r\n");
    let lines = harness.output();
    assert_eq!(1, lines.len());
    assert!(lines[0].starts_with("a4 OK [APPENDUID 1 "));
    assert!(lines[0].ends_with("] APPEND completed"));

    assert_eq!(
        "a5 NO [NONEXISTENT] No such mailbox",
        harness.tagged("a5 STATUS Nowhere (MESSAGES)")
    );
    assert_eq!(
        "a6 OK SUBSCRIBE completed",
        harness.tagged("a6 SUBSCRIBE Drafts")
    );
    assert_eq!(
        vec![
            "* LSUB () \"/\" \"Drafts\"".to_owned(),
            "a7 OK LSUB completed".to_owned(),
        ],
        harness.command("a7 LSUB \"\" *")
    );
    assert_eq!(0, harness.server.session().consecutive_bad());
}
