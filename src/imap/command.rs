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

//! The table of commands the engine knows about and the states they may be
//! issued in.

use super::session::SessionState;

/// What the command processor does with a command.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CommandId {
    Capability,
    Noop,
    Logout,
    StartTls,
    Login,
    Authenticate,
    Select,
    Examine,
    Close,
    Unselect,
    Check,
    /// Handed to the backend (or a remote node) by name.
    Delegated,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StateRequirement {
    Any,
    Exactly(SessionState),
    AtLeast(SessionState),
}

impl StateRequirement {
    pub fn admits(self, state: SessionState) -> bool {
        match self {
            StateRequirement::Any => SessionState::Logout != state,
            StateRequirement::Exactly(required) => required == state,
            StateRequirement::AtLeast(required) => {
                state >= required && SessionState::Logout != state
            }
        }
    }

    /// The state named in the rejection message.
    pub fn named_state(self) -> SessionState {
        match self {
            StateRequirement::Any => SessionState::NotAuthenticated,
            StateRequirement::Exactly(s) | StateRequirement::AtLeast(s) => s,
        }
    }
}

/// Which argument, if any, names a mailbox that might live elsewhere.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MailboxTarget {
    None,
    FirstArg,
}

#[derive(Clone, Copy, Debug)]
pub struct CommandDef {
    pub name: &'static str,
    pub id: CommandId,
    pub requirement: StateRequirement,
    pub target: MailboxTarget,
}

const fn def(
    name: &'static str,
    id: CommandId,
    requirement: StateRequirement,
    target: MailboxTarget,
) -> CommandDef {
    CommandDef {
        name,
        id,
        requirement,
        target,
    }
}

use self::CommandId as C;
use self::MailboxTarget as T;
use self::SessionState as S;
use self::StateRequirement as R;

static COMMANDS: &[CommandDef] = &[
    def("CAPABILITY", C::Capability, R::Any, T::None),
    def("NOOP", C::Noop, R::Any, T::None),
    def("LOGOUT", C::Logout, R::Any, T::None),
    def("STARTTLS", C::StartTls, R::Exactly(S::NotAuthenticated), T::None),
    def("LOGIN", C::Login, R::Exactly(S::NotAuthenticated), T::None),
    def(
        "AUTHENTICATE",
        C::Authenticate,
        R::Exactly(S::NotAuthenticated),
        T::None,
    ),
    def("SELECT", C::Select, R::AtLeast(S::Authenticated), T::FirstArg),
    def("EXAMINE", C::Examine, R::AtLeast(S::Authenticated), T::FirstArg),
    def("LIST", C::Delegated, R::AtLeast(S::Authenticated), T::None),
    def("LSUB", C::Delegated, R::AtLeast(S::Authenticated), T::None),
    def("CREATE", C::Delegated, R::AtLeast(S::Authenticated), T::None),
    def("DELETE", C::Delegated, R::AtLeast(S::Authenticated), T::None),
    def("RENAME", C::Delegated, R::AtLeast(S::Authenticated), T::None),
    def("SUBSCRIBE", C::Delegated, R::AtLeast(S::Authenticated), T::None),
    def("UNSUBSCRIBE", C::Delegated, R::AtLeast(S::Authenticated), T::None),
    def("STATUS", C::Delegated, R::AtLeast(S::Authenticated), T::FirstArg),
    def("APPEND", C::Delegated, R::AtLeast(S::Authenticated), T::FirstArg),
    def("CHECK", C::Check, R::Exactly(S::Selected), T::None),
    def("CLOSE", C::Close, R::Exactly(S::Selected), T::None),
    def("UNSELECT", C::Unselect, R::Exactly(S::Selected), T::None),
    def("EXPUNGE", C::Delegated, R::Exactly(S::Selected), T::None),
    def("SEARCH", C::Delegated, R::Exactly(S::Selected), T::None),
    def("FETCH", C::Delegated, R::Exactly(S::Selected), T::None),
    def("STORE", C::Delegated, R::Exactly(S::Selected), T::None),
    def("COPY", C::Delegated, R::Exactly(S::Selected), T::None),
    def("MOVE", C::Delegated, R::Exactly(S::Selected), T::None),
    def("UID", C::Delegated, R::Exactly(S::Selected), T::None),
];

/// Look up an upper-case command name.
pub fn lookup(name: &str) -> Option<&'static CommandDef> {
    COMMANDS.iter().find(|c| c.name == name)
}
