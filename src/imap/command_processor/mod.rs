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

//! The command dispatcher: turns each complete request into responses and
//! classifies how it went.
//!
//! As with the rest of `imap`, this is split into several submodules for
//! manageability, but is best thought of as one single module.

mod auth;
mod commands;
mod defs;
mod mailboxes;

pub use self::defs::{CommandProcessor, Disposition, Outcome};
