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

//! The integration tests drive a whole connection through `Server`, from
//! decoded bytes to the response lines the client would see, with a real
//! `CommandProcessor` and the in-memory backend behind it.
//!
//! The transport is a fake which records everything written to it, along
//! with every idle timeout, security upgrade, and close request, so the tests
//! can check the exact wire behaviour without any sockets.
//!
//! Each test builds its own harness; nothing is shared between tests.

mod defs;

mod auth;
mod dispatch;
