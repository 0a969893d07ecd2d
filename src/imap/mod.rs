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

//! The IMAP session engine.

pub mod command;
pub mod command_processor;
pub mod decoder;
pub mod proxy;
pub mod request;
pub mod sasl;
pub mod server;
pub mod session;
pub mod stats;
pub mod syntax;
pub mod tcp;
pub mod transport;

#[cfg(test)]
mod integration_tests;
