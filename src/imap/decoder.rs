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

//! A push-style decoder turning raw client bytes into `RequestUnit`s.
//!
//! The decoder only knows about lines and literals. It has no idea what a
//! command is; that is left to `Request` and the command processor.

use std::str;

use lazy_static::lazy_static;
use regex::bytes::Regex;
use thiserror::Error;

use super::request::{LiteralHeader, RequestUnit};

lazy_static! {
    static ref LITERAL_AT_EOL: Regex =
        Regex::new(r#"~?\{([0-9]+)(\+?)\}$"#).unwrap();
}

/// A framing problem found by the decoder.
///
/// A recoverable error leaves the decoder positioned at the start of the next
/// line, so the connection can carry on. An unrecoverable one means the
/// decoder has lost track of where commands begin.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("{0}")]
    Recoverable(String),
    #[error("{0}")]
    Unrecoverable(String),
}

impl DecodeError {
    pub fn is_recoverable(&self) -> bool {
        matches!(*self, DecodeError::Recoverable(..))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum State {
    Line,
    Literal(u32),
}

#[derive(Debug)]
pub struct Decoder {
    buf: Vec<u8>,
    state: State,
    max_line: usize,
    max_literal: u32,
}

impl Decoder {
    pub fn new(max_line: usize, max_literal: u32) -> Self {
        Decoder {
            buf: Vec::new(),
            state: State::Line,
            max_line,
            max_literal,
        }
    }

    /// Add bytes received from the client.
    pub fn push(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Discard everything buffered and return to the start-of-line state.
    ///
    /// Used after a security upgrade, since anything received before the
    /// handshake completed must not be interpreted afterwards.
    pub fn reset(&mut self) {
        self.buf.clear();
        self.state = State::Line;
    }

    /// Extract the next complete unit, if there is one.
    pub fn next_unit(&mut self) -> Result<Option<RequestUnit>, DecodeError> {
        match self.state {
            State::Literal(len) => {
                let len = len as usize;
                if self.buf.len() < len {
                    return Ok(None);
                }

                let data = self.buf.drain(..len).collect::<Vec<u8>>();
                self.state = State::Line;
                Ok(Some(RequestUnit::Literal(data)))
            }

            State::Line => {
                let eol = match memchr::memchr(b'\n', &self.buf) {
                    Some(eol) => eol,
                    None => {
                        if self.buf.len() > self.max_line {
                            self.buf.clear();
                            return Err(DecodeError::Unrecoverable(
                                "Command line too long".to_owned(),
                            ));
                        }
                        return Ok(None);
                    }
                };

                if eol > self.max_line {
                    self.buf.clear();
                    return Err(DecodeError::Unrecoverable(
                        "Command line too long".to_owned(),
                    ));
                }

                let mut text = self.buf.drain(..=eol).collect::<Vec<u8>>();
                // Drop ending LF
                text.pop();
                // If there's an ending CR, drop that too
                if text.ends_with(b"\r") {
                    text.pop();
                }

                let literal = match check_literal(&text) {
                    None => None,
                    Some(Err(())) => {
                        return Err(DecodeError::Unrecoverable(
                            "Unparsable literal length".to_owned(),
                        ))
                    }
                    Some(Ok(header)) => {
                        if header.len > self.max_literal {
                            // The client won't send a synchronising literal
                            // until we say so, so we can simply refuse it.
                            // A LITERAL+ is already on its way and we have no
                            // intention of buffering it.
                            return Err(if header.synchronising {
                                DecodeError::Recoverable(
                                    "Literal too large".to_owned(),
                                )
                            } else {
                                DecodeError::Unrecoverable(
                                    "Non-synchronising literal too large"
                                        .to_owned(),
                                )
                            });
                        }

                        self.state = State::Literal(header.len);
                        Some(header)
                    }
                };

                Ok(Some(RequestUnit::Line { text, literal }))
            }
        }
    }
}

/// Check whether `line` ends with a literal announcement.
///
/// Returns `Some(Err(()))` if it does but the length is not representable.
fn check_literal(line: &[u8]) -> Option<Result<LiteralHeader, ()>> {
    let captures = LITERAL_AT_EOL.captures(line)?;
    let len = captures.get(1)?;
    let plus = captures.get(2).map_or(false, |m| !m.as_bytes().is_empty());
    Some(
        str::from_utf8(len.as_bytes())
            .ok()
            .and_then(|s| s.parse::<u32>().ok())
            .map(|len| LiteralHeader {
                len,
                synchronising: !plus,
            })
            .ok_or(()),
    )
}
