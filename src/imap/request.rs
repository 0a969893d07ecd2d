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

//! Assembly of decoded units into whole client requests.

use std::borrow::Cow;
use std::str;

use super::syntax::{self as s, Argument, Token};

/// One unit of client input, as produced by the wire decoder.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RequestUnit {
    /// A line of text with its line ending removed.
    ///
    /// If the line ends with a literal announcement, `literal` describes it
    /// and the literal data will be delivered as the next unit.
    Line {
        text: Vec<u8>,
        literal: Option<LiteralHeader>,
    },
    /// The content of a literal previously announced by a `Line`.
    Literal(Vec<u8>),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LiteralHeader {
    pub len: u32,
    /// Whether the client waits for a `+` continuation before sending the
    /// data (i.e., not `LITERAL+`).
    pub synchronising: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum Segment {
    Text(Vec<u8>),
    Literal(Vec<u8>),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Expecting {
    Line,
    Literal(LiteralHeader),
}

/// A client request being accumulated from one or more units.
///
/// Feeding never fails; a request whose framing or syntax is broken is only
/// discovered when it is parsed, so that the dispatcher can classify it.
#[derive(Clone, Debug)]
pub struct Request {
    segments: Vec<Segment>,
    expecting: Expecting,
    complete: bool,
    /// Set when the decoder delivered a unit the framing did not call for.
    misframed: bool,
}

/// A request which has been parsed into its tag, command, and arguments.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParsedCommand {
    pub tag: String,
    /// The command name, upper-cased.
    pub name: String,
    pub args: Vec<Argument>,
}

/// A request that could not be parsed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MalformedRequest {
    /// The tag, if one could be extracted.
    pub tag: Option<String>,
    pub reason: Cow<'static, str>,
}

impl Default for Request {
    fn default() -> Self {
        Request::new()
    }
}

impl Request {
    pub fn new() -> Self {
        Request {
            segments: Vec::new(),
            expecting: Expecting::Line,
            complete: false,
            misframed: false,
        }
    }

    /// Append `unit` to this request.
    ///
    /// Returns whether the request is now complete.
    pub fn feed(&mut self, unit: RequestUnit) -> bool {
        debug_assert!(!self.complete, "fed a request after completion");

        match (self.expecting, unit) {
            (Expecting::Line, RequestUnit::Line { text, literal }) => {
                self.segments.push(Segment::Text(text));
                match literal {
                    Some(header) => self.expecting = Expecting::Literal(header),
                    None => self.complete = true,
                }
            }

            (Expecting::Literal(_), RequestUnit::Literal(data)) => {
                self.segments.push(Segment::Literal(data));
                // The rest of the line after the literal (possibly empty)
                // always follows.
                self.expecting = Expecting::Line;
            }

            (_, RequestUnit::Literal(data)) => {
                self.misframed = true;
                self.segments.push(Segment::Literal(data));
            }

            (Expecting::Literal(_), RequestUnit::Line { text, literal }) => {
                self.misframed = true;
                self.segments.push(Segment::Text(text));
                match literal {
                    Some(header) => self.expecting = Expecting::Literal(header),
                    None => self.complete = true,
                }
            }
        }

        self.complete
    }

    pub fn is_complete(&self) -> bool {
        self.complete
    }

    /// Whether the client is now waiting for a continuation response before
    /// it sends the next literal.
    pub fn awaiting_continuation(&self) -> bool {
        matches!(
            self.expecting,
            Expecting::Literal(LiteralHeader {
                synchronising: true,
                ..
            })
        )
    }

    /// The raw first line, which is all an authentication exchange frame
    /// consists of.
    pub fn frame(&self) -> &[u8] {
        match self.segments.first() {
            Some(Segment::Text(ref text)) => text,
            _ => &[],
        }
    }

    /// Best-effort extraction of the tag, for responding to requests that
    /// cannot be parsed.
    pub fn tag_hint(&self) -> Option<&str> {
        let first = str::from_utf8(self.frame()).ok()?;
        let tag = first.split(' ').next()?;
        if is_valid_tag(tag) {
            Some(tag)
        } else {
            None
        }
    }

    /// Parse this request into a command.
    pub fn parse(&self) -> Result<ParsedCommand, MalformedRequest> {
        let tag = self.tag_hint().map(str::to_owned);
        let malformed = |reason: &'static str| MalformedRequest {
            tag: tag.clone(),
            reason: Cow::Borrowed(reason),
        };

        if !self.complete {
            return Err(malformed("Incomplete command"));
        }

        if self.misframed {
            return Err(malformed("Literal framing violated"));
        }

        let mut stack: Vec<Vec<Argument>> = vec![Vec::new()];
        let mut literal_pending = false;
        for segment in &self.segments {
            match *segment {
                Segment::Text(ref text) => {
                    let text = str::from_utf8(text)
                        .map_err(|_| malformed("Command is not valid UTF-8"))?;
                    let tokens = s::tokenise(text)
                        .ok_or_else(|| malformed("Unrecognised command syntax"))?;
                    let ntokens = tokens.len();
                    for (ix, token) in tokens.into_iter().enumerate() {
                        let arg = match token {
                            Token::Atom(a) => Argument::Atom(a.to_owned()),
                            Token::Quoted(q) => Argument::Quoted(q),
                            Token::Open => {
                                stack.push(Vec::new());
                                continue;
                            }
                            Token::Close => {
                                if stack.len() < 2 {
                                    return Err(malformed(
                                        "Unbalanced parentheses",
                                    ));
                                }
                                Argument::List(stack.pop().unwrap_or_default())
                            }
                            Token::Literal => {
                                if ix + 1 != ntokens {
                                    return Err(malformed(
                                        "Literal marker not at end of line",
                                    ));
                                }
                                literal_pending = true;
                                continue;
                            }
                        };

                        stack
                            .last_mut()
                            .ok_or_else(|| malformed("Unbalanced parentheses"))?
                            .push(arg);
                    }
                }

                Segment::Literal(ref data) => {
                    if !literal_pending {
                        return Err(malformed("Unexpected literal"));
                    }
                    literal_pending = false;
                    stack
                        .last_mut()
                        .ok_or_else(|| malformed("Unbalanced parentheses"))?
                        .push(Argument::Literal(data.clone()));
                }
            }
        }

        if literal_pending || 1 != stack.len() {
            return Err(malformed("Unbalanced parentheses"));
        }

        let mut words = stack.pop().unwrap_or_default().into_iter();
        let tag = match words.next() {
            Some(Argument::Atom(ref t)) if is_valid_tag(t) => t.clone(),
            _ => return Err(malformed("Missing or invalid tag")),
        };
        let name = match words.next() {
            Some(Argument::Atom(n)) => n.to_ascii_uppercase(),
            _ => {
                return Err(MalformedRequest {
                    tag: Some(tag),
                    reason: Cow::Borrowed("Missing command"),
                })
            }
        };

        Ok(ParsedCommand {
            tag,
            name,
            args: words.collect(),
        })
    }
}

fn is_valid_tag(tag: &str) -> bool {
    !tag.is_empty()
        && !tag.contains(|c: char| {
            c.is_control() || matches!(c, '(' | ')' | '{' | '"' | '%' | '*' | '+')
        })
}
