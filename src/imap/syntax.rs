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

//! The small slice of IMAP syntax the session engine needs to understand:
//! command arguments on the way in and status responses on the way out.
//!
//! Everything beyond that (FETCH attributes, search keys, ...) is opaque to
//! the engine and is handed to the backend as a tree of `Argument`s.

use std::borrow::Cow;
use std::fmt;
use std::io::{self, Write};
use std::str;

use nom::{
    branch::alt,
    bytes::complete::take_while1,
    character::complete::{char, digit1, space0},
    combinator::{map, opt, recognize},
    multi::many0,
    sequence::{preceded, tuple},
    IResult,
};

/// A single argument of a client command.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Argument {
    Atom(String),
    Quoted(String),
    Literal(Vec<u8>),
    List(Vec<Argument>),
}

impl Argument {
    /// Interpret this argument as an IMAP `astring`.
    pub fn as_astring(&self) -> Option<Cow<'_, str>> {
        match *self {
            Argument::Atom(ref s) | Argument::Quoted(ref s) => {
                Some(Cow::Borrowed(s))
            }
            Argument::Literal(ref data) => {
                str::from_utf8(data).ok().map(Cow::Borrowed)
            }
            Argument::List(_) => None,
        }
    }

    /// Interpret this argument as a bare atom.
    pub fn as_atom(&self) -> Option<&str> {
        match *self {
            Argument::Atom(ref s) => Some(s),
            _ => None,
        }
    }
}

/// One lexical token of a command line segment.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum Token<'a> {
    Atom(&'a str),
    Quoted(String),
    Open,
    Close,
    /// A `{n}`, `{n+}` or `~{n}` literal marker. The literal data itself is
    /// carried separately by the request.
    Literal,
}

fn is_atom_char(c: char) -> bool {
    !c.is_control() && !matches!(c, ' ' | '(' | ')' | '{' | '"')
}

fn atom(i: &str) -> IResult<&str, &str> {
    take_while1(is_atom_char)(i)
}

fn quoted(i: &str) -> IResult<&str, String> {
    let (mut rest, _) = char('"')(i)?;
    let mut out = String::new();
    loop {
        let mut chars = rest.chars();
        match chars.next() {
            Some('"') => return Ok((chars.as_str(), out)),
            Some('\\') => match chars.next() {
                Some(c @ '"') | Some(c @ '\\') => {
                    out.push(c);
                    rest = chars.as_str();
                }
                _ => {
                    return Err(nom::Err::Error((
                        rest,
                        nom::error::ErrorKind::Escaped,
                    )))
                }
            },
            Some('\r') | Some('\n') | None => {
                return Err(nom::Err::Error((
                    rest,
                    nom::error::ErrorKind::Char,
                )))
            }
            Some(c) => {
                out.push(c);
                rest = chars.as_str();
            }
        }
    }
}

fn literal_marker(i: &str) -> IResult<&str, &str> {
    recognize(tuple((
        opt(char('~')),
        char('{'),
        digit1,
        opt(char('+')),
        char('}'),
    )))(i)
}

fn token(i: &str) -> IResult<&str, Token<'_>> {
    alt((
        map(char('('), |_| Token::Open),
        map(char(')'), |_| Token::Close),
        map(quoted, Token::Quoted),
        map(literal_marker, |_| Token::Literal),
        map(atom, Token::Atom),
    ))(i)
}

/// Split one text segment of a command into tokens.
///
/// Returns `None` if the segment contains anything that does not lex.
pub(crate) fn tokenise(segment: &str) -> Option<Vec<Token<'_>>> {
    let (rest, tokens) = many0(preceded(space0, token))(segment).ok()?;
    let (rest, _) = space0::<_, (&str, nom::error::ErrorKind)>(rest).ok()?;
    if rest.is_empty() {
        Some(tokens)
    } else {
        None
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RespCondType {
    Ok,
    No,
    Bad,
    Bye,
    Preauth,
}

impl fmt::Display for RespCondType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match *self {
            RespCondType::Ok => "OK",
            RespCondType::No => "NO",
            RespCondType::Bad => "BAD",
            RespCondType::Bye => "BYE",
            RespCondType::Preauth => "PREAUTH",
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RespTextCode {
    Alert,
    AuthenticationFailed,
    Cannot,
    Capability(Vec<String>),
    ClientBug,
    ContactAdmin,
    Nonexistent,
    Parse,
    PrivacyRequired,
    ReadOnly,
    ReadWrite,
    ServerBug,
    Unavailable,
    /// A response code supplied verbatim by a backend or remote node.
    Other(String),
}

impl fmt::Display for RespTextCode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            RespTextCode::Alert => f.write_str("ALERT"),
            RespTextCode::AuthenticationFailed => {
                f.write_str("AUTHENTICATIONFAILED")
            }
            RespTextCode::Cannot => f.write_str("CANNOT"),
            RespTextCode::Capability(ref caps) => {
                write!(f, "CAPABILITY {}", caps.join(" "))
            }
            RespTextCode::ClientBug => f.write_str("CLIENTBUG"),
            RespTextCode::ContactAdmin => f.write_str("CONTACTADMIN"),
            RespTextCode::Nonexistent => f.write_str("NONEXISTENT"),
            RespTextCode::Parse => f.write_str("PARSE"),
            RespTextCode::PrivacyRequired => f.write_str("PRIVACYREQUIRED"),
            RespTextCode::ReadOnly => f.write_str("READ-ONLY"),
            RespTextCode::ReadWrite => f.write_str("READ-WRITE"),
            RespTextCode::ServerBug => f.write_str("SERVERBUG"),
            RespTextCode::Unavailable => f.write_str("UNAVAILABLE"),
            RespTextCode::Other(ref s) => f.write_str(s),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CondResponse<'a> {
    pub cond: RespCondType,
    pub code: Option<RespTextCode>,
    pub quip: Option<Cow<'a, str>>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Response<'a> {
    Cond(CondResponse<'a>),
    /// Untagged response data, already formatted (e.g. `LIST () "/" INBOX`).
    Data(Cow<'a, str>),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResponseLine<'a> {
    /// The tag, or `None` for an untagged (`*`) response.
    pub tag: Option<Cow<'a, str>>,
    pub response: Response<'a>,
}

impl<'a> Response<'a> {
    pub fn cond(
        cond: RespCondType,
        code: Option<RespTextCode>,
        quip: impl Into<Cow<'a, str>>,
    ) -> Self {
        Response::Cond(CondResponse {
            cond,
            code,
            quip: Some(quip.into()),
        })
    }

    pub fn is_bye(&self) -> bool {
        matches!(
            *self,
            Response::Cond(CondResponse {
                cond: RespCondType::Bye,
                ..
            })
        )
    }
}

impl fmt::Display for ResponseLine<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.tag.as_deref().unwrap_or("*"))?;
        match self.response {
            Response::Cond(ref cr) => {
                write!(f, " {}", cr.cond)?;
                if let Some(ref code) = cr.code {
                    write!(f, " [{}]", code)?;
                }
                if let Some(ref quip) = cr.quip {
                    write!(f, " {}", sanitise_text(quip))?;
                }
            }
            Response::Data(ref data) => write!(f, " {}", data)?,
        }
        Ok(())
    }
}

impl ResponseLine<'_> {
    pub fn write_to(&self, w: &mut impl Write) -> io::Result<()> {
        write!(w, "{}\r\n", self)
    }
}

/// Response text is free-form but must never contain a line break, since that
/// would let a backend (or a client echoing input back) inject responses.
fn sanitise_text(s: &str) -> Cow<'_, str> {
    if s.contains(|c| c == '\r' || c == '\n') {
        Cow::Owned(s.replace(|c| c == '\r' || c == '\n', " "))
    } else {
        Cow::Borrowed(s)
    }
}
