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

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::prelude::*;
use log::info;
use secstr::SecStr;

use super::model::*;
use crate::imap::syntax::Argument;
use crate::support::error::Error;
use crate::support::system_config::SystemConfig;

/// An account directory and mailbox store held entirely in memory.
///
/// Messages have no content model beyond their flags; this exists so the
/// session engine has something real to talk to.
#[derive(Clone, Default)]
pub struct MemoryBackend {
    shared: Arc<Mutex<Directory>>,
}

#[derive(Default)]
struct Directory {
    accounts: BTreeMap<String, AccountData>,
}

struct AccountData {
    password: SecStr,
    status: AccountStatus,
    mailboxes: BTreeMap<String, MailboxData>,
    /// Mailbox name -> owning node.
    remote: BTreeMap<String, String>,
    subscriptions: BTreeSet<String>,
}

#[derive(Default)]
struct MailboxData {
    messages: Vec<Message>,
    uid_next: u32,
    last_access: Option<DateTime<Utc>>,
}

struct Message {
    uid: u32,
    flags: BTreeSet<String>,
    size: usize,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &SystemConfig) -> Result<Self, Error> {
        let backend = MemoryBackend::new();
        for account in &config.accounts {
            let status = AccountStatus::parse(&account.status).ok_or_else(
                || {
                    Error::Config(format!(
                        "unknown account status '{}'",
                        account.status
                    ))
                },
            )?;
            backend.add_account(&account.name, &account.password);
            backend.set_status(&account.name, status)?;
            for mailbox in &account.mailboxes {
                backend.create_mailbox(&account.name, mailbox)?;
            }
        }

        for remote in &config.remote_mailboxes {
            backend.add_remote_mailbox(
                &remote.account,
                &remote.mailbox,
                &remote.node,
            )?;
        }

        Ok(backend)
    }

    pub fn add_account(&self, user: &str, password: &str) {
        self.lock().accounts.insert(
            user.to_owned(),
            AccountData {
                password: SecStr::from(password),
                status: AccountStatus::Active,
                mailboxes: BTreeMap::new(),
                remote: BTreeMap::new(),
                subscriptions: BTreeSet::new(),
            },
        );
    }

    pub fn set_status(
        &self,
        user: &str,
        status: AccountStatus,
    ) -> Result<(), Error> {
        let mut dir = self.lock();
        let account = dir.accounts.get_mut(user).ok_or(Error::NxAccount)?;
        if account.status != status {
            info!("account '{}' is now {}", user, status);
        }
        account.status = status;
        Ok(())
    }

    pub fn create_mailbox(&self, user: &str, mailbox: &str) -> Result<(), Error> {
        let mut dir = self.lock();
        let account = dir.accounts.get_mut(user).ok_or(Error::NxAccount)?;
        create_mailbox(account, mailbox)
    }

    pub fn add_remote_mailbox(
        &self,
        user: &str,
        mailbox: &str,
        node: &str,
    ) -> Result<(), Error> {
        let mut dir = self.lock();
        let account = dir.accounts.get_mut(user).ok_or(Error::NxAccount)?;
        if account.mailboxes.contains_key(mailbox) {
            return Err(Error::MailboxExists);
        }
        account
            .remote
            .insert(canonical_name(mailbox), node.to_owned());
        Ok(())
    }

    /// Add a message with the given flags to a local mailbox.
    pub fn deliver(
        &self,
        user: &str,
        mailbox: &str,
        flags: &[&str],
        size: usize,
    ) -> Result<u32, Error> {
        let mut dir = self.lock();
        let account = dir.accounts.get_mut(user).ok_or(Error::NxAccount)?;
        let mb = account
            .mailboxes
            .get_mut(&canonical_name(mailbox))
            .ok_or(Error::NxMailbox)?;
        Ok(append(mb, flags.iter().map(|&f| f.to_owned()).collect(), size))
    }

    pub fn last_access(
        &self,
        user: &str,
        mailbox: &str,
    ) -> Option<DateTime<Utc>> {
        self.lock()
            .accounts
            .get(user)?
            .mailboxes
            .get(&canonical_name(mailbox))?
            .last_access
    }

    fn lock(&self) -> MutexGuard<'_, Directory> {
        match self.shared.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl Backend for MemoryBackend {
    fn authenticate(
        &self,
        user: &str,
        password: &SecStr,
    ) -> Result<Credentials, Error> {
        let dir = self.lock();
        match dir.accounts.get(user) {
            // SecStr compares in constant time.
            Some(account) if account.password == *password => {
                Ok(Credentials::new(user.to_owned()))
            }
            _ => Err(Error::AuthenticationFailed),
        }
    }

    fn account_status(&self, credentials: &Credentials) -> AccountStatus {
        self.lock()
            .accounts
            .get(credentials.user())
            .map_or(AccountStatus::Closed, |a| a.status)
    }

    fn locate_mailbox(
        &self,
        credentials: &Credentials,
        mailbox: &str,
    ) -> Result<MailboxLocation, Error> {
        let dir = self.lock();
        let account = dir
            .accounts
            .get(credentials.user())
            .ok_or(Error::NxAccount)?;
        let name = canonical_name(mailbox);
        Ok(if account.mailboxes.contains_key(&name) {
            MailboxLocation::Local
        } else if let Some(node) = account.remote.get(&name) {
            MailboxLocation::Remote { node: node.clone() }
        } else {
            MailboxLocation::Nonexistent
        })
    }

    fn select(
        &self,
        credentials: &Credentials,
        mailbox: &str,
        read_only: bool,
    ) -> Result<(Box<dyn MailboxSession>, BackendReply), Error> {
        let name = canonical_name(mailbox);
        let reply = {
            let mut dir = self.lock();
            let account = dir
                .accounts
                .get_mut(credentials.user())
                .ok_or(Error::NxAccount)?;
            let mb = account.mailboxes.get_mut(&name).ok_or(Error::NxMailbox)?;
            mb.last_access = Some(Utc::now());

            BackendReply::ok(if read_only {
                "EXAMINE completed"
            } else {
                "SELECT completed"
            })
            .with_untagged(
                r"FLAGS (\Answered \Flagged \Deleted \Seen \Draft)",
            )
            .with_untagged(format!("{} EXISTS", mb.messages.len()))
            .with_untagged(format!("OK [UIDNEXT {}] Predicted next UID", mb.uid_next))
            .with_code(if read_only { "READ-ONLY" } else { "READ-WRITE" })
        };

        Ok((
            Box::new(MemoryMailboxSession {
                backend: self.clone(),
                user: credentials.user().to_owned(),
                name,
                read_only,
            }),
            reply,
        ))
    }

    fn execute(
        &self,
        credentials: &Credentials,
        command: &str,
        args: &[Argument],
    ) -> Result<BackendReply, Error> {
        let mut dir = self.lock();
        let account = dir
            .accounts
            .get_mut(credentials.user())
            .ok_or(Error::NxAccount)?;

        match command {
            "LIST" | "LSUB" => {
                let subscribed_only = "LSUB" == command;
                let mut reply = BackendReply::ok(format!("{} completed", command));
                let names = account
                    .mailboxes
                    .keys()
                    .chain(account.remote.keys())
                    .collect::<BTreeSet<_>>();
                for name in names {
                    if subscribed_only && !account.subscriptions.contains(name) {
                        continue;
                    }
                    reply = reply.with_untagged(format!(
                        "{} () \"/\" \"{}\"",
                        command, name
                    ));
                }
                Ok(reply)
            }

            "CREATE" => {
                create_mailbox(account, &mailbox_arg(args, 0)?)?;
                Ok(BackendReply::ok("CREATE completed"))
            }

            "DELETE" => {
                let name = canonical_name(&mailbox_arg(args, 0)?);
                if "INBOX" == name {
                    return Ok(BackendReply::no("INBOX cannot be deleted")
                        .with_code("CANNOT"));
                }
                account.mailboxes.remove(&name).ok_or(Error::NxMailbox)?;
                account.subscriptions.remove(&name);
                Ok(BackendReply::ok("DELETE completed"))
            }

            "RENAME" => {
                let from = canonical_name(&mailbox_arg(args, 0)?);
                let to = canonical_name(&mailbox_arg(args, 1)?);
                if account.mailboxes.contains_key(&to)
                    || account.remote.contains_key(&to)
                {
                    return Err(Error::MailboxExists);
                }
                let data =
                    account.mailboxes.remove(&from).ok_or(Error::NxMailbox)?;
                account.mailboxes.insert(to, data);
                Ok(BackendReply::ok("RENAME completed"))
            }

            "SUBSCRIBE" => {
                account
                    .subscriptions
                    .insert(canonical_name(&mailbox_arg(args, 0)?));
                Ok(BackendReply::ok("SUBSCRIBE completed"))
            }

            "UNSUBSCRIBE" => {
                account
                    .subscriptions
                    .remove(&canonical_name(&mailbox_arg(args, 0)?));
                Ok(BackendReply::ok("UNSUBSCRIBE completed"))
            }

            "STATUS" => {
                let name = canonical_name(&mailbox_arg(args, 0)?);
                let mb = account.mailboxes.get(&name).ok_or(Error::NxMailbox)?;
                let unseen = mb
                    .messages
                    .iter()
                    .filter(|m| !m.flags.contains("\\Seen"))
                    .count();
                Ok(BackendReply::ok("STATUS completed").with_untagged(
                    format!(
                        "STATUS \"{}\" (MESSAGES {} UIDNEXT {} UNSEEN {})",
                        name,
                        mb.messages.len(),
                        mb.uid_next,
                        unseen
                    ),
                ))
            }

            "APPEND" => {
                let name = canonical_name(&mailbox_arg(args, 0)?);
                let mb =
                    account.mailboxes.get_mut(&name).ok_or(Error::NxMailbox)?;
                let flags = match args.get(1) {
                    Some(Argument::List(ref flags)) => flags
                        .iter()
                        .filter_map(Argument::as_atom)
                        .map(str::to_owned)
                        .collect(),
                    _ => BTreeSet::new(),
                };
                let size = match args.last() {
                    Some(Argument::Literal(ref data)) => data.len(),
                    _ => {
                        return Err(Error::BadArguments(
                            "APPEND requires a message literal".to_owned(),
                        ))
                    }
                };
                let uid = append(mb, flags, size);
                Ok(BackendReply::ok("APPEND completed")
                    .with_code(format!("APPENDUID 1 {}", uid)))
            }

            _ => Err(Error::Unsupported(command.to_owned())),
        }
    }
}

struct MemoryMailboxSession {
    backend: MemoryBackend,
    user: String,
    name: String,
    read_only: bool,
}

impl MemoryMailboxSession {
    fn with_mailbox<R>(
        &self,
        f: impl FnOnce(&mut MailboxData) -> R,
    ) -> Result<R, Error> {
        let mut dir = self.backend.lock();
        let mb = dir
            .accounts
            .get_mut(&self.user)
            .and_then(|a| a.mailboxes.get_mut(&self.name))
            .ok_or(Error::NxMailbox)?;
        Ok(f(mb))
    }
}

impl MailboxSession for MemoryMailboxSession {
    fn name(&self) -> &str {
        &self.name
    }

    fn read_only(&self) -> bool {
        self.read_only
    }

    fn refresh_access_time(&mut self) {
        // The mailbox may have been deleted underneath us; the next command
        // that actually needs it will notice.
        let _ = self.with_mailbox(|mb| mb.last_access = Some(Utc::now()));
    }

    fn execute(
        &mut self,
        command: &str,
        args: &[Argument],
    ) -> Result<BackendReply, Error> {
        match command {
            "SEARCH" => {
                if args.is_empty() {
                    return Err(Error::BadArguments(
                        "SEARCH requires search keys".to_owned(),
                    ));
                }
                match args.first().and_then(Argument::as_atom) {
                    Some(key) if key.eq_ignore_ascii_case("ALL") => (),
                    _ => {
                        return Ok(BackendReply::no(
                            "Only SEARCH ALL is supported",
                        )
                        .with_code("CANNOT"))
                    }
                }

                let count = self.with_mailbox(|mb| mb.messages.len())?;
                let mut data = "SEARCH".to_owned();
                for seqnum in 1..=count {
                    data.push_str(&format!(" {}", seqnum));
                }
                Ok(BackendReply::ok("SEARCH completed").with_untagged(data))
            }

            "EXPUNGE" => {
                if self.read_only {
                    return Err(Error::MailboxReadOnly);
                }

                let expunged = self.with_mailbox(expunge)?;
                let mut reply = BackendReply::ok("EXPUNGE completed");
                for seqnum in expunged {
                    reply = reply.with_untagged(format!("{} EXPUNGE", seqnum));
                }
                Ok(reply)
            }

            "FETCH" => {
                if args.len() < 2 {
                    return Err(Error::BadArguments(
                        "FETCH takes a sequence set and data items".to_owned(),
                    ));
                }

                let sizes = self.with_mailbox(|mb| {
                    mb.messages
                        .iter()
                        .map(|m| (m.uid, m.size, m.flags.clone()))
                        .collect::<Vec<_>>()
                })?;
                // Only the sequence set "1:*" with FLAGS is understood here.
                match (args.get(0).and_then(Argument::as_atom), args.get(1)) {
                    (Some("1:*"), Some(Argument::Atom(ref item)))
                        if item.eq_ignore_ascii_case("FLAGS") => {}
                    _ => {
                        return Ok(BackendReply::no("Unsupported FETCH")
                            .with_code("CANNOT"))
                    }
                }

                let mut reply = BackendReply::ok("FETCH completed");
                for (ix, (uid, _, flags)) in sizes.into_iter().enumerate() {
                    reply = reply.with_untagged(format!(
                        "{} FETCH (UID {} FLAGS ({}))",
                        ix + 1,
                        uid,
                        flags.into_iter().collect::<Vec<_>>().join(" ")
                    ));
                }
                Ok(reply)
            }

            _ => Err(Error::Unsupported(command.to_owned())),
        }
    }

    fn deselect(&mut self, expunge_deleted: bool) -> Result<(), Error> {
        if expunge_deleted && !self.read_only {
            self.with_mailbox(expunge)?;
        }
        Ok(())
    }
}

fn canonical_name(name: &str) -> String {
    if name.eq_ignore_ascii_case("INBOX") {
        "INBOX".to_owned()
    } else {
        name.to_owned()
    }
}

fn mailbox_arg(args: &[Argument], ix: usize) -> Result<String, Error> {
    args.get(ix)
        .and_then(Argument::as_astring)
        .map(|s| s.into_owned())
        .ok_or_else(|| {
            Error::BadArguments("Missing or invalid mailbox name".to_owned())
        })
}

fn create_mailbox(account: &mut AccountData, mailbox: &str) -> Result<(), Error> {
    let name = canonical_name(mailbox);
    if account.mailboxes.contains_key(&name) || account.remote.contains_key(&name)
    {
        return Err(Error::MailboxExists);
    }
    account.mailboxes.insert(
        name,
        MailboxData {
            uid_next: 1,
            ..MailboxData::default()
        },
    );
    Ok(())
}

fn append(mb: &mut MailboxData, flags: BTreeSet<String>, size: usize) -> u32 {
    let uid = mb.uid_next;
    mb.uid_next += 1;
    mb.messages.push(Message { uid, flags, size });
    uid
}

/// Remove `\Deleted` messages, returning the sequence numbers to report in
/// the order they must be sent.
fn expunge(mb: &mut MailboxData) -> Vec<usize> {
    let mut expunged = Vec::new();
    let mut seqnum = 1;
    mb.messages.retain(|m| {
        if m.flags.contains("\\Deleted") {
            // Each EXPUNGE response renumbers the following messages, so the
            // same sequence number is reported repeatedly for adjacent
            // messages.
            expunged.push(seqnum);
            false
        } else {
            seqnum += 1;
            true
        }
    });
    expunged
}
