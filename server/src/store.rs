//
// Copyright 2025-2026 The gomokud Authors. All Rights Reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//

//! User accounts and offline messages
//!
//! Both stores are in-memory and guarded by a [`Mutex`]; the command layer
//! shares them behind an `Arc`. Persistence is not wired up yet, the
//! load/save hooks are stubs.

use crate::types::ConnectionId;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info, warn};

/// Rating awarded for a win and forfeited for a loss
const RATING_DELTA: u32 = 15;

/// Ratings never drop below this
const RATING_FLOOR: u32 = 1000;

/// Rating assigned to new accounts and guests
const DEFAULT_RATING: u32 = 1500;

/// A registered player account
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    /// Account name, unique across the store
    pub username: String,
    /// Account password
    pub password: String,
    /// Free-form profile text shown to other players
    pub info: String,
    /// Game rating
    pub rating: u32,
    /// Games won
    pub wins: u32,
    /// Games lost
    pub losses: u32,
    /// Suppresses shouts and broadcasts when set
    pub quiet: bool,
    /// Users this account refuses tells from
    pub blocked: HashSet<String>,
    /// Guest accounts are discarded on logout
    pub guest: bool,
    /// Game this user is seated at, if any
    pub playing: Option<u64>,
    /// Game this user is watching, if any
    pub observing: Option<u64>,
}

impl User {
    fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            info: String::new(),
            rating: DEFAULT_RATING,
            wins: 0,
            losses: 0,
            quiet: false,
            blocked: HashSet::new(),
            guest: false,
            playing: None,
            observing: None,
        }
    }
}

/// In-memory account store with an online-session map
#[derive(Debug, Default)]
pub struct UserStore {
    inner: Mutex<UserStoreInner>,
}

#[derive(Debug, Default)]
struct UserStoreInner {
    /// Accounts by username
    users: HashMap<String, User>,
    /// Connection to logged-in username
    online: HashMap<ConnectionId, String>,
    /// Counter for unique guest names
    next_guest: u64,
}

impl UserStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an account. Fails if the name is taken.
    pub fn register(&self, username: &str, password: &str) -> Result<(), String> {
        let mut inner = self.lock();
        if inner.users.contains_key(username) {
            return Err(format!("username '{username}' is already taken"));
        }
        inner
            .users
            .insert(username.to_owned(), User::new(username, password));
        info!(%username, "registered account");
        Ok(())
    }

    /// Log a connection in as an existing account.
    ///
    /// Fails on unknown name, wrong password, or if the account already has
    /// an active session.
    pub fn login(
        &self,
        id: ConnectionId,
        username: &str,
        password: &str,
    ) -> Result<(), String> {
        let mut inner = self.lock();
        let Some(user) = inner.users.get(username) else {
            return Err(format!("no such user '{username}'"));
        };
        if user.password != password {
            return Err("incorrect password".to_owned());
        }
        if inner.online.values().any(|name| name == username) {
            return Err(format!("'{username}' is already logged in"));
        }
        inner.online.insert(id, username.to_owned());
        info!(%id, %username, "logged in");
        Ok(())
    }

    /// Log a connection in as a fresh guest account.
    ///
    /// Guest accounts have a generated name and are removed on logout.
    pub fn login_guest(&self, id: ConnectionId) -> String {
        let mut inner = self.lock();
        inner.next_guest += 1;
        let username = format!("guest{}", inner.next_guest);
        let mut user = User::new(&username, "");
        user.guest = true;
        inner.users.insert(username.clone(), user);
        inner.online.insert(id, username.clone());
        info!(%id, %username, "guest logged in");
        username
    }

    /// End a connection's session. Guest accounts are discarded.
    pub fn logout(&self, id: ConnectionId) {
        let mut inner = self.lock();
        let Some(username) = inner.online.remove(&id) else {
            return;
        };
        let is_guest = inner.users.get(&username).is_some_and(|u| u.guest);
        if is_guest {
            inner.users.remove(&username);
        }
        debug!(%id, %username, "logged out");
    }

    /// Username for a connection's session, if logged in
    pub fn username_for(&self, id: ConnectionId) -> Option<String> {
        self.lock().online.get(&id).cloned()
    }

    /// Look up an account by name
    pub fn get(&self, username: &str) -> Option<User> {
        self.lock().users.get(username).cloned()
    }

    /// Mutate an account in place under the store lock.
    ///
    /// Returns `None` if the account does not exist.
    pub fn with_user<T>(&self, username: &str, f: impl FnOnce(&mut User) -> T) -> Option<T> {
        self.lock().users.get_mut(username).map(f)
    }

    /// Record a won game: +15 rating
    pub fn record_win(&self, username: &str) {
        let mut inner = self.lock();
        if let Some(user) = inner.users.get_mut(username) {
            user.wins += 1;
            user.rating += RATING_DELTA;
        }
    }

    /// Record a lost game: -15 rating, floored at 1000
    pub fn record_loss(&self, username: &str) {
        let mut inner = self.lock();
        if let Some(user) = inner.users.get_mut(username) {
            user.losses += 1;
            user.rating = user.rating.saturating_sub(RATING_DELTA).max(RATING_FLOOR);
        }
    }

    /// Block tells from another user
    pub fn block(&self, username: &str, target: &str) {
        let mut inner = self.lock();
        if let Some(user) = inner.users.get_mut(username) {
            user.blocked.insert(target.to_owned());
        }
    }

    /// Unblock a previously blocked user
    pub fn unblock(&self, username: &str, target: &str) {
        let mut inner = self.lock();
        if let Some(user) = inner.users.get_mut(username) {
            user.blocked.remove(target);
        }
    }

    /// Check whether `username` blocks `sender`
    pub fn is_blocked(&self, username: &str, sender: &str) -> bool {
        self.lock()
            .users
            .get(username)
            .is_some_and(|u| u.blocked.contains(sender))
    }

    /// Toggle quiet mode for an account
    pub fn set_quiet(&self, username: &str, quiet: bool) {
        let mut inner = self.lock();
        if let Some(user) = inner.users.get_mut(username) {
            user.quiet = quiet;
        }
    }

    /// Usernames with an active session
    pub fn online_users(&self) -> Vec<String> {
        self.lock().online.values().cloned().collect()
    }

    /// Number of registered accounts
    pub fn user_count(&self) -> usize {
        self.lock().users.len()
    }

    // TODO: load accounts from disk at startup once a storage format is
    // chosen.
    pub fn load(&self) {
        warn!("account persistence not implemented, starting empty");
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, UserStoreInner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// A stored message awaiting its recipient
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Identifier within the recipient's mailbox
    pub id: u64,
    /// Sending username
    pub sender: String,
    /// Recipient username
    pub recipient: String,
    /// Message title
    pub title: String,
    /// Message body
    pub body: String,
    /// Unix timestamp at send time
    pub sent_at: u64,
    /// Cleared once the recipient reads the message
    pub unread: bool,
}

impl Message {
    /// One-line mailbox listing entry
    pub fn header(&self) -> String {
        let marker = if self.unread { " [NEW]" } else { "" };
        format!(
            "{}.{} From: {}, Title: {}, Date: {}",
            self.id,
            marker,
            self.sender,
            self.title,
            format_timestamp(self.sent_at)
        )
    }
}

/// Render a unix timestamp as `YYYY-MM-DD HH:MM:SS` in UTC.
fn format_timestamp(secs: u64) -> String {
    let days = (secs / 86_400) as i64;
    let rem = secs % 86_400;
    let (hour, min, sec) = (rem / 3_600, (rem % 3_600) / 60, rem % 60);

    // Days-to-civil conversion over 400-year eras (the Gregorian cycle)
    let z = days + 719_468;
    let era = z.div_euclid(146_097);
    let doe = z.rem_euclid(146_097);
    let yoe = (doe - doe / 1_460 + doe / 36_524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = doy - (153 * mp + 2) / 5 + 1;
    let month = if mp < 10 { mp + 3 } else { mp - 9 };
    let year = yoe + era * 400 + i64::from(month <= 2);

    format!("{year:04}-{month:02}-{day:02} {hour:02}:{min:02}:{sec:02}")
}

/// In-memory offline-message store, one mailbox per recipient
#[derive(Debug, Default)]
pub struct MessageStore {
    inner: Mutex<MessageStoreInner>,
}

#[derive(Debug, Default)]
struct MessageStoreInner {
    /// Mailboxes keyed by recipient username
    mailboxes: HashMap<String, Vec<Message>>,
    next_id: u64,
}

impl MessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a message for `recipient`, returning its id
    pub fn send_message(&self, sender: &str, recipient: &str, title: &str, body: &str) -> u64 {
        let mut inner = self.lock();
        inner.next_id += 1;
        let id = inner.next_id;
        let message = Message {
            id,
            sender: sender.to_owned(),
            recipient: recipient.to_owned(),
            title: title.to_owned(),
            body: body.to_owned(),
            sent_at: unix_now(),
            unread: true,
        };
        inner
            .mailboxes
            .entry(recipient.to_owned())
            .or_default()
            .push(message);
        debug!(%sender, %recipient, id, "message stored");
        id
    }

    /// All messages in a recipient's mailbox, oldest first
    pub fn messages_for(&self, recipient: &str) -> Vec<Message> {
        self.lock()
            .mailboxes
            .get(recipient)
            .cloned()
            .unwrap_or_default()
    }

    /// Fetch a single message by id
    pub fn get_message(&self, recipient: &str, id: u64) -> Option<Message> {
        self.lock()
            .mailboxes
            .get(recipient)
            .and_then(|mailbox| mailbox.iter().find(|m| m.id == id).cloned())
    }

    /// Clear the unread flag on a message
    pub fn mark_read(&self, recipient: &str, id: u64) {
        let mut inner = self.lock();
        if let Some(mailbox) = inner.mailboxes.get_mut(recipient) {
            if let Some(message) = mailbox.iter_mut().find(|m| m.id == id) {
                message.unread = false;
            }
        }
    }

    /// Delete a message from a mailbox. Returns whether anything was removed.
    pub fn delete_message(&self, recipient: &str, id: u64) -> bool {
        let mut inner = self.lock();
        match inner.mailboxes.get_mut(recipient) {
            Some(mailbox) => {
                let before = mailbox.len();
                mailbox.retain(|m| m.id != id);
                mailbox.len() != before
            }
            None => false,
        }
    }

    /// Number of unread messages for a recipient
    pub fn unread_count(&self, recipient: &str) -> usize {
        self.lock()
            .mailboxes
            .get(recipient)
            .map(|mailbox| mailbox.iter().filter(|m| m.unread).count())
            .unwrap_or(0)
    }

    // TODO: persist mailboxes alongside accounts once storage lands.
    pub fn load(&self) {
        warn!("message persistence not implemented, starting empty");
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MessageStoreInner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
