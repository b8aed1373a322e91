//! User directory backed by `users.txt`
//!
//! One user per line, space separated:
//! `username chatId firstName lastName city isAdmin`. Lines written before
//! usernames were recorded have five fields and are still accepted.
//! The file is re-read on every lookup and rewritten wholesale on every
//! mutation, under the shared file-region lock.

use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::models::UserAccount;
use crate::storage::{read_lines, write_lines, FileRegion};

/// Directory file name under the data directory
pub const USERS_FILE: &str = "users.txt";

#[derive(Clone)]
pub struct UserDirectory {
    path: PathBuf,
    region: FileRegion,
}

impl UserDirectory {
    pub fn new(path: impl Into<PathBuf>, region: FileRegion) -> Self {
        Self {
            path: path.into(),
            region,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All parseable users; malformed lines are logged and skipped
    pub fn list(&self) -> Result<Vec<UserAccount>> {
        let _guard = self.region.lock();
        self.load_unlocked()
    }

    pub fn find_by_chat(&self, chat_id: i64) -> Result<Option<UserAccount>> {
        Ok(self.list()?.into_iter().find(|u| u.chat_id == chat_id))
    }

    pub fn find_by_username(&self, username: &str) -> Result<Option<UserAccount>> {
        Ok(self
            .list()?
            .into_iter()
            .find(|u| u.username.as_deref() == Some(username)))
    }

    /// Users registered in `city`
    pub fn in_city(&self, city: &str) -> Result<Vec<UserAccount>> {
        Ok(self
            .list()?
            .into_iter()
            .filter(|u| u.city == city)
            .collect())
    }

    /// Add a user, or replace the entry with the same chat id
    ///
    /// An existing admin flag is preserved when replacing.
    pub fn upsert(&self, user: UserAccount) -> Result<UserAccount> {
        self.mutate(|users| {
            let stored = match users.iter_mut().find(|u| u.chat_id == user.chat_id) {
                Some(existing) => {
                    let is_admin = existing.is_admin || user.is_admin;
                    *existing = UserAccount { is_admin, ..user };
                    existing.clone()
                }
                None => {
                    users.push(user.clone());
                    user
                }
            };
            Ok(stored)
        })
        .inspect(|u| info!(chat_id = u.chat_id, city = %u.city, "User registered"))
    }

    /// Remove a user; returns the removed entry
    pub fn remove(&self, chat_id: i64) -> Result<UserAccount> {
        self.mutate(|users| {
            let index = users
                .iter()
                .position(|u| u.chat_id == chat_id)
                .ok_or(Error::NotRegistered(chat_id))?;
            Ok(users.remove(index))
        })
        .inspect(|u| info!(chat_id = u.chat_id, "User removed"))
    }

    /// Set the admin flag of a user
    pub fn set_admin(&self, chat_id: i64, is_admin: bool) -> Result<UserAccount> {
        self.mutate(|users| {
            let user = users
                .iter_mut()
                .find(|u| u.chat_id == chat_id)
                .ok_or(Error::NotRegistered(chat_id))?;
            user.is_admin = is_admin;
            Ok(user.clone())
        })
    }

    /// Move a user's entry to a new chat id, e.g. after the account was
    /// re-added from another device
    pub fn rebind_chat(&self, old_chat_id: i64, new_chat_id: i64) -> Result<UserAccount> {
        self.mutate(|users| {
            if users.iter().any(|u| u.chat_id == new_chat_id) {
                return Err(Error::InvalidData(format!(
                    "chat id {} is already registered",
                    new_chat_id
                )));
            }
            let user = users
                .iter_mut()
                .find(|u| u.chat_id == old_chat_id)
                .ok_or(Error::NotRegistered(old_chat_id))?;
            user.chat_id = new_chat_id;
            Ok(user.clone())
        })
        .inspect(|u| info!(from = old_chat_id, to = u.chat_id, "User chat id updated"))
    }

    /// Flip the admin flag of a user
    pub fn toggle_admin(&self, chat_id: i64) -> Result<UserAccount> {
        self.mutate(|users| {
            let user = users
                .iter_mut()
                .find(|u| u.chat_id == chat_id)
                .ok_or(Error::NotRegistered(chat_id))?;
            user.is_admin = !user.is_admin;
            Ok(user.clone())
        })
    }

    fn load_unlocked(&self) -> Result<Vec<UserAccount>> {
        Ok(self.load_with_unparsed()?.0)
    }

    /// Parsed users plus the raw lines that did not parse
    fn load_with_unparsed(&self) -> Result<(Vec<UserAccount>, Vec<String>)> {
        let mut users = Vec::new();
        let mut unparsed = Vec::new();
        for line in read_lines(&self.path)? {
            match line.parse::<UserAccount>() {
                Ok(user) => users.push(user),
                Err(e) => {
                    warn!(line = %line, error = %e, "Skipping malformed user line");
                    unparsed.push(line);
                }
            }
        }
        Ok((users, unparsed))
    }

    /// Load, apply `f`, and rewrite the file if `f` succeeded
    ///
    /// Lines that did not parse are written back unchanged after the users.
    fn mutate<T>(&self, f: impl FnOnce(&mut Vec<UserAccount>) -> Result<T>) -> Result<T> {
        let _guard = self.region.lock();
        let (mut users, unparsed) = self.load_with_unparsed()?;
        let out = f(&mut users)?;
        let lines: Vec<String> = users
            .iter()
            .map(UserAccount::to_line)
            .chain(unparsed)
            .collect();
        write_lines(&self.path, &lines)?;
        Ok(out)
    }
}
