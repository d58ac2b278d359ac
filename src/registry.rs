//! Channel registry
//!
//! Maps channel name → passphrase. A channel is created by the first join
//! that names it (or reserved by the host before any client connects) and
//! lives for the rest of the process; its passphrase never changes.

use std::collections::HashMap;

use crate::error::AppError;

/// A registered channel
#[derive(Debug)]
pub struct Channel {
    /// Shared secret, compared as plaintext
    passphrase: String,
}

impl Channel {
    fn new(passphrase: String) -> Self {
        Self { passphrase }
    }

    /// Exact, case-sensitive byte comparison
    pub fn accepts(&self, passphrase: &str) -> bool {
        self.passphrase.as_bytes() == passphrase.as_bytes()
    }
}

/// Outcome of a successful [`ChannelRegistry::join_or_create`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Accepted {
    /// The name was unseen; the supplied passphrase now guards it
    Created,
    /// The channel existed and the passphrase matched
    Joined,
}

/// All channels known to this process
#[derive(Debug, Default)]
pub struct ChannelRegistry {
    channels: HashMap<String, Channel>,
}

impl ChannelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate a join against the stored passphrase, creating the channel if unseen
    ///
    /// No lockout and no rate limiting: a rejection only affects the caller.
    pub fn join_or_create(&mut self, name: &str, passphrase: &str) -> Result<Accepted, AppError> {
        match self.channels.get(name) {
            Some(channel) if channel.accepts(passphrase) => Ok(Accepted::Joined),
            Some(_) => Err(AppError::IncorrectPassphrase),
            None => {
                self.channels
                    .insert(name.to_string(), Channel::new(passphrase.to_string()));
                Ok(Accepted::Created)
            }
        }
    }

    /// Register `name` ahead of any join
    ///
    /// Returns false, leaving the stored passphrase alone, if the name is
    /// already taken.
    pub fn reserve(&mut self, name: &str, passphrase: &str) -> bool {
        if self.channels.contains_key(name) {
            return false;
        }
        self.channels
            .insert(name.to_string(), Channel::new(passphrase.to_string()));
        true
    }

    pub fn get(&self, name: &str) -> Option<&Channel> {
        self.channels.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.channels.contains_key(name)
    }

    /// Number of registered channels
    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }
}
