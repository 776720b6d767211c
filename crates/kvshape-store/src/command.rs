use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A single mutating store command queued inside a [`Batch`].
///
/// Reads never go through a batch; they are issued directly against the
/// [`KvStore`](crate::KvStore).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "UPPERCASE")]
pub enum Command {
    /// `SET key value` (clears any TTL on the key).
    Set { key: String, value: String },
    /// `DEL key`.
    Del { key: String },
    /// `EXPIRE key seconds`.
    Expire { key: String, seconds: i64 },
    /// `EXPIREAT key timestamp` (Unix seconds).
    ExpireAt { key: String, timestamp: i64 },
    /// `HMSET key field value [field value ...]`.
    HMSet {
        key: String,
        fields: BTreeMap<String, String>,
    },
    /// `RPUSH key value [value ...]`.
    RPush { key: String, values: Vec<String> },
    /// `SADD key member [member ...]`.
    SAdd { key: String, members: Vec<String> },
}

impl Command {
    /// The key this command addresses.
    pub fn key(&self) -> &str {
        match self {
            Self::Set { key, .. }
            | Self::Del { key }
            | Self::Expire { key, .. }
            | Self::ExpireAt { key, .. }
            | Self::HMSet { key, .. }
            | Self::RPush { key, .. }
            | Self::SAdd { key, .. } => key,
        }
    }

    /// The Redis command name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Set { .. } => "SET",
            Self::Del { .. } => "DEL",
            Self::Expire { .. } => "EXPIRE",
            Self::ExpireAt { .. } => "EXPIREAT",
            Self::HMSet { .. } => "HMSET",
            Self::RPush { .. } => "RPUSH",
            Self::SAdd { .. } => "SADD",
        }
    }

    /// Returns `true` for `EXPIRE` / `EXPIREAT`.
    pub fn is_expiry(&self) -> bool {
        matches!(self, Self::Expire { .. } | Self::ExpireAt { .. })
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Set { key, value } => write!(f, "SET {key} {value:?}"),
            Self::Del { key } => write!(f, "DEL {key}"),
            Self::Expire { key, seconds } => write!(f, "EXPIRE {key} {seconds}"),
            Self::ExpireAt { key, timestamp } => write!(f, "EXPIREAT {key} {timestamp}"),
            Self::HMSet { key, fields } => {
                write!(f, "HMSET {key}")?;
                for (field, value) in fields {
                    write!(f, " {field:?} {value:?}")?;
                }
                Ok(())
            }
            Self::RPush { key, values } => {
                write!(f, "RPUSH {key}")?;
                for value in values {
                    write!(f, " {value:?}")?;
                }
                Ok(())
            }
            Self::SAdd { key, members } => {
                write!(f, "SADD {key}")?;
                for member in members {
                    write!(f, " {member:?}")?;
                }
                Ok(())
            }
        }
    }
}

/// An ordered queue of commands committed as one atomic unit
/// (`MULTI` ... `EXEC`).
///
/// Builder methods return `&mut Self` so that callers can chain
/// `batch.del(k).set(k, v)` the way a driver's multi handle reads.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Batch {
    commands: Vec<Command>,
}

impl Batch {
    /// Create an empty batch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an arbitrary command.
    pub fn push(&mut self, command: Command) -> &mut Self {
        self.commands.push(command);
        self
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.push(Command::Set {
            key: key.into(),
            value: value.into(),
        })
    }

    pub fn del(&mut self, key: impl Into<String>) -> &mut Self {
        self.push(Command::Del { key: key.into() })
    }

    pub fn expire(&mut self, key: impl Into<String>, seconds: i64) -> &mut Self {
        self.push(Command::Expire {
            key: key.into(),
            seconds,
        })
    }

    pub fn expire_at(&mut self, key: impl Into<String>, timestamp: i64) -> &mut Self {
        self.push(Command::ExpireAt {
            key: key.into(),
            timestamp,
        })
    }

    pub fn hmset(
        &mut self,
        key: impl Into<String>,
        fields: BTreeMap<String, String>,
    ) -> &mut Self {
        self.push(Command::HMSet {
            key: key.into(),
            fields,
        })
    }

    pub fn rpush(&mut self, key: impl Into<String>, values: Vec<String>) -> &mut Self {
        self.push(Command::RPush {
            key: key.into(),
            values,
        })
    }

    pub fn sadd(&mut self, key: impl Into<String>, members: Vec<String>) -> &mut Self {
        self.push(Command::SAdd {
            key: key.into(),
            members,
        })
    }

    /// Number of queued commands.
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// Returns `true` if nothing has been queued.
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// The queued commands in submission order.
    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Command> {
        self.commands.iter()
    }

    /// Distinct keys touched by this batch, sorted.
    pub fn keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self.commands.iter().map(Command::key).collect();
        keys.sort_unstable();
        keys.dedup();
        keys
    }
}

impl<'a> IntoIterator for &'a Batch {
    type Item = &'a Command;
    type IntoIter = std::slice::Iter<'a, Command>;

    fn into_iter(self) -> Self::IntoIter {
        self.commands.iter()
    }
}

impl IntoIterator for Batch {
    type Item = Command;
    type IntoIter = std::vec::IntoIter<Command>;

    fn into_iter(self) -> Self::IntoIter {
        self.commands.into_iter()
    }
}

impl fmt::Display for Batch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "MULTI")?;
        for command in &self.commands {
            writeln!(f, "{command}")?;
        }
        write!(f, "EXEC")
    }
}
