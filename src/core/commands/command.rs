// src/core/commands/command.rs

use crate::core::protocol::RespFrame;
use bytes::Bytes;
use std::fmt;

/// A command as the routers see it: an upper-cased ID plus raw arguments.
///
/// Argument encoding is opaque to routing; only the arguments a key extraction
/// rule points at are ever inspected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    id: String,
    args: Vec<Bytes>,
}

impl Command {
    pub fn new<I, A>(id: &str, args: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: Into<Bytes>,
    {
        Self {
            id: id.to_ascii_uppercase(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// Builds a command from its full token list, e.g. `["CLUSTER", "SLOTS"]`.
    ///
    /// Returns `None` for an empty token list.
    pub fn raw<I, A>(parts: I) -> Option<Self>
    where
        I: IntoIterator<Item = A>,
        A: Into<Bytes>,
    {
        let mut parts = parts.into_iter().map(Into::into);
        let id: Bytes = parts.next()?;
        Some(Self {
            id: String::from_utf8_lossy(&id).to_ascii_uppercase(),
            args: parts.collect(),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn args(&self) -> &[Bytes] {
        &self.args
    }

    /// The request frame written to the wire.
    pub fn to_frame(&self) -> RespFrame {
        let mut parts = Vec::with_capacity(self.args.len() + 1);
        parts.push(RespFrame::BulkString(Bytes::from(self.id.clone())));
        parts.extend(self.args.iter().cloned().map(RespFrame::BulkString));
        RespFrame::Array(parts)
    }

    pub(crate) fn cluster_slots() -> Self {
        Command::new("CLUSTER", ["SLOTS"])
    }

    pub(crate) fn asking() -> Self {
        Command::new("ASKING", Vec::<Bytes>::new())
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id)?;
        for arg in &self.args {
            write!(f, " {}", String::from_utf8_lossy(arg))?;
        }
        Ok(())
    }
}
