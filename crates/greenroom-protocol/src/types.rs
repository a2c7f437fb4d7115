//! Core types exchanged between the socket layer and the command handlers.
//!
//! Nothing in here knows about sockets or stores. These are plain values:
//! identifiers, the decoded inbound [`Command`], the outbound [`Answer`],
//! and the [`Packet`] that pairs an answer with its query name and framing
//! flag.

use std::fmt;
use std::str::FromStr;

use indexmap::IndexMap;
use rand::Rng;
use rand::distr::Alphanumeric;
use serde::{Deserialize, Serialize};

use crate::ProtocolError;

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// Identifier of an advertised game server.
///
/// Game ids are allocated from the `counters:GID` counter in the session
/// store and travel on the wire as plain decimal strings (`GID=7`), so
/// `Display` prints the bare number.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct GameId(pub u64);

impl fmt::Display for GameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for GameId {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse()
            .map(GameId)
            .map_err(|_| ProtocolError::InvalidField {
                field: "GID",
                value: s.to_string(),
            })
    }
}

/// Logical partition owning the persisted game rows of one server process.
///
/// Every `games` row is keyed by `(gid, shard)`, so two processes sharing a
/// database never delete each other's rows. The shard is chosen once at
/// startup and handed to every component that touches those rows.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Shard(String);

impl Shard {
    /// Length of generated shard names.
    pub const LEN: usize = 6;

    /// Wraps an explicit shard name (e.g. pinned in configuration).
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Generates a random alphanumeric shard of [`Self::LEN`] characters.
    pub fn random() -> Self {
        let name = rand::rng()
            .sample_iter(&Alphanumeric)
            .take(Self::LEN)
            .map(char::from)
            .collect();
        Self(name)
    }

    /// Returns the shard name.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Shard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One of the two teams of a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Team {
    One,
    Two,
}

impl Team {
    /// Interprets a `c_team` hero stat. Stats are stored as text and are
    /// frequently floats (`"2.0000"`).
    pub fn from_stat(value: &str) -> Option<Self> {
        let n: f64 = value.trim().parse().ok()?;
        match n as i64 {
            1 => Some(Team::One),
            2 => Some(Team::Two),
            _ => None,
        }
    }

    /// Team number as used in column names (`team_1`, `team_2`).
    pub fn number(self) -> u8 {
        match self {
            Team::One => 1,
            Team::Two => 2,
        }
    }
}

// ---------------------------------------------------------------------------
// FrameFlag
// ---------------------------------------------------------------------------

/// The 32-bit flag word sent alongside every answer.
///
/// Its meaning belongs to the socket layer's framing code. Handlers only
/// pick one of the observed values and pass it through untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FrameFlag(pub u32);

impl FrameFlag {
    /// Plain theater framing (`0x0`).
    pub const PLAIN: FrameFlag = FrameFlag(0x0);
    /// FESL-tier framing (`0x80000000`).
    pub const FESL: FrameFlag = FrameFlag(0x8000_0000);
}

impl fmt::Display for FrameFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Verb
// ---------------------------------------------------------------------------

/// Commands the dispatcher knows how to route.
///
/// Anything else is logged and dropped; the protocol surface is only
/// partially modelled, so unknown verbs are expected traffic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verb {
    Conn,
    User,
    Llst,
    Glst,
    Gdat,
    Cgam,
    Ugam,
    Ubra,
    Egam,
    Egrs,
    Ecnl,
    Pent,
    Plvt,
    Upla,
    /// UDP keep-alive probe.
    Echo,
    /// FESL `pnow` query with `TXN=Status`.
    Status,
}

impl Verb {
    /// Theater verbs, matched on the command's query name.
    const THEATER: [Verb; 15] = [
        Verb::Conn,
        Verb::User,
        Verb::Llst,
        Verb::Glst,
        Verb::Gdat,
        Verb::Cgam,
        Verb::Ugam,
        Verb::Ubra,
        Verb::Egam,
        Verb::Egrs,
        Verb::Ecnl,
        Verb::Pent,
        Verb::Plvt,
        Verb::Upla,
        Verb::Echo,
    ];

    /// Identifies the verb of a decoded command, if it is one we route.
    pub fn of(command: &Command) -> Option<Verb> {
        if command.query == "pnow" {
            return (command.txn() == "Status").then_some(Verb::Status);
        }
        Self::THEATER
            .into_iter()
            .find(|verb| verb.as_str() == command.query)
    }

    /// The name used in event names and logs.
    pub fn as_str(self) -> &'static str {
        match self {
            Verb::Conn => "CONN",
            Verb::User => "USER",
            Verb::Llst => "LLST",
            Verb::Glst => "GLST",
            Verb::Gdat => "GDAT",
            Verb::Cgam => "CGAM",
            Verb::Ugam => "UGAM",
            Verb::Ubra => "UBRA",
            Verb::Egam => "EGAM",
            Verb::Egrs => "EGRS",
            Verb::Ecnl => "ECNL",
            Verb::Pent => "PENT",
            Verb::Plvt => "PLVT",
            Verb::Upla => "UPLA",
            Verb::Echo => "ECHO",
            Verb::Status => "Status",
        }
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Command
// ---------------------------------------------------------------------------

/// A decoded inbound command.
///
/// `query` is the four-letter packet type (`CGAM`, `pnow`, ...). `message`
/// holds the decoded key/value fields in arrival order. Missing fields read
/// as the empty string, which is how the legacy clients treat them too.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Command {
    pub query: String,
    pub message: IndexMap<String, String>,
}

impl Command {
    /// Creates a command with no fields.
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            message: IndexMap::new(),
        }
    }

    /// Builder-style field setter, handy when constructing commands by hand.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.message.insert(key.into(), value.into());
        self
    }

    /// Returns a field, or `""` when absent.
    pub fn get(&self, key: &str) -> &str {
        self.message.get(key).map(String::as_str).unwrap_or("")
    }

    /// The transaction name (`TXN`). Theater commands usually omit it.
    pub fn txn(&self) -> &str {
        self.get("TXN")
    }

    /// The client's transaction id (`TID`), echoed in every answer.
    pub fn tid(&self) -> &str {
        self.get("TID")
    }

    /// Parses the `GID` field.
    pub fn game_id(&self) -> Result<GameId, ProtocolError> {
        self.get("GID").parse()
    }

    /// Parses a numeric field such as `PID`.
    pub fn number(&self, field: &'static str) -> Result<u64, ProtocolError> {
        let value = self.get(field);
        value.trim().parse().map_err(|_| ProtocolError::InvalidField {
            field,
            value: value.to_string(),
        })
    }

    /// Iterates the fields whose key starts with `prefix`, in arrival order.
    pub fn fields_with_prefix<'a>(
        &'a self,
        prefix: &'a str,
    ) -> impl Iterator<Item = (&'a str, &'a str)> + 'a {
        self.message
            .iter()
            .filter(move |(key, _)| key.starts_with(prefix))
            .map(|(key, value)| (key.as_str(), value.as_str()))
    }

    /// The name used for audit records: the transaction name when the
    /// command carries one, otherwise the query itself.
    pub fn record_name(&self) -> &str {
        match self.txn() {
            "" => &self.query,
            txn => txn,
        }
    }
}

// ---------------------------------------------------------------------------
// Answer
// ---------------------------------------------------------------------------

/// An outbound answer: dotted field paths mapped to string values.
///
/// Order is significant to the legacy clients, so this is backed by an
/// [`IndexMap`] and serializes in insertion order. Re-inserting an existing
/// key overwrites the value in place.
///
/// ```rust
/// use greenroom_protocol::Answer;
///
/// let mut answer = Answer::new();
/// answer.insert("TXN", "Status");
/// answer.insert("props.{games}.[]", 1);
/// assert_eq!(answer.get("props.{games}.[]"), Some("1"));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Answer(IndexMap<String, String>);

impl Answer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a field. Any `Display` value is accepted, so numbers and ids
    /// can be passed directly.
    pub fn insert(&mut self, key: impl Into<String>, value: impl fmt::Display) {
        self.0.insert(key.into(), value.to_string());
    }

    /// Builder-style variant of [`insert`](Self::insert).
    pub fn with(mut self, key: impl Into<String>, value: impl fmt::Display) -> Self {
        self.insert(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates fields in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// An answer ready for the socket layer: query name, fields and flag word.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Packet {
    pub query: String,
    pub answer: Answer,
    pub flag: FrameFlag,
}

impl Packet {
    pub fn new(query: impl Into<String>, answer: Answer, flag: FrameFlag) -> Self {
        Self {
            query: query.into(),
            answer,
            flag,
        }
    }
}
