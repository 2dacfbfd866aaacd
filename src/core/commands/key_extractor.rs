// src/core/commands/key_extractor.rs

//! Per-command key extraction rules used for slot and ring routing.
//!
//! Each supported command ID maps to a [`KeyRule`] that says which arguments
//! are keys. [`CommandSlotResolver`] applies the rule, checks that every key
//! shares one hash tag, and hands back the tag (or its slot) to the router.

use crate::core::RouterError;
use crate::core::cluster::slot;
use crate::core::commands::Command;
use bytes::Bytes;
use std::collections::HashMap;

/// Describes where the keys of a command live in its argument list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyRule {
    /// `GET key`: argument 0 is the only key.
    First,
    /// `RENAME key newkey`: arguments 0 and 1 are keys.
    Pair,
    /// `MGET key [key ...]`: every argument is a key.
    All,
    /// `MSET key value [key value ...]`: keys sit at even positions.
    Interleaved,
    /// `BLPOP key [key ...] timeout`: everything but the trailing timeout.
    SkipLast,
    /// `ZUNIONSTORE dest numkeys key [key ...]`: destination plus counted sources.
    Aggregation,
    /// `EVAL script numkeys key [key ...]`: counted keys after the script body.
    Scripting,
    /// `ZINTER numkeys key [key ...]`: counted keys at the start.
    NumKeys,
    /// `SORT key ... [STORE dest]`.
    Sort,
    /// `GEORADIUS key ... [STORE dest] [STOREDIST dest]`.
    GeoRadius,
    /// `BITOP op dest key [key ...]`.
    BitOp,
    /// `XREAD ... STREAMS key [key ...] id [id ...]`.
    Streams,
}

/// Extracts the keys of a command according to `rule`.
///
/// Returns `None` if the arguments do not match the shape the rule expects,
/// in which case the command cannot be routed.
pub fn extract_keys(rule: KeyRule, args: &[Bytes]) -> Option<Vec<Bytes>> {
    match rule {
        KeyRule::First => args.first().map(|k| vec![k.clone()]),
        KeyRule::Pair => (args.len() >= 2).then(|| args[..2].to_vec()),
        KeyRule::All => (!args.is_empty()).then(|| args.to_vec()),
        KeyRule::Interleaved => {
            if args.is_empty() || args.len() % 2 != 0 {
                return None;
            }
            Some(args.iter().step_by(2).cloned().collect())
        }
        KeyRule::SkipLast => (args.len() >= 2).then(|| args[..args.len() - 1].to_vec()),
        KeyRule::Aggregation => {
            let num_keys = parse_count(args.get(1)?)?;
            if num_keys == 0 || args.len() < 2 + num_keys {
                return None;
            }
            let mut keys = Vec::with_capacity(num_keys + 1);
            keys.push(args[0].clone());
            keys.extend_from_slice(&args[2..2 + num_keys]);
            Some(keys)
        }
        KeyRule::Scripting => {
            let num_keys = parse_count(args.get(1)?)?;
            if num_keys == 0 || args.len() < 2 + num_keys {
                return None;
            }
            Some(args[2..2 + num_keys].to_vec())
        }
        KeyRule::NumKeys => {
            let num_keys = parse_count(args.first()?)?;
            if num_keys == 0 || args.len() < 1 + num_keys {
                return None;
            }
            Some(args[1..1 + num_keys].to_vec())
        }
        KeyRule::Sort => {
            let mut keys = vec![args.first()?.clone()];
            keys.extend(stored_destinations(&args[1..], &["STORE"])?);
            Some(keys)
        }
        KeyRule::GeoRadius => {
            let mut keys = vec![args.first()?.clone()];
            let options = args.get(2..).unwrap_or_default();
            keys.extend(stored_destinations(options, &["STORE", "STOREDIST"])?);
            Some(keys)
        }
        KeyRule::BitOp => (args.len() >= 3).then(|| args[1..].to_vec()),
        KeyRule::Streams => {
            let rest = &args[streams_start(args)?..];
            if rest.is_empty() || rest.len() % 2 != 0 {
                return None;
            }
            Some(rest[..rest.len() / 2].to_vec())
        }
    }
}

/// Index of the first key after the `STREAMS` token, stepping over option
/// values so that a group or consumer named `streams` is not mistaken for it.
fn streams_start(args: &[Bytes]) -> Option<usize> {
    let mut i = 0;
    while let Some(arg) = args.get(i) {
        if arg.eq_ignore_ascii_case(b"STREAMS") {
            return Some(i + 1);
        }
        i += if arg.eq_ignore_ascii_case(b"GROUP") {
            3
        } else if arg.eq_ignore_ascii_case(b"COUNT") || arg.eq_ignore_ascii_case(b"BLOCK") {
            2
        } else {
            1
        };
    }
    None
}

fn parse_count(arg: &Bytes) -> Option<usize> {
    std::str::from_utf8(arg).ok()?.parse().ok()
}

/// Collects the argument following each of `tokens`. A trailing token with no
/// destination makes the command malformed.
fn stored_destinations(args: &[Bytes], tokens: &[&str]) -> Option<Vec<Bytes>> {
    let mut dests = Vec::new();
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        if tokens.iter().any(|t| arg.eq_ignore_ascii_case(t.as_bytes())) {
            dests.push(iter.next()?.clone());
        }
    }
    Some(dests)
}

/// Returns the hash tag shared by all `keys`, or `None` if any two differ.
pub fn shared_hash_tag(keys: &[Bytes]) -> Option<&[u8]> {
    let (first, rest) = keys.split_first()?;
    let tag = slot::hash_tag(first);
    rest.iter()
        .all(|k| slot::hash_tag(k) == tag)
        .then_some(tag)
}

/// The registry of key extraction rules, keyed by upper-case command ID.
#[derive(Debug, Clone)]
pub struct CommandSlotResolver {
    rules: HashMap<String, KeyRule>,
}

impl Default for CommandSlotResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandSlotResolver {
    /// Creates a resolver preloaded with the rules for every key-based command.
    pub fn new() -> Self {
        let mut rules = HashMap::with_capacity(256);
        for (ids, rule) in DEFAULT_RULES {
            for id in *ids {
                rules.insert((*id).to_string(), *rule);
            }
        }
        Self { rules }
    }

    /// Creates a resolver that knows no commands.
    pub fn empty() -> Self {
        Self {
            rules: HashMap::new(),
        }
    }

    pub fn rule_for(&self, command_id: &str) -> Option<KeyRule> {
        self.rules.get(&command_id.to_ascii_uppercase()).copied()
    }

    /// Installs, replaces or (with `None`) removes the rule for a command.
    pub fn set_rule(&mut self, command_id: &str, rule: Option<KeyRule>) {
        let id = command_id.to_ascii_uppercase();
        match rule {
            Some(rule) => {
                self.rules.insert(id, rule);
            }
            None => {
                self.rules.remove(&id);
            }
        }
    }

    /// Extracts the keys of `command`.
    pub fn keys(&self, command: &Command) -> Result<Vec<Bytes>, RouterError> {
        let rule = self.rules.get(command.id()).copied().ok_or_else(|| {
            RouterError::unroutable(command.id(), "no key extraction rule for this command")
        })?;
        extract_keys(rule, command.args()).ok_or_else(|| {
            RouterError::unroutable(command.id(), "arguments do not contain the expected keys")
        })
    }

    /// Returns the hash tag every key of `command` agrees on.
    pub fn routing_tag(&self, command: &Command) -> Result<Bytes, RouterError> {
        let keys = self.keys(command)?;
        shared_hash_tag(&keys)
            .map(Bytes::copy_from_slice)
            .ok_or_else(|| {
                RouterError::unroutable(command.id(), "keys in request don't hash to the same slot")
            })
    }

    /// Returns the cluster slot `command` must be sent to.
    pub fn slot_for(&self, command: &Command) -> Result<u16, RouterError> {
        self.routing_tag(command)
            .map(|tag| slot::slot_for_tag(&tag))
    }
}

const DEFAULT_RULES: &[(&[&str], KeyRule)] = &[
    (
        &[
            // keys
            "EXPIRE", "EXPIREAT", "PEXPIRE", "PEXPIREAT", "PERSIST", "TTL", "PTTL", "EXPIRETIME",
            "PEXPIRETIME", "TYPE", "DUMP", "RESTORE", "SORT_RO", "OBJECT",
            // strings
            "APPEND", "DECR", "DECRBY", "GET", "GETBIT", "GETDEL", "GETEX", "GETRANGE", "GETSET",
            "INCR", "INCRBY", "INCRBYFLOAT", "SETBIT", "SETEX", "PSETEX", "SETNX", "SETRANGE",
            "STRLEN", "SET", "SUBSTR", "BITCOUNT", "BITPOS", "BITFIELD", "BITFIELD_RO",
            // hashes
            "HDEL", "HEXISTS", "HGET", "HGETALL", "HMGET", "HMSET", "HINCRBY", "HINCRBYFLOAT",
            "HKEYS", "HLEN", "HSET", "HSETNX", "HVALS", "HSCAN", "HSTRLEN", "HRANDFIELD",
            // lists
            "LINDEX", "LINSERT", "LLEN", "LPOP", "LPUSH", "LPUSHX", "LRANGE", "LREM", "LSET",
            "LTRIM", "RPOP", "RPUSH", "RPUSHX", "LPOS",
            // sets
            "SADD", "SCARD", "SISMEMBER", "SMISMEMBER", "SMEMBERS", "SSCAN", "SPOP",
            "SRANDMEMBER", "SREM",
            // sorted sets
            "ZADD", "ZCARD", "ZCOUNT", "ZINCRBY", "ZRANGE", "ZRANGEBYSCORE", "ZRANK", "ZREM",
            "ZREMRANGEBYRANK", "ZREMRANGEBYSCORE", "ZREVRANGE", "ZREVRANGEBYSCORE", "ZREVRANK",
            "ZSCORE", "ZMSCORE", "ZSCAN", "ZLEXCOUNT", "ZRANGEBYLEX", "ZREMRANGEBYLEX",
            "ZREVRANGEBYLEX", "ZPOPMIN", "ZPOPMAX", "ZRANDMEMBER",
            // hyperloglog
            "PFADD",
            // geospatial
            "GEOADD", "GEOHASH", "GEOPOS", "GEODIST", "GEOSEARCH", "GEORADIUS_RO",
            "GEORADIUSBYMEMBER_RO",
            // streams
            "XADD", "XLEN", "XDEL", "XTRIM", "XRANGE", "XREVRANGE", "XACK", "XCLAIM",
            "XAUTOCLAIM", "XPENDING", "XSETID",
            // json
            "JSON.GET", "JSON.SET", "JSON.DEL", "JSON.TYPE", "JSON.ARRAPPEND", "JSON.ARRLEN",
            "JSON.OBJKEYS", "JSON.OBJLEN", "JSON.STRLEN", "JSON.NUMINCRBY", "JSON.CLEAR",
            "JSON.TOGGLE",
        ],
        KeyRule::First,
    ),
    (
        &[
            "SMOVE", "LMOVE", "BLMOVE", "COPY", "ZRANGESTORE", "GEOSEARCHSTORE",
        ],
        KeyRule::Pair,
    ),
    (
        &[
            "EXISTS", "DEL", "UNLINK", "TOUCH", "MGET", "RENAME", "RENAMENX", "RPOPLPUSH",
            "SDIFF", "SDIFFSTORE", "SINTER", "SINTERSTORE", "SUNION", "SUNIONSTORE", "PFCOUNT",
            "PFMERGE", "WATCH",
        ],
        KeyRule::All,
    ),
    (&["MSET", "MSETNX"], KeyRule::Interleaved),
    (
        &["BLPOP", "BRPOP", "BRPOPLPUSH", "BZPOPMIN", "BZPOPMAX"],
        KeyRule::SkipLast,
    ),
    (
        &["ZINTERSTORE", "ZUNIONSTORE", "ZDIFFSTORE"],
        KeyRule::Aggregation,
    ),
    (
        &["EVAL", "EVALSHA", "EVAL_RO", "EVALSHA_RO", "FCALL", "FCALL_RO"],
        KeyRule::Scripting,
    ),
    (
        &["ZINTER", "ZUNION", "ZDIFF", "ZINTERCARD", "SINTERCARD", "LMPOP", "ZMPOP"],
        KeyRule::NumKeys,
    ),
    (&["SORT"], KeyRule::Sort),
    (&["GEORADIUS", "GEORADIUSBYMEMBER"], KeyRule::GeoRadius),
    (&["BITOP"], KeyRule::BitOp),
    (&["XREAD", "XREADGROUP"], KeyRule::Streams),
];
