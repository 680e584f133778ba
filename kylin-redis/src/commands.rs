//! # Typed Accessors
//!
//! Purpose: Store and load application values as JSON through the raw
//! string, hash, set, sorted-set and list commands.
//!
//! ## Design Principles
//! 1. **Extension Trait**: `SerdeCommands` is blanket-implemented for every
//!    `redis::ConnectionLike`, the same way `redis::Commands` is.
//! 2. **One Round Trip**: each accessor issues exactly one raw command and
//!    only adds the encode/decode step around it.
//! 3. **Explicit Absence**: single-value reads on a missing key return
//!    `CacheError::NotFound`; collection reads return an empty collection.

use std::collections::HashMap;
use std::fmt;
use std::num::NonZeroUsize;

use redis::{Commands, ConnectionLike, SetOptions, ToRedisArgs};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::codec::{self, Raw};
use crate::error::{CacheError, CacheResult};

/// Result ordering for range reads.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Order {
    #[default]
    Ascending,
    Descending,
}

/// Which ends of a score range are exclusive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Exclude {
    #[default]
    None,
    Start,
    Stop,
    Both,
}

impl Exclude {
    fn start(self) -> bool {
        matches!(self, Exclude::Start | Exclude::Both)
    }

    fn stop(self) -> bool {
        matches!(self, Exclude::Stop | Exclude::Both)
    }
}

/// Push condition for single-element list pushes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum When {
    /// Always push, creating the list if needed.
    #[default]
    Always,
    /// Push only when the list already exists (`LPUSHX`/`RPUSHX`).
    Exists,
}

/// Score interval for sorted-set range reads. Infinite bounds are allowed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreRange {
    pub start: f64,
    pub stop: f64,
    pub exclude: Exclude,
}

impl ScoreRange {
    pub fn new(start: f64, stop: f64) -> Self {
        ScoreRange {
            start,
            stop,
            exclude: Exclude::None,
        }
    }

    /// Every score, `-inf` to `+inf`.
    pub fn all() -> Self {
        ScoreRange::new(f64::NEG_INFINITY, f64::INFINITY)
    }

    pub fn exclude(mut self, exclude: Exclude) -> Self {
        self.exclude = exclude;
        self
    }

    fn start_arg(&self) -> String {
        score_bound(self.start, self.exclude.start())
    }

    fn stop_arg(&self) -> String {
        score_bound(self.stop, self.exclude.stop())
    }
}

impl Default for ScoreRange {
    fn default() -> Self {
        ScoreRange::all()
    }
}

fn score_bound(score: f64, exclusive: bool) -> String {
    let prefix = if exclusive { "(" } else { "" };
    if score == f64::NEG_INFINITY {
        format!("{}-inf", prefix)
    } else if score == f64::INFINITY {
        format!("{}+inf", prefix)
    } else {
        format!("{}{}", prefix, score)
    }
}

/// Bound for lexicographical range reads.
///
/// Members are compared as stored, so a bound on a string member must be
/// its JSON text including the quotes (see [`LexBound::json`]).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LexBound {
    /// `-`
    Min,
    /// `+`
    Max,
    /// `[value`
    Inclusive(String),
    /// `(value`
    Exclusive(String),
}

impl LexBound {
    /// Inclusive bound on the JSON encoding of `value`.
    pub fn json<T: Serialize + ?Sized>(value: &T) -> CacheResult<Self> {
        Ok(LexBound::Inclusive(codec::encode(value)?))
    }
}

impl fmt::Display for LexBound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LexBound::Min => f.write_str("-"),
            LexBound::Max => f.write_str("+"),
            LexBound::Inclusive(value) => write!(f, "[{}", value),
            LexBound::Exclusive(value) => write!(f, "({}", value),
        }
    }
}

impl ToRedisArgs for LexBound {
    fn write_redis_args<W>(&self, out: &mut W)
    where
        W: ?Sized + redis::RedisWrite,
    {
        out.write_arg(self.to_string().as_bytes())
    }
}

/// JSON-typed accessors over any Redis connection.
///
/// Absent values on single-value reads surface as `CacheError::NotFound`;
/// values that are not valid JSON for `T` surface as
/// `CacheError::Deserialization`.
pub trait SerdeCommands: ConnectionLike + Sized {
    // ---- strings ----

    /// Stores `value` as JSON text under `key`.
    fn string_set<T: Serialize + ?Sized>(&mut self, key: &str, value: &T) -> CacheResult<()> {
        let payload = codec::encode(value)?;
        self.set::<_, _, ()>(key, payload)?;
        Ok(())
    }

    /// `SET` with pass-through flags. Returns false when an NX/XX condition
    /// prevented the write.
    fn string_set_with<T: Serialize + ?Sized>(
        &mut self,
        key: &str,
        value: &T,
        options: SetOptions,
    ) -> CacheResult<bool> {
        let payload = codec::encode(value)?;
        let reply: redis::Value = self.set_options(key, payload, options)?;
        Ok(!matches!(reply, redis::Value::Nil))
    }

    fn string_get<T: DeserializeOwned>(&mut self, key: &str) -> CacheResult<T> {
        match self.string_get_opt(key)? {
            Some(value) => Ok(value),
            None => Err(CacheError::not_found(key)),
        }
    }

    /// Like [`string_get`](Self::string_get) but maps an absent key to `None`.
    fn string_get_opt<T: DeserializeOwned>(&mut self, key: &str) -> CacheResult<Option<T>> {
        let raw: Option<Raw> = self.get(key)?;
        raw.map(|raw| codec::decode(key, &raw)).transpose()
    }

    // ---- hashes ----

    /// Writes every `(field, value)` pair in one `HMSET`. Empty input sends
    /// nothing.
    fn hash_set<F, T, I>(&mut self, key: &str, entries: I) -> CacheResult<()>
    where
        I: IntoIterator<Item = (F, T)>,
        F: ToRedisArgs,
        T: Serialize,
    {
        let pairs = entries
            .into_iter()
            .map(|(field, value)| codec::encode(&value).map(|payload| (field, payload)))
            .collect::<CacheResult<Vec<_>>>()?;
        if pairs.is_empty() {
            return Ok(());
        }
        self.hset_multiple::<_, _, _, ()>(key, &pairs)?;
        Ok(())
    }

    fn hash_get<T: DeserializeOwned>(&mut self, key: &str, field: &str) -> CacheResult<T> {
        let raw: Option<Raw> = self.hget(key, field)?;
        let name = codec::field_key(key, field);
        match raw {
            Some(raw) => codec::decode(&name, &raw),
            None => Err(CacheError::not_found(name)),
        }
    }

    fn hash_get_all<T: DeserializeOwned>(&mut self, key: &str) -> CacheResult<HashMap<String, T>> {
        let raw: HashMap<String, Raw> = self.hgetall(key)?;
        codec::decode_pairs(key, raw)
    }

    // ---- sets ----

    /// Returns true when the member was not already present.
    fn set_add<T: Serialize + ?Sized>(&mut self, key: &str, value: &T) -> CacheResult<bool> {
        let added: i64 = self.sadd(key, codec::encode(value)?)?;
        Ok(added > 0)
    }

    fn set_members<T: DeserializeOwned>(&mut self, key: &str) -> CacheResult<Vec<T>> {
        let raw: Vec<Raw> = self.smembers(key)?;
        codec::decode_many(key, raw)
    }

    // ---- sorted sets ----

    /// Returns true when the member was added rather than re-scored.
    fn sorted_set_add<T: Serialize + ?Sized>(
        &mut self,
        key: &str,
        value: &T,
        score: f64,
    ) -> CacheResult<bool> {
        let added: i64 = self.zadd(key, codec::encode(value)?, score)?;
        Ok(added > 0)
    }

    /// Adds every `(value, score)` pair in one `ZADD`; returns the number of
    /// new members.
    fn sorted_set_add_many<T: Serialize>(
        &mut self,
        key: &str,
        entries: &[(T, f64)],
    ) -> CacheResult<usize> {
        if entries.is_empty() {
            return Ok(0);
        }
        let items = entries
            .iter()
            .map(|(value, score)| codec::encode(value).map(|payload| (*score, payload)))
            .collect::<CacheResult<Vec<_>>>()?;
        Ok(self.zadd_multiple(key, &items)?)
    }

    /// Members between ranks `start` and `stop` (inclusive, negative counts
    /// from the end).
    fn sorted_set_range_by_rank<T: DeserializeOwned>(
        &mut self,
        key: &str,
        start: isize,
        stop: isize,
        order: Order,
    ) -> CacheResult<Vec<T>> {
        let raw: Vec<Raw> = match order {
            Order::Ascending => self.zrange(key, start, stop)?,
            Order::Descending => self.zrevrange(key, start, stop)?,
        };
        codec::decode_many(key, raw)
    }

    fn sorted_set_range_by_rank_with_scores<T: DeserializeOwned>(
        &mut self,
        key: &str,
        start: isize,
        stop: isize,
        order: Order,
    ) -> CacheResult<Vec<(T, f64)>> {
        let raw: Vec<(Raw, f64)> = match order {
            Order::Ascending => self.zrange_withscores(key, start, stop)?,
            Order::Descending => self.zrevrange_withscores(key, start, stop)?,
        };
        codec::decode_scored(key, raw)
    }

    /// Members whose score falls in `range`. `take` of -1 means no limit.
    fn sorted_set_range_by_score<T: DeserializeOwned>(
        &mut self,
        key: &str,
        range: ScoreRange,
        order: Order,
        skip: isize,
        take: isize,
    ) -> CacheResult<Vec<T>> {
        let (start, stop) = (range.start_arg(), range.stop_arg());
        let raw: Vec<Raw> = match order {
            Order::Ascending => self.zrangebyscore_limit(key, start, stop, skip, take)?,
            Order::Descending => self.zrevrangebyscore_limit(key, stop, start, skip, take)?,
        };
        codec::decode_many(key, raw)
    }

    fn sorted_set_range_by_score_with_scores<T: DeserializeOwned>(
        &mut self,
        key: &str,
        range: ScoreRange,
        order: Order,
        skip: isize,
        take: isize,
    ) -> CacheResult<Vec<(T, f64)>> {
        let (start, stop) = (range.start_arg(), range.stop_arg());
        let raw: Vec<(Raw, f64)> = match order {
            Order::Ascending => self.zrangebyscore_limit_withscores(key, start, stop, skip, take)?,
            Order::Descending => {
                self.zrevrangebyscore_limit_withscores(key, stop, start, skip, take)?
            }
        };
        codec::decode_scored(key, raw)
    }

    /// Lexicographical range over equally scored members.
    fn sorted_set_range_by_value<T: DeserializeOwned>(
        &mut self,
        key: &str,
        min: LexBound,
        max: LexBound,
        skip: isize,
        take: isize,
    ) -> CacheResult<Vec<T>> {
        let raw: Vec<Raw> = self.zrangebylex_limit(key, min, max, skip, take)?;
        codec::decode_many(key, raw)
    }

    // ---- lists ----

    fn list_get_by_index<T: DeserializeOwned>(
        &mut self,
        key: &str,
        index: isize,
    ) -> CacheResult<T> {
        let raw: Option<Raw> = self.lindex(key, index)?;
        decode_present(key, raw)
    }

    /// Returns the new length, or -1 when `pivot` is not in the list.
    fn list_insert_after<P, T>(&mut self, key: &str, pivot: &P, value: &T) -> CacheResult<i64>
    where
        P: Serialize + ?Sized,
        T: Serialize + ?Sized,
    {
        Ok(self.linsert_after(key, codec::encode(pivot)?, codec::encode(value)?)?)
    }

    /// Returns the new length, or -1 when `pivot` is not in the list.
    fn list_insert_before<P, T>(&mut self, key: &str, pivot: &P, value: &T) -> CacheResult<i64>
    where
        P: Serialize + ?Sized,
        T: Serialize + ?Sized,
    {
        Ok(self.linsert_before(key, codec::encode(pivot)?, codec::encode(value)?)?)
    }

    fn list_left_pop<T: DeserializeOwned>(&mut self, key: &str) -> CacheResult<T> {
        let raw: Option<Raw> = self.lpop(key, None::<NonZeroUsize>)?;
        decode_present(key, raw)
    }

    fn list_right_pop<T: DeserializeOwned>(&mut self, key: &str) -> CacheResult<T> {
        let raw: Option<Raw> = self.rpop(key, None::<NonZeroUsize>)?;
        decode_present(key, raw)
    }

    /// Returns the list length after the push (0 when `When::Exists` found
    /// no list).
    fn list_left_push<T: Serialize + ?Sized>(
        &mut self,
        key: &str,
        value: &T,
        when: When,
    ) -> CacheResult<usize> {
        let payload = codec::encode(value)?;
        Ok(match when {
            When::Always => self.lpush(key, payload)?,
            When::Exists => self.lpush_exists(key, payload)?,
        })
    }

    fn list_right_push<T: Serialize + ?Sized>(
        &mut self,
        key: &str,
        value: &T,
        when: When,
    ) -> CacheResult<usize> {
        let payload = codec::encode(value)?;
        Ok(match when {
            When::Always => self.rpush(key, payload)?,
            When::Exists => self.rpush_exists(key, payload)?,
        })
    }

    /// Pushes all values in one `LPUSH`; the last value ends up at the head.
    fn list_left_push_many<T: Serialize>(&mut self, key: &str, values: &[T]) -> CacheResult<usize> {
        let payloads = encode_required(key, values)?;
        Ok(self.lpush(key, payloads.as_slice())?)
    }

    fn list_right_push_many<T: Serialize>(
        &mut self,
        key: &str,
        values: &[T],
    ) -> CacheResult<usize> {
        let payloads = encode_required(key, values)?;
        Ok(self.rpush(key, payloads.as_slice())?)
    }

    fn list_range<T: DeserializeOwned>(
        &mut self,
        key: &str,
        start: isize,
        stop: isize,
    ) -> CacheResult<Vec<T>> {
        let raw: Vec<Raw> = self.lrange(key, start, stop)?;
        codec::decode_many(key, raw)
    }

    /// Removes up to `count` matching elements (0 removes all, negative
    /// scans from the tail). Returns how many were removed.
    fn list_remove<T: Serialize + ?Sized>(
        &mut self,
        key: &str,
        value: &T,
        count: isize,
    ) -> CacheResult<usize> {
        Ok(self.lrem(key, count, codec::encode(value)?)?)
    }

    /// Atomically moves the tail of `source` to the head of `destination`.
    fn list_right_pop_left_push<T: DeserializeOwned>(
        &mut self,
        source: &str,
        destination: &str,
    ) -> CacheResult<T> {
        let raw: Option<Raw> = self.rpoplpush(source, destination)?;
        decode_present(source, raw)
    }

    fn list_set_by_index<T: Serialize + ?Sized>(
        &mut self,
        key: &str,
        index: isize,
        value: &T,
    ) -> CacheResult<()> {
        self.lset::<_, _, ()>(key, index, codec::encode(value)?)?;
        Ok(())
    }
}

impl<C: ConnectionLike> SerdeCommands for C {}

fn decode_present<T: DeserializeOwned>(key: &str, raw: Option<Raw>) -> CacheResult<T> {
    match raw {
        Some(raw) => codec::decode(key, &raw),
        None => Err(CacheError::not_found(key)),
    }
}

fn encode_required<T: Serialize>(key: &str, values: &[T]) -> CacheResult<Vec<String>> {
    if values.is_empty() {
        return Err(CacheError::argument(format!("no values to push onto {}", key)));
    }
    codec::encode_many(values)
}
