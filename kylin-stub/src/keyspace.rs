//! Data commands: strings, hashes, sets, sorted sets and lists.
//!
//! Every handler takes the already-locked database and the full argument
//! vector (command name included) and returns one reply.

use std::cmp::Ordering;
use std::collections::VecDeque;

use crate::protocol::Reply;
use crate::store::{Db, Value};

type Args = [Vec<u8>];

/// Executes a data command. `name` is the upper-cased command name.
/// Returns `None` for commands this module does not own.
pub(crate) fn execute(db: &mut Db, name: &str, args: &Args) -> Option<Reply> {
    let reply = match name {
        "GET" => get(db, args),
        "SET" => set(db, args),
        "DEL" => del(db, args),
        "EXISTS" => exists(db, args),
        "HSET" => hset(db, args, false),
        "HMSET" => hset(db, args, true),
        "HGET" => hget(db, args),
        "HGETALL" => hgetall(db, args),
        "SADD" => sadd(db, args),
        "SMEMBERS" => smembers(db, args),
        "ZADD" => zadd(db, args),
        "ZRANGE" => zrange(db, args, false),
        "ZREVRANGE" => zrange(db, args, true),
        "ZRANGEBYSCORE" => zrange_by_score(db, args, false),
        "ZREVRANGEBYSCORE" => zrange_by_score(db, args, true),
        "ZRANGEBYLEX" => zrange_by_lex(db, args),
        "LPUSH" => push(db, args, End::Left, false),
        "RPUSH" => push(db, args, End::Right, false),
        "LPUSHX" => push(db, args, End::Left, true),
        "RPUSHX" => push(db, args, End::Right, true),
        "LPOP" => pop(db, args, End::Left),
        "RPOP" => pop(db, args, End::Right),
        "LRANGE" => lrange(db, args),
        "LINDEX" => lindex(db, args),
        "LSET" => lset(db, args),
        "LINSERT" => linsert(db, args),
        "LREM" => lrem(db, args),
        "RPOPLPUSH" => rpoplpush(db, args),
        _ => return None,
    };
    Some(reply.unwrap_or_else(|err| err))
}

type Outcome = Result<Reply, Reply>;

#[derive(Clone, Copy)]
enum End {
    Left,
    Right,
}

fn arity(args: &Args, min: usize, name: &str) -> Result<(), Reply> {
    if args.len() < min {
        Err(Reply::arity(name))
    } else {
        Ok(())
    }
}

fn exact(args: &Args, len: usize, name: &str) -> Result<(), Reply> {
    if args.len() != len {
        Err(Reply::arity(name))
    } else {
        Ok(())
    }
}

fn int_arg(arg: &[u8]) -> Result<i64, Reply> {
    std::str::from_utf8(arg)
        .ok()
        .and_then(|text| text.parse().ok())
        .ok_or_else(|| Reply::err("value is not an integer or out of range"))
}

fn float_arg(arg: &[u8]) -> Result<f64, Reply> {
    std::str::from_utf8(arg)
        .ok()
        .and_then(|text| text.parse::<f64>().ok())
        .filter(|score| !score.is_nan())
        .ok_or_else(|| Reply::err("value is not a valid float"))
}

fn is_flag(arg: &[u8], flag: &str) -> bool {
    arg.eq_ignore_ascii_case(flag.as_bytes())
}

fn lookup<'a, T>(
    db: &'a mut Db,
    key: &[u8],
    cast: fn(&mut Value) -> Option<&mut T>,
) -> Result<Option<&'a mut T>, Reply> {
    match db.get_mut(key) {
        None => Ok(None),
        Some(value) => cast(value).map(Some).ok_or_else(Reply::wrong_type),
    }
}

fn lookup_or_insert<'a, T>(
    db: &'a mut Db,
    key: &[u8],
    empty: fn() -> Value,
    cast: fn(&mut Value) -> Option<&mut T>,
) -> Result<&'a mut T, Reply> {
    let value = db.entry(key.to_vec()).or_insert_with(empty);
    cast(value).ok_or_else(Reply::wrong_type)
}

fn drop_if_empty(db: &mut Db, key: &[u8]) {
    if db.get(key).map_or(false, Value::is_empty_collection) {
        db.remove(key);
    }
}

// Clamps Redis-style inclusive indices (negative counts from the end).
fn index_range(len: usize, start: i64, stop: i64) -> Option<(usize, usize)> {
    let len = len as i64;
    let start = if start < 0 { (len + start).max(0) } else { start };
    let stop = if stop < 0 { len + stop } else { stop.min(len - 1) };
    if start > stop || start >= len || stop < 0 {
        None
    } else {
        Some((start as usize, stop as usize))
    }
}

fn list_index(len: usize, index: i64) -> Option<usize> {
    let index = if index < 0 { len as i64 + index } else { index };
    if index < 0 || index >= len as i64 {
        None
    } else {
        Some(index as usize)
    }
}

// ---- strings ----

fn get(db: &mut Db, args: &Args) -> Outcome {
    exact(args, 2, "get")?;
    let value = lookup(db, &args[1], Value::as_string)?;
    Ok(Reply::bulk_or_nil(value.cloned()))
}

// Expiry options are parsed and ignored.
fn set(db: &mut Db, args: &Args) -> Outcome {
    arity(args, 3, "set")?;
    let (mut nx, mut xx, mut want_old) = (false, false, false);
    let mut idx = 3;
    while idx < args.len() {
        let option = &args[idx];
        if is_flag(option, "NX") {
            nx = true;
        } else if is_flag(option, "XX") {
            xx = true;
        } else if is_flag(option, "GET") {
            want_old = true;
        } else if is_flag(option, "KEEPTTL") {
            // no expiry to keep
        } else if ["EX", "PX", "EXAT", "PXAT"].iter().any(|f| is_flag(option, f)) {
            idx += 1;
            let amount = args.get(idx).ok_or_else(|| Reply::err("syntax error"))?;
            if int_arg(amount)? <= 0 {
                return Err(Reply::err("invalid expire time in 'set' command"));
            }
        } else {
            return Err(Reply::err("syntax error"));
        }
        idx += 1;
    }
    if nx && xx {
        return Err(Reply::err("syntax error"));
    }

    let old = match db.get_mut(args[1].as_slice()) {
        None => None,
        Some(value) => match value.as_string() {
            Some(data) => Some(data.clone()),
            None if want_old => return Err(Reply::wrong_type()),
            None => Some(Vec::new()),
        },
    };
    let exists = db.contains_key(args[1].as_slice());
    let applies = !(nx && exists) && !(xx && !exists);
    if applies {
        db.insert(args[1].clone(), Value::String(args[2].clone()));
    }

    Ok(match (want_old, applies) {
        (true, _) => Reply::bulk_or_nil(old),
        (false, true) => Reply::ok(),
        (false, false) => Reply::Nil,
    })
}

fn del(db: &mut Db, args: &Args) -> Outcome {
    arity(args, 2, "del")?;
    let removed = args[1..].iter().filter(|key| db.remove(key.as_slice()).is_some()).count();
    Ok(Reply::Integer(removed as i64))
}

fn exists(db: &mut Db, args: &Args) -> Outcome {
    arity(args, 2, "exists")?;
    let found = args[1..].iter().filter(|key| db.contains_key(key.as_slice())).count();
    Ok(Reply::Integer(found as i64))
}

// ---- hashes ----

fn hset(db: &mut Db, args: &Args, legacy: bool) -> Outcome {
    let name = if legacy { "hmset" } else { "hset" };
    if args.len() < 4 || args.len() % 2 != 0 {
        return Err(Reply::arity(name));
    }
    let hash = lookup_or_insert(db, &args[1], Value::empty_hash, Value::as_hash)?;
    let mut added = 0;
    for pair in args[2..].chunks(2) {
        if hash.insert(pair[0].clone(), pair[1].clone()).is_none() {
            added += 1;
        }
    }
    Ok(if legacy { Reply::ok() } else { Reply::Integer(added) })
}

fn hget(db: &mut Db, args: &Args) -> Outcome {
    exact(args, 3, "hget")?;
    let hash = lookup(db, &args[1], Value::as_hash)?;
    Ok(Reply::bulk_or_nil(hash.and_then(|hash| hash.get(&args[2]).cloned())))
}

fn hgetall(db: &mut Db, args: &Args) -> Outcome {
    exact(args, 2, "hgetall")?;
    let flat: Vec<Vec<u8>> = match lookup(db, &args[1], Value::as_hash)? {
        Some(hash) => hash
            .iter()
            .flat_map(|(field, value)| [field.clone(), value.clone()])
            .collect(),
        None => Vec::new(),
    };
    Ok(Reply::bulks(flat))
}

// ---- sets ----

fn sadd(db: &mut Db, args: &Args) -> Outcome {
    arity(args, 3, "sadd")?;
    let set = lookup_or_insert(db, &args[1], Value::empty_set, Value::as_set)?;
    let added = args[2..].iter().filter(|member| set.insert(member.to_vec())).count();
    Ok(Reply::Integer(added as i64))
}

fn smembers(db: &mut Db, args: &Args) -> Outcome {
    exact(args, 2, "smembers")?;
    let members: Vec<Vec<u8>> = match lookup(db, &args[1], Value::as_set)? {
        Some(set) => set.iter().cloned().collect(),
        None => Vec::new(),
    };
    Ok(Reply::bulks(members))
}

// ---- sorted sets ----

fn zadd(db: &mut Db, args: &Args) -> Outcome {
    arity(args, 4, "zadd")?;
    let (mut nx, mut xx, mut changed_count) = (false, false, false);
    let mut idx = 2;
    while idx < args.len() {
        if is_flag(&args[idx], "NX") {
            nx = true;
        } else if is_flag(&args[idx], "XX") {
            xx = true;
        } else if is_flag(&args[idx], "CH") {
            changed_count = true;
        } else {
            break;
        }
        idx += 1;
    }
    let pairs = &args[idx..];
    if pairs.is_empty() || pairs.len() % 2 != 0 || (nx && xx) {
        return Err(Reply::err("syntax error"));
    }
    let scored = pairs
        .chunks(2)
        .map(|pair| float_arg(&pair[0]).map(|score| (score, pair[1].clone())))
        .collect::<Result<Vec<_>, _>>()?;

    let zset = lookup_or_insert(db, &args[1], Value::empty_zset, Value::as_zset)?;
    let (mut added, mut updated) = (0, 0);
    for (score, member) in scored {
        match zset.get_mut(&member) {
            Some(existing) if !nx => {
                if *existing != score {
                    *existing = score;
                    updated += 1;
                }
            }
            Some(_) => {}
            None if !xx => {
                zset.insert(member, score);
                added += 1;
            }
            None => {}
        }
    }
    drop_if_empty(db, &args[1]);
    Ok(Reply::Integer(if changed_count { added + updated } else { added }))
}

fn sorted_members(zset: &hashbrown::HashMap<Vec<u8>, f64>) -> Vec<(Vec<u8>, f64)> {
    let mut members: Vec<_> = zset.iter().map(|(m, s)| (m.clone(), *s)).collect();
    members.sort_by(|a, b| {
        a.1.partial_cmp(&b.1)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.0.cmp(&b.0))
    });
    members
}

fn format_score(score: f64) -> Vec<u8> {
    score.to_string().into_bytes()
}

fn scored_reply(members: Vec<(Vec<u8>, f64)>, with_scores: bool) -> Reply {
    if with_scores {
        Reply::bulks(
            members
                .into_iter()
                .flat_map(|(member, score)| [member, format_score(score)]),
        )
    } else {
        Reply::bulks(members.into_iter().map(|(member, _)| member))
    }
}

fn zset_snapshot(db: &mut Db, key: &[u8]) -> Result<Vec<(Vec<u8>, f64)>, Reply> {
    Ok(lookup(db, key, Value::as_zset)?
        .map(|zset| sorted_members(zset))
        .unwrap_or_default())
}

fn zrange(db: &mut Db, args: &Args, reverse: bool) -> Outcome {
    let name = if reverse { "zrevrange" } else { "zrange" };
    if args.len() != 4 && args.len() != 5 {
        return Err(Reply::arity(name));
    }
    let with_scores = match args.get(4) {
        Some(flag) if is_flag(flag, "WITHSCORES") => true,
        Some(_) => return Err(Reply::err("syntax error")),
        None => false,
    };
    let (start, stop) = (int_arg(&args[2])?, int_arg(&args[3])?);
    let mut members = zset_snapshot(db, &args[1])?;
    if reverse {
        members.reverse();
    }
    let selected: Vec<_> = match index_range(members.len(), start, stop) {
        Some((from, to)) => members.drain(from..=to).collect(),
        None => Vec::new(),
    };
    Ok(scored_reply(selected, with_scores))
}

#[derive(Debug, Clone, Copy)]
struct ScoreBound {
    value: f64,
    exclusive: bool,
}

impl ScoreBound {
    fn parse(arg: &[u8]) -> Result<Self, Reply> {
        let (raw, exclusive) = match arg.strip_prefix(b"(") {
            Some(rest) => (rest, true),
            None => (arg, false),
        };
        let value = float_arg(raw).map_err(|_| Reply::err("min or max is not a float"))?;
        Ok(ScoreBound { value, exclusive })
    }

    fn admits_from_below(&self, score: f64) -> bool {
        if self.exclusive {
            score > self.value
        } else {
            score >= self.value
        }
    }

    fn admits_from_above(&self, score: f64) -> bool {
        if self.exclusive {
            score < self.value
        } else {
            score <= self.value
        }
    }
}

struct RangeOptions {
    with_scores: bool,
    offset: i64,
    count: i64,
}

fn range_options(args: &[Vec<u8>], allow_scores: bool) -> Result<RangeOptions, Reply> {
    let mut options = RangeOptions {
        with_scores: false,
        offset: 0,
        count: -1,
    };
    let mut idx = 0;
    while idx < args.len() {
        if allow_scores && is_flag(&args[idx], "WITHSCORES") {
            options.with_scores = true;
            idx += 1;
        } else if is_flag(&args[idx], "LIMIT") && idx + 2 < args.len() {
            options.offset = int_arg(&args[idx + 1])?;
            options.count = int_arg(&args[idx + 2])?;
            idx += 3;
        } else {
            return Err(Reply::err("syntax error"));
        }
    }
    Ok(options)
}

fn apply_limit<T>(items: Vec<T>, offset: i64, count: i64) -> Vec<T> {
    if offset < 0 {
        return Vec::new();
    }
    let take = if count < 0 { usize::MAX } else { count as usize };
    items.into_iter().skip(offset as usize).take(take).collect()
}

fn zrange_by_score(db: &mut Db, args: &Args, reverse: bool) -> Outcome {
    let name = if reverse { "zrevrangebyscore" } else { "zrangebyscore" };
    arity(args, 4, name)?;
    // ZREVRANGEBYSCORE takes max before min.
    let (min_arg, max_arg) = if reverse { (&args[3], &args[2]) } else { (&args[2], &args[3]) };
    let min = ScoreBound::parse(min_arg)?;
    let max = ScoreBound::parse(max_arg)?;
    let options = range_options(&args[4..], true)?;

    let mut members: Vec<_> = zset_snapshot(db, &args[1])?
        .into_iter()
        .filter(|(_, score)| min.admits_from_below(*score) && max.admits_from_above(*score))
        .collect();
    if reverse {
        members.reverse();
    }
    let members = apply_limit(members, options.offset, options.count);
    Ok(scored_reply(members, options.with_scores))
}

enum LexLimit {
    Min,
    Max,
    Inclusive(Vec<u8>),
    Exclusive(Vec<u8>),
}

impl LexLimit {
    fn parse(arg: &[u8]) -> Result<Self, Reply> {
        match arg.split_first() {
            Some((b'-', [])) => Ok(LexLimit::Min),
            Some((b'+', [])) => Ok(LexLimit::Max),
            Some((b'[', rest)) => Ok(LexLimit::Inclusive(rest.to_vec())),
            Some((b'(', rest)) => Ok(LexLimit::Exclusive(rest.to_vec())),
            _ => Err(Reply::err("min or max not valid string range item")),
        }
    }

    fn admits_from_below(&self, member: &[u8]) -> bool {
        match self {
            LexLimit::Min => true,
            LexLimit::Max => false,
            LexLimit::Inclusive(bound) => member >= bound.as_slice(),
            LexLimit::Exclusive(bound) => member > bound.as_slice(),
        }
    }

    fn admits_from_above(&self, member: &[u8]) -> bool {
        match self {
            LexLimit::Min => false,
            LexLimit::Max => true,
            LexLimit::Inclusive(bound) => member <= bound.as_slice(),
            LexLimit::Exclusive(bound) => member < bound.as_slice(),
        }
    }
}

fn zrange_by_lex(db: &mut Db, args: &Args) -> Outcome {
    arity(args, 4, "zrangebylex")?;
    let min = LexLimit::parse(&args[2])?;
    let max = LexLimit::parse(&args[3])?;
    let options = range_options(&args[4..], false)?;

    let members: Vec<_> = zset_snapshot(db, &args[1])?
        .into_iter()
        .map(|(member, _)| member)
        .filter(|member| min.admits_from_below(member) && max.admits_from_above(member))
        .collect();
    Ok(Reply::bulks(apply_limit(members, options.offset, options.count)))
}

// ---- lists ----

fn push(db: &mut Db, args: &Args, end: End, only_existing: bool) -> Outcome {
    let name = match (end, only_existing) {
        (End::Left, false) => "lpush",
        (End::Right, false) => "rpush",
        (End::Left, true) => "lpushx",
        (End::Right, true) => "rpushx",
    };
    arity(args, 3, name)?;
    let list = if only_existing {
        match lookup(db, &args[1], Value::as_list)? {
            Some(list) => list,
            None => return Ok(Reply::Integer(0)),
        }
    } else {
        lookup_or_insert(db, &args[1], Value::empty_list, Value::as_list)?
    };
    for value in &args[2..] {
        match end {
            End::Left => list.push_front(value.clone()),
            End::Right => list.push_back(value.clone()),
        }
    }
    Ok(Reply::Integer(list.len() as i64))
}

fn pop(db: &mut Db, args: &Args, end: End) -> Outcome {
    let name = match end {
        End::Left => "lpop",
        End::Right => "rpop",
    };
    if args.len() != 2 && args.len() != 3 {
        return Err(Reply::arity(name));
    }
    let count = match args.get(2) {
        Some(raw) => match int_arg(raw)? {
            n if n < 0 => return Err(Reply::err("value is out of range, must be positive")),
            n => Some(n as usize),
        },
        None => None,
    };

    let list = match lookup(db, &args[1], Value::as_list)? {
        Some(list) => list,
        None => return Ok(Reply::Nil),
    };
    let take_one = |list: &mut VecDeque<Vec<u8>>| match end {
        End::Left => list.pop_front(),
        End::Right => list.pop_back(),
    };
    let reply = match count {
        None => Reply::bulk_or_nil(take_one(list)),
        Some(count) => {
            let popped: Vec<Vec<u8>> = std::iter::from_fn(|| take_one(list)).take(count).collect();
            Reply::bulks(popped)
        }
    };
    drop_if_empty(db, &args[1]);
    Ok(reply)
}

fn lrange(db: &mut Db, args: &Args) -> Outcome {
    exact(args, 4, "lrange")?;
    let (start, stop) = (int_arg(&args[2])?, int_arg(&args[3])?);
    let items: Vec<Vec<u8>> = match lookup(db, &args[1], Value::as_list)? {
        Some(list) => match index_range(list.len(), start, stop) {
            Some((from, to)) => list.range(from..=to).cloned().collect(),
            None => Vec::new(),
        },
        None => Vec::new(),
    };
    Ok(Reply::bulks(items))
}

fn lindex(db: &mut Db, args: &Args) -> Outcome {
    exact(args, 3, "lindex")?;
    let index = int_arg(&args[2])?;
    let item = lookup(db, &args[1], Value::as_list)?
        .and_then(|list| list_index(list.len(), index).and_then(|i| list.get(i).cloned()));
    Ok(Reply::bulk_or_nil(item))
}

fn lset(db: &mut Db, args: &Args) -> Outcome {
    exact(args, 4, "lset")?;
    let index = int_arg(&args[2])?;
    let list = lookup(db, &args[1], Value::as_list)?.ok_or_else(|| Reply::err("no such key"))?;
    let slot = list_index(list.len(), index)
        .and_then(|i| list.get_mut(i))
        .ok_or_else(|| Reply::err("index out of range"))?;
    *slot = args[3].clone();
    Ok(Reply::ok())
}

fn linsert(db: &mut Db, args: &Args) -> Outcome {
    exact(args, 5, "linsert")?;
    let after = if is_flag(&args[2], "AFTER") {
        true
    } else if is_flag(&args[2], "BEFORE") {
        false
    } else {
        return Err(Reply::err("syntax error"));
    };
    let list = match lookup(db, &args[1], Value::as_list)? {
        Some(list) => list,
        None => return Ok(Reply::Integer(0)),
    };
    match list.iter().position(|item| *item == args[3]) {
        Some(pos) => {
            list.insert(if after { pos + 1 } else { pos }, args[4].clone());
            Ok(Reply::Integer(list.len() as i64))
        }
        None => Ok(Reply::Integer(-1)),
    }
}

fn lrem(db: &mut Db, args: &Args) -> Outcome {
    exact(args, 4, "lrem")?;
    let count = int_arg(&args[2])?;
    let target = &args[3];
    let list = match lookup(db, &args[1], Value::as_list)? {
        Some(list) => list,
        None => return Ok(Reply::Integer(0)),
    };
    let limit = if count == 0 { usize::MAX } else { count.unsigned_abs() as usize };
    let mut removed = 0;
    if count >= 0 {
        let mut idx = 0;
        while idx < list.len() && removed < limit {
            if list[idx] == *target {
                list.remove(idx);
                removed += 1;
            } else {
                idx += 1;
            }
        }
    } else {
        let mut idx = list.len();
        while idx > 0 && removed < limit {
            idx -= 1;
            if list[idx] == *target {
                list.remove(idx);
                removed += 1;
            }
        }
    }
    drop_if_empty(db, &args[1]);
    Ok(Reply::Integer(removed as i64))
}

fn rpoplpush(db: &mut Db, args: &Args) -> Outcome {
    exact(args, 3, "rpoplpush")?;
    // Check the destination type before touching the source.
    lookup(db, &args[2], Value::as_list)?;
    let item = match lookup(db, &args[1], Value::as_list)? {
        Some(list) => list.pop_back(),
        None => None,
    };
    let item = match item {
        Some(item) => item,
        None => return Ok(Reply::Nil),
    };
    drop_if_empty(db, &args[1]);
    let destination = lookup_or_insert(db, &args[2], Value::empty_list, Value::as_list)?;
    destination.push_front(item.clone());
    Ok(Reply::Bulk(item))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(db: &mut Db, line: &str) -> Reply {
        let args: Vec<Vec<u8>> = line.split_whitespace().map(|s| s.as_bytes().to_vec()).collect();
        let name = line.split_whitespace().next().unwrap().to_ascii_uppercase();
        execute(db, &name, &args).expect("known command")
    }

    fn bulks(items: &[&str]) -> Reply {
        Reply::bulks(items.iter().map(|s| s.as_bytes().to_vec()))
    }

    #[test]
    fn set_respects_nx_and_xx() {
        let mut db = Db::new();
        assert_eq!(run(&mut db, "SET k v1 XX"), Reply::Nil);
        assert_eq!(run(&mut db, "SET k v1 NX"), Reply::ok());
        assert_eq!(run(&mut db, "SET k v2 NX"), Reply::Nil);
        assert_eq!(run(&mut db, "SET k v3 XX EX 10"), Reply::ok());
        assert_eq!(run(&mut db, "GET k"), Reply::Bulk(b"v3".to_vec()));
        assert_eq!(run(&mut db, "SET k v4 GET"), Reply::Bulk(b"v3".to_vec()));
    }

    #[test]
    fn wrong_type_is_reported() {
        let mut db = Db::new();
        run(&mut db, "LPUSH l a");
        assert_eq!(run(&mut db, "GET l"), Reply::wrong_type());
        assert_eq!(run(&mut db, "HGET l f"), Reply::wrong_type());
        assert_eq!(run(&mut db, "SADD l x"), Reply::wrong_type());
    }

    #[test]
    fn hset_counts_new_fields_only() {
        let mut db = Db::new();
        assert_eq!(run(&mut db, "HSET h a 1 b 2"), Reply::Integer(2));
        assert_eq!(run(&mut db, "HSET h a 3"), Reply::Integer(0));
        assert_eq!(run(&mut db, "HMSET h c 4"), Reply::ok());
        assert_eq!(run(&mut db, "HGET h a"), Reply::Bulk(b"3".to_vec()));
        assert_eq!(run(&mut db, "HGET h zz"), Reply::Nil);
    }

    #[test]
    fn zrange_orders_by_score_then_member() {
        let mut db = Db::new();
        assert_eq!(run(&mut db, "ZADD z 3 c 1 b 1 a 2 d"), Reply::Integer(4));
        assert_eq!(run(&mut db, "ZRANGE z 0 -1"), bulks(&["a", "b", "d", "c"]));
        assert_eq!(run(&mut db, "ZREVRANGE z 0 1"), bulks(&["c", "d"]));
        assert_eq!(run(&mut db, "ZRANGE z 0 0 WITHSCORES"), bulks(&["a", "1"]));
    }

    #[test]
    fn zrangebyscore_handles_bounds_and_limit() {
        let mut db = Db::new();
        run(&mut db, "ZADD z 1 a 2 b 3 c 4 d");
        assert_eq!(run(&mut db, "ZRANGEBYSCORE z (1 3"), bulks(&["b", "c"]));
        assert_eq!(run(&mut db, "ZRANGEBYSCORE z -inf +inf LIMIT 1 2"), bulks(&["b", "c"]));
        assert_eq!(run(&mut db, "ZRANGEBYSCORE z 2 +inf LIMIT 0 -1"), bulks(&["b", "c", "d"]));
        assert_eq!(run(&mut db, "ZREVRANGEBYSCORE z +inf (2"), bulks(&["d", "c"]));
        assert_eq!(run(&mut db, "ZRANGEBYSCORE z 4 4 WITHSCORES"), bulks(&["d", "4"]));
    }

    #[test]
    fn zrangebylex_filters_members() {
        let mut db = Db::new();
        run(&mut db, "ZADD z 0 a 0 b 0 c 0 d");
        assert_eq!(run(&mut db, "ZRANGEBYLEX z [b (d"), bulks(&["b", "c"]));
        assert_eq!(run(&mut db, "ZRANGEBYLEX z - + LIMIT 2 5"), bulks(&["c", "d"]));
        assert!(run(&mut db, "ZRANGEBYLEX z b d").is_error());
    }

    #[test]
    fn list_pushes_and_pops_from_both_ends() {
        let mut db = Db::new();
        assert_eq!(run(&mut db, "LPUSHX l a"), Reply::Integer(0));
        assert_eq!(run(&mut db, "RPUSH l a b"), Reply::Integer(2));
        assert_eq!(run(&mut db, "LPUSH l z"), Reply::Integer(3));
        assert_eq!(run(&mut db, "LRANGE l 0 -1"), bulks(&["z", "a", "b"]));
        assert_eq!(run(&mut db, "LINDEX l -1"), Reply::Bulk(b"b".to_vec()));
        assert_eq!(run(&mut db, "LPOP l"), Reply::Bulk(b"z".to_vec()));
        assert_eq!(run(&mut db, "RPOP l"), Reply::Bulk(b"b".to_vec()));
        assert_eq!(run(&mut db, "RPOP l"), Reply::Bulk(b"a".to_vec()));
        assert_eq!(run(&mut db, "RPOP l"), Reply::Nil);
        assert!(!db.contains_key(b"l".as_slice()));
    }

    #[test]
    fn linsert_lset_and_lrem() {
        let mut db = Db::new();
        run(&mut db, "RPUSH l a b a c a");
        assert_eq!(run(&mut db, "LINSERT l BEFORE b x"), Reply::Integer(6));
        assert_eq!(run(&mut db, "LINSERT l AFTER missing y"), Reply::Integer(-1));
        assert_eq!(run(&mut db, "LSET l 0 A"), Reply::ok());
        assert!(run(&mut db, "LSET l 99 q").is_error());
        assert_eq!(run(&mut db, "LREM l -1 a"), Reply::Integer(1));
        assert_eq!(run(&mut db, "LRANGE l 0 -1"), bulks(&["A", "x", "b", "a", "c"]));
        assert_eq!(run(&mut db, "LREM l 0 a"), Reply::Integer(1));
    }

    #[test]
    fn rpoplpush_moves_tail_to_head() {
        let mut db = Db::new();
        run(&mut db, "RPUSH src 1 2 3");
        assert_eq!(run(&mut db, "RPOPLPUSH src dst"), Reply::Bulk(b"3".to_vec()));
        assert_eq!(run(&mut db, "LRANGE dst 0 -1"), bulks(&["3"]));
        assert_eq!(run(&mut db, "RPOPLPUSH empty dst"), Reply::Nil);
        run(&mut db, "SET str x");
        assert_eq!(run(&mut db, "RPOPLPUSH src str"), Reply::wrong_type());
        assert_eq!(run(&mut db, "LRANGE src 0 -1"), bulks(&["1", "2"]));
    }

    #[test]
    fn index_range_clamps_like_redis() {
        assert_eq!(index_range(5, 0, -1), Some((0, 4)));
        assert_eq!(index_range(5, -2, 100), Some((3, 4)));
        assert_eq!(index_range(5, 3, 1), None);
        assert_eq!(index_range(0, 0, -1), None);
        assert_eq!(index_range(5, -100, -6), None);
    }

    #[test]
    fn unknown_commands_are_not_claimed() {
        let mut db = Db::new();
        assert!(execute(&mut db, "PING", &[b"PING".to_vec()]).is_none());
    }
}
