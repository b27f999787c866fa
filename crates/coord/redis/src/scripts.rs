//! Lua scripts backing the lock and queue primitives.
//!
//! Redis executes a script as one indivisible operation, which is what keeps
//! a queue's list and its index from ever being observed out of sync, and
//! what makes lock release/extend conditional on the owner token without a
//! read-check-write race.

/// Acquire a lock (`SET NX PX`).
///
/// KEYS\[1\] = lock key
/// ARGV\[1\] = owner token
/// ARGV\[2\] = lease in milliseconds
///
/// Returns 1 if acquired, 0 otherwise.
pub const LOCK_ACQUIRE: &str = r"
local ok = redis.call('SET', KEYS[1], ARGV[1], 'NX', 'PX', ARGV[2])
if ok then
    return 1
end
return 0
";

/// Release a lock if the owner token still matches.
///
/// KEYS\[1\] = lock key
/// ARGV\[1\] = owner token
///
/// Returns 1 if released, 0 if not held by this owner.
pub const LOCK_RELEASE: &str = r"
local owner = redis.call('GET', KEYS[1])
if owner == ARGV[1] then
    redis.call('DEL', KEYS[1])
    return 1
end
return 0
";

/// Add time on top of a lock's remaining lease if the owner token still
/// matches.
///
/// KEYS\[1\] = lock key
/// ARGV\[1\] = owner token
/// ARGV\[2\] = additional milliseconds
///
/// Returns 1 if extended, 0 if not held by this owner.
pub const LOCK_DELAY: &str = r"
local owner = redis.call('GET', KEYS[1])
if owner == ARGV[1] then
    local remaining = redis.call('PTTL', KEYS[1])
    if remaining < 0 then
        remaining = 0
    end
    redis.call('PEXPIRE', KEYS[1], remaining + tonumber(ARGV[2]))
    return 1
end
return 0
";

/// Extend a lock's lease if the owner token still matches.
///
/// KEYS\[1\] = lock key
/// ARGV\[1\] = owner token
/// ARGV\[2\] = new lease in milliseconds
///
/// Returns 1 if extended, 0 if not held by this owner.
pub const LOCK_EXTEND: &str = r"
local owner = redis.call('GET', KEYS[1])
if owner == ARGV[1] then
    redis.call('PEXPIRE', KEYS[1], ARGV[2])
    return 1
end
return 0
";

/// Enqueue with duplicate rejection: append only if the value's index count
/// is zero, keeping list and index in step.
///
/// KEYS\[1\] = list key
/// KEYS\[2\] = index hash key
/// ARGV\[1\] = value
///
/// Returns 1 if appended, 0 if rejected as a duplicate.
pub const ENQUEUE_DEDUP: &str = r"
local count = tonumber(redis.call('HGET', KEYS[2], ARGV[1]) or '0')
if count > 0 then
    return 0
end
redis.call('RPUSH', KEYS[1], ARGV[1])
redis.call('HINCRBY', KEYS[2], ARGV[1], 1)
return 1
";

/// Unconditional enqueue: append and increment the value's index count.
///
/// KEYS\[1\] = list key
/// KEYS\[2\] = index hash key
/// ARGV\[1\] = value
///
/// Returns 1.
pub const ENQUEUE: &str = r"
redis.call('RPUSH', KEYS[1], ARGV[1])
redis.call('HINCRBY', KEYS[2], ARGV[1], 1)
return 1
";

/// Pop the list head and decrement its index count, deleting the index field
/// when the count reaches zero.
///
/// KEYS\[1\] = list key
/// KEYS\[2\] = index hash key
///
/// Returns the popped value, or nil if the list is empty.
pub const DEQUEUE: &str = r"
local value = redis.call('LPOP', KEYS[1])
if not value then
    return false
end
local left = redis.call('HINCRBY', KEYS[2], value, -1)
if left <= 0 then
    redis.call('HDEL', KEYS[2], value)
end
return value
";

/// Remove occurrences of a value (`LREM` semantics: positive count from the
/// head, negative from the tail, zero removes all), then decrement the index
/// by the number actually removed.
///
/// KEYS\[1\] = list key
/// KEYS\[2\] = index hash key
/// ARGV\[1\] = value
/// ARGV\[2\] = count
///
/// Returns the number of elements removed.
pub const REMOVE_VALUE: &str = r"
local removed = redis.call('LREM', KEYS[1], tonumber(ARGV[2]), ARGV[1])
if removed > 0 then
    local left = redis.call('HINCRBY', KEYS[2], ARGV[1], -removed)
    if left <= 0 then
        redis.call('HDEL', KEYS[2], ARGV[1])
    end
end
return removed
";
