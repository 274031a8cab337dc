/// Hash field holding a field record's version.
pub const VERSION_FIELD: &str = "__ver";

/// Lua script for atomic check-and-set (set-if-not-exists).
///
/// KEYS\[1\] = the data key
/// ARGV\[1\] = value to set
/// ARGV\[2\] = TTL in milliseconds (0 means no expiry)
///
/// Returns 1 if the key was newly set, 0 if it already existed.
pub const CHECK_AND_SET: &str = r"
local existed = redis.call('EXISTS', KEYS[1])
if existed == 1 then
    return 0
end
redis.call('SET', KEYS[1], ARGV[1])
local ttl = tonumber(ARGV[2])
if ttl > 0 then
    redis.call('PEXPIRE', KEYS[1], ttl)
end
return 1
";

/// Lua script that merges fields into a hash, bumps its version, and resets
/// its TTL.
///
/// KEYS\[1\] = the hash key
/// KEYS\[2\] = the store-wide version high-water key
/// ARGV\[1\] = TTL in milliseconds (0 means no expiry)
/// ARGV\[2..\] = alternating field names and values
///
/// A new hash takes its version from `INCR` on KEYS\[2\], so a key that was
/// deleted or expired never gets an old version back. Returns the new
/// version.
pub const SET_FIELDS: &str = r"
local ver
if redis.call('EXISTS', KEYS[1]) == 1 then
    ver = redis.call('HINCRBY', KEYS[1], '__ver', 1)
    if ver > tonumber(redis.call('GET', KEYS[2]) or '0') then
        redis.call('SET', KEYS[2], ver)
    end
else
    ver = redis.call('INCR', KEYS[2])
    redis.call('HSET', KEYS[1], '__ver', ver)
end
if #ARGV > 1 then
    redis.call('HSET', KEYS[1], unpack(ARGV, 2))
end
local ttl = tonumber(ARGV[1])
if ttl > 0 then
    redis.call('PEXPIRE', KEYS[1], ttl)
else
    redis.call('PERSIST', KEYS[1])
end
return ver
";

/// Lua script for compare-and-set on a versioned hash.
///
/// KEYS\[1\] = the hash key
/// KEYS\[2\] = the store-wide version high-water key
/// ARGV\[1\] = expected version (0 means the hash must not exist)
/// ARGV\[2\] = TTL in milliseconds (0 means no expiry)
/// ARGV\[3..\] = alternating field names and values
///
/// Versions are issued the same way as in [`SET_FIELDS`].
///
/// Returns a two-element array:
///   - `[1, new_ver]` on success
///   - `[0, cur_ver]` on conflict (`cur_ver` is 0 if the hash is missing)
pub const CAS_FIELDS: &str = r"
local expected = tonumber(ARGV[1])
local exists = redis.call('EXISTS', KEYS[1]) == 1
local cur = 0
if exists then
    cur = tonumber(redis.call('HGET', KEYS[1], '__ver')) or 0
end
if cur ~= expected then
    return {0, cur}
end
local ver
if exists then
    ver = redis.call('HINCRBY', KEYS[1], '__ver', 1)
    if ver > tonumber(redis.call('GET', KEYS[2]) or '0') then
        redis.call('SET', KEYS[2], ver)
    end
else
    ver = redis.call('INCR', KEYS[2])
    redis.call('HSET', KEYS[1], '__ver', ver)
end
if #ARGV > 2 then
    redis.call('HSET', KEYS[1], unpack(ARGV, 3))
end
local ttl = tonumber(ARGV[2])
if ttl > 0 then
    redis.call('PEXPIRE', KEYS[1], ttl)
else
    redis.call('PERSIST', KEYS[1])
end
return {1, ver}
";
