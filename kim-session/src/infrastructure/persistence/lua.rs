//! 会话存储的 Lua 脚本
//!
//! 会话键与用户设备索引两个键的多步一致性无法在客户端用命令序列维持
//! （并发登录/删除会交错），全部编排放到服务端原子执行。
//! 两个键共用 `{user_id}` 哈希标签，分片部署下落在同一槽位。

/// 存储会话：SET 会话键（带 TTL）、SADD 设备索引、EXPIRE 索引
pub const STORE_SESSION_SCRIPT: &str = r#"
local sessionKey = KEYS[1]
local setKey = KEYS[2]
local sessionData = ARGV[1]
local deviceId = ARGV[2]
local expireSeconds = tonumber(ARGV[3])

redis.call('SET', sessionKey, sessionData, 'EX', expireSeconds)
redis.call('SADD', setKey, deviceId)
redis.call('EXPIRE', setKey, expireSeconds)

return 1
"#;

/// 读取用户全部会话：SMEMBERS 索引，逐个 GET，
/// 已过期的设备顺带 SREM 懒清理，返回会话 JSON 数组
pub const GET_SESSIONS_BY_USER_ID_SCRIPT: &str = r#"
local setKey = KEYS[1]
local userId = ARGV[1]

local deviceIds = redis.call('SMEMBERS', setKey)
local sessions = {}

for _, deviceId in ipairs(deviceIds) do
    local sessionKey = 'kim:user:session:{' .. userId .. '}:' .. deviceId
    local sessionData = redis.call('GET', sessionKey)
    if sessionData then
        table.insert(sessions, sessionData)
    else
        -- 会话已过期，清理索引残留
        redis.call('SREM', setKey, deviceId)
    end
end

return sessions
"#;

/// 删除单个会话：EXISTS 判定返回值，DEL + SREM 总是执行
/// 返回 1 表示删除成功，0 表示会话不存在
pub const DELETE_SESSION_SCRIPT: &str = r#"
local sessionKey = KEYS[1]
local setKey = KEYS[2]
local deviceId = ARGV[1]

local existed = redis.call('EXISTS', sessionKey)
redis.call('DEL', sessionKey)
redis.call('SREM', setKey, deviceId)

return existed
"#;

/// 删除用户全部会话，返回实际删除的会话数
pub const DELETE_SESSIONS_BY_USER_ID_SCRIPT: &str = r#"
local setKey = KEYS[1]
local userId = ARGV[1]

local deviceIds = redis.call('SMEMBERS', setKey)
local deleted = 0

for _, deviceId in ipairs(deviceIds) do
    local sessionKey = 'kim:user:session:{' .. userId .. '}:' .. deviceId
    deleted = deleted + redis.call('DEL', sessionKey)
end

redis.call('DEL', setKey)

return deleted
"#;

/// 刷新会话 TTL：改写 last_active_at 后整体回写并重置过期时间
/// 返回 1 成功，0 会话不存在，-1 JSON 解析失败
pub const REFRESH_SESSION_TTL_SCRIPT: &str = r#"
local sessionKey = KEYS[1]
local lastActiveAt = ARGV[1]
local expireSeconds = tonumber(ARGV[2])

local sessionData = redis.call('GET', sessionKey)
if not sessionData then
    return 0
end

local ok, session = pcall(cjson.decode, sessionData)
if not ok or not session then
    return -1
end

session.last_active_at = tonumber(lastActiveAt)
local updatedData = cjson.encode(session)

redis.call('SET', sessionKey, updatedData, 'EX', expireSeconds)

return 1
"#;
