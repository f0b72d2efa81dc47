//! Redis implementation of [`FrontierStore`].
//!
//! Bit arrays are Redis strings (`GETBIT` / `SETBIT`), counter arrays are
//! hashes keyed by offset, queues are lists or sorted sets and locks are plain
//! keys written with `SET NX PX`.
//!
//! Every filter call is pipelined into one round trip. The priority pop runs in
//! `MULTI`/`EXEC` on standalone and sentinel deployments and as a Lua script on
//! a cluster, where multi-command transactions are unavailable.
//!
//! Blocking pops go through a dedicated connection so a worker waiting on
//! `BRPOP` does not stall its own enqueues on the shared multiplexed one.

use super::{FrontierStore, StoreSettings, StoreTopology};
use crate::error::Result;
use async_trait::async_trait;
use redis::aio::{ConnectionLike, ConnectionManager, ConnectionManagerConfig};
use redis::cluster::ClusterClientBuilder;
use redis::cluster_async::ClusterConnection;
use redis::sentinel::Sentinel;
use redis::{Client, Cmd, Pipeline, RedisFuture, Script, Value, cmd};
use std::time::Duration;
use tracing::{debug, info};

/// Upper bound of a single blocking pop; also the response timeout of the
/// dedicated blocking connection.
const MAX_BLOCKING_WAIT: Duration = Duration::from_secs(300);

const ZPOP_MIN_SCRIPT: &str = r#"
local result = redis.call('ZRANGE', KEYS[1], 0, 0)
local member = result[1]
if member then
    redis.call('ZREMRANGEBYRANK', KEYS[1], 0, 0)
    return member
end
return false
"#;

const DECR_FLOOR_SCRIPT: &str = r#"
for i = 1, #ARGV do
    local current = tonumber(redis.call('HGET', KEYS[1], ARGV[i]) or '0')
    if current > 0 then
        redis.call('HINCRBY', KEYS[1], ARGV[i], -1)
    end
end
return 1
"#;

const UNLOCK_SCRIPT: &str = r#"
if redis.call('GET', KEYS[1]) == ARGV[1] then
    return redis.call('DEL', KEYS[1])
end
return 0
"#;

#[derive(Clone)]
enum StoreConnection {
    Single(ConnectionManager),
    Cluster(ClusterConnection),
}

impl ConnectionLike for StoreConnection {
    fn req_packed_command<'a>(&'a mut self, cmd: &'a Cmd) -> RedisFuture<'a, Value> {
        match self {
            StoreConnection::Single(conn) => conn.req_packed_command(cmd),
            StoreConnection::Cluster(conn) => conn.req_packed_command(cmd),
        }
    }

    fn req_packed_commands<'a>(
        &'a mut self,
        cmd: &'a Pipeline,
        offset: usize,
        count: usize,
    ) -> RedisFuture<'a, Vec<Value>> {
        match self {
            StoreConnection::Single(conn) => conn.req_packed_commands(cmd, offset, count),
            StoreConnection::Cluster(conn) => conn.req_packed_commands(cmd, offset, count),
        }
    }

    fn get_db(&self) -> i64 {
        match self {
            StoreConnection::Single(conn) => conn.get_db(),
            StoreConnection::Cluster(conn) => conn.get_db(),
        }
    }
}

/// Redis-backed shared store.
#[derive(Clone)]
pub struct RedisStore {
    shared: StoreConnection,
    blocking: StoreConnection,
    topology: StoreTopology,
    zpop_min: Script,
    decr_floor: Script,
    unlock: Script,
}

impl RedisStore {
    /// Resolves `settings` and connects. Fails fast when the store is unreachable.
    pub async fn connect(settings: &StoreSettings) -> Result<Self> {
        let topology = settings.resolve()?;
        Self::connect_topology(topology).await
    }

    pub async fn connect_topology(topology: StoreTopology) -> Result<Self> {
        debug!("Connecting to {} store", topology.name());
        let (shared, blocking) = match &topology {
            StoreTopology::Standalone { url } => {
                let client = Client::open(url.as_str())?;
                Self::single_pair(client).await?
            }
            StoreTopology::Sentinel { service, nodes } => {
                let mut sentinel = Sentinel::build(nodes.clone())?;
                let client = sentinel.async_master_for(service, None).await?;
                Self::single_pair(client).await?
            }
            StoreTopology::Cluster { nodes, password } => {
                let mut builder = ClusterClientBuilder::new(nodes.clone());
                let mut blocking_builder = ClusterClientBuilder::new(nodes.clone())
                    .response_timeout(MAX_BLOCKING_WAIT + Duration::from_secs(5));
                if let Some(password) = password {
                    builder = builder.password(password.clone());
                    blocking_builder = blocking_builder.password(password.clone());
                }
                let shared = builder.build()?.get_async_connection().await?;
                let blocking = blocking_builder.build()?.get_async_connection().await?;
                (StoreConnection::Cluster(shared), StoreConnection::Cluster(blocking))
            }
        };
        info!("Connected to {} store", topology.name());

        Ok(Self {
            shared,
            blocking,
            topology,
            zpop_min: Script::new(ZPOP_MIN_SCRIPT),
            decr_floor: Script::new(DECR_FLOOR_SCRIPT),
            unlock: Script::new(UNLOCK_SCRIPT),
        })
    }

    async fn single_pair(client: Client) -> Result<(StoreConnection, StoreConnection)> {
        let shared = ConnectionManager::new(client.clone()).await?;
        let blocking_config = ConnectionManagerConfig::new()
            .set_response_timeout(MAX_BLOCKING_WAIT + Duration::from_secs(5));
        let blocking = ConnectionManager::new_with_config(client, blocking_config).await?;
        Ok((StoreConnection::Single(shared), StoreConnection::Single(blocking)))
    }

    pub fn topology(&self) -> &StoreTopology {
        &self.topology
    }

    async fn pop_list(
        &self,
        key: &str,
        timeout: Duration,
        instant: &str,
        blocking: &str,
    ) -> Result<Option<Vec<u8>>> {
        if timeout.is_zero() {
            let mut conn = self.shared.clone();
            let value: Option<Vec<u8>> = cmd(instant).arg(key).query_async(&mut conn).await?;
            return Ok(value);
        }

        let mut conn = self.blocking.clone();
        let wait = timeout.min(MAX_BLOCKING_WAIT).as_secs_f64();
        let reply: Option<(Vec<u8>, Vec<u8>)> = cmd(blocking)
            .arg(key)
            .arg(wait)
            .query_async(&mut conn)
            .await?;
        Ok(reply.map(|(_, value)| value))
    }
}

#[async_trait]
impl FrontierStore for RedisStore {
    async fn get_bits(&self, key: &str, offsets: &[u64]) -> Result<Vec<bool>> {
        if offsets.is_empty() {
            return Ok(Vec::new());
        }
        let mut pipe = redis::pipe();
        for offset in offsets {
            pipe.cmd("GETBIT").arg(key).arg(*offset);
        }
        let mut conn = self.shared.clone();
        let bits: Vec<i64> = pipe.query_async(&mut conn).await?;
        Ok(bits.into_iter().map(|bit| bit == 1).collect())
    }

    async fn set_bits(&self, key: &str, offsets: &[u64]) -> Result<()> {
        if offsets.is_empty() {
            return Ok(());
        }
        let mut pipe = redis::pipe();
        for offset in offsets {
            pipe.cmd("SETBIT").arg(key).arg(*offset).arg(1).ignore();
        }
        let mut conn = self.shared.clone();
        let _: () = pipe.query_async(&mut conn).await?;
        Ok(())
    }

    async fn get_counters(&self, key: &str, offsets: &[u64]) -> Result<Vec<i64>> {
        if offsets.is_empty() {
            return Ok(Vec::new());
        }
        let mut conn = self.shared.clone();
        let counters: Vec<Option<i64>> = cmd("HMGET")
            .arg(key)
            .arg(offsets)
            .query_async(&mut conn)
            .await?;
        Ok(counters.into_iter().map(|c| c.unwrap_or(0)).collect())
    }

    async fn incr_counters(&self, key: &str, offsets: &[u64]) -> Result<()> {
        if offsets.is_empty() {
            return Ok(());
        }
        let mut pipe = redis::pipe();
        for offset in offsets {
            pipe.cmd("HINCRBY").arg(key).arg(*offset).arg(1).ignore();
        }
        let mut conn = self.shared.clone();
        let _: () = pipe.query_async(&mut conn).await?;
        Ok(())
    }

    async fn decr_counters(&self, key: &str, offsets: &[u64]) -> Result<()> {
        if offsets.is_empty() {
            return Ok(());
        }
        let mut invocation = self.decr_floor.key(key);
        for offset in offsets {
            invocation.arg(*offset);
        }
        let mut conn = self.shared.clone();
        let _: i64 = invocation.invoke_async(&mut conn).await?;
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let mut conn = self.shared.clone();
        let exists: bool = cmd("EXISTS").arg(key).query_async(&mut conn).await?;
        Ok(exists)
    }

    async fn delete(&self, keys: &[String]) -> Result<()> {
        // One key per command: shard keys of a filter live in different cluster slots.
        let mut conn = self.shared.clone();
        for key in keys {
            let _: i64 = cmd("DEL").arg(key).query_async(&mut conn).await?;
        }
        Ok(())
    }

    async fn push_head(&self, key: &str, value: Vec<u8>) -> Result<()> {
        let mut conn = self.shared.clone();
        let _: i64 = cmd("LPUSH").arg(key).arg(value).query_async(&mut conn).await?;
        Ok(())
    }

    async fn pop_head(&self, key: &str, timeout: Duration) -> Result<Option<Vec<u8>>> {
        self.pop_list(key, timeout, "LPOP", "BLPOP").await
    }

    async fn pop_tail(&self, key: &str, timeout: Duration) -> Result<Option<Vec<u8>>> {
        self.pop_list(key, timeout, "RPOP", "BRPOP").await
    }

    async fn list_len(&self, key: &str) -> Result<usize> {
        let mut conn = self.shared.clone();
        let len: usize = cmd("LLEN").arg(key).query_async(&mut conn).await?;
        Ok(len)
    }

    async fn zadd(&self, key: &str, score: f64, member: Vec<u8>) -> Result<()> {
        let mut conn = self.shared.clone();
        let _: i64 = cmd("ZADD")
            .arg(key)
            .arg(score)
            .arg(member)
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn zpop_min(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let mut conn = self.shared.clone();
        if self.topology.is_cluster() {
            let member: Option<Vec<u8>> = self.zpop_min.key(key).invoke_async(&mut conn).await?;
            return Ok(member);
        }

        let (members,): (Vec<Vec<u8>>,) = redis::pipe()
            .atomic()
            .cmd("ZRANGE")
            .arg(key)
            .arg(0)
            .arg(0)
            .cmd("ZREMRANGEBYRANK")
            .arg(key)
            .arg(0)
            .arg(0)
            .ignore()
            .query_async(&mut conn)
            .await?;
        Ok(members.into_iter().next())
    }

    async fn zcard(&self, key: &str) -> Result<usize> {
        let mut conn = self.shared.clone();
        let len: usize = cmd("ZCARD").arg(key).query_async(&mut conn).await?;
        Ok(len)
    }

    async fn try_lock(&self, key: &str, token: &str, ttl: Duration) -> Result<bool> {
        let mut conn = self.shared.clone();
        let ttl_ms = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1);
        let reply: Option<String> = cmd("SET")
            .arg(key)
            .arg(token)
            .arg("NX")
            .arg("PX")
            .arg(ttl_ms)
            .query_async(&mut conn)
            .await?;
        Ok(reply.is_some())
    }

    async fn unlock(&self, key: &str, token: &str) -> Result<bool> {
        let mut conn = self.shared.clone();
        let deleted: i64 = self.unlock.key(key).arg(token).invoke_async(&mut conn).await?;
        Ok(deleted == 1)
    }
}
