use async_trait::async_trait;
use chrono::{DateTime, Utc};
use curtain_core::{
    ClaimOutcome, ConfirmOutcome, Holding, Reservation, ReservationDraft, ReservationStatus,
    SeatLedger, SlotKey, StorageSeatId, StoreError, StoreResult,
};
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use serde::de::DeserializeOwned;
use std::fmt::Display;
use tracing::{debug, info, warn};
use uuid::Uuid;

// ============================================================================
// Key layout
// ============================================================================
//
// claim:{perf}:{date}:{time}:{seat}   "h:{holding}:{expiresMs}" | "r:{reservation}"
// holding:{id}                         holding JSON
// reservation:{id}                     reservation JSON
// slot:{perf}:{date}:{time}:holdings   set of holding ids
// slot:{perf}:{date}:{time}:reservations
// user:{id}:holdings | user:{id}:reservations
// holdings:expiry                      zset, score = expiresMs,
//                                      member = ["{id}", slot set, user set]

const EXPIRY_INDEX: &str = "holdings:expiry";

fn slot_prefix(slot: &SlotKey) -> String {
    format!("{}:{}:{}", slot.performance_id, slot.date_string(), slot.time)
}

fn claim_key(slot: &SlotKey, seat: &StorageSeatId) -> String {
    format!("claim:{}:{}", slot_prefix(slot), seat)
}

fn holding_key(id: Uuid) -> String {
    format!("holding:{}", id)
}

fn reservation_key(id: Uuid) -> String {
    format!("reservation:{}", id)
}

fn slot_holdings_key(slot: &SlotKey) -> String {
    format!("slot:{}:holdings", slot_prefix(slot))
}

fn slot_reservations_key(slot: &SlotKey) -> String {
    format!("slot:{}:reservations", slot_prefix(slot))
}

fn user_holdings_key(user_id: &str) -> String {
    format!("user:{}:holdings", user_id)
}

fn user_reservations_key(user_id: &str) -> String {
    format!("user:{}:reservations", user_id)
}

fn holding_claim(holding: &Holding) -> String {
    format!("h:{}:{}", holding.holding_id, holding.expires_at.timestamp_millis())
}

/// Expiry index member. Carries the holding's index sets so a sweep can
/// clean them up after Redis has already dropped the record.
fn expiry_member(holding: &Holding) -> StoreResult<String> {
    encode(&(
        holding.holding_id,
        slot_holdings_key(&holding.slot),
        user_holdings_key(&holding.user_id),
    ))
}

struct ExpiryEntry {
    holding_id: Uuid,
    slot_set: String,
    user_set: String,
}

fn parse_expiry_member(member: &str) -> Option<ExpiryEntry> {
    let (holding_id, slot_set, user_set): (Uuid, String, String) = serde_json::from_str(member).ok()?;
    Some(ExpiryEntry { holding_id, slot_set, user_set })
}

fn reservation_claim(id: Uuid) -> String {
    format!("r:{}", id)
}

fn backend(e: impl Display) -> StoreError {
    StoreError::Backend(e.to_string())
}

fn decode<T: DeserializeOwned>(key: &str, raw: &str) -> StoreResult<T> {
    serde_json::from_str(raw).map_err(|e| StoreError::Corrupt(format!("{}: {}", key, e)))
}

fn encode<T: serde::Serialize>(value: &T) -> StoreResult<String> {
    serde_json::to_string(value).map_err(|e| StoreError::Corrupt(e.to_string()))
}

// ============================================================================
// Scripts
// ============================================================================

/// Shared claim check. A reservation claim always blocks; a holding claim
/// blocks until the expiry encoded in its value. Returns the 1-based indexes
/// of blocked keys.
const BLOCKED_FN: &str = r#"
local function blocked(n, now)
    local taken = {}
    for i = 1, n do
        local v = redis.call('GET', KEYS[i])
        if v then
            if string.sub(v, 1, 2) == 'r:' then
                table.insert(taken, i)
            else
                local exp = tonumber(string.match(v, ':(%d+)$'))
                if exp == nil or now <= exp then
                    table.insert(taken, i)
                end
            end
        end
    end
    return taken
end
"#;

/// KEYS: n claim keys, holding record, slot set, user set, expiry zset.
/// ARGV: n, nowMs, claim value, holding JSON, record ttl (s), holding id,
/// expiresMs, claim ttl (ms), expiry member.
const CLAIM_BODY: &str = r#"
local n = tonumber(ARGV[1])
local taken = blocked(n, tonumber(ARGV[2]))
if #taken > 0 then
    return taken
end
for i = 1, n do
    redis.call('SET', KEYS[i], ARGV[3], 'PX', ARGV[8])
end
redis.call('SET', KEYS[n + 1], ARGV[4], 'EX', ARGV[5])
redis.call('SADD', KEYS[n + 2], ARGV[6])
redis.call('SADD', KEYS[n + 3], ARGV[6])
redis.call('ZADD', KEYS[n + 4], ARGV[7], ARGV[9])
return {}
"#;

/// KEYS: n claim keys, reservation record, slot set, user set.
/// ARGV: n, nowMs, claim value, reservation JSON, reservation id, active flag.
const RESERVE_BODY: &str = r#"
local n = tonumber(ARGV[1])
if ARGV[6] == '1' then
    local taken = blocked(n, tonumber(ARGV[2]))
    if #taken > 0 then
        return taken
    end
    for i = 1, n do
        redis.call('SET', KEYS[i], ARGV[3])
    end
end
redis.call('SET', KEYS[n + 1], ARGV[4])
redis.call('SADD', KEYS[n + 2], ARGV[5])
redis.call('SADD', KEYS[n + 3], ARGV[5])
return {}
"#;

/// KEYS: n claim keys, holding record, slot set, user set, expiry zset.
/// ARGV: n, claim value, holding id, expiry member. Returns 1 if this call
/// removed the record.
const RELEASE_SCRIPT: &str = r#"
local n = tonumber(ARGV[1])
for i = 1, n do
    if redis.call('GET', KEYS[i]) == ARGV[2] then
        redis.call('DEL', KEYS[i])
    end
end
local removed = redis.call('DEL', KEYS[n + 1])
redis.call('SREM', KEYS[n + 2], ARGV[3])
redis.call('SREM', KEYS[n + 3], ARGV[3])
redis.call('ZREM', KEYS[n + 4], ARGV[4])
return removed
"#;

/// KEYS: n claim keys, holding record, slot holdings, user holdings, expiry
/// zset, reservation record, slot reservations, user reservations.
/// ARGV: n, nowMs, holding claim value, reservation claim value,
/// reservation JSON, holding id, reservation id, expiresMs, expiry member.
/// Returns 1 confirmed, 0 missing, -1 expired, -2 claims lost.
const CONFIRM_SCRIPT: &str = r#"
local n = tonumber(ARGV[1])
if redis.call('EXISTS', KEYS[n + 1]) == 0 then
    return 0
end
if tonumber(ARGV[2]) > tonumber(ARGV[8]) then
    return -1
end
for i = 1, n do
    if redis.call('GET', KEYS[i]) ~= ARGV[3] then
        return -2
    end
end
for i = 1, n do
    redis.call('SET', KEYS[i], ARGV[4])
end
redis.call('DEL', KEYS[n + 1])
redis.call('SREM', KEYS[n + 2], ARGV[6])
redis.call('SREM', KEYS[n + 3], ARGV[6])
redis.call('ZREM', KEYS[n + 4], ARGV[9])
redis.call('SET', KEYS[n + 5], ARGV[5])
redis.call('SADD', KEYS[n + 6], ARGV[7])
redis.call('SADD', KEYS[n + 7], ARGV[7])
return 1
"#;

/// KEYS: n claim keys, reservation record.
/// ARGV: n, claim value, expected current JSON, cancelled JSON.
/// Returns 1 if this call performed the cancellation.
const CANCEL_SCRIPT: &str = r#"
local n = tonumber(ARGV[1])
if redis.call('GET', KEYS[n + 1]) ~= ARGV[3] then
    return 0
end
for i = 1, n do
    if redis.call('GET', KEYS[i]) == ARGV[2] then
        redis.call('DEL', KEYS[i])
    end
end
redis.call('SET', KEYS[n + 1], ARGV[4])
return 1
"#;

// ============================================================================
// Ledger
// ============================================================================

/// Redis-backed ledger shared by every engine instance. Each mutation runs as
/// one Lua script, so the claim check and the claim write cannot interleave
/// with another instance's.
#[derive(Clone)]
pub struct RedisLedger {
    conn: MultiplexedConnection,
    claim_script: redis::Script,
    reserve_script: redis::Script,
    release_script: redis::Script,
    confirm_script: redis::Script,
    cancel_script: redis::Script,
    /// How long a holding record outlives its deadline before Redis drops it
    /// on its own. The sweeper normally purges it first.
    record_retention_secs: u64,
}

impl RedisLedger {
    pub async fn new(connection_string: &str, record_retention_secs: u64) -> Result<Self, redis::RedisError> {
        let client = redis::Client::open(connection_string)?;
        let conn = client.get_multiplexed_async_connection().await?;
        info!("Connected to Redis ledger");
        Ok(Self {
            conn,
            claim_script: redis::Script::new(&format!("{}{}", BLOCKED_FN, CLAIM_BODY)),
            reserve_script: redis::Script::new(&format!("{}{}", BLOCKED_FN, RESERVE_BODY)),
            release_script: redis::Script::new(RELEASE_SCRIPT),
            confirm_script: redis::Script::new(CONFIRM_SCRIPT),
            cancel_script: redis::Script::new(CANCEL_SCRIPT),
            record_retention_secs,
        })
    }

    fn conn(&self) -> MultiplexedConnection {
        self.conn.clone()
    }

    async fn read_many<T: DeserializeOwned>(&self, keys: Vec<String>) -> StoreResult<Vec<T>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let mut conn = self.conn();
        let mut pipe = redis::pipe();
        for key in &keys {
            pipe.get(key);
        }
        let raw: Vec<Option<String>> = pipe.query_async(&mut conn).await.map_err(backend)?;

        keys.iter()
            .zip(raw)
            .filter_map(|(key, value)| value.map(|v| decode(key, &v)))
            .collect()
    }

    async fn members(&self, set_key: String) -> StoreResult<Vec<Uuid>> {
        let mut conn = self.conn();
        let ids: Vec<String> = conn.smembers(&set_key).await.map_err(backend)?;
        Ok(ids.iter().filter_map(|id| Uuid::parse_str(id).ok()).collect())
    }

    async fn load_holdings(&self, set_key: String) -> StoreResult<Vec<Holding>> {
        let ids = self.members(set_key).await?;
        let mut holdings: Vec<Holding> = self.read_many(ids.into_iter().map(holding_key).collect()).await?;
        holdings.sort_by_key(|h| h.created_at);
        Ok(holdings)
    }

    async fn load_reservations(&self, set_key: String) -> StoreResult<Vec<Reservation>> {
        let ids = self.members(set_key).await?;
        let mut reservations: Vec<Reservation> =
            self.read_many(ids.into_iter().map(reservation_key).collect()).await?;
        reservations.sort_by_key(|r| r.created_at);
        Ok(reservations)
    }

    async fn get_raw(&self, key: &str) -> StoreResult<Option<String>> {
        let mut conn = self.conn();
        conn.get(key).await.map_err(backend)
    }

    fn blocked_seats(seats: &[&StorageSeatId], indexes: Vec<usize>) -> Vec<StorageSeatId> {
        indexes
            .into_iter()
            .filter_map(|i| seats.get(i.wrapping_sub(1)).map(|s| (*s).clone()))
            .collect()
    }
}

#[async_trait]
impl SeatLedger for RedisLedger {
    async fn claim_seats(&self, holding: &Holding, now: DateTime<Utc>) -> StoreResult<ClaimOutcome> {
        let seats: Vec<&StorageSeatId> = holding.seat_ids().collect();
        let ttl_ms = (holding.expires_at - now).num_milliseconds().max(1);
        let record_ttl = ((ttl_ms / 1000) as u64 + 1).saturating_add(self.record_retention_secs);

        let mut invocation = self.claim_script.prepare_invoke();
        for seat in &seats {
            invocation.key(claim_key(&holding.slot, seat));
        }
        invocation
            .key(holding_key(holding.holding_id))
            .key(slot_holdings_key(&holding.slot))
            .key(user_holdings_key(&holding.user_id))
            .key(EXPIRY_INDEX)
            .arg(seats.len())
            .arg(now.timestamp_millis())
            .arg(holding_claim(holding))
            .arg(encode(holding)?)
            .arg(record_ttl)
            .arg(holding.holding_id.to_string())
            .arg(holding.expires_at.timestamp_millis())
            // Keys outlive the deadline slightly; the encoded expiry decides.
            .arg(ttl_ms + 1000)
            .arg(expiry_member(holding)?);

        let mut conn = self.conn();
        let blocked: Vec<usize> = invocation.invoke_async(&mut conn).await.map_err(backend)?;
        if blocked.is_empty() {
            debug!(holding_id = %holding.holding_id, seats = seats.len(), "seats claimed");
            Ok(ClaimOutcome::Claimed)
        } else {
            Ok(ClaimOutcome::Conflict(Self::blocked_seats(&seats, blocked)))
        }
    }

    async fn get_holding(&self, holding_id: Uuid) -> StoreResult<Option<Holding>> {
        let key = holding_key(holding_id);
        self.get_raw(&key).await?.map(|raw| decode(&key, &raw)).transpose()
    }

    async fn holdings_for_slot(&self, slot: &SlotKey) -> StoreResult<Vec<Holding>> {
        self.load_holdings(slot_holdings_key(slot)).await
    }

    async fn holdings_for_user(&self, user_id: &str) -> StoreResult<Vec<Holding>> {
        self.load_holdings(user_holdings_key(user_id)).await
    }

    async fn remove_holding(&self, holding_id: Uuid) -> StoreResult<Option<Holding>> {
        let Some(holding) = self.get_holding(holding_id).await? else {
            return Ok(None);
        };

        let mut invocation = self.release_script.prepare_invoke();
        for seat in holding.seat_ids() {
            invocation.key(claim_key(&holding.slot, seat));
        }
        invocation
            .key(holding_key(holding_id))
            .key(slot_holdings_key(&holding.slot))
            .key(user_holdings_key(&holding.user_id))
            .key(EXPIRY_INDEX)
            .arg(holding.seats.len())
            .arg(holding_claim(&holding))
            .arg(holding_id.to_string())
            .arg(expiry_member(&holding)?);

        let mut conn = self.conn();
        let removed: i64 = invocation.invoke_async(&mut conn).await.map_err(backend)?;
        Ok((removed == 1).then_some(holding))
    }

    async fn confirm_holding(
        &self,
        holding_id: Uuid,
        draft: ReservationDraft,
        now: DateTime<Utc>,
    ) -> StoreResult<ConfirmOutcome> {
        let Some(holding) = self.get_holding(holding_id).await? else {
            return Ok(ConfirmOutcome::NotFound);
        };
        if holding.is_expired_at(now) {
            return Ok(ConfirmOutcome::Expired(holding));
        }
        let reservation = Reservation::from_holding(&holding, draft);

        let mut invocation = self.confirm_script.prepare_invoke();
        for seat in holding.seat_ids() {
            invocation.key(claim_key(&holding.slot, seat));
        }
        invocation
            .key(holding_key(holding_id))
            .key(slot_holdings_key(&holding.slot))
            .key(user_holdings_key(&holding.user_id))
            .key(EXPIRY_INDEX)
            .key(reservation_key(reservation.id))
            .key(slot_reservations_key(&reservation.slot))
            .key(user_reservations_key(&reservation.user_id))
            .arg(holding.seats.len())
            .arg(now.timestamp_millis())
            .arg(holding_claim(&holding))
            .arg(reservation_claim(reservation.id))
            .arg(encode(&reservation)?)
            .arg(holding_id.to_string())
            .arg(reservation.id.to_string())
            .arg(holding.expires_at.timestamp_millis())
            .arg(expiry_member(&holding)?);

        let mut conn = self.conn();
        let status: i64 = invocation.invoke_async(&mut conn).await.map_err(backend)?;
        match status {
            1 => Ok(ConfirmOutcome::Confirmed(reservation)),
            0 => Ok(ConfirmOutcome::NotFound),
            -1 => Ok(ConfirmOutcome::Expired(holding)),
            _ => {
                warn!(holding_id = %holding_id, "holding lost its seat claims before confirmation");
                Err(StoreError::Corrupt(format!("holding {} no longer owns its seats", holding_id)))
            }
        }
    }

    async fn insert_reservation(&self, reservation: &Reservation, now: DateTime<Utc>) -> StoreResult<ClaimOutcome> {
        let seats: Vec<&StorageSeatId> = reservation.seats.iter().map(|s| &s.seat_id).collect();

        let mut invocation = self.reserve_script.prepare_invoke();
        for seat in &seats {
            invocation.key(claim_key(&reservation.slot, seat));
        }
        invocation
            .key(reservation_key(reservation.id))
            .key(slot_reservations_key(&reservation.slot))
            .key(user_reservations_key(&reservation.user_id))
            .arg(seats.len())
            .arg(now.timestamp_millis())
            .arg(reservation_claim(reservation.id))
            .arg(encode(reservation)?)
            .arg(reservation.id.to_string())
            .arg(if reservation.is_active() { "1" } else { "0" });

        let mut conn = self.conn();
        let blocked: Vec<usize> = invocation.invoke_async(&mut conn).await.map_err(backend)?;
        if blocked.is_empty() {
            Ok(ClaimOutcome::Claimed)
        } else {
            Ok(ClaimOutcome::Conflict(Self::blocked_seats(&seats, blocked)))
        }
    }

    async fn get_reservation(&self, reservation_id: Uuid) -> StoreResult<Option<Reservation>> {
        let key = reservation_key(reservation_id);
        self.get_raw(&key).await?.map(|raw| decode(&key, &raw)).transpose()
    }

    async fn reservations_for_slot(&self, slot: &SlotKey) -> StoreResult<Vec<Reservation>> {
        self.load_reservations(slot_reservations_key(slot)).await
    }

    async fn reservations_for_user(&self, user_id: &str) -> StoreResult<Vec<Reservation>> {
        self.load_reservations(user_reservations_key(user_id)).await
    }

    async fn cancel_reservation(&self, reservation_id: Uuid) -> StoreResult<Option<Reservation>> {
        let key = reservation_key(reservation_id);
        let Some(current) = self.get_raw(&key).await? else {
            return Ok(None);
        };
        let mut reservation: Reservation = decode(&key, &current)?;
        if !reservation.is_active() {
            return Ok(None);
        }
        reservation.status = ReservationStatus::Cancelled;

        let mut invocation = self.cancel_script.prepare_invoke();
        for seat in &reservation.seats {
            invocation.key(claim_key(&reservation.slot, &seat.seat_id));
        }
        invocation
            .key(&key)
            .arg(reservation.seats.len())
            .arg(reservation_claim(reservation_id))
            .arg(&current)
            .arg(encode(&reservation)?);

        let mut conn = self.conn();
        let changed: i64 = invocation.invoke_async(&mut conn).await.map_err(backend)?;
        Ok((changed == 1).then_some(reservation))
    }

    async fn purge_expired(&self, cutoff: DateTime<Utc>) -> StoreResult<Vec<Holding>> {
        let mut conn = self.conn();
        let members: Vec<String> = redis::cmd("ZRANGEBYSCORE")
            .arg(EXPIRY_INDEX)
            .arg("-inf")
            .arg(format!("({}", cutoff.timestamp_millis()))
            .query_async(&mut conn)
            .await
            .map_err(backend)?;

        let mut purged = Vec::new();
        for member in members {
            let Some(entry) = parse_expiry_member(&member) else {
                warn!(member = %member, "dropping unreadable expiry entry");
                let _: i64 = conn.zrem(EXPIRY_INDEX, &member).await.map_err(backend)?;
                continue;
            };
            match self.remove_holding(entry.holding_id).await? {
                Some(holding) => purged.push(holding),
                None => {
                    // Record already gone through its own TTL.
                    let id = entry.holding_id.to_string();
                    let _: () = redis::pipe()
                        .atomic()
                        .srem(&entry.slot_set, &id)
                        .ignore()
                        .srem(&entry.user_set, &id)
                        .ignore()
                        .zrem(EXPIRY_INDEX, &member)
                        .ignore()
                        .query_async(&mut conn)
                        .await
                        .map_err(backend)?;
                    debug!(holding_id = %id, "cleared indexes of a lapsed holding record");
                }
            }
        }
        Ok(purged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use curtain_core::HeldSeat;

    fn slot() -> SlotKey {
        SlotKey::new("perf-kinky-1", "2026-02-10", "19:30").unwrap()
    }

    fn holding(user: &str, seats: &[&str], now: DateTime<Utc>) -> Holding {
        let seats = seats
            .iter()
            .map(|s| HeldSeat {
                seat_id: s.parse().unwrap(),
                grade: "VIP".to_string(),
                price: 170_000,
            })
            .collect();
        Holding::new(slot(), user, seats, now, Duration::minutes(10))
    }

    #[test]
    fn test_key_layout() {
        let held = holding("user-42", &["1층-B-1-6"], Utc::now());
        let seat = held.seats[0].seat_id.clone();
        assert_eq!(claim_key(&held.slot, &seat), "claim:perf-kinky-1:2026-02-10:19:30:1층-B-1-6");
        assert_eq!(slot_holdings_key(&held.slot), "slot:perf-kinky-1:2026-02-10:19:30:holdings");
        assert_eq!(user_reservations_key("user-42"), "user:user-42:reservations");

        let claim = holding_claim(&held);
        assert!(claim.starts_with(&format!("h:{}:", held.holding_id)));
        assert!(claim.ends_with(&held.expires_at.timestamp_millis().to_string()));
    }

    #[test]
    fn test_expiry_member_names_index_sets() {
        let held = holding("user-42", &["1층-B-1-6"], Utc::now());
        let member = expiry_member(&held).unwrap();

        let entry = parse_expiry_member(&member).unwrap();
        assert_eq!(entry.holding_id, held.holding_id);
        assert_eq!(entry.slot_set, slot_holdings_key(&held.slot));
        assert_eq!(entry.user_set, user_holdings_key("user-42"));

        assert!(parse_expiry_member(&held.holding_id.to_string()).is_none());
        assert!(parse_expiry_member("not json").is_none());
    }

    #[test]
    fn test_blocked_indexes_map_back_to_seats() {
        let a: StorageSeatId = "1층-B-1-6".parse().unwrap();
        let b: StorageSeatId = "1층-B-1-7".parse().unwrap();
        let seats = vec![&a, &b];
        assert_eq!(RedisLedger::blocked_seats(&seats, vec![2]), vec![b.clone()]);
        assert!(RedisLedger::blocked_seats(&seats, vec![0, 9]).is_empty());
    }

    fn test_url() -> Option<String> {
        std::env::var("CURTAIN_TEST_REDIS_URL").ok()
    }

    #[tokio::test]
    #[ignore = "needs a running Redis (CURTAIN_TEST_REDIS_URL)"]
    async fn test_redis_claim_confirm_cancel() {
        let Some(url) = test_url() else { return };
        let ledger = RedisLedger::new(&url, 60).await.unwrap();
        let now = Utc::now();
        let user = format!("user-{}", Uuid::new_v4());

        let seat = format!("1층-C-9-{}", (now.timestamp_millis() % 12) + 1);
        let first = holding(&user, &[&seat], now);
        if ledger.claim_seats(&first, now).await.unwrap() != ClaimOutcome::Claimed {
            // Seat left over from an earlier run.
            return;
        }
        let rival = holding("user-rival", &[&seat], now);
        assert!(matches!(
            ledger.claim_seats(&rival, now).await.unwrap(),
            ClaimOutcome::Conflict(_)
        ));

        let draft = ReservationDraft::new("킹키부츠", "샤롯데씨어터", ReservationStatus::Confirmed, now);
        let ConfirmOutcome::Confirmed(reservation) =
            ledger.confirm_holding(first.holding_id, draft, now).await.unwrap()
        else {
            panic!("confirmation failed");
        };
        assert!(ledger.get_holding(first.holding_id).await.unwrap().is_none());
        assert_eq!(ledger.reservations_for_user(&user).await.unwrap().len(), 1);

        assert!(ledger.cancel_reservation(reservation.id).await.unwrap().is_some());
        assert!(ledger.cancel_reservation(reservation.id).await.unwrap().is_none());

        let retry = holding("user-rival", &[&seat], now);
        assert_eq!(ledger.claim_seats(&retry, now).await.unwrap(), ClaimOutcome::Claimed);
        ledger.remove_holding(retry.holding_id).await.unwrap();
    }
}
