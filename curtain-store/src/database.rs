use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use curtain_core::{
    ClaimOutcome, ConfirmOutcome, HeldSeat, Holding, Reservation, ReservationDraft,
    ReservationStatus, SeatLedger, SlotKey, StoreError, StoreResult,
};
use serde_json::Value;
use sqlx::postgres::PgPoolOptions;
use sqlx::types::Json;
use sqlx::{Pool, Postgres, Transaction};
use std::collections::HashSet;
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

use crate::app_config::HoldingConfig;

#[derive(Clone)]
pub struct DbClient {
    pub pool: Pool<Postgres>,
}

impl DbClient {
    pub async fn new(connection_string: &str) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(3))
            .connect(connection_string)
            .await?;

        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        info!("Running database migrations...");
        sqlx::migrate!("../migrations").run(&self.pool).await?;
        info!("Migrations completed successfully.");
        Ok(())
    }

    /// Overlays rows of `business_rules` on the configured holding rules.
    /// Rows look like `{"value": <number|string>}`.
    pub async fn fetch_holding_rules(&self, defaults: HoldingConfig) -> Result<HoldingConfig, sqlx::Error> {
        #[derive(sqlx::FromRow)]
        struct RuleRow {
            rule_key: String,
            rule_value: Value,
        }

        let rows = sqlx::query_as::<_, RuleRow>("SELECT rule_key, rule_value FROM business_rules")
            .fetch_all(&self.pool)
            .await?;

        Ok(apply_rules(defaults, rows.into_iter().map(|r| (r.rule_key, r.rule_value))))
    }
}

fn apply_rules(defaults: HoldingConfig, rows: impl Iterator<Item = (String, Value)>) -> HoldingConfig {
    let mut rules = defaults;

    for (key, val) in rows {
        let Some(v) = val.get("value") else {
            continue;
        };
        match key.as_str() {
            "hold_ttl_seconds" | "seat_hold_seconds" => {
                if let Some(u) = v.as_u64() {
                    rules.ttl_seconds = u;
                }
            }
            "max_party_size" => {
                if let Some(u) = v.as_u64() {
                    rules.max_party_size = u as u32;
                }
            }
            "hold_policy" => {
                if let Some(s) = v.as_str() {
                    rules.policy = s.to_string();
                }
            }
            "holding_retention_seconds" => {
                if let Some(u) = v.as_u64() {
                    rules.retention_seconds = u;
                }
            }
            _ => {}
        }
    }

    rules
}

// ============================================================================
// Row mapping
// ============================================================================

#[derive(sqlx::FromRow)]
struct HoldingRow {
    holding_id: Uuid,
    performance_id: String,
    show_date: NaiveDate,
    show_time: String,
    user_id: String,
    seats: Json<Vec<HeldSeat>>,
    total_price: i64,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

impl From<HoldingRow> for Holding {
    fn from(row: HoldingRow) -> Self {
        Holding {
            holding_id: row.holding_id,
            slot: SlotKey {
                performance_id: row.performance_id,
                date: row.show_date,
                time: row.show_time,
            },
            user_id: row.user_id,
            seats: row.seats.0,
            total_price: row.total_price,
            created_at: row.created_at,
            expires_at: row.expires_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct ReservationRow {
    reservation_id: Uuid,
    performance_id: String,
    show_date: NaiveDate,
    show_time: String,
    performance_title: String,
    venue: String,
    user_id: String,
    seats: Json<Vec<HeldSeat>>,
    total_price: i64,
    status: String,
    holding_id: Option<Uuid>,
    created_at: DateTime<Utc>,
}

impl TryFrom<ReservationRow> for Reservation {
    type Error = StoreError;

    fn try_from(row: ReservationRow) -> Result<Self, Self::Error> {
        let status = ReservationStatus::parse(&row.status).ok_or_else(|| {
            StoreError::Corrupt(format!("reservation {} has status '{}'", row.reservation_id, row.status))
        })?;
        Ok(Reservation {
            id: row.reservation_id,
            slot: SlotKey {
                performance_id: row.performance_id,
                date: row.show_date,
                time: row.show_time,
            },
            performance_title: row.performance_title,
            venue: row.venue,
            user_id: row.user_id,
            seats: row.seats.0,
            total_price: row.total_price,
            status,
            holding_id: row.holding_id,
            created_at: row.created_at,
        })
    }
}

const HOLDING_COLUMNS: &str =
    "holding_id, performance_id, show_date, show_time, user_id, seats, total_price, created_at, expires_at";

const RESERVATION_COLUMNS: &str = "reservation_id, performance_id, show_date, show_time, performance_title, \
     venue, user_id, seats, total_price, status, holding_id, created_at";

fn backend(e: sqlx::Error) -> StoreError {
    StoreError::Backend(e.to_string())
}

fn seat_strings<'a>(seats: impl Iterator<Item = &'a HeldSeat>) -> Vec<String> {
    seats.map(|s| s.seat_id.to_string()).collect()
}

// ============================================================================
// Ledger
// ============================================================================

/// Postgres ledger. `seat_claims` has one row per claimed seat keyed by slot
/// and seat, so the primary key is the exclusivity constraint.
#[derive(Clone)]
pub struct PgLedger {
    db: DbClient,
}

impl PgLedger {
    pub fn new(db: DbClient) -> Self {
        Self { db }
    }

    /// Clears expired holding claims on `seats`, then inserts claims for the
    /// ones still free. Returns the seats that could not be claimed.
    async fn write_claims(
        tx: &mut Transaction<'_, Postgres>,
        slot: &SlotKey,
        seats: &[String],
        holding: Option<(Uuid, DateTime<Utc>)>,
        reservation_id: Option<Uuid>,
        now: DateTime<Utc>,
    ) -> StoreResult<Vec<String>> {
        sqlx::query(
            "DELETE FROM seat_claims
             WHERE performance_id = $1 AND show_date = $2 AND show_time = $3
               AND seat_id = ANY($4) AND holding_id IS NOT NULL AND expires_at < $5",
        )
        .bind(&slot.performance_id)
        .bind(slot.date)
        .bind(&slot.time)
        .bind(seats)
        .bind(now)
        .execute(&mut **tx)
        .await
        .map_err(backend)?;

        let claimed: Vec<(String,)> = sqlx::query_as(
            "INSERT INTO seat_claims
                 (performance_id, show_date, show_time, seat_id, holding_id, reservation_id, expires_at)
             SELECT $1, $2, $3, seat, $5, $6, $7 FROM UNNEST($4::text[]) AS seat
             ON CONFLICT DO NOTHING
             RETURNING seat_id",
        )
        .bind(&slot.performance_id)
        .bind(slot.date)
        .bind(&slot.time)
        .bind(seats)
        .bind(holding.map(|(id, _)| id))
        .bind(reservation_id)
        .bind(holding.map(|(_, expires_at)| expires_at))
        .fetch_all(&mut **tx)
        .await
        .map_err(backend)?;

        let claimed: HashSet<String> = claimed.into_iter().map(|(s,)| s).collect();
        Ok(seats.iter().filter(|s| !claimed.contains(*s)).cloned().collect())
    }

    fn conflict(blocked: Vec<String>) -> StoreResult<ClaimOutcome> {
        let seats = blocked
            .iter()
            .map(|s| s.parse().map_err(|_| StoreError::Corrupt(format!("seat id '{}'", s))))
            .collect::<StoreResult<Vec<_>>>()?;
        Ok(ClaimOutcome::Conflict(seats))
    }

    async fn insert_reservation_row(tx: &mut Transaction<'_, Postgres>, reservation: &Reservation) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO reservations
                 (reservation_id, performance_id, show_date, show_time, performance_title, venue,
                  user_id, seats, total_price, status, holding_id, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)",
        )
        .bind(reservation.id)
        .bind(&reservation.slot.performance_id)
        .bind(reservation.slot.date)
        .bind(&reservation.slot.time)
        .bind(&reservation.performance_title)
        .bind(&reservation.venue)
        .bind(&reservation.user_id)
        .bind(Json(&reservation.seats))
        .bind(reservation.total_price)
        .bind(reservation.status.as_str())
        .bind(reservation.holding_id)
        .bind(reservation.created_at)
        .execute(&mut **tx)
        .await
        .map_err(backend)?;
        Ok(())
    }

    async fn fetch_holdings(&self, filter: &str, bind: impl FnOnce(HoldingQuery<'_>) -> HoldingQuery<'_>) -> StoreResult<Vec<Holding>> {
        let sql = format!("SELECT {} FROM holdings WHERE {} ORDER BY created_at", HOLDING_COLUMNS, filter);
        let rows = bind(sqlx::query_as::<_, HoldingRow>(&sql))
            .fetch_all(&self.db.pool)
            .await
            .map_err(backend)?;
        Ok(rows.into_iter().map(Holding::from).collect())
    }

    async fn fetch_reservations(
        &self,
        filter: &str,
        bind: impl FnOnce(ReservationQuery<'_>) -> ReservationQuery<'_>,
    ) -> StoreResult<Vec<Reservation>> {
        let sql = format!("SELECT {} FROM reservations WHERE {} ORDER BY created_at", RESERVATION_COLUMNS, filter);
        let rows = bind(sqlx::query_as::<_, ReservationRow>(&sql))
            .fetch_all(&self.db.pool)
            .await
            .map_err(backend)?;
        rows.into_iter().map(Reservation::try_from).collect()
    }
}

type HoldingQuery<'q> = sqlx::query::QueryAs<'q, Postgres, HoldingRow, sqlx::postgres::PgArguments>;
type ReservationQuery<'q> = sqlx::query::QueryAs<'q, Postgres, ReservationRow, sqlx::postgres::PgArguments>;

#[async_trait]
impl SeatLedger for PgLedger {
    async fn claim_seats(&self, holding: &Holding, now: DateTime<Utc>) -> StoreResult<ClaimOutcome> {
        let seats = seat_strings(holding.seats.iter());
        let mut tx = self.db.pool.begin().await.map_err(backend)?;

        let blocked = Self::write_claims(
            &mut tx,
            &holding.slot,
            &seats,
            Some((holding.holding_id, holding.expires_at)),
            None,
            now,
        )
        .await?;
        if !blocked.is_empty() {
            tx.rollback().await.map_err(backend)?;
            return Self::conflict(blocked);
        }

        sqlx::query(
            "INSERT INTO holdings
                 (holding_id, performance_id, show_date, show_time, user_id, seats, total_price, created_at, expires_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(holding.holding_id)
        .bind(&holding.slot.performance_id)
        .bind(holding.slot.date)
        .bind(&holding.slot.time)
        .bind(&holding.user_id)
        .bind(Json(&holding.seats))
        .bind(holding.total_price)
        .bind(holding.created_at)
        .bind(holding.expires_at)
        .execute(&mut *tx)
        .await
        .map_err(backend)?;

        tx.commit().await.map_err(backend)?;
        debug!(holding_id = %holding.holding_id, seats = seats.len(), "seats claimed");
        Ok(ClaimOutcome::Claimed)
    }

    async fn get_holding(&self, holding_id: Uuid) -> StoreResult<Option<Holding>> {
        Ok(self
            .fetch_holdings("holding_id = $1", |q| q.bind(holding_id))
            .await?
            .into_iter()
            .next())
    }

    async fn holdings_for_slot(&self, slot: &SlotKey) -> StoreResult<Vec<Holding>> {
        self.fetch_holdings("performance_id = $1 AND show_date = $2 AND show_time = $3", |q| {
            q.bind(slot.performance_id.clone()).bind(slot.date).bind(slot.time.clone())
        })
        .await
    }

    async fn holdings_for_user(&self, user_id: &str) -> StoreResult<Vec<Holding>> {
        let user_id = user_id.to_string();
        self.fetch_holdings("user_id = $1", |q| q.bind(user_id)).await
    }

    async fn remove_holding(&self, holding_id: Uuid) -> StoreResult<Option<Holding>> {
        let mut tx = self.db.pool.begin().await.map_err(backend)?;

        let removed: Option<HoldingRow> = sqlx::query_as(&format!(
            "DELETE FROM holdings WHERE holding_id = $1 RETURNING {}",
            HOLDING_COLUMNS
        ))
        .bind(holding_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(backend)?;

        if removed.is_some() {
            sqlx::query("DELETE FROM seat_claims WHERE holding_id = $1")
                .bind(holding_id)
                .execute(&mut *tx)
                .await
                .map_err(backend)?;
        }

        tx.commit().await.map_err(backend)?;
        Ok(removed.map(Holding::from))
    }

    async fn confirm_holding(
        &self,
        holding_id: Uuid,
        draft: ReservationDraft,
        now: DateTime<Utc>,
    ) -> StoreResult<ConfirmOutcome> {
        let mut tx = self.db.pool.begin().await.map_err(backend)?;

        let row: Option<HoldingRow> = sqlx::query_as(&format!(
            "SELECT {} FROM holdings WHERE holding_id = $1 FOR UPDATE",
            HOLDING_COLUMNS
        ))
        .bind(holding_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(backend)?;

        let Some(holding) = row.map(Holding::from) else {
            tx.rollback().await.map_err(backend)?;
            return Ok(ConfirmOutcome::NotFound);
        };
        if holding.is_expired_at(now) {
            tx.rollback().await.map_err(backend)?;
            return Ok(ConfirmOutcome::Expired(holding));
        }

        let reservation = Reservation::from_holding(&holding, draft);
        Self::insert_reservation_row(&mut tx, &reservation).await?;

        sqlx::query(
            "UPDATE seat_claims SET holding_id = NULL, reservation_id = $2, expires_at = NULL
             WHERE holding_id = $1",
        )
        .bind(holding_id)
        .bind(reservation.id)
        .execute(&mut *tx)
        .await
        .map_err(backend)?;

        sqlx::query("DELETE FROM holdings WHERE holding_id = $1")
            .bind(holding_id)
            .execute(&mut *tx)
            .await
            .map_err(backend)?;

        tx.commit().await.map_err(backend)?;
        Ok(ConfirmOutcome::Confirmed(reservation))
    }

    async fn insert_reservation(&self, reservation: &Reservation, now: DateTime<Utc>) -> StoreResult<ClaimOutcome> {
        let mut tx = self.db.pool.begin().await.map_err(backend)?;

        if reservation.is_active() {
            let seats = seat_strings(reservation.seats.iter());
            let blocked =
                Self::write_claims(&mut tx, &reservation.slot, &seats, None, Some(reservation.id), now).await?;
            if !blocked.is_empty() {
                tx.rollback().await.map_err(backend)?;
                return Self::conflict(blocked);
            }
        }

        Self::insert_reservation_row(&mut tx, reservation).await?;
        tx.commit().await.map_err(backend)?;
        Ok(ClaimOutcome::Claimed)
    }

    async fn get_reservation(&self, reservation_id: Uuid) -> StoreResult<Option<Reservation>> {
        Ok(self
            .fetch_reservations("reservation_id = $1", |q| q.bind(reservation_id))
            .await?
            .into_iter()
            .next())
    }

    async fn reservations_for_slot(&self, slot: &SlotKey) -> StoreResult<Vec<Reservation>> {
        self.fetch_reservations("performance_id = $1 AND show_date = $2 AND show_time = $3", |q| {
            q.bind(slot.performance_id.clone()).bind(slot.date).bind(slot.time.clone())
        })
        .await
    }

    async fn reservations_for_user(&self, user_id: &str) -> StoreResult<Vec<Reservation>> {
        let user_id = user_id.to_string();
        self.fetch_reservations("user_id = $1", |q| q.bind(user_id)).await
    }

    async fn cancel_reservation(&self, reservation_id: Uuid) -> StoreResult<Option<Reservation>> {
        let mut tx = self.db.pool.begin().await.map_err(backend)?;

        let row: Option<ReservationRow> = sqlx::query_as(&format!(
            "UPDATE reservations SET status = 'cancelled'
             WHERE reservation_id = $1 AND status <> 'cancelled'
             RETURNING {}",
            RESERVATION_COLUMNS
        ))
        .bind(reservation_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(backend)?;

        if row.is_some() {
            sqlx::query("DELETE FROM seat_claims WHERE reservation_id = $1")
                .bind(reservation_id)
                .execute(&mut *tx)
                .await
                .map_err(backend)?;
        }

        tx.commit().await.map_err(backend)?;
        row.map(Reservation::try_from).transpose()
    }

    async fn purge_expired(&self, cutoff: DateTime<Utc>) -> StoreResult<Vec<Holding>> {
        let mut tx = self.db.pool.begin().await.map_err(backend)?;

        let rows: Vec<HoldingRow> = sqlx::query_as(&format!(
            "DELETE FROM holdings WHERE expires_at < $1 RETURNING {}",
            HOLDING_COLUMNS
        ))
        .bind(cutoff)
        .fetch_all(&mut *tx)
        .await
        .map_err(backend)?;

        let ids: Vec<Uuid> = rows.iter().map(|r| r.holding_id).collect();
        if !ids.is_empty() {
            sqlx::query("DELETE FROM seat_claims WHERE holding_id = ANY($1)")
                .bind(&ids)
                .execute(&mut *tx)
                .await
                .map_err(backend)?;
        }

        tx.commit().await.map_err(backend)?;
        Ok(rows.into_iter().map(Holding::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn defaults() -> HoldingConfig {
        HoldingConfig::default()
    }

    #[test]
    fn test_business_rules_override_holding_defaults() {
        let rows = vec![
            ("seat_hold_seconds".to_string(), json!({"value": 300})),
            ("max_party_size".to_string(), json!({"value": 6})),
            ("hold_policy".to_string(), json!({"value": "allow_multiple"})),
            ("unrelated".to_string(), json!({"value": 1})),
        ];
        let rules = apply_rules(defaults(), rows.into_iter());

        assert_eq!(rules.ttl_seconds, 300);
        assert_eq!(rules.max_party_size, 6);
        assert_eq!(rules.policy, "allow_multiple");
    }

    #[test]
    fn test_malformed_rules_are_ignored() {
        let rows = vec![
            ("hold_ttl_seconds".to_string(), json!(120)),
            ("max_party_size".to_string(), json!({"value": "many"})),
        ];
        let rules = apply_rules(defaults(), rows.into_iter());
        assert_eq!(rules.ttl_seconds, defaults().ttl_seconds);
        assert_eq!(rules.max_party_size, defaults().max_party_size);
    }

    #[tokio::test]
    #[ignore = "needs a running Postgres (CURTAIN_TEST_DATABASE_URL)"]
    async fn test_pg_claim_is_exclusive() {
        let Ok(url) = std::env::var("CURTAIN_TEST_DATABASE_URL") else {
            return;
        };
        let db = DbClient::new(&url).await.unwrap();
        db.migrate().await.unwrap();
        let ledger = PgLedger::new(db);

        let now = Utc::now();
        let slot = SlotKey::new("perf-test", "2026-02-10", "19:30").unwrap();
        let seat = HeldSeat {
            seat_id: format!("1층-A-1-{}", (now.timestamp_millis() % 12) + 1).parse().unwrap(),
            grade: "VIP".to_string(),
            price: 170_000,
        };
        let first = Holding::new(slot.clone(), "user-42", vec![seat.clone()], now, chrono::Duration::minutes(10));
        let second = Holding::new(slot, "user-7", vec![seat], now, chrono::Duration::minutes(10));

        if ledger.claim_seats(&first, now).await.unwrap() != ClaimOutcome::Claimed {
            return;
        }
        assert!(matches!(
            ledger.claim_seats(&second, now).await.unwrap(),
            ClaimOutcome::Conflict(_)
        ));
        assert!(ledger.remove_holding(first.holding_id).await.unwrap().is_some());
        assert_eq!(ledger.claim_seats(&second, now).await.unwrap(), ClaimOutcome::Claimed);
        ledger.remove_holding(second.holding_id).await.unwrap();
    }
}
