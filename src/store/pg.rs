//! Postgres-backed authoritative store.
//!
//! Shared connection pool, sqlx migrations, and a LISTEN/NOTIFY change
//! feed: row triggers installed by the migrations publish a JSON payload
//! per mutation on a per-table channel, and `subscribe` forwards decoded
//! events until the receiver is dropped.

use async_trait::async_trait;
use sqlx::PgPool;
use sqlx::postgres::{PgListener, PgPoolOptions};
use tokio::sync::broadcast;
use tracing::warn;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::event::{ChangeEvent, Collection};
use crate::model::{
    Equipment, EquipmentId, Profile, Request, RequestId, Role, Status, Team, TeamId, UserId,
};
use crate::store::Store;

const FEED_CAPACITY: usize = 256;

/// Postgres store handle. Owns the connection pool.
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Connect to Postgres and create a connection pool.
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(url)
            .await?;
        Ok(Self { pool })
    }

    /// Run all pending migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| Error::Other(format!("migration failed: {e}")))?;
        Ok(())
    }

    /// Simple health check: run a SELECT 1.
    pub async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

const REQUEST_COLUMNS: &str = "id, equipment_id, team_id, type, status, duration_hours, \
     scheduled_date, title, description, created_by, created_at, updated_at";

const EQUIPMENT_COLUMNS: &str =
    "id, name, description, assigned_team_id, is_scrapped, warranty_expiry, \
     created_at, updated_at";

#[async_trait]
impl Store for PgStore {
    async fn list_teams(&self) -> Result<Vec<Team>> {
        let rows: Vec<TeamRow> =
            sqlx::query_as("SELECT id, name, created_at FROM teams ORDER BY name ASC")
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.into_iter().map(TeamRow::into_team).collect())
    }

    async fn list_equipment(&self) -> Result<Vec<Equipment>> {
        let rows: Vec<EquipmentRow> = sqlx::query_as(&format!(
            "SELECT {EQUIPMENT_COLUMNS} FROM equipment ORDER BY created_at DESC"
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(EquipmentRow::into_equipment).collect())
    }

    async fn list_requests(&self) -> Result<Vec<Request>> {
        let rows: Vec<RequestRow> = sqlx::query_as(&format!(
            "SELECT {REQUEST_COLUMNS} FROM requests ORDER BY created_at DESC"
        ))
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(RequestRow::try_into_request).collect()
    }

    async fn get_equipment(&self, id: EquipmentId) -> Result<Option<Equipment>> {
        let row: Option<EquipmentRow> =
            sqlx::query_as(&format!("SELECT {EQUIPMENT_COLUMNS} FROM equipment WHERE id = $1"))
                .bind(id.0)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(EquipmentRow::into_equipment))
    }

    async fn get_request(&self, id: RequestId) -> Result<Option<Request>> {
        let row: Option<RequestRow> =
            sqlx::query_as(&format!("SELECT {REQUEST_COLUMNS} FROM requests WHERE id = $1"))
                .bind(id.0)
                .fetch_optional(&self.pool)
                .await?;
        row.map(RequestRow::try_into_request).transpose()
    }

    async fn requests_for_equipment(&self, equipment_id: EquipmentId) -> Result<Vec<Request>> {
        let rows: Vec<RequestRow> = sqlx::query_as(&format!(
            "SELECT {REQUEST_COLUMNS} FROM requests WHERE equipment_id = $1 ORDER BY created_at DESC"
        ))
        .bind(equipment_id.0)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(RequestRow::try_into_request).collect()
    }

    async fn profile_by_email(&self, email: &str) -> Result<Option<Profile>> {
        let row: Option<ProfileRow> = sqlx::query_as(
            "SELECT id, email, role, team_id, full_name FROM users WHERE email = $1",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        row.map(ProfileRow::try_into_profile).transpose()
    }

    async fn insert_team(&self, team: Team) -> Result<Team> {
        let row: TeamRow = sqlx::query_as(
            "INSERT INTO teams (id, name, created_at) VALUES ($1, $2, $3)
             RETURNING id, name, created_at",
        )
        .bind(team.id.0)
        .bind(&team.name)
        .bind(team.created_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.into_team())
    }

    async fn insert_equipment(&self, equipment: Equipment) -> Result<Equipment> {
        let row: EquipmentRow = sqlx::query_as(&format!(
            "INSERT INTO equipment (id, name, description, assigned_team_id, is_scrapped, \
             warranty_expiry, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
             RETURNING {EQUIPMENT_COLUMNS}"
        ))
        .bind(equipment.id.0)
        .bind(&equipment.name)
        .bind(&equipment.description)
        .bind(equipment.assigned_team_id.map(|t| t.0))
        .bind(equipment.is_scrapped)
        .bind(equipment.warranty_expiry)
        .bind(equipment.created_at)
        .bind(equipment.updated_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.into_equipment())
    }

    async fn insert_request(&self, request: Request) -> Result<Request> {
        let row: RequestRow = sqlx::query_as(&format!(
            "INSERT INTO requests (id, equipment_id, team_id, type, status, duration_hours, \
             scheduled_date, title, description, created_by, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
             RETURNING {REQUEST_COLUMNS}"
        ))
        .bind(request.id.0)
        .bind(request.equipment_id.0)
        .bind(request.team_id.map(|t| t.0))
        .bind(request.kind.to_string())
        .bind(request.status.to_string())
        .bind(request.duration_hours)
        .bind(request.scheduled_date)
        .bind(&request.title)
        .bind(&request.description)
        .bind(request.created_by.map(|u| u.0))
        .bind(request.created_at)
        .bind(request.updated_at)
        .fetch_one(&self.pool)
        .await?;
        row.try_into_request()
    }

    async fn update_equipment(&self, equipment: Equipment) -> Result<Equipment> {
        let row: Option<EquipmentRow> = sqlx::query_as(&format!(
            "UPDATE equipment SET name = $1, description = $2, assigned_team_id = $3, \
             warranty_expiry = $4, updated_at = now()
             WHERE id = $5
             RETURNING {EQUIPMENT_COLUMNS}"
        ))
        .bind(&equipment.name)
        .bind(&equipment.description)
        .bind(equipment.assigned_team_id.map(|t| t.0))
        .bind(equipment.warranty_expiry)
        .bind(equipment.id.0)
        .fetch_optional(&self.pool)
        .await?;
        row.map(EquipmentRow::into_equipment)
            .ok_or_else(|| Error::NotFound(format!("equipment {}", equipment.id)))
    }

    async fn update_request_status(
        &self,
        id: RequestId,
        status: Status,
        duration_hours: Option<f64>,
    ) -> Result<Request> {
        let row: Option<RequestRow> = sqlx::query_as(&format!(
            "UPDATE requests SET status = $1, \
             duration_hours = COALESCE($2, duration_hours), updated_at = now()
             WHERE id = $3
             RETURNING {REQUEST_COLUMNS}"
        ))
        .bind(status.to_string())
        .bind(duration_hours)
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await?;
        row.map(RequestRow::try_into_request)
            .transpose()?
            .ok_or_else(|| Error::NotFound(format!("request {id}")))
    }

    async fn mark_equipment_scrapped(&self, id: EquipmentId) -> Result<()> {
        let rows_affected =
            sqlx::query("UPDATE equipment SET is_scrapped = TRUE, updated_at = now() WHERE id = $1")
                .bind(id.0)
                .execute(&self.pool)
                .await?
                .rows_affected();
        if rows_affected == 0 {
            return Err(Error::NotFound(format!("equipment {id}")));
        }
        Ok(())
    }

    async fn rename_team(&self, id: TeamId, name: &str) -> Result<Team> {
        let row: Option<TeamRow> = sqlx::query_as(
            "UPDATE teams SET name = $1 WHERE id = $2 RETURNING id, name, created_at",
        )
        .bind(name)
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await?;
        row.map(TeamRow::into_team)
            .ok_or_else(|| Error::NotFound(format!("team {id}")))
    }

    async fn delete_request(&self, id: RequestId) -> Result<()> {
        let rows_affected = sqlx::query("DELETE FROM requests WHERE id = $1")
            .bind(id.0)
            .execute(&self.pool)
            .await?
            .rows_affected();
        if rows_affected == 0 {
            return Err(Error::NotFound(format!("request {id}")));
        }
        Ok(())
    }

    async fn delete_equipment(&self, id: EquipmentId) -> Result<()> {
        let rows_affected = sqlx::query("DELETE FROM equipment WHERE id = $1")
            .bind(id.0)
            .execute(&self.pool)
            .await?
            .rows_affected();
        if rows_affected == 0 {
            return Err(Error::NotFound(format!("equipment {id}")));
        }
        Ok(())
    }

    async fn subscribe(&self, collection: Collection) -> Result<broadcast::Receiver<ChangeEvent>> {
        let mut listener = PgListener::connect_with(&self.pool).await?;
        listener.listen(collection.channel()).await?;

        let (tx, rx) = broadcast::channel(FEED_CAPACITY);
        tokio::spawn(async move {
            loop {
                // Watch for the last receiver dropping even while the
                // channel is quiet, so the LISTEN connection is returned
                // to the pool promptly instead of on the next NOTIFY.
                let received = tokio::select! {
                    _ = tx.closed() => break,
                    received = listener.recv() => received,
                };
                match received {
                    Ok(notification) => {
                        match decode_event(collection, notification.payload()) {
                            Ok(event) => {
                                if tx.send(event).is_err() {
                                    break;
                                }
                            }
                            Err(e) => {
                                warn!(%collection, "undecodable change payload: {e}");
                            }
                        }
                    }
                    Err(e) => {
                        // Receivers observe Closed and the caller resubscribes.
                        warn!(%collection, "change feed connection lost: {e}");
                        break;
                    }
                }
            }
        });

        Ok(rx)
    }
}

/// Decode a NOTIFY payload into a change event for its collection.
fn decode_event(collection: Collection, payload: &str) -> Result<ChangeEvent> {
    let event = match collection {
        Collection::Teams => ChangeEvent::Team(
            serde_json::from_str(payload).map_err(|e| Error::Store(e.to_string()))?,
        ),
        Collection::Equipment => ChangeEvent::Equipment(
            serde_json::from_str(payload).map_err(|e| Error::Store(e.to_string()))?,
        ),
        Collection::Requests => ChangeEvent::Request(
            serde_json::from_str(payload).map_err(|e| Error::Store(e.to_string()))?,
        ),
    };
    Ok(event)
}

// ---------------------------------------------------------------------------
// Row types for sqlx::FromRow
// ---------------------------------------------------------------------------

#[derive(sqlx::FromRow)]
struct TeamRow {
    id: Uuid,
    name: String,
    created_at: chrono::DateTime<chrono::Utc>,
}

impl TeamRow {
    fn into_team(self) -> Team {
        Team {
            id: TeamId(self.id),
            name: self.name,
            created_at: self.created_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct EquipmentRow {
    id: Uuid,
    name: String,
    description: String,
    assigned_team_id: Option<Uuid>,
    is_scrapped: bool,
    warranty_expiry: Option<chrono::NaiveDate>,
    created_at: chrono::DateTime<chrono::Utc>,
    updated_at: chrono::DateTime<chrono::Utc>,
}

impl EquipmentRow {
    fn into_equipment(self) -> Equipment {
        Equipment {
            id: EquipmentId(self.id),
            name: self.name,
            description: self.description,
            assigned_team_id: self.assigned_team_id.map(TeamId),
            is_scrapped: self.is_scrapped,
            warranty_expiry: self.warranty_expiry,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct RequestRow {
    id: Uuid,
    equipment_id: Uuid,
    team_id: Option<Uuid>,
    #[sqlx(rename = "type")]
    kind: String,
    status: String,
    duration_hours: Option<f64>,
    scheduled_date: Option<chrono::NaiveDate>,
    title: String,
    description: String,
    created_by: Option<Uuid>,
    created_at: chrono::DateTime<chrono::Utc>,
    updated_at: chrono::DateTime<chrono::Utc>,
}

impl RequestRow {
    fn try_into_request(self) -> Result<Request> {
        Ok(Request {
            id: RequestId(self.id),
            equipment_id: EquipmentId(self.equipment_id),
            team_id: self.team_id.map(TeamId),
            kind: self.kind.parse()?,
            status: self.status.parse()?,
            duration_hours: self.duration_hours,
            scheduled_date: self.scheduled_date,
            title: self.title,
            description: self.description,
            created_by: self.created_by.map(UserId),
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct ProfileRow {
    id: Uuid,
    email: String,
    role: String,
    team_id: Option<Uuid>,
    full_name: String,
}

impl ProfileRow {
    fn try_into_profile(self) -> Result<Profile> {
        let role = match self.role.as_str() {
            "manager" => Role::Manager,
            "technician" => Role::Technician,
            other => return Err(Error::Store(format!("unknown role: {other}"))),
        };
        Ok(Profile {
            id: UserId(self.id),
            email: self.email,
            role,
            team_id: self.team_id.map(TeamId),
            full_name: self.full_name,
        })
    }
}
