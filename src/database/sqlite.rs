use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool, sqlite::SqliteRow};
use uuid::Uuid;

use crate::devices::{
    database::{DeviceDatabase, DeviceDatabaseError},
    entities::{Device, GatewayKind},
};

const DEVICE_COLUMNS: &str =
    "id, gateway, registration_id, name, device_id, user, active, created_at";

pub struct SqliteDatabase {
    pool: SqlitePool,
}

impl SqliteDatabase {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Creates the necessary tables if they don't exist
    pub async fn init(&self) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS devices (
                id TEXT PRIMARY KEY,
                gateway TEXT NOT NULL,
                registration_id TEXT NOT NULL,
                name TEXT,
                device_id TEXT,
                user TEXT,
                active INTEGER NOT NULL DEFAULT 1,
                created_at INTEGER NOT NULL,
                UNIQUE (gateway, registration_id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

impl From<sqlx::Error> for DeviceDatabaseError {
    fn from(_: sqlx::Error) -> Self {
        DeviceDatabaseError::OperationFailed
    }
}

fn device_from_row(row: &SqliteRow) -> Result<Device, DeviceDatabaseError> {
    let id: String = row.try_get("id")?;
    let gateway: String = row.try_get("gateway")?;
    let created_at: i64 = row.try_get("created_at")?;

    Ok(Device {
        id: Uuid::parse_str(&id).map_err(|_| DeviceDatabaseError::OperationFailed)?,
        gateway: gateway
            .parse()
            .map_err(|_| DeviceDatabaseError::OperationFailed)?,
        registration_id: row.try_get("registration_id")?,
        name: row.try_get("name")?,
        device_id: row.try_get("device_id")?,
        user: row.try_get("user")?,
        active: row.try_get("active")?,
        created_at: Utc
            .timestamp_opt(created_at, 0)
            .single()
            .ok_or(DeviceDatabaseError::OperationFailed)?,
    })
}

#[async_trait]
impl DeviceDatabase for SqliteDatabase {
    async fn upsert_device(&self, device: Device) -> Result<(), DeviceDatabaseError> {
        sqlx::query(
            r#"
            INSERT INTO devices (id, gateway, registration_id, name, device_id, user, active, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(gateway, registration_id) DO UPDATE SET
                name = excluded.name,
                device_id = excluded.device_id,
                user = excluded.user,
                active = excluded.active
            "#,
        )
        .bind(device.id.to_string())
        .bind(device.gateway.as_str())
        .bind(&device.registration_id)
        .bind(&device.name)
        .bind(&device.device_id)
        .bind(&device.user)
        .bind(device.active)
        .bind(device.created_at.timestamp())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn fetch_device(
        &self,
        gateway: GatewayKind,
        registration_id: &str,
    ) -> Result<Option<Device>, DeviceDatabaseError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM devices WHERE gateway = ? AND registration_id = ?",
            DEVICE_COLUMNS
        ))
        .bind(gateway.as_str())
        .bind(registration_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(device_from_row).transpose()
    }

    async fn fetch_devices(
        &self,
        gateway: GatewayKind,
        registration_ids: &[String],
    ) -> Result<Vec<Device>, DeviceDatabaseError> {
        if registration_ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut query: QueryBuilder<Sqlite> = QueryBuilder::new(format!(
            "SELECT {} FROM devices WHERE gateway = ",
            DEVICE_COLUMNS
        ));
        query.push_bind(gateway.as_str());
        query.push(" AND registration_id IN (");
        let mut separated = query.separated(", ");
        for id in registration_ids {
            separated.push_bind(id);
        }
        separated.push_unseparated(")");

        let rows = query.build().fetch_all(&self.pool).await?;
        rows.iter().map(device_from_row).collect()
    }

    async fn list_devices(
        &self,
        gateway: GatewayKind,
        active: Option<bool>,
    ) -> Result<Vec<Device>, DeviceDatabaseError> {
        let mut query: QueryBuilder<Sqlite> = QueryBuilder::new(format!(
            "SELECT {} FROM devices WHERE gateway = ",
            DEVICE_COLUMNS
        ));
        query.push_bind(gateway.as_str());
        if let Some(active) = active {
            query.push(" AND active = ");
            query.push_bind(active);
        }
        query.push(" ORDER BY created_at");

        let rows = query.build().fetch_all(&self.pool).await?;
        rows.iter().map(device_from_row).collect()
    }

    async fn update_active(
        &self,
        gateway: GatewayKind,
        registration_ids: &[String],
        active: bool,
    ) -> Result<u64, DeviceDatabaseError> {
        if registration_ids.is_empty() {
            return Ok(0);
        }

        let mut query: QueryBuilder<Sqlite> = QueryBuilder::new("UPDATE devices SET active = ");
        query.push_bind(active);
        query.push(" WHERE gateway = ");
        query.push_bind(gateway.as_str());
        query.push(" AND registration_id IN (");
        let mut separated = query.separated(", ");
        for id in registration_ids {
            separated.push_bind(id);
        }
        separated.push_unseparated(")");

        let result = query.build().execute(&self.pool).await?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn create_test_db() -> SqliteDatabase {
        // A single connection keeps every query on the same in-memory database
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect(":memory:")
            .await
            .expect("Failed to connect to in-memory SQLite");
        let db = SqliteDatabase::new(pool);
        db.init().await.expect("Failed to initialize database");
        db
    }

    fn ids(values: &[&str]) -> Vec<String> {
        values.iter().map(|value| value.to_string()).collect()
    }

    #[tokio::test]
    async fn test_device_crud_operations() {
        let db = create_test_db().await;

        let device = Device {
            name: Some("iPhone".to_string()),
            user: Some("alice".to_string()),
            ..Device::new(GatewayKind::Apns, "abc123")
        };
        let device_id = device.id;

        db.upsert_device(device)
            .await
            .expect("Failed to upsert device");

        let fetched = db
            .fetch_device(GatewayKind::Apns, "abc123")
            .await
            .expect("Failed to fetch device")
            .expect("Device should exist");
        assert_eq!(fetched.id, device_id);
        assert_eq!(fetched.name.as_deref(), Some("iPhone"));
        assert!(fetched.active);

        // Same registration id under another gateway is a different device
        let other = db
            .fetch_device(GatewayKind::Gcm, "abc123")
            .await
            .expect("Failed to fetch device");
        assert!(other.is_none());
    }

    #[tokio::test]
    async fn test_reregistration_keeps_identity() {
        let db = create_test_db().await;

        let device = Device::new(GatewayKind::Gcm, "reg");
        let device_id = device.id;
        db.upsert_device(device).await.unwrap();
        db.upsert_device(Device {
            name: Some("Pixel".to_string()),
            ..Device::new(GatewayKind::Gcm, "reg")
        })
        .await
        .unwrap();

        let devices = db.list_devices(GatewayKind::Gcm, None).await.unwrap();
        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].id, device_id);
        assert_eq!(devices[0].name.as_deref(), Some("Pixel"));
    }

    #[tokio::test]
    async fn test_update_active_and_filtered_listing() {
        let db = create_test_db().await;
        for token in ["a", "b", "c"] {
            db.upsert_device(Device::new(GatewayKind::Apns, token))
                .await
                .unwrap();
        }

        let updated = db
            .update_active(GatewayKind::Apns, &ids(&["a", "b", "missing"]), false)
            .await
            .unwrap();
        assert_eq!(updated, 2);

        let active = db.list_devices(GatewayKind::Apns, Some(true)).await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].registration_id, "c");

        let inactive = db
            .fetch_devices(GatewayKind::Apns, &ids(&["a", "b", "c"]))
            .await
            .unwrap();
        assert_eq!(inactive.iter().filter(|device| !device.active).count(), 2);

        assert_eq!(
            db.update_active(GatewayKind::Apns, &[], true).await.unwrap(),
            0
        );
    }
}
