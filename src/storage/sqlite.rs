// SQLite-backed store behind the `database` feature.
//
// Same contract as the in-memory store: appointments earliest-first,
// timeline in creation order, version bumped on every referral write.

use std::str::FromStr;

use anyhow::anyhow;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use tracing::info;
use uuid::Uuid;

use crate::config::DatabaseConfig;
use crate::referral::types::{
    Appointment, AppointmentStatus, AppointmentUpdate, ContactUpdate, NewAppointment,
    NewNotification, NewPatient, NewReferral, NewTask, NewTimelineEvent, Notification,
    NotificationChannel, NotificationKind, Patient, Priority, Referral, ReferralStatus, Role,
    Specialty, Task, TaskKind, TaskStatus, TimelineEvent, TimelineEventKind,
};

use super::{ListScope, ReferralFilter, ReferralStore, StoreError};

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if missing) and bootstrap the schema.
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(|e| StoreError::Backend(e.into()))?
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.create_schema().await?;
        info!(url = url, "sqlite store ready");
        Ok(store)
    }

    pub async fn from_config(config: &DatabaseConfig) -> Result<Self, StoreError> {
        Self::connect(&config.url, config.max_connections).await
    }

    /// Get database pool for queries
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn create_schema(&self) -> Result<(), StoreError> {
        let statements = [
            r#"
            CREATE TABLE IF NOT EXISTS patients (
                id TEXT PRIMARY KEY,
                full_name TEXT NOT NULL,
                email TEXT,
                phone TEXT,
                risk_score INTEGER NOT NULL DEFAULT 0,
                medical_history TEXT NOT NULL DEFAULT '[]',
                created_at TEXT NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS referrals (
                id TEXT PRIMARY KEY,
                patient_id TEXT NOT NULL REFERENCES patients(id),
                created_by TEXT NOT NULL,
                specialty TEXT NOT NULL,
                priority TEXT NOT NULL,
                status TEXT NOT NULL,
                notes TEXT,
                due_date TEXT,
                transportation_needed INTEGER NOT NULL DEFAULT 0,
                is_urgent INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                version INTEGER NOT NULL DEFAULT 1
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS appointments (
                id TEXT PRIMARY KEY,
                referral_id TEXT NOT NULL REFERENCES referrals(id),
                scheduled_for TEXT NOT NULL,
                location TEXT NOT NULL,
                status TEXT NOT NULL,
                created_at TEXT NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS timeline_events (
                id TEXT PRIMARY KEY,
                referral_id TEXT NOT NULL REFERENCES referrals(id),
                kind TEXT NOT NULL,
                description TEXT NOT NULL,
                timestamp TEXT NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS tasks (
                id TEXT PRIMARY KEY,
                referral_id TEXT NOT NULL REFERENCES referrals(id),
                kind TEXT NOT NULL,
                status TEXT NOT NULL,
                due_at TEXT,
                assigned_to TEXT NOT NULL,
                created_at TEXT NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS notifications (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                kind TEXT NOT NULL,
                channel TEXT NOT NULL,
                message TEXT NOT NULL,
                is_read INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL
            )
            "#,
        ];
        for statement in statements {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    /// Close database connections gracefully
    pub async fn shutdown(&self) {
        info!("Shutting down database connections...");
        self.pool.close().await;
        info!("Database connections closed");
    }
}

// -- row decoding ---------------------------------------------------------

fn uuid_col(row: &SqliteRow, name: &str) -> Result<Uuid, StoreError> {
    let value: String = row.get(name);
    Uuid::parse_str(&value).map_err(|e| StoreError::Backend(anyhow!("bad uuid in {name}: {e}")))
}

fn datetime_col(row: &SqliteRow, name: &str) -> Result<DateTime<Utc>, StoreError> {
    let value: String = row.get(name);
    DateTime::parse_from_rfc3339(&value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::Backend(anyhow!("bad timestamp in {name}: {e}")))
}

fn opt_datetime_col(row: &SqliteRow, name: &str) -> Result<Option<DateTime<Utc>>, StoreError> {
    let value: Option<String> = row.get(name);
    value
        .map(|v| {
            DateTime::parse_from_rfc3339(&v)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|e| StoreError::Backend(anyhow!("bad timestamp in {name}: {e}")))
        })
        .transpose()
}

fn enum_col<T: FromStr<Err = String>>(row: &SqliteRow, name: &str) -> Result<T, StoreError> {
    let value: String = row.get(name);
    value
        .parse()
        .map_err(|e: String| StoreError::Backend(anyhow!(e)))
}

fn patient_from_row(row: &SqliteRow) -> Result<Patient, StoreError> {
    let history: String = row.get("medical_history");
    Ok(Patient {
        id: uuid_col(row, "id")?,
        full_name: row.get("full_name"),
        email: row.get("email"),
        phone: row.get("phone"),
        risk_score: row.get("risk_score"),
        medical_history: serde_json::from_str(&history)
            .map_err(|e| StoreError::Backend(anyhow!("bad medical_history: {e}")))?,
        created_at: datetime_col(row, "created_at")?,
    })
}

fn referral_from_row(row: &SqliteRow) -> Result<Referral, StoreError> {
    let due_date: Option<String> = row.get("due_date");
    let due_date = due_date
        .map(|d| {
            NaiveDate::parse_from_str(&d, "%Y-%m-%d")
                .map_err(|e| StoreError::Backend(anyhow!("bad due_date: {e}")))
        })
        .transpose()?;
    Ok(Referral {
        id: uuid_col(row, "id")?,
        patient_id: uuid_col(row, "patient_id")?,
        created_by: uuid_col(row, "created_by")?,
        specialty: enum_col::<Specialty>(row, "specialty")?,
        priority: enum_col::<Priority>(row, "priority")?,
        status: enum_col::<ReferralStatus>(row, "status")?,
        notes: row.get("notes"),
        due_date,
        transportation_needed: row.get("transportation_needed"),
        is_urgent: row.get("is_urgent"),
        created_at: datetime_col(row, "created_at")?,
        updated_at: datetime_col(row, "updated_at")?,
        version: row.get("version"),
    })
}

fn appointment_from_row(row: &SqliteRow) -> Result<Appointment, StoreError> {
    Ok(Appointment {
        id: uuid_col(row, "id")?,
        referral_id: uuid_col(row, "referral_id")?,
        scheduled_for: datetime_col(row, "scheduled_for")?,
        location: row.get("location"),
        status: enum_col::<AppointmentStatus>(row, "status")?,
        created_at: datetime_col(row, "created_at")?,
    })
}

fn timeline_event_from_row(row: &SqliteRow) -> Result<TimelineEvent, StoreError> {
    Ok(TimelineEvent {
        id: uuid_col(row, "id")?,
        referral_id: uuid_col(row, "referral_id")?,
        kind: enum_col::<TimelineEventKind>(row, "kind")?,
        description: row.get("description"),
        timestamp: datetime_col(row, "timestamp")?,
    })
}

fn task_from_row(row: &SqliteRow) -> Result<Task, StoreError> {
    Ok(Task {
        id: uuid_col(row, "id")?,
        referral_id: uuid_col(row, "referral_id")?,
        kind: enum_col::<TaskKind>(row, "kind")?,
        status: enum_col::<TaskStatus>(row, "status")?,
        due_at: opt_datetime_col(row, "due_at")?,
        assigned_to: row.get("assigned_to"),
        created_at: datetime_col(row, "created_at")?,
    })
}

fn notification_from_row(row: &SqliteRow) -> Result<Notification, StoreError> {
    Ok(Notification {
        id: uuid_col(row, "id")?,
        user_id: uuid_col(row, "user_id")?,
        kind: enum_col::<NotificationKind>(row, "kind")?,
        channel: enum_col::<NotificationChannel>(row, "channel")?,
        message: row.get("message"),
        is_read: row.get("is_read"),
        created_at: datetime_col(row, "created_at")?,
    })
}

#[async_trait]
impl ReferralStore for SqliteStore {
    async fn get_patient(&self, id: Uuid) -> Result<Patient, StoreError> {
        let row = sqlx::query("SELECT * FROM patients WHERE id = ?1")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StoreError::NotFound)?;
        patient_from_row(&row)
    }

    async fn list_patients(&self) -> Result<Vec<Patient>, StoreError> {
        let rows = sqlx::query("SELECT * FROM patients ORDER BY created_at DESC")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(patient_from_row).collect()
    }

    async fn insert_patient(&self, new: NewPatient) -> Result<Patient, StoreError> {
        let id = Uuid::new_v4();
        let now = Utc::now();
        let history = serde_json::to_string(&new.medical_history)
            .map_err(|e| StoreError::Backend(e.into()))?;
        sqlx::query(
            r#"
            INSERT INTO patients (id, full_name, email, phone, risk_score, medical_history, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(id.to_string())
        .bind(&new.full_name)
        .bind(&new.email)
        .bind(&new.phone)
        .bind(new.risk_score)
        .bind(history)
        .bind(now.to_rfc3339())
        .execute(&self.pool)
        .await?;
        self.get_patient(id).await
    }

    async fn update_patient_contact(
        &self,
        id: Uuid,
        update: ContactUpdate,
    ) -> Result<Patient, StoreError> {
        let current = self.get_patient(id).await?;
        let email = update.email.or(current.email);
        let phone = update.phone.or(current.phone);
        sqlx::query("UPDATE patients SET email = ?1, phone = ?2 WHERE id = ?3")
            .bind(&email)
            .bind(&phone)
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        self.get_patient(id).await
    }

    async fn get_referral(&self, id: Uuid) -> Result<Referral, StoreError> {
        let row = sqlx::query("SELECT * FROM referrals WHERE id = ?1")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StoreError::NotFound)?;
        referral_from_row(&row)
    }

    async fn list_referrals(&self, filter: &ReferralFilter) -> Result<Vec<Referral>, StoreError> {
        let rows = match (filter.scope, filter.role, filter.user_id) {
            (ListScope::Mine, Some(Role::Patient), Some(user_id)) => {
                sqlx::query(
                    "SELECT * FROM referrals WHERE patient_id = ?1 ORDER BY created_at DESC",
                )
                .bind(user_id.to_string())
                .fetch_all(&self.pool)
                .await?
            }
            (ListScope::Mine, Some(Role::Specialist), _) => {
                sqlx::query(
                    "SELECT * FROM referrals WHERE status IN ('SENT', 'NEEDS_RESCHEDULE') ORDER BY created_at DESC",
                )
                .fetch_all(&self.pool)
                .await?
            }
            _ => {
                sqlx::query("SELECT * FROM referrals ORDER BY created_at DESC")
                    .fetch_all(&self.pool)
                    .await?
            }
        };
        rows.iter().map(referral_from_row).collect()
    }

    async fn insert_referral(&self, new: NewReferral) -> Result<Referral, StoreError> {
        let id = Uuid::new_v4();
        let now = Utc::now();
        sqlx::query(
            r#"
            INSERT INTO referrals (
                id, patient_id, created_by, specialty, priority, status, notes, due_date,
                transportation_needed, is_urgent, created_at, updated_at, version
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, 1)
            "#,
        )
        .bind(id.to_string())
        .bind(new.patient_id.to_string())
        .bind(new.created_by.to_string())
        .bind(new.specialty.as_str())
        .bind(new.priority.as_str())
        .bind(new.status.as_str())
        .bind(&new.notes)
        .bind(new.due_date.map(|d| d.format("%Y-%m-%d").to_string()))
        .bind(new.transportation_needed)
        .bind(new.is_urgent)
        .bind(now.to_rfc3339())
        .bind(now.to_rfc3339())
        .execute(&self.pool)
        .await?;
        self.get_referral(id).await
    }

    async fn update_referral_status(
        &self,
        id: Uuid,
        status: ReferralStatus,
        expected_version: Option<i64>,
    ) -> Result<Referral, StoreError> {
        let now = Utc::now().to_rfc3339();
        let result = match expected_version {
            Some(version) => {
                sqlx::query(
                    r#"
                    UPDATE referrals SET status = ?1, updated_at = ?2, version = version + 1
                    WHERE id = ?3 AND version = ?4
                    "#,
                )
                .bind(status.as_str())
                .bind(&now)
                .bind(id.to_string())
                .bind(version)
                .execute(&self.pool)
                .await?
            }
            None => {
                sqlx::query(
                    r#"
                    UPDATE referrals SET status = ?1, updated_at = ?2, version = version + 1
                    WHERE id = ?3
                    "#,
                )
                .bind(status.as_str())
                .bind(&now)
                .bind(id.to_string())
                .execute(&self.pool)
                .await?
            }
        };

        if result.rows_affected() == 0 {
            // Missing row or stale version; look to tell the two apart.
            return match self.get_referral(id).await {
                Ok(_) => Err(StoreError::Conflict),
                Err(err) => Err(err),
            };
        }
        self.get_referral(id).await
    }

    async fn set_transportation_needed(
        &self,
        id: Uuid,
        needed: bool,
    ) -> Result<Referral, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE referrals SET transportation_needed = ?1, updated_at = ?2, version = version + 1
            WHERE id = ?3
            "#,
        )
        .bind(needed)
        .bind(Utc::now().to_rfc3339())
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        self.get_referral(id).await
    }

    async fn insert_appointment(
        &self,
        referral_id: Uuid,
        new: NewAppointment,
    ) -> Result<Appointment, StoreError> {
        let id = Uuid::new_v4();
        let now = Utc::now();
        sqlx::query(
            r#"
            INSERT INTO appointments (id, referral_id, scheduled_for, location, status, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(id.to_string())
        .bind(referral_id.to_string())
        .bind(new.scheduled_for.to_rfc3339())
        .bind(&new.location)
        .bind(new.status.as_str())
        .bind(now.to_rfc3339())
        .execute(&self.pool)
        .await?;

        let row = sqlx::query("SELECT * FROM appointments WHERE id = ?1")
            .bind(id.to_string())
            .fetch_one(&self.pool)
            .await?;
        appointment_from_row(&row)
    }

    async fn update_appointment(
        &self,
        id: Uuid,
        update: AppointmentUpdate,
    ) -> Result<Appointment, StoreError> {
        let row = sqlx::query("SELECT * FROM appointments WHERE id = ?1")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StoreError::NotFound)?;
        let current = appointment_from_row(&row)?;

        let scheduled_for = update.scheduled_for.unwrap_or(current.scheduled_for);
        let location = update.location.unwrap_or(current.location);
        let status = update.status.unwrap_or(current.status);

        sqlx::query(
            "UPDATE appointments SET scheduled_for = ?1, location = ?2, status = ?3 WHERE id = ?4",
        )
        .bind(scheduled_for.to_rfc3339())
        .bind(&location)
        .bind(status.as_str())
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        let row = sqlx::query("SELECT * FROM appointments WHERE id = ?1")
            .bind(id.to_string())
            .fetch_one(&self.pool)
            .await?;
        appointment_from_row(&row)
    }

    async fn list_appointments(&self, referral_id: Uuid) -> Result<Vec<Appointment>, StoreError> {
        let rows = sqlx::query(
            "SELECT * FROM appointments WHERE referral_id = ?1 ORDER BY scheduled_for ASC",
        )
        .bind(referral_id.to_string())
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(appointment_from_row).collect()
    }

    async fn insert_timeline_event(
        &self,
        referral_id: Uuid,
        event: NewTimelineEvent,
    ) -> Result<TimelineEvent, StoreError> {
        let id = Uuid::new_v4();
        sqlx::query(
            r#"
            INSERT INTO timeline_events (id, referral_id, kind, description, timestamp)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
        )
        .bind(id.to_string())
        .bind(referral_id.to_string())
        .bind(event.kind.as_str())
        .bind(&event.description)
        .bind(event.timestamp.to_rfc3339())
        .execute(&self.pool)
        .await?;

        let row = sqlx::query("SELECT * FROM timeline_events WHERE id = ?1")
            .bind(id.to_string())
            .fetch_one(&self.pool)
            .await?;
        timeline_event_from_row(&row)
    }

    async fn list_timeline_events(
        &self,
        referral_id: Uuid,
    ) -> Result<Vec<TimelineEvent>, StoreError> {
        let rows = sqlx::query(
            "SELECT * FROM timeline_events WHERE referral_id = ?1 ORDER BY rowid ASC",
        )
        .bind(referral_id.to_string())
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(timeline_event_from_row).collect()
    }

    async fn insert_task(&self, new: NewTask) -> Result<Task, StoreError> {
        let id = Uuid::new_v4();
        let now = Utc::now();
        sqlx::query(
            r#"
            INSERT INTO tasks (id, referral_id, kind, status, due_at, assigned_to, created_at)
            VALUES (?1, ?2, ?3, 'OPEN', ?4, ?5, ?6)
            "#,
        )
        .bind(id.to_string())
        .bind(new.referral_id.to_string())
        .bind(new.kind.as_str())
        .bind(new.due_at.map(|d| d.to_rfc3339()))
        .bind(&new.assigned_to)
        .bind(now.to_rfc3339())
        .execute(&self.pool)
        .await?;
        self.get_task(id).await
    }

    async fn get_task(&self, id: Uuid) -> Result<Task, StoreError> {
        let row = sqlx::query("SELECT * FROM tasks WHERE id = ?1")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StoreError::NotFound)?;
        task_from_row(&row)
    }

    async fn list_open_tasks(
        &self,
        referral_id: Option<Uuid>,
        kind: Option<TaskKind>,
    ) -> Result<Vec<Task>, StoreError> {
        let mut sql = String::from("SELECT * FROM tasks WHERE status = 'OPEN'");
        if referral_id.is_some() {
            sql.push_str(" AND referral_id = ?1");
        }
        if kind.is_some() {
            sql.push_str(if referral_id.is_some() {
                " AND kind = ?2"
            } else {
                " AND kind = ?1"
            });
        }
        sql.push_str(" ORDER BY due_at IS NULL, due_at ASC, created_at ASC");

        let mut query = sqlx::query(&sql);
        if let Some(referral_id) = referral_id {
            query = query.bind(referral_id.to_string());
        }
        if let Some(kind) = kind {
            query = query.bind(kind.as_str());
        }
        let rows = query.fetch_all(&self.pool).await?;
        rows.iter().map(task_from_row).collect()
    }

    async fn update_task_status(&self, id: Uuid, status: TaskStatus) -> Result<Task, StoreError> {
        let result = sqlx::query("UPDATE tasks SET status = ?1 WHERE id = ?2")
            .bind(status.as_str())
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        self.get_task(id).await
    }

    async fn insert_notification(
        &self,
        new: NewNotification,
    ) -> Result<Notification, StoreError> {
        let id = Uuid::new_v4();
        let now = Utc::now();
        sqlx::query(
            r#"
            INSERT INTO notifications (id, user_id, kind, channel, message, is_read, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6)
            "#,
        )
        .bind(id.to_string())
        .bind(new.user_id.to_string())
        .bind(new.kind.as_str())
        .bind(new.channel.as_str())
        .bind(&new.message)
        .bind(now.to_rfc3339())
        .execute(&self.pool)
        .await?;

        let row = sqlx::query("SELECT * FROM notifications WHERE id = ?1")
            .bind(id.to_string())
            .fetch_one(&self.pool)
            .await?;
        notification_from_row(&row)
    }

    async fn list_notifications(&self, user_id: Uuid) -> Result<Vec<Notification>, StoreError> {
        let rows =
            sqlx::query("SELECT * FROM notifications WHERE user_id = ?1 ORDER BY rowid ASC")
                .bind(user_id.to_string())
                .fetch_all(&self.pool)
                .await?;
        rows.iter().map(notification_from_row).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn store() -> (SqliteStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}", dir.path().join("loop.db").display());
        (SqliteStore::connect(&url, 2).await.unwrap(), dir)
    }

    async fn seed_patient(store: &SqliteStore) -> Patient {
        store
            .insert_patient(NewPatient {
                full_name: "Maria Garcia".to_string(),
                email: Some("maria@example.com".to_string()),
                phone: Some("555-0101".to_string()),
                risk_score: 1,
                medical_history: vec!["hypertension".to_string()],
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_referral_round_trip() {
        let (store, _dir) = store().await;
        let patient = seed_patient(&store).await;

        let referral = store
            .insert_referral(NewReferral {
                patient_id: patient.id,
                created_by: Uuid::new_v4(),
                specialty: Specialty::Cardiology,
                priority: Priority::High,
                status: ReferralStatus::Sent,
                notes: Some("Chest pain evaluation".to_string()),
                due_date: Some(NaiveDate::from_ymd_opt(2025, 3, 1).unwrap()),
                transportation_needed: true,
                is_urgent: false,
            })
            .await
            .unwrap();

        let loaded = store.get_referral(referral.id).await.unwrap();
        assert_eq!(loaded, referral);
        assert_eq!(loaded.status, ReferralStatus::Sent);
        assert_eq!(loaded.version, 1);
        assert_eq!(loaded.due_date, Some(NaiveDate::from_ymd_opt(2025, 3, 1).unwrap()));
    }

    #[tokio::test]
    async fn test_status_cas() {
        let (store, _dir) = store().await;
        let patient = seed_patient(&store).await;
        let referral = store
            .insert_referral(NewReferral {
                patient_id: patient.id,
                created_by: Uuid::new_v4(),
                specialty: Specialty::Orthopedics,
                priority: Priority::Medium,
                status: ReferralStatus::Sent,
                notes: None,
                due_date: None,
                transportation_needed: false,
                is_urgent: false,
            })
            .await
            .unwrap();

        let updated = store
            .update_referral_status(referral.id, ReferralStatus::Booked, Some(referral.version))
            .await
            .unwrap();
        assert_eq!(updated.version, referral.version + 1);

        let err = store
            .update_referral_status(referral.id, ReferralStatus::Closed, Some(referral.version))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict));

        let err = store
            .update_referral_status(Uuid::new_v4(), ReferralStatus::Closed, None)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound));
    }

    #[tokio::test]
    async fn test_open_task_ordering_and_close() {
        let (store, _dir) = store().await;
        let patient = seed_patient(&store).await;
        let referral = store
            .insert_referral(NewReferral {
                patient_id: patient.id,
                created_by: Uuid::new_v4(),
                specialty: Specialty::Cardiology,
                priority: Priority::High,
                status: ReferralStatus::Sent,
                notes: None,
                due_date: None,
                transportation_needed: false,
                is_urgent: false,
            })
            .await
            .unwrap();

        store
            .insert_task(NewTask {
                referral_id: referral.id,
                kind: TaskKind::Transport,
                due_at: None,
                assigned_to: "Volunteer Drivers".to_string(),
            })
            .await
            .unwrap();
        let soon = store
            .insert_task(NewTask {
                referral_id: referral.id,
                kind: TaskKind::Reschedule,
                due_at: Some(Utc::now() + chrono::Duration::hours(1)),
                assigned_to: "Nursing Station".to_string(),
            })
            .await
            .unwrap();

        let open = store.list_open_tasks(Some(referral.id), None).await.unwrap();
        assert_eq!(open.len(), 2);
        assert_eq!(open[0].id, soon.id);

        store.update_task_status(soon.id, TaskStatus::Done).await.unwrap();
        let open = store
            .list_open_tasks(Some(referral.id), Some(TaskKind::Reschedule))
            .await
            .unwrap();
        assert!(open.is_empty());
    }
}
