//! Queries against the lab database.

use super::entity::{measurements, users};
use super::{TestType, ADMIN_EMAIL, ADMIN_PASSWORD, DEMO_EMAIL, DEMO_PASSWORD};
use crate::auth;
use crate::error::{AppResult, LabError};
use crate::validation;
use chrono::{NaiveDate, NaiveTime, Timelike};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, Database, DatabaseConnection, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, Schema, Set, TransactionTrait,
};
use serde::Serialize;
use std::path::Path;
use tracing::{info, warn};

/// Registration data for a new account.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    /// Plaintext; hashed before it is stored
    pub password: String,
    /// `None` lets the first-admin rule decide
    pub is_admin: Option<bool>,
}

/// A measurement joined with the name of the user who took it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MeasurementSummary {
    pub measurement_id: i32,
    pub date_recorded: NaiveDate,
    pub time_recorded: NaiveTime,
    pub user_id: i32,
    pub full_name: String,
    pub test_type: String,
    pub csv_file_path: Option<String>,
}

/// Handle to the SQLite database.
#[derive(Debug, Clone)]
pub struct Store {
    db: DatabaseConnection,
}

impl Store {
    /// Connect with a sea-orm URL such as `sqlite://database.db?mode=rwc`.
    pub async fn connect(url: &str) -> AppResult<Self> {
        let db = Database::connect(url).await?;
        Ok(Self { db })
    }

    pub fn connection(&self) -> &DatabaseConnection {
        &self.db
    }

    /// Create missing tables and seed the admin and demo accounts into an empty user table.
    pub async fn init_db(&self) -> AppResult<()> {
        let backend = self.db.get_database_backend();
        let schema = Schema::new(backend);

        let mut create_users = schema.create_table_from_entity(users::Entity);
        create_users.if_not_exists();
        self.db.execute(backend.build(&create_users)).await?;

        let mut create_measurements = schema.create_table_from_entity(measurements::Entity);
        create_measurements.if_not_exists();
        self.db.execute(backend.build(&create_measurements)).await?;

        if users::Entity::find().count(&self.db).await? == 0 {
            self.insert_user("Admin", "User", ADMIN_EMAIL, ADMIN_PASSWORD, true)
                .await?;
            info!(email = ADMIN_EMAIL, "Admin user created");
            self.insert_user("Demo", "User", DEMO_EMAIL, DEMO_PASSWORD, false)
                .await?;
            info!(email = DEMO_EMAIL, "Demo user created");
        }
        Ok(())
    }

    async fn insert_user(
        &self,
        first_name: &str,
        last_name: &str,
        email: &str,
        password: &str,
        is_admin: bool,
    ) -> AppResult<users::Model> {
        let user = users::ActiveModel {
            first_name: Set(first_name.to_string()),
            last_name: Set(last_name.to_string()),
            email: Set(email.to_string()),
            password: Set(auth::hash_password(password)?),
            is_admin: Set(is_admin),
            ..Default::default()
        };
        Ok(user.insert(&self.db).await?)
    }

    /// Register a user. While no administrator exists, the new user becomes one.
    pub async fn add_user(&self, new_user: NewUser) -> AppResult<users::Model> {
        validation::is_not_empty(&new_user.first_name)
            .map_err(|e| LabError::InvalidInput(format!("first name: {e}")))?;
        validation::is_not_empty(&new_user.last_name)
            .map_err(|e| LabError::InvalidInput(format!("last name: {e}")))?;
        validation::is_valid_email(&new_user.email)
            .map_err(|e| LabError::InvalidInput(format!("email: {e}")))?;
        validation::is_not_empty(&new_user.password)
            .map_err(|e| LabError::InvalidInput(format!("password: {e}")))?;

        if self.get_user_by_email(&new_user.email).await?.is_some() {
            return Err(LabError::Conflict("Email already exists".to_string()));
        }

        let admin_count = users::Entity::find()
            .filter(users::Column::IsAdmin.eq(true))
            .count(&self.db)
            .await?;
        let is_admin = admin_count == 0 || new_user.is_admin.unwrap_or(false);

        let user = self
            .insert_user(
                new_user.first_name.trim(),
                new_user.last_name.trim(),
                new_user.email.trim(),
                &new_user.password,
                is_admin,
            )
            .await?;
        info!(email = %user.email, is_admin, "User registered");
        Ok(user)
    }

    pub async fn get_user_by_id(&self, user_id: i32) -> AppResult<Option<users::Model>> {
        Ok(users::Entity::find_by_id(user_id).one(&self.db).await?)
    }

    pub async fn get_user_by_email(&self, email: &str) -> AppResult<Option<users::Model>> {
        Ok(users::Entity::find()
            .filter(users::Column::Email.eq(email.trim()))
            .one(&self.db)
            .await?)
    }

    /// Delete a user together with their measurements and the measurement files.
    pub async fn delete_user_by_id(&self, user_id: i32) -> AppResult<()> {
        let txn = self.db.begin().await?;
        let owned = measurements::Entity::find()
            .filter(measurements::Column::UserId.eq(user_id))
            .all(&txn)
            .await?;
        measurements::Entity::delete_many()
            .filter(measurements::Column::UserId.eq(user_id))
            .exec(&txn)
            .await?;
        let deleted = users::Entity::delete_by_id(user_id).exec(&txn).await?;
        if deleted.rows_affected == 0 {
            txn.rollback().await?;
            return Err(LabError::NotFound(format!("User {user_id}")));
        }
        txn.commit().await?;

        for measurement in owned {
            if let Some(path) = measurement.csv_file_path.as_deref() {
                remove_csv(path);
            }
        }
        info!(user_id, "User deleted");
        Ok(())
    }

    pub async fn set_admin(&self, user_id: i32, is_admin: bool) -> AppResult<users::Model> {
        let user = self
            .get_user_by_id(user_id)
            .await?
            .ok_or_else(|| LabError::NotFound(format!("User {user_id}")))?;
        let mut active: users::ActiveModel = user.into();
        active.is_admin = Set(is_admin);
        let user = active.update(&self.db).await?;
        info!(user_id, is_admin, "Admin flag changed");
        Ok(user)
    }

    /// Change email and/or password. Callers check the current password first.
    pub async fn update_credentials(
        &self,
        user_id: i32,
        new_email: Option<&str>,
        new_password: Option<&str>,
    ) -> AppResult<users::Model> {
        let user = self
            .get_user_by_id(user_id)
            .await?
            .ok_or_else(|| LabError::NotFound(format!("User {user_id}")))?;
        let mut active: users::ActiveModel = user.clone().into();

        if let Some(email) = new_email.map(str::trim).filter(|e| !e.is_empty()) {
            if email != user.email {
                validation::is_valid_email(email)
                    .map_err(|e| LabError::InvalidInput(format!("email: {e}")))?;
                if self.get_user_by_email(email).await?.is_some() {
                    return Err(LabError::Conflict("Email already exists".to_string()));
                }
                active.email = Set(email.to_string());
            }
        }
        if let Some(password) = new_password.filter(|p| !p.is_empty()) {
            active.password = Set(auth::hash_password(password)?);
        }

        Ok(active.update(&self.db).await?)
    }

    /// Every account except the shared demo login.
    pub async fn list_users(&self) -> AppResult<Vec<users::Model>> {
        Ok(users::Entity::find()
            .filter(users::Column::Email.ne(DEMO_EMAIL))
            .order_by_asc(users::Column::Id)
            .all(&self.db)
            .await?)
    }

    /// Record a measurement taken now; returns its id.
    pub async fn add_measurement(
        &self,
        user_id: i32,
        test_type: TestType,
        csv_file_path: Option<&Path>,
    ) -> AppResult<i32> {
        let now = chrono::Utc::now();
        let time = now.time();
        let measurement = measurements::ActiveModel {
            date_recorded: Set(now.date_naive()),
            time_recorded: Set(time.with_nanosecond(0).unwrap_or(time)),
            user_id: Set(user_id),
            test_type: Set(test_type.as_str().to_string()),
            csv_file_path: Set(csv_file_path.map(|p| p.to_string_lossy().into_owned())),
            ..Default::default()
        };
        let measurement = measurement.insert(&self.db).await?;
        info!(
            measurement_id = measurement.measurement_id,
            user_id,
            test_type = %test_type,
            "Measurement recorded"
        );
        Ok(measurement.measurement_id)
    }

    /// Measurements of one user, or of everybody.
    pub async fn get_measurements(
        &self,
        user_id: Option<i32>,
    ) -> AppResult<Vec<measurements::Model>> {
        let mut query = measurements::Entity::find();
        if let Some(user_id) = user_id {
            query = query.filter(measurements::Column::UserId.eq(user_id));
        }
        Ok(query
            .order_by_asc(measurements::Column::MeasurementId)
            .all(&self.db)
            .await?)
    }

    pub async fn get_measurement(
        &self,
        measurement_id: i32,
    ) -> AppResult<Option<measurements::Model>> {
        Ok(measurements::Entity::find_by_id(measurement_id)
            .one(&self.db)
            .await?)
    }

    /// Delete a measurement row and its CSV file.
    pub async fn delete_measurement(&self, measurement_id: i32) -> AppResult<measurements::Model> {
        let measurement = self
            .get_measurement(measurement_id)
            .await?
            .ok_or_else(|| LabError::NotFound("Measurement".to_string()))?;
        if let Some(path) = measurement.csv_file_path.as_deref() {
            remove_csv(path);
        }
        measurements::Entity::delete_by_id(measurement_id)
            .exec(&self.db)
            .await?;
        info!(measurement_id, "Measurement deleted");
        Ok(measurement)
    }

    async fn joined_measurements(&self, newest_first: bool) -> AppResult<Vec<MeasurementSummary>> {
        let query = measurements::Entity::find().find_also_related(users::Entity);
        let query = if newest_first {
            query
                .order_by_desc(measurements::Column::DateRecorded)
                .order_by_desc(measurements::Column::TimeRecorded)
                .order_by_desc(measurements::Column::MeasurementId)
        } else {
            query.order_by_asc(measurements::Column::MeasurementId)
        };

        Ok(query
            .all(&self.db)
            .await?
            .into_iter()
            .filter_map(|(m, user)| {
                user.map(|u| MeasurementSummary {
                    measurement_id: m.measurement_id,
                    date_recorded: m.date_recorded,
                    time_recorded: m.time_recorded,
                    user_id: m.user_id,
                    full_name: u.full_name(),
                    test_type: m.test_type,
                    csv_file_path: m.csv_file_path,
                })
            })
            .collect())
    }

    /// All measurements with the owner's full name, newest first.
    pub async fn admin_measurements(&self) -> AppResult<Vec<MeasurementSummary>> {
        self.joined_measurements(true).await
    }

    /// Write every measurement (id, date, time, full name, test type) as CSV.
    pub async fn export_measurements_csv<W: std::io::Write>(&self, writer: W) -> AppResult<()> {
        #[cfg(not(feature = "storage_csv"))]
        {
            let _ = writer;
            Err(LabError::FeatureNotEnabled("storage_csv".to_string()))
        }

        #[cfg(feature = "storage_csv")]
        {
            let rows = self.joined_measurements(false).await?;
            let mut writer = csv::Writer::from_writer(writer);
            writer.write_record(["Measurement ID", "Date", "Time", "Full Name", "Test Type"])?;
            for row in &rows {
                writer.write_record([
                    row.measurement_id.to_string(),
                    row.date_recorded.format("%Y-%m-%d").to_string(),
                    row.time_recorded.format("%H:%M:%S").to_string(),
                    row.full_name.clone(),
                    row.test_type.clone(),
                ])?;
            }
            writer.flush()?;
            Ok(())
        }
    }

    /// [`export_measurements_csv`](Self::export_measurements_csv) into a file.
    pub async fn export_measurements_to_csv(&self, path: &Path) -> AppResult<()> {
        let file = std::fs::File::create(path)?;
        self.export_measurements_csv(file).await?;
        info!(path = %path.display(), "Measurements exported");
        Ok(())
    }

    /// Hash every password still stored as plaintext; returns how many were converted.
    pub async fn migrate_passwords(&self) -> AppResult<usize> {
        let mut migrated = 0;
        for user in users::Entity::find().all(&self.db).await? {
            if auth::is_hashed(&user.password) {
                continue;
            }
            let hashed = auth::hash_password(&user.password)?;
            let mut active: users::ActiveModel = user.into();
            active.password = Set(hashed);
            active.update(&self.db).await?;
            migrated += 1;
        }
        info!(migrated, "Password migration completed");
        Ok(migrated)
    }

    /// Check a login. Returns the user on success; a matching legacy plaintext password
    /// is replaced by its hash on the way.
    pub async fn verify_login(&self, email: &str, password: &str) -> AppResult<Option<users::Model>> {
        let Some(user) = self.get_user_by_email(email).await? else {
            return Ok(None);
        };

        if auth::is_hashed(&user.password) {
            let matches = auth::verify_password(password, &user.password)?;
            return Ok(matches.then_some(user));
        }

        if user.password != password {
            return Ok(None);
        }
        let hashed = auth::hash_password(password)?;
        let mut active: users::ActiveModel = user.into();
        active.password = Set(hashed);
        let user = active.update(&self.db).await?;
        info!(email = %user.email, "Your password has been secured");
        Ok(Some(user))
    }
}

fn remove_csv(path: &str) {
    let path = Path::new(path);
    if !path.exists() {
        return;
    }
    match std::fs::remove_file(path) {
        Ok(()) => info!(path = %path.display(), "Deleted file"),
        Err(e) => warn!(path = %path.display(), error = %e, "Error deleting file"),
    }
}
