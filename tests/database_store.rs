//! User and measurement store against a throwaway SQLite file.

use hp4280a_lab::auth;
use hp4280a_lab::database::{NewUser, Store, TestType, ADMIN_EMAIL, DEMO_EMAIL};
use hp4280a_lab::error::LabError;
use std::path::Path;

async fn store(dir: &Path) -> Store {
    let url = format!("sqlite://{}?mode=rwc", dir.join("database.db").display());
    let store = Store::connect(&url).await.unwrap();
    store.init_db().await.unwrap();
    store
}

fn new_user(email: &str) -> NewUser {
    NewUser {
        first_name: "Ada".to_string(),
        last_name: "Lovelace".to_string(),
        email: email.to_string(),
        password: "engine".to_string(),
        is_admin: None,
    }
}

#[tokio::test]
async fn registration_hashes_and_rejects_duplicates() {
    let dir = tempfile::tempdir().unwrap();
    let store = store(dir.path()).await;

    let user = store.add_user(new_user("ada@lab.org")).await.unwrap();
    assert!(auth::is_hashed(&user.password));
    // the seeded admin already exists
    assert!(!user.is_admin);
    assert_eq!(user.full_name(), "Ada Lovelace");

    let err = store.add_user(new_user("ada@lab.org")).await.unwrap_err();
    assert!(matches!(err, LabError::Conflict(ref m) if m == "Email already exists"));

    let err = store.add_user(new_user("not-an-email")).await.unwrap_err();
    assert!(matches!(err, LabError::InvalidInput(_)));
}

#[tokio::test]
async fn first_user_becomes_admin_when_none_exists() {
    let dir = tempfile::tempdir().unwrap();
    let store = store(dir.path()).await;
    let admin = store.get_user_by_email(ADMIN_EMAIL).await.unwrap().unwrap();
    store.set_admin(admin.id, false).await.unwrap();

    let user = store.add_user(new_user("ada@lab.org")).await.unwrap();
    assert!(user.is_admin);
}

#[tokio::test]
async fn measurements_are_recorded_listed_and_deleted() {
    let dir = tempfile::tempdir().unwrap();
    let store = store(dir.path()).await;
    let user = store.add_user(new_user("ada@lab.org")).await.unwrap();
    let demo = store.get_user_by_email(DEMO_EMAIL).await.unwrap().unwrap();

    let csv = dir.path().join("data_2024-01-01_10-00-00.csv");
    std::fs::write(&csv, "C,G,V\n1,2,3\n").unwrap();

    let first = store
        .add_measurement(user.id, TestType::CapacitanceVoltage, Some(&csv))
        .await
        .unwrap();
    let second = store
        .add_measurement(demo.id, TestType::Pulse, None)
        .await
        .unwrap();
    assert!(second > first);

    let mine = store.get_measurements(Some(user.id)).await.unwrap();
    assert_eq!(mine.len(), 1);
    assert_eq!(mine[0].test_type, "C-V Measurement");
    assert_eq!(store.get_measurements(None).await.unwrap().len(), 2);

    let summaries = store.admin_measurements().await.unwrap();
    assert_eq!(summaries.len(), 2);
    let names: Vec<&str> = summaries.iter().map(|s| s.full_name.as_str()).collect();
    assert!(names.contains(&"Ada Lovelace"));
    assert!(names.contains(&"Demo User"));

    store.delete_measurement(first).await.unwrap();
    assert!(!csv.exists());
    assert!(store.get_measurement(first).await.unwrap().is_none());
    assert!(matches!(
        store.delete_measurement(first).await,
        Err(LabError::NotFound(_))
    ));
}

#[tokio::test]
async fn deleting_a_user_removes_their_measurements() {
    let dir = tempfile::tempdir().unwrap();
    let store = store(dir.path()).await;
    let user = store.add_user(new_user("ada@lab.org")).await.unwrap();
    let csv = dir.path().join("pulse.csv");
    std::fs::write(&csv, "pulse,C,G,V\n").unwrap();
    let id = store
        .add_measurement(user.id, TestType::Pulse, Some(&csv))
        .await
        .unwrap();

    store.delete_user_by_id(user.id).await.unwrap();
    assert!(store.get_user_by_id(user.id).await.unwrap().is_none());
    assert!(store.get_measurement(id).await.unwrap().is_none());
    assert!(!csv.exists());

    assert!(matches!(
        store.delete_user_by_id(user.id).await,
        Err(LabError::NotFound(_))
    ));
}

#[tokio::test]
async fn credentials_update() {
    let dir = tempfile::tempdir().unwrap();
    let store = store(dir.path()).await;
    let user = store.add_user(new_user("ada@lab.org")).await.unwrap();
    store.add_user(new_user("charles@lab.org")).await.unwrap();

    let err = store
        .update_credentials(user.id, Some("charles@lab.org"), None)
        .await
        .unwrap_err();
    assert!(matches!(err, LabError::Conflict(_)));

    let updated = store
        .update_credentials(user.id, Some("countess@lab.org"), Some("analytical"))
        .await
        .unwrap();
    assert_eq!(updated.email, "countess@lab.org");
    assert!(store
        .verify_login("countess@lab.org", "analytical")
        .await
        .unwrap()
        .is_some());
    assert!(store
        .verify_login("countess@lab.org", "engine")
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn user_list_hides_demo_account() {
    let dir = tempfile::tempdir().unwrap();
    let store = store(dir.path()).await;
    store.add_user(new_user("ada@lab.org")).await.unwrap();

    let emails: Vec<String> = store
        .list_users()
        .await
        .unwrap()
        .into_iter()
        .map(|u| u.email)
        .collect();
    assert_eq!(emails, vec![ADMIN_EMAIL.to_string(), "ada@lab.org".to_string()]);
}

#[tokio::test]
async fn export_writes_header_and_rows() {
    let dir = tempfile::tempdir().unwrap();
    let store = store(dir.path()).await;
    let user = store.add_user(new_user("ada@lab.org")).await.unwrap();
    store
        .add_measurement(user.id, TestType::CapacitanceTime, None)
        .await
        .unwrap();

    let out = dir.path().join("export.csv");
    store.export_measurements_to_csv(&out).await.unwrap();
    let text = std::fs::read_to_string(&out).unwrap();
    let mut lines = text.lines();
    assert_eq!(
        lines.next(),
        Some("Measurement ID,Date,Time,Full Name,Test Type")
    );
    let row = lines.next().unwrap();
    assert!(row.starts_with("1,"));
    assert!(row.ends_with(",Ada Lovelace,C-t Measurement"));
    assert!(lines.next().is_none());
}

#[tokio::test]
async fn migrate_passwords_hashes_plaintext_rows() {
    use hp4280a_lab::database::entity::users;
    use sea_orm::{ActiveModelTrait, Set};

    let dir = tempfile::tempdir().unwrap();
    let store = store(dir.path()).await;
    let user = store.add_user(new_user("ada@lab.org")).await.unwrap();
    let mut active: users::ActiveModel = user.into();
    active.password = Set("engine".to_string());
    active.update(store.connection()).await.unwrap();

    assert_eq!(store.migrate_passwords().await.unwrap(), 1);
    assert_eq!(store.migrate_passwords().await.unwrap(), 0);
    assert!(store
        .verify_login("ada@lab.org", "engine")
        .await
        .unwrap()
        .is_some());
}
