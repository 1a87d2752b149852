#[cfg(test)]
pub mod test_utils {
    use crate::clock::FixedClock;
    use crate::db::{create_call, create_person, create_slot};
    use crate::error::AppError;
    use crate::init_rocket;
    use crate::models::PersonKind;
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use rocket::local::asynchronous::Client;
    use sqlx::{Pool, Sqlite, SqlitePool};
    use std::collections::HashMap;
    use std::sync::{Arc, Once};

    static INIT: Once = Once::new();
    pub static STANDARD_PASSWORD: &str = "password123";

    /// The instant every test database and test client treats as "now".
    pub fn test_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap()
    }

    #[derive(Default)]
    pub struct TestDbBuilder {
        coaches: Vec<String>,
        students: Vec<String>,
        slots: Vec<TestSlot>,
        calls: Vec<TestCall>,
    }

    pub struct TestSlot {
        pub label: String,
        pub coach_name: String,
        pub student_name: Option<String>,
        pub offset: Duration,
    }

    pub struct TestCall {
        pub slot_label: String,
        pub satisfaction_score: Option<i64>,
        pub notes: String,
    }

    impl TestDbBuilder {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn coach(mut self, name: &str) -> Self {
            self.coaches.push(name.to_string());
            self
        }

        pub fn student(mut self, name: &str) -> Self {
            self.students.push(name.to_string());
            self
        }

        /// Adds a slot starting `offset` away from `test_now()`.
        pub fn slot(
            mut self,
            label: &str,
            coach_name: &str,
            student_name: Option<&str>,
            offset: Duration,
        ) -> Self {
            self.slots.push(TestSlot {
                label: label.to_string(),
                coach_name: coach_name.to_string(),
                student_name: student_name.map(String::from),
                offset,
            });
            self
        }

        pub fn call(mut self, slot_label: &str, satisfaction_score: Option<i64>, notes: &str) -> Self {
            self.calls.push(TestCall {
                slot_label: slot_label.to_string(),
                satisfaction_score,
                notes: notes.to_string(),
            });
            self
        }

        pub async fn build(self) -> Result<TestDb, AppError> {
            INIT.call_once(|| {
                let _ = env_logger::builder()
                    .parse_filters("debug")
                    .is_test(true)
                    .try_init();
            });

            let pool = SqlitePool::connect("sqlite::memory:").await?;

            sqlx::migrate!("./migrations").run(&pool).await?;

            let now = test_now();
            let mut coach_id_map: HashMap<String, i64> = HashMap::new();
            let mut student_id_map: HashMap<String, i64> = HashMap::new();
            let mut slot_id_map: HashMap<String, i64> = HashMap::new();
            let mut call_ids: Vec<i64> = Vec::new();

            for name in &self.coaches {
                let coach = create_person(
                    &pool,
                    PersonKind::Coach,
                    Some(name.as_str()),
                    Some("555-0100"),
                    Some(STANDARD_PASSWORD),
                    now,
                )
                .await?;
                coach_id_map.insert(name.clone(), coach.id);
            }

            for name in &self.students {
                let student = create_person(
                    &pool,
                    PersonKind::Student,
                    Some(name.as_str()),
                    Some("555-0200"),
                    Some(STANDARD_PASSWORD),
                    now,
                )
                .await?;
                student_id_map.insert(name.clone(), student.id);
            }

            for slot in &self.slots {
                let coach_id = coach_id_map.get(&slot.coach_name).copied().ok_or_else(|| {
                    AppError::Internal(format!("Unknown test coach {}", slot.coach_name))
                })?;

                let student_id = match &slot.student_name {
                    Some(name) => Some(student_id_map.get(name).copied().ok_or_else(|| {
                        AppError::Internal(format!("Unknown test student {}", name))
                    })?),
                    None => None,
                };

                let created = create_slot(
                    &pool,
                    Some(coach_id),
                    Some(now + slot.offset),
                    student_id,
                    now,
                )
                .await?;
                slot_id_map.insert(slot.label.clone(), created.id);
            }

            for call in &self.calls {
                let slot_id = slot_id_map.get(&call.slot_label).copied().ok_or_else(|| {
                    AppError::Internal(format!("Unknown test slot {}", call.slot_label))
                })?;

                let created = create_call(
                    &pool,
                    Some(slot_id),
                    call.satisfaction_score,
                    Some(call.notes.as_str()),
                    now,
                )
                .await?;
                call_ids.push(created.id);
            }

            Ok(TestDb {
                pool,
                now,
                coach_id_map,
                student_id_map,
                slot_id_map,
                call_ids,
            })
        }
    }

    pub struct TestDb {
        pub pool: Pool<Sqlite>,
        pub now: DateTime<Utc>,
        pub coach_id_map: HashMap<String, i64>,
        pub student_id_map: HashMap<String, i64>,
        pub slot_id_map: HashMap<String, i64>,
        pub call_ids: Vec<i64>,
    }

    impl TestDb {
        pub fn coach_id(&self, name: &str) -> i64 {
            self.coach_id_map[name]
        }

        pub fn student_id(&self, name: &str) -> i64 {
            self.student_id_map[name]
        }

        pub fn slot_id(&self, label: &str) -> i64 {
            self.slot_id_map[label]
        }

        pub async fn count(&self, table: &str) -> i64 {
            sqlx::query_scalar::<_, i64>(&format!("SELECT COUNT(*) FROM {}", table))
                .fetch_one(&self.pool)
                .await
                .expect("Failed to count rows")
        }
    }

    /// One coach with an upcoming and a past slot for the same student, plus
    /// an unassigned upcoming slot.
    pub async fn create_standard_test_db() -> TestDb {
        TestDbBuilder::new()
            .coach("Coach User")
            .student("Student User")
            .slot(
                "upcoming",
                "Coach User",
                Some("Student User"),
                Duration::hours(1),
            )
            .slot("past", "Coach User", Some("Student User"), Duration::hours(-1))
            .slot("open", "Coach User", None, Duration::days(2))
            .build()
            .await
            .expect("Failed to build standard test database")
    }

    pub async fn setup_test_client(test_db: TestDb) -> (Client, TestDb) {
        let rocket = init_rocket(test_db.pool.clone(), Arc::new(FixedClock(test_db.now)));

        let client = Client::tracked(rocket)
            .await
            .expect("Failed to build test client");

        (client, test_db)
    }
}
