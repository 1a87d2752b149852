use chrono::{DateTime, Utc};
use serde::Deserialize;
use sqlx::{Pool, Sqlite};
use tracing::{info, instrument};

use crate::error::AppError;
use crate::models::{
    Call, CallWithSlot, DbCall, DbCallWithSlot, DbPerson, DbSlot, DbSlotWithPerson, Person,
    PersonKind, Slot, SlotWithCoach, SlotWithStudent,
};

const SLOT_COLUMNS: &str = "s.id, s.coach_id, s.start_time, s.student_id, s.created_at, s.updated_at";

const PERSON_JOIN_COLUMNS: &str = "p.id AS person_id, p.name AS person_name,
    p.phone_number AS person_phone_number, p.password AS person_password,
    p.created_at AS person_created_at, p.updated_at AS person_updated_at";

// Coaches and students

#[instrument(skip(pool, password))]
pub async fn create_person(
    pool: &Pool<Sqlite>,
    kind: PersonKind,
    name: Option<&str>,
    phone_number: Option<&str>,
    password: Option<&str>,
    now: DateTime<Utc>,
) -> Result<Person, AppError> {
    info!("Creating {}", kind);
    let query = format!(
        "INSERT INTO {} (name, phone_number, password, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?)",
        kind.table()
    );

    let res = sqlx::query(&query)
        .bind(name)
        .bind(phone_number)
        .bind(password)
        .bind(now)
        .bind(now)
        .execute(pool)
        .await?;

    get_person(pool, kind, res.last_insert_rowid()).await
}

#[instrument(skip(pool))]
pub async fn get_all_people(pool: &Pool<Sqlite>, kind: PersonKind) -> Result<Vec<Person>, AppError> {
    info!("Getting all {}", kind.table());
    let query = format!(
        "SELECT id, name, phone_number, password, created_at, updated_at FROM {}",
        kind.table()
    );

    let rows = sqlx::query_as::<_, DbPerson>(&query)
        .fetch_all(pool)
        .await?;

    Ok(rows.into_iter().map(Person::from).collect())
}

#[instrument(skip(pool))]
pub async fn get_person(pool: &Pool<Sqlite>, kind: PersonKind, id: i64) -> Result<Person, AppError> {
    info!("Fetching {} by ID", kind);
    let query = format!(
        "SELECT id, name, phone_number, password, created_at, updated_at FROM {} WHERE id = ?",
        kind.table()
    );

    let row = sqlx::query_as::<_, DbPerson>(&query)
        .bind(id)
        .fetch_optional(pool)
        .await?;

    match row {
        Some(person) => Ok(Person::from(person)),
        _ => Err(AppError::NotFound(format!("{} not found", kind))),
    }
}

#[instrument(skip(pool, password))]
pub async fn update_person(
    pool: &Pool<Sqlite>,
    kind: PersonKind,
    id: i64,
    name: Option<&str>,
    phone_number: Option<&str>,
    password: Option<&str>,
    now: DateTime<Utc>,
) -> Result<Person, AppError> {
    info!("Updating {}", kind);
    let query = format!(
        "UPDATE {} SET name = ?, phone_number = ?, password = ?, updated_at = ? WHERE id = ?",
        kind.table()
    );

    let res = sqlx::query(&query)
        .bind(name)
        .bind(phone_number)
        .bind(password)
        .bind(now)
        .bind(id)
        .execute(pool)
        .await?;

    if res.rows_affected() == 0 {
        return Err(AppError::NotFound(format!("{} not found", kind)));
    }

    get_person(pool, kind, id).await
}

#[instrument(skip(pool))]
pub async fn delete_person(pool: &Pool<Sqlite>, kind: PersonKind, id: i64) -> Result<(), AppError> {
    info!("Deleting {}", kind);
    let query = format!("DELETE FROM {} WHERE id = ?", kind.table());

    let res = sqlx::query(&query).bind(id).execute(pool).await?;

    if res.rows_affected() == 0 {
        return Err(AppError::NotFound(format!("{} not found", kind)));
    }

    Ok(())
}

// Slots

#[instrument(skip(pool))]
pub async fn create_slot(
    pool: &Pool<Sqlite>,
    coach_id: Option<i64>,
    start_time: Option<DateTime<Utc>>,
    student_id: Option<i64>,
    now: DateTime<Utc>,
) -> Result<Slot, AppError> {
    info!("Creating slot");
    let res = sqlx::query(
        "INSERT INTO slots (coach_id, start_time, student_id, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?)",
    )
    .bind(coach_id)
    .bind(start_time)
    .bind(student_id)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await?;

    get_slot(pool, res.last_insert_rowid()).await
}

#[instrument(skip(pool))]
pub async fn get_slot(pool: &Pool<Sqlite>, id: i64) -> Result<Slot, AppError> {
    info!("Fetching slot by ID");
    let query = format!("SELECT {} FROM slots s WHERE s.id = ?", SLOT_COLUMNS);

    let row = sqlx::query_as::<_, DbSlot>(&query)
        .bind(id)
        .fetch_optional(pool)
        .await?;

    match row {
        Some(slot) => Ok(Slot::from(slot)),
        _ => Err(AppError::NotFound("Slot not found".to_string())),
    }
}

#[instrument(skip(pool))]
pub async fn get_upcoming_slots(pool: &Pool<Sqlite>, now: DateTime<Utc>) -> Result<Vec<Slot>, AppError> {
    info!("Getting upcoming slots");
    let query = format!(
        "SELECT {} FROM slots s WHERE s.start_time > ? ORDER BY s.id",
        SLOT_COLUMNS
    );

    let rows = sqlx::query_as::<_, DbSlot>(&query)
        .bind(now)
        .fetch_all(pool)
        .await?;

    Ok(rows.into_iter().map(Slot::from).collect())
}

#[instrument(skip(pool))]
pub async fn get_upcoming_slots_for_coach(
    pool: &Pool<Sqlite>,
    coach_id: i64,
    now: DateTime<Utc>,
) -> Result<Vec<SlotWithStudent>, AppError> {
    info!("Getting upcoming slots for coach");
    let query = format!(
        "SELECT {}, {}
         FROM slots s
         LEFT JOIN students p ON p.id = s.student_id
         WHERE s.coach_id = ? AND s.start_time > ?
         ORDER BY s.id",
        SLOT_COLUMNS, PERSON_JOIN_COLUMNS
    );

    let rows = sqlx::query_as::<_, DbSlotWithPerson>(&query)
        .bind(coach_id)
        .bind(now)
        .fetch_all(pool)
        .await?;

    if rows.is_empty() {
        return Err(AppError::NotFound(
            "No slots found for this coach".to_string(),
        ));
    }

    Ok(rows.into_iter().map(SlotWithStudent::from).collect())
}

#[instrument(skip(pool))]
pub async fn get_slots_for_student(
    pool: &Pool<Sqlite>,
    student_id: i64,
) -> Result<Vec<SlotWithCoach>, AppError> {
    info!("Getting slots for student");
    let query = format!(
        "SELECT {}, {}
         FROM slots s
         LEFT JOIN coaches p ON p.id = s.coach_id
         WHERE s.student_id = ?
         ORDER BY s.id",
        SLOT_COLUMNS, PERSON_JOIN_COLUMNS
    );

    let rows = sqlx::query_as::<_, DbSlotWithPerson>(&query)
        .bind(student_id)
        .fetch_all(pool)
        .await?;

    if rows.is_empty() {
        return Err(AppError::NotFound(
            "No slots found for this student".to_string(),
        ));
    }

    Ok(rows.into_iter().map(SlotWithCoach::from).collect())
}

#[instrument(skip(pool))]
pub async fn update_slot(
    pool: &Pool<Sqlite>,
    id: i64,
    coach_id: Option<i64>,
    start_time: Option<DateTime<Utc>>,
    student_id: Option<i64>,
    now: DateTime<Utc>,
) -> Result<Slot, AppError> {
    info!("Updating slot");
    let res = sqlx::query(
        "UPDATE slots
         SET coach_id = ?, start_time = ?, student_id = ?, updated_at = ?
         WHERE id = ?",
    )
    .bind(coach_id)
    .bind(start_time)
    .bind(student_id)
    .bind(now)
    .bind(id)
    .execute(pool)
    .await?;

    if res.rows_affected() == 0 {
        return Err(AppError::NotFound("Slot not found".to_string()));
    }

    get_slot(pool, id).await
}

#[instrument(skip(pool))]
pub async fn delete_slot(pool: &Pool<Sqlite>, id: i64) -> Result<(), AppError> {
    info!("Deleting slot");
    let res = sqlx::query("DELETE FROM slots WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;

    if res.rows_affected() == 0 {
        return Err(AppError::NotFound("Slot not found".to_string()));
    }

    Ok(())
}

/// One element of a bulk upsert. A key that matches a row updates it;
/// anything else inserts. The key may be sent as `id` or `slot_id`, and
/// `id` wins when both are present.
#[derive(Deserialize, Debug, Clone, Default)]
pub struct SlotUpsert {
    pub id: Option<i64>,
    pub slot_id: Option<i64>,
    pub coach_id: Option<i64>,
    pub start_time: Option<DateTime<Utc>>,
    pub student_id: Option<i64>,
}

impl SlotUpsert {
    pub fn key(&self) -> Option<i64> {
        self.id.or(self.slot_id)
    }
}

#[instrument(skip(pool))]
pub async fn upsert_slot(
    pool: &Pool<Sqlite>,
    slot: &SlotUpsert,
    now: DateTime<Utc>,
) -> Result<Slot, AppError> {
    info!("Upserting slot");
    let id = sqlx::query_scalar::<_, i64>(
        "INSERT INTO slots (id, coach_id, start_time, student_id, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?)
         ON CONFLICT (id) DO UPDATE SET
             coach_id = excluded.coach_id,
             start_time = excluded.start_time,
             student_id = excluded.student_id,
             updated_at = excluded.updated_at
         RETURNING id",
    )
    .bind(slot.key())
    .bind(slot.coach_id)
    .bind(slot.start_time)
    .bind(slot.student_id)
    .bind(now)
    .bind(now)
    .fetch_one(pool)
    .await?;

    get_slot(pool, id).await
}

/// Upserts in order, one statement per element. Stops at the first failure;
/// elements already written stay written.
#[instrument(skip(pool, slots), fields(count = slots.len()))]
pub async fn upsert_slots(
    pool: &Pool<Sqlite>,
    slots: &[SlotUpsert],
    now: DateTime<Utc>,
) -> Result<Vec<Slot>, AppError> {
    info!("Bulk upserting slots");
    let mut written = Vec::with_capacity(slots.len());
    for slot in slots {
        written.push(upsert_slot(pool, slot, now).await?);
    }

    Ok(written)
}

#[instrument(skip(pool))]
pub async fn get_past_slots_without_calls(
    pool: &Pool<Sqlite>,
    coach_id: i64,
    now: DateTime<Utc>,
) -> Result<Vec<Slot>, AppError> {
    info!("Getting past slots without calls");
    let query = format!(
        "SELECT {}
         FROM slots s
         LEFT JOIN calls c ON c.slot_id = s.id
         WHERE s.coach_id = ? AND s.start_time < ? AND s.student_id IS NOT NULL
         GROUP BY s.id
         HAVING COUNT(c.id) = 0
         ORDER BY s.id",
        SLOT_COLUMNS
    );

    let rows = sqlx::query_as::<_, DbSlot>(&query)
        .bind(coach_id)
        .bind(now)
        .fetch_all(pool)
        .await?;

    if rows.is_empty() {
        return Err(AppError::NotFound(
            "No past slots found for this coach without corresponding calls".to_string(),
        ));
    }

    Ok(rows.into_iter().map(Slot::from).collect())
}

// Calls

#[instrument(skip(pool, notes))]
pub async fn create_call(
    pool: &Pool<Sqlite>,
    slot_id: Option<i64>,
    satisfaction_score: Option<i64>,
    notes: Option<&str>,
    now: DateTime<Utc>,
) -> Result<Call, AppError> {
    info!("Creating call");
    let res = sqlx::query(
        "INSERT INTO calls (slot_id, satisfaction_score, notes, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?)",
    )
    .bind(slot_id)
    .bind(satisfaction_score)
    .bind(notes)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await?;

    get_call(pool, res.last_insert_rowid()).await
}

#[instrument(skip(pool))]
pub async fn get_call(pool: &Pool<Sqlite>, id: i64) -> Result<Call, AppError> {
    info!("Fetching call by ID");
    let row = sqlx::query_as::<_, DbCall>(
        "SELECT id, slot_id, satisfaction_score, notes, created_at, updated_at
         FROM calls WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    match row {
        Some(call) => Ok(Call::from(call)),
        _ => Err(AppError::NotFound("Call not found".to_string())),
    }
}

#[instrument(skip(pool))]
pub async fn get_calls_for_coach(
    pool: &Pool<Sqlite>,
    coach_id: i64,
) -> Result<Vec<CallWithSlot>, AppError> {
    info!("Getting calls for coach");
    let rows = sqlx::query_as::<_, DbCallWithSlot>(
        "SELECT c.id, c.slot_id, c.satisfaction_score, c.notes, c.created_at, c.updated_at,
                s.coach_id AS slot_coach_id, s.start_time AS slot_start_time,
                s.student_id AS slot_student_id, s.created_at AS slot_created_at,
                s.updated_at AS slot_updated_at
         FROM calls c
         INNER JOIN slots s ON s.id = c.slot_id
         WHERE s.coach_id = ?
         ORDER BY c.id",
    )
    .bind(coach_id)
    .fetch_all(pool)
    .await?;

    if rows.is_empty() {
        return Err(AppError::NotFound(
            "No calls found for this coach".to_string(),
        ));
    }

    Ok(rows.into_iter().map(CallWithSlot::from).collect())
}

#[instrument(skip(pool, notes))]
pub async fn update_call(
    pool: &Pool<Sqlite>,
    id: i64,
    slot_id: Option<i64>,
    satisfaction_score: Option<i64>,
    notes: Option<&str>,
    now: DateTime<Utc>,
) -> Result<Call, AppError> {
    info!("Updating call");
    let res = sqlx::query(
        "UPDATE calls
         SET slot_id = ?, satisfaction_score = ?, notes = ?, updated_at = ?
         WHERE id = ?",
    )
    .bind(slot_id)
    .bind(satisfaction_score)
    .bind(notes)
    .bind(now)
    .bind(id)
    .execute(pool)
    .await?;

    if res.rows_affected() == 0 {
        return Err(AppError::NotFound("Call not found".to_string()));
    }

    get_call(pool, id).await
}

#[instrument(skip(pool))]
pub async fn delete_call(pool: &Pool<Sqlite>, id: i64) -> Result<(), AppError> {
    info!("Deleting call");
    let res = sqlx::query("DELETE FROM calls WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;

    if res.rows_affected() == 0 {
        return Err(AppError::NotFound("Call not found".to_string()));
    }

    Ok(())
}
