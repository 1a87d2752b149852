use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersonKind {
    Coach,
    Student,
}

impl PersonKind {
    pub fn table(&self) -> &'static str {
        match self {
            PersonKind::Coach => "coaches",
            PersonKind::Student => "students",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PersonKind::Coach => "Coach",
            PersonKind::Student => "Student",
        }
    }
}

impl fmt::Display for PersonKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Coaches and students share the same columns; the table decides which one
/// a row is.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Person {
    pub id: i64,
    pub name: String,
    pub phone_number: String,
    pub password: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub type Coach = Person;
pub type Student = Person;

#[derive(sqlx::FromRow, Clone)]
pub struct DbPerson {
    pub id: i64,
    pub name: String,
    pub phone_number: String,
    pub password: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<DbPerson> for Person {
    fn from(row: DbPerson) -> Self {
        Self {
            id: row.id,
            name: row.name,
            phone_number: row.phone_number,
            password: row.password,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Slot {
    pub id: i64,
    pub coach_id: i64,
    pub start_time: DateTime<Utc>,
    pub student_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow, Clone)]
pub struct DbSlot {
    pub id: i64,
    pub coach_id: i64,
    pub start_time: DateTime<Utc>,
    pub student_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<DbSlot> for Slot {
    fn from(row: DbSlot) -> Self {
        Self {
            id: row.id,
            coach_id: row.coach_id,
            start_time: row.start_time,
            student_id: row.student_id,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SlotWithStudent {
    #[serde(flatten)]
    pub slot: Slot,
    pub student: Option<Student>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SlotWithCoach {
    #[serde(flatten)]
    pub slot: Slot,
    pub coach: Option<Coach>,
}

/// A slot row LEFT JOINed with the person on the other side of it. The
/// joined columns are all NULL when there is no match.
#[derive(sqlx::FromRow, Clone)]
pub struct DbSlotWithPerson {
    pub id: i64,
    pub coach_id: i64,
    pub start_time: DateTime<Utc>,
    pub student_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub person_id: Option<i64>,
    pub person_name: Option<String>,
    pub person_phone_number: Option<String>,
    pub person_password: Option<String>,
    pub person_created_at: Option<DateTime<Utc>>,
    pub person_updated_at: Option<DateTime<Utc>>,
}

impl DbSlotWithPerson {
    fn split(self) -> (Slot, Option<Person>) {
        let person = match (
            self.person_id,
            self.person_name,
            self.person_phone_number,
            self.person_password,
            self.person_created_at,
            self.person_updated_at,
        ) {
            (
                Some(id),
                Some(name),
                Some(phone_number),
                Some(password),
                Some(created_at),
                Some(updated_at),
            ) => Some(Person {
                id,
                name,
                phone_number,
                password,
                created_at,
                updated_at,
            }),
            _ => None,
        };

        let slot = Slot {
            id: self.id,
            coach_id: self.coach_id,
            start_time: self.start_time,
            student_id: self.student_id,
            created_at: self.created_at,
            updated_at: self.updated_at,
        };

        (slot, person)
    }
}

impl From<DbSlotWithPerson> for SlotWithStudent {
    fn from(row: DbSlotWithPerson) -> Self {
        let (slot, student) = row.split();
        Self { slot, student }
    }
}

impl From<DbSlotWithPerson> for SlotWithCoach {
    fn from(row: DbSlotWithPerson) -> Self {
        let (slot, coach) = row.split();
        Self { slot, coach }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Call {
    pub id: i64,
    pub slot_id: i64,
    pub satisfaction_score: Option<i64>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow, Clone)]
pub struct DbCall {
    pub id: i64,
    pub slot_id: i64,
    pub satisfaction_score: Option<i64>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<DbCall> for Call {
    fn from(row: DbCall) -> Self {
        Self {
            id: row.id,
            slot_id: row.slot_id,
            satisfaction_score: row.satisfaction_score,
            notes: row.notes,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct CallWithSlot {
    #[serde(flatten)]
    pub call: Call,
    pub slot: Slot,
}

/// Call INNER JOINed with its slot, so the slot columns are never NULL.
#[derive(sqlx::FromRow, Clone)]
pub struct DbCallWithSlot {
    pub id: i64,
    pub slot_id: i64,
    pub satisfaction_score: Option<i64>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub slot_coach_id: i64,
    pub slot_start_time: DateTime<Utc>,
    pub slot_student_id: Option<i64>,
    pub slot_created_at: DateTime<Utc>,
    pub slot_updated_at: DateTime<Utc>,
}

impl From<DbCallWithSlot> for CallWithSlot {
    fn from(row: DbCallWithSlot) -> Self {
        Self {
            slot: Slot {
                id: row.slot_id,
                coach_id: row.slot_coach_id,
                start_time: row.slot_start_time,
                student_id: row.slot_student_id,
                created_at: row.slot_created_at,
                updated_at: row.slot_updated_at,
            },
            call: Call {
                id: row.id,
                slot_id: row.slot_id,
                satisfaction_score: row.satisfaction_score,
                notes: row.notes,
                created_at: row.created_at,
                updated_at: row.updated_at,
            },
        }
    }
}
