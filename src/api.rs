use rocket::http::Status;
use rocket::response::status::Custom;
use rocket::serde::json::Json;
use rocket::{Request, Route, State};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use sqlx::{Pool, Sqlite};
use validator::Validate;

use crate::clock::SharedClock;
use crate::db::{
    SlotUpsert, create_call, create_person, create_slot, delete_call, delete_person, delete_slot,
    get_all_people, get_calls_for_coach, get_past_slots_without_calls, get_person,
    get_slots_for_student, get_upcoming_slots, get_upcoming_slots_for_coach, update_call,
    update_person, update_slot, upsert_slots,
};
use crate::error::AppError;
use crate::models::{
    Call, CallWithSlot, Person, PersonKind, Slot, SlotWithCoach, SlotWithStudent,
};
use crate::validation::{JsonBody, JsonValidateExt};

type Db = State<Pool<Sqlite>>;

// Missing fields are passed through as NULL and rejected by the schema.
#[derive(Deserialize, Debug, Default)]
pub struct PersonRequest {
    name: Option<String>,
    phone_number: Option<String>,
    password: Option<String>,
}

#[derive(Deserialize, Debug, Default)]
pub struct SlotRequest {
    coach_id: Option<i64>,
    start_time: Option<chrono::DateTime<chrono::Utc>>,
    student_id: Option<i64>,
}

#[derive(Deserialize, Validate, Debug, Default)]
pub struct CallRequest {
    slot_id: Option<i64>,
    #[validate(range(min = 1, max = 5))]
    satisfaction_score: Option<i64>,
    notes: Option<String>,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct BulkUpsertResponse {
    pub message: String,
    pub data: Vec<Slot>,
}

async fn create_person_response(
    db: &Db,
    clock: &State<SharedClock>,
    kind: PersonKind,
    request: PersonRequest,
) -> Result<Custom<Json<Person>>, AppError> {
    let person = create_person(
        db,
        kind,
        request.name.as_deref(),
        request.phone_number.as_deref(),
        request.password.as_deref(),
        clock.now(),
    )
    .await?;

    Ok(Custom(Status::Created, Json(person)))
}

async fn update_person_response(
    db: &Db,
    clock: &State<SharedClock>,
    kind: PersonKind,
    id: i64,
    request: PersonRequest,
) -> Result<Json<Person>, AppError> {
    let person = update_person(
        db,
        kind,
        id,
        request.name.as_deref(),
        request.phone_number.as_deref(),
        request.password.as_deref(),
        clock.now(),
    )
    .await?;

    Ok(Json(person))
}

// Coaches

#[post("/", data = "<coach>")]
pub async fn api_create_coach(
    coach: Result<JsonBody<PersonRequest>, AppError>,
    db: &Db,
    clock: &State<SharedClock>,
) -> Result<Custom<Json<Person>>, AppError> {
    create_person_response(db, clock, PersonKind::Coach, coach?.into_inner()).await
}

#[get("/")]
pub async fn api_get_coaches(db: &Db) -> Result<Json<Vec<Person>>, AppError> {
    Ok(Json(get_all_people(db, PersonKind::Coach).await?))
}

#[get("/<id>")]
pub async fn api_get_coach(id: i64, db: &Db) -> Result<Json<Person>, AppError> {
    Ok(Json(get_person(db, PersonKind::Coach, id).await?))
}

#[put("/<id>", data = "<coach>")]
pub async fn api_update_coach(
    id: i64,
    coach: Result<JsonBody<PersonRequest>, AppError>,
    db: &Db,
    clock: &State<SharedClock>,
) -> Result<Json<Person>, AppError> {
    update_person_response(db, clock, PersonKind::Coach, id, coach?.into_inner()).await
}

#[delete("/<id>")]
pub async fn api_delete_coach(id: i64, db: &Db) -> Result<Status, AppError> {
    delete_person(db, PersonKind::Coach, id).await?;
    Ok(Status::NoContent)
}

// Students

#[post("/", data = "<student>")]
pub async fn api_create_student(
    student: Result<JsonBody<PersonRequest>, AppError>,
    db: &Db,
    clock: &State<SharedClock>,
) -> Result<Custom<Json<Person>>, AppError> {
    create_person_response(db, clock, PersonKind::Student, student?.into_inner()).await
}

#[get("/")]
pub async fn api_get_students(db: &Db) -> Result<Json<Vec<Person>>, AppError> {
    Ok(Json(get_all_people(db, PersonKind::Student).await?))
}

#[get("/<id>")]
pub async fn api_get_student(id: i64, db: &Db) -> Result<Json<Person>, AppError> {
    Ok(Json(get_person(db, PersonKind::Student, id).await?))
}

#[put("/<id>", data = "<student>")]
pub async fn api_update_student(
    id: i64,
    student: Result<JsonBody<PersonRequest>, AppError>,
    db: &Db,
    clock: &State<SharedClock>,
) -> Result<Json<Person>, AppError> {
    update_person_response(db, clock, PersonKind::Student, id, student?.into_inner()).await
}

#[delete("/<id>")]
pub async fn api_delete_student(id: i64, db: &Db) -> Result<Status, AppError> {
    delete_person(db, PersonKind::Student, id).await?;
    Ok(Status::NoContent)
}

// Slots

#[post("/", data = "<slot>")]
pub async fn api_create_slot(
    slot: Result<JsonBody<SlotRequest>, AppError>,
    db: &Db,
    clock: &State<SharedClock>,
) -> Result<Custom<Json<Slot>>, AppError> {
    let slot = slot?.into_inner();
    let slot = create_slot(db, slot.coach_id, slot.start_time, slot.student_id, clock.now()).await?;
    Ok(Custom(Status::Created, Json(slot)))
}

#[get("/")]
pub async fn api_get_upcoming_slots(
    db: &Db,
    clock: &State<SharedClock>,
) -> Result<Json<Vec<Slot>>, AppError> {
    Ok(Json(get_upcoming_slots(db, clock.now()).await?))
}

#[get("/student/<student_id>")]
pub async fn api_get_student_slots(
    student_id: i64,
    db: &Db,
) -> Result<Json<Vec<SlotWithCoach>>, AppError> {
    Ok(Json(get_slots_for_student(db, student_id).await?))
}

#[get("/coach/<coach_id>")]
pub async fn api_get_coach_slots(
    coach_id: i64,
    db: &Db,
    clock: &State<SharedClock>,
) -> Result<Json<Vec<SlotWithStudent>>, AppError> {
    Ok(Json(
        get_upcoming_slots_for_coach(db, coach_id, clock.now()).await?,
    ))
}

#[put("/<id>", data = "<slot>")]
pub async fn api_update_slot(
    id: i64,
    slot: Result<JsonBody<SlotRequest>, AppError>,
    db: &Db,
    clock: &State<SharedClock>,
) -> Result<Json<Slot>, AppError> {
    let slot = slot?.into_inner();
    let slot = update_slot(
        db,
        id,
        slot.coach_id,
        slot.start_time,
        slot.student_id,
        clock.now(),
    )
    .await?;

    Ok(Json(slot))
}

#[delete("/<id>")]
pub async fn api_delete_slot(id: i64, db: &Db) -> Result<Status, AppError> {
    delete_slot(db, id).await?;
    Ok(Status::NoContent)
}

#[post("/bulk", data = "<slots>")]
pub async fn api_bulk_upsert_slots(
    slots: Result<JsonBody<Vec<SlotUpsert>>, AppError>,
    db: &Db,
    clock: &State<SharedClock>,
) -> Result<Json<BulkUpsertResponse>, AppError> {
    let slots = slots?.into_inner();
    let data = upsert_slots(db, &slots, clock.now()).await?;

    Ok(Json(BulkUpsertResponse {
        message: "Slots created or updated successfully".to_string(),
        data,
    }))
}

#[get("/past-without-calls/<coach_id>")]
pub async fn api_get_past_slots_without_calls(
    coach_id: i64,
    db: &Db,
    clock: &State<SharedClock>,
) -> Result<Json<Vec<Slot>>, AppError> {
    Ok(Json(
        get_past_slots_without_calls(db, coach_id, clock.now()).await?,
    ))
}

// Calls

#[post("/", data = "<call>")]
pub async fn api_create_call(
    call: Result<JsonBody<CallRequest>, AppError>,
    db: &Db,
    clock: &State<SharedClock>,
) -> Result<Custom<Json<Call>>, AppError> {
    let call = call?.validate_custom()?;

    let call = create_call(
        db,
        call.slot_id,
        call.satisfaction_score,
        call.notes.as_deref(),
        clock.now(),
    )
    .await?;

    Ok(Custom(Status::Created, Json(call)))
}

#[get("/coach/<coach_id>")]
pub async fn api_get_coach_calls(
    coach_id: i64,
    db: &Db,
) -> Result<Json<Vec<CallWithSlot>>, AppError> {
    Ok(Json(get_calls_for_coach(db, coach_id).await?))
}

#[put("/<id>", data = "<call>")]
pub async fn api_update_call(
    id: i64,
    call: Result<JsonBody<CallRequest>, AppError>,
    db: &Db,
    clock: &State<SharedClock>,
) -> Result<Json<Call>, AppError> {
    let call = call?.validate_custom()?;

    let call = update_call(
        db,
        id,
        call.slot_id,
        call.satisfaction_score,
        call.notes.as_deref(),
        clock.now(),
    )
    .await?;

    Ok(Json(call))
}

#[delete("/<id>")]
pub async fn api_delete_call(id: i64, db: &Db) -> Result<Status, AppError> {
    delete_call(db, id).await?;
    Ok(Status::NoContent)
}

#[get("/health")]
pub fn health() -> &'static str {
    "OK"
}

// Route tables, mounted under /api/<resource>

pub fn coach_routes() -> Vec<Route> {
    routes![
        api_create_coach,
        api_get_coaches,
        api_get_coach,
        api_update_coach,
        api_delete_coach,
    ]
}

pub fn student_routes() -> Vec<Route> {
    routes![
        api_create_student,
        api_get_students,
        api_get_student,
        api_update_student,
        api_delete_student,
    ]
}

pub fn slot_routes() -> Vec<Route> {
    routes![
        api_create_slot,
        api_get_upcoming_slots,
        api_get_student_slots,
        api_get_coach_slots,
        api_update_slot,
        api_delete_slot,
        api_bulk_upsert_slots,
        api_get_past_slots_without_calls,
    ]
}

pub fn call_routes() -> Vec<Route> {
    routes![
        api_create_call,
        api_get_coach_calls,
        api_update_call,
        api_delete_call,
    ]
}

// Framework-level failures still answer in JSON, using the same two shapes
// as handler errors.

#[catch(400)]
pub fn bad_request_api(req: &Request) -> Custom<Json<Value>> {
    Custom(
        Status::InternalServerError,
        Json(json!({ "error": format!("Malformed request to {} {}", req.method(), req.uri()) })),
    )
}

#[catch(404)]
pub fn not_found_api(req: &Request) -> Custom<Json<Value>> {
    Custom(
        Status::NotFound,
        Json(json!({ "message": format!("No route for {} {}", req.method(), req.uri()) })),
    )
}

// Only path parameters reach this: bodies are parsed by `JsonBody`. An id
// that is not a number names no record.
#[catch(422)]
pub fn unprocessable_api(req: &Request) -> Custom<Json<Value>> {
    Custom(
        Status::NotFound,
        Json(json!({ "message": format!("No record for {}", req.uri()) })),
    )
}

#[catch(500)]
pub fn internal_error_api() -> Custom<Json<Value>> {
    Custom(
        Status::InternalServerError,
        Json(json!({ "error": "Internal server error" })),
    )
}
