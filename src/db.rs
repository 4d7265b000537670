use anyhow::Context;
use chrono::{Datelike, Duration, NaiveDate, Utc};
use serde::de::DeserializeOwned;
use sqlx::postgres::PgRow;
use sqlx::{Executor, PgConnection, PgPool, Postgres, QueryBuilder, Row};
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::{
    Assessment, AttendanceRow, ClassRoom, MarkRow, NewAssessment, NewAttendance, NewMark,
    NewUser, Notification, Role, SchoolCounts, Subject, Submission, SubmissionGrade,
    SubmissionStatus, User,
};

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

fn user_from_row(row: &PgRow) -> Result<User, AppError> {
    Ok(User {
        id: row.get("id"),
        username: row.get("username"),
        full_name: row.get("full_name"),
        email: row.get("email"),
        role: row.get::<String, _>("role").parse()?,
    })
}

fn subject_from_row(row: &PgRow) -> Subject {
    Subject {
        id: row.get("id"),
        name: row.get("name"),
        code: row.get("code"),
        max_marks: row.get("max_marks"),
    }
}

fn classroom_from_row(row: &PgRow) -> ClassRoom {
    ClassRoom {
        id: row.get("id"),
        name: row.get("name"),
        section: row.get("section"),
        academic_year: row.get("academic_year"),
    }
}

fn mark_from_row(row: &PgRow) -> MarkRow {
    MarkRow {
        id: row.get("id"),
        student_id: row.get("student_id"),
        student_name: row.get("student_name"),
        subject_name: row.get("subject_name"),
        subject_code: row.get("subject_code"),
        exam_type: row.get("exam_type"),
        marks_obtained: row.get("marks_obtained"),
        max_marks: row.get("max_marks"),
        date: row.get("date"),
        remarks: row.get("remarks"),
    }
}

fn attendance_from_row(row: &PgRow) -> Result<AttendanceRow, AppError> {
    Ok(AttendanceRow {
        id: row.get("id"),
        student_id: row.get("student_id"),
        student_name: row.get("student_name"),
        subject_name: row.get("subject_name"),
        date: row.get("date"),
        status: row.get::<String, _>("status").parse()?,
        note: row.get("note"),
    })
}

fn assessment_from_row(row: &PgRow) -> Result<Assessment, AppError> {
    Ok(Assessment {
        id: row.get("id"),
        title: row.get("title"),
        assessment_type: row.get::<String, _>("assessment_type").parse()?,
        subject_name: row.get("subject_name"),
        classroom: row.get("classroom"),
        max_score: row.get("max_score"),
        due_date: row.get("due_date"),
        description: row.get("description"),
        submission_count: row.get("submission_count"),
    })
}

fn submission_from_row(row: &PgRow) -> Result<Submission, AppError> {
    Ok(Submission {
        id: row.get("id"),
        assessment_title: row.get("assessment_title"),
        subject_name: row.get("subject_name"),
        student_name: row.get("student_name"),
        max_score: row.get("max_score"),
        score: row.get("score"),
        status: row.get::<String, _>("status").parse()?,
        feedback: row.get("feedback"),
        submitted_at: row.get("submitted_at"),
        graded_at: row.get("graded_at"),
    })
}

const USER_COLUMNS: &str = "id, username, full_name, email, role";

pub async fn find_user<'e, E>(executor: E, username: &str) -> Result<User, AppError>
where
    E: Executor<'e, Database = Postgres>,
{
    let row = sqlx::query(&format!(
        "SELECT {USER_COLUMNS} FROM student_analytics.users WHERE username = $1"
    ))
    .bind(username)
    .fetch_optional(executor)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("user '{username}'")))?;
    user_from_row(&row)
}

pub async fn find_user_by_id(pool: &PgPool, id: Uuid) -> Result<User, AppError> {
    let row = sqlx::query(&format!(
        "SELECT {USER_COLUMNS} FROM student_analytics.users WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("user {id}")))?;
    user_from_row(&row)
}

/// Students ordered by name, optionally restricted to one classroom.
pub async fn fetch_students(
    pool: &PgPool,
    classroom_id: Option<Uuid>,
) -> Result<Vec<User>, AppError> {
    let mut query = QueryBuilder::<Postgres>::new(
        "SELECT u.id, u.username, u.full_name, u.email, u.role \
         FROM student_analytics.users u WHERE u.role = 'student'",
    );
    if let Some(id) = classroom_id {
        query
            .push(
                " AND u.id IN (SELECT student_id FROM student_analytics.classroom_students \
                 WHERE classroom_id = ",
            )
            .push_bind(id)
            .push(")");
    }
    query.push(" ORDER BY u.full_name");

    let rows = query.build().fetch_all(pool).await?;
    rows.iter().map(user_from_row).collect()
}

pub async fn school_counts(pool: &PgPool) -> Result<SchoolCounts, AppError> {
    let row = sqlx::query(
        r#"
        SELECT
            (SELECT COUNT(*) FROM student_analytics.users WHERE role = 'student') AS students,
            (SELECT COUNT(*) FROM student_analytics.users WHERE role = 'teacher') AS teachers,
            (SELECT COUNT(*) FROM student_analytics.subjects) AS subjects,
            (SELECT COUNT(*) FROM student_analytics.classrooms) AS classes
        "#,
    )
    .fetch_one(pool)
    .await?;

    Ok(SchoolCounts {
        total_students: row.get("students"),
        total_teachers: row.get("teachers"),
        total_subjects: row.get("subjects"),
        total_classes: row.get("classes"),
    })
}

pub async fn fetch_subjects(pool: &PgPool) -> Result<Vec<Subject>, AppError> {
    let rows = sqlx::query(
        "SELECT id, name, code, max_marks FROM student_analytics.subjects ORDER BY code",
    )
    .fetch_all(pool)
    .await?;
    Ok(rows.iter().map(subject_from_row).collect())
}

pub async fn fetch_teacher_subjects(pool: &PgPool, teacher_id: Uuid) -> Result<Vec<Subject>, AppError> {
    let rows = sqlx::query(
        r#"
        SELECT s.id, s.name, s.code, s.max_marks
        FROM student_analytics.subjects s
        JOIN student_analytics.subject_teachers st ON st.subject_id = s.id
        WHERE st.teacher_id = $1
        ORDER BY s.code
        "#,
    )
    .bind(teacher_id)
    .fetch_all(pool)
    .await?;
    Ok(rows.iter().map(subject_from_row).collect())
}

pub async fn find_subject<'e, E>(executor: E, code: &str) -> Result<Subject, AppError>
where
    E: Executor<'e, Database = Postgres>,
{
    let row = sqlx::query(
        "SELECT id, name, code, max_marks FROM student_analytics.subjects WHERE code = $1",
    )
    .bind(code)
    .fetch_optional(executor)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("subject '{code}'")))?;
    Ok(subject_from_row(&row))
}

pub async fn fetch_classrooms(pool: &PgPool) -> Result<Vec<ClassRoom>, AppError> {
    let rows = sqlx::query(
        "SELECT id, name, section, academic_year FROM student_analytics.classrooms \
         ORDER BY academic_year, name, section",
    )
    .fetch_all(pool)
    .await?;
    Ok(rows.iter().map(classroom_from_row).collect())
}

pub async fn find_classroom(pool: &PgPool, id: Uuid) -> Result<ClassRoom, AppError> {
    let row = sqlx::query(
        "SELECT id, name, section, academic_year FROM student_analytics.classrooms WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("classroom {id}")))?;
    Ok(classroom_from_row(&row))
}

/// Classes a teacher leads or teaches one of the subjects of.
pub async fn fetch_teacher_classes(pool: &PgPool, teacher_id: Uuid) -> Result<Vec<ClassRoom>, AppError> {
    let rows = sqlx::query(
        r#"
        SELECT DISTINCT c.id, c.name, c.section, c.academic_year
        FROM student_analytics.classrooms c
        LEFT JOIN student_analytics.classroom_subjects cs ON cs.classroom_id = c.id
        WHERE c.class_teacher_id = $1
           OR cs.subject_id IN (
               SELECT subject_id FROM student_analytics.subject_teachers WHERE teacher_id = $1
           )
        ORDER BY c.academic_year, c.name, c.section
        "#,
    )
    .bind(teacher_id)
    .fetch_all(pool)
    .await?;
    Ok(rows.iter().map(classroom_from_row).collect())
}

pub async fn count_students_in_classes(pool: &PgPool, class_ids: &[Uuid]) -> Result<i64, AppError> {
    let count: i64 = sqlx::query(
        "SELECT COUNT(DISTINCT student_id) AS students \
         FROM student_analytics.classroom_students WHERE classroom_id = ANY($1)",
    )
    .bind(class_ids)
    .fetch_one(pool)
    .await?
    .get("students");
    Ok(count)
}

const MARK_SELECT: &str = "SELECT m.id, m.student_id, u.full_name AS student_name, \
     s.name AS subject_name, s.code AS subject_code, e.name AS exam_type, \
     m.marks_obtained::float8 AS marks_obtained, s.max_marks::float8 AS max_marks, \
     m.date, m.remarks \
     FROM student_analytics.marks m \
     JOIN student_analytics.users u ON u.id = m.student_id \
     JOIN student_analytics.subjects s ON s.id = m.subject_id \
     JOIN student_analytics.exam_types e ON e.id = m.exam_type_id \
     WHERE TRUE";

#[derive(Debug, Clone, Default)]
pub struct MarkFilter {
    pub student_id: Option<Uuid>,
    pub student_ids: Option<Vec<Uuid>>,
    pub subject_id: Option<Uuid>,
    pub subject_ids: Option<Vec<Uuid>>,
    pub recorded_by: Option<Uuid>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkOrder {
    NewestFirst,
    OldestFirst,
    RecentlyRecorded,
}

impl MarkOrder {
    fn clause(self) -> &'static str {
        match self {
            MarkOrder::NewestFirst => " ORDER BY m.date DESC, m.created_at DESC",
            MarkOrder::OldestFirst => " ORDER BY m.date ASC, m.created_at ASC",
            MarkOrder::RecentlyRecorded => " ORDER BY m.created_at DESC",
        }
    }
}

#[instrument(skip(pool))]
pub async fn fetch_marks(
    pool: &PgPool,
    filter: &MarkFilter,
    order: MarkOrder,
    limit: Option<i64>,
) -> Result<Vec<MarkRow>, AppError> {
    let mut query = QueryBuilder::<Postgres>::new(MARK_SELECT);
    if let Some(id) = filter.student_id {
        query.push(" AND m.student_id = ").push_bind(id);
    }
    if let Some(ids) = &filter.student_ids {
        query.push(" AND m.student_id = ANY(").push_bind(ids.clone()).push(")");
    }
    if let Some(id) = filter.subject_id {
        query.push(" AND m.subject_id = ").push_bind(id);
    }
    if let Some(ids) = &filter.subject_ids {
        query.push(" AND m.subject_id = ANY(").push_bind(ids.clone()).push(")");
    }
    if let Some(id) = filter.recorded_by {
        query.push(" AND m.recorded_by = ").push_bind(id);
    }
    query.push(order.clause());
    if let Some(limit) = limit {
        query.push(" LIMIT ").push_bind(limit);
    }

    let rows = query.build().fetch_all(pool).await?;
    debug!(rows = rows.len(), "fetched marks");
    Ok(rows.iter().map(mark_from_row).collect())
}

#[derive(Debug, Clone, Default)]
pub struct AttendanceFilter {
    pub student_id: Option<Uuid>,
    pub student_ids: Option<Vec<Uuid>>,
    pub since: Option<NaiveDate>,
}

fn attendance_query(filter: &AttendanceFilter, limit: Option<i64>) -> QueryBuilder<'static, Postgres> {
    let mut query = QueryBuilder::<Postgres>::new(
        "SELECT a.id, a.student_id, u.full_name AS student_name, s.name AS subject_name, \
         a.date, a.status, a.note \
         FROM student_analytics.attendance a \
         JOIN student_analytics.users u ON u.id = a.student_id \
         JOIN student_analytics.subjects s ON s.id = a.subject_id \
         WHERE TRUE",
    );
    if let Some(id) = filter.student_id {
        query.push(" AND a.student_id = ").push_bind(id);
    }
    if let Some(ids) = &filter.student_ids {
        query.push(" AND a.student_id = ANY(").push_bind(ids.clone()).push(")");
    }
    if let Some(since) = filter.since {
        query.push(" AND a.date >= ").push_bind(since);
    }
    query.push(" ORDER BY a.date DESC, s.code");
    if let Some(limit) = limit {
        query.push(" LIMIT ").push_bind(limit);
    }
    query
}

#[instrument(skip(pool))]
pub async fn fetch_attendance(
    pool: &PgPool,
    filter: &AttendanceFilter,
    limit: Option<i64>,
) -> Result<Vec<AttendanceRow>, AppError> {
    let mut query = attendance_query(filter, limit);
    let rows = query.build().fetch_all(pool).await?;
    debug!(rows = rows.len(), "fetched attendance");
    rows.iter().map(attendance_from_row).collect()
}

#[derive(Debug, Clone, Copy)]
pub enum AssessmentScope {
    All,
    CreatedBy(Uuid),
    ForStudent(Uuid),
}

impl AssessmentScope {
    pub fn for_user(user: &User) -> Self {
        match user.role {
            Role::Admin => AssessmentScope::All,
            Role::Teacher => AssessmentScope::CreatedBy(user.id),
            Role::Student => AssessmentScope::ForStudent(user.id),
        }
    }
}

const ASSESSMENT_SELECT: &str = "SELECT a.id, a.title, a.assessment_type, s.name AS subject_name, \
     c.name || '-' || c.section || ' (' || c.academic_year || ')' AS classroom, \
     a.max_score, a.due_date, a.description, \
     (SELECT COUNT(*) FROM student_analytics.assessment_submissions x \
      WHERE x.assessment_id = a.id) AS submission_count \
     FROM student_analytics.assessments a \
     JOIN student_analytics.subjects s ON s.id = a.subject_id \
     JOIN student_analytics.classrooms c ON c.id = a.classroom_id \
     WHERE TRUE";

pub async fn fetch_assessments(
    pool: &PgPool,
    scope: AssessmentScope,
    limit: Option<i64>,
) -> Result<Vec<Assessment>, AppError> {
    let mut query = QueryBuilder::<Postgres>::new(ASSESSMENT_SELECT);
    match scope {
        AssessmentScope::All => {}
        AssessmentScope::CreatedBy(id) => {
            query.push(" AND a.created_by = ").push_bind(id);
        }
        AssessmentScope::ForStudent(id) => {
            query
                .push(
                    " AND a.classroom_id IN (SELECT classroom_id \
                     FROM student_analytics.classroom_students WHERE student_id = ",
                )
                .push_bind(id)
                .push(")");
        }
    }
    query.push(" ORDER BY a.due_date DESC");
    if let Some(limit) = limit {
        query.push(" LIMIT ").push_bind(limit);
    }

    let rows = query.build().fetch_all(pool).await?;
    rows.iter().map(assessment_from_row).collect()
}

pub async fn find_assessment(pool: &PgPool, id: Uuid) -> Result<Assessment, AppError> {
    let row = sqlx::query(&format!("{ASSESSMENT_SELECT} AND a.id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("assessment {id}")))?;
    assessment_from_row(&row)
}

#[derive(Debug, Clone, Default)]
pub struct SubmissionFilter {
    pub assessment_id: Option<Uuid>,
    pub student_id: Option<Uuid>,
    pub statuses: Option<Vec<SubmissionStatus>>,
}

pub async fn fetch_submissions(
    pool: &PgPool,
    filter: &SubmissionFilter,
    limit: Option<i64>,
) -> Result<Vec<Submission>, AppError> {
    let mut query = QueryBuilder::<Postgres>::new(
        "SELECT x.id, a.title AS assessment_title, s.name AS subject_name, \
         u.full_name AS student_name, a.max_score, x.score::float8 AS score, x.status, \
         x.feedback, x.submitted_at, x.graded_at \
         FROM student_analytics.assessment_submissions x \
         JOIN student_analytics.assessments a ON a.id = x.assessment_id \
         JOIN student_analytics.subjects s ON s.id = a.subject_id \
         JOIN student_analytics.users u ON u.id = x.student_id \
         WHERE TRUE",
    );
    if let Some(id) = filter.assessment_id {
        query.push(" AND x.assessment_id = ").push_bind(id);
    }
    if let Some(id) = filter.student_id {
        query.push(" AND x.student_id = ").push_bind(id);
    }
    if let Some(statuses) = &filter.statuses {
        let statuses: Vec<String> = statuses.iter().map(|s| s.as_str().to_string()).collect();
        query.push(" AND x.status = ANY(").push_bind(statuses).push(")");
    }
    query.push(" ORDER BY a.due_date DESC, u.full_name");
    if let Some(limit) = limit {
        query.push(" LIMIT ").push_bind(limit);
    }

    let rows = query.build().fetch_all(pool).await?;
    rows.iter().map(submission_from_row).collect()
}

fn require_recorder(actor: &User) -> Result<(), AppError> {
    if actor.role.can_record() {
        Ok(())
    } else {
        Err(AppError::Forbidden(format!(
            "{} ({}) cannot record marks, attendance or assessments",
            actor.username, actor.role
        )))
    }
}

fn require_admin(actor: &User) -> Result<(), AppError> {
    if actor.role == Role::Admin {
        Ok(())
    } else {
        Err(AppError::Forbidden(format!("{} cannot register users", actor.username)))
    }
}

fn validate_new_user(user: &NewUser) -> Result<(), AppError> {
    if user.username.is_empty() || user.username.chars().any(char::is_whitespace) {
        return Err(AppError::Invalid(format!("bad username '{}'", user.username)));
    }
    if user.full_name.trim().is_empty() {
        return Err(AppError::Invalid("full name is required".to_string()));
    }
    if !user.email.contains('@') {
        return Err(AppError::Invalid(format!("bad email '{}'", user.email)));
    }
    match (user.role, user.roll_number.as_deref()) {
        (Role::Student, None) | (Role::Student, Some("")) => {
            Err(AppError::Invalid("students need a roll number".to_string()))
        }
        (Role::Student, Some(_)) => Ok(()),
        (_, Some(_)) => Err(AppError::Invalid("only students have roll numbers".to_string())),
        (_, None) if user.classroom_id.is_some() => {
            Err(AppError::Invalid("only students are enrolled in classrooms".to_string()))
        }
        (_, None) => Ok(()),
    }
}

/// Creates an account. Students also get a profile and, when a classroom is
/// given, an enrollment; all of it commits together.
#[instrument(skip(pool, actor, user), fields(actor = %actor.username, username = %user.username))]
pub async fn register_user(pool: &PgPool, actor: &User, user: &NewUser) -> Result<Uuid, AppError> {
    require_admin(actor)?;
    validate_new_user(user)?;

    let mut tx = pool.begin().await?;
    let id: Uuid = sqlx::query(
        r#"
        INSERT INTO student_analytics.users (id, username, full_name, email, role)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (username) DO NOTHING
        RETURNING id
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(&user.username)
    .bind(user.full_name.trim())
    .bind(&user.email)
    .bind(user.role.as_str())
    .fetch_optional(&mut *tx)
    .await?
    .ok_or_else(|| AppError::Invalid(format!("username '{}' is taken", user.username)))?
    .get("id");

    if let Some(roll_number) = &user.roll_number {
        let profile = sqlx::query(
            r#"
            INSERT INTO student_analytics.student_profiles (user_id, roll_number, admission_date)
            VALUES ($1, $2, CURRENT_DATE)
            ON CONFLICT (roll_number) DO NOTHING
            "#,
        )
        .bind(id)
        .bind(roll_number)
        .execute(&mut *tx)
        .await?;
        if profile.rows_affected() == 0 {
            return Err(AppError::Invalid(format!("roll number {roll_number} is taken")));
        }
    }

    if let Some(classroom_id) = user.classroom_id {
        let enrolled = sqlx::query(
            r#"
            INSERT INTO student_analytics.classroom_students (classroom_id, student_id)
            SELECT id, $2 FROM student_analytics.classrooms WHERE id = $1
            "#,
        )
        .bind(classroom_id)
        .bind(id)
        .execute(&mut *tx)
        .await?;
        if enrolled.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("classroom {classroom_id}")));
        }
    }

    tx.commit().await?;
    info!(%id, role = %user.role, "user registered");
    Ok(id)
}

async fn require_student(conn: &mut PgConnection, username: &str) -> Result<User, AppError> {
    let student = find_user(&mut *conn, username).await?;
    if student.role != Role::Student {
        return Err(AppError::Invalid(format!("{username} is not a student")));
    }
    Ok(student)
}

/// Teachers may only record against subjects they teach.
async fn require_subject_access(
    conn: &mut PgConnection,
    actor: &User,
    code: &str,
) -> Result<Subject, AppError> {
    let subject = find_subject(&mut *conn, code).await?;
    if actor.role == Role::Teacher {
        let teaches: bool = sqlx::query(
            "SELECT EXISTS (SELECT 1 FROM student_analytics.subject_teachers \
             WHERE subject_id = $1 AND teacher_id = $2) AS teaches",
        )
        .bind(subject.id)
        .bind(actor.id)
        .fetch_one(&mut *conn)
        .await?
        .get("teaches");
        if !teaches {
            return Err(AppError::Forbidden(format!(
                "{} does not teach {}",
                actor.username, subject.code
            )));
        }
    }
    Ok(subject)
}

async fn try_insert_mark(
    conn: &mut PgConnection,
    actor: &User,
    mark: &NewMark,
) -> Result<bool, AppError> {
    let student = require_student(conn, &mark.student).await?;
    let subject = require_subject_access(conn, actor, &mark.subject_code).await?;
    if mark.marks_obtained < 0.0 {
        return Err(AppError::Invalid("marks cannot be negative".to_string()));
    }
    if mark.marks_obtained > f64::from(subject.max_marks) {
        return Err(AppError::Invalid(format!(
            "Marks cannot exceed maximum marks ({}) for this subject.",
            subject.max_marks
        )));
    }

    let exam_type_id: Uuid = sqlx::query("SELECT id FROM student_analytics.exam_types WHERE name = $1")
        .bind(&mark.exam_type)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("exam type '{}'", mark.exam_type)))?
        .get("id");

    let result = sqlx::query(
        r#"
        INSERT INTO student_analytics.marks
        (id, student_id, subject_id, exam_type_id, marks_obtained, date, remarks, recorded_by)
        VALUES ($1, $2, $3, $4, $5::float8::numeric, $6, $7, $8)
        ON CONFLICT (student_id, subject_id, exam_type_id, date) DO NOTHING
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(student.id)
    .bind(subject.id)
    .bind(exam_type_id)
    .bind(mark.marks_obtained)
    .bind(mark.date)
    .bind(&mark.remarks)
    .bind(actor.id)
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected() > 0)
}

#[instrument(skip(pool, actor, mark), fields(actor = %actor.username, student = %mark.student))]
pub async fn insert_mark(pool: &PgPool, actor: &User, mark: &NewMark) -> Result<(), AppError> {
    require_recorder(actor)?;
    let mut conn = pool.acquire().await?;
    if !try_insert_mark(&mut conn, actor, mark).await? {
        return Err(AppError::Invalid(format!(
            "{} already has {} marks in {} on {}",
            mark.student, mark.exam_type, mark.subject_code, mark.date
        )));
    }
    info!("marks recorded");
    Ok(())
}

async fn try_insert_attendance(
    conn: &mut PgConnection,
    actor: &User,
    entry: &NewAttendance,
) -> Result<bool, AppError> {
    let student = require_student(conn, &entry.student).await?;
    let subject = require_subject_access(conn, actor, &entry.subject_code).await?;

    let result = sqlx::query(
        r#"
        INSERT INTO student_analytics.attendance
        (id, student_id, subject_id, date, status, marked_by, note)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        ON CONFLICT (student_id, subject_id, date) DO NOTHING
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(student.id)
    .bind(subject.id)
    .bind(entry.date)
    .bind(entry.status.as_str())
    .bind(actor.id)
    .bind(&entry.note)
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected() > 0)
}

#[instrument(skip(pool, actor, entry), fields(actor = %actor.username, student = %entry.student))]
pub async fn insert_attendance(
    pool: &PgPool,
    actor: &User,
    entry: &NewAttendance,
) -> Result<(), AppError> {
    require_recorder(actor)?;
    let mut conn = pool.acquire().await?;
    if !try_insert_attendance(&mut conn, actor, entry).await? {
        return Err(AppError::Invalid(format!(
            "attendance for {} in {} on {} is already recorded",
            entry.student, entry.subject_code, entry.date
        )));
    }
    info!(status = %entry.status, "attendance recorded");
    Ok(())
}

/// Parses every row up front so a malformed file writes nothing.
fn read_rows<T, R>(mut reader: csv::Reader<R>, kind: &str) -> anyhow::Result<Vec<T>>
where
    T: DeserializeOwned,
    R: std::io::Read,
{
    reader
        .deserialize::<T>()
        .enumerate()
        .map(|(index, result)| result.with_context(|| format!("bad {kind} row {}", index + 1)))
        .collect()
}

/// Imports the whole file in one transaction: any rejected row rolls back
/// every row before it. Rows that already exist are skipped, not counted.
pub async fn import_marks_csv(
    pool: &PgPool,
    actor: &User,
    csv_path: &std::path::Path,
) -> anyhow::Result<usize> {
    require_recorder(actor)?;
    let reader = csv::Reader::from_path(csv_path)
        .with_context(|| format!("failed to open {}", csv_path.display()))?;
    let rows: Vec<NewMark> = read_rows(reader, "marks")?;

    let mut tx = pool.begin().await?;
    let mut inserted = 0usize;
    for (index, row) in rows.iter().enumerate() {
        let added = try_insert_mark(&mut tx, actor, row)
            .await
            .with_context(|| format!("marks row {} rejected, nothing imported", index + 1))?;
        if added {
            inserted += 1;
        }
    }
    tx.commit().await?;

    info!(inserted, path = %csv_path.display(), "marks imported");
    Ok(inserted)
}

pub async fn import_attendance_csv(
    pool: &PgPool,
    actor: &User,
    csv_path: &std::path::Path,
) -> anyhow::Result<usize> {
    require_recorder(actor)?;
    let reader = csv::Reader::from_path(csv_path)
        .with_context(|| format!("failed to open {}", csv_path.display()))?;
    let rows: Vec<NewAttendance> = read_rows(reader, "attendance")?;

    let mut tx = pool.begin().await?;
    let mut inserted = 0usize;
    for (index, row) in rows.iter().enumerate() {
        let added = try_insert_attendance(&mut tx, actor, row)
            .await
            .with_context(|| format!("attendance row {} rejected, nothing imported", index + 1))?;
        if added {
            inserted += 1;
        }
    }
    tx.commit().await?;

    info!(inserted, path = %csv_path.display(), "attendance imported");
    Ok(inserted)
}

#[instrument(skip(pool, actor, assessment), fields(actor = %actor.username, title = %assessment.title))]
pub async fn create_assessment(
    pool: &PgPool,
    actor: &User,
    assessment: &NewAssessment,
) -> Result<Uuid, AppError> {
    require_recorder(actor)?;
    if assessment.max_score <= 0 {
        return Err(AppError::Invalid("max score must be positive".to_string()));
    }
    let subject = {
        let mut conn = pool.acquire().await?;
        require_subject_access(&mut conn, actor, &assessment.subject_code).await?
    };
    let classroom = find_classroom(pool, assessment.classroom_id).await?;

    let id = Uuid::new_v4();
    sqlx::query(
        r#"
        INSERT INTO student_analytics.assessments
        (id, title, assessment_type, subject_id, classroom_id, max_score, due_date, description, created_by)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        "#,
    )
    .bind(id)
    .bind(&assessment.title)
    .bind(assessment.assessment_type.as_str())
    .bind(subject.id)
    .bind(classroom.id)
    .bind(assessment.max_score)
    .bind(assessment.due_date)
    .bind(&assessment.description)
    .bind(actor.id)
    .execute(pool)
    .await?;

    info!(%id, "assessment created");
    Ok(id)
}

#[instrument(skip(pool, actor, grade), fields(actor = %actor.username))]
pub async fn grade_submission(
    pool: &PgPool,
    actor: &User,
    submission_id: Uuid,
    grade: &SubmissionGrade,
) -> Result<(), AppError> {
    require_recorder(actor)?;
    let max_score: i32 = sqlx::query(
        "SELECT a.max_score FROM student_analytics.assessment_submissions x \
         JOIN student_analytics.assessments a ON a.id = x.assessment_id WHERE x.id = $1",
    )
    .bind(submission_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("submission {submission_id}")))?
    .get("max_score");

    if let Some(score) = grade.score {
        if score < 0.0 || score > f64::from(max_score) {
            return Err(AppError::Invalid(format!(
                "score must be between 0 and {max_score}"
            )));
        }
    }

    sqlx::query(
        r#"
        UPDATE student_analytics.assessment_submissions
        SET score = $2::float8::numeric,
            feedback = $3,
            status = $4,
            graded_at = CASE WHEN $4 = 'graded' THEN now() ELSE graded_at END
        WHERE id = $1
        "#,
    )
    .bind(submission_id)
    .bind(grade.score)
    .bind(&grade.feedback)
    .bind(grade.status.as_str())
    .execute(pool)
    .await?;

    info!(%submission_id, status = %grade.status, "submission graded");
    Ok(())
}

pub async fn fetch_notifications(pool: &PgPool, recipient_id: Uuid) -> Result<Vec<Notification>, AppError> {
    let rows = sqlx::query(
        r#"
        SELECT id, title, message, notif_type, is_read, link, created_at
        FROM student_analytics.notifications
        WHERE recipient_id = $1
        ORDER BY created_at DESC
        "#,
    )
    .bind(recipient_id)
    .fetch_all(pool)
    .await?;

    rows.iter()
        .map(|row| -> Result<Notification, AppError> {
            Ok(Notification {
                id: row.get("id"),
                title: row.get("title"),
                message: row.get("message"),
                kind: row.get::<String, _>("notif_type").parse()?,
                is_read: row.get("is_read"),
                link: row.get("link"),
                created_at: row.get("created_at"),
            })
        })
        .collect()
}

pub async fn mark_notifications_read(pool: &PgPool, recipient_id: Uuid) -> Result<u64, AppError> {
    let result = sqlx::query(
        "UPDATE student_analytics.notifications SET is_read = TRUE \
         WHERE recipient_id = $1 AND NOT is_read",
    )
    .bind(recipient_id)
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}

async fn upsert_user(
    pool: &PgPool,
    username: &str,
    full_name: &str,
    email: &str,
    role: Role,
) -> anyhow::Result<Uuid> {
    let id: Uuid = sqlx::query(
        r#"
        INSERT INTO student_analytics.users (id, username, full_name, email, role)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (username) DO UPDATE
        SET full_name = EXCLUDED.full_name, email = EXCLUDED.email, role = EXCLUDED.role
        RETURNING id
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(username)
    .bind(full_name)
    .bind(email)
    .bind(role.as_str())
    .fetch_one(pool)
    .await?
    .get("id");
    Ok(id)
}

/// Seed score for a student/subject/exam triple: each student has a base
/// level and the offset wobbles within ±15, clamped to [20, 100].
fn seed_score(base: i32, subject_idx: usize, exam_idx: usize) -> i32 {
    let wobble = ((subject_idx * 7 + exam_idx * 5) % 31) as i32 - 15;
    (base + wobble).clamp(20, 100)
}

/// Exams fall three weeks apart, staggered a few days per subject.
fn seed_mark_date(term_start: NaiveDate, subject_idx: usize, exam_idx: usize) -> NaiveDate {
    term_start + Duration::days((exam_idx * 21 + (subject_idx + exam_idx) % 5) as i64)
}

/// Absent roughly one day in `cycle` for a given student/subject pair.
fn seed_absent(day: usize, student_idx: usize, subject_idx: usize, cycle: usize) -> bool {
    (day + student_idx * 3 + subject_idx) % cycle == 0
}

pub async fn seed(pool: &PgPool) -> anyhow::Result<()> {
    let admin = upsert_user(pool, "admin", "Admin User", "admin@ps10.edu", Role::Admin).await?;

    let mut teachers = Vec::new();
    for (username, name, email) in [
        ("teacher1", "Rajesh Kumar", "rajesh@ps10.edu"),
        ("teacher2", "Priya Sharma", "priya@ps10.edu"),
        ("teacher3", "Suresh Rao", "suresh@ps10.edu"),
    ] {
        teachers.push(upsert_user(pool, username, name, email, Role::Teacher).await?);
    }

    // (username, name, email, base score, absence cycle)
    let student_data: [(&str, &str, &str, i32, usize); 6] = [
        ("student1", "Arjun Patel", "arjun@ps10.edu", 92, 17),
        ("student2", "Ananya Singh", "ananya@ps10.edu", 81, 13),
        ("student3", "Vikram Nair", "vikram@ps10.edu", 67, 11),
        ("student4", "Kavya Reddy", "kavya@ps10.edu", 74, 9),
        ("student5", "Rahul Verma", "rahul@ps10.edu", 48, 4),
        ("student6", "Deepa Iyer", "deepa@ps10.edu", 58, 6),
    ];
    let mut students = Vec::new();
    for (idx, (username, name, email, base, cycle)) in student_data.into_iter().enumerate() {
        let id = upsert_user(pool, username, name, email, Role::Student).await?;
        sqlx::query(
            r#"
            INSERT INTO student_analytics.student_profiles (user_id, roll_number, parent_name)
            VALUES ($1, $2, $3)
            ON CONFLICT (user_id) DO NOTHING
            "#,
        )
        .bind(id)
        .bind(format!("2024{:03}", idx + 1))
        .bind(format!("Parent of {}", name.split(' ').next().unwrap_or(name)))
        .execute(pool)
        .await?;
        students.push((id, base, cycle));
    }

    let mut subjects = Vec::new();
    for (name, code) in [
        ("Mathematics", "MATH101"),
        ("Physics", "PHY102"),
        ("Chemistry", "CHEM103"),
        ("Computer Science", "CS104"),
        ("English", "ENG105"),
    ] {
        let id: Uuid = sqlx::query(
            r#"
            INSERT INTO student_analytics.subjects (id, name, code, max_marks)
            VALUES ($1, $2, $3, 100)
            ON CONFLICT (code) DO UPDATE SET name = EXCLUDED.name
            RETURNING id
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(name)
        .bind(code)
        .fetch_one(pool)
        .await?
        .get("id");
        subjects.push(id);
    }

    for (subject_idx, teacher_idx) in [(0, 0), (1, 1), (2, 1), (3, 2), (4, 0)] {
        sqlx::query(
            "INSERT INTO student_analytics.subject_teachers (subject_id, teacher_id) \
             VALUES ($1, $2) ON CONFLICT DO NOTHING",
        )
        .bind(subjects[subject_idx])
        .bind(teachers[teacher_idx])
        .execute(pool)
        .await?;
    }

    let classroom: Uuid = sqlx::query(
        r#"
        INSERT INTO student_analytics.classrooms (id, name, section, academic_year, class_teacher_id)
        VALUES ($1, '12th Grade', 'A', '2024-2025', $2)
        ON CONFLICT (name, section, academic_year) DO UPDATE
        SET class_teacher_id = EXCLUDED.class_teacher_id
        RETURNING id
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(teachers[0])
    .fetch_one(pool)
    .await?
    .get("id");

    for (student, _, _) in &students {
        sqlx::query(
            "INSERT INTO student_analytics.classroom_students (classroom_id, student_id) \
             VALUES ($1, $2) ON CONFLICT DO NOTHING",
        )
        .bind(classroom)
        .bind(student)
        .execute(pool)
        .await?;
    }
    for subject in &subjects {
        sqlx::query(
            "INSERT INTO student_analytics.classroom_subjects (classroom_id, subject_id) \
             VALUES ($1, $2) ON CONFLICT DO NOTHING",
        )
        .bind(classroom)
        .bind(subject)
        .execute(pool)
        .await?;
    }

    let mut exam_types = Vec::new();
    for (name, weightage) in [
        ("Unit Test 1", 20),
        ("Mid Term", 30),
        ("Unit Test 2", 20),
        ("Final Exam", 50),
    ] {
        let id: Uuid = sqlx::query(
            r#"
            INSERT INTO student_analytics.exam_types (id, name, weightage)
            VALUES ($1, $2, $3)
            ON CONFLICT (name) DO UPDATE SET weightage = EXCLUDED.weightage
            RETURNING id
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(name)
        .bind(f64::from(weightage))
        .fetch_one(pool)
        .await?
        .get("id");
        exam_types.push(id);
    }

    let today = Utc::now().date_naive();
    let base_date = today - Duration::days(90);
    for (student, base, _) in &students {
        for (subject_idx, subject) in subjects.iter().enumerate() {
            for (exam_idx, exam_type) in exam_types.iter().enumerate() {
                let date = seed_mark_date(base_date, subject_idx, exam_idx);
                // One seeded mark per exam, whatever day the seed runs on.
                sqlx::query(
                    r#"
                    INSERT INTO student_analytics.marks
                    (id, student_id, subject_id, exam_type_id, marks_obtained, date, recorded_by)
                    SELECT $1, $2, $3, $4, $5, $6, $7
                    WHERE NOT EXISTS (
                        SELECT 1 FROM student_analytics.marks
                        WHERE student_id = $2 AND subject_id = $3 AND exam_type_id = $4
                    )
                    ON CONFLICT (student_id, subject_id, exam_type_id, date) DO NOTHING
                    "#,
                )
                .bind(Uuid::new_v4())
                .bind(student)
                .bind(subject)
                .bind(exam_type)
                .bind(f64::from(seed_score(*base, subject_idx, exam_idx)))
                .bind(date)
                .bind(teachers[0])
                .execute(pool)
                .await?;
            }
        }
    }

    for day in 0..60usize {
        let date = today - Duration::days(day as i64);
        if date.weekday().number_from_monday() > 5 {
            continue;
        }
        for (student_idx, (student, _, cycle)) in students.iter().enumerate() {
            for (subject_idx, subject) in subjects.iter().enumerate() {
                let status = if seed_absent(day, student_idx, subject_idx, *cycle) {
                    "absent"
                } else {
                    "present"
                };
                sqlx::query(
                    r#"
                    INSERT INTO student_analytics.attendance
                    (id, student_id, subject_id, date, status, marked_by)
                    VALUES ($1, $2, $3, $4, $5, $6)
                    ON CONFLICT (student_id, subject_id, date) DO NOTHING
                    "#,
                )
                .bind(Uuid::new_v4())
                .bind(student)
                .bind(subject)
                .bind(date)
                .bind(status)
                .bind(teachers[0])
                .execute(pool)
                .await?;
            }
        }
    }

    let assessment_data = [
        ("Python Assignment", "assignment", 3usize, 50i32, 6i64),
        ("Physics Lab Report", "lab", 1, 30, 12),
        ("Math Quiz", "quiz", 0, 20, 19),
        ("Chemistry Project", "project", 2, 100, 27),
    ];
    for (title, kind, subject_idx, max_score, due_in) in assessment_data {
        let assessment: Uuid = sqlx::query(
            r#"
            INSERT INTO student_analytics.assessments
            (id, title, assessment_type, subject_id, classroom_id, max_score, due_date, created_by)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (title, classroom_id) DO UPDATE SET max_score = EXCLUDED.max_score
            RETURNING id
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(title)
        .bind(kind)
        .bind(subjects[subject_idx])
        .bind(classroom)
        .bind(max_score)
        .bind(today + Duration::days(due_in))
        .bind(teachers[0])
        .fetch_one(pool)
        .await?
        .get("id");

        for (student_idx, (student, base, _)) in students.iter().enumerate().take(4) {
            let score = f64::from(max_score * (*base).clamp(50, 100)) / 100.0;
            sqlx::query(
                r#"
                INSERT INTO student_analytics.assessment_submissions
                (id, assessment_id, student_id, score, submitted_at, graded_at, feedback, status)
                VALUES ($1, $2, $3, $4, now() - ($5 || ' days')::interval, now(), 'Good work! Keep it up.', 'graded')
                ON CONFLICT (assessment_id, student_id) DO NOTHING
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(assessment)
            .bind(student)
            .bind(score)
            .bind((student_idx + 1).to_string())
            .execute(pool)
            .await?;
        }
        for (student, _, _) in students.iter().skip(4) {
            sqlx::query(
                r#"
                INSERT INTO student_analytics.assessment_submissions
                (id, assessment_id, student_id, status)
                VALUES ($1, $2, $3, 'pending')
                ON CONFLICT (assessment_id, student_id) DO NOTHING
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(assessment)
            .bind(student)
            .execute(pool)
            .await?;
        }
    }

    for recipient in students.iter().map(|(id, _, _)| *id).chain([admin]) {
        sqlx::query(
            r#"
            INSERT INTO student_analytics.notifications (id, recipient_id, title, message, notif_type)
            VALUES ($1, $2, 'Welcome to PS10 Analytics', $3, 'info')
            ON CONFLICT (recipient_id, title) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(recipient)
        .bind(
            "Your academic performance dashboard is ready. Track your marks, attendance, \
             and get personalized improvement tips.",
        )
        .execute(pool)
        .await?;
    }

    info!(
        students = students.len(),
        teachers = teachers.len(),
        subjects = subjects.len(),
        "seed data inserted"
    );
    Ok(())
}
