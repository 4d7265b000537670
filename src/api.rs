use actix_web::{web, App, HttpResponse, HttpServer};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::aggregate::{trend_series, TrendPoint};
use crate::dashboard::{class_performance, NamedAverage};
use crate::db::{self, MarkFilter, MarkOrder};
use crate::error::AppError;
use crate::models::{MarkRow, Role, ScoreRecord};

/// `{"data": [...]}` wrapper expected by the chart front end.
#[derive(Debug, Serialize)]
pub struct DataEnvelope<T> {
    pub data: Vec<T>,
}

/// Every mark of a student, oldest first, as chart points.
#[instrument(skip(pool))]
pub async fn student_trend(pool: &PgPool, student_id: Uuid) -> Result<Vec<TrendPoint>, AppError> {
    let student = db::find_user_by_id(pool, student_id).await?;
    if student.role != Role::Student {
        return Err(AppError::NotFound(format!("student {student_id}")));
    }
    let marks = db::fetch_marks(
        pool,
        &MarkFilter {
            student_id: Some(student.id),
            ..MarkFilter::default()
        },
        MarkOrder::OldestFirst,
        None,
    )
    .await?;
    let records: Vec<ScoreRecord> = marks.iter().map(MarkRow::score).collect();
    Ok(trend_series(&records, records.len()))
}

/// Average per enrolled student with marks; empty when no classroom is given.
#[instrument(skip(pool))]
pub async fn classroom_performance(
    pool: &PgPool,
    classroom_id: Option<Uuid>,
) -> Result<Vec<NamedAverage>, AppError> {
    let Some(classroom_id) = classroom_id else {
        return Ok(Vec::new());
    };
    let classroom = db::find_classroom(pool, classroom_id).await?;
    let students = db::fetch_students(pool, Some(classroom.id)).await?;
    let marks = db::fetch_marks(
        pool,
        &MarkFilter {
            student_ids: Some(students.iter().map(|student| student.id).collect()),
            ..MarkFilter::default()
        },
        MarkOrder::NewestFirst,
        None,
    )
    .await?;
    Ok(class_performance(&students, &marks))
}

async fn trend_handler(
    pool: web::Data<PgPool>,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let data = student_trend(&pool, path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(DataEnvelope { data }))
}

#[derive(Debug, Deserialize)]
struct ClassPerformanceQuery {
    classroom_id: Option<Uuid>,
}

async fn class_performance_handler(
    pool: web::Data<PgPool>,
    query: web::Query<ClassPerformanceQuery>,
) -> Result<HttpResponse, AppError> {
    let data = classroom_performance(&pool, query.classroom_id).await?;
    Ok(HttpResponse::Ok().json(DataEnvelope { data }))
}

async fn health() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({ "status": "ok" }))
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health))
        .route("/api/student/{id}/trend/", web::get().to(trend_handler))
        .route(
            "/api/class-performance/",
            web::get().to(class_performance_handler),
        );
}

pub async fn serve(pool: PgPool, bind: &str) -> anyhow::Result<()> {
    let pool = web::Data::new(pool);
    info!(%bind, "starting http server");

    HttpServer::new(move || App::new().app_data(pool.clone()).configure(configure))
        .bind(bind)
        .with_context(|| format!("failed to bind {bind}"))?
        .run()
        .await?;

    Ok(())
}
