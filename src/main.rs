use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use serde::Serialize;
use uuid::Uuid;

mod aggregate;
mod api;
mod config;
mod dashboard;
mod db;
mod error;
mod grading;
mod logging;
mod models;
mod report;
mod suggest;

use crate::api::DataEnvelope;
use crate::config::{Settings, DEFAULT_BIND};
use crate::db::{AssessmentScope, AttendanceFilter, MarkFilter, MarkOrder, SubmissionFilter};
use crate::error::AppError;
use crate::models::{
    AssessmentType, AttendanceStatus, NewAssessment, NewAttendance, NewMark, NewUser, Role,
    SubmissionGrade, SubmissionStatus,
};

const LISTING_LIMIT: i64 = 50;

#[derive(Parser)]
#[command(name = "student-analytics")]
#[command(about = "Marks, attendance and performance analytics for a school", long_about = None)]
struct Cli {
    #[command(flatten)]
    settings: Settings,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load demo data
    Seed,
    /// Register a user; students can be enrolled in a classroom
    AddUser {
        #[arg(long = "as")]
        actor: String,
        #[arg(long)]
        username: String,
        #[arg(long)]
        full_name: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        role: Role,
        #[arg(long)]
        roll_number: Option<String>,
        #[arg(long)]
        classroom: Option<Uuid>,
    },
    /// Import marks from a CSV file
    ImportMarks {
        #[arg(long)]
        csv: PathBuf,
        #[arg(long = "as")]
        actor: String,
    },
    /// Import attendance from a CSV file
    ImportAttendance {
        #[arg(long)]
        csv: PathBuf,
        #[arg(long = "as")]
        actor: String,
    },
    /// Record one mark
    AddMarks {
        #[arg(long = "as")]
        actor: String,
        #[arg(long)]
        student: String,
        #[arg(long)]
        subject: String,
        #[arg(long)]
        exam_type: String,
        #[arg(long)]
        marks: f64,
        #[arg(long)]
        date: NaiveDate,
        #[arg(long, default_value = "")]
        remarks: String,
    },
    /// Record one attendance entry
    MarkAttendance {
        #[arg(long = "as")]
        actor: String,
        #[arg(long)]
        student: String,
        #[arg(long)]
        subject: String,
        #[arg(long)]
        date: NaiveDate,
        #[arg(long, default_value = "present")]
        status: AttendanceStatus,
        #[arg(long, default_value = "")]
        note: String,
    },
    /// Create an assessment for a classroom
    CreateAssessment {
        #[arg(long = "as")]
        actor: String,
        #[arg(long)]
        title: String,
        #[arg(long = "type")]
        assessment_type: AssessmentType,
        #[arg(long)]
        subject: String,
        #[arg(long)]
        classroom: Uuid,
        #[arg(long, default_value_t = 100)]
        max_score: i32,
        #[arg(long)]
        due: NaiveDate,
        #[arg(long, default_value = "")]
        description: String,
    },
    /// Score a submission
    GradeSubmission {
        #[arg(long = "as")]
        actor: String,
        #[arg(long)]
        submission: Uuid,
        #[arg(long)]
        score: Option<f64>,
        #[arg(long, default_value = "")]
        feedback: String,
        #[arg(long, default_value = "graded")]
        status: SubmissionStatus,
    },
    /// Print a user's role dashboard as JSON
    Dashboard {
        #[arg(long)]
        user: String,
    },
    /// List students with their average and attendance
    Students {
        #[arg(long = "as")]
        actor: String,
        #[arg(long)]
        classroom: Option<Uuid>,
    },
    /// Write a student's detail report
    Student {
        #[arg(long = "as")]
        actor: String,
        #[arg(long)]
        user: String,
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// List recent marks
    Marks {
        #[arg(long = "as")]
        actor: String,
        #[arg(long)]
        subject: Option<String>,
        #[arg(long)]
        student: Option<String>,
    },
    /// List recent attendance
    Attendance {
        #[arg(long)]
        user: String,
    },
    /// List assessments visible to a user
    Assessments {
        #[arg(long)]
        user: String,
    },
    /// Show one assessment with its submissions
    Assessment {
        #[arg(long)]
        id: Uuid,
    },
    /// Write a subject report
    SubjectReport {
        #[arg(long)]
        code: String,
        #[arg(long, default_value = "subject-report.md")]
        out: PathBuf,
    },
    /// List classrooms with their ids
    Classrooms,
    /// Show notifications and mark them read
    Notifications {
        #[arg(long)]
        user: String,
    },
    /// Print a student's score trend as chart JSON
    Trend {
        #[arg(long)]
        user: String,
    },
    /// Print per-student averages for a classroom as chart JSON
    ClassPerformance {
        #[arg(long)]
        classroom: Option<Uuid>,
    },
    /// Serve the chart JSON endpoints over HTTP
    Serve {
        #[arg(long, env = "STUDENT_ANALYTICS_BIND", default_value = DEFAULT_BIND)]
        bind: String,
    },
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init(&cli.settings)?;
    let pool = cli.settings.connect().await?;

    match cli.command {
        Commands::InitDb => {
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            db::seed(&pool).await?;
            println!("Seed data inserted.");
        }
        Commands::AddUser {
            actor,
            username,
            full_name,
            email,
            role,
            roll_number,
            classroom,
        } => {
            let actor = db::find_user(&pool, &actor).await?;
            let user = NewUser {
                username,
                full_name,
                email,
                role,
                roll_number,
                classroom_id: classroom,
            };
            let id = db::register_user(&pool, &actor, &user).await?;
            println!("Registered {} ({}) as {id}.", user.username, user.role);
        }
        Commands::ImportMarks { csv, actor } => {
            let actor = db::find_user(&pool, &actor).await?;
            let inserted = db::import_marks_csv(&pool, &actor, &csv).await?;
            println!("Inserted {inserted} marks from {}.", csv.display());
        }
        Commands::ImportAttendance { csv, actor } => {
            let actor = db::find_user(&pool, &actor).await?;
            let inserted = db::import_attendance_csv(&pool, &actor, &csv).await?;
            println!("Inserted {inserted} attendance records from {}.", csv.display());
        }
        Commands::AddMarks {
            actor,
            student,
            subject,
            exam_type,
            marks,
            date,
            remarks,
        } => {
            let actor = db::find_user(&pool, &actor).await?;
            let mark = NewMark {
                student,
                subject_code: subject,
                exam_type,
                marks_obtained: marks,
                date,
                remarks,
            };
            db::insert_mark(&pool, &actor, &mark).await?;
            println!("Marks added for {}.", mark.student);
        }
        Commands::MarkAttendance {
            actor,
            student,
            subject,
            date,
            status,
            note,
        } => {
            let actor = db::find_user(&pool, &actor).await?;
            let entry = NewAttendance {
                student,
                subject_code: subject,
                date,
                status,
                note,
            };
            db::insert_attendance(&pool, &actor, &entry).await?;
            println!("Attendance recorded.");
        }
        Commands::CreateAssessment {
            actor,
            title,
            assessment_type,
            subject,
            classroom,
            max_score,
            due,
            description,
        } => {
            let actor = db::find_user(&pool, &actor).await?;
            let assessment = NewAssessment {
                title,
                assessment_type,
                subject_code: subject,
                classroom_id: classroom,
                max_score,
                due_date: due,
                description,
            };
            let id = db::create_assessment(&pool, &actor, &assessment).await?;
            println!("Assessment created: {id}");
        }
        Commands::GradeSubmission {
            actor,
            submission,
            score,
            feedback,
            status,
        } => {
            let actor = db::find_user(&pool, &actor).await?;
            let grade = SubmissionGrade {
                score,
                feedback,
                status,
            };
            db::grade_submission(&pool, &actor, submission, &grade).await?;
            println!("Submission {submission} updated.");
        }
        Commands::Dashboard { user } => {
            let user = db::find_user(&pool, &user).await?;
            let view = dashboard::load_dashboard(&pool, &user).await?;
            print_json(&view)?;
        }
        Commands::Students { actor, classroom } => {
            let actor = db::find_user(&pool, &actor).await?;
            let summaries = dashboard::load_student_list(&pool, &actor, classroom).await?;

            if summaries.is_empty() {
                println!("No students found.");
                return Ok(());
            }

            for summary in &summaries {
                println!(
                    "- {} ({}) avg {:.1}% attendance {:.1}%",
                    summary.student.full_name,
                    summary.student.username,
                    summary.avg,
                    summary.att_pct
                );
            }
        }
        Commands::Student { actor, user, out } => {
            let viewer = db::find_user(&pool, &actor).await?;
            let student = db::find_user(&pool, &user).await?;
            let detail = dashboard::load_student_detail(&pool, &viewer, student).await?;
            let report = report::build_student_report(&detail);
            match out {
                Some(path) => {
                    std::fs::write(&path, report)?;
                    println!("Report written to {}.", path.display());
                }
                None => print!("{report}"),
            }
        }
        Commands::Marks {
            actor,
            subject,
            student,
        } => {
            let actor = db::find_user(&pool, &actor).await?;
            if !actor.role.can_record() {
                return Err(AppError::Forbidden("only staff can browse marks".to_string()).into());
            }
            let mut filter = MarkFilter::default();
            if let Some(code) = subject {
                filter.subject_id = Some(db::find_subject(&pool, &code).await?.id);
            }
            if let Some(username) = student {
                filter.student_id = Some(db::find_user(&pool, &username).await?.id);
            }
            let marks =
                db::fetch_marks(&pool, &filter, MarkOrder::NewestFirst, Some(LISTING_LIMIT)).await?;
            print_json(&marks)?;
        }
        Commands::Attendance { user } => {
            let user = db::find_user(&pool, &user).await?;
            let filter = AttendanceFilter {
                student_id: (user.role == Role::Student).then_some(user.id),
                ..AttendanceFilter::default()
            };
            let rows = db::fetch_attendance(&pool, &filter, Some(LISTING_LIMIT)).await?;
            print_json(&rows)?;
        }
        Commands::Assessments { user } => {
            let user = db::find_user(&pool, &user).await?;
            let assessments =
                db::fetch_assessments(&pool, AssessmentScope::for_user(&user), None).await?;
            print_json(&assessments)?;
        }
        Commands::Assessment { id } => {
            let assessment = db::find_assessment(&pool, id).await?;
            let submissions = db::fetch_submissions(
                &pool,
                &SubmissionFilter {
                    assessment_id: Some(id),
                    ..SubmissionFilter::default()
                },
                None,
            )
            .await?;
            print_json(&serde_json::json!({
                "assessment": assessment,
                "submissions": submissions,
            }))?;
        }
        Commands::SubjectReport { code, out } => {
            let subject_report = dashboard::load_subject_report(&pool, &code).await?;
            std::fs::write(&out, report::build_subject_report(&subject_report))?;
            println!("Report written to {}.", out.display());
        }
        Commands::Classrooms => {
            for classroom in db::fetch_classrooms(&pool).await? {
                println!("{} {}", classroom.id, classroom.label());
            }
        }
        Commands::Notifications { user } => {
            let user = db::find_user(&pool, &user).await?;
            let notifications = db::fetch_notifications(&pool, user.id).await?;
            db::mark_notifications_read(&pool, user.id).await?;
            print_json(&notifications)?;
        }
        Commands::Trend { user } => {
            let student = db::find_user(&pool, &user).await?;
            let data = api::student_trend(&pool, student.id).await?;
            print_json(&DataEnvelope { data })?;
        }
        Commands::ClassPerformance { classroom } => {
            let data = api::classroom_performance(&pool, classroom).await?;
            print_json(&DataEnvelope { data })?;
        }
        Commands::Serve { bind } => {
            api::serve(pool, &bind).await?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_mark_attendance_with_typed_status() {
        let cli = Cli::parse_from([
            "student-analytics",
            "mark-attendance",
            "--as",
            "teacher1",
            "--student",
            "student3",
            "--subject",
            "PHY102",
            "--date",
            "2024-09-02",
            "--status",
            "late",
        ]);
        match cli.command {
            Commands::MarkAttendance { status, date, .. } => {
                assert_eq!(status, AttendanceStatus::Late);
                assert_eq!(date, NaiveDate::from_ymd_opt(2024, 9, 2).unwrap());
            }
            _ => panic!("expected mark-attendance"),
        }
    }

    #[test]
    fn add_user_parses_role_and_enrollment() {
        let cli = Cli::parse_from([
            "student-analytics",
            "add-user",
            "--as",
            "admin",
            "--username",
            "student7",
            "--full-name",
            "Meera Joshi",
            "--email",
            "meera@ps10.edu",
            "--role",
            "student",
            "--roll-number",
            "2024007",
            "--classroom",
            "00000000-0000-0000-0000-000000000003",
        ]);
        match cli.command {
            Commands::AddUser {
                role,
                roll_number,
                classroom,
                ..
            } => {
                assert_eq!(role, Role::Student);
                assert_eq!(roll_number.as_deref(), Some("2024007"));
                assert_eq!(classroom, Some(Uuid::from_u128(3)));
            }
            _ => panic!("expected add-user"),
        }
    }

    #[test]
    fn rejects_unknown_submission_status() {
        let result = Cli::try_parse_from([
            "student-analytics",
            "grade-submission",
            "--as",
            "teacher1",
            "--submission",
            "00000000-0000-0000-0000-000000000001",
            "--status",
            "lost",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn serve_defaults_to_local_bind() {
        let cli = Cli::parse_from(["student-analytics", "serve"]);
        match cli.command {
            Commands::Serve { bind } => assert!(!bind.is_empty()),
            _ => panic!("expected serve"),
        }
    }
}
