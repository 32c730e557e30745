use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::{AdminUser, CurrentUser};
use crate::db::Db;
use crate::error::AppError;
use crate::models::*;
use crate::progress::{aggregate, resume_target, ModuleSummary, ProgressReport, ResumeTarget};
use crate::rate_limit::{self, WindowLimits};
use crate::sections::{split_sections, Section};
use crate::sequence::{build_sequence, neighbors, CourseSeq, LessonRef, ModuleSeq, Step};
use crate::validate::{self, RuleSet};

#[derive(Clone)]
pub struct AppState {
    pub db: Db,
    pub http: reqwest::Client,
    pub auth_verify_url: String,
    pub rate_limits: WindowLimits,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        // learner API
        .route("/api/courses", get(list_courses))
        .route("/api/courses/:slug", get(get_course))
        .route("/api/courses/:slug/sequence", get(get_sequence))
        .route("/api/courses/:slug/progress", get(get_progress))
        .route("/api/modules/:id/lessons/:idx", get(get_lesson))
        .route(
            "/api/modules/:id/lessons/:idx/complete",
            post(complete_lesson).delete(uncomplete_lesson),
        )
        .route("/api/modules/:id/quiz", post(submit_quiz))
        .route("/api/modules/:id/quiz/retake", post(retake_quiz))
        // admin content API
        .route("/api/admin/courses", post(create_course))
        .route("/api/admin/courses/:id", put(update_course).delete(delete_course))
        .route("/api/admin/courses/:id/modules", post(create_module))
        .route("/api/admin/modules/:id", put(update_module).delete(delete_module))
        .route(
            "/api/admin/schema-versions",
            get(list_schema_versions).post(create_schema_version),
        )
        .route(
            "/api/admin/schema-versions/:id/activate",
            post(activate_schema_version),
        )
        .with_state(state)
}

// --- admin: courses ---

async fn create_course(
    State(st): State<AppState>,
    AdminUser(_): AdminUser,
    Json(req): Json<CreateCourseReq>,
) -> Result<Json<Course>, AppError> {
    let course: Course = sqlx::query_as(
        r#"
        INSERT INTO courses (id, title, slug, description, capstone_title, survey_form)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(&req.title)
    .bind(&req.slug)
    .bind(&req.description)
    .bind(&req.capstone_title)
    .bind(&req.survey_form)
    .fetch_one(&st.db)
    .await
    .map_err(|e| on_unique(e, "a course with this slug already exists"))?;
    Ok(Json(course))
}

async fn update_course(
    State(st): State<AppState>,
    AdminUser(_): AdminUser,
    Path(id): Path<Uuid>,
    Json(req): Json<CreateCourseReq>,
) -> Result<Json<Course>, AppError> {
    let course: Option<Course> = sqlx::query_as(
        r#"
        UPDATE courses
        SET title = $1, slug = $2, description = $3, capstone_title = $4, survey_form = $5
        WHERE id = $6
        RETURNING *
        "#,
    )
    .bind(&req.title)
    .bind(&req.slug)
    .bind(&req.description)
    .bind(&req.capstone_title)
    .bind(&req.survey_form)
    .bind(id)
    .fetch_optional(&st.db)
    .await
    .map_err(|e| on_unique(e, "a course with this slug already exists"))?;
    course.map(Json).ok_or(AppError::NotFound("course"))
}

async fn delete_course(
    State(st): State<AppState>,
    AdminUser(_): AdminUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    let res = sqlx::query("DELETE FROM courses WHERE id = $1")
        .bind(id)
        .execute(&st.db)
        .await?;
    if res.rows_affected() == 0 {
        return Err(AppError::NotFound("course"));
    }
    Ok(StatusCode::NO_CONTENT)
}

// --- admin: modules ---

async fn create_module(
    State(st): State<AppState>,
    AdminUser(_): AdminUser,
    Path(course_id): Path<Uuid>,
    Json(req): Json<ModuleReq>,
) -> Result<Json<Module>, AppError> {
    let course: Course = sqlx::query_as("SELECT * FROM courses WHERE id = $1")
        .bind(course_id)
        .fetch_optional(&st.db)
        .await?
        .ok_or(AppError::NotFound("course"))?;

    let section_count = check_against_active_schema(&st.db, &req).await?;

    let module: Module = sqlx::query_as(
        r#"
        INSERT INTO modules (id, course_id, title, slug, position, content, quiz_form, outro, section_count)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(course.id)
    .bind(&req.title)
    .bind(&req.slug)
    .bind(req.position)
    .bind(&req.content)
    .bind(req.quiz_form.map(sqlx::types::Json))
    .bind(&req.outro)
    .bind(section_count)
    .fetch_one(&st.db)
    .await
    .map_err(|e| on_unique(e, "a module with this slug or position already exists in the course"))?;
    Ok(Json(module))
}

async fn update_module(
    State(st): State<AppState>,
    AdminUser(_): AdminUser,
    Path(id): Path<Uuid>,
    Json(req): Json<ModuleReq>,
) -> Result<Json<Module>, AppError> {
    let section_count = check_against_active_schema(&st.db, &req).await?;

    let module: Option<Module> = sqlx::query_as(
        r#"
        UPDATE modules
        SET title = $1, slug = $2, position = $3, content = $4, quiz_form = $5,
            outro = $6, section_count = $7, updated_at = now()
        WHERE id = $8
        RETURNING *
        "#,
    )
    .bind(&req.title)
    .bind(&req.slug)
    .bind(req.position)
    .bind(&req.content)
    .bind(req.quiz_form.map(sqlx::types::Json))
    .bind(&req.outro)
    .bind(section_count)
    .bind(id)
    .fetch_optional(&st.db)
    .await
    .map_err(|e| on_unique(e, "a module with this slug or position already exists in the course"))?;
    module.map(Json).ok_or(AppError::NotFound("module"))
}

async fn delete_module(
    State(st): State<AppState>,
    AdminUser(_): AdminUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    let res = sqlx::query("DELETE FROM modules WHERE id = $1")
        .bind(id)
        .execute(&st.db)
        .await?;
    if res.rows_affected() == 0 {
        return Err(AppError::NotFound("module"));
    }
    Ok(StatusCode::NO_CONTENT)
}

/// Runs the validator against the active rule set. A failed report blocks
/// the write; a passing one yields the section count to cache on the row.
async fn check_against_active_schema(db: &Db, req: &ModuleReq) -> Result<i32, AppError> {
    let (rules, version) = active_rules(db).await?;
    let report = validate::validate_module(&req.content, req.quiz_form.as_ref(), &rules, version);
    if !report.valid {
        return Err(AppError::Validation {
            errors: report.errors,
            schema_version: report.schema_version,
        });
    }
    Ok(split_sections(&req.content).len() as i32)
}

async fn active_rules(db: &Db) -> Result<(RuleSet, i32), AppError> {
    let active: Option<SchemaVersion> =
        sqlx::query_as("SELECT * FROM schema_versions WHERE active LIMIT 1")
            .fetch_optional(db)
            .await?;
    Ok(match active {
        Some(v) => (v.rules.0, v.version),
        None => (RuleSet::default(), 0),
    })
}

// --- admin: schema versions ---

async fn list_schema_versions(
    State(st): State<AppState>,
    AdminUser(_): AdminUser,
) -> Result<Json<Vec<SchemaVersion>>, AppError> {
    let versions: Vec<SchemaVersion> =
        sqlx::query_as("SELECT * FROM schema_versions ORDER BY version DESC")
            .fetch_all(&st.db)
            .await?;
    Ok(Json(versions))
}

async fn create_schema_version(
    State(st): State<AppState>,
    AdminUser(_): AdminUser,
    Json(req): Json<CreateSchemaVersionReq>,
) -> Result<Json<SchemaVersion>, AppError> {
    let version: SchemaVersion = sqlx::query_as(
        r#"
        INSERT INTO schema_versions (id, version, rules, active)
        VALUES ($1, $2, $3, false)
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(req.version)
    .bind(sqlx::types::Json(req.rules))
    .fetch_one(&st.db)
    .await
    .map_err(|e| on_unique(e, "this schema version number already exists"))?;
    Ok(Json(version))
}

// Deactivate-all and activate-one happen in one transaction so no window
// with zero or two active versions is observable.
async fn activate_schema_version(
    State(st): State<AppState>,
    AdminUser(admin): AdminUser,
    Path(id): Path<Uuid>,
) -> Result<Json<SchemaVersion>, AppError> {
    let mut tx = st.db.begin().await?;
    sqlx::query("UPDATE schema_versions SET active = false WHERE active")
        .execute(&mut *tx)
        .await?;
    let activated: Option<SchemaVersion> =
        sqlx::query_as("UPDATE schema_versions SET active = true WHERE id = $1 RETURNING *")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?;
    let Some(activated) = activated else {
        return Err(AppError::NotFound("schema version"));
    };
    tx.commit().await?;
    tracing::info!(version = activated.version, admin = %admin.id, "schema version activated");
    Ok(Json(activated))
}

// --- learner API ---

async fn list_courses(
    State(st): State<AppState>,
    _user: CurrentUser,
) -> Result<Json<Vec<Course>>, AppError> {
    let courses: Vec<Course> = sqlx::query_as("SELECT * FROM courses ORDER BY created_at")
        .fetch_all(&st.db)
        .await?;
    Ok(Json(courses))
}

#[derive(Serialize)]
pub struct ModuleDetail {
    pub id: Uuid,
    pub title: String,
    pub slug: String,
    pub position: i32,
    pub section_count: i32,
    pub has_quiz: bool,
    pub outro: Option<String>,
    pub lessons: Vec<LessonRef>,
}

#[derive(Serialize)]
pub struct CourseDetail {
    pub course: Course,
    pub modules: Vec<ModuleDetail>,
}

async fn get_course(
    State(st): State<AppState>,
    _user: CurrentUser,
    Path(slug): Path<String>,
) -> Result<Json<CourseDetail>, AppError> {
    let (course, modules) = fetch_course(&st.db, &slug).await?;
    let modules = modules
        .into_iter()
        .map(|m| ModuleDetail {
            id: m.id,
            title: m.title,
            slug: m.slug,
            position: m.position,
            section_count: m.section_count,
            has_quiz: m.quiz_form.is_some(),
            outro: m.outro,
            lessons: lesson_refs(&m.content),
        })
        .collect();
    Ok(Json(CourseDetail { course, modules }))
}

#[derive(Deserialize)]
pub struct SequenceQuery {
    /// step path to compute prev/next around
    pub at: Option<String>,
}

#[derive(Serialize)]
pub struct SequenceResponse {
    pub steps: Vec<Step>,
    pub prev: Option<Step>,
    pub next: Option<Step>,
}

async fn get_sequence(
    State(st): State<AppState>,
    _user: CurrentUser,
    Path(slug): Path<String>,
    Query(q): Query<SequenceQuery>,
) -> Result<Json<SequenceResponse>, AppError> {
    let (course, modules) = fetch_course(&st.db, &slug).await?;

    let course_seq = CourseSeq {
        slug: course.slug.clone(),
        title: course.title.clone(),
        has_certificate: course.capstone_title.is_some(),
    };
    let module_seqs: Vec<ModuleSeq> = modules
        .iter()
        .map(|m| ModuleSeq {
            slug: m.slug.clone(),
            title: m.title.clone(),
            position: m.position,
            has_quiz: m.quiz_form.is_some(),
            has_outro: m.outro.is_some(),
        })
        .collect();
    let lessons = modules
        .iter()
        .map(|m| (m.slug.clone(), lesson_refs(&m.content)))
        .collect();

    let steps = build_sequence(&course_seq, &module_seqs, &lessons);
    let (prev, next) = match &q.at {
        Some(at) => neighbors(&steps, at),
        None => (None, None),
    };
    let (prev, next) = (prev.cloned(), next.cloned());
    Ok(Json(SequenceResponse { steps, prev, next }))
}

#[derive(Serialize)]
pub struct ProgressResponse {
    #[serde(flatten)]
    pub report: ProgressReport,
    pub resume: Option<ResumeTarget>,
}

async fn get_progress(
    State(st): State<AppState>,
    user: CurrentUser,
    Path(slug): Path<String>,
) -> Result<Json<ProgressResponse>, AppError> {
    let (course, _) = fetch_course(&st.db, &slug).await?;
    Ok(Json(course_progress(&st.db, &user.id, course.id).await?))
}

#[derive(Serialize)]
pub struct LessonResponse {
    pub lesson: LessonRef,
    pub section: Section,
}

async fn get_lesson(
    State(st): State<AppState>,
    _user: CurrentUser,
    Path((module_id, idx)): Path<(Uuid, i32)>,
) -> Result<Json<LessonResponse>, AppError> {
    let module = fetch_module(&st.db, module_id).await?;
    let section = split_sections(&module.content)
        .into_iter()
        .find(|s| s.idx == idx as usize)
        .ok_or(AppError::NotFound("lesson"))?;
    Ok(Json(LessonResponse {
        lesson: LessonRef::from_section(&section),
        section,
    }))
}

async fn complete_lesson(
    State(st): State<AppState>,
    user: CurrentUser,
    Path((module_id, idx)): Path<(Uuid, i32)>,
) -> Result<Json<ProgressResponse>, AppError> {
    let module = fetch_module(&st.db, module_id).await?;
    if idx < 0 || idx >= module.section_count {
        return Err(AppError::NotFound("lesson"));
    }

    // repeated completions land on the same row
    sqlx::query(
        r#"
        INSERT INTO progress (id, user_id, module_id, kind, lesson_idx, completed_at)
        VALUES ($1, $2, $3, 'lesson', $4, now())
        ON CONFLICT (user_id, module_id, lesson_idx) WHERE kind = 'lesson'
        DO UPDATE SET completed_at = now()
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(&user.id)
    .bind(module.id)
    .bind(idx)
    .execute(&st.db)
    .await?;

    Ok(Json(course_progress(&st.db, &user.id, module.course_id).await?))
}

async fn uncomplete_lesson(
    State(st): State<AppState>,
    user: CurrentUser,
    Path((module_id, idx)): Path<(Uuid, i32)>,
) -> Result<Json<ProgressResponse>, AppError> {
    let module = fetch_module(&st.db, module_id).await?;

    // kind keeps this away from quiz attempt rows
    sqlx::query(
        "DELETE FROM progress WHERE user_id = $1 AND module_id = $2 AND kind = 'lesson' AND lesson_idx = $3",
    )
    .bind(&user.id)
    .bind(module.id)
    .bind(idx)
    .execute(&st.db)
    .await?;

    Ok(Json(course_progress(&st.db, &user.id, module.course_id).await?))
}

#[derive(Serialize)]
pub struct QuizResultResponse {
    pub outcome: QuizOutcome,
    #[serde(flatten)]
    pub progress: ProgressResponse,
}

async fn submit_quiz(
    State(st): State<AppState>,
    user: CurrentUser,
    Path(module_id): Path<Uuid>,
    Json(sub): Json<QuizSubmission>,
) -> Result<Json<QuizResultResponse>, AppError> {
    let module = fetch_module(&st.db, module_id).await?;
    let Some(quiz) = module.quiz_form.as_ref() else {
        return Err(AppError::NotFound("quiz"));
    };

    rate_limit::check_and_record(&st.db, &user.id, "quiz-submit", st.rate_limits).await?;

    let outcome = quiz.grade(&sub.answers);
    let answers = serde_json::to_value(&sub.answers).map_err(anyhow::Error::from)?;

    sqlx::query(
        r#"
        INSERT INTO progress (id, user_id, module_id, kind, score, passed, answers, completed_at)
        VALUES ($1, $2, $3, 'quiz_attempt', $4, $5, $6, now())
        ON CONFLICT (user_id, module_id) WHERE kind = 'quiz_attempt'
        DO UPDATE SET score = excluded.score, passed = excluded.passed,
                      answers = excluded.answers, completed_at = excluded.completed_at
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(&user.id)
    .bind(module.id)
    .bind(outcome.score)
    .bind(outcome.passed)
    .bind(answers)
    .execute(&st.db)
    .await?;

    let progress = course_progress(&st.db, &user.id, module.course_id).await?;
    Ok(Json(QuizResultResponse { outcome, progress }))
}

async fn retake_quiz(
    State(st): State<AppState>,
    user: CurrentUser,
    Path(module_id): Path<Uuid>,
) -> Result<Json<ProgressResponse>, AppError> {
    let module = fetch_module(&st.db, module_id).await?;

    sqlx::query(
        "DELETE FROM progress WHERE user_id = $1 AND module_id = $2 AND kind = 'quiz_attempt'",
    )
    .bind(&user.id)
    .bind(module.id)
    .execute(&st.db)
    .await?;

    Ok(Json(course_progress(&st.db, &user.id, module.course_id).await?))
}

// --- helpers ---

async fn fetch_course(db: &Db, slug: &str) -> Result<(Course, Vec<Module>), AppError> {
    let course: Course = sqlx::query_as("SELECT * FROM courses WHERE slug = $1")
        .bind(slug)
        .fetch_optional(db)
        .await?
        .ok_or(AppError::NotFound("course"))?;
    let modules: Vec<Module> =
        sqlx::query_as("SELECT * FROM modules WHERE course_id = $1 ORDER BY position")
            .bind(course.id)
            .fetch_all(db)
            .await?;
    Ok((course, modules))
}

async fn fetch_module(db: &Db, id: Uuid) -> Result<Module, AppError> {
    sqlx::query_as("SELECT * FROM modules WHERE id = $1")
        .bind(id)
        .fetch_optional(db)
        .await?
        .ok_or(AppError::NotFound("module"))
}

fn lesson_refs(content: &str) -> Vec<LessonRef> {
    split_sections(content)
        .iter()
        .map(LessonRef::from_section)
        .collect()
}

async fn course_progress(db: &Db, user_id: &str, course_id: Uuid) -> Result<ProgressResponse, AppError> {
    let modules: Vec<Module> =
        sqlx::query_as("SELECT * FROM modules WHERE course_id = $1 ORDER BY position")
            .bind(course_id)
            .fetch_all(db)
            .await?;
    let summaries: Vec<ModuleSummary> = modules
        .iter()
        .map(|m| ModuleSummary {
            id: m.id,
            slug: m.slug.clone(),
            lesson_count: m.section_count.max(0) as usize,
            has_quiz: m.quiz_form.is_some(),
        })
        .collect();
    let ids: Vec<Uuid> = modules.iter().map(|m| m.id).collect();
    let rows: Vec<ProgressRow> =
        sqlx::query_as("SELECT * FROM progress WHERE user_id = $1 AND module_id = ANY($2)")
            .bind(user_id)
            .bind(&ids)
            .fetch_all(db)
            .await?;

    Ok(ProgressResponse {
        report: aggregate(&summaries, &rows),
        resume: resume_target(&summaries, &rows),
    })
}

fn on_unique(e: sqlx::Error, msg: &str) -> AppError {
    match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            AppError::BadRequest(msg.to_string())
        }
        _ => e.into(),
    }
}
