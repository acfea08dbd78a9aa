use anyhow::Context;
use chrono::Utc;
use sqlx::{Pool, Sqlite, SqliteConnection};
use uuid::Uuid;

use crate::{
    errors::PostError,
    models::{
        post_model::{
            format_ts, CreatePostRequest, ListPostsResponse, Platform, PlatformResult, Post,
            PostRow, PostStatus,
        },
        publish_model::RemotePost,
    },
};

const POST_COLUMNS: &str = r#"
    id, content, platforms, status, video_url, title, description, tags,
    scheduled_time, created_at, approved_at, published_at, error_detail
"#;

#[derive(Clone, Debug)]
pub struct PostService {
    db_pool: Pool<Sqlite>,
}

impl PostService {
    pub fn new(db_pool: Pool<Sqlite>) -> Self {
        PostService { db_pool }
    }

    /// Corre migraciones con sqlx
    pub async fn run_migrations(&self) -> anyhow::Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.db_pool)
            .await
            .context("Fallo al correr migraciones")?;
        Ok(())
    }

    /// Crea el post en DB con estado "pending_approval"
    pub async fn create_post(&self, req: CreatePostRequest) -> Result<Post, PostError> {
        let platforms = validate_request(&req)?;
        let post_id = Uuid::new_v4().to_string();
        let now = format_ts(&Utc::now());

        let platform_names: Vec<&str> = platforms.iter().map(|p| p.as_str()).collect();
        let platforms_json = serde_json::to_string(&platform_names)
            .map_err(|e| PostError::InvalidRequest(e.to_string()))?;
        let tags: Vec<String> = req
            .tags
            .iter()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect();
        let tags_json =
            serde_json::to_string(&tags).map_err(|e| PostError::InvalidRequest(e.to_string()))?;
        let scheduled_time = req.scheduled_time.as_ref().map(format_ts);

        sqlx::query(
            r#"
            INSERT INTO posts (
                id, content, platforms, status, video_url, title, description,
                tags, scheduled_time, created_at
            )
            VALUES (?1, ?2, ?3, 'pending_approval', ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
        )
        .bind(&post_id)
        .bind(&req.content)
        .bind(&platforms_json)
        .bind(req.video_url.trim())
        .bind(&req.title)
        .bind(&req.description)
        .bind(&tags_json)
        .bind(&scheduled_time)
        .bind(&now)
        .execute(&self.db_pool)
        .await?;

        log::info!(
            "(create_post) Post {} creado para plataformas {:?}",
            post_id,
            platform_names
        );

        self.get_post(&post_id).await
    }

    pub async fn get_post(&self, post_id: &str) -> Result<Post, PostError> {
        let sql = format!("SELECT {} FROM posts WHERE id = ?1", POST_COLUMNS);
        let row = sqlx::query_as::<_, PostRow>(&sql)
            .bind(post_id)
            .fetch_optional(&self.db_pool)
            .await?
            .ok_or_else(|| PostError::NotFound(format!("post {}", post_id)))?;

        Ok(Post::try_from(row)?)
    }

    /// Lista posts con paginación, opcionalmente filtrando por estado
    pub async fn list_posts(
        &self,
        page: u64,
        page_size: u64,
        status: Option<PostStatus>,
    ) -> Result<ListPostsResponse, PostError> {
        let page = page.max(1);
        let page_size = page_size.clamp(1, 100);
        let offset = (page - 1)
            .checked_mul(page_size)
            .and_then(|o| i64::try_from(o).ok())
            .ok_or_else(|| PostError::InvalidRequest(format!("page {} is out of range", page)))?;
        let status_filter = status.map(|s| s.as_str());

        // ?1 IS NULL desactiva el filtro
        let total: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM posts WHERE (?1 IS NULL OR status = ?1)")
                .bind(status_filter)
                .fetch_one(&self.db_pool)
                .await?;

        let sql = format!(
            r#"
            SELECT {}
            FROM posts
            WHERE (?1 IS NULL OR status = ?1)
            ORDER BY created_at DESC
            LIMIT ?2 OFFSET ?3
            "#,
            POST_COLUMNS
        );
        let rows = sqlx::query_as::<_, PostRow>(&sql)
            .bind(status_filter)
            .bind(page_size as i64)
            .bind(offset)
            .fetch_all(&self.db_pool)
            .await?;

        let items = rows
            .into_iter()
            .map(Post::try_from)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(ListPostsResponse {
            total: total as u64,
            page,
            page_size,
            items,
        })
    }

    /// pending_approval -> approved. Un segundo approve falla con InvalidState.
    /// No encola nada: el HTTP aprueba con `SchedulerService::approve_and_schedule`.
    #[allow(dead_code)]
    pub async fn approve(&self, post_id: &str) -> Result<Post, PostError> {
        let mut conn = self.db_pool.acquire().await?;
        self.approve_on(&mut conn, post_id).await?;
        drop(conn);
        self.get_post(post_id).await
    }

    /// Igual que `approve` pero sobre una conexión dada, para poder aprobar
    /// dentro de la misma transacción que encola la publicación.
    pub(crate) async fn approve_on(
        &self,
        conn: &mut SqliteConnection,
        post_id: &str,
    ) -> Result<(), PostError> {
        let now = format_ts(&Utc::now());
        let result = sqlx::query(
            r#"
            UPDATE posts
            SET status = 'approved',
                approved_at = ?2
            WHERE id = ?1 AND status = 'pending_approval'
            "#,
        )
        .bind(post_id)
        .bind(&now)
        .execute(&mut *conn)
        .await?;

        if result.rows_affected() == 0 {
            return Err(transition_error(conn, post_id, PostStatus::Approved).await);
        }

        log::info!("(approve) Post {} aprobado", post_id);
        Ok(())
    }

    /// approved -> published
    pub async fn mark_published(&self, post_id: &str) -> Result<Post, PostError> {
        let now = format_ts(&Utc::now());
        let result = sqlx::query(
            r#"
            UPDATE posts
            SET status = 'published',
                published_at = ?2,
                error_detail = NULL
            WHERE id = ?1 AND status = 'approved'
            "#,
        )
        .bind(post_id)
        .bind(&now)
        .execute(&self.db_pool)
        .await?;

        if result.rows_affected() == 0 {
            let mut conn = self.db_pool.acquire().await?;
            return Err(transition_error(&mut conn, post_id, PostStatus::Published).await);
        }

        log::info!("(mark_published) Post {} publicado", post_id);
        self.get_post(post_id).await
    }

    /// approved -> failed, guardando el detalle del error
    pub async fn mark_failed(&self, post_id: &str, error_detail: &str) -> Result<Post, PostError> {
        let now = format_ts(&Utc::now());
        let result = sqlx::query(
            r#"
            UPDATE posts
            SET status = 'failed',
                published_at = ?2,
                error_detail = ?3
            WHERE id = ?1 AND status = 'approved'
            "#,
        )
        .bind(post_id)
        .bind(&now)
        .bind(error_detail)
        .execute(&self.db_pool)
        .await?;

        if result.rows_affected() == 0 {
            let mut conn = self.db_pool.acquire().await?;
            return Err(transition_error(&mut conn, post_id, PostStatus::Failed).await);
        }

        log::warn!("(mark_failed) Post {} falló: {}", post_id, error_detail);
        self.get_post(post_id).await
    }

    pub async fn record_platform_result(
        &self,
        post_id: &str,
        platform: Platform,
        result: Result<&RemotePost, &PostError>,
    ) -> Result<(), PostError> {
        let (status, remote_id, error_detail) = match result {
            Ok(remote) => ("published", Some(remote.remote_id.clone()), None),
            Err(e) => ("failed", None, Some(e.detail())),
        };

        sqlx::query(
            r#"
            INSERT INTO post_platform_results (
                id, post_id, platform, status, remote_id, error_detail, created_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(post_id)
        .bind(platform.as_str())
        .bind(status)
        .bind(remote_id)
        .bind(error_detail)
        .bind(format_ts(&Utc::now()))
        .execute(&self.db_pool)
        .await?;

        Ok(())
    }

    pub async fn platform_results(&self, post_id: &str) -> Result<Vec<PlatformResult>, PostError> {
        let rows = sqlx::query_as::<_, PlatformResult>(
            r#"
            SELECT post_id, platform, status, remote_id, error_detail, created_at
            FROM post_platform_results
            WHERE post_id = ?1
            ORDER BY created_at
            "#,
        )
        .bind(post_id)
        .fetch_all(&self.db_pool)
        .await?;

        Ok(rows)
    }
}

/// Distingue "no existe" de "estado incorrecto" cuando un UPDATE condicional no tocó filas.
async fn transition_error(conn: &mut SqliteConnection, post_id: &str, target: PostStatus) -> PostError {
    let current: Result<Option<String>, sqlx::Error> =
        sqlx::query_scalar("SELECT status FROM posts WHERE id = ?1")
            .bind(post_id)
            .fetch_optional(&mut *conn)
            .await;

    match current {
        Ok(None) => PostError::NotFound(format!("post {}", post_id)),
        Ok(Some(status)) => PostError::InvalidState(format!(
            "post {} is {}, cannot move to {}",
            post_id, status, target
        )),
        Err(e) => PostError::Database(e),
    }
}

fn validate_request(req: &CreatePostRequest) -> Result<Vec<Platform>, PostError> {
    if req.platforms.is_empty() {
        return Err(PostError::InvalidRequest(
            "at least one platform is required".to_string(),
        ));
    }

    let mut platforms = Vec::with_capacity(req.platforms.len());
    for name in &req.platforms {
        let platform = name.parse::<Platform>().map_err(PostError::InvalidRequest)?;
        if !platforms.contains(&platform) {
            platforms.push(platform);
        }
    }

    // Sin texto no hay caption posible
    let has_description = req
        .description
        .as_deref()
        .map_or(false, |d| !d.trim().is_empty());
    if req.content.trim().is_empty() && !has_description {
        return Err(PostError::InvalidRequest(
            "content or description is required".to_string(),
        ));
    }

    let url = req.video_url.trim();
    if url.is_empty() {
        return Err(PostError::InvalidRequest("video_url is required".to_string()));
    }
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        return Err(PostError::InvalidRequest(format!(
            "video_url must be an http(s) URL, got '{}'",
            url
        )));
    }

    Ok(platforms)
}
