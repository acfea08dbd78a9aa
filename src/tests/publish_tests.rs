//! tests/publish_tests.rs
//! Ciclo completo de publicación contra APIs simuladas.

#[cfg(test)]
mod tests {
    use actix_rt::test;
    use wiremock::{
        matchers::{body_string_contains, method, path},
        Mock, MockServer, ResponseTemplate,
    };

    use crate::errors::PostError;
    use crate::models::post_model::PostStatus;
    use crate::models::publish_model::{PublishOutcome, RemotePost};
    use crate::services::publish_service::INTERRUPTED_DETAIL;
    use crate::models::post_model::Platform;
    use crate::tests::support::*;

    #[test]
    async fn approved_post_is_published_and_temp_file_removed() {
        let server = MockServer::start().await;
        mount_video(&server).await;

        Mock::given(method("POST"))
            .and(path("/v2/post/publish/video/init/"))
            .and(body_string_contains("SELF_ONLY"))
            .and(body_string_contains("Atardecer en la playa #viaje #playa"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": {
                    "publish_id": "v_pub_123",
                    "upload_url": format!("{}/tiktok-upload", server.uri())
                },
                "error": { "code": "ok", "message": "" }
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path("/tiktok-upload"))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;

        let ctx = setup(&server).await;
        let post = approved_post(&ctx, &server, &["tiktok"]).await;

        let outcome = ctx
            .publish_service
            .publish_post(&post.id, "k-1")
            .await
            .expect("publish");

        assert_eq!(
            outcome,
            PublishOutcome::Published {
                remote_posts: vec![RemotePost {
                    platform: Platform::Tiktok,
                    remote_id: "v_pub_123".to_string(),
                }]
            }
        );

        let stored = ctx.post_service.get_post(&post.id).await.unwrap();
        assert_eq!(stored.status, PostStatus::Published);
        assert!(stored.published_at.is_some());
        assert!(stored.error_detail.is_none());

        let stats = ctx.stager.stats().await.unwrap();
        assert_eq!(stats.total_files, 0, "el archivo temporal debe desaparecer");
    }

    #[test]
    async fn all_platforms_succeed_and_results_are_recorded() {
        let server = MockServer::start().await;
        mount_video(&server).await;
        mount_tiktok_ok(&server).await;
        mount_facebook_ok(&server).await;
        mount_instagram_ok(&server).await;
        // El contenedor nunca se publica
        Mock::given(path(format!("/{}/media_publish", INSTAGRAM_ACCOUNT)))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let ctx = setup(&server).await;
        let post = approved_post(&ctx, &server, &["tiktok", "facebook", "instagram"]).await;

        let outcome = ctx
            .publish_service
            .publish_post(&post.id, "k-all")
            .await
            .unwrap();
        assert!(matches!(outcome, PublishOutcome::Published { ref remote_posts } if remote_posts.len() == 3));

        let results = ctx.post_service.platform_results(&post.id).await.unwrap();
        assert_eq!(results.len(), 3);
        assert!(results.iter().all(|r| r.status == "published"));
        let facebook = results.iter().find(|r| r.platform == "facebook").unwrap();
        assert_eq!(facebook.remote_id.as_deref(), Some("fb_video_1"));
        let instagram = results.iter().find(|r| r.platform == "instagram").unwrap();
        assert_eq!(instagram.remote_id.as_deref(), Some("ig_container_1"));

        assert_eq!(
            ctx.post_service.get_post(&post.id).await.unwrap().status,
            PostStatus::Published
        );
    }

    #[test]
    async fn facebook_upload_is_unpublished_draft() {
        let server = MockServer::start().await;
        mount_video(&server).await;
        Mock::given(method("POST"))
            .and(path(format!("/{}/videos", FACEBOOK_PAGE)))
            .and(body_string_contains("name=\"published\"\r\n\r\nfalse"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({ "id": "fb_video_9" })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let ctx = setup(&server).await;
        let post = approved_post(&ctx, &server, &["facebook"]).await;

        let outcome = ctx.publish_service.publish_post(&post.id, "k-fb").await.unwrap();
        assert!(matches!(outcome, PublishOutcome::Published { .. }));
    }

    #[test]
    async fn fetch_404_fails_post_without_calling_platforms() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(VIDEO_PATH))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(path("/v2/post/publish/video/init/"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let ctx = setup(&server).await;
        let post = approved_post(&ctx, &server, &["tiktok"]).await;

        let outcome = ctx.publish_service.publish_post(&post.id, "k-404").await.unwrap();
        match outcome {
            PublishOutcome::Failed { error_detail } => {
                assert!(error_detail.starts_with("FetchError"), "{}", error_detail)
            }
            other => panic!("unexpected {:?}", other),
        }

        let stored = ctx.post_service.get_post(&post.id).await.unwrap();
        assert_eq!(stored.status, PostStatus::Failed);
        assert!(stored.error_detail.unwrap().contains("404"));
        assert_eq!(ctx.stager.stats().await.unwrap().total_files, 0);
    }

    #[test]
    async fn auth_error_is_terminal_and_token_is_redacted() {
        let server = MockServer::start().await;
        mount_video(&server).await;
        Mock::given(method("POST"))
            .and(path("/v2/post/publish/video/init/"))
            .respond_with(
                ResponseTemplate::new(401)
                    .set_body_string(format!("token {} has expired", TIKTOK_TOKEN)),
            )
            .expect(1)
            .mount(&server)
            .await;

        let ctx = setup(&server).await;
        let post = approved_post(&ctx, &server, &["tiktok"]).await;

        ctx.publish_service.publish_post(&post.id, "k-auth").await.unwrap();

        let stored = ctx.post_service.get_post(&post.id).await.unwrap();
        assert_eq!(stored.status, PostStatus::Failed);
        let detail = stored.error_detail.unwrap();
        assert!(detail.contains("AuthError"), "{}", detail);
        assert!(!detail.contains(TIKTOK_TOKEN));
        assert_eq!(ctx.stager.stats().await.unwrap().total_files, 0);
    }

    #[test]
    async fn missing_credentials_fail_as_auth_error() {
        let server = MockServer::start().await;
        mount_video(&server).await;

        let ctx = setup_with(&server, |config| config.facebook.access_token = None).await;
        assert!(!ctx.publish_service.publishers().get(Platform::Facebook).is_configured());
        let post = approved_post(&ctx, &server, &["facebook"]).await;

        ctx.publish_service.publish_post(&post.id, "k-nocreds").await.unwrap();

        let stored = ctx.post_service.get_post(&post.id).await.unwrap();
        assert_eq!(stored.status, PostStatus::Failed);
        assert!(stored.error_detail.unwrap().contains("reconnect the account"));
    }

    #[test]
    async fn rate_limit_is_recorded_with_retry_hint() {
        let server = MockServer::start().await;
        mount_video(&server).await;
        Mock::given(method("POST"))
            .and(path(format!("/{}/videos", FACEBOOK_PAGE)))
            .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "120"))
            .expect(1)
            .mount(&server)
            .await;

        let ctx = setup(&server).await;
        let post = approved_post(&ctx, &server, &["facebook"]).await;

        ctx.publish_service.publish_post(&post.id, "k-429").await.unwrap();

        let stored = ctx.post_service.get_post(&post.id).await.unwrap();
        assert_eq!(stored.status, PostStatus::Failed);
        let detail = stored.error_detail.unwrap();
        assert!(detail.contains("RateLimited"), "{}", detail);
        assert!(detail.contains("120s"), "{}", detail);
    }

    #[test]
    async fn partial_failure_keeps_successful_remote_ids() {
        let server = MockServer::start().await;
        mount_video(&server).await;
        mount_tiktok_ok(&server).await;
        Mock::given(method("POST"))
            .and(path(format!("/{}/videos", FACEBOOK_PAGE)))
            .respond_with(ResponseTemplate::new(500).set_body_string("upstream exploded"))
            .mount(&server)
            .await;

        let ctx = setup(&server).await;
        let post = approved_post(&ctx, &server, &["tiktok", "facebook"]).await;

        let outcome = ctx.publish_service.publish_post(&post.id, "k-partial").await.unwrap();
        match outcome {
            PublishOutcome::Failed { error_detail } => {
                assert!(error_detail.starts_with("facebook: RemoteError"), "{}", error_detail);
                assert!(!error_detail.contains("tiktok"));
            }
            other => panic!("unexpected {:?}", other),
        }

        let results = ctx.post_service.platform_results(&post.id).await.unwrap();
        let tiktok = results.iter().find(|r| r.platform == "tiktok").unwrap();
        assert_eq!(tiktok.status, "published");
        assert_eq!(tiktok.remote_id.as_deref(), Some("v_pub_123"));
        let facebook = results.iter().find(|r| r.platform == "facebook").unwrap();
        assert_eq!(facebook.status, "failed");
        assert!(facebook.remote_id.is_none());
    }

    #[test]
    async fn tiktok_body_error_code_is_classified() {
        let server = MockServer::start().await;
        mount_video(&server).await;
        Mock::given(method("POST"))
            .and(path("/v2/post/publish/video/init/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "error": { "code": "spam_risk_too_many_posts", "message": "slow down" }
            })))
            .mount(&server)
            .await;

        let ctx = setup(&server).await;
        let post = approved_post(&ctx, &server, &["tiktok"]).await;

        ctx.publish_service.publish_post(&post.id, "k-spam").await.unwrap();
        let detail = ctx
            .post_service
            .get_post(&post.id)
            .await
            .unwrap()
            .error_detail
            .unwrap();
        assert!(detail.contains("RateLimited"), "{}", detail);
    }

    #[test]
    async fn concurrent_triggers_publish_once() {
        let server = MockServer::start().await;
        mount_video(&server).await;
        mount_tiktok_ok(&server).await;

        let ctx = setup(&server).await;
        let post = approved_post(&ctx, &server, &["tiktok"]).await;

        let (a, b) = tokio::join!(
            ctx.publish_service.publish_post(&post.id, "k-a"),
            ctx.publish_service.publish_post(&post.id, "k-b"),
        );
        let outcomes = [a.unwrap(), b.unwrap()];

        let published = outcomes
            .iter()
            .filter(|o| matches!(o, PublishOutcome::Published { .. }))
            .count();
        let skipped = outcomes
            .iter()
            .filter(|o| matches!(o, PublishOutcome::Skipped { .. }))
            .count();
        assert_eq!((published, skipped), (1, 1));
        assert_eq!(requests_to(&server, "/v2/post/publish/video/init/").await, 1);
        assert_eq!(requests_to(&server, VIDEO_PATH).await, 1);
    }

    #[test]
    async fn finished_idempotency_key_is_skipped() {
        let server = MockServer::start().await;
        let ctx = setup(&server).await;
        let post = approved_post(&ctx, &server, &["tiktok"]).await;

        sqlx::query(
            "INSERT INTO publish_attempts (idempotency_key, post_id, started_at, finished_at, outcome) VALUES ('k-dup', ?1, '2025-01-01T00:00:00.000000Z', '2025-01-01T00:00:05.000000Z', 'failed')",
        )
        .bind(&post.id)
        .execute(&ctx.db_pool)
        .await
        .unwrap();

        let outcome = ctx.publish_service.publish_post(&post.id, "k-dup").await.unwrap();
        assert!(matches!(outcome, PublishOutcome::Skipped { .. }));
        assert_eq!(requests_to(&server, VIDEO_PATH).await, 0);
        assert_eq!(
            ctx.post_service.get_post(&post.id).await.unwrap().status,
            PostStatus::Approved
        );
    }

    #[test]
    async fn unfinished_idempotency_key_fails_post_without_republishing() {
        let server = MockServer::start().await;
        let ctx = setup(&server).await;
        let post = approved_post(&ctx, &server, &["tiktok"]).await;

        // Intento que arrancó y nunca cerró (el proceso murió a mitad)
        sqlx::query(
            "INSERT INTO publish_attempts (idempotency_key, post_id, started_at) VALUES ('k-crash', ?1, '2025-01-01T00:00:00.000000Z')",
        )
        .bind(&post.id)
        .execute(&ctx.db_pool)
        .await
        .unwrap();

        let outcome = ctx.publish_service.publish_post(&post.id, "k-crash").await.unwrap();
        assert_eq!(
            outcome,
            PublishOutcome::Failed {
                error_detail: INTERRUPTED_DETAIL.to_string()
            }
        );
        assert_eq!(requests_to(&server, VIDEO_PATH).await, 0);

        let stored = ctx.post_service.get_post(&post.id).await.unwrap();
        assert_eq!(stored.status, PostStatus::Failed);
        assert_eq!(stored.error_detail.as_deref(), Some(INTERRUPTED_DETAIL));

        let recorded: Option<String> =
            sqlx::query_scalar("SELECT outcome FROM publish_attempts WHERE idempotency_key = 'k-crash'")
                .fetch_one(&ctx.db_pool)
                .await
                .unwrap();
        assert_eq!(recorded.as_deref(), Some("failed"));
    }

    #[test]
    async fn database_failure_after_upload_does_not_publish_twice() {
        let server = MockServer::start().await;
        mount_video(&server).await;
        mount_tiktok_ok(&server).await;
        let ctx = setup(&server).await;
        let post = approved_post(&ctx, &server, &["tiktok"]).await;

        sqlx::query(
            "CREATE TRIGGER block_publish BEFORE UPDATE OF status ON posts WHEN NEW.status = 'published' BEGIN SELECT RAISE(ABORT, 'disk full'); END",
        )
        .execute(&ctx.db_pool)
        .await
        .unwrap();

        let err = ctx
            .publish_service
            .publish_post(&post.id, "k-db")
            .await
            .unwrap_err();
        assert!(matches!(err, PostError::Database(_)));
        assert_eq!(requests_to(&server, "/v2/post/publish/video/init/").await, 1);
        assert_eq!(
            ctx.post_service.get_post(&post.id).await.unwrap().status,
            PostStatus::Approved
        );
        assert_eq!(ctx.stager.stats().await.unwrap().total_files, 0);

        sqlx::query("DROP TRIGGER block_publish")
            .execute(&ctx.db_pool)
            .await
            .unwrap();

        // El reintento con la misma clave no vuelve a subir el video
        let outcome = ctx.publish_service.publish_post(&post.id, "k-db").await.unwrap();
        assert!(matches!(outcome, PublishOutcome::Failed { .. }));
        assert_eq!(requests_to(&server, "/v2/post/publish/video/init/").await, 1);
        assert_eq!(requests_to(&server, VIDEO_PATH).await, 1);
        assert_eq!(
            ctx.post_service.get_post(&post.id).await.unwrap().error_detail.as_deref(),
            Some(INTERRUPTED_DETAIL)
        );
    }

    #[test]
    async fn pending_post_is_not_published() {
        let server = MockServer::start().await;
        let ctx = setup(&server).await;
        let post = ctx
            .post_service
            .create_post(post_request(&server, &["tiktok"]))
            .await
            .unwrap();

        let outcome = ctx.publish_service.publish_post(&post.id, "k-early").await.unwrap();
        assert_eq!(
            outcome,
            PublishOutcome::Skipped {
                reason: "post is pending_approval".to_string()
            }
        );
        assert_eq!(requests_to(&server, VIDEO_PATH).await, 0);
    }

    #[test]
    async fn unknown_post_is_not_found() {
        let server = MockServer::start().await;
        let ctx = setup(&server).await;

        let err = ctx
            .publish_service
            .publish_post("missing", "k-missing")
            .await
            .unwrap_err();
        assert!(matches!(err, PostError::NotFound(_)));
    }
}
