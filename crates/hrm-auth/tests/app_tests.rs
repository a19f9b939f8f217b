use axum::routing::get;
use axum::Router;
use hrm_auth::{App, Config, TestApp};

// ═══ Router ═══

#[tokio::test]
async fn test_welcome_banner() {
    let app = TestApp::new().await;

    let res = app.client.get(&app.url("/")).await;
    assert_eq!(res.status, 200);
    assert_eq!(res.json()["service"], "hrm-auth");
    assert_eq!(res.json()["status"], "running");
}

#[tokio::test]
async fn test_openapi_document_is_served() {
    let app = TestApp::new().await;

    let res = app.client.get(&app.url("/api-docs/openapi.json")).await;
    assert_eq!(res.status, 200);
    let paths = &res.json()["paths"];
    assert!(paths.get("/api/auth/sign-in").is_some());
    assert!(paths.get("/api/auth/refresh-token").is_some());
}

#[tokio::test]
async fn test_unknown_route_is_404() {
    let app = TestApp::new().await;

    let res = app.client.get(&app.url("/api/nope")).await;
    assert_eq!(res.status, 404);
}

#[tokio::test]
async fn test_custom_routes_are_merged() {
    let app = TestApp::with_routes(Config::for_tests(), |_| {
        Router::new().route("/health", get(|| async { "healthy" }))
    })
    .await;

    let res = app.client.get(&app.url("/health")).await;
    assert_eq!(res.status, 200);
    assert_eq!(res.body, "healthy");
}

// ═══ Database commands ═══

#[tokio::test]
async fn test_db_command_flags() {
    let app = App::with_config(Config::for_tests()).await.unwrap();

    let ran = App::run_db_command(&app.db, &["hrm-auth".to_string()])
        .await
        .unwrap();
    assert!(!ran);

    let ran = App::run_db_command(&app.db, &["hrm-auth".to_string(), "--migrate".to_string()])
        .await
        .unwrap();
    assert!(ran);
}
