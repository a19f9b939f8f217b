use hrm_auth::auth::users::{self, NewUser};
use hrm_auth::auth::RbacService;
use hrm_auth::{HrmError, TestApp};

fn new_user(email: &str, username: &str) -> NewUser {
    NewUser {
        email: email.to_string(),
        username: username.to_string(),
        password: "password-1".to_string(),
        role_id: None,
        email_verified: true,
    }
}

// ═══ Create user ═══

#[tokio::test]
async fn test_duplicate_email_is_conflict() {
    let app = TestApp::new().await;
    app.create_user("dup@x.com", "password-1", None).await;

    let err = users::create_user(&app.db, new_user(" DUP@x.com", "other"), 8)
        .await
        .unwrap_err();
    assert!(matches!(err, HrmError::Conflict(_)), "{:?}", err);
}

#[tokio::test]
async fn test_concurrent_creates_yield_one_conflict() {
    let app = TestApp::new().await;

    let (a, b) = tokio::join!(
        users::create_user(&app.db, new_user("race@x.com", "racer"), 8),
        users::create_user(&app.db, new_user("race@x.com", "racer"), 8),
    );

    let results = [a, b];
    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    let err = results.into_iter().find_map(Result::err).unwrap();
    assert!(matches!(err, HrmError::Conflict(_)), "{:?}", err);
    assert_eq!(err.status_code(), axum::http::StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_short_password_is_rejected() {
    let app = TestApp::new().await;
    let mut user = new_user("short@x.com", "short");
    user.password = "abc".to_string();

    let err = users::create_user(&app.db, user, 8).await.unwrap_err();
    assert!(matches!(err, HrmError::Validation(_)));
}

// ═══ Roles and permissions ═══

#[tokio::test]
async fn test_duplicate_role_and_permission_are_conflicts() {
    let app = TestApp::new().await;
    app.create_role("Manager").await;

    let err = RbacService::create_role(&app.db, "Manager", None)
        .await
        .unwrap_err();
    assert!(matches!(err, HrmError::Conflict(_)));

    RbacService::create_permission(&app.db, "PAYROLL", None)
        .await
        .unwrap();
    let err = RbacService::create_permission(&app.db, "PAYROLL", Some("again"))
        .await
        .unwrap_err();
    assert!(matches!(err, HrmError::Conflict(_)));
}
