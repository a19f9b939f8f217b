use chrono::{Duration, Utc};
use hrm_auth::auth::lockout;
use hrm_auth::models::user;
use hrm_auth::TestApp;
use sea_orm::sea_query::Expr;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};

const PASSWORD: &str = "correct-horse";

// ═══ Success ═══

#[tokio::test]
async fn test_sign_in_sets_cookies_and_returns_tokens() {
    let app = TestApp::new().await;
    let user = app.create_user("alice@x.com", PASSWORD, None).await;

    let res = app.sign_in("alice@x.com", PASSWORD).await;
    assert_eq!(res.status, 200, "{}", res.body);

    let data = res.data();
    assert!(data["access_token"].as_str().is_some());
    assert!(data["refresh_token"].as_str().is_some());
    assert_eq!(data["session_id"].as_str().map(str::len), Some(32));
    assert_eq!(data["expires_in"], 1800);
    assert_eq!(data["user"]["email"], "alice@x.com");
    assert!(data["user"].get("password_hash").is_none());

    assert_eq!(res.cookie("access_token").as_deref(), data["access_token"].as_str());
    assert_eq!(res.cookie("session_id").as_deref(), data["session_id"].as_str());
    let raw = res.set_cookie("refresh_token").unwrap();
    assert!(raw.contains("HttpOnly"));
    assert!(raw.contains("SameSite=Lax"));
    assert!(raw.contains("Path=/"));

    let reloaded = app.reload_user(user.id).await;
    assert!(reloaded.last_login.is_some());
}

#[tokio::test]
async fn test_sign_in_normalizes_email() {
    let app = TestApp::new().await;
    app.create_user("bob@x.com", PASSWORD, None).await;

    let res = app.sign_in("  BOB@X.com ", PASSWORD).await;
    assert_eq!(res.status, 200, "{}", res.body);
}

#[tokio::test]
async fn test_each_sign_in_opens_its_own_session() {
    let app = TestApp::new().await;
    app.create_user("multi@x.com", PASSWORD, None).await;

    let first = app.sign_in("multi@x.com", PASSWORD).await;
    let second = app.sign_in("multi@x.com", PASSWORD).await;
    assert_ne!(first.data()["session_id"], second.data()["session_id"]);
}

// ═══ Input validation ═══

#[tokio::test]
async fn test_blank_fields_are_validation_errors() {
    let app = TestApp::new().await;

    let res = app.sign_in("", PASSWORD).await;
    assert_eq!(res.status, 400);
    assert_eq!(res.error()["code"], "VALIDATION_ERROR");

    let res = app.sign_in("a@x.com", "").await;
    assert_eq!(res.status, 400);
}

// ═══ Rejections ═══

#[tokio::test]
async fn test_unknown_email_is_generic() {
    let app = TestApp::new().await;

    let res = app.sign_in("ghost@x.com", PASSWORD).await;
    assert_eq!(res.status, 401);
    let error = res.error();
    assert_eq!(error["code"], "INVALID_CREDENTIALS");
    assert_eq!(error["message"], "Invalid email or password");
    assert!(error.get("remaining_attempts").is_none());
}

#[tokio::test]
async fn test_wrong_password_reports_remaining_attempts() {
    let app = TestApp::new().await;
    let user = app.create_user("carol@x.com", PASSWORD, None).await;

    let res = app.sign_in("carol@x.com", "wrong-password").await;
    assert_eq!(res.status, 401);
    assert_eq!(res.error()["message"], "Invalid email or password");
    assert_eq!(res.error()["remaining_attempts"], 4);
    assert_eq!(res.error()["account_locked"], false);

    assert_eq!(app.reload_user(user.id).await.failed_login_attempts, 1);
}

#[tokio::test]
async fn test_deactivated_user_has_no_lockout_fields() {
    let app = TestApp::new().await;
    let user = app.create_user("dave@x.com", PASSWORD, None).await;
    hrm_auth::auth::users::set_active(&app.db, user.id, false)
        .await
        .unwrap();

    let res = app.sign_in("dave@x.com", PASSWORD).await;
    assert_eq!(res.status, 403);
    let error = res.error();
    assert_eq!(error["message"], "Account is deactivated");
    assert!(error.get("account_locked").is_none());
    assert!(error.get("remaining_attempts").is_none());
    assert!(error.get("locked_until").is_none());
}

#[tokio::test]
async fn test_unverified_email_rejected_when_required() {
    let mut config = hrm_auth::Config::for_tests();
    config.security.require_email_verification = true;
    let app = TestApp::with_config(config).await;
    let user = app.create_user("erin@x.com", PASSWORD, None).await;
    user::Entity::update_many()
        .col_expr(user::Column::EmailVerified, Expr::value(false))
        .filter(user::Column::Id.eq(user.id))
        .exec(&app.db)
        .await
        .unwrap();

    let res = app.sign_in("erin@x.com", PASSWORD).await;
    assert_eq!(res.status, 403);
    assert_eq!(res.error()["code"], "EMAIL_NOT_VERIFIED");
    assert_eq!(res.error()["email_verification_required"], true);
}

// ═══ Lockout ═══

#[tokio::test]
async fn test_five_failures_lock_even_the_correct_password() {
    let app = TestApp::new().await;
    let user = app.create_user("frank@x.com", PASSWORD, None).await;

    for expected_remaining in [4, 3, 2, 1] {
        let res = app.sign_in("frank@x.com", "nope-nope").await;
        assert_eq!(res.status, 401);
        assert_eq!(res.error()["remaining_attempts"], expected_remaining);
    }

    let fifth = app.sign_in("frank@x.com", "nope-nope").await;
    assert_eq!(fifth.status, 423);
    assert_eq!(fifth.error()["account_locked"], true);
    assert_eq!(fifth.error()["remaining_attempts"], 0);

    let sixth = app.sign_in("frank@x.com", PASSWORD).await;
    assert_eq!(sixth.status, 423);
    assert_eq!(sixth.error()["code"], "ACCOUNT_LOCKED");
    assert_eq!(
        sixth.error()["message"],
        "Account is locked. Try again in 30 minute(s)."
    );
    assert!(sixth.error()["locked_until"].as_str().is_some());

    // The locked attempt did not count.
    assert_eq!(app.reload_user(user.id).await.failed_login_attempts, 5);
}

#[tokio::test]
async fn test_fourth_failure_plus_one_locks() {
    let app = TestApp::new().await;
    let user = app.create_user("gina@x.com", PASSWORD, None).await;
    app.set_failed_attempts(user.id, 4).await;

    let res = app.sign_in("gina@x.com", "wrong-password").await;
    assert_eq!(res.status, 423);
    assert_eq!(res.error()["account_locked"], true);
    assert_eq!(res.error()["remaining_attempts"], 0);

    let reloaded = app.reload_user(user.id).await;
    let until = reloaded.account_locked_until.expect("lock set");
    let window = until - Utc::now().naive_utc();
    assert!(window > Duration::minutes(29) && window <= Duration::minutes(30));
}

#[tokio::test]
async fn test_expired_lock_starts_a_fresh_window() {
    let app = TestApp::new().await;
    let user = app.create_user("hank@x.com", PASSWORD, None).await;
    app.set_failed_attempts(user.id, 5).await;
    user::Entity::update_many()
        .col_expr(
            user::Column::AccountLockedUntil,
            Expr::value(Some(Utc::now().naive_utc() - Duration::minutes(1))),
        )
        .filter(user::Column::Id.eq(user.id))
        .exec(&app.db)
        .await
        .unwrap();

    let res = app.sign_in("hank@x.com", "wrong-password").await;
    assert_eq!(res.status, 401);
    assert_eq!(res.error()["remaining_attempts"], 4);

    let res = app.sign_in("hank@x.com", PASSWORD).await;
    assert_eq!(res.status, 200, "{}", res.body);
    let reloaded = app.reload_user(user.id).await;
    assert_eq!(reloaded.failed_login_attempts, 0);
    assert!(reloaded.account_locked_until.is_none());
}

#[tokio::test]
async fn test_success_resets_counter() {
    let app = TestApp::new().await;
    let user = app.create_user("ivy@x.com", PASSWORD, None).await;
    app.set_failed_attempts(user.id, 3).await;

    let res = app.sign_in("ivy@x.com", PASSWORD).await;
    assert_eq!(res.status, 200);
    assert_eq!(app.reload_user(user.id).await.failed_login_attempts, 0);
}

#[tokio::test]
async fn test_concurrent_failures_are_all_counted() {
    let app = TestApp::new().await;
    let user = app.create_user("jack@x.com", PASSWORD, None).await;

    let (a, b, c) = tokio::join!(
        app.sign_in("jack@x.com", "bad-1"),
        app.sign_in("jack@x.com", "bad-2"),
        app.sign_in("jack@x.com", "bad-3"),
    );
    for res in [&a, &b, &c] {
        assert_eq!(res.status, 401);
    }

    assert_eq!(app.reload_user(user.id).await.failed_login_attempts, 3);
}

#[tokio::test]
async fn test_lapsed_lock_is_cleared_only_once() {
    let app = TestApp::new().await;
    let user = app.create_user("kim@x.com", PASSWORD, None).await;
    app.set_failed_attempts(user.id, 5).await;
    let now = Utc::now().naive_utc();
    user::Entity::update_many()
        .col_expr(
            user::Column::AccountLockedUntil,
            Expr::value(Some(now - Duration::minutes(1))),
        )
        .filter(user::Column::Id.eq(user.id))
        .exec(&app.db)
        .await
        .unwrap();

    assert!(lockout::clear_lapsed_lock(&app.db, user.id, now).await.unwrap());
    assert_eq!(app.reload_user(user.id).await.failed_login_attempts, 0);

    // A failure lands in the new window before a slower request gets to reset.
    app.set_failed_attempts(user.id, 1).await;
    assert!(!lockout::clear_lapsed_lock(&app.db, user.id, now).await.unwrap());
    assert_eq!(app.reload_user(user.id).await.failed_login_attempts, 1);
}

#[tokio::test]
async fn test_concurrent_failures_after_lapsed_lock_are_all_counted() {
    let app = TestApp::new().await;
    let user = app.create_user("lee@x.com", PASSWORD, None).await;
    app.set_failed_attempts(user.id, 5).await;
    user::Entity::update_many()
        .col_expr(
            user::Column::AccountLockedUntil,
            Expr::value(Some(Utc::now().naive_utc() - Duration::minutes(1))),
        )
        .filter(user::Column::Id.eq(user.id))
        .exec(&app.db)
        .await
        .unwrap();

    let (a, b, c) = tokio::join!(
        app.sign_in("lee@x.com", "bad-1"),
        app.sign_in("lee@x.com", "bad-2"),
        app.sign_in("lee@x.com", "bad-3"),
    );
    for res in [&a, &b, &c] {
        assert_eq!(res.status, 401, "{}", res.body);
    }

    let reloaded = app.reload_user(user.id).await;
    assert_eq!(reloaded.failed_login_attempts, 3);
    assert!(reloaded.account_locked_until.is_none());
}
