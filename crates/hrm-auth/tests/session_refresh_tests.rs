use chrono::{Duration, Utc};
use hrm_auth::auth::{session, users, TokenIssuer};
use hrm_auth::models::session as session_model;
use hrm_auth::{TestApp, TestResponse};
use sea_orm::sea_query::Expr;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};

const PASSWORD: &str = "correct-horse";

async fn signed_in(app: &TestApp, email: &str) -> TestResponse {
    app.create_user(email, PASSWORD, None).await;
    let res = app.sign_in(email, PASSWORD).await;
    assert_eq!(res.status, 200, "{}", res.body);
    res
}

fn expired_access_token(app: &TestApp, user_id: i32) -> String {
    let issuer = TokenIssuer::new(
        &app.config.jwt_secret,
        &app.config.refresh_token_secret,
        Duration::seconds(-60),
        Duration::days(7),
    );
    let user = detached_user(user_id);
    issuer.generate_access_token(&user, None).unwrap()
}

// Only id and email feed the access claims.
fn detached_user(user_id: i32) -> hrm_auth::models::user::Model {
    let now = Utc::now().naive_utc();
    hrm_auth::models::user::Model {
        id: user_id,
        email: "expired@x.com".to_string(),
        username: "expired".to_string(),
        password_hash: String::new(),
        role_id: None,
        is_active: true,
        email_verified: true,
        failed_login_attempts: 0,
        account_locked_until: None,
        last_login: None,
        password_changed_at: None,
        created_at: now,
        updated_at: now,
    }
}

fn refresh_cookies(res: &TestResponse) -> String {
    format!(
        "refresh_token={}; session_id={}",
        res.cookie("refresh_token").unwrap(),
        res.cookie("session_id").unwrap()
    )
}

async fn expire_session(app: &TestApp, session_id: &str) {
    session_model::Entity::update_many()
        .col_expr(
            session_model::Column::ExpiresAt,
            Expr::value(Utc::now().naive_utc() - Duration::minutes(1)),
        )
        .filter(session_model::Column::SessionId.eq(session_id))
        .exec(&app.db)
        .await
        .unwrap();
}

// ═══ Middleware: access token ═══

#[tokio::test]
async fn test_access_cookie_authenticates() {
    let app = TestApp::new().await;
    let login = signed_in(&app, "a@x.com").await;

    let res = app
        .client
        .get_with_cookies(&app.url("/api/auth/me"), &login.auth_cookie_header())
        .await;
    assert_eq!(res.status, 200, "{}", res.body);
    assert_eq!(res.data()["user"]["email"], "a@x.com");
    // No refresh needed, so no cookies are rewritten.
    assert!(res.set_cookie("access_token").is_none());
}

#[tokio::test]
async fn test_bearer_token_authenticates() {
    let app = TestApp::new().await;
    let login = signed_in(&app, "b@x.com").await;
    let token = login.data()["access_token"].as_str().unwrap().to_string();

    let res = app
        .client
        .get_with_auth(&app.url("/api/auth/me"), &token)
        .await;
    assert_eq!(res.status, 200);
    assert_eq!(res.data()["user"]["email"], "b@x.com");
}

#[tokio::test]
async fn test_no_credentials_is_401() {
    let app = TestApp::new().await;

    let res = app.client.get(&app.url("/api/auth/me")).await;
    assert_eq!(res.status, 401);
    assert_eq!(res.error()["message"], "Access token required");
}

#[tokio::test]
async fn test_bad_access_token_without_refresh_is_403() {
    let app = TestApp::new().await;

    let res = app
        .client
        .get_with_cookies(&app.url("/api/auth/me"), "access_token=garbage")
        .await;
    assert_eq!(res.status, 403);
    assert_eq!(res.error()["message"], "Invalid or expired token");
    assert!(res.cookie_cleared("access_token"));
}

// ═══ Middleware: silent refresh ═══

#[tokio::test]
async fn test_expired_access_token_is_refreshed_silently() {
    let app = TestApp::new().await;
    let login = signed_in(&app, "c@x.com").await;
    let user_id = login.data()["user"]["id"].as_i64().unwrap() as i32;

    let cookies = format!(
        "access_token={}; {}",
        expired_access_token(&app, user_id),
        refresh_cookies(&login)
    );
    let res = app
        .client
        .get_with_cookies(&app.url("/api/auth/me"), &cookies)
        .await;
    assert_eq!(res.status, 200, "{}", res.body);
    assert_eq!(res.data()["user"]["id"], user_id);

    let fresh = res.cookie("access_token").expect("new access cookie");
    assert!(app.state.issuer.verify_access_token(&fresh).is_ok());
    assert_eq!(res.cookie("session_id"), login.cookie("session_id"));
}

#[tokio::test]
async fn test_refresh_without_access_token() {
    let app = TestApp::new().await;
    let login = signed_in(&app, "d@x.com").await;

    let res = app
        .client
        .get_with_cookies(&app.url("/api/auth/me"), &refresh_cookies(&login))
        .await;
    assert_eq!(res.status, 200, "{}", res.body);
    assert!(res.cookie("access_token").is_some());
}

#[tokio::test]
async fn test_refresh_updates_last_activity() {
    let app = TestApp::new().await;
    let login = signed_in(&app, "e@x.com").await;
    let session_id = login.cookie("session_id").unwrap();

    let stale = Utc::now().naive_utc() - Duration::hours(1);
    session_model::Entity::update_many()
        .col_expr(session_model::Column::LastActivity, Expr::value(stale))
        .filter(session_model::Column::SessionId.eq(session_id.as_str()))
        .exec(&app.db)
        .await
        .unwrap();

    let res = app
        .client
        .get_with_cookies(&app.url("/api/auth/me"), &refresh_cookies(&login))
        .await;
    assert_eq!(res.status, 200);

    let row = session_model::Entity::find_by_id(session_id)
        .one(&app.db)
        .await
        .unwrap()
        .unwrap();
    assert!(row.last_activity > stale);
}

#[tokio::test]
async fn test_inactive_session_is_401_and_clears_cookies() {
    let app = TestApp::new().await;
    let login = signed_in(&app, "f@x.com").await;
    let session_id = login.cookie("session_id").unwrap();
    session::deactivate_session(&app.db, &session_id).await.unwrap();

    let res = app
        .client
        .get_with_cookies(&app.url("/api/auth/me"), &refresh_cookies(&login))
        .await;
    assert_eq!(res.status, 401);
    assert_eq!(res.error()["message"], "Session expired, please sign in again");
    assert!(res.cookie_cleared("refresh_token"));
    assert!(res.cookie_cleared("session_id"));
}

#[tokio::test]
async fn test_expired_session_is_rejected_even_if_active() {
    let app = TestApp::new().await;
    let login = signed_in(&app, "g@x.com").await;
    expire_session(&app, &login.cookie("session_id").unwrap()).await;

    let res = app
        .client
        .get_with_cookies(&app.url("/api/auth/me"), &refresh_cookies(&login))
        .await;
    assert_eq!(res.status, 401);
}

#[tokio::test]
async fn test_bad_access_and_dead_session_is_403() {
    let app = TestApp::new().await;
    let login = signed_in(&app, "h@x.com").await;
    session::deactivate_session(&app.db, &login.cookie("session_id").unwrap())
        .await
        .unwrap();

    let cookies = format!("access_token=garbage; {}", refresh_cookies(&login));
    let res = app
        .client
        .get_with_cookies(&app.url("/api/auth/me"), &cookies)
        .await;
    assert_eq!(res.status, 403);
    assert!(res.cookie_cleared("access_token"));
}

#[tokio::test]
async fn test_mismatched_session_id_is_rejected() {
    let app = TestApp::new().await;
    let first = signed_in(&app, "i@x.com").await;
    let second = app.sign_in("i@x.com", PASSWORD).await;

    let cookies = format!(
        "refresh_token={}; session_id={}",
        first.cookie("refresh_token").unwrap(),
        second.cookie("session_id").unwrap()
    );
    let res = app
        .client
        .get_with_cookies(&app.url("/api/auth/me"), &cookies)
        .await;
    assert_eq!(res.status, 401);
}

#[tokio::test]
async fn test_concurrent_refreshes_all_succeed() {
    let app = TestApp::new().await;
    let login = signed_in(&app, "j@x.com").await;
    let cookies = refresh_cookies(&login);
    let url = app.url("/api/auth/me");

    let (a, b) = tokio::join!(
        app.client.get_with_cookies(&url, &cookies),
        app.client.get_with_cookies(&url, &cookies),
    );
    assert_eq!(a.status, 200, "{}", a.body);
    assert_eq!(b.status, 200, "{}", b.body);
}

#[tokio::test]
async fn test_refresh_fails_for_deactivated_user() {
    let app = TestApp::new().await;
    let login = signed_in(&app, "k@x.com").await;
    let user_id = login.data()["user"]["id"].as_i64().unwrap() as i32;

    // Reactivating restores the account but not the revoked sessions.
    users::set_active(&app.db, user_id, false).await.unwrap();
    users::set_active(&app.db, user_id, true).await.unwrap();

    let res = app
        .client
        .get_with_cookies(&app.url("/api/auth/me"), &refresh_cookies(&login))
        .await;
    assert_eq!(res.status, 401);
}

// ═══ /refresh-token ═══

#[tokio::test]
async fn test_refresh_endpoint_with_cookies() {
    let app = TestApp::new().await;
    let login = signed_in(&app, "l@x.com").await;

    let res = app
        .client
        .post_with_cookies(
            &app.url("/api/auth/refresh-token"),
            &refresh_cookies(&login),
            "",
        )
        .await;
    assert_eq!(res.status, 200, "{}", res.body);
    let token = res.data()["access_token"].as_str().unwrap().to_string();
    assert_eq!(res.cookie("access_token").as_deref(), Some(token.as_str()));
    assert!(res.data()["expires_at"].as_str().is_some());
}

#[tokio::test]
async fn test_refresh_endpoint_with_body() {
    let app = TestApp::new().await;
    let login = signed_in(&app, "m@x.com").await;
    let body = serde_json::json!({
        "refresh_token": login.data()["refresh_token"],
        "session_id": login.data()["session_id"],
    });

    let res = app
        .client
        .post(&app.url("/api/auth/refresh-token"), &body.to_string())
        .await;
    assert_eq!(res.status, 200, "{}", res.body);

    // Not single-use: the same pair works again.
    let again = app
        .client
        .post(&app.url("/api/auth/refresh-token"), &body.to_string())
        .await;
    assert_eq!(again.status, 200);
}

#[tokio::test]
async fn test_refresh_endpoint_requires_pair() {
    let app = TestApp::new().await;

    let res = app
        .client
        .post(&app.url("/api/auth/refresh-token"), "")
        .await;
    assert_eq!(res.status, 401);
}

#[tokio::test]
async fn test_refresh_endpoint_rejects_expired_session() {
    let app = TestApp::new().await;
    let login = signed_in(&app, "n@x.com").await;
    expire_session(&app, &login.cookie("session_id").unwrap()).await;

    let res = app
        .client
        .post_with_cookies(
            &app.url("/api/auth/refresh-token"),
            &refresh_cookies(&login),
            "",
        )
        .await;
    assert_eq!(res.status, 401);
    assert_eq!(res.error()["message"], "Invalid or expired refresh session");
    assert!(res.cookie_cleared("refresh_token"));
}

// ═══ Logout ═══

#[tokio::test]
async fn test_logout_ends_the_session() {
    let app = TestApp::new().await;
    let login = signed_in(&app, "o@x.com").await;

    let res = app
        .client
        .post_with_cookies(
            &app.url("/api/auth/logout"),
            &login.auth_cookie_header(),
            "",
        )
        .await;
    assert_eq!(res.status, 200);
    assert_eq!(res.data()["sessions_revoked"], 1);
    assert!(res.cookie_cleared("access_token"));
    assert!(res.cookie_cleared("refresh_token"));
    assert!(res.cookie_cleared("session_id"));

    let after = app
        .client
        .get_with_cookies(&app.url("/api/auth/me"), &refresh_cookies(&login))
        .await;
    assert_eq!(after.status, 401);
}

#[tokio::test]
async fn test_logout_without_session_still_succeeds() {
    let app = TestApp::new().await;

    let res = app.client.post(&app.url("/api/auth/logout"), "").await;
    assert_eq!(res.status, 200);
    assert_eq!(res.data()["sessions_revoked"], 0);
}

#[tokio::test]
async fn test_logout_all_ends_every_session() {
    let app = TestApp::new().await;
    let first = signed_in(&app, "p@x.com").await;
    let second = app.sign_in("p@x.com", PASSWORD).await;

    let res = app
        .client
        .post_with_cookies(
            &app.url("/api/auth/logout-all"),
            &first.auth_cookie_header(),
            "",
        )
        .await;
    assert_eq!(res.status, 200, "{}", res.body);
    assert_eq!(res.data()["sessions_revoked"], 2);

    let other = app
        .client
        .post_with_cookies(
            &app.url("/api/auth/refresh-token"),
            &refresh_cookies(&second),
            "",
        )
        .await;
    assert_eq!(other.status, 401);
}

#[tokio::test]
async fn test_logout_all_with_expired_access_token_leaves_no_live_cookie() {
    let app = TestApp::new().await;
    let login = signed_in(&app, "p2@x.com").await;
    let user_id = login.data()["user"]["id"].as_i64().unwrap() as i32;
    let cookies = format!(
        "access_token={}; {}",
        expired_access_token(&app, user_id),
        refresh_cookies(&login)
    );

    let res = app
        .client
        .post_with_cookies(&app.url("/api/auth/logout-all"), &cookies, "")
        .await;
    assert_eq!(res.status, 200, "{}", res.body);
    assert_eq!(res.data()["sessions_revoked"], 1);

    for name in ["access_token", "refresh_token", "session_id"] {
        let headers = res.set_cookies(name);
        assert!(!headers.is_empty(), "{} not cleared", name);
        for raw in headers {
            assert!(raw.contains("Max-Age=0"), "live cookie left behind: {}", raw);
        }
    }
}

// ═══ Change password ═══

#[tokio::test]
async fn test_change_password_revokes_sessions() {
    let app = TestApp::new().await;
    let login = signed_in(&app, "q@x.com").await;
    let body = serde_json::json!({
        "current_password": PASSWORD,
        "new_password": "battery-staple",
    });

    let res = app
        .client
        .post_with_cookies(
            &app.url("/api/auth/change-password"),
            &login.auth_cookie_header(),
            &body.to_string(),
        )
        .await;
    assert_eq!(res.status, 200, "{}", res.body);
    assert_eq!(res.data()["sessions_revoked"], 1);

    assert_eq!(app.sign_in("q@x.com", PASSWORD).await.status, 401);
    assert_eq!(app.sign_in("q@x.com", "battery-staple").await.status, 200);
}

#[tokio::test]
async fn test_change_password_after_silent_refresh_clears_every_cookie() {
    let app = TestApp::new().await;
    let login = signed_in(&app, "q2@x.com").await;
    let user_id = login.data()["user"]["id"].as_i64().unwrap() as i32;
    let cookies = format!(
        "access_token={}; {}",
        expired_access_token(&app, user_id),
        refresh_cookies(&login)
    );
    let body = serde_json::json!({
        "current_password": PASSWORD,
        "new_password": "battery-staple",
    });

    let res = app
        .client
        .post_with_cookies(
            &app.url("/api/auth/change-password"),
            &cookies,
            &body.to_string(),
        )
        .await;
    assert_eq!(res.status, 200, "{}", res.body);
    for raw in res
        .set_cookies("access_token")
        .into_iter()
        .chain(res.set_cookies("session_id"))
    {
        assert!(raw.contains("Max-Age=0"), "live cookie left behind: {}", raw);
    }
}

#[tokio::test]
async fn test_change_password_checks_current() {
    let app = TestApp::new().await;
    let login = signed_in(&app, "r@x.com").await;
    let body = serde_json::json!({
        "current_password": "not-it",
        "new_password": "battery-staple",
    });

    let res = app
        .client
        .post_with_cookies(
            &app.url("/api/auth/change-password"),
            &login.auth_cookie_header(),
            &body.to_string(),
        )
        .await;
    assert_eq!(res.status, 401);
    assert_eq!(res.error()["message"], "Current password is incorrect");
}

#[tokio::test]
async fn test_change_password_enforces_length() {
    let app = TestApp::new().await;
    let login = signed_in(&app, "s@x.com").await;
    let body = serde_json::json!({
        "current_password": PASSWORD,
        "new_password": "short",
    });

    let res = app
        .client
        .post_with_cookies(
            &app.url("/api/auth/change-password"),
            &login.auth_cookie_header(),
            &body.to_string(),
        )
        .await;
    assert_eq!(res.status, 400);
}
