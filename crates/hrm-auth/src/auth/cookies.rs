use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};

use crate::config::Config;

pub const ACCESS_TOKEN_COOKIE: &str = "access_token";
pub const REFRESH_TOKEN_COOKIE: &str = "refresh_token";
pub const SESSION_ID_COOKIE: &str = "session_id";

const AUTH_COOKIES: [&str; 3] = [ACCESS_TOKEN_COOKIE, REFRESH_TOKEN_COOKIE, SESSION_ID_COOKIE];

fn build(name: &'static str, value: String, max_age_secs: i64, secure: bool) -> Cookie<'static> {
    Cookie::build((name, value))
        .http_only(true)
        .same_site(SameSite::Lax)
        .path("/")
        .secure(secure)
        .max_age(time::Duration::seconds(max_age_secs))
        .build()
}

/// Add the `access_token` cookie.
pub fn set_access_cookie(jar: CookieJar, config: &Config, token: &str) -> CookieJar {
    jar.add(build(
        ACCESS_TOKEN_COOKIE,
        token.to_string(),
        config.jwt_expires_in_secs,
        config.is_production(),
    ))
}

/// Add the `session_id` cookie.
pub fn set_session_cookie(jar: CookieJar, config: &Config, session_id: &str) -> CookieJar {
    jar.add(build(
        SESSION_ID_COOKIE,
        session_id.to_string(),
        config.refresh_token_expires_in_secs,
        config.is_production(),
    ))
}

/// Add all three auth cookies after a sign-in.
pub fn set_auth_cookies(
    jar: CookieJar,
    config: &Config,
    access_token: &str,
    refresh_token: &str,
    session_id: &str,
) -> CookieJar {
    let jar = set_access_cookie(jar, config, access_token);
    let jar = jar.add(build(
        REFRESH_TOKEN_COOKIE,
        refresh_token.to_string(),
        config.refresh_token_expires_in_secs,
        config.is_production(),
    ));
    set_session_cookie(jar, config, session_id)
}

/// Emit removal cookies for every auth cookie.
pub fn clear_auth_cookies(mut jar: CookieJar) -> CookieJar {
    for name in AUTH_COOKIES {
        jar = jar.remove(Cookie::build(name).path("/").build());
    }
    jar
}

pub fn access_token(jar: &CookieJar) -> Option<String> {
    cookie_value(jar, ACCESS_TOKEN_COOKIE)
}

pub fn refresh_token(jar: &CookieJar) -> Option<String> {
    cookie_value(jar, REFRESH_TOKEN_COOKIE)
}

pub fn session_id(jar: &CookieJar) -> Option<String> {
    cookie_value(jar, SESSION_ID_COOKIE)
}

fn cookie_value(jar: &CookieJar, name: &str) -> Option<String> {
    jar.get(name)
        .map(|c| c.value().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_cookies_are_http_only_and_lax() {
        let config = Config::for_tests();
        let jar = set_auth_cookies(CookieJar::new(), &config, "a", "r", "s");

        let access = jar.get(ACCESS_TOKEN_COOKIE).unwrap();
        assert_eq!(access.value(), "a");
        assert_eq!(access.http_only(), Some(true));
        assert_eq!(access.same_site(), Some(SameSite::Lax));
        assert_eq!(access.path(), Some("/"));
        assert_eq!(
            access.max_age(),
            Some(time::Duration::seconds(config.jwt_expires_in_secs))
        );
        assert_ne!(access.secure(), Some(true));

        let refresh = jar.get(REFRESH_TOKEN_COOKIE).unwrap();
        assert_eq!(
            refresh.max_age(),
            Some(time::Duration::seconds(config.refresh_token_expires_in_secs))
        );
        assert_eq!(session_id(&jar).as_deref(), Some("s"));
    }

    #[test]
    fn production_cookies_are_secure() {
        let mut config = Config::for_tests();
        config.environment = "production".to_string();
        let jar = set_access_cookie(CookieJar::new(), &config, "a");
        assert_eq!(jar.get(ACCESS_TOKEN_COOKIE).unwrap().secure(), Some(true));
    }

    #[test]
    fn clearing_removes_all_three() {
        let config = Config::for_tests();
        let jar = set_auth_cookies(CookieJar::new(), &config, "a", "r", "s");
        let jar = clear_auth_cookies(jar);
        assert!(access_token(&jar).is_none());
        assert!(refresh_token(&jar).is_none());
        assert!(session_id(&jar).is_none());
    }
}
