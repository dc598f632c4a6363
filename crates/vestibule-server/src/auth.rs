use constant_time_eq::constant_time_eq;
use tracing::info;

use crate::session::{Session, UserData};

/// Answers whether the visitor behind a session is logged in.
pub trait AuthService: Send + Sync {
    fn logged_in(&self, session: &Session) -> bool;
}

/// A visitor is logged in as soon as the session carries a user. Second
/// factor state is judged separately by the gate.
#[derive(Debug, Clone, Copy, Default)]
pub struct SessionAuth;

impl AuthService for SessionAuth {
    fn logged_in(&self, session: &Session) -> bool {
        session.user.is_some()
    }
}

/// Single administrator account configured through the environment.
#[derive(Clone)]
pub struct StaticCredentials {
    pub username: String,
    pub password: String,
    /// When set, logins must be confirmed with this code.
    pub two_fa_code: Option<String>,
}

impl StaticCredentials {
    const USER_ID: u64 = 1;

    /// Log `username` into `session` if the password matches. Any previously
    /// pinned project is cleared.
    pub fn login(&self, session: &mut Session, username: &str, password: &str) -> bool {
        let user_ok = constant_time_eq(username.as_bytes(), self.username.as_bytes());
        let pass_ok = constant_time_eq(password.as_bytes(), self.password.as_bytes());
        if !(user_ok && pass_ok) {
            return false;
        }

        session.user = Some(UserData {
            id: Self::USER_ID,
            name: self.username.clone(),
            two_fa_enabled: self.two_fa_code.is_some(),
            two_fa_verified: false,
        });
        session.current_project = None;
        info!(user = %self.username, "audit: auth.login");
        true
    }

    /// Mark the second factor verified when `code` matches.
    pub fn verify_second_factor(&self, session: &mut Session, code: &str) -> bool {
        let Some(expected) = &self.two_fa_code else {
            return false;
        };
        let Some(user) = session.user.as_mut() else {
            return false;
        };
        if !constant_time_eq(code.as_bytes(), expected.as_bytes()) {
            return false;
        }
        user.two_fa_verified = true;
        info!(user = %user.name, "audit: twoFA.verify");
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn creds(two_fa_code: Option<&str>) -> StaticCredentials {
        StaticCredentials {
            username: "admin".into(),
            password: "hunter2".into(),
            two_fa_code: two_fa_code.map(str::to_owned),
        }
    }

    #[test]
    fn login_rejects_wrong_password() {
        let mut s = Session::default();
        assert!(!creds(None).login(&mut s, "admin", "nope"));
        assert!(!SessionAuth.logged_in(&s));
    }

    #[test]
    fn login_without_second_factor() {
        let mut s = Session {
            current_project: Some(3),
            ..Default::default()
        };
        assert!(creds(None).login(&mut s, "admin", "hunter2"));
        assert!(SessionAuth.logged_in(&s));
        assert!(!s.awaiting_second_factor());
        assert_eq!(s.current_project, None);
    }

    #[test]
    fn second_factor_flow() {
        let c = creds(Some("123456"));
        let mut s = Session::default();
        assert!(c.login(&mut s, "admin", "hunter2"));
        assert!(s.awaiting_second_factor());

        assert!(!c.verify_second_factor(&mut s, "000000"));
        assert!(s.awaiting_second_factor());

        assert!(c.verify_second_factor(&mut s, "123456"));
        assert!(!s.awaiting_second_factor());
    }

    #[test]
    fn verify_requires_logged_in_user() {
        let mut s = Session::default();
        assert!(!creds(Some("1")).verify_second_factor(&mut s, "1"));
    }
}
