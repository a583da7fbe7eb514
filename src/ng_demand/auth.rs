// ng_demand - Natural gas demand index from api.weather.gov forecasts
//
// Copyright 2022 Nick Pillitteri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.
//

use chrono::{DateTime, Duration, Utc};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::error;
use std::fmt;
use std::fs;
use std::io;
use std::path::Path;

const SALT_SEPARATOR: char = '$';

#[derive(Debug)]
pub enum AuthError {
    /// Unknown user or wrong password; deliberately indistinguishable.
    InvalidCredentials,
    Io(io::Error),
    Parse(serde_json::Error),
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidCredentials => write!(f, "invalid credentials"),
            Self::Io(e) => write!(f, "unable to read user table: {}", e),
            Self::Parse(e) => write!(f, "unable to parse user table: {}", e),
        }
    }
}

impl error::Error for AuthError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Parse(e) => Some(e),
            _ => None,
        }
    }
}

/// Lowercase hex SHA-256 of `salt` followed by `password`.
pub fn hash_password(salt: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(password.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Allow-list of usernames and stored password hashes.
///
/// A stored hash is either the bare hex digest of the password or `salt$digest`
/// where the digest covers the salt followed by the password.
#[derive(Debug, Clone, Default)]
pub struct UserTable {
    users: HashMap<String, String>,
}

impl UserTable {
    pub fn new(users: HashMap<String, String>) -> Self {
        UserTable { users }
    }

    /// Load a JSON object mapping usernames to stored hashes.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, AuthError> {
        let contents = fs::read_to_string(path).map_err(AuthError::Io)?;
        Self::from_json(&contents)
    }

    pub fn from_json(contents: &str) -> Result<Self, AuthError> {
        let users: HashMap<String, String> = serde_json::from_str(contents).map_err(AuthError::Parse)?;
        Ok(Self::new(users))
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn verify(&self, username: &str, password: &str) -> Result<(), AuthError> {
        let stored = self.users.get(username).ok_or(AuthError::InvalidCredentials)?;
        let (salt, expected) = stored.split_once(SALT_SEPARATOR).unwrap_or(("", stored.as_str()));
        let computed = hash_password(salt, password);

        if constant_time_eq(computed.as_bytes(), expected.to_ascii_lowercase().as_bytes()) {
            Ok(())
        } else {
            Err(AuthError::InvalidCredentials)
        }
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }

    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Per-session state: whether the user has logged in and when data was last refreshed.
///
/// Created at session start. Only `login` and the refresh control methods modify it.
#[derive(Debug, Clone, Default)]
pub struct Session {
    authenticated: bool,
    last_refresh: Option<DateTime<Utc>>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// A session for deployments with no user table, where every caller is trusted.
    pub fn trusted() -> Self {
        Session {
            authenticated: true,
            last_refresh: None,
        }
    }

    pub fn login(&mut self, users: &UserTable, username: &str, password: &str) -> Result<(), AuthError> {
        match users.verify(username, password) {
            Ok(()) => {
                self.authenticated = true;
                tracing::info!(message = "user logged in", username = %username);
                Ok(())
            }
            Err(e) => {
                self.authenticated = false;
                tracing::warn!(message = "rejected login attempt");
                Err(e)
            }
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    pub fn last_refresh(&self) -> Option<DateTime<Utc>> {
        self.last_refresh
    }

    pub fn mark_refreshed(&mut self, at: DateTime<Utc>) {
        self.last_refresh = Some(at);
    }

    /// True when nothing has been fetched yet or the last refresh is at least `interval` old.
    pub fn is_stale(&self, now: DateTime<Utc>, interval: Duration) -> bool {
        match self.last_refresh {
            None => true,
            Some(at) => now - at >= interval,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{hash_password, AuthError, Session, UserTable};
    use chrono::{Duration, TimeZone, Utc};
    use std::collections::HashMap;

    fn table() -> UserTable {
        let mut users = HashMap::new();
        users.insert("plain".to_owned(), hash_password("", "hunter2"));
        users.insert("salted".to_owned(), format!("pepper${}", hash_password("pepper", "hunter2")));
        UserTable::new(users)
    }

    #[test]
    fn test_hash_password_known_value() {
        assert_eq!(
            "5e884898da28047151d0e56f8dc6292773603d0d6aabbdd62a11ef721d1542d8",
            hash_password("", "password")
        );
    }

    #[test]
    fn test_verify_success() {
        let users = table();
        assert!(users.verify("plain", "hunter2").is_ok());
        assert!(users.verify("salted", "hunter2").is_ok());
    }

    #[test]
    fn test_verify_uppercase_stored_hash() {
        let mut users = HashMap::new();
        users.insert("a".to_owned(), hash_password("", "pw").to_uppercase());
        assert!(UserTable::new(users).verify("a", "pw").is_ok());
    }

    #[test]
    fn test_verify_failures_indistinguishable() {
        let users = table();
        let unknown = users.verify("nobody", "hunter2").unwrap_err();
        let wrong = users.verify("plain", "hunter3").unwrap_err();
        assert!(matches!(unknown, AuthError::InvalidCredentials));
        assert!(matches!(wrong, AuthError::InvalidCredentials));
        assert_eq!(unknown.to_string(), wrong.to_string());
    }

    #[test]
    fn test_from_json() {
        let users = UserTable::from_json(r#"{"alice": "5e884898da28047151d0e56f8dc6292773603d0d6aabbdd62a11ef721d1542d8"}"#)
            .unwrap();
        assert_eq!(1, users.len());
        assert!(users.verify("alice", "password").is_ok());
        assert!(UserTable::from_json("[]").is_err());
    }

    #[test]
    fn test_session_login() {
        let users = table();
        let mut session = Session::new();
        assert!(!session.is_authenticated());

        assert!(session.login(&users, "plain", "nope").is_err());
        assert!(!session.is_authenticated());

        session.login(&users, "salted", "hunter2").unwrap();
        assert!(session.is_authenticated());
    }

    #[test]
    fn test_session_staleness() {
        let start = Utc.with_ymd_and_hms(2024, 1, 15, 12, 0, 0).unwrap();
        let mut session = Session::trusted();
        assert!(session.is_stale(start, Duration::seconds(300)));

        session.mark_refreshed(start);
        assert_eq!(Some(start), session.last_refresh());
        assert!(!session.is_stale(start + Duration::seconds(299), Duration::seconds(300)));
        assert!(session.is_stale(start + Duration::seconds(300), Duration::seconds(300)));
    }
}
