//! Sample item types.
//!
//! - [`User`]: no unique keys, no hooks
//! - [`UniqueUser`]: same shape, declares `name` unique
//! - [`TrackedUser`]: same shape, records every lifecycle hook it receives
//!
//! All three serialize as `{"rev": <int>, "name": <string>}`.

use itemdb_core::{key_map, Item, ItemError, KeyMap};
use parking_lot::{const_mutex, Mutex, MutexGuard};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::ops::Deref;

/// A plain user record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Revision, caller defined.
    pub rev: i64,
    /// Display name, must not be empty.
    pub name: String,
}

impl User {
    /// Creates a user.
    pub fn new(name: impl Into<String>, rev: i64) -> Self {
        Self {
            rev,
            name: name.into(),
        }
    }

    /// A filter matching users with this name (empty matches any).
    pub fn named(name: impl Into<String>) -> Self {
        Self::new(name, 0)
    }
}

impl Item for User {
    fn validate(&self) -> Result<(), ItemError> {
        if self.name.is_empty() {
            return Err(ItemError::new("user.name not specified"));
        }
        Ok(())
    }

    fn matches(&self, filter: &Self) -> Result<(), ItemError> {
        if !filter.name.is_empty() && filter.name != self.name {
            return Err(ItemError::new(format!(
                "name {:?} != {:?}",
                self.name, filter.name
            )));
        }
        if filter.rev != 0 && filter.rev != self.rev {
            return Err(ItemError::new(format!("rev {} != {}", self.rev, filter.rev)));
        }
        Ok(())
    }

    fn match_key(&self, key: &KeyMap) -> bool {
        let mut checked = false;
        if let Some(name) = key.get("name") {
            if name.as_str() != Some(self.name.as_str()) {
                return false;
            }
            checked = true;
        }
        if let Some(rev) = key.get("rev") {
            if rev.as_i64() != Some(self.rev) {
                return false;
            }
            checked = true;
        }
        checked
    }
}

/// A user whose name must be unique within the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UniqueUser(pub User);

impl UniqueUser {
    /// Creates a unique user.
    pub fn new(name: impl Into<String>, rev: i64) -> Self {
        Self(User::new(name, rev))
    }
}

impl Deref for UniqueUser {
    type Target = User;

    fn deref(&self) -> &User {
        &self.0
    }
}

impl Item for UniqueUser {
    fn validate(&self) -> Result<(), ItemError> {
        self.0.validate()
    }

    fn matches(&self, filter: &Self) -> Result<(), ItemError> {
        self.0.matches(&filter.0)
    }

    fn match_key(&self, key: &KeyMap) -> bool {
        self.0.match_key(key)
    }

    fn unique_keys(&self) -> Option<KeyMap> {
        Some(key_map([("name", json!(self.0.name))]))
    }
}

/// A lifecycle hook received by a [`TrackedUser`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    /// `notify_new` on the added user.
    New(User),
    /// `notify_upd` on the new value.
    Upd {
        /// Value before the update.
        previous: User,
        /// Value after the update.
        current: User,
    },
    /// `notify_del` on the removed user.
    Del(User),
}

static NOTIFICATIONS: Mutex<Vec<Notification>> = const_mutex(Vec::new());
static SERIAL: Mutex<()> = const_mutex(());

/// Serializes tests that share the global notification log.
///
/// Hold the guard for the whole test.
pub fn serial() -> MutexGuard<'static, ()> {
    let guard = SERIAL.lock();
    NOTIFICATIONS.lock().clear();
    guard
}

/// Removes and returns every notification recorded so far.
pub fn take_notifications() -> Vec<Notification> {
    std::mem::take(&mut *NOTIFICATIONS.lock())
}

/// A user that records its lifecycle hooks in a global log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrackedUser(pub User);

impl TrackedUser {
    /// Creates a tracked user.
    pub fn new(name: impl Into<String>, rev: i64) -> Self {
        Self(User::new(name, rev))
    }
}

impl Deref for TrackedUser {
    type Target = User;

    fn deref(&self) -> &User {
        &self.0
    }
}

impl Item for TrackedUser {
    fn validate(&self) -> Result<(), ItemError> {
        self.0.validate()
    }

    fn matches(&self, filter: &Self) -> Result<(), ItemError> {
        self.0.matches(&filter.0)
    }

    fn match_key(&self, key: &KeyMap) -> bool {
        self.0.match_key(key)
    }

    fn notify_new(&self) {
        NOTIFICATIONS.lock().push(Notification::New(self.0.clone()));
    }

    fn notify_upd(&self, previous: &Self) {
        NOTIFICATIONS.lock().push(Notification::Upd {
            previous: previous.0.clone(),
            current: self.0.clone(),
        });
    }

    fn notify_del(&self) {
        NOTIFICATIONS.lock().push(Notification::Del(self.0.clone()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_json_shape() {
        let json = serde_json::to_string(&User::new("A", 1)).unwrap();
        assert_eq!(json, r#"{"rev":1,"name":"A"}"#);

        let unique: UniqueUser = serde_json::from_str(r#"{"name":"B","rev":2}"#).unwrap();
        assert_eq!(unique.name, "B");
        assert_eq!(unique.rev, 2);
    }

    #[test]
    fn user_match_key() {
        let user = User::new("A", 1);
        assert!(user.match_key(&key_map([("name", json!("A"))])));
        assert!(user.match_key(&key_map([("name", json!("A")), ("rev", json!(1))])));
        assert!(!user.match_key(&key_map([("name", json!("A")), ("rev", json!(2))])));
        assert!(!user.match_key(&KeyMap::new()));
    }

    #[test]
    fn user_filter() {
        let user = User::new("A", 1);
        assert!(user.matches(&User::named("")).is_ok());
        assert!(user.matches(&User::named("A")).is_ok());
        assert!(user.matches(&User::named("B")).is_err());
        assert!(user.matches(&User::new("", 2)).is_err());
    }

    #[test]
    fn unique_user_declares_name() {
        let keys = UniqueUser::new("A", 1).unique_keys().unwrap();
        assert_eq!(keys.get("name"), Some(&json!("A")));
        assert!(User::new("A", 1).unique_keys().is_none());
    }

    #[test]
    fn tracked_user_records_hooks() {
        let _guard = serial();
        let old = TrackedUser::new("A", 1);
        let new = TrackedUser::new("A", 2);

        old.notify_new();
        new.notify_upd(&old);
        new.notify_del();

        assert_eq!(
            take_notifications(),
            vec![
                Notification::New(User::new("A", 1)),
                Notification::Upd {
                    previous: User::new("A", 1),
                    current: User::new("A", 2),
                },
                Notification::Del(User::new("A", 2)),
            ]
        );
        assert!(take_notifications().is_empty());
    }
}
