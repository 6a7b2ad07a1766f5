//! Property-based test generators using proptest.
//!
//! Provides strategies for generating store names, users, and operation
//! sequences.

use crate::items::User;
use proptest::prelude::*;

/// Strategy for generating valid store names.
pub fn store_name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-zA-Z][a-zA-Z0-9_-]{0,14}[a-zA-Z0-9]").expect("Invalid regex")
}

/// Strategy for generating invalid store names.
pub fn invalid_store_name_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        Just(String::new()),
        prop::string::string_regex("[a-zA-Z]").expect("Invalid regex"),
        prop::string::string_regex("[0-9_-][a-zA-Z0-9]{1,8}").expect("Invalid regex"),
        prop::string::string_regex("[a-zA-Z][a-zA-Z0-9]{0,8}[_-]").expect("Invalid regex"),
        prop::string::string_regex("[a-zA-Z][a-z]{0,4}[ ./][a-z]{1,4}").expect("Invalid regex"),
    ]
}

/// Strategy for generating user names from a small pool, so collisions happen.
pub fn user_name_strategy() -> impl Strategy<Value = String> {
    prop::sample::select(vec!["ann", "bob", "cid", "dee", "eve", "fay"]).prop_map(String::from)
}

/// Strategy for generating valid users.
pub fn user_strategy() -> impl Strategy<Value = User> {
    (user_name_strategy(), 1..100i64).prop_map(|(name, rev)| User::new(name, rev))
}

/// One store mutation.
#[derive(Debug, Clone)]
pub enum Op {
    /// Add a user.
    Add(User),
    /// Update the n-th live record (modulo the live count).
    Upd(usize, User),
    /// Delete the n-th live record (modulo the live count).
    Del(usize),
}

/// Strategy for generating a sequence of store mutations.
pub fn op_sequence_strategy(max_len: usize) -> impl Strategy<Value = Vec<Op>> {
    let op = prop_oneof![
        3 => user_strategy().prop_map(Op::Add),
        2 => (any::<usize>(), user_strategy()).prop_map(|(n, u)| Op::Upd(n, u)),
        1 => any::<usize>().prop_map(Op::Del),
    ];
    prop::collection::vec(op, 0..max_len)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::TestStore;
    use crate::items::UniqueUser;
    use itemdb_core::{Item, ItemStore, UuidGenerator};
    use std::collections::HashSet;
    use tempfile::TempDir;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn valid_names_open(name in store_name_strategy()) {
            let dir = TempDir::new().unwrap();
            let store = ItemStore::<User>::open(dir.path().join("s.json"), &name, UuidGenerator);
            prop_assert!(store.is_ok());
        }

        #[test]
        fn invalid_names_rejected(name in invalid_store_name_strategy()) {
            let dir = TempDir::new().unwrap();
            let store = ItemStore::<User>::open(dir.path().join("s.json"), &name, UuidGenerator);
            prop_assert!(store.is_err());
        }

        #[test]
        fn find_returns_insertion_order(ops in op_sequence_strategy(24), limit in 0usize..8) {
            let store = TestStore::<User>::new("user");
            let mut model: Vec<(String, User)> = Vec::new();

            for op in ops {
                match op {
                    Op::Add(user) => {
                        let id = store.add(user.clone()).unwrap();
                        model.push((id, user));
                    }
                    Op::Upd(n, user) if !model.is_empty() => {
                        let i = n % model.len();
                        store.upd(&model[i].0, user.clone()).unwrap();
                        model[i].1 = user;
                    }
                    Op::Del(n) if !model.is_empty() => {
                        let (id, _) = model.remove(n % model.len());
                        store.del(&id).unwrap();
                    }
                    _ => {}
                }
            }

            let all: Vec<(String, User)> = store
                .find(0, None)
                .into_iter()
                .map(|r| (r.id, r.item))
                .collect();
            prop_assert_eq!(&all, &model);

            let limited = store.find(limit, None);
            let expected = if limit == 0 { model.len() } else { limit.min(model.len()) };
            prop_assert_eq!(limited.len(), expected);

            // the file mirrors memory
            let reopened = store.reopen();
            let ids: Vec<String> = reopened.find(0, None).into_iter().map(|r| r.id).collect();
            let model_ids: Vec<String> = model.iter().map(|(id, _)| id.clone()).collect();
            prop_assert_eq!(ids, model_ids);
        }

        #[test]
        fn unique_names_stay_unique(users in prop::collection::vec(user_strategy(), 0..24)) {
            let store = TestStore::<UniqueUser>::new("user");
            let mut seen = HashSet::new();

            for user in users {
                let fresh = seen.insert(user.name.clone());
                let result = store.add(UniqueUser(user));
                prop_assert_eq!(result.is_ok(), fresh);
                if let Err(e) = result {
                    prop_assert!(e.is_duplicate_key());
                }
            }

            let names: Vec<String> = store.find(0, None).into_iter().map(|r| r.item.0.name).collect();
            let distinct: HashSet<&String> = names.iter().collect();
            prop_assert_eq!(distinct.len(), names.len());
            prop_assert!(store.find(0, None).iter().all(|r| r.item.validate().is_ok()));
        }
    }
}
