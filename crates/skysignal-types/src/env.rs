//! Environment variable fallbacks recognized by the agent (spec §6).
//!
//! Narrowed down from the teacher's general-purpose
//! `riptide-config::env::EnvConfigLoader` to the four variables this spec
//! names: `APP_VERSION`, `BUILD_HASH`/`GIT_SHA` (pool config has no env
//! fallback of its own; those two live here for completeness),
//! `MONGO_URL` (pool bootstrap fallback) and `MONGO_OPLOG_URL` (live
//! query driver fallback).

use std::env;

/// Read `APP_VERSION`, falling back to `None` when unset.
pub fn app_version() -> Option<String> {
    env::var("APP_VERSION").ok()
}

/// Read `BUILD_HASH`, falling back to `GIT_SHA`, then `None`.
pub fn build_hash() -> Option<String> {
    env::var("BUILD_HASH").or_else(|_| env::var("GIT_SHA")).ok()
}

/// Read `MONGO_URL`, used by the Pool Observer's bootstrap fallback when
/// a `poolCreated` event was missed.
pub fn mongo_url() -> Option<String> {
    env::var("MONGO_URL").ok()
}

/// Read `MONGO_OPLOG_URL`, used by the Live-Query Registry's driver-kind
/// fallback when no marker fields are present on the observer handle.
pub fn mongo_oplog_url() -> Option<String> {
    env::var("MONGO_OPLOG_URL").ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Environment variable tests must not run concurrently with each
    // other (std::env is process-global).
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn build_hash_prefers_build_hash_over_git_sha() {
        let _guard = ENV_LOCK.lock().unwrap();
        env::set_var("BUILD_HASH", "abc123");
        env::set_var("GIT_SHA", "def456");
        assert_eq!(build_hash(), Some("abc123".to_string()));
        env::remove_var("BUILD_HASH");
        env::remove_var("GIT_SHA");
    }

    #[test]
    fn build_hash_falls_back_to_git_sha() {
        let _guard = ENV_LOCK.lock().unwrap();
        env::remove_var("BUILD_HASH");
        env::set_var("GIT_SHA", "def456");
        assert_eq!(build_hash(), Some("def456".to_string()));
        env::remove_var("GIT_SHA");
    }

    #[test]
    fn missing_vars_return_none() {
        let _guard = ENV_LOCK.lock().unwrap();
        env::remove_var("MONGO_URL");
        assert_eq!(mongo_url(), None);
    }
}
