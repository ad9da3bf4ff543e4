use std::env;
use std::path::PathBuf;

/// Trait for types that can retrieve their configuration key from environment variables
pub trait KeyFromEnv {
    /// The environment variable name for this client's API key
    const KEY_NAME: &'static str;

    /// Find the API key by checking environment variables first, then .env file
    fn key_from_env() -> Option<String> {
        // First try to load .env file (silently fail if not found)
        let _ = dotenvy::dotenv();

        env::var(Self::KEY_NAME).ok()
    }
}

/// Directory for session snapshots and the quiz database.
///
/// `STUDYJOY_DATA_DIR` wins; otherwise `.studyjoy` under the current
/// directory. The directory is not created here.
pub fn data_dir() -> PathBuf {
    let _ = dotenvy::dotenv();

    env::var("STUDYJOY_DATA_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(".studyjoy"))
}

/// Path of the quiz SQLite database inside [`data_dir`].
pub fn database_path() -> PathBuf {
    data_dir().join("studyjoy.db")
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Probe;
    impl KeyFromEnv for Probe {
        const KEY_NAME: &'static str = "STUDYJOY_TEST_PROBE_KEY";
    }

    #[test]
    fn missing_key_is_none() {
        env::remove_var(Probe::KEY_NAME);
        assert!(Probe::key_from_env().is_none());
    }

    #[test]
    fn data_dir_honors_override() {
        env::set_var("STUDYJOY_DATA_DIR", "/tmp/studyjoy-test");
        assert_eq!(data_dir(), PathBuf::from("/tmp/studyjoy-test"));
        env::remove_var("STUDYJOY_DATA_DIR");
    }
}
