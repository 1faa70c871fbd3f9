//! Helpers shared by the unit tests and the `#[engine_test]` harness.

use std::fs;
use std::path::{Path, PathBuf};

use crate::auth::AuthSequencer;
use crate::config::Config;
use crate::credentials::CredentialStore;
use crate::model::{
    identity::{Pin, Registration},
    session::{AuthStep, Session},
};
use crate::App;

/// A fresh, not yet existing, store file in the temp directory.
pub fn temp_store_path() -> PathBuf {
    let random: u64 = rand::random();
    std::env::temp_dir().join(format!("votesmart-test-{random:016x}.json"))
}

/// A file-backed app with the example config, logging enabled.
pub fn app() -> App {
    log4rs_test_utils::test_logging::init_logging_once_for(["votesmart"], None, None);
    let path = temp_store_path();
    debug!("Using store {}", path.display());
    App::new(Config::example().with_store_path(path)).unwrap()
}

/// Delete a store file written by a test, if there is one.
pub fn cleanup(path: Option<&Path>) {
    if let Some(path) = path {
        if let Err(err) = fs::remove_file(path) {
            if err.kind() != std::io::ErrorKind::NotFound {
                warn!("Failed to remove test store {}: {err}", path.display());
            }
        }
    }
}

/// Walk a PIN-only identity through the whole login sequence.
pub fn log_in(auth: &AuthSequencer, email: &str, password: &str, pin: &Pin) -> Session {
    let mut session = Session::new();
    let next = auth
        .attempt_primary_login(&mut session, email, password)
        .unwrap();
    assert_eq!(next, AuthStep::Pin, "test identities log in with a PIN only");
    auth.complete_pin(&mut session, pin).unwrap();
    session
}

/// Register [`Registration::example`] and log them in.
pub fn voter_session(credentials: &CredentialStore, auth: &AuthSequencer) -> Session {
    let registration = Registration::example();
    credentials.register(registration.clone()).unwrap();
    log_in(
        auth,
        &registration.email,
        &registration.password,
        &registration.pin,
    )
}

/// Log in as the administrator seeded from `config`.
pub fn admin_session(auth: &AuthSequencer, config: &Config) -> Session {
    log_in(
        auth,
        config.admin_email(),
        config.admin_password(),
        &config.admin_pin(),
    )
}
