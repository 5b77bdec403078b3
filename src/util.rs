use std::env::VarError;
use std::env;
use std::process::exit;

pub const HOST: &str = "HOST";
pub const PORT: &str = "PORT";

pub const VAR_PROJECT_ID: &str = "PROJECT_ID";
pub const VAR_SA_EMAIL: &str = "SA_EMAIL";
pub const VAR_SA_KEY_PATH: &str = "SA_KEY_PATH";
pub const VAR_FCM_SERVER_KEY: &str = "FCM_SERVER_KEY";

pub fn check_environment_vars() -> Result<(), VarError> {
    env::var(VAR_PROJECT_ID)?;
    env::var(VAR_SA_EMAIL)?;
    env::var(VAR_SA_KEY_PATH)?;
    env::var(VAR_FCM_SERVER_KEY)?;
    Ok(())
}

pub fn init_logging() {
    if let Err(e) = log4rs::init_file(crate::LOG_CONFIG_PATH, Default::default()) {
        eprintln!("Failed to initialize logging from {}: {e}", crate::LOG_CONFIG_PATH);
        exit(1)
    }
}

/// Tail end of a device token, safe to log.
pub fn get_short_token(token: &str) -> &str {
    let tail = token.len().saturating_sub(6);
    match token.char_indices().find(|(i, _)| *i >= tail) {
        Some((i, _)) => &token[i..],
        None => token,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_token_keeps_only_the_tail() {
        assert_eq!(get_short_token("cXYZ:APA91-long-opaque-token-abcdef"), "abcdef");
        assert_eq!(get_short_token("tiny"), "tiny");
    }
}
