//! Resolution of the active profile plus CLI overrides into the configs
//! the library crates take.

use std::path::PathBuf;

use secrecy::SecretString;

use homelink_config::{self as config, Config, Profile};
use homelink_core::SessionConfig;

use crate::cli::GlobalOpts;
use crate::error::CliError;

/// Config file in effect: `--config` / `HOMELINK_CONFIG`, else the
/// platform default.
pub fn config_file(global: &GlobalOpts) -> PathBuf {
    global.config.clone().unwrap_or_else(config::config_path)
}

pub fn load(global: &GlobalOpts) -> Result<Config, CliError> {
    Ok(config::load_config_from(&config_file(global))?)
}

pub fn active_profile_name(global: &GlobalOpts, cfg: &Config) -> String {
    global
        .profile
        .clone()
        .or_else(|| cfg.default_profile.clone())
        .unwrap_or_else(|| "default".into())
}

/// Build a `SessionConfig` from the config file, profile, and CLI overrides.
///
/// Without a matching profile, `--url` and `--token` alone are enough.
pub fn session_config(global: &GlobalOpts, cfg: &Config) -> Result<SessionConfig, CliError> {
    let profile_name = active_profile_name(global, cfg);

    let profile = match cfg.profiles.get(&profile_name) {
        Some(profile) => profile.clone(),
        None if global.url.is_some() => Profile::default(),
        None if global.profile.is_some() => {
            let mut names: Vec<&str> = cfg.profiles.keys().map(String::as_str).collect();
            names.sort_unstable();
            return Err(CliError::ProfileNotFound {
                name: profile_name,
                available: if names.is_empty() {
                    "(none)".into()
                } else {
                    names.join(", ")
                },
            });
        }
        None => {
            return Err(CliError::NoConfig {
                path: config_file(global).display().to_string(),
            });
        }
    };

    let profile = with_overrides(profile, global);
    let token = match global.token {
        Some(ref token) => SecretString::from(token.clone()),
        None => config::resolve_token(&profile, &profile_name)?,
    };

    Ok(config::session_config(&profile, &cfg.defaults, token)?)
}

fn with_overrides(mut profile: Profile, global: &GlobalOpts) -> Profile {
    if let Some(ref url) = global.url {
        profile.url.clone_from(url);
        // A derived socket URL follows the new base.
        profile.websocket_url = None;
    }
    if global.insecure {
        profile.insecure = Some(true);
    }
    if let Some(timeout) = global.timeout {
        profile.timeout = Some(timeout);
    }
    profile
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use clap::Parser;

    use super::*;
    use crate::cli::Cli;

    fn global(args: &[&str]) -> GlobalOpts {
        let mut argv = vec!["homelink"];
        argv.extend_from_slice(args);
        argv.push("states");
        Cli::try_parse_from(argv).unwrap().global
    }

    fn config_with_home() -> Config {
        let mut cfg = Config::default();
        cfg.profiles.insert(
            "default".into(),
            Profile {
                url: "http://homeassistant.local:8123".into(),
                token: Some("file-token".into()),
                ..Profile::default()
            },
        );
        cfg
    }

    #[test]
    fn cli_token_wins_over_profile() {
        let session = session_config(&global(&["--token", "flag-token"]), &config_with_home()).unwrap();
        let headers = session.token.bearer_headers().unwrap();
        assert_eq!(headers["authorization"], "Bearer flag-token");
        assert_eq!(session.url.as_str(), "http://homeassistant.local:8123/");
    }

    #[test]
    fn url_flag_works_without_profile() {
        let session = session_config(
            &global(&["--url", "http://10.0.0.2:8123", "--token", "t", "--timeout", "5"]),
            &Config::default(),
        )
        .unwrap();
        assert_eq!(session.url.as_str(), "http://10.0.0.2:8123/");
        assert_eq!(session.timeout, Duration::from_secs(5));
    }

    #[test]
    fn missing_profile_lists_known_ones() {
        let err = session_config(&global(&["--profile", "lab"]), &config_with_home()).unwrap_err();
        match err {
            CliError::ProfileNotFound { name, available } => {
                assert_eq!(name, "lab");
                assert_eq!(available, "default");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn no_profile_and_no_url_is_a_config_error() {
        let err = session_config(&global(&[]), &Config::default()).unwrap_err();
        assert!(matches!(err, CliError::NoConfig { .. }));
    }
}
