//! Config subcommand handlers.

use secrecy::SecretString;
use serde::Serialize;
use tabled::Tabled;

use homelink_config::{self as hl_config, Config, Profile};

use crate::cli::{ConfigArgs, ConfigCommand, ConfigInitArgs, GlobalOpts, OutputFormat};
use crate::config;
use crate::error::CliError;
use crate::output;

const REDACTED: &str = "********";

#[derive(Clone, Serialize, Tabled)]
struct ProfileRow {
    #[tabled(rename = "Profile")]
    name: String,
    #[tabled(rename = "URL")]
    url: String,
    #[tabled(rename = "Default")]
    default: bool,
}

/// The config with plaintext tokens masked, for display.
fn redacted(cfg: &Config) -> Config {
    let mut shown = cfg.clone();
    for profile in shown.profiles.values_mut() {
        if profile.token.is_some() {
            profile.token = Some(REDACTED.into());
        }
    }
    shown
}

fn profile_rows(cfg: &Config) -> Vec<ProfileRow> {
    let mut rows: Vec<ProfileRow> = cfg
        .profiles
        .iter()
        .map(|(name, profile)| ProfileRow {
            name: name.clone(),
            url: profile.url.clone(),
            default: cfg.default_profile.as_deref() == Some(name.as_str()),
        })
        .collect();
    rows.sort_by(|a, b| a.name.cmp(&b.name));
    rows
}

/// Add or replace the profile described by `args`. Returns whether the
/// token has to go to the keyring.
fn apply_init(
    cfg: &mut Config,
    args: &ConfigInitArgs,
    token: Option<&str>,
) -> Result<bool, CliError> {
    if let Err(e) = args.base_url.parse::<url::Url>() {
        return Err(CliError::Validation {
            field: "base-url".into(),
            reason: format!("invalid URL '{}': {e}", args.base_url),
        });
    }
    if args.keyring && token.is_none() {
        return Err(CliError::Validation {
            field: "keyring".into(),
            reason: "--keyring needs a token from --token or HOMELINK_TOKEN".into(),
        });
    }

    let profile = Profile {
        url: args.base_url.clone(),
        token: if args.keyring { None } else { token.map(str::to_owned) },
        token_env: args.token_env.clone(),
        ..Profile::default()
    };
    cfg.profiles.insert(args.name.clone(), profile);

    if args.default || cfg.profiles.len() == 1 {
        cfg.default_profile = Some(args.name.clone());
    }
    Ok(args.keyring)
}

// ── Handler ─────────────────────────────────────────────────────────

pub fn handle(args: ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let path = config::config_file(global);

    match args.command {
        ConfigCommand::Path => {
            output::print_output(&path.display().to_string(), false);
            Ok(())
        }

        ConfigCommand::Show => {
            let cfg = config::load(global)?;
            let shown = redacted(&cfg);
            let out = match global.output {
                OutputFormat::Table | OutputFormat::Plain => {
                    toml::to_string_pretty(&shown).map_err(|e| CliError::Validation {
                        field: "config".into(),
                        reason: format!("cannot render TOML: {e}"),
                    })?
                }
                structured => output::render_structured(structured, &shown)?,
            };
            output::print_output(&out, global.quiet);
            Ok(())
        }

        ConfigCommand::Profiles => {
            let cfg = config::load(global)?;
            let rows = profile_rows(&cfg);
            let out = output::render_list(global.output, &rows, ProfileRow::clone, |r| r.name.clone())?;
            output::print_output(&out, global.quiet);
            Ok(())
        }

        ConfigCommand::Init(init) => {
            let mut cfg = config::load(global)?;
            let to_keyring = apply_init(&mut cfg, &init, global.token.as_deref())?;
            if let Some(token) = global.token.as_ref().filter(|_| to_keyring) {
                hl_config::store_token(&init.name, &SecretString::from(token.clone()))?;
            }
            hl_config::save_config_to(&cfg, &path)?;
            if !global.quiet {
                eprintln!("Saved profile '{}' to {}", init.name, path.display());
            }
            Ok(())
        }

        ConfigCommand::Use { name } => {
            let mut cfg = config::load(global)?;
            if !cfg.profiles.contains_key(&name) {
                let available = profile_rows(&cfg)
                    .into_iter()
                    .map(|r| r.name)
                    .collect::<Vec<_>>()
                    .join(", ");
                return Err(CliError::ProfileNotFound { name, available });
            }
            cfg.default_profile = Some(name.clone());
            hl_config::save_config_to(&cfg, &path)?;
            if !global.quiet {
                eprintln!("Default profile is now '{name}'");
            }
            Ok(())
        }

        ConfigCommand::SetToken { token } => {
            let cfg = config::load(global)?;
            let profile_name = config::active_profile_name(global, &cfg);
            let token = token.or_else(|| global.token.clone()).ok_or_else(|| CliError::Validation {
                field: "token".into(),
                reason: "pass the token as an argument or via --token / HOMELINK_TOKEN".into(),
            })?;
            hl_config::store_token(&profile_name, &SecretString::from(token))?;
            if !global.quiet {
                eprintln!("Stored token for profile '{profile_name}' in the system keyring");
            }
            Ok(())
        }
    }
}
