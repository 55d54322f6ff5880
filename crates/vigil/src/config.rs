//! Profile resolution with CLI flag overrides layered on top of
//! `vigil_config`.

use std::path::PathBuf;

use secrecy::SecretString;

use vigil_config::{Config, ConfigError, Profile};
use vigil_core::EngineConfig;

use crate::cli::GlobalOpts;
use crate::error::CliError;

/// Everything a command needs to talk to the platform.
pub struct Resolved {
    pub profile_name: String,
    pub engine: EngineConfig,
    /// `None` when no step of the credential chain produced a token.
    pub token: Option<SecretString>,
}

impl Resolved {
    pub fn require_token(&self) -> Result<SecretString, CliError> {
        self.token.clone().ok_or_else(|| CliError::NoCredentials {
            profile: self.profile_name.clone(),
        })
    }
}

pub fn load(global: &GlobalOpts) -> Result<Config, CliError> {
    let path = global
        .config
        .clone()
        .unwrap_or_else(vigil_config::config_path);
    Ok(vigil_config::load_config_from(&path)?)
}

/// Config file profile (if any) + flag overrides → engine config + token.
pub fn resolve(global: &GlobalOpts) -> Result<Resolved, CliError> {
    let cfg = load(global)?;

    let (profile_name, mut profile) = match cfg.profile(global.profile.as_deref()) {
        Ok((name, profile)) => (name, profile.clone()),
        // No profile: flags alone must name the platform.
        Err(ConfigError::UnknownProfile { profile: name }) => {
            if global.url.is_none() {
                if global.profile.is_some() {
                    let mut available: Vec<&str> = cfg.profiles.keys().map(String::as_str).collect();
                    available.sort_unstable();
                    return Err(CliError::ProfileNotFound {
                        name,
                        available: if available.is_empty() {
                            "(none)".into()
                        } else {
                            available.join(", ")
                        },
                    });
                }
                return Err(CliError::NoConfig {
                    path: global
                        .config
                        .clone()
                        .unwrap_or_else(vigil_config::config_path)
                        .display()
                        .to_string(),
                });
            }
            (name, Profile::default())
        }
        Err(other) => return Err(other.into()),
    };

    apply_overrides(&mut profile, global);
    let engine = vigil_config::profile_to_engine_config(&profile, &profile_name, &cfg.defaults)?;

    let token = match global.token {
        Some(ref raw) => Some(SecretString::from(raw.clone())),
        None => vigil_config::resolve_token(&profile, &profile_name).ok(),
    };

    Ok(Resolved {
        profile_name,
        engine,
        token,
    })
}

fn apply_overrides(profile: &mut Profile, global: &GlobalOpts) {
    if let Some(ref url) = global.url {
        profile.url.clone_from(url);
        // A stream URL from the file belongs to the file's platform.
        profile.stream_url = None;
    }
    if let Some(ref stream_url) = global.stream_url {
        profile.stream_url = Some(stream_url.clone());
    }
    if global.insecure {
        profile.insecure = Some(true);
    }
    if let Some(timeout) = global.timeout {
        profile.timeout = Some(timeout);
    }
    if let Some(ref dir) = global.data_dir {
        profile.data_dir = Some(dir.clone());
    }
}

/// Profile name and data directory only; offline commands need no
/// platform URL.
pub fn local(global: &GlobalOpts) -> Result<(String, PathBuf), CliError> {
    let cfg = load(global)?;
    let (name, from_profile) = match cfg.profile(global.profile.as_deref()) {
        Ok((name, profile)) => {
            let dir = profile.data_dir.clone();
            (name, dir)
        }
        Err(_) => (
            global
                .profile
                .clone()
                .or_else(|| cfg.default_profile.clone())
                .unwrap_or_else(|| "default".into()),
            None,
        ),
    };
    let dir = global
        .data_dir
        .clone()
        .or(from_profile)
        .unwrap_or_else(|| vigil_config::default_data_dir(&name));
    Ok((name, dir))
}
