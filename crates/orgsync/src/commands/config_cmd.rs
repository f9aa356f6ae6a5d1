//! Config subcommand handlers.

use dialoguer::Input;
use tabled::Tabled;

use orgsync_config::{Config, save_config_to};

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts, OutputFormat};
use crate::config;
use crate::error::CliError;
use crate::output;

#[derive(Tabled)]
struct ProfileRow {
    #[tabled(rename = "")]
    marker: &'static str,
    #[tabled(rename = "Profile")]
    name: String,
    #[tabled(rename = "API URL")]
    api_url: String,
}

/// Map a dialoguer / interactive I/O failure into CliError.
fn prompt_err(e: impl std::fmt::Display) -> CliError {
    CliError::Validation {
        field: "interactive".into(),
        reason: format!("prompt failed: {e}"),
    }
}

pub fn handle(args: ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        ConfigCommand::Path => {
            output::print_output(&config::config_path().display().to_string(), global.quiet);
            Ok(())
        }

        ConfigCommand::Show => {
            let cfg = config::load_config_or_default();
            let out = match global.output {
                OutputFormat::Table | OutputFormat::Plain => toml::to_string_pretty(&cfg)
                    .map_err(|e| CliError::Internal(format!("TOML serialization failed: {e}")))?,
                OutputFormat::Json => output::render_json(&cfg, false)?,
                OutputFormat::JsonCompact => output::render_json(&cfg, true)?,
                OutputFormat::Yaml => output::render_yaml(&cfg)?,
            };
            output::print_output(out.trim_end(), global.quiet);
            Ok(())
        }

        ConfigCommand::Init { api_url, force } => {
            let path = config::config_path();
            if path.exists() && !force {
                return Err(CliError::ConfigExists {
                    path: path.display().to_string(),
                });
            }

            let mut cfg = Config::starter();
            let api_url = match api_url.or_else(|| global.api_url.clone()) {
                Some(url) => url,
                None if global.yes => String::new(),
                None => Input::new()
                    .with_prompt("API URL")
                    .default("http://localhost:3000/api".into())
                    .interact_text()
                    .map_err(prompt_err)?,
            };
            if let Some(profile) = cfg.profiles.get_mut("default") {
                if !api_url.is_empty() {
                    profile.api_url = api_url;
                }
                // Validate before writing.
                orgsync_config::profile_to_session_config(profile, &cfg.defaults)?;
            }

            save_config_to(&cfg, &path)?;
            if !global.quiet {
                eprintln!("Config written to {}", path.display());
            }
            Ok(())
        }

        ConfigCommand::Profiles => {
            let cfg = config::load_config_or_default();
            let active = config::active_profile_name(global, &cfg);
            let names: Vec<(&String, &String)> = cfg
                .profiles
                .iter()
                .map(|(name, profile)| (name, &profile.api_url))
                .collect();
            let out = output::render_list(
                &global.output,
                &names,
                |(name, url)| ProfileRow {
                    marker: if **name == active { "*" } else { "" },
                    name: (*name).clone(),
                    api_url: (*url).clone(),
                },
                |(name, _)| (*name).clone(),
            )?;
            output::print_output(&out, global.quiet);
            Ok(())
        }
    }
}
