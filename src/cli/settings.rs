use anyhow::Result;
use clap::Subcommand;

use crate::{
    daemon::config::{load_config, save_config, Config, ConfigPatch},
    utils::dir::AppPaths,
};

use super::process::{is_server_running, kill_previous_servers, restart_server};

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    #[command(about = "Print the current config")]
    Show {
        #[arg(long, help = "Print the config as json")]
        json: bool,
    },
    #[command(about = "Change config values. A running daemon is restarted to pick them up")]
    Set(ConfigValues),
}

#[derive(Debug, Default, clap::Args)]
pub struct ConfigValues {
    #[arg(long, help = "Minutes of continuous focus before a break reminder")]
    focus_minutes: Option<u32>,
    #[arg(long, help = "Seconds without input that still count as working")]
    active_threshold: Option<u32>,
    #[arg(long, help = "Seconds without input after which a break starts")]
    rest_reset: Option<u32>,
    #[arg(long, help = "Accent color as RRGGBB")]
    theme_color: Option<String>,
    #[arg(long)]
    user_name: Option<String>,
    #[arg(long)]
    launch_at_login: Option<bool>,
    #[arg(long, help = "Ask for a reminder that stays until dismissed")]
    full_screen: Option<bool>,
}

impl From<ConfigValues> for ConfigPatch {
    fn from(values: ConfigValues) -> Self {
        ConfigPatch {
            focus_duration_sec: values.focus_minutes.map(|m| m.saturating_mul(60)),
            active_threshold_sec: values.active_threshold,
            rest_reset_sec: values.rest_reset,
            theme_color: values
                .theme_color
                .map(|c| c.trim_start_matches('#').to_uppercase()),
            user_name: values.user_name,
            launch_at_login: values.launch_at_login,
            is_first_launch: None,
            full_screen_notification: values.full_screen,
        }
    }
}

pub async fn process_config_command(command: ConfigCommand, paths: &AppPaths) -> Result<()> {
    match command {
        ConfigCommand::Show { json } => {
            let config = load_config(&paths.config()).await;
            if json {
                println!("{}", serde_json::to_string_pretty(&config)?);
            } else {
                print_config(&config);
            }
        }
        ConfigCommand::Set(values) => {
            let config = update_config(paths, values.into()).await?;
            print_config(&config);
        }
    }
    Ok(())
}

/// Finishes the first launch, optionally remembering how to greet the user.
pub async fn process_onboard_command(user_name: Option<String>, paths: &AppPaths) -> Result<()> {
    let config = update_config(
        paths,
        ConfigPatch {
            is_first_launch: Some(false),
            user_name,
            ..Default::default()
        },
    )
    .await?;
    if config.user_name.is_empty() {
        println!("All set");
    } else {
        println!("All set, {}", config.user_name);
    }
    Ok(())
}

/// The daemon only reads the config on start, and writes it on exit. It is stopped first so it
/// can't overwrite the change, and started again afterwards.
async fn update_config(paths: &AppPaths, patch: ConfigPatch) -> Result<Config> {
    let was_running = is_server_running()?;
    if was_running {
        kill_previous_servers()?;
    }

    let config = load_config(&paths.config()).await.apply(patch);
    save_config(&paths.config(), &config).await?;

    if was_running {
        restart_server(Some(paths.dir().as_path()))?;
    }
    Ok(config)
}

fn print_config(config: &Config) {
    println!("Focus duration\t{} min", config.focus_duration_sec / 60);
    println!("Active threshold\t{} s", config.active_threshold_sec);
    println!("Rest reset\t{} s", config.rest_reset_sec);
    println!("Theme color\t#{}", config.theme_color);
    if !config.user_name.is_empty() {
        println!("User name\t{}", config.user_name);
    }
    println!("Launch at login\t{}", config.launch_at_login);
    println!("Full screen reminder\t{}", config.full_screen_notification);
    if config.is_first_launch {
        println!("Run `mintick onboard` to finish the first launch");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_values_to_patch() {
        let patch: ConfigPatch = ConfigValues {
            focus_minutes: Some(45),
            theme_color: Some("#ff8a3d".into()),
            full_screen: Some(true),
            ..Default::default()
        }
        .into();

        assert_eq!(
            patch,
            ConfigPatch {
                focus_duration_sec: Some(2700),
                theme_color: Some("FF8A3D".into()),
                full_screen_notification: Some(true),
                ..Default::default()
            }
        );
        let config = Config::default().apply(patch);
        assert_eq!(config.focus_duration_sec, 2700);
        assert_eq!(config.rest_reset_sec, 180);
    }
}
