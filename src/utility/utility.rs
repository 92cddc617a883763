//! Utilities
use log::*;
use std::{env, fs, collections::HashMap, io::Write};
use chrono::{DateTime, Local};
use anyhow::{Result, Context};

/// Resolve a setting: the command line option wins, then the environment (loaded from `.env`), then the default.
///
/// Settings that were set explicitly or via the environment are recorded in `changed_options`,
/// so they can be written back with [dotenv_writer].
pub fn set_option(
    option: &Option<String>,
    variable: &str,
    default: &str,
    changed_options: &mut HashMap<String, String>,
) -> String
{
    if let Some(value) = option {
        info!("{} argument set: using: {}", variable, value);
        changed_options.insert(variable.to_string(), value.to_string());
        return value.to_string();
    }
    match env::var(variable) {
        Ok(set_var) => {
            info!("{} not set: set via .env: {}", variable, set_var);
            changed_options.insert(variable.to_string(), set_var.to_owned());
            set_var
        }
        Err(_e) => {
            info!("{} not set: and not set via .env: using default: {}", variable, default);
            default.to_string()
        }
    }
}

/// Same as [set_option], parsed into a number.
pub fn set_number_option(
    option: &Option<String>,
    variable: &str,
    default: u64,
    changed_options: &mut HashMap<String, String>,
) -> Result<u64>
{
    let value = set_option(option, variable, &default.to_string(), changed_options);
    value.parse()
        .with_context(|| format!("{} should be a number, got: {}", variable, value))
}

pub fn dotenv_writer(
    write_dotenv: bool,
    changed_options: HashMap<String, String>,
) -> Result<()>
{
    if !changed_options.is_empty() && write_dotenv {
        info!("Writing .env file");
        let mut file = fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(".env")
            .with_context(|| "Error writing .env file: .env")?;

        for (key, value) in changed_options {
            file.write_all(format!("{}={}\n", key, value).as_bytes())?;
            info!("{}={}", key, value);
        }
    }
    Ok(())
}

/// Render a number of seconds as `MMmSSs.T`.
pub fn time2str(seconds: f64) -> String {
    let whole = seconds.trunc() as i64;
    format!("{:02}m{:02}s.{}", whole / 60, whole % 60, ((seconds - seconds.trunc()) * 10.0) as i64)
}

/// Epoch seconds with millisecond precision.
pub fn epoch_seconds(time: DateTime<Local>) -> f64 {
    time.timestamp_millis() as f64 / 1000.0
}

/// The name this machine reports to the server.
pub fn local_hostname() -> Option<String> {
    match hostname::get() {
        Ok(name) => name.into_string().ok(),
        Err(e) => {
            warn!("cannot determine hostname: {}", e);
            None
        }
    }
}
