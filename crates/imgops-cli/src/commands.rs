//! Command implementations for the imgops CLI

use anyhow::{bail, Context};
use imgops_config::EngineConfig;
use imgops_engine::{BuildIntent, EngineClient, RunIntent};
use std::io::Read;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Parse `KEY=VALUE`; the value may itself contain `=`
pub fn parse_key_val(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected KEY=VALUE, got {:?}", s)),
    }
}

/// Parse `HOST:CONTAINER`
pub fn parse_port(s: &str) -> Result<(String, String), String> {
    match s.split_once(':') {
        Some((host, container)) if !host.is_empty() && !container.is_empty() => {
            Ok((host.to_string(), container.to_string()))
        }
        _ => Err(format!("expected HOST:CONTAINER, got {:?}", s)),
    }
}

// Print engine output lines to stderr as they arrive.
fn print_progress() -> (mpsc::UnboundedSender<String>, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    let printer = tokio::spawn(async move {
        while let Some(line) = rx.recv().await {
            eprintln!("{}", line);
        }
    });
    (tx, printer)
}

pub async fn info(client: &EngineClient) -> anyhow::Result<()> {
    client.check_engine_running().await?;
    println!("{} daemon is running", client.program());
    Ok(())
}

pub async fn platform(client: &EngineClient) -> anyhow::Result<()> {
    let platform = client.platform().await?;
    println!("{}", platform);
    Ok(())
}

pub fn cred_helper(client: &EngineClient, uri: &str) {
    println!("{}", client.is_credential_helper_enabled(uri));
}

pub async fn build(
    client: &EngineClient,
    cancel: &CancellationToken,
    intent: &BuildIntent,
) -> anyhow::Result<()> {
    let (tx, printer) = print_progress();
    let result = client.build(cancel, intent, tx).await;
    let _ = printer.await;
    result?;

    for image in intent.images() {
        println!("{}", image);
    }
    Ok(())
}

pub async fn login(client: &EngineClient, uri: &str, username: &str) -> anyhow::Result<()> {
    let mut password = String::new();
    std::io::stdin()
        .read_to_string(&mut password)
        .context("read password from stdin")?;
    let password = password.trim_end_matches(['\r', '\n']);
    if password.is_empty() {
        bail!("no password on stdin");
    }

    client.login(uri, username, password).await?;
    println!("Login succeeded");
    Ok(())
}

pub async fn push(
    client: &EngineClient,
    cancel: &CancellationToken,
    uri: &str,
    tags: &[String],
) -> anyhow::Result<()> {
    let (tx, printer) = print_progress();
    let result = client.push(cancel, uri, tx, tags).await;
    let _ = printer.await;

    println!("{}", result?);
    Ok(())
}

pub async fn run(
    client: &EngineClient,
    cancel: &CancellationToken,
    intent: &RunIntent,
) -> anyhow::Result<()> {
    let (tx, printer) = print_progress();
    let result = client.run_container(cancel, intent, tx).await;
    let _ = printer.await;
    result?;
    Ok(())
}

pub async fn ps(client: &EngineClient, name: &str) -> anyhow::Result<bool> {
    let running = client.is_container_running(name).await?;
    println!("{}", if running { "running" } else { "not running" });
    Ok(running)
}

pub fn config(init: bool) -> anyhow::Result<()> {
    let config_path = EngineConfig::config_path()?;

    if init && !config_path.exists() {
        EngineConfig::default().save_to(&config_path)?;
        println!("Created default config at {:?}", config_path);
    }

    if config_path.exists() {
        let config = EngineConfig::load_from(&config_path)?;
        println!("# Config file: {:?}\n", config_path);
        print!("{}", config.to_toml_string()?);
    } else {
        println!("# Config file: {:?} (not created yet)\n", config_path);
        println!("# Default configuration:");
        print!("{}", EngineConfig::default().to_toml_string()?);
        println!("\n# Run 'imgops config --init' to create the config file.");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_key_val() {
        assert_eq!(
            parse_key_val("GOPROXY=direct").unwrap(),
            ("GOPROXY".to_string(), "direct".to_string())
        );
        assert_eq!(
            parse_key_val("OPTS=a=b").unwrap(),
            ("OPTS".to_string(), "a=b".to_string())
        );
        assert_eq!(parse_key_val("EMPTY=").unwrap().1, "");
        assert!(parse_key_val("novalue").is_err());
        assert!(parse_key_val("=x").is_err());
    }

    #[test]
    fn test_parse_port() {
        assert_eq!(
            parse_port("8080:80").unwrap(),
            ("8080".to_string(), "80".to_string())
        );
        assert!(parse_port("8080").is_err());
        assert!(parse_port(":80").is_err());
    }
}
