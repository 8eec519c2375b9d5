use std::path::Path;

use anyhow::{bail, Context};
use colored::Colorize;
use serde::Serialize;
use tlsb2_storage::{B2Storage, CertStorage, StorageConfig};

use crate::cli::*;

pub async fn run_command(cli: Cli) -> anyhow::Result<()> {
    let config = load_config(cli.config.as_deref(), cli.prefix.as_deref(), cli.no_index)?;
    let storage = B2Storage::from_env(config)?;
    let output = execute(&storage, cli.command, cli.format).await?;
    println!("{output}");
    Ok(())
}

/// Storage configuration from an optional file plus command-line overrides.
pub fn load_config(path: Option<&Path>, prefix: Option<&str>, no_index: bool) -> anyhow::Result<StorageConfig> {
    let mut config = match path {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            StorageConfig::from_toml_str(&text)?
        }
        None => StorageConfig::default(),
    };
    if let Some(prefix) = prefix {
        config.prefix = prefix.to_string();
    }
    if no_index {
        config.use_index = false;
    }
    Ok(config)
}

pub async fn execute(storage: &B2Storage, command: Command, format: OutputFormat) -> anyhow::Result<String> {
    match command {
        Command::Site(args) => match args.action {
            SiteAction::Exists { domain } => cmd_site_exists(storage, &domain, format).await,
            SiteAction::Show { domain } => cmd_site_show(storage, &domain, format).await,
            SiteAction::Delete { domain } => {
                storage.delete_site(&domain).await?;
                Ok(format!("{} Deleted {}", "✓".green().bold(), domain.yellow()))
            }
        },
        Command::User(args) => match args.action {
            UserAction::Show { email } => cmd_user_show(storage, &email, format).await,
            UserAction::Latest => cmd_user_latest(storage, format).await,
        },
        Command::List => cmd_list(storage, format).await,
        Command::Reindex => {
            let entries = storage.rebuild_index().await?;
            Ok(format!("{} Indexed {} objects", "✓".green().bold(), entries.to_string().bold()))
        }
        Command::Truncate(args) => {
            if !args.yes {
                bail!(
                    "refusing to delete everything under {}/ without --yes",
                    storage.namespace().prefix()
                );
            }
            let deleted = storage.truncate().await?;
            Ok(format!("{} Deleted {} object versions", "✓".green().bold(), deleted))
        }
    }
}

fn json<T: Serialize>(value: &T) -> anyhow::Result<String> {
    Ok(serde_json::to_string_pretty(value)?)
}

async fn cmd_site_exists(storage: &B2Storage, domain: &str, format: OutputFormat) -> anyhow::Result<String> {
    let exists = storage.site_exists(domain).await?;
    match format {
        OutputFormat::Json => json(&serde_json::json!({ "domain": domain, "exists": exists })),
        OutputFormat::Text if exists => Ok(format!("{} {} is stored", "✓".green(), domain.yellow())),
        OutputFormat::Text => Ok(format!("{} {} is not stored", "✗".red(), domain.yellow())),
    }
}

#[derive(Serialize)]
struct SiteSummary<'a> {
    domain: &'a str,
    cert_bytes: usize,
    key_bytes: usize,
    meta: String,
}

async fn cmd_site_show(storage: &B2Storage, domain: &str, format: OutputFormat) -> anyhow::Result<String> {
    let site = storage.load_site(domain).await?;
    let summary = SiteSummary {
        domain,
        cert_bytes: site.cert.len(),
        key_bytes: site.key.len(),
        meta: String::from_utf8_lossy(&site.meta).into_owned(),
    };
    match format {
        OutputFormat::Json => json(&summary),
        OutputFormat::Text => Ok(format!(
            "Site {}\n  certificate: {} bytes\n  private key: {} bytes\n  metadata:    {}",
            summary.domain.yellow().bold(),
            summary.cert_bytes,
            summary.key_bytes,
            summary.meta
        )),
    }
}

async fn cmd_user_show(storage: &B2Storage, email: &str, format: OutputFormat) -> anyhow::Result<String> {
    let user = storage.load_user(email).await?;
    match format {
        OutputFormat::Json => json(&serde_json::json!({
            "email": email,
            "registration": String::from_utf8_lossy(&user.reg),
            "key_bytes": user.key.len(),
        })),
        OutputFormat::Text => Ok(format!(
            "Account {}\n  registration: {}\n  key:          {} bytes",
            email.yellow().bold(),
            String::from_utf8_lossy(&user.reg),
            user.key.len()
        )),
    }
}

async fn cmd_user_latest(storage: &B2Storage, format: OutputFormat) -> anyhow::Result<String> {
    let latest = storage.most_recent_user_email().await?;
    match (format, latest) {
        (OutputFormat::Json, latest) => json(&serde_json::json!({ "email": latest })),
        (OutputFormat::Text, Some(email)) => Ok(email),
        (OutputFormat::Text, None) => Ok("No accounts stored.".to_string()),
    }
}

async fn cmd_list(storage: &B2Storage, format: OutputFormat) -> anyhow::Result<String> {
    let sites = storage.list_sites().await?;
    let users = storage.list_users().await?;
    if format == OutputFormat::Json {
        return json(&serde_json::json!({ "sites": sites, "users": users }));
    }

    let mut out = format!("Sites ({}):", sites.len().to_string().bold());
    for site in &sites {
        out.push_str(&format!("\n  {}", site.yellow()));
    }
    out.push_str(&format!("\nAccounts ({}):", users.len().to_string().bold()));
    for user in &users {
        out.push_str(&format!("\n  {}", user.cyan()));
    }
    Ok(out)
}
