use anyhow::Result;

use bayes_token_cache::auth::{HttpAuthenticator, TokenManager, TokenStore};
use bayes_token_cache::config::{Config, LogFormat};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load()?;
    config.validate()?;

    init_logging(&config);

    tracing::debug!(
        "Token file: {}, login endpoint: {}",
        config.token_file.display(),
        config.login_url
    );

    let authenticator = HttpAuthenticator::new(
        config.login_url.clone(),
        config.http_connect_timeout,
        config.http_request_timeout,
    )?;
    let manager = TokenManager::new(
        config.credential.clone(),
        TokenStore::new(config.token_file.clone()),
        authenticator,
    )
    .with_login_timeout(config.login_timeout());

    if config.status_only {
        print_status(&manager);
        return Ok(());
    }

    match manager.get_token().await {
        Ok(token) => {
            println!("{}", token);
            Ok(())
        }
        Err(e) => {
            tracing::error!("❌ {}", e);
            Err(e.into())
        }
    }
}

/// Initialize logging on stderr so stdout carries only the token
fn init_logging(config: &Config) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(config.log_level.to_lowercase()));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_file(true)
        .with_line_number(true);

    match config.log_format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }
}

fn print_status(manager: &TokenManager<HttpAuthenticator>) {
    println!("  Token file:  {}", manager.store().path().display());
    match manager.status() {
        Some(status) => {
            let state = if status.fresh { "fresh" } else { "stale" };
            println!("  State:       {}", state);
            println!("  Expires at:  {}", status.token.expires_at.to_rfc3339());
            println!("  Remaining:   {}s", status.remaining.num_seconds());
        }
        None => println!("  State:       missing"),
    }
}
