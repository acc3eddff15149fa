use anyhow::{Context, Result};
use dialoguer::Password;
use std::sync::Arc;

use sayahat_client::config::{Command, Config};
use sayahat_client::error::ApiError;
use sayahat_client::http_client::ApiClient;
use sayahat_client::navigation::LogNavigator;
use sayahat_client::session::{identity, LoginRequest, SessionManager, SignupRequest};
use sayahat_client::store::SqliteStore;

#[tokio::main]
async fn main() -> Result<()> {
    let (config, command) = Config::load()?;
    config.validate()?;

    // Initialize logging with a configured level
    let log_level = config.log_level.to_lowercase();
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .with_writer(std::io::stderr)
        .init();

    tracing::debug!(api_base = %config.client.api_base, "Configuration loaded");
    tracing::debug!("Session database: {}", config.session_db.display());

    let store = Arc::new(SqliteStore::open(&config.session_db)?);
    let session = Arc::new(SessionManager::new(store));
    let client = ApiClient::new(&config.client, session.clone(), Arc::new(LogNavigator))?;

    match run(&client, command).await {
        Ok(()) => Ok(()),
        Err(e) => {
            // Classified API errors print their user message only
            if let Some(api_err) = e.downcast_ref::<ApiError>() {
                eprintln!("Error: {}", api_err);
                std::process::exit(1);
            }
            Err(e)
        }
    }
}

async fn run(client: &ApiClient, command: Command) -> Result<()> {
    match command {
        Command::Signup { email, username } => {
            let password = prompt_password("Password", true)?;
            let payload = SignupRequest {
                email,
                username,
                password: password.clone(),
                password2: password,
            };
            client.signup(&payload).await?;
            println!("Account created. Log in with: sayahat login --email <email>");
        }

        Command::Login { email } => {
            let password = prompt_password("Password", false)?;
            let credentials = LoginRequest { email, password };
            match client.login(&credentials).await {
                Ok(tokens) => {
                    let who = identity::session_identity(Some(&tokens.access));
                    println!("Logged in as {}", who.as_deref().unwrap_or("unknown"));
                }
                Err(ApiError::Status { status: 400 | 401, .. }) => {
                    eprintln!("Error: Invalid credentials");
                    std::process::exit(1);
                }
                Err(e) => return Err(e.into()),
            }
        }

        Command::Logout => {
            client.logout()?;
            println!("Logged out");
        }

        Command::Whoami => {
            require_auth(client)?;
            let profile = client.fetch_profile().await?;
            println!("{}", serde_json::to_string_pretty(&profile)?);
        }

        Command::Avatar { path } => {
            require_auth(client)?;
            let bytes = std::fs::read(&path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            let filename = path
                .file_name()
                .and_then(|name| name.to_str())
                .unwrap_or("avatar");
            let profile = client.upload_avatar(bytes, filename).await?;
            println!("Avatar: {}", profile.avatar.as_deref().unwrap_or("-"));
        }

        Command::Get { path } => {
            require_auth(client)?;
            let body: serde_json::Value = client.get(&path).await?;
            println!("{}", serde_json::to_string_pretty(&body)?);
        }

        Command::Status => print_status(client)?,
    }

    Ok(())
}

/// Refuse protected commands when no session is stored
fn require_auth(client: &ApiClient) -> Result<()> {
    if !client.session().is_authenticated() {
        anyhow::bail!("Not logged in. Run: sayahat login --email <email>");
    }
    Ok(())
}

fn prompt_password(prompt: &str, confirm: bool) -> Result<String> {
    let mut input = Password::new().with_prompt(prompt);
    if confirm {
        input = input.with_confirmation("Repeat password", "Passwords do not match");
    }
    let password = input.interact().context("Failed to read password")?;
    if password.is_empty() {
        anyhow::bail!("Password cannot be empty");
    }
    Ok(password)
}

fn print_status(client: &ApiClient) -> Result<()> {
    let session = client.session();
    let access = session.access_token()?;

    println!("  Version:     {}", env!("CARGO_PKG_VERSION"));
    println!("  Logged in:   {}", if access.is_some() { "yes" } else { "no" });
    println!(
        "  Identity:    {}",
        session.identity().as_deref().unwrap_or("-")
    );

    if let Some(exp) = access.as_deref().and_then(identity::token_expiry) {
        let state = if exp <= chrono::Utc::now() { "expired" } else { "valid" };
        println!("  Access:      {} (until {})", state, exp.to_rfc3339());
    }
    println!(
        "  Refresh:     {}",
        if session.refresh_token()?.is_some() { "stored" } else { "none" }
    );
    println!("  Places key:  {}", session.scoped_key("travelPlaces")?);

    Ok(())
}
