use std::io::{self, BufRead, Write};

use anyhow::{anyhow, Context as _, Result};
use futures::future::join_all;
use serde_json::Value;
use tracing::{error, warn};

use tipdesk_core::{ApiError, ApiRequest, ApiResponse};

use crate::context::Context;

/// Feeds loaded by `tipdesk dashboard`, as (label, path)
const DASHBOARD_FEEDS: &[(&str, &str)] = &[
    ("Market overview", "/market/overview"),
    ("Today's tips", "/tips/today"),
    ("Economic calendar", "/calendar/economic"),
    ("Digest", "/digest/latest"),
    ("News", "/news"),
];

const PASSWORD_ENV: &str = "TIPDESK_PASSWORD";

/// Location for commands that are not tied to a dashboard screen
const HOME_LOCATION: &str = "/";

pub async fn login(email: Option<String>) -> Result<()> {
    let mut ctx = Context::new("/login")?;
    let email = resolve_email(email, ctx.config.last_email.as_deref(), prompt_line)?;
    let password = read_password()?;

    match ctx.session.login(&ctx.client, &email, &password).await {
        Ok(state) => {
            let who = state
                .user
                .map(|u| u.display_name())
                .unwrap_or_else(|| email.clone());
            println!("Signed in as {}", who);
            remember_email(&mut ctx, email);
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "Login failed");
            Err(anyhow!(e.user_message()))
        }
    }
}

pub async fn register(email: Option<String>, name: Option<String>) -> Result<()> {
    let mut ctx = Context::new("/register")?;
    let email = resolve_email(email, None, prompt_line)?;
    let name = match name {
        Some(name) => name,
        None => prompt_line("Name: ")?,
    };
    let password = read_password()?;

    ctx.session
        .register(&ctx.client, &email, &password, &name)
        .await
        .map_err(|e| {
            error!(error = %e, "Registration failed");
            anyhow!(e.user_message())
        })?;
    println!("Account created. Signed in as {}", name);
    remember_email(&mut ctx, email);
    Ok(())
}

pub fn logout() -> Result<()> {
    let ctx = Context::new(HOME_LOCATION)?;
    let was_signed_in = ctx.session.is_authenticated();
    ctx.session.logout();
    if was_signed_in {
        println!("Signed out");
    } else {
        println!("Not signed in");
    }
    Ok(())
}

pub async fn status(verify: bool) -> Result<()> {
    let ctx = Context::new(HOME_LOCATION)?;
    if !ctx.session.is_authenticated() {
        println!("Not signed in");
        return Ok(());
    }
    if !verify {
        println!("Signed in (stored session, not verified)");
        return Ok(());
    }

    match ctx.session.verify(&ctx.client).await {
        Ok(state) => {
            let who = state
                .user
                .map(|u| u.display_name())
                .unwrap_or_else(|| "unknown user".to_string());
            println!("Signed in as {}", who);
            Ok(())
        }
        Err(ApiError::Unauthorized) => {
            ctx.report_redirects();
            println!("Stored session is no longer valid");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

pub async fn get(path: &str) -> Result<()> {
    let ctx = Context::new(HOME_LOCATION)?;
    let response = fetch(&ctx, path).await?;
    match response.json::<Value>() {
        Ok(json) => println!("{}", serde_json::to_string_pretty(&json)?),
        Err(_) => println!("{}", response.text()),
    }
    Ok(())
}

/// GET `path`, reporting a forced return to the login screen as an error.
async fn fetch(ctx: &Context, path: &str) -> Result<ApiResponse> {
    let result = ctx.client.send(ApiRequest::get(path)).await;
    if ctx.report_redirects() {
        return Err(ApiError::Unauthorized.into());
    }
    Ok(result?)
}

/// Load every feed at once; one failing feed does not hide the others.
pub async fn dashboard() -> Result<()> {
    let ctx = Context::new("/dashboard")?;

    let requests = DASHBOARD_FEEDS
        .iter()
        .map(|(_, path)| ctx.client.get::<Value>(path));
    let results = join_all(requests).await;

    if ctx.report_redirects() {
        return Err(ApiError::Unauthorized.into());
    }

    let mut failures = 0;
    for ((label, _), result) in DASHBOARD_FEEDS.iter().zip(results) {
        match result {
            Ok(value) => println!("{:<18} {}", label, summarize(&value)),
            Err(e) => {
                failures += 1;
                warn!(feed = *label, error = %e, "Feed failed");
                println!("{:<18} unavailable ({})", label, e);
            }
        }
    }

    if failures == DASHBOARD_FEEDS.len() {
        return Err(anyhow!("All dashboard feeds failed"));
    }
    Ok(())
}

/// One-line description of a feed payload
fn summarize(value: &Value) -> String {
    let data = match value {
        Value::Object(map) if map.contains_key("data") => &map["data"],
        other => other,
    };
    match data {
        Value::Array(items) => format!("{} item(s)", items.len()),
        Value::Object(map) => format!("{} field(s)", map.len()),
        Value::Null => "empty".to_string(),
        other => other.to_string(),
    }
}

/// Explicit flag or env wins, then the last used email, then a prompt
fn resolve_email(
    explicit: Option<String>,
    remembered: Option<&str>,
    prompt: impl FnOnce(&str) -> Result<String>,
) -> Result<String> {
    let email = match explicit.or_else(|| remembered.map(str::to_string)) {
        Some(email) => email,
        None => prompt("Email: ")?,
    };
    let email = email.trim().to_string();
    if email.is_empty() {
        return Err(anyhow!("Email is required"));
    }
    Ok(email)
}

fn read_password() -> Result<String> {
    let password = match std::env::var(PASSWORD_ENV) {
        Ok(password) => password,
        Err(_) => rpassword::prompt_password("Password: ").context("Failed to read password")?,
    };
    if password.is_empty() {
        return Err(anyhow!("Password is required"));
    }
    Ok(password)
}

fn prompt_line(label: &str) -> Result<String> {
    eprint!("{}", label);
    io::stderr().flush()?;
    let mut line = String::new();
    io::stdin()
        .lock()
        .read_line(&mut line)
        .context("Failed to read input")?;
    Ok(line.trim().to_string())
}

fn remember_email(ctx: &mut Context, email: String) {
    ctx.config.last_email = Some(email);
    if let Err(e) = ctx.config.save() {
        warn!(error = %e, "Failed to save config");
    }
}
