//! Agent discovery and diagnostics commands

use anyhow::{Context, Result, bail};

use taskrail::agent::classifier::{self, ErrorClass};
use taskrail::agent::resolver::resolve_execution;
use taskrail::agent::AgentAdapter;

use super::App;

fn adapter(app: &App, agent: Option<&str>) -> Result<std::sync::Arc<dyn AgentAdapter>> {
    let id = agent.unwrap_or(app.config.default_agent.as_str());
    app.registry
        .get(id)
        .with_context(|| format!("Unknown agent '{}' (known: {})", id, app.registry.ids().join(", ")))
}

/// Print where the agent executable was found and how it will be launched
pub async fn resolve_command(app: &App, agent: Option<&str>, json: bool) -> Result<()> {
    let adapter = adapter(app, agent)?;
    let Some(path) = adapter.resolve_executable().await else {
        bail!("{} executable not found", adapter.id());
    };
    let plan = resolve_execution(&path);

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({
                "agent": adapter.id(),
                "path": path,
                "command": plan.command,
                "prepend_args": plan.prepend_args,
            }))?
        );
    } else {
        println!("{}: {}", adapter.id(), path.display());
        if !plan.prepend_args.is_empty() {
            println!(
                "  runs as: {} {}",
                plan.command.display(),
                plan.prepend_args.join(" ")
            );
        }
    }
    Ok(())
}

pub fn models_command(app: &App, agent: Option<&str>, resolve: Option<&str>, json: bool) -> Result<()> {
    let adapter = adapter(app, agent)?;
    let models = adapter.models();

    if let Some(input) = resolve {
        println!("{}", models.resolve(input));
        return Ok(());
    }

    if json {
        println!("{}", serde_json::to_string_pretty(models.models())?);
        return Ok(());
    }

    for model in models.models() {
        let alias = model.alias.as_deref().map(|a| format!(" ({})", a)).unwrap_or_default();
        let legacy = if model.is_legacy { " [legacy]" } else { "" };
        let default = if models.default_model() == Some(model.id.as_str()) { " *" } else { "" };
        println!("{} v{}{}{}{}", model.id, model.version, alias, legacy, default);
    }
    Ok(())
}

/// Health, auth and usage probes; optionally open the login flow
pub async fn check_command(app: &App, agent: Option<&str>, reauth: bool) -> Result<()> {
    let adapter = adapter(app, agent)?;

    let health = adapter.health_check().await;
    if !health.available {
        println!("{}: not available", adapter.id());
        return Ok(());
    }
    println!(
        "{}: {} ({})",
        adapter.id(),
        health.version.as_deref().unwrap_or("unknown version"),
        health.path.as_ref().map(|p| p.display().to_string()).unwrap_or_default()
    );

    let auth = adapter.validate_auth().await;
    match &auth.message {
        None => println!("  auth: ok"),
        Some(message) => println!("  auth: FAILED - {}", message),
    }

    let usage = adapter.check_usage_limits().await;
    match (usage.is_usage_limit, usage.reset_at) {
        (false, _) => println!("  usage: ok"),
        (true, Some(reset)) => println!("  usage: limit reached, resets {}", reset.to_rfc3339()),
        (true, None) => println!("  usage: limit reached"),
    }

    if reauth || !auth.authenticated {
        if reauth {
            adapter.trigger_reauth()?;
            println!("  opened a terminal for login");
        } else {
            println!("  run with --reauth to log in");
        }
    }
    Ok(())
}

/// Show how a piece of agent output would be classified
pub fn classify_command(text: &str) -> Result<()> {
    let class = match classifier::classify(text) {
        ErrorClass::UsageLimit => "usage-limit",
        ErrorClass::RateLimit => "rate-limit",
        ErrorClass::Auth => "auth",
        ErrorClass::None => "none",
    };
    println!("{}", class);
    if class == "usage-limit" {
        if let Some(reset) = classifier::detect_usage_limit(text).reset_at {
            println!("resets at {}", reset.to_rfc3339());
        }
    }
    Ok(())
}
