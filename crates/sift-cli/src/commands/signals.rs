//! Goal signal command implementations

use anyhow::Result;
use sift_core::models::{Severity, SignalKind, SignalStatus};
use sift_core::Database;

pub fn cmd_signals_list(
    db: &Database,
    user: &str,
    status: Option<&str>,
    all: bool,
    json: bool,
) -> Result<()> {
    let status = if all {
        None
    } else {
        Some(match status {
            Some(s) => s.parse::<SignalStatus>().map_err(anyhow::Error::msg)?,
            None => SignalStatus::Active,
        })
    };
    let signals = db.list_signals(user, status)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&signals)?);
        return Ok(());
    }

    if signals.is_empty() {
        println!("✅ No signals. Nothing needs your attention.");
        return Ok(());
    }

    println!();
    println!("🔔 Signals ({})", signals.len());
    println!("   ─────────────────────────────────────────────────────────────");
    for signal in signals {
        let icon = match signal.severity {
            Severity::Alert => "🚨",
            Severity::Warning => "⚠️ ",
            Severity::Attention => "👀",
            Severity::Info => "ℹ️ ",
        };
        let kind = match signal.kind {
            SignalKind::Suggestion => " (suggestion)",
            SignalKind::Signal => "",
        };
        println!("   [{}] {} {}{}", signal.id, icon, signal.message, kind);
        println!(
            "        {} · {} · {}",
            signal.rule,
            signal.status,
            signal.created_at.format("%Y-%m-%d")
        );
    }
    println!();
    println!("   Use 'sift signals accept <id>' or 'sift signals dismiss <id>'.");
    Ok(())
}

pub fn cmd_signals_accept(db: &Database, id: i64) -> Result<()> {
    db.accept_signal(id)?;
    println!("✅ Accepted signal {}", id);
    Ok(())
}

pub fn cmd_signals_dismiss(db: &Database, id: i64) -> Result<()> {
    db.dismiss_signal(id)?;
    println!("🔕 Dismissed signal {}", id);
    Ok(())
}
