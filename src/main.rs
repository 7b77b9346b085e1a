mod auth;
mod cache;
mod calc;
mod ipc;
mod report;
mod settings;
mod sheets;

use std::io::{self, BufRead, Write};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// stdout carries the IPC protocol, so logs go to stderr.
fn init_tracing() {
    let filter = EnvFilter::try_from_env("GRADEBOARD_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("gradeboardd=info,warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact().with_writer(io::stderr))
        .init();
}

fn main() {
    init_tracing();

    let initial = match settings::load_settings_from_env() {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(error = %format!("{:#}", e), "ignoring settings from environment");
            None
        }
    };
    let mut state = ipc::AppState::new(initial);
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        settings_loaded = state.settings.is_some(),
        "gradeboardd ready"
    );

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(v) => v,
            Err(e) => {
                tracing::error!(error = %e, "stdin read failed");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let req: ipc::Request = match serde_json::from_str(&line) {
            Ok(v) => v,
            Err(e) => {
                // No id to echo back.
                tracing::warn!(error = %e, "bad request line");
                let resp = ipc::err("", "bad_json", e.to_string(), None);
                let _ = writeln!(stdout, "{}", resp);
                let _ = stdout.flush();
                continue;
            }
        };

        let resp = ipc::handle_request(&mut state, req);
        let _ = writeln!(
            stdout,
            "{}",
            serde_json::to_string(&resp).unwrap_or_else(|_| "{\"ok\":false}".to_string())
        );
        let _ = stdout.flush();
    }
}
