use std::io::BufRead;
use std::sync::Arc;

use chrono::Local;
use serde::Serialize;
use tracing::{debug, error, info, warn};
use url::Url;

use sabhadesk::config::{load_config, print_schema};
use sabhadesk::guard::GuardDecision;
use sabhadesk::session::Navigator;
use sabhadesk::startup::{build_state, start};
use sabhadesk::state::AppState;
use sabhadesk::store::ChapterSelection;
use sabhadesk::utils::logger::init_logging;

const USAGE: &str = "usage: sabhadesk [--schema | login | logout | centers | events <center> | \
youths <center> | karyakartas <center> | dashboard <center> | attendance <sabha>]";

/// Terminal stand-in for a browser redirect.
struct PrintNavigator;

impl Navigator for PrintNavigator {
    fn navigate(&self, url: &Url) {
        eprintln!("Open this URL in a browser:\n\n  {}\n", url);
    }
}

#[tokio::main]
async fn main() {
    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.first().map(String::as_str) == Some("--schema") {
        print_schema();
        return;
    }

    let config = Arc::new(load_config());
    if let Err(e) = init_logging(&config.logging) {
        eprintln!("{}", e);
        std::process::exit(1);
    }

    let state = match build_state(config, Arc::new(PrintNavigator)) {
        Ok(state) => state,
        Err(e) => {
            error!("Startup failed: {}", e);
            std::process::exit(1);
        }
    };
    let _events = start(&state).await;

    let result = run_command(&state, &args).await;
    export_metrics(&state);
    if let Err(e) = result {
        error!("{}", e);
        std::process::exit(1);
    }
}

/// Publish this run's request and renewal counters.
fn export_metrics(state: &AppState) {
    match &state.config.metrics.textfile {
        Some(path) => match state.metrics.write_textfile(path) {
            Ok(()) => debug!("Wrote metrics to '{}'", path),
            Err(e) => warn!("Could not write metrics to '{}': {}", path, e),
        },
        None => debug!("Metrics for this run:\n{}", state.metrics.render()),
    }
}

async fn run_command(state: &AppState, args: &[String]) -> Result<(), String> {
    let command = args.first().map(String::as_str).unwrap_or("login");
    if command == "logout" {
        state.session.logout().await;
        println!("Signed out");
        return Ok(());
    }

    ensure_session(state).await?;

    match command {
        "login" => {
            let snapshot = state.session.snapshot();
            let name = snapshot
                .user
                .as_ref()
                .map(|u| u.username().to_string())
                .unwrap_or_default();
            println!("Signed in as {} with roles {:?}", name, snapshot.roles);
        }
        "centers" => print_json(&state.sabha_centers.fetch().await.map_err(|e| e.to_string())?)?,
        "events" => {
            let selection = select_center(state, args)?;
            print_json(&state.sabhas.fetch(selection).await.map_err(|e| e.to_string())?)?
        }
        "youths" => {
            let selection = select_center(state, args)?;
            print_json(&state.youths.fetch(selection).await.map_err(|e| e.to_string())?)?
        }
        "karyakartas" => {
            let selection = select_center(state, args)?;
            let karyakartas = state
                .youths
                .fetch_karyakartas(selection)
                .await
                .map_err(|e| e.to_string())?;
            print_json(&karyakartas)?
        }
        "dashboard" => dashboard(state, select_center(state, args)?).await?,
        "attendance" => {
            let sabha_id = numeric_arg(args, "sabha")?;
            state.current_sabha.set(sabha_id);
            let records = state
                .attendance
                .fetch(sabha_id)
                .await
                .map_err(|e| e.to_string())?;
            print_json(&records)?
        }
        other => return Err(format!("Unknown command '{}'\n{}", other, USAGE)),
    }
    Ok(())
}

/// Pass the view guard, completing an interactive login on the terminal if
/// the guard had to start one.
async fn ensure_session(state: &AppState) -> Result<(), String> {
    if state.guard.settled().await == GuardDecision::Render {
        return Ok(());
    }

    eprintln!("After signing in, paste the 'code' and 'state' values of the redirect:");
    let line = std::io::stdin()
        .lock()
        .lines()
        .next()
        .transpose()
        .map_err(|e| format!("Could not read callback values: {}", e))?
        .unwrap_or_default();
    let mut parts = line.split_whitespace();
    let (Some(code), Some(oauth_state)) = (parts.next(), parts.next()) else {
        return Err("Expected '<code> <state>'".to_string());
    };
    state.session.complete_login(code, oauth_state).await?;

    match state.guard.check().await {
        GuardDecision::Render => Ok(()),
        GuardDecision::Waiting => Err("Login did not produce a session".to_string()),
    }
}

fn select_center(state: &AppState, args: &[String]) -> Result<ChapterSelection, String> {
    let id = numeric_arg(args, "center")?;
    state.selector.select(id);
    Ok(state.selector.current())
}

fn numeric_arg(args: &[String], what: &str) -> Result<i64, String> {
    args.get(1)
        .ok_or_else(|| format!("Missing <{}> argument\n{}", what, USAGE))?
        .parse()
        .map_err(|e| format!("Invalid <{}> argument: {}", what, e))
}

async fn dashboard(state: &AppState, selection: ChapterSelection) -> Result<(), String> {
    let (youths, sabhas) = futures::future::join(
        state.youths.fetch(selection),
        state.sabhas.fetch(selection),
    )
    .await;
    let youths = youths.map_err(|e| e.to_string())?;
    let sabhas = sabhas.map_err(|e| e.to_string())?;
    let active = youths.iter().filter(|y| y.is_active).count();
    info!("Dashboard loaded for {:?}", selection.id());

    println!("Youths: {} ({} active)", youths.len(), active);
    println!("Sabhas: {}", sabhas.len());
    let birthdays = state.youths.birthdays_in_week(Local::now().date_naive()).await;
    if birthdays.is_empty() {
        println!("No birthdays this week");
    }
    for youth in birthdays {
        let date = youth
            .birth_date
            .map(|d| d.format("%d %B").to_string())
            .unwrap_or_default();
        println!("Birthday: {} ({})", youth.full_name(), date);
    }
    Ok(())
}

fn print_json<T: Serialize>(items: &T) -> Result<(), String> {
    let out = serde_json::to_string_pretty(items).map_err(|e| e.to_string())?;
    println!("{}", out);
    Ok(())
}
