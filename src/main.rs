mod app;
mod broker;
mod config;
mod controller;
mod data_manager;
mod logger;
mod settings;
mod theme;
mod workspace;

use std::io::{self, BufRead};
use std::thread;

use anyhow::{Context, Result};
use crossbeam_channel::{select, Receiver};

use app::{AppPaths, Application};
use broker::Tick;
use controller::{control_channel, ControlHandle, ControlResponse, WorkstationCommand};

const HELP: &str = "commands: connect | disconnect | broker <name> | reload | sub <id> <symbol> | unsub <id> | \
history <symbol> | account | portfolio | expirations <symbol> | strikes <symbol> <expiry> | \
chain <symbol> <expiry> [C|P] | logs | themes | theme <name> | edit | production | save | quit";

fn main() -> Result<()> {
    println!("Trading workstation\n{HELP}\n");

    let (controller, handle) = control_channel();
    let (tick_tx, tick_rx) = crossbeam_channel::unbounded();
    spawn_console_input(handle.clone())?;
    spawn_console_output(handle, tick_rx)?;

    // Single-threaded runtime: broker tasks and the command loop take turns.
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("building tokio runtime")?;

    runtime.block_on(async {
        let mut app = Application::startup(AppPaths::from_env(), controller, tick_tx).await?;
        app.run().await
    })
}

fn spawn_console_input(handle: ControlHandle) -> Result<()> {
    thread::Builder::new()
        .name("console-input".into())
        .spawn(move || {
            for line in io::stdin().lock().lines() {
                let Ok(line) = line else { break };
                if line.trim().is_empty() {
                    continue;
                }
                if line.trim() == "help" {
                    println!("{HELP}");
                    continue;
                }
                match line.parse::<WorkstationCommand>() {
                    Ok(command) => {
                        if !handle.send(command) {
                            break;
                        }
                    }
                    Err(e) => println!("❌ {e}"),
                }
            }
        })
        .context("spawning console input thread")?;
    Ok(())
}

fn spawn_console_output(handle: ControlHandle, ticks: Receiver<Tick>) -> Result<()> {
    thread::Builder::new()
        .name("console-output".into())
        .spawn(move || loop {
            select! {
                recv(handle.responses()) -> msg => match msg {
                    Ok(response) => print_response(response),
                    Err(_) => break,
                },
                recv(ticks) -> msg => match msg {
                    Ok(tick) => println!("📈 {tick}"),
                    Err(_) => break,
                },
            }
        })
        .context("spawning console output thread")?;
    Ok(())
}

fn print_response(response: ControlResponse) {
    match response {
        ControlResponse::BrokerSelected { name, changed } => {
            if changed {
                println!("✅ Broker: {name}");
            } else {
                println!("ℹ️  {name} is already selected");
            }
        }
        ControlResponse::Connected => println!("✅ Connected"),
        ControlResponse::Disconnected => println!("✅ Disconnected"),
        ControlResponse::Subscribed { request_id, outcome } => {
            println!("✅ Subscription {request_id}: {outcome:?}")
        }
        ControlResponse::Unsubscribed { request_id, existed } => {
            if existed {
                println!("✅ Subscription {request_id} cancelled");
            } else {
                println!("ℹ️  No subscription {request_id}");
            }
        }
        ControlResponse::History(bars) => {
            for bar in bars {
                println!(
                    "{}  O {:.2}  H {:.2}  L {:.2}  C {:.2}  V {}",
                    bar.date, bar.open, bar.high, bar.low, bar.close, bar.volume
                );
            }
        }
        ControlResponse::Account(summary) => {
            println!("Account {}", summary.account);
            for value in summary.values {
                println!("  {:<20} {:>14} {}", value.tag, value.value, value.currency);
            }
        }
        ControlResponse::Portfolio(positions) => {
            for p in positions {
                println!("  {:<10} {:>10} @ {:.2}  ({})", p.instrument.symbol, p.quantity, p.avg_cost, p.account);
            }
        }
        ControlResponse::Expirations(expirations) => println!("{}", expirations.join(" ")),
        ControlResponse::Strikes(strikes) => {
            let strikes: Vec<String> = strikes.iter().map(|s| s.to_string()).collect();
            println!("{}", strikes.join(" "));
        }
        ControlResponse::Chain(contracts) => {
            for details in contracts {
                println!("  {}", details.contract);
            }
        }
        ControlResponse::Logs(entries) => {
            for entry in entries {
                println!("{entry}");
            }
        }
        ControlResponse::Themes { names, active } => {
            for name in names {
                let marker = if active.as_deref() == Some(name.as_str()) { "*" } else { " " };
                println!(" {marker} {name}");
            }
        }
        ControlResponse::ThemeApplied { name, rendered } => {
            if rendered {
                println!("✅ Theme {name} applied");
            } else {
                println!("⚠️  Theme {name} selected but the stylesheet could not be rendered");
            }
        }
        ControlResponse::ModeChanged(state) => println!("Mode: {state}"),
        ControlResponse::Saved => println!("✅ Saved"),
        ControlResponse::Error(e) => println!("❌ {e}"),
        ControlResponse::ShuttingDown => println!("👋 Shutting down"),
    }
}
