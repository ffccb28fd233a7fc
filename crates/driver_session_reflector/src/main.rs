/*  Copyright 2022-23, Juspay India Pvt Ltd
    This program is free software: you can redistribute it and/or modify it under the terms of the GNU Affero General Public License
    as published by the Free Software Foundation, either version 3 of the License, or (at your option) any later version. This program
    is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of MERCHANTABILITY
    or FITNESS FOR A PARTICULAR PURPOSE. See the GNU Affero General Public License for more details. You should have received a copy of
    the GNU Affero General Public License along with this program. If not, see <https://www.gnu.org/licenses/>.
*/
use driver_session_reflector::{
    common::types::*,
    domain::{
        api::handle::{spawn_reflector, Reflector, ReflectorHandle},
        types::reflector::RideSessionView,
    },
    environment::{read_dhall_config, ReflectorConfig, SessionContext},
    outbound::external::HttpRideApi,
    push::websocket::run_push_channel,
    tools::{logger::*, prometheus::gather_metrics},
};
use std::{env::var, sync::Arc};
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    signal::unix::{signal, SignalKind},
    sync::watch,
};

#[derive(Debug, PartialEq)]
enum ConsoleCommand {
    Accept(BookingId),
    Arrived,
    Start,
    Complete(Option<Point>),
    Cancel(String),
    Refresh,
    Active,
    History,
    Browse(bool),
    Metrics,
    Logout,
    Quit,
    Help,
}

const HELP: &str = "commands: accept <bookingId> | arrived | start | complete [lat lng] | cancel <reason> | refresh | active | history | browse on|off | metrics | logout | quit";

fn parse_command(line: &str) -> Result<ConsoleCommand, String> {
    let mut words = line.split_whitespace();
    let command = words.next().unwrap_or_default().to_lowercase();
    let rest: Vec<&str> = words.collect();

    match (command.as_str(), rest.as_slice()) {
        ("accept", [booking_id]) => Ok(ConsoleCommand::Accept(BookingId::from(*booking_id))),
        ("arrived", []) => Ok(ConsoleCommand::Arrived),
        ("start", []) => Ok(ConsoleCommand::Start),
        ("complete", []) => Ok(ConsoleCommand::Complete(None)),
        ("complete", [lat, lon]) => {
            let lat = lat
                .parse::<f64>()
                .map_err(|_| format!("Invalid latitude : {lat}"))?;
            let lon = lon
                .parse::<f64>()
                .map_err(|_| format!("Invalid longitude : {lon}"))?;
            Ok(ConsoleCommand::Complete(Some(Point {
                lat: Latitude(lat),
                lon: Longitude(lon),
            })))
        }
        // blank reasons go through so the reflector can reject them
        ("cancel", reason) => Ok(ConsoleCommand::Cancel(reason.join(" "))),
        ("refresh", []) => Ok(ConsoleCommand::Refresh),
        ("active", []) => Ok(ConsoleCommand::Active),
        ("history", []) => Ok(ConsoleCommand::History),
        ("browse", ["on"]) => Ok(ConsoleCommand::Browse(true)),
        ("browse", ["off"]) => Ok(ConsoleCommand::Browse(false)),
        ("metrics", []) => Ok(ConsoleCommand::Metrics),
        ("logout", []) => Ok(ConsoleCommand::Logout),
        ("quit" | "exit", []) => Ok(ConsoleCommand::Quit),
        ("help" | "", _) => Ok(ConsoleCommand::Help),
        _ => Err(format!("Unknown command : {}", line.trim())),
    }
}

fn summary(view: &RideSessionView) -> String {
    let pending = view
        .pending
        .iter()
        .map(|ride| ride.booking_id.to_string())
        .collect::<Vec<String>>()
        .join(",");
    let active = view
        .active
        .as_ref()
        .map(|ride| format!("{}({})", ride.booking_id, ride.status))
        .unwrap_or_else(|| "-".to_string());
    let error = view
        .last_error
        .as_ref()
        .map(|last| format!(" error={}: {}", last.operation, last.error.message()))
        .unwrap_or_default();
    let reauth = if view.requires_reauthentication {
        " LOGIN REQUIRED"
    } else {
        ""
    };

    format!(
        "pending=[{pending}] active={active} history={} push={} polling={}{error}{reauth}",
        view.history.len(),
        if view.push_connected { "on" } else { "off" },
        if view.polling { "on" } else { "off" },
    )
}

async fn render(mut view: watch::Receiver<RideSessionView>) {
    while view.changed().await.is_ok() {
        let snapshot = view.borrow_and_update().clone();
        info!(tag = "[Ride Session View]", view = %serde_json::to_string(&snapshot).unwrap_or_default());
        println!("{}", summary(&snapshot));
    }
}

/// Runs one console command. Returns whether the console should keep reading.
async fn run_command(handle: &ReflectorHandle, command: ConsoleCommand) -> bool {
    let result = match command {
        ConsoleCommand::Accept(booking_id) => handle.accept_ride(booking_id).await,
        ConsoleCommand::Arrived => handle.arrived().await,
        ConsoleCommand::Start => handle.start().await,
        ConsoleCommand::Complete(final_location) => handle.complete(final_location).await,
        ConsoleCommand::Cancel(reason) => handle.cancel(reason).await,
        ConsoleCommand::Refresh => match handle.refresh_pending().await {
            Ok(()) => handle.refresh_active().await,
            Err(err) => Err(err),
        },
        ConsoleCommand::Active => handle.refresh_active().await,
        ConsoleCommand::History => {
            let result = handle.refresh_history().await;
            for ride in handle.view().history {
                println!(
                    "{} {} {} -> {} fare={}",
                    ride.booking_id,
                    ride.status,
                    ride.pickup.address,
                    ride.dropoff.address,
                    ride.fare.map(|fare| fare.to_string()).unwrap_or_default()
                );
            }
            result
        }
        ConsoleCommand::Browse(browsing) => handle.set_browsing_pending(browsing).await,
        ConsoleCommand::Metrics => {
            println!("{}", gather_metrics());
            Ok(())
        }
        ConsoleCommand::Logout => {
            let result = handle.logout().await;
            println!("logged out");
            return result.is_err() && !handle.is_stopped();
        }
        ConsoleCommand::Quit => return false,
        ConsoleCommand::Help => {
            println!("{HELP}");
            Ok(())
        }
    };

    if let Err(err) = result {
        println!("{} : {}", err.code(), err.message());
    }
    !handle.is_stopped()
}

#[tokio::main]
async fn main() {
    let dhall_config_path = var("DHALL_CONFIG")
        .unwrap_or_else(|_| "./dhall_config/driver_session_reflector.dhall".to_string());
    let app_config = read_dhall_config(&dhall_config_path).unwrap_or_else(|err| {
        println!("Dhall Config Reading Error : {}", err.message());
        std::process::exit(1);
    });

    let _guard = setup_tracing(&app_config.logger_cfg).unwrap_or_else(|err| {
        println!("Tracing Setup Error : {}", err.message());
        std::process::exit(1);
    });

    let (config, context) = match (
        ReflectorConfig::try_from(&app_config),
        SessionContext::from_env(),
    ) {
        (Ok(config), Ok(context)) => (config, context),
        (Err(err), _) | (_, Err(err)) => {
            error!(tag = "[Startup Failed]", error = %err.message());
            std::process::exit(1);
        }
    };

    let api = HttpRideApi::new(&config, context.to_owned()).unwrap_or_else(|err| {
        error!(tag = "[Startup Failed]", error = %err.message());
        std::process::exit(1);
    });

    let Reflector {
        handle,
        push_events,
        task,
    } = spawn_reflector(&config, context.to_owned(), Arc::new(api));
    let push_task = tokio::spawn(run_push_channel(
        config.to_owned(),
        context.to_owned(),
        push_events,
    ));
    let render_task = tokio::spawn(render(handle.subscribe()));

    let (mut sigterm, mut sigint) = match (
        signal(SignalKind::terminate()),
        signal(SignalKind::interrupt()),
    ) {
        (Ok(sigterm), Ok(sigint)) => (sigterm, sigint),
        (Err(err), _) | (_, Err(err)) => {
            error!(tag = "[Signal Handler Failed]", error = %err);
            std::process::exit(1);
        }
    };

    println!("{HELP}");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => match line {
                Ok(Some(line)) => match parse_command(&line) {
                    Ok(command) => {
                        if !run_command(&handle, command).await {
                            break;
                        }
                    }
                    Err(err) => println!("{err}\n{HELP}"),
                },
                Ok(None) => break,
                Err(err) => {
                    error!(tag = "[Console Read Failed]", error = %err);
                    break;
                }
            },
            _ = sigterm.recv() => {
                info!(tag = "[Graceful Shutting Down]", signal = "SIGTERM");
                break;
            },
            _ = sigint.recv() => {
                info!(tag = "[Graceful Shutting Down]", signal = "SIGINT");
                break;
            },
        }
    }

    if !handle.is_stopped() {
        if let Err(err) = handle.shutdown().await {
            warn!(tag = "[Shutdown]", error = %err.message());
        }
    }
    drop(handle);

    for (name, joined) in [
        ("reflector", task.await),
        ("push channel", push_task.await),
        ("renderer", render_task.await),
    ] {
        if let Err(err) = joined {
            error!(tag = "[Task Panicked]", task = name, error = %err);
        }
    }
}
