// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2025 Daniel Negri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

use clap::Parser;
use gym_kiosk_rs::server::{AppState, create_router};
use gym_kiosk_rs::{DEFAULT_ENTRY_COST, EntryPolicy};
use std::process;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

/// Gym Kiosk - RFID access backend
///
/// Serves the kiosk scan/settlement endpoints and the admin member CRUD
/// over HTTP. Member records live in memory for the process lifetime.
#[derive(Parser, Debug)]
#[command(name = "gym-kiosk-rs")]
#[command(about = "A gym access backend that settles RFID scans against a credit ledger", long_about = None)]
struct Args {
    /// Address to bind the HTTP server on
    #[arg(long, default_value = "127.0.0.1:3000")]
    bind: String,

    /// Credits charged per granted entry
    #[arg(long, default_value_t = DEFAULT_ENTRY_COST)]
    entry_cost: u32,

    /// Grant free re-entry when the previous accepted entry is less than
    /// this many hours old; omit to charge every entry
    #[arg(long)]
    free_reentry_hours: Option<i64>,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let mut policy = EntryPolicy::default().with_cost(args.entry_cost);
    if let Some(hours) = args.free_reentry_hours {
        policy = policy.with_free_reentry(chrono::Duration::hours(hours));
    }

    let state = AppState::new(policy);
    let app = create_router(state);

    let listener = match TcpListener::bind(&args.bind).await {
        Ok(listener) => listener,
        Err(e) => {
            eprintln!("Error binding to '{}': {}", args.bind, e);
            process::exit(1);
        }
    };

    tracing::info!(bind = %args.bind, entry_cost = args.entry_cost, "kiosk backend listening");

    if let Err(e) = axum::serve(listener, app).await {
        eprintln!("Server error: {}", e);
        process::exit(1);
    }
}
