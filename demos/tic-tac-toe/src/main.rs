//! Tic-tac-toe matchmaking server.
//!
//! Clients authenticate with an HS256 token signed with
//! `PAIRPLAY_JWT_SECRET`, ask for a match and play over the same socket.

mod cli;

use std::sync::Arc;

use clap::Parser;
use pairplay::prelude::*;
use tracing_subscriber::EnvFilter;

use crate::cli::Cli;

#[tokio::main]
async fn main() -> Result<(), PairplayError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let leaderboard = Arc::new(Leaderboard::new());

    let server = PairplayServerBuilder::new()
        .bind(&cli.bind)
        .core_config(cli.core_config())
        .sweep_config(cli.sweep_config())
        .idle_timeout(cli.idle_timeout())
        .build(JwtAuthenticator::new(&cli.jwt_secret), Arc::clone(&leaderboard))
        .await?;

    let shutdown = server.shutdown_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("ctrl-c received, shutting down");
            shutdown.shutdown();
        }
    });

    server.run().await?;

    for entry in leaderboard.top(10).await {
        tracing::info!(
            player = %entry.player_id,
            wins = entry.wins,
            losses = entry.losses,
            draws = entry.draws,
            points = entry.total_points,
            "final standings"
        );
    }
    Ok(())
}
