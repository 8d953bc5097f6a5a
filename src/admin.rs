//! Administrative console on stdin
//!
//! Read-only glue over the store and registries; never touches live session
//! or room state beyond counting it.

use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::error;

use crate::app::AppState;

/// How many recent games `stats` shows
const RECENT_GAMES: usize = 5;
/// Leaderboard size
const LEADERBOARD_SIZE: usize = 10;

/// Run the command loop until `quit` or stdin closes
pub async fn run_console(state: AppState) -> anyhow::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    println!("Commands: quit | stats <name> | leaderboard | rooms");

    while let Some(line) = lines.next_line().await? {
        let mut parts = line.split_whitespace();
        match parts.next() {
            None => {}

            Some("quit") => break,

            Some("stats") => match parts.next() {
                None => println!("Usage: stats <name>"),
                Some(name) => show_stats(&state, name).await,
            },

            Some("leaderboard") => show_leaderboard(&state).await,

            Some("rooms") => {
                println!(
                    "{} live room(s), {} waiting in queue",
                    state.rooms.len(),
                    state.matchmaking.queue_len().await,
                );
            }

            Some(other) => println!("Unknown command: {other}"),
        }
    }

    Ok(())
}

async fn show_stats(state: &AppState, name: &str) {
    let stats = match state.store.get_stats(name).await {
        Ok(Some(stats)) => stats,
        Ok(None) => {
            println!("No player named {name:?}");
            return;
        }
        Err(e) => {
            error!(error = %e, "Stats lookup failed");
            return;
        }
    };

    println!("{stats}");

    match state.store.recent_games(stats.player_id, RECENT_GAMES).await {
        Ok(games) if games.is_empty() => {}
        Ok(games) => {
            println!("Recent games:");
            for game in games {
                println!("  {game}");
            }
        }
        Err(e) => error!(error = %e, "Recent games lookup failed"),
    }
}

async fn show_leaderboard(state: &AppState) {
    match state.store.get_leaderboard(LEADERBOARD_SIZE).await {
        Ok(board) if board.is_empty() => println!("No games recorded yet."),
        Ok(board) => {
            for (rank, player) in board.iter().enumerate() {
                println!("{}. {player}", rank + 1);
            }
        }
        Err(e) => error!(error = %e, "Leaderboard lookup failed"),
    }
}
