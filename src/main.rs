//! Headless rewind demo (default binary).
//!
//! Plays a seeded game for a number of tics, rewinds a few frames, replays
//! them, and checks that the replayed frame is byte-for-byte the original.
//!
//! Usage: `tetris-rewind [TICS] [REWIND_DEPTH]`. Configuration comes from
//! `TETRIS_REWIND_SLOTS`, `TETRIS_REWIND_POLICY` and `TETRIS_REWIND_SEED`;
//! `TETRIS_REWIND_DUMP=1` prints the final frame as JSON.

use anyhow::{bail, Context, Result};
use tracing::info;

use tetris_rewind::core::Registry;
use tetris_rewind::engine::{game, RewindConfig, Session};
use tetris_rewind::snapshot::{decode, entity_summary};
use tetris_rewind::types::{Tic, TICK_MS};

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("tetris_rewind=info".parse()?),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();
    let tics: Tic = args.get(1).and_then(|s| s.parse().ok()).unwrap_or(600);
    let depth: Tic = args.get(2).and_then(|s| s.parse().ok()).unwrap_or(3);

    let config = RewindConfig::from_env();
    info!(?config, tics, depth, "starting");

    let mut registry = Registry::with_builtin_types();
    let root = game::install(&mut registry, config.seed);
    let mut session = Session::new(config, registry, root).context("recording initial frame")?;

    run_until(&mut session, tics)?;
    let original = session
        .current_frame()
        .context("final frame was not recorded")?
        .bytes()
        .to_vec();
    let before = game::summary(session.registry(), session.root())?;

    let target = tics.saturating_sub(depth);
    let restored = session
        .rewind(target)
        .with_context(|| format!("rewinding from tic {tics} to {target}"))?;
    info!(restored, retained = ?session.retained_tics(), "rewound");

    run_until(&mut session, tics)?;
    let replayed = session
        .current_frame()
        .context("replayed frame was not recorded")?
        .bytes();
    if replayed != original.as_slice() {
        bail!("replayed frame at tic {tics} differs from the original");
    }

    let after = game::summary(session.registry(), session.root())?;
    info!(
        score = after.score,
        lines = after.lines,
        pieces = after.pieces,
        resets = after.resets,
        filled = after.filled_cells,
        frame_bytes = original.len(),
        simulated_ms = tics * TICK_MS as Tic,
        "replay matches"
    );
    debug_assert_eq!(before, after);

    if std::env::var("TETRIS_REWIND_DUMP").is_ok_and(|v| v == "1") {
        let types = session.registry().types();
        let graph = decode(&original, types).context("decoding final frame")?;
        for (id, tag) in entity_summary(&graph) {
            info!(%id, %tag, kind = types.type_name(tag).unwrap_or("unknown"), "frame entity");
        }
        println!("{}", serde_json::to_string_pretty(&graph)?);
    }

    Ok(())
}

fn run_until(session: &mut Session, tic: Tic) -> Result<()> {
    while session.tic() < tic {
        session
            .step(game::tick)
            .with_context(|| format!("recording tic {}", session.tic() + 1))??;
    }
    Ok(())
}
