use std::{sync::Arc, time::Duration};

use crate::support::helpers::{game_address, wait_for, Fixture, StaticTrace};
use alloy::primitives::Bytes;
use anyhow::Result;
use faultmon::{PrestateError, Service};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

const WAIT: Duration = Duration::from_secs(5);

fn spawn_monitor(service: Arc<Service>, shutdown: CancellationToken) -> JoinHandle<Result<()>> {
    tokio::spawn(async move { service.monitor_game(&shutdown).await })
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn schedules_games_created_inside_window() -> Result<()> {
    let fixture = Fixture::start().await?;
    let stale = fixture.create_game(1, 7_200);
    let first = fixture.create_game(2, 600);
    let second = fixture.create_game(3, 60);

    let service = Arc::new(fixture.connect(fixture.config()).await?);
    let shutdown = CancellationToken::new();
    let handle = spawn_monitor(service.clone(), shutdown.clone());

    let players = fixture.players.clone();
    wait_for("both in-window games to progress", WAIT, || {
        players.calls(first) >= 1 && players.calls(second) >= 1
    })
    .await?;

    assert_eq!(fixture.players.calls(stale), 0, "stale game must not be played");
    assert!(fixture.game_dir(first).is_dir());
    assert!(fixture.game_dir(second).is_dir());
    assert!(!fixture.game_dir(stale).exists());
    assert_eq!(
        fixture.players.dir_of(first).as_deref(),
        Some(fixture.game_dir(first).as_path())
    );

    // Same head: no new scheduling pass.
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(fixture.players.calls(first), 1);

    fixture.chain.advance(1, 12);
    wait_for("second pass after a new block", WAIT, || {
        players.calls(first) >= 2 && players.calls(second) >= 2
    })
    .await?;

    assert!(service.telemetry().is_up());
    shutdown.cancel();
    handle.await??;
    assert!(!service.telemetry().is_up());

    let snapshot = service.telemetry().snapshot();
    assert!(snapshot.ticks >= 2);
    assert_eq!(snapshot.players_created, 2);

    fixture.shutdown().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn releases_directory_when_game_leaves_window() -> Result<()> {
    let fixture = Fixture::start().await?;
    let ageing = fixture.create_game(1, 3_500);
    let fresh = fixture.create_game(2, 10);

    let service = Arc::new(fixture.connect(fixture.config()).await?);
    let shutdown = CancellationToken::new();
    let handle = spawn_monitor(service.clone(), shutdown.clone());

    let players = fixture.players.clone();
    wait_for("ageing game to progress", WAIT, || players.calls(ageing) >= 1).await?;
    let dir = fixture.game_dir(ageing);
    assert!(dir.is_dir());

    fixture.chain.advance(1, 200);
    wait_for("ageing game directory removal", WAIT, || !dir.exists()).await?;
    wait_for("fresh game keeps progressing", WAIT, || players.calls(fresh) >= 2).await?;

    assert!(fixture.game_dir(fresh).is_dir());
    let calls = fixture.players.calls(ageing);
    fixture.chain.advance(1, 12);
    wait_for("another pass", WAIT, || players.calls(fresh) >= 3).await?;
    assert_eq!(fixture.players.calls(ageing), calls);
    assert!(service.telemetry().snapshot().games_released >= 1);

    shutdown.cancel();
    handle.await??;
    fixture.shutdown().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn resolved_games_are_dropped_and_not_recreated() -> Result<()> {
    let fixture = Fixture::start().await?;
    let resolved = fixture.create_game(1, 100);
    let open = fixture.create_game(2, 100);
    fixture.players.resolve(resolved);

    let service = Arc::new(fixture.connect(fixture.config()).await?);
    let shutdown = CancellationToken::new();
    let handle = spawn_monitor(service.clone(), shutdown.clone());

    let players = fixture.players.clone();
    wait_for("resolved game to be played once", WAIT, || {
        players.calls(resolved) == 1
    })
    .await?;
    let dir = fixture.game_dir(resolved);
    wait_for("resolved game directory removal", WAIT, || !dir.exists()).await?;

    for expected in 2..=4 {
        fixture.chain.advance(1, 12);
        wait_for("open game progress", WAIT, || players.calls(open) >= expected).await?;
    }

    assert_eq!(fixture.players.calls(resolved), 1);
    let created: Vec<_> = fixture
        .players
        .created()
        .into_iter()
        .filter(|(address, _)| *address == resolved)
        .collect();
    assert_eq!(created.len(), 1, "resolved game must not get a new player");
    assert_eq!(service.telemetry().snapshot().games_resolved, 1);

    shutdown.cancel();
    handle.await??;
    fixture.shutdown().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn allowlist_limits_scheduled_games() -> Result<()> {
    let fixture = Fixture::start().await?;
    let ignored = fixture.create_game(1, 100);
    let allowed = fixture.create_game(2, 100);

    let service = Arc::new(
        fixture
            .connect(fixture.config().game_allowlist([allowed]))
            .await?,
    );
    let shutdown = CancellationToken::new();
    let handle = spawn_monitor(service.clone(), shutdown.clone());

    let players = fixture.players.clone();
    wait_for("allowlisted game to progress", WAIT, || players.calls(allowed) >= 1).await?;
    fixture.chain.advance(1, 12);
    wait_for("second pass", WAIT, || players.calls(allowed) >= 2).await?;

    assert_eq!(fixture.players.calls(ignored), 0);
    assert!(!fixture.game_dir(ignored).exists());

    shutdown.cancel();
    handle.await??;
    fixture.shutdown().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn load_failures_are_retried_on_next_block() -> Result<()> {
    let fixture = Fixture::start().await?;
    let game = fixture.create_game(1, 100);

    let service = Arc::new(fixture.connect(fixture.config()).await?);
    let shutdown = CancellationToken::new();
    let handle = spawn_monitor(service.clone(), shutdown.clone());

    let players = fixture.players.clone();
    wait_for("first pass", WAIT, || players.calls(game) >= 1).await?;

    fixture.chain.fail_next_calls(1);
    fixture.chain.advance(1, 12);
    let telemetry = service.telemetry();
    wait_for("load failure", WAIT, || telemetry.snapshot().load_errors >= 1).await?;
    assert!(!handle.is_finished(), "load failures must not stop the monitor");

    fixture.chain.advance(1, 12);
    wait_for("recovery on the next block", WAIT, || players.calls(game) >= 2).await?;

    shutdown.cancel();
    handle.await??;
    fixture.shutdown().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn restart_reuses_directories_of_games_still_in_scope() -> Result<()> {
    let fixture = Fixture::start().await?;
    // Factory order follows creation time.
    let expiring = fixture.create_game(2, 3_550);
    let kept = fixture.create_game(1, 100);

    let service = Arc::new(fixture.connect(fixture.config()).await?);
    let players = fixture.players.clone();

    let first_run = CancellationToken::new();
    let handle = spawn_monitor(service.clone(), first_run.clone());
    wait_for("first run progress", WAIT, || {
        players.calls(kept) >= 1 && players.calls(expiring) >= 1
    })
    .await?;
    first_run.cancel();
    handle.await??;

    assert!(fixture.game_dir(kept).is_dir(), "shutdown keeps game data");
    assert!(fixture.game_dir(expiring).is_dir(), "shutdown keeps game data");

    fixture.chain.advance(1, 100);
    let second_run = CancellationToken::new();
    let handle = spawn_monitor(service.clone(), second_run.clone());
    wait_for("second run progress", WAIT, || players.calls(kept) >= 2).await?;

    let dir = fixture.game_dir(expiring);
    wait_for("out-of-scope directory sweep", WAIT, || !dir.exists()).await?;
    assert!(fixture.game_dir(kept).is_dir());
    assert_eq!(fixture.players.dir_of(kept), Some(fixture.game_dir(kept)));

    second_run.cancel();
    handle.await??;
    fixture.shutdown().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn prestate_mismatch_aborts_startup() -> Result<()> {
    let fixture = Fixture::start().await?;
    fixture.create_game(1, 100);

    let err = match Service::connect(
        fixture.config().build()?,
        Arc::new(StaticTrace(Bytes::from_static(b"some other prestate"))),
        Arc::new(fixture.players.clone()),
    )
    .await
    {
        Ok(_) => panic!("mismatched prestate must abort startup"),
        Err(err) => err,
    };

    let prestate = err
        .downcast_ref::<PrestateError>()
        .expect("error should carry the prestate failure");
    assert!(prestate.is_mismatch(), "unexpected error: {err:#}");
    assert!(fixture.players.created().is_empty());

    fixture.shutdown().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn missing_implementation_aborts_startup() -> Result<()> {
    let fixture = Fixture::start().await?;

    let err = match fixture.connect(fixture.config().game_type(7)).await {
        Ok(_) => panic!("unknown game type must abort startup"),
        Err(err) => err,
    };

    let prestate = err
        .downcast_ref::<PrestateError>()
        .expect("error should carry the prestate failure");
    assert!(matches!(prestate, PrestateError::OnChain(_)));
    let message = format!("{err:#}");
    assert!(
        message.contains("no implementation registered for game type 7"),
        "unexpected error: {message}"
    );

    fixture.shutdown().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn unknown_games_do_not_touch_datadir() -> Result<()> {
    let fixture = Fixture::start().await?;
    let service = Arc::new(fixture.connect(fixture.config()).await?);
    let shutdown = CancellationToken::new();
    let handle = spawn_monitor(service.clone(), shutdown.clone());

    let telemetry = service.telemetry();
    wait_for("first tick", WAIT, || telemetry.snapshot().ticks >= 1).await?;
    shutdown.cancel();
    handle.await??;

    assert!(!fixture.game_dir(game_address(1)).exists());
    assert!(fixture.players.created().is_empty());
    assert!(fixture.chain.request_count() > 0);

    fixture.shutdown().await;
    Ok(())
}
