use riffbox::audio::{PlaybackController, PlaybackState, PlayerService, RodioOutput};
use riffbox::catalog::CatalogClient;
use riffbox::config::Config;
use std::time::Duration;
use tokio::time::{sleep, timeout};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    println!("riffbox preview playback test");
    println!("=============================");

    let query = std::env::args().nth(1).unwrap_or_else(|| "daft punk".to_string());
    let config = Config::default();

    println!("Searching for '{}'...", query);
    let catalog = CatalogClient::new(config.catalog.clone())?;
    let tracks = catalog.try_search(&query).await?;

    // Get the first playable track
    let Some(index) = tracks.iter().position(|t| t.is_playable()) else {
        println!("No playable previews found");
        return Ok(());
    };
    let track = tracks[index].clone();

    println!("Testing playback with:");
    println!("   Title: {}", track.display_title());
    println!("   Artist: {}", track.display_artist());
    println!("   Preview: {}", track.preview().unwrap_or_default());

    let output = RodioOutput::new(config.audio.volume(), config.audio.tick_interval())?;
    let controller = PlaybackController::new(output, config.audio.preview_length());
    let mut player = PlayerService::spawn(controller);

    println!("\nStarting playback...");
    player.play_track(track, tracks).await?;
    let started = timeout(
        Duration::from_secs(15),
        player.wait_for(|s| s.state != PlaybackState::Loading && s.current_track.is_some()),
    )
    .await?;
    match started {
        Some(snapshot) if snapshot.is_playing() => println!("   Playing, duration {:.1}s", snapshot.duration),
        _ => {
            println!("Device refused to start, see the log for details");
            player.shutdown().await;
            return Ok(());
        }
    }

    sleep(Duration::from_secs(5)).await;

    println!("Pausing...");
    player.toggle_play();
    sleep(Duration::from_secs(2)).await;

    println!("Resuming...");
    player.toggle_play();
    sleep(Duration::from_secs(3)).await;

    println!("Seeking to 20s...");
    player.seek(20.0);
    sleep(Duration::from_secs(2)).await;

    println!("Testing volume control...");
    player.set_volume(0.3);
    println!("   Volume set to 30%");
    sleep(Duration::from_secs(2)).await;
    player.set_volume(0.8);
    println!("   Volume set to 80%");
    sleep(Duration::from_secs(2)).await;

    println!("Skipping to the next result...");
    player.next_track();
    sleep(Duration::from_secs(4)).await;

    let snapshot = player.snapshot();
    println!(
        "   {} at {:.1}s",
        snapshot
            .current_track
            .as_ref()
            .map(|t| t.to_string())
            .unwrap_or_default(),
        snapshot.current_time
    );

    println!("Stopping playback...");
    player.shutdown().await;

    println!("Playback test completed successfully!");
    Ok(())
}
