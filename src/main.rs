use std::io::BufRead;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use clap::Parser;
use log::info;

use hwav_player::audio::sink::{AudioSink, CpalSink};
use hwav_player::cli::{self, CommandParseError, UserCommand};
use hwav_player::config::AudioConfig;
use hwav_player::error::PlayerError;
use hwav_player::logging::{self, log_player_error};
use hwav_player::queue::{PlayFlags, Playlist, PlaylistState};
use hwav_player::{Player, PlayerOptions};

#[derive(Parser, Debug)]
#[command(
    name = "hwavplay",
    version,
    about = "Plays CWAV/HWAV chunked audio containers"
)]
struct Args {
    /// Track files to queue, in order
    files: Vec<PathBuf>,

    /// Named playlist from the config file to play
    #[arg(short, long)]
    playlist: Option<String>,

    /// Alternate config file location
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Repeat the playlist when it runs out
    #[arg(long)]
    repeat: bool,

    /// Shuffle the traversal order
    #[arg(long)]
    shuffle: bool,

    /// Collapse stereo tracks to mono output
    #[arg(long)]
    mono: bool,
}

fn main() {
    if let Err(e) = logging::init() {
        eprintln!("failed to initialize logging: {}", e);
    }
    if let Err(e) = run() {
        log_player_error(&e);
        eprintln!("{}", e.user_message());
        std::process::exit(1);
    }
}

fn run() -> Result<(), PlayerError> {
    let args = Args::parse();

    let config_path = match &args.config {
        Some(path) => path.clone(),
        None => AudioConfig::default_path()?,
    };
    let music_dir = AudioConfig::default_music_dir();
    let config = AudioConfig::load(&config_path, &music_dir)?;

    let flags = PlayFlags {
        shuffle: config.flags.shuffle || args.shuffle,
        repeat: config.flags.repeat || args.repeat,
    };
    let force_mono = Arc::new(AtomicBool::new(config.always_mono || args.mono));

    let mut playlist;
    if !args.files.is_empty() {
        playlist = Playlist::new("command line");
        for file in &args.files {
            playlist.append(file.clone());
        }
    } else {
        let name = args
            .playlist
            .clone()
            .or_else(|| config.default_playlist.clone());
        match name.as_deref().and_then(|n| config.find_playlist(n)) {
            Some(stored) => {
                playlist = Playlist::new(stored.name.clone());
                for track in &stored.tracks {
                    playlist.append(track.clone());
                }
            }
            None => {
                eprintln!("nothing to play: pass files or configure a playlist");
                return Ok(());
            }
        }
    }
    if playlist.is_empty() {
        eprintln!("playlist \"{}\" has no playable entries", playlist.name);
        return Ok(());
    }
    info!("queued {} track(s) from \"{}\"", playlist.len(), playlist.name);

    let playlist = Arc::new(Mutex::new(PlaylistState::new(playlist, flags)));
    let player = Player::spawn(PlayerOptions {
        sink_factory: Box::new(|| Box::new(CpalSink::new()) as Box<dyn AudioSink>),
        playlist: Arc::clone(&playlist),
        force_mono: Arc::clone(&force_mono),
        listener: None,
        autoplay: true,
    })?;

    let running = Arc::new(AtomicBool::new(true));
    let interrupt = Arc::clone(&running);
    ctrlc::set_handler(move || {
        interrupt.store(false, Ordering::SeqCst);
        eprintln!("\ninterrupted, shutting down");
    })
    .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))?;

    println!("{}", cli::help_text());
    let stdin = std::io::stdin();
    for line in stdin.lock().lines() {
        if !running.load(Ordering::SeqCst) {
            break;
        }
        let line = line?;
        match cli::parse(&line) {
            Ok(UserCommand::Pause) => player.pause(),
            Ok(UserCommand::Resume) => player.unpause(),
            Ok(UserCommand::Next) => player.next(),
            Ok(UserCommand::Previous) => player.previous(),
            Ok(UserCommand::Play(path)) => player.play(path),
            Ok(UserCommand::Playlist) => player.refresh_playlist(),
            Ok(UserCommand::Mono(on)) => {
                force_mono.store(on, Ordering::SeqCst);
                player.reconfigure_mix();
            }
            Ok(UserCommand::Status) => {
                println!("{}", if player.is_paused() { "paused" } else { "playing" });
            }
            Ok(UserCommand::Help) => println!("{}", cli::help_text()),
            Ok(UserCommand::Quit) => break,
            Err(CommandParseError::Empty) => {}
            Err(e) => {
                let e = PlayerError::from(e);
                log_player_error(&e);
                eprintln!("{}", e.user_message());
            }
        }
    }

    player.shutdown();
    Ok(())
}
