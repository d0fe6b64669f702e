use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};

use log::{error, info, warn};

use crate::audio::buffer::{BufferEngine, RefillOutcome};
use crate::audio::decoder::SampleDecoder;
use crate::audio::sink::AudioSink;
use crate::audio::Encoding;
use crate::error::{AudioError, PlayerError};
use crate::logging::log_player_error;
use crate::queue::PlaylistState;

/// A track consumed past this point replays from the start on "previous"
/// instead of stepping back in the playlist
const PREVIOUS_REPLAY_SECONDS: f32 = 5.0;

/// Builds the sink on the transport thread. Sinks owning OS audio streams
/// are usually not `Send`, so construction is deferred rather than moved.
pub type SinkFactory = Box<dyn FnOnce() -> Box<dyn AudioSink> + Send>;

/// Metadata of the track that just started playing
#[derive(Debug, Clone)]
pub struct TrackDetails {
    pub path: PathBuf,
    pub title: String,
    pub artist: Option<String>,
    pub sample_rate: f32,
    pub channels: usize,
    pub encoding: Encoding,
}

/// Emitted when an advance pass found no playable track at all
#[derive(Debug, Clone)]
pub struct ExhaustionReport {
    pub playlist: String,
    pub failed: Vec<PathBuf>,
}

/// Observer for transport events. Callbacks run on the transport thread
/// and should return promptly.
pub trait TrackChangeListener: Send + Sync {
    fn on_track_changed(&self, _details: &TrackDetails) {}
    fn on_playlist_exhausted(&self, _report: &ExhaustionReport) {}
}

#[derive(Debug)]
enum Command {
    Pause,
    Unpause,
    QueryPaused,
    Play(PathBuf),
    Next,
    Previous,
    RefreshPlaylist,
    ReconfigureMix,
    Halt,
    SkipIfCurrent(PathBuf),
    Exit,
}

#[derive(Debug, Clone, Copy)]
enum Direction {
    Forward,
    Backward,
}

/// Where the playing track came from. Playlist traversal commands only
/// act in playlist mode; a direct file loops or stops on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Source {
    Stopped,
    Playlist,
    Direct,
}

/// Single-slot command channel shared between the public handle and the
/// transport worker. Submitters block while the slot is occupied; the
/// sequence counters let a submitter wait for its own command to finish.
#[derive(Default)]
struct ControlState {
    command: Option<Command>,
    refill_pending: bool,
    submitted: u64,
    completed: u64,
    paused_response: bool,
    exited: bool,
}

struct Shared {
    state: Mutex<ControlState>,
    /// Wakes the worker: a command arrived or a buffer drained
    wake: Condvar,
    /// Wakes submitters: the slot freed up or a command completed
    settled: Condvar,
}

pub struct PlayerOptions {
    pub sink_factory: SinkFactory,
    pub playlist: Arc<Mutex<PlaylistState>>,
    pub force_mono: Arc<AtomicBool>,
    pub listener: Option<Arc<dyn TrackChangeListener>>,
    /// Start the first playlist track as soon as the worker is up
    pub autoplay: bool,
}

/// Handle to the playback transport.
///
/// All playback state lives on a dedicated worker thread; the handle only
/// posts commands through the single-slot channel and waits for them to
/// be carried out. Dropping the handle shuts the worker down.
pub struct Player {
    shared: Arc<Shared>,
    handle: Option<JoinHandle<()>>,
}

impl Player {
    pub fn spawn(options: PlayerOptions) -> Result<Self, AudioError> {
        let shared = Arc::new(Shared {
            state: Mutex::new(ControlState::default()),
            wake: Condvar::new(),
            settled: Condvar::new(),
        });

        let worker_shared = Arc::clone(&shared);
        let handle = thread::Builder::new()
            .name("playback-transport".to_string())
            .spawn(move || {
                let PlayerOptions {
                    sink_factory,
                    playlist,
                    force_mono,
                    listener,
                    autoplay,
                } = options;

                let notify_shared = Arc::clone(&worker_shared);
                let notifier = Arc::new(move || {
                    let mut state = notify_shared.state.lock().unwrap();
                    state.refill_pending = true;
                    notify_shared.wake.notify_one();
                });

                let engine = BufferEngine::new(sink_factory(), notifier);
                Worker {
                    shared: worker_shared,
                    engine,
                    playlist,
                    force_mono,
                    listener,
                    current: None,
                    source: Source::Stopped,
                    bufsel: 0,
                }
                .run(autoplay);
            })
            .map_err(|e| AudioError::InitializationFailed(e.to_string()))?;

        Ok(Self { shared, handle: Some(handle) })
    }

    pub fn pause(&self) {
        self.submit(Command::Pause, true);
    }

    pub fn unpause(&self) {
        self.submit(Command::Unpause, true);
    }

    pub fn is_paused(&self) -> bool {
        self.submit(Command::QueryPaused, true);
        self.shared.state.lock().unwrap().paused_response
    }

    /// Play a specific file, replacing whatever is playing. The file is
    /// validated first; on failure the current track keeps going.
    pub fn play<P: AsRef<Path>>(&self, path: P) {
        self.submit(Command::Play(path.as_ref().to_path_buf()), true);
    }

    pub fn next(&self) {
        self.submit(Command::Next, true);
    }

    pub fn previous(&self) {
        self.submit(Command::Previous, true);
    }

    /// Rebuild the traversal order and (re)start playlist playback from
    /// the top. Also the way back to the playlist after a direct play or
    /// a halt.
    pub fn refresh_playlist(&self) {
        self.submit(Command::RefreshPlaylist, true);
    }

    /// Re-apply mix routing, picking up the current force-mono setting.
    pub fn reconfigure_mix(&self) {
        self.submit(Command::ReconfigureMix, true);
    }

    /// Stop playback and discard the current track.
    pub fn halt(&self) {
        self.submit(Command::Halt, true);
    }

    /// Advance if (and only if) the given path is what is playing now.
    /// Used when an entry is removed from the live playlist.
    pub fn skip_if_current<P: AsRef<Path>>(&self, path: P) {
        self.submit(Command::SkipIfCurrent(path.as_ref().to_path_buf()), true);
    }

    pub fn shutdown(mut self) {
        self.stop_worker();
    }

    fn stop_worker(&mut self) {
        self.submit(Command::Exit, true);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }

    fn submit(&self, command: Command, wait: bool) {
        let mut state = self.shared.state.lock().unwrap();
        if state.exited {
            return;
        }
        while state.command.is_some() {
            state = self.shared.settled.wait(state).unwrap();
            if state.exited {
                return;
            }
        }
        state.command = Some(command);
        state.submitted += 1;
        let seq = state.submitted;
        self.shared.wake.notify_one();
        if wait {
            while state.completed < seq && !state.exited {
                state = self.shared.settled.wait(state).unwrap();
            }
        }
    }
}

impl Drop for Player {
    fn drop(&mut self) {
        if self.handle.is_some() {
            self.stop_worker();
        }
    }
}

struct CurrentTrack {
    decoder: SampleDecoder,
    path: PathBuf,
}

struct Worker {
    shared: Arc<Shared>,
    engine: BufferEngine,
    playlist: Arc<Mutex<PlaylistState>>,
    force_mono: Arc<AtomicBool>,
    listener: Option<Arc<dyn TrackChangeListener>>,
    current: Option<CurrentTrack>,
    source: Source,
    bufsel: usize,
}

impl Worker {
    fn run(mut self, autoplay: bool) {
        if autoplay {
            self.advance(Direction::Forward);
        }
        loop {
            let (command, refill) = {
                let mut state = self.shared.state.lock().unwrap();
                loop {
                    if state.refill_pending || state.command.is_some() {
                        break;
                    }
                    state = self.shared.wake.wait(state).unwrap();
                }
                let refill = state.refill_pending;
                state.refill_pending = false;
                let command = state.command.take();
                if command.is_some() {
                    // Slot is free again; let the next submitter in
                    self.shared.settled.notify_all();
                }
                (command, refill)
            };

            // Buffer starvation beats command latency
            if refill {
                self.service_buffers();
            }
            if let Some(command) = command {
                let exit = matches!(command, Command::Exit);
                self.execute(command);
                let mut state = self.shared.state.lock().unwrap();
                state.completed += 1;
                if exit {
                    state.exited = true;
                }
                self.shared.settled.notify_all();
                if exit {
                    break;
                }
            }
        }
    }

    fn execute(&mut self, command: Command) {
        match command {
            Command::Pause => self.engine.set_paused(true),
            Command::Unpause => self.engine.set_paused(false),
            Command::QueryPaused => {
                let paused = self.engine.is_paused();
                self.shared.state.lock().unwrap().paused_response = paused;
            }
            Command::Play(path) => match self.start_track(&path) {
                Ok(()) => self.source = Source::Direct,
                Err(e) => log_player_error(&e),
            },
            Command::Next => {
                if self.source == Source::Playlist {
                    self.advance(Direction::Forward);
                }
            }
            Command::Previous => match self.source {
                Source::Playlist => {
                    if self.current_consumed_seconds() > PREVIOUS_REPLAY_SECONDS {
                        self.restart_current();
                    } else {
                        self.advance(Direction::Backward);
                    }
                }
                // A direct file has no playlist neighbors; previous always
                // replays it
                Source::Direct => {
                    self.restart_current();
                }
                Source::Stopped => {}
            },
            Command::RefreshPlaylist => {
                self.playlist.lock().unwrap().refresh();
                self.advance(Direction::Forward);
            }
            Command::ReconfigureMix => {
                let force_mono = self.force_mono.load(Ordering::SeqCst);
                self.engine.reconfigure_mix(force_mono);
            }
            Command::Halt => self.stop(),
            Command::SkipIfCurrent(path) => {
                let matches = self
                    .current
                    .as_ref()
                    .map(|track| track.path == path)
                    .unwrap_or(false);
                if matches && self.source == Source::Playlist {
                    self.advance(Direction::Forward);
                }
            }
            Command::Exit => self.stop(),
        }
    }

    /// Runs once per drained slot buffer. Keeps the pipeline fed, loops
    /// the track at its loop point, and advances the playlist when the
    /// last buffer of a finished track has played out.
    fn service_buffers(&mut self) {
        if self.current.is_none() {
            return;
        }
        let can_read = self
            .current
            .as_ref()
            .map(|track| track.decoder.can_read())
            .unwrap_or(false);
        if !can_read {
            if self.repeat_current() {
                // Seamless repeat: resume decoding at the loop point while
                // the tail buffers are still playing out
                if let Some(track) = self.current.as_mut() {
                    track.decoder.to_loop_point();
                }
            } else if self.engine.slots().all_done() {
                self.on_track_done();
                return;
            } else {
                // Still draining the final buffers
                return;
            }
        }

        // Both channels of the target slot must have drained; with a
        // stereo sink each channel notifies separately
        let slot = self.bufsel;
        if !self.engine.slots().pair_done(slot) {
            return;
        }
        let mut failure = None;
        if let Some(track) = self.current.as_mut() {
            match self.engine.refill(&mut track.decoder, slot) {
                Ok(RefillOutcome::Filled) => self.bufsel ^= 1,
                Ok(RefillOutcome::Exhausted) => {}
                Err(e) => failure = Some(e),
            }
        }
        if let Some(e) = failure {
            log_player_error(&PlayerError::from(e));
            self.stop();
        }
    }

    /// Repeat applies to the track itself when it is the only thing
    /// playing: a direct file, or the sole entry of a playlist. Anything
    /// else is the playlist's business.
    fn repeat_current(&self) -> bool {
        let state = self.playlist.lock().unwrap();
        match self.source {
            Source::Direct => state.flags.repeat,
            Source::Playlist => state.flags.repeat && state.is_single(),
            Source::Stopped => false,
        }
    }

    fn on_track_done(&mut self) {
        match self.source {
            // Repeating tracks never drain fully; reaching here means the
            // track is over for good
            Source::Direct | Source::Stopped => self.stop(),
            Source::Playlist => {
                if self.playlist.lock().unwrap().is_single() {
                    self.stop();
                } else {
                    self.advance(Direction::Forward);
                }
            }
        }
    }

    /// Walk the playlist until a track opens, skipping unplayable entries.
    /// If a full pass fails, stop and report the damage.
    fn advance(&mut self, direction: Direction) {
        let attempts = self.playlist.lock().unwrap().playlist.len();
        if attempts == 0 {
            self.stop();
            return;
        }
        let mut failed = Vec::new();
        for _ in 0..attempts {
            let next = {
                let mut state = self.playlist.lock().unwrap();
                match direction {
                    Direction::Forward => state.next(),
                    Direction::Backward => state.prev(),
                }
            };
            let path = match next {
                Some(path) => path,
                None => break, // end of playlist, repeat off
            };
            match self.start_track(&path) {
                Ok(()) => {
                    self.source = Source::Playlist;
                    if !failed.is_empty() {
                        warn!("skipped {} unplayable track(s)", failed.len());
                    }
                    return;
                }
                Err(e) => {
                    log_player_error(&e);
                    failed.push(path);
                }
            }
        }

        self.stop();
        if !failed.is_empty() {
            let playlist = self.playlist.lock().unwrap().playlist.name.clone();
            error!("no playable tracks left in playlist \"{}\"", playlist);
            let report = ExhaustionReport { playlist, failed };
            if let Some(listener) = &self.listener {
                listener.on_playlist_exhausted(&report);
            }
        }
    }

    /// Open, validate and start a track. The running track is replaced
    /// only once the new file has parsed.
    fn start_track(&mut self, path: &Path) -> Result<(), PlayerError> {
        let mut decoder = SampleDecoder::open(path)?;
        self.engine
            .load(&mut decoder, self.force_mono.load(Ordering::SeqCst))?;
        self.bufsel = 0;

        let container = decoder.container();
        let details = TrackDetails {
            path: path.to_path_buf(),
            title: container.title().to_string(),
            artist: container.artist().map(String::from),
            sample_rate: container.sample_rate(),
            channels: container.channel_count(),
            encoding: container.encoding(),
        };
        match &details.artist {
            Some(artist) => info!("now playing: {} by {}", details.title, artist),
            None => info!("now playing: {}", details.title),
        }

        self.current = Some(CurrentTrack { decoder, path: path.to_path_buf() });
        if let Some(listener) = &self.listener {
            listener.on_track_changed(&details);
        }
        Ok(())
    }

    /// Replay the current track from its first frame.
    fn restart_current(&mut self) {
        let force_mono = self.force_mono.load(Ordering::SeqCst);
        let mut failure = None;
        if let Some(track) = self.current.as_mut() {
            track.decoder.to_start();
            match self.engine.load(&mut track.decoder, force_mono) {
                Ok(()) => self.bufsel = 0,
                Err(e) => failure = Some(e),
            }
        }
        if let Some(e) = failure {
            log_player_error(&PlayerError::from(e));
            self.stop();
        }
    }

    fn current_consumed_seconds(&self) -> f32 {
        match &self.current {
            Some(track) => {
                let rate = track.decoder.container().sample_rate();
                track.decoder.frames_read(0) as f32 / rate
            }
            None => 0.0,
        }
    }

    fn stop(&mut self) {
        if self.current.take().is_some() {
            info!("playback stopped");
        }
        self.engine.reset();
        self.source = Source::Stopped;
        self.bufsel = 0;
    }
}
