//! The `audio.cfg` text configuration.
//!
//! Line based: `#` starts a comment, top-level `key = value` pairs set
//! options, and `name [` ... `]` blocks declare playlists with one track
//! path per line. Relative track paths resolve against the music
//! directory. A missing file is replaced with a commented default
//! template on first load.

use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, warn};

use crate::error::ConfigError;
use crate::queue::PlayFlags;

const DEFAULT_TEMPLATE: &str = "\
# hwav-player audio configuration
#
# playlist_options: comma separated list of none, randomise, repeat
# mono:             yes to collapse stereo tracks to mono output
# default_playlist: playlist to start with, or null
playlist_options = none
mono = no
default_playlist = null
";

/// A playlist as written in the config file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredPlaylist {
    pub name: String,
    pub tracks: Vec<PathBuf>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AudioConfig {
    pub flags: PlayFlags,
    pub always_mono: bool,
    pub default_playlist: Option<String>,
    pub playlists: Vec<StoredPlaylist>,
    pub music_dir: PathBuf,
}

impl AudioConfig {
    pub fn new(music_dir: PathBuf) -> Self {
        Self {
            flags: PlayFlags::default(),
            always_mono: false,
            default_playlist: None,
            playlists: Vec::new(),
            music_dir,
        }
    }

    /// Standard location: `<config dir>/hwav-player/audio.cfg`
    pub fn default_path() -> Result<PathBuf, ConfigError> {
        let base = dirs::config_dir().ok_or(ConfigError::ConfigDirNotFound)?;
        Ok(base.join("hwav-player").join("audio.cfg"))
    }

    /// Standard music directory, falling back to the home directory
    pub fn default_music_dir() -> PathBuf {
        dirs::audio_dir()
            .or_else(dirs::home_dir)
            .unwrap_or_else(|| PathBuf::from("."))
    }

    /// Load a config file, writing the default template first if the file
    /// does not exist yet.
    pub fn load(path: &Path, music_dir: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            debug!("no config at {}, writing default template", path.display());
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(path, DEFAULT_TEMPLATE)?;
        }
        let text = fs::read_to_string(path)?;
        Self::parse(&text, music_dir)
    }

    pub fn parse(text: &str, music_dir: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::new(music_dir.to_path_buf());
        let mut block: Option<StoredPlaylist> = None;

        for (number, raw) in text.lines().enumerate() {
            let number = number + 1;
            let line = match raw.find('#') {
                Some(at) => raw[..at].trim(),
                None => raw.trim(),
            };
            if line.is_empty() {
                continue;
            }

            if block.is_some() {
                if line == "]" {
                    if let Some(playlist) = block.take() {
                        config.playlists.push(playlist);
                    }
                    continue;
                }
                if line.ends_with('[') {
                    return Err(ConfigError::Syntax {
                        line: number,
                        reason: "playlist block opened inside another block".to_string(),
                    });
                }
                let path = PathBuf::from(line);
                let resolved = if path.is_absolute() {
                    path
                } else {
                    music_dir.join(path)
                };
                if let Some(playlist) = block.as_mut() {
                    playlist.tracks.push(resolved);
                }
                continue;
            }

            if let Some(name) = line.strip_suffix('[') {
                let name = name.trim();
                if name.is_empty() {
                    return Err(ConfigError::Syntax {
                        line: number,
                        reason: "playlist block without a name".to_string(),
                    });
                }
                block = Some(StoredPlaylist {
                    name: name.to_string(),
                    tracks: Vec::new(),
                });
                continue;
            }
            if line == "]" {
                return Err(ConfigError::Syntax {
                    line: number,
                    reason: "closing bracket outside a playlist block".to_string(),
                });
            }

            let (key, value) = line.split_once('=').ok_or_else(|| ConfigError::Syntax {
                line: number,
                reason: "expected key = value".to_string(),
            })?;
            config.apply_option(key.trim(), value.trim());
        }

        if block.is_some() {
            return Err(ConfigError::Syntax {
                line: text.lines().count(),
                reason: "unterminated playlist block".to_string(),
            });
        }
        Ok(config)
    }

    fn apply_option(&mut self, key: &str, value: &str) {
        match key {
            "playlist_options" => {
                for option in value.split(',').map(str::trim) {
                    match option.to_lowercase().as_str() {
                        "" | "none" => {}
                        "randomise" | "randomize" => self.flags.shuffle = true,
                        "repeat" => self.flags.repeat = true,
                        other => warn!("ignoring unknown playlist option: {}", other),
                    }
                }
            }
            "mono" => {
                let value = value.to_lowercase();
                self.always_mono = value == "yes" || value == "on";
            }
            "default_playlist" => {
                self.default_playlist = match value.to_lowercase().as_str() {
                    "" | "null" | "none" => None,
                    _ => Some(value.to_string()),
                };
            }
            other => warn!("ignoring unknown config key: {}", other),
        }
    }

    /// Write the config back out in canonical form.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let mut out = String::new();
        let mut options = Vec::new();
        if self.flags.shuffle {
            options.push("randomise");
        }
        if self.flags.repeat {
            options.push("repeat");
        }
        if options.is_empty() {
            options.push("none");
        }
        out.push_str(&format!("playlist_options = {}\n", options.join(",")));
        out.push_str(&format!("mono = {}\n", if self.always_mono { "yes" } else { "no" }));
        out.push_str(&format!(
            "default_playlist = {}\n",
            self.default_playlist.as_deref().unwrap_or("null")
        ));
        for playlist in &self.playlists {
            out.push_str(&format!("{} [\n", playlist.name));
            for track in &playlist.tracks {
                out.push_str(&format!("\t{}\n", track.display()));
            }
            out.push_str("]\n");
        }

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, out)?;
        Ok(())
    }

    pub fn find_playlist(&self, name: &str) -> Option<&StoredPlaylist> {
        self.playlists.iter().find(|p| p.name == name)
    }
}
