//! Interactive command parsing for the line-based control prompt.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CommandParseError {
    #[error("empty command")]
    Empty,

    #[error("unknown command: {0}")]
    Unknown(String),

    #[error("command \"{command}\" requires an argument")]
    MissingArgument { command: String },

    #[error("invalid argument for \"{command}\": {argument}")]
    InvalidArgument { command: String, argument: String },
}

/// One line typed at the prompt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserCommand {
    Pause,
    Resume,
    Next,
    Previous,
    Play(PathBuf),
    Playlist,
    Mono(bool),
    Status,
    Help,
    Quit,
}

pub fn parse(input: &str) -> Result<UserCommand, CommandParseError> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CommandParseError::Empty);
    }
    let (word, rest) = match input.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (input, ""),
    };

    match word.to_lowercase().as_str() {
        "pause" => Ok(UserCommand::Pause),
        "resume" | "unpause" => Ok(UserCommand::Resume),
        "next" | "n" => Ok(UserCommand::Next),
        "prev" | "previous" => Ok(UserCommand::Previous),
        "play" => {
            if rest.is_empty() {
                Err(CommandParseError::MissingArgument { command: "play".to_string() })
            } else {
                Ok(UserCommand::Play(PathBuf::from(rest)))
            }
        }
        "playlist" | "pl" => Ok(UserCommand::Playlist),
        "mono" => match rest.to_lowercase().as_str() {
            "on" | "yes" => Ok(UserCommand::Mono(true)),
            "off" | "no" => Ok(UserCommand::Mono(false)),
            "" => Err(CommandParseError::MissingArgument { command: "mono".to_string() }),
            other => Err(CommandParseError::InvalidArgument {
                command: "mono".to_string(),
                argument: other.to_string(),
            }),
        },
        "status" => Ok(UserCommand::Status),
        "help" | "h" | "?" => Ok(UserCommand::Help),
        "quit" | "q" | "exit" => Ok(UserCommand::Quit),
        other => Err(CommandParseError::Unknown(other.to_string())),
    }
}

pub fn help_text() -> &'static str {
    "commands:\n\
     \x20 pause / resume      hold or continue playback\n\
     \x20 next / prev         move through the playlist\n\
     \x20 play <file>         play a specific file\n\
     \x20 playlist            restart playlist playback from the top\n\
     \x20 mono on|off         collapse output to mono\n\
     \x20 status              show whether playback is paused\n\
     \x20 quit                stop and exit"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_basic_commands() {
        assert_eq!(parse("pause").unwrap(), UserCommand::Pause);
        assert_eq!(parse("  resume  ").unwrap(), UserCommand::Resume);
        assert_eq!(parse("NEXT").unwrap(), UserCommand::Next);
        assert_eq!(parse("prev").unwrap(), UserCommand::Previous);
        assert_eq!(parse("playlist").unwrap(), UserCommand::Playlist);
        assert_eq!(parse("pl").unwrap(), UserCommand::Playlist);
        assert_eq!(parse("q").unwrap(), UserCommand::Quit);
        assert_eq!(parse("?").unwrap(), UserCommand::Help);
    }

    #[test]
    fn test_parse_play_keeps_spaces_in_path() {
        assert_eq!(
            parse("play /music/my song.hwav").unwrap(),
            UserCommand::Play(PathBuf::from("/music/my song.hwav"))
        );
        assert!(matches!(
            parse("play"),
            Err(CommandParseError::MissingArgument { .. })
        ));
    }

    #[test]
    fn test_parse_mono_argument() {
        assert_eq!(parse("mono on").unwrap(), UserCommand::Mono(true));
        assert_eq!(parse("mono OFF").unwrap(), UserCommand::Mono(false));
        assert!(matches!(
            parse("mono sideways"),
            Err(CommandParseError::InvalidArgument { .. })
        ));
    }

    #[test]
    fn test_parse_rejects_unknown_and_empty() {
        assert!(matches!(parse(""), Err(CommandParseError::Empty)));
        assert!(matches!(parse("   "), Err(CommandParseError::Empty)));
        assert!(matches!(parse("frobnicate"), Err(CommandParseError::Unknown(_))));
    }
}
