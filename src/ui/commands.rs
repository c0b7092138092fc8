// Shell command parsing
// Result numbers are 1-based on the way in and 0-based once parsed.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    // Catalog
    Search(String),
    Results,

    // Transport
    Play(usize),
    Toggle,
    Next,
    Previous,
    Seek(f64),
    Volume(u8),
    Mute,
    Status,

    // Liked songs
    Like(usize),
    Unlike(usize),
    Liked,
    PlayLiked(usize),

    // Playlists
    PlaylistNew(String),
    PlaylistAdd { name: String, index: usize },
    PlaylistRemove { name: String, index: usize },
    PlaylistDelete(String),
    PlaylistRename { old: String, new: String },
    PlaylistShow(String),
    PlaylistPlay { name: String, index: usize },
    PlaylistList,

    Help,
    Quit,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseError {
    #[error("")]
    Empty,

    #[error("Unknown command '{0}', try 'help'")]
    Unknown(String),

    #[error("Usage: {0}")]
    Usage(&'static str),
}

pub const HELP: &str = "\
Commands:
  search <query>        search the catalog
  results               show the last search results
  play <n>              play result n (the results become the queue)
  pause | toggle        pause or resume
  next | prev           skip within the queue
  seek <secs>           jump to a position
  vol <0-100>           set volume
  mute                  toggle mute
  status                show what's playing
  like <n>              like/unlike result n
  unlike <n>            unlike liked song n
  liked                 list liked songs
  playliked <n>         play liked song n (liked songs become the queue)
  pl new <name>         create a playlist
  pl add <name> <n>     add result n to a playlist
  pl rm <name> <n>      remove track n from a playlist
  pl del <name>         delete a playlist
  pl mv <old> -> <new>  rename a playlist
  pl show <name>        list a playlist
  pl play <name> <n>    play track n of a playlist
  pl list               list playlists
  help                  this text
  quit                  exit";

fn index(raw: &str, usage: &'static str) -> Result<usize, ParseError> {
    match raw.trim().parse::<usize>() {
        Ok(n) if n >= 1 => Ok(n - 1),
        _ => Err(ParseError::Usage(usage)),
    }
}

// Playlist names may contain spaces, so the number is always the last word
fn name_and_index(rest: &str, usage: &'static str) -> Result<(String, usize), ParseError> {
    let (name, number) = rest.trim().rsplit_once(char::is_whitespace).ok_or(ParseError::Usage(usage))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(ParseError::Usage(usage));
    }
    Ok((name.to_string(), index(number, usage)?))
}

fn rename(rest: &str) -> Result<Command, ParseError> {
    const USAGE: &str = "pl mv <old> -> <new>";
    let (old, new) = rest.split_once("->").ok_or(ParseError::Usage(USAGE))?;
    Ok(Command::PlaylistRename {
        old: required(old, USAGE)?,
        new: required(new, USAGE)?,
    })
}

fn required(rest: &str, usage: &'static str) -> Result<String, ParseError> {
    let rest = rest.trim();
    if rest.is_empty() {
        Err(ParseError::Usage(usage))
    } else {
        Ok(rest.to_string())
    }
}

fn parse_playlist(rest: &str) -> Result<Command, ParseError> {
    let (sub, rest) = split_word(rest);
    match sub.to_ascii_lowercase().as_str() {
        "new" => Ok(Command::PlaylistNew(required(rest, "pl new <name>")?)),
        "add" => {
            let (name, index) = name_and_index(rest, "pl add <name> <n>")?;
            Ok(Command::PlaylistAdd { name, index })
        }
        "rm" => {
            let (name, index) = name_and_index(rest, "pl rm <name> <n>")?;
            Ok(Command::PlaylistRemove { name, index })
        }
        "del" => Ok(Command::PlaylistDelete(required(rest, "pl del <name>")?)),
        "mv" | "rename" => rename(rest),
        "show" => Ok(Command::PlaylistShow(required(rest, "pl show <name>")?)),
        "play" => {
            let (name, index) = name_and_index(rest, "pl play <name> <n>")?;
            Ok(Command::PlaylistPlay { name, index })
        }
        "list" | "" => Ok(Command::PlaylistList),
        _ => Err(ParseError::Usage("pl new|add|rm|del|mv|show|play|list ...")),
    }
}

fn split_word(line: &str) -> (&str, &str) {
    let line = line.trim();
    match line.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (line, ""),
    }
}

pub fn parse_command(line: &str) -> Result<Command, ParseError> {
    let (word, rest) = split_word(line);
    if word.is_empty() {
        return Err(ParseError::Empty);
    }

    match word.to_ascii_lowercase().as_str() {
        "search" | "s" => Ok(Command::Search(required(rest, "search <query>")?)),
        "results" | "r" => Ok(Command::Results),
        "play" | "p" => Ok(Command::Play(index(rest, "play <n>")?)),
        "pause" | "toggle" | "t" => Ok(Command::Toggle),
        "next" | "n" => Ok(Command::Next),
        "prev" | "previous" => Ok(Command::Previous),
        "seek" => match rest.parse::<f64>() {
            Ok(secs) if secs.is_finite() => Ok(Command::Seek(secs)),
            _ => Err(ParseError::Usage("seek <secs>")),
        },
        "vol" | "volume" => match rest.parse::<u8>() {
            Ok(level) if level <= 100 => Ok(Command::Volume(level)),
            _ => Err(ParseError::Usage("vol <0-100>")),
        },
        "mute" => Ok(Command::Mute),
        "status" | "st" => Ok(Command::Status),
        "like" => Ok(Command::Like(index(rest, "like <n>")?)),
        "unlike" => Ok(Command::Unlike(index(rest, "unlike <n>")?)),
        "liked" => Ok(Command::Liked),
        "playliked" => Ok(Command::PlayLiked(index(rest, "playliked <n>")?)),
        "pl" | "playlist" => parse_playlist(rest),
        "help" | "?" => Ok(Command::Help),
        "quit" | "exit" | "q" => Ok(Command::Quit),
        other => Err(ParseError::Unknown(other.to_string())),
    }
}
