use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use vk_audio::auth::Session;
use vk_audio::{Album, Track, VkAudioClient};

#[derive(Parser)]
#[command(name = "vkaudio", version, about = "VK audio scraper")]
struct Cli {
    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,
    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
    /// Keep HLS (m3u8) links instead of rewriting them to MP3
    #[arg(long, global = true)]
    keep_m3u8: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Save the session cookie and user id
    Login {
        /// Numeric id of the account
        #[arg(required_unless_present = "check")]
        user_id: Option<i64>,
        /// `remixsid` cookie value
        #[arg(required_unless_present = "check")]
        remixsid: Option<String>,
        /// Check current login status
        #[arg(long)]
        check: bool,
    },
    /// Clear saved session
    Logout,
    /// List an owner's tracks, or one playlist's
    Tracks {
        /// Owner id (negative for communities), defaults to you
        #[arg(short, long, allow_negative_numbers = true)]
        owner: Option<i64>,
        /// Playlist id
        #[arg(short, long)]
        album: Option<i64>,
        /// Playlist access hash
        #[arg(long)]
        access_hash: Option<String>,
    },
    /// List an owner's playlists
    Albums {
        #[arg(short, long, allow_negative_numbers = true)]
        owner: Option<i64>,
    },
    /// Search all audio
    Search {
        query: String,
        #[arg(short, long, default_value = "100")]
        count: usize,
        #[arg(long, default_value = "0")]
        offset: usize,
    },
    /// Search one owner's audio
    SearchUser {
        query: String,
        #[arg(short, long, allow_negative_numbers = true)]
        owner: Option<i64>,
    },
    /// Search playlists
    SearchAlbums { query: String },
    /// New releases
    News {
        #[arg(short, long, default_value = "100")]
        count: usize,
        #[arg(long, default_value = "0")]
        offset: usize,
    },
    /// Latest additions of followed owners
    Updates {
        #[arg(short, long, default_value = "100")]
        count: usize,
    },
    /// The chart
    Popular {
        #[arg(short, long, default_value = "100")]
        count: usize,
        #[arg(long, default_value = "0")]
        offset: usize,
    },
    /// Show one track
    Audio {
        #[arg(allow_negative_numbers = true)]
        owner_id: i64,
        audio_id: i64,
    },
    /// List tracks attached to a wall post
    Post {
        #[arg(allow_negative_numbers = true)]
        owner_id: i64,
        post_id: i64,
    },
    /// Follow an owner's audio
    Follow {
        #[arg(allow_negative_numbers = true)]
        user_id: i64,
    },
    /// Unfollow an owner's audio
    Unfollow {
        #[arg(allow_negative_numbers = true)]
        user_id: i64,
    },
    /// Edit a track's metadata
    Edit {
        #[arg(allow_negative_numbers = true)]
        owner_id: i64,
        audio_id: i64,
        /// Edit hash of the audio row
        #[arg(long)]
        hash: String,
        #[arg(long)]
        performer: String,
        #[arg(long)]
        title: String,
        #[arg(long, default_value = "")]
        text: String,
        #[arg(long, default_value_t = vk_audio::audio::DEFAULT_GENRE)]
        genre: u32,
    },
    /// Upload an audio file
    Upload {
        file: PathBuf,
        /// Community id, 0 for your own library
        #[arg(short, long, default_value = "0")]
        group: i64,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    let out = Output { json: cli.json };
    let keep_m3u8 = cli.keep_m3u8;
    let client = || connect(keep_m3u8);

    match cli.command {
        Command::Login {
            user_id,
            remixsid,
            check,
        } => cmd_login(user_id, remixsid, check),
        Command::Logout => cmd_logout(),
        Command::Tracks {
            owner,
            album,
            access_hash,
        } => out.tracks(client()?.tracks(owner, album, access_hash.as_deref())),
        Command::Albums { owner } => out.albums(client()?.albums(owner)),
        Command::Search {
            query,
            count,
            offset,
        } => out.tracks(client()?.search(&query, count, offset)),
        Command::SearchUser { query, owner } => {
            out.tracks(client()?.search_user(owner, &query)?.into_iter().map(Ok))
        }
        Command::SearchAlbums { query } => {
            out.albums(client()?.search_albums(&query)?.into_iter().map(Ok))
        }
        Command::News { count, offset } => out.tracks(client()?.news_iter(offset).take(count)),
        Command::Updates { count } => out.tracks(client()?.updates_iter().take(count)),
        Command::Popular { count, offset } => {
            out.tracks(client()?.popular_iter(offset).take(count))
        }
        Command::Audio { owner_id, audio_id } => {
            match client()?.audio_by_id(owner_id, audio_id)? {
                Some(track) => out.tracks(std::iter::once(Ok(track))),
                None => {
                    eprintln!("No audio found.");
                    Ok(())
                }
            }
        }
        Command::Post { owner_id, post_id } => {
            out.tracks(client()?.post_audio(owner_id, post_id))
        }
        Command::Follow { user_id } => out.value(&client()?.follow_user(user_id)?),
        Command::Unfollow { user_id } => out.value(&client()?.unfollow_user(user_id)?),
        Command::Edit {
            owner_id,
            audio_id,
            hash,
            performer,
            title,
            text,
            genre,
        } => out.value(&client()?.edit_audio(
            audio_id, owner_id, &hash, &performer, &title, &text, genre,
        )?),
        Command::Upload { file, group } => {
            let uploaded = client()?
                .upload_audio(&file, group)
                .with_context(|| format!("failed to upload {}", file.display()))?;
            out.value(&uploaded)
        }
    }
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "vk_audio=debug,info",
        _ => "vk_audio=trace,debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn connect(keep_m3u8: bool) -> Result<VkAudioClient> {
    let session = Session::load()?;
    if !session.is_logged_in() {
        anyhow::bail!("not logged in, run `vkaudio login <user_id> <remixsid>` first");
    }
    let options = vk_audio::ClientOptions {
        convert_m3u8_links: !keep_m3u8,
        ..vk_audio::ClientOptions::default()
    };
    VkAudioClient::with_session(session, options).context("failed to open VK session")
}

// ── login / logout ──

fn cmd_login(user_id: Option<i64>, remixsid: Option<String>, check: bool) -> Result<()> {
    if check {
        let session = Session::load()?;
        match session.user_id {
            Some(id) => match VkAudioClient::with_session(session, vk_audio::ClientOptions::default()) {
                Ok(_) => println!("Logged in as id={id}"),
                Err(e) => println!("Session exists but validation failed: {e}"),
            },
            None => println!("Not logged in."),
        }
        return Ok(());
    }

    let user_id = user_id.context("user id required")?;
    let remixsid = remixsid.context("remixsid value required")?;
    Session::new(user_id, remixsid).save()?;
    println!("Session saved.");
    Ok(())
}

fn cmd_logout() -> Result<()> {
    Session::clear()?;
    println!("Session cleared.");
    Ok(())
}

// ── output ──

struct Output {
    json: bool,
}

impl Output {
    /// Print tracks as they arrive; JSON mode emits one object per line.
    fn tracks(&self, tracks: impl Iterator<Item = vk_audio::Result<Track>>) -> Result<()> {
        let mut n = 0usize;
        for track in tracks {
            let t = track?;
            n += 1;
            if self.json {
                println!("{}", serde_json::to_string(&t)?);
            } else {
                println!(
                    "  [{}_{}] {} - {} ({}:{:02})",
                    t.owner_id,
                    t.id,
                    t.artist,
                    t.title,
                    t.duration / 60,
                    t.duration % 60,
                );
            }
        }
        if !self.json {
            println!("\nTotal: {n}");
        }
        Ok(())
    }

    fn albums(&self, albums: impl Iterator<Item = vk_audio::Result<Album>>) -> Result<()> {
        for album in albums {
            let a = album?;
            if self.json {
                println!("{}", serde_json::to_string(&a)?);
                continue;
            }
            print!("  [{}_{}] {} - {}", a.owner_id, a.id, a.artist, a.title);
            if let Some(count) = a.count {
                print!(" ({count} tracks)");
            }
            if let Some(plays) = a.plays {
                print!(" {plays} plays");
            }
            println!();
        }
        Ok(())
    }

    fn value(&self, value: &serde_json::Value) -> Result<()> {
        if self.json {
            println!("{value}");
        } else {
            println!("{}", serde_json::to_string_pretty(value)?);
        }
        Ok(())
    }
}
