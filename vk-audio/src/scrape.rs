//! Field extraction from VK pages and `al_audio.php` payloads.
//!
//! Everything here is pure: the functions take a body that has already been
//! fetched and return typed values, so they can be tested against saved
//! fixtures. Audio is encoded by VK as positional JSON arrays; the indices
//! used below are:
//!
//! | index | field                                   |
//! |-------|-----------------------------------------|
//! | 0     | audio id                                |
//! | 1     | owner id                                |
//! | 2     | url (possibly obfuscated, possibly HLS) |
//! | 3     | title (HTML)                            |
//! | 4     | artist (HTML)                           |
//! | 5     | duration, seconds                       |
//! | 13    | `/`-separated hashes (HTML lists)       |
//! | 14    | `,`-separated cover URLs                |
//! | 24    | reload hash (ajax lists)                |

use crate::error::{Result, VkAudioError};
use crate::types::{Album, AudioRef, CatalogPlaylist, Track, truthy, value_to_i64, value_to_string};
use crate::url_decoder::decode_audio_url;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde_json::Value;
use std::sync::LazyLock;
use std::time::{SystemTime, UNIX_EPOCH};

/// Root of the track list on search pages.
pub const SEARCH_ITEMS_ROOT: &str = "#au_search_items";
/// Root of the track on a single-audio page.
pub const SINGLE_AUDIO_ROOT: &str = ".basisDefault";
/// Root of the attachment list on a wall post page.
pub const POST_AUDIO_ROOT: &str = ".audios_list";

static RE_ALBUM_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"act=audio_playlist(-?\d+)_(\d+)").expect("valid regex"));
static RE_ACCESS_HASH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"access_hash=(\w+)").expect("valid regex"));
static RE_M3U8_TO_MP3: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"/[0-9a-f]+(/audios)?/([0-9a-f]+)/index\.m3u8").expect("valid regex")
});
static RE_USER_AUDIO_HASH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"AudioUtils.(un)?followOwner\(\d+, &#39;([^)]+)&#39;\)").expect("valid regex")
});
static RE_AUDIO_PAGE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"new AudioPage\(.*?(\{.*\})").expect("valid regex"));
static RE_URL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"https?:[^']*").expect("valid regex"));

fn selector(css: &str) -> Selector {
    Selector::parse(css).expect("valid selector")
}

static SEL_AUDIO_ITEM: LazyLock<Selector> = LazyLock::new(|| selector("div.audio_item"));
static SEL_ALBUM_ITEM: LazyLock<Selector> =
    LazyLock::new(|| selector("div.audioPlaylistsPage__item"));
static SEL_ALBUM_LINK: LazyLock<Selector> =
    LazyLock::new(|| selector(".audioPlaylistsPage__itemLink"));
static SEL_ALBUM_STATS: LazyLock<Selector> =
    LazyLock::new(|| selector(".audioPlaylistsPage__stats"));
static SEL_ALBUM_TITLE: LazyLock<Selector> =
    LazyLock::new(|| selector(".audioPlaylistsPage__title"));
static SEL_ALBUM_AUTHOR: LazyLock<Selector> =
    LazyLock::new(|| selector(".audioPlaylistsPage__author"));

const PLAYLIST_SNIPPET_CLASS: &str = "audioPlaylistSnippet__list";
const DISABLED_AUDIO_CLASS: &str = "audio_item_disabled";
const NUM_DELIM: &str = r#"<span class="num_delim"> </span>"#;

/// Parse an `al_audio.php` response: the body is JSON with `<!--` noise.
pub fn parse_al_response(text: &str) -> Result<Value> {
    Ok(serde_json::from_str(&text.replace("<!--", ""))?)
}

/// Collect reload references from an ajax playlist `list`.
///
/// Entries missing an owner, id or reload hash are dropped.
pub fn ids_from_list(list: &[Value]) -> Vec<AudioRef> {
    list.iter()
        .filter_map(|audio| {
            AudioRef::new(
                value_to_string(&audio[1]),
                value_to_string(&audio[0]),
                vec![value_to_string(&audio[24])],
            )
        })
        .collect()
}

/// Collect reload references from `div.audio_item` nodes under `root`.
///
/// Items inside embedded playlist snippets and disabled items are skipped.
///
/// # Errors
///
/// [`VkAudioError::Parse`] if `root` is not on the page.
pub fn ids_from_html(html: &str, root: &str) -> Result<Vec<AudioRef>> {
    let document = Html::parse_document(html);
    let root_sel = Selector::parse(root)
        .map_err(|e| VkAudioError::Parse(format!("bad root selector {root:?}: {e}")))?;
    let root_el = document
        .select(&root_sel)
        .next()
        .ok_or_else(|| VkAudioError::Parse(format!("could not find root element {root}")))?;

    let mut ids = Vec::new();
    for audio in root_el.select(&SEL_AUDIO_ITEM) {
        if has_class(&audio, DISABLED_AUDIO_CLASS) || inside_snippet(&audio) {
            continue;
        }
        let Some(raw) = audio.value().attr("data-audio") else {
            continue;
        };
        let data: Value = serde_json::from_str(raw)?;
        let hashes: Vec<&str> = data[13].as_str().unwrap_or("").split('/').collect();
        let (Some(action_hash), Some(url_hash)) = (hashes.get(2), hashes.get(5)) else {
            continue;
        };
        if let Some(id) = AudioRef::new(
            value_to_string(&data[1]),
            value_to_string(&data[0]),
            vec![(*action_hash).to_owned(), (*url_hash).to_owned()],
        ) {
            ids.push(id);
        }
    }
    Ok(ids)
}

fn has_class(el: &ElementRef<'_>, class: &str) -> bool {
    el.value().classes().any(|c| c == class)
}

fn inside_snippet(el: &ElementRef<'_>) -> bool {
    el.ancestors().any(|node| {
        node.value()
            .as_element()
            .is_some_and(|e| e.classes().any(|c| c == PLAYLIST_SNIPPET_CLASS))
    })
}

/// Extract the JSON object passed to `new AudioPage(...)` in a full page.
pub fn audio_page_json(html: &str) -> Result<Value> {
    let raw = RE_AUDIO_PAGE
        .captures(html)
        .and_then(|c| c.get(1))
        .ok_or_else(|| VkAudioError::Parse("no AudioPage data on page".into()))?;
    Ok(serde_json::from_str(raw.as_str())?)
}

/// Build tracks from an `act=reload_audios` response.
///
/// Obfuscated URLs are decoded for `user_id`. With `convert_m3u8` set, HLS
/// playlist URLs are rewritten to point at the plain MP3.
pub fn tracks_from_reload(response: &Value, user_id: i64, convert_m3u8: bool) -> Result<Vec<Track>> {
    if !truthy(&response["payload"]) {
        return Ok(Vec::new());
    }
    let audios = response["payload"][1][0]
        .as_array()
        .ok_or_else(|| VkAudioError::Parse("reload_audios payload has no audio list".into()))?;

    audios
        .iter()
        .filter_map(|audio| {
            let ids = value_to_i64(&audio[0]).zip(value_to_i64(&audio[1]));
            if ids.is_none() {
                tracing::debug!(%audio, "skipping reloaded audio without ids");
            }
            ids.map(|ids| (ids, audio))
        })
        .map(|((id, owner_id), audio)| -> Result<Track> {
            let mut url = audio[2].as_str().unwrap_or("").to_owned();
            if url.contains("audio_api_unavailable") {
                url = decode_audio_url(&url, user_id)?;
            }
            if convert_m3u8 && url.contains("m3u8") {
                url = m3u8_to_mp3(&url);
            }
            let covers = audio[14].as_str().unwrap_or("");
            Ok(Track {
                id,
                owner_id,
                track_covers: if covers.is_empty() {
                    Vec::new()
                } else {
                    covers.split(',').map(String::from).collect()
                },
                url,
                artist: html_text(audio[4].as_str().unwrap_or("")),
                title: html_text(audio[3].as_str().unwrap_or("").trim()),
                duration: audio[5]
                    .as_u64()
                    .or_else(|| audio[5].as_str().and_then(|s| s.parse().ok()))
                    .unwrap_or_default(),
            })
        })
        .collect()
}

/// Rewrite `.../<hex>[/audios]/<hex>/index.m3u8` to `...[/audios]/<hex>.mp3`.
pub fn m3u8_to_mp3(url: &str) -> String {
    RE_M3U8_TO_MP3.replace_all(url, "${1}/${2}.mp3").into_owned()
}

/// Text content of an HTML fragment, with entities resolved.
fn html_text(fragment: &str) -> String {
    Html::parse_fragment(fragment)
        .root_element()
        .text()
        .collect()
}

/// Parse the mobile "playlists" page of an owner.
///
/// Items whose link does not carry a playlist id are skipped.
pub fn albums_from_html(html: &str) -> Vec<Album> {
    let document = Html::parse_document(html);
    let mut albums = Vec::new();

    for item in document.select(&SEL_ALBUM_ITEM) {
        let Some(href) = item
            .select(&SEL_ALBUM_LINK)
            .next()
            .and_then(|a| a.value().attr("href"))
        else {
            tracing::debug!("playlist item without link");
            continue;
        };
        let Some((owner_id, id)) = RE_ALBUM_ID.captures(href).and_then(|c| {
            Some((c[1].parse::<i64>().ok()?, c[2].parse::<i64>().ok()?))
        }) else {
            tracing::debug!(href, "playlist link without id");
            continue;
        };

        albums.push(Album {
            id,
            owner_id,
            url: Album::page_url(owner_id, id),
            access_hash: RE_ACCESS_HASH.captures(href).map(|c| c[1].to_owned()),
            title: select_text(&item, &SEL_ALBUM_TITLE),
            artist: select_text(&item, &SEL_ALBUM_AUTHOR),
            plays: parse_plays(&select_text(&item, &SEL_ALBUM_STATS)),
            count: None,
        });
    }
    albums
}

fn select_text(el: &ElementRef<'_>, sel: &Selector) -> String {
    el.select(sel)
        .next()
        .map(|e| e.text().collect())
        .unwrap_or_default()
}

/// `"1 011 прослушиваний"` → `1011`.
fn parse_plays(stats: &str) -> Option<u64> {
    let number = stats.rsplit_once(' ').map_or(stats, |(head, _)| head);
    number
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .parse()
        .ok()
}

/// Build albums from catalog `playlists` entries. Non-playlist blocks are ignored.
pub fn albums_from_catalog(playlists: &[Value]) -> Vec<Album> {
    playlists
        .iter()
        .filter(|raw| raw["type"].as_str() == Some("playlist"))
        .map(|raw| {
            let owner_id = value_to_i64(&raw["ownerId"]).unwrap_or_default();
            let id = value_to_i64(&raw["id"]).unwrap_or_default();
            Album {
                id,
                owner_id,
                url: Album::page_url(owner_id, id),
                access_hash: raw["accessHash"]
                    .as_str()
                    .filter(|h| !h.is_empty())
                    .map(String::from),
                title: raw["title"].as_str().unwrap_or("").to_owned(),
                artist: raw["authorName"].as_str().unwrap_or("").to_owned(),
                plays: raw["infoLine2"].as_str().and_then(parse_catalog_plays),
                count: value_to_i64(&raw["totalCount"]).and_then(|c| u64::try_from(c).ok()),
            }
        })
        .collect()
}

/// `1<span class="num_delim"> </span>448 прослушиваний<span class="dvd"></span>9 аудиозаписей`
/// → `1448`.
fn parse_catalog_plays(info: &str) -> Option<u64> {
    let head = info.rsplit_once("<span").map_or(info, |(head, _)| head);
    let joined = head.replace(NUM_DELIM, "");
    let number = joined.rsplit_once(' ').map_or(joined.as_str(), |(n, _)| n);
    number.trim().parse().ok()
}

/// Pick the first catalog playlist titled with one of `targets`.
pub fn find_target_playlist(playlists: &[Value], targets: &[&str]) -> Option<CatalogPlaylist> {
    playlists
        .iter()
        .find(|p| p["title"].as_str().is_some_and(|t| targets.contains(&t)))
        .map(CatalogPlaylist::from_value)
}

/// Titles of the non-empty playlists in a catalog block, for diagnostics.
pub fn playlist_titles(playlists: &[Value]) -> Vec<String> {
    playlists
        .iter()
        .filter(|p| truthy(&p["list"]))
        .map(|p| p["title"].as_str().unwrap_or("").to_owned())
        .collect()
}

/// Locate the "all albums" catalog block referenced by a search page.
///
/// Returns `None` when the search page lists its albums inline.
///
/// # Errors
///
/// [`VkAudioError::Parse`] if the page has no album header at all.
pub fn album_search_block_id(html: &str) -> Result<Option<String>> {
    let (_, rest) = html
        .split_once("CatalogSearchGlobalAlbumsHeader")
        .ok_or_else(|| VkAudioError::Parse("no album block in search results".into()))?;
    Ok(rest
        .split_once("/audio?section=recoms_block&type=")
        .map(|(_, tail)| tail.split('"').next().unwrap_or_default().to_owned()))
}

/// Hash required by `act=follow_owner` / `act=unfollow_owner`.
pub fn user_audio_hash(html: &str) -> Option<String> {
    RE_USER_AUDIO_HASH
        .captures(html)
        .and_then(|c| c.get(2))
        .map(|m| m.as_str().to_owned())
}

/// First absolute URL in a script snippet (the upload form target).
pub fn upload_url(snippet: &str) -> Option<&str> {
    RE_URL.find(snippet).map(|m| m.as_str())
}

/// Current epoch milliseconds in base 36, used as an upload box hash.
pub fn base36_timestamp() -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default();
    base36(millis)
}

#[allow(clippy::cast_possible_truncation)]
fn base36(mut number: u128) -> String {
    const DIGITS: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    let mut out = Vec::new();
    while number != 0 {
        out.push(DIGITS[(number % 36) as usize]);
        number /= 36;
    }
    out.reverse();
    String::from_utf8(out).unwrap_or_default()
}
