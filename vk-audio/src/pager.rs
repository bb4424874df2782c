//! Lazy walks over VK's paginated audio lists.
//!
//! Every listing endpoint returns pages of audio *references*; the playable
//! tracks are obtained separately with `reload_audios`. A [`PageSource`]
//! knows how to fetch the next page of references for one endpoint and
//! where the continuation cursor lives in its response. [`Tracks`] drives a
//! source and resolves each page in batches of [`RELOAD_BATCH`], so nothing
//! is requested before the caller asks for it.

use crate::client::{Form, RELOAD_BATCH, VkAudioClient};
use crate::error::{Result, VkAudioError};
use crate::scrape::{albums_from_html, ids_from_list};
use crate::types::{Album, AudioRef, CatalogPlaylist, Track, truthy, value_to_string};
use std::collections::VecDeque;
use std::mem;

/// Offset step of the mobile `load_section` call for a whole library.
pub const TRACKS_PER_USER_PAGE: usize = 2000;
/// Offset step of the mobile `load_section` call for one playlist.
pub const TRACKS_PER_ALBUM_PAGE: usize = 2000;
/// Playlists per mobile playlists page.
pub const ALBUMS_PER_USER_PAGE: usize = 100;
/// A catalog "updates" chunk shorter than this is the last one.
const UPDATES_PAGE_SIZE: usize = 11;

/// Produces successive pages of audio references.
///
/// `Ok(None)` ends the walk. An empty page does not.
pub(crate) trait PageSource {
    fn next_page(&mut self, client: &VkAudioClient) -> Result<Option<Vec<AudioRef>>>;
}

/// Iterator over the tracks of a paginated list.
///
/// Yields `Err` at most once; the iterator is exhausted after an error.
pub struct Tracks<'c> {
    client: &'c VkAudioClient,
    source: Box<dyn PageSource + 'c>,
    pending: VecDeque<AudioRef>,
    ready: VecDeque<Track>,
    exhausted: bool,
    failed: bool,
}

impl<'c> Tracks<'c> {
    pub(crate) fn new(client: &'c VkAudioClient, source: impl PageSource + 'c) -> Self {
        Self {
            client,
            source: Box::new(source),
            pending: VecDeque::new(),
            ready: VecDeque::new(),
            exhausted: false,
            failed: false,
        }
    }

    fn fail(&mut self, err: VkAudioError) -> Option<Result<Track>> {
        self.failed = true;
        self.pending.clear();
        Some(Err(err))
    }
}

impl Iterator for Tracks<'_> {
    type Item = Result<Track>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(track) = self.ready.pop_front() {
                return Some(Ok(track));
            }
            if self.failed {
                return None;
            }
            // Batches never span two pages: the next page is only fetched
            // once the current one is fully resolved.
            if !self.pending.is_empty() {
                let n = self.pending.len().min(RELOAD_BATCH);
                let batch: Vec<AudioRef> = self.pending.drain(..n).collect();
                match self.client.reload_audios(&batch) {
                    Ok(tracks) => self.ready.extend(tracks),
                    Err(e) => return self.fail(e),
                }
                continue;
            }
            if self.exhausted {
                return None;
            }
            match self.source.next_page(self.client) {
                Ok(Some(ids)) => self.pending.extend(ids),
                Ok(None) => self.exhausted = true,
                Err(e) => return self.fail(e),
            }
        }
    }
}

/// A single page computed on first use.
pub(crate) struct OncePage<F>(Option<F>);

impl<F> OncePage<F>
where
    F: FnOnce(&VkAudioClient) -> Result<Vec<AudioRef>>,
{
    pub(crate) fn new(fetch: F) -> Self {
        Self(Some(fetch))
    }
}

impl<F> PageSource for OncePage<F>
where
    F: FnOnce(&VkAudioClient) -> Result<Vec<AudioRef>>,
{
    fn next_page(&mut self, client: &VkAudioClient) -> Result<Option<Vec<AudioRef>>> {
        match self.0.take() {
            Some(fetch) => fetch(client).map(Some),
            None => Ok(None),
        }
    }
}

/// Mobile `act=load_section`: a library or one playlist, by offset.
pub(crate) struct SectionSource {
    owner_id: i64,
    playlist_id: Option<i64>,
    access_hash: Option<String>,
    offset: usize,
    done: bool,
}

impl SectionSource {
    pub(crate) fn new(owner_id: i64, playlist_id: Option<i64>, access_hash: Option<String>) -> Self {
        Self {
            owner_id,
            playlist_id,
            access_hash,
            offset: 0,
            done: false,
        }
    }

    /// `load_section` form for the current offset. `access_hash` is only
    /// sent when known.
    fn form(&self) -> Form {
        let mut form: Form = vec![
            ("act", "load_section".into()),
            ("owner_id", self.owner_id.to_string()),
            ("playlist_id", self.playlist_id.unwrap_or(-1).to_string()),
            ("offset", self.offset.to_string()),
            ("type", "playlist".into()),
        ];
        if let Some(hash) = &self.access_hash {
            form.push(("access_hash", hash.clone()));
        }
        form.push(("is_loading_all", "1".into()));
        form
    }

    fn step(&self) -> usize {
        if self.playlist_id.is_some() {
            TRACKS_PER_ALBUM_PAGE
        } else {
            TRACKS_PER_USER_PAGE
        }
    }
}

impl PageSource for SectionSource {
    fn next_page(&mut self, client: &VkAudioClient) -> Result<Option<Vec<AudioRef>>> {
        if self.done {
            return Ok(None);
        }
        let text = client.post_form(&client.mobile("/audio"), &self.form())?;
        let response: serde_json::Value = serde_json::from_str(&text)?;
        let data = &response["data"][0];
        if !truthy(data) {
            return Err(VkAudioError::access_denied("albums", self.owner_id));
        }

        let ids = ids_from_list(data["list"].as_array().map(Vec::as_slice).unwrap_or_default());
        if ids.is_empty() {
            return Ok(None);
        }
        if truthy(&data["hasMore"]) {
            self.offset += self.step();
        } else {
            self.done = true;
        }
        Ok(Some(ids))
    }
}

enum Cursor {
    Start,
    Continue { section_id: String, start_from: String },
    Done,
}

impl Cursor {
    fn after(playlist: &CatalogPlaylist) -> Self {
        if playlist.has_more {
            Self::Continue {
                section_id: playlist.id.clone(),
                start_from: playlist.next_offset.clone().unwrap_or_default(),
            }
        } else {
            Self::Done
        }
    }
}

/// A virtual playlist inside `act=section` results, followed through
/// `load_catalog_section` continuations. The playlist is located by title
/// in every chunk, and the first `offset` tracks are skipped.
pub(crate) struct CatalogSource {
    form: Form,
    targets: &'static [&'static str],
    offset: usize,
    seen: usize,
    cursor: Cursor,
}

impl CatalogSource {
    pub(crate) fn new(form: Form, targets: &'static [&'static str], offset: usize) -> Self {
        Self {
            form,
            targets,
            offset,
            seen: 0,
            cursor: Cursor::Start,
        }
    }
}

impl PageSource for CatalogSource {
    fn next_page(&mut self, client: &VkAudioClient) -> Result<Option<Vec<AudioRef>>> {
        loop {
            let playlist = match mem::replace(&mut self.cursor, Cursor::Done) {
                Cursor::Start => client.first_catalog_playlist(&self.form, self.targets)?,
                Cursor::Continue {
                    section_id,
                    start_from,
                } => {
                    let response = client.load_catalog_section(&section_id, Some(&start_from))?;
                    client.target_playlist(&response, self.targets)?
                }
                Cursor::Done => return Ok(None),
            };
            let Some(playlist) = playlist else {
                return Ok(None);
            };

            let mut ids = ids_from_list(&playlist.list);
            if ids.is_empty() {
                return Ok(None);
            }
            self.cursor = Cursor::after(&playlist);

            let page_len = ids.len();
            let start = self.seen;
            self.seen += page_len;
            if start + page_len >= self.offset {
                ids.drain(..self.offset.saturating_sub(start));
                return Ok(Some(ids));
            }
            tracing::debug!(skipped = page_len, offset = self.offset, "skipping catalog page");
        }
    }
}

/// The "updates" section: the newest audio of every followed owner.
///
/// Only the first audio of each playlist is taken. A chunk with fewer
/// than [`UPDATES_PAGE_SIZE`] playlists ends the walk; otherwise the next
/// chunk is addressed by the block's `sectionId` and `nextFrom`.
pub(crate) struct UpdatesSource {
    cursor: Cursor,
}

impl UpdatesSource {
    pub(crate) fn new() -> Self {
        Self {
            cursor: Cursor::Start,
        }
    }
}

impl PageSource for UpdatesSource {
    fn next_page(&mut self, client: &VkAudioClient) -> Result<Option<Vec<AudioRef>>> {
        let response = match mem::replace(&mut self.cursor, Cursor::Done) {
            Cursor::Start => client.post_al(&client.section_form(&[("section", "updates")]))?,
            Cursor::Continue {
                section_id,
                start_from,
            } => client.load_catalog_section(&section_id, Some(&start_from))?,
            Cursor::Done => return Ok(None),
        };
        let block = client.catalog_block(&response)?;
        let playlists = block["playlists"].as_array().map(Vec::as_slice).unwrap_or_default();

        let newest: Vec<_> = playlists
            .iter()
            .filter_map(|p| p["list"].as_array().and_then(|l| l.first()).cloned())
            .collect();
        let ids = ids_from_list(&newest);
        if ids.is_empty() {
            return Ok(None);
        }
        if playlists.len() >= UPDATES_PAGE_SIZE {
            self.cursor = Cursor::Continue {
                section_id: value_to_string(&block["sectionId"]),
                start_from: value_to_string(&block["nextFrom"]),
            };
        }
        Ok(Some(ids))
    }
}

/// Iterator over an owner's playlists, one mobile page at a time.
pub struct Albums<'c> {
    client: &'c VkAudioClient,
    owner_id: i64,
    offset: usize,
    ready: VecDeque<Album>,
    done: bool,
}

impl<'c> Albums<'c> {
    pub(crate) fn new(client: &'c VkAudioClient, owner_id: i64) -> Self {
        Self {
            client,
            owner_id,
            offset: 0,
            ready: VecDeque::new(),
            done: false,
        }
    }

    fn fetch(&mut self) -> Result<()> {
        let url = self.client.mobile(&format!(
            "/audio?act=audio_playlists{}&offset={}",
            self.owner_id, self.offset
        ));
        let html = self.client.get_text(&url)?;
        if html.is_empty() {
            return Err(VkAudioError::access_denied("albums", self.owner_id));
        }
        let albums = albums_from_html(&html);
        if albums.is_empty() {
            self.done = true;
        } else {
            self.offset += ALBUMS_PER_USER_PAGE;
            self.ready.extend(albums);
        }
        Ok(())
    }
}

impl Iterator for Albums<'_> {
    type Item = Result<Album>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(album) = self.ready.pop_front() {
                return Some(Ok(album));
            }
            if self.done {
                return None;
            }
            if let Err(e) = self.fetch() {
                self.done = true;
                return Some(Err(e));
            }
        }
    }
}
