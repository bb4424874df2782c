//! Audio operations.
//!
//! # Listing
//!
//! | Method                                   | Endpoint                                          |
//! |------------------------------------------|---------------------------------------------------|
//! | [`tracks`](VkAudioClient::tracks)        | `POST m.vk.com/audio` `act=load_section`          |
//! | [`albums`](VkAudioClient::albums)        | `GET m.vk.com/audio?act=audio_playlists{owner}`   |
//! | [`search_user`](VkAudioClient::search_user) | `al_audio.php` `act=section&section=search`    |
//! | [`search_iter`](VkAudioClient::search_iter) | same, then `act=load_catalog_section`          |
//! | [`news_iter`](VkAudioClient::news_iter)  | `section=explore&block=new_songs`                 |
//! | [`updates_iter`](VkAudioClient::updates_iter) | `section=updates`                            |
//! | [`popular_iter`](VkAudioClient::popular_iter) | `POST vk.com/audio` `block=tracks_chart`     |
//! | [`search_albums`](VkAudioClient::search_albums) | search section, album block               |
//! | [`audio_by_id`](VkAudioClient::audio_by_id) | `GET m.vk.com/audio{owner}_{id}`               |
//! | [`post_audio`](VkAudioClient::post_audio) | `GET m.vk.com/wall{owner}_{post}`                |
//!
//! # Actions
//!
//! `follow_owner`, `unfollow_owner`, `edit_audio`, and the
//! `new_audio` → upload → `done_add` sequence of [`upload_audio`](VkAudioClient::upload_audio).

use crate::client::{Form, VkAudioClient};
use crate::error::{Result, VkAudioError};
use crate::pager::{Albums, CatalogSource, OncePage, SectionSource, Tracks, UpdatesSource};
use crate::scrape::{
    POST_AUDIO_ROOT, SINGLE_AUDIO_ROOT, album_search_block_id, albums_from_catalog,
    audio_page_json, base36_timestamp, ids_from_html, ids_from_list,
    upload_url, user_audio_hash,
};
use crate::types::{Album, Track, truthy, value_to_string};
use serde_json::Value;
use std::path::Path;

/// Title of the full result list in search sections.
const SEARCH_TARGETS: &[&str] = &["Все треки"];
/// Title of the new releases list in the explore section.
const NEWS_TARGETS: &[&str] = &["Новинки"];
/// Title of the chart list in the explore section.
const CHART_TARGETS: &[&str] = &["Чарт треков"];

/// Genre id VK uses for "Other".
pub const DEFAULT_GENRE: u32 = 1001;

impl VkAudioClient {
    /// Stream an owner's tracks, or one playlist's when `album_id` is set.
    ///
    /// `owner_id` defaults to the logged-in user; communities have negative
    /// ids. `access_hash` is needed for playlists shared by link.
    ///
    /// The first item is [`VkAudioError::AccessDenied`] if the owner's audio
    /// is hidden.
    pub fn tracks(
        &self,
        owner_id: Option<i64>,
        album_id: Option<i64>,
        access_hash: Option<&str>,
    ) -> Tracks<'_> {
        let owner_id = owner_id.unwrap_or(self.user_id());
        Tracks::new(
            self,
            SectionSource::new(owner_id, album_id, access_hash.map(String::from)),
        )
    }

    /// Collect [`tracks`](Self::tracks) into a `Vec`.
    pub fn tracks_all(
        &self,
        owner_id: Option<i64>,
        album_id: Option<i64>,
        access_hash: Option<&str>,
    ) -> Result<Vec<Track>> {
        self.tracks(owner_id, album_id, access_hash).collect()
    }

    /// Stream an owner's playlists.
    pub fn albums(&self, owner_id: Option<i64>) -> Albums<'_> {
        Albums::new(self, owner_id.unwrap_or(self.user_id()))
    }

    /// Collect [`albums`](Self::albums) into a `Vec`.
    pub fn albums_all(&self, owner_id: Option<i64>) -> Result<Vec<Album>> {
        self.albums(owner_id).collect()
    }

    /// Search within one owner's audio. Only the first result chunk is read.
    pub fn search_user(&self, owner_id: Option<i64>, query: &str) -> Result<Vec<Track>> {
        let owner_id = owner_id.unwrap_or(self.user_id());
        let form: Form = vec![
            ("al", "1".into()),
            ("act", "section".into()),
            ("claim", "0".into()),
            ("is_layer", "0".into()),
            ("owner_id", owner_id.to_string()),
            ("section", "search".into()),
            ("q", query.to_owned()),
        ];
        let response = self.post_al(&form)?;
        let block = &response["payload"][1];
        if !truthy(block) {
            return Err(VkAudioError::access_denied("audio", owner_id));
        }
        let first = &block[1]["playlists"][0];
        if first.is_null() {
            return Ok(Vec::new());
        }
        let ids = ids_from_list(first["list"].as_array().map(Vec::as_slice).unwrap_or_default());
        Tracks::new(self, OncePage::new(move |_: &VkAudioClient| Ok(ids))).collect()
    }

    /// Global search, at most `count` tracks after skipping `offset`.
    pub fn search(&self, query: &str, count: usize, offset: usize) -> std::iter::Take<Tracks<'_>> {
        self.search_iter(query, offset).take(count)
    }

    /// Global search, following the result list through all its chunks.
    pub fn search_iter(&self, query: &str, offset: usize) -> Tracks<'_> {
        let form = self.section_form(&[("section", "search"), ("q", query)]);
        Tracks::new(self, CatalogSource::new(form, SEARCH_TARGETS, offset))
    }

    /// New releases from the explore section.
    pub fn news_iter(&self, offset: usize) -> Tracks<'_> {
        let form = self.section_form(&[("block", "new_songs"), ("section", "explore")]);
        Tracks::new(self, CatalogSource::new(form, NEWS_TARGETS, offset))
    }

    /// Latest additions of the owners the user follows.
    pub fn updates_iter(&self) -> Tracks<'_> {
        Tracks::new(self, UpdatesSource::new())
    }

    /// The chart, skipping the first `offset` entries.
    ///
    /// The chart is embedded in the explore page. When the page ships it
    /// empty, the chart's catalog section is loaded instead.
    pub fn popular_iter(&self, offset: usize) -> Tracks<'_> {
        Tracks::new(
            self,
            OncePage::new(move |client: &VkAudioClient| {
                let mut ids = ids_from_list(&client.chart_list()?);
                ids.drain(..offset.min(ids.len()));
                Ok(ids)
            }),
        )
    }

    fn chart_list(&self) -> Result<Vec<Value>> {
        let form: Form = vec![
            ("block", "tracks_chart".into()),
            ("section", "explore".into()),
        ];
        let html = self.post_form(&self.web("/audio"), &form)?;
        let page = audio_page_json(&html)?;
        let explore = &page["sectionData"]["explore"];
        if let Some(list) = explore["playlist"]["list"].as_array().filter(|l| !l.is_empty()) {
            return Ok(list.clone());
        }

        let response = self.load_catalog_section(&value_to_string(&explore["sectionId"]), None)?;
        Ok(self
            .target_playlist(&response, CHART_TARGETS)?
            .map(|p| p.list)
            .unwrap_or_default())
    }

    /// Search playlists.
    ///
    /// The search page shows a few albums inline; when it links to the full
    /// album block, that block is loaded instead.
    pub fn search_albums(&self, query: &str) -> Result<Vec<Album>> {
        let response = self.post_al(&self.section_form(&[("section", "search"), ("q", query)]))?;
        let html = response["payload"][1][0].as_str().unwrap_or_default();

        let playlists = match album_search_block_id(html)? {
            Some(block_id) => {
                let block = self.load_catalog_section(&block_id, None)?;
                block["payload"][1][1]["playlists"].clone()
            }
            None => response["payload"][1][1]["playlists"].clone(),
        };
        Ok(albums_from_catalog(
            playlists.as_array().map(Vec::as_slice).unwrap_or_default(),
        ))
    }

    /// A single track, or `None` if the page lists none.
    pub fn audio_by_id(&self, owner_id: i64, audio_id: i64) -> Result<Option<Track>> {
        let html = self.get_text(&self.mobile(&format!("/audio{owner_id}_{audio_id}")))?;
        let ids = ids_from_html(&html, SINGLE_AUDIO_ROOT)?;
        Tracks::new(self, OncePage::new(move |_: &VkAudioClient| Ok(ids)))
            .next()
            .transpose()
    }

    /// Tracks attached to a wall post.
    pub fn post_audio(&self, owner_id: i64, post_id: i64) -> Tracks<'_> {
        Tracks::new(
            self,
            OncePage::new(move |client: &VkAudioClient| {
                let html =
                    client.get_text(&client.mobile(&format!("/wall{owner_id}_{post_id}")))?;
                ids_from_html(&html, POST_AUDIO_ROOT)
            }),
        )
    }

    /// Subscribe to an owner's audio updates.
    pub fn follow_user(&self, user_id: i64) -> Result<Value> {
        self.toggle_follow(user_id, "follow_owner")
    }

    /// Cancel a subscription made with [`follow_user`](Self::follow_user).
    pub fn unfollow_user(&self, user_id: i64) -> Result<Value> {
        self.toggle_follow(user_id, "unfollow_owner")
    }

    fn toggle_follow(&self, user_id: i64, act: &str) -> Result<Value> {
        let html = self.get_text(&self.web(&format!("/audios{user_id}")))?;
        let hash =
            user_audio_hash(&html).ok_or_else(|| VkAudioError::access_denied("audio", user_id))?;
        let form: Form = vec![
            ("al", "1".into()),
            ("act", act.to_owned()),
            ("owner_id", user_id.to_string()),
            ("hash", hash),
        ];
        self.post_al(&form)
    }

    /// Change a track's metadata. `hash` is the edit hash VK embeds in the
    /// audio row. Returns VK's updated audio array.
    #[allow(clippy::too_many_arguments)]
    pub fn edit_audio(
        &self,
        audio_id: i64,
        owner_id: i64,
        hash: &str,
        performer: &str,
        title: &str,
        text: &str,
        genre: u32,
    ) -> Result<Value> {
        let form: Form = vec![
            ("al", "1".into()),
            ("act", "edit_audio".into()),
            ("aid", audio_id.to_string()),
            ("oid", owner_id.to_string()),
            ("force_edit_hash", String::new()),
            ("hash", hash.to_owned()),
            ("performer", performer.to_owned()),
            ("text", text.to_owned()),
            ("title", title.to_owned()),
            ("genre", genre.to_string()),
        ];
        let response = self.post_al(&form)?;
        Ok(response["payload"][1][0].clone())
    }

    /// Upload an audio file to the user's library (`group_id = 0`) or to a
    /// community's. Returns VK's description of the new audio.
    pub fn upload_audio(&self, path: &Path, group_id: i64) -> Result<Value> {
        let form: Form = vec![
            ("al", "1".into()),
            ("act", "new_audio".into()),
            ("boxhash", base36_timestamp()),
            ("gid", group_id.to_string()),
        ];
        let response = self.post_al(&form)?;
        let snippet = response["payload"][1][2].as_str().unwrap_or_default();
        let url = upload_url(snippet)
            .ok_or_else(|| VkAudioError::Parse("no upload url in new_audio response".into()))?;

        let uploaded = self.upload_file(url, path)?;

        let form: Form = vec![
            ("al", "1".into()),
            ("act", "done_add".into()),
            ("go_uploader_response", uploaded.to_string()),
            ("upldr", "1".into()),
        ];
        let response = self.post_al(&form)?;
        Ok(response["payload"][1][0].clone())
    }
}
