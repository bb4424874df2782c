//! HTTP client for VK's audio web endpoints.
//!
//! Three kinds of endpoints are scraped:
//!
//! * `POST https://vk.com/al_audio.php` — ajax calls. The body is form
//!   encoded with `al=1` and an `act`; the response is JSON prefixed with
//!   `<!--` whose interesting part is `payload[1]`.
//! * `POST https://m.vk.com/audio` — the mobile `load_section` call, plain
//!   JSON with `data[0]`.
//! * `GET https://m.vk.com/...` — mobile HTML pages.
//!
//! Redirects are not followed: VK answers a request it will not serve with a
//! redirect to the login page, which then reads as an empty body.

use crate::auth::Session;
use crate::error::{Result, VkAudioError};
use crate::ratelimit::RateLimiter;
use crate::scrape::{find_target_playlist, parse_al_response, playlist_titles};
use crate::types::{AudioRef, CatalogPlaylist, Track};
use reqwest::Url;
use reqwest::blocking::{Client, multipart};
use reqwest::cookie::Jar;
use reqwest::redirect::Policy;
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

const WEB_URL: &str = "https://vk.com";
const MOBILE_URL: &str = "https://m.vk.com";
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
    AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

/// Pause between `reload_audios` batches.
pub const RELOAD_DELAY: Duration = Duration::from_millis(1500);
/// Pause between catalog continuation requests.
pub const SECTION_DELAY: Duration = Duration::from_secs(2);
/// Maximum number of audios `reload_audios` resolves per call.
pub const RELOAD_BATCH: usize = 10;

pub(crate) type Form = Vec<(&'static str, String)>;

/// Tunables for [`VkAudioClient`].
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Desktop site, hosts `al_audio.php`.
    pub web_url: String,
    /// Mobile site, hosts the HTML pages and `load_section`.
    pub mobile_url: String,
    /// Rewrite HLS (`index.m3u8`) links to direct MP3 links.
    pub convert_m3u8_links: bool,
    pub reload_delay: Duration,
    pub section_delay: Duration,
    pub timeout: Duration,
    pub user_agent: String,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            web_url: WEB_URL.to_owned(),
            mobile_url: MOBILE_URL.to_owned(),
            convert_m3u8_links: true,
            reload_delay: RELOAD_DELAY,
            section_delay: SECTION_DELAY,
            timeout: Duration::from_secs(30),
            user_agent: USER_AGENT.to_owned(),
        }
    }
}

/// Blocking client for VK audio pages.
///
/// Holds a [`reqwest::blocking::Client`] with a cookie jar seeded from the
/// [`Session`]. Operations are implemented in `audio` as `impl VkAudioClient`
/// blocks; the methods here are the transport they share.
pub struct VkAudioClient {
    http: Client,
    jar: Arc<Jar>,
    session: Session,
    user_id: i64,
    options: ClientOptions,
    reload_limiter: RateLimiter,
    section_limiter: RateLimiter,
}

impl VkAudioClient {
    /// Create a client from the session saved at
    /// `~/.config/vk-audio/session.json`.
    pub fn new() -> Result<Self> {
        Self::with_session(Session::load()?, ClientOptions::default())
    }

    /// Create a client with an explicit [`Session`] and options.
    ///
    /// Installs the session cookies and loads the mobile start page once so
    /// VK can set its own.
    pub fn with_session(session: Session, options: ClientOptions) -> Result<Self> {
        let user_id = session.user_id.ok_or(VkAudioError::NotLoggedIn)?;
        let jar = Arc::new(Jar::default());
        let http = Client::builder()
            .user_agent(options.user_agent.as_str())
            .timeout(options.timeout)
            .cookie_provider(Arc::clone(&jar))
            .redirect(Policy::none())
            .build()?;
        let client = Self {
            http,
            jar,
            reload_limiter: RateLimiter::new(options.reload_delay),
            section_limiter: RateLimiter::new(options.section_delay),
            session,
            user_id,
            options,
        };
        client.bootstrap()?;
        Ok(client)
    }

    /// Return a reference to the current session.
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// ID of the logged-in user. Owner arguments default to it.
    pub fn user_id(&self) -> i64 {
        self.user_id
    }

    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    /// (Re)install the session cookies and fetch the mobile start page.
    pub fn bootstrap(&self) -> Result<()> {
        install_cookies(&self.jar, &self.session, &self.options)?;
        let url = format!("{}/", self.options.mobile_url);
        tracing::debug!(%url, "loading cookies");
        self.http.get(&url).send()?;
        Ok(())
    }

    pub(crate) fn web(&self, path: &str) -> String {
        format!("{}{path}", self.options.web_url)
    }

    pub(crate) fn mobile(&self, path: &str) -> String {
        format!("{}{path}", self.options.mobile_url)
    }

    /// GET a page and return its body.
    pub(crate) fn get_text(&self, url: &str) -> Result<String> {
        tracing::debug!(%url, "GET");
        Ok(self.http.get(url).send()?.text()?)
    }

    /// POST a URL-encoded form and return the body.
    pub(crate) fn post_form(&self, url: &str, form: &[(&str, String)]) -> Result<String> {
        self.send_form(url, form, false)
    }

    /// POST to `al_audio.php` and parse the ajax envelope.
    pub(crate) fn post_al(&self, form: &[(&str, String)]) -> Result<Value> {
        self.post_ajax(&self.web("/al_audio.php"), form)
    }

    fn post_ajax(&self, url: &str, form: &[(&str, String)]) -> Result<Value> {
        let text = self.send_form(url, form, true)?;
        parse_al_response(&text)
    }

    fn send_form(&self, url: &str, form: &[(&str, String)], ajax: bool) -> Result<String> {
        tracing::debug!(%url, act = form_value(form, "act"), ajax, "POST");
        let mut request = self
            .http
            .post(url)
            .header("Content-Type", "application/x-www-form-urlencoded");
        if ajax {
            request = request.header("X-Requested-With", "XMLHttpRequest");
        }
        Ok(request.body(encode_form(form)).send()?.text()?)
    }

    /// Form for `act=section` on the current user's audio page.
    pub(crate) fn section_form(&self, extra: &[(&'static str, &str)]) -> Form {
        let mut form: Form = vec![
            ("al", "1".into()),
            ("act", "section".into()),
            ("claim", "0".into()),
            ("is_layer", "0".into()),
            ("owner_id", self.user_id.to_string()),
        ];
        form.extend(extra.iter().map(|(k, v)| (*k, (*v).to_owned())));
        form
    }

    /// Fetch the next chunk of a catalog section.
    pub(crate) fn load_catalog_section(
        &self,
        section_id: &str,
        start_from: Option<&str>,
    ) -> Result<Value> {
        let mut form: Form = vec![
            ("al", "1".into()),
            ("act", "load_catalog_section".into()),
            ("section_id", section_id.to_owned()),
        ];
        if let Some(start_from) = start_from {
            form.push(("start_from", start_from.to_owned()));
        }
        self.section_limiter.run(|| self.post_al(&form))
    }

    /// Resolve references into tracks with `act=reload_audios`.
    ///
    /// At most [`RELOAD_BATCH`] references are accepted by VK per call;
    /// consecutive calls are spaced by the reload delay.
    pub(crate) fn reload_audios(&self, ids: &[AudioRef]) -> Result<Vec<Track>> {
        let joined = ids
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(",");
        let form: Form = vec![("al", "1".into()), ("audio_ids", joined)];
        let url = self.web("/al_audio.php?act=reload_audios");
        let response = self
            .reload_limiter
            .run(|| self.post_ajax(&url, &form))?;
        crate::scrape::tracks_from_reload(&response, self.user_id, self.options.convert_m3u8_links)
    }

    /// `payload[1][1]` of a catalog response.
    ///
    /// VK replaces it with an error string when the session went stale. In
    /// that case the cookies are reloaded and [`VkAudioError::RetryRequest`]
    /// is returned.
    pub(crate) fn catalog_block<'v>(&self, response: &'v Value) -> Result<&'v Value> {
        let block = &response["payload"][1][1];
        if let Some(message) = block.as_str() {
            tracing::warn!(message, "catalog returned an error, reloading cookies");
            self.bootstrap()?;
            return Err(VkAudioError::RetryRequest(message.to_owned()));
        }
        if !block["playlists"].is_array() {
            tracing::error!(%response, "cannot unpack catalog response");
            return Err(VkAudioError::Parse("catalog response has no playlists".into()));
        }
        Ok(block)
    }

    /// Find the playlist titled with one of `targets` in a catalog response.
    pub(crate) fn target_playlist(
        &self,
        response: &Value,
        targets: &[&str],
    ) -> Result<Option<CatalogPlaylist>> {
        let playlists = self.catalog_block(response)?["playlists"]
            .as_array()
            .map(Vec::as_slice)
            .unwrap_or_default();
        let found = find_target_playlist(playlists, targets);
        if found.is_none() {
            tracing::warn!(
                ?targets,
                existing = ?playlist_titles(playlists),
                "cannot find target playlist"
            );
        }
        Ok(found)
    }

    /// Send the first request of a catalog walk and pick the target playlist,
    /// retrying once if the session had to be refreshed.
    pub(crate) fn first_catalog_playlist(
        &self,
        form: &[(&str, String)],
        targets: &[&str],
    ) -> Result<Option<CatalogPlaylist>> {
        let attempt = || -> Result<Option<CatalogPlaylist>> {
            let response = self.post_al(form)?;
            self.target_playlist(&response, targets)
        };
        match attempt() {
            Err(VkAudioError::RetryRequest(_)) => attempt(),
            other => other,
        }
    }

    /// Multipart-POST a file to an upload server and return its JSON answer.
    pub(crate) fn upload_file(&self, url: &str, path: &Path) -> Result<Value> {
        tracing::debug!(%url, path = %path.display(), "uploading");
        let form = multipart::Form::new().file("file", path)?;
        let resp = self.http.post(url).multipart(form).send()?;
        Ok(serde_json::from_str(&resp.text()?)?)
    }
}

fn parse_url(base: &str) -> Result<Url> {
    Url::parse(base).map_err(|e| VkAudioError::Other(format!("invalid base url {base}: {e}")))
}

/// Put the session cookies into `jar`.
///
/// They are scoped to the whole domain of `web_url` (`.vk.com`), so the
/// mobile site and upload servers receive them too. The mobile site only
/// gets its own copy when it lives outside that domain. IP hosts cannot
/// carry a `Domain` attribute and get host-only cookies.
fn install_cookies(jar: &Jar, session: &Session, options: &ClientOptions) -> Result<()> {
    let web = parse_url(&options.web_url)?;
    let mobile = parse_url(&options.mobile_url)?;
    let mut targets = vec![&web];
    if !same_site(&web, &mobile) {
        targets.push(&mobile);
    }
    for url in targets {
        for (name, value) in session.cookie_pairs() {
            let cookie = match url.domain() {
                Some(domain) => format!("{name}={value}; Domain=.{domain}; Path=/"),
                None => format!("{name}={value}; Path=/"),
            };
            jar.add_cookie_str(&cookie, url);
        }
    }
    Ok(())
}

/// Whether cookies scoped to `web` already reach `other`.
fn same_site(web: &Url, other: &Url) -> bool {
    match (web.host_str(), other.host_str()) {
        (Some(web), Some(other)) => {
            other == web
                || (web.parse::<std::net::IpAddr>().is_err()
                    && other.ends_with(&format!(".{web}")))
        }
        _ => false,
    }
}

fn form_value<'f>(form: &'f [(&str, String)], key: &str) -> &'f str {
    form.iter()
        .find(|(k, _)| *k == key)
        .map_or("", |(_, v)| v.as_str())
}

/// `application/x-www-form-urlencoded` body for `form`.
pub(crate) fn encode_form(form: &[(&str, String)]) -> String {
    form.iter()
        .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&")
}
