use mockito::{Matcher, Mock, Server, ServerGuard};
use serde_json::{Value, json};
use std::time::Duration;
use vk_audio::auth::Session;
use vk_audio::{ClientOptions, VkAudioClient, VkAudioError};

const USER_ID: i64 = 1000;

fn options(server: &ServerGuard) -> ClientOptions {
    ClientOptions {
        web_url: server.url(),
        mobile_url: server.url(),
        reload_delay: Duration::ZERO,
        section_delay: Duration::ZERO,
        ..ClientOptions::default()
    }
}

/// Client against `server`. The returned mock serves the cookie bootstrap
/// page and must outlive the test body.
fn client(server: &mut ServerGuard) -> (VkAudioClient, Mock) {
    let bootstrap = server
        .mock("GET", "/")
        .with_body("<html></html>")
        .expect_at_least(1)
        .create();
    let client =
        VkAudioClient::with_session(Session::new(USER_ID, "sid"), options(server)).unwrap();
    (client, bootstrap)
}

/// A list entry as found in ajax playlists: id, owner, ..., reload hash at 24.
fn list_item(id: i64, owner: i64) -> Value {
    let mut a = vec![Value::Null; 25];
    a[0] = json!(id);
    a[1] = json!(owner);
    a[24] = json!(format!("h{id}"));
    Value::Array(a)
}

fn list(ids: std::ops::Range<i64>) -> Vec<Value> {
    ids.map(|id| list_item(id, -1)).collect()
}

fn reload_audio(id: i64, owner: i64) -> Value {
    let mut a = vec![Value::Null; 15];
    a[0] = json!(id);
    a[1] = json!(owner);
    a[2] = json!(format!("https://cs.vkuseraudio.net/{id}.mp3"));
    a[3] = json!(format!("Title {id}"));
    a[4] = json!("Artist");
    a[5] = json!(200);
    a[14] = json!("");
    Value::Array(a)
}

fn refs(ids: std::ops::Range<i64>) -> String {
    ids.map(|id| format!("-1_{id}_h{id}"))
        .collect::<Vec<_>>()
        .join(",")
}

/// Mock one `reload_audios` call resolving exactly `ids`.
fn mock_reload(server: &mut ServerGuard, ids: std::ops::Range<i64>) -> Mock {
    let audios: Vec<Value> = ids.clone().map(|id| reload_audio(id, -1)).collect();
    server
        .mock("POST", "/al_audio.php")
        .match_query(Matcher::UrlEncoded("act".into(), "reload_audios".into()))
        .match_body(Matcher::UrlEncoded("audio_ids".into(), refs(ids)))
        .with_body(format!("<!--{}", json!({ "payload": [0, [audios]] })))
        .create()
}

fn al_body(block: &Value) -> String {
    format!("<!--{}", json!({ "payload": [0, ["<div></div>", block]] }))
}

fn ids_of(tracks: &[vk_audio::Track]) -> Vec<i64> {
    tracks.iter().map(|t| t.id).collect()
}

#[test]
fn library_pages_by_offset_and_batches_reloads() {
    let mut server = Server::new();
    let (client, _boot) = client(&mut server);

    let page1 = server
        .mock("POST", "/audio")
        .match_body(Matcher::AllOf(vec![
            Matcher::UrlEncoded("act".into(), "load_section".into()),
            Matcher::UrlEncoded("owner_id".into(), "-5".into()),
            Matcher::UrlEncoded("playlist_id".into(), "-1".into()),
            Matcher::UrlEncoded("offset".into(), "0".into()),
        ]))
        .with_body(json!({ "data": [{ "list": list(1..13), "hasMore": true }] }).to_string())
        .create();
    let page2 = server
        .mock("POST", "/audio")
        .match_body(Matcher::UrlEncoded("offset".into(), "2000".into()))
        .with_body(json!({ "data": [{ "list": list(13..14), "hasMore": false }] }).to_string())
        .create();
    let r1 = mock_reload(&mut server, 1..11);
    let r2 = mock_reload(&mut server, 11..13);
    let r3 = mock_reload(&mut server, 13..14);

    let tracks = client.tracks_all(Some(-5), None, None).unwrap();
    assert_eq!(ids_of(&tracks), (1..14).collect::<Vec<_>>());
    assert_eq!(tracks[0].url, "https://cs.vkuseraudio.net/1.mp3");
    assert_eq!(tracks[0].title, "Title 1");

    for m in [page1, page2, r1, r2, r3] {
        m.assert();
    }
}

#[test]
fn hidden_library_is_access_denied() {
    let mut server = Server::new();
    let (client, _boot) = client(&mut server);
    let _mock = server
        .mock("POST", "/audio")
        .with_body(json!({ "data": [false] }).to_string())
        .create();

    let mut tracks = client.tracks(Some(42), None, None);
    assert!(matches!(tracks.next(), Some(Err(VkAudioError::AccessDenied(_)))));
    assert!(tracks.next().is_none());
}

#[test]
fn catalog_search_skips_offset_across_chunks() {
    let mut server = Server::new();
    let (client, _boot) = client(&mut server);

    let first = server
        .mock("POST", "/al_audio.php")
        .match_body(Matcher::AllOf(vec![
            Matcher::UrlEncoded("act".into(), "section".into()),
            Matcher::UrlEncoded("section".into(), "search".into()),
            Matcher::UrlEncoded("q".into(), "query".into()),
            Matcher::UrlEncoded("owner_id".into(), USER_ID.to_string()),
        ]))
        .with_body(al_body(&json!({
            "playlists": [
                { "title": "Альбомы", "list": [] },
                { "title": "Все треки", "id": "sec", "list": list(1..4),
                  "hasMore": true, "nextOffset": "n1" },
            ]
        })))
        .create();
    let next = server
        .mock("POST", "/al_audio.php")
        .match_body(Matcher::AllOf(vec![
            Matcher::UrlEncoded("act".into(), "load_catalog_section".into()),
            Matcher::UrlEncoded("section_id".into(), "sec".into()),
            Matcher::UrlEncoded("start_from".into(), "n1".into()),
        ]))
        .with_body(al_body(&json!({
            "playlists": [
                { "title": "Все треки", "id": "sec", "list": list(4..7), "hasMore": false },
            ]
        })))
        .create();
    let reload = mock_reload(&mut server, 5..7);

    let tracks: Vec<_> = client
        .search_iter("query", 4)
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(ids_of(&tracks), vec![5, 6]);

    first.assert();
    next.assert();
    reload.assert();
}

#[test]
fn search_limits_count() {
    let mut server = Server::new();
    let (client, _boot) = client(&mut server);
    let _mock = server
        .mock("POST", "/al_audio.php")
        .match_body(Matcher::UrlEncoded("act".into(), "section".into()))
        .with_body(al_body(&json!({
            "playlists": [{ "title": "Все треки", "id": "s", "list": list(1..4), "hasMore": true, "nextOffset": "x" }]
        })))
        .create();
    let _reload = mock_reload(&mut server, 1..4);

    let tracks: Vec<_> = client.search("q", 2, 0).collect::<Result<_, _>>().unwrap();
    assert_eq!(ids_of(&tracks), vec![1, 2]);
}

#[test]
fn stale_session_is_retried_once() {
    let mut server = Server::new();
    let boot = server
        .mock("GET", "/")
        .with_body("<html></html>")
        .expect(3)
        .create();
    let client =
        VkAudioClient::with_session(Session::new(USER_ID, "sid"), options(&server)).unwrap();
    let section = server
        .mock("POST", "/al_audio.php")
        .match_body(Matcher::UrlEncoded("block".into(), "new_songs".into()))
        .with_body(al_body(&json!("error: please reload")))
        .expect(2)
        .create();

    let mut news = client.news_iter(0);
    assert!(matches!(news.next(), Some(Err(VkAudioError::RetryRequest(_)))));
    assert!(news.next().is_none());

    section.assert();
    // initial bootstrap plus one reload per stale answer
    boot.assert();
}

#[test]
fn missing_target_playlist_ends_walk() {
    let mut server = Server::new();
    let (client, _boot) = client(&mut server);
    let _mock = server
        .mock("POST", "/al_audio.php")
        .with_body(al_body(&json!({
            "playlists": [{ "title": "Something else", "list": list(1..3) }]
        })))
        .create();

    assert_eq!(client.news_iter(0).count(), 0);
}

#[test]
fn updates_follow_next_from_until_short_chunk() {
    let mut server = Server::new();
    let (client, _boot) = client(&mut server);

    let owners: Vec<Value> = (1..12)
        .map(|id| json!({ "list": [list_item(id, -1), list_item(id + 100, -1)] }))
        .collect();
    let first = server
        .mock("POST", "/al_audio.php")
        .match_body(Matcher::UrlEncoded("section".into(), "updates".into()))
        .with_body(al_body(&json!({
            "playlists": owners, "sectionId": "upd", "nextFrom": "p2"
        })))
        .create();
    let second = server
        .mock("POST", "/al_audio.php")
        .match_body(Matcher::AllOf(vec![
            Matcher::UrlEncoded("act".into(), "load_catalog_section".into()),
            Matcher::UrlEncoded("section_id".into(), "upd".into()),
            Matcher::UrlEncoded("start_from".into(), "p2".into()),
        ]))
        .with_body(al_body(&json!({
            "playlists": [{ "list": [list_item(50, -1)] }, { "list": [] }],
            "sectionId": "upd", "nextFrom": "p3"
        })))
        .create();
    let _reload = mock_reload(&mut server, 1..11);
    let _reload = mock_reload(&mut server, 11..12);
    let _reload = mock_reload(&mut server, 50..51);

    let tracks: Vec<_> = client.updates_iter().collect::<Result<_, _>>().unwrap();
    let mut expected: Vec<i64> = (1..12).collect();
    expected.push(50);
    assert_eq!(ids_of(&tracks), expected);

    first.assert();
    second.assert();
}

#[test]
fn popular_reads_embedded_chart() {
    let mut server = Server::new();
    let (client, _boot) = client(&mut server);
    let page = json!({ "sectionData": { "explore": { "playlist": { "list": list(1..4) } } } });
    let _mock = server
        .mock("POST", "/audio")
        .match_header("x-requested-with", Matcher::Missing)
        .match_body(Matcher::UrlEncoded("block".into(), "tracks_chart".into()))
        .with_body(format!("<script>cur.page = new AudioPage(ge('x'), {page});</script>"))
        .create();
    let _reload = mock_reload(&mut server, 2..4);

    let tracks: Vec<_> = client.popular_iter(1).collect::<Result<_, _>>().unwrap();
    assert_eq!(ids_of(&tracks), vec![2, 3]);
}

#[test]
fn popular_falls_back_to_chart_section() {
    let mut server = Server::new();
    let (client, _boot) = client(&mut server);
    let page = json!({ "sectionData": { "explore": { "playlist": null, "sectionId": "explore1" } } });
    let _mock = server
        .mock("POST", "/audio")
        .with_body(format!("new AudioPage(ge('x'), {page});"))
        .create();
    let section = server
        .mock("POST", "/al_audio.php")
        .match_body(Matcher::AllOf(vec![
            Matcher::UrlEncoded("act".into(), "load_catalog_section".into()),
            Matcher::UrlEncoded("section_id".into(), "explore1".into()),
        ]))
        .with_body(al_body(&json!({
            "playlists": [{ "title": "Чарт треков", "id": "chart", "list": list(7..9) }]
        })))
        .create();
    let _reload = mock_reload(&mut server, 7..9);

    let tracks: Vec<_> = client.popular_iter(0).collect::<Result<_, _>>().unwrap();
    assert_eq!(ids_of(&tracks), vec![7, 8]);
    section.assert();
}

const ALBUM_PAGE: &str = r#"
    <div class="audioPlaylistsPage__item">
      <a class="audioPlaylistsPage__itemLink" href="/audio?act=audio_playlist-7_1&amp;access_hash=aa"></a>
      <div class="audioPlaylistsPage__title">One</div>
      <div class="audioPlaylistsPage__author">Band</div>
      <div class="audioPlaylistsPage__stats">12 прослушиваний</div>
    </div>"#;

#[test]
fn albums_page_until_empty() {
    let mut server = Server::new();
    let (client, _boot) = client(&mut server);
    let _mock = server
        .mock("GET", "/audio")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("act".into(), "audio_playlists-7".into()),
            Matcher::UrlEncoded("offset".into(), "0".into()),
        ]))
        .with_body(ALBUM_PAGE)
        .create();
    let _mock = server
        .mock("GET", "/audio")
        .match_query(Matcher::UrlEncoded("offset".into(), "100".into()))
        .with_body("<html><body></body></html>")
        .create();

    let albums = client.albums_all(Some(-7)).unwrap();
    assert_eq!(albums.len(), 1);
    assert_eq!(albums[0].title, "One");
    assert_eq!(albums[0].plays, Some(12));
    assert_eq!(albums[0].access_hash.as_deref(), Some("aa"));
}

#[test]
fn albums_empty_body_is_access_denied() {
    let mut server = Server::new();
    let (client, _boot) = client(&mut server);
    let _mock = server
        .mock("GET", "/audio")
        .match_query(Matcher::Any)
        .with_body("")
        .create();

    assert!(matches!(
        client.albums_all(Some(3)),
        Err(VkAudioError::AccessDenied(_))
    ));
}

#[test]
fn search_user_reads_first_playlist() {
    let mut server = Server::new();
    let (client, _boot) = client(&mut server);
    let _mock = server
        .mock("POST", "/al_audio.php")
        .match_body(Matcher::AllOf(vec![
            Matcher::UrlEncoded("owner_id".into(), "-9".into()),
            Matcher::UrlEncoded("q".into(), "needle".into()),
        ]))
        .with_body(al_body(&json!({ "playlists": [{ "list": list(3..5) }] })))
        .create();
    let _reload = mock_reload(&mut server, 3..5);

    let tracks = client.search_user(Some(-9), "needle").unwrap();
    assert_eq!(ids_of(&tracks), vec![3, 4]);
}

#[test]
fn search_user_denied_on_empty_payload() {
    let mut server = Server::new();
    let (client, _boot) = client(&mut server);
    let _mock = server
        .mock("POST", "/al_audio.php")
        .with_body(r#"<!--{"payload":[0,[]]}"#)
        .create();

    assert!(matches!(
        client.search_user(Some(1), "x"),
        Err(VkAudioError::AccessDenied(_))
    ));
}

#[test]
fn search_albums_inline_block() {
    let mut server = Server::new();
    let (client, _boot) = client(&mut server);
    let body = json!({ "payload": [0, [
        "<div class=\"CatalogSearchGlobalAlbumsHeader\"></div>",
        { "playlists": [{
            "type": "playlist", "ownerId": -3, "id": 8, "accessHash": "h",
            "title": "Record", "authorName": "Band", "totalCount": 10,
            "infoLine2": "5 прослушиваний"
        }] }
    ]] });
    let _mock = server
        .mock("POST", "/al_audio.php")
        .with_body(format!("<!--{body}"))
        .create();

    let albums = client.search_albums("record").unwrap();
    assert_eq!(albums.len(), 1);
    assert_eq!(albums[0].owner_id, -3);
    assert_eq!(albums[0].count, Some(10));
    assert_eq!(albums[0].plays, Some(5));
}

#[test]
fn audio_by_id_reads_single_item() {
    let mut server = Server::new();
    let (client, _boot) = client(&mut server);
    let _mock = server
        .mock("GET", "/audio-1_77")
        .with_body(
            r#"<div class="basisDefault">
                 <div class="audio_item" data-audio='[77,-1,"","t","a",1,0,0,"",0,0,"","","a/b/act/d/e/url"]'></div>
               </div>"#,
        )
        .create();
    let _mock = server
        .mock("POST", "/al_audio.php")
        .match_query(Matcher::UrlEncoded("act".into(), "reload_audios".into()))
        .match_body(Matcher::UrlEncoded("audio_ids".into(), "-1_77_act_url".into()))
        .with_body(format!("<!--{}", json!({ "payload": [0, [[reload_audio(77, -1)]]] })))
        .create();

    let track = client.audio_by_id(-1, 77).unwrap().unwrap();
    assert_eq!(track.id, 77);
    assert_eq!(track.duration, 200);
}

#[test]
fn follow_requires_owner_hash() {
    let mut server = Server::new();
    let (client, _boot) = client(&mut server);
    let _mock = server.mock("GET", "/audios55").with_body("<html></html>").create();

    assert!(matches!(
        client.follow_user(55),
        Err(VkAudioError::AccessDenied(_))
    ));
}

#[test]
fn follow_posts_owner_hash() {
    let mut server = Server::new();
    let (client, _boot) = client(&mut server);
    let _mock = server
        .mock("GET", "/audios56")
        .with_body("AudioUtils.followOwner(56, &#39;beef&#39;)")
        .create();
    let follow = server
        .mock("POST", "/al_audio.php")
        .match_header("x-requested-with", "XMLHttpRequest")
        .match_body(Matcher::AllOf(vec![
            Matcher::UrlEncoded("act".into(), "follow_owner".into()),
            Matcher::UrlEncoded("hash".into(), "beef".into()),
        ]))
        .with_body(r#"<!--{"payload":[0,[true]]}"#)
        .create();

    let resp = client.follow_user(56).unwrap();
    assert_eq!(resp["payload"][1][0], true);
    follow.assert();
}

#[test]
fn edit_audio_returns_updated_row() {
    let mut server = Server::new();
    let (client, _boot) = client(&mut server);
    let _mock = server
        .mock("POST", "/al_audio.php")
        .match_body(Matcher::AllOf(vec![
            Matcher::UrlEncoded("act".into(), "edit_audio".into()),
            Matcher::UrlEncoded("performer".into(), "New Artist".into()),
            Matcher::UrlEncoded("genre".into(), "1001".into()),
        ]))
        .with_body(r#"<!--{"payload":[0,[[1,2,"u","New Title","New Artist"]]]}"#)
        .create();

    let row = client
        .edit_audio(1, 2, "edit", "New Artist", "New Title", "", vk_audio::audio::DEFAULT_GENRE)
        .unwrap();
    assert_eq!(row[3], "New Title");
}

#[test]
fn unfollow_posts_owner_hash() {
    let mut server = Server::new();
    let (client, _boot) = client(&mut server);
    let _mock = server
        .mock("GET", "/audios57")
        .with_body("AudioUtils.unfollowOwner(57, &#39;cafe&#39;)")
        .create();
    let unfollow = server
        .mock("POST", "/al_audio.php")
        .match_body(Matcher::AllOf(vec![
            Matcher::UrlEncoded("act".into(), "unfollow_owner".into()),
            Matcher::UrlEncoded("owner_id".into(), "57".into()),
            Matcher::UrlEncoded("hash".into(), "cafe".into()),
        ]))
        .with_body(r#"<!--{"payload":[0,[true]]}"#)
        .create();

    client.unfollow_user(57).unwrap();
    unfollow.assert();
}

#[test]
fn search_albums_loads_linked_block() {
    let mut server = Server::new();
    let (client, _boot) = client(&mut server);
    let header = r#"<div class="CatalogSearchGlobalAlbumsHeader"><a href="/audio?section=recoms_block&type=albums_q1">All</a></div>"#;
    let search = server
        .mock("POST", "/al_audio.php")
        .match_body(Matcher::AllOf(vec![
            Matcher::UrlEncoded("act".into(), "section".into()),
            Matcher::UrlEncoded("q".into(), "record".into()),
        ]))
        .with_body(format!(
            "<!--{}",
            json!({ "payload": [0, [header, { "playlists": [] }]] })
        ))
        .create();
    let block = server
        .mock("POST", "/al_audio.php")
        .match_body(Matcher::AllOf(vec![
            Matcher::UrlEncoded("act".into(), "load_catalog_section".into()),
            Matcher::UrlEncoded("section_id".into(), "albums_q1".into()),
        ]))
        .with_body(al_body(&json!({
            "playlists": [
                { "type": "artist", "id": 1 },
                { "type": "playlist", "ownerId": -1, "id": 2, "title": "Full",
                  "authorName": "Band", "totalCount": 3,
                  "infoLine2": "7 прослушиваний" },
            ]
        })))
        .create();

    let albums = client.search_albums("record").unwrap();
    assert_eq!(albums.len(), 1);
    assert_eq!((albums[0].id, albums[0].owner_id), (2, -1));
    assert_eq!(albums[0].plays, Some(7));
    assert_eq!(albums[0].count, Some(3));

    search.assert();
    block.assert();
}

#[test]
fn post_audio_reads_wall_attachments() {
    let mut server = Server::new();
    let (client, _boot) = client(&mut server);
    let _mock = server
        .mock("GET", "/wall-1_9")
        .with_body(
            r#"<div class="audios_list">
                 <div class="audio_item" data-audio='[77,-1,"","t","a",1,0,0,"",0,0,"","","a/b/h1/d/e/h2"]'></div>
                 <div class="audio_item audio_item_disabled" data-audio='[78,-1,"","t","a",1,0,0,"",0,0,"","","a/b/x/d/e/y"]'></div>
               </div>"#,
        )
        .create();
    let reload = server
        .mock("POST", "/al_audio.php")
        .match_query(Matcher::UrlEncoded("act".into(), "reload_audios".into()))
        .match_body(Matcher::UrlEncoded("audio_ids".into(), "-1_77_h1_h2".into()))
        .with_body(format!("<!--{}", json!({ "payload": [0, [[reload_audio(77, -1)]]] })))
        .create();

    let tracks: Vec<_> = client.post_audio(-1, 9).collect::<Result<_, _>>().unwrap();
    assert_eq!(ids_of(&tracks), vec![77]);
    reload.assert();
}

#[test]
fn upload_audio_posts_file_then_finishes() {
    let mut server = Server::new();
    let (client, _boot) = client(&mut server);
    let upload_url = format!("{}/upload.php?act=add_audio", server.url());

    let new_audio = server
        .mock("POST", "/al_audio.php")
        .match_body(Matcher::AllOf(vec![
            Matcher::UrlEncoded("act".into(), "new_audio".into()),
            Matcher::UrlEncoded("gid".into(), "0".into()),
        ]))
        .with_body(format!(
            "<!--{}",
            json!({ "payload": [0, [null, null, format!("cur.uploadUrl = '{upload_url}';")]] })
        ))
        .create();
    let upload = server
        .mock("POST", "/upload.php")
        .match_query(Matcher::UrlEncoded("act".into(), "add_audio".into()))
        .match_header("content-type", Matcher::Regex("^multipart/form-data".into()))
        .match_header("cookie", Matcher::Regex("remixsid=sid".into()))
        .match_body(Matcher::AllOf(vec![
            Matcher::Regex(r#"name="file"; filename="song\.mp3""#.into()),
            Matcher::Regex("ID3 fake audio".into()),
        ]))
        .with_body(r#"{"ok":1}"#)
        .create();
    let done = server
        .mock("POST", "/al_audio.php")
        .match_body(Matcher::AllOf(vec![
            Matcher::UrlEncoded("act".into(), "done_add".into()),
            Matcher::UrlEncoded("upldr".into(), "1".into()),
            Matcher::UrlEncoded("go_uploader_response".into(), r#"{"ok":1}"#.into()),
        ]))
        .with_body(r#"<!--{"payload":[0,[{"id":5}]]}"#)
        .create();

    let dir = std::env::temp_dir().join(format!("vk-audio-upload-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("song.mp3");
    std::fs::write(&path, "ID3 fake audio").unwrap();

    let result = client.upload_audio(&path, 0);
    std::fs::remove_dir_all(&dir).unwrap();
    assert_eq!(result.unwrap()["id"], 5);

    new_audio.assert();
    upload.assert();
    done.assert();
}
