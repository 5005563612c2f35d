//! Site client tests against local HTTP servers
//!
//! Tests mirror failover, metadata extraction, search, max-page estimation,
//! probing and a full download over HTTP.

use jmfetch::mirror::{self, MirrorStatus};
use jmfetch::net::HttpClient;
use jmfetch::prelude::*;
use jmfetch::Error;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use wiremock::matchers::{header, method, path, path_regex, query_param};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

mod common;
use common::{png_bytes, test_config};

fn host(server: &MockServer) -> String {
    server.address().to_string()
}

fn album_html(title: &str, chapters: &[&str]) -> String {
    let episodes: String = chapters
        .iter()
        .enumerate()
        .map(|(i, id)| {
            format!(
                r#"<a data-album="{id}" href="/photo/{id}"><li>第{}话</li></a>"#,
                i + 1
            )
        })
        .collect();

    format!(
        r#"<html><head><title>{title} - Site</title></head><body>
        <h1 id="book-name">{title}</h1>
        <span itemprop="author" data-type="author"><a href="/s">Author</a></span>
        <span itemprop="genre" data-type="tags"><a>tag-one</a><a>tag-two</a></span>
        <script>var scramble_id = 220980;</script>
        <ul>{episodes}</ul>
        </body></html>"#
    )
}

fn chapter_html(image_host: &str, files: &[&str]) -> String {
    let names: Vec<String> = files.iter().map(|f| format!("\"{}\"", f)).collect();
    format!(
        r#"<html><body>
        <img src="http://{image_host}/media/albums/blank.jpg">
        <script>var scramble_id = 220980;
        var page_arr = [{}];</script>
        </body></html>"#,
        names.join(",")
    )
}

fn search_html(hits: &[(&str, &str)]) -> String {
    hits.iter()
        .map(|(id, title)| {
            format!(r#"<div><a href="/album/{id}"><img><span class="title">{title}</span></a></div>"#)
        })
        .collect()
}

async fn serve(server: &MockServer, route: &str, body: String) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(server)
        .await;
}

async fn failing_mirror(status: u16, route: &str) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(status))
        .expect(1)
        .mount(&server)
        .await;
    server
}

#[cfg(test)]
mod failover_tests {
    use super::*;

    #[tokio::test]
    async fn test_all_mirrors_failing() {
        let dir = TempDir::new().unwrap();
        let servers = vec![
            failing_mirror(500, "/album/123").await,
            failing_mirror(502, "/album/123").await,
            failing_mirror(503, "/album/123").await,
        ];
        let config = test_config(dir.path(), servers.iter().map(host).collect());
        let source = JmSource::new(&config).unwrap();

        match source.fetch_work("123").await {
            Err(Error::AllMirrorsFailed { attempts, last }) => {
                assert_eq!(attempts, 3);
                assert!(last.to_string().contains("503"));
            }
            other => panic!("unexpected result: {other:?}"),
        }
        // Each server verifies its single expected request on drop.
    }

    #[tokio::test]
    async fn test_throttled_mirrors_get_one_attempt_each() {
        let dir = TempDir::new().unwrap();
        let servers = vec![
            failing_mirror(429, "/album/1").await,
            failing_mirror(429, "/album/1").await,
        ];
        let mut config = test_config(dir.path(), servers.iter().map(host).collect());
        config.max_retries = Config::default().max_retries;
        assert!(config.max_retries > 0);

        let source = JmSource::new(&config).unwrap();
        let result = source.fetch_work("1").await;

        assert!(matches!(result, Err(Error::AllMirrorsFailed { attempts: 2, .. })));
        // Each server verifies its single expected request on drop.
    }

    #[tokio::test]
    async fn test_all_mirrors_not_found() {
        let dir = TempDir::new().unwrap();
        let servers = vec![
            failing_mirror(404, "/album/9").await,
            failing_mirror(404, "/album/9").await,
        ];
        let config = test_config(dir.path(), servers.iter().map(host).collect());
        let source = JmSource::new(&config).unwrap();

        assert!(matches!(source.fetch_work("9").await, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn test_failover_keeps_chapters_on_winning_mirror() {
        let dir = TempDir::new().unwrap();
        let broken = failing_mirror(500, "/album/5000").await;
        Mock::given(path_regex("^/photo/"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&broken)
            .await;

        let good = MockServer::start().await;
        serve(&good, "/album/5000", album_html("Mirror Work", &["300002", "300001"])).await;
        serve(&good, "/photo/300001", chapter_html("img.one", &["00002.webp", "00001.webp"])).await;
        serve(&good, "/photo/300002", chapter_html("img.two", &["00001.webp"])).await;

        let config = test_config(dir.path(), vec![host(&broken), host(&good)]);
        let source = JmSource::new(&config).unwrap();
        let work = source.fetch_work("5000").await.unwrap();

        assert_eq!(work.title, "Mirror Work");
        assert_eq!(work.author, "Author");
        assert_eq!(work.tags, vec!["tag-one", "tag-two"]);
        assert_eq!(work.total_pages, 3);

        let ids: Vec<&str> = work.chapters.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["300001", "300002"]);
        assert_eq!(work.chapters[0].title, "Chapter 1");
        assert_eq!(work.chapters[1].title, "Chapter 2");
        assert_eq!(work.chapters[0].filenames, vec!["00001.webp", "00002.webp"]);
        assert_eq!(
            work.chapters[0].image_urls[0],
            "http://img.one/media/photos/300001/00001.webp"
        );
        assert_eq!(work.chapters[1].image_host, "img.two");
    }
}

#[cfg(test)]
mod metadata_tests {
    use super::*;

    #[tokio::test]
    async fn test_single_chapter_fallback() {
        let dir = TempDir::new().unwrap();
        let server = MockServer::start().await;
        serve(
            &server,
            "/album/777",
            "<html><head><title>Lonely | Site</title></head><body></body></html>".to_string(),
        )
        .await;
        Mock::given(method("GET"))
            .and(path("/photo/777"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string(chapter_html("img.host", &["00001.jpg"])),
            )
            .expect(1)
            .mount(&server)
            .await;

        let config = test_config(dir.path(), vec![host(&server)]);
        let work = JmSource::new(&config).unwrap().fetch_work("777").await.unwrap();

        assert_eq!(work.title, "Lonely");
        assert_eq!(work.chapters.len(), 1);
        assert_eq!(work.chapters[0].id, "777");
        assert_eq!(work.chapters[0].scramble_id, "220980");
    }

    #[tokio::test]
    async fn test_failed_chapter_is_skipped() {
        let dir = TempDir::new().unwrap();
        let server = MockServer::start().await;
        serve(&server, "/album/10", album_html("Half", &["400001", "400002"])).await;
        serve(&server, "/photo/400001", chapter_html("img.host", &["00001.jpg"])).await;
        Mock::given(path("/photo/400002"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let config = test_config(dir.path(), vec![host(&server)]);
        let work = JmSource::new(&config).unwrap().fetch_work("10").await.unwrap();

        assert_eq!(work.chapters.len(), 1);
        assert_eq!(work.chapters[0].id, "400001");
        assert_eq!(work.total_pages, 1);
    }

    async fn chapterless_mirror(album: &str, chapter: &str) -> MockServer {
        let server = MockServer::start().await;
        serve(&server, &format!("/album/{}", album), album_html("Empty", &[chapter])).await;
        Mock::given(path(format!("/photo/{}", chapter)))
            .respond_with(ResponseTemplate::new(500))
            .expect(1)
            .mount(&server)
            .await;
        server
    }

    #[tokio::test]
    async fn test_mirror_without_chapters_falls_through() {
        let dir = TempDir::new().unwrap();
        let broken = chapterless_mirror("11", "500001").await;

        let good = MockServer::start().await;
        serve(&good, "/album/11", album_html("Recovered", &["500001"])).await;
        serve(&good, "/photo/500001", chapter_html("img.host", &["00001.jpg"])).await;

        let config = test_config(dir.path(), vec![host(&broken), host(&good)]);
        let work = JmSource::new(&config).unwrap().fetch_work("11").await.unwrap();

        assert_eq!(work.title, "Recovered");
        assert_eq!(work.chapters.len(), 1);
        assert_eq!(work.chapters[0].site_host, host(&good));
    }

    #[tokio::test]
    async fn test_no_chapter_loads_on_any_mirror() {
        let dir = TempDir::new().unwrap();
        let first = chapterless_mirror("11", "500001").await;
        let second = chapterless_mirror("11", "500001").await;

        let config = test_config(dir.path(), vec![host(&first), host(&second)]);
        let result = JmSource::new(&config).unwrap().fetch_work("11").await;

        assert!(matches!(result, Err(Error::NoChaptersFound(id)) if id == "11"));
    }

    #[tokio::test]
    async fn test_invalid_utf8_in_page_is_tolerated() {
        let dir = TempDir::new().unwrap();
        let server = MockServer::start().await;

        let mut body = b"<html><body><h1 id=\"book-name\">Broken \xff Bytes</h1>".to_vec();
        body.extend_from_slice(b"</body></html>");
        Mock::given(path("/album/12"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(body))
            .mount(&server)
            .await;
        serve(&server, "/photo/12", chapter_html("img.host", &["00001.jpg"])).await;

        let config = test_config(dir.path(), vec![host(&server)]);
        let work = JmSource::new(&config).unwrap().fetch_work("12").await.unwrap();

        assert!(work.title.starts_with("Broken"));
        assert!(work.title.ends_with("Bytes"));
    }
}

#[cfg(test)]
mod search_tests {
    use super::*;

    #[tokio::test]
    async fn test_search_works_parses_results() {
        let dir = TempDir::new().unwrap();
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search/photos"))
            .and(query_param("search_query", "big cats"))
            .and(query_param("page", "2"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(search_html(&[("11", "Lions"), ("12", "Tigers")])),
            )
            .expect(1)
            .mount(&server)
            .await;

        let config = test_config(dir.path(), vec![host(&server)]);
        let hits = JmSource::new(&config)
            .unwrap()
            .search_works("big cats", 2)
            .await
            .unwrap();

        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].id, "11");
        assert_eq!(hits[1].title, "Tigers");
    }

    async fn paged_server(last_page: u32) -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search/photos"))
            .respond_with(move |req: &Request| {
                let page: u32 = req
                    .url
                    .query_pairs()
                    .find(|(key, _)| key == "page")
                    .and_then(|(_, value)| value.parse().ok())
                    .unwrap_or(1);

                if page <= last_page {
                    let id = format!("{}", 1000 + page);
                    ResponseTemplate::new(200).set_body_string(search_html(&[(&id, "Some Title")]))
                } else {
                    ResponseTemplate::new(200).set_body_string("<html><body></body></html>")
                }
            })
            .mount(&server)
            .await;
        server
    }

    async fn request_count(server: &MockServer) -> usize {
        server.received_requests().await.unwrap().len()
    }

    #[tokio::test]
    async fn test_estimate_max_page_is_cached() {
        let dir = TempDir::new().unwrap();
        let server = paged_server(37).await;
        let config = test_config(dir.path(), vec![host(&server)]);
        let source = JmSource::new(&config).unwrap();

        assert_eq!(source.estimate_max_page("query").await.unwrap(), 37);
        let after_first = request_count(&server).await;
        assert!(after_first <= 13, "{after_first} requests");

        assert_eq!(source.estimate_max_page("query").await.unwrap(), 37);
        assert_eq!(request_count(&server).await, after_first);
    }

    #[tokio::test]
    async fn test_empty_first_page_is_not_cached() {
        let dir = TempDir::new().unwrap();
        let server = paged_server(0).await;
        let config = test_config(dir.path(), vec![host(&server)]);
        let source = JmSource::new(&config).unwrap();

        assert_eq!(source.estimate_max_page("nothing").await.unwrap(), 0);
        assert_eq!(source.estimate_max_page("nothing").await.unwrap(), 0);
        assert_eq!(request_count(&server).await, 2);
    }

    #[tokio::test]
    async fn test_random_work_comes_from_results() {
        let dir = TempDir::new().unwrap();
        let server = paged_server(3).await;
        let config = test_config(dir.path(), vec![host(&server)]);
        let source = JmSource::new(&config).unwrap();

        let pick = source.random_work("anything").await.unwrap();
        assert!(["1001", "1002", "1003"].contains(&pick.id.as_str()), "{}", pick.id);
    }

    #[tokio::test]
    async fn test_random_work_without_results() {
        let dir = TempDir::new().unwrap();
        let server = paged_server(0).await;
        let config = test_config(dir.path(), vec![host(&server)]);
        let source = JmSource::new(&config).unwrap();

        assert!(matches!(
            source.random_work("nothing").await,
            Err(Error::NotFound(_))
        ));
    }
}

#[cfg(test)]
mod probe_tests {
    use super::*;

    #[tokio::test]
    async fn test_probe_hosts_classifies_statuses() {
        let ok = MockServer::start().await;
        Mock::given(path("/"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&ok)
            .await;

        let moved = MockServer::start().await;
        Mock::given(path("/"))
            .respond_with(ResponseTemplate::new(302).insert_header("location", "http://elsewhere.invalid/"))
            .mount(&moved)
            .await;

        let down = MockServer::start().await;
        Mock::given(path("/"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&down)
            .await;

        let client = HttpClient::for_probing("test", Duration::from_secs(2)).unwrap();
        let candidates = vec![host(&ok), host(&moved), host(&down), "127.0.0.1:9".to_string()];
        let report = mirror::probe_hosts(&client, "http", candidates).await;

        assert_eq!(report.usable(), vec![host(&ok), host(&moved)]);
        assert_eq!(report.statuses[&host(&moved)], MirrorStatus::Usable(302));
        assert_eq!(report.statuses[&host(&down)], MirrorStatus::Rejected(503));
        assert!(matches!(
            report.statuses["127.0.0.1:9"],
            MirrorStatus::Unreachable(_)
        ));
    }

    #[tokio::test]
    async fn test_discover_hosts_skips_broken_pages() {
        let server = MockServer::start().await;
        serve(
            &server,
            "/go/300.html",
            r#"<a href="https://18comic-new.vip">new</a> <a href="https://jm365.work/x">old</a>
               <p>also jmcomic-new.me</p>"#
                .to_string(),
        )
        .await;

        let client = HttpClient::for_probing("test", Duration::from_secs(2)).unwrap();
        let urls = vec![
            format!("http://{}/go/300.html", host(&server)),
            format!("http://{}/go/301.html", host(&server)),
        ];

        let hosts = mirror::discover_hosts(&client, &urls).await;
        assert_eq!(hosts, vec!["18comic-new.vip", "jmcomic-new.me"]);
    }

    #[tokio::test]
    async fn test_update_and_reset_mirrors() {
        let dir = TempDir::new().unwrap();
        let config = test_config(dir.path(), vec!["a.example".to_string()]);
        let source = JmSource::new(&config).unwrap();
        assert_eq!(source.mirrors(), vec!["a.example"]);

        source.update_mirrors(vec!["b.example".to_string(), "c.example".to_string()]);
        assert_eq!(source.mirrors(), vec!["b.example", "c.example"]);

        source.reset_mirrors();
        assert_eq!(source.mirrors()[0], "18comic.vip");
    }
}

#[cfg(test)]
mod end_to_end_tests {
    use super::*;

    #[tokio::test]
    async fn test_fetch_download_assemble_over_http() {
        let dir = TempDir::new().unwrap();
        let server = MockServer::start().await;
        let site = host(&server);

        serve(
            &server,
            "/album/100000",
            "<html><body><h1 id=\"book-name\">Over HTTP</h1></body></html>".to_string(),
        )
        .await;
        serve(&server, "/photo/100000", chapter_html(&site, &["00002.jpg", "00001.jpg"])).await;

        let first = png_bytes(40, 60, [10, 20, 30]);
        let second = png_bytes(40, 60, [200, 100, 50]);
        for (name, body) in [("00001.jpg", &first), ("00002.jpg", &second)] {
            Mock::given(method("GET"))
                .and(path(format!("/media/photos/100000/{}", name)))
                .and(header("referer", format!("http://{}/", site)))
                .respond_with(ResponseTemplate::new(200).set_body_bytes(body.clone()))
                .expect(1)
                .mount(&server)
                .await;
        }

        let mut config = test_config(dir.path(), vec![site.clone()]);
        config.max_pages_per_file = 1;
        let source = Arc::new(JmSource::new(&config).unwrap());

        let work = source.fetch_work("100000").await.unwrap();
        assert_eq!(work.title, "Over HTTP");
        assert_eq!(work.total_pages, 2);

        let images = Downloader::new(source.clone(), &config)
            .download_work(&work)
            .await
            .unwrap();
        assert_eq!(images[0].data, first);
        assert_eq!(images[1].data, second);

        let files = Assembler::new(&config).assemble(&work, &images).await.unwrap();
        assert_eq!(files.len(), 2);
        assert!(files[1].ends_with("100000/100000-part2.pdf"));
    }

    #[tokio::test]
    async fn test_images_refer_to_the_mirror_that_served_the_work() {
        let dir = TempDir::new().unwrap();
        let broken = failing_mirror(500, "/album/100000").await;

        let good = MockServer::start().await;
        let site = host(&good);
        serve(&good, "/album/100000", "<html><body></body></html>".to_string()).await;
        serve(&good, "/photo/100000", chapter_html(&site, &["00001.jpg"])).await;

        let page = png_bytes(30, 30, [5, 5, 5]);
        Mock::given(method("GET"))
            .and(path("/media/photos/100000/00001.jpg"))
            .and(header("referer", format!("http://{}/", site)))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(page.clone()))
            .expect(1)
            .mount(&good)
            .await;

        let config = test_config(dir.path(), vec![host(&broken), site.clone()]);
        let source = Arc::new(JmSource::new(&config).unwrap());
        let work = source.fetch_work("100000").await.unwrap();
        assert_eq!(work.chapters[0].site_host, site);

        // The mirror list moves on before the download starts.
        source.update_mirrors(vec!["elsewhere.invalid".to_string()]);

        let images = Downloader::new(source.clone(), &config)
            .download_work(&work)
            .await
            .unwrap();
        assert_eq!(images[0].data, page);
    }
}
