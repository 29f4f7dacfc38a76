use std::sync::mpsc;
use std::thread;
use std::time::Duration;

/// 1x1 PNG served for every page image.
pub static PAGE_PNG: &[u8] = &[
    137, 80, 78, 71, 13, 10, 26, 10, 0, 0, 0, 13, 73, 72, 68, 82, 0, 0, 0, 1, 0, 0, 0, 1, 8, 4, 0,
    0, 0, 181, 28, 12, 2, 0, 0, 0, 11, 73, 68, 65, 84, 120, 218, 99, 252, 255, 23, 0, 2, 3, 1, 128,
    110, 220, 25, 0, 0, 0, 0, 73, 69, 78, 68, 174, 66, 96, 130,
];

/// A Madara-style manga site.
///
/// - `/manga/moon-tales/` lists chapters 1 and 2 (newest first).
/// - `/manga/moon-tales-latest/` lists chapters 1 to 3, all under
///   `/manga/moon-tales/`.
/// - `/manga/empty/` lists nothing.
/// - chapter 1 has two pages; chapter 2 has three, the second one 404s;
///   chapter 3 has one page served through `data-src`.
pub struct MadaraStub {
    pub base_url: String,
    shutdown_tx: Option<mpsc::Sender<()>>,
    handle: Option<thread::JoinHandle<()>>,
}

impl MadaraStub {
    pub fn spawn() -> Self {
        let server = tiny_http::Server::http("127.0.0.1:0").expect("start madara stub server");
        let addr = server.server_addr();
        let base_url = format!("http://{addr}");

        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();

        let handle = thread::spawn(move || {
            loop {
                if shutdown_rx.try_recv().is_ok() {
                    break;
                }

                let request = match server.recv_timeout(Duration::from_millis(50)) {
                    Ok(Some(req)) => req,
                    Ok(None) => continue,
                    Err(_) => break,
                };

                let url = request.url().to_string();
                let path = url.split('?').next().unwrap_or(&url).to_owned();

                let response = match route(&path) {
                    Some(Body::Html(html)) => tiny_http::Response::from_string(html)
                        .with_header(header("text/html; charset=utf-8")),
                    Some(Body::Png) => tiny_http::Response::from_data(PAGE_PNG.to_vec())
                        .with_header(header("image/png")),
                    None => tiny_http::Response::from_string("not found").with_status_code(404),
                };
                let _ = request.respond(response);
            }
        });

        Self {
            base_url,
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }
}

impl Drop for MadaraStub {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

enum Body {
    Html(String),
    Png,
}

fn header(content_type: &str) -> tiny_http::Header {
    tiny_http::Header::from_bytes(&b"Content-Type"[..], content_type.as_bytes())
        .expect("build header")
}

fn route(path: &str) -> Option<Body> {
    match path {
        "/manga/moon-tales/" => Some(Body::Html(series_page(&[2, 1]))),
        "/manga/moon-tales-latest/" => Some(Body::Html(series_page(&[3, 2, 1]))),
        "/manga/empty/" => Some(Body::Html(series_page(&[]))),
        "/manga/moon-tales/chapter-1/" => Some(Body::Html(chapter_page(&[
            r#"<img class="wp-manga-chapter-img" src="/img/1/01.png" />"#,
            r#"<img class="wp-manga-chapter-img" src="/img/1/02.png" />"#,
        ]))),
        "/manga/moon-tales/chapter-2/" => Some(Body::Html(chapter_page(&[
            r#"<img class="wp-manga-chapter-img" src="/img/2/01.png" />"#,
            r#"<img class="wp-manga-chapter-img" src="/img/2/missing.png" />"#,
            r#"<img class="wp-manga-chapter-img" src="/img/2/03.png" />"#,
        ]))),
        "/manga/moon-tales/chapter-3/" => Some(Body::Html(chapter_page(&[
            r#"<img class="wp-manga-chapter-img" data-src=" /img/3/01.png " />"#,
        ]))),
        "/img/2/missing.png" => None,
        _ if path.starts_with("/img/") => Some(Body::Png),
        _ => None,
    }
}

fn series_page(chapters: &[u32]) -> String {
    let items = chapters
        .iter()
        .map(|n| {
            format!(
                r#"<li class="wp-manga-chapter"><a href="/manga/moon-tales/chapter-{n}/">Chapter {n}</a></li>"#
            )
        })
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        r#"<!doctype html>
<html>
  <body>
    <ul class="main version-chap">
{items}
    </ul>
  </body>
</html>
"#
    )
}

fn chapter_page(images: &[&str]) -> String {
    format!(
        r#"<!doctype html>
<html>
  <body>
    <div class="reading-content">
{}
    </div>
  </body>
</html>
"#,
        images.join("\n")
    )
}
