//! Message handling and media delivery against a mocked site

use anyhow::Result;
use async_trait::async_trait;
use slopbot::fetch::DEFAULT_TIMEOUT;
use slopbot::resolvers::IFunny;
use slopbot::{
    deliver, handle_message, ChatChannel, Delivered, Dispatcher, Fetcher, Handled, IncomingMessage,
    ResolveError, ResolvedMedia, Resolver, SiteProfile, MAX_UPLOAD_BYTES,
};
use std::sync::Mutex;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[derive(Debug, Clone, PartialEq)]
enum Post {
    Text(String),
    File(String, Vec<u8>),
}

#[derive(Default)]
struct RecordingChannel {
    posts: Mutex<Vec<Post>>,
}

impl RecordingChannel {
    fn posts(&self) -> Vec<Post> {
        self.posts.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatChannel for RecordingChannel {
    async fn notify_failure(&self, text: &str) -> Result<()> {
        self.posts.lock().unwrap().push(Post::Text(text.to_string()));
        Ok(())
    }

    async fn send_file(&self, filename: &str, data: Vec<u8>) -> Result<()> {
        self.posts
            .lock()
            .unwrap()
            .push(Post::File(filename.to_string(), data));
        Ok(())
    }
}

fn local_dispatcher() -> Dispatcher {
    let mut profile = IFunny::default_profile();
    profile.domains = vec!["127.0.0.1".to_string()];
    Dispatcher::with_resolvers(vec![Box::new(IFunny::with_profile(profile))])
}

fn share(server: &MockServer, meme: &str) -> IncomingMessage {
    IncomingMessage {
        author_is_self: false,
        text: format!("Tap to see the meme - {}/picture/{}", server.uri(), meme),
    }
}

async fn mount_meme_page(server: &MockServer, meme: &str, asset: &str) {
    let page = format!(r#"<html><body><img src="{}"></body></html>"#, asset);
    Mock::given(method("GET"))
        .and(path(format!("/picture/{}", meme)))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/html")
                .set_body_string(page),
        )
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_meme_share_is_uploaded() {
    let server = MockServer::start().await;
    mount_meme_page(&server, "cat", "/images/cat.jpg").await;
    Mock::given(method("GET"))
        .and(path("/images/cat.jpg"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"\xFF\xD8\xFFcat".to_vec()))
        .mount(&server)
        .await;

    let channel = RecordingChannel::default();
    let message = share(&server, "cat");
    let handled = handle_message(&local_dispatcher(), &channel, &message, DEFAULT_TIMEOUT)
        .await
        .unwrap();

    assert_eq!(handled, Handled::Delivered);
    assert_eq!(
        channel.posts(),
        vec![Post::File("cat.jpg".to_string(), b"\xFF\xD8\xFFcat".to_vec())]
    );
}

#[tokio::test]
async fn test_oversized_asset_posts_link() {
    let server = MockServer::start().await;
    mount_meme_page(&server, "big", "/images/big.jpg").await;
    Mock::given(method("GET"))
        .and(path("/images/big.jpg"))
        .respond_with(
            ResponseTemplate::new(200).set_body_bytes(vec![0u8; MAX_UPLOAD_BYTES as usize + 1]),
        )
        .mount(&server)
        .await;

    let channel = RecordingChannel::default();
    handle_message(&local_dispatcher(), &channel, &share(&server, "big"), DEFAULT_TIMEOUT)
        .await
        .unwrap();

    assert_eq!(
        channel.posts(),
        vec![Post::Text(format!("[slop](<{}/images/big.jpg>)", server.uri()))]
    );
}

#[tokio::test]
async fn test_asset_download_failure_is_reported() {
    let server = MockServer::start().await;
    mount_meme_page(&server, "gone", "/images/gone.jpg").await;
    Mock::given(method("GET"))
        .and(path("/images/gone.jpg"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;

    let channel = RecordingChannel::default();
    handle_message(&local_dispatcher(), &channel, &share(&server, "gone"), DEFAULT_TIMEOUT)
        .await
        .unwrap();

    assert_eq!(
        channel.posts(),
        vec![Post::Text("Failed to download media.".to_string())]
    );
}

#[tokio::test]
async fn test_resolve_error_is_reported() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let channel = RecordingChannel::default();
    let message = share(&server, "missing");
    let handled = handle_message(&local_dispatcher(), &channel, &message, DEFAULT_TIMEOUT)
        .await
        .unwrap();

    assert_eq!(handled, Handled::Failed);
    assert_eq!(
        channel.posts(),
        vec![Post::Text(
            "Error processing the link: Failed to fetch meme page: 404".to_string()
        )]
    );
}

#[tokio::test]
async fn test_own_and_unrelated_messages_ignored() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let channel = RecordingChannel::default();
    let dispatcher = local_dispatcher();

    let mut own = share(&server, "cat");
    own.author_is_self = true;
    let handled = handle_message(&dispatcher, &channel, &own, DEFAULT_TIMEOUT).await.unwrap();
    assert_eq!(handled, Handled::Ignored);

    let chatter = IncomingMessage {
        author_is_self: false,
        text: "lol look at this".to_string(),
    };
    let handled = handle_message(&dispatcher, &channel, &chatter, DEFAULT_TIMEOUT).await.unwrap();
    assert_eq!(handled, Handled::Ignored);

    assert!(channel.posts().is_empty());
}

#[tokio::test]
async fn test_heic_named_jpeg_uploaded_as_jpg() {
    let server = MockServer::start().await;
    let jpeg = b"\xFF\xD8\xFF\xE0fakejpeg".to_vec();
    Mock::given(method("GET"))
        .and(path("/media/IMG_0001.heic"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "image/heic")
                .set_body_bytes(jpeg.clone()),
        )
        .mount(&server)
        .await;

    let channel = RecordingChannel::default();
    let fetcher = Fetcher::new(DEFAULT_TIMEOUT).unwrap();
    let item = ResolvedMedia::image(format!("{}/media/IMG_0001.heic", server.uri()));
    let delivered = deliver(&fetcher, &channel, &item, &[]).await.unwrap();

    assert_eq!(delivered, Delivered::File("IMG_0001.jpg".to_string()));
    assert_eq!(channel.posts(), vec![Post::File("IMG_0001.jpg".to_string(), jpeg)]);
}

#[tokio::test]
async fn test_video_bytes_untouched() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v/clip"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"mp4data".to_vec()))
        .mount(&server)
        .await;

    let channel = RecordingChannel::default();
    let fetcher = Fetcher::new(DEFAULT_TIMEOUT).unwrap();
    let item = ResolvedMedia::video(format!("{}/v/clip", server.uri()));
    let delivered = deliver(&fetcher, &channel, &item, &[]).await.unwrap();

    assert_eq!(delivered, Delivered::File("clip.mp4".to_string()));
    assert_eq!(
        channel.posts(),
        vec![Post::File("clip.mp4".to_string(), b"mp4data".to_vec())]
    );
}

/// Serve one hand-written HTTP/1.1 response on a local port.
///
/// `chunks` megabyte-sized chunks are sent with chunked framing; with `None`
/// only the head goes out and the connection is then held open.
async fn serve_raw(head: &'static str, chunks: Option<usize>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let Ok((mut socket, _)) = listener.accept().await else {
            return;
        };
        let mut request = Vec::new();
        let mut buf = [0u8; 1024];
        while !request.windows(4).any(|w| w == b"\r\n\r\n") {
            match socket.read(&mut buf).await {
                Ok(0) | Err(_) => return,
                Ok(n) => request.extend_from_slice(&buf[..n]),
            }
        }
        if socket.write_all(head.as_bytes()).await.is_err() {
            return;
        }
        if let Some(chunks) = chunks {
            let chunk = vec![b'x'; 1024 * 1024];
            for _ in 0..chunks {
                let size = format!("{:x}\r\n", chunk.len());
                if socket.write_all(size.as_bytes()).await.is_err()
                    || socket.write_all(&chunk).await.is_err()
                    || socket.write_all(b"\r\n").await.is_err()
                {
                    return;
                }
            }
            let _ = socket.write_all(b"0\r\n\r\n").await;
        }
        tokio::time::sleep(Duration::from_secs(60)).await;
    });
    format!("http://{}", addr)
}

#[tokio::test]
async fn test_declared_oversize_never_reads_body() {
    // the body never arrives, so reading it would hit the timeout
    let base = serve_raw(
        "HTTP/1.1 200 OK\r\nContent-Type: video/mp4\r\nContent-Length: 9437184\r\n\r\n",
        None,
    )
    .await;

    let channel = RecordingChannel::default();
    let fetcher = Fetcher::new(Duration::from_secs(3)).unwrap();
    let item = ResolvedMedia::video(format!("{}/big.mp4", base));
    let delivered = deliver(&fetcher, &channel, &item, &[]).await.unwrap();

    assert_eq!(delivered, Delivered::Link);
    assert_eq!(
        channel.posts(),
        vec![Post::Text(format!("[slop](<{}/big.mp4>)", base))]
    );
}

#[tokio::test]
async fn test_chunked_oversize_stops_at_cap() {
    let base = serve_raw(
        "HTTP/1.1 200 OK\r\nContent-Type: video/mp4\r\nTransfer-Encoding: chunked\r\n\r\n",
        Some(9),
    )
    .await;

    let channel = RecordingChannel::default();
    let fetcher = Fetcher::new(DEFAULT_TIMEOUT).unwrap();
    let item = ResolvedMedia::video(format!("{}/stream.mp4", base));
    let delivered = deliver(&fetcher, &channel, &item, &[]).await.unwrap();

    assert_eq!(delivered, Delivered::Link);
    assert_eq!(
        channel.posts(),
        vec![Post::Text(format!("[slop](<{}/stream.mp4>)", base))]
    );
}

#[tokio::test]
async fn test_chunked_under_cap_uploads() {
    let base = serve_raw(
        "HTTP/1.1 200 OK\r\nContent-Type: video/mp4\r\nTransfer-Encoding: chunked\r\n\r\n",
        Some(2),
    )
    .await;

    let channel = RecordingChannel::default();
    let fetcher = Fetcher::new(DEFAULT_TIMEOUT).unwrap();
    let item = ResolvedMedia::video(format!("{}/small.mp4", base));
    let delivered = deliver(&fetcher, &channel, &item, &[]).await.unwrap();

    assert_eq!(delivered, Delivered::File("small.mp4".to_string()));
    match channel.posts().as_slice() {
        [Post::File(name, data)] => {
            assert_eq!(name, "small.mp4");
            assert_eq!(data.len(), 2 * 1024 * 1024);
        }
        other => panic!("unexpected posts: {:?}", other.len()),
    }
}

/// Resolver with a fixed item list, for driving `handle_message`
struct FixedResolver {
    profile: SiteProfile,
    items: Vec<ResolvedMedia>,
}

#[async_trait]
impl Resolver for FixedResolver {
    fn name(&self) -> &'static str {
        "fixed"
    }

    fn profile(&self) -> &SiteProfile {
        &self.profile
    }

    fn is_link(&self, url: &str) -> bool {
        url.starts_with("fixed://")
    }

    fn match_text(&self, text: &str) -> Option<String> {
        self.is_link(text).then(|| text.to_string())
    }

    async fn resolve(
        &self,
        _fetcher: &Fetcher,
        _url: &str,
    ) -> Result<Vec<ResolvedMedia>, ResolveError> {
        Ok(self.items.clone())
    }
}

/// Accepts uploads but refuses every text post
#[derive(Default)]
struct MuteChannel {
    files: Mutex<Vec<String>>,
}

#[async_trait]
impl ChatChannel for MuteChannel {
    async fn notify_failure(&self, _text: &str) -> Result<()> {
        anyhow::bail!("missing send permission")
    }

    async fn send_file(&self, filename: &str, _data: Vec<u8>) -> Result<()> {
        self.files.lock().unwrap().push(filename.to_string());
        Ok(())
    }
}

#[tokio::test]
async fn test_refused_report_does_not_stop_later_items() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/c/1.jpg"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/c/2.jpg"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"\xFF\xD8\xFF2".to_vec()))
        .mount(&server)
        .await;

    let resolver = FixedResolver {
        profile: SiteProfile::new(&[], &[]),
        items: vec![
            ResolvedMedia::image(format!("{}/c/1.jpg", server.uri())),
            ResolvedMedia::image(format!("{}/c/2.jpg", server.uri())),
        ],
    };
    let dispatcher = Dispatcher::with_resolvers(vec![Box::new(resolver)]);
    let message = IncomingMessage {
        author_is_self: false,
        text: "fixed://carousel".to_string(),
    };

    let channel = MuteChannel::default();
    let handled = handle_message(&dispatcher, &channel, &message, DEFAULT_TIMEOUT)
        .await
        .unwrap();

    assert_eq!(handled, Handled::Delivered);
    assert_eq!(*channel.files.lock().unwrap(), vec!["2.jpg".to_string()]);
}
