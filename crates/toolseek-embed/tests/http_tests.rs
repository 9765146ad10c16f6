use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use toolseek_core::config::EmbedSettings;
use toolseek_core::traits::EmbeddingProvider;
use toolseek_core::EmbedError;
use toolseek_embed::HttpEmbedder;

/// Serves the canned `(status, body)` responses in order, repeating the last one.
async fn serve(responses: Vec<(u16, String)>) -> (String, Arc<AtomicUsize>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&hits);
    tokio::spawn(async move {
        loop {
            let Ok((mut stream, _)) = listener.accept().await else { return };
            let n = counter.fetch_add(1, Ordering::SeqCst);
            let (status, body) = responses[n.min(responses.len() - 1)].clone();
            read_request(&mut stream).await;
            let reply = format!(
                "HTTP/1.1 {status} X\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            let _ = stream.write_all(reply.as_bytes()).await;
            let _ = stream.shutdown().await;
        }
    });
    (format!("http://{addr}/v1"), hits)
}

async fn read_request(stream: &mut TcpStream) {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        if let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            let head = String::from_utf8_lossy(&buf[..end]).to_lowercase();
            let length = head
                .lines()
                .find_map(|l| l.strip_prefix("content-length:").map(|v| v.trim().parse::<usize>().unwrap_or(0)))
                .unwrap_or(0);
            if buf.len() >= end + 4 + length {
                return;
            }
        }
        match stream.read(&mut chunk).await {
            Ok(0) | Err(_) => return,
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
        }
    }
}

fn settings(base_url: String, dim: usize) -> EmbedSettings {
    EmbedSettings {
        provider: "http".into(),
        base_url,
        dim,
        max_retries: 2,
        api_key_env: "TOOLSEEK_TEST_UNSET_KEY".into(),
        ..EmbedSettings::default()
    }
}

#[tokio::test]
async fn vectors_are_returned_in_input_order() {
    let body = r#"{"data":[{"index":1,"embedding":[0.0,1.0]},{"index":0,"embedding":[1.0,0.0]}]}"#.to_string();
    let (url, _) = serve(vec![(200, body)]).await;
    let e = HttpEmbedder::new(&settings(url, 2)).unwrap();
    let out = e.embed_batch(&["a".into(), "b".into()]).await.unwrap();
    assert_eq!(out, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
}

#[tokio::test]
async fn server_errors_are_retried() {
    let ok = r#"{"data":[{"index":0,"embedding":[0.6,0.8]}]}"#.to_string();
    let (url, hits) = serve(vec![(503, "busy".into()), (200, ok)]).await;
    let e = HttpEmbedder::new(&settings(url, 2)).unwrap();
    assert_eq!(e.embed("weather").await.unwrap(), vec![0.6, 0.8]);
    assert_eq!(hits.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn exhausted_retries_stay_transient() {
    let (url, hits) = serve(vec![(429, "slow down".into())]).await;
    let e = HttpEmbedder::new(&settings(url, 2)).unwrap();
    let err = e.embed("weather").await.unwrap_err();
    assert!(matches!(err, EmbedError::Transient(_)));
    assert_eq!(hits.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn client_errors_are_permanent_and_not_retried() {
    let (url, hits) = serve(vec![(400, "bad model".into())]).await;
    let e = HttpEmbedder::new(&settings(url, 2)).unwrap();
    let err = e.embed("weather").await.unwrap_err();
    assert!(matches!(err, EmbedError::Permanent(_)));
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn dimension_mismatch_is_permanent() {
    let (url, _) = serve(vec![(200, r#"{"data":[{"index":0,"embedding":[1.0]}]}"#.into())]).await;
    let e = HttpEmbedder::new(&settings(url, 4)).unwrap();
    assert!(matches!(e.embed("x").await.unwrap_err(), EmbedError::Permanent(_)));
}

#[tokio::test]
async fn unreachable_endpoint_is_transient() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    let mut s = settings(format!("http://{addr}/v1"), 2);
    s.max_retries = 0;
    let e = HttpEmbedder::new(&s).unwrap();
    assert!(e.embed("x").await.unwrap_err().is_transient());
}
