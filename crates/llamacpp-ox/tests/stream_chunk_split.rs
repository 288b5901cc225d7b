use llamacpp_ox::{CallOptions, LlamaCpp, ModelMode};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpListener,
    time::{Duration, sleep},
};

fn http_chunk(data: &[u8]) -> Vec<u8> {
    let mut chunk = format!("{:x}\r\n", data.len()).into_bytes();
    chunk.extend_from_slice(data);
    chunk.extend_from_slice(b"\r\n");
    chunk
}

#[tokio::test]
async fn streaming_should_survive_split_sse_chunks() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();

        let mut buffer = Vec::new();
        loop {
            let mut chunk = [0u8; 1024];
            let n = socket.read(&mut chunk).await.unwrap();
            if n == 0 {
                return;
            }
            buffer.extend_from_slice(&chunk[..n]);

            if let Some(pos) = buffer.windows(4).position(|window| window == b"\r\n\r\n") {
                let header_end = pos + 4;
                let headers_str = String::from_utf8_lossy(&buffer[..header_end]).to_lowercase();
                let content_length = headers_str
                    .lines()
                    .find_map(|line| line.strip_prefix("content-length: "))
                    .and_then(|len| len.trim().parse::<usize>().ok())
                    .unwrap_or(0);

                let mut body = buffer[header_end..].to_vec();
                while body.len() < content_length {
                    let n = socket.read(&mut chunk).await.unwrap();
                    if n == 0 {
                        break;
                    }
                    body.extend_from_slice(&chunk[..n]);
                }
                break;
            }
        }

        let response_head = "HTTP/1.1 200 OK\r\ncontent-type: text/event-stream\r\ntransfer-encoding: chunked\r\n\r\n";
        socket.write_all(response_head.as_bytes()).await.unwrap();

        // "é" is split across the first two chunks, the sentinel across the last two.
        let event = "data: {\"choices\":[{\"delta\":{\"content\":\"caf\u{e9} <think>hmm</think>ok\"}}]}\n\n";
        let bytes = event.as_bytes();
        let split_at = event.find('\u{e9}').unwrap() + 1;

        let mut second = bytes[split_at..].to_vec();
        second.extend_from_slice(b"data: [DO");
        let parts = [bytes[..split_at].to_vec(), second, b"NE]\n\n".to_vec()];

        for part in parts {
            socket.write_all(&http_chunk(&part)).await.unwrap();
            socket.flush().await.unwrap();
            sleep(Duration::from_millis(50)).await;
        }
        socket.write_all(b"0\r\n\r\n").await.unwrap();
    });

    let options = CallOptions::builder()
        .server_url(format!("http://{addr}"))
        .prompt("ping")
        .model_mode(ModelMode::Custom)
        .model_override("split-test")
        .build();

    let output = LlamaCpp::new()
        .run(&options, None)
        .await
        .expect("streaming should not fail on split chunks");

    assert_eq!(output.thinking, "hmm");
    assert_eq!(output.answer, "caf\u{e9} ok");
    assert_eq!(output.model_used, "split-test");
    assert!(output.raw.contains("\"done\":true"));

    server.await.unwrap();
}
