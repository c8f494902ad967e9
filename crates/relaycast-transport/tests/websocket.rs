//! Integration tests for the WebSocket client transport.
//!
//! Each test binds a throwaway WebSocket server on a loopback port chosen
//! by the OS and drives it with raw `tokio-tungstenite` on the server side,
//! so only the client half is code under test.

#[cfg(feature = "websocket")]
mod websocket {
    use std::sync::Arc;
    use std::time::Duration;

    use futures_util::{SinkExt, StreamExt};
    use relaycast_transport::{Connection, Connector, WebSocketConnector};
    use tokio::net::TcpListener;
    use tokio_tungstenite::tungstenite::Message;

    type ServerWs = tokio_tungstenite::WebSocketStream<tokio::net::TcpStream>;

    /// Binds a listener and returns its `ws://` URL plus a task that
    /// yields the first accepted server-side socket.
    async fn spawn_server() -> (String, tokio::task::JoinHandle<ServerWs>) {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("should bind");
        let addr = listener.local_addr().expect("should have addr");
        let handle = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.expect("should accept");
            tokio_tungstenite::accept_async(stream)
                .await
                .expect("upgrade should succeed")
        });
        (format!("ws://{addr}/app/test-key"), handle)
    }

    #[tokio::test]
    async fn test_websocket_connect_and_exchange_text_frames() {
        let (url, server) = spawn_server().await;

        let conn = WebSocketConnector
            .connect(&url)
            .await
            .expect("client should connect");
        let mut server_ws = server.await.expect("task should complete");
        assert!(conn.id().into_inner() > 0);

        // --- Client sends, server receives a text frame ---
        conn.send(br#"{"event":"control:ping"}"#)
            .await
            .expect("send should succeed");
        let msg = server_ws.next().await.unwrap().unwrap();
        assert!(msg.is_text(), "JSON payloads travel as text frames");
        assert_eq!(msg.into_text().unwrap().as_str(), r#"{"event":"control:ping"}"#);

        // --- Server sends, client receives ---
        server_ws
            .send(Message::text(r#"{"event":"hello"}"#.to_string()))
            .await
            .unwrap();
        let received = conn
            .recv()
            .await
            .expect("recv should succeed")
            .expect("should have data");
        assert_eq!(received, br#"{"event":"hello"}"#);

        conn.close().await.expect("close should succeed");
    }

    #[tokio::test]
    async fn test_websocket_send_not_blocked_by_pending_recv() {
        let (url, server) = spawn_server().await;
        let conn = Arc::new(WebSocketConnector.connect(&url).await.unwrap());
        let mut server_ws = server.await.unwrap();

        // Park a reader on the connection with nothing to read.
        let reader = {
            let conn = Arc::clone(&conn);
            tokio::spawn(async move { conn.recv().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        // A send must still go through while the reader is parked.
        tokio::time::timeout(Duration::from_secs(2), conn.send(b"{}"))
            .await
            .expect("send must not wait for the reader")
            .expect("send should succeed");
        let msg = server_ws.next().await.unwrap().unwrap();
        assert_eq!(msg.into_data().as_ref(), b"{}");

        server_ws.close(None).await.unwrap();
        let result = reader.await.unwrap().expect("recv should not error");
        assert!(result.is_none(), "should return None on server close");
    }

    #[tokio::test]
    async fn test_websocket_connect_refused_returns_error() {
        // Grab a free port, then release it so nothing is listening.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let result = WebSocketConnector.connect(&format!("ws://{addr}/")).await;
        assert!(result.is_err(), "dialing a closed port should fail");
    }
}
