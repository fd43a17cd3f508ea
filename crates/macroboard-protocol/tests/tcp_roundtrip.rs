//! Integration test: control connection roundtrip on loopback.

use std::net::SocketAddr;
use std::time::Duration;

use macroboard_protocol::{Connection, Frame, ProtocolError};
use macroboard_types::KeyBitmap;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;

async fn listener() -> (TcpListener, SocketAddr) {
    let bind_addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
    let listener = TcpListener::bind(bind_addr).await.unwrap();
    let addr = listener.local_addr().unwrap();
    (listener, addr)
}

#[tokio::test]
async fn frames_flow_both_ways() {
    let (listener, addr) = listener().await;

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let conn = Connection::from_stream(stream).unwrap();

        // Receive brightness and image from the client
        assert_eq!(conn.recv().await.unwrap(), Some(Frame::SetBrightness(55)));
        match conn.recv().await.unwrap() {
            Some(Frame::SetKeyImage {
                key,
                image: Some(image),
            }) => {
                assert_eq!(key, 4);
                assert_eq!(image.width(), 72);
                assert_eq!(image.as_bytes()[..3], [10, 20, 30]);
            }
            other => panic!("expected SetKeyImage, got {other:?}"),
        }

        // Report a key press
        conn.send(&Frame::KeyStateChange {
            key: 4,
            is_down: true,
        })
        .await
        .unwrap();

        assert_eq!(conn.recv().await.unwrap(), Some(Frame::ShowLogo));
    });

    let client = Connection::connect(addr).await.unwrap();
    assert_eq!(client.remote_address(), addr);

    client.send(&Frame::SetBrightness(55)).await.unwrap();
    let image = KeyBitmap::solid(72, 72, [10, 20, 30]).unwrap();
    client
        .send(&Frame::SetKeyImage {
            key: 4,
            image: Some(image),
        })
        .await
        .unwrap();

    let event = client.recv().await.unwrap();
    assert_eq!(
        event,
        Some(Frame::KeyStateChange {
            key: 4,
            is_down: true
        })
    );

    client.send(&Frame::ShowLogo).await.unwrap();
    server.await.unwrap();
}

#[tokio::test]
async fn peer_close_invalidates_connection() {
    let (listener, addr) = listener().await;

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        drop(stream);
    });

    let client = Connection::connect(addr).await.unwrap();
    server.await.unwrap();

    assert!(client.recv().await.unwrap().is_none());
    assert!(client.is_closed());
    assert!(matches!(
        client.send(&Frame::ShowLogo).await,
        Err(ProtocolError::ConnectionLost)
    ));
}

#[tokio::test]
async fn malformed_image_length_closes_connection() {
    let (listener, addr) = listener().await;

    let server = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        stream
            .write_all(&[0x04, 0, 0, 1, 0, 1, 0, 0xFF, 0xFF, 0xFF, 0xFF])
            .await
            .unwrap();
        // Keep the socket open until the client gives up on it
        tokio::time::sleep(Duration::from_millis(200)).await;
    });

    let client = Connection::connect(addr).await.unwrap();
    assert!(matches!(
        client.recv().await,
        Err(ProtocolError::MalformedFrame(_))
    ));
    assert!(client.is_closed());
    server.await.unwrap();
}

#[tokio::test]
async fn invalidate_unblocks_pending_receive() {
    let (listener, addr) = listener().await;

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        tokio::time::sleep(Duration::from_millis(500)).await;
        drop(stream);
    });

    let client = std::sync::Arc::new(Connection::connect(addr).await.unwrap());
    let reader = {
        let client = client.clone();
        tokio::spawn(async move { client.recv().await })
    };

    tokio::time::sleep(Duration::from_millis(50)).await;
    client.invalidate();

    let result = tokio::time::timeout(Duration::from_secs(1), reader)
        .await
        .expect("receive should unblock")
        .unwrap();
    assert!(matches!(result, Err(ProtocolError::ConnectionLost)));
    server.await.unwrap();
}
