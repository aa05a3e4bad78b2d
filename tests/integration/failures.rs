use std::time::Duration;

use cumulus_core::{Chunk, Command, Message};

use crate::*;

#[tokio::test]
async fn malformed_datagrams_do_not_stall_server() -> Result<()> {
    let server = start_server(CHUNK_SIZE)?;
    let raw = bind_udp("127.0.0.1:0".parse()?)?;

    raw.send_to(b"", server.addr).await?;
    raw.send_to(b"DELETE", server.addr).await?;
    raw.send_to(b"COPY a b", server.addr).await?;
    raw.send_to(&[0xC5, b'C', b'M', b'L', 0x09], server.addr).await?;
    raw.send_to(&[0xFF; 64], server.addr).await?;

    let chunk = Chunk::new("ok.txt", 0, b"survived".to_vec().into(), true)?;
    raw.send_to(&Message::Chunk(chunk).encode(), server.addr).await?;

    let target = server.path("ok.txt");
    wait_until(Duration::from_secs(5), || has_content(&target, b"survived")).await?;

    server.stop().await;
    Ok(())
}

#[tokio::test]
async fn delete_for_missing_file_on_server_is_harmless() -> Result<()> {
    let server = start_server(CHUNK_SIZE)?;
    let raw = bind_udp("127.0.0.1:0".parse()?)?;

    let delete = Message::Command(Command::delete("ghost.txt")?).encode();
    raw.send_to(&delete, server.addr).await?;
    raw.send_to(&delete, server.addr).await?;

    let chunk = Chunk::new("real.txt", 0, b"here".to_vec().into(), true)?;
    raw.send_to(&Message::Chunk(chunk).encode(), server.addr).await?;
    let target = server.path("real.txt");
    wait_until(Duration::from_secs(5), || has_content(&target, b"here")).await?;

    server.stop().await;
    Ok(())
}

#[tokio::test]
async fn client_shutdown_releases_port() -> Result<()> {
    let server = start_server(CHUNK_SIZE)?;
    let client = start_client(server.addr, CHUNK_SIZE)?;
    let addr = client.addr;

    tokio::time::timeout(Duration::from_secs(5), client.stop()).await?;

    let rebound = bind_udp(addr)?;
    assert_eq!(rebound.local_addr()?, addr);

    server.stop().await;
    Ok(())
}

#[tokio::test]
async fn client_without_server_keeps_running() -> Result<()> {
    // Nothing listens here; sends are fire-and-forget.
    let nowhere: SocketAddr = "127.0.0.1:9".parse()?;
    let client = start_client(nowhere, CHUNK_SIZE)?;

    std::fs::write(client.path("lonely.txt"), b"anyone?")?;
    wait_until(Duration::from_secs(5), || synced(&client, "lonely.txt")).await?;

    tokio::time::timeout(Duration::from_secs(5), client.stop()).await?;
    Ok(())
}
