use std::time::Duration;

use crate::*;

#[tokio::test]
async fn new_file_reaches_server() -> Result<()> {
    let server = start_server(CHUNK_SIZE)?;
    let client = start_client(server.addr, CHUNK_SIZE)?;

    let data = pattern(10 * CHUNK_SIZE + 37);
    std::fs::write(client.path("report.bin"), &data)?;

    let target = server.path("report.bin");
    wait_until(Duration::from_secs(5), || has_content(&target, &data)).await?;
    wait_until(Duration::from_secs(2), || synced(&client, "report.bin")).await?;

    let status = client.store.get("report.bin").unwrap();
    assert_eq!(status.file_size, data.len() as u64);

    client.stop().await;
    server.stop().await;
    Ok(())
}

#[tokio::test]
async fn modified_file_is_resent_and_trimmed() -> Result<()> {
    let server = start_server(CHUNK_SIZE)?;
    let client = start_client(server.addr, CHUNK_SIZE)?;

    let first = pattern(3 * CHUNK_SIZE);
    std::fs::write(client.path("notes.txt"), &first)?;
    let target = server.path("notes.txt");
    wait_until(Duration::from_secs(5), || has_content(&target, &first)).await?;

    let second = b"much shorter now".to_vec();
    std::fs::write(client.path("notes.txt"), &second)?;
    wait_until(Duration::from_secs(5), || has_content(&target, &second)).await?;

    client.stop().await;
    server.stop().await;
    Ok(())
}

#[tokio::test]
async fn empty_file_is_synced() -> Result<()> {
    let server = start_server(CHUNK_SIZE)?;
    let client = start_client(server.addr, CHUNK_SIZE)?;

    std::fs::write(client.path("empty"), b"")?;
    let target = server.path("empty");
    wait_until(Duration::from_secs(5), || has_content(&target, b"")).await?;

    client.stop().await;
    server.stop().await;
    Ok(())
}

#[tokio::test]
async fn local_delete_reaches_server() -> Result<()> {
    let server = start_server(CHUNK_SIZE)?;
    let client = start_client(server.addr, CHUNK_SIZE)?;

    std::fs::write(client.path("old.log"), b"rotate me")?;
    let target = server.path("old.log");
    wait_until(Duration::from_secs(5), || has_content(&target, b"rotate me")).await?;
    wait_until(Duration::from_secs(2), || synced(&client, "old.log")).await?;

    std::fs::remove_file(client.path("old.log"))?;
    wait_until(Duration::from_secs(5), || !target.exists()).await?;
    wait_until(Duration::from_secs(2), || client.store.get("old.log").is_none()).await?;

    client.stop().await;
    server.stop().await;
    Ok(())
}

#[tokio::test]
async fn subdirectories_and_unsendable_names_are_skipped() -> Result<()> {
    let server = start_server(CHUNK_SIZE)?;
    let client = start_client(server.addr, CHUNK_SIZE)?;

    std::fs::create_dir(client.path("nested"))?;
    std::fs::write(client.path("nested").join("inner.txt"), b"x")?;
    std::fs::write(client.path("has space.txt"), b"x")?;
    std::fs::write(client.path("plain.txt"), b"x")?;

    let target = server.path("plain.txt");
    wait_until(Duration::from_secs(5), || has_content(&target, b"x")).await?;
    tokio::time::sleep(Duration::from_millis(300)).await;

    assert!(!server.path("nested").exists());
    assert!(!server.path("inner.txt").exists());
    assert!(!server.path("has space.txt").exists());
    assert!(client.store.get("has space.txt").is_none());

    client.stop().await;
    server.stop().await;
    Ok(())
}
