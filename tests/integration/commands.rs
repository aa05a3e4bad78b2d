use std::time::Duration;

use cumulus_core::Command;

use crate::*;

#[tokio::test]
async fn server_update_makes_client_resend() -> Result<()> {
    let server = start_server(CHUNK_SIZE)?;
    let client = start_client(server.addr, CHUNK_SIZE)?;

    let data = pattern(2 * CHUNK_SIZE + 5);
    std::fs::write(client.path("doc.md"), &data)?;
    let target = server.path("doc.md");
    wait_until(Duration::from_secs(5), || has_content(&target, &data)).await?;
    wait_until(Duration::from_secs(2), || synced(&client, "doc.md")).await?;

    // The scanner sees no change, so only UPDATE can bring the copy back.
    std::fs::remove_file(&target)?;
    server
        .sender
        .send_command(client.addr, &Command::update("doc.md")?)
        .await?;
    wait_until(Duration::from_secs(5), || has_content(&target, &data)).await?;

    client.stop().await;
    server.stop().await;
    Ok(())
}

#[tokio::test]
async fn server_delete_removes_client_copy() -> Result<()> {
    let server = start_server(CHUNK_SIZE)?;
    let client = start_client(server.addr, CHUNK_SIZE)?;

    std::fs::write(client.path("stale.csv"), b"a,b,c")?;
    let target = server.path("stale.csv");
    wait_until(Duration::from_secs(5), || has_content(&target, b"a,b,c")).await?;

    server
        .sender
        .send_command(client.addr, &Command::delete("stale.csv")?)
        .await?;

    let local = client.path("stale.csv");
    wait_until(Duration::from_secs(5), || !local.exists()).await?;
    wait_until(Duration::from_secs(2), || client.store.get("stale.csv").is_none()).await?;
    // The local delete event is echoed back to the server.
    wait_until(Duration::from_secs(5), || !target.exists()).await?;

    client.stop().await;
    server.stop().await;
    Ok(())
}

#[tokio::test]
async fn repeated_delete_is_harmless() -> Result<()> {
    let server = start_server(CHUNK_SIZE)?;
    let client = start_client(server.addr, CHUNK_SIZE)?;

    let delete = Command::delete("never-existed.txt")?;
    server.sender.send_command(client.addr, &delete).await?;
    server.sender.send_command(client.addr, &delete).await?;

    // Client keeps serving afterwards.
    std::fs::write(client.path("after.txt"), b"still here")?;
    let target = server.path("after.txt");
    wait_until(Duration::from_secs(5), || has_content(&target, b"still here")).await?;

    client.stop().await;
    server.stop().await;
    Ok(())
}
