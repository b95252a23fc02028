use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    atlas_cli::main_entry().await
}
