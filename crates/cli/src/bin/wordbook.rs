use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    wordbook_cli::main_entry().await
}
