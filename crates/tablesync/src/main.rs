//! tablesync CLI
//!
//! Command-line tool for keeping a database schema in sync with declared
//! record types.

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tablesync::cli::run().await
}
