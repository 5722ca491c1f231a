//! Debug mirror target: prints everything peers send to stdout.

use anyhow::{Context, Result};
use clap::Parser;
use tokio::net::TcpListener;

use scatter::cli::SinkOpts;

fn main() -> Result<()> {
    let opts = SinkOpts::parse();
    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to build tokio runtime")?;
    rt.block_on(serve(opts.port))
}

async fn serve(port: u16) -> Result<()> {
    let listener = TcpListener::bind(("0.0.0.0", port))
        .await
        .with_context(|| format!("bind port {}", port))?;
    loop {
        let (mut stream, peer) = match listener.accept().await {
            Ok(conn) => conn,
            Err(_) => break,
        };
        tokio::spawn(async move {
            println!("connect from {}", peer);
            let mut out = tokio::io::stdout();
            let _ = tokio::io::copy(&mut stream, &mut out).await;
            println!("\ndisconnect from {}", peer);
        });
    }
    Ok(())
}
