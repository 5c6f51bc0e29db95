use anyhow::{Context, Result};
use clap::Parser;
use nav_core::{page, EngineOptions, LinkDisposition, NavigationEngine, ShellEvent};
use url::Url;

mod config;

#[derive(Parser, Debug)]
struct Args {
    /// Site origin to drive; overrides shell.toml and the environment.
    #[arg(long)]
    server_url: Option<String>,
    /// Hrefs to activate after the initial load, in order.
    paths: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().init();
    let args = Args::parse();

    let settings = config::load_settings();
    let server_url = args.server_url.unwrap_or(settings.server_url);
    let origin = Url::parse(&server_url)
        .with_context(|| format!("invalid server url '{server_url}'"))?;

    let engine = NavigationEngine::new(EngineOptions::new(origin), page::standard_registry());

    let mut events = engine.subscribe_events();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                ShellEvent::PreloadProgress { percent } => println!("preload {percent}%"),
                ShellEvent::PreloadCompleted => println!("preload complete"),
                ShellEvent::NavigationStarted { url } => println!("navigating to {url}"),
                ShellEvent::NavigationDropped { url } => {
                    println!("dropped {url}: a navigation is already in flight")
                }
                ShellEvent::ContentSwapped { template } => {
                    println!("content swapped to template '{template}'")
                }
                ShellEvent::NavigationSettled { template } => {
                    println!("settled on template '{template}'")
                }
                ShellEvent::NavigationFailed { url, reason } => {
                    println!("navigation to {url} failed: {reason}")
                }
            }
        }
    });

    engine.bootstrap("/").await?;
    println!("started on template '{}'", engine.current_template().await);

    for href in &args.paths {
        match engine.on_link_activated(href).await? {
            LinkDisposition::Intercepted => {}
            LinkDisposition::Browser => {
                println!("{href} is foreign; leaving it to the browser")
            }
        }
    }

    Ok(())
}
