//! Command-line downloader built on the library.
//!
//! ```text
//! cargo run --example fetch -- <url> [file] [connections]
//! ```
//!
//! Renders a progress bar and cancels cleanly on Ctrl-C; an interrupted
//! run leaves its `.temp`/`.meta` files behind and resumes when invoked
//! again with the same arguments.

use braid::DownloaderBuilder;
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn filename_from(url: &str) -> String {
    url.split(['?', '#'])
        .next()
        .and_then(|base| base.rsplit('/').next())
        .filter(|name| !name.is_empty())
        .unwrap_or("download.bin")
        .to_string()
}

#[tokio::main]
async fn main() {
    let mut args = std::env::args().skip(1);
    let Some(url) = args.next() else {
        eprintln!("usage: fetch <url> [file] [connections]");
        std::process::exit(2);
    };
    let file = args.next().unwrap_or_else(|| filename_from(&url));
    let connections: usize = args
        .next()
        .and_then(|value| value.parse().ok())
        .unwrap_or(4);

    let interrupted = Arc::new(AtomicBool::new(false));
    {
        let interrupted = Arc::clone(&interrupted);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                interrupted.store(true, Ordering::SeqCst);
            }
        });
    }

    let bar = ProgressBar::new(0);
    bar.set_style(
        ProgressStyle::with_template(
            "{bar:40.cyan/blue} {bytes}/{total_bytes} ({bytes_per_sec}, {eta})",
        )
        .expect("valid template"),
    );

    let progress = {
        let bar = bar.clone();
        let interrupted = Arc::clone(&interrupted);
        Box::new(move |total: i64, processed: i64| {
            if total > 0 {
                bar.set_length(total as u64);
            }
            bar.set_position(processed.max(0) as u64);
            !interrupted.load(Ordering::SeqCst)
        })
    };

    let downloader = DownloaderBuilder::new()
        .connections(connections)
        .timeout(Duration::from_secs(30))
        .build();

    match downloader.download(&url, &file, Some(progress)).await {
        Ok(()) => {
            bar.finish();
            println!("saved to {file}");
        }
        Err(e) => {
            bar.abandon();
            eprintln!("download failed: {e} (code {:#04x})", e.code());
            std::process::exit(1);
        }
    }
}
