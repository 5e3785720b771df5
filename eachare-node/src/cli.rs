//! Interactive menu on stdin. Output is plain text on stdout.

use std::sync::Arc;

use anyhow::Context;
use eachare_core::{FileCatalog, TransferStats};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, Lines};

use crate::download;
use crate::gossip;
use crate::node::Node;
use crate::shared;

const MENU: &str = "\
Choose a command:
    [1] List peers
    [2] Get peers
    [3] List local files
    [4] Search files
    [5] Show statistics
    [6] Change chunk size
    [9] Exit
>";

/// Read commands until Exit or end of input. Exit says BYE to every ONLINE peer.
pub async fn run<R>(node: Arc<Node>, input: R) -> anyhow::Result<()>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = input.lines();
    loop {
        println!("{MENU}");
        let Some(choice) = lines.next_line().await.context("reading stdin")? else {
            return Ok(());
        };
        match choice.trim() {
            "1" => list_peers(&node, &mut lines).await?,
            "2" => {
                let answered = gossip::get_peers(&node).await;
                println!("{answered} peer(s) answered; {} known", node.peers().len());
            }
            "3" => list_local_files(&node).await?,
            "4" => search(&node, &mut lines).await?,
            "5" => print!("{}", render_stats(&node.stats())),
            "6" => change_chunk_size(&node, &mut lines).await?,
            "9" => {
                println!("Leaving...");
                gossip::bye(&node).await;
                return Ok(());
            }
            "" => {}
            other => println!("Unknown command {other:?}"),
        }
    }
}

/// Print `prompt` and read one trimmed line. `None` at end of input.
async fn ask<R>(lines: &mut Lines<R>, prompt: &str) -> anyhow::Result<Option<String>>
where
    R: AsyncBufRead + Unpin,
{
    println!("{prompt}");
    let line = lines.next_line().await.context("reading stdin")?;
    Ok(line.map(|l| l.trim().to_string()))
}

async fn list_peers<R>(node: &Node, lines: &mut Lines<R>) -> anyhow::Result<()>
where
    R: AsyncBufRead + Unpin,
{
    let peers = node.peers().get_all();
    println!("Known peers:");
    println!("    [0] back");
    for (i, p) in peers.iter().enumerate() {
        println!("    [{}] {} {} (clock: {})", i + 1, p.address, p.status, p.clock);
    }
    let Some(answer) = ask(lines, ">").await? else {
        return Ok(());
    };
    let Ok(choice) = answer.parse::<usize>() else {
        println!("Invalid choice {answer:?}");
        return Ok(());
    };
    if choice == 0 {
        return Ok(());
    }
    match peers.get(choice - 1) {
        Some(peer) => match gossip::hello(node, &peer.address).await {
            Ok(()) => println!("HELLO sent to {}", peer.address),
            Err(e) => println!("HELLO to {} failed: {e}", peer.address),
        },
        None => println!("Invalid choice {choice}"),
    }
    Ok(())
}

async fn list_local_files(node: &Node) -> anyhow::Result<()> {
    let files = shared::list(node.shared_dir())
        .await
        .context("listing shared directory")?;
    if files.is_empty() {
        println!("No shared files in {}", node.shared_dir().display());
    }
    for f in files {
        println!("    {} ({} bytes)", f.name, f.size);
    }
    Ok(())
}

async fn search<R>(node: &Arc<Node>, lines: &mut Lines<R>) -> anyhow::Result<()>
where
    R: AsyncBufRead + Unpin,
{
    let catalog = gossip::search(node).await;
    print!("{}", render_catalog(&catalog));
    let Some(answer) = ask(lines, "Type the number of the file to download:\n>").await? else {
        return Ok(());
    };
    let Ok(choice) = answer.parse::<usize>() else {
        println!("Invalid choice {answer:?}");
        return Ok(());
    };
    if choice == 0 {
        return Ok(());
    }
    let Some(file) = catalog.get(choice - 1) else {
        println!("Invalid choice {choice}");
        return Ok(());
    };
    println!("Downloading {}...", file.name);
    match download::download(node, file, node.chunk_size()).await {
        Ok(report) => println!(
            "Download of {} finished: {} chunk(s) in {:.3}s",
            report.path.display(),
            report.chunks,
            report.elapsed.as_secs_f64()
        ),
        Err(e) => println!("Download of {} failed: {e}", file.name),
    }
    Ok(())
}

async fn change_chunk_size<R>(node: &Node, lines: &mut Lines<R>) -> anyhow::Result<()>
where
    R: AsyncBufRead + Unpin,
{
    let Some(answer) = ask(lines, "New chunk size (bytes):\n>").await? else {
        return Ok(());
    };
    match answer.parse::<u64>() {
        Ok(size) if size > 0 => {
            node.set_chunk_size(size);
            println!("Chunk size set to {size}");
        }
        _ => println!("Chunk size must be a positive integer, got {answer:?}"),
    }
    Ok(())
}

fn render_catalog(catalog: &FileCatalog) -> String {
    let mut out = String::from("Files found on the network:\n");
    out.push_str(&format!("    {:<5}{:<30}{:>12}  {}\n", "", "Name", "Size", "Peers"));
    out.push_str(&format!("    {:<5}{:<30}{:>12}  {}\n", "[0]", "<cancel>", "", ""));
    for (i, f) in catalog.files().iter().enumerate() {
        out.push_str(&format!(
            "    {:<5}{:<30}{:>12}  {}\n",
            format!("[{}]", i + 1),
            f.name,
            f.size,
            f.origins.join(", ")
        ));
    }
    out
}

fn render_stats(stats: &TransferStats) -> String {
    if stats.is_empty() {
        return "No downloads yet.\n".to_string();
    }
    let mut out = format!(
        "{:>10} | {:>7} | {:>12} | {:>3} | {:>10} | {:>10}\n",
        "Chunk", "N peers", "File size", "N", "Mean (s)", "Std dev (s)"
    );
    for s in stats.buckets() {
        out.push_str(&format!(
            "{:>10} | {:>7} | {:>12} | {:>3} | {:>10.5} | {:>10.5}\n",
            s.key.chunk_size,
            s.key.origin_count,
            s.key.file_size,
            s.durations.len(),
            s.mean_secs(),
            s.std_dev_secs()
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::Settings;
    use eachare_core::StatKey;
    use std::time::Duration;

    fn node() -> Arc<Node> {
        Arc::new(Node::new("127.0.0.1:9000", std::env::temp_dir(), Settings::default()))
    }

    #[tokio::test]
    async fn change_chunk_size_then_exit() {
        let n = node();
        run(n.clone(), &b"6\n512\n9\n"[..]).await.unwrap();
        assert_eq!(n.chunk_size(), 512);
    }

    #[tokio::test]
    async fn rejects_zero_chunk_size() {
        let n = node();
        run(n.clone(), &b"6\n0\n6\nabc\n"[..]).await.unwrap();
        assert_eq!(n.chunk_size(), eachare_core::DEFAULT_CHUNK_SIZE);
    }

    #[test]
    fn stats_table_has_one_row_per_bucket() {
        let mut stats = TransferStats::new();
        let key = StatKey {
            chunk_size: 256,
            origin_count: 2,
            file_size: 1000,
        };
        stats.record(key, Duration::from_millis(100));
        stats.record(key, Duration::from_millis(300));
        let table = render_stats(&stats);
        let rows: Vec<&str> = table.lines().collect();
        assert_eq!(rows.len(), 2);
        assert!(rows[1].contains("0.20000"));
        assert!(rows[1].contains("0.10000"));
    }

    #[test]
    fn catalog_lists_origins() {
        let mut catalog = FileCatalog::new();
        catalog.merge("a.txt", 5, "127.0.0.1:9001");
        catalog.merge("a.txt", 5, "127.0.0.1:9002");
        let text = render_catalog(&catalog);
        assert!(text.contains("[1]"));
        assert!(text.contains("127.0.0.1:9001, 127.0.0.1:9002"));
    }
}
