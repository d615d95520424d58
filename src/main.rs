// Copyright (C) 2026 Brian Johnson
//
// This program is free software; you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation; either version 2 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along
// with this program; if not, write to the Free Software Foundation, Inc.,
// 51 Franklin Street, Fifth Floor, Boston, MA 02110-1301 USA.

// YMODEM serial file transfer front-end
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use ymodem::{receive, send, BlockSize, Channel, Progress, SerialChannel, TermProgress, TransferFile};

#[derive(Parser)]
#[command(name = "ymodem")]
#[command(about = "YMODEM batch file transfer over a serial line", long_about = None)]
#[command(disable_help_subcommand = true)]
struct Cli {
    /// Serial port to use (e.g., /dev/ttyUSB0 or COM1)
    #[arg(short, long)]
    port: String,

    /// Message written to the line before the handshake begins
    #[arg(short, long)]
    message: Option<String>,

    /// Substring to wait for on the line before starting the transfer
    #[arg(short, long)]
    wait: Option<String>,

    /// Transfer block size (128 or 1024)
    #[arg(short, long, default_value = "128", value_parser = parse_block_size)]
    block_size: BlockSize,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Send files over the serial line
    Send {
        /// Files to send
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Receive a file from the serial line
    Receive {
        /// Directory to save the received file
        #[arg(short, long, default_value = ".")]
        output_dir: PathBuf,
    },
}

fn parse_block_size(value: &str) -> Result<BlockSize, String> {
    match value {
        "128" => Ok(BlockSize::Standard),
        "1024" => Ok(BlockSize::Extended),
        _ => Err(format!(
            "invalid block size value: {}. Must be 128 or 1024",
            value
        )),
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    let mut channel = SerialChannel::open(&cli.port)
        .with_context(|| format!("failed to open serial port {}", cli.port))?;

    match cli.command {
        Commands::Send { files } => {
            if let Some(message) = &cli.message {
                channel.write_all(format!("{}\n", message).as_bytes())?;
            }
            // Let the line settle before the handshake.
            thread::sleep(Duration::from_secs(2));
            if let Some(token) = &cli.wait {
                wait_for(&mut channel, token)?;
            }

            let transfers = load_files(&files)?;
            let mut progress = TermProgress::new();
            let outcome = send(
                Box::new(channel),
                Some(&mut progress),
                cli.block_size,
                transfers,
            );
            progress.shutdown();
            outcome?;
            println!("sent successfully");
        }
        Commands::Receive { output_dir } => {
            if let Some(message) = &cli.message {
                channel.write_all(format!("{}\r\n", message).as_bytes())?;
            }
            if let Some(token) = &cli.wait {
                wait_for(&mut channel, token)?;
            }

            let file = receive(Box::new(channel))?;
            let target = output_dir.join(local_name(&file.name));
            std::fs::write(&target, &file.data)
                .with_context(|| format!("failed to write {}", target.display()))?;
            println!("{} write successful", target.display());
        }
    }

    Ok(())
}

/// Read the line until the accumulated text contains `token`.
fn wait_for(channel: &mut dyn Channel, token: &str) -> Result<()> {
    info!(token, "waiting for peer");
    let mut seen = String::new();
    let mut buf = [0u8; 64];
    loop {
        let n = channel.read(&mut buf)?;
        if n == 0 {
            bail!("channel closed while waiting for {:?}", token);
        }
        seen.push_str(&String::from_utf8_lossy(&buf[..n]));
        if seen.contains(token) {
            return Ok(());
        }
    }
}

fn load_files(paths: &[PathBuf]) -> Result<Vec<TransferFile>> {
    let mut transfers = Vec::with_capacity(paths.len());
    for path in paths {
        let data = std::fs::read(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .with_context(|| format!("invalid file name {}", path.display()))?
            .to_string();
        transfers.push(TransferFile { name, data });
    }
    Ok(transfers)
}

/// Keep only the final path component of the transmitted name.
fn local_name(name: &str) -> &str {
    Path::new(name)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("received.bin")
}
