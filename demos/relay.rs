//! dnstap relay example
//!
//! Accepts dnstap producers on one socket and mirrors their frames to one or
//! more collectors (and optionally a capture file).
//!
//! Run with: cargo run --example relay INPUT OUTPUT... [--file PATH]
//!
//! Examples:
//!   cargo run --example relay /tmp/dnstap.sock 127.0.0.1:6000
//!   cargo run --example relay 0.0.0.0:5354 collector-a:6000 collector-b:6000
//!   cargo run --example relay unix:/tmp/dnstap.sock 127.0.0.1:6000 --file capture.fstrm
//!
//! Addresses containing `/` (or prefixed with `unix:`) are unix-domain sockets,
//! everything else is TCP `host:port`. Stop with Ctrl+C: the listener closes,
//! queued frames are flushed to every collector, then the relay exits.

use std::sync::Arc;
use std::time::Duration;

use dnstap_rs::input::{Input, SocketInput};
use dnstap_rs::output::{FileOutput, MirrorOutput, Output, OutputConfig, SocketOutput};
use dnstap_rs::{SocketAddress, TracingLogger};

fn print_usage() {
    eprintln!("Usage: relay INPUT OUTPUT... [--file PATH]");
    eprintln!();
    eprintln!("  INPUT   address to accept dnstap producers on");
    eprintln!("  OUTPUT  collector address; repeat to mirror to several collectors");
    eprintln!("  --file  also write every frame to a Frame Streams file");
}

struct Args {
    input: SocketAddress,
    outputs: Vec<SocketAddress>,
    file: Option<String>,
}

fn parse_args() -> Result<Args, Box<dyn std::error::Error>> {
    let mut args = std::env::args().skip(1);
    let mut addresses = Vec::new();
    let mut file = None;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--file" => file = Some(args.next().ok_or("--file needs a path")?),
            _ => addresses.push(arg.parse::<SocketAddress>()?),
        }
    }

    if addresses.is_empty() {
        return Err("missing input address".into());
    }
    if addresses.len() < 2 && file.is_none() {
        return Err("need an input and at least one output".into());
    }
    let input = addresses.remove(0);
    Ok(Args {
        input,
        outputs: addresses,
        file,
    })
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let argv: Vec<String> = std::env::args().collect();
    if argv.len() < 2 || argv.iter().any(|a| a == "--help" || a == "-h") {
        print_usage();
        return Ok(());
    }

    let args = match parse_args() {
        Ok(args) => args,
        Err(e) => {
            eprintln!("Error: {}", e);
            eprintln!();
            print_usage();
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("dnstap_rs=info".parse()?)
                .add_directive("relay=info".parse()?),
        )
        .init();

    let config = OutputConfig::default()
        .flush_timeout(Duration::from_secs(1))
        .retry_interval(Duration::from_secs(5));

    let mut mirror = MirrorOutput::new();
    for address in &args.outputs {
        let output = SocketOutput::with_config(address.clone(), config.clone());
        output.set_logger(Arc::new(TracingLogger::new("output")));
        mirror.add(Arc::new(output));
        println!("Forwarding to {}", address);
    }
    if let Some(ref path) = args.file {
        let output = FileOutput::create(path).await?;
        output.set_logger(Arc::new(TracingLogger::new("file")));
        mirror.add(Arc::new(output));
        println!("Capturing to {}", path);
    }
    let mirror = Arc::new(mirror);

    let input = Arc::new(SocketInput::bind(&args.input).await?);
    input.set_logger(Arc::new(TracingLogger::new("input")));
    println!("Accepting dnstap producers on {}", args.input);

    let mut loops = Vec::new();
    {
        let mirror = Arc::clone(&mirror);
        loops.push(tokio::spawn(async move { mirror.run_output_loop().await }));
    }
    let reader = {
        let input = Arc::clone(&input);
        let sender = mirror.output_channel();
        tokio::spawn(async move { input.read_into(sender).await })
    };

    // The mirror does not start its outputs' loops
    for output in mirror.outputs() {
        let output = Arc::clone(output);
        loops.push(tokio::spawn(async move { output.run_output_loop().await }));
    }

    tokio::signal::ctrl_c().await?;
    println!("Shutting down...");

    input.close();
    input.wait().await;
    reader.await?;

    mirror.close().await;
    for handle in loops {
        handle.await?;
    }
    println!(
        "Done ({} frames dropped by slow outputs)",
        mirror.dropped_total()
    );
    Ok(())
}
