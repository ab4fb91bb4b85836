use clap::Parser;
use nstcp::{ShutdownMode, Tcp};
use socket2::{Domain, Type};
use std::time::{Duration, Instant};

fn await_tag(tcp: &mut Tcp, tag: i64, deadline: Instant) -> nstcp::Result<bool> {
    loop {
        let left = deadline.saturating_duration_since(Instant::now());
        if left.is_zero() {
            return Ok(false);
        }
        if tcp.wait(Some(left))?.iter().any(|c| c.tag == tag) {
            return Ok(true);
        }
    }
}

fn run_no_wait(args: &Args) -> nstcp::Result<()> {
    let deadline = Instant::now() + Duration::from_millis(args.timeout);
    let mut tcp = Tcp::new()?;
    tcp.connection.ip_address = args.addr.clone();
    tcp.connection.port = args.port;
    tcp.set_additionals(0, 0, args.tag, nstcp::AddressStructure::LEN);

    tcp.get_sock_nw(Domain::IPV4, Type::STREAM, None, 0)?;
    tcp.set_sockaddr(Domain::IPV4);
    let start = Instant::now();
    match tcp.make_connect_nw() {
        Err(e) if e.is_would_block() => {}
        other => other?,
    }
    if !await_tag(&mut tcp, args.tag, deadline)? {
        println!("No completion for tag {} within {} ms", args.tag, args.timeout);
        return Ok(());
    }
    println!("Connect completed for tag {} in {:?}", args.tag, start.elapsed());

    if let Some(msg) = args.send.as_deref() {
        let n = tcp.new_send_nw(msg.as_bytes())?;
        println!("Sent {n} bytes");
        let mut buf = vec![0u8; msg.len()];
        let n = loop {
            match tcp.new_recv_nw(&mut buf) {
                Ok(n) => break n,
                Err(e) if e.is_would_block() => {
                    if !await_tag(&mut tcp, args.tag, deadline)? {
                        println!("No reply within {} ms", args.timeout);
                        return Ok(());
                    }
                }
                Err(e) => return Err(e),
            }
        };
        println!("Received: {}", String::from_utf8_lossy(&buf[..n]));
    }

    tcp.shutdown_sock_nw(ShutdownMode::Both)?;
    tcp.close_sock()
}

fn main() -> nstcp::Result<()> {
    nstcp::logging::init();

    let args = Args::parse();
    run_no_wait(&args)
}

/// Drives a connection through no-wait calls and reports their completions.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// The numeric address to connect to
    #[arg(short, long)]
    addr: String,
    /// The port to connect to
    #[arg(short, long)]
    port: u16,
    /// The correlation tag to issue the calls with
    #[arg(short, long, default_value = "1")]
    tag: i64,
    /// Send this message after connecting and wait for its echo
    #[arg(short, long)]
    send: Option<String>,
    /// How long to wait for completions, in milliseconds
    #[arg(long, default_value = "5000")]
    timeout: u64,
}
