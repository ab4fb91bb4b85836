use clap::Parser;
use nstcp::{ShutdownMode, Tcp};
use socket2::{Domain, Type};

fn run_client_mode(args: Args) -> nstcp::Result<()> {
    let mut tcp = Tcp::new()?;
    tcp.connection.ip_address = args.addr.clone();
    tcp.connection.port = args.port;
    tcp.set_additionals(0, 0, 0, nstcp::AddressStructure::LEN);

    tcp.get_sock(Domain::IPV4, Type::STREAM, None)?;
    tcp.set_sockaddr(Domain::IPV4);
    tcp.make_connect()?;
    println!("Connected successfully to {}:{}", args.addr, args.port);

    let n = tcp.new_send(args.message.as_bytes())?;
    println!("Sent {n} bytes");

    let mut buf = vec![0u8; args.message.len()];
    let n = tcp.new_recv(&mut buf)?;
    println!("Received: {}", String::from_utf8_lossy(&buf[..n]));

    tcp.shutdown_sock(ShutdownMode::Both)?;
    tcp.close_sock()?;
    tcp.clean_conn_info();
    Ok(())
}

fn echo(mut conn: Tcp, size: usize) -> nstcp::Result<()> {
    let mut buf = vec![0u8; size];
    loop {
        let n = conn.new_recv(&mut buf)?;
        if n == 0 {
            println!("Socket close from remote party...");
            break;
        }
        let mut sent = 0;
        while sent < n {
            sent += conn.new_send(&buf[sent..n])?;
        }
    }
    conn.close_sock()
}

fn run_server_mode(args: Args) -> nstcp::Result<()> {
    let mut tcp = Tcp::new()?;
    tcp.connection.ip_address = args.addr.clone();
    tcp.connection.port = args.port;
    tcp.set_additionals(0, args.backlog, 0, nstcp::AddressStructure::LEN);

    tcp.get_sock(Domain::IPV4, Type::STREAM, None)?;
    tcp.set_sockaddr(Domain::IPV4);
    tcp.set_bind()?;
    tcp.set_listen()?;
    tcp.get_sock_name()?;
    if let Some(local) = tcp.connection.address {
        println!("Echo server listening on {}:{}", local.ip(), local.port());
    }

    loop {
        let mut from_len = 0;
        match tcp.new_accept(&mut from_len) {
            Ok(socket) => {
                if let Some(peer) = tcp.connection.address {
                    println!("Accepted connection from: {}:{}", peer.ip(), peer.port());
                }
                let mut conn = Tcp::new()?;
                conn.adopt(socket);
                let size = args.size;
                std::thread::spawn(move || {
                    if let Err(e) = echo(conn, size) {
                        tracing::warn!("Echo connection failed: {e}");
                    }
                });
            }
            Err(e) => println!("Failed to accept connection: {e}"),
        }
    }
}

fn main() -> nstcp::Result<()> {
    nstcp::logging::init();

    let args = Args::parse();
    if let Some(name) = args.process.as_deref() {
        nstcp::set_inet_process(name);
    }
    if args.client {
        run_client_mode(args)
    } else {
        run_server_mode(args)
    }
}

/// An echo server, or a one-shot echo client, driven through the operation table.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Run as client: send the message once and print the echo
    #[arg(short, long)]
    client: bool,
    /// The numeric address to listen on or connect to
    #[arg(short, long, default_value = "127.0.0.1")]
    addr: String,
    /// The port to listen on or connect to
    #[arg(short, long, default_value = "9000")]
    port: u16,
    /// The listen backlog
    #[arg(short, long, default_value = "5")]
    backlog: i32,
    /// The server read buffer size
    #[arg(short, long, default_value = "4096")]
    size: usize,
    /// The message the client sends
    #[arg(short, long, default_value = "PING")]
    message: String,
    /// The TCP/IP transport process to select, e.g. $ZTC0
    #[arg(long)]
    process: Option<String>,
}
