use std::io::{Read, Write};
use std::net::{Ipv4Addr, TcpListener, TcpStream};
use std::thread;
use std::time::{Duration, Instant};

use nstcp::{AddressStructure, ShutdownMode, Tcp};
use socket2::{Domain, Type};

fn spawn_echo_server() -> (u16, thread::JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let handle = thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        let mut buf = [0u8; 64];
        loop {
            let n = stream.read(&mut buf).unwrap();
            if n == 0 {
                break;
            }
            stream.write_all(&buf[..n]).unwrap();
        }
    });
    (port, handle)
}

fn recv_exact(tcp: &mut Tcp, buf: &mut [u8]) {
    let mut got = 0;
    while got < buf.len() {
        let n = tcp.new_recv(&mut buf[got..]).unwrap();
        assert_ne!(n, 0, "peer closed early");
        got += n;
    }
}

#[test]
fn client_ping_scenario() {
    let (port, server) = spawn_echo_server();

    let mut tcp = Tcp::new().unwrap();
    tcp.connection.ip_address = "127.0.0.1".into();
    tcp.connection.port = port;

    tcp.get_sock(Domain::IPV4, Type::STREAM, None).unwrap();
    tcp.set_sockaddr(Domain::IPV4);
    let sa = tcp.connection.address.unwrap();
    assert_eq!(sa.port_be(), port.to_be());
    assert_eq!(&sa.to_bytes()[4..8], &[127, 0, 0, 1]);

    tcp.make_connect().unwrap();
    assert_eq!(tcp.new_send(b"PING").unwrap(), 4);
    let mut buf = [0u8; 4];
    recv_exact(&mut tcp, &mut buf);
    assert_eq!(&buf, b"PING");

    tcp.shutdown_sock(ShutdownMode::try_from(2).unwrap()).unwrap();
    tcp.close_sock().unwrap();
    assert!(tcp.connection.socket.is_none());
    server.join().unwrap();
}

#[test]
fn server_accept_scenario() {
    let mut tcp = Tcp::new().unwrap();
    tcp.connection.ip_address = "127.0.0.1".into();
    tcp.connection.port = 0;
    tcp.set_additionals(0, 5, 0, AddressStructure::LEN);

    tcp.get_sock(Domain::IPV4, Type::STREAM, None).unwrap();
    tcp.set_sockaddr(Domain::IPV4);
    tcp.set_bind().unwrap();
    tcp.set_listen().unwrap();
    tcp.get_sock_name().unwrap();
    let port = tcp.connection.address.unwrap().port();

    let client = thread::spawn(move || {
        let mut stream = TcpStream::connect((Ipv4Addr::LOCALHOST, port)).unwrap();
        let mut buf = [0u8; 5];
        stream.read_exact(&mut buf).unwrap();
        buf
    });

    let mut from_len = 0;
    let accepted = tcp.new_accept(&mut from_len).unwrap();
    assert_eq!(from_len, AddressStructure::LEN);
    assert_eq!(tcp.connection.address.unwrap().ip(), Ipv4Addr::LOCALHOST);

    let mut conn = Tcp::new().unwrap();
    assert!(conn.adopt(accepted).is_none());
    assert_eq!(conn.new_send(b"hello").unwrap(), 5);
    assert_eq!(&client.join().unwrap(), b"hello");

    tcp.clean_conn_info();
    tcp.clean_conn_info();
    assert_eq!(tcp.connection.queue_length, 0);
    assert_eq!(tcp.connection.ip_address, "127.0.0.1");
}

#[test]
fn no_wait_client_scenario() {
    let (port, server) = spawn_echo_server();
    let deadline = Instant::now() + Duration::from_secs(5);

    let mut tcp = Tcp::new().unwrap();
    tcp.connection.ip_address = "127.0.0.1".into();
    tcp.connection.port = port;
    tcp.set_additionals(0, 0, 42, AddressStructure::LEN);

    tcp.get_sock_nw(Domain::IPV4, Type::STREAM, None, 0).unwrap();
    tcp.set_sockaddr(Domain::IPV4);
    match tcp.make_connect_nw() {
        Ok(()) => {}
        Err(e) => assert!(e.is_would_block(), "{e}"),
    }

    let mut connected = false;
    while !connected && Instant::now() < deadline {
        let done = tcp.wait(Some(Duration::from_millis(500))).unwrap();
        connected = done.iter().any(|c| c.tag == 42 && c.writable);
    }
    assert!(connected);

    assert_eq!(tcp.new_send_nw(b"PING").unwrap(), 4);
    let mut buf = [0u8; 4];
    let mut got = 0;
    while got < buf.len() {
        assert!(Instant::now() < deadline, "no echo");
        match tcp.new_recv_nw(&mut buf[got..]) {
            Ok(n) => got += n,
            Err(e) if e.is_would_block() => {
                tcp.wait(Some(Duration::from_millis(500))).unwrap();
            }
            Err(e) => panic!("{e}"),
        }
    }
    assert_eq!(&buf, b"PING");

    tcp.connection.tag = 43;
    tcp.shutdown_sock_nw(ShutdownMode::Both).unwrap();
    assert_eq!(tcp.connection.shutdown_mode, ShutdownMode::Both);
    let done = tcp.wait(Some(Duration::ZERO)).unwrap();
    assert!(done.iter().any(|c| c.tag == 43));

    tcp.close_sock().unwrap();
    server.join().unwrap();
}

#[test]
fn record_is_reusable_after_cleanup() {
    let (port, server) = spawn_echo_server();

    let mut tcp = Tcp::new().unwrap();
    tcp.connection.ip_address = "127.0.0.1".into();
    tcp.connection.port = port;
    tcp.get_sock(Domain::IPV4, Type::STREAM, None).unwrap();
    tcp.set_sockaddr(Domain::IPV4);
    tcp.clean_conn_info();
    assert!(tcp.connection.socket.is_none());
    assert!(tcp.connection.address.is_none());

    tcp.get_sock(Domain::IPV4, Type::STREAM, None).unwrap();
    tcp.set_sockaddr(Domain::IPV4);
    tcp.make_connect().unwrap();
    tcp.new_send(b"ok").unwrap();
    let mut buf = [0u8; 2];
    recv_exact(&mut tcp, &mut buf);
    assert_eq!(&buf, b"ok");
    drop(tcp);
    server.join().unwrap();
}
