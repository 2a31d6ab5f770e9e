use adb_server::{build_router, run_session, SingleDeviceManager};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;

async fn spawn_server() -> (std::net::SocketAddr, CancellationToken) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = CancellationToken::new();
    let device_manager = Arc::new(SingleDeviceManager::new("emulator-5554"));
    let filesystem = Arc::new(adb_server::fs::LocalFileSystem::new());
    let router = Arc::new(build_router(filesystem));

    let loop_shutdown = shutdown.clone();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = loop_shutdown.cancelled() => break,
                accepted = listener.accept() => {
                    let Ok((stream, _)) = accepted else { continue };
                    tokio::spawn(run_session(
                        stream,
                        router.clone(),
                        loop_shutdown.clone(),
                        device_manager.clone(),
                    ));
                }
            }
        }
    });

    (addr, shutdown)
}

fn encode_request(payload: &str) -> Vec<u8> {
    let mut out = format!("{:04x}", payload.len()).into_bytes();
    out.extend_from_slice(payload.as_bytes());
    out
}

#[tokio::test]
async fn test_scenario_version() {
    let (addr, _shutdown) = spawn_server().await;
    let mut client = TcpStream::connect(addr).await.unwrap();
    client
        .write_all(&encode_request("host:version"))
        .await
        .unwrap();

    let mut buf = [0u8; 8];
    client.read_exact(&mut buf).await.unwrap();
    assert_eq!(&buf, b"OKAY0029");
}

#[tokio::test]
async fn test_scenario_shell_raw() {
    let (addr, _shutdown) = spawn_server().await;
    let mut client = TcpStream::connect(addr).await.unwrap();
    client
        .write_all(&encode_request("shell:echo hello"))
        .await
        .unwrap();

    let mut buf = [0u8; 4];
    client.read_exact(&mut buf).await.unwrap();
    assert_eq!(&buf, b"OKAY");

    let mut rest = Vec::new();
    client.read_to_end(&mut rest).await.unwrap();
    assert_eq!(rest, b"hello\n");
}

#[tokio::test]
async fn test_scenario_shell_v2_separates_stdout_stderr() {
    let (addr, _shutdown) = spawn_server().await;
    let mut client = TcpStream::connect(addr).await.unwrap();
    client
        .write_all(&encode_request("shell,v2:echo hi; echo er >&2"))
        .await
        .unwrap();

    let mut buf = [0u8; 4];
    client.read_exact(&mut buf).await.unwrap();
    assert_eq!(&buf, b"OKAY");

    let mut packets = Vec::new();
    loop {
        let (id, data) = adb_server::codec::shell_packet::read_packet(&mut client)
            .await
            .unwrap();
        let is_exit = id == adb_server::codec::shell_packet::EXIT;
        packets.push((id, data));
        if is_exit {
            break;
        }
    }

    let stdout: Vec<u8> = packets
        .iter()
        .filter(|(id, _)| *id == adb_server::codec::shell_packet::STDOUT)
        .flat_map(|(_, d)| d.clone())
        .collect();
    let stderr: Vec<u8> = packets
        .iter()
        .filter(|(id, _)| *id == adb_server::codec::shell_packet::STDERR)
        .flat_map(|(_, d)| d.clone())
        .collect();

    assert_eq!(stdout, b"hi\n");
    assert_eq!(stderr, b"er\n");
    assert_eq!(packets.last().unwrap().1, vec![0u8]);
}

#[tokio::test]
async fn test_scenario_kill_refuses_new_connections() {
    let (addr, shutdown) = spawn_server().await;
    let mut client = TcpStream::connect(addr).await.unwrap();
    client
        .write_all(&encode_request("host:kill"))
        .await
        .unwrap();

    let mut buf = [0u8; 4];
    client.read_exact(&mut buf).await.unwrap();
    assert_eq!(&buf, b"OKAY");

    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    assert!(shutdown.is_cancelled());
    assert!(TcpStream::connect(addr).await.is_err());
}

#[tokio::test]
async fn test_scenario_unknown_service_fails() {
    let (addr, _shutdown) = spawn_server().await;
    let mut client = TcpStream::connect(addr).await.unwrap();
    client.write_all(&encode_request("host:foo")).await.unwrap();

    let mut buf = [0u8; 8];
    client.read_exact(&mut buf).await.unwrap();
    assert_eq!(&buf[0..4], b"FAIL");
    let len = usize::from_str_radix(std::str::from_utf8(&buf[4..8]).unwrap(), 16).unwrap();
    let mut msg = vec![0u8; len];
    client.read_exact(&mut msg).await.unwrap();
    assert_eq!(msg, b"unsupported operation");
}
