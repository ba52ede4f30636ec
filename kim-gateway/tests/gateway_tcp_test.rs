//! 网关 TCP 链路集成测试
//!
//! 用桩 Session 服务驱动完整链路：登录握手 → 心跳 → 推送 → 关闭。

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use kim_gateway::event::GatewayEvent;
use kim_gateway::infrastructure::SessionApi;
use kim_gateway::transport::{TcpTransport, TransportConfig, TransportError};
use kim_im_core::protocol::{self, MsgType, Packet, MAX_BODY_SIZE};
use kim_proto::session::{AuthInfo, DeviceType, Session, SessionStatus};
use prost::Message;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::time::timeout;

/// 桩 Session 服务：登录直接放行并记录，删除调用记录在案
#[derive(Default)]
struct StubSession {
    logins: Mutex<Vec<u64>>,
    del_sessions: Mutex<Vec<(String, Vec<String>, String)>>,
    refreshes: Mutex<Vec<(String, String, i64)>>,
}

#[async_trait]
impl SessionApi for StubSession {
    async fn login(
        &self,
        payload: Vec<u8>,
        conn_id: u64,
        remote_addr: String,
        gateway_id: String,
    ) -> Result<Session> {
        let auth = AuthInfo::decode(payload.as_slice())?;
        self.logins.lock().unwrap().push(conn_id);
        Ok(Session {
            user_id: "u1".to_string(),
            device_id: auth.device_id,
            device_type: auth.device_type,
            gateway_id,
            conn_id,
            remote_addr,
            status: SessionStatus::Online as i32,
            login_at: 0,
            last_active_at: 0,
            expire_at: i64::MAX,
            meta: Default::default(),
        })
    }

    async fn del_session(
        &self,
        user_id: &str,
        device_ids: Vec<String>,
        reason: &str,
    ) -> Result<()> {
        self.del_sessions
            .lock()
            .unwrap()
            .push((user_id.to_string(), device_ids, reason.to_string()));
        Ok(())
    }

    async fn refresh_session_ttl(
        &self,
        user_id: &str,
        device_id: &str,
        last_active_at: i64,
    ) -> Result<()> {
        self.refreshes.lock().unwrap().push((
            user_id.to_string(),
            device_id.to_string(),
            last_active_at,
        ));
        Ok(())
    }
}

async fn start_transport() -> (Arc<TcpTransport>, Arc<StubSession>, SocketAddr) {
    start_transport_with(Duration::from_secs(60)).await
}

async fn start_transport_with(
    refresh_ttl_interval: Duration,
) -> (Arc<TcpTransport>, Arc<StubSession>, SocketAddr) {
    let session = Arc::new(StubSession::default());
    let session_api: Arc<dyn SessionApi> = session.clone();
    let transport = TcpTransport::new(
        TransportConfig {
            tcp_port: 0,
            refresh_ttl_interval,
            ..TransportConfig::default()
        },
        session_api.clone(),
    );
    transport.set_handler(Arc::new(GatewayEvent::new(session_api)));
    transport.start().await.unwrap();

    let mut addr = transport.local_addr().unwrap();
    addr.set_ip("127.0.0.1".parse().unwrap());
    (transport, session, addr)
}

fn login_frame(device_id: &str) -> Vec<u8> {
    let auth = AuthInfo {
        token: "stub-token".to_string(),
        device_id: device_id.to_string(),
        device_type: DeviceType::Mobile as i32,
        app_version: "1.0.0".to_string(),
        meta: Default::default(),
    };
    protocol::encode_packet(&Packet::new(MsgType::Login, auth.encode_to_vec())).unwrap()
}

async fn wait_for_conn_count(transport: &TcpTransport, expected: usize) {
    for _ in 0..200 {
        if transport.conn_count() == expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!(
        "connection count never reached {} (now {})",
        expected,
        transport.conn_count()
    );
}

async fn login(addr: SocketAddr, device_id: &str) -> TcpStream {
    let mut client = TcpStream::connect(addr).await.unwrap();
    client.write_all(&login_frame(device_id)).await.unwrap();
    client
}

#[tokio::test]
async fn test_login_registers_connection() {
    let (transport, session, addr) = start_transport().await;
    let _client = login(addr, "dev-a").await;

    wait_for_conn_count(&transport, 1).await;
    assert_eq!(session.logins.lock().unwrap().len(), 1);

    transport.stop().await;
}

#[tokio::test]
async fn test_ping_pong() {
    let (transport, _session, addr) = start_transport().await;
    let mut client = login(addr, "dev-a").await;
    wait_for_conn_count(&transport, 1).await;

    let ping = protocol::encode_packet(&Packet::new(MsgType::Ping, Vec::new())).unwrap();
    client.write_all(&ping).await.unwrap();

    let pong = timeout(Duration::from_secs(1), protocol::decode_packet(&mut client))
        .await
        .expect("no pong within deadline")
        .unwrap();
    assert_eq!(pong.msg_type, MsgType::Pong);
    assert!(pong.body.is_empty());

    transport.stop().await;
}

#[tokio::test]
async fn test_push_reaches_client_socket() {
    let (transport, session, addr) = start_transport().await;
    let mut client = login(addr, "dev-a").await;
    wait_for_conn_count(&transport, 1).await;

    let conn_id = *session.logins.lock().unwrap().first().unwrap();
    transport.send(conn_id, b"hello").await.unwrap();

    let packet = timeout(Duration::from_secs(1), protocol::decode_packet(&mut client))
        .await
        .expect("no push within deadline")
        .unwrap();
    assert_eq!(packet.msg_type, MsgType::Push);
    assert_eq!(packet.body, b"hello");

    transport.stop().await;
}

#[tokio::test]
async fn test_close_conn_deletes_session_and_closes_socket() {
    let (transport, session, addr) = start_transport().await;
    let mut client = login(addr, "dev-a").await;
    wait_for_conn_count(&transport, 1).await;

    let conn_id = *session.logins.lock().unwrap().first().unwrap();
    transport.close_conn(conn_id).await.unwrap();
    wait_for_conn_count(&transport, 0).await;

    // 断开路径触发 DelSession
    for _ in 0..200 {
        if !session.del_sessions.lock().unwrap().is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    let deleted = session.del_sessions.lock().unwrap();
    assert_eq!(deleted.len(), 1);
    assert_eq!(deleted[0].0, "u1");
    assert_eq!(deleted[0].1, vec!["dev-a".to_string()]);
    assert_eq!(deleted[0].2, "closed by server");
    drop(deleted);

    // 客户端读到连接关闭
    let eof = timeout(Duration::from_secs(1), protocol::decode_packet(&mut client))
        .await
        .expect("socket not closed");
    assert!(eof.is_err());

    // 再次关闭返回 not found
    assert!(matches!(
        transport.close_conn(conn_id).await,
        Err(TransportError::NotFound)
    ));

    transport.stop().await;
}

#[tokio::test]
async fn test_logout_frame_tears_down_connection() {
    let (transport, session, addr) = start_transport().await;
    let mut client = login(addr, "dev-a").await;
    wait_for_conn_count(&transport, 1).await;

    let logout = protocol::encode_packet(&Packet::new(MsgType::Logout, Vec::new())).unwrap();
    client.write_all(&logout).await.unwrap();

    wait_for_conn_count(&transport, 0).await;
    for _ in 0..200 {
        if !session.del_sessions.lock().unwrap().is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(session.del_sessions.lock().unwrap()[0].2, "logout");

    transport.stop().await;
}

#[tokio::test]
async fn test_first_frame_must_be_login() {
    let (transport, session, addr) = start_transport().await;

    let mut client = TcpStream::connect(addr).await.unwrap();
    let ping = protocol::encode_packet(&Packet::new(MsgType::Ping, Vec::new())).unwrap();
    client.write_all(&ping).await.unwrap();

    let eof = timeout(Duration::from_secs(1), protocol::decode_packet(&mut client))
        .await
        .expect("socket not closed");
    assert!(eof.is_err());
    assert_eq!(transport.conn_count(), 0);
    assert!(session.logins.lock().unwrap().is_empty());

    transport.stop().await;
}

#[tokio::test]
async fn test_oversized_frame_header_rejected() {
    let (transport, session, addr) = start_transport().await;

    let mut client = TcpStream::connect(addr).await.unwrap();
    // 头部声明 10MB + 1
    let mut header = Vec::new();
    header.extend_from_slice(&kim_im_core::protocol::MAGIC_NUMBER.to_be_bytes());
    header.push(1);
    header.push(MsgType::Login as u8);
    header.extend_from_slice(&((MAX_BODY_SIZE as u32) + 1).to_be_bytes());
    client.write_all(&header).await.unwrap();

    let eof = timeout(Duration::from_secs(2), protocol::decode_packet(&mut client))
        .await
        .expect("socket not closed");
    assert!(eof.is_err());
    // 没有任何会话被创建
    assert!(session.logins.lock().unwrap().is_empty());
    assert_eq!(transport.conn_count(), 0);

    transport.stop().await;
}

#[tokio::test]
async fn test_batch_send_failed_list_is_subset() {
    let (transport, session, addr) = start_transport().await;
    let _client_a = login(addr, "dev-a").await;
    let _client_b = login(addr, "dev-b").await;
    wait_for_conn_count(&transport, 2).await;

    let conn_ids: Vec<u64> = session.logins.lock().unwrap().clone();
    let mut targets = conn_ids.clone();
    targets.push(424_242);

    let failed = transport.batch_send(&targets, b"fanout").await.unwrap();
    assert_eq!(failed, vec![424_242]);

    transport.stop().await;
}

#[tokio::test]
async fn test_ttl_refresh_fires_for_held_connection() {
    // 1 秒刷新间隔；持有连接约 2.5 个间隔，应至少续期两次
    let (transport, session, addr) = start_transport_with(Duration::from_secs(1)).await;
    let _client = login(addr, "dev-a").await;
    wait_for_conn_count(&transport, 1).await;

    tokio::time::sleep(Duration::from_millis(2500)).await;

    let refreshes = session.refreshes.lock().unwrap();
    assert!(
        refreshes.len() >= 2,
        "expected at least 2 ttl refreshes, got {}",
        refreshes.len()
    );
    assert!(refreshes.iter().all(|(u, d, _)| u == "u1" && d == "dev-a"));
    drop(refreshes);

    transport.stop().await;
}
