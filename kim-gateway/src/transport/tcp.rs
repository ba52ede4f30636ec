//! TCP 反应器
//!
//! 接入路径：多个 accept 工作者共享监听套接字；新连接在独立任务里
//! 完成登录握手（10 秒首帧超时，首帧必须是 Login），鉴权通过后拆分
//! 读写半部，reader 任务独占读方向，逐帧解码分发。帧分发并发度由
//! `num_workers` 信号量约束（0 表示 2 * CPU 核心数）。
//!
//! 生命周期：心跳扫描器按 10 秒节奏驱逐空闲连接；时间轮按刷新间隔
//! 对每条连接续期 Session TTL。关闭信号经 watch 通道扇出到
//! accept / reader / 扫描 / 时间轮各任务。

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use anyhow::{Result, bail};
use dashmap::DashMap;
use kim_im_core::protocol::{self, MsgType, Packet, ProtocolError};
use tokio::io::BufReader;
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Semaphore, watch};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use super::conn_pool::ConnPool;
use super::connection::{Connection, PlatformType, now_millis};
use super::id_generator::IdGenerator;
use super::time_wheel::TimeWheel;
use super::EventHandler;
use crate::infrastructure::SessionApi;

/// 登录帧读取超时
const LOGIN_READ_TIMEOUT: Duration = Duration::from_secs(10);
/// Session.Login RPC 超时
const LOGIN_RPC_TIMEOUT: Duration = Duration::from_secs(5);
/// 心跳扫描周期
const HEARTBEAT_CHECK_INTERVAL: Duration = Duration::from_secs(10);
/// 单轮 TTL 续期扇出的总预算
const REFRESH_BATCH_TIMEOUT: Duration = Duration::from_secs(50);
/// TCP keepalive 周期
const TCP_KEEPALIVE_PERIOD: Duration = Duration::from_secs(30);

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("connection not found")]
    NotFound,
    #[error("transport already stopped")]
    Stopped,
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error("write to connection failed: {0}")]
    Io(#[from] std::io::Error),
}

/// 传输层配置
#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub tcp_port: u16,
    pub gateway_id: String,
    pub heartbeat_timeout: Duration,
    pub refresh_ttl_interval: Duration,
    /// 帧分发并发度，0 表示 2 * CPU 核心数
    pub num_workers: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            tcp_port: 8080,
            gateway_id: "gateway-1".to_string(),
            heartbeat_timeout: Duration::from_secs(180),
            refresh_ttl_interval: Duration::from_secs(60),
            num_workers: 0,
        }
    }
}

pub struct TcpTransport {
    config: TransportConfig,
    pool: ConnPool,
    wheel: TimeWheel,
    id_generator: IdGenerator,
    session_client: Arc<dyn SessionApi>,
    handler: OnceLock<Arc<dyn EventHandler>>,
    /// 反应器注册表：conn_id -> reader 任务
    readers: DashMap<u64, JoinHandle<()>>,
    dispatch_permits: Arc<Semaphore>,
    local_addr: OnceLock<std::net::SocketAddr>,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
    stopped: AtomicBool,
}

fn logical_cpus() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

impl TcpTransport {
    pub fn new(config: TransportConfig, session_client: Arc<dyn SessionApi>) -> Arc<Self> {
        let permits = if config.num_workers == 0 {
            2 * logical_cpus()
        } else {
            config.num_workers
        };
        let wheel = TimeWheel::new(config.refresh_ttl_interval, 0);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        Arc::new(Self {
            config,
            pool: ConnPool::new(),
            wheel,
            id_generator: IdGenerator::new(),
            session_client,
            handler: OnceLock::new(),
            readers: DashMap::new(),
            dispatch_permits: Arc::new(Semaphore::new(permits)),
            local_addr: OnceLock::new(),
            shutdown_tx,
            shutdown_rx,
            stopped: AtomicBool::new(false),
        })
    }

    /// 设置事件回调，必须在 start 之前调用一次
    pub fn set_handler(&self, handler: Arc<dyn EventHandler>) {
        let _ = self.handler.set(handler);
    }

    /// 启动监听与后台任务
    pub async fn start(self: &Arc<Self>) -> Result<()> {
        if self.stopped.load(Ordering::Acquire) {
            bail!("transport already stopped");
        }

        let listener = TcpListener::bind(("0.0.0.0", self.config.tcp_port)).await?;
        let local_addr = listener.local_addr()?;
        let _ = self.local_addr.set(local_addr);
        let listener = Arc::new(listener);

        for worker_id in 0..logical_cpus() {
            let transport = self.clone();
            let listener = listener.clone();
            tokio::spawn(async move {
                transport.accept_loop(listener, worker_id).await;
            });
        }

        let transport = self.clone();
        tokio::spawn(async move {
            transport.heartbeat_loop().await;
        });

        let transport = self.clone();
        tokio::spawn(async move {
            transport.refresh_loop().await;
        });

        info!(
            addr = %local_addr,
            gateway_id = %self.config.gateway_id,
            "tcp transport started"
        );
        Ok(())
    }

    /// 停止传输层：扇出关闭信号，按连接池枚举顺序关闭所有连接。
    /// 只做套接字层面的关闭，会话由 TTL 过期兜底。
    pub async fn stop(&self) {
        if self.stopped.swap(true, Ordering::AcqRel) {
            return;
        }
        let _ = self.shutdown_tx.send(true);

        for conn in self.pool.get_all() {
            conn.mark_closed();
            conn.shutdown_writer().await;
            self.pool.remove(&conn);
        }
        self.readers.clear();

        info!("tcp transport stopped");
    }

    pub fn local_addr(&self) -> Option<std::net::SocketAddr> {
        self.local_addr.get().copied()
    }

    pub fn conn_count(&self) -> usize {
        self.pool.count()
    }

    async fn wait_shutdown(&self) {
        let mut rx = self.shutdown_rx.clone();
        loop {
            if *rx.borrow() {
                return;
            }
            if rx.changed().await.is_err() {
                return;
            }
        }
    }

    async fn accept_loop(self: Arc<Self>, listener: Arc<TcpListener>, worker_id: usize) {
        loop {
            tokio::select! {
                _ = self.wait_shutdown() => return,
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer_addr)) => {
                        if let Err(err) = configure_socket(&stream) {
                            warn!(error = %err, remote = %peer_addr, "configure socket failed");
                        }
                        // 握手在独立任务中进行，避免阻塞 accept
                        let transport = self.clone();
                        tokio::spawn(async move {
                            transport.handle_new_connection(stream, peer_addr).await;
                        });
                    }
                    Err(err) => {
                        if self.stopped.load(Ordering::Acquire) {
                            return;
                        }
                        warn!(error = %err, worker = worker_id, "accept error");
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                }
            }
        }
    }

    /// 登录握手：首帧必须是 Login，鉴权通过后连接才进入反应器
    async fn handle_new_connection(
        self: Arc<Self>,
        mut stream: TcpStream,
        peer_addr: std::net::SocketAddr,
    ) {
        let packet = match timeout(LOGIN_READ_TIMEOUT, protocol::decode_packet(&mut stream)).await
        {
            Ok(Ok(packet)) => packet,
            Ok(Err(err)) => {
                warn!(error = %err, remote = %peer_addr, "decode login packet failed");
                return;
            }
            Err(_) => {
                warn!(remote = %peer_addr, "login packet read timed out");
                return;
            }
        };

        if packet.msg_type != MsgType::Login {
            warn!(msg_type = ?packet.msg_type, remote = %peer_addr, "first packet must be login");
            return;
        }

        let conn_id = self.id_generator.next_id();

        let session = match timeout(
            LOGIN_RPC_TIMEOUT,
            self.session_client.login(
                packet.body,
                conn_id,
                peer_addr.to_string(),
                self.config.gateway_id.clone(),
            ),
        )
        .await
        {
            Ok(Ok(session)) => session,
            Ok(Err(err)) => {
                warn!(error = %err, remote = %peer_addr, "session login failed");
                return;
            }
            Err(_) => {
                warn!(remote = %peer_addr, "session login timed out");
                return;
            }
        };

        // 会话回显的 conn_id 必须与请求一致
        if session.conn_id != conn_id {
            error!(
                expected = conn_id,
                actual = session.conn_id,
                "mismatched conn id in session data"
            );
            return;
        }

        let (read_half, write_half) = stream.into_split();
        let conn = Arc::new(Connection::new(
            conn_id,
            session.user_id.clone(),
            session.device_id.clone(),
            PlatformType::from(session.device_type),
            peer_addr,
            session.expire_at,
            write_half,
        ));

        self.pool.add(conn.clone());

        // 注册进反应器；传输层已停止时回滚连接池插入
        if self.stopped.load(Ordering::Acquire) {
            self.pool.remove(&conn);
            conn.mark_closed();
            return;
        }
        let reader = {
            let transport = self.clone();
            let conn = conn.clone();
            tokio::spawn(async move {
                transport.read_loop(conn, read_half).await;
            })
        };
        self.readers.insert(conn_id, reader);

        self.wheel.add(conn.clone());

        if let Some(handler) = self.handler.get() {
            if let Err(err) = handler.on_connect(&conn).await {
                warn!(error = %err, conn_id, "onConnect handler failed");
            }
        }

        info!(
            user_id = %session.user_id,
            device_id = %session.device_id,
            conn_id,
            remote = %peer_addr,
            "new connection established"
        );
    }

    /// reader 任务：独占读方向，每次唤醒恰好解码一帧再分发
    async fn read_loop(self: Arc<Self>, conn: Arc<Connection>, read_half: OwnedReadHalf) {
        let mut reader = BufReader::new(read_half);
        loop {
            tokio::select! {
                _ = conn.closed() => return,
                _ = self.wait_shutdown() => return,
                result = protocol::decode_packet(&mut reader) => match result {
                    Ok(packet) => {
                        if !self.dispatch(&conn, packet).await {
                            return;
                        }
                    }
                    Err(err) => {
                        let reason = match &err {
                            ProtocolError::Io(_) => "read error".to_string(),
                            other => other.to_string(),
                        };
                        debug!(error = %err, conn_id = conn.id(), "read packet failed");
                        self.handle_disconnect(&conn, &reason).await;
                        return;
                    }
                }
            }
        }
    }

    /// 按消息类型分发一帧；返回 false 表示连接结束
    async fn dispatch(&self, conn: &Arc<Connection>, packet: Packet) -> bool {
        let Ok(_permit) = self.dispatch_permits.acquire().await else {
            return false;
        };

        conn.touch();

        match packet.msg_type {
            MsgType::Ping => {
                self.send_pong(conn).await;
                true
            }
            MsgType::Logout => {
                self.handle_disconnect(conn, "logout").await;
                false
            }
            MsgType::Upstream => {
                if let Some(handler) = self.handler.get() {
                    if let Err(err) = handler.on_message(conn, &packet.body).await {
                        warn!(error = %err, conn_id = conn.id(), "onMessage handler failed");
                    }
                }
                true
            }
            other => {
                // Push/Ack 等类型不应出现在上行方向，记录后丢弃
                warn!(msg_type = ?other, conn_id = conn.id(), "unexpected msg type, ignored");
                true
            }
        }
    }

    async fn send_pong(&self, conn: &Arc<Connection>) {
        let pong = Packet::new(MsgType::Pong, Vec::new());
        if let Err(err) = conn.write_packet(&pong).await {
            warn!(error = %err, conn_id = conn.id(), "send pong failed");
            return;
        }

        conn.touch();

        if let Some(handler) = self.handler.get() {
            handler.on_heartbeat(conn).await;
        }
    }

    /// 完整断开路径：时间轮 → 反应器注册表 → 连接池 → 套接字 → 上层回调
    async fn handle_disconnect(&self, conn: &Arc<Connection>, reason: &str) {
        if !conn.mark_closed() {
            return;
        }

        self.wheel.remove(conn.id());
        self.readers.remove(&conn.id());
        self.pool.remove(conn);
        conn.shutdown_writer().await;

        if let Some(handler) = self.handler.get() {
            handler.on_disconnect(conn, reason).await;
        }

        info!(
            conn_id = conn.id(),
            user_id = %conn.user_id(),
            reason = %reason,
            "connection closed"
        );
    }

    async fn heartbeat_loop(self: Arc<Self>) {
        let mut ticker = tokio::time::interval(HEARTBEAT_CHECK_INTERVAL);
        loop {
            tokio::select! {
                _ = self.wait_shutdown() => return,
                _ = ticker.tick() => self.sweep_idle_connections().await,
            }
        }
    }

    /// 驱逐超过心跳超时仍无活跃的连接
    async fn sweep_idle_connections(&self) {
        let timeout_ms = self.config.heartbeat_timeout.as_millis() as i64;
        let now = now_millis();

        for conn in self.pool.get_all() {
            if now - conn.last_active_millis() > timeout_ms {
                if let Some(handler) = self.handler.get() {
                    handler.on_heartbeat_timeout(&conn).await;
                }
                self.handle_disconnect(&conn, "heartbeat timeout").await;
            }
        }
    }

    async fn refresh_loop(self: Arc<Self>) {
        let mut ticker = tokio::time::interval(self.wheel.slot_interval());
        loop {
            tokio::select! {
                _ = self.wait_shutdown() => return,
                _ = ticker.tick() => {
                    let due = self.wheel.advance();
                    if due.is_empty() {
                        continue;
                    }
                    // 扇出放在独立任务里执行，回调 panic 不会终止时间轮
                    let transport = self.clone();
                    let batch = tokio::spawn(async move {
                        transport.refresh_connections(due).await;
                    });
                    if let Err(err) = batch.await {
                        error!(error = %err, "ttl refresh batch aborted");
                    }
                }
            }
        }
    }

    /// 对一批到期连接逐个续期，整批受 50 秒预算约束
    async fn refresh_connections(&self, conns: Vec<Arc<Connection>>) {
        let deadline = tokio::time::Instant::now() + REFRESH_BATCH_TIMEOUT;

        for conn in conns {
            // 已经离开连接池的连接直接跳过
            if self.pool.get_by_id(conn.id()).is_none() {
                continue;
            }

            let refreshed = tokio::time::timeout_at(deadline, async {
                match self.handler.get() {
                    Some(handler) => {
                        handler
                            .on_refresh_session(&conn, conn.last_active_secs())
                            .await
                    }
                    None => Ok(()),
                }
            })
            .await;

            match refreshed {
                Ok(Ok(())) => {
                    // 续期成功，排入下一圈
                    self.wheel.add(conn);
                }
                Ok(Err(err)) => {
                    warn!(error = %err, conn_id = conn.id(), "refresh session failed");
                    self.handle_disconnect(&conn, "refresh session timeout").await;
                }
                Err(_) => {
                    warn!(conn_id = conn.id(), "refresh batch deadline exceeded");
                    self.handle_disconnect(&conn, "refresh session timeout").await;
                }
            }
        }
    }

    /// 推送消息到指定连接
    pub async fn send(&self, conn_id: u64, data: &[u8]) -> Result<(), TransportError> {
        let conn = self
            .pool
            .get_by_id(conn_id)
            .ok_or(TransportError::NotFound)?;

        let packet = Packet::new(MsgType::Push, data.to_vec());
        conn.write_packet(&packet).await.map_err(|err| {
            warn!(error = %err, conn_id, "send message failed");
            match err {
                ProtocolError::Io(io_err) => TransportError::Io(io_err),
                other => TransportError::Protocol(other),
            }
        })
    }

    /// 批量推送同一消息：只编码一次，部分失败不中断，
    /// 返回发送失败（未找到或写失败）的连接 ID 列表
    pub async fn batch_send(
        &self,
        conn_ids: &[u64],
        data: &[u8],
    ) -> Result<Vec<u64>, TransportError> {
        if conn_ids.is_empty() {
            return Ok(Vec::new());
        }

        let encoded = protocol::encode_packet(&Packet::new(MsgType::Push, data.to_vec()))?;

        let mut failed = Vec::new();
        for &conn_id in conn_ids {
            match self.pool.get_by_id(conn_id) {
                None => failed.push(conn_id),
                Some(conn) => {
                    if let Err(err) = conn.write_raw(&encoded).await {
                        warn!(error = %err, conn_id, "send batch message failed");
                        failed.push(conn_id);
                    }
                }
            }
        }
        Ok(failed)
    }

    /// 关闭指定连接，走完整断开路径
    pub async fn close_conn(&self, conn_id: u64) -> Result<(), TransportError> {
        let conn = self
            .pool
            .get_by_id(conn_id)
            .ok_or(TransportError::NotFound)?;
        self.handle_disconnect(&conn, "closed by server").await;
        Ok(())
    }
}

fn configure_socket(stream: &TcpStream) -> std::io::Result<()> {
    stream.set_nodelay(true)?;
    let sock = socket2::SockRef::from(stream);
    let keepalive = socket2::TcpKeepalive::new().with_time(TCP_KEEPALIVE_PERIOD);
    sock.set_tcp_keepalive(&keepalive)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use kim_proto::session::Session;
    use std::sync::Mutex;
    use tokio::net::{TcpListener, TcpStream};

    struct NoopSession;

    #[async_trait]
    impl SessionApi for NoopSession {
        async fn login(
            &self,
            _payload: Vec<u8>,
            conn_id: u64,
            remote_addr: String,
            gateway_id: String,
        ) -> anyhow::Result<Session> {
            Ok(Session {
                user_id: "u1".to_string(),
                device_id: "dev-a".to_string(),
                device_type: 1,
                gateway_id,
                conn_id,
                remote_addr,
                status: 1,
                login_at: 0,
                last_active_at: 0,
                expire_at: i64::MAX,
                meta: Default::default(),
            })
        }

        async fn del_session(
            &self,
            _user_id: &str,
            _device_ids: Vec<String>,
            _reason: &str,
        ) -> anyhow::Result<()> {
            Ok(())
        }

        async fn refresh_session_ttl(
            &self,
            _user_id: &str,
            _device_id: &str,
            _last_active_at: i64,
        ) -> anyhow::Result<()> {
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingHandler {
        disconnects: Mutex<Vec<(u64, String)>>,
        heartbeat_timeouts: Mutex<Vec<u64>>,
    }

    #[async_trait]
    impl EventHandler for RecordingHandler {
        async fn on_connect(&self, _conn: &Arc<Connection>) -> anyhow::Result<()> {
            Ok(())
        }
        async fn on_message(&self, _conn: &Arc<Connection>, _data: &[u8]) -> anyhow::Result<()> {
            Ok(())
        }
        async fn on_disconnect(&self, conn: &Arc<Connection>, reason: &str) {
            self.disconnects
                .lock()
                .unwrap()
                .push((conn.id(), reason.to_string()));
        }
        async fn on_heartbeat(&self, _conn: &Arc<Connection>) {}
        async fn on_heartbeat_timeout(&self, conn: &Arc<Connection>) {
            self.heartbeat_timeouts.lock().unwrap().push(conn.id());
        }
        async fn on_refresh_session(
            &self,
            _conn: &Arc<Connection>,
            _last_active_at: i64,
        ) -> anyhow::Result<()> {
            Ok(())
        }
    }

    async fn socket_pair() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).await.unwrap();
        let (server, _) = listener.accept().await.unwrap();
        (client, server)
    }

    fn transport_with(
        heartbeat_timeout: Duration,
    ) -> (Arc<TcpTransport>, Arc<RecordingHandler>) {
        let config = TransportConfig {
            heartbeat_timeout,
            ..TransportConfig::default()
        };
        let transport = TcpTransport::new(config, Arc::new(NoopSession));
        let handler = Arc::new(RecordingHandler::default());
        transport.set_handler(handler.clone());
        (transport, handler)
    }

    /// 把一条手工构造的连接挂进传输层
    async fn attach_connection(transport: &Arc<TcpTransport>, id: u64) -> (TcpStream, Arc<Connection>) {
        let (client, server) = socket_pair().await;
        let remote = server.peer_addr().unwrap();
        let (_read, write) = server.into_split();
        let conn = Arc::new(Connection::new(
            id,
            "u1".to_string(),
            "dev-a".to_string(),
            PlatformType::Mobile,
            remote,
            0,
            write,
        ));
        transport.pool.add(conn.clone());
        (client, conn)
    }

    #[tokio::test]
    async fn test_send_to_missing_connection() {
        let (transport, _) = transport_with(Duration::from_secs(180));
        assert!(matches!(
            transport.send(42, b"x").await,
            Err(TransportError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_send_writes_exactly_one_push_frame() {
        let (transport, _) = transport_with(Duration::from_secs(180));
        let (mut client, _conn) = attach_connection(&transport, 1).await;

        transport.send(1, b"hello").await.unwrap();

        let packet = protocol::decode_packet(&mut client).await.unwrap();
        assert_eq!(packet.msg_type, MsgType::Push);
        assert_eq!(packet.body, b"hello");
    }

    #[tokio::test]
    async fn test_batch_send_reports_missing_subset() {
        let (transport, _) = transport_with(Duration::from_secs(180));
        let (mut client_a, _a) = attach_connection(&transport, 1).await;
        let (mut client_b, _b) = attach_connection(&transport, 2).await;

        let failed = transport
            .batch_send(&[1, 999_999, 2], b"broadcast")
            .await
            .unwrap();
        assert_eq!(failed, vec![999_999]);

        for client in [&mut client_a, &mut client_b] {
            let packet = protocol::decode_packet(client).await.unwrap();
            assert_eq!(packet.msg_type, MsgType::Push);
            assert_eq!(packet.body, b"broadcast");
        }
    }

    #[tokio::test]
    async fn test_close_conn_runs_full_disconnect_path() {
        let (transport, handler) = transport_with(Duration::from_secs(180));
        let (_client, conn) = attach_connection(&transport, 1).await;
        transport.wheel.add(conn.clone());

        transport.close_conn(1).await.unwrap();

        assert_eq!(transport.conn_count(), 0);
        assert!(conn.is_closed());
        assert_eq!(
            handler.disconnects.lock().unwrap().as_slice(),
            &[(1, "closed by server".to_string())]
        );

        // 第二次关闭同一连接返回 not found
        assert!(matches!(
            transport.close_conn(1).await,
            Err(TransportError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_idle_sweep_evicts_connection() {
        let (transport, handler) = transport_with(Duration::from_millis(0));
        let (_client, _conn) = attach_connection(&transport, 7).await;

        tokio::time::sleep(Duration::from_millis(20)).await;
        transport.sweep_idle_connections().await;

        assert_eq!(transport.conn_count(), 0);
        assert_eq!(handler.heartbeat_timeouts.lock().unwrap().as_slice(), &[7]);
        assert_eq!(
            handler.disconnects.lock().unwrap().as_slice(),
            &[(7, "heartbeat timeout".to_string())]
        );
    }

    #[tokio::test]
    async fn test_active_connection_survives_sweep() {
        let (transport, handler) = transport_with(Duration::from_secs(180));
        let (_client, _conn) = attach_connection(&transport, 7).await;

        transport.sweep_idle_connections().await;

        assert_eq!(transport.conn_count(), 1);
        assert!(handler.disconnects.lock().unwrap().is_empty());
    }
}
