//! 客户端长连接二进制协议
//!
//! 帧格式（大端序）：
//!
//! ```text
//! +--------+---------+---------+---------+------------------+
//! | Magic  | Version | MsgType | Length  | Body             |
//! | 2bytes | 1 byte  | 1 byte  | 4 bytes | N bytes          |
//! +--------+---------+---------+---------+------------------+
//! ```
//!
//! 编码产出单块连续缓冲区（一次写系统调用即可发完）；解码固定执行
//! 两次定长读取（先头部后 Body）。编解码内部不做任何超时控制，
//! 超时由调用方负责。

use tokio::io::{AsyncRead, AsyncReadExt};

pub const MAGIC_NUMBER: u16 = 0xABCD;
pub const VERSION: u8 = 1;
pub const HEADER_SIZE: usize = 8;
/// Body 上限 10MB，防止恶意长度字段造成内存攻击
pub const MAX_BODY_SIZE: usize = 10 * 1024 * 1024;

/// 消息类型，线上取值固定，不可调整顺序
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MsgType {
    Unknown = 0,
    Login = 1,
    Logout = 2,
    Ping = 3,
    Pong = 4,
    /// 上行消息（客户端 → 服务端）
    Upstream = 5,
    /// 推送消息（服务端 → 客户端）
    Push = 6,
    /// 确认消息
    Ack = 7,
}

impl From<u8> for MsgType {
    fn from(value: u8) -> Self {
        match value {
            1 => MsgType::Login,
            2 => MsgType::Logout,
            3 => MsgType::Ping,
            4 => MsgType::Pong,
            5 => MsgType::Upstream,
            6 => MsgType::Push,
            7 => MsgType::Ack,
            _ => MsgType::Unknown,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("invalid magic number: {0:#06x}")]
    InvalidMagic(u16),
    #[error("unsupported protocol version: got {got}, expected {expected}")]
    UnsupportedVersion { got: u8, expected: u8 },
    #[error("message body too large: {0} bytes, max: 10485760 bytes")]
    BodyTooLarge(usize),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// 一个完整的协议帧
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub msg_type: MsgType,
    pub body: Vec<u8>,
}

impl Packet {
    pub fn new(msg_type: MsgType, body: Vec<u8>) -> Self {
        Self { msg_type, body }
    }
}

/// 编码 Packet → 二进制字节流
pub fn encode_packet(packet: &Packet) -> Result<Vec<u8>, ProtocolError> {
    let body_len = packet.body.len();
    if body_len > MAX_BODY_SIZE {
        return Err(ProtocolError::BodyTooLarge(body_len));
    }

    // 预分配完整缓冲区，避免多次扩容
    let mut buf = Vec::with_capacity(HEADER_SIZE + body_len);
    buf.extend_from_slice(&MAGIC_NUMBER.to_be_bytes());
    buf.push(VERSION);
    buf.push(packet.msg_type as u8);
    buf.extend_from_slice(&(body_len as u32).to_be_bytes());
    buf.extend_from_slice(&packet.body);

    Ok(buf)
}

/// 从 reader 中解码一个完整数据包（不设置超时，由调用方控制）
pub async fn decode_packet<R>(reader: &mut R) -> Result<Packet, ProtocolError>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; HEADER_SIZE];
    reader.read_exact(&mut header).await?;

    let magic = u16::from_be_bytes([header[0], header[1]]);
    if magic != MAGIC_NUMBER {
        return Err(ProtocolError::InvalidMagic(magic));
    }

    let version = header[2];
    if version != VERSION {
        return Err(ProtocolError::UnsupportedVersion {
            got: version,
            expected: VERSION,
        });
    }

    let msg_type = MsgType::from(header[3]);
    let length = u32::from_be_bytes([header[4], header[5], header[6], header[7]]) as usize;
    if length > MAX_BODY_SIZE {
        return Err(ProtocolError::BodyTooLarge(length));
    }

    let mut body = vec![0u8; length];
    if length > 0 {
        reader.read_exact(&mut body).await?;
    }

    Ok(Packet { msg_type, body })
}
