use thiserror::Error;

/// 启动阶段的致命错误，出现后直接终止扫描
#[derive(Error, Debug)]
pub enum SetupError {
    #[error("未找到可用的网络设备: {0}")]
    NoDevice(String),

    #[error("打开网卡 {device} 失败: {reason}")]
    Capture { device: String, reason: String },

    #[error("获取空闲端口失败: {0}")]
    PortAlloc(#[source] std::io::Error),

    #[error("读取输入 {path} 失败: {source}")]
    Input {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("打开输出文件 {path} 失败: {source}")]
    Output {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("无效的DNS服务器地址: {0}")]
    InvalidResolver(String),

    #[error("无效的发包速率: {0}")]
    InvalidRate(String),

    #[error("没有可扫描的目标: {0}")]
    NoTargets(String),

    #[error("初始化状态表失败: {0}")]
    Ledger(#[from] LedgerError),
}

/// 报文构造和解析错误
#[derive(Error, Debug, PartialEq, Eq)]
pub enum CodecError {
    #[error("invalid domain name: {0}")]
    InvalidName(String),

    #[error("packet truncated at offset {0}")]
    Truncated(usize),

    #[error("dns message is not a response")]
    NotResponse,

    #[error("malformed dns message: {0}")]
    Malformed(&'static str),

    #[error("failed to build {0} layer")]
    Packet(&'static str),
}

/// 单个报文发送失败，只记录日志，不影响主流程
#[derive(Error, Debug)]
pub enum SendError {
    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error("write packet data: {0}")]
    Io(#[from] std::io::Error),
}

/// 状态表（内存 + 磁盘）读写错误
#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("spill dir io: {0}")]
    Io(#[from] std::io::Error),

    #[error("spill record encoding: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("open spill database: {0}")]
    Database(#[from] redb::DatabaseError),

    #[error("spill transaction: {0}")]
    Transaction(#[from] redb::TransactionError),

    #[error("open spill table: {0}")]
    Table(#[from] redb::TableError),

    #[error("commit spill transaction: {0}")]
    Commit(#[from] redb::CommitError),

    #[error("spill storage: {0}")]
    Storage(#[from] redb::StorageError),
}
