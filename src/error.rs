//! 错误处理模块
//! 定义了所有应用级别的错误类型

use std::fmt;

/// 校验区域
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChecksumRegion {
    /// 头部升序校验字节
    Header,
    /// 尾部降序校验字节
    Trailer,
    /// 长度不足以容纳校验字节（被截断）
    Length,
}

impl fmt::Display for ChecksumRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChecksumRegion::Header => f.write_str("header"),
            ChecksumRegion::Trailer => f.write_str("trailer"),
            ChecksumRegion::Length => f.write_str("length"),
        }
    }
}

/// 数据损坏的诊断信息
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Corruption {
    pub region: ChecksumRegion,
    /// 出错字节在 value 中的下标
    pub position: usize,
    pub expected: u8,
    pub actual: u8,
    /// 读到的 value 长度
    pub len: usize,
}

impl fmt::Display for Corruption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.region {
            ChecksumRegion::Length => write!(
                f,
                "value truncated to {} bytes, checksum needs at least {}",
                self.len, self.position
            ),
            region => write!(
                f,
                "{} byte at position {} expected {} got {} (value length {})",
                region, self.position, self.expected, self.actual, self.len
            ),
        }
    }
}

/// 应用主错误类型
#[derive(Debug, Clone)]
pub enum AppError {
    /// 配置错误
    Config(String),
    /// IO错误
    Io(String),
    /// 随机分布创建错误
    Distribution(String),
    /// 读回的数据校验失败，被测缓存返回了错误的字节
    DataCorruption(Corruption),
    /// 工作线程异常退出
    WorkerFault(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Config(msg) => write!(f, "Configuration error: {}", msg),
            AppError::Io(msg) => write!(f, "IO error: {}", msg),
            AppError::Distribution(msg) => write!(f, "Distribution create error: {}", msg),
            AppError::DataCorruption(c) => write!(f, "Data corruption: {}", c),
            AppError::WorkerFault(msg) => write!(f, "Worker fault: {}", msg),
        }
    }
}

impl std::error::Error for AppError {}

/// 结果类型别名
pub type Result<T> = std::result::Result<T, AppError>;

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Io(err.to_string())
    }
}

impl From<serde_yaml::Error> for AppError {
    fn from(err: serde_yaml::Error) -> Self {
        AppError::Config(err.to_string())
    }
}

impl AppError {
    /// 是否为数据损坏错误
    pub fn is_corruption(&self) -> bool {
        matches!(self, AppError::DataCorruption(_))
    }
}

/// 错误上下文扩展trait
pub trait ErrorContext<T> {
    /// 添加上下文信息
    fn with_context(self, context: &str) -> Result<T>;
}

impl<T> ErrorContext<T> for Result<T> {
    fn with_context(self, context: &str) -> Result<T> {
        self.map_err(|e| match e {
            AppError::Config(msg) => AppError::Config(format!("{}: {}", context, msg)),
            AppError::Io(msg) => AppError::Io(format!("{}: {}", context, msg)),
            AppError::Distribution(msg) => AppError::Distribution(format!("{}: {}", context, msg)),
            AppError::WorkerFault(msg) => AppError::WorkerFault(format!("{}: {}", context, msg)),
            // 诊断信息是结构化的，保持原样
            AppError::DataCorruption(c) => AppError::DataCorruption(c),
        })
    }
}
