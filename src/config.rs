//! 配置模块
//! 定义所有应用级别的常量，以及从 YAML 加载并校验的压测配置

use crate::error::{AppError, ErrorContext, Result};
use serde::Deserialize;
use std::fmt;
use std::path::Path;

/// 默认配置文件
pub const DEFAULT_CONFIG_PATH: &str = "config.yml";

/// 默认 CSV 输出文件
pub const DEFAULT_CSV_PATH: &str = "results.csv";

/// Key 前缀，完整格式为 `K{n}-`
pub const KEY_PREFIX: &str = "K";

/// Key 后缀
pub const KEY_SUFFIX: &str = "-";

/// 头部校验字节数（0,1,2,3,4）
pub const HEADER_LEN: usize = 5;

/// 尾部校验字节数（从末尾起 1,2,3,4）
pub const TRAILER_LEN: usize = 4;

/// value 的最小合法长度，头尾校验不重叠
pub const MIN_VALUE_LEN: usize = HEADER_LEN + TRAILER_LEN;

/// 在 maxValueSize 之上额外的随机长度余量
pub const VALUE_SIZE_SLACK: usize = 10;

/// maxValueSize 的上限（1 GiB）
pub const MAX_VALUE_LEN: usize = 1 << 30;

/// value 中间字节的上界（不含）
pub const FILLER_BYTE_BOUND: u8 = 128;

/// 百分比上界
pub const PERCENT: u32 = 100;

/// CSV 表头
pub const CSV_HEADER: &str =
    "round,timestamp,cacheSize,batchTimeMillis,isWarmup,valueSize,readCount,writeCount,hotSetPercentage";

/// 错误消息常量
pub mod messages {
    pub const CONFIG_READ_FAILED: &str = "Failed to read config file";
    pub const CONFIG_PARSE_FAILED: &str = "Failed to parse config";
    pub const CSV_OPEN_FAILED: &str = "Failed to open csv output";
    pub const STORE_BUILD_FAILED: &str = "Failed to build cache store";
    pub const RUN_FAILED: &str = "Pounder run failed";
    pub const VALUE_DIST_FAILED: &str = "Failed to create value size distribution";
}

/// 存储类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum StoreType {
    Offheap,
    Onheap,
    Disk,
}

impl fmt::Display for StoreType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreType::Offheap => f.write_str("OFFHEAP"),
            StoreType::Onheap => f.write_str("ONHEAP"),
            StoreType::Disk => f.write_str("DISK"),
        }
    }
}

/// 压测配置，启动时构造一次，之后只读
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct WorkloadConfig {
    pub store_type: StoreType,
    /// 每轮的工作线程数
    pub thread_count: usize,
    /// 预热阶段写入的条目数，也是之后每轮的操作数
    pub entry_count: u64,
    /// 堆外容量，例如 "1G"
    pub off_heap_size: String,
    /// 堆上（热）层的条目数
    pub max_on_heap_count: u64,
    /// 每多少次操作输出一次状态并更换 value
    pub batch_count: u64,
    pub max_value_size: usize,
    pub min_value_size: usize,
    /// 读操作命中热层范围的百分比
    pub hot_set_percentage: u32,
    pub rounds: usize,
    /// 非预热轮中写操作的百分比
    pub update_percentage: u32,
    pub disk_store_path: String,
    pub monitoring_enabled: bool,
    /// 随机种子，缺省时从系统取
    #[serde(default)]
    pub seed: Option<u64>,
}

/// 每个配置项一行 `key: value`，key 与 YAML 中的写法一致
impl fmt::Display for WorkloadConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "storeType: {}", self.store_type)?;
        writeln!(f, "threadCount: {}", self.thread_count)?;
        writeln!(f, "entryCount: {}", self.entry_count)?;
        writeln!(f, "offHeapSize: {}", self.off_heap_size)?;
        writeln!(f, "maxOnHeapCount: {}", self.max_on_heap_count)?;
        writeln!(f, "batchCount: {}", self.batch_count)?;
        writeln!(f, "maxValueSize: {}", self.max_value_size)?;
        writeln!(f, "minValueSize: {}", self.min_value_size)?;
        writeln!(f, "hotSetPercentage: {}", self.hot_set_percentage)?;
        writeln!(f, "rounds: {}", self.rounds)?;
        writeln!(f, "updatePercentage: {}", self.update_percentage)?;
        writeln!(f, "diskStorePath: {}", self.disk_store_path)?;
        write!(f, "monitoringEnabled: {}", self.monitoring_enabled)?;
        if let Some(seed) = self.seed {
            write!(f, "\nseed: {}", seed)?;
        }
        Ok(())
    }
}

impl WorkloadConfig {
    /// 从 YAML 字符串解析并校验
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let config: WorkloadConfig = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// 从文件加载并校验
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(AppError::from)
            .with_context(&format!("{} {}", messages::CONFIG_READ_FAILED, path.display()))?;
        Self::from_yaml_str(&content).with_context(messages::CONFIG_PARSE_FAILED)
    }

    /// 范围检查
    pub fn validate(&self) -> Result<()> {
        if self.thread_count == 0 {
            return Err(AppError::Config("threadCount must be greater than 0".into()));
        }
        if self.entry_count == 0 {
            return Err(AppError::Config("entryCount must be greater than 0".into()));
        }
        if self.batch_count == 0 {
            return Err(AppError::Config("batchCount must be greater than 0".into()));
        }
        if self.rounds == 0 {
            return Err(AppError::Config("rounds must be greater than 0".into()));
        }
        if self.max_value_size < self.min_value_size {
            return Err(AppError::Config(format!(
                "maxValueSize ({}) must not be less than minValueSize ({})",
                self.max_value_size, self.min_value_size
            )));
        }
        if self.max_value_size > MAX_VALUE_LEN {
            return Err(AppError::Config(format!(
                "maxValueSize must be at most {}, got {}",
                MAX_VALUE_LEN, self.max_value_size
            )));
        }
        if self.min_value_size < MIN_VALUE_LEN {
            return Err(AppError::Config(format!(
                "minValueSize must be at least {} to hold the checksum bytes",
                MIN_VALUE_LEN
            )));
        }
        if self.hot_set_percentage > PERCENT {
            return Err(AppError::Config(format!(
                "hotSetPercentage must be within 0..=100, got {}",
                self.hot_set_percentage
            )));
        }
        if self.update_percentage > PERCENT {
            return Err(AppError::Config(format!(
                "updatePercentage must be within 0..=100, got {}",
                self.update_percentage
            )));
        }
        parse_byte_size(&self.off_heap_size)?;
        if self.entry_count < self.thread_count as u64 {
            log::warn!(
                "entryCount {} is smaller than threadCount {}, every worker range is empty",
                self.entry_count,
                self.thread_count
            );
        }
        Ok(())
    }

    /// 堆外容量（字节）
    pub fn off_heap_bytes(&self) -> Result<u64> {
        parse_byte_size(&self.off_heap_size)
    }

    /// 每个线程分到的 key 数
    pub fn entries_per_thread(&self) -> u64 {
        self.entry_count / self.thread_count as u64
    }

    /// 每轮实际执行的操作数，余数部分不会被访问
    pub fn operations_per_round(&self) -> u64 {
        self.entries_per_thread() * self.thread_count as u64
    }
}

/// 解析 "1G"、"512m"、"4096" 这类容量字符串（二进制倍数）
pub fn parse_byte_size(text: &str) -> Result<u64> {
    let lower = text.trim().to_ascii_lowercase();
    let body = lower.strip_suffix('b').unwrap_or(&lower);
    let (digits, shift) = match body.as_bytes().last() {
        Some(b'k') => (&body[..body.len() - 1], 10),
        Some(b'm') => (&body[..body.len() - 1], 20),
        Some(b'g') => (&body[..body.len() - 1], 30),
        Some(b't') => (&body[..body.len() - 1], 40),
        _ => (body, 0),
    };
    let value: u64 = digits
        .trim()
        .parse()
        .map_err(|_| AppError::Config(format!("invalid byte size {:?}", text)))?;
    value
        .checked_mul(1u64 << shift)
        .ok_or_else(|| AppError::Config(format!("byte size {:?} overflows", text)))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "
storeType: OFFHEAP
threadCount: 4
entryCount: 1000
offHeapSize: 1G
maxOnHeapCount: 100
batchCount: 100
maxValueSize: 60
minValueSize: 50
hotSetPercentage: 10
rounds: 2
updatePercentage: 20
diskStorePath: /tmp/pounder
monitoringEnabled: false
";

    #[test]
    fn parses_camel_case_yaml() {
        let config = WorkloadConfig::from_yaml_str(SAMPLE).unwrap();
        assert_eq!(config.store_type, StoreType::Offheap);
        assert_eq!(config.thread_count, 4);
        assert_eq!(config.entry_count, 1000);
        assert_eq!(config.off_heap_bytes().unwrap(), 1 << 30);
        assert_eq!(config.seed, None);
        assert_eq!(config.operations_per_round(), 1000);
    }

    #[test]
    fn missing_field_is_rejected() {
        let content = SAMPLE.replace("rounds: 2\n", "");
        let err = WorkloadConfig::from_yaml_str(&content).unwrap_err();
        assert!(err.to_string().contains("rounds"), "{}", err);
    }

    #[test]
    fn unknown_field_is_rejected() {
        let content = format!("{}bogus: 1\n", SAMPLE);
        assert!(WorkloadConfig::from_yaml_str(&content).is_err());
    }

    #[test]
    fn percentages_are_range_checked() {
        let content = SAMPLE.replace("hotSetPercentage: 10", "hotSetPercentage: 101");
        let err = WorkloadConfig::from_yaml_str(&content).unwrap_err();
        assert!(err.to_string().contains("hotSetPercentage"));

        let content = SAMPLE.replace("updatePercentage: 20", "updatePercentage: 250");
        assert!(WorkloadConfig::from_yaml_str(&content).is_err());
    }

    #[test]
    fn value_sizes_are_checked() {
        let content = SAMPLE.replace("maxValueSize: 60", "maxValueSize: 40");
        assert!(WorkloadConfig::from_yaml_str(&content).is_err());

        let content = SAMPLE.replace("minValueSize: 50", "minValueSize: 8");
        assert!(WorkloadConfig::from_yaml_str(&content).is_err());
    }

    #[test]
    fn huge_max_value_size_is_rejected() {
        let content = SAMPLE.replace("maxValueSize: 60", &format!("maxValueSize: {}", usize::MAX - 3));
        let err = WorkloadConfig::from_yaml_str(&content).unwrap_err();
        assert!(err.to_string().contains("maxValueSize"), "{}", err);

        let content = SAMPLE.replace("maxValueSize: 60", &format!("maxValueSize: {}", MAX_VALUE_LEN));
        assert!(WorkloadConfig::from_yaml_str(&content).is_ok());
    }

    #[test]
    fn prints_one_line_per_entry() {
        let config = WorkloadConfig::from_yaml_str(SAMPLE).unwrap();
        let text = config.to_string();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines.len(), 13);
        assert_eq!(lines[0], "storeType: OFFHEAP");
        assert!(lines.contains(&"offHeapSize: 1G"));
        assert!(lines.contains(&"monitoringEnabled: false"));

        let seeded = WorkloadConfig {
            seed: Some(5),
            ..config
        };
        assert!(seeded.to_string().ends_with("seed: 5"));
    }

    #[test]
    fn zero_counts_are_rejected() {
        for (from, to) in [
            ("threadCount: 4", "threadCount: 0"),
            ("entryCount: 1000", "entryCount: 0"),
            ("batchCount: 100", "batchCount: 0"),
            ("rounds: 2", "rounds: 0"),
        ] {
            let content = SAMPLE.replace(from, to);
            assert!(WorkloadConfig::from_yaml_str(&content).is_err(), "{}", to);
        }
    }

    #[test]
    fn store_type_and_seed() {
        let content = SAMPLE.replace("storeType: OFFHEAP", "storeType: DISK");
        let content = format!("{}seed: 42\n", content);
        let config = WorkloadConfig::from_yaml_str(&content).unwrap();
        assert_eq!(config.store_type, StoreType::Disk);
        assert_eq!(config.seed, Some(42));

        let content = SAMPLE.replace("storeType: OFFHEAP", "storeType: REDIS");
        assert!(WorkloadConfig::from_yaml_str(&content).is_err());
    }

    #[test]
    fn byte_sizes() {
        assert_eq!(parse_byte_size("4096").unwrap(), 4096);
        assert_eq!(parse_byte_size("64b").unwrap(), 64);
        assert_eq!(parse_byte_size("1k").unwrap(), 1024);
        assert_eq!(parse_byte_size("512M").unwrap(), 512 << 20);
        assert_eq!(parse_byte_size("2GB").unwrap(), 2 << 30);
        assert_eq!(parse_byte_size(" 1T ").unwrap(), 1 << 40);
        assert!(parse_byte_size("").is_err());
        assert!(parse_byte_size("G").is_err());
        assert!(parse_byte_size("1X").is_err());
        assert!(parse_byte_size("99999999999T").is_err());
    }
}
