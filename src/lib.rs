//! 分层缓存压测库
//!
//! 多线程驱动读写混合负载打到被测缓存上，报告吞吐、延迟与数据完整性。
//!
//! 特性：
//! - 第 0 轮只写不读，作为预热，不计入平均吞吐
//! - 热集/冷集倾斜访问，冷集范围按批次刷新
//! - 带头尾校验字节的随机长度 value，读回即校验
//! - 每个工作线程独立种子的随机数，共享状态只有原子最大值

pub mod access;
pub mod batch;
pub mod cache;
pub mod config;
pub mod error;
pub mod keyspace;
pub mod payload;
pub mod pounder;
pub mod results;
pub mod stats;

pub use cache::{CacheAdapter, Value};
pub use config::{StoreType, WorkloadConfig};
pub use error::{AppError, Result};
pub use pounder::{Pounder, run};
pub use results::{Round, RunResults};
