//! 批次报告模块
//!
//! 每个工作线程每执行 batchCount 次操作调用一次 [`BatchReporter::report`]：
//! 计算批次耗时、更新全局最大批次耗时、采样缓存大小并输出一条 [`BatchSample`]。
//! 输出目标由 [`SampleSink`] 决定（控制台、CSV、内存）。

use crate::access::Operation;
use crate::cache::CacheAdapter;
use crate::config::{CSV_HEADER, WorkloadConfig, messages};
use crate::error::{AppError, ErrorContext, Result};
use crate::results::Round;
use crate::stats::RunStats;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Instant, SystemTime, UNIX_EPOCH};

/// 批次采样
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BatchSample {
    pub round: usize,
    /// 采样时刻（Unix 毫秒）
    pub timestamp_millis: u64,
    pub cache_size: u64,
    pub batch_millis: u64,
    pub warmup: bool,
    pub value_size: usize,
    pub read_count: u64,
    pub write_count: u64,
    pub hot_set_percentage: u32,
    /// 截至本次采样的全局最大批次耗时
    pub max_batch_millis: u64,
}

impl BatchSample {
    /// CSV 行，列顺序与 [`CSV_HEADER`] 一致
    pub fn csv_line(&self) -> String {
        format!(
            "{},{},{},{},{},{},{},{},{}",
            self.round,
            self.timestamp_millis,
            self.cache_size,
            self.batch_millis,
            self.warmup,
            self.value_size,
            self.read_count,
            self.write_count,
            self.hot_set_percentage
        )
    }
}

/// 当前 Unix 毫秒时间戳
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}

/// 采样输出接口
pub trait SampleSink: Send + Sync {
    fn batch(&self, sample: &BatchSample) -> Result<()>;

    fn round(&self, _round: &Round) -> Result<()> {
        Ok(())
    }
}

impl<S: SampleSink + ?Sized> SampleSink for Arc<S> {
    fn batch(&self, sample: &BatchSample) -> Result<()> {
        (**self).batch(sample)
    }

    fn round(&self, round: &Round) -> Result<()> {
        (**self).round(round)
    }
}

/// 控制台输出
#[derive(Debug, Default)]
pub struct ConsoleSink;

impl SampleSink for ConsoleSink {
    fn batch(&self, s: &BatchSample) -> Result<()> {
        let max = if s.warmup {
            "warmup".to_string()
        } else {
            s.max_batch_millis.to_string()
        };
        println!(
            "{} size:{} batch time: {} Max batch time millis: {} value size:{} READ: {} WRITE: {} Hotset: {}",
            s.timestamp_millis,
            s.cache_size,
            s.batch_millis,
            max,
            s.value_size,
            s.read_count,
            s.write_count,
            s.hot_set_percentage
        );
        Ok(())
    }

    fn round(&self, round: &Round) -> Result<()> {
        let now = now_millis();
        println!("{} ROUND {} size: {}", now, round.index, round.final_cache_size);
        println!(
            "{} Took: {} final size was {} TPS: {}",
            now,
            round.elapsed_millis(),
            round.final_cache_size,
            round.throughput_tps
        );
        Ok(())
    }
}

/// CSV 输出，每行写完立即 flush
pub struct CsvSink<W: Write + Send> {
    out: Mutex<W>,
}

impl CsvSink<BufWriter<File>> {
    /// 创建（覆盖）CSV 文件并写入表头
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::create(path)
            .map_err(AppError::from)
            .with_context(&format!("{} {}", messages::CSV_OPEN_FAILED, path.display()))?;
        Self::new(BufWriter::new(file))
    }
}

impl<W: Write + Send> CsvSink<W> {
    pub fn new(mut out: W) -> Result<Self> {
        writeln!(out, "{}", CSV_HEADER)?;
        out.flush()?;
        Ok(Self {
            out: Mutex::new(out),
        })
    }

    pub fn into_inner(self) -> W {
        self.out.into_inner().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<W: Write + Send> SampleSink for CsvSink<W> {
    fn batch(&self, sample: &BatchSample) -> Result<()> {
        let mut out = self.out.lock().unwrap_or_else(PoisonError::into_inner);
        writeln!(out, "{}", sample.csv_line())?;
        out.flush()?;
        Ok(())
    }
}

/// 内存收集，测试用
#[derive(Debug, Default)]
pub struct MemorySink {
    batches: Mutex<Vec<BatchSample>>,
    rounds: Mutex<Vec<Round>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn batches(&self) -> Vec<BatchSample> {
        self.batches
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn rounds(&self) -> Vec<Round> {
        self.rounds
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl SampleSink for MemorySink {
    fn batch(&self, sample: &BatchSample) -> Result<()> {
        self.batches
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(sample.clone());
        Ok(())
    }

    fn round(&self, round: &Round) -> Result<()> {
        self.rounds
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(round.clone());
        Ok(())
    }
}

/// 同时输出到多个 sink
#[derive(Default)]
pub struct Fanout {
    sinks: Vec<Box<dyn SampleSink>>,
}

impl Fanout {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: impl SampleSink + 'static) -> Self {
        self.sinks.push(Box::new(sink));
        self
    }
}

impl SampleSink for Fanout {
    fn batch(&self, sample: &BatchSample) -> Result<()> {
        self.sinks.iter().try_for_each(|s| s.batch(sample))
    }

    fn round(&self, round: &Round) -> Result<()> {
        self.sinks.iter().try_for_each(|s| s.round(round))
    }
}

/// 单个工作线程的批次报告器
pub struct BatchReporter<'a> {
    stats: &'a RunStats,
    sink: &'a dyn SampleSink,
    round: usize,
    warmup: bool,
    batch_count: u64,
    hot_set_percentage: u32,
    window_start: Instant,
    ops: u64,
    reads: u64,
    writes: u64,
}

impl<'a> BatchReporter<'a> {
    pub fn new(
        stats: &'a RunStats,
        sink: &'a dyn SampleSink,
        config: &WorkloadConfig,
        round: usize,
    ) -> Self {
        Self {
            stats,
            sink,
            round,
            warmup: round == 0,
            batch_count: config.batch_count,
            hot_set_percentage: config.hot_set_percentage,
            window_start: Instant::now(),
            ops: 0,
            reads: 0,
            writes: 0,
        }
    }

    /// 记录一次操作，到达批次边界时返回 true
    #[inline]
    pub fn record(&mut self, op: Operation) -> bool {
        match op {
            Operation::Read => self.reads += 1,
            Operation::Write => self.writes += 1,
        }
        self.ops += 1;
        self.ops % self.batch_count == 0
    }

    /// 结束当前批次：输出采样、重置计数，返回采样到的缓存大小
    pub fn report<C: CacheAdapter + ?Sized>(&mut self, cache: &C, value_size: usize) -> Result<u64> {
        let batch_millis = u64::try_from(self.window_start.elapsed().as_millis()).unwrap_or(u64::MAX);
        let max_batch_millis = self.stats.observe_batch(batch_millis);
        let cache_size = cache.size();

        self.sink.batch(&BatchSample {
            round: self.round,
            timestamp_millis: now_millis(),
            cache_size,
            batch_millis,
            warmup: self.warmup,
            value_size,
            read_count: self.reads,
            write_count: self.writes,
            hot_set_percentage: self.hot_set_percentage,
            max_batch_millis,
        })?;

        self.reads = 0;
        self.writes = 0;
        self.window_start = Instant::now();
        Ok(cache_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::HeapStore;
    use crate::config::StoreType;

    fn config(batch_count: u64) -> WorkloadConfig {
        WorkloadConfig {
            store_type: StoreType::Onheap,
            thread_count: 1,
            entry_count: 100,
            off_heap_size: "1M".into(),
            max_on_heap_count: 100,
            batch_count,
            max_value_size: 20,
            min_value_size: 10,
            hot_set_percentage: 25,
            rounds: 2,
            update_percentage: 50,
            disk_store_path: String::new(),
            monitoring_enabled: false,
            seed: None,
        }
    }

    #[test]
    fn reports_every_batch_count_operations() {
        let stats = RunStats::new();
        let sink = MemorySink::new();
        let cache = HeapStore::new(100, false);
        cache.put("K0-".into(), vec![0u8; 10].into());

        let mut reporter = BatchReporter::new(&stats, &sink, &config(3), 1);
        let ops = [
            Operation::Write,
            Operation::Read,
            Operation::Read,
            Operation::Write,
            Operation::Write,
            Operation::Write,
        ];
        let mut boundaries = 0;
        for op in ops {
            if reporter.record(op) {
                assert_eq!(reporter.report(&cache, 42).unwrap(), 1);
                boundaries += 1;
            }
        }
        assert_eq!(boundaries, 2);

        let samples = sink.batches();
        assert_eq!(samples.len(), 2);
        assert_eq!((samples[0].read_count, samples[0].write_count), (2, 1));
        assert_eq!((samples[1].read_count, samples[1].write_count), (0, 3));
        assert!(samples.iter().all(|s| !s.warmup && s.round == 1));
        assert!(samples.iter().all(|s| s.value_size == 42 && s.hot_set_percentage == 25));
    }

    #[test]
    fn csv_output() {
        let sink = CsvSink::new(Vec::new()).unwrap();
        sink.batch(&BatchSample {
            round: 0,
            timestamp_millis: 1700000000000,
            cache_size: 250,
            batch_millis: 12,
            warmup: true,
            value_size: 55,
            read_count: 0,
            write_count: 100,
            hot_set_percentage: 10,
            max_batch_millis: 12,
        })
        .unwrap();
        let text = String::from_utf8(sink.into_inner()).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines[0], CSV_HEADER);
        assert_eq!(lines[1], "0,1700000000000,250,12,true,55,0,100,10");
    }

    #[test]
    fn fanout_forwards_to_all() {
        let stats = RunStats::new();
        let first = Arc::new(MemorySink::new());
        let second = Arc::new(MemorySink::new());
        let fanout = Fanout::new().with(first.clone()).with(second.clone());
        let cache = HeapStore::new(10, false);

        let mut reporter = BatchReporter::new(&stats, &fanout, &config(1), 0);
        assert!(reporter.record(Operation::Write));
        reporter.report(&cache, 10).unwrap();

        assert_eq!(first.batches(), second.batches());
        assert_eq!(first.batches().len(), 1);
        assert!(first.batches()[0].warmup);
    }
}
