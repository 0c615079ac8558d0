//! 压测驱动模块
//!
//! 第 0 轮为预热，只写不读；之后每轮按配置混合读写。每一轮把 key 空间
//! 切给 threadCount 个工作线程，等全部线程结束后再统计耗时与缓存大小。
//! 工作线程之间只共享两个原子最大值和一个中止标志。

use crate::access::{AccessPatternSelector, Operation};
use crate::batch::{BatchReporter, SampleSink};
use crate::cache::{CacheAdapter, Value};
use crate::config::{WorkloadConfig, messages};
use crate::error::{AppError, ErrorContext, Result};
use crate::keyspace::{key_for, partition};
use crate::payload::{ValueGenerator, validate_value};
use crate::results::{ResultsAggregator, Round, RunResults, throughput};
use crate::stats::RunStats;
use log::{debug, error, info};
use rand::rngs::SmallRng;
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::any::Any;
use std::ops::Range;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Instant;

/// 单个工作线程的操作计数
#[derive(Clone, Copy, Debug, Default)]
struct WorkerTally {
    reads: u64,
    writes: u64,
    misses: u64,
}

impl WorkerTally {
    fn merge(&mut self, other: WorkerTally) {
        self.reads += other.reads;
        self.writes += other.writes;
        self.misses += other.misses;
    }
}

/// 压测驱动器
pub struct Pounder<'a, C: CacheAdapter + ?Sized> {
    config: &'a WorkloadConfig,
    cache: &'a C,
    sink: &'a dyn SampleSink,
    stats: RunStats,
    values: ValueGenerator,
}

impl<'a, C: CacheAdapter + ?Sized> Pounder<'a, C> {
    pub fn new(config: &'a WorkloadConfig, cache: &'a C, sink: &'a dyn SampleSink) -> Result<Self> {
        config.validate()?;
        let values = ValueGenerator::new(config.min_value_size, config.max_value_size)
            .with_context(messages::VALUE_DIST_FAILED)?;
        Ok(Self {
            config,
            cache,
            sink,
            stats: RunStats::new(),
            values,
        })
    }

    /// 依次执行预热轮和所有测量轮
    pub fn run(&self) -> Result<RunResults> {
        let seed = self.config.seed.unwrap_or_else(rand::random);
        info!(
            "Starting with threadCount: {} entryCount: {} Max Length: {} against {}",
            self.config.thread_count,
            self.config.entry_count,
            self.config.max_value_size,
            self.cache.name()
        );
        info!("random seed: {}", seed);
        let mut master = ChaCha8Rng::seed_from_u64(seed);
        let mut aggregator = ResultsAggregator::new(self.config.store_type);

        for index in 0..self.config.rounds {
            let round = self.run_round(index, &mut master)?;
            self.sink.round(&round)?;
            if round.is_warmup() {
                self.stats.reset_max_batch();
            }
            aggregator.add_round(round);
        }

        Ok(aggregator.finalize(self.stats.max_get_latency()))
    }

    fn run_round(&self, index: usize, master: &mut ChaCha8Rng) -> Result<Round> {
        let ranges = partition(self.config.entry_count, self.config.thread_count);
        debug!("round {} ranges: {:?}", index, ranges);
        let abort = AtomicBool::new(false);
        let started = Instant::now();

        let outcomes = thread::scope(|scope| {
            let abort = &abort;
            let mut outcomes = Vec::with_capacity(ranges.len());
            let mut handles = Vec::with_capacity(ranges.len());

            for (worker, range) in ranges.into_iter().enumerate() {
                let rng = SmallRng::seed_from_u64(master.next_u64());
                let spawned = thread::Builder::new()
                    .name(format!("pounder-{}-{}", index, worker))
                    .spawn_scoped(scope, move || {
                        let outcome = self.execute_load(index, range, rng, abort);
                        if outcome.is_err() {
                            abort.store(true, Ordering::Relaxed);
                        }
                        outcome
                    });
                match spawned {
                    Ok(handle) => handles.push(handle),
                    Err(e) => {
                        abort.store(true, Ordering::Relaxed);
                        outcomes.push(Err(AppError::WorkerFault(format!(
                            "failed to spawn worker {}: {}",
                            worker, e
                        ))));
                        break;
                    }
                }
            }

            for (worker, handle) in handles.into_iter().enumerate() {
                outcomes.push(handle.join().unwrap_or_else(|payload| {
                    Err(AppError::WorkerFault(format!(
                        "worker {} panicked: {}",
                        worker,
                        panic_message(payload.as_ref())
                    )))
                }));
            }
            outcomes
        });
        let elapsed = started.elapsed();

        let mut tally = WorkerTally::default();
        let mut failure: Option<AppError> = None;
        for outcome in outcomes {
            match outcome {
                Ok(t) => tally.merge(t),
                // 数据损坏优先于其它错误上报
                Err(e) => {
                    if failure
                        .as_ref()
                        .is_none_or(|f| !f.is_corruption() && e.is_corruption())
                    {
                        failure = Some(e);
                    }
                }
            }
        }
        if let Some(e) = failure {
            error!("round {} aborted: {}", index, e);
            return Err(e);
        }

        let operations = tally.reads + tally.writes;
        let round = Round {
            index,
            elapsed,
            final_cache_size: self.cache.size(),
            throughput_tps: throughput(operations, elapsed),
            reads: tally.reads,
            writes: tally.writes,
            misses: tally.misses,
        };
        info!(
            "round {} done: {} reads ({} misses), {} writes in {:?}",
            index, round.reads, round.misses, round.writes, elapsed
        );
        Ok(round)
    }

    /// 单个工作线程的负载循环，按序号顺序处理分到的 key 区间
    fn execute_load(
        &self,
        round: usize,
        range: Range<u64>,
        rng: SmallRng,
        abort: &AtomicBool,
    ) -> Result<WorkerTally> {
        let config = self.config;
        let warmup = round == 0;
        let mut selector = AccessPatternSelector::new(
            rng,
            config.update_percentage,
            config.hot_set_percentage,
            config.max_on_heap_count,
        )?;
        let mut reporter = BatchReporter::new(&self.stats, self.sink, config, round);
        let mut value = self.values.generate(selector.rng());
        // 冷集读取范围只在批次边界刷新
        let mut current_size = self.cache.size();
        let mut tally = WorkerTally::default();

        for index in range {
            if abort.load(Ordering::Relaxed) {
                break;
            }

            let op = selector.decide_operation(warmup);
            match op {
                Operation::Write => {
                    self.cache.put(key_for(index), Value::from(value.as_slice()));
                    tally.writes += 1;
                }
                Operation::Read => {
                    tally.reads += 1;
                    if !self.read_entry(&mut selector, current_size)? {
                        tally.misses += 1;
                    }
                }
            }

            if reporter.record(op) {
                current_size = reporter.report(self.cache, value.len())?;
                value = self.values.generate(selector.rng());
            }
        }

        Ok(tally)
    }

    /// 读一个 key 并校验，命中返回 true
    fn read_entry(&self, selector: &mut AccessPatternSelector, current_size: u64) -> Result<bool> {
        let Some(index) = selector.decide_read_key(current_size) else {
            return Ok(false);
        };
        let key = key_for(index);
        let started = Instant::now();
        let found = self.cache.get(&key);
        self.stats.observe_get(started.elapsed());

        match found {
            Some(value) => {
                validate_value(&value)
                    .inspect_err(|e| error!("invalid value for key {}: {}", key, e))?;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

/// 使用默认设置执行一次完整压测
pub fn run<C: CacheAdapter + ?Sized>(
    config: &WorkloadConfig,
    cache: &C,
    sink: &dyn SampleSink,
) -> Result<RunResults> {
    Pounder::new(config, cache, sink)?.run()
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
