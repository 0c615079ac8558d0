//! 结果汇总模块
//! 收集每轮的指标并生成最终报告，第 0 轮（预热）不计入平均值

use crate::config::StoreType;
use std::fmt;
use std::time::Duration;

/// 单轮结果
#[derive(Clone, Debug, PartialEq)]
pub struct Round {
    pub index: usize,
    pub elapsed: Duration,
    pub final_cache_size: u64,
    pub throughput_tps: u64,
    pub reads: u64,
    pub writes: u64,
    /// 读操作未命中次数
    pub misses: u64,
}

impl Round {
    #[inline]
    pub fn is_warmup(&self) -> bool {
        self.index == 0
    }

    pub fn elapsed_millis(&self) -> u64 {
        u64::try_from(self.elapsed.as_millis()).unwrap_or(u64::MAX)
    }
}

/// 计算吞吐量，耗时为 0 时返回 0
pub fn throughput(operations: u64, elapsed: Duration) -> u64 {
    let secs = elapsed.as_secs_f64();
    if secs == 0.0 {
        0
    } else {
        (operations as f64 / secs) as u64
    }
}

/// 一次完整运行的结果
#[derive(Clone, Debug, PartialEq)]
pub struct RunResults {
    pub store_type: StoreType,
    pub rounds: Vec<Round>,
    pub max_get_latency: Duration,
}

impl RunResults {
    fn measured(&self) -> impl Iterator<Item = &Round> {
        self.rounds.iter().filter(|r| !r.is_warmup())
    }

    /// 除预热轮以外的总耗时
    pub fn total_elapsed(&self) -> Duration {
        self.measured().map(|r| r.elapsed).sum()
    }

    /// 除预热轮以外的平均吞吐量，只有预热轮时为 None
    pub fn average_tps(&self) -> Option<f64> {
        let (count, sum) = self
            .measured()
            .fold((0u64, 0u64), |(n, s), r| (n + 1, s + r.throughput_tps));
        (count > 0).then(|| sum as f64 / count as f64)
    }
}

impl fmt::Display for RunResults {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "All Rounds:")?;
        for round in &self.rounds {
            writeln!(
                f,
                "Round {}{}: elapsed time: {}, final cache size: {}, tps: {}",
                round.index,
                if round.is_warmup() { " (warmup)" } else { "" },
                round.elapsed_millis(),
                round.final_cache_size,
                round.throughput_tps
            )?;
        }
        match self.store_type {
            StoreType::Offheap => writeln!(f, "BigMemory Pounder Final Results")?,
            other => writeln!(f, "{} Pounder Final Results", other)?,
        }
        let avg = match self.average_tps() {
            Some(avg) => format!("{:.2}", avg),
            None => "n/a".to_string(),
        };
        write!(
            f,
            "TOTAL TIME: {}ms, AVG TPS (excluding warmup round 0): {} MAX GET LATENCY: {:.3}ms",
            self.total_elapsed().as_millis(),
            avg,
            self.max_get_latency.as_secs_f64() * 1000.0
        )
    }
}

/// 结果汇总器
#[derive(Debug)]
pub struct ResultsAggregator {
    store_type: StoreType,
    rounds: Vec<Round>,
}

impl ResultsAggregator {
    pub fn new(store_type: StoreType) -> Self {
        Self {
            store_type,
            rounds: Vec::new(),
        }
    }

    pub fn add_round(&mut self, round: Round) {
        self.rounds.push(round);
    }

    pub fn finalize(self, max_get_latency: Duration) -> RunResults {
        RunResults {
            store_type: self.store_type,
            rounds: self.rounds,
            max_get_latency,
        }
    }
}
