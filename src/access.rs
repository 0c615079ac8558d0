//! 访问模式模块
//! 决定每次操作是写还是读，以及读操作落在热集还是冷集

use crate::config::PERCENT;
use crate::error::{AppError, Result};
use rand::Rng;
use rand::rngs::SmallRng;
use rand_distr::{Distribution, Uniform};

/// 操作类型枚举
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Operation {
    Read,
    Write,
}

/// 访问模式选择器，每个工作线程一个，持有自己的随机数生成器
#[derive(Debug)]
pub struct AccessPatternSelector {
    rng: SmallRng,
    percent: Uniform<u32>,
    update_percentage: u32,
    hot_set_percentage: u32,
    max_on_heap_count: u64,
}

impl AccessPatternSelector {
    pub fn new(
        rng: SmallRng,
        update_percentage: u32,
        hot_set_percentage: u32,
        max_on_heap_count: u64,
    ) -> Result<Self> {
        let percent =
            Uniform::new(0, PERCENT).map_err(|e| AppError::Distribution(e.to_string()))?;
        Ok(Self {
            rng,
            percent,
            update_percentage,
            hot_set_percentage,
            max_on_heap_count,
        })
    }

    /// 预热轮一律写；否则 U ~ [0,100)，U < updatePercentage 时写
    #[inline]
    pub fn decide_operation(&mut self, warmup: bool) -> Operation {
        if warmup || self.percent.sample(&mut self.rng) < self.update_percentage {
            Operation::Write
        } else {
            Operation::Read
        }
    }

    /// 选出读操作的 key 序号。
    ///
    /// H ~ [0,100)，H < hotSetPercentage 时从热集 `[0, maxOnHeapCount)` 取，
    /// 否则从 `[0, current_size)` 取。`current_size` 是上一个批次边界时的
    /// 缓存大小，批次内不刷新。区间为空时返回 `None`，调用方跳过这次读。
    #[inline]
    pub fn decide_read_key(&mut self, current_size: u64) -> Option<u64> {
        let bound = if self.percent.sample(&mut self.rng) < self.hot_set_percentage {
            self.max_on_heap_count
        } else {
            current_size
        };
        if bound == 0 {
            return None;
        }
        Some(self.rng.random_range(0..bound))
    }

    /// 工作线程的随机数生成器，同时用于生成 value
    pub fn rng(&mut self) -> &mut SmallRng {
        &mut self.rng
    }
}
