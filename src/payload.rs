//! Value 生成与校验模块
//!
//! 每个 value 长度随机，开头 5 个字节固定为 `0,1,2,3,4`，
//! 末尾 4 个字节为到末尾的距离（倒数第 1 个字节为 1，倒数第 4 个为 4），
//! 中间字节为 `[0,128)` 内的随机数。读回时校验头尾字节，
//! 任何不一致都说明被测缓存返回了错误或被截断的数据。

use crate::config::{FILLER_BYTE_BOUND, HEADER_LEN, MIN_VALUE_LEN, TRAILER_LEN, VALUE_SIZE_SLACK};
use crate::error::{AppError, ChecksumRegion, Corruption, Result};
use rand::Rng;
use rand_distr::{Distribution, Uniform};

/// Value 生成器
#[derive(Debug, Clone)]
pub struct ValueGenerator {
    len_dist: Uniform<usize>,
    filler: Uniform<u8>,
}

impl ValueGenerator {
    /// 生成长度在 `[min_size, max_size + 9]` 内的 value
    pub fn new(min_size: usize, max_size: usize) -> Result<Self> {
        if min_size < MIN_VALUE_LEN {
            return Err(AppError::Config(format!(
                "value size {} cannot hold {} checksum bytes",
                min_size, MIN_VALUE_LEN
            )));
        }
        let upper = max_size.checked_add(VALUE_SIZE_SLACK).ok_or_else(|| {
            AppError::Config(format!("value size {} is too large", max_size))
        })?;
        let len_dist = Uniform::new(min_size, upper)
            .map_err(|e| AppError::Distribution(e.to_string()))?;
        let filler = Uniform::new(0, FILLER_BYTE_BOUND)
            .map_err(|e| AppError::Distribution(e.to_string()))?;
        Ok(Self { len_dist, filler })
    }

    /// 生成一个带头尾校验的 value
    pub fn generate<R: Rng + ?Sized>(&self, rng: &mut R) -> Vec<u8> {
        let len = self.len_dist.sample(rng);
        let mut bytes = vec![0u8; len];
        for (i, byte) in bytes.iter_mut().enumerate() {
            let from_end = len - i;
            *byte = if i < HEADER_LEN {
                i as u8
            } else if from_end <= TRAILER_LEN {
                from_end as u8
            } else {
                self.filler.sample(rng)
            };
        }
        bytes
    }
}

/// 校验 value 的头尾字节，返回第一处不一致
pub fn validate_value(bytes: &[u8]) -> Result<()> {
    let len = bytes.len();
    if len < MIN_VALUE_LEN {
        return Err(AppError::DataCorruption(Corruption {
            region: ChecksumRegion::Length,
            position: MIN_VALUE_LEN,
            expected: 0,
            actual: 0,
            len,
        }));
    }

    for (position, &actual) in bytes[..HEADER_LEN].iter().enumerate() {
        let expected = position as u8;
        if actual != expected {
            return Err(AppError::DataCorruption(Corruption {
                region: ChecksumRegion::Header,
                position,
                expected,
                actual,
                len,
            }));
        }
    }

    for distance in 1..=TRAILER_LEN {
        let position = len - distance;
        let expected = distance as u8;
        let actual = bytes[position];
        if actual != expected {
            return Err(AppError::DataCorruption(Corruption {
                region: ChecksumRegion::Trailer,
                position,
                expected,
                actual,
                len,
            }));
        }
    }

    Ok(())
}

/// 同 [`validate_value`]，只关心是否合法
#[inline]
pub fn is_valid(bytes: &[u8]) -> bool {
    validate_value(bytes).is_ok()
}
