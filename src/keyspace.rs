//! Key 空间模块
//! Key 命名，以及把 key 空间切成每个工作线程一段的连续区间

use crate::config::{KEY_PREFIX, KEY_SUFFIX};
use std::ops::Range;

/// 由序号生成 key，格式为 `K{n}-`
#[inline]
pub fn key_for(index: u64) -> String {
    format!("{}{}{}", KEY_PREFIX, index, KEY_SUFFIX)
}

/// 把 `[0, entry_count)` 切成 `thread_count` 段互不重叠的连续区间。
///
/// 第 `t` 段为 `[⌊N/T⌋·t, ⌊N/T⌋·(t+1))`。`entry_count` 不能被整除时，
/// 末尾 `N mod T` 个 key 不属于任何区间，永远不会被访问。
pub fn partition(entry_count: u64, thread_count: usize) -> Vec<Range<u64>> {
    if thread_count == 0 {
        return Vec::new();
    }
    let per_thread = entry_count / thread_count as u64;
    (0..thread_count as u64)
        .map(|t| per_thread * t..per_thread * (t + 1))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_format() {
        assert_eq!(key_for(0), "K0-");
        assert_eq!(key_for(1234), "K1234-");
    }

    #[test]
    fn even_split() {
        let ranges = partition(1000, 4);
        assert_eq!(ranges, vec![0..250, 250..500, 500..750, 750..1000]);
    }

    #[test]
    fn remainder_is_dropped() {
        let ranges = partition(10, 3);
        assert_eq!(ranges, vec![0..3, 3..6, 6..9]);
        assert!(ranges.iter().all(|r| !r.contains(&9)));
    }

    #[test]
    fn fewer_entries_than_threads() {
        let ranges = partition(3, 8);
        assert_eq!(ranges.len(), 8);
        assert!(ranges.iter().all(|r| r.is_empty()));
    }

    #[test]
    fn no_threads() {
        assert!(partition(100, 0).is_empty());
    }
}
