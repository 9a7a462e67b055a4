use chrono::{DateTime, Duration, Local, NaiveTime, TimeZone};
use std::sync::RwLock;

/// # Summary
/// 时间供给器接口，用于隔离物理系统时钟。
/// 凭证有效期按本地自然日计算，因此统一返回本地时区时间。
pub trait TimeProvider: Send + Sync {
    /// 获取当前挂载的时间
    fn now(&self) -> DateTime<Local>;
}

/// # Summary
/// 实盘运行使用的真实时钟，直接返回操作系统当前时间。
pub struct RealTimeProvider;

impl TimeProvider for RealTimeProvider {
    fn now(&self) -> DateTime<Local> {
        Local::now()
    }
}

/// # Summary
/// 测试专用虚拟时钟，允许主动拨快或回退时间，用于跨日边界验证。
///
/// # Invariants
/// - 并发安全：内部利用 `RwLock` 提供多线程安全的读写。
pub struct FakeClockProvider {
    current_time: RwLock<DateTime<Local>>,
}

impl FakeClockProvider {
    /// 使用指定的初始时间创建虚拟时钟
    pub fn new(initial_time: DateTime<Local>) -> Self {
        Self {
            current_time: RwLock::new(initial_time),
        }
    }

    /// 强制修改时钟的当前时间
    pub fn set_time(&self, new_time: DateTime<Local>) {
        let mut time = self.current_time.write().unwrap_or_else(|e| e.into_inner());
        *time = new_time;
    }
}

impl TimeProvider for FakeClockProvider {
    fn now(&self) -> DateTime<Local> {
        *self.current_time.read().unwrap_or_else(|e| e.into_inner())
    }
}

/// # Summary
/// 计算给定时刻所在自然日的零点 (同一时区)。
///
/// # Logic
/// 1. 取本地日期并拼接 00:00:00。
/// 2. 遇到夏令时导致零点不存在或有歧义时，取最早的合法时刻；
///    仍无法解析时退回到 `now - 当日已过时长`。
pub fn start_of_day<Tz: TimeZone>(now: &DateTime<Tz>) -> DateTime<Tz> {
    let midnight = now.date_naive().and_time(NaiveTime::MIN);
    match now.timezone().from_local_datetime(&midnight).earliest() {
        Some(start) => start,
        None => {
            let elapsed = now.time() - NaiveTime::MIN;
            now.clone() - Duration::seconds(elapsed.num_seconds())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, Timelike};

    #[test]
    fn test_start_of_day_truncates_to_midnight() {
        let tz = FixedOffset::east_opt(5 * 3600 + 1800).unwrap();
        let now = tz.with_ymd_and_hms(2025, 3, 14, 15, 42, 7).unwrap();
        let start = start_of_day(&now);
        assert_eq!(start, tz.with_ymd_and_hms(2025, 3, 14, 0, 0, 0).unwrap());
        assert_eq!(start.hour(), 0);
    }

    #[test]
    fn test_fake_clock_set_time() {
        let t1 = Local.with_ymd_and_hms(2025, 1, 1, 9, 0, 0).unwrap();
        let t2 = Local.with_ymd_and_hms(2025, 1, 2, 9, 0, 0).unwrap();
        let clock = FakeClockProvider::new(t1);
        assert_eq!(clock.now(), t1);
        clock.set_time(t2);
        assert_eq!(clock.now(), t2);
    }
}
