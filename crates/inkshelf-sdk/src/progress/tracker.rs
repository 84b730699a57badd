//! 章节阅读进度状态机
//!
//! `Loading → Reading → Saving(防抖中) → Reading → ... → Completed`
//!
//! 不持有定时器：调用方传入时间点，并按 `next_deadline()` 安排下一次 `poll()`。

use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

use crate::sdk::ProgressConfig;
use crate::storage::clamp_percent;
use crate::sync::ChapterProgressUpdate;

/// 正在阅读的章节
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChapterContext {
    pub title_id: String,
    pub chapter_id: String,
    pub chapter_title: Option<String>,
    pub display_title: Option<String>,
    pub cover_image: Option<String>,
    pub total_chapters: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackerPhase {
    /// 尚未读取已保存的进度
    Loading,
    Reading,
    /// 有未提交的进度，等待输入静止
    Saving,
    Completed,
}

#[derive(Debug)]
pub struct ProgressTracker {
    context: ChapterContext,
    config: ProgressConfig,
    loaded: bool,
    saved_percent: Option<u8>,
    /// 本次会话的最高进度
    high_water: u8,
    dirty: bool,
    last_input_at: Option<Instant>,
    last_pushed: Option<u8>,
    completion_pushed: bool,
    completed: bool,
    resume_consumed: bool,
}

impl ProgressTracker {
    pub fn new(context: ChapterContext, config: ProgressConfig) -> Self {
        Self {
            context,
            config,
            loaded: false,
            saved_percent: None,
            high_water: 0,
            dirty: false,
            last_input_at: None,
            last_pushed: None,
            completion_pushed: false,
            completed: false,
            resume_consumed: false,
        }
    }

    pub fn context(&self) -> &ChapterContext {
        &self.context
    }

    pub fn phase(&self) -> TrackerPhase {
        if !self.loaded {
            TrackerPhase::Loading
        } else if self.dirty {
            TrackerPhase::Saving
        } else if self.completed {
            TrackerPhase::Completed
        } else {
            TrackerPhase::Reading
        }
    }

    pub fn high_water(&self) -> u8 {
        self.high_water
    }

    pub fn saved_percent(&self) -> Option<u8> {
        self.saved_percent
    }

    /// 本地已保存的进度读取完成
    pub fn on_loaded(&mut self, saved_percent: Option<u8>) {
        self.saved_percent = saved_percent;
        self.high_water = saved_percent.unwrap_or(0);
        self.completed = self.high_water >= self.config.completion_threshold;
        self.loaded = true;
    }

    /// 记录一次滚动位置；低于最高进度的位置只算作输入活动
    pub fn on_position(&mut self, percent: u8, now: Instant) {
        if !self.loaded {
            debug!("进度尚未加载，忽略位置: {}", percent);
            return;
        }
        let percent = clamp_percent(percent as i64);
        self.last_input_at = Some(now);
        if percent > self.high_water {
            self.high_water = percent;
            self.dirty = true;
        }
    }

    /// 下一次可以提交的时间点
    pub fn next_deadline(&self) -> Option<Instant> {
        if !self.dirty {
            return None;
        }
        self.last_input_at
            .map(|at| at + Duration::from_millis(self.config.debounce_ms))
    }

    /// 输入静止满防抖窗口后返回一次提交
    pub fn poll(&mut self, now: Instant) -> Option<ChapterProgressUpdate> {
        match self.next_deadline() {
            Some(deadline) if now >= deadline => Some(self.commit()),
            _ => None,
        }
    }

    /// 不等防抖，立即提交未保存的进度（关闭章节时）
    pub fn flush(&mut self) -> Option<ChapterProgressUpdate> {
        if self.dirty {
            Some(self.commit())
        } else {
            None
        }
    }

    fn commit(&mut self) -> ChapterProgressUpdate {
        let percent = self.high_water;
        let completed = percent >= self.config.completion_threshold;
        let push_remote = self.should_push(percent, completed);

        if push_remote {
            self.last_pushed = Some(percent);
            if completed {
                self.completion_pushed = true;
            }
        }
        self.completed = completed;
        self.dirty = false;

        ChapterProgressUpdate {
            title_id: self.context.title_id.clone(),
            chapter_id: self.context.chapter_id.clone(),
            chapter_title: self.context.chapter_title.clone(),
            display_title: self.context.display_title.clone(),
            cover_image: self.context.cover_image.clone(),
            total_chapters: self.context.total_chapters,
            percent,
            completed,
            push_remote,
        }
    }

    /// 推送节流：步长整数倍，或本次会话第一次达到完成阈值；已推送过的值不再推送
    fn should_push(&self, percent: u8, completed: bool) -> bool {
        if self.last_pushed.map_or(false, |pushed| percent <= pushed) {
            return false;
        }
        if completed && !self.completion_pushed {
            return true;
        }
        let step = self.config.remote_push_step.max(1);
        percent > 0 && percent % step == 0
    }

    /// 内容高度已知后给出一次续读偏移量；每次打开章节只生效一次
    ///
    /// `scrollable_height <= 0` 表示尺寸尚未确定，不消耗这一次机会。
    pub fn take_resume_offset(&mut self, scrollable_height: f64) -> Option<f64> {
        if self.resume_consumed || !self.loaded || scrollable_height <= 0.0 {
            return None;
        }
        self.resume_consumed = true;
        match self.saved_percent {
            Some(saved) if saved > 0 && saved < 100 => {
                Some(scrollable_height * f64::from(saved) / 100.0)
            }
            _ => None,
        }
    }
}

/// 滚动偏移换算为百分比
pub fn percent_from_scroll(offset: f64, scrollable_height: f64) -> u8 {
    if scrollable_height <= 0.0 || !offset.is_finite() {
        return 0;
    }
    clamp_percent((offset / scrollable_height * 100.0).round() as i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker() -> ProgressTracker {
        let mut tracker = ProgressTracker::new(
            ChapterContext {
                title_id: "solo-leveling".into(),
                chapter_id: "12".into(),
                ..Default::default()
            },
            ProgressConfig::default(),
        );
        tracker.on_loaded(None);
        tracker
    }

    #[test]
    fn burst_collapses_into_single_commit() {
        let mut tracker = tracker();
        let start = Instant::now();
        let mut commits = Vec::new();

        // 200ms 内 50 个事件，最大值出现在中间
        for i in 0..50u64 {
            let at = start + Duration::from_millis(i * 4);
            let percent = if i == 30 { 64 } else { (i % 40) as u8 };
            tracker.on_position(percent, at);
            commits.extend(tracker.poll(at));
        }
        assert!(commits.is_empty());
        assert_eq!(tracker.phase(), TrackerPhase::Saving);

        let last = start + Duration::from_millis(49 * 4);
        assert!(tracker.poll(last + Duration::from_millis(999)).is_none());
        commits.extend(tracker.poll(last + Duration::from_millis(1_000)));
        commits.extend(tracker.poll(last + Duration::from_millis(5_000)));

        assert_eq!(commits.len(), 1);
        assert_eq!(commits[0].percent, 64);
        assert_eq!(tracker.phase(), TrackerPhase::Reading);
    }

    #[test]
    fn pushes_only_on_step_or_first_completion() {
        let mut tracker = tracker();
        let mut now = Instant::now();
        let mut pushed = Vec::new();
        let mut written = 0;

        for percent in 1..=100u8 {
            tracker.on_position(percent, now);
            now += Duration::from_millis(1_100);
            let update = tracker.poll(now).expect("quiescent commit");
            written += 1;
            if update.push_remote {
                pushed.push(update.percent);
            }
        }

        assert_eq!(written, 100);
        assert_eq!(pushed, vec![10, 20, 30, 40, 50, 60, 70, 80, 90, 100]);
        assert_eq!(tracker.phase(), TrackerPhase::Completed);
    }

    #[test]
    fn completion_pushes_first_crossing_off_step() {
        let mut tracker = tracker();
        let now = Instant::now();
        tracker.on_position(93, now);
        let update = tracker.flush().unwrap();
        assert!(update.completed);
        assert!(update.push_remote);

        tracker.on_position(95, now);
        let update = tracker.flush().unwrap();
        assert!(update.completed);
        assert!(!update.push_remote);
    }

    #[test]
    fn never_reports_lower_than_high_water() {
        let mut tracker = tracker();
        let now = Instant::now();
        tracker.on_position(40, now);
        tracker.flush().unwrap();

        tracker.on_position(10, now);
        assert!(tracker.flush().is_none());
        assert_eq!(tracker.high_water(), 40);
    }

    #[test]
    fn positions_before_load_are_ignored() {
        let mut tracker = ProgressTracker::new(ChapterContext::default(), ProgressConfig::default());
        assert_eq!(tracker.phase(), TrackerPhase::Loading);
        tracker.on_position(50, Instant::now());
        assert!(tracker.flush().is_none());
    }

    #[test]
    fn resume_offset_is_produced_once() {
        let mut tracker = ProgressTracker::new(ChapterContext::default(), ProgressConfig::default());
        tracker.on_loaded(Some(40));

        // 尺寸未知时不消耗
        assert_eq!(tracker.take_resume_offset(0.0), None);
        assert_eq!(tracker.take_resume_offset(5_000.0), Some(2_000.0));
        // 图片加载后高度变化，不再覆盖用户的手动滚动
        assert_eq!(tracker.take_resume_offset(8_000.0), None);

        tracker.on_position(percent_from_scroll(1_000.0, 8_000.0), Instant::now());
        assert_eq!(tracker.high_water(), 40);
    }

    #[test]
    fn configurable_threshold_and_step() {
        let config = ProgressConfig {
            debounce_ms: 500,
            completion_threshold: 80,
            remote_push_step: 25,
        };
        let mut tracker = ProgressTracker::new(ChapterContext::default(), config);
        tracker.on_loaded(None);
        let now = Instant::now();

        tracker.on_position(25, now);
        assert!(tracker.poll(now + Duration::from_millis(500)).unwrap().push_remote);
        tracker.on_position(30, now);
        assert!(!tracker.flush().unwrap().push_remote);
        tracker.on_position(81, now);
        let update = tracker.flush().unwrap();
        assert!(update.completed && update.push_remote);
    }

    #[test]
    fn scroll_percent_is_clamped() {
        assert_eq!(percent_from_scroll(500.0, 1_000.0), 50);
        assert_eq!(percent_from_scroll(1_500.0, 1_000.0), 100);
        assert_eq!(percent_from_scroll(-20.0, 1_000.0), 0);
        assert_eq!(percent_from_scroll(10.0, 0.0), 0);
    }
}
