//! Frame timing driven by an external monotonic clock
//!
//! The clock source is the window system's timer (`glfw.get_time()`), so the
//! timer only ever sees plain seconds and stays testable.

/// Frame timer fed with monotonic timestamps in seconds
#[derive(Debug, Clone)]
pub struct FrameTimer {
    last_frame: f64,
    delta_time: f64,
    window_start: f64,
    window_frames: u32,
    report_interval: f64,
    frame_count: u64,
}

impl FrameTimer {
    /// Create a timer starting at `now`, reporting FPS once per second
    pub fn new(now: f64) -> Self {
        Self::with_report_interval(now, 1.0)
    }

    /// Create a timer with a custom FPS report interval in seconds
    pub fn with_report_interval(now: f64, report_interval: f64) -> Self {
        Self {
            last_frame: now,
            delta_time: 0.0,
            window_start: now,
            window_frames: 0,
            report_interval,
            frame_count: 0,
        }
    }

    /// Record a frame at `now`. Returns the average FPS over the last report
    /// interval once that interval has elapsed.
    pub fn tick(&mut self, now: f64) -> Option<f64> {
        self.delta_time = (now - self.last_frame).max(0.0);
        self.last_frame = now;
        self.frame_count += 1;
        self.window_frames += 1;

        let window = now - self.window_start;
        if window >= self.report_interval && window > 0.0 {
            let fps = f64::from(self.window_frames) / window;
            self.window_start = now;
            self.window_frames = 0;
            Some(fps)
        } else {
            None
        }
    }

    /// Seconds between the last two ticks
    pub fn delta_time(&self) -> f64 {
        self.delta_time
    }

    /// Total frames recorded
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_reports_fps_after_interval() {
        let mut timer = FrameTimer::new(0.0);
        for i in 1..60 {
            assert!(timer.tick(f64::from(i) / 60.0).is_none());
        }
        let fps = timer.tick(1.0).unwrap();
        assert_relative_eq!(fps, 60.0, epsilon = 1e-9);
        assert_eq!(timer.frame_count(), 60);
    }

    #[test]
    fn test_delta_time_never_negative() {
        let mut timer = FrameTimer::new(5.0);
        timer.tick(4.0);
        assert_relative_eq!(timer.delta_time(), 0.0);
    }
}
