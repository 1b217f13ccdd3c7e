// Progress-scale reconciliation.
//
// A task's 0-100 scale is split between the orchestrator (0-20 setup,
// 90-100 finalize), the engine (15-90) and the direct fetcher (20-90).
// The engine reports progress in one of three shapes; each shape has its own
// reconciliation into the shared scale.

/// One progress event from the download engine.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EngineProgress {
    /// Exact byte counts: the server declared a total.
    Exact { downloaded: u64, total: u64 },
    /// Byte counts against an engine-estimated total.
    Estimated { downloaded: u64, total: u64 },
    /// Bare percentage, 0.0-100.0.
    Percent(f64),
}

/// Lower bound of the engine's slice of the task scale.
pub const ENGINE_PROGRESS_FLOOR: u8 = 15;
/// Upper bound of the engine's slice of the task scale.
pub const ENGINE_PROGRESS_CEIL: u8 = 90;
/// Reported when a progress event cannot be parsed: the midpoint of the
/// engine's slice.
pub const ENGINE_PROGRESS_FALLBACK: u8 = 52;

/// Lower bound of the direct fetcher's slice of the task scale.
pub const FETCH_PROGRESS_FLOOR: u8 = 20;

impl EngineProgress {
    /// Fraction of the download completed, clamped to [0, 1].
    fn fraction(&self) -> f64 {
        let raw = match *self {
            Self::Exact { downloaded, total } | Self::Estimated { downloaded, total } => {
                if total == 0 {
                    return 0.0;
                }
                downloaded as f64 / total as f64
            }
            Self::Percent(p) => p / 100.0,
        };
        raw.clamp(0.0, 1.0)
    }

    /// Linearly interpolate this event into the engine's 15-90 slice.
    pub fn to_task_progress(&self) -> u8 {
        let span = (ENGINE_PROGRESS_CEIL - ENGINE_PROGRESS_FLOOR) as f64;
        ENGINE_PROGRESS_FLOOR + (self.fraction() * span).floor() as u8
    }
}

/// Progress of a direct byte fetch: `20 + floor(received / total * 70)`.
///
/// Only meaningful when the server declared a content length; callers skip
/// reporting otherwise.
pub fn direct_fetch_progress(received: u64, total: u64) -> u8 {
    if total == 0 {
        return FETCH_PROGRESS_FLOOR;
    }
    let fraction = (received as f64 / total as f64).clamp(0.0, 1.0);
    FETCH_PROGRESS_FLOOR + (fraction * 70.0).floor() as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_shape_interpolates_into_engine_slice() {
        let start = EngineProgress::Exact {
            downloaded: 0,
            total: 1000,
        };
        let half = EngineProgress::Exact {
            downloaded: 500,
            total: 1000,
        };
        let done = EngineProgress::Exact {
            downloaded: 1000,
            total: 1000,
        };
        assert_eq!(start.to_task_progress(), 15);
        assert_eq!(half.to_task_progress(), 52);
        assert_eq!(done.to_task_progress(), 90);
    }

    #[test]
    fn estimated_shape_matches_exact_math() {
        let p = EngineProgress::Estimated {
            downloaded: 250,
            total: 1000,
        };
        let q = EngineProgress::Exact {
            downloaded: 250,
            total: 1000,
        };
        assert_eq!(p.to_task_progress(), q.to_task_progress());
    }

    #[test]
    fn percent_shape_clamps_out_of_range_values() {
        assert_eq!(EngineProgress::Percent(0.0).to_task_progress(), 15);
        assert_eq!(EngineProgress::Percent(100.0).to_task_progress(), 90);
        assert_eq!(EngineProgress::Percent(250.0).to_task_progress(), 90);
        assert_eq!(EngineProgress::Percent(-5.0).to_task_progress(), 15);
    }

    #[test]
    fn zero_total_does_not_divide() {
        let p = EngineProgress::Exact {
            downloaded: 100,
            total: 0,
        };
        assert_eq!(p.to_task_progress(), 15);
    }

    #[test]
    fn fallback_is_the_slice_midpoint() {
        assert_eq!(ENGINE_PROGRESS_FALLBACK, 52);
        assert_eq!(
            EngineProgress::Percent(50.0).to_task_progress(),
            ENGINE_PROGRESS_FALLBACK
        );
    }

    #[test]
    fn direct_fetch_owns_twenty_to_ninety() {
        assert_eq!(direct_fetch_progress(0, 100), 20);
        assert_eq!(direct_fetch_progress(50, 100), 55);
        assert_eq!(direct_fetch_progress(100, 100), 90);
        assert_eq!(direct_fetch_progress(0, 0), 20);
    }

    #[test]
    fn direct_fetch_is_monotone_in_received_bytes() {
        let total = 10_000u64;
        let mut last = 0;
        for received in (0..=total).step_by(117) {
            let p = direct_fetch_progress(received, total);
            assert!(p >= last);
            last = p;
        }
    }
}
