use std::cmp::Ordering;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use directories::UserDirs;
use git_version::git_version;
use smithay::reexports::rustix::time::{clock_gettime, ClockId};
use smithay::utils::{Logical, Point, Rectangle, Size};

pub mod clock;
pub mod id;
pub mod region;
pub mod serial;

pub fn version() -> String {
    format!(
        "{} ({})",
        env!("CARGO_PKG_VERSION"),
        git_version!(fallback = "unknown commit"),
    )
}

pub fn get_monotonic_time() -> Duration {
    let ts = clock_gettime(ClockId::Monotonic);
    Duration::new(ts.tv_sec as u64, ts.tv_nsec as u32)
}

pub fn center(rect: Rectangle<i32, Logical>) -> Point<i32, Logical> {
    rect.loc + rect.size.downscale(2).to_point()
}

pub fn center_f64(rect: Rectangle<f64, Logical>) -> Point<f64, Logical> {
    rect.loc + rect.size.downscale(2.0).to_point()
}

/// Moves `rect` so that it lies inside `area` as much as possible.
///
/// When `rect` is bigger than `area` along an axis, it is aligned to the area's top-left on that
/// axis.
pub fn clamp_rect_into(
    rect: Rectangle<i32, Logical>,
    area: Rectangle<i32, Logical>,
) -> Rectangle<i32, Logical> {
    let mut loc = rect.loc;
    loc.x = loc.x.min(area.loc.x + area.size.w - rect.size.w);
    loc.x = loc.x.max(area.loc.x);
    loc.y = loc.y.min(area.loc.y + area.size.h - rect.size.h);
    loc.y = loc.y.max(area.loc.y);
    Rectangle::new(loc, rect.size)
}

pub fn clamp_size(
    size: Size<i32, Logical>,
    min: Size<i32, Logical>,
    max: Size<i32, Logical>,
) -> Size<i32, Logical> {
    let mut size = size;
    if max.w > 0 {
        size.w = size.w.min(max.w);
    }
    if max.h > 0 {
        size.h = size.h.min(max.h);
    }
    size.w = size.w.max(min.w);
    size.h = size.h.max(min.h);
    size
}

/// Compares two 32-bit X11/Wayland timestamps, accounting for wraparound.
///
/// Timestamps are considered to be within half of the `u32` range of each other.
pub fn timestamp_compare(a: u32, b: u32) -> Ordering {
    if a == b {
        return Ordering::Equal;
    }

    if a.wrapping_sub(b) < u32::MAX / 2 {
        Ordering::Greater
    } else {
        Ordering::Less
    }
}

pub fn expand_home(path: &Path) -> anyhow::Result<Option<PathBuf>> {
    if let Ok(rest) = path.strip_prefix("~") {
        let dirs = UserDirs::new().context("error retrieving home directory")?;
        Ok(Some([dirs.home_dir(), rest].iter().collect()))
    } else {
        Ok(None)
    }
}

/// Parses a boolean-ish environment value, `1`/`true` meaning on and `0`/`false` meaning off.
pub fn parse_flag(value: &str) -> Option<bool> {
    match value {
        "1" | "true" => Some(true),
        "0" | "false" => Some(false),
        _ => None,
    }
}
