//! Aggregation of wheel timelines across days and condition groups.
//!
//! Each group is a folder of `<date>_wheel_times.csv` files (for example
//! `Meds/` and `NoMeds/`). Only `IN WHEEL` episodes count as running time.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::error::{WheelError, WheelResult};
use crate::timeline::{self, Episode};

pub const CURVE_STEP_SECS: u64 = 60;

#[derive(Debug, Clone, PartialEq)]
pub struct DaySummary {
    pub date: String,
    pub total_s: u64,
    pub episodes: usize,
    pub avg_episode_s: f64,
    pub longest_s: u64,
}

impl DaySummary {
    fn from_episodes(date: &str, in_wheel: &[&Episode]) -> Self {
        let total_s: u64 = in_wheel.iter().map(|e| e.duration_sec).sum();
        let episodes = in_wheel.len();
        DaySummary {
            date: date.to_string(),
            total_s,
            episodes,
            avg_episode_s: if episodes > 0 {
                total_s as f64 / episodes as f64
            } else {
                0.0
            },
            longest_s: in_wheel.iter().map(|e| e.duration_sec).max().unwrap_or(0),
        }
    }

    pub fn total_min(&self) -> f64 {
        self.total_s as f64 / 60.0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub date: String,
    pub episode: Episode,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HourlyBin {
    pub date: String,
    pub hour: usize,
    pub active_seconds: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CurvePoint {
    pub t_sec: u64,
    pub avg_cum_sec: f64,
}

#[derive(Debug, Clone)]
pub struct GroupStats {
    pub name: String,
    pub days: Vec<DaySummary>,
    pub sessions: Vec<Session>,
    pub hourly: Vec<HourlyBin>,
    pub max_video_seconds: u64,
}

impl GroupStats {
    fn mean_of(&self, value: impl Fn(&DaySummary) -> f64) -> f64 {
        if self.days.is_empty() {
            return 0.0;
        }
        self.days.iter().map(value).sum::<f64>() / self.days.len() as f64
    }

    pub fn total_min(&self) -> f64 {
        self.days.iter().map(DaySummary::total_min).sum()
    }

    pub fn mean_daily_min(&self) -> f64 {
        self.mean_of(DaySummary::total_min)
    }

    pub fn mean_episode_s(&self) -> f64 {
        self.mean_of(|d| d.avg_episode_s)
    }

    pub fn mean_episodes_per_day(&self) -> f64 {
        self.mean_of(|d| d.episodes as f64)
    }
}

/// Adds `duration` seconds starting at `start` into one-hour bins, splitting
/// at hour boundaries. Time past the last bin is dropped.
pub fn add_to_hour_bins(start: u64, duration: u64, bins: &mut [u64]) {
    let mut remaining = duration;
    let mut cur = start;
    while remaining > 0 {
        let hour = (cur / 3600) as usize;
        let hour_end = (hour as u64 + 1) * 3600;
        let spill = remaining.min(hour_end - cur);
        if let Some(bin) = bins.get_mut(hour) {
            *bin += spill;
        }
        remaining -= spill;
        cur += spill;
    }
}

fn timeline_files(dir: &Path) -> WheelResult<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && timeline::is_timeline(&path) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

pub fn process_group(name: &str, dir: &Path) -> WheelResult<GroupStats> {
    if !dir.is_dir() {
        return Err(WheelError::MissingGroup(dir.to_path_buf()));
    }
    let files = timeline_files(dir)?;
    if files.is_empty() {
        return Err(WheelError::EmptyGroup(dir.to_path_buf()));
    }

    let mut loaded = Vec::with_capacity(files.len());
    for path in &files {
        let date = timeline::date_of(path);
        let episodes = timeline::load_timeline(path)?;
        tracing::debug!("{:?}: {} episodes", path, episodes.len());
        loaded.push((date, episodes));
    }

    let max_video_seconds = loaded
        .iter()
        .flat_map(|(_, episodes)| episodes.iter().map(|e| e.end_sec))
        .max()
        .unwrap_or(0);
    let hours = (max_video_seconds.div_ceil(3600) as usize).max(1);

    let mut days = Vec::new();
    let mut sessions = Vec::new();
    let mut hourly = Vec::new();
    for (date, episodes) in &loaded {
        let in_wheel: Vec<&Episode> = episodes.iter().filter(|e| e.in_wheel()).collect();
        days.push(DaySummary::from_episodes(date, &in_wheel));

        let mut bins = vec![0u64; hours];
        for episode in &in_wheel {
            add_to_hour_bins(episode.start_sec, episode.duration_sec, &mut bins);
            sessions.push(Session {
                date: date.clone(),
                episode: (*episode).clone(),
            });
        }
        hourly.extend(bins.into_iter().enumerate().map(|(hour, active_seconds)| HourlyBin {
            date: date.clone(),
            hour,
            active_seconds,
        }));
    }

    days.sort_by(|a, b| a.date.cmp(&b.date));
    hourly.sort_by(|a, b| (&a.date, a.hour).cmp(&(&b.date, b.hour)));

    Ok(GroupStats {
        name: name.to_string(),
        days,
        sessions,
        hourly,
        max_video_seconds,
    })
}

/// Average cumulative running time across days on a `step`-second grid
/// covering `0..=max_seconds`. Partial steps at either edge are dropped.
pub fn cumulative_curve(sessions: &[Session], max_seconds: u64, step: u64) -> Vec<CurvePoint> {
    if sessions.is_empty() || step == 0 {
        return Vec::new();
    }

    let len = (max_seconds.div_ceil(step) + 1) as usize;
    let mut by_day: BTreeMap<&str, Vec<u64>> = BTreeMap::new();
    for session in sessions {
        let active = by_day
            .entry(session.date.as_str())
            .or_insert_with(|| vec![0; len]);
        let start = session.episode.start_sec;
        let end = max_seconds.min(start + session.episode.duration_sec);
        if end <= start {
            continue;
        }
        let from = ((start / step) as usize).min(len);
        let to = ((end / step) as usize).min(len);
        for slot in &mut active[from..to] {
            *slot += step;
        }
    }

    let days = by_day.len() as f64;
    let mut sums = vec![0.0f64; len];
    for active in by_day.values() {
        let mut running = 0u64;
        for (sum, value) in sums.iter_mut().zip(active) {
            running += value;
            *sum += running as f64;
        }
    }

    sums.into_iter()
        .enumerate()
        .map(|(i, sum)| CurvePoint {
            t_sec: i as u64 * step,
            avg_cum_sec: sum / days,
        })
        .collect()
}

fn create_csv(path: &Path, header: &str) -> WheelResult<BufWriter<File>> {
    let mut writer = BufWriter::new(File::create(path)?);
    writeln!(writer, "{}", header)?;
    Ok(writer)
}

/// Writes `summary_`, `sessions_`, `hourly_` and `cumulative_` CSVs for one
/// group and returns their paths.
pub fn write_group_outputs(
    out_dir: &Path,
    stats: &GroupStats,
    curve: &[CurvePoint],
) -> WheelResult<Vec<PathBuf>> {
    fs::create_dir_all(out_dir)?;
    let suffix = stats.name.to_lowercase();
    let path_for = |kind: &str| out_dir.join(format!("{}_{}.csv", kind, suffix));

    let summary = path_for("summary");
    let mut w = create_csv(
        &summary,
        "date,total_running_time_s,total_running_time_min,episodes,avg_episode_duration_s,longest_episode_s",
    )?;
    for day in &stats.days {
        // Floats keep their fractional part ("60.0"), as pandas writes them.
        writeln!(
            w,
            "{},{},{:?},{},{:?},{}",
            day.date,
            day.total_s,
            day.total_min(),
            day.episodes,
            day.avg_episode_s,
            day.longest_s
        )?;
    }
    w.flush()?;

    let sessions = path_for("sessions");
    let mut w = create_csv(&sessions, "start_sec,end_sec,duration_seconds,state,date")?;
    for s in &stats.sessions {
        writeln!(
            w,
            "{},{},{},{},{}",
            s.episode.start_sec, s.episode.end_sec, s.episode.duration_sec, s.episode.state, s.date
        )?;
    }
    w.flush()?;

    let hourly = path_for("hourly");
    let mut w = create_csv(&hourly, "date,hour,active_seconds")?;
    for bin in &stats.hourly {
        writeln!(w, "{},{},{}", bin.date, bin.hour, bin.active_seconds)?;
    }
    w.flush()?;

    let cumulative = path_for("cumulative");
    let mut w = create_csv(&cumulative, "t_sec,avg_cum_sec")?;
    for point in curve {
        writeln!(w, "{},{:?}", point.t_sec, point.avg_cum_sec)?;
    }
    w.flush()?;

    Ok(vec![summary, sessions, hourly, cumulative])
}

/// Text report comparing the first group against the second.
pub fn comparison_report(groups: &[GroupStats]) -> String {
    let mut lines = vec!["=== HAMSTER ANALYSIS REPORT ===".to_string()];
    for group in groups {
        lines.push(format!("Days with {}: {}", group.name, group.days.len()));
    }

    lines.push(String::new());
    lines.push("--- Total Running Time ---".to_string());
    for group in groups {
        let total = group.total_min();
        lines.push(format!(
            "{:<12} {:.2} min ({:.2} h)",
            format!("{}:", group.name),
            total,
            total / 60.0
        ));
    }
    if let [first, second, ..] = groups {
        let diff = first.total_min() - second.total_min();
        let sign = if diff >= 0.0 { "+" } else { "-" };
        let pct = if second.total_min() > 0.0 {
            format!("{}{:.2}%", sign, (diff / second.total_min() * 100.0).abs())
        } else {
            "n/a".to_string()
        };
        lines.push(format!(
            "{:<12} {}{:.2} min ({})",
            "Difference:",
            sign,
            diff.abs(),
            pct
        ));
    }

    lines.push(String::new());
    lines.push("--- Averages ---".to_string());
    for group in groups {
        lines.push(format!(
            "Per-day running ({}): {:.2} min/day",
            group.name,
            group.mean_daily_min()
        ));
        lines.push(format!("Avg episode ({}): {:.2} s", group.name, group.mean_episode_s()));
        lines.push(format!(
            "Episodes/day ({}): {:.2}",
            group.name,
            group.mean_episodes_per_day()
        ));
    }

    let mut out = lines.join("\n");
    out.push('\n');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn episode(start: u64, duration: u64, in_wheel: bool) -> Episode {
        Episode {
            start_sec: start,
            end_sec: start + duration,
            duration_sec: duration,
            state: if in_wheel { "IN WHEEL" } else { "NOT IN WHEEL" }.to_string(),
        }
    }

    fn session(date: &str, start: u64, duration: u64) -> Session {
        Session {
            date: date.to_string(),
            episode: episode(start, duration, true),
        }
    }

    #[test]
    fn test_hour_bins_split_at_boundary() {
        let mut bins = vec![0u64; 2];
        add_to_hour_bins(3500, 200, &mut bins);
        assert_eq!(bins, vec![100, 100]);
    }

    #[test]
    fn test_hour_bins_drop_overflow() {
        let mut bins = vec![0u64; 1];
        add_to_hour_bins(3000, 1200, &mut bins);
        assert_eq!(bins, vec![600]);
    }

    #[test]
    fn test_cumulative_curve_averages_days() {
        let sessions = vec![session("d1", 0, 120), session("d2", 60, 60)];
        let curve = cumulative_curve(&sessions, 180, 60);

        let t: Vec<u64> = curve.iter().map(|p| p.t_sec).collect();
        assert_eq!(t, vec![0, 60, 120, 180]);
        // d1: active [60, 60, 0, 0] -> cum [60, 120, 120, 120]
        // d2: active [0, 60, 0, 0]  -> cum [0, 60, 60, 60]
        let avg: Vec<f64> = curve.iter().map(|p| p.avg_cum_sec).collect();
        assert_eq!(avg, vec![30.0, 90.0, 90.0, 90.0]);
    }

    #[test]
    fn test_cumulative_curve_clamps_to_max() {
        let curve = cumulative_curve(&[session("d1", 100, 500)], 180, 60);
        // end clamps to 180: slots 1..3
        let avg: Vec<f64> = curve.iter().map(|p| p.avg_cum_sec).collect();
        assert_eq!(avg, vec![0.0, 60.0, 120.0, 120.0]);
        assert!(cumulative_curve(&[], 180, 60).is_empty());
    }

    fn write_timeline(dir: &Path, date: &str, rows: &[&str]) {
        let mut content = String::from("start_time,end_time,state,duration\n");
        for row in rows {
            content.push_str(row);
            content.push('\n');
        }
        fs::write(dir.join(format!("{}_wheel_times.csv", date)), content).unwrap();
    }

    #[test]
    fn test_process_group() {
        let dir = tempfile::tempdir().unwrap();
        write_timeline(
            dir.path(),
            "2024-05-02",
            &[
                "0:00:00,0:58:00,NOT IN WHEEL,58m 0s",
                "0:58:00,1:02:00,IN WHEEL,4m 0s",
                "1:02:00,1:10:00,NOT IN WHEEL,8m 0s",
            ],
        );
        write_timeline(
            dir.path(),
            "2024-05-01",
            &[
                "0:00:00,0:00:30,IN WHEEL,30s",
                "0:00:30,0:01:00,NOT IN WHEEL,30s",
                "0:01:00,0:02:30,IN WHEEL,1m 30s",
            ],
        );
        fs::write(dir.path().join("notes.txt"), "ignore me").unwrap();

        let stats = process_group("Meds", dir.path()).unwrap();
        assert_eq!(stats.max_video_seconds, 4200);

        assert_eq!(
            stats.days[0],
            DaySummary {
                date: "2024-05-01".to_string(),
                total_s: 120,
                episodes: 2,
                avg_episode_s: 60.0,
                longest_s: 90,
            }
        );
        assert_eq!(stats.days[1].total_s, 240);
        assert_eq!(stats.sessions.len(), 3);

        let day2: Vec<u64> = stats
            .hourly
            .iter()
            .filter(|b| b.date == "2024-05-02")
            .map(|b| b.active_seconds)
            .collect();
        assert_eq!(day2, vec![120, 120]);
        assert_eq!(stats.hourly.len(), 4);
    }

    #[test]
    fn test_empty_group_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            process_group("NoMeds", dir.path()),
            Err(WheelError::EmptyGroup(_))
        ));
    }

    #[test]
    fn test_missing_group_folder_is_named() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("NoMeds");
        let err = process_group("NoMeds", &missing).unwrap_err();
        assert!(matches!(&err, WheelError::MissingGroup(path) if *path == missing));
        assert!(err.to_string().contains("does not exist"));
    }

    #[test]
    fn test_write_group_outputs() {
        let dir = tempfile::tempdir().unwrap();
        write_timeline(dir.path(), "2024-05-01", &["0:00:00,0:01:00,IN WHEEL,1m 0s"]);
        let stats = process_group("Meds", dir.path()).unwrap();
        let curve = cumulative_curve(&stats.sessions, stats.max_video_seconds, CURVE_STEP_SECS);

        let out = dir.path().join("out");
        let written = write_group_outputs(&out, &stats, &curve).unwrap();
        assert_eq!(written.len(), 4);

        let summary = fs::read_to_string(out.join("summary_meds.csv")).unwrap();
        assert_eq!(
            summary.lines().nth(1),
            Some("2024-05-01,60,1.0,1,60.0,60")
        );
        let cumulative = fs::read_to_string(out.join("cumulative_meds.csv")).unwrap();
        assert_eq!(cumulative.lines().collect::<Vec<_>>(), vec!["t_sec,avg_cum_sec", "0,60.0", "60,60.0"]);
    }

    #[test]
    fn test_comparison_report() {
        let meds = GroupStats {
            name: "Meds".to_string(),
            days: vec![DaySummary {
                date: "d1".to_string(),
                total_s: 1800,
                episodes: 3,
                avg_episode_s: 600.0,
                longest_s: 900,
            }],
            sessions: Vec::new(),
            hourly: Vec::new(),
            max_video_seconds: 0,
        };
        let mut no_meds = meds.clone();
        no_meds.name = "NoMeds".to_string();
        no_meds.days[0].total_s = 3600;

        let report = comparison_report(&[meds, no_meds]);
        assert!(report.contains("Days with Meds: 1"));
        assert!(report.contains("Meds:        30.00 min (0.50 h)"));
        assert!(report.contains("Difference:  -30.00 min (-50.00%)"));
        assert!(report.contains("Episodes/day (NoMeds): 3.00"));
        assert!(report.starts_with("=== HAMSTER ANALYSIS REPORT ===\nDays with Meds: 1\n"));
        assert!(report.contains("\n\n--- Averages ---\n"));
        assert!(report.ends_with("Episodes/day (NoMeds): 3.00\n"));
    }
}
