//! Reader for the analyzer's `<date>_wheel_times.csv` episode timelines.

use regex::Regex;
use std::fs;
use std::path::Path;
use std::sync::OnceLock;

use crate::error::{WheelError, WheelResult};

pub const TIMELINE_SUFFIX: &str = "_wheel_times.csv";

const COLUMNS: [&str; 4] = ["start_time", "end_time", "state", "duration"];

#[derive(Debug, Clone, PartialEq)]
pub struct Episode {
    pub start_sec: u64,
    pub end_sec: u64,
    pub duration_sec: u64,
    pub state: String,
}

impl Episode {
    pub fn in_wheel(&self) -> bool {
        self.state.trim().eq_ignore_ascii_case("IN WHEEL")
    }
}

/// `H:MM:SS` offset from the start of the video.
pub fn parse_hms(text: &str) -> Option<u64> {
    let parts = text
        .trim()
        .split(':')
        .map(|p| p.parse::<u64>().ok())
        .collect::<Option<Vec<_>>>()?;
    match parts[..] {
        [h, m, s] => Some(h * 3600 + m * 60 + s),
        _ => None,
    }
}

fn duration_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^(?:(\d+)m(?:in(?:ute)?s?)?)?(?:(\d+)(?:s(?:ec(?:ond)?s?)?)?)?$")
            .expect("valid regex")
    })
}

/// Durations as the analyzer writes them: `1m 23s`, `45s`, `3m`.
///
/// Also accepts `1 min 5 sec` style spellings and bare second counts.
/// Anything unreadable counts as zero.
pub fn parse_duration(text: &str) -> u64 {
    let compact: String = text
        .trim()
        .to_lowercase()
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();
    if compact.is_empty() {
        return 0;
    }

    if let Some(cap) = duration_pattern().captures(&compact) {
        let minutes = cap
            .get(1)
            .and_then(|m| m.as_str().parse::<u64>().ok())
            .unwrap_or(0);
        let seconds = cap
            .get(2)
            .and_then(|m| m.as_str().parse::<u64>().ok())
            .unwrap_or(0);
        return minutes * 60 + seconds;
    }

    let digits: String = compact.chars().filter(|c| c.is_ascii_digit()).collect();
    digits.parse().unwrap_or(0)
}

/// Date prefix of a timeline file name, e.g. `2024-05-01` from
/// `2024-05-01_wheel_times.csv`.
pub fn date_of(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy())
        .and_then(|name| name.split('_').next().map(str::to_string))
        .unwrap_or_default()
}

pub fn is_timeline(path: &Path) -> bool {
    path.file_name()
        .map(|name| name.to_string_lossy().ends_with(TIMELINE_SUFFIX))
        .unwrap_or(false)
}

pub fn load_timeline(path: &Path) -> WheelResult<Vec<Episode>> {
    let content = fs::read_to_string(path)?;
    parse_timeline(path, &content)
}

fn parse_timeline(path: &Path, content: &str) -> WheelResult<Vec<Episode>> {
    let error = |line: usize, message: String| WheelError::Timeline {
        path: path.to_path_buf(),
        line,
        message,
    };

    let mut lines = content.lines().enumerate();
    let header: Vec<String> = match lines.next() {
        Some((_, header)) => header
            .trim_start_matches('\u{feff}')
            .split(',')
            .map(|c| c.trim().to_lowercase())
            .collect(),
        None => return Err(error(1, "file is empty".to_string())),
    };

    let mut index = [0usize; 4];
    for (slot, name) in index.iter_mut().zip(COLUMNS) {
        *slot = header
            .iter()
            .position(|c| c == name)
            .ok_or_else(|| error(1, format!("unexpected columns {:?}", header)))?;
    }

    let mut episodes = Vec::new();
    for (n, line) in lines {
        if line.trim().is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split(',').collect();
        let field = |column: usize| {
            let i = index[column];
            fields
                .get(i)
                .copied()
                .ok_or_else(|| error(n + 1, format!("missing column {}", COLUMNS[column])))
        };

        let start = field(0)?;
        let end = field(1)?;
        episodes.push(Episode {
            start_sec: parse_hms(start)
                .ok_or_else(|| error(n + 1, format!("bad start_time {:?}", start)))?,
            end_sec: parse_hms(end)
                .ok_or_else(|| error(n + 1, format!("bad end_time {:?}", end)))?,
            duration_sec: parse_duration(field(3)?),
            state: field(2)?.trim().to_string(),
        });
    }
    Ok(episodes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_hms() {
        assert_eq!(parse_hms("0:00:00"), Some(0));
        assert_eq!(parse_hms("1:02:03"), Some(3723));
        assert_eq!(parse_hms(" 12:00:05 "), Some(43205));
        assert_eq!(parse_hms("02:03"), None);
        assert_eq!(parse_hms("-"), None);
    }

    #[test]
    fn test_parse_duration_variants() {
        assert_eq!(parse_duration("1m 23s"), 83);
        assert_eq!(parse_duration("1m 23"), 83);
        assert_eq!(parse_duration("45s"), 45);
        assert_eq!(parse_duration("3m"), 180);
        assert_eq!(parse_duration("0s"), 0);
        assert_eq!(parse_duration("2 min 5 sec"), 125);
        assert_eq!(parse_duration("17"), 17);
        assert_eq!(parse_duration(""), 0);
        assert_eq!(parse_duration("about 9 s!"), 9);
        assert_eq!(parse_duration("n/a"), 0);
    }

    #[test]
    fn test_date_of() {
        assert_eq!(
            date_of(Path::new("/data/Meds/2024-05-01_wheel_times.csv")),
            "2024-05-01"
        );
        assert!(is_timeline(Path::new("2024-05-01_wheel_times.csv")));
        assert!(!is_timeline(Path::new("2024-05-01_summary.txt")));
    }

    #[test]
    fn test_parse_timeline() {
        let csv = "Start_Time, End_Time ,state,duration\n\
                   0:00:00,0:01:00,NOT IN WHEEL,1m 0s\n\
                   0:01:00,0:01:45,IN WHEEL,45s\n\
                   \n";
        let episodes = parse_timeline(Path::new("t.csv"), csv).unwrap();
        assert_eq!(episodes.len(), 2);
        assert!(!episodes[0].in_wheel());
        assert_eq!(
            episodes[1],
            Episode {
                start_sec: 60,
                end_sec: 105,
                duration_sec: 45,
                state: "IN WHEEL".to_string(),
            }
        );
    }

    #[test]
    fn test_parse_timeline_rejects_bad_input() {
        let wrong_header = "a,b,c\n0:00:00,0:00:01,IN WHEEL\n";
        assert!(matches!(
            parse_timeline(Path::new("t.csv"), wrong_header),
            Err(WheelError::Timeline { line: 1, .. })
        ));

        let bad_time = "start_time,end_time,state,duration\nx,0:00:01,IN WHEEL,1s\n";
        assert!(matches!(
            parse_timeline(Path::new("t.csv"), bad_time),
            Err(WheelError::Timeline { line: 2, .. })
        ));

        assert!(parse_timeline(Path::new("t.csv"), "").is_err());
    }
}
