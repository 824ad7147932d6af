//! PotreeConverter discovery and invocation
//!
//! Potree output is a tiled multi-resolution tree that this crate does not
//! build itself. The external `PotreeConverter` executable is invoked on a
//! LAS file and its percent output is forwarded as [`Stage::Tree`] progress.

use crate::error::{ConvertError, Result};
use cloudconv_core::{ProgressSink, ProgressTracker, Stage};
use std::env;
use std::fs;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;

/// Executable names accepted, compared lowercase
const EXECUTABLE_NAMES: [&str; 2] = ["potreeconverter", "potreeconverter.exe"];

fn is_converter_executable(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(|name| EXECUTABLE_NAMES.contains(&name.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// Search `directory` and its subdirectories for a converter executable.
/// Files of a directory are checked before descending into subdirectories.
pub fn find_in_directory(directory: &Path) -> Option<PathBuf> {
    let mut entries: Vec<PathBuf> = fs::read_dir(directory)
        .ok()?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .collect();
    entries.sort();

    if let Some(found) = entries
        .iter()
        .find(|path| path.is_file() && is_converter_executable(path))
    {
        return Some(found.clone());
    }

    entries
        .iter()
        .filter(|path| path.is_dir())
        .find_map(|dir| find_in_directory(dir))
}

/// Percentage in a line of converter output: the number right before the
/// first `%`
pub fn parse_progress_percent(line: &str) -> Option<f32> {
    let end = line.find('%')?;
    let head = &line[..end];
    let start = head
        .rfind(|c: char| !(c.is_ascii_digit() || c == '.'))
        .map(|i| i + 1)
        .unwrap_or(0);
    let number = head[start..].trim_start_matches('.');
    if number.is_empty() {
        return None;
    }
    number.parse::<f32>().ok()
}

/// Call `f` with every line of `reader`, invalid UTF-8 replaced and line
/// endings stripped
fn for_each_line<R: BufRead>(mut reader: R, mut f: impl FnMut(&str)) -> io::Result<()> {
    let mut buffer = Vec::new();
    loop {
        buffer.clear();
        if reader.read_until(b'\n', &mut buffer)? == 0 {
            return Ok(());
        }
        let line = String::from_utf8_lossy(&buffer);
        f(line.trim_end_matches(['\n', '\r']));
    }
}

/// Handle to a located PotreeConverter executable
#[derive(Debug, Clone)]
pub struct PotreeConverter {
    executable: PathBuf,
}

impl PotreeConverter {
    pub fn new(executable: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
        }
    }

    /// Locate the converter. An explicit path may name the executable or a
    /// directory to search; without one the directory of the running binary
    /// is searched.
    pub fn locate(explicit: Option<&Path>) -> Result<Self> {
        match explicit {
            Some(path) if path.is_file() => {
                if is_converter_executable(path) {
                    Ok(Self::new(path))
                } else {
                    Err(ConvertError::ToolNotFound(format!(
                        "{} is not a PotreeConverter executable",
                        path.display()
                    )))
                }
            }
            Some(path) if path.is_dir() => find_in_directory(path).map(Self::new).ok_or_else(|| {
                ConvertError::ToolNotFound(format!(
                    "no PotreeConverter in {} or its subdirectories",
                    path.display()
                ))
            }),
            Some(path) => Err(ConvertError::ToolNotFound(format!(
                "{} does not exist",
                path.display()
            ))),
            None => {
                let current = env::current_exe()?;
                let directory = current.parent().ok_or_else(|| {
                    ConvertError::ToolNotFound(format!("{} has no parent directory", current.display()))
                })?;
                find_in_directory(directory).map(Self::new).ok_or_else(|| {
                    ConvertError::ToolNotFound(format!(
                        "no PotreeConverter next to {}",
                        current.display()
                    ))
                })
            }
        }
    }

    pub fn executable(&self) -> &Path {
        &self.executable
    }

    /// Convert the LAS file `input` into a Potree tree in `target_directory`.
    ///
    /// Blocks until the converter exits. Standard output is parsed line by
    /// line for progress while standard error is drained on a helper thread
    /// into the debug log.
    pub fn run(&self, input: &Path, target_directory: &Path, progress: &mut dyn ProgressSink) -> Result<()> {
        log::info!(
            "running {} on {} -> {}",
            self.executable.display(),
            input.display(),
            target_directory.display()
        );

        let mut child = Command::new(&self.executable)
            .arg(input)
            .arg("-o")
            .arg(target_directory)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                ConvertError::ToolFailed(format!("could not start {}: {}", self.executable.display(), e))
            })?;

        let stderr_drain = child.stderr.take().map(|stderr| {
            thread::spawn(move || {
                let drained = for_each_line(BufReader::new(stderr), |line| {
                    log::debug!("PotreeConverter: {}", line);
                });
                if let Err(e) = drained {
                    log::debug!("stopped reading PotreeConverter stderr: {}", e);
                }
            })
        });

        let mut tracker = ProgressTracker::new(progress, Stage::Tree, 100);
        let forwarded = match child.stdout.take() {
            Some(stdout) => for_each_line(BufReader::new(stdout), |line| {
                log::debug!("PotreeConverter: {}", line);
                if let Some(percent) = parse_progress_percent(line) {
                    tracker.update(percent.clamp(0.0, 100.0) as u64);
                }
            }),
            None => Ok(()),
        };
        // The converter must not outlive this call, its input may be removed
        // as soon as we return
        if let Err(e) = &forwarded {
            log::warn!("could not read PotreeConverter output: {}", e);
            if let Err(e) = child.kill() {
                log::debug!("could not stop PotreeConverter: {}", e);
            }
        }

        let status = child.wait()?;
        if let Some(handle) = stderr_drain {
            if handle.join().is_err() {
                log::warn!("PotreeConverter stderr reader panicked");
            }
        }
        forwarded?;

        if !status.success() {
            return Err(ConvertError::ToolFailed(format!(
                "{} exited with {}",
                self.executable.display(),
                status
            )));
        }
        tracker.finish();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_progress_percent() {
        assert_eq!(parse_progress_percent("[12%, 3s], [INDEXING: 5%]"), Some(12.0));
        assert_eq!(parse_progress_percent("progress 100%"), Some(100.0));
        assert_eq!(parse_progress_percent("[ 7.5% ]"), Some(7.5));
        assert_eq!(parse_progress_percent("no percent here"), None);
        assert_eq!(parse_progress_percent("% at start"), None);
        assert_eq!(parse_progress_percent("ratio a%"), None);
    }

    #[test]
    fn test_output_lines_tolerate_invalid_utf8() {
        let output: &[u8] = b"reading \xffscan.las\r\n[ 40%, 1s]\n\nlast";
        let mut lines = Vec::new();
        for_each_line(output, |line| lines.push(line.to_string())).unwrap();
        assert_eq!(lines, vec!["reading \u{FFFD}scan.las", "[ 40%, 1s]", "", "last"]);
        assert_eq!(parse_progress_percent(&lines[1]), Some(40.0));
    }

    #[test]
    fn test_executable_names() {
        assert!(is_converter_executable(Path::new("/opt/PotreeConverter")));
        assert!(is_converter_executable(Path::new("C:/tools/PotreeConverter.exe")));
        assert!(!is_converter_executable(Path::new("/opt/PotreeConverter.sh")));
        assert!(!is_converter_executable(Path::new("/opt/converter")));
    }

    #[test]
    fn test_find_in_nested_directory() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("tools").join("potree");
        fs::create_dir_all(&nested).unwrap();
        fs::write(dir.path().join("readme.txt"), "").unwrap();
        fs::write(nested.join("PotreeConverter.exe"), "").unwrap();

        assert_eq!(find_in_directory(dir.path()), Some(nested.join("PotreeConverter.exe")));
        let located = PotreeConverter::locate(Some(dir.path())).unwrap();
        assert_eq!(located.executable(), nested.join("PotreeConverter.exe"));
    }

    #[test]
    fn test_locate_errors() {
        let dir = tempfile::tempdir().unwrap();
        let other = dir.path().join("converter.bin");
        fs::write(&other, "").unwrap();

        assert!(matches!(
            PotreeConverter::locate(Some(&other)),
            Err(ConvertError::ToolNotFound(_))
        ));
        assert!(matches!(
            PotreeConverter::locate(Some(dir.path())),
            Err(ConvertError::ToolNotFound(_))
        ));
        assert!(matches!(
            PotreeConverter::locate(Some(&dir.path().join("missing"))),
            Err(ConvertError::ToolNotFound(_))
        ));
    }
}
