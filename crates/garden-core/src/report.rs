use crate::orchestrator::ContainerResult;
use crate::CoreError;
use chrono::{DateTime, Local, TimeZone};
use std::fmt::Display;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Receives each result as soon as it is collected.
///
/// Called from the collecting thread only, one result at a time.
pub trait ReportSink: Send {
    fn submit(&self, result: &ContainerResult) -> Result<(), CoreError>;
}

/// Writes results under `<base>/<run timestamp>/<category>/`.
pub struct FsReportSink {
    base: PathBuf,
    run_time: DateTime<Local>,
}

impl FsReportSink {
    /// `run_time` is the operator's local clock, as shown in directory names.
    pub fn new(base: impl Into<PathBuf>, run_time: DateTime<Local>) -> Self {
        Self {
            base: base.into(),
            run_time,
        }
    }

    /// Directory this run's reports land in.
    pub fn run_dir(&self) -> PathBuf {
        self.base.join(report_dir_name(&self.run_time))
    }
}

impl ReportSink for FsReportSink {
    fn submit(&self, result: &ContainerResult) -> Result<(), CoreError> {
        write_report(&self.base, &self.run_time, result).map(|_| ())
    }
}

/// Filesystem-safe directory name for a run, e.g. `16_Oct_26_04-50_UTC`.
///
/// RFC 822 layout with `:` and spaces replaced. Local times carry their
/// offset in place of a zone name (`16_Oct_26_06-50_+02-00`).
pub fn report_dir_name<Tz>(time: &DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    time.format("%d %b %y %H:%M %Z")
        .to_string()
        .replace(':', "-")
        .replace(' ', "_")
}

/// Write one result's files and return the run directory.
///
/// Produces `<name>.txt` (output), `<name>_build.log` and `<name>_error.log`,
/// each only when there is something to write. Files are created exclusively
/// and made read-only; an existing file is an error.
pub fn write_report<Tz>(
    base: &Path,
    time: &DateTime<Tz>,
    result: &ContainerResult,
) -> Result<PathBuf, CoreError>
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    if base.exists() && !base.is_dir() {
        return Err(CoreError::InvalidReportDir(base.to_path_buf()));
    }

    let run_dir = base.join(report_dir_name(time));
    let cat_dir = run_dir.join(&result.identifier.category);
    fs::create_dir_all(&cat_dir)?;

    let name = &result.identifier.name;
    if !result.build_output.is_empty() {
        write_once(&cat_dir.join(format!("{name}_build.log")), &result.build_output)?;
    }
    if !result.output.is_empty() {
        write_once(&cat_dir.join(format!("{name}.txt")), &result.output)?;
    }
    if let Some(err) = &result.error {
        write_once(&cat_dir.join(format!("{name}_error.log")), &err.to_string())?;
    }
    Ok(run_dir)
}

fn write_once(path: &Path, content: &str) -> Result<(), CoreError> {
    let mut file = OpenOptions::new().write(true).create_new(true).open(path)?;
    file.write_all(content.as_bytes())?;
    file.sync_all()?;

    let mut perms = file.metadata()?.permissions();
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        perms.set_mode(0o440);
    }
    #[cfg(not(unix))]
    perms.set_readonly(true);
    fs::set_permissions(path, perms)?;
    Ok(())
}
