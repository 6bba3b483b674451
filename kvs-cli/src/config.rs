//! Runtime settings for the three executables, built from their CLI
//! arguments and validated before anything is spawned.

use std::path::{Path, PathBuf};

use serde_derive::{Deserialize, Serialize};

use kvs::error::{Error, KvResult};
use kvs::protocol::MAX_PIPE_PATH_LEN;

/// Directory the well-known registration FIFO and the per-client pipes
/// live in.
pub const PIPE_DIR: &str = "/tmp";

/// Settings for `kvs-batch`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BatchSettings {
    pub jobs_dir: PathBuf,
    pub max_backups: usize,
    pub max_threads: usize,
}

impl BatchSettings {
    pub fn validate(&self) -> KvResult<()> {
        validate_jobs_dir(&self.jobs_dir)?;
        validate_positive(self.max_backups, "max_backups")?;
        validate_positive(self.max_threads, "max_threads")
    }
}

/// Settings for `kvs-server`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerSettings {
    pub jobs_dir: PathBuf,
    pub max_threads: usize,
    pub max_backups: usize,
    pub fifo_name: String,
}

impl ServerSettings {
    /// Absolute path of the registration FIFO, `/tmp/<name>`.
    pub fn registration_path(&self) -> PathBuf {
        Path::new(PIPE_DIR).join(&self.fifo_name)
    }

    pub fn validate(&self) -> KvResult<()> {
        validate_jobs_dir(&self.jobs_dir)?;
        validate_positive(self.max_threads, "max_threads")?;
        validate_positive(self.max_backups, "max_backups")?;
        validate_pipe_path(&self.registration_path(), "registration FIFO")
    }
}

/// Settings for `kvs-client`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ClientSettings {
    pub client_id: String,
    pub fifo_name: String,
}

impl ClientSettings {
    pub fn registration_path(&self) -> PathBuf {
        Path::new(PIPE_DIR).join(&self.fifo_name)
    }

    pub fn request_path(&self) -> PathBuf {
        Path::new(PIPE_DIR).join(format!("req{}", self.client_id))
    }

    pub fn response_path(&self) -> PathBuf {
        Path::new(PIPE_DIR).join(format!("resp{}", self.client_id))
    }

    pub fn notification_path(&self) -> PathBuf {
        Path::new(PIPE_DIR).join(format!("notif{}", self.client_id))
    }

    pub fn validate(&self) -> KvResult<()> {
        if self.client_id.is_empty() {
            return Err(Error::InvalidInput("client id must not be empty".to_string()));
        }
        validate_pipe_path(&self.registration_path(), "registration FIFO")?;
        for (path, what) in [
            (self.request_path(), "request pipe"),
            (self.response_path(), "response pipe"),
            (self.notification_path(), "notification pipe"),
        ] {
            validate_pipe_path(&path, what)?;
        }
        Ok(())
    }
}

fn validate_positive(value: usize, what: &str) -> KvResult<()> {
    if value == 0 {
        return Err(Error::InvalidInput(format!("{what} must be a positive integer")));
    }
    Ok(())
}

fn validate_jobs_dir(dir: &Path) -> KvResult<()> {
    if !dir.is_dir() {
        return Err(Error::InvalidInput(format!(
            "jobs directory {} does not exist",
            dir.display()
        )));
    }
    Ok(())
}

/// Pipe paths must fit the fixed-width CONNECT frame fields.
fn validate_pipe_path(path: &Path, what: &str) -> KvResult<()> {
    let len = path.as_os_str().len();
    if len <= PIPE_DIR.len() + 1 {
        return Err(Error::InvalidInput(format!("{what} name must not be empty")));
    }
    if len > MAX_PIPE_PATH_LEN {
        return Err(Error::InvalidInput(format!(
            "{what} path {} exceeds {MAX_PIPE_PATH_LEN} bytes",
            path.display()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_paths_follow_the_id() {
        let settings = ClientSettings { client_id: "7".to_string(), fifo_name: "reg".to_string() };
        assert_eq!(settings.request_path(), PathBuf::from("/tmp/req7"));
        assert_eq!(settings.response_path(), PathBuf::from("/tmp/resp7"));
        assert_eq!(settings.notification_path(), PathBuf::from("/tmp/notif7"));
        assert_eq!(settings.registration_path(), PathBuf::from("/tmp/reg"));
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn client_settings_reject_oversized_paths() {
        let settings = ClientSettings {
            client_id: "x".repeat(40),
            fifo_name: "reg".to_string(),
        };
        assert!(settings.validate().is_err());

        let settings = ClientSettings { client_id: String::new(), fifo_name: "reg".to_string() };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn batch_settings_require_positive_bounds() {
        let dir = tempfile::tempdir().unwrap();
        let good = BatchSettings {
            jobs_dir: dir.path().to_path_buf(),
            max_backups: 1,
            max_threads: 2,
        };
        assert!(good.validate().is_ok());

        let zero_backups = BatchSettings { max_backups: 0, ..good.clone() };
        assert!(zero_backups.validate().is_err());
        let zero_threads = BatchSettings { max_threads: 0, ..good.clone() };
        assert!(zero_threads.validate().is_err());
        let missing_dir = BatchSettings {
            jobs_dir: dir.path().join("nope"),
            ..good
        };
        assert!(missing_dir.validate().is_err());
    }

    #[test]
    fn server_settings_validate_the_fifo_name() {
        let dir = tempfile::tempdir().unwrap();
        let good = ServerSettings {
            jobs_dir: dir.path().to_path_buf(),
            max_threads: 2,
            max_backups: 1,
            fifo_name: "registry".to_string(),
        };
        assert!(good.validate().is_ok());
        assert_eq!(good.registration_path(), PathBuf::from("/tmp/registry"));

        let long_name = ServerSettings { fifo_name: "f".repeat(40), ..good.clone() };
        assert!(long_name.validate().is_err());
        let empty_name = ServerSettings { fifo_name: String::new(), ..good };
        assert!(empty_name.validate().is_err());
    }
}
