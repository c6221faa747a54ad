//! Application directory: configuration and the TLS identity.
//!
//! Layout:
//! - `config.toml`: rendezvous service and session tunables
//! - `cert.pem` / `key.pem`: the certificate shared by both peers
//!
//! The directory defaults to `~/.config/peershift` (`%APPDATA%/peershift` on
//! Windows) and can be overridden with `--app-dir`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, bail};
use peershift_session::tls::parse_certificates;
use peershift_session::{RendezvousSettings, SessionOptions, TlsContext, TlsIdentity, protocol};
use serde::{Deserialize, Serialize};

const CONFIG_FILE: &str = "config.toml";
const CERT_FILE: &str = "cert.pem";
const KEY_FILE: &str = "key.pem";

/// User configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Host name or address of the rendezvous service.
    #[serde(default = "default_rendezvous_host")]
    pub rendezvous_host: String,

    #[serde(default = "default_rendezvous_port")]
    pub rendezvous_port: u16,

    /// PEM certificate of the rendezvous service, pinned in addition to the
    /// shared peer certificate. Relative paths resolve against the app dir.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rendezvous_certificate: Option<PathBuf>,

    /// How long a downloader waits for the uploader, in seconds.
    #[serde(default = "default_accept_timeout")]
    pub accept_timeout_secs: u64,

    /// Upper bound on a content chunk, in bytes.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
}

fn default_rendezvous_host() -> String {
    "localhost".into()
}

fn default_rendezvous_port() -> u16 {
    50977
}

fn default_accept_timeout() -> u64 {
    peershift_session::ACCEPT_TIMEOUT.as_secs()
}

fn default_chunk_size() -> usize {
    protocol::DEFAULT_CHUNK_SIZE
}

impl Default for Config {
    fn default() -> Self {
        Self {
            rendezvous_host: default_rendezvous_host(),
            rendezvous_port: default_rendezvous_port(),
            rendezvous_certificate: None,
            accept_timeout_secs: default_accept_timeout(),
            chunk_size: default_chunk_size(),
        }
    }
}

impl Config {
    pub fn rendezvous(&self) -> RendezvousSettings {
        RendezvousSettings {
            host: self.rendezvous_host.clone(),
            port: self.rendezvous_port,
        }
    }

    pub fn session_options(&self) -> anyhow::Result<SessionOptions> {
        if self.chunk_size == 0 {
            bail!("chunk_size must be greater than zero");
        }
        Ok(SessionOptions {
            chunk_size: self.chunk_size,
            accept_timeout: Duration::from_secs(self.accept_timeout_secs),
            ..SessionOptions::default()
        })
    }
}

/// Handle to the application directory.
#[derive(Debug, Clone)]
pub struct Storage {
    dir: PathBuf,
}

impl Storage {
    /// Opens `app_dir`, or the platform default, creating it if needed.
    pub fn open(app_dir: Option<PathBuf>) -> anyhow::Result<Self> {
        let dir = match app_dir {
            Some(dir) => dir,
            None => default_app_dir(),
        };
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("cannot create app directory {}", dir.display()))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Loads the configuration, writing the defaults on first use.
    pub fn config(&self) -> anyhow::Result<Config> {
        let path = self.dir.join(CONFIG_FILE);

        if path.exists() {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("cannot read {}", path.display()))?;
            toml::from_str(&content).with_context(|| format!("invalid {}", path.display()))
        } else {
            let config = Config::default();
            self.save_config(&config)?;
            Ok(config)
        }
    }

    pub fn save_config(&self, config: &Config) -> anyhow::Result<()> {
        let path = self.dir.join(CONFIG_FILE);
        let content = toml::to_string_pretty(config)?;
        write_private(&path, content.as_bytes())?;
        tracing::debug!(path = %path.display(), "configuration saved");
        Ok(())
    }

    /// Loads the certificate and key, generating a self-signed pair if
    /// either is missing.
    pub fn identity(&self) -> anyhow::Result<TlsIdentity> {
        let cert_path = self.dir.join(CERT_FILE);
        let key_path = self.dir.join(KEY_FILE);

        if !cert_path.exists() || !key_path.exists() {
            let certified = rcgen::generate_simple_self_signed(vec!["peershift".to_string()])
                .context("cannot generate a certificate")?;
            write_private(&key_path, certified.key_pair.serialize_pem().as_bytes())?;
            std::fs::write(&cert_path, certified.cert.pem())
                .with_context(|| format!("cannot write {}", cert_path.display()))?;
            tracing::info!(path = %cert_path.display(), "generated a new certificate");
        }

        let cert_pem = std::fs::read(&cert_path)
            .with_context(|| format!("cannot read {}", cert_path.display()))?;
        let key_pem = std::fs::read(&key_path)
            .with_context(|| format!("cannot read {}", key_path.display()))?;
        TlsIdentity::from_pem(&cert_pem, &key_pem).context("invalid certificate or key")
    }

    /// Builds the TLS context: this identity plus the optional rendezvous pin.
    pub fn tls_context(&self, config: &Config) -> anyhow::Result<TlsContext> {
        let identity = self.identity()?;

        let extra_pins = match &config.rendezvous_certificate {
            Some(path) => {
                let path = self.dir.join(path);
                let pem = std::fs::read(&path)
                    .with_context(|| format!("cannot read {}", path.display()))?;
                parse_certificates(&pem)
                    .with_context(|| format!("invalid certificate in {}", path.display()))?
            }
            None => Vec::new(),
        };

        TlsContext::new(&identity, extra_pins).context("cannot set up TLS")
    }
}

fn default_app_dir() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        let appdata =
            std::env::var("APPDATA").unwrap_or_else(|_| "C:\\Users\\Default\\AppData".into());
        PathBuf::from(appdata).join("peershift")
    }

    #[cfg(not(target_os = "windows"))]
    {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
        PathBuf::from(home).join(".config").join("peershift")
    }
}

/// Writes a file readable only by its owner on Unix.
///
/// New files are created with mode 0600 so the contents are never exposed,
/// and files left over from an earlier run are narrowed before writing.
fn write_private(path: &Path, contents: &[u8]) -> anyhow::Result<()> {
    use std::io::Write;

    let mut options = std::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let mut file = options
        .open(path)
        .with_context(|| format!("cannot write {}", path.display()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(std::fs::Permissions::from_mode(0o600))?;
    }

    file.write_all(contents)
        .with_context(|| format!("cannot write {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn storage() -> (tempfile::TempDir, Storage) {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::open(Some(dir.path().join("app"))).unwrap();
        (dir, storage)
    }

    #[test]
    fn first_load_writes_defaults() {
        let (_dir, storage) = storage();
        let config = storage.config().unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.rendezvous_port, 50977);
        assert!(storage.dir().join(CONFIG_FILE).exists());
    }

    #[test]
    fn partial_config_falls_back_to_defaults() {
        let (_dir, storage) = storage();
        std::fs::write(
            storage.dir().join(CONFIG_FILE),
            "rendezvous_host = \"rv.example.net\"\n",
        )
        .unwrap();

        let config = storage.config().unwrap();
        assert_eq!(config.rendezvous_host, "rv.example.net");
        assert_eq!(config.rendezvous_port, 50977);
        assert_eq!(config.chunk_size, protocol::DEFAULT_CHUNK_SIZE);
    }

    #[test]
    fn saved_config_round_trips() {
        let (_dir, storage) = storage();
        let config = Config {
            rendezvous_port: 4000,
            rendezvous_certificate: Some("service.pem".into()),
            accept_timeout_secs: 5,
            ..Config::default()
        };
        storage.save_config(&config).unwrap();
        assert_eq!(storage.config().unwrap(), config);

        let options = config.session_options().unwrap();
        assert_eq!(options.accept_timeout, Duration::from_secs(5));
    }

    #[test]
    fn zero_chunk_size_is_rejected() {
        let config = Config {
            chunk_size: 0,
            ..Config::default()
        };
        assert!(config.session_options().is_err());
    }

    #[test]
    fn identity_is_generated_once() {
        let (_dir, storage) = storage();
        let first = storage.identity().unwrap();
        let second = storage.identity().unwrap();
        assert_eq!(first.certificate(), second.certificate());

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(storage.dir().join(KEY_FILE))
                .unwrap()
                .permissions()
                .mode();
            assert_eq!(mode & 0o777, 0o600);
        }
    }

    #[test]
    fn rendezvous_certificate_is_resolved_in_app_dir() {
        let (_dir, storage) = storage();
        let service = rcgen::generate_simple_self_signed(vec!["rendezvous".to_string()]).unwrap();
        std::fs::write(storage.dir().join("service.pem"), service.cert.pem()).unwrap();

        let config = Config {
            rendezvous_certificate: Some("service.pem".into()),
            ..Config::default()
        };
        storage.tls_context(&config).unwrap();

        let missing = Config {
            rendezvous_certificate: Some("absent.pem".into()),
            ..Config::default()
        };
        assert!(storage.tls_context(&missing).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn private_files_are_owner_only_even_if_they_existed() {
        use std::os::unix::fs::PermissionsExt;
        let (_dir, storage) = storage();
        let mode = |path: &Path| std::fs::metadata(path).unwrap().permissions().mode() & 0o777;

        let fresh = storage.dir().join("fresh.pem");
        write_private(&fresh, b"secret").unwrap();
        assert_eq!(mode(&fresh), 0o600);

        let stale = storage.dir().join("stale.pem");
        std::fs::write(&stale, b"old contents that are longer").unwrap();
        std::fs::set_permissions(&stale, std::fs::Permissions::from_mode(0o644)).unwrap();
        write_private(&stale, b"secret").unwrap();
        assert_eq!(mode(&stale), 0o600);
        assert_eq!(std::fs::read(&stale).unwrap(), b"secret");
    }
}
