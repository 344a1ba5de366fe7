use anyhow::{Context, Result};
use clap::Parser;
use std::{env, fmt};

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub max_upload_bytes: usize,
    pub memory_store: bool,
    pub storage: StorageConfig,
}

/// Object-store settings as found in the environment. Any of the four
/// credentials may be missing, in which case the gateway starts disabled.
#[derive(Clone, Default)]
pub struct StorageConfig {
    pub endpoint: Option<String>,
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
    pub bucket: Option<String>,
    pub region: String,
}

/// Fully resolved object-store settings.
#[derive(Clone)]
pub struct S3Settings {
    pub endpoint: String,
    pub access_key: String,
    pub secret_key: String,
    pub bucket: String,
    pub region: String,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug, Default)]
#[command(author, version, about = "Song feed backed by S3-compatible object storage")]
pub struct Args {
    /// Host to bind to (overrides SONG_FEED_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides SONG_FEED_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Database URL (overrides DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// Object-store endpoint (overrides R2_ENDPOINT)
    #[arg(long)]
    pub r2_endpoint: Option<String>,

    /// Bucket holding the songs (overrides R2_BUCKET_NAME)
    #[arg(long)]
    pub r2_bucket: Option<String>,

    /// Largest accepted upload in bytes (overrides SONG_FEED_MAX_UPLOAD_BYTES)
    #[arg(long)]
    pub max_upload_bytes: Option<usize>,

    /// Keep objects in process memory instead of an S3 service; song links
    /// are then served by this process under /files
    #[arg(long)]
    pub memory_store: bool,

    /// Run migrations and exit
    #[arg(long)]
    pub migrate: bool,
}

const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 5000;
const DEFAULT_DATABASE_URL: &str = "sqlite://./data/songs.db";
const DEFAULT_REGION: &str = "auto";
const DEFAULT_MAX_UPLOAD_BYTES: usize = 100 * 1024 * 1024;

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and migrate flag.
    pub fn from_env_and_args() -> Result<(Self, bool)> {
        let args = Args::parse();
        let migrate = args.migrate;
        let cfg = Self::resolve(args, |name| env::var(name).ok())?;
        Ok((cfg, migrate))
    }

    /// Merge CLI args over values produced by `lookup` (normally the process
    /// environment). Empty values are treated as unset.
    pub fn resolve<F>(args: Args, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let env_port = match var("SONG_FEED_PORT") {
            Some(value) => value
                .parse::<u16>()
                .with_context(|| format!("parsing SONG_FEED_PORT value `{}`", value))?,
            None => DEFAULT_PORT,
        };
        let env_max_upload = match var("SONG_FEED_MAX_UPLOAD_BYTES") {
            Some(value) => value.parse::<usize>().with_context(|| {
                format!("parsing SONG_FEED_MAX_UPLOAD_BYTES value `{}`", value)
            })?,
            None => DEFAULT_MAX_UPLOAD_BYTES,
        };

        let storage = StorageConfig {
            endpoint: args.r2_endpoint.or_else(|| var("R2_ENDPOINT")),
            access_key: var("R2_ACCESS_KEY_ID"),
            secret_key: var("R2_SECRET_ACCESS_KEY"),
            bucket: args.r2_bucket.or_else(|| var("R2_BUCKET_NAME")),
            region: var("R2_REGION").unwrap_or_else(|| DEFAULT_REGION.into()),
        };

        Ok(Self {
            host: args
                .host
                .or_else(|| var("SONG_FEED_HOST"))
                .unwrap_or_else(|| DEFAULT_HOST.into()),
            port: args.port.unwrap_or(env_port),
            database_url: args
                .database_url
                .or_else(|| var("DATABASE_URL"))
                .unwrap_or_else(|| DEFAULT_DATABASE_URL.into()),
            max_upload_bytes: args.max_upload_bytes.unwrap_or(env_max_upload),
            memory_store: args.memory_store,
            storage,
        })
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl StorageConfig {
    /// Names of the required settings that are not set.
    pub fn missing(&self) -> Vec<&'static str> {
        [
            ("R2_ENDPOINT", &self.endpoint),
            ("R2_ACCESS_KEY_ID", &self.access_key),
            ("R2_SECRET_ACCESS_KEY", &self.secret_key),
            ("R2_BUCKET_NAME", &self.bucket),
        ]
        .into_iter()
        .filter(|(_, value)| value.is_none())
        .map(|(name, _)| name)
        .collect()
    }

    /// `Some` only when endpoint, both keys and the bucket are all present.
    pub fn s3_settings(&self) -> Option<S3Settings> {
        Some(S3Settings {
            endpoint: self.endpoint.clone()?,
            access_key: self.access_key.clone()?,
            secret_key: self.secret_key.clone()?,
            bucket: self.bucket.clone()?,
            region: self.region.clone(),
        })
    }
}

fn redact(value: &Option<String>) -> &'static str {
    if value.is_some() { "<redacted>" } else { "<unset>" }
}

impl fmt::Debug for StorageConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageConfig")
            .field("endpoint", &self.endpoint)
            .field("access_key", &self.access_key)
            .field("secret_key", &redact(&self.secret_key))
            .field("bucket", &self.bucket)
            .field("region", &self.region)
            .finish()
    }
}

impl fmt::Debug for S3Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("S3Settings")
            .field("endpoint", &self.endpoint)
            .field("access_key", &self.access_key)
            .field("secret_key", &"<redacted>")
            .field("bucket", &self.bucket)
            .field("region", &self.region)
            .finish()
    }
}
