//! Connection and behaviour options for the SQL certificate store
//!
//! The options describe how to reach the backing engine and how long each
//! operation may take. They are plain data; [`crate::SqlStorage::connect`]
//! turns them into a live pool.

use std::time::Duration;

use sea_orm::{ConnectOptions, IsolationLevel};

/// Lock lifetime used when none is configured
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(60);

/// Upper bound for a single store operation
pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(3);

/// Default CockroachDB SQL port
pub const DEFAULT_PORT: u16 = 26257;

/// Connection pool sizing and timeouts
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PoolOptions {
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout: Duration,
    pub acquire_timeout: Duration,
    pub idle_timeout: Duration,
    pub max_lifetime: Duration,
}

impl Default for PoolOptions {
    fn default() -> Self {
        Self {
            max_connections: 10,
            min_connections: 1,
            connect_timeout: Duration::from_secs(30),
            acquire_timeout: Duration::from_secs(8),
            idle_timeout: Duration::from_secs(10),
            max_lifetime: Duration::from_secs(1800),
        }
    }
}

/// Options for [`crate::SqlStorage`]
#[derive(Clone, Debug)]
pub struct StorageOptions {
    pub user: String,
    pub password: Option<String>,
    pub host: String,
    pub port: u16,
    pub database: String,
    /// Client certificate path
    pub cert: Option<String>,
    /// Client key path
    pub key: Option<String>,
    /// Root CA path
    pub root_cert: Option<String>,
    /// Full connection URL. When set, the fields above are not used to build one.
    pub url: Option<String>,
    pub lock_timeout: Duration,
    pub query_timeout: Duration,
    /// Isolation level for lock acquisition. SQLite ignores it.
    pub isolation: IsolationLevel,
    pub pool: PoolOptions,
    pub sql_logging: bool,
}

impl Default for StorageOptions {
    fn default() -> Self {
        Self {
            user: "certvault".to_string(),
            password: None,
            host: "localhost".to_string(),
            port: DEFAULT_PORT,
            database: "certvault".to_string(),
            cert: None,
            key: None,
            root_cert: None,
            url: None,
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
            query_timeout: DEFAULT_QUERY_TIMEOUT,
            isolation: IsolationLevel::Serializable,
            pool: PoolOptions::default(),
            sql_logging: false,
        }
    }
}

impl StorageOptions {
    pub fn new(user: &str, host: &str, port: u16, database: &str) -> Self {
        Self {
            user: user.to_string(),
            host: host.to_string(),
            port,
            database: database.to_string(),
            ..Default::default()
        }
    }

    /// Options that connect straight to `url`, e.g. `sqlite::memory:`.
    pub fn from_url(url: &str) -> Self {
        Self {
            url: Some(url.to_string()),
            ..Default::default()
        }
    }

    pub fn with_password(mut self, password: &str) -> Self {
        self.password = non_empty(Some(password.to_string()));
        self
    }

    pub fn with_tls(mut self, cert: &str, key: &str, root_cert: &str) -> Self {
        self.cert = non_empty(Some(cert.to_string()));
        self.key = non_empty(Some(key.to_string()));
        self.root_cert = non_empty(Some(root_cert.to_string()));
        self
    }

    /// A zero duration keeps the one-minute default.
    pub fn with_lock_timeout(mut self, lock_timeout: Duration) -> Self {
        self.lock_timeout = if lock_timeout.is_zero() {
            DEFAULT_LOCK_TIMEOUT
        } else {
            lock_timeout
        };
        self
    }

    pub fn with_query_timeout(mut self, query_timeout: Duration) -> Self {
        self.query_timeout = query_timeout;
        self
    }

    pub fn with_isolation(mut self, isolation: IsolationLevel) -> Self {
        self.isolation = isolation;
        self
    }

    pub fn with_pool(mut self, pool: PoolOptions) -> Self {
        self.pool = pool;
        self
    }

    /// Client certificate, key and root CA, only when all three are present.
    pub fn tls_paths(&self) -> Option<(&str, &str, &str)> {
        match (
            non_empty_ref(&self.cert),
            non_empty_ref(&self.key),
            non_empty_ref(&self.root_cert),
        ) {
            (Some(cert), Some(key), Some(root)) => Some((cert, key, root)),
            _ => None,
        }
    }

    /// True when the rendered URL disables TLS. Only acceptable for local development.
    pub fn is_insecure(&self) -> bool {
        self.url.is_none() && self.tls_paths().is_none()
    }

    /// Some but not all TLS paths were given, so TLS is off.
    pub fn has_partial_tls(&self) -> bool {
        let given = [&self.cert, &self.key, &self.root_cert]
            .into_iter()
            .filter(|p| non_empty_ref(p).is_some())
            .count();
        given > 0 && given < 3
    }

    pub fn connection_url(&self) -> String {
        if let Some(url) = non_empty_ref(&self.url) {
            return url.to_string();
        }
        self.render_url(self.password.as_deref())
    }

    /// Connection URL with the password masked, for logs and errors.
    pub fn redacted_url(&self) -> String {
        match non_empty_ref(&self.url) {
            Some(url) => redact_url_password(url),
            None => self.render_url(self.password.as_ref().map(|_| "******")),
        }
    }

    fn render_url(&self, password: Option<&str>) -> String {
        let credentials = match password {
            Some(password) => format!("{}:{}", self.user, password),
            None => self.user.clone(),
        };
        let mut url = format!(
            "postgresql://{}@{}:{}/{}?",
            credentials, self.host, self.port, self.database
        );
        match self.tls_paths() {
            Some((cert, key, root)) => url.push_str(&format!(
                "sslmode=verify-full&sslcert={}&sslkey={}&sslrootcert={}",
                cert, key, root
            )),
            None => url.push_str("sslmode=disable"),
        }
        url
    }

    pub fn connect_options(&self) -> ConnectOptions {
        let mut opt = ConnectOptions::new(self.connection_url());
        opt.max_connections(self.pool.max_connections)
            .min_connections(self.pool.min_connections)
            .connect_timeout(self.pool.connect_timeout)
            .acquire_timeout(self.pool.acquire_timeout)
            .idle_timeout(self.pool.idle_timeout)
            .max_lifetime(self.pool.max_lifetime)
            .sqlx_logging(self.sql_logging);
        opt
    }
}

/// Parse an isolation level name as it appears in configuration.
pub fn parse_isolation_level(value: &str) -> Option<IsolationLevel> {
    match value.trim().to_ascii_lowercase().replace(['-', '_'], " ").as_str() {
        "serializable" => Some(IsolationLevel::Serializable),
        "repeatable read" => Some(IsolationLevel::RepeatableRead),
        "read committed" => Some(IsolationLevel::ReadCommitted),
        "read uncommitted" => Some(IsolationLevel::ReadUncommitted),
        _ => None,
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

fn non_empty_ref(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

fn redact_url_password(url: &str) -> String {
    let Some(scheme_end) = url.find("://") else {
        return url.to_string();
    };
    let rest = &url[scheme_end + 3..];
    let Some(at) = rest.find('@') else {
        return url.to_string();
    };
    match rest[..at].find(':') {
        Some(colon) => format!(
            "{}{}:******{}",
            &url[..scheme_end + 3],
            &rest[..colon],
            &rest[at..]
        ),
        None => url.to_string(),
    }
}
