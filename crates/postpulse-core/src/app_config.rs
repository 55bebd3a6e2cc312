use std::net::SocketAddr;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Environment {
    Development,
    Test,
    Production,
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Development => write!(f, "development"),
            Environment::Test => write!(f, "test"),
            Environment::Production => write!(f, "production"),
        }
    }
}

/// Which document store backs the post cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Postgres,
    /// Process-local store; contents are lost on restart.
    Memory,
}

impl std::fmt::Display for StoreBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreBackend::Postgres => write!(f, "postgres"),
            StoreBackend::Memory => write!(f, "memory"),
        }
    }
}

#[derive(Clone)]
pub struct AppConfig {
    pub env: Environment,
    pub bind_addr: SocketAddr,
    pub log_level: String,
    pub store: StoreBackend,
    /// Required when `store` is [`StoreBackend::Postgres`].
    pub database_url: Option<String>,
    pub db_max_connections: u32,
    pub db_min_connections: u32,
    pub db_acquire_timeout_secs: u64,
    pub linkedin_email: Option<String>,
    pub linkedin_password: Option<String>,
    pub session_state_path: PathBuf,
    pub selectors_path: PathBuf,
    pub browser_headless: bool,
    pub browser_executable: Option<PathBuf>,
    pub browser_user_agent: String,
    pub max_browser_sessions: usize,
    pub browser_launch_retries: u32,
    pub browser_launch_backoff_base_secs: u64,
    pub scrape_timeout_secs: u64,
    pub scroll_settle_ms: u64,
    pub manual_verification_timeout_secs: u64,
    pub hashtag_top_k: usize,
    pub max_posts_per_request: usize,
    pub single_flight: bool,
    pub export_dir: Option<PathBuf>,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("env", &self.env)
            .field("bind_addr", &self.bind_addr)
            .field("log_level", &self.log_level)
            .field("store", &self.store)
            .field(
                "database_url",
                &self.database_url.as_ref().map(|_| "[redacted]"),
            )
            .field("db_max_connections", &self.db_max_connections)
            .field("db_min_connections", &self.db_min_connections)
            .field("db_acquire_timeout_secs", &self.db_acquire_timeout_secs)
            .field("linkedin_email", &self.linkedin_email)
            .field(
                "linkedin_password",
                &self.linkedin_password.as_ref().map(|_| "[redacted]"),
            )
            .field("session_state_path", &self.session_state_path)
            .field("selectors_path", &self.selectors_path)
            .field("browser_headless", &self.browser_headless)
            .field("browser_executable", &self.browser_executable)
            .field("browser_user_agent", &self.browser_user_agent)
            .field("max_browser_sessions", &self.max_browser_sessions)
            .field("browser_launch_retries", &self.browser_launch_retries)
            .field(
                "browser_launch_backoff_base_secs",
                &self.browser_launch_backoff_base_secs,
            )
            .field("scrape_timeout_secs", &self.scrape_timeout_secs)
            .field("scroll_settle_ms", &self.scroll_settle_ms)
            .field(
                "manual_verification_timeout_secs",
                &self.manual_verification_timeout_secs,
            )
            .field("hashtag_top_k", &self.hashtag_top_k)
            .field("max_posts_per_request", &self.max_posts_per_request)
            .field("single_flight", &self.single_flight)
            .field("export_dir", &self.export_dir)
            .finish()
    }
}
