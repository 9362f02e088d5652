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

/// Size and quality bounds for one image derivative.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImageBounds {
    pub max_width: u32,
    pub max_height: u32,
    /// Encoder quality in `(0, 1]`.
    pub quality: f32,
}

impl ImageBounds {
    pub const FULL_SIZE: ImageBounds = ImageBounds {
        max_width: 1920,
        max_height: 1080,
        quality: 0.8,
    };

    pub const THUMBNAIL: ImageBounds = ImageBounds {
        max_width: 300,
        max_height: 300,
        quality: 0.7,
    };
}

#[derive(Clone)]
pub struct AppConfig {
    pub database_url: Option<String>,
    pub env: Environment,
    pub log_level: String,
    pub collection: String,
    pub db_max_connections: u32,
    pub db_min_connections: u32,
    pub db_acquire_timeout_secs: u64,
    pub storage_base_url: String,
    pub storage_bucket: Option<String>,
    pub storage_token: Option<String>,
    pub storage_timeout_secs: u64,
    pub image_max_bytes: u64,
    pub full_size: ImageBounds,
    pub thumbnail: ImageBounds,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("env", &self.env)
            .field("log_level", &self.log_level)
            .field("collection", &self.collection)
            .field(
                "database_url",
                &self.database_url.as_ref().map(|_| "[redacted]"),
            )
            .field("db_max_connections", &self.db_max_connections)
            .field("db_min_connections", &self.db_min_connections)
            .field("db_acquire_timeout_secs", &self.db_acquire_timeout_secs)
            .field("storage_base_url", &self.storage_base_url)
            .field("storage_bucket", &self.storage_bucket)
            .field(
                "storage_token",
                &self.storage_token.as_ref().map(|_| "[redacted]"),
            )
            .field("storage_timeout_secs", &self.storage_timeout_secs)
            .field("image_max_bytes", &self.image_max_bytes)
            .field("full_size", &self.full_size)
            .field("thumbnail", &self.thumbnail)
            .finish()
    }
}
